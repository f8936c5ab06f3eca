// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffered, batched delivery of documents.
//!
//! # Architecture
//!
//! ```text
//!   enqueue() ──> DocumentQueue (Mutex, bounded, drop-newest)
//!                      │
//!                      │ every flush interval: take up to max_batch_size from the head
//!                      v
//!                 DocumentSink::send (outside the lock)
//!                      │
//!          ┌───────────┼──────────────────┐
//!          v           v                  v
//!       success   partial failure    transport failure
//!                 failed docs back   whole batch back
//!                 to the head        to the head
//! ```
//!
//! A single tokio task runs the delivery loop. Producers never block on I/O and never see
//! an error; everything that goes wrong is handed to the [`ErrorReporter`].
//!
//! On [`BufferedBatchShipper::close`] the loop is cancelled, everything still queued is
//! sent in one final batch and the worker is awaited for at most `close_timeout_millis`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Settings;
use crate::error::Error;
use crate::mapper::Document;
use crate::queue::DocumentQueue;
use crate::reporter::ErrorReporter;
use crate::sink::{BatchResult, DocumentOutcome, DocumentSink};

/// Rejection reasons listed in a partial failure report.
const MAX_REPORTED_REASONS: usize = 5;

pub struct BufferedBatchShipper {
    queue: Mutex<DocumentQueue>,
    sink: Arc<dyn DocumentSink>,
    reporter: Arc<dyn ErrorReporter>,
    max_batch_size: usize,
    flush_interval: Duration,
    close_timeout: Duration,
    cancel_token: CancellationToken,
    // Only written while the queue lock is held, so enqueue and close cannot interleave.
    closed: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BufferedBatchShipper {
    /// Creates the shipper and spawns its delivery loop on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    #[must_use]
    pub fn start(
        settings: &Settings,
        sink: Arc<dyn DocumentSink>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Arc<Self> {
        let shipper = Arc::new(BufferedBatchShipper {
            queue: Mutex::new(DocumentQueue::new(settings.max_queue_size)),
            sink,
            reporter,
            max_batch_size: settings.max_batch_size.max(1),
            flush_interval: Duration::from_millis(settings.flush_interval_millis.max(1)),
            close_timeout: Duration::from_millis(settings.close_timeout_millis),
            cancel_token: CancellationToken::new(),
            closed: AtomicBool::new(false),
            worker: Mutex::new(None),
        });

        let worker = tokio::spawn(Arc::clone(&shipper).run());
        *shipper
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(worker);

        shipper
    }

    /// Queues `document` for delivery. Never blocks on I/O and never fails: overflow and
    /// enqueueing after [`close`](Self::close) are reported, the document is dropped.
    pub fn enqueue(&self, document: Document) {
        if let Err(e) = self.try_enqueue(document) {
            self.reporter.report_error(enqueue_error_message(&e), Some(&e));
        }
    }

    /// Like [`enqueue`](Self::enqueue), but hands the failure back instead of reporting it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after [`close`](Self::close) and [`Error::QueueOverflow`] if
    /// the queue is full. The document is dropped in both cases.
    pub fn try_enqueue(&self, document: Document) -> Result<(), Error> {
        let mut queue = self.lock_queue();
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        match queue.push_back(document) {
            0 => Ok(()),
            dropped => Err(Error::QueueOverflow { dropped }),
        }
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.lock_queue().len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Sends the next batch right away instead of waiting for the timer. Returns the size of
    /// the batch that was attempted.
    pub async fn flush_now(&self) -> usize {
        self.send_next_batch().await
    }

    /// Stops the delivery loop and sends everything that is still queued.
    ///
    /// Failures are reported, never returned. Calling `close` again does nothing.
    pub async fn close(&self) {
        let remaining = {
            let mut queue = self.lock_queue();
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            queue.drain_all()
        };
        self.cancel_token.cancel();
        debug!(
            "SHIPPER | Closing, sending {} remaining documents",
            remaining.len()
        );

        self.send_final(remaining).await;

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            match tokio::time::timeout(self.close_timeout, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.reporter.report_error(
                    "Delivery loop did not stop cleanly",
                    Some(&Error::Shutdown(e.to_string())),
                ),
                Err(_) => self.reporter.report_error(
                    "Delivery loop did not stop in time",
                    Some(&Error::Shutdown(format!(
                        "still running after {} ms",
                        self.close_timeout.as_millis()
                    ))),
                ),
            }
        }

        // A batch that was in flight when the loop was cancelled may have been put back.
        let requeued = self.lock_queue().drain_all();
        self.send_final(requeued).await;
    }

    async fn run(self: Arc<Self>) {
        debug!(
            "SHIPPER | Delivery loop started, flushing every {} ms",
            self.flush_interval.as_millis()
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                () = tokio::time::sleep(self.flush_interval) => {}
            }
            self.send_next_batch().await;
        }

        self.reporter.report_info("Delivery loop has stopped");
    }

    async fn send_next_batch(&self) -> usize {
        let batch = self.lock_queue().take_batch(self.max_batch_size);
        let size = batch.len();
        if size > 0 {
            if let Some(failed) = self.deliver(batch).await {
                self.lock_queue().requeue_front(failed);
            }
        }
        size
    }

    async fn send_final(&self, documents: Vec<Document>) {
        if documents.is_empty() {
            return;
        }
        if let Some(failed) = self.deliver(documents).await {
            debug!(
                "SHIPPER | Dropping {} documents that could not be sent during shutdown",
                failed.len()
            );
        }
    }

    /// Sends `batch` and reports failures. Returns the documents that were not delivered.
    async fn deliver(&self, batch: Vec<Document>) -> Option<Vec<Document>> {
        let total = batch.len();
        match self.sink.send(&batch).await {
            Ok(BatchResult::AllSucceeded) => None,
            Ok(BatchResult::PartialFailure(outcomes)) => {
                let mut failed = Vec::new();
                let mut reasons = Vec::new();
                for (index, document) in batch.into_iter().enumerate() {
                    match outcomes.get(index) {
                        Some(DocumentOutcome::Succeeded) => {}
                        Some(DocumentOutcome::Failed(reason)) => {
                            reasons.push(format!("[{index}]: {reason}"));
                            failed.push(document);
                        }
                        None => {
                            reasons.push(format!("[{index}]: no outcome"));
                            failed.push(document);
                        }
                    }
                }
                if failed.is_empty() {
                    return None;
                }

                let error = Error::PartialFailure {
                    failed: failed.len(),
                    total,
                    summary: summarize(&reasons),
                };
                self.reporter
                    .report_error("Could not send all log records", Some(&error));
                Some(failed)
            }
            Err(e) => {
                self.reporter.report_error(
                    &format!("Could not send batch with {total} items"),
                    Some(&e),
                );
                Some(batch)
            }
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, DocumentQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn enqueue_error_message(error: &Error) -> &'static str {
    match error {
        Error::QueueOverflow { .. } => "Log queue is full, dropping newest log records",
        _ => "Dropping log record",
    }
}

fn summarize(reasons: &[String]) -> String {
    let mut summary = reasons
        .iter()
        .take(MAX_REPORTED_REASONS)
        .cloned()
        .collect::<Vec<_>>()
        .join("; ");
    if reasons.len() > MAX_REPORTED_REASONS {
        summary.push_str(&format!(
            "; and {} more",
            reasons.len() - MAX_REPORTED_REASONS
        ));
    }
    summary
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::reporter::test_support::RecordingReporter;
    use crate::sink::test_support::ScriptedSink;
    use serde_json::{json, Value};

    /// Long enough that the loop never fires on its own during a test.
    const NEVER: u64 = 3_600_000;

    fn document(id: usize) -> Document {
        let mut document = Document::new();
        document.insert("id", json!(id));
        document
    }

    fn ids(documents: &[Document]) -> Vec<u64> {
        documents
            .iter()
            .map(|d| d.get("id").and_then(Value::as_u64).unwrap())
            .collect()
    }

    fn settings(max_batch_size: usize, max_queue_size: usize, flush_interval_millis: u64) -> Settings {
        Settings {
            host: "http://localhost:9200".to_string(),
            max_batch_size,
            max_queue_size,
            flush_interval_millis,
            ..Settings::default()
        }
    }

    fn start(
        settings: &Settings,
        sink: ScriptedSink,
    ) -> (Arc<BufferedBatchShipper>, Arc<ScriptedSink>, Arc<RecordingReporter>) {
        let sink = Arc::new(sink);
        let reporter = Arc::new(RecordingReporter::default());
        let shipper = BufferedBatchShipper::start(settings, sink.clone(), reporter.clone());
        (shipper, sink, reporter)
    }

    #[tokio::test]
    async fn test_zero_flush_interval_is_clamped() {
        let (shipper, sink, _) = start(&settings(10, 100, 0), ScriptedSink::default());
        assert_eq!(shipper.flush_interval, Duration::from_millis(1));

        shipper.enqueue(document(1));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(sink.batch_sizes(), vec![1]);
        shipper.close().await;
    }

    #[tokio::test]
    async fn test_try_enqueue_returns_failures() {
        let (shipper, _, reporter) = start(&settings(10, 1, NEVER), ScriptedSink::default());

        assert!(shipper.try_enqueue(document(1)).is_ok());
        assert!(matches!(
            shipper.try_enqueue(document(2)),
            Err(Error::QueueOverflow { dropped: 1 })
        ));
        shipper.close().await;
        assert!(matches!(shipper.try_enqueue(document(3)), Err(Error::Closed)));

        assert!(reporter.errors().is_empty());
    }

    #[tokio::test]
    async fn test_ten_documents_one_batch() {
        let (shipper, sink, _) = start(&settings(10, 100, 10), ScriptedSink::default());
        for id in 0..10 {
            shipper.enqueue(document(id));
        }

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(sink.batch_sizes(), vec![10]);
        assert_eq!(shipper.queue_len(), 0);
        shipper.close().await;
    }

    #[tokio::test]
    async fn test_fifteen_documents_two_batches_in_order() {
        let (shipper, sink, _) = start(&settings(10, 100, NEVER), ScriptedSink::default());
        for id in 0..15 {
            shipper.enqueue(document(id));
        }

        assert_eq!(shipper.flush_now().await, 10);
        assert_eq!(shipper.flush_now().await, 5);

        let batches = sink.batches();
        assert_eq!(ids(&batches[0]), (0..10).collect::<Vec<_>>());
        assert_eq!(ids(&batches[1]), (10..15).collect::<Vec<_>>());
        shipper.close().await;
    }

    #[tokio::test]
    async fn test_overflow_drops_newest_and_reports() {
        let (shipper, sink, reporter) = start(&settings(10, 3, NEVER), ScriptedSink::default());
        for id in 0..5 {
            shipper.enqueue(document(id));
        }

        assert_eq!(shipper.queue_len(), 3);
        assert_eq!(
            reporter.error_categories(),
            vec![Some(ErrorCategory::QueueOverflow); 2]
        );

        shipper.flush_now().await;
        assert_eq!(ids(&sink.batches()[0]), vec![0, 1, 2]);
        shipper.close().await;
    }

    #[tokio::test]
    async fn test_partial_failure_requeues_only_failed_at_front() {
        let sink = ScriptedSink::with_responses(vec![Ok(BatchResult::PartialFailure(vec![
            DocumentOutcome::Succeeded,
            DocumentOutcome::Failed("es_rejected_execution_exception".to_string()),
            DocumentOutcome::Succeeded,
        ]))]);
        let (shipper, sink, reporter) = start(&settings(3, 100, NEVER), sink);
        for id in 0..5 {
            shipper.enqueue(document(id));
        }

        shipper.flush_now().await;
        assert_eq!(shipper.queue_len(), 3);
        shipper.flush_now().await;

        let batches = sink.batches();
        assert_eq!(ids(&batches[0]), vec![0, 1, 2]);
        assert_eq!(ids(&batches[1]), vec![1, 3, 4]);

        let errors = reporter.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].1, Some(ErrorCategory::PartialFailure));
        shipper.close().await;
    }

    #[tokio::test]
    async fn test_transport_failure_requeues_whole_batch() {
        let sink = ScriptedSink::with_responses(vec![Err(Error::Transport(
            "connection refused".to_string(),
        ))]);
        let (shipper, sink, reporter) = start(&settings(2, 100, NEVER), sink);
        for id in 0..3 {
            shipper.enqueue(document(id));
        }

        shipper.flush_now().await;
        assert_eq!(shipper.queue_len(), 3);
        shipper.flush_now().await;

        let batches = sink.batches();
        assert_eq!(ids(&batches[0]), vec![0, 1]);
        assert_eq!(ids(&batches[1]), vec![0, 1]);
        assert_eq!(
            reporter.errors(),
            vec![(
                "Could not send batch with 2 items".to_string(),
                Some(ErrorCategory::Transport)
            )]
        );
        shipper.close().await;
    }

    #[tokio::test]
    async fn test_loop_keeps_running_after_failures() {
        let sink = ScriptedSink::with_responses(vec![
            Err(Error::Transport("connection refused".to_string())),
            Err(Error::Status {
                status: 503,
                body: String::new(),
            }),
        ]);
        let (shipper, sink, _) = start(&settings(10, 100, 10), sink);
        shipper.enqueue(document(1));

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(sink.batch_sizes(), vec![1, 1, 1]);
        assert_eq!(shipper.queue_len(), 0);
        shipper.close().await;
    }

    #[tokio::test]
    async fn test_close_sends_everything_in_one_batch() {
        let (shipper, sink, _) = start(&settings(2, 100, NEVER), ScriptedSink::default());
        for id in 0..7 {
            shipper.enqueue(document(id));
        }

        shipper.close().await;

        assert_eq!(sink.batch_sizes(), vec![7]);
        assert!(shipper.is_closed());
        assert_eq!(shipper.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (shipper, sink, _) = start(&settings(2, 100, NEVER), ScriptedSink::default());
        shipper.enqueue(document(1));

        shipper.close().await;
        shipper.close().await;

        assert_eq!(sink.batch_sizes(), vec![1]);
    }

    #[tokio::test]
    async fn test_enqueue_after_close_is_rejected() {
        let (shipper, sink, reporter) = start(&settings(2, 100, NEVER), ScriptedSink::default());
        shipper.close().await;

        shipper.enqueue(document(1));

        assert_eq!(shipper.queue_len(), 0);
        assert!(sink.batches().is_empty());
        assert_eq!(
            reporter.error_categories(),
            vec![Some(ErrorCategory::Closed)]
        );
    }

    #[tokio::test]
    async fn test_close_reports_final_send_failure() {
        let sink = ScriptedSink::with_responses(vec![Err(Error::Transport(
            "connection refused".to_string(),
        ))]);
        let (shipper, sink, reporter) = start(&settings(2, 100, NEVER), sink);
        shipper.enqueue(document(1));

        shipper.close().await;

        assert_eq!(sink.batch_sizes(), vec![1]);
        assert_eq!(
            reporter.error_categories(),
            vec![Some(ErrorCategory::Transport)]
        );
        assert_eq!(shipper.queue_len(), 0);
    }

    #[test]
    fn test_summarize_limits_reasons() {
        let reasons: Vec<String> = (0..7).map(|i| format!("[{i}]: rejected")).collect();
        assert_eq!(
            summarize(&reasons),
            "[0]: rejected; [1]: rejected; [2]: rejected; [3]: rejected; [4]: rejected; and 2 more"
        );
    }
}
