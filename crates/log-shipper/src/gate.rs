// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Front door of the pipeline.
//!
//! While environment enrichment is pending, accepted records are held in arrival order.
//! Once enrichment completes (with or without info) the held records are released, then
//! every later record goes straight through: map, then enqueue.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::context;
use crate::enrichment::{retrieve_with_timeout, EnrichmentSource};
use crate::error::Error;
use crate::mapper::RecordMapper;
use crate::record::{EnvironmentInfo, LogRecord};
use crate::reporter::ErrorReporter;
use crate::shipper::{enqueue_error_message, BufferedBatchShipper};

#[derive(Debug)]
enum GateState {
    AwaitingEnrichment(Vec<LogRecord>),
    Ready(Option<Arc<EnvironmentInfo>>),
}

pub struct IngestGate {
    state: Mutex<GateState>,
    mapper: RecordMapper,
    shipper: Arc<BufferedBatchShipper>,
    reporter: Arc<dyn ErrorReporter>,
}

impl IngestGate {
    /// Creates a gate that forwards records right away.
    #[must_use]
    pub fn ready(
        mapper: RecordMapper,
        shipper: Arc<BufferedBatchShipper>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Arc<Self> {
        Arc::new(Self::with_state(
            GateState::Ready(None),
            mapper,
            shipper,
            reporter,
        ))
    }

    /// Creates a gate that holds records until [`complete_enrichment`](Self::complete_enrichment)
    /// is called.
    #[must_use]
    pub fn awaiting_enrichment(
        mapper: RecordMapper,
        shipper: Arc<BufferedBatchShipper>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Arc<Self> {
        Arc::new(Self::with_state(
            GateState::AwaitingEnrichment(Vec::new()),
            mapper,
            shipper,
            reporter,
        ))
    }

    /// Creates a gate and, if `source` is given, retrieves environment info from it in the
    /// background. The gate opens when retrieval finishes or after `timeout`, whichever
    /// comes first.
    ///
    /// # Panics
    ///
    /// Panics if `source` is given and this is called outside of a tokio runtime.
    #[must_use]
    pub fn start(
        mapper: RecordMapper,
        shipper: Arc<BufferedBatchShipper>,
        reporter: Arc<dyn ErrorReporter>,
        source: Option<Arc<dyn EnrichmentSource>>,
        timeout: Duration,
    ) -> Arc<Self> {
        let Some(source) = source else {
            return Self::ready(mapper, shipper, reporter);
        };

        let gate = Self::awaiting_enrichment(mapper, shipper, reporter);
        let enriching = Arc::clone(&gate);
        tokio::spawn(async move {
            let info =
                retrieve_with_timeout(source, timeout, enriching.reporter.as_ref()).await;
            enriching.complete_enrichment(info);
        });
        gate
    }

    fn with_state(
        state: GateState,
        mapper: RecordMapper,
        shipper: Arc<BufferedBatchShipper>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            state: Mutex::new(state),
            mapper,
            shipper,
            reporter,
        }
    }

    /// Takes a record from the caller. Never blocks on I/O and never fails.
    pub fn accept(&self, record: LogRecord) {
        let record = capture_context(record);

        let environment = {
            let mut state = self.lock_state();
            match &mut *state {
                GateState::AwaitingEnrichment(held) => {
                    held.push(record);
                    return;
                }
                GateState::Ready(environment) => environment.clone(),
            }
        };

        if let Err((message, e)) = self.forward(record, environment.as_ref()) {
            self.reporter.report_error(&message, Some(&e));
        }
    }

    /// Opens the gate, releasing held records in arrival order. Only the first call has an
    /// effect.
    pub fn complete_enrichment(&self, info: Option<EnvironmentInfo>) {
        let failures = {
            let mut state = self.lock_state();
            let held = match &mut *state {
                GateState::Ready(_) => return,
                GateState::AwaitingEnrichment(held) => std::mem::take(held),
            };

            let environment = info.map(Arc::new);
            *state = GateState::Ready(environment.clone());
            debug!(
                "GATE | Enrichment complete, releasing {} held records",
                held.len()
            );

            // Released under the lock so records accepted meanwhile cannot overtake them.
            held.into_iter()
                .filter_map(|record| self.forward(record, environment.as_ref()).err())
                .collect::<Vec<_>>()
        };

        // Reported after the lock is released, a reporter may log through this gate.
        for (message, e) in failures {
            self.reporter.report_error(&message, Some(&e));
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(*self.lock_state(), GateState::Ready(_))
    }

    #[must_use]
    pub fn held_len(&self) -> usize {
        match &*self.lock_state() {
            GateState::AwaitingEnrichment(held) => held.len(),
            GateState::Ready(_) => 0,
        }
    }

    #[must_use]
    pub fn mapper(&self) -> &RecordMapper {
        &self.mapper
    }

    #[must_use]
    pub fn shipper(&self) -> &Arc<BufferedBatchShipper> {
        &self.shipper
    }

    /// Releases held records without enrichment, then closes the shipper.
    pub async fn close(&self) {
        self.complete_enrichment(None);
        self.shipper.close().await;
    }

    /// Maps and queues `record`. Failures are returned for the caller to report.
    fn forward(
        &self,
        record: LogRecord,
        environment: Option<&Arc<EnvironmentInfo>>,
    ) -> Result<(), (String, Error)> {
        let record = match environment {
            Some(environment) if record.environment.is_none() => {
                record.with_environment(Arc::clone(environment))
            }
            _ => record,
        };

        let document = self
            .mapper
            .map(&record)
            .map_err(|e| (format!("Could not map log record '{record}'"), e))?;
        self.shipper
            .try_enqueue(document)
            .map_err(|e| (enqueue_error_message(&e).to_string(), e))
    }

    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Attaches the caller's diagnostic context unless the record brings its own.
fn capture_context(mut record: LogRecord) -> LogRecord {
    if record.context_map.is_none() {
        if let Some(context_map) = context::snapshot() {
            record = record.with_context_map(context_map);
        }
    }
    if record.nested_context.is_none() {
        if let Some(nested) = context::nested_snapshot() {
            record = record.with_nested_context(nested);
        }
    }
    record
}
