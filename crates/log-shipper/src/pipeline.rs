// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wiring of the whole pipeline: settings, mapper, shipper and gate behind one handle.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::{Settings, SharedFieldSettings};
use crate::enrichment::EnrichmentSource;
use crate::error::Error;
use crate::gate::IngestGate;
use crate::mapper::RecordMapper;
use crate::record::LogRecord;
use crate::reporter::ErrorReporter;
use crate::sink::{DocumentSink, ElasticsearchSink};

/// Entry point for applications and logging framework adapters.
///
/// `log` hands a record to the pipeline without blocking; `close` flushes what is left.
/// A disabled pipeline (`enabled: false`) accepts and discards records.
pub struct LogPipeline {
    settings: Settings,
    fields: Arc<SharedFieldSettings>,
    gate: Option<Arc<IngestGate>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl LogPipeline {
    /// Starts the pipeline on the current tokio runtime.
    ///
    /// `enrichment` is only used if environment fields are included in the settings.
    #[must_use]
    pub fn start(
        settings: Settings,
        sink: Arc<dyn DocumentSink>,
        reporter: Arc<dyn ErrorReporter>,
        enrichment: Option<Arc<dyn EnrichmentSource>>,
    ) -> Self {
        let fields = Arc::new(SharedFieldSettings::new(settings.fields.clone()));

        if !settings.enabled {
            reporter.report_info("Log shipping is disabled, log records will be discarded");
            return LogPipeline {
                settings,
                fields,
                gate: None,
                reporter,
            };
        }

        let mapper = RecordMapper::new(&settings, Arc::clone(&fields));
        let shipper =
            crate::shipper::BufferedBatchShipper::start(&settings, sink, Arc::clone(&reporter));
        let enrichment = enrichment.filter(|_| settings.fields.environment.include);
        let gate = IngestGate::start(
            mapper,
            shipper,
            Arc::clone(&reporter),
            enrichment,
            Duration::from_millis(settings.enrichment_timeout_millis),
        );

        debug!(
            "Pipeline started, batches of up to {} every {} ms",
            settings.max_batch_size, settings.flush_interval_millis
        );

        LogPipeline {
            settings,
            fields,
            gate: Some(gate),
            reporter,
        }
    }

    /// Starts a pipeline shipping to the Elasticsearch cluster configured in `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `settings` do not validate.
    pub fn elasticsearch(
        settings: Settings,
        reporter: Arc<dyn ErrorReporter>,
        enrichment: Option<Arc<dyn EnrichmentSource>>,
    ) -> Result<Self, Error> {
        let sink = ElasticsearchSink::new(&settings, Arc::clone(&reporter))?;
        if settings.enabled {
            reporter.report_info(&format!(
                "Logging to index '{}' on host {}",
                settings.index_name, settings.host
            ));
        }
        Ok(Self::start(settings, Arc::new(sink), reporter, enrichment))
    }

    pub fn log(&self, record: LogRecord) {
        if let Some(gate) = &self.gate {
            gate.accept(record);
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.gate.is_some()
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Live field toggles; changes apply to records mapped afterwards.
    #[must_use]
    pub fn field_settings(&self) -> &Arc<SharedFieldSettings> {
        &self.fields
    }

    #[must_use]
    pub fn reporter(&self) -> &Arc<dyn ErrorReporter> {
        &self.reporter
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.gate
            .as_ref()
            .map_or(0, |gate| gate.shipper().queue_len())
    }

    /// Sends one batch right away.
    pub async fn flush(&self) -> usize {
        match &self.gate {
            Some(gate) => gate.shipper().flush_now().await,
            None => 0,
        }
    }

    pub async fn close(&self) {
        if let Some(gate) = &self.gate {
            gate.close().await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::enrichment::StaticEnrichmentSource;
    use crate::record::EnvironmentInfo;
    use crate::reporter::test_support::RecordingReporter;
    use crate::sink::test_support::ScriptedSink;
    use chrono::Utc;
    use serde_json::json;

    fn settings() -> Settings {
        Settings {
            host: "http://localhost:9200".to_string(),
            flush_interval_millis: 3_600_000,
            ..Settings::default()
        }
    }

    fn record(message: &str) -> LogRecord {
        LogRecord::new(message, Utc::now(), "WARN", "app::orders", "worker-1", "host-1")
    }

    #[tokio::test]
    async fn test_log_and_close() {
        let sink = Arc::new(ScriptedSink::default());
        let pipeline = LogPipeline::start(
            settings(),
            sink.clone(),
            Arc::new(RecordingReporter::default()),
            None,
        );

        pipeline.log(record("one"));
        pipeline.log(record("two"));
        assert_eq!(pipeline.queue_len(), 2);
        pipeline.close().await;

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][1].get("message"), Some(&json!("two")));
        assert_eq!(batches[0][1].get("level"), Some(&json!("WARN")));
    }

    #[tokio::test]
    async fn test_disabled_pipeline_discards() {
        let sink = Arc::new(ScriptedSink::default());
        let reporter = Arc::new(RecordingReporter::default());
        let pipeline = LogPipeline::start(
            Settings {
                enabled: false,
                ..settings()
            },
            sink.clone(),
            reporter.clone(),
            None,
        );

        pipeline.log(record("ignored"));
        pipeline.close().await;

        assert!(!pipeline.is_enabled());
        assert!(sink.batches().is_empty());
        assert_eq!(reporter.infos().len(), 1);
    }

    #[tokio::test]
    async fn test_enrichment_ignored_when_environment_excluded() {
        let sink = Arc::new(ScriptedSink::default());
        let source: Arc<dyn EnrichmentSource> =
            Arc::new(StaticEnrichmentSource::new(Some(EnvironmentInfo::default())));
        let pipeline = LogPipeline::start(
            settings(),
            sink.clone(),
            Arc::new(RecordingReporter::default()),
            Some(source),
        );

        pipeline.log(record("direct"));

        assert_eq!(pipeline.queue_len(), 1);
        pipeline.close().await;
    }

    #[tokio::test]
    async fn test_live_field_toggle() {
        let sink = Arc::new(ScriptedSink::default());
        let pipeline = LogPipeline::start(
            settings(),
            sink.clone(),
            Arc::new(RecordingReporter::default()),
            None,
        );

        pipeline.log(record("with level"));
        pipeline
            .field_settings()
            .update(|fields| fields.level.include = false);
        pipeline.log(record("without level"));
        pipeline.close().await;

        let batch = &sink.batches()[0];
        assert!(batch[0].contains_key("level"));
        assert!(!batch[1].contains_key("level"));
    }

    #[tokio::test]
    async fn test_elasticsearch_requires_valid_settings() {
        let result = LogPipeline::elasticsearch(
            Settings::default(),
            Arc::new(RecordingReporter::default()),
            None,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
