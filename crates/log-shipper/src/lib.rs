// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ships application log records to Elasticsearch.
//!
//! ```text
//!   log(record) ──> IngestGate ──> RecordMapper ──> BufferedBatchShipper ──> DocumentSink
//!                   (holds records      (record ->      (bounded queue,        (_bulk API)
//!                    until enrichment)   document)       timed batches)
//! ```
//!
//! Logging never blocks on I/O and never fails from the caller's point of view. Problems
//! are routed to an [`ErrorReporter`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod context;
pub mod enrichment;
pub mod error;
pub mod gate;
pub mod hostname;
pub mod http;
pub mod index_name;
pub mod mapper;
pub mod pipeline;
pub mod queue;
pub mod record;
pub mod reporter;
pub mod shipper;
pub mod sink;

pub use config::{FieldSetting, FieldSettings, Settings, SharedFieldSettings};
pub use enrichment::{DownwardApiSource, EnrichmentSource, StaticEnrichmentSource};
pub use error::{Error, ErrorCategory};
pub use gate::IngestGate;
pub use mapper::{Document, RecordMapper};
pub use pipeline::LogPipeline;
pub use record::{EnvironmentInfo, ExceptionInfo, LogRecord};
pub use reporter::{
    ErrorReporter, OnlyOnceReporter, PerPeriodReporter, StdErrReporter, TracingReporter,
};
pub use shipper::BufferedBatchShipper;
pub use sink::{BatchResult, DocumentOutcome, DocumentSink, ElasticsearchSink};
