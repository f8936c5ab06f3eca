// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A [`tracing_subscriber::Layer`] that ships `tracing` events through a
//! [`LogPipeline`].
//!
//! ```rust,ignore
//! let pipeline = Arc::new(LogPipeline::elasticsearch(settings, reporter, None)?);
//! tracing_subscriber::registry()
//!     .with(ShipperLayer::new(Arc::clone(&pipeline)))
//!     .init();
//! ```
//!
//! Events from the pipeline's own stack (`log_shipper`, the HTTP client and TLS crates)
//! are never shipped, so a failing delivery cannot feed itself.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod visitor;

use std::sync::Arc;
use std::thread;

use chrono::Utc;
use log_shipper::hostname::cached_hostname;
use log_shipper::{context, LogPipeline, LogRecord};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::visitor::FieldVisitor;

pub const DEFAULT_EXEMPT_TARGETS: [&str; 5] = ["log_shipper", "reqwest", "hyper", "h2", "rustls"];

pub struct ShipperLayer {
    pipeline: Arc<LogPipeline>,
    exempt_targets: Vec<String>,
}

impl ShipperLayer {
    #[must_use]
    pub fn new(pipeline: Arc<LogPipeline>) -> Self {
        Self {
            pipeline,
            exempt_targets: DEFAULT_EXEMPT_TARGETS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Adds target prefixes whose events are never shipped. [`DEFAULT_EXEMPT_TARGETS`]
    /// stay exempt.
    #[must_use]
    pub fn with_exempt_targets<I, T>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.exempt_targets.extend(targets.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn pipeline(&self) -> &Arc<LogPipeline> {
        &self.pipeline
    }

    fn is_exempt(&self, target: &str) -> bool {
        self.exempt_targets
            .iter()
            .any(|prefix| target.starts_with(prefix.as_str()))
    }
}

impl<S: Subscriber> Layer<S> for ShipperLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !self.pipeline.is_enabled() || self.is_exempt(metadata.target()) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let current = thread::current();
        let thread_name = match current.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}", current.id()),
        };

        let mut record = LogRecord::new(
            visitor.message(),
            Utc::now(),
            metadata.level().to_string(),
            metadata.target(),
            thread_name,
            cached_hostname(),
        );
        if let Some(exception) = visitor.take_exception() {
            record = record.with_exception(exception);
        }

        // Event fields win over the ambient context of the emitting thread.
        let mut context_map = context::snapshot().unwrap_or_default();
        context_map.extend(visitor.into_fields());
        if !context_map.is_empty() {
            record = record.with_context_map(context_map);
        }

        self.pipeline.log(record);
    }
}
