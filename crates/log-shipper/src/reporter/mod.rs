// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Operational error reporting for the shipping pipeline.
//!
//! The pipeline never returns errors to the code that logs a record. Everything that goes
//! wrong (rejected documents, unreachable cluster, full queue, ...) is handed to an
//! [`ErrorReporter`]. Reporters compose: a terminal reporter performs the output and
//! policy wrappers decide whether a report reaches it.
//!
//! ```text
//!   PerPeriodReporter ──> OnlyOnceReporter ──> TracingReporter / StdErrReporter
//! ```
//!
//! - [`OnlyOnceReporter`]: forwards the first error of each [`ErrorCategory`] only
//! - [`PerPeriodReporter`]: forwards an error category at most once per period
//! - [`TracingReporter`]: emits through `tracing`
//! - [`StdErrReporter`]: writes to the process' error stream
//!
//! [`ErrorCategory`]: crate::error::ErrorCategory

pub mod clock;
pub mod only_once;
pub mod per_period;

use std::sync::Arc;
use tracing::{error, info};

use crate::error::Error;

pub use only_once::OnlyOnceReporter;
pub use per_period::PerPeriodReporter;

/// Target used by [`TracingReporter`], also exempted by the tracing adapter so reports are
/// never shipped back into the pipeline that produced them.
pub const REPORTER_TARGET: &str = "log_shipper::reporter";

pub trait ErrorReporter: Send + Sync {
    /// Reports an error. `cause` carries the classified error if there is one; reports
    /// without a cause are never suppressed by policy wrappers.
    fn report_error(&self, message: &str, cause: Option<&Error>);

    fn report_info(&self, message: &str);
}

impl<R: ErrorReporter + ?Sized> ErrorReporter for Arc<R> {
    fn report_error(&self, message: &str, cause: Option<&Error>) {
        (**self).report_error(message, cause);
    }

    fn report_info(&self, message: &str) {
        (**self).report_info(message);
    }
}

impl<R: ErrorReporter + ?Sized> ErrorReporter for Box<R> {
    fn report_error(&self, message: &str, cause: Option<&Error>) {
        (**self).report_error(message, cause);
    }

    fn report_info(&self, message: &str) {
        (**self).report_info(message);
    }
}

/// Writes reports to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdErrReporter;

impl ErrorReporter for StdErrReporter {
    fn report_error(&self, message: &str, cause: Option<&Error>) {
        match cause {
            Some(cause) => eprintln!("{message}: {cause}"),
            None => eprintln!("{message}"),
        }
    }

    fn report_info(&self, message: &str) {
        eprintln!("{message}");
    }
}

/// Forwards reports into `tracing` so they end up wherever the host application sends its
/// own diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report_error(&self, message: &str, cause: Option<&Error>) {
        match cause {
            Some(cause) => error!(target: REPORTER_TARGET, "{message}: {cause}"),
            None => error!(target: REPORTER_TARGET, "{message}"),
        }
    }

    fn report_info(&self, message: &str) {
        info!(target: REPORTER_TARGET, "{message}");
    }
}
