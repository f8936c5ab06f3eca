// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::clock::{Clock, SystemClock};
use super::ErrorReporter;
use crate::error::{Error, ErrorCategory};

/// Forwards each error category at most once per `period`, e.g. only once per 30 minutes
/// while the cluster is unreachable.
///
/// Categories passed to [`PerPeriodReporter::with_always_report`] bypass suppression.
pub struct PerPeriodReporter<R, C = SystemClock> {
    inner: R,
    period: Duration,
    always_report: HashSet<ErrorCategory>,
    last_reported: Mutex<HashMap<ErrorCategory, Instant>>,
    clock: C,
}

impl<R: ErrorReporter> PerPeriodReporter<R, SystemClock> {
    pub fn new(inner: R, period: Duration) -> Self {
        Self::with_clock(inner, period, SystemClock)
    }
}

impl<R: ErrorReporter, C: Clock> PerPeriodReporter<R, C> {
    pub fn with_clock(inner: R, period: Duration, clock: C) -> Self {
        Self {
            inner,
            period,
            always_report: HashSet::new(),
            last_reported: Mutex::new(HashMap::new()),
            clock,
        }
    }

    #[must_use]
    pub fn with_always_report(mut self, categories: impl IntoIterator<Item = ErrorCategory>) -> Self {
        self.always_report.extend(categories);
        self
    }

    fn should_report(&self, category: ErrorCategory) -> bool {
        if self.always_report.contains(&category) {
            return true;
        }

        let now = self.clock.now();
        let mut last_reported = match self.last_reported.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(last) = last_reported.get(&category) {
            if now.saturating_duration_since(*last) < self.period {
                return false;
            }
        }
        last_reported.insert(category, now);
        true
    }
}

impl<R: ErrorReporter, C: Clock> ErrorReporter for PerPeriodReporter<R, C> {
    fn report_error(&self, message: &str, cause: Option<&Error>) {
        if let Some(cause) = cause {
            if !self.should_report(cause.category()) {
                return;
            }
        }
        self.inner.report_error(message, cause);
    }

    fn report_info(&self, message: &str) {
        self.inner.report_info(message);
    }
}
