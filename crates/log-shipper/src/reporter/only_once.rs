// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::sync::Mutex;

use super::ErrorReporter;
use crate::error::{Error, ErrorCategory};

/// Forwards only the first error of each category for the lifetime of the reporter.
///
/// Errors reported without a cause cannot be classified and are always forwarded, as are
/// info messages.
#[derive(Debug)]
pub struct OnlyOnceReporter<R> {
    inner: R,
    reported: Mutex<HashSet<ErrorCategory>>,
}

impl<R: ErrorReporter> OnlyOnceReporter<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            reported: Mutex::new(HashSet::new()),
        }
    }

    fn first_occurrence(&self, category: ErrorCategory) -> bool {
        match self.reported.lock() {
            Ok(mut reported) => reported.insert(category),
            // A poisoned set still holds every category recorded so far.
            Err(poisoned) => poisoned.into_inner().insert(category),
        }
    }
}

impl<R: ErrorReporter> ErrorReporter for OnlyOnceReporter<R> {
    fn report_error(&self, message: &str, cause: Option<&Error>) {
        if let Some(cause) = cause {
            if !self.first_occurrence(cause.category()) {
                return;
            }
        }
        self.inner.report_error(message, cause);
    }

    fn report_info(&self, message: &str) {
        self.inner.report_info(message);
    }
}
