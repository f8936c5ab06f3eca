// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use log_shipper::ExceptionInfo;
use tracing::field::{Field, Visit};

const MESSAGE_FIELD: &str = "message";

/// Collects the fields of one event: the message, the first recorded error and
/// everything else as strings.
#[derive(Debug, Default)]
pub(crate) struct FieldVisitor {
    message: Option<String>,
    exception: Option<ExceptionInfo>,
    fields: BTreeMap<String, String>,
}

impl FieldVisitor {
    pub(crate) fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }

    pub(crate) fn take_exception(&mut self) -> Option<ExceptionInfo> {
        self.exception.take()
    }

    pub(crate) fn into_fields(self) -> BTreeMap<String, String> {
        self.fields
    }

    fn insert(&mut self, field: &Field, value: String) {
        if field.name() == MESSAGE_FIELD {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn StdError + 'static)) {
        if self.exception.is_some() {
            self.insert(field, value.to_string());
            return;
        }

        let mut frames = Vec::new();
        let mut source = value.source();
        while let Some(cause) = source {
            frames.push(cause.to_string());
            source = cause.source();
        }
        self.exception =
            Some(ExceptionInfo::new(field.name(), value.to_string()).with_frames(frames));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }
}
