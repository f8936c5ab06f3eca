// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The log record handed to the pipeline, and the data attached to it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// A captured error: its type, its message and the rendered frames of its trace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExceptionInfo {
    pub type_name: String,
    pub message: String,
    pub frames: Vec<String>,
}

impl ExceptionInfo {
    #[must_use]
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            frames: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_frames(mut self, frames: Vec<String>) -> Self {
        self.frames = frames;
        self
    }

    /// Renders `<type>: <message>` followed by one `\tat <frame>` line per frame.
    #[must_use]
    pub fn printed_stack_trace(&self) -> String {
        let mut printed = if self.message.is_empty() {
            self.type_name.clone()
        } else {
            format!("{}: {}", self.type_name, self.message)
        };
        for frame in &self.frames {
            printed.push_str("\n\tat ");
            printed.push_str(frame);
        }
        printed
    }
}

/// Where the process runs, as reported by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvironmentInfo {
    pub namespace: String,
    pub pod_name: String,
    pub pod_ip: String,
    pub start_time: String,
    pub pod_uid: Option<String>,
    pub restart_count: Option<u32>,
    pub container_name: Option<String>,
    pub container_id: Option<String>,
    pub image_name: Option<String>,
    pub image_id: Option<String>,
    pub node_ip: Option<String>,
    pub node_name: Option<String>,
    pub cluster_name: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

/// One log event. Records are immutable once handed to the pipeline; the `with_*` methods
/// consume the record and return a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub logger_name: String,
    pub thread_name: String,
    pub host_name: String,
    pub exception: Option<ExceptionInfo>,
    pub context_map: Option<BTreeMap<String, String>>,
    pub marker: Option<String>,
    pub nested_context: Option<String>,
    pub environment: Option<Arc<EnvironmentInfo>>,
}

impl LogRecord {
    #[must_use]
    pub fn new(
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
        level: impl Into<String>,
        logger_name: impl Into<String>,
        thread_name: impl Into<String>,
        host_name: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            timestamp,
            level: level.into(),
            logger_name: logger_name.into(),
            thread_name: thread_name.into(),
            host_name: host_name.into(),
            exception: None,
            context_map: None,
            marker: None,
            nested_context: None,
            environment: None,
        }
    }

    #[must_use]
    pub fn with_exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }

    #[must_use]
    pub fn with_context_map(mut self, context_map: BTreeMap<String, String>) -> Self {
        self.context_map = Some(context_map);
        self
    }

    #[must_use]
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    #[must_use]
    pub fn with_nested_context(mut self, nested_context: impl Into<String>) -> Self {
        self.nested_context = Some(nested_context.into());
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Arc<EnvironmentInfo>) -> Self {
        self.environment = Some(environment);
        self
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.timestamp, self.level, self.message)
    }
}
