// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors produced anywhere in the shipping pipeline.
///
/// None of these ever reach the code that logs a record; the pipeline funnels them into an
/// [`ErrorReporter`](crate::reporter::ErrorReporter) instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Could not map log record: {0}")]
    Mapping(String),

    #[error("Queue is full, dropped {dropped} document(s)")]
    QueueOverflow { dropped: usize },

    #[error("{failed} of {total} documents were rejected: {summary}")]
    PartialFailure {
        failed: usize,
        total: usize,
        summary: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected response status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid index name: {0}")]
    IndexName(String),

    #[error("Could not retrieve environment info: {0}")]
    Enrichment(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Shipper is closed")]
    Closed,

    #[error("Shutdown did not complete cleanly: {0}")]
    Shutdown(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

/// Coarse classification of an [`Error`], used by reporter policies to collapse repeated
/// failures of the same kind regardless of their message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Mapping,
    QueueOverflow,
    PartialFailure,
    Transport,
    Status,
    Serialization,
    IndexName,
    Enrichment,
    Config,
    Closed,
    Shutdown,
}

impl Error {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Mapping(_) => ErrorCategory::Mapping,
            Error::QueueOverflow { .. } => ErrorCategory::QueueOverflow,
            Error::PartialFailure { .. } => ErrorCategory::PartialFailure,
            Error::Transport(_) => ErrorCategory::Transport,
            Error::Status { .. } => ErrorCategory::Status,
            Error::Serialization(_) => ErrorCategory::Serialization,
            Error::IndexName(_) => ErrorCategory::IndexName,
            Error::Enrichment(_) => ErrorCategory::Enrichment,
            Error::Config(_) => ErrorCategory::Config,
            Error::Closed => ErrorCategory::Closed,
            Error::Shutdown(_) => ErrorCategory::Shutdown,
        }
    }
}
