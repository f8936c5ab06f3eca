// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Destinations for batches of documents.

pub mod elasticsearch;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::mapper::Document;

pub use elasticsearch::ElasticsearchSink;

/// Delivery result of a single document of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Succeeded,
    Failed(String),
}

/// Result of a batch the destination answered. Per-document outcomes are in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchResult {
    AllSucceeded,
    PartialFailure(Vec<DocumentOutcome>),
}

#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Sends `documents` as one request.
    ///
    /// `Err` means the batch as a whole was not delivered (no connection, unexpected
    /// status, unreadable response); every document should be retried.
    async fn send(&self, documents: &[Document]) -> Result<BatchResult, Error>;
}

#[async_trait]
impl<S: DocumentSink + ?Sized> DocumentSink for Arc<S> {
    async fn send(&self, documents: &[Document]) -> Result<BatchResult, Error> {
        (**self).send(documents).await
    }
}
