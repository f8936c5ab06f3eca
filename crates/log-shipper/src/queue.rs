// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;

use crate::mapper::Document;

/// Bounded FIFO of documents waiting to be shipped.
///
/// New documents go to the tail and batches are taken from the head. Documents that
/// failed delivery are put back at the head so they are retried before anything newer.
/// When a push exceeds the capacity the newest documents are dropped.
#[derive(Debug, Clone)]
pub struct DocumentQueue {
    pub(crate) documents: VecDeque<Document>,
    pub(crate) max_queue_size: usize,
}

impl DocumentQueue {
    #[must_use]
    pub fn new(max_queue_size: usize) -> Self {
        DocumentQueue {
            documents: VecDeque::new(),
            max_queue_size,
        }
    }

    /// Appends `document` and truncates from the tail down to capacity. Returns how many
    /// documents were dropped.
    pub fn push_back(&mut self, document: Document) -> usize {
        self.documents.push_back(document);
        self.truncate()
    }

    /// Puts `documents` back at the head, keeping their relative order.
    pub fn requeue_front(&mut self, documents: Vec<Document>) {
        for document in documents.into_iter().rev() {
            self.documents.push_front(document);
        }
    }

    /// Removes up to `max_batch_size` documents from the head.
    pub fn take_batch(&mut self, max_batch_size: usize) -> Vec<Document> {
        let count = max_batch_size.min(self.documents.len());
        self.documents.drain(..count).collect()
    }

    pub fn drain_all(&mut self) -> Vec<Document> {
        self.documents.drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn truncate(&mut self) -> usize {
        let mut dropped = 0;
        while self.documents.len() > self.max_queue_size {
            self.documents.pop_back();
            dropped += 1;
        }
        dropped
    }
}
