// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bulk indexing into Elasticsearch / OpenSearch.
//!
//! ```text
//!   [Document, ..]
//!        │
//!        v
//!   NDJSON body: {"index":{"_index":"<name>"}}\n{document}\n ...
//!        │
//!        v
//!   POST {host}/_bulk
//!        │
//!        v
//!   2xx + errors=false ──> AllSucceeded
//!   2xx + errors=true  ──> PartialFailure(outcome per item)
//!   anything else      ──> Err
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::Settings;
use crate::error::Error;
use crate::http::get_client;
use crate::index_name::IndexNameResolver;
use crate::mapper::Document;
use crate::reporter::ErrorReporter;
use crate::sink::{BatchResult, DocumentOutcome, DocumentSink};

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

impl BulkItem {
    fn outcome(&self) -> DocumentOutcome {
        match &self.error {
            None if (200..300).contains(&self.status) => DocumentOutcome::Succeeded,
            None => DocumentOutcome::Failed(format!("status {}", self.status)),
            Some(error) => DocumentOutcome::Failed(describe_error(self.status, error)),
        }
    }
}

fn describe_error(status: u16, error: &Value) -> String {
    let kind = error.get("type").and_then(Value::as_str);
    let reason = error.get("reason").and_then(Value::as_str);
    match (kind, reason) {
        (Some(kind), Some(reason)) => format!("status {status}, {kind}: {reason}"),
        (Some(kind), None) => format!("status {status}, {kind}"),
        _ => format!("status {status}, {error}"),
    }
}

pub struct ElasticsearchSink {
    client: reqwest::Client,
    bulk_url: String,
    credentials: Option<(String, String)>,
    index_name: IndexNameResolver,
    reporter: Arc<dyn ErrorReporter>,
}

impl ElasticsearchSink {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `settings` has no usable host.
    pub fn new(settings: &Settings, reporter: Arc<dyn ErrorReporter>) -> Result<Self, Error> {
        settings.validate()?;

        let credentials = match (&settings.username, &settings.password) {
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
            _ => None,
        };

        Ok(ElasticsearchSink {
            client: get_client(settings),
            bulk_url: format!("{}/_bulk", settings.host.trim_end_matches('/')),
            credentials,
            index_name: IndexNameResolver::new(
                settings.index_name.clone(),
                settings.index_name_replacement.clone(),
            ),
            reporter,
        })
    }

    #[must_use]
    pub fn bulk_url(&self) -> &str {
        &self.bulk_url
    }

    fn create_body(index_name: &str, documents: &[Document]) -> Result<Vec<u8>, Error> {
        let action = serde_json::to_vec(&json!({ "index": { "_index": index_name } }))?;

        let mut body = Vec::new();
        for document in documents {
            body.extend_from_slice(&action);
            body.push(b'\n');
            serde_json::to_writer(&mut body, document)?;
            body.push(b'\n');
        }
        Ok(body)
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(NDJSON_CONTENT_TYPE));
        headers
    }
}

#[async_trait]
impl DocumentSink for ElasticsearchSink {
    async fn send(&self, documents: &[Document]) -> Result<BatchResult, Error> {
        if documents.is_empty() {
            return Ok(BatchResult::AllSucceeded);
        }

        let index_name = self.index_name.resolve(self.reporter.as_ref());
        let body = Self::create_body(&index_name, documents)?;

        let mut request = self
            .client
            .post(&self.bulk_url)
            .headers(Self::headers())
            .body(body);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bulk: BulkResponse = serde_json::from_str(&body)?;
        if !bulk.errors {
            debug!(
                "SHIPPER | Indexed {} documents into '{}'",
                documents.len(),
                index_name
            );
            return Ok(BatchResult::AllSucceeded);
        }

        if bulk.items.len() != documents.len() {
            return Err(Error::Transport(format!(
                "bulk response contained {} items for {} documents",
                bulk.items.len(),
                documents.len()
            )));
        }

        let outcomes = bulk
            .items
            .iter()
            .map(|item| match item.values().next() {
                Some(item) => item.outcome(),
                None => DocumentOutcome::Failed("empty bulk item".to_string()),
            })
            .collect();
        Ok(BatchResult::PartialFailure(outcomes))
    }
}
