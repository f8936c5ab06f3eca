// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client used to talk to the cluster.

use core::time::Duration;
use std::error::Error;

use tracing::error;

use crate::config::Settings;

/// Builds the client for the configured cluster.
///
/// Uses the request timeout from `settings`, pools idle connections for 270s and keeps TCP
/// connections alive. Certificate verification is only disabled when
/// `disable_certificate_check` is set. If the configured client cannot be built, logs an
/// error and falls back to reqwest's defaults.
#[must_use]
pub fn get_client(settings: &Settings) -> reqwest::Client {
    match build_client(settings) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "SHIPPER | Unable to build HTTP client: {}, using reqwest defaults",
                e
            );
            reqwest::Client::new()
        }
    }
}

fn build_client(settings: &Settings) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if settings.disable_certificate_check {
        client = client.danger_accept_invalid_certs(true);
    }

    Ok(client.build()?)
}
