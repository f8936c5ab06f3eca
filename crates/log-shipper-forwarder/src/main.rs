// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::path::PathBuf;
use std::{env, sync::Arc};

use chrono::Utc;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use log_shipper::hostname::cached_hostname;
use log_shipper::{
    DownwardApiSource, EnrichmentSource, ErrorCategory, ErrorReporter, LogPipeline, LogRecord,
    PerPeriodReporter, Settings, TracingReporter,
};

const REPORT_PERIOD: Duration = Duration::from_secs(5 * 60);
const STDIN_LOGGER: &str = "stdin";
const STDIN_LEVEL: &str = "INFO";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOG_SHIPPER_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config_path = env::var("LOG_SHIPPER_CONFIG").ok().map(PathBuf::from);
    let settings = match Settings::load(config_path.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Error loading configuration: {e}");
            return;
        }
    };
    if let Err(e) = settings.validate() {
        error!("{e}");
        return;
    }

    let reporter: Arc<dyn ErrorReporter> = Arc::new(
        PerPeriodReporter::new(TracingReporter, REPORT_PERIOD)
            .with_always_report([ErrorCategory::Shutdown]),
    );
    let enrichment: Option<Arc<dyn EnrichmentSource>> = settings
        .fields
        .environment
        .include
        .then(|| Arc::new(DownwardApiSource::default()) as Arc<dyn EnrichmentSource>);

    let pipeline = match LogPipeline::elasticsearch(settings, reporter, enrichment) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Could not start log pipeline: {e}");
            return;
        }
    };

    let forwarded = tokio::select! {
        forwarded = forward_lines(&pipeline) => forwarded,
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, shutting down");
            None
        }
    };
    if let Some(forwarded) = forwarded {
        info!("Reached end of input after {forwarded} lines, shutting down");
    }

    pipeline.close().await;
    debug!("Log pipeline closed");
}

/// Ships every line read from stdin. Returns the number of lines once input ends, or
/// `None` if reading failed.
async fn forward_lines(pipeline: &LogPipeline) -> Option<u64> {
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut forwarded = 0;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                pipeline.log(LogRecord::new(
                    line,
                    Utc::now(),
                    STDIN_LEVEL,
                    STDIN_LOGGER,
                    STDIN_LOGGER,
                    cached_hostname(),
                ));
                forwarded += 1;
            }
            Ok(None) => return Some(forwarded),
            Err(e) => {
                error!("Error reading from stdin: {e}");
                return None;
            }
        }
    }
}
