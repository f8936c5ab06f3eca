// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use figment::providers::Env;

use crate::config::{merge_provider, ConfigSource, Settings};
use crate::error::Error;

pub const ENV_PREFIX: &str = "LOG_SHIPPER_";

/// Reads `LOG_SHIPPER_*` variables. `__` separates nested keys, so
/// `LOG_SHIPPER_FIELDS__THREAD__NAME=thread_name` sets `fields.thread.name`.
#[derive(Debug, Clone, Copy, Default)]
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn load(&self, settings: &mut Settings) -> Result<(), Error> {
        merge_provider(settings, Env::prefixed(ENV_PREFIX).split("__"))
            .map_err(|e| Error::Config(format!("Failed to parse config from environment: {e}")))
    }
}
