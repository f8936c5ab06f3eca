// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shipper configuration.
//!
//! Settings are resolved once, in increasing precedence:
//!
//! 1. Built-in defaults ([`Settings::default`])
//! 2. YAML file (`log-shipper.yaml` in the working directory, or an explicit path)
//! 3. Environment variables prefixed with `LOG_SHIPPER_`, nested keys separated by `__`
//!    (e.g. `LOG_SHIPPER_FIELDS__LEVEL__INCLUDE=false`)
//!
//! The resulting [`Settings`] is an immutable snapshot. Only the field toggles can change at
//! runtime, through [`SharedFieldSettings`].

pub mod env;
pub mod timestamp;
pub mod yaml;

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use figment::providers::Serialized;
use figment::{Figment, Provider};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use env::EnvConfigSource;
use yaml::YamlConfigSource;

pub use timestamp::{TimestampFormat, TimestampResolution};

pub const DEFAULT_CONFIG_FILE: &str = "log-shipper.yaml";

/// Name and include toggle of one optional document field. For the context map and the
/// environment groups the name is used as key prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSetting {
    pub name: String,
    pub include: bool,
}

impl FieldSetting {
    #[must_use]
    pub fn new(name: impl Into<String>, include: bool) -> Self {
        Self {
            name: name.into(),
            include,
        }
    }

    #[must_use]
    pub fn included(name: impl Into<String>) -> Self {
        Self::new(name, true)
    }

    #[must_use]
    pub fn excluded(name: impl Into<String>) -> Self {
        Self::new(name, false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSettings {
    pub message: String,
    pub timestamp: String,
    pub level: FieldSetting,
    pub logger: FieldSetting,
    pub logger_short_name: FieldSetting,
    pub thread: FieldSetting,
    pub host: FieldSetting,
    pub stacktrace: FieldSetting,
    pub context_map: FieldSetting,
    pub marker: FieldSetting,
    pub nested_context: FieldSetting,
    pub environment: FieldSetting,
    pub environment_labels: FieldSetting,
    pub environment_annotations: FieldSetting,
}

impl Default for FieldSettings {
    fn default() -> Self {
        FieldSettings {
            message: "message".to_string(),
            timestamp: "@timestamp".to_string(),
            level: FieldSetting::included("level"),
            logger: FieldSetting::included("logger"),
            logger_short_name: FieldSetting::excluded("loggername"),
            thread: FieldSetting::included("thread"),
            host: FieldSetting::included("host"),
            stacktrace: FieldSetting::included("stacktrace"),
            context_map: FieldSetting::included(""),
            marker: FieldSetting::excluded("marker"),
            nested_context: FieldSetting::excluded("ndc"),
            environment: FieldSetting::excluded("k8s"),
            environment_labels: FieldSetting::included("label"),
            environment_annotations: FieldSetting::excluded("annotation"),
        }
    }
}

/// Field settings that can be swapped while the pipeline runs.
///
/// Readers take a snapshot and keep using it for the whole record; a concurrent
/// [`SharedFieldSettings::replace`] only affects records mapped afterwards.
#[derive(Debug, Default)]
pub struct SharedFieldSettings {
    current: RwLock<Arc<FieldSettings>>,
}

impl SharedFieldSettings {
    #[must_use]
    pub fn new(fields: FieldSettings) -> Self {
        Self {
            current: RwLock::new(Arc::new(fields)),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<FieldSettings> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, fields: FieldSettings) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(fields);
    }

    /// Applies `change` to a copy of the current settings and publishes the copy.
    pub fn update(&self, change: impl FnOnce(&mut FieldSettings)) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut fields = FieldSettings::clone(&current);
        change(&mut fields);
        *current = Arc::new(fields);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct Settings {
    pub enabled: bool,
    /// Base URL of the cluster, e.g. `http://localhost:9200`.
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub disable_certificate_check: bool,
    /// Index name, may contain `%date{<pattern>}`.
    pub index_name: String,
    /// Replaces characters that are not allowed in index names.
    pub index_name_replacement: String,
    pub timestamp_resolution: TimestampResolution,
    pub timestamp_format: TimestampFormat,
    pub fields: FieldSettings,
    pub max_batch_size: usize,
    pub max_queue_size: usize,
    pub flush_interval_millis: u64,
    pub stacktrace_max_length: usize,
    pub request_timeout_secs: u64,
    pub close_timeout_millis: u64,
    pub enrichment_timeout_millis: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enabled: true,
            host: String::new(),
            username: None,
            password: None,
            disable_certificate_check: false,
            index_name: "log".to_string(),
            index_name_replacement: "_".to_string(),
            timestamp_resolution: TimestampResolution::default(),
            timestamp_format: TimestampFormat::default(),
            fields: FieldSettings::default(),
            max_batch_size: 200,
            max_queue_size: 2000,
            flush_interval_millis: 100,
            stacktrace_max_length: 15_000,
            request_timeout_secs: 10,
            close_timeout_millis: 100,
            enrichment_timeout_millis: 30_000,
        }
    }
}

impl Settings {
    /// Loads settings from defaults, the YAML file at `path` (or [`DEFAULT_CONFIG_FILE`] if it
    /// exists) and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a source cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Settings, Error> {
        let mut builder = ConfigBuilder::default();

        let yaml_path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            }
        };
        if let Some(path) = yaml_path {
            builder = builder.add_source(Box::new(YamlConfigSource { path }));
        }

        builder
            .add_source(Box::new(EnvConfigSource))
            .build()
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid setting.
    pub fn validate(&self) -> Result<(), Error> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host is not set".to_string()));
        }
        if !self.host.starts_with("http://") && !self.host.starts_with("https://") {
            return Err(Error::Config(format!(
                "host '{}' must start with http:// or https://",
                self.host
            )));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(Error::Config(
                "username and password must be set together".to_string(),
            ));
        }
        for (name, value) in [
            ("max_batch_size", self.max_batch_size as u64),
            ("max_queue_size", self.max_queue_size as u64),
            ("flush_interval_millis", self.flush_interval_millis),
            ("request_timeout_secs", self.request_timeout_secs),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be greater than 0")));
            }
        }
        Ok(())
    }
}

/// A layer of configuration merged over the settings built so far.
#[allow(clippy::module_name_repetitions)]
pub trait ConfigSource {
    fn load(&self, settings: &mut Settings) -> Result<(), Error>;
}

/// Merges `provider` over `settings`, keeping every value the provider does not set.
pub(crate) fn merge_provider(settings: &mut Settings, provider: impl Provider) -> Result<(), Error> {
    let merged = Figment::from(Serialized::defaults(&*settings))
        .merge(provider)
        .extract::<Settings>()
        .map_err(|e| Error::Config(e.to_string()))?;
    *settings = merged;
    Ok(())
}

#[derive(Default)]
#[allow(clippy::module_name_repetitions)]
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    settings: Settings,
}

#[allow(clippy::module_name_repetitions)]
impl ConfigBuilder {
    #[must_use]
    pub fn add_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// # Errors
    ///
    /// Returns the error of the first source that fails to load.
    pub fn build(mut self) -> Result<Settings, Error> {
        for source in &self.sources {
            source.load(&mut self.settings)?;
        }
        debug!(
            "Loaded settings from {} source(s), shipping to '{}'",
            self.sources.len(),
            self.settings.host
        );
        Ok(self.settings)
    }
}
