// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Conversion of [`LogRecord`]s into the flat documents that are indexed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{
    FieldSetting, FieldSettings, Settings, SharedFieldSettings, TimestampFormat,
    TimestampResolution,
};
use crate::error::Error;
use crate::record::{EnvironmentInfo, LogRecord};

/// A flat JSON object ready to be indexed.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Maps records to documents. Mapping has no side effects: the same record and the same
/// field settings always produce the same document.
#[derive(Debug, Clone)]
pub struct RecordMapper {
    fields: Arc<SharedFieldSettings>,
    timestamp_resolution: TimestampResolution,
    timestamp_format: TimestampFormat,
    stacktrace_max_length: usize,
}

impl RecordMapper {
    #[must_use]
    pub fn new(settings: &Settings, fields: Arc<SharedFieldSettings>) -> Self {
        Self {
            fields,
            timestamp_resolution: settings.timestamp_resolution,
            timestamp_format: settings.timestamp_format,
            stacktrace_max_length: settings.stacktrace_max_length,
        }
    }

    #[must_use]
    pub fn field_settings(&self) -> &Arc<SharedFieldSettings> {
        &self.fields
    }

    /// # Errors
    ///
    /// Returns [`Error::Mapping`] if an included field has a blank name.
    pub fn map(&self, record: &LogRecord) -> Result<Document, Error> {
        let fields = self.fields.snapshot();
        let mut document = Document::new();

        let mut message = record.message.clone();
        if let Some(exception) = &record.exception {
            message.push_str(": ");
            message.push_str(&exception.message);
        }
        document.insert(required_name(&fields.message, "message")?, message);
        document.insert(
            required_name(&fields.timestamp, "timestamp")?,
            self.format_timestamp(&record.timestamp),
        );

        insert_if(&mut document, &fields.level, "level", || record.level.clone())?;
        insert_if(&mut document, &fields.logger, "logger", || {
            record.logger_name.clone()
        })?;
        insert_if(
            &mut document,
            &fields.logger_short_name,
            "logger short name",
            || logger_short_name(&record.logger_name).to_string(),
        )?;
        insert_if(&mut document, &fields.thread, "thread", || {
            record.thread_name.clone()
        })?;
        insert_if(&mut document, &fields.host, "host", || record.host_name.clone())?;

        if let Some(exception) = &record.exception {
            insert_if(&mut document, &fields.stacktrace, "stacktrace", || {
                truncate_chars(&exception.printed_stack_trace(), self.stacktrace_max_length)
            })?;
        }

        if fields.context_map.include {
            if let Some(context_map) = &record.context_map {
                let prefix = prefix(&fields.context_map.name);
                for (key, value) in context_map {
                    document.insert(format!("{prefix}{key}"), value.clone());
                }
            }
        }

        insert_if(&mut document, &fields.marker, "marker", || {
            record.marker.clone().unwrap_or_default()
        })?;
        insert_if(&mut document, &fields.nested_context, "nested context", || {
            record.nested_context.clone().unwrap_or_default()
        })?;

        if fields.environment.include {
            if let Some(environment) = &record.environment {
                add_environment(&mut document, &fields, environment);
            }
        }

        Ok(document)
    }

    fn format_timestamp(&self, timestamp: &DateTime<Utc>) -> Value {
        match self.timestamp_format {
            TimestampFormat::MillisSinceEpoch => Value::from(timestamp.timestamp_millis()),
            TimestampFormat::Formatted => {
                let pattern = match self.timestamp_resolution {
                    TimestampResolution::Millis => "%Y-%m-%dT%H:%M:%S%.3f%z",
                    TimestampResolution::Micros => "%Y-%m-%dT%H:%M:%S%.6f%z",
                    TimestampResolution::Nanos => "%Y-%m-%dT%H:%M:%S%.9f%z",
                };
                Value::from(timestamp.format(pattern).to_string())
            }
        }
    }
}

fn add_environment(document: &mut Document, fields: &FieldSettings, info: &EnvironmentInfo) {
    let prefix = prefix(&fields.environment.name);

    document.insert(format!("{prefix}namespace"), info.namespace.clone());
    document.insert(format!("{prefix}podName"), info.pod_name.clone());
    document.insert(format!("{prefix}podIp"), info.pod_ip.clone());
    document.insert(format!("{prefix}startTime"), info.start_time.clone());

    let optional: [(&str, Option<Value>); 9] = [
        ("podUid", info.pod_uid.clone().map(Value::from)),
        ("restartCount", info.restart_count.map(Value::from)),
        ("containerName", info.container_name.clone().map(Value::from)),
        ("containerId", info.container_id.clone().map(Value::from)),
        ("imageName", info.image_name.clone().map(Value::from)),
        ("imageId", info.image_id.clone().map(Value::from)),
        ("nodeIp", info.node_ip.clone().map(Value::from)),
        ("node", info.node_name.clone().map(Value::from)),
        ("clusterName", info.cluster_name.clone().map(Value::from)),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            document.insert(format!("{prefix}{name}"), value);
        }
    }

    if fields.environment_labels.include {
        let labels_prefix = format!("{prefix}{}", self::prefix(&fields.environment_labels.name));
        for (key, value) in &info.labels {
            document.insert(format!("{labels_prefix}{}", field_key(key)), value.clone());
        }
    }

    if fields.environment_annotations.include {
        let annotations_prefix = format!(
            "{prefix}{}",
            self::prefix(&fields.environment_annotations.name)
        );
        for (key, value) in &info.annotations {
            document.insert(
                format!("{annotations_prefix}{}", field_key(key)),
                value.clone(),
            );
        }
    }
}

fn insert_if(
    document: &mut Document,
    setting: &FieldSetting,
    what: &str,
    value: impl FnOnce() -> String,
) -> Result<(), Error> {
    if setting.include {
        document.insert(required_name(&setting.name, what)?, value());
    }
    Ok(())
}

fn required_name<'a>(name: &'a str, what: &str) -> Result<&'a str, Error> {
    if name.trim().is_empty() {
        Err(Error::Mapping(format!("field name for {what} is blank")))
    } else {
        Ok(name)
    }
}

/// Blank prefixes add nothing, others are joined with a dot.
fn prefix(name: &str) -> String {
    if name.trim().is_empty() {
        String::new()
    } else {
        format!("{name}.")
    }
}

/// Dots denote nested objects in the index, so they cannot appear in flattened keys.
fn field_key(key: &str) -> String {
    key.replace('.', "_")
}

/// The part after the last `.`, or the whole name if it has none.
fn logger_short_name(logger_name: &str) -> &str {
    logger_name
        .rfind('.')
        .map_or(logger_name, |index| &logger_name[index + 1..])
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((index, _)) => value[..index].to_string(),
        None => value.to_string(),
    }
}
