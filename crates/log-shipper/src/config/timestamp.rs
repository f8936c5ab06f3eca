// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Timestamp encodings for shipped documents.
//!
//! Both enums parse case-insensitively from strings and never fail deserialization: an
//! unknown value logs an error and falls back to the default, so a typo in the config does
//! not stop logs from being shipped.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::error;

/// Fractional second precision of formatted timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TimestampResolution {
    #[default]
    Millis,
    Micros,
    Nanos,
}

impl AsRef<str> for TimestampResolution {
    fn as_ref(&self) -> &str {
        match self {
            TimestampResolution::Millis => "millis",
            TimestampResolution::Micros => "micros",
            TimestampResolution::Nanos => "nanos",
        }
    }
}

impl FromStr for TimestampResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "millis" | "milliseconds" => Ok(TimestampResolution::Millis),
            "micros" | "microseconds" => Ok(TimestampResolution::Micros),
            "nanos" | "nanoseconds" => Ok(TimestampResolution::Nanos),
            _ => Err(format!(
                "Invalid timestamp resolution: '{s}'. Valid values are: millis, micros, nanos",
            )),
        }
    }
}

/// How the timestamp field is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    MillisSinceEpoch,
    /// ISO-8601 with an explicit `+0000` offset, e.g. `2024-03-01T12:00:00.123+0000`.
    #[default]
    Formatted,
}

impl AsRef<str> for TimestampFormat {
    fn as_ref(&self) -> &str {
        match self {
            TimestampFormat::MillisSinceEpoch => "millis-since-epoch",
            TimestampFormat::Formatted => "formatted",
        }
    }
}

impl FromStr for TimestampFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "millis" | "millis-since-epoch" => Ok(TimestampFormat::MillisSinceEpoch),
            "formatted" | "formatted-date-time" => Ok(TimestampFormat::Formatted),
            _ => Err(format!(
                "Invalid timestamp format: '{s}'. Valid values are: millis-since-epoch, formatted",
            )),
        }
    }
}

macro_rules! lenient_string_enum {
    ($ty:ty, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_ref())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_ref())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = Value::deserialize(deserializer)?;
                if let Value::String(s) = value {
                    match <$ty>::from_str(&s) {
                        Ok(parsed) => Ok(parsed),
                        Err(e) => {
                            error!("{}", e);
                            Ok(<$ty>::default())
                        }
                    }
                } else {
                    error!("Expected a string for {}, got {:?}", $what, value);
                    Ok(<$ty>::default())
                }
            }
        }
    };
}

lenient_string_enum!(TimestampResolution, "timestamp resolution");
lenient_string_enum!(TimestampFormat, "timestamp format");

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolution_from_str_is_case_insensitive() {
        assert_eq!(
            TimestampResolution::from_str("MICROS").unwrap(),
            TimestampResolution::Micros
        );
        assert_eq!(
            TimestampResolution::from_str("Nanos").unwrap(),
            TimestampResolution::Nanos
        );
        assert!(TimestampResolution::from_str("seconds").is_err());
    }

    #[test]
    fn test_format_aliases() {
        assert_eq!(
            TimestampFormat::from_str("millis").unwrap(),
            TimestampFormat::MillisSinceEpoch
        );
        assert_eq!(
            TimestampFormat::from_str("MILLIS_SINCE_EPOCH").unwrap(),
            TimestampFormat::MillisSinceEpoch
        );
        assert_eq!(
            TimestampFormat::from_str("formatted").unwrap(),
            TimestampFormat::Formatted
        );
    }

    #[test]
    fn test_invalid_value_deserializes_to_default() {
        let resolution: TimestampResolution = serde_json::from_value(json!("hours")).unwrap();
        assert_eq!(resolution, TimestampResolution::Millis);

        let format: TimestampFormat = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(format, TimestampFormat::Formatted);
    }

    #[test]
    fn test_serializes_as_config_string() {
        assert_eq!(
            serde_json::to_value(TimestampFormat::MillisSinceEpoch).unwrap(),
            json!("millis-since-epoch")
        );
        assert_eq!(
            serde_json::to_value(TimestampResolution::Nanos).unwrap(),
            json!("nanos")
        );
    }
}
