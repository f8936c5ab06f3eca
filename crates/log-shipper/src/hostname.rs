// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hostname detection

use std::env;
use std::sync::OnceLock;
use tracing::warn;

/// Get the name of the host records are logged on.
///
/// Tries, in order:
/// 1. `LOG_SHIPPER_HOSTNAME` environment variable
/// 2. `HOSTNAME` environment variable
/// 3. System hostname via `nix::unistd::gethostname()`
/// 4. `"unknown"`
#[must_use]
pub fn get_hostname() -> String {
    for var in ["LOG_SHIPPER_HOSTNAME", "HOSTNAME"] {
        if let Ok(hostname) = env::var(var) {
            if !hostname.is_empty() {
                return hostname;
            }
        }
    }

    match nix::unistd::gethostname() {
        Ok(hostname) => {
            if let Some(hostname) = hostname.to_str() {
                if !hostname.is_empty() {
                    return hostname.to_string();
                }
            }
        }
        Err(e) => {
            warn!("Failed to get system hostname: {}", e);
        }
    }

    warn!("Could not determine hostname, using 'unknown'");
    "unknown".to_string()
}

/// [`get_hostname`], resolved once per process.
#[must_use]
pub fn cached_hostname() -> &'static str {
    static HOSTNAME: OnceLock<String> = OnceLock::new();
    HOSTNAME.get_or_init(get_hostname)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_get_hostname_not_empty() {
        assert!(!get_hostname().is_empty());
        assert!(!cached_hostname().is_empty());
    }

    #[test]
    #[serial]
    fn test_hostname_override() {
        env::set_var("LOG_SHIPPER_HOSTNAME", "test-hostname-override");
        let hostname = get_hostname();
        env::remove_var("LOG_SHIPPER_HOSTNAME");

        assert_eq!(hostname, "test-hostname-override");
    }
}
