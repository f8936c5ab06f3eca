// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use figment::providers::{Format, Yaml};

use crate::config::{merge_provider, ConfigSource, Settings};
use crate::error::Error;

#[derive(Debug, PartialEq, Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct YamlConfigSource {
    pub path: PathBuf,
}

impl ConfigSource for YamlConfigSource {
    fn load(&self, settings: &mut Settings) -> Result<(), Error> {
        if !self.path.exists() {
            return Err(Error::Config(format!(
                "Config file {} does not exist",
                self.path.display()
            )));
        }
        merge_provider(settings, Yaml::file(self.path.clone())).map_err(|e| {
            Error::Config(format!("Failed to parse config from yaml file: {e}"))
        })
    }
}

#[cfg_attr(coverage_nightly, coverage(off))] // Test modules skew coverage metrics
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r"
host: http://localhost:9200
username: elastic
password: changeme
disable_certificate_check: true
index_name: logs-%date{{yyyy.MM.dd}}
stacktrace_max_length: 500
fields:
  context_map:
    name: mdc
  environment:
    include: true
    name: kubernetes
"
        )
        .expect("write");

        let source = YamlConfigSource {
            path: file.path().to_path_buf(),
        };
        let mut settings = Settings::default();
        source.load(&mut settings).expect("load");

        assert_eq!(settings.host, "http://localhost:9200");
        assert_eq!(settings.username.as_deref(), Some("elastic"));
        assert_eq!(settings.password.as_deref(), Some("changeme"));
        assert!(settings.disable_certificate_check);
        assert_eq!(settings.index_name, "logs-%date{yyyy.MM.dd}");
        assert_eq!(settings.stacktrace_max_length, 500);
        assert_eq!(settings.fields.context_map.name, "mdc");
        assert!(settings.fields.context_map.include);
        assert!(settings.fields.environment.include);
        assert_eq!(settings.fields.environment.name, "kubernetes");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let source = YamlConfigSource {
            path: PathBuf::from("/definitely/not/here/log-shipper.yaml"),
        };
        assert!(matches!(
            source.load(&mut Settings::default()),
            Err(Error::Config(_))
        ));
    }
}
