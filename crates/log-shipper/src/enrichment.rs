// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Environment enrichment: information about the pod the process runs in, attached to
//! every record once it is known.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::error::Error;
use crate::hostname::get_hostname;
use crate::record::EnvironmentInfo;
use crate::reporter::ErrorReporter;

pub const SERVICE_ACCOUNT_NAMESPACE_FILE: &str = "/run/secrets/kubernetes.io/serviceaccount/namespace";
pub const DEFAULT_PODINFO_DIR: &str = "/etc/podinfo";

#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    /// `Ok(None)` means there is nothing to enrich with, e.g. not running in a cluster.
    async fn retrieve(&self) -> Result<Option<EnvironmentInfo>, Error>;
}

/// Always returns the same environment info.
#[derive(Debug, Clone, Default)]
pub struct StaticEnrichmentSource {
    info: Option<EnvironmentInfo>,
}

impl StaticEnrichmentSource {
    #[must_use]
    pub fn new(info: Option<EnvironmentInfo>) -> Self {
        Self { info }
    }
}

#[async_trait]
impl EnrichmentSource for StaticEnrichmentSource {
    async fn retrieve(&self) -> Result<Option<EnvironmentInfo>, Error> {
        Ok(self.info.clone())
    }
}

/// Reads pod information exposed through the Kubernetes downward API.
///
/// The namespace comes from `POD_NAMESPACE` or the service account namespace file; without
/// either the process is not considered to run in Kubernetes. Other fields are read from
/// `POD_NAME` (falls back to the hostname), `POD_IP`, `POD_UID`, `POD_START_TIME`,
/// `NODE_NAME`, `NODE_IP`, `CONTAINER_NAME`, `CONTAINER_IMAGE` and `CLUSTER_NAME`. Labels
/// and annotations are read from `labels` and `annotations` files in the podinfo
/// directory when it is mounted.
#[derive(Debug, Clone)]
pub struct DownwardApiSource {
    namespace_file: PathBuf,
    podinfo_dir: PathBuf,
}

impl Default for DownwardApiSource {
    fn default() -> Self {
        Self::new(SERVICE_ACCOUNT_NAMESPACE_FILE, DEFAULT_PODINFO_DIR)
    }
}

impl DownwardApiSource {
    #[must_use]
    pub fn new(namespace_file: impl Into<PathBuf>, podinfo_dir: impl Into<PathBuf>) -> Self {
        Self {
            namespace_file: namespace_file.into(),
            podinfo_dir: podinfo_dir.into(),
        }
    }

    async fn namespace(&self) -> Result<Option<String>, Error> {
        if let Some(namespace) = env_value("POD_NAMESPACE") {
            return Ok(Some(namespace));
        }
        if !exists(&self.namespace_file).await? {
            debug!(
                "Not running in Kubernetes, {} does not exist",
                self.namespace_file.display()
            );
            return Ok(None);
        }
        let namespace = read_file(&self.namespace_file).await?;
        Ok(Some(namespace.trim().to_string()))
    }

    async fn podinfo_map(&self, name: &str) -> Result<BTreeMap<String, String>, Error> {
        let path = self.podinfo_dir.join(name);
        if !exists(&path).await? {
            return Ok(BTreeMap::new());
        }
        Ok(parse_podinfo(&read_file(&path).await?))
    }
}

#[async_trait]
impl EnrichmentSource for DownwardApiSource {
    async fn retrieve(&self) -> Result<Option<EnvironmentInfo>, Error> {
        let Some(namespace) = self.namespace().await? else {
            return Ok(None);
        };

        Ok(Some(EnvironmentInfo {
            namespace,
            pod_name: env_value("POD_NAME").unwrap_or_else(get_hostname),
            pod_ip: env_value("POD_IP").unwrap_or_default(),
            start_time: env_value("POD_START_TIME")
                .unwrap_or_else(|| Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            pod_uid: env_value("POD_UID"),
            restart_count: None,
            container_name: env_value("CONTAINER_NAME"),
            container_id: None,
            image_name: env_value("CONTAINER_IMAGE"),
            image_id: None,
            node_ip: env_value("NODE_IP"),
            node_name: env_value("NODE_NAME"),
            cluster_name: env_value("CLUSTER_NAME"),
            labels: self.podinfo_map("labels").await?,
            annotations: self.podinfo_map("annotations").await?,
        }))
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

async fn exists(path: &Path) -> Result<bool, Error> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| Error::Enrichment(format!("could not access {}: {e}", path.display())))
}

async fn read_file(path: &Path) -> Result<String, Error> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Enrichment(format!("could not read {}: {e}", path.display())))
}

/// Parses the downward API `key="value"` line format.
fn parse_podinfo(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some((key.trim().to_string(), value.replace("\\\"", "\"")))
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Retrieves environment info in its own task, bounded by `timeout`.
///
/// Errors, panics and timeouts are reported and yield `None`, so callers always get an
/// answer.
pub async fn retrieve_with_timeout(
    source: Arc<dyn EnrichmentSource>,
    timeout: Duration,
    reporter: &dyn ErrorReporter,
) -> Option<EnvironmentInfo> {
    let mut retrieval = tokio::spawn(async move { source.retrieve().await });

    match tokio::time::timeout(timeout, &mut retrieval).await {
        Ok(Ok(Ok(info))) => info,
        Ok(Ok(Err(e))) => {
            reporter.report_error(
                "Could not retrieve environment info, no pod info will be added to logs",
                Some(&e),
            );
            None
        }
        Ok(Err(join_error)) => {
            reporter.report_error(
                "Could not retrieve environment info, no pod info will be added to logs",
                Some(&Error::Enrichment(join_error.to_string())),
            );
            None
        }
        Err(_) => {
            retrieval.abort();
            reporter.report_error(
                "Could not retrieve environment info, no pod info will be added to logs",
                Some(&Error::Enrichment(format!(
                    "timed out after {} ms",
                    timeout.as_millis()
                ))),
            );
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::reporter::test_support::RecordingReporter;
    use serial_test::serial;

    const POD_VARS: [&str; 10] = [
        "POD_NAMESPACE",
        "POD_NAME",
        "POD_IP",
        "POD_UID",
        "POD_START_TIME",
        "NODE_NAME",
        "NODE_IP",
        "CONTAINER_NAME",
        "CONTAINER_IMAGE",
        "CLUSTER_NAME",
    ];

    fn clear_pod_env() {
        for var in POD_VARS {
            env::remove_var(var);
        }
    }

    struct FailingSource;

    #[async_trait]
    impl EnrichmentSource for FailingSource {
        async fn retrieve(&self) -> Result<Option<EnvironmentInfo>, Error> {
            Err(Error::Enrichment("api server unreachable".to_string()))
        }
    }

    struct PanickingSource;

    #[async_trait]
    impl EnrichmentSource for PanickingSource {
        async fn retrieve(&self) -> Result<Option<EnvironmentInfo>, Error> {
            panic!("boom")
        }
    }

    struct SlowSource;

    #[async_trait]
    impl EnrichmentSource for SlowSource {
        async fn retrieve(&self) -> Result<Option<EnvironmentInfo>, Error> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Some(EnvironmentInfo::default()))
        }
    }

    #[test]
    fn test_parse_podinfo() {
        let parsed = parse_podinfo(
            "app=\"orders\"\napp.kubernetes.io/version=\"1.2.3\"\nquoted=\"say \\\"hi\\\"\"\ngarbage\n",
        );

        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed["app"], "orders");
        assert_eq!(parsed["app.kubernetes.io/version"], "1.2.3");
        assert_eq!(parsed["quoted"], "say \"hi\"");
    }

    #[tokio::test]
    #[serial]
    async fn test_downward_api_outside_kubernetes() {
        clear_pod_env();
        let dir = tempfile::tempdir().unwrap();
        let source = DownwardApiSource::new(dir.path().join("namespace"), dir.path());

        assert_eq!(source.retrieve().await.unwrap(), None);
    }

    #[tokio::test]
    #[serial]
    async fn test_downward_api_reads_env_and_files() {
        clear_pod_env();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("namespace"), "payments\n").unwrap();
        std::fs::write(dir.path().join("labels"), "app=\"orders\"\n").unwrap();
        env::set_var("POD_NAME", "orders-7d9f");
        env::set_var("POD_IP", "10.0.0.12");
        env::set_var("NODE_NAME", "node-a");

        let source = DownwardApiSource::new(dir.path().join("namespace"), dir.path());
        let info = source.retrieve().await.unwrap().unwrap();
        clear_pod_env();

        assert_eq!(info.namespace, "payments");
        assert_eq!(info.pod_name, "orders-7d9f");
        assert_eq!(info.pod_ip, "10.0.0.12");
        assert_eq!(info.node_name.as_deref(), Some("node-a"));
        assert_eq!(info.cluster_name, None);
        assert_eq!(info.labels["app"], "orders");
        assert!(info.annotations.is_empty());
        assert!(!info.start_time.is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_unreadable_namespace_file_is_an_error() {
        clear_pod_env();
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("namespace")).unwrap();

        let source = DownwardApiSource::new(dir.path().join("namespace"), dir.path());
        let result = source.retrieve().await;

        assert!(matches!(result, Err(Error::Enrichment(_))));
    }

    #[tokio::test(flavor = "current_thread")]
    #[serial]
    async fn test_retrieve_in_spawned_task_with_podinfo() {
        clear_pod_env();
        env::set_var("POD_NAMESPACE", "payments");
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("annotations"), "team=\"orders\"\n").unwrap();
        let source: Arc<dyn EnrichmentSource> = Arc::new(DownwardApiSource::new(
            dir.path().join("namespace"),
            dir.path(),
        ));
        let reporter = RecordingReporter::default();

        let info = retrieve_with_timeout(source, Duration::from_secs(5), &reporter).await;
        clear_pod_env();

        let info = info.unwrap();
        assert_eq!(info.namespace, "payments");
        assert_eq!(info.annotations["team"], "orders");
        assert!(reporter.errors().is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_pod_namespace_env_wins() {
        clear_pod_env();
        env::set_var("POD_NAMESPACE", "from-env");
        let dir = tempfile::tempdir().unwrap();

        let source = DownwardApiSource::new(dir.path().join("namespace"), dir.path());
        let info = source.retrieve().await.unwrap().unwrap();
        clear_pod_env();

        assert_eq!(info.namespace, "from-env");
    }

    #[tokio::test]
    async fn test_static_source() {
        let info = EnvironmentInfo {
            namespace: "prod".to_string(),
            ..EnvironmentInfo::default()
        };
        let source = StaticEnrichmentSource::new(Some(info.clone()));

        assert_eq!(source.retrieve().await.unwrap(), Some(info));
    }

    #[tokio::test]
    async fn test_retrieve_with_timeout_reports_errors() {
        let reporter = RecordingReporter::default();

        let info =
            retrieve_with_timeout(Arc::new(FailingSource), Duration::from_secs(1), &reporter).await;

        assert_eq!(info, None);
        assert_eq!(
            reporter.error_categories(),
            vec![Some(ErrorCategory::Enrichment)]
        );
    }

    #[tokio::test]
    async fn test_retrieve_with_timeout_survives_panics() {
        let reporter = RecordingReporter::default();

        let info =
            retrieve_with_timeout(Arc::new(PanickingSource), Duration::from_secs(1), &reporter)
                .await;

        assert_eq!(info, None);
        assert_eq!(reporter.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_with_timeout_times_out() {
        let reporter = RecordingReporter::default();

        let info =
            retrieve_with_timeout(Arc::new(SlowSource), Duration::from_millis(20), &reporter).await;

        assert_eq!(info, None);
        assert_eq!(
            reporter.error_categories(),
            vec![Some(ErrorCategory::Enrichment)]
        );
    }
}
