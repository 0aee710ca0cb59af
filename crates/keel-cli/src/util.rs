//! Shared helpers for CLI commands

use keel_core::{Config, Values, parse_set_values};
use keel_engine::EngineYard;
use keel_kube::{RecordingExecutor, ReleaseServer, ServerConfig, StaticDiscovery};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CliError, Result};

/// Parse a human duration such as `90s` or `5m`
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Load the server configuration from `path`, or from the default location
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig> {
    let config = match path {
        Some(path) => ServerConfig::load_from(path)?,
        None => ServerConfig::load()?,
    };
    Ok(config)
}

/// Merge `-f` files then `--set` overrides into the raw configuration
/// stored with a release. Nothing supplied gives a blank configuration.
pub fn user_values(values_files: &[PathBuf], set_values: &[String]) -> Result<Config> {
    if values_files.is_empty() && set_values.is_empty() {
        return Ok(Config::default());
    }

    let mut values = Values::new();
    for file in values_files {
        let overlay = Values::from_file(file).map_err(|e| {
            CliError::input(format!("failed to load values file {}: {}", file.display(), e))
        })?;
        values.merge(&overlay);
    }
    if !set_values.is_empty() {
        let overrides = parse_set_values(set_values)
            .map_err(|e| CliError::input(format!("failed to parse --set values: {}", e)))?;
        values.merge(&overrides);
    }
    Ok(Config::from_values(&values)?)
}

/// A server connected to the configured cluster, storage and executor
pub async fn connect(config: ServerConfig) -> Result<ReleaseServer> {
    tracing::debug!(executor = ?config.executor, "connecting to cluster");
    Ok(ReleaseServer::from_config(config).await?)
}

/// A server for history queries. It reads the configured storage and never
/// reaches the cluster.
pub async fn offline(config: ServerConfig) -> Result<ReleaseServer> {
    let storage = config.build_storage().await?;
    Ok(ReleaseServer::new(
        storage,
        Arc::new(RecordingExecutor::new()),
        Arc::new(StaticDiscovery::default()),
        EngineYard::default(),
        config,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_no_values_is_blank() {
        assert!(user_values(&[], &[]).unwrap().is_blank());
    }

    #[test]
    fn test_set_overrides_files() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("values.yaml");
        std::fs::write(&file, "replicas: 2\nimage: nginx\n").unwrap();

        let config = user_values(&[file], &["replicas=4".to_string()]).unwrap();
        let values = config.parse().unwrap();
        assert_eq!(values.get("replicas"), Some(&serde_json::json!(4)));
        assert_eq!(values.get("image"), Some(&serde_json::json!("nginx")));
    }

    #[test]
    fn test_missing_values_file() {
        let err = user_values(&[PathBuf::from("/nonexistent/values.yaml")], &[]).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }
}
