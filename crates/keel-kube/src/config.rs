//! Server configuration
//!
//! Read from `~/.config/keel/config.yaml` when present:
//!
//! ```yaml
//! listDefaultLimit: 512
//! maxHistory: 10
//! timeout: 5m
//! unknownHookPolicy: drop
//! executor:
//!   type: remote
//!   endpoint: http://agent.keel-system:8080
//! storage:
//!   backend:
//!     type: configmaps
//!     namespace: keel-system
//!   compression:
//!     method: zstd
//!     level: 3
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::capabilities::{Discovery, KubeDiscovery};
use crate::error::{ReleaseError, Result};
use crate::executor::{ClusterExecutor, LocalExecutor, RemoteExecutor};
use crate::manifest::UnknownHookPolicy;
use crate::storage::{CompressionMethod, ConfigMapsDriver, FileDriver, MemoryDriver, StorageDriver};

/// Overrides the file backend's directory
pub const STORAGE_DIR_ENV: &str = "KEEL_STORAGE_DIR";

pub const DEFAULT_LIST_LIMIT: usize = 512;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Page size of `list` when the request names none
    #[serde(default = "default_list_limit")]
    pub list_default_limit: usize,

    /// Revisions kept per release; 0 keeps everything
    #[serde(default)]
    pub max_history: usize,

    /// Default bound on cluster waits
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default)]
    pub unknown_hook_policy: UnknownHookPolicy,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            list_default_limit: default_list_limit(),
            max_history: 0,
            timeout: default_timeout(),
            unknown_hook_policy: UnknownHookPolicy::default(),
            executor: ExecutorConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Where cluster calls are executed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExecutorConfig {
    /// In-process, with the ambient kubeconfig
    #[default]
    Local,
    /// Through a release agent
    Remote { endpoint: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    #[serde(default)]
    pub compression: CompressionMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageBackend {
    /// Local directory; `None` means the platform data directory
    File {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    ConfigMaps {
        namespace: String,
    },
    Memory,
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::File { path: None }
    }
}

impl ServerConfig {
    /// Load from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| ReleaseError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "loaded server configuration");
        Ok(config)
    }

    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| ReleaseError::Config("could not determine config directory".into()))?;
        Ok(dir.join("keel").join("config.yaml"))
    }

    /// `KEEL_STORAGE_DIR` forces the file backend at that directory
    fn apply_env(&mut self) {
        if let Some(dir) = std::env::var_os(STORAGE_DIR_ENV).filter(|d| !d.is_empty()) {
            self.storage.backend = StorageBackend::File {
                path: Some(PathBuf::from(dir)),
            };
        }
    }

    /// Directory used by the file backend
    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let StorageBackend::File { path: Some(path) } = &self.storage.backend {
            return Ok(path.clone());
        }
        let dir = dirs::data_dir()
            .ok_or_else(|| ReleaseError::Config("could not determine data directory".into()))?;
        Ok(dir.join("keel").join("releases"))
    }

    /// Build the configured history backend
    pub async fn build_storage(&self) -> Result<Arc<dyn StorageDriver>> {
        let compression = self.storage.compression;
        Ok(match &self.storage.backend {
            StorageBackend::File { .. } => {
                Arc::new(FileDriver::new(self.storage_dir()?, compression)?)
            }
            StorageBackend::ConfigMaps { namespace } => {
                let client = kube::Client::try_default().await?;
                Arc::new(ConfigMapsDriver::new(client, namespace.clone(), compression))
            }
            StorageBackend::Memory => Arc::new(MemoryDriver::new()),
        })
    }

    /// Build the configured execution strategy
    pub async fn build_executor(&self) -> Result<Arc<dyn ClusterExecutor>> {
        Ok(match &self.executor {
            ExecutorConfig::Local => Arc::new(LocalExecutor::try_default().await?),
            ExecutorConfig::Remote { endpoint } => Arc::new(RemoteExecutor::new(endpoint.clone())?),
        })
    }

    /// Discovery against the cluster of the ambient kubeconfig
    pub async fn build_discovery(&self) -> Result<Arc<dyn Discovery>> {
        let client = kube::Client::try_default().await?;
        Ok(Arc::new(KubeDiscovery::new(client)))
    }
}
