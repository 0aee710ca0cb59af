//! Error types for keel-kube

use keel_core::ReleaseStatus;
use std::time::Duration;
use thiserror::Error;

use crate::hooks::HookEvent;
use crate::release::Release;

/// Result type for keel-kube operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Errors raised by the release engine
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReleaseError {
    #[error("no chart provided")]
    MissingChart,

    #[error("no release name provided")]
    MissingRelease,

    #[error("invalid revision {version} for release '{name}': {reason}")]
    InvalidRevision {
        name: String,
        version: u32,
        reason: String,
    },

    #[error(
        "invalid release name '{0}': names must match ^(([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9])+$ and be at most 53 characters"
    )]
    InvalidName(String),

    #[error("release name '{name}' exceeds max length of {max}")]
    NameTooLong { name: String, max: usize },

    #[error("a release named '{0}' is in use, cannot re-use a name that is still in use")]
    NameInUse(String),

    /// The name is taken; the message tells the user how to free it
    #[error(
        "a release named '{0}' already exists.\nRun: keel history {0}\nto see the release status, or\nRun: keel uninstall --purge {0}\nto remove it"
    )]
    ReleaseExists(String),

    #[error("no available release name found after {0} attempts")]
    NameExhausted(u32),

    #[error("release '{0}' not found")]
    ReleaseNotFound(String),

    #[error("release '{0}' is already deleted")]
    AlreadyDeleted(String),

    #[error("another operation ({status}) is in progress for release '{name}'")]
    OperationInProgress { name: String, status: ReleaseStatus },

    #[error("YAML parse error on {path}: {message}")]
    ManifestParse { path: String, message: String },

    #[error("apiVersion \"{api_version}\" in {path} is not available")]
    UnsupportedApiVersion { api_version: String, path: String },

    #[error("chart incompatible: {0}")]
    IncompatibleChart(String),

    #[error("cluster discovery failed: {0}")]
    Discovery(String),

    #[error("render error: {0}")]
    Render(#[from] keel_engine::EngineError),

    #[error("values error: {0}")]
    Values(String),

    #[error("hook '{hook}' failed during {event}: {message}")]
    HookFailed {
        hook: String,
        event: HookEvent,
        message: String,
    },

    #[error("cluster operation failed: {0}")]
    Cluster(String),

    #[error("operation timed out after {}", humantime_serde::re::humantime::format_duration(*.0))]
    Timeout(Duration),

    #[error("storage error: {0}")]
    Storage(String),

    /// A record was read in a legacy format. `migrated` holds the upgraded
    /// release; persisting it repairs the store.
    #[error(
        "release '{}' revision {} is stored in an outdated format",
        .migrated.name,
        .migrated.version
    )]
    OutOfDate { migrated: Box<Release> },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("remote executor error: {0}")]
    Remote(#[from] reqwest::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ReleaseError {
    fn from(e: serde_json::Error) -> Self {
        ReleaseError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for ReleaseError {
    fn from(e: serde_yaml::Error) -> Self {
        ReleaseError::Serialization(e.to_string())
    }
}

impl From<keel_core::CoreError> for ReleaseError {
    fn from(e: keel_core::CoreError) -> Self {
        match e {
            keel_core::CoreError::Io(io) => ReleaseError::Io(io),
            other => ReleaseError::Values(other.to_string()),
        }
    }
}

impl ReleaseError {
    /// Errors raised before anything touches the cluster
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ReleaseError::MissingChart
                | ReleaseError::MissingRelease
                | ReleaseError::InvalidRevision { .. }
                | ReleaseError::InvalidName(_)
                | ReleaseError::NameTooLong { .. }
                | ReleaseError::NameInUse(_)
                | ReleaseError::ReleaseExists(_)
                | ReleaseError::NameExhausted(_)
                | ReleaseError::ManifestParse { .. }
                | ReleaseError::UnsupportedApiVersion { .. }
                | ReleaseError::IncompatibleChart(_)
                | ReleaseError::Render(_)
                | ReleaseError::Values(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            ReleaseError::ReleaseNotFound(_) => true,
            ReleaseError::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }
}
