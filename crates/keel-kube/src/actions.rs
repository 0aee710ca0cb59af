//! Requests accepted by the release server

use keel_core::{Chart, Config, ReleaseStatus};
use serde::Serialize;
use std::time::Duration;

use crate::release::{Release, ReleaseInfo};

/// Request to install a chart as a new release
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    pub chart: Option<Chart>,

    /// Raw user configuration, stored verbatim with the release
    pub values: Config,

    /// Release name. Empty means generate one.
    pub name: String,

    pub namespace: String,

    /// Render and classify only; no cluster calls, no history writes
    pub dry_run: bool,

    pub disable_hooks: bool,

    /// Allow taking over the name of a deleted or failed release
    pub reuse_name: bool,

    /// Bound on every wait. `None` uses the server default.
    pub timeout: Option<Duration>,
}

impl InstallRequest {
    pub fn new(chart: Chart, namespace: impl Into<String>) -> Self {
        Self {
            chart: Some(chart),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_values(mut self, values: Config) -> Self {
        self.values = values;
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Request to upgrade an existing release to a new chart or configuration
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub name: String,
    pub chart: Option<Chart>,
    pub values: Config,

    /// Start again from chart defaults, ignoring the previous configuration
    pub reset_values: bool,

    /// Carry the previous effective values forward, ignoring `values`
    pub reuse_values: bool,

    pub dry_run: bool,
    pub disable_hooks: bool,

    /// Restart pods of updated workloads
    pub recreate: bool,

    pub timeout: Option<Duration>,
}

impl UpdateRequest {
    pub fn new(name: impl Into<String>, chart: Chart) -> Self {
        Self {
            name: name.into(),
            chart: Some(chart),
            ..Default::default()
        }
    }

    pub fn with_values(mut self, values: Config) -> Self {
        self.values = values;
        self
    }
}

/// Request to roll a release back to an earlier revision
#[derive(Debug, Clone, Default)]
pub struct RollbackRequest {
    pub name: String,

    /// Target revision. 0 means the one before the current.
    pub version: u32,

    pub dry_run: bool,
    pub disable_hooks: bool,
    pub recreate: bool,
    pub timeout: Option<Duration>,
}

impl RollbackRequest {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            ..Default::default()
        }
    }
}

/// Request to remove a release from the cluster
#[derive(Debug, Clone, Default)]
pub struct UninstallRequest {
    pub name: String,

    /// Also remove every stored revision
    pub purge: bool,

    pub disable_hooks: bool,
    pub timeout: Option<Duration>,
}

impl UninstallRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn purge(mut self) -> Self {
        self.purge = true;
        self
    }
}

/// Query for the latest revision of every release
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    /// Maximum number of releases returned. 0 uses the server default.
    pub limit: usize,

    /// Skip releases whose name sorts before this one
    pub offset: Option<String>,

    /// Regular expression matched against release names
    pub filter: Option<String>,

    /// Only releases whose latest revision has one of these statuses.
    /// Empty means `Deployed`.
    pub status_codes: Vec<ReleaseStatus>,

    pub namespace: Option<String>,
}

/// Status of one revision, without its chart or manifest
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub name: String,
    pub namespace: String,
    pub version: u32,
    pub info: ReleaseInfo,
    pub notes: Option<String>,
}

impl From<&Release> for StatusResponse {
    fn from(release: &Release) -> Self {
        Self {
            name: release.name.clone(),
            namespace: release.namespace.clone(),
            version: release.version,
            info: release.info.clone(),
            notes: release.notes.clone(),
        }
    }
}

/// One page of a release listing
#[derive(Debug, Clone, Default)]
pub struct ListResponse {
    pub releases: Vec<Release>,

    /// Name to pass as `offset` for the next page
    pub next: Option<String>,

    /// Number of releases matching before paging
    pub total: usize,
}

/// Outcome of a release test run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    pub release: String,
    pub passed: bool,
    /// Hooks that ran, in execution order
    pub executed: usize,
    pub message: Option<String>,
}
