//! Cluster capability discovery

use async_trait::async_trait;
use keel_core::{Capabilities, KubeVersion, VersionSet};
use tracing::debug;

use crate::error::{ReleaseError, Result};

/// An API group and the versions it serves. The core group has an empty name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiGroup {
    pub name: String,
    pub versions: Vec<String>,
}

impl ApiGroup {
    pub fn new(name: impl Into<String>, versions: &[&str]) -> Self {
        Self {
            name: name.into(),
            versions: versions.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Source of cluster version and API group information
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn server_version(&self) -> Result<KubeVersion>;

    async fn server_groups(&self) -> Result<Vec<ApiGroup>>;
}

/// Collect the `group/version` strings a cluster serves.
///
/// A cluster reporting no groups at all is treated as serving only `v1`.
pub async fn get_version_set(discovery: &dyn Discovery) -> Result<VersionSet> {
    let groups = discovery
        .server_groups()
        .await
        .map_err(|e| ReleaseError::Discovery(e.to_string()))?;

    if groups.is_empty() {
        return Ok(VersionSet::default_set());
    }

    let mut set = VersionSet::default();
    for group in &groups {
        for version in &group.versions {
            if group.name.is_empty() {
                set.insert(version.clone());
            } else {
                set.insert(format!("{}/{}", group.name, version));
            }
        }
    }
    Ok(set)
}

/// Assemble the capabilities handed to renderers for one operation
pub async fn resolve_capabilities(discovery: &dyn Discovery) -> Result<Capabilities> {
    let kube_version = discovery
        .server_version()
        .await
        .map_err(|e| ReleaseError::Discovery(e.to_string()))?;
    let api_versions = get_version_set(discovery).await?;
    debug!(
        kube_version = %kube_version.git_version,
        api_versions = api_versions.len(),
        "resolved cluster capabilities"
    );
    Ok(Capabilities::new(kube_version, api_versions))
}

/// Discovery backed by a live API server
#[derive(Clone)]
pub struct KubeDiscovery {
    client: kube::Client,
}

impl KubeDiscovery {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Discovery for KubeDiscovery {
    async fn server_version(&self) -> Result<KubeVersion> {
        let info = self.client.apiserver_version().await?;
        Ok(KubeVersion {
            major: info.major,
            minor: info.minor,
            git_version: info.git_version,
        })
    }

    async fn server_groups(&self) -> Result<Vec<ApiGroup>> {
        let core = self.client.list_core_api_versions().await?;
        let mut groups = vec![ApiGroup {
            name: String::new(),
            versions: core.versions,
        }];

        let list = self.client.list_api_groups().await?;
        for group in list.groups {
            groups.push(ApiGroup {
                name: group.name,
                versions: group.versions.into_iter().map(|v| v.version).collect(),
            });
        }
        Ok(groups)
    }
}

/// Discovery with fixed answers, for offline rendering and tests
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    pub version: KubeVersion,
    pub groups: Vec<ApiGroup>,
    /// When set, every call fails with this message
    pub failure: Option<String>,
}

impl Default for StaticDiscovery {
    fn default() -> Self {
        Self {
            version: KubeVersion::default(),
            groups: vec![
                ApiGroup::new("", &["v1"]),
                ApiGroup::new("apps", &["v1"]),
                ApiGroup::new("batch", &["v1"]),
                ApiGroup::new("networking.k8s.io", &["v1"]),
                ApiGroup::new("rbac.authorization.k8s.io", &["v1"]),
                ApiGroup::new("policy", &["v1"]),
                ApiGroup::new("autoscaling", &["v1", "v2"]),
            ],
            failure: None,
        }
    }
}

impl StaticDiscovery {
    pub fn new(version: KubeVersion, groups: Vec<ApiGroup>) -> Self {
        Self {
            version,
            groups,
            failure: None,
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn server_version(&self) -> Result<KubeVersion> {
        match &self.failure {
            Some(msg) => Err(ReleaseError::Discovery(msg.clone())),
            None => Ok(self.version.clone()),
        }
    }

    async fn server_groups(&self) -> Result<Vec<ApiGroup>> {
        match &self.failure {
            Some(msg) => Err(ReleaseError::Discovery(msg.clone())),
            None => Ok(self.groups.clone()),
        }
    }
}
