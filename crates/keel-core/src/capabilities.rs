//! Cluster and engine capabilities

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Version of this engine, checked against a chart's `engineVersion` range
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn engine_version() -> Version {
    Version::parse(ENGINE_VERSION).unwrap_or_else(|_| Version::new(0, 0, 0))
}

/// Check whether `version` satisfies the semver requirement `range`.
///
/// An unparseable range is never compatible.
pub fn is_compatible_range(range: &str, version: &Version) -> bool {
    match VersionReq::parse(range.trim()) {
        Ok(req) => req.matches(version),
        Err(e) => {
            tracing::debug!(range, error = %e, "unparseable version range");
            false
        }
    }
}

/// Ordered set of `group/version` strings the cluster serves
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionSet(BTreeSet<String>);

impl VersionSet {
    pub fn new<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(versions.into_iter().map(Into::into).collect())
    }

    /// The set assumed when a cluster reports nothing: just `v1`
    pub fn default_set() -> Self {
        Self::new(["v1"])
    }

    pub fn has(&self, api_version: &str) -> bool {
        self.0.contains(api_version)
    }

    pub fn insert(&mut self, api_version: impl Into<String>) {
        self.0.insert(api_version.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Kubernetes server version as reported by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeVersion {
    pub major: String,
    pub minor: String,
    pub git_version: String,
}

impl Default for KubeVersion {
    fn default() -> Self {
        Self::new("v1.28.0")
    }
}

impl KubeVersion {
    pub fn new(git_version: &str) -> Self {
        let version = git_version.trim_start_matches('v');
        let mut parts = version.split('.');
        Self {
            major: parts.next().unwrap_or("1").to_string(),
            minor: parts.next().unwrap_or("0").to_string(),
            git_version: format!("v{}", version),
        }
    }

    /// The semver form of the git version, without pre-release or build
    /// suffixes (`v1.29.3-gke.100` becomes `1.29.3`)
    pub fn semver(&self) -> Option<Version> {
        let plain = self.git_version.trim_start_matches('v');
        let core = plain.split(['-', '+']).next().unwrap_or(plain);
        Version::parse(core).ok()
    }
}

/// What the target cluster and this engine support. Computed once per
/// operation and handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub kube_version: KubeVersion,
    pub api_versions: VersionSet,
    #[serde(with = "version_string")]
    pub engine_version: Version,
}

impl Capabilities {
    pub fn new(kube_version: KubeVersion, api_versions: VersionSet) -> Self {
        Self {
            kube_version,
            api_versions,
            engine_version: engine_version(),
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::new(KubeVersion::default(), VersionSet::default_set())
    }
}

mod version_string {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Version, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Version, D::Error> {
        let s = String::deserialize(d)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}
