//! The persisted release record

use chrono::{DateTime, Utc};
use keel_core::{Chart, Config, ReleaseStatus};
use serde::{Deserialize, Serialize};

use crate::hooks::Hook;
use crate::manifest::{Manifest, SimpleHead, split_manifests};
use crate::sort::{SortOrder, sort_by_kind};

/// Lifecycle timestamps and status of one revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    pub status: ReleaseStatus,
    pub first_deployed: DateTime<Utc>,
    pub last_deployed: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: String,
}

impl ReleaseInfo {
    pub fn new(status: ReleaseStatus, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            status,
            first_deployed: now,
            last_deployed: now,
            deleted: None,
            description: description.into(),
        }
    }
}

/// One revision of a named release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub name: String,
    pub namespace: String,
    /// Revision number, starting at 1
    pub version: u32,
    pub info: ReleaseInfo,
    /// Snapshot of the chart this revision was rendered from
    pub chart: Chart,
    /// Configuration supplied by the user, verbatim
    #[serde(default)]
    pub config: Config,
    /// Aggregated generic manifests, in install order
    #[serde(default)]
    pub manifest: String,
    #[serde(default)]
    pub hooks: Vec<Hook>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Release {
    /// Key under which this revision is stored
    pub fn storage_key(&self) -> String {
        storage_key(&self.name, self.version)
    }

    pub fn status(&self) -> ReleaseStatus {
        self.info.status
    }

    fn set_status(&mut self, status: ReleaseStatus, description: impl Into<String>) {
        self.info.status = status;
        self.info.description = description.into();
    }

    pub fn mark_deployed(&mut self, description: impl Into<String>) {
        self.set_status(ReleaseStatus::Deployed, description);
        self.info.last_deployed = Utc::now();
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.set_status(ReleaseStatus::Failed, reason);
    }

    pub fn mark_superseded(&mut self) {
        self.set_status(ReleaseStatus::Superseded, "Superseded");
    }

    pub fn mark_deleting(&mut self) {
        self.set_status(ReleaseStatus::Deleting, "Deletion in progress");
    }

    pub fn mark_deleted(&mut self) {
        self.set_status(ReleaseStatus::Deleted, "Deletion complete");
        self.info.deleted = Some(Utc::now());
    }

    /// The generic manifests recorded for this revision, in the given order.
    /// Documents that do not parse are skipped.
    pub fn generic_manifests(&self, order: SortOrder) -> Vec<Manifest> {
        let manifests = split_manifests(&self.manifest)
            .into_iter()
            .filter_map(|doc| {
                let head: SimpleHead = serde_yaml::from_str(&doc).ok()?;
                let path = doc
                    .lines()
                    .find_map(|l| l.strip_prefix("# Source: "))
                    .unwrap_or_default()
                    .to_string();
                Some(Manifest {
                    path,
                    content: doc,
                    head,
                })
            })
            .collect();
        sort_by_kind(manifests, order)
    }
}

pub fn storage_key(name: &str, version: u32) -> String {
    format!("keel.release.v1.{}.v{}", name, version)
}

/// Join generic manifests into the text stored with a release
pub fn aggregate_manifest(manifests: &[Manifest]) -> String {
    let mut out = String::new();
    for m in manifests {
        out.push_str("\n---\n# Source: ");
        out.push_str(&m.path);
        out.push('\n');
        out.push_str(&m.content);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::HeadMetadata;
    use insta::assert_snapshot;
    use keel_core::ChartMetadata;
    use semver::Version;

    fn release() -> Release {
        Release {
            name: "web".into(),
            namespace: "default".into(),
            version: 2,
            info: ReleaseInfo::new(ReleaseStatus::PendingUpgrade, "Upgrading"),
            chart: Chart::new(ChartMetadata::new("web", Version::new(1, 0, 0))),
            config: Config::new("a: 1\n"),
            manifest: String::new(),
            hooks: vec![],
            notes: None,
        }
    }

    fn manifest(path: &str, kind: &str, name: &str) -> Manifest {
        Manifest {
            path: path.into(),
            content: format!("apiVersion: v1\nkind: {kind}\nmetadata:\n  name: {name}"),
            head: SimpleHead {
                api_version: "v1".into(),
                kind: kind.into(),
                metadata: Some(HeadMetadata {
                    name: name.into(),
                    annotations: None,
                }),
            },
        }
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(release().storage_key(), "keel.release.v1.web.v2");
    }

    #[test]
    fn test_state_transitions() {
        let mut rel = release();
        rel.mark_deployed("Upgrade complete");
        assert_eq!(rel.status(), ReleaseStatus::Deployed);
        assert_eq!(rel.info.description, "Upgrade complete");

        rel.mark_deleted();
        assert_eq!(rel.status(), ReleaseStatus::Deleted);
        assert!(rel.info.deleted.is_some());
    }

    #[test]
    fn test_aggregate_manifest() {
        let manifests = vec![
            manifest("web/templates/svc.yaml", "Service", "web"),
            manifest("web/templates/cm.yaml", "ConfigMap", "cfg"),
        ];
        let aggregated = aggregate_manifest(&manifests);
        assert!(aggregated.starts_with("\n---\n# Source: web/templates/svc.yaml\n"));
        assert_snapshot!(aggregated.trim_start(), @r"
        ---
        # Source: web/templates/svc.yaml
        apiVersion: v1
        kind: Service
        metadata:
          name: web
        ---
        # Source: web/templates/cm.yaml
        apiVersion: v1
        kind: ConfigMap
        metadata:
          name: cfg
        ");
    }

    #[test]
    fn test_generic_manifests_from_aggregate() {
        let mut rel = release();
        rel.manifest = aggregate_manifest(&[
            manifest("web/templates/cm.yaml", "ConfigMap", "cfg"),
            manifest("web/templates/svc.yaml", "Service", "web"),
        ]);

        let uninstall = rel.generic_manifests(SortOrder::Uninstall);
        let kinds: Vec<_> = uninstall.iter().map(|m| m.head.kind.as_str()).collect();
        assert_eq!(kinds, vec!["Service", "ConfigMap"]);
        assert_eq!(uninstall[1].path, "web/templates/cm.yaml");
    }

    #[test]
    fn test_serde_round_trip_keeps_config_verbatim() {
        let rel = release();
        let json = serde_json::to_string(&rel).unwrap();
        let back: Release = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rel);
        assert_eq!(back.config.raw, "a: 1\n");
    }
}
