//! Release status and the release data exposed to templates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of one release revision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseStatus {
    #[default]
    Unknown,
    Deployed,
    Deleted,
    Deleting,
    Superseded,
    Failed,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
}

impl ReleaseStatus {
    /// An operation on this revision has started and not finished
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::PendingInstall | Self::PendingUpgrade | Self::PendingRollback | Self::Deleting
        )
    }

    /// The release name may be taken over by a new install
    pub fn allows_name_reuse(&self) -> bool {
        matches!(self, Self::Deleted | Self::Failed)
    }
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Deployed => "deployed",
            Self::Deleted => "deleted",
            Self::Deleting => "deleting",
            Self::Superseded => "superseded",
            Self::Failed => "failed",
            Self::PendingInstall => "pending-install",
            Self::PendingUpgrade => "pending-upgrade",
            Self::PendingRollback => "pending-rollback",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ReleaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "deployed" => Ok(Self::Deployed),
            "deleted" => Ok(Self::Deleted),
            "deleting" => Ok(Self::Deleting),
            "superseded" => Ok(Self::Superseded),
            "failed" => Ok(Self::Failed),
            "pending-install" => Ok(Self::PendingInstall),
            "pending-upgrade" => Ok(Self::PendingUpgrade),
            "pending-rollback" => Ok(Self::PendingRollback),
            other => Err(format!("unknown release status '{}'", other)),
        }
    }
}

/// Release information for templates (`release.*`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseOptions {
    pub name: String,
    pub namespace: String,
    pub revision: u32,
    pub is_install: bool,
    pub is_upgrade: bool,
    pub time: DateTime<Utc>,
    /// Always "Keel"
    pub service: String,
}

impl ReleaseOptions {
    pub fn for_install(name: &str, namespace: &str, revision: u32) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            revision,
            is_install: true,
            is_upgrade: false,
            time: Utc::now(),
            service: "Keel".to_string(),
        }
    }

    pub fn for_upgrade(name: &str, namespace: &str, revision: u32) -> Self {
        Self {
            is_install: false,
            is_upgrade: true,
            ..Self::for_install(name, namespace, revision)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_display() {
        for status in [
            ReleaseStatus::Deployed,
            ReleaseStatus::PendingRollback,
            ReleaseStatus::Deleting,
        ] {
            assert_eq!(status.to_string().parse::<ReleaseStatus>().unwrap(), status);
        }
        assert!("sideways".parse::<ReleaseStatus>().is_err());
    }

    #[test]
    fn test_status_serde_is_kebab_case() {
        let json = serde_json::to_string(&ReleaseStatus::PendingUpgrade).unwrap();
        assert_eq!(json, "\"pending-upgrade\"");
    }

    #[test]
    fn test_status_predicates() {
        assert!(ReleaseStatus::PendingInstall.is_pending());
        assert!(!ReleaseStatus::Deployed.is_pending());
        assert!(ReleaseStatus::Failed.allows_name_reuse());
        assert!(!ReleaseStatus::Superseded.allows_name_reuse());
    }
}
