//! In-memory executor that records calls
//!
//! Useful for tests and dry wiring without a cluster. Failures can be
//! scripted per resource name.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::ClusterExecutor;
use crate::error::{ReleaseError, Result};
use crate::manifest::{SimpleHead, split_manifests};

/// One recorded executor call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorCall {
    Validate {
        namespace: String,
        manifest: String,
    },
    Create {
        namespace: String,
        manifest: String,
    },
    Update {
        namespace: String,
        current: String,
        target: String,
        recreate: bool,
    },
    Delete {
        namespace: String,
        manifest: String,
    },
    DeleteAndWait {
        namespace: String,
        manifest: String,
    },
    Watch {
        namespace: String,
        manifest: String,
    },
}

impl ExecutorCall {
    /// Whether the call could change the cluster
    pub fn is_mutation(&self) -> bool {
        !matches!(self, ExecutorCall::Validate { .. } | ExecutorCall::Watch { .. })
    }
}

#[derive(Debug, Default)]
struct Script {
    fail_validation: HashSet<String>,
    fail_create: HashSet<String>,
    fail_readiness: HashSet<String>,
    fail_delete: HashSet<String>,
    fail_update: bool,
}

#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<ExecutorCall>>,
    script: Mutex<Script>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `metadata.name` of every document in a manifest
fn resource_names(manifest: &str) -> Vec<String> {
    split_manifests(manifest)
        .iter()
        .filter_map(|doc| serde_yaml::from_str::<SimpleHead>(doc).ok())
        .filter_map(|head| head.metadata.map(|m| m.name))
        .collect()
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `validate` fail for manifests containing a resource named `name`
    pub fn fail_validation_of(&self, name: &str) {
        lock(&self.script).fail_validation.insert(name.to_string());
    }

    /// Make `create` fail for manifests containing a resource named `name`
    pub fn fail_create_of(&self, name: &str) {
        lock(&self.script).fail_create.insert(name.to_string());
    }

    pub fn fail_readiness_of(&self, name: &str) {
        lock(&self.script).fail_readiness.insert(name.to_string());
    }

    pub fn fail_delete_of(&self, name: &str) {
        lock(&self.script).fail_delete.insert(name.to_string());
    }

    pub fn fail_updates(&self) {
        lock(&self.script).fail_update = true;
    }

    pub fn calls(&self) -> Vec<ExecutorCall> {
        lock(&self.calls).clone()
    }

    pub fn clear(&self) {
        lock(&self.calls).clear();
    }

    /// Names of the resources passed to `create`, in call order
    pub fn created_names(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|call| match call {
                ExecutorCall::Create { manifest, .. } => Some(resource_names(manifest)),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Names of the resources passed to `delete`, in call order
    pub fn deleted_names(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|call| match call {
                ExecutorCall::Delete { manifest, .. } => Some(resource_names(manifest)),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn record(&self, call: ExecutorCall) {
        lock(&self.calls).push(call);
    }

    fn scripted_failure(&self, manifest: &str, pick: fn(&Script) -> &HashSet<String>) -> Option<String> {
        let script = lock(&self.script);
        resource_names(manifest)
            .into_iter()
            .find(|name| pick(&script).contains(name))
    }
}

#[async_trait]
impl ClusterExecutor for RecordingExecutor {
    async fn validate(&self, namespace: &str, manifest: &str) -> Result<()> {
        self.record(ExecutorCall::Validate {
            namespace: namespace.to_string(),
            manifest: manifest.to_string(),
        });
        match self.scripted_failure(manifest, |s| &s.fail_validation) {
            Some(name) => Err(ReleaseError::Cluster(format!("{name} failed validation"))),
            None => Ok(()),
        }
    }

    async fn create(&self, namespace: &str, manifest: &str, _timeout: Duration) -> Result<()> {
        self.record(ExecutorCall::Create {
            namespace: namespace.to_string(),
            manifest: manifest.to_string(),
        });
        match self.scripted_failure(manifest, |s| &s.fail_create) {
            Some(name) => Err(ReleaseError::Cluster(format!("create of {name} rejected"))),
            None => Ok(()),
        }
    }

    async fn update(
        &self,
        namespace: &str,
        current: &str,
        target: &str,
        recreate: bool,
        _timeout: Duration,
    ) -> Result<()> {
        self.record(ExecutorCall::Update {
            namespace: namespace.to_string(),
            current: current.to_string(),
            target: target.to_string(),
            recreate,
        });
        if lock(&self.script).fail_update {
            return Err(ReleaseError::Cluster("update rejected".to_string()));
        }
        Ok(())
    }

    async fn delete(&self, namespace: &str, manifest: &str) -> Result<()> {
        self.record(ExecutorCall::Delete {
            namespace: namespace.to_string(),
            manifest: manifest.to_string(),
        });
        match self.scripted_failure(manifest, |s| &s.fail_delete) {
            Some(name) => Err(ReleaseError::Cluster(format!("delete of {name} rejected"))),
            None => Ok(()),
        }
    }

    async fn delete_and_wait(
        &self,
        namespace: &str,
        manifest: &str,
        _timeout: Duration,
    ) -> Result<()> {
        self.record(ExecutorCall::DeleteAndWait {
            namespace: namespace.to_string(),
            manifest: manifest.to_string(),
        });
        match self.scripted_failure(manifest, |s| &s.fail_delete) {
            Some(name) => Err(ReleaseError::Cluster(format!("delete of {name} rejected"))),
            None => Ok(()),
        }
    }

    async fn watch_until_ready(
        &self,
        namespace: &str,
        manifest: &str,
        timeout: Duration,
    ) -> Result<()> {
        self.record(ExecutorCall::Watch {
            namespace: namespace.to_string(),
            manifest: manifest.to_string(),
        });
        match self.scripted_failure(manifest, |s| &s.fail_readiness) {
            Some(_) => Err(ReleaseError::Timeout(timeout)),
            None => Ok(()),
        }
    }
}
