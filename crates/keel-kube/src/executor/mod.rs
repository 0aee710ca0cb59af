//! Cluster execution strategies
//!
//! The release engine never talks to a cluster directly. It goes through a
//! [`ClusterExecutor`], chosen once when the server is constructed:
//! [`LocalExecutor`] drives the cluster in-process with kube-rs, while
//! [`RemoteExecutor`] forwards every call to a release agent over HTTP.

mod local;
mod recording;
mod remote;

pub use local::LocalExecutor;
pub use recording::{ExecutorCall, RecordingExecutor};
pub use remote::RemoteExecutor;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Apply, update, delete and wait on rendered manifests
#[async_trait]
pub trait ClusterExecutor: Send + Sync {
    /// Check that every document in `manifest` can be sent to the cluster,
    /// without changing anything
    async fn validate(&self, namespace: &str, manifest: &str) -> Result<()>;

    /// Create every resource in `manifest` (one or more YAML documents)
    async fn create(&self, namespace: &str, manifest: &str, timeout: Duration) -> Result<()>;

    /// Move the cluster from `current` to `target`. Resources only present
    /// in `current` are removed. With `recreate`, pods of updated workloads
    /// are restarted.
    async fn update(
        &self,
        namespace: &str,
        current: &str,
        target: &str,
        recreate: bool,
        timeout: Duration,
    ) -> Result<()>;

    /// Delete every resource in `manifest`. Missing resources are not an error.
    async fn delete(&self, namespace: &str, manifest: &str) -> Result<()>;

    /// Delete every resource in `manifest` and block until none of them
    /// exists anymore. Used to clear a hook's previous run before it is
    /// created again.
    async fn delete_and_wait(&self, namespace: &str, manifest: &str, timeout: Duration)
    -> Result<()>;

    /// Block until the resources in `manifest` are ready (Jobs complete,
    /// Pods succeed) or `timeout` elapses
    async fn watch_until_ready(&self, namespace: &str, manifest: &str, timeout: Duration)
    -> Result<()>;
}
