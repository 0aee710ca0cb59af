//! Lifecycle hooks: the event model and sequential execution
//!
//! Hooks are ordinary manifests annotated with `keel.sh/hook` (or
//! `helm.sh/hook`). They run at fixed points of a release operation, one at
//! a time, in (weight, name) order. The first failure aborts the operation;
//! hooks that already ran are not compensated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ReleaseError, Result};
use crate::executor::ClusterExecutor;
use crate::sort::hook_order;

/// Points in a release lifecycle at which hooks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookEvent {
    PreInstall,
    PostInstall,
    PreDelete,
    PostDelete,
    PreUpgrade,
    PostUpgrade,
    PreRollback,
    PostRollback,
    ReleaseTestSuccess,
    ReleaseTestFailure,
}

impl HookEvent {
    pub const ALL: [HookEvent; 10] = [
        HookEvent::PreInstall,
        HookEvent::PostInstall,
        HookEvent::PreDelete,
        HookEvent::PostDelete,
        HookEvent::PreUpgrade,
        HookEvent::PostUpgrade,
        HookEvent::PreRollback,
        HookEvent::PostRollback,
        HookEvent::ReleaseTestSuccess,
        HookEvent::ReleaseTestFailure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreInstall => "pre-install",
            Self::PostInstall => "post-install",
            Self::PreDelete => "pre-delete",
            Self::PostDelete => "post-delete",
            Self::PreUpgrade => "pre-upgrade",
            Self::PostUpgrade => "post-upgrade",
            Self::PreRollback => "pre-rollback",
            Self::PostRollback => "post-rollback",
            Self::ReleaseTestSuccess => "release-test-success",
            Self::ReleaseTestFailure => "release-test-failure",
        }
    }

    /// Case-insensitive lookup of an annotation event name
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|event| event.as_str().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A manifest bound to one or more lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hook {
    pub name: String,
    pub kind: String,
    /// Rendered file the hook came from
    pub path: String,
    pub manifest: String,
    pub events: Vec<HookEvent>,
    #[serde(default)]
    pub weight: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

impl Hook {
    pub fn runs_on(&self, event: HookEvent) -> bool {
        self.events.contains(&event)
    }
}

/// Runs the hooks bound to an event against a cluster executor
pub struct HookExecutor {
    executor: Arc<dyn ClusterExecutor>,
}

impl HookExecutor {
    pub fn new(executor: Arc<dyn ClusterExecutor>) -> Self {
        Self { executor }
    }

    /// Execute every hook bound to `event`, sorted by (weight, name).
    ///
    /// A previous run of each hook is deleted first, then the hook is
    /// created and waited on until ready. A successful hook gets its
    /// `last_run` stamped. Returns the number of hooks run.
    pub async fn execute(
        &self,
        hooks: &mut [Hook],
        event: HookEvent,
        release: &str,
        namespace: &str,
        timeout: Duration,
    ) -> Result<usize> {
        let mut selected: Vec<usize> = (0..hooks.len())
            .filter(|&i| hooks[i].runs_on(event))
            .collect();
        selected.sort_by(|&a, &b| hook_order(&hooks[a], &hooks[b]));

        if selected.is_empty() {
            debug!(release, %event, "no hooks to run");
            return Ok(0);
        }

        for &idx in &selected {
            let hook = &mut hooks[idx];
            info!(release, %event, hook = %hook.name, weight = hook.weight, "executing hook");

            if let Err((stage, e)) = self.run_one(hook, namespace, timeout).await {
                warn!(release, %event, hook = %hook.name, error = %e, "hook {}", stage);
                return Err(ReleaseError::HookFailed {
                    hook: hook.name.clone(),
                    event,
                    message: e.to_string(),
                });
            }

            hook.last_run = Some(Utc::now());
            info!(release, %event, hook = %hook.name, "hook complete");
        }

        Ok(selected.len())
    }

    async fn run_one(
        &self,
        hook: &Hook,
        namespace: &str,
        timeout: Duration,
    ) -> std::result::Result<(), (&'static str, ReleaseError)> {
        self.executor
            .delete_and_wait(namespace, &hook.manifest, timeout)
            .await
            .map_err(|e| ("previous run could not be removed", e))?;
        self.executor
            .create(namespace, &hook.manifest, timeout)
            .await
            .map_err(|e| ("could not be created", e))?;
        self.executor
            .watch_until_ready(namespace, &hook.manifest, timeout)
            .await
            .map_err(|e| ("did not become ready", e))
    }
}
