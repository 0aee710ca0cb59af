//! In-process execution against the API server with kube-rs
//!
//! New resources are created with a plain POST, so an existing object is a
//! conflict rather than a silent no-op. Updates use Server-Side Apply under
//! the `keel` field manager, and deletes use background propagation. Types
//! are resolved through API discovery, so any served kind (CRDs included)
//! works.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{
    Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams, PropagationPolicy,
};
use kube::core::{GroupVersionKind, TypeMeta};
use kube::discovery::{ApiCapabilities, ApiResource, Discovery, Scope};
use kube::runtime::wait::await_condition;
use kube::Client;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use super::ClusterExecutor;
use crate::error::{ReleaseError, Result};
use crate::manifest::split_manifests;

const FIELD_MANAGER: &str = "keel";

/// Interval between existence checks while waiting for a deletion
const DELETION_POLL: Duration = Duration::from_millis(500);

/// Workload kinds whose pods are restarted on a recreate
const RESTARTABLE_KINDS: &[&str] = &["Deployment", "StatefulSet", "DaemonSet", "ReplicaSet"];

/// One document resolved against discovery
#[derive(Debug, Clone)]
struct ParsedResource {
    obj: DynamicObject,
    gvk: GroupVersionKind,
    api_resource: ApiResource,
    capabilities: ApiCapabilities,
}

impl ParsedResource {
    fn name(&self) -> Result<&str> {
        self.obj.metadata.name.as_deref().ok_or_else(|| {
            ReleaseError::Cluster(format!("{} resource is missing metadata.name", self.gvk.kind))
        })
    }

    fn display_name(&self) -> String {
        let name = self.obj.metadata.name.as_deref().unwrap_or("unnamed");
        match &self.obj.metadata.namespace {
            Some(ns) => format!("{}/{}/{}", ns, self.gvk.kind, name),
            None => format!("{}/{}", self.gvk.kind, name),
        }
    }

    /// Identity used to match resources across two manifests
    fn key(&self) -> (String, String, Option<String>, Option<String>) {
        (
            self.gvk.group.clone(),
            self.gvk.kind.clone(),
            self.obj.metadata.namespace.clone(),
            self.obj.metadata.name.clone(),
        )
    }

    /// `spec.selector.matchLabels` rendered as a label selector
    fn pod_selector(&self) -> Option<String> {
        let labels = self
            .obj
            .data
            .get("spec")?
            .get("selector")?
            .get("matchLabels")?
            .as_object()?;
        let selector = labels
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| format!("{}={}", k, v)))
            .collect::<Vec<_>>()
            .join(",");
        (!selector.is_empty()).then_some(selector)
    }
}

pub struct LocalExecutor {
    client: Client,
    discovery: Discovery,
}

impl LocalExecutor {
    /// Connect and run API discovery once
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self { client, discovery })
    }

    /// Use the kubeconfig or in-cluster environment
    pub async fn try_default() -> Result<Self> {
        Self::new(Client::try_default().await?).await
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn parse_manifest(&self, manifest: &str, namespace: &str) -> Result<Vec<ParsedResource>> {
        split_manifests(manifest)
            .iter()
            .map(|doc| self.parse_document(doc, namespace))
            .collect()
    }

    fn parse_document(&self, doc: &str, namespace: &str) -> Result<ParsedResource> {
        let mut obj: DynamicObject = serde_yaml::from_str(doc)?;
        let type_meta = obj
            .types
            .as_ref()
            .ok_or_else(|| ReleaseError::Cluster("resource is missing apiVersion or kind".into()))?;
        let gvk = gvk_from_type_meta(type_meta);

        let (api_resource, capabilities) = self.discovery.resolve_gvk(&gvk).ok_or_else(|| {
            ReleaseError::Cluster(format!(
                "unknown resource type {}/{}",
                type_meta.api_version, type_meta.kind
            ))
        })?;

        if capabilities.scope == Scope::Namespaced && obj.metadata.namespace.is_none() {
            obj.metadata.namespace = Some(namespace.to_string());
        }

        Ok(ParsedResource {
            obj,
            gvk,
            api_resource,
            capabilities,
        })
    }

    fn api_for(&self, resource: &ParsedResource) -> Api<DynamicObject> {
        match (&resource.capabilities.scope, &resource.obj.metadata.namespace) {
            (Scope::Namespaced, Some(ns)) => {
                Api::namespaced_with(self.client.clone(), ns, &resource.api_resource)
            }
            _ => Api::all_with(self.client.clone(), &resource.api_resource),
        }
    }

    async fn post(&self, resource: &ParsedResource) -> Result<()> {
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api_for(resource)
            .create(&params, &resource.obj)
            .await
            .map_err(|e| create_error(&resource.display_name(), e))?;
        debug!(resource = %resource.display_name(), "created");
        Ok(())
    }

    async fn apply(&self, resource: &ParsedResource) -> Result<()> {
        let name = resource.name()?;
        let mut params = PatchParams::apply(FIELD_MANAGER);
        params.force = true;

        self.api_for(resource)
            .patch(name, &params, &Patch::Apply(&resource.obj))
            .await
            .map_err(|e| {
                ReleaseError::Cluster(format!("failed to apply {}: {}", resource.display_name(), e))
            })?;
        debug!(resource = %resource.display_name(), "applied");
        Ok(())
    }

    /// Delete one resource; a missing resource counts as deleted
    async fn remove(&self, resource: &ParsedResource) -> Result<()> {
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };
        match self.api_for(resource).delete(resource.name()?, &params).await {
            Ok(_) => {
                debug!(resource = %resource.display_name(), "deleted");
                Ok(())
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                debug!(resource = %resource.display_name(), "already gone");
                Ok(())
            }
            Err(e) => Err(ReleaseError::Cluster(format!(
                "failed to delete {}: {}",
                resource.display_name(),
                e
            ))),
        }
    }

    /// Delete one resource, then poll until the API server no longer has it
    async fn remove_and_wait(&self, resource: &ParsedResource) -> Result<()> {
        self.remove(resource).await?;
        let api = self.api_for(resource);
        let name = resource.name()?;
        while api.get_opt(name).await?.is_some() {
            tokio::time::sleep(DELETION_POLL).await;
        }
        Ok(())
    }

    async fn restart_pods(&self, resource: &ParsedResource) -> Result<()> {
        let (Some(ns), Some(selector)) = (&resource.obj.metadata.namespace, resource.pod_selector())
        else {
            return Ok(());
        };
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), ns);
        pods.delete_collection(&DeleteParams::default(), &ListParams::default().labels(&selector))
            .await?;
        info!(resource = %resource.display_name(), selector = %selector, "restarted pods");
        Ok(())
    }

    async fn wait_ready(&self, resource: &ParsedResource) -> Result<()> {
        let Some(ns) = resource.obj.metadata.namespace.as_deref() else {
            return Ok(());
        };
        let name = resource.name()?;

        match resource.gvk.kind.as_str() {
            "Job" => {
                let jobs: Api<Job> = Api::namespaced(self.client.clone(), ns);
                let job = await_condition(jobs, name, job_finished)
                    .await
                    .map_err(|e| ReleaseError::Cluster(e.to_string()))?
                    .ok_or_else(|| ReleaseError::Cluster(format!("job {} was deleted", name)))?;
                let failed = job.status.as_ref().and_then(|s| s.failed).unwrap_or(0);
                if job_condition(&job, "Failed") {
                    return Err(ReleaseError::Cluster(format!(
                        "job {} failed after {} attempts",
                        name, failed
                    )));
                }
            }
            "Pod" => {
                let pods: Api<Pod> = Api::namespaced(self.client.clone(), ns);
                let pod = await_condition(pods, name, pod_finished)
                    .await
                    .map_err(|e| ReleaseError::Cluster(e.to_string()))?
                    .ok_or_else(|| ReleaseError::Cluster(format!("pod {} was deleted", name)))?;
                if pod_phase(&pod) == Some("Failed") {
                    return Err(ReleaseError::Cluster(format!("pod {} failed", name)));
                }
            }
            _ => {}
        }
        debug!(resource = %resource.display_name(), "ready");
        Ok(())
    }
}

fn create_error(resource: &str, err: kube::Error) -> ReleaseError {
    match err {
        kube::Error::Api(resp) if resp.code == 409 => {
            ReleaseError::Cluster(format!("{} already exists", resource))
        }
        e => ReleaseError::Cluster(format!("failed to create {}: {}", resource, e)),
    }
}

fn job_condition(job: &Job, type_: &str) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conds| conds.iter().any(|c| c.type_ == type_ && c.status == "True"))
}

fn job_finished(job: Option<&Job>) -> bool {
    job.is_some_and(|j| job_condition(j, "Complete") || job_condition(j, "Failed"))
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|s| s.phase.as_deref())
}

fn pod_finished(pod: Option<&Pod>) -> bool {
    pod.and_then(pod_phase)
        .is_some_and(|phase| phase == "Succeeded" || phase == "Failed")
}

/// Run `fut`, failing with [`ReleaseError::Timeout`] once `timeout` elapses
async fn bounded<T>(timeout: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ReleaseError::Timeout(timeout))?
}

/// "apps/v1" is group "apps", version "v1"; "v1" is the core group
fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match tm.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), tm.api_version.clone()),
    };
    GroupVersionKind {
        group,
        version,
        kind: tm.kind.clone(),
    }
}

#[async_trait]
impl ClusterExecutor for LocalExecutor {
    async fn validate(&self, namespace: &str, manifest: &str) -> Result<()> {
        let resources = self.parse_manifest(manifest, namespace)?;
        for resource in &resources {
            resource.name()?;
        }
        debug!(resources = resources.len(), "manifest validated");
        Ok(())
    }

    async fn create(&self, namespace: &str, manifest: &str, timeout: Duration) -> Result<()> {
        let resources = self.parse_manifest(manifest, namespace)?;
        bounded(timeout, async {
            for resource in &resources {
                self.post(resource).await?;
            }
            Ok::<(), ReleaseError>(())
        })
        .await
    }

    async fn update(
        &self,
        namespace: &str,
        current: &str,
        target: &str,
        recreate: bool,
        timeout: Duration,
    ) -> Result<()> {
        let targets = self.parse_manifest(target, namespace)?;
        // Resources of the old revision that no longer resolve cannot be
        // compared; they are left in place.
        let currents: Vec<ParsedResource> = split_manifests(current)
            .iter()
            .filter_map(|doc| self.parse_document(doc, namespace).ok())
            .collect();

        bounded(timeout, async {
            for resource in &targets {
                self.apply(resource).await?;
            }

            let kept: HashSet<_> = targets.iter().map(ParsedResource::key).collect();
            for stale in currents.iter().filter(|r| !kept.contains(&r.key())) {
                info!(resource = %stale.display_name(), "removing resource dropped from the release");
                self.remove(stale).await?;
            }

            if recreate {
                for resource in targets
                    .iter()
                    .filter(|r| RESTARTABLE_KINDS.contains(&r.gvk.kind.as_str()))
                {
                    self.restart_pods(resource).await?;
                }
            }
            Ok::<(), ReleaseError>(())
        })
        .await
    }

    async fn delete(&self, namespace: &str, manifest: &str) -> Result<()> {
        let resources = self.parse_manifest(manifest, namespace)?;
        let mut failures = Vec::new();
        for resource in &resources {
            if let Err(e) = self.remove(resource).await {
                failures.push(e.to_string());
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReleaseError::Cluster(failures.join("; ")))
        }
    }

    async fn delete_and_wait(&self, namespace: &str, manifest: &str, timeout: Duration) -> Result<()> {
        let resources = self.parse_manifest(manifest, namespace)?;
        bounded(timeout, async {
            for resource in &resources {
                self.remove_and_wait(resource).await?;
            }
            Ok::<(), ReleaseError>(())
        })
        .await
    }

    async fn watch_until_ready(&self, namespace: &str, manifest: &str, timeout: Duration) -> Result<()> {
        let resources = self.parse_manifest(manifest, namespace)?;
        bounded(timeout, async {
            for resource in &resources {
                self.wait_ready(resource).await?;
            }
            Ok::<(), ReleaseError>(())
        })
        .await
    }
}
