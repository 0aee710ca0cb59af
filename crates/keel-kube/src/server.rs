//! The release server
//!
//! [`ReleaseServer`] drives every release operation end to end: it resolves
//! cluster capabilities, renders the chart through the engine yard, splits
//! the output into hooks and resources, runs hooks around the cluster call
//! and keeps the release history current.
//!
//! Every operation follows the same shape: validate, record a pending
//! revision, act on the cluster, then record the outcome. A failure after
//! the pending revision was written leaves it `failed` with the error as
//! its description.

use keel_core::{
    Capabilities, Chart, Config, ReleaseOptions, ReleaseStatus, TemplateContext,
    coalesce_values, is_compatible_range,
};
use keel_engine::{EngineYard, RenderedFiles};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::actions::{
    InstallRequest, ListRequest, ListResponse, RollbackRequest, StatusResponse, TestReport,
    UninstallRequest, UpdateRequest,
};
use crate::capabilities::{Discovery, resolve_capabilities};
use crate::config::ServerConfig;
use crate::error::{ReleaseError, Result};
use crate::executor::ClusterExecutor;
use crate::hooks::{Hook, HookEvent, HookExecutor};
use crate::manifest::sort_manifests;
use crate::naming::{MonikerGenerator, NameAllocator, NameGenerator, validate_release_name};
use crate::release::{Release, ReleaseInfo, aggregate_manifest};
use crate::sort::SortOrder;
use crate::storage::StorageDriver;
use crate::values::reuse_values;

const NOTES_FILE: &str = "NOTES.txt";

/// Output of rendering a chart for one revision
#[derive(Debug, Default)]
struct Rendered {
    hooks: Vec<Hook>,
    manifest: String,
    notes: Option<String>,
}

pub struct ReleaseServer {
    storage: Arc<dyn StorageDriver>,
    executor: Arc<dyn ClusterExecutor>,
    discovery: Arc<dyn Discovery>,
    engines: EngineYard,
    config: ServerConfig,
    hooks: HookExecutor,
    names: Box<dyn NameGenerator>,
}

impl ReleaseServer {
    pub fn new(
        storage: Arc<dyn StorageDriver>,
        executor: Arc<dyn ClusterExecutor>,
        discovery: Arc<dyn Discovery>,
        engines: EngineYard,
        config: ServerConfig,
    ) -> Self {
        Self {
            storage,
            hooks: HookExecutor::new(executor.clone()),
            executor,
            discovery,
            engines,
            config,
            names: Box::new(MonikerGenerator),
        }
    }

    /// Wire a server from configuration, connecting to the cluster
    pub async fn from_config(config: ServerConfig) -> Result<Self> {
        let storage = config.build_storage().await?;
        let executor = config.build_executor().await?;
        let discovery = config.build_discovery().await?;
        debug!(storage = storage.name(), executor = ?config.executor, "release server ready");
        Ok(Self::new(
            storage,
            executor,
            discovery,
            EngineYard::default(),
            config,
        ))
    }

    /// Replace the generator used for releases installed without a name
    pub fn with_name_generator(mut self, generator: impl NameGenerator + 'static) -> Self {
        self.names = Box::new(generator);
        self
    }

    pub fn storage(&self) -> &Arc<dyn StorageDriver> {
        &self.storage
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn timeout(&self, requested: Option<Duration>) -> Duration {
        requested.unwrap_or(self.config.timeout)
    }

    // ========== Install ==========

    /// Install a chart as a new release
    pub async fn install(&self, req: InstallRequest) -> Result<Release> {
        let chart = req.chart.ok_or(ReleaseError::MissingChart)?;

        let name = NameAllocator::new(self.names.as_ref())
            .unique_name(self.storage.as_ref(), &req.name, req.reuse_name)
            .await?;
        validate_release_name(&name)?;

        // A reused name continues the history it takes over
        let previous = match self.storage.get_latest(&name).await {
            Ok(previous) => Some(previous),
            Err(ReleaseError::ReleaseNotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let version = previous.as_ref().map_or(1, |p| p.version + 1);

        let capabilities = resolve_capabilities(self.discovery.as_ref()).await?;
        check_compatibility(&chart, &capabilities)?;

        let options = ReleaseOptions::for_install(&name, &req.namespace, version);
        let rendered = self.render(&chart, &req.values, options, &capabilities)?;

        let mut release = Release {
            name,
            namespace: req.namespace,
            version,
            info: ReleaseInfo::new(ReleaseStatus::PendingInstall, "Initial install underway"),
            chart,
            config: req.values,
            manifest: rendered.manifest,
            hooks: rendered.hooks,
            notes: rendered.notes,
        };

        self.executor
            .validate(&release.namespace, &release.manifest)
            .await?;

        if req.dry_run {
            info!(release = %release.name, "dry run, skipping install");
            release.info.description = "Dry run complete".to_string();
            return Ok(release);
        }

        self.storage.create(&release).await?;

        info!(
            release = %release.name,
            namespace = %release.namespace,
            version = release.version,
            "installing release"
        );
        let timeout = self.timeout(req.timeout);
        if let Err(e) = self
            .perform_install(&mut release, req.disable_hooks, timeout)
            .await
        {
            return Err(self.record_failure(&mut release, e).await);
        }

        release.mark_deployed("Install complete");
        self.storage.update(&release).await?;
        info!(release = %release.name, version = release.version, "release installed");
        Ok(release)
    }

    async fn perform_install(
        &self,
        release: &mut Release,
        disable_hooks: bool,
        timeout: Duration,
    ) -> Result<()> {
        if !disable_hooks {
            self.run_hooks(release, HookEvent::PreInstall, timeout).await?;
        }
        self.executor
            .create(&release.namespace, &release.manifest, timeout)
            .await?;
        if !disable_hooks {
            self.run_hooks(release, HookEvent::PostInstall, timeout).await?;
        }
        Ok(())
    }

    // ========== Update ==========

    /// Upgrade a release to a new chart or configuration
    pub async fn update(&self, mut req: UpdateRequest) -> Result<Release> {
        validate_release_name(&req.name)?;

        let mut current = self.storage.get_latest(&req.name).await?;
        ensure_idle(&current)?;
        if current.status() == ReleaseStatus::Deleted {
            return Err(ReleaseError::AlreadyDeleted(current.name.clone()));
        }
        if req.chart.is_none() {
            return Err(ReleaseError::MissingChart);
        }

        reuse_values(&mut req, &current)?;
        let chart = req.chart.take().ok_or(ReleaseError::MissingChart)?;

        let capabilities = resolve_capabilities(self.discovery.as_ref()).await?;
        check_compatibility(&chart, &capabilities)?;

        let version = current.version + 1;
        let options = ReleaseOptions::for_upgrade(&current.name, &current.namespace, version);
        let rendered = self.render(&chart, &req.values, options, &capabilities)?;

        let mut info = ReleaseInfo::new(ReleaseStatus::PendingUpgrade, "Preparing upgrade");
        info.first_deployed = current.info.first_deployed;
        let mut target = Release {
            name: current.name.clone(),
            namespace: current.namespace.clone(),
            version,
            info,
            chart,
            config: req.values,
            manifest: rendered.manifest,
            hooks: rendered.hooks,
            notes: rendered.notes,
        };

        self.executor
            .validate(&target.namespace, &target.manifest)
            .await?;

        if req.dry_run {
            info!(release = %target.name, "dry run, skipping upgrade");
            target.info.description = "Dry run complete".to_string();
            return Ok(target);
        }

        self.storage.create(&target).await?;

        info!(
            release = %target.name,
            from = current.version,
            to = target.version,
            "upgrading release"
        );
        let timeout = self.timeout(req.timeout);
        if let Err(e) = self
            .perform_update(
                &current.manifest,
                &mut target,
                HookEvent::PreUpgrade,
                HookEvent::PostUpgrade,
                req.disable_hooks,
                req.recreate,
                timeout,
            )
            .await
        {
            return Err(self.record_failure(&mut target, e).await);
        }

        current.mark_superseded();
        self.storage.update(&current).await?;
        target.mark_deployed("Upgrade complete");
        self.storage.update(&target).await?;
        info!(release = %target.name, version = target.version, "release upgraded");

        self.prune_history(&target.name).await;
        Ok(target)
    }

    #[allow(clippy::too_many_arguments)]
    async fn perform_update(
        &self,
        current_manifest: &str,
        target: &mut Release,
        pre: HookEvent,
        post: HookEvent,
        disable_hooks: bool,
        recreate: bool,
        timeout: Duration,
    ) -> Result<()> {
        if !disable_hooks {
            self.run_hooks(target, pre, timeout).await?;
        }
        self.executor
            .update(
                &target.namespace,
                current_manifest,
                &target.manifest,
                recreate,
                timeout,
            )
            .await?;
        if !disable_hooks {
            self.run_hooks(target, post, timeout).await?;
        }
        Ok(())
    }

    // ========== Rollback ==========

    /// Roll a release back to an earlier revision.
    ///
    /// The rollback is recorded as a new revision carrying the target's
    /// chart, configuration, manifest and hooks.
    pub async fn rollback(&self, req: RollbackRequest) -> Result<Release> {
        validate_release_name(&req.name)?;

        let mut current = self.storage.get_latest(&req.name).await?;
        ensure_idle(&current)?;

        let target_version = if req.version == 0 {
            current.version.saturating_sub(1)
        } else {
            req.version
        };
        let invalid = |reason: &str| ReleaseError::InvalidRevision {
            name: req.name.clone(),
            version: target_version,
            reason: reason.to_string(),
        };
        if target_version == 0 {
            return Err(invalid("no previous revision to roll back to"));
        }
        if target_version > current.version {
            return Err(invalid("revision is newer than the current one"));
        }
        let previous = match self.storage.get(&req.name, target_version).await {
            Ok(previous) => previous,
            Err(ReleaseError::ReleaseNotFound(_)) => return Err(invalid("revision not found")),
            Err(e) => return Err(e),
        };

        let description = format!("Rollback to {}", target_version);
        let mut info = ReleaseInfo::new(ReleaseStatus::PendingRollback, description.clone());
        info.first_deployed = current.info.first_deployed;
        let mut target = Release {
            name: current.name.clone(),
            namespace: current.namespace.clone(),
            version: current.version + 1,
            info,
            chart: previous.chart,
            config: previous.config,
            manifest: previous.manifest,
            hooks: previous
                .hooks
                .into_iter()
                .map(|h| Hook { last_run: None, ..h })
                .collect(),
            notes: previous.notes,
        };

        if req.dry_run {
            info!(release = %target.name, "dry run, skipping rollback");
            target.info.description = "Dry run complete".to_string();
            return Ok(target);
        }

        self.storage.create(&target).await?;

        info!(
            release = %target.name,
            from = current.version,
            to = target_version,
            version = target.version,
            "rolling back release"
        );
        let timeout = self.timeout(req.timeout);
        if let Err(e) = self
            .perform_update(
                &current.manifest,
                &mut target,
                HookEvent::PreRollback,
                HookEvent::PostRollback,
                req.disable_hooks,
                req.recreate,
                timeout,
            )
            .await
        {
            return Err(self.record_failure(&mut target, e).await);
        }

        current.mark_superseded();
        self.storage.update(&current).await?;
        target.mark_deployed(description);
        self.storage.update(&target).await?;
        info!(release = %target.name, version = target.version, "release rolled back");

        self.prune_history(&target.name).await;
        Ok(target)
    }

    // ========== Uninstall ==========

    /// Remove a release's resources from the cluster.
    ///
    /// The release is kept in history as `deleted` unless `purge` is set.
    /// Resources that cannot be deleted do not stop the uninstall; their
    /// errors are returned together once the release is recorded.
    pub async fn uninstall(&self, req: UninstallRequest) -> Result<Release> {
        validate_release_name(&req.name)?;

        let mut release = self.storage.get_latest(&req.name).await?;
        if release.status() == ReleaseStatus::Deleted {
            if req.purge {
                info!(release = %req.name, "purging deleted release");
                self.storage.delete_all(&req.name).await?;
                return Ok(release);
            }
            return Err(ReleaseError::AlreadyDeleted(req.name));
        }

        info!(release = %release.name, version = release.version, "uninstalling release");
        release.mark_deleting();
        self.storage.update(&release).await?;

        let timeout = self.timeout(req.timeout);
        if !req.disable_hooks {
            if let Err(e) = self.run_hooks(&mut release, HookEvent::PreDelete, timeout).await {
                return Err(self.record_failure(&mut release, e).await);
            }
        }

        let mut errors = Vec::new();
        for manifest in release.generic_manifests(SortOrder::Uninstall) {
            debug!(release = %release.name, path = %manifest.path, kind = %manifest.head.kind, "deleting resource");
            if let Err(e) = self.executor.delete(&release.namespace, &manifest.content).await {
                warn!(release = %release.name, path = %manifest.path, error = %e, "resource deletion failed");
                errors.push(e.to_string());
            }
        }

        if !req.disable_hooks {
            if let Err(e) = self.run_hooks(&mut release, HookEvent::PostDelete, timeout).await {
                errors.push(e.to_string());
            }
        }

        release.mark_deleted();
        if req.purge {
            info!(release = %release.name, "purging release history");
            self.storage.delete_all(&release.name).await?;
        } else {
            self.storage.update(&release).await?;
        }

        if !errors.is_empty() {
            return Err(ReleaseError::Cluster(format!(
                "deletion completed with {} error(s): {}",
                errors.len(),
                errors.join("; ")
            )));
        }
        info!(release = %release.name, "release uninstalled");
        Ok(release)
    }

    // ========== Queries ==========

    /// Revisions of a release, newest first. `max` of 0 returns them all.
    pub async fn history(&self, name: &str, max: usize) -> Result<Vec<Release>> {
        validate_release_name(name)?;
        let mut history = self.storage.history(name).await?;
        if max > 0 {
            history.truncate(max);
        }
        Ok(history)
    }

    /// Status of a revision; version 0 means the latest
    pub async fn status(&self, name: &str, version: u32) -> Result<StatusResponse> {
        let release = self.content(name, version).await?;
        Ok(StatusResponse::from(&release))
    }

    /// Full record of a revision; version 0 means the latest
    pub async fn content(&self, name: &str, version: u32) -> Result<Release> {
        validate_release_name(name)?;
        if version == 0 {
            self.storage.get_latest(name).await
        } else {
            self.storage.get(name, version).await
        }
    }

    /// Latest revision of every release matching the request, sorted by
    /// name and paged by name
    pub async fn list(&self, req: ListRequest) -> Result<ListResponse> {
        let filter = req
            .filter
            .as_deref()
            .filter(|f| !f.is_empty())
            .map(Regex::new)
            .transpose()
            .map_err(|e| ReleaseError::Config(format!("invalid list filter: {}", e)))?;
        let statuses = if req.status_codes.is_empty() {
            vec![ReleaseStatus::Deployed]
        } else {
            req.status_codes
        };

        let mut latest: BTreeMap<String, Release> = BTreeMap::new();
        for release in self.storage.list().await? {
            match latest.get(&release.name) {
                Some(seen) if seen.version >= release.version => {}
                _ => {
                    latest.insert(release.name.clone(), release);
                }
            }
        }

        let matching: Vec<Release> = latest
            .into_values()
            .filter(|r| statuses.contains(&r.status()))
            .filter(|r| req.namespace.as_deref().is_none_or(|ns| r.namespace == ns))
            .filter(|r| filter.as_ref().is_none_or(|re| re.is_match(&r.name)))
            .collect();
        let total = matching.len();

        let limit = if req.limit == 0 {
            self.config.list_default_limit
        } else {
            req.limit
        };
        let mut page = matching
            .into_iter()
            .skip_while(|r| req.offset.as_deref().is_some_and(|offset| r.name.as_str() < offset));
        let releases: Vec<Release> = page.by_ref().take(limit).collect();
        let next = page.next().map(|r| r.name);

        debug!(total, returned = releases.len(), "listed releases");
        Ok(ListResponse {
            releases,
            next,
            total,
        })
    }

    // ========== Tests ==========

    /// Run a release's test hooks.
    ///
    /// `release-test-success` hooks run first. When one fails, the
    /// `release-test-failure` hooks run and the report is marked failed.
    pub async fn run_release_test(&self, name: &str, timeout: Option<Duration>) -> Result<TestReport> {
        validate_release_name(name)?;
        let mut release = self.storage.get_latest(name).await?;
        let timeout = self.timeout(timeout);

        info!(release = %name, version = release.version, "running release tests");
        let report = match self
            .run_hooks(&mut release, HookEvent::ReleaseTestSuccess, timeout)
            .await
        {
            Ok(executed) => TestReport {
                release: name.to_string(),
                passed: true,
                executed,
                message: (executed == 0).then(|| "no tests found".to_string()),
            },
            Err(e) => {
                warn!(release = %name, error = %e, "release test failed");
                let executed = match self
                    .run_hooks(&mut release, HookEvent::ReleaseTestFailure, timeout)
                    .await
                {
                    Ok(n) => n,
                    Err(failure) => {
                        warn!(release = %name, error = %failure, "test failure hooks did not complete");
                        0
                    }
                };
                TestReport {
                    release: name.to_string(),
                    passed: false,
                    executed,
                    message: Some(e.to_string()),
                }
            }
        };

        // Persist the hooks' last run times
        self.storage.update(&release).await?;
        Ok(report)
    }

    // ========== Helpers ==========

    /// Render `chart` with `config` and split the output into hooks, the
    /// aggregated manifest and notes
    fn render(
        &self,
        chart: &Chart,
        config: &Config,
        options: ReleaseOptions,
        capabilities: &Capabilities,
    ) -> Result<Rendered> {
        let values = coalesce_values(chart, config)?;
        let context = TemplateContext::new(values, options, &chart.metadata, capabilities.clone());

        let renderer = self.engines.select(&chart.metadata)?;
        debug!(chart = %chart.name(), engine = renderer.name(), "rendering chart");
        let mut files = renderer.render(chart, &context)?;

        let notes = extract_notes(&mut files, chart.name());
        let (hooks, manifests) = sort_manifests(
            &files,
            &capabilities.api_versions,
            self.config.unknown_hook_policy,
        )?;

        Ok(Rendered {
            hooks,
            manifest: aggregate_manifest(&manifests),
            notes,
        })
    }

    async fn run_hooks(
        &self,
        release: &mut Release,
        event: HookEvent,
        timeout: Duration,
    ) -> Result<usize> {
        self.hooks
            .execute(
                &mut release.hooks,
                event,
                &release.name,
                &release.namespace,
                timeout,
            )
            .await
    }

    /// Record `release` as failed and hand back the error that caused it
    async fn record_failure(&self, release: &mut Release, err: ReleaseError) -> ReleaseError {
        warn!(release = %release.name, version = release.version, error = %err, "release failed");
        release.mark_failed(format!("Release \"{}\" failed: {}", release.name, err));
        if let Err(e) = self.storage.update(release).await {
            warn!(release = %release.name, error = %e, "could not record failed release");
        }
        err
    }

    /// Delete the oldest revisions beyond `max_history`
    async fn prune_history(&self, name: &str) {
        let max = self.config.max_history;
        if max == 0 {
            return;
        }
        let history = match self.storage.history(name).await {
            Ok(history) => history,
            Err(e) => {
                warn!(release = %name, error = %e, "could not read history for pruning");
                return;
            }
        };
        for old in history.iter().skip(max) {
            match self.storage.delete(name, old.version).await {
                Ok(_) => debug!(release = %name, version = old.version, "pruned revision"),
                Err(e) => warn!(release = %name, version = old.version, error = %e, "could not prune revision"),
            }
        }
    }
}

/// Refuse to start an operation while another is in flight
fn ensure_idle(release: &Release) -> Result<()> {
    if release.status().is_pending() {
        return Err(ReleaseError::OperationInProgress {
            name: release.name.clone(),
            status: release.status(),
        });
    }
    Ok(())
}

/// Check a chart and its subcharts against the engine and cluster versions
pub fn check_compatibility(chart: &Chart, capabilities: &Capabilities) -> Result<()> {
    let meta = &chart.metadata;

    if let Some(range) = meta.engine_version.as_deref().filter(|r| !r.trim().is_empty()) {
        if !is_compatible_range(range, &capabilities.engine_version) {
            return Err(ReleaseError::IncompatibleChart(format!(
                "chart '{}' requires engine {} but this is {}",
                meta.name, range, capabilities.engine_version
            )));
        }
    }

    if let Some(range) = meta.kube_version.as_deref().filter(|r| !r.trim().is_empty()) {
        match capabilities.kube_version.semver() {
            Some(version) if is_compatible_range(range, &version) => {}
            Some(_) => {
                return Err(ReleaseError::IncompatibleChart(format!(
                    "chart '{}' requires Kubernetes {} but the cluster runs {}",
                    meta.name, range, capabilities.kube_version.git_version
                )));
            }
            None => warn!(
                chart = %meta.name,
                kube_version = %capabilities.kube_version.git_version,
                "cluster version is not semver, skipping kubeVersion check"
            ),
        }
    }

    chart
        .dependencies
        .iter()
        .try_for_each(|dep| check_compatibility(dep, capabilities))
}

/// Remove every `NOTES.txt` from the rendered files, returning the top-level
/// chart's notes
fn extract_notes(files: &mut RenderedFiles, chart_name: &str) -> Option<String> {
    let own = format!("{}/templates/{}", chart_name, NOTES_FILE);
    let mut notes = None;
    files.retain(|path, content| {
        if !path.ends_with(NOTES_FILE) {
            return true;
        }
        if *path == own {
            notes = Some(std::mem::take(content));
        }
        false
    });
    notes.filter(|n| !n.trim().is_empty())
}
