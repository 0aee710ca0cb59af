//! Release server scenarios against a recording executor, mostly over in-memory storage

use keel_core::{Chart, ChartMetadata, Config, ReleaseStatus, TemplateFile, Values};
use keel_engine::EngineYard;
use keel_kube::{
    CompressionMethod, ExecutorCall, FileDriver, InstallRequest, ListRequest, MemoryDriver,
    NameGenerator, OperationCounts, RecordingExecutor, ReleaseError, ReleaseServer,
    RollbackRequest, ServerConfig, StaticDiscovery, StorageDriver, UninstallRequest,
    UpdateRequest,
};
use semver::Version;
use std::sync::Arc;

const CONFIGMAP: &str = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: {{ release.name }}-config
data:
  replicas: "{{ values.replicas }}"
"#;

const DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{ release.name }}
spec:
  replicas: {{ values.replicas }}
"#;

const MIGRATE_HOOK: &str = r#"apiVersion: batch/v1
kind: Job
metadata:
  name: {{ release.name }}-migrate
  annotations:
    helm.sh/hook: pre-install,pre-upgrade
    helm.sh/hook-weight: "-5"
"#;

const NOTIFY_HOOK: &str = r#"apiVersion: batch/v1
kind: Job
metadata:
  name: {{ release.name }}-notify
  annotations:
    keel.sh/hook: post-install
"#;

const BACKUP_HOOK: &str = r#"apiVersion: batch/v1
kind: Job
metadata:
  name: {{ release.name }}-backup
  annotations:
    keel.sh/hook: pre-delete
"#;

const TEST_HOOK: &str = r#"apiVersion: v1
kind: Pod
metadata:
  name: {{ release.name }}-test
  annotations:
    keel.sh/hook: release-test-success
"#;

const TEST_CLEANUP_HOOK: &str = r#"apiVersion: v1
kind: Pod
metadata:
  name: {{ release.name }}-test-cleanup
  annotations:
    keel.sh/hook: release-test-failure
"#;

fn chart() -> Chart {
    let mut chart = Chart::new(ChartMetadata::new("web", Version::new(1, 0, 0)));
    chart.values = Values::from_yaml("replicas: 1\n").unwrap();
    chart.templates = vec![
        TemplateFile::new("templates/configmap.yaml", CONFIGMAP),
        TemplateFile::new("templates/deployment.yaml", DEPLOYMENT),
        TemplateFile::new("templates/migrate.yaml", MIGRATE_HOOK),
        TemplateFile::new("templates/notify.yaml", NOTIFY_HOOK),
        TemplateFile::new("templates/backup.yaml", BACKUP_HOOK),
        TemplateFile::new("templates/test.yaml", TEST_HOOK),
        TemplateFile::new("templates/test-cleanup.yaml", TEST_CLEANUP_HOOK),
        TemplateFile::new("templates/NOTES.txt", "Installed {{ release.name }}\n"),
    ];
    chart
}

struct Fixed(&'static str);

impl NameGenerator for Fixed {
    fn generate(&self) -> String {
        self.0.to_string()
    }
}

struct Harness {
    server: ReleaseServer,
    storage: Arc<MemoryDriver>,
    executor: Arc<RecordingExecutor>,
}

fn harness_with(config: ServerConfig, discovery: StaticDiscovery) -> Harness {
    let storage = Arc::new(MemoryDriver::new());
    let executor = Arc::new(RecordingExecutor::new());
    let server = ReleaseServer::new(
        storage.clone(),
        executor.clone(),
        Arc::new(discovery),
        EngineYard::default(),
        config,
    );
    Harness {
        server,
        storage,
        executor,
    }
}

fn harness() -> Harness {
    harness_with(ServerConfig::default(), StaticDiscovery::default())
}

impl Harness {
    async fn install(&self, name: &str) -> keel_kube::Release {
        self.server
            .install(InstallRequest::new(chart(), "default").with_name(name))
            .await
            .unwrap()
    }

    async fn upgrade(&self, name: &str, values: &str) -> keel_kube::Release {
        self.server
            .update(UpdateRequest::new(name, chart()).with_values(Config::new(values)))
            .await
            .unwrap()
    }

    async fn status_of(&self, name: &str, version: u32) -> ReleaseStatus {
        self.storage.get(name, version).await.unwrap().status()
    }
}

mod install {
    use super::*;

    #[tokio::test]
    async fn test_install_deploys_release() {
        let h = harness();
        let release = h.install("web").await;

        assert_eq!(release.name, "web");
        assert_eq!(release.version, 1);
        assert_eq!(release.status(), ReleaseStatus::Deployed);
        assert_eq!(release.info.description, "Install complete");
        assert_eq!(release.notes.as_deref(), Some("Installed web\n"));
        assert_eq!(release.hooks.len(), 5);
        assert!(!release.manifest.contains("NOTES"));

        // pre-install hook, the release body in install order, post-install hook
        assert_eq!(
            h.executor.created_names(),
            vec!["web-migrate", "web-config", "web", "web-notify"]
        );
        assert_eq!(h.status_of("web", 1).await, ReleaseStatus::Deployed);
    }

    #[tokio::test]
    async fn test_hooks_stamped_after_run() {
        let h = harness();
        let release = h.install("web").await;
        let ran: Vec<_> = release
            .hooks
            .iter()
            .filter(|hook| hook.last_run.is_some())
            .map(|hook| hook.name.as_str())
            .collect();
        assert_eq!(ran.len(), 2);
        assert!(ran.contains(&"web-migrate"));
        assert!(ran.contains(&"web-notify"));
    }

    #[tokio::test]
    async fn test_disable_hooks() {
        let h = harness();
        let mut req = InstallRequest::new(chart(), "default").with_name("web");
        req.disable_hooks = true;
        h.server.install(req).await.unwrap();
        assert_eq!(h.executor.created_names(), vec!["web-config", "web"]);
    }

    #[tokio::test]
    async fn test_values_override_chart_defaults() {
        let h = harness();
        let release = h
            .server
            .install(
                InstallRequest::new(chart(), "default")
                    .with_name("web")
                    .with_values(Config::new("replicas: 3\n")),
            )
            .await
            .unwrap();
        assert!(release.manifest.contains("replicas: \"3\""));
        assert_eq!(release.config.raw, "replicas: 3\n");
    }

    #[tokio::test]
    async fn test_generated_name() {
        let h = harness();
        let server = h.server.with_name_generator(Fixed("calm-otter"));
        let release = server
            .install(InstallRequest::new(chart(), "default"))
            .await
            .unwrap();
        assert_eq!(release.name, "calm-otter");
        assert!(release.manifest.contains("name: calm-otter-config"));
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let h = harness();
        let release = h
            .server
            .install(InstallRequest::new(chart(), "default").with_name("web").dry_run())
            .await
            .unwrap();

        assert_eq!(release.status(), ReleaseStatus::PendingInstall);
        assert_eq!(release.info.description, "Dry run complete");
        assert!(release.manifest.contains("kind: Deployment"));
        let calls = h.executor.calls();
        assert!(matches!(
            calls.as_slice(),
            [ExecutorCall::Validate { manifest, .. }] if manifest == &release.manifest
        ));
        assert_eq!(h.storage.release_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_manifest_fails_dry_run() {
        let h = harness();
        h.executor.fail_validation_of("web-config");
        let err = h
            .server
            .install(InstallRequest::new(chart(), "default").with_name("web").dry_run())
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Cluster(ref m) if m.contains("web-config")));
        assert!(!h.executor.calls().iter().any(ExecutorCall::is_mutation));
    }

    #[tokio::test]
    async fn test_invalid_manifest_records_nothing() {
        let h = harness();
        h.executor.fail_validation_of("web");
        assert!(
            h.server
                .install(InstallRequest::new(chart(), "default").with_name("web"))
                .await
                .is_err()
        );
        assert_eq!(h.storage.release_count(), 0);
        assert!(h.executor.created_names().is_empty());
    }

    #[tokio::test]
    async fn test_missing_chart() {
        let h = harness();
        let req = InstallRequest {
            name: "web".into(),
            ..Default::default()
        };
        assert!(matches!(
            h.server.install(req).await,
            Err(ReleaseError::MissingChart)
        ));
    }

    #[tokio::test]
    async fn test_invalid_name() {
        let h = harness();
        let err = h
            .server
            .install(InstallRequest::new(chart(), "default").with_name("web!"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::InvalidName(_)));
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_reuse_refused_over_unreadable_revision() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = Arc::new(FileDriver::new(tmp.path(), CompressionMethod::None).unwrap());
        let server = ReleaseServer::new(
            storage,
            Arc::new(RecordingExecutor::new()),
            Arc::new(StaticDiscovery::default()),
            EngineYard::default(),
            ServerConfig::default(),
        );
        server
            .install(InstallRequest::new(chart(), "default").with_name("web"))
            .await
            .unwrap();
        server.uninstall(UninstallRequest::new("web")).await.unwrap();

        // a newer revision the driver cannot decode
        let live = tmp.path().join("web").join("v2.json");
        std::fs::write(&live, b"{\"name\": \"web\", trunc").unwrap();

        let mut req = InstallRequest::new(chart(), "default").with_name("web");
        req.reuse_name = true;
        assert!(server.install(req).await.is_err());
        assert_eq!(std::fs::read(&live).unwrap(), b"{\"name\": \"web\", trunc");
        assert!(!tmp.path().join("web").join("v3.json").exists());
    }

    #[tokio::test]
    async fn test_invalid_name_checked_before_storage() {
        let h = harness();
        let err = h
            .server
            .install(InstallRequest::new(chart(), "default").with_name("../escape"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::InvalidName(_)));
        assert_eq!(h.storage.operation_counts(), OperationCounts::default());
    }

    #[tokio::test]
    async fn test_existing_name_rejected() {
        let h = harness();
        h.install("web").await;
        let err = h
            .server
            .install(InstallRequest::new(chart(), "default").with_name("web"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::ReleaseExists(_)));
    }

    #[tokio::test]
    async fn test_failed_hook_records_failure() {
        let h = harness();
        h.executor.fail_readiness_of("web-migrate");

        let err = h
            .server
            .install(InstallRequest::new(chart(), "default").with_name("web"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::HookFailed { ref hook, .. } if hook == "web-migrate"));

        let stored = h.storage.get("web", 1).await.unwrap();
        assert_eq!(stored.status(), ReleaseStatus::Failed);
        assert!(stored.info.description.contains("web-migrate"));
        // the release body was never applied
        assert_eq!(h.executor.created_names(), vec!["web-migrate"]);
    }

    #[tokio::test]
    async fn test_failed_apply_records_failure() {
        let h = harness();
        h.executor.fail_create_of("web-config");
        let err = h
            .server
            .install(InstallRequest::new(chart(), "default").with_name("web"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Cluster(_)));
        assert_eq!(h.status_of("web", 1).await, ReleaseStatus::Failed);
    }

    #[tokio::test]
    async fn test_reused_name_continues_history() {
        let h = harness();
        h.install("web").await;
        h.server.uninstall(UninstallRequest::new("web")).await.unwrap();
        h.storage.reset_counts();

        let mut req = InstallRequest::new(chart(), "default").with_name("web");
        req.reuse_name = true;
        let release = h.server.install(req).await.unwrap();

        assert_eq!(release.version, 2);
        assert_eq!(release.status(), ReleaseStatus::Deployed);
        // the new revision is created, never written over an existing one
        assert_eq!(h.storage.operation_counts().creates, 1);
        assert_eq!(h.status_of("web", 1).await, ReleaseStatus::Deleted);
    }

    #[tokio::test]
    async fn test_reuse_of_live_name_refused() {
        let h = harness();
        h.install("web").await;
        let mut req = InstallRequest::new(chart(), "default").with_name("web");
        req.reuse_name = true;
        assert!(matches!(
            h.server.install(req).await,
            Err(ReleaseError::NameInUse(_))
        ));
    }

    #[tokio::test]
    async fn test_incompatible_chart_refused_before_recording() {
        let h = harness();
        let mut incompatible = chart();
        incompatible.metadata.kube_version = Some("<1.20.0".into());

        let err = h
            .server
            .install(InstallRequest::new(incompatible, "default").with_name("web"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::IncompatibleChart(_)));
        assert_eq!(h.storage.release_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_api_version_refused() {
        let h = harness();
        let mut chart = chart();
        chart.templates.push(TemplateFile::new(
            "templates/monitor.yaml",
            "apiVersion: monitoring.coreos.com/v1\nkind: ServiceMonitor\nmetadata:\n  name: mon\n",
        ));
        let err = h
            .server
            .install(InstallRequest::new(chart, "default").with_name("web"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::UnsupportedApiVersion { .. }));
        assert!(h.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_discovery_failure() {
        let h = harness_with(ServerConfig::default(), StaticDiscovery::failing("unreachable"));
        let err = h
            .server
            .install(InstallRequest::new(chart(), "default").with_name("web"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Discovery(_)));
    }
}

mod upgrade {
    use super::*;

    #[tokio::test]
    async fn test_upgrade_supersedes_previous() {
        let h = harness();
        h.install("web").await;
        h.executor.clear();

        let release = h.upgrade("web", "replicas: 5\n").await;
        assert_eq!(release.version, 2);
        assert_eq!(release.status(), ReleaseStatus::Deployed);
        assert_eq!(release.info.description, "Upgrade complete");
        assert_eq!(h.status_of("web", 1).await, ReleaseStatus::Superseded);

        let update = h
            .executor
            .calls()
            .into_iter()
            .find_map(|call| match call {
                ExecutorCall::Update { current, target, .. } => Some((current, target)),
                _ => None,
            })
            .unwrap();
        assert!(update.0.contains("replicas: \"1\""));
        assert!(update.1.contains("replicas: \"5\""));

        // pre-upgrade hook only; notify is install-only
        assert_eq!(h.executor.created_names(), vec!["web-migrate"]);
    }

    #[tokio::test]
    async fn test_blank_values_carry_previous_config() {
        let h = harness();
        h.server
            .install(
                InstallRequest::new(chart(), "default")
                    .with_name("web")
                    .with_values(Config::new("replicas: 3\n")),
            )
            .await
            .unwrap();

        let release = h.upgrade("web", "").await;
        assert_eq!(release.config.raw, "replicas: 3\n");
        assert!(release.manifest.contains("replicas: \"3\""));
    }

    #[tokio::test]
    async fn test_reset_values_uses_chart_defaults() {
        let h = harness();
        h.server
            .install(
                InstallRequest::new(chart(), "default")
                    .with_name("web")
                    .with_values(Config::new("replicas: 3\n")),
            )
            .await
            .unwrap();

        let mut req = UpdateRequest::new("web", chart());
        req.reset_values = true;
        let release = h.server.update(req).await.unwrap();
        assert!(release.manifest.contains("replicas: \"1\""));
    }

    #[tokio::test]
    async fn test_upgrade_of_unknown_release() {
        let h = harness();
        assert!(matches!(
            h.server.update(UpdateRequest::new("ghost", chart())).await,
            Err(ReleaseError::ReleaseNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_upgrade_refused_while_pending() {
        let h = harness();
        h.install("web").await;
        let mut stored = h.storage.get("web", 1).await.unwrap();
        stored.info.status = ReleaseStatus::PendingInstall;
        h.storage.update(&stored).await.unwrap();

        let err = h
            .server
            .update(UpdateRequest::new("web", chart()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::OperationInProgress {
                status: ReleaseStatus::PendingInstall,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_upgrade_without_chart() {
        let h = harness();
        h.install("web").await;
        let req = UpdateRequest {
            name: "web".into(),
            ..Default::default()
        };
        assert!(matches!(
            h.server.update(req).await,
            Err(ReleaseError::MissingChart)
        ));
    }

    #[tokio::test]
    async fn test_failed_upgrade_leaves_previous_deployed() {
        let h = harness();
        h.install("web").await;
        h.executor.fail_updates();

        let err = h
            .server
            .update(UpdateRequest::new("web", chart()))
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Cluster(_)));
        assert_eq!(h.status_of("web", 1).await, ReleaseStatus::Deployed);
        assert_eq!(h.status_of("web", 2).await, ReleaseStatus::Failed);
    }

    #[tokio::test]
    async fn test_dry_run_upgrade() {
        let h = harness();
        h.install("web").await;
        h.executor.clear();

        let mut req = UpdateRequest::new("web", chart()).with_values(Config::new("replicas: 4\n"));
        req.dry_run = true;
        let release = h.server.update(req).await.unwrap();
        assert_eq!(release.version, 2);
        assert!(!h.executor.calls().is_empty());
        assert!(!h.executor.calls().iter().any(ExecutorCall::is_mutation));
        assert!(h.storage.get("web", 2).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_manifest_blocks_upgrade() {
        let h = harness();
        h.install("web").await;
        h.executor.clear();
        h.executor.fail_validation_of("web");

        let err = h
            .server
            .update(UpdateRequest::new("web", chart()))
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Cluster(_)));
        assert!(h.storage.get("web", 2).await.is_err());
        assert_eq!(h.status_of("web", 1).await, ReleaseStatus::Deployed);
        assert!(!h.executor.calls().iter().any(ExecutorCall::is_mutation));
    }

    #[tokio::test]
    async fn test_max_history_prunes_oldest() {
        let config = ServerConfig {
            max_history: 2,
            ..Default::default()
        };
        let h = harness_with(config, StaticDiscovery::default());
        h.install("web").await;
        h.upgrade("web", "replicas: 2\n").await;
        h.upgrade("web", "replicas: 3\n").await;

        let versions: Vec<u32> = h
            .server
            .history("web", 0)
            .await
            .unwrap()
            .iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(versions, vec![3, 2]);
    }
}

mod rollback {
    use super::*;

    #[tokio::test]
    async fn test_rollback_to_previous() {
        let h = harness();
        h.install("web").await;
        h.upgrade("web", "replicas: 5\n").await;

        let release = h
            .server
            .rollback(RollbackRequest::new("web", 0))
            .await
            .unwrap();
        assert_eq!(release.version, 3);
        assert_eq!(release.status(), ReleaseStatus::Deployed);
        assert_eq!(release.info.description, "Rollback to 1");
        assert!(release.manifest.contains("replicas: \"1\""));
        assert!(release.hooks.iter().all(|hook| hook.last_run.is_none()));
        assert_eq!(h.status_of("web", 2).await, ReleaseStatus::Superseded);
    }

    #[tokio::test]
    async fn test_rollback_runs_rollback_hooks_only() {
        let h = harness();
        h.install("web").await;
        h.upgrade("web", "replicas: 5\n").await;
        h.executor.clear();

        h.server
            .rollback(RollbackRequest::new("web", 1))
            .await
            .unwrap();
        // the chart has no rollback hooks
        assert!(h.executor.created_names().is_empty());
        assert!(matches!(
            h.executor.calls().as_slice(),
            [ExecutorCall::Update { .. }]
        ));
    }

    #[tokio::test]
    async fn test_rollback_without_previous_revision() {
        let h = harness();
        h.install("web").await;
        assert!(matches!(
            h.server.rollback(RollbackRequest::new("web", 0)).await,
            Err(ReleaseError::InvalidRevision { version: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_rollback_to_future_revision() {
        let h = harness();
        h.install("web").await;
        h.upgrade("web", "replicas: 5\n").await;
        assert!(matches!(
            h.server.rollback(RollbackRequest::new("web", 7)).await,
            Err(ReleaseError::InvalidRevision { version: 7, .. })
        ));
        assert!(h.storage.get("web", 3).await.is_err());
    }

    #[tokio::test]
    async fn test_rollback_to_current_revision_redeploys_it() {
        let h = harness();
        h.install("web").await;
        h.upgrade("web", "replicas: 5\n").await;

        let release = h
            .server
            .rollback(RollbackRequest::new("web", 2))
            .await
            .unwrap();
        assert_eq!(release.version, 3);
        assert_eq!(release.status(), ReleaseStatus::Deployed);
        assert_eq!(release.info.description, "Rollback to 2");
        assert!(release.manifest.contains("replicas: \"5\""));
        assert_eq!(h.status_of("web", 2).await, ReleaseStatus::Superseded);
    }

    #[tokio::test]
    async fn test_rollback_to_pruned_revision() {
        let config = ServerConfig {
            max_history: 1,
            ..Default::default()
        };
        let h = harness_with(config, StaticDiscovery::default());
        h.install("web").await;
        h.upgrade("web", "replicas: 5\n").await;

        let err = h
            .server
            .rollback(RollbackRequest::new("web", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::InvalidRevision { ref reason, .. } if reason == "revision not found"));
    }
}

mod uninstall {
    use super::*;

    #[tokio::test]
    async fn test_uninstall_keeps_history() {
        let h = harness();
        h.install("web").await;
        h.executor.clear();

        let release = h.server.uninstall(UninstallRequest::new("web")).await.unwrap();
        assert_eq!(release.status(), ReleaseStatus::Deleted);
        assert!(release.info.deleted.is_some());

        // pre-delete hook first, then resources in uninstall order
        assert_eq!(h.executor.created_names(), vec!["web-backup"]);
        assert_eq!(h.executor.deleted_names(), vec!["web", "web-config"]);
        assert_eq!(h.status_of("web", 1).await, ReleaseStatus::Deleted);
    }

    #[tokio::test]
    async fn test_uninstall_twice() {
        let h = harness();
        h.install("web").await;
        h.server.uninstall(UninstallRequest::new("web")).await.unwrap();
        assert!(matches!(
            h.server.uninstall(UninstallRequest::new("web")).await,
            Err(ReleaseError::AlreadyDeleted(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_removes_history() {
        let h = harness();
        h.install("web").await;
        h.upgrade("web", "replicas: 2\n").await;

        h.server
            .uninstall(UninstallRequest::new("web").purge())
            .await
            .unwrap();
        assert_eq!(h.storage.release_count(), 0);
        assert!(matches!(
            h.server.history("web", 0).await,
            Err(ReleaseError::ReleaseNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_of_deleted_release() {
        let h = harness();
        h.install("web").await;
        h.server.uninstall(UninstallRequest::new("web")).await.unwrap();
        h.executor.clear();

        h.server
            .uninstall(UninstallRequest::new("web").purge())
            .await
            .unwrap();
        assert_eq!(h.storage.release_count(), 0);
        assert!(h.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deletion_errors_collected() {
        let h = harness();
        h.install("web").await;
        h.executor.fail_delete_of("web");
        h.executor.fail_delete_of("web-config");

        let err = h
            .server
            .uninstall(UninstallRequest::new("web"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Cluster(ref m) if m.contains("2 error(s)")));
        assert_eq!(h.status_of("web", 1).await, ReleaseStatus::Deleted);
    }

    #[tokio::test]
    async fn test_failed_pre_delete_hook() {
        let h = harness();
        h.install("web").await;
        h.executor.fail_create_of("web-backup");

        let err = h
            .server
            .uninstall(UninstallRequest::new("web"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::HookFailed { .. }));
        assert!(h.executor.deleted_names().is_empty());
        assert_eq!(h.status_of("web", 1).await, ReleaseStatus::Failed);
    }
}

mod queries {
    use super::*;
    use keel_kube::ListResponse;

    fn names(response: &ListResponse) -> Vec<&str> {
        response.releases.iter().map(|r| r.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_history_status_and_content() {
        let h = harness();
        h.install("web").await;
        h.upgrade("web", "replicas: 2\n").await;

        let history = h.server.history("web", 1).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 2);

        let status = h.server.status("web", 0).await.unwrap();
        assert_eq!(status.version, 2);
        assert_eq!(status.info.status, ReleaseStatus::Deployed);
        assert_eq!(status.notes.as_deref(), Some("Installed web\n"));

        let first = h.server.content("web", 1).await.unwrap();
        assert_eq!(first.status(), ReleaseStatus::Superseded);
        assert!(first.manifest.contains("replicas: \"1\""));
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let h = harness();
        for name in ["gamma", "alpha", "beta", "delta"] {
            h.install(name).await;
        }
        h.upgrade("alpha", "replicas: 2\n").await;
        h.server.uninstall(UninstallRequest::new("beta")).await.unwrap();

        let all = h.server.list(ListRequest::default()).await.unwrap();
        assert_eq!(names(&all), vec!["alpha", "delta", "gamma"]);
        assert_eq!(all.total, 3);
        assert_eq!(all.releases[0].version, 2);
        assert_eq!(all.next, None);

        let deleted = h
            .server
            .list(ListRequest {
                status_codes: vec![ReleaseStatus::Deleted],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(names(&deleted), vec!["beta"]);

        let page = h
            .server
            .list(ListRequest {
                limit: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(names(&page), vec!["alpha"]);
        assert_eq!(page.next.as_deref(), Some("delta"));

        let rest = h
            .server
            .list(ListRequest {
                offset: page.next.clone(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(names(&rest), vec!["delta", "gamma"]);

        let filtered = h
            .server
            .list(ListRequest {
                filter: Some("^(g|d)".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(names(&filtered), vec!["delta", "gamma"]);
    }

    #[tokio::test]
    async fn test_list_default_limit_from_config() {
        let config = ServerConfig {
            list_default_limit: 2,
            ..Default::default()
        };
        let h = harness_with(config, StaticDiscovery::default());
        for name in ["a1", "a2", "a3"] {
            h.install(name).await;
        }
        let page = h.server.list(ListRequest::default()).await.unwrap();
        assert_eq!(names(&page), vec!["a1", "a2"]);
        assert_eq!(page.total, 3);
        assert_eq!(page.next.as_deref(), Some("a3"));
    }

    #[tokio::test]
    async fn test_list_invalid_filter() {
        let h = harness();
        let err = h
            .server
            .list(ListRequest {
                filter: Some("(".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Config(_)));
    }
}

mod release_tests {
    use super::*;

    #[tokio::test]
    async fn test_passing_tests() {
        let h = harness();
        h.install("web").await;
        h.executor.clear();

        let report = h.server.run_release_test("web", None).await.unwrap();
        assert!(report.passed);
        assert_eq!(report.executed, 1);
        assert_eq!(h.executor.created_names(), vec!["web-test"]);

        let stored = h.storage.get("web", 1).await.unwrap();
        let test_hook = stored.hooks.iter().find(|hook| hook.name == "web-test").unwrap();
        assert!(test_hook.last_run.is_some());
    }

    #[tokio::test]
    async fn test_failing_tests_run_failure_hooks() {
        let h = harness();
        h.install("web").await;
        h.executor.clear();
        h.executor.fail_readiness_of("web-test");

        let report = h.server.run_release_test("web", None).await.unwrap();
        assert!(!report.passed);
        assert_eq!(report.executed, 1);
        assert!(report.message.unwrap().contains("web-test"));
        assert_eq!(
            h.executor.created_names(),
            vec!["web-test", "web-test-cleanup"]
        );
    }
}
