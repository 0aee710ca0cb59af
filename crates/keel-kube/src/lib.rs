//! Keel Kube - release orchestration for Keel
//!
//! This crate provides:
//! - **Release Server**: install, upgrade, rollback, uninstall, history and tests
//! - **Manifest Classification**: rendered files split into hooks and resources, in apply order
//! - **Hooks**: lifecycle hooks run sequentially by weight around each operation
//! - **Naming**: release name validation, reuse rules and generated names
//! - **Storage Drivers**: release history in local files, ConfigMaps or memory
//! - **Cluster Executors**: in-process kube-rs execution or a remote release agent
//! - **Annotations**: Helm-compatible hook annotations with Keel extensions

pub mod actions;
pub mod annotations;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod manifest;
pub mod naming;
pub mod release;
pub mod server;
pub mod sort;
pub mod storage;
pub mod values;

pub use actions::{
    InstallRequest, ListRequest, ListResponse, RollbackRequest, StatusResponse, TestReport,
    UninstallRequest, UpdateRequest,
};
pub use capabilities::{
    ApiGroup, Discovery, KubeDiscovery, StaticDiscovery, get_version_set, resolve_capabilities,
};
pub use config::{ExecutorConfig, ServerConfig, StorageBackend, StorageConfig};
pub use error::{ReleaseError, Result};
pub use executor::{ClusterExecutor, ExecutorCall, LocalExecutor, RecordingExecutor, RemoteExecutor};
pub use hooks::{Hook, HookEvent, HookExecutor};
pub use manifest::{Manifest, SimpleHead, UnknownHookPolicy, sort_manifests, split_manifests};
pub use naming::{MonikerGenerator, NameAllocator, NameGenerator, validate_release_name};
pub use release::{Release, ReleaseInfo};
pub use server::{ReleaseServer, check_compatibility};
pub use sort::{SortOrder, sort_by_hook_weight, sort_by_kind};
pub use storage::{
    CompressionMethod, ConfigMapsDriver, FileDriver, MemoryDriver, OperationCounts, StorageDriver,
};
pub use values::reuse_values;
