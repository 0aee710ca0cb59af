//! File-based storage driver
//!
//! Each revision lives at `<base>/<name>/v<version>.json`, compressed with
//! the configured method. Reads detect the method from the payload, so
//! changing the setting keeps older records readable. Records written before the current format are
//! flat YAML files at `<base>/<name>/v<version>.yaml`; they are still
//! readable and can be rewritten in place with [`FileDriver::repair`].

use async_trait::async_trait;
use keel_core::{Chart, ChartMetadata, Config, ReleaseStatus};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{
    CompressionMethod, StorageDriver, compress, decompress, deserialize_release,
    serialize_release, sort_newest_first,
};
use crate::error::{ReleaseError, Result};
use crate::release::{Release, ReleaseInfo};

/// Flat record written by earlier versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRecord {
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub chart: Option<String>,
    #[serde(default)]
    pub chart_version: Option<String>,
    #[serde(default)]
    pub manifest: String,
    #[serde(default)]
    pub config: String,
}

impl LegacyRecord {
    /// Best-effort conversion into the current record
    pub fn migrate(self) -> Release {
        let status = self.status.parse().unwrap_or_else(|_| {
            warn!(release = %self.name, status = %self.status, "unknown legacy status");
            ReleaseStatus::Unknown
        });
        let chart_version = self
            .chart_version
            .as_deref()
            .and_then(|v| Version::parse(v.trim_start_matches('v')).ok())
            .unwrap_or_else(|| Version::new(0, 0, 0));
        let chart_name = self.chart.unwrap_or_else(|| self.name.clone());

        Release {
            info: ReleaseInfo::new(status, "Migrated from a legacy record"),
            chart: Chart::new(ChartMetadata::new(chart_name, chart_version)),
            config: Config::new(self.config),
            manifest: self.manifest,
            hooks: vec![],
            notes: None,
            name: self.name,
            namespace: self.namespace,
            version: self.version,
        }
    }
}

pub struct FileDriver {
    base_dir: PathBuf,
    compression: CompressionMethod,
}

impl FileDriver {
    pub fn new(base_dir: impl Into<PathBuf>, compression: CompressionMethod) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            compression,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn release_dir(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    fn release_path(&self, name: &str, version: u32) -> PathBuf {
        self.release_dir(name).join(format!("v{}.json", version))
    }

    fn legacy_path(&self, name: &str, version: u32) -> PathBuf {
        self.release_dir(name).join(format!("v{}.yaml", version))
    }

    fn write_release(&self, release: &Release) -> Result<()> {
        let path = self.release_path(&release.name, release.version);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serialize_release(release)?;
        std::fs::write(&path, compress(&json, self.compression)?)?;
        debug!(path = %path.display(), "wrote release record");
        Ok(())
    }

    /// Read one revision.
    ///
    /// A legacy record yields [`ReleaseError::OutOfDate`] carrying the
    /// migrated release; the caller may persist it with [`repair`](Self::repair).
    pub fn load_record(&self, name: &str, version: u32) -> Result<Release> {
        let path = self.release_path(name, version);
        if path.exists() {
            let data = std::fs::read(&path)?;
            return deserialize_release(&decompress(&data, CompressionMethod::detect(&data))?);
        }

        let legacy = self.legacy_path(name, version);
        if legacy.exists() {
            let record: LegacyRecord = serde_yaml::from_str(&std::fs::read_to_string(&legacy)?)?;
            return Err(ReleaseError::OutOfDate {
                migrated: Box::new(record.migrate()),
            });
        }

        Err(ReleaseError::ReleaseNotFound(name.to_string()))
    }

    /// Rewrite a legacy record in the current format. Current records are
    /// returned untouched.
    pub fn repair(&self, name: &str, version: u32) -> Result<Release> {
        match self.load_record(name, version) {
            Err(ReleaseError::OutOfDate { migrated }) => {
                self.write_release(&migrated)?;
                std::fs::remove_file(self.legacy_path(name, version))?;
                warn!(release = %name, version, "repaired legacy release record");
                Ok(*migrated)
            }
            other => other,
        }
    }

    /// Like [`load_record`](Self::load_record), but accepts migrated records
    fn read_lenient(&self, name: &str, version: u32) -> Result<Release> {
        match self.load_record(name, version) {
            Err(ReleaseError::OutOfDate { migrated }) => {
                warn!(
                    release = %name,
                    version,
                    "release record is in a legacy format, run repair to rewrite it"
                );
                Ok(*migrated)
            }
            other => other,
        }
    }

    /// Revisions present on disk for a release, current or legacy
    fn versions(&self, name: &str) -> Result<Vec<u32>> {
        let dir = self.release_dir(name);
        if !dir.is_dir() {
            return Ok(vec![]);
        }
        let mut versions: Vec<u32> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .is_some_and(|ext| ext == "json" || ext == "yaml")
            })
            .filter_map(|p| {
                p.file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.strip_prefix('v'))
                    .and_then(|s| s.parse().ok())
            })
            .collect();
        versions.sort_unstable();
        versions.dedup();
        Ok(versions)
    }

    fn release_names(&self) -> Result<Vec<String>> {
        Ok(std::fs::read_dir(&self.base_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(String::from))
            .collect())
    }
}

#[async_trait]
impl StorageDriver for FileDriver {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, name: &str, version: u32) -> Result<Release> {
        self.read_lenient(name, version)
    }

    async fn history(&self, name: &str) -> Result<Vec<Release>> {
        let mut releases = Vec::new();
        for version in self.versions(name)? {
            let release = self.read_lenient(name, version).inspect_err(|e| {
                warn!(release = %name, version, error = %e, "unreadable release record");
            })?;
            releases.push(release);
        }
        if releases.is_empty() {
            return Err(ReleaseError::ReleaseNotFound(name.to_string()));
        }
        sort_newest_first(&mut releases);
        Ok(releases)
    }

    async fn list(&self) -> Result<Vec<Release>> {
        let mut releases = Vec::new();
        for name in self.release_names()? {
            match self.history(&name).await {
                Ok(history) => releases.extend(history),
                Err(ReleaseError::ReleaseNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(releases)
    }

    async fn create(&self, release: &Release) -> Result<()> {
        if self.release_path(&release.name, release.version).exists()
            || self.legacy_path(&release.name, release.version).exists()
        {
            return Err(ReleaseError::ReleaseExists(release.name.clone()));
        }
        self.write_release(release)
    }

    async fn update(&self, release: &Release) -> Result<()> {
        self.write_release(release)?;
        let legacy = self.legacy_path(&release.name, release.version);
        if legacy.exists() {
            std::fs::remove_file(legacy)?;
        }
        Ok(())
    }

    async fn delete(&self, name: &str, version: u32) -> Result<Release> {
        let release = self.read_lenient(name, version)?;
        for path in [self.release_path(name, version), self.legacy_path(name, version)] {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }

        let dir = self.release_dir(name);
        if dir.exists() && std::fs::read_dir(&dir)?.next().is_none() {
            let _ = std::fs::remove_dir(&dir);
        }
        Ok(release)
    }
}
