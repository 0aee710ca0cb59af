//! Release history storage
//!
//! History is append-only and keyed by release name: every revision of a
//! release is one record. Three backends are provided:
//! - **File**: compressed JSON under a local directory (the CLI default)
//! - **ConfigMaps**: base64 records in ConfigMaps of one namespace
//! - **Memory**: process-local, for tests and dry wiring

mod configmaps;
mod file;
mod memory;

pub use configmaps::ConfigMapsDriver;
pub use file::{FileDriver, LegacyRecord};
pub use memory::{MemoryDriver, OperationCounts};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ReleaseError, Result};
use crate::release::Release;

/// Persistence of release revisions
///
/// `create` must refuse a `(name, version)` that already exists with
/// [`ReleaseError::ReleaseExists`]; the server relies on it to detect two
/// operations racing for the same revision.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Short backend name, for logs
    fn name(&self) -> &'static str;

    async fn get(&self, name: &str, version: u32) -> Result<Release>;

    /// Every revision of a release, newest first. No revisions is
    /// [`ReleaseError::ReleaseNotFound`].
    async fn history(&self, name: &str) -> Result<Vec<Release>>;

    /// Every stored revision of every release, in no particular order
    async fn list(&self) -> Result<Vec<Release>>;

    async fn create(&self, release: &Release) -> Result<()>;

    /// Overwrite a revision, creating it if needed
    async fn update(&self, release: &Release) -> Result<()>;

    async fn delete(&self, name: &str, version: u32) -> Result<Release>;

    async fn get_latest(&self, name: &str) -> Result<Release> {
        self.history(name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ReleaseError::ReleaseNotFound(name.to_string()))
    }

    /// Delete all revisions of a release, returning them newest first
    async fn delete_all(&self, name: &str) -> Result<Vec<Release>> {
        let history = self.history(name).await?;
        for release in &history {
            self.delete(&release.name, release.version).await?;
        }
        Ok(history)
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        match self.get_latest(name).await {
            Ok(_) => Ok(true),
            Err(ReleaseError::ReleaseNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Compression applied to stored records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum CompressionMethod {
    None,

    /// Readable by standard tooling
    Gzip { level: u32 },

    /// Smaller and faster than gzip
    Zstd { level: i32 },
}

impl Default for CompressionMethod {
    fn default() -> Self {
        Self::Zstd { level: 3 }
    }
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

impl CompressionMethod {
    /// Label value recorded next to a stored record
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip { .. } => "gzip",
            Self::Zstd { .. } => "zstd",
        }
    }

    /// Identify the method a payload was written with from its leading
    /// magic bytes. Anything that is neither gzip nor zstd is plain.
    pub fn detect(data: &[u8]) -> Self {
        if data.starts_with(&GZIP_MAGIC) {
            Self::Gzip { level: 6 }
        } else if data.starts_with(&ZSTD_MAGIC) {
            Self::Zstd { level: 3 }
        } else {
            Self::None
        }
    }

    /// Inverse of [`label`](Self::label); decoding ignores the level
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "none" => Some(Self::None),
            "gzip" => Some(Self::Gzip { level: 6 }),
            "zstd" => Some(Self::Zstd { level: 3 }),
            _ => None,
        }
    }
}

#[must_use = "compression result should be used"]
pub fn compress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Gzip { level } => {
            use std::io::Write;
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(level));
            encoder
                .write_all(data)
                .map_err(|e| ReleaseError::Storage(format!("gzip: {}", e)))?;
            encoder
                .finish()
                .map_err(|e| ReleaseError::Storage(format!("gzip: {}", e)))
        }
        CompressionMethod::Zstd { level } => zstd::encode_all(std::io::Cursor::new(data), level)
            .map_err(|e| ReleaseError::Storage(format!("zstd: {}", e))),
    }
}

#[must_use = "decompression result should be used"]
pub fn decompress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Gzip { .. } => {
            use std::io::Read;
            let mut decoder = flate2::read::GzDecoder::new(data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| ReleaseError::Storage(format!("gzip: {}", e)))?;
            Ok(out)
        }
        CompressionMethod::Zstd { .. } => zstd::decode_all(std::io::Cursor::new(data))
            .map_err(|e| ReleaseError::Storage(format!("zstd: {}", e))),
    }
}

pub fn serialize_release(release: &Release) -> Result<Vec<u8>> {
    serde_json::to_vec(release).map_err(|e| ReleaseError::Serialization(e.to_string()))
}

pub fn deserialize_release(data: &[u8]) -> Result<Release> {
    serde_json::from_slice(data).map_err(|e| ReleaseError::Serialization(e.to_string()))
}

/// JSON, compressed, then base64
#[must_use = "encoded data should be used for storage"]
pub fn encode_for_storage(release: &Release, compression: CompressionMethod) -> Result<String> {
    let json = serialize_release(release)?;
    let compressed = compress(&json, compression)?;
    Ok(base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        &compressed,
    ))
}

pub fn decode_from_storage(data: &str, compression: CompressionMethod) -> Result<Release> {
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, data)
        .map_err(|e| ReleaseError::Serialization(format!("base64 decode error: {}", e)))?;
    let decompressed = decompress(&decoded, compression)?;
    deserialize_release(&decompressed)
}

pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_NAME: &str = "keel.sh/release-name";
pub const LABEL_VERSION: &str = "keel.sh/release-version";
pub const LABEL_STATUS: &str = "keel.sh/release-status";
pub const LABEL_COMPRESSION: &str = "keel.sh/compression";

/// Labels applied to every stored record
pub fn storage_labels(release: &Release) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_MANAGED_BY.to_string(), "keel".to_string());
    labels.insert(LABEL_NAME.to_string(), release.name.clone());
    labels.insert(LABEL_VERSION.to_string(), release.version.to_string());
    labels.insert(LABEL_STATUS.to_string(), release.status().to_string());
    labels
}

/// Newest first
pub(crate) fn sort_newest_first(releases: &mut [Release]) {
    releases.sort_by(|a, b| b.version.cmp(&a.version));
}
