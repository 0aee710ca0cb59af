//! In-memory storage driver
//!
//! Keeps history in process memory. Used by tests and by dry wiring where
//! nothing should outlive the process.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{StorageDriver, sort_newest_first};
use crate::error::{ReleaseError, Result};
use crate::release::Release;

type Store = HashMap<String, BTreeMap<u32, Release>>;

#[derive(Clone, Default)]
pub struct MemoryDriver {
    /// name -> version -> release
    store: Arc<RwLock<Store>>,
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed, for assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated with the given revisions
    pub fn with_releases(releases: Vec<Release>) -> Self {
        let driver = Self::new();
        {
            let mut store = write(&driver.store);
            for release in releases {
                store
                    .entry(release.name.clone())
                    .or_default()
                    .insert(release.version, release);
            }
        }
        driver
    }

    pub fn operation_counts(&self) -> OperationCounts {
        read(&self.operations).clone()
    }

    pub fn reset_counts(&self) {
        *write(&self.operations) = OperationCounts::default();
    }

    pub fn release_count(&self) -> usize {
        read(&self.store).values().map(|versions| versions.len()).sum()
    }

    fn count(&self, op: fn(&mut OperationCounts) -> &mut usize) {
        *op(&mut write(&self.operations)) += 1;
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, name: &str, version: u32) -> Result<Release> {
        self.count(|o| &mut o.gets);
        read(&self.store)
            .get(name)
            .and_then(|versions| versions.get(&version))
            .cloned()
            .ok_or_else(|| ReleaseError::ReleaseNotFound(name.to_string()))
    }

    async fn history(&self, name: &str) -> Result<Vec<Release>> {
        self.count(|o| &mut o.lists);
        let mut releases: Vec<Release> = read(&self.store)
            .get(name)
            .map(|versions| versions.values().cloned().collect())
            .unwrap_or_default();

        if releases.is_empty() {
            return Err(ReleaseError::ReleaseNotFound(name.to_string()));
        }
        sort_newest_first(&mut releases);
        Ok(releases)
    }

    async fn list(&self) -> Result<Vec<Release>> {
        self.count(|o| &mut o.lists);
        Ok(read(&self.store)
            .values()
            .flat_map(|versions| versions.values().cloned())
            .collect())
    }

    async fn create(&self, release: &Release) -> Result<()> {
        self.count(|o| &mut o.creates);
        let mut store = write(&self.store);
        let versions = store.entry(release.name.clone()).or_default();
        if versions.contains_key(&release.version) {
            return Err(ReleaseError::ReleaseExists(release.name.clone()));
        }
        versions.insert(release.version, release.clone());
        Ok(())
    }

    async fn update(&self, release: &Release) -> Result<()> {
        self.count(|o| &mut o.updates);
        write(&self.store)
            .entry(release.name.clone())
            .or_default()
            .insert(release.version, release.clone());
        Ok(())
    }

    async fn delete(&self, name: &str, version: u32) -> Result<Release> {
        self.count(|o| &mut o.deletes);
        let mut store = write(&self.store);
        let versions = store
            .get_mut(name)
            .ok_or_else(|| ReleaseError::ReleaseNotFound(name.to_string()))?;
        let release = versions
            .remove(&version)
            .ok_or_else(|| ReleaseError::ReleaseNotFound(name.to_string()))?;
        if versions.is_empty() {
            store.remove(name);
        }
        Ok(release)
    }
}
