//! Release names: validation, reuse and generation

use once_cell::sync::Lazy;
use rand::seq::IndexedRandom;
use regex::Regex;
use tracing::{info, warn};

use crate::error::{ReleaseError, Result};
use crate::storage::StorageDriver;

/// Longest accepted release name
pub const MAX_NAME_LEN: usize = 53;

/// Attempts made to find a free generated name
pub const MAX_NAME_TRIES: u32 = 5;

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9])+$").expect("name regex is valid")
});

/// Check a user-supplied release name
pub fn validate_release_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ReleaseError::MissingRelease);
    }
    if name.len() > MAX_NAME_LEN || !NAME_PATTERN.is_match(name) {
        return Err(ReleaseError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Source of candidate release names
pub trait NameGenerator: Send + Sync {
    fn generate(&self) -> String;
}

const ADJECTIVES: &[&str] = &[
    "amber", "bold", "brave", "calm", "clever", "crisp", "dusty", "eager", "fancy", "gentle",
    "giddy", "hasty", "icy", "jolly", "keen", "lively", "lucky", "mellow", "nimble", "odd",
    "plucky", "quiet", "rusty", "silly", "snowy", "swift", "tidy", "vocal", "wise", "zesty",
];

const ANIMALS: &[&str] = &[
    "badger", "beaver", "bison", "camel", "crab", "dingo", "eagle", "ferret", "gecko", "heron",
    "ibis", "jaguar", "koala", "lemur", "lynx", "marmot", "newt", "otter", "panda", "quail",
    "raven", "seal", "sloth", "tapir", "toad", "urchin", "vulture", "walrus", "yak", "zebra",
];

/// `adjective-animal` names
#[derive(Debug, Default, Clone, Copy)]
pub struct MonikerGenerator;

impl NameGenerator for MonikerGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::rng();
        let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("quiet");
        let animal = ANIMALS.choose(&mut rng).copied().unwrap_or("otter");
        format!("{}-{}", adjective, animal)
    }
}

/// Hands out release names that are free in history
pub struct NameAllocator<'a> {
    generator: &'a dyn NameGenerator,
}

impl Default for NameAllocator<'static> {
    fn default() -> Self {
        Self {
            generator: &MonikerGenerator,
        }
    }
}

impl<'a> NameAllocator<'a> {
    pub fn new(generator: &'a dyn NameGenerator) -> Self {
        Self { generator }
    }

    /// Decide the name of a new release.
    ///
    /// With an explicit `start` name the name is granted when it has no
    /// history, or when `reuse` is set and its newest revision is deleted
    /// or failed. Without one, generated names are tried until one has no
    /// history.
    pub async fn unique_name(
        &self,
        storage: &dyn StorageDriver,
        start: &str,
        reuse: bool,
    ) -> Result<String> {
        if !start.is_empty() {
            return self.claim(storage, start, reuse).await;
        }

        for attempt in 1..=MAX_NAME_TRIES {
            let mut name = self.generator.generate();
            if name.len() > MAX_NAME_LEN {
                name.truncate(MAX_NAME_LEN);
            }
            match storage.get(&name, 1).await {
                Err(ReleaseError::ReleaseNotFound(_)) => return Ok(name),
                Ok(_) => info!(name = %name, attempt, "generated name is taken"),
                Err(e) => warn!(name = %name, attempt, error = %e, "name lookup failed"),
            }
        }
        Err(ReleaseError::NameExhausted(MAX_NAME_TRIES))
    }

    async fn claim(&self, storage: &dyn StorageDriver, name: &str, reuse: bool) -> Result<String> {
        if name.len() > MAX_NAME_LEN {
            return Err(ReleaseError::NameTooLong {
                name: name.to_string(),
                max: MAX_NAME_LEN,
            });
        }
        validate_release_name(name)?;

        let history = match storage.history(name).await {
            Ok(history) => history,
            Err(ReleaseError::ReleaseNotFound(_)) => return Ok(name.to_string()),
            Err(e) => return Err(e),
        };
        let Some(latest) = history.iter().max_by_key(|r| r.version) else {
            return Ok(name.to_string());
        };

        if !reuse {
            return Err(ReleaseError::ReleaseExists(name.to_string()));
        }
        if latest.status().allows_name_reuse() {
            info!(release = %name, status = %latest.status(), "reusing release name");
            return Ok(name.to_string());
        }
        Err(ReleaseError::NameInUse(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryDriver, OperationCounts};
    use crate::storage::test_support::release;
    use keel_core::ReleaseStatus;
    use std::sync::Mutex;

    /// Hands out a fixed sequence, then repeats the last entry
    struct Sequence(Mutex<Vec<String>>);

    impl Sequence {
        fn new(names: &[&str]) -> Self {
            Self(Mutex::new(names.iter().rev().map(|s| s.to_string()).collect()))
        }
    }

    impl NameGenerator for Sequence {
        fn generate(&self) -> String {
            let mut names = self.0.lock().unwrap();
            if names.len() > 1 {
                names.pop().unwrap()
            } else {
                names[0].clone()
            }
        }
    }

    #[test]
    fn test_validate_release_name() {
        assert!(validate_release_name("web").is_ok());
        assert!(validate_release_name("web-1.2_a").is_ok());
        assert!(matches!(
            validate_release_name(""),
            Err(ReleaseError::MissingRelease)
        ));
        let long = "a".repeat(54);
        for bad in ["-web", "web-", "we b", "web!", long.as_str()] {
            assert!(
                matches!(validate_release_name(bad), Err(ReleaseError::InvalidName(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_moniker_shape() {
        let name = MonikerGenerator.generate();
        assert!(validate_release_name(&name).is_ok(), "{name}");
        assert_eq!(name.split('-').count(), 2);
    }

    #[tokio::test]
    async fn test_explicit_name_without_history() {
        let storage = MemoryDriver::new();
        let name = NameAllocator::default()
            .unique_name(&storage, "web", false)
            .await
            .unwrap();
        assert_eq!(name, "web");
    }

    #[tokio::test]
    async fn test_explicit_name_too_long() {
        let storage = MemoryDriver::new();
        let long = "a".repeat(54);
        let err = NameAllocator::default()
            .unique_name(&storage, &long, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::NameTooLong { max: 53, .. }));
    }

    #[tokio::test]
    async fn test_malformed_name_rejected_before_lookup() {
        let storage = MemoryDriver::new();
        let err = NameAllocator::default()
            .unique_name(&storage, "../escape", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::InvalidName(_)));
        assert_eq!(storage.operation_counts(), OperationCounts::default());
    }

    #[tokio::test]
    async fn test_existing_name_without_reuse_conflicts() {
        let storage =
            MemoryDriver::with_releases(vec![release("web", 1, ReleaseStatus::Deleted)]);
        let err = NameAllocator::default()
            .unique_name(&storage, "web", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::ReleaseExists(_)));
        assert!(err.to_string().contains("keel uninstall --purge web"));
    }

    #[tokio::test]
    async fn test_reuse_checks_newest_revision() {
        let storage = MemoryDriver::with_releases(vec![
            release("web", 1, ReleaseStatus::Superseded),
            release("web", 2, ReleaseStatus::Deleted),
        ]);
        let allocator = NameAllocator::default();
        assert_eq!(allocator.unique_name(&storage, "web", true).await.unwrap(), "web");

        let storage = MemoryDriver::with_releases(vec![
            release("web", 1, ReleaseStatus::Failed),
            release("web", 2, ReleaseStatus::Deployed),
        ]);
        assert!(matches!(
            allocator.unique_name(&storage, "web", true).await,
            Err(ReleaseError::NameInUse(_))
        ));
    }

    #[tokio::test]
    async fn test_generated_name_retries_until_free() {
        let storage = MemoryDriver::with_releases(vec![
            release("taken-one", 1, ReleaseStatus::Deployed),
            release("taken-two", 1, ReleaseStatus::Deployed),
        ]);
        let generator = Sequence::new(&["taken-one", "taken-two", "free-name"]);
        let name = NameAllocator::new(&generator)
            .unique_name(&storage, "", false)
            .await
            .unwrap();
        assert_eq!(name, "free-name");
    }

    #[tokio::test]
    async fn test_generated_names_truncated() {
        let storage = MemoryDriver::new();
        let long = format!("{}z", "a".repeat(60));
        let generator = Sequence::new(&[&long]);
        let name = NameAllocator::new(&generator)
            .unique_name(&storage, "", false)
            .await
            .unwrap();
        assert_eq!(name.len(), MAX_NAME_LEN);
    }

    #[tokio::test]
    async fn test_generation_exhausted() {
        let storage = MemoryDriver::with_releases(vec![release("same", 1, ReleaseStatus::Deployed)]);
        let generator = Sequence::new(&["same"]);
        let err = NameAllocator::new(&generator)
            .unique_name(&storage, "", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::NameExhausted(5)));
        assert_eq!(storage.operation_counts().gets, 5);
    }
}
