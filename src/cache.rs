//! On-disk JSON caches for listings, item details and profiles.

use crate::config::AppConfig;
use crate::types::{ContributionRow, DetailRecord, ItemKind, RepoId};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;

/// A string-keyed map mirrored to a JSON object file.
///
/// The whole map is rewritten on every flush, through a temporary file that is renamed
/// over the previous one.
#[derive(Debug)]
pub struct JsonStore<V> {
    path: PathBuf,
    entries: BTreeMap<String, V>,
}

impl<V: Serialize + DeserializeOwned> JsonStore<V> {
    /// Reads `path`, or starts empty when it does not exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read cache file {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| {
                format!("cache file {} is not a valid JSON object", path.display())
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: String, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let bytes = serde_json::to_vec(&self.entries)?;
        let mut file = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
        file.write_all(&bytes)?;
        file.persist(&self.path)
            .with_context(|| format!("failed to write cache file {}", self.path.display()))?;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct DetailStore {
    store: JsonStore<DetailRecord>,
    unflushed: usize,
}

/// The two caches of a contribution pipeline.
///
/// Timeframe-level entries are never refreshed once present; delete the key from the
/// file to force a refetch. The item-level file is written every `flush_interval` new
/// records and again by [`ContributionCache::flush_all`].
#[derive(Debug)]
pub struct ContributionCache {
    windows: Mutex<JsonStore<Vec<ContributionRow>>>,
    details: Mutex<DetailStore>,
    flush_interval: usize,
}

impl ContributionCache {
    pub fn open(
        windows_path: impl Into<PathBuf>,
        details_path: impl Into<PathBuf>,
        flush_interval: usize,
    ) -> Result<Self> {
        Ok(Self {
            windows: Mutex::new(JsonStore::load(windows_path)?),
            details: Mutex::new(DetailStore {
                store: JsonStore::load(details_path)?,
                unflushed: 0,
            }),
            flush_interval: flush_interval.max(1),
        })
    }

    /// Opens the files `kind`'s pipeline uses under the configured data directory.
    pub fn for_pipeline(config: &AppConfig, kind: ItemKind) -> Result<Self> {
        let files = kind.files();
        Self::open(
            config.data_path(files.windows),
            config.data_path(files.details),
            config.detail_flush_interval,
        )
    }

    /// Key of an item-level entry.
    pub fn item_key(repo: &RepoId, number: u64) -> String {
        format!("{}_{}_{}", repo.owner, repo.repo, number)
    }

    pub fn window(&self, key: &str) -> Option<Vec<ContributionRow>> {
        lock(&self.windows).get(key).cloned()
    }

    /// Records a work unit's rows and writes the timeframe-level file.
    pub fn store_window(&self, key: String, rows: Vec<ContributionRow>) -> Result<()> {
        let mut windows = lock(&self.windows);
        windows.insert(key, rows);
        windows.flush()
    }

    pub fn detail(&self, key: &str) -> Option<DetailRecord> {
        lock(&self.details).store.get(key).cloned()
    }

    pub fn store_detail(&self, key: String, record: DetailRecord) -> Result<()> {
        let mut details = lock(&self.details);
        details.store.insert(key, record);
        details.unflushed += 1;
        if details.unflushed >= self.flush_interval {
            details.store.flush()?;
            details.unflushed = 0;
        }
        Ok(())
    }

    pub fn flush_details(&self) -> Result<()> {
        let mut details = lock(&self.details);
        details.store.flush()?;
        details.unflushed = 0;
        Ok(())
    }

    pub fn flush_all(&self) -> Result<()> {
        lock(&self.windows).flush()?;
        self.flush_details()
    }

    pub fn window_count(&self) -> usize {
        lock(&self.windows).len()
    }

    pub fn detail_count(&self) -> usize {
        lock(&self.details).store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str) -> DetailRecord {
        DetailRecord {
            title: title.to_string(),
            comment_count: 1,
            commented_by_target: false,
            review_count: Some(0),
            reviewed_by_target: Some(false),
            elapsed_days: 4,
        }
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonStore<String> = JsonStore::load(dir.path().join("absent.json")).unwrap();
        assert!(store.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_flush_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let mut store = JsonStore::load(&path).unwrap();
        store.insert("b".to_string(), 2u32);
        store.insert("a".to_string(), 1u32);
        store.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"a":1,"b":2}"#);
        let reloaded: JsonStore<u32> = JsonStore::load(&path).unwrap();
        assert_eq!(reloaded.get("b"), Some(&2));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{ truncated").unwrap();
        assert!(JsonStore::<u32>::load(&path).is_err());
    }

    #[test]
    fn test_details_flush_every_interval() {
        let dir = tempfile::tempdir().unwrap();
        let details_path = dir.path().join("details.json");
        let cache =
            ContributionCache::open(dir.path().join("windows.json"), &details_path, 2).unwrap();

        cache.store_detail("o_r_1".to_string(), record("one")).unwrap();
        assert!(!details_path.exists());

        cache.store_detail("o_r_2".to_string(), record("two")).unwrap();
        let on_disk: JsonStore<DetailRecord> = JsonStore::load(&details_path).unwrap();
        assert_eq!(on_disk.len(), 2);

        cache.store_detail("o_r_3".to_string(), record("three")).unwrap();
        assert_eq!(JsonStore::<DetailRecord>::load(&details_path).unwrap().len(), 2);
        cache.flush_all().unwrap();
        assert_eq!(JsonStore::<DetailRecord>::load(&details_path).unwrap().len(), 3);
    }

    #[test]
    fn test_item_key_format() {
        assert_eq!(
            ContributionCache::item_key(&RepoId::new("facebook", "react"), 42),
            "facebook_react_42"
        );
    }
}
