//! Cache metadata store
//!
//! JSON file mapping cache keys to built images, kept under the user cache
//! directory. Writes go through a temp file and rename so a crash mid-write
//! cannot leave a torn store. An unreadable store degrades to always-miss:
//! builds still work, they just stop being cached hits until `cache clear`.

use crate::error::{StevedoreError, StevedoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

const STORE_FILE: &str = "build-cache.json";
const STORE_VERSION: u32 = 1;

/// One cached build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub image_reference: String,
    /// Human-readable origin: directory path, git URL, or command line
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub hits: u64,
    /// Engine-reported image size, when it could be queried after the build
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    entries: HashMap<String, CacheEntry>,
}

impl Default for StoreFile {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// Aggregate numbers for `cache stats`.
#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_hits: u64,
    /// Sum over entries with a known size; an estimate, not an audit
    pub total_size_bytes: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub store_path: PathBuf,
}

pub struct CacheStore {
    root: PathBuf,
    state: StoreFile,
    /// Set when the on-disk store could not be parsed; lookups miss and the
    /// next successful write replaces the corrupt file.
    degraded: bool,
}

impl CacheStore {
    /// Open the store rooted at `root`, creating the directory if needed.
    pub fn open(root: &Path) -> StevedoreResult<Self> {
        std::fs::create_dir_all(root)
            .map_err(|e| StevedoreError::io(format!("create cache dir {}", root.display()), e))?;

        let path = root.join(STORE_FILE);
        // Corruption degrades to always-miss instead of failing the build;
        // the error is still materialized so the log names the store file.
        let degrade = |reason: String| {
            let err = StevedoreError::CacheStoreCorruption {
                path: path.clone(),
                reason,
            };
            warn!(error = %err, "degrading to always-miss");
            (StoreFile::default(), true)
        };
        let (state, degraded) = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<StoreFile>(&text) {
                Ok(state) if state.version == STORE_VERSION => (state, false),
                Ok(state) => degrade(format!("unsupported store version {}", state.version)),
                Err(e) => degrade(e.to_string()),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (StoreFile::default(), false),
            Err(e) => degrade(e.to_string()),
        };

        Ok(Self {
            root: root.to_path_buf(),
            state,
            degraded,
        })
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn store_path(&self) -> PathBuf {
        self.root.join(STORE_FILE)
    }

    /// Look up a cache key. Degraded stores always miss.
    pub fn lookup(&self, key: &str) -> Option<&CacheEntry> {
        if self.degraded {
            return None;
        }
        self.state.entries.get(key)
    }

    /// Record a fresh build under `key` and persist.
    pub fn record(
        &mut self,
        key: &str,
        image_reference: &str,
        source: &str,
        size_bytes: Option<u64>,
    ) -> StevedoreResult<()> {
        self.absorb_disk();
        let now = Utc::now();
        self.state.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                image_reference: image_reference.to_string(),
                source: source.to_string(),
                created_at: now,
                last_used_at: now,
                hits: 0,
                size_bytes,
            },
        );
        self.persist()
    }

    /// Mark a hit: bump the counter and last-used time, then persist.
    pub fn touch(&mut self, key: &str) -> StevedoreResult<()> {
        self.absorb_disk();
        if let Some(entry) = self.state.entries.get_mut(key) {
            entry.hits += 1;
            entry.last_used_at = Utc::now();
            self.persist()?;
        }
        Ok(())
    }

    /// Remove entries matching `predicate`, returning what was removed so the
    /// caller can also delete the underlying images.
    pub fn evict<F>(&mut self, predicate: F) -> StevedoreResult<Vec<CacheEntry>>
    where
        F: Fn(&CacheEntry) -> bool,
    {
        self.absorb_disk();
        let doomed: Vec<String> = self
            .state
            .entries
            .values()
            .filter(|e| predicate(e))
            .map(|e| e.key.clone())
            .collect();

        let mut removed = Vec::with_capacity(doomed.len());
        for key in doomed {
            if let Some(entry) = self.state.entries.remove(&key) {
                removed.push(entry);
            }
        }
        if !removed.is_empty() {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Drop every entry. Also clears the degraded flag since the replacement
    /// file is known-good.
    pub fn clear(&mut self) -> StevedoreResult<Vec<CacheEntry>> {
        let removed: Vec<CacheEntry> = self.state.entries.drain().map(|(_, e)| e).collect();
        self.degraded = false;
        self.persist()?;
        Ok(removed)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.state.entries.values()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.state.entries.len(),
            total_hits: self.state.entries.values().map(|e| e.hits).sum(),
            total_size_bytes: self
                .state
                .entries
                .values()
                .filter_map(|e| e.size_bytes)
                .sum(),
            oldest_entry: self.state.entries.values().map(|e| e.created_at).min(),
            store_path: self.store_path(),
        }
    }

    /// Pick up entries another process persisted since our last read, so a
    /// full-file rewrite cannot drop them. Per-key build locks serialize
    /// writers of the same key; this covers writers of different keys. Our
    /// in-memory entry wins any key conflict. `clear` deliberately skips
    /// this: it means "drop everything", including entries we never saw.
    fn absorb_disk(&mut self) {
        let Ok(text) = std::fs::read_to_string(self.store_path()) else {
            return;
        };
        let Ok(disk) = serde_json::from_str::<StoreFile>(&text) else {
            return;
        };
        if disk.version != STORE_VERSION {
            return;
        }
        for (key, entry) in disk.entries {
            self.state.entries.entry(key).or_insert(entry);
        }
    }

    fn persist(&mut self) -> StevedoreResult<()> {
        let path = self.store_path();
        let text = serde_json::to_string_pretty(&self.state)?;

        let tmp = self.root.join(format!("{}.tmp", STORE_FILE));
        std::fs::write(&tmp, text)
            .map_err(|e| StevedoreError::io(format!("write {}", tmp.display()), e))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| StevedoreError::io(format!("rename {}", path.display()), e))?;

        self.degraded = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn record_then_lookup_roundtrips_through_disk() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = CacheStore::open(dir.path()).unwrap();
            store.record("abc123", "mcp-time:abc123abc123", "uvx mcp-server-time", Some(120_000_000)).unwrap();
        }
        let store = CacheStore::open(dir.path()).unwrap();
        let entry = store.lookup("abc123").unwrap();
        assert_eq!(entry.image_reference, "mcp-time:abc123abc123");
        assert_eq!(entry.hits, 0);
    }

    #[test]
    fn touch_counts_hits() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::open(dir.path()).unwrap();
        store.record("k", "img:1", "cmd", None).unwrap();
        store.touch("k").unwrap();
        store.touch("k").unwrap();
        assert_eq!(store.lookup("k").unwrap().hits, 2);
    }

    #[test]
    fn corrupt_store_degrades_to_miss() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(STORE_FILE), "{ not json").unwrap();

        let store = CacheStore::open(dir.path()).unwrap();
        assert!(store.is_degraded());
        assert!(store.lookup("anything").is_none());
    }

    #[test]
    fn write_after_corruption_recovers() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(STORE_FILE), "garbage").unwrap();

        let mut store = CacheStore::open(dir.path()).unwrap();
        store.record("k", "img:1", "cmd", None).unwrap();
        assert!(!store.is_degraded());

        let reopened = CacheStore::open(dir.path()).unwrap();
        assert!(reopened.lookup("k").is_some());
    }

    #[test]
    fn concurrent_stores_keep_each_others_entries() {
        // Two invocations, different cache keys, each with its own store
        // handle over the same directory.
        let dir = TempDir::new().unwrap();
        let mut a = CacheStore::open(dir.path()).unwrap();
        let mut b = CacheStore::open(dir.path()).unwrap();

        a.record("key-a", "img:a", "first", None).unwrap();
        b.record("key-b", "img:b", "second", None).unwrap();

        let reopened = CacheStore::open(dir.path()).unwrap();
        assert!(reopened.lookup("key-a").is_some());
        assert!(reopened.lookup("key-b").is_some());
    }

    #[test]
    fn touch_from_stale_handle_keeps_new_entries() {
        let dir = TempDir::new().unwrap();
        let mut a = CacheStore::open(dir.path()).unwrap();
        a.record("key-a", "img:a", "first", None).unwrap();

        let mut b = CacheStore::open(dir.path()).unwrap();
        a.record("key-c", "img:c", "third", None).unwrap();
        b.touch("key-a").unwrap();

        let reopened = CacheStore::open(dir.path()).unwrap();
        assert!(reopened.lookup("key-c").is_some());
        assert_eq!(reopened.lookup("key-a").unwrap().hits, 1);
    }

    #[test]
    fn evict_by_predicate() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::open(dir.path()).unwrap();
        store.record("keep", "img:keep", "a", None).unwrap();
        store.record("drop", "img:drop", "b", None).unwrap();

        let removed = store.evict(|e| e.key == "drop").unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].image_reference, "img:drop");
        assert!(store.lookup("keep").is_some());
        assert!(store.lookup("drop").is_none());
    }

    #[test]
    fn clear_empties_store() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::open(dir.path()).unwrap();
        store.record("a", "img:a", "x", Some(10)).unwrap();
        store.record("b", "img:b", "y", None).unwrap();
        assert_eq!(store.stats().total_size_bytes, 10);

        let removed = store.clear().unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(store.stats().entry_count, 0);
    }

    #[test]
    fn no_tmp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::open(dir.path()).unwrap();
        store.record("k", "img", "src", None).unwrap();
        assert!(!dir.path().join(format!("{}.tmp", STORE_FILE)).exists());
    }
}
