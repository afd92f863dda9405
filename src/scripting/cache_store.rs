// src/scripting/cache_store.rs — Per-plugin TTL key/value store persisted as JSON
//
// File format: { "<key>": { "value": <json>, "expiration": <epoch seconds> } }
// An expiration of 0 means the entry never expires.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::infra::files;

/// Source of the current time in epoch seconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Cache store shared between an engine and the closures it registers.
pub type SharedCacheStore = Arc<Mutex<CacheStore>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    /// Absolute epoch seconds; 0 means never.
    #[serde(rename = "expiration")]
    pub expires_at: i64,
}

impl CacheEntry {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at != 0 && self.expires_at < now
    }
}

pub struct CacheStore {
    entries: HashMap<String, CacheEntry>,
    clock: Clock,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(system_now))
    }

    /// Store driven by a custom clock (tests, replay).
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            entries: HashMap::new(),
            clock,
        }
    }

    pub fn into_shared(self) -> SharedCacheStore {
        Arc::new(Mutex::new(self))
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Store `value` for `ttl_seconds` (0 or less: never expires).
    ///
    /// A TTL whose expiry would overflow the persisted format is stored as
    /// "never expires" and logged.
    pub fn set(&mut self, key: &str, value: serde_json::Value, ttl_seconds: i64) {
        let expires_at = if ttl_seconds <= 0 {
            0
        } else {
            match self.now().checked_add(ttl_seconds) {
                Some(at) if ttl_seconds < i64::MAX => at,
                _ => {
                    tracing::warn!(
                        key,
                        ttl_seconds,
                        "Cache TTL out of range, storing without expiration"
                    );
                    0
                }
            }
        };

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at,
            },
        );
    }

    /// Value for `key`, removing it if it has expired.
    pub fn get(&mut self, key: &str) -> Option<serde_json::Value> {
        let now = self.now();
        match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                self.entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn has(&mut self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet collected.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    /// Write the whole store as JSON, creating the parent directory.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        files::write_atomic(path, json.as_bytes())?;
        Ok(())
    }

    /// Replace the contents with the file at `path`.
    pub fn try_load(&mut self, path: &Path) -> anyhow::Result<()> {
        let content = std::fs::read_to_string(path)?;
        self.entries = serde_json::from_str(&content)?;
        Ok(())
    }

    /// Like [`try_load`](Self::try_load), but a missing or malformed file
    /// leaves the store empty and logs a warning.
    pub fn load(&mut self, path: &Path) {
        if !path.exists() {
            tracing::debug!("No cache file at {}, starting empty", path.display());
            self.entries.clear();
            return;
        }
        if let Err(e) = self.try_load(path) {
            tracing::warn!(
                "Failed to load cache {}: {}, starting empty",
                path.display(),
                e
            );
            self.entries.clear();
        }
    }
}

/// Cache file for one engine identity.
pub fn cache_file_path(cache_dir: &Path, id: &uuid::Uuid) -> PathBuf {
    cache_dir.join(format!("{id}.json"))
}

/// Lock a shared store, recovering the data if a previous holder panicked.
pub fn lock(store: &SharedCacheStore) -> MutexGuard<'_, CacheStore> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn system_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn fake_clock(start: i64) -> (Arc<AtomicI64>, Clock) {
        let now = Arc::new(AtomicI64::new(start));
        let handle = now.clone();
        (now, Arc::new(move || handle.load(Ordering::SeqCst)))
    }

    #[test]
    fn test_get_before_and_after_ttl() {
        let (now, clock) = fake_clock(1_000);
        let mut store = CacheStore::with_clock(clock);

        store.set("token", json!("abc"), 10);
        assert_eq!(store.get("token"), Some(json!("abc")));

        now.store(1_010, Ordering::SeqCst);
        assert_eq!(store.get("token"), Some(json!("abc")));

        now.store(1_011, Ordering::SeqCst);
        assert_eq!(store.get("token"), None);
        // Removed lazily on lookup.
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let (now, clock) = fake_clock(1_000);
        let mut store = CacheStore::with_clock(clock);

        store.set("k", json!({"n": 1}), 0);
        now.store(i64::MAX / 2, Ordering::SeqCst);
        assert_eq!(store.get("k"), Some(json!({"n": 1})));
    }

    #[test]
    fn test_overflowing_ttl_is_clamped() {
        let (_now, clock) = fake_clock(1_000);
        let mut store = CacheStore::with_clock(clock);

        store.set("max", json!(1), i64::MAX);
        store.set("overflow", json!(2), i64::MAX - 10);
        assert_eq!(store.entries["max"].expires_at, 0);
        assert_eq!(store.entries["overflow"].expires_at, 0);
    }

    #[test]
    fn test_has_delete_clear() {
        let mut store = CacheStore::new();
        store.set("a", json!(1), 0);
        store.set("b", json!(2), 0);

        assert!(store.has("a"));
        assert!(store.delete("a"));
        assert!(!store.delete("a"));
        assert!(!store.has("a"));

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let (now, clock) = fake_clock(100);
        let mut store = CacheStore::with_clock(clock);
        store.set("short", json!(1), 1);
        store.set("forever", json!(2), 0);

        now.store(200, Ordering::SeqCst);
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let (_now, clock) = fake_clock(500);
        let mut store = CacheStore::with_clock(clock.clone());
        store.set("name", json!("factorio"), 0);
        store.set("ttl", json!(3), 60);
        store.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["ttl"], json!({"value": 3, "expiration": 560}));
        assert_eq!(raw["name"]["expiration"], json!(0));

        let mut loaded = CacheStore::with_clock(clock);
        loaded.load(&path);
        assert_eq!(loaded.get("name"), Some(json!("factorio")));
        assert_eq!(loaded.get("ttl"), Some(json!(3)));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let mut store = CacheStore::new();
        store.set("stale", json!(true), 0);
        store.load(Path::new("/nonexistent/cache.json"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_malformed_file_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut store = CacheStore::new();
        store.load(&path);
        assert!(store.is_empty());
        assert!(store.try_load(&path).is_err());
    }

    #[test]
    fn test_cache_file_path_per_identity() {
        let a = uuid::Uuid::new_v4();
        let b = uuid::Uuid::new_v4();
        let dir = Path::new("/cache");
        assert_ne!(cache_file_path(dir, &a), cache_file_path(dir, &b));
        assert_eq!(cache_file_path(dir, &a), dir.join(format!("{a}.json")));
    }
}
