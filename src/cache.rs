// src/cache.rs

//! Plan result caching
//!
//! Caches install and removal plans keyed on a hash of:
//! - The normalized request (targets or roots, options)
//! - The checksum of every participating store
//!
//! Any change to a repository or the installed set changes its checksum and
//! therefore the key, so stale entries are never returned. Entries are JSON
//! files sharded by the first two characters of the key.

use crate::error::Result;
use crate::hash::Hasher;
use crate::repository::PackageStore;
use serde::{Serialize, de::DeserializeOwned};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// A cache key: SHA-256 of the request and store checksums
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Compute the key for a request against a set of stores
    pub fn compute<T: Serialize + ?Sized>(
        kind: &str,
        request: &T,
        stores: &[&dyn PackageStore],
    ) -> Result<Self> {
        let mut hasher = Hasher::new();
        hasher.update(kind.as_bytes());
        hasher.update_json(request)?;
        for store in stores {
            hasher.update_json(store.repository_id())?;
            hasher.update(store.checksum()?.as_bytes());
        }
        let key = hasher.finalize();
        debug!("Cache key for {} request: {:.16}", kind, key);
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// On-disk cache of resolution results
#[derive(Debug)]
pub struct ResultCache {
    cache_dir: PathBuf,
}

impl ResultCache {
    /// Open a cache rooted at `cache_dir`, creating it if needed
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the entry path for a key
    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let key = key.as_str();
        // Use first 2 chars as subdirectory for sharding
        self.cache_dir
            .join(&key[..2])
            .join(format!("{}.json", key))
    }

    /// Look up an entry; missing, unreadable or corrupt entries are a miss
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let path = self.entry_path(key);

        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Cache miss: {:.16}", key.as_str());
                return None;
            }
            Err(e) => {
                warn!("Cannot read cache entry {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&content) {
            Ok(value) => {
                info!("Cache hit: {:.16}", key.as_str());
                Some(value)
            }
            Err(e) => {
                warn!("Cache corruption detected: {:.16} ({})", key.as_str(), e);
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Store an entry; failures are logged and otherwise ignored
    pub fn put<T: Serialize>(&self, key: &CacheKey, value: &T) {
        if let Err(e) = self.try_put(key, value) {
            warn!("Failed to cache {:.16}: {}", key.as_str(), e);
        }
    }

    fn try_put<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<()> {
        let path = self.entry_path(key);
        let Some(shard) = path.parent() else {
            return Ok(());
        };
        fs::create_dir_all(shard)?;

        // Write to a temp file in the same directory, then rename into place
        let mut temp = NamedTempFile::new_in(shard)?;
        serde_json::to_writer(&mut temp, value)?;
        temp.flush()?;
        temp.persist(&path).map_err(|e| e.error)?;

        debug!("Cached {:.16}", key.as_str());
        Ok(())
    }

    /// Remove every cached entry, returning how many were removed
    pub fn clear(&self) -> Result<u64> {
        let mut removed = 0u64;

        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                for file in fs::read_dir(&path)? {
                    fs::remove_file(file?.path())?;
                    removed += 1;
                }
                let _ = fs::remove_dir(&path);
            }
        }

        info!("Cleared {} cache entries", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryStore, PackageRecord};
    use tempfile::TempDir;

    fn store_with(version: &str) -> InMemoryStore {
        let mut store = InMemoryStore::new("main");
        store.add(PackageRecord::new("app/foo", version));
        store
    }

    #[test]
    fn test_cache_key_deterministic() {
        let store = store_with("1.0");
        let a = CacheKey::compute("install", &["app/foo"], &[&store]).unwrap();
        let b = CacheKey::compute("install", &["app/foo"], &[&store]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_cache_key_changes_with_inputs() {
        let store = store_with("1.0");
        let base = CacheKey::compute("install", &["app/foo"], &[&store]).unwrap();
        let other_kind = CacheKey::compute("remove", &["app/foo"], &[&store]).unwrap();
        let other_request = CacheKey::compute("install", &["app/bar"], &[&store]).unwrap();
        let newer = store_with("1.1");
        let other_store = CacheKey::compute("install", &["app/foo"], &[&newer]).unwrap();

        assert_ne!(base, other_kind);
        assert_ne!(base, other_request);
        assert_ne!(base, other_store);
    }

    #[test]
    fn test_cache_miss_then_hit() {
        let temp = TempDir::new().unwrap();
        let cache = ResultCache::new(temp.path()).unwrap();
        let key = CacheKey::compute("install", &["app/foo"], &[]).unwrap();

        assert!(cache.get::<Vec<u32>>(&key).is_none());
        cache.put(&key, &vec![1u32, 2, 3]);
        assert_eq!(cache.get::<Vec<u32>>(&key), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_cache_path_sharding() {
        let temp = TempDir::new().unwrap();
        let cache = ResultCache::new(temp.path()).unwrap();
        let key = CacheKey::compute("install", &["app/foo"], &[]).unwrap();
        cache.put(&key, &"plan");

        let shard = temp.path().join(&key.as_str()[..2]);
        assert!(shard.join(format!("{}.json", key.as_str())).exists());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let cache = ResultCache::new(temp.path()).unwrap();
        let key = CacheKey::compute("install", &["app/foo"], &[]).unwrap();
        cache.put(&key, &vec![1u32]);

        let path = cache.entry_path(&key);
        fs::write(&path, b"{ not json").unwrap();
        assert!(cache.get::<Vec<u32>>(&key).is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_cache_clear() {
        let temp = TempDir::new().unwrap();
        let cache = ResultCache::new(temp.path()).unwrap();
        for name in ["app/a", "app/b"] {
            let key = CacheKey::compute("install", &[name], &[]).unwrap();
            cache.put(&key, &name);
        }
        assert_eq!(cache.clear().unwrap(), 2);
    }
}
