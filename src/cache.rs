//! On-disk cache for the ticker catalog.
//!
//! One JSON file per key under the cache directory. Entries never expire
//! unless a TTL is configured; `invalidate` is the explicit way to force a
//! fresh catalog.

use crate::api::RetryPolicy;
use crate::catalog::CatalogSource;
use crate::error::CatalogError;
use crate::models::{Catalog, TickerRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Key the catalog is stored under.
pub const DEFAULT_CACHE_KEY: &str = "stockSymbols";

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    stored_at: DateTime<Utc>,
    payload: Vec<TickerRecord>,
}

/// Whether a lookup was served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheStatus::Hit => write!(f, "hit"),
            CacheStatus::Miss => write!(f, "miss"),
        }
    }
}

/// File-backed catalog cache.
#[derive(Debug, Clone)]
pub struct ClientCache {
    dir: PathBuf,
    ttl: Option<Duration>,
}

impl ClientCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Option<Duration>) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    /// `dirs::cache_dir()/kynos`, if the platform has one.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|p| p.join("kynos"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file))
    }

    /// The cached catalog, or `None` on a miss. Unreadable, corrupt, and
    /// expired entries are misses.
    pub fn get(&self, key: &str) -> Option<Catalog> {
        self.get_at(key, Utc::now())
    }

    fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<Catalog> {
        let path = self.path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(key, "catalog cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(key, path = %path.display(), error = %e, "unreadable catalog cache");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, path = %path.display(), error = %e, "corrupt catalog cache entry");
                return None;
            }
        };

        if entry.key != key {
            tracing::warn!(key, stored = %entry.key, "catalog cache key mismatch");
            return None;
        }

        if self.is_expired(entry.stored_at, now) {
            tracing::info!(key, stored_at = %entry.stored_at, "catalog cache entry expired");
            return None;
        }

        let (catalog, dropped) = Catalog::from_records(entry.payload);
        if dropped > 0 {
            tracing::warn!(key, dropped, "cached catalog had invalid records");
        }
        tracing::debug!(key, records = catalog.len(), "catalog cache hit");
        Some(catalog)
    }

    fn is_expired(&self, stored_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.ttl {
            None => false,
            Some(ttl) => match (now - stored_at).to_std() {
                Ok(age) => age > ttl,
                // Stored in the future, treat as fresh.
                Err(_) => false,
            },
        }
    }

    /// Store `catalog` under `key`, replacing any previous entry.
    pub fn put(&self, key: &str, catalog: &Catalog) -> Result<()> {
        self.put_at(key, catalog, Utc::now())
    }

    fn put_at(&self, key: &str, catalog: &Catalog, now: DateTime<Utc>) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory: {}", self.dir.display()))?;

        let entry = CacheEntry {
            key: key.to_string(),
            stored_at: now,
            payload: catalog.records().to_vec(),
        };
        let content = serde_json::to_string(&entry).context("Failed to serialize catalog")?;

        let path = self.path(key);
        fs::write(&path, content)
            .with_context(|| format!("Failed to write cache file: {}", path.display()))?;

        tracing::debug!(key, records = catalog.len(), "catalog cached");
        Ok(())
    }

    /// Drop the entry for `key`. Missing entries are fine.
    pub fn invalidate(&self, key: &str) -> Result<()> {
        let path = self.path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(key, "catalog cache invalidated");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove cache file: {}", path.display())),
        }
    }

    /// Cached catalog for `key`, or load it from `source` and cache it.
    ///
    /// A failed write is logged; the freshly loaded catalog is still returned.
    pub async fn get_or_load(
        &self,
        key: &str,
        source: &CatalogSource,
        client: &Client,
        retry: RetryPolicy,
    ) -> Result<(Catalog, CacheStatus), CatalogError> {
        if let Some(catalog) = self.get(key) {
            return Ok((catalog, CacheStatus::Hit));
        }

        tracing::info!(key, %source, "loading ticker catalog");
        let catalog = source.load(client, retry).await?;
        if let Err(e) = self.put(key, &catalog) {
            tracing::warn!(key, error = %e, "failed to cache ticker catalog");
        }
        Ok((catalog, CacheStatus::Miss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn catalog() -> Catalog {
        let (catalog, _) = Catalog::from_records(vec![
            TickerRecord::new("NVDA", "NVIDIA Corporation"),
            TickerRecord::new("MSFT", "Microsoft Corp"),
        ]);
        catalog
    }

    #[test]
    fn test_miss_then_hit() {
        let dir = TempDir::new().unwrap();
        let cache = ClientCache::new(dir.path(), None);

        assert!(cache.get(DEFAULT_CACHE_KEY).is_none());
        cache.put(DEFAULT_CACHE_KEY, &catalog()).unwrap();

        let cached = cache.get(DEFAULT_CACHE_KEY).unwrap();
        assert!(cached.same_records(&catalog()));
    }

    #[test]
    fn test_empty_catalog_round_trips() {
        let dir = TempDir::new().unwrap();
        let cache = ClientCache::new(dir.path(), None);

        cache.put(DEFAULT_CACHE_KEY, &Catalog::default()).unwrap();
        let cached = cache.get(DEFAULT_CACHE_KEY).unwrap();
        assert!(cached.is_empty());
    }

    #[test]
    fn test_invalidate() {
        let dir = TempDir::new().unwrap();
        let cache = ClientCache::new(dir.path(), None);

        cache.put(DEFAULT_CACHE_KEY, &catalog()).unwrap();
        cache.invalidate(DEFAULT_CACHE_KEY).unwrap();
        assert!(cache.get(DEFAULT_CACHE_KEY).is_none());
        cache.invalidate(DEFAULT_CACHE_KEY).unwrap();
    }

    #[test]
    fn test_keys_are_separate() {
        let dir = TempDir::new().unwrap();
        let cache = ClientCache::new(dir.path(), None);

        cache.put("one", &catalog()).unwrap();
        assert!(cache.get("two").is_none());
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let dir = TempDir::new().unwrap();
        let cache = ClientCache::new(dir.path(), None);
        let long_ago = Utc::now() - chrono::Duration::days(3650);

        cache.put_at(DEFAULT_CACHE_KEY, &catalog(), long_ago).unwrap();
        assert!(cache.get(DEFAULT_CACHE_KEY).is_some());
    }

    #[test]
    fn test_ttl_expires_old_entries() {
        let dir = TempDir::new().unwrap();
        let cache = ClientCache::new(dir.path(), Some(Duration::from_secs(3600)));
        let now = Utc::now();

        cache
            .put_at(DEFAULT_CACHE_KEY, &catalog(), now - chrono::Duration::hours(2))
            .unwrap();
        assert!(cache.get_at(DEFAULT_CACHE_KEY, now).is_none());

        cache
            .put_at(DEFAULT_CACHE_KEY, &catalog(), now - chrono::Duration::minutes(10))
            .unwrap();
        assert!(cache.get_at(DEFAULT_CACHE_KEY, now).is_some());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = ClientCache::new(dir.path(), None);

        fs::write(cache.path(DEFAULT_CACHE_KEY), "{ not json").unwrap();
        assert!(cache.get(DEFAULT_CACHE_KEY).is_none());
    }

    #[tokio::test]
    async fn test_get_or_load_fills_cache() {
        let dir = TempDir::new().unwrap();
        let cache = ClientCache::new(dir.path().join("cache"), None);

        let catalog_file = dir.path().join("tickers.json");
        fs::write(&catalog_file, r#"[{"symbol": "NVDA", "name": "NVIDIA Corporation"}]"#).unwrap();
        let source = CatalogSource::File(catalog_file.clone());
        let client = Client::new();

        let (loaded, status) = cache
            .get_or_load(DEFAULT_CACHE_KEY, &source, &client, RetryPolicy::none())
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(status, CacheStatus::Miss);

        // Served from the cache once the source is gone.
        fs::remove_file(&catalog_file).unwrap();
        let (cached, status) = cache
            .get_or_load(DEFAULT_CACHE_KEY, &source, &client, RetryPolicy::none())
            .await
            .unwrap();
        assert!(cached.same_records(&loaded));
        assert_eq!(status, CacheStatus::Hit);
    }

    #[tokio::test]
    async fn test_get_or_load_propagates_source_errors() {
        let dir = TempDir::new().unwrap();
        let cache = ClientCache::new(dir.path(), None);
        let source = CatalogSource::File(dir.path().join("missing.json"));

        let result = cache
            .get_or_load(DEFAULT_CACHE_KEY, &source, &Client::new(), RetryPolicy::none())
            .await;
        assert!(matches!(result, Err(CatalogError::Io { .. })));
        assert!(cache.get(DEFAULT_CACHE_KEY).is_none());
    }

    #[test]
    fn test_put_creates_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let cache = ClientCache::new(&nested, None);

        cache.put(DEFAULT_CACHE_KEY, &catalog()).unwrap();
        assert!(nested.join("stockSymbols.json").exists());
    }
}
