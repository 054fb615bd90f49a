//! Whole-response cache keyed by exact request URL.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::traits::CacheResult;
use super::CacheEnv;
use crate::api::{Fetch, FetchError};

/// Key prefix for keyed cache entries.
pub const KEY_PREFIX: &str = "cache:";

/// Persisted form: `{ "value": <json>, "expiry": <ms since epoch> }`.
#[derive(Debug, Serialize, Deserialize)]
struct KeyedEntry {
  value: Value,
  expiry: i64,
}

/// Caches one JSON response per URL until the next expiry boundary.
pub struct KeyedCache<F: Fetch> {
  fetcher: Arc<F>,
  env: CacheEnv,
}

impl<F: Fetch> KeyedCache<F> {
  pub fn new(fetcher: Arc<F>, env: CacheEnv) -> Self {
    Self { fetcher, env }
  }

  pub fn cache_key(url: &str) -> String {
    format!("{}{}", KEY_PREFIX, url)
  }

  /// Look up a fresh cached value without touching the network.
  ///
  /// Expired entries are deleted. Entries that fail to parse are ignored
  /// and left in place.
  pub fn lookup(&self, url: &str) -> Option<Value> {
    let key = Self::cache_key(url);
    let raw = match self.env.store.get(&key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        tracing::warn!(%key, error = %e, "cache read failed");
        return None;
      }
    };

    let entry: KeyedEntry = match serde_json::from_str(&raw) {
      Ok(entry) => entry,
      Err(e) => {
        tracing::debug!(%key, error = %e, "ignoring unreadable cache entry");
        return None;
      }
    };

    if self.env.now_millis() < entry.expiry {
      return Some(entry.value);
    }

    tracing::debug!(%key, "cache entry expired");
    if let Err(e) = self.env.store.remove(&key) {
      tracing::warn!(%key, error = %e, "failed to delete expired cache entry");
    }
    None
  }

  /// Cache-first GET of `url`.
  ///
  /// On a miss, fetches once and stores the response. Failed fetches are
  /// returned as errors and never cached.
  pub async fn get(&self, url: &str) -> Result<CacheResult<Value>, FetchError> {
    if let Some(value) = self.lookup(url) {
      tracing::trace!(url, "keyed cache hit");
      return Ok(CacheResult::from_cache(value));
    }

    let value = self.fetcher.get_json(url).await?;
    self.store(url, &value);
    Ok(CacheResult::from_network(value))
  }

  /// Drop the entry for `url` so the next `get` goes to the network.
  pub fn invalidate(&self, url: &str) {
    let key = Self::cache_key(url);
    if let Err(e) = self.env.store.remove(&key) {
      tracing::warn!(%key, error = %e, "failed to invalidate cache entry");
    }
  }

  /// Write `value` for `url` with a fresh expiry.
  pub fn store(&self, url: &str, value: &Value) {
    let key = Self::cache_key(url);
    let entry = KeyedEntry {
      value: value.clone(),
      expiry: self.env.expiry_millis(),
    };

    let written = serde_json::to_string(&entry)
      .map_err(color_eyre::Report::from)
      .and_then(|raw| self.env.store.set(&key, &raw));
    if let Err(e) = written {
      tracing::warn!(%key, error = %e, "cache write failed");
    }
  }
}

impl<F: Fetch> Clone for KeyedCache<F> {
  fn clone(&self) -> Self {
    Self {
      fetcher: Arc::clone(&self.fetcher),
      env: self.env.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::testing::{env_at, FakeApi};
  use crate::cache::traits::CacheSource;
  use chrono::Duration;
  use serde_json::json;

  #[tokio::test]
  async fn test_second_get_is_served_from_cache() {
    let api = Arc::new(FakeApi::new());
    api.respond("/api/sel/seasons", json!([2022, 2023, 2024]));
    let (env, _clock) = env_at("2024-05-10T12:00:00Z");
    let cache = KeyedCache::new(api.clone(), env);

    let first = cache.get("/api/sel/seasons").await.unwrap();
    let second = cache.get("/api/sel/seasons").await.unwrap();

    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(first.data, second.data);
    assert_eq!(api.requests(), vec!["/api/sel/seasons"]);
  }

  #[tokio::test]
  async fn test_entries_expire_at_boundary() {
    let api = Arc::new(FakeApi::new());
    api.respond("/api/sel/seasons", json!([2024]));
    let (env, clock) = env_at("2024-05-10T21:00:00Z");
    let cache = KeyedCache::new(api.clone(), env.clone());

    cache.get("/api/sel/seasons").await.unwrap();
    clock.advance(Duration::minutes(59));
    assert!(cache.lookup("/api/sel/seasons").is_some());

    clock.advance(Duration::minutes(1));
    assert!(cache.lookup("/api/sel/seasons").is_none());
    // Expired entries are removed on read
    assert_eq!(env.store.get("cache:/api/sel/seasons").unwrap(), None);

    cache.get("/api/sel/seasons").await.unwrap();
    assert_eq!(api.requests().len(), 2);
  }

  #[tokio::test]
  async fn test_failed_fetch_is_not_cached() {
    let api = Arc::new(FakeApi::new());
    api.fail("/api/sel/seasons", 500);
    let (env, _clock) = env_at("2024-05-10T12:00:00Z");
    let cache = KeyedCache::new(api.clone(), env.clone());

    let err = cache.get("/api/sel/seasons").await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 500, .. }));
    assert!(env.store.keys_with_prefix(KEY_PREFIX).unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_corrupt_entry_is_a_miss_and_kept() {
    let api = Arc::new(FakeApi::new());
    api.respond("/api/sel/seasons", json!([2024]));
    let (env, _clock) = env_at("2024-05-10T12:00:00Z");
    env.store.set("cache:/api/sel/seasons", "{not json").unwrap();
    let cache = KeyedCache::new(api.clone(), env.clone());

    assert!(cache.lookup("/api/sel/seasons").is_none());
    assert_eq!(
      env.store.get("cache:/api/sel/seasons").unwrap().as_deref(),
      Some("{not json")
    );

    let result = cache.get("/api/sel/seasons").await.unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data, json!([2024]));
  }

  #[tokio::test]
  async fn test_invalidate_forces_network_fetch() {
    let api = Arc::new(FakeApi::new());
    api.respond("/api/sel/seasons", json!([2023]));
    let (env, _clock) = env_at("2024-05-10T12:00:00Z");
    let cache = KeyedCache::new(api.clone(), env);

    cache.get("/api/sel/seasons").await.unwrap();
    api.respond("/api/sel/seasons", json!([2023, 2024]));
    cache.invalidate("/api/sel/seasons");

    let result = cache.get("/api/sel/seasons").await.unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data, json!([2023, 2024]));
    assert_eq!(api.requests().len(), 2);
  }

  #[tokio::test]
  async fn test_persisted_layout() {
    let api = Arc::new(FakeApi::new());
    api.respond("/api/sel/seasons", json!([2024]));
    let (env, _clock) = env_at("2024-05-10T12:00:00Z");
    let cache = KeyedCache::new(api, env.clone());

    cache.get("/api/sel/seasons").await.unwrap();
    let raw = env.store.get("cache:/api/sel/seasons").unwrap().unwrap();
    let stored: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored["value"], json!([2024]));
    // 2024-05-10T22:00:00Z
    assert_eq!(stored["expiry"], json!(1_715_378_400_000_i64));
  }
}
