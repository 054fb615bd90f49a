//! Session prefetching for the dashboard and table pages.
//!
//! Prefetching primes the same cache entries the views read later. A
//! session tracker remembers what was already primed so repeated triggers
//! (switching back and forth between pages) skip even the store lookup.
//! The tracker lives as long as the process and is never persisted.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::keyed::KeyedCache;
use super::season::SeasonCache;
use crate::api::Fetch;

/// Upper bound on tracked keys per kind.
const MAX_TRACKED: usize = 256;

/// Endpoints and scopes primed during this session.
#[derive(Debug, Default)]
pub struct PrefetchTracker {
  endpoints: HashSet<String>,
  scopes: HashSet<String>,
}

impl PrefetchTracker {
  pub fn has_endpoint(&self, url: &str) -> bool {
    self.endpoints.contains(url)
  }

  pub fn has_scope(&self, scope: &str) -> bool {
    self.scopes.contains(scope)
  }

  fn mark_endpoint(&mut self, url: &str) {
    insert_bounded(&mut self.endpoints, url);
  }

  fn mark_scope(&mut self, scope: &str) {
    insert_bounded(&mut self.scopes, scope);
  }
}

fn insert_bounded(set: &mut HashSet<String>, key: &str) {
  if set.len() >= MAX_TRACKED && !set.contains(key) {
    tracing::trace!(key, "prefetch tracker full");
    return;
  }
  set.insert(key.to_string());
}

/// Primes the keyed and season caches in the background.
pub struct Prefetcher<F: Fetch> {
  keyed: KeyedCache<F>,
  tracker: Arc<Mutex<PrefetchTracker>>,
}

impl<F: Fetch> Prefetcher<F> {
  pub fn new(keyed: KeyedCache<F>) -> Self {
    Self {
      keyed,
      tracker: Arc::new(Mutex::new(PrefetchTracker::default())),
    }
  }

  fn with_tracker<R>(&self, f: impl FnOnce(&mut PrefetchTracker) -> R) -> R {
    // A poisoned tracker only loses dedup hints.
    let mut guard = self
      .tracker
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
  }

  /// Make sure each endpoint has a fresh keyed cache entry.
  ///
  /// Failures are logged and the endpoint stays eligible for the next call.
  pub async fn prefetch_endpoints(&self, endpoints: &[String]) {
    let pending: Vec<&String> = endpoints
      .iter()
      .filter(|ep| !self.with_tracker(|t| t.has_endpoint(ep)))
      .collect();

    let results = join_all(pending.iter().map(|ep| self.keyed.get(ep))).await;

    for (ep, result) in pending.into_iter().zip(results) {
      match result {
        Ok(_) => self.with_tracker(|t| t.mark_endpoint(ep)),
        Err(e) => tracing::debug!(endpoint = %ep, error = %e, "prefetch failed"),
      }
    }
  }

  /// Prime the season cache for a table request URL.
  pub async fn prefetch_scope(&self, cache: &SeasonCache<F>, url: &str) {
    let scope = SeasonCache::<F>::scope_key(url);
    if self.with_tracker(|t| t.has_scope(&scope)) {
      return;
    }

    match cache.get(url).await {
      Ok(result) => {
        tracing::debug!(%scope, rows = result.data.len(), "prefetched table scope");
        self.with_tracker(|t| t.mark_scope(&scope));
      }
      Err(e) => tracing::debug!(%scope, error = %e, "scope prefetch failed"),
    }
  }
}

impl<F: Fetch> Clone for Prefetcher<F> {
  fn clone(&self) -> Self {
    Self {
      keyed: self.keyed.clone(),
      tracker: Arc::clone(&self.tracker),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::testing::{env_at, FakeApi};
  use crate::cache::traits::CacheSource;
  use crate::cache::PartitionSchema;
  use serde_json::json;

  #[tokio::test]
  async fn test_endpoints_are_primed_once_per_session() {
    let api = Arc::new(FakeApi::new());
    api.respond("/api/sel/seasons", json!([2023, 2024]));
    api.respond("/api/sel/dashboard/best-averages?season=all", json!([]));
    let (env, _clock) = env_at("2024-05-10T12:00:00Z");
    let keyed = KeyedCache::new(api.clone(), env.clone());
    let prefetcher = Prefetcher::new(keyed.clone());

    let endpoints = vec![
      "/api/sel/seasons".to_string(),
      "/api/sel/dashboard/best-averages?season=all".to_string(),
    ];
    prefetcher.prefetch_endpoints(&endpoints).await;
    assert_eq!(api.requests().len(), 2);
    assert!(keyed.lookup("/api/sel/seasons").is_some());

    // Even with the store wiped, the session tracker skips them
    env.clear().unwrap();
    prefetcher.prefetch_endpoints(&endpoints).await;
    assert_eq!(api.requests().len(), 2);
  }

  #[tokio::test]
  async fn test_fresh_cache_entries_are_not_refetched() {
    let api = Arc::new(FakeApi::new());
    api.respond("/api/sel/seasons", json!([2024]));
    let (env, _clock) = env_at("2024-05-10T12:00:00Z");
    let keyed = KeyedCache::new(api.clone(), env);
    keyed.store("/api/sel/seasons", &json!([2024]));

    Prefetcher::new(keyed)
      .prefetch_endpoints(&["/api/sel/seasons".to_string()])
      .await;
    assert!(api.requests().is_empty());
  }

  #[tokio::test]
  async fn test_failed_endpoints_stay_eligible() {
    let api = Arc::new(FakeApi::new());
    api.fail("/api/sel/seasons", 500);
    let (env, _clock) = env_at("2024-05-10T12:00:00Z");
    let prefetcher = Prefetcher::new(KeyedCache::new(api.clone(), env));

    let endpoints = vec!["/api/sel/seasons".to_string()];
    prefetcher.prefetch_endpoints(&endpoints).await;
    prefetcher.prefetch_endpoints(&endpoints).await;
    assert_eq!(api.requests().len(), 2);
  }

  #[tokio::test]
  async fn test_scope_prefetch_primes_table_cache() {
    let api = Arc::new(FakeApi::new());
    api.respond(
      "/api/sel/stats?season=2024",
      json!([{ "Name": "R1", "Season": 2024, "Team": "A" }]),
    );
    let (env, _clock) = env_at("2024-05-10T12:00:00Z");
    let prefetcher = Prefetcher::new(KeyedCache::new(api.clone(), env.clone()));
    let table = SeasonCache::new(api.clone(), env, PartitionSchema::default());

    prefetcher
      .prefetch_scope(&table, "/api/sel/stats?season=2024")
      .await;
    prefetcher
      .prefetch_scope(&table, "/api/sel/stats?season=2023")
      .await;
    // Same scope: the second call is skipped by the tracker
    assert_eq!(api.requests(), vec!["/api/sel/stats?season=2024"]);

    let result = table.get("/api/sel/stats?season=2024").await.unwrap();
    assert_eq!(result.source, CacheSource::Cache);
  }

  #[test]
  fn test_tracker_is_bounded() {
    let mut tracker = PrefetchTracker::default();
    for i in 0..MAX_TRACKED + 10 {
      tracker.mark_endpoint(&format!("/api/{}", i));
    }
    assert_eq!(tracker.endpoints.len(), MAX_TRACKED);
    assert!(tracker.has_endpoint("/api/0"));
    assert!(!tracker.has_endpoint(&format!("/api/{}", MAX_TRACKED)));
  }
}
