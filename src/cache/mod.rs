//! Response caching for the statistics API.
//!
//! This module provides:
//! - A keyed cache holding one response per URL (`cache:<url>`)
//! - A season-partitioned cache for table endpoints
//!   (`seasonCache:<path>|<params without season>`)
//! - A session prefetcher that primes both
//!
//! Every entry expires at the same daily boundary (see [`ExpiryPolicy`]).

mod expiry;
mod keyed;
mod prefetch;
mod season;
mod storage;
mod traits;

pub use expiry::{Clock, ExpiryPolicy, SystemClock};
pub use keyed::KeyedCache;
pub use prefetch::Prefetcher;
pub use season::{PartitionSchema, SeasonCache};
pub use storage::{KeyValueStore, MemoryStorage, NoopStorage, SqliteStorage};

use color_eyre::Result;
use std::sync::Arc;

/// Store, expiry policy and clock shared by every cache.
#[derive(Clone)]
pub struct CacheEnv {
  pub store: Arc<dyn KeyValueStore>,
  pub policy: ExpiryPolicy,
  pub clock: Arc<dyn Clock>,
}

impl CacheEnv {
  pub fn new(store: Arc<dyn KeyValueStore>, policy: ExpiryPolicy) -> Self {
    Self {
      store,
      policy,
      clock: Arc::new(SystemClock),
    }
  }

  /// Replace the wall clock.
  #[cfg(test)]
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  fn now_millis(&self) -> i64 {
    self.clock.now().timestamp_millis()
  }

  /// Expiry for an entry written now, in milliseconds since the epoch.
  fn expiry_millis(&self) -> i64 {
    self
      .policy
      .expiry_from(self.clock.now())
      .timestamp_millis()
  }

  /// Drop every cached response. Returns the number of entries removed.
  pub fn clear(&self) -> Result<usize> {
    let keyed = self.store.remove_prefix(keyed::KEY_PREFIX)?;
    let seasons = self.store.remove_prefix(season::KEY_PREFIX)?;
    Ok(keyed + seasons)
  }
}
