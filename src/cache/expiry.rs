//! Daily expiry boundary shared by every cache entry.

use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Source of the current time, so expiry can be tested without waiting.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Computes when cache entries expire.
///
/// All entries written on the same day expire together at the boundary
/// (22:00 UTC by default), which is when the upstream data is refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
  boundary: NaiveTime,
}

impl Default for ExpiryPolicy {
  fn default() -> Self {
    Self {
      boundary: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
    }
  }
}

impl ExpiryPolicy {
  /// Boundary at the given UTC hour. Hours above 23 fall back to the default.
  pub fn at_hour(hour: u32) -> Self {
    match NaiveTime::from_hms_opt(hour, 0, 0) {
      Some(boundary) => Self { boundary },
      None => Self::default(),
    }
  }

  /// Whole seconds from `now` until the next boundary.
  ///
  /// At exactly the boundary the next one is a day away.
  pub fn seconds_until_next_boundary(&self, now: DateTime<Utc>) -> i64 {
    let today = now.date_naive().and_time(self.boundary).and_utc();
    let next = if now >= today {
      today + Duration::days(1)
    } else {
      today
    };
    (next - now).num_seconds()
  }

  /// Expiry instant for an entry written at `now`.
  pub fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::seconds(self.seconds_until_next_boundary(now))
  }
}
