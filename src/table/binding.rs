//! Binds a table page to the season cache.
//!
//! The request URL is the page's API path plus the location's query minus
//! the parameters only the client uses. Sorting, searching and paging never
//! change the cache key and never trigger a fetch.

use std::sync::Arc;

use super::TableDef;
use crate::api::{Fetch, Row};
use crate::cache::{CacheEnv, SeasonCache};
use crate::filters::{keys, Location};
use crate::params::{join_url, QueryParams};
use crate::query::Query;

/// Parameters applied by the client and never sent to the API.
const CLIENT_ONLY: [&str; 4] = [keys::SORT, keys::SEARCH, keys::PAGE, keys::PAGE_SIZE];

/// Request URL for `api_path` under the given location query.
pub fn request_url(api_path: &str, query: &QueryParams) -> String {
  join_url(api_path, &query.without(&CLIENT_ONLY))
}

/// What a table view renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableData {
  pub rows: Vec<Row>,
  pub is_loading: bool,
  pub error: Option<String>,
}

pub struct TableBinding<F: Fetch> {
  def: &'static TableDef,
  cache: SeasonCache<F>,
  query: Query<Vec<Row>>,
  current_url: Option<String>,
}

impl<F: Fetch + 'static> TableBinding<F> {
  pub fn new(def: &'static TableDef, fetcher: Arc<F>, env: CacheEnv) -> Self {
    Self {
      def,
      cache: SeasonCache::new(fetcher, env, def.schema()),
      query: Query::manual(),
      current_url: None,
    }
  }

  pub fn def(&self) -> &'static TableDef {
    self.def
  }

  /// Follow the location. Starts a load only when the request URL changed.
  pub fn sync(&mut self, location: &Location) -> bool {
    let url = request_url(self.def.api_path, &location.query);
    if self.current_url.as_deref() == Some(url.as_str()) {
      return false;
    }
    self.load(url);
    true
  }

  /// Fetch the current request again, bypassing the cached scope.
  pub fn reload(&mut self) {
    if let Some(url) = self.current_url.clone() {
      self.cache.invalidate(&url);
      self.load(url);
    }
  }

  fn load(&mut self, url: String) {
    tracing::debug!(table = self.def.id, %url, "loading table");
    self.current_url = Some(url.clone());

    let cache = self.cache.clone();
    self.query.run(async move {
      match cache.get(&url).await {
        Ok(result) => Ok(result.data),
        Err(e) if e.is_shape() => {
          tracing::debug!(%url, error = %e, "non-array table response, showing no rows");
          Ok(Vec::new())
        }
        Err(e) => Err(e.to_string()),
      }
    });
  }

  /// Drain finished loads. Returns `true` when the data changed.
  pub fn poll(&mut self) -> bool {
    self.query.poll()
  }

  pub fn data(&self) -> TableData {
    TableData {
      rows: self.query.data().cloned().unwrap_or_default(),
      is_loading: self.query.is_loading(),
      error: self.query.error().map(String::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::testing::{env_at, FakeApi};
  use crate::table::{SPEED, STATS};
  use serde_json::json;
  use std::time::Duration;

  fn binding(api: &Arc<FakeApi>, def: &'static TableDef) -> TableBinding<FakeApi> {
    let (env, _clock) = env_at("2024-05-10T12:00:00Z");
    TableBinding::new(def, api.clone(), env)
  }

  #[test]
  fn test_request_url_strips_client_only_params() {
    let location = Location::parse(
      r#"/sel/stats?team=A&sort=[{"columnKey":"Name","direction":"ASC"}]&search=x&page=2&pageSize=25&season=2024"#,
    );
    assert_eq!(
      request_url("/api/sel/stats", &location.query),
      "/api/sel/stats?season=2024&team=A"
    );
    assert_eq!(
      request_url("/api/sel/stats", &QueryParams::new()),
      "/api/sel/stats"
    );
  }

  #[tokio::test]
  async fn test_sync_loads_rows() {
    let api = Arc::new(FakeApi::new());
    api.respond(
      "/api/sel/stats?season=2024",
      json!([{ "Name": "R1", "Season": 2024, "Team": "A" }]),
    );
    let mut table = binding(&api, &STATS);

    assert!(table.sync(&Location::parse("/sel/stats?season=2024")));
    assert!(table.data().is_loading);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(table.poll());
    let data = table.data();
    assert!(!data.is_loading);
    assert_eq!(data.rows.len(), 1);
    assert!(data.error.is_none());
  }

  #[tokio::test]
  async fn test_sort_change_does_not_refetch() {
    let api = Arc::new(FakeApi::new());
    api.respond("/api/sel/stats?season=2024", json!([]));
    let mut table = binding(&api, &STATS);

    table.sync(&Location::parse("/sel/stats?season=2024"));
    let sorted = Location::parse(
      r#"/sel/stats?season=2024&sort=[{"columnKey":"Average","direction":"DESC"}]&page=2"#,
    );
    assert!(!table.sync(&sorted));
    tokio::time::sleep(Duration::from_millis(20)).await;
    table.poll();
    assert_eq!(api.requests().len(), 1);
  }

  #[tokio::test]
  async fn test_non_array_response_shows_no_rows() {
    let api = Arc::new(FakeApi::new());
    api.respond("/api/sel/speed", json!({ "error": "Failed to fetch speed data" }));
    let mut table = binding(&api, &SPEED);

    table.sync(&Location::parse("/sel/speed"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    table.poll();
    assert_eq!(table.data(), TableData::default());
  }

  #[tokio::test]
  async fn test_fetch_failure_is_exposed_as_error() {
    let api = Arc::new(FakeApi::new());
    api.fail("/api/sel/stats", 500);
    let mut table = binding(&api, &STATS);

    table.sync(&Location::parse("/sel/stats"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    table.poll();
    let data = table.data();
    assert!(data.rows.is_empty());
    assert!(data.error.is_some());
  }

  #[tokio::test]
  async fn test_rapid_filter_changes_keep_latest_result() {
    let api = Arc::new(FakeApi::new());
    api.respond_after(
      "/api/sel/stats?season=2023",
      json!([{ "Name": "Old", "Season": 2023, "Team": "A" }]),
      Duration::from_millis(80),
    );
    api.respond(
      "/api/sel/stats?season=2024",
      json!([{ "Name": "New", "Season": 2024, "Team": "A" }]),
    );
    let mut table = binding(&api, &STATS);

    table.sync(&Location::parse("/sel/stats?season=2023"));
    table.sync(&Location::parse("/sel/stats?season=2024"));

    tokio::time::sleep(Duration::from_millis(120)).await;
    table.poll();
    let data = table.data();
    assert_eq!(data.rows.len(), 1);
    assert_eq!(data.rows[0]["Name"], "New");
  }

  #[tokio::test]
  async fn test_reload_repeats_current_request() {
    let api = Arc::new(FakeApi::new());
    api.fail("/api/sel/stats", 503);
    let mut table = binding(&api, &STATS);

    table.reload();
    assert!(api.requests().is_empty());

    table.sync(&Location::parse("/sel/stats"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    table.poll();
    api.respond("/api/sel/stats", json!([]));
    table.reload();
    tokio::time::sleep(Duration::from_millis(20)).await;
    table.poll();
    assert_eq!(api.requests().len(), 2);
    assert!(table.data().error.is_none());
  }

  #[tokio::test]
  async fn test_reload_after_success_fetches_fresh_rows() {
    let api = Arc::new(FakeApi::new());
    api.respond(
      "/api/sel/stats?season=2024",
      json!([{ "Name": "R1", "Season": 2024, "Team": "A" }]),
    );
    let mut table = binding(&api, &STATS);

    table.sync(&Location::parse("/sel/stats?season=2024"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    table.poll();

    api.respond(
      "/api/sel/stats?season=2024",
      json!([{ "Name": "R2", "Season": 2024, "Team": "A" }]),
    );
    table.reload();
    tokio::time::sleep(Duration::from_millis(20)).await;
    table.poll();

    assert_eq!(
      api.requests(),
      vec!["/api/sel/stats?season=2024", "/api/sel/stats?season=2024"]
    );
    assert_eq!(table.data().rows[0]["Name"], "R2");
  }
}
