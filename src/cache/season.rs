//! Season-partitioned cache for table endpoints.
//!
//! Table endpoints take a `season` filter next to other filters (team,
//! league, track). Responses are stored per *scope* (path plus every
//! non-season parameter) and split into one partition per season, so a
//! request that only adds a season fetches just that season and reuses
//! the rest.
//!
//! Persisted form under `seasonCache:<path>|<canonical params without season>`:
//!
//! ```json
//! { "bySeason": { "2023": [...], "2024": [...] }, "allLoaded": false, "expiry": 1715378400000 }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::traits::CacheResult;
use super::CacheEnv;
use crate::api::{json_kind, Fetch, FetchError, Row};
use crate::params::{self, canonicalize, join_list, parse_number_list, QueryParams};

/// Key prefix for season cache entries.
pub const KEY_PREFIX: &str = "seasonCache:";

/// Partition key for rows without a season value.
pub const UNSCOPED: &str = "all";

const SEASON_PARAM: &str = "season";

/// Which row fields carry the season and the row identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSchema {
  pub season_field: String,
  pub identity_fields: Vec<String>,
}

impl Default for PartitionSchema {
  fn default() -> Self {
    Self::new("Season", &["Name", "Season", "Team"])
  }
}

impl PartitionSchema {
  pub fn new(season_field: &str, identity_fields: &[&str]) -> Self {
    Self {
      season_field: season_field.to_string(),
      identity_fields: identity_fields.iter().map(|f| f.to_string()).collect(),
    }
  }

  /// Partition key for a row: its season as a string, or [`UNSCOPED`].
  pub fn season_key(&self, row: &Row) -> String {
    match row.get(&self.season_field) {
      None | Some(Value::Null) => UNSCOPED.to_string(),
      Some(value) => scalar_key(value),
    }
  }

  /// Composite identity used to drop duplicate rows.
  fn identity(&self, row: &Row) -> String {
    self
      .identity_fields
      .iter()
      .map(|field| match row.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(value) => scalar_key(value),
      })
      .collect::<Vec<_>>()
      .join("\u{1f}")
  }

  /// Keep the first row of each identity, preserving order.
  fn dedupe<'a>(&self, rows: impl IntoIterator<Item = &'a Row>) -> Vec<Row> {
    let mut seen = HashSet::new();
    rows
      .into_iter()
      .filter(|row| seen.insert(self.identity(row)))
      .cloned()
      .collect()
  }
}

fn scalar_key(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Number(n) => n
      .as_i64()
      .map(|i| i.to_string())
      .unwrap_or_else(|| n.to_string()),
    other => other.to_string(),
  }
}

/// Seasons selected by a request's `season` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeasonSelection {
  /// No usable season filter: every season
  All,
  /// Exactly these seasons, in request order
  Only(Vec<i32>),
}

impl SeasonSelection {
  /// A missing parameter, or one with no valid integer (such as the API's
  /// `season=all`), selects every season, which is what the API returns
  /// for such a URL.
  pub fn from_params(params: &QueryParams) -> Self {
    let seasons = dedup(&parse_number_list(params.get(SEASON_PARAM)));
    if seasons.is_empty() {
      SeasonSelection::All
    } else {
      SeasonSelection::Only(seasons)
    }
  }
}

fn dedup(seasons: &[i32]) -> Vec<i32> {
  let mut seen = HashSet::new();
  seasons.iter().copied().filter(|s| seen.insert(*s)).collect()
}

/// A table request split into scope and season selection.
#[derive(Debug, Clone)]
struct ScopedRequest {
  url: String,
  api_path: String,
  scope: QueryParams,
  selection: SeasonSelection,
}

impl ScopedRequest {
  fn parse(url: &str) -> Self {
    let (api_path, params) = params::split_url(url);
    Self {
      url: url.to_string(),
      api_path: api_path.to_string(),
      scope: params.without(&[SEASON_PARAM]),
      selection: SeasonSelection::from_params(&params),
    }
  }

  fn scope_key(&self) -> String {
    format!("{}|{}", self.api_path, canonicalize(&self.scope))
  }

  fn cache_key(&self) -> String {
    format!("{}{}", KEY_PREFIX, self.scope_key())
  }

  /// URL for the given seasons, or the original URL for a full fetch.
  fn fetch_url(&self, seasons: Option<&[i32]>) -> String {
    match seasons {
      None => self.url.clone(),
      Some(seasons) => {
        let mut params = self.scope.clone();
        params.set(SEASON_PARAM, join_list(seasons));
        params::join_url(&self.api_path, &params)
      }
    }
  }
}

/// Cached rows of one scope, partitioned by season.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonPartitions {
  pub by_season: BTreeMap<String, Vec<Row>>,
  pub all_loaded: bool,
  pub expiry: i64,
}

impl SeasonPartitions {
  /// Rows for `selection`, or `None` when the partitions cannot answer it.
  ///
  /// Every season is only answerable once a full fetch happened; a season
  /// list is answerable when each listed season has a partition.
  fn assemble(&self, selection: &SeasonSelection, schema: &PartitionSchema) -> Option<Vec<Row>> {
    match selection {
      SeasonSelection::All => {
        if !self.all_loaded {
          return None;
        }
        Some(schema.dedupe(self.by_season.values().flatten()))
      }
      SeasonSelection::Only(seasons) => {
        let partitions = seasons
          .iter()
          .map(|s| self.by_season.get(&s.to_string()))
          .collect::<Option<Vec<_>>>()?;
        Some(schema.dedupe(partitions.into_iter().flatten()))
      }
    }
  }

  /// Requested seasons without a partition, in request order.
  fn missing(&self, seasons: &[i32]) -> Vec<i32> {
    dedup(seasons)
      .into_iter()
      .filter(|s| !self.by_season.contains_key(&s.to_string()))
      .collect()
  }

  /// Add fetched rows. Never removes partitions or rows.
  ///
  /// `requested` is the season list the rows were fetched for, or `None`
  /// for an unrestricted fetch. Each requested season gets a partition even
  /// when the API returned no rows for it.
  fn merge(&mut self, rows: &[Row], requested: Option<&[i32]>, schema: &PartitionSchema) {
    if let Some(seasons) = requested {
      for season in seasons {
        self.by_season.entry(season.to_string()).or_default();
      }
    }

    let mut known: BTreeMap<String, HashSet<String>> = BTreeMap::new();
    for row in rows {
      let season = schema.season_key(row);
      let partition = self.by_season.entry(season.clone()).or_default();
      let ids = known
        .entry(season)
        .or_insert_with(|| partition.iter().map(|r| schema.identity(r)).collect());
      if ids.insert(schema.identity(row)) {
        partition.push(row.clone());
      }
    }

    if requested.is_none() {
      self.all_loaded = true;
    }
  }
}

/// Season-partitioned cache over a [`Fetch`] implementation.
pub struct SeasonCache<F: Fetch> {
  fetcher: Arc<F>,
  env: CacheEnv,
  schema: PartitionSchema,
}

impl<F: Fetch> SeasonCache<F> {
  pub fn new(fetcher: Arc<F>, env: CacheEnv, schema: PartitionSchema) -> Self {
    Self {
      fetcher,
      env,
      schema,
    }
  }

  /// Identity of the scope `url` belongs to: `<path>|<params without season>`.
  pub fn scope_key(url: &str) -> String {
    ScopedRequest::parse(url).scope_key()
  }

  /// Drop every cached season of the scope `url` belongs to.
  pub fn invalidate(&self, url: &str) {
    let key = ScopedRequest::parse(url).cache_key();
    tracing::debug!(%key, "invalidating season cache scope");
    if let Err(e) = self.env.store.remove(&key) {
      tracing::warn!(%key, error = %e, "failed to invalidate cache entry");
    }
  }

  /// Rows for `url`, fetching only the seasons not cached yet.
  pub async fn get(&self, url: &str) -> Result<CacheResult<Vec<Row>>, FetchError> {
    let request = ScopedRequest::parse(url);
    let key = request.cache_key();
    let cached = self.load(&key);

    if let Some(rows) = cached
      .as_ref()
      .and_then(|c| c.assemble(&request.selection, &self.schema))
    {
      tracing::debug!(%key, rows = rows.len(), "season cache hit");
      return Ok(CacheResult::from_cache(rows));
    }

    let missing = match &request.selection {
      SeasonSelection::All => None,
      SeasonSelection::Only(seasons) => {
        let missing = match &cached {
          Some(c) => c.missing(seasons),
          None => seasons.clone(),
        };
        if missing.is_empty() {
          // Another writer filled the gap since the first read.
          if let Some(rows) = self
            .load(&key)
            .and_then(|c| c.assemble(&request.selection, &self.schema))
          {
            return Ok(CacheResult::from_cache(rows));
          }
          Some(seasons.clone())
        } else {
          Some(missing)
        }
      }
    };

    let fetch_url = request.fetch_url(missing.as_deref());
    tracing::debug!(%key, url = %fetch_url, ?missing, "season cache miss");

    let rows = match self.fetcher.get_json(&fetch_url).await? {
      Value::Array(rows) => rows,
      other => return Err(FetchError::Shape(json_kind(&other))),
    };

    self.persist(&key, &rows, missing.as_deref());

    let mut local = cached.unwrap_or_default();
    local.merge(&rows, missing.as_deref(), &self.schema);
    let assembled = local
      .assemble(&request.selection, &self.schema)
      .unwrap_or_else(|| self.schema.dedupe(rows.iter()));

    Ok(CacheResult::from_network(assembled))
  }

  /// Unexpired partitions for a cache key. Expired entries are deleted,
  /// unreadable ones ignored.
  fn load(&self, key: &str) -> Option<SeasonPartitions> {
    let raw = match self.env.store.get(key) {
      Ok(raw) => raw?,
      Err(e) => {
        tracing::warn!(%key, error = %e, "cache read failed");
        return None;
      }
    };

    let entry: SeasonPartitions = match serde_json::from_str(&raw) {
      Ok(entry) => entry,
      Err(e) => {
        tracing::debug!(%key, error = %e, "ignoring unreadable season cache entry");
        return None;
      }
    };

    if self.env.now_millis() < entry.expiry {
      return Some(entry);
    }

    tracing::debug!(%key, "season cache entry expired");
    if let Err(e) = self.env.store.remove(key) {
      tracing::warn!(%key, error = %e, "failed to delete expired cache entry");
    }
    None
  }

  /// Merge fetched rows into whatever is stored now.
  ///
  /// The merge runs inside the store's read-modify-write, so seasons added
  /// by another request in the meantime are kept.
  fn persist(&self, key: &str, rows: &[Row], requested: Option<&[i32]>) {
    let now = self.env.now_millis();
    let expiry = self.env.expiry_millis();
    let schema = &self.schema;

    let result = self.env.store.update(key, &mut |current| {
      let mut entry = current
        .and_then(|raw| serde_json::from_str::<SeasonPartitions>(&raw).ok())
        .filter(|e| now < e.expiry)
        .unwrap_or_default();
      entry.merge(rows, requested, schema);
      entry.expiry = expiry;
      serde_json::to_string(&entry).ok()
    });

    if let Err(e) = result {
      tracing::warn!(%key, error = %e, "season cache write failed");
    }
  }
}

impl<F: Fetch> Clone for SeasonCache<F> {
  fn clone(&self) -> Self {
    Self {
      fetcher: Arc::clone(&self.fetcher),
      env: self.env.clone(),
      schema: self.schema.clone(),
    }
  }
}
