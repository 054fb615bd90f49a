//! Values offered for each filter of a table page.
//!
//! Option lists are small documents read through the keyed cache. Some are
//! narrowed by the filters already chosen (teams by season and league), so
//! their URLs follow the filter state.

use serde_json::Value;

use super::TableDef;
use crate::api::Fetch;
use crate::cache::KeyedCache;
use crate::filters::FilterState;
use crate::params::{join_list, join_url, QueryParams};
use crate::query::Query;

/// Selected filter values that narrow an option list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Narrow {
  Seasons,
  Leagues,
}

/// Endpoint listing the values of one filter.
#[derive(Debug, PartialEq, Eq)]
pub struct OptionSource {
  /// Filter parameter the values are for, e.g. `team`
  pub key: &'static str,
  pub endpoint: &'static str,
  /// API parameter and the selection it carries
  pub narrowed_by: &'static [(&'static str, Narrow)],
}

impl OptionSource {
  /// Request URL for the current filters.
  pub fn url(&self, state: &FilterState) -> String {
    let mut params = QueryParams::new();
    for (param, narrow) in self.narrowed_by {
      let value = match narrow {
        Narrow::Seasons => join_list(&state.seasons),
        Narrow::Leagues => join_list(&state.leagues),
      };
      if !value.is_empty() {
        params.set(param, value);
      }
    }
    join_url(self.endpoint, &params)
  }
}

/// Option list URLs a page requests under `state`.
pub fn option_urls(def: &TableDef, state: &FilterState) -> Vec<String> {
  def.options.iter().map(|source| source.url(state)).collect()
}

struct OptionList {
  source: &'static OptionSource,
  url: Option<String>,
  query: Query<Value>,
}

/// Loaded option lists of one table page.
pub struct FilterOptions<F: Fetch> {
  keyed: KeyedCache<F>,
  lists: Vec<OptionList>,
}

impl<F: Fetch + 'static> FilterOptions<F> {
  pub fn new(def: &'static TableDef, keyed: KeyedCache<F>) -> Self {
    let lists = def
      .options
      .iter()
      .map(|source| OptionList {
        source,
        url: None,
        query: Query::manual(),
      })
      .collect();
    Self { keyed, lists }
  }

  /// Load every list whose URL changed under `state`.
  pub fn sync(&mut self, state: &FilterState) -> bool {
    let mut started = false;
    for list in &mut self.lists {
      let url = list.source.url(state);
      if list.url.as_deref() != Some(url.as_str()) {
        load(&self.keyed, list, url);
        started = true;
      }
    }
    started
  }

  /// Fetch every list again, bypassing the cache.
  pub fn reload(&mut self) {
    for list in &mut self.lists {
      if let Some(url) = list.url.clone() {
        self.keyed.invalidate(&url);
        load(&self.keyed, list, url);
      }
    }
  }

  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    for list in &mut self.lists {
      changed |= list.query.poll();
    }
    changed
  }

  /// Values offered for filter `key`. Empty while loading, on error and for
  /// non-array responses.
  pub fn values(&self, key: &str) -> Vec<String> {
    self
      .lists
      .iter()
      .find(|list| list.source.key == key)
      .and_then(|list| list.query.data())
      .and_then(Value::as_array)
      .map(|values| values.iter().map(option_text).collect())
      .unwrap_or_default()
  }
}

fn load<F: Fetch + 'static>(keyed: &KeyedCache<F>, list: &mut OptionList, url: String) {
  tracing::debug!(key = list.source.key, %url, "loading filter options");
  list.url = Some(url.clone());
  let keyed = keyed.clone();
  list.query.run(async move {
    keyed
      .get(&url)
      .await
      .map(|r| r.data)
      .map_err(|e| e.to_string())
  });
}

fn option_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}
