//! Filter state held in the current location's query string.
//!
//! The location lives in a `watch` channel. Setters rewrite the query in
//! place (a history replace): subscribers observe the new value and derive
//! their fetch URLs from it, nothing is reloaded. Resetting a filter to its
//! empty or default value removes the parameter, so locations never carry
//! empty filters.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use crate::params::{join_list, join_url, parse_number_list, parse_string_list, split_url, QueryParams};

pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Filter parameters understood by the table pages.
pub mod keys {
  pub const SEARCH: &str = "search";
  pub const SEASON: &str = "season";
  pub const TEAM: &str = "team";
  pub const LEAGUE: &str = "league";
  pub const TRACK: &str = "track";
  pub const HEATS: &str = "heats";
  pub const SORT: &str = "sort";
  pub const PAGE: &str = "page";
  pub const PAGE_SIZE: &str = "pageSize";
}

/// Path plus query of the page being shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
  pub path: String,
  pub query: QueryParams,
}

impl Location {
  pub fn parse(href: &str) -> Self {
    let (path, query) = split_url(href);
    Self {
      path: path.to_string(),
      query,
    }
  }

  /// Canonical `path?query` form.
  pub fn href(&self) -> String {
    join_url(&self.path, &self.query)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
  Asc,
  Desc,
}

impl SortDirection {
  pub fn parse(s: &str) -> Option<Self> {
    match s.to_ascii_lowercase().as_str() {
      "asc" => Some(Self::Asc),
      "desc" => Some(Self::Desc),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortColumn {
  pub column_key: String,
  pub direction: SortDirection,
}

/// Read projection of the filter parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
  pub search: String,
  pub seasons: Vec<i32>,
  pub teams: Vec<String>,
  pub leagues: Vec<String>,
  pub tracks: Vec<String>,
  /// Inclusive bounds, present only when `heats` holds two valid integers
  pub heats_range: Option<(i32, i32)>,
  pub sort: Vec<SortColumn>,
  pub page: usize,
  pub page_size: usize,
}

impl FilterState {
  pub fn from_query(query: &QueryParams) -> Self {
    let heats = parse_number_list(query.get(keys::HEATS));
    let heats_range = match heats.as_slice() {
      [min, max] => Some((*min, *max)),
      _ => None,
    };

    Self {
      search: query.get(keys::SEARCH).unwrap_or_default().to_string(),
      seasons: parse_number_list(query.get(keys::SEASON)),
      teams: parse_string_list(query.get(keys::TEAM)),
      leagues: parse_string_list(query.get(keys::LEAGUE)),
      tracks: parse_string_list(query.get(keys::TRACK)),
      heats_range,
      sort: parse_sort(query.get(keys::SORT)),
      page: parse_positive(query.get(keys::PAGE)).unwrap_or(1),
      page_size: parse_positive(query.get(keys::PAGE_SIZE)).unwrap_or(DEFAULT_PAGE_SIZE),
    }
  }
}

fn parse_positive(value: Option<&str>) -> Option<usize> {
  value
    .and_then(|v| v.trim().parse::<usize>().ok())
    .filter(|n| *n > 0)
}

/// Entries that do not decode as a sort column are skipped.
fn parse_sort(value: Option<&str>) -> Vec<SortColumn> {
  let Some(raw) = value else {
    return Vec::new();
  };
  match serde_json::from_str::<Vec<Value>>(raw) {
    Ok(entries) => entries
      .into_iter()
      .filter_map(|entry| serde_json::from_value(entry).ok())
      .collect(),
    Err(e) => {
      tracing::debug!(error = %e, "ignoring malformed sort parameter");
      Vec::new()
    }
  }
}

/// Setters over the shared location.
pub struct FilterController {
  location: watch::Sender<Location>,
}

impl FilterController {
  pub fn new(location: Location) -> Self {
    let (tx, _rx) = watch::channel(location);
    Self { location: tx }
  }

  pub fn subscribe(&self) -> watch::Receiver<Location> {
    self.location.subscribe()
  }

  pub fn location(&self) -> Location {
    self.location.borrow().clone()
  }

  pub fn state(&self) -> FilterState {
    FilterState::from_query(&self.location.borrow().query)
  }

  /// Switch to another page. Subscribers are always notified.
  pub fn navigate(&self, location: Location) {
    tracing::debug!(href = %location.href(), "navigate");
    self.location.send_replace(location);
  }

  /// Rewrite one parameter. `None` or an empty value removes it.
  ///
  /// Returns whether the location changed; unchanged writes do not notify.
  fn replace_param(&self, key: &str, value: Option<String>) -> bool {
    self.location.send_if_modified(|location| {
      let before = location.query.clone();
      match value {
        Some(v) if !v.is_empty() => location.query.set(key, v),
        _ => location.query.remove(key),
      }
      location.query != before
    })
  }

  pub fn set_search(&self, search: &str) -> bool {
    self.replace_param(keys::SEARCH, Some(search.trim().to_string()))
  }

  pub fn set_seasons(&self, seasons: &[i32]) -> bool {
    self.replace_param(keys::SEASON, Some(join_list(seasons)))
  }

  pub fn set_teams(&self, teams: &[String]) -> bool {
    self.replace_param(keys::TEAM, Some(join_list(teams)))
  }

  pub fn set_leagues(&self, leagues: &[String]) -> bool {
    self.replace_param(keys::LEAGUE, Some(join_list(leagues)))
  }

  pub fn set_tracks(&self, tracks: &[String]) -> bool {
    self.replace_param(keys::TRACK, Some(join_list(tracks)))
  }

  pub fn set_heats(&self, range: Option<(i32, i32)>) -> bool {
    let value = range.map(|(min, max)| format!("{},{}", min, max));
    self.replace_param(keys::HEATS, value)
  }

  pub fn set_sort(&self, sort: &[SortColumn]) -> bool {
    let value = if sort.is_empty() {
      None
    } else {
      serde_json::to_string(sort).ok()
    };
    self.replace_param(keys::SORT, value)
  }

  pub fn set_page(&self, page: usize) -> bool {
    let value = (page > 1).then(|| page.to_string());
    self.replace_param(keys::PAGE, value)
  }

  pub fn set_page_size(&self, page_size: usize) -> bool {
    let value = (page_size > 0 && page_size != DEFAULT_PAGE_SIZE).then(|| page_size.to_string());
    self.replace_param(keys::PAGE_SIZE, value)
  }

  /// Remove every filter parameter, keeping unrelated ones.
  pub fn clear_filters(&self) -> bool {
    self.location.send_if_modified(|location| {
      let cleared = location.query.without(&[
        keys::SEARCH,
        keys::SEASON,
        keys::TEAM,
        keys::LEAGUE,
        keys::TRACK,
        keys::HEATS,
        keys::SORT,
        keys::PAGE,
      ]);
      let changed = cleared != location.query;
      location.query = cleared;
      changed
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn controller(href: &str) -> FilterController {
    FilterController::new(Location::parse(href))
  }

  #[test]
  fn test_empty_list_removes_param() {
    let filters = controller("/sel/stats?team=A,B&season=2024");
    assert!(filters.set_teams(&[]));
    assert_eq!(filters.location().href(), "/sel/stats?season=2024");
    assert!(filters.location().query.get("team").is_none());
  }

  #[test]
  fn test_lists_keep_literal_commas() {
    let filters = controller("/sel/stats");
    filters.set_seasons(&[2023, 2024]);
    filters.set_leagues(&["PGE".to_string(), "PGEE".to_string()]);
    assert_eq!(
      filters.location().href(),
      "/sel/stats?league=PGE,PGEE&season=2023,2024"
    );
  }

  #[test]
  fn test_projection_decodes_encoded_commas_and_drops_bad_tokens() {
    let filters = controller("/sel/stats?season=2023%2Cabc%2C2024&team=A%2CB");
    let state = filters.state();
    assert_eq!(state.seasons, vec![2023, 2024]);
    assert_eq!(state.teams, vec!["A".to_string(), "B".to_string()]);
  }

  #[test]
  fn test_defaults_when_params_absent() {
    let state = controller("/sel/speed").state();
    assert_eq!(state.search, "");
    assert!(state.seasons.is_empty());
    assert!(state.heats_range.is_none());
    assert!(state.sort.is_empty());
    assert_eq!(state.page, 1);
    assert_eq!(state.page_size, DEFAULT_PAGE_SIZE);
  }

  #[test]
  fn test_heats_range_needs_two_integers() {
    assert_eq!(controller("/s?heats=5,20").state().heats_range, Some((5, 20)));
    assert_eq!(controller("/s?heats=5").state().heats_range, None);
    assert_eq!(controller("/s?heats=5,x").state().heats_range, None);

    let filters = controller("/s?heats=5,20");
    filters.set_heats(None);
    assert_eq!(filters.location().href(), "/s");
  }

  #[test]
  fn test_sort_round_trips_as_json() {
    let filters = controller("/sel/stats");
    let sort = vec![SortColumn {
      column_key: "Average".to_string(),
      direction: SortDirection::Desc,
    }];
    filters.set_sort(&sort);
    assert_eq!(
      filters.location().query.get("sort"),
      Some(r#"[{"columnKey":"Average","direction":"DESC"}]"#)
    );
    assert_eq!(filters.state().sort, sort);

    filters.set_sort(&[]);
    assert!(filters.location().query.get("sort").is_none());
  }

  #[test]
  fn test_malformed_sort_is_empty() {
    assert!(controller("/s?sort=not-json").state().sort.is_empty());
    let state = controller(r#"/s?sort=[{"columnKey":"Name","direction":"ASC"},{"bad":1}]"#).state();
    assert_eq!(state.sort.len(), 1);
    assert_eq!(state.sort[0].direction, SortDirection::Asc);
  }

  #[test]
  fn test_default_page_values_are_removed() {
    let filters = controller("/s?page=3&pageSize=100");
    filters.set_page(1);
    filters.set_page_size(DEFAULT_PAGE_SIZE);
    assert_eq!(filters.location().href(), "/s");
  }

  #[test]
  fn test_search_is_trimmed_and_cleared() {
    let filters = controller("/s");
    filters.set_search("  zmarzlik ");
    assert_eq!(filters.state().search, "zmarzlik");
    filters.set_search("   ");
    assert!(filters.location().query.get("search").is_none());
  }

  #[tokio::test]
  async fn test_subscribers_see_changes_once() {
    let filters = controller("/sel/stats?season=2024");
    let mut rx = filters.subscribe();
    rx.borrow_and_update();

    assert!(!filters.set_seasons(&[2024]));
    assert!(!rx.has_changed().unwrap());

    assert!(filters.set_seasons(&[2023]));
    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().href(), "/sel/stats?season=2023");
  }

  #[test]
  fn test_clear_filters_keeps_page_size() {
    let filters = controller("/s?season=2024&team=A&pageSize=25&search=x&page=2");
    assert!(filters.clear_filters());
    assert_eq!(filters.location().href(), "/s?pageSize=25");
    assert!(!filters.clear_filters());
  }
}
