//! Query-string canonicalization shared by the filter controller and the caches.
//!
//! Both the location the user sees and the keys the caches derive go through
//! [`canonicalize`], so two URLs that differ only in parameter order or in
//! comma encoding always map to the same string.

use url::form_urlencoded;

/// Ordered list of query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
  pairs: Vec<(String, String)>,
}

impl QueryParams {
  pub fn new() -> Self {
    Self::default()
  }

  /// Parse a query string (with or without a leading `?`).
  pub fn parse(query: &str) -> Self {
    let query = query.strip_prefix('?').unwrap_or(query);
    let pairs = form_urlencoded::parse(query.as_bytes())
      .map(|(k, v)| (k.into_owned(), v.into_owned()))
      .collect();
    Self { pairs }
  }

  /// First value for `key`, if present.
  pub fn get(&self, key: &str) -> Option<&str> {
    self
      .pairs
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  /// Replace every value for `key` with a single value, keeping the position
  /// of the first occurrence.
  pub fn set(&mut self, key: &str, value: impl Into<String>) {
    let value = value.into();
    match self.pairs.iter().position(|(k, _)| k == key) {
      Some(idx) => {
        self.pairs[idx].1 = value;
        let mut seen = false;
        self.pairs.retain(|(k, _)| {
          if k != key {
            return true;
          }
          let keep = !seen;
          seen = true;
          keep
        });
      }
      None => self.pairs.push((key.to_string(), value)),
    }
  }

  pub fn remove(&mut self, key: &str) {
    self.pairs.retain(|(k, _)| k != key);
  }

  /// Copy of these parameters without the given keys.
  pub fn without(&self, keys: &[&str]) -> Self {
    Self {
      pairs: self
        .pairs
        .iter()
        .filter(|(k, _)| !keys.contains(&k.as_str()))
        .cloned()
        .collect(),
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }
}

/// Serialize parameters sorted by name, form-encoded, with commas kept literal.
///
/// The sort is stable, so repeated keys keep their relative order.
pub fn canonicalize(params: &QueryParams) -> String {
  let mut sorted: Vec<(&str, &str)> = params.iter().collect();
  sorted.sort_by(|a, b| a.0.cmp(b.0));

  let mut serializer = form_urlencoded::Serializer::new(String::new());
  for (k, v) in sorted {
    serializer.append_pair(k, v);
  }
  serializer.finish().replace("%2C", ",")
}

/// Split a relative or absolute URL into its path and parsed query.
pub fn split_url(url: &str) -> (&str, QueryParams) {
  match url.split_once('?') {
    Some((path, query)) => (path, QueryParams::parse(query)),
    None => (url, QueryParams::new()),
  }
}

/// Build `path?canonical-query`, or just `path` when there are no parameters.
pub fn join_url(path: &str, params: &QueryParams) -> String {
  let query = canonicalize(params);
  if query.is_empty() {
    path.to_string()
  } else {
    format!("{}?{}", path, query)
  }
}

/// Parse a comma-separated list of integers, dropping tokens that do not parse.
pub fn parse_number_list(value: Option<&str>) -> Vec<i32> {
  match value {
    Some(v) => v
      .split(',')
      .filter_map(|t| t.trim().parse::<i32>().ok())
      .collect(),
    None => Vec::new(),
  }
}

/// Parse a comma-separated list of strings, dropping empty tokens.
pub fn parse_string_list(value: Option<&str>) -> Vec<String> {
  match value {
    Some(v) => v
      .split(',')
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(String::from)
      .collect(),
    None => Vec::new(),
  }
}

/// Join values with a literal comma.
pub fn join_list<T: ToString>(values: &[T]) -> String {
  values
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join(",")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_canonicalize_sorts_by_name() {
    let a = QueryParams::parse("team=A&league=PGE");
    let b = QueryParams::parse("?league=PGE&team=A");
    assert_eq!(canonicalize(&a), "league=PGE&team=A");
    assert_eq!(canonicalize(&a), canonicalize(&b));
  }

  #[test]
  fn test_canonicalize_keeps_commas_literal() {
    let params = QueryParams::parse("season=2023%2C2024&team=A,B");
    assert_eq!(canonicalize(&params), "season=2023,2024&team=A,B");
  }

  #[test]
  fn test_canonicalize_encodes_other_characters() {
    let mut params = QueryParams::new();
    params.set("search", "jan kowalski");
    params.set("team", "LOD/TAR");
    assert_eq!(canonicalize(&params), "search=jan+kowalski&team=LOD%2FTAR");

    let round_trip = QueryParams::parse(&canonicalize(&params));
    assert_eq!(round_trip.get("search"), Some("jan kowalski"));
    assert_eq!(round_trip.get("team"), Some("LOD/TAR"));
  }

  #[test]
  fn test_set_replaces_existing_value() {
    let mut params = QueryParams::parse("season=2023&team=A&season=2022");
    params.set("season", "2024");
    assert_eq!(canonicalize(&params), "season=2024&team=A");
  }

  #[test]
  fn test_split_and_join_url() {
    let (path, params) = split_url("/api/sel/stats?team=A&season=2024");
    assert_eq!(path, "/api/sel/stats");
    assert_eq!(join_url(path, &params), "/api/sel/stats?season=2024&team=A");

    let (path, params) = split_url("/api/sel/seasons");
    assert_eq!(path, "/api/sel/seasons");
    assert_eq!(join_url(path, &params), "/api/sel/seasons");
  }

  #[test]
  fn test_parse_number_list_drops_invalid_tokens() {
    assert_eq!(parse_number_list(Some("2023, 2024,abc,,2025")), vec![2023, 2024, 2025]);
    assert_eq!(parse_number_list(Some("all")), Vec::<i32>::new());
    assert_eq!(parse_number_list(None), Vec::<i32>::new());
  }

  #[test]
  fn test_parse_string_list_drops_empty_tokens() {
    assert_eq!(parse_string_list(Some(" A, ,B ")), vec!["A", "B"]);
    assert!(parse_string_list(Some("")).is_empty());
  }
}
