//! Client-side row pipeline: search, heats range, sort, rank, paginate.
//!
//! Runs on the rows the binding delivers. None of these steps touch the
//! network or the cache key.

use serde_json::Value;
use std::cmp::Ordering;

use super::TableDef;
use crate::api::Row;
use crate::filters::{FilterState, SortColumn, SortDirection};

#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
  /// 1-based position after filtering and sorting
  pub rank: usize,
  pub row: Row,
}

/// One page of processed rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RowPage {
  pub rows: Vec<RankedRow>,
  /// Rows left after filtering, across all pages
  pub total: usize,
  /// Page actually shown, clamped to `1..=page_count`
  pub page: usize,
  pub page_count: usize,
}

pub fn apply(def: &TableDef, rows: &[Row], state: &FilterState) -> RowPage {
  let needle = state.search.trim().to_lowercase();

  let mut filtered: Vec<&Row> = rows
    .iter()
    .filter(|row| needle.is_empty() || search_text(def, row).contains(&needle))
    .filter(|row| match (def.heats_field, state.heats_range) {
      (Some(field), Some(range)) => in_range(row.get(field), range),
      _ => true,
    })
    .collect();

  // sort_by is stable: equal rows keep the API order
  if !state.sort.is_empty() {
    filtered.sort_by(|a, b| compare_rows(def, a, b, &state.sort));
  }

  let total = filtered.len();
  let page_size = state.page_size.max(1);
  let page_count = total.div_ceil(page_size).max(1);
  let page = state.page.clamp(1, page_count);

  let rows = filtered
    .into_iter()
    .enumerate()
    .skip((page - 1) * page_size)
    .take(page_size)
    .map(|(idx, row)| RankedRow {
      rank: idx + 1,
      row: row.clone(),
    })
    .collect();

  RowPage {
    rows,
    total,
    page,
    page_count,
  }
}

fn search_text(def: &TableDef, row: &Row) -> String {
  def
    .search_fields
    .iter()
    .filter_map(|field| row.get(*field).and_then(Value::as_str))
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}

fn in_range(value: Option<&Value>, (min, max): (i32, i32)) -> bool {
  let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
  match value.and_then(as_number) {
    Some(n) => n >= f64::from(lo) && n <= f64::from(hi),
    None => false,
  }
}

fn as_number(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

fn compare_rows(def: &TableDef, a: &Row, b: &Row, sort: &[SortColumn]) -> Ordering {
  for column in sort {
    let numeric = def
      .column(&column.column_key)
      .map(|c| c.numeric)
      .unwrap_or(false);
    let ord = compare_values(a.get(&column.column_key), b.get(&column.column_key), numeric);
    let ord = match column.direction {
      SortDirection::Asc => ord,
      SortDirection::Desc => ord.reverse(),
    };
    if ord != Ordering::Equal {
      return ord;
    }
  }
  Ordering::Equal
}

/// Missing values sort first ascending. Numbers compare numerically when
/// the column is numeric or both sides are JSON numbers.
fn compare_values(a: Option<&Value>, b: Option<&Value>, numeric: bool) -> Ordering {
  let a = a.filter(|v| !v.is_null());
  let b = b.filter(|v| !v.is_null());
  match (a, b) {
    (None, None) => Ordering::Equal,
    (None, Some(_)) => Ordering::Less,
    (Some(_), None) => Ordering::Greater,
    (Some(a), Some(b)) => {
      if numeric || (a.is_number() && b.is_number()) {
        if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
          return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
        }
      }
      match (a.as_str(), b.as_str()) {
        (Some(x), Some(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        _ => a.to_string().cmp(&b.to_string()),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::filters::{FilterState, Location};
  use crate::table::{SPEED, STATS};
  use serde_json::json;

  fn state(href: &str) -> FilterState {
    FilterState::from_query(&Location::parse(href).query)
  }

  fn names(page: &RowPage, key: &str) -> Vec<String> {
    page
      .rows
      .iter()
      .map(|r| r.row[key].as_str().unwrap_or_default().to_string())
      .collect()
  }

  fn stats_rows() -> Vec<Row> {
    vec![
      json!({ "Name": "Bartosz Zmarzlik", "Team": "Lublin", "Average": 2.61, "Heats": 60 }),
      json!({ "Name": "Maciej Janowski", "Team": "Wroclaw", "Average": "2.35", "Heats": 55 }),
      json!({ "Name": "Jason Doyle", "Team": "Lublin", "Average": 2.10, "Heats": 12 }),
      json!({ "Name": "Leon Madsen", "Team": "Czestochowa", "Average": 2.35, "Heats": 58 }),
    ]
  }

  #[test]
  fn test_no_filters_keeps_api_order() {
    let page = apply(&STATS, &stats_rows(), &state("/sel/stats"));
    assert_eq!(page.total, 4);
    assert_eq!(page.rows[0].rank, 1);
    assert_eq!(names(&page, "Name")[3], "Leon Madsen");
  }

  #[test]
  fn test_search_is_case_insensitive_across_name_fields() {
    let rows = vec![
      json!({ "rider_name": "Bartosz", "rider_surname": "Zmarzlik", "max_speed": 121.4 }),
      json!({ "rider_name": "Patryk", "rider_surname": "Dudek", "max_speed": 119.0 }),
    ];
    let page = apply(&SPEED, &rows, &state("/sel/speed?search=bartosz%20zm"));
    assert_eq!(page.total, 1);
    assert_eq!(names(&page, "rider_surname"), vec!["Zmarzlik"]);
  }

  #[test]
  fn test_heats_range_is_inclusive() {
    let page = apply(&STATS, &stats_rows(), &state("/sel/stats?heats=55,58"));
    assert_eq!(
      names(&page, "Name"),
      vec!["Maciej Janowski", "Leon Madsen"]
    );
  }

  #[test]
  fn test_multi_column_sort_is_numeric_and_stable() {
    let sort = r#"[{"columnKey":"Average","direction":"DESC"},{"columnKey":"Name","direction":"ASC"}]"#;
    let page = apply(&STATS, &stats_rows(), &state(&format!("/sel/stats?sort={}", sort)));
    assert_eq!(
      names(&page, "Name"),
      vec![
        "Bartosz Zmarzlik",
        "Leon Madsen",
        "Maciej Janowski",
        "Jason Doyle"
      ]
    );
    let ranks: Vec<usize> = page.rows.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4]);
  }

  #[test]
  fn test_pagination_ranks_continue_across_pages() {
    let rows: Vec<Row> = (1..=7).map(|i| json!({ "Name": format!("R{}", i) })).collect();
    let page = apply(&STATS, &rows, &state("/sel/stats?page=2&pageSize=3"));
    assert_eq!(page.page_count, 3);
    assert_eq!(names(&page, "Name"), vec!["R4", "R5", "R6"]);
    assert_eq!(page.rows[0].rank, 4);
  }

  #[test]
  fn test_page_is_clamped() {
    let rows: Vec<Row> = (1..=4).map(|i| json!({ "Name": format!("R{}", i) })).collect();
    let page = apply(&STATS, &rows, &state("/sel/stats?page=9&pageSize=3"));
    assert_eq!(page.page, 2);
    assert_eq!(names(&page, "Name"), vec!["R4"]);

    let empty = apply(&STATS, &[], &state("/sel/stats?page=3"));
    assert_eq!(empty.page, 1);
    assert_eq!(empty.page_count, 1);
    assert!(empty.rows.is_empty());
  }

  #[test]
  fn test_missing_values_sort_first() {
    let rows = vec![
      json!({ "Name": "A", "Bonus": 3 }),
      json!({ "Name": "B" }),
      json!({ "Name": "C", "Bonus": 1 }),
    ];
    let sort = r#"[{"columnKey":"Bonus","direction":"ASC"}]"#;
    let page = apply(&STATS, &rows, &state(&format!("/s?sort={}", sort)));
    assert_eq!(names(&page, "Name"), vec!["B", "C", "A"]);
  }
}
