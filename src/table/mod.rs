//! Table pages backed by the season cache.

mod binding;
mod options;
mod pipeline;

pub use binding::{request_url, TableBinding, TableData};
pub use options::{option_urls, FilterOptions, Narrow, OptionSource};
pub use pipeline::{apply, RankedRow, RowPage};

use serde_json::Value;

use crate::api::Row;
use crate::cache::PartitionSchema;
use crate::filters::keys;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
  pub key: &'static str,
  pub title: &'static str,
  pub width: u16,
  /// Compare as numbers when sorting, even if the API sends strings
  pub numeric: bool,
}

const fn text(key: &'static str, title: &'static str, width: u16) -> Column {
  Column {
    key,
    title,
    width,
    numeric: false,
  }
}

const fn num(key: &'static str, title: &'static str, width: u16) -> Column {
  Column {
    key,
    title,
    width,
    numeric: true,
  }
}

/// One table page: where its rows come from and how they are shown.
#[derive(Debug, PartialEq, Eq)]
pub struct TableDef {
  pub id: &'static str,
  pub title: &'static str,
  /// Location path of the page, e.g. `/sel/stats`
  pub page_path: &'static str,
  pub api_path: &'static str,
  pub columns: &'static [Column],
  /// Fields joined with a space and matched against the search text
  pub search_fields: &'static [&'static str],
  pub heats_field: Option<&'static str>,
  pub season_field: &'static str,
  pub identity_fields: &'static [&'static str],
  /// Lists of values offered for the filters
  pub options: &'static [OptionSource],
}

impl TableDef {
  pub fn schema(&self) -> PartitionSchema {
    PartitionSchema::new(self.season_field, self.identity_fields)
  }

  /// Look up a column by key or title, ignoring case.
  pub fn column(&self, name: &str) -> Option<&'static Column> {
    self
      .columns
      .iter()
      .find(|c| c.key.eq_ignore_ascii_case(name) || c.title.eq_ignore_ascii_case(name))
  }
}

pub const STATS: TableDef = TableDef {
  id: "stats",
  title: "Rider stats",
  page_path: "/sel/stats",
  api_path: "/api/sel/stats",
  columns: &[
    text("Name", "Name", 24),
    text("Team", "Team", 16),
    num("Season", "Season", 6),
    text("League", "League", 6),
    num("Average", "Average", 7),
    num("Match", "Match", 5),
    num("Heats", "Heats", 5),
    num("Points", "Points", 6),
    num("Bonus", "Bonus", 5),
    num("Home Avg.", "Home", 6),
    num("Away Avg.", "Away", 6),
    num("Max Speed", "Speed", 6),
  ],
  search_fields: &["Name"],
  heats_field: Some("Heats"),
  season_field: "Season",
  identity_fields: &["Name", "Season", "Team"],
  options: &[
    OptionSource {
      key: keys::SEASON,
      endpoint: "/api/sel/stats/seasons",
      narrowed_by: &[("leagues", Narrow::Leagues)],
    },
    OptionSource {
      key: keys::LEAGUE,
      endpoint: "/api/sel/stats/leagues",
      narrowed_by: &[],
    },
    OptionSource {
      key: keys::TEAM,
      endpoint: "/api/sel/stats/teams",
      narrowed_by: &[("seasons", Narrow::Seasons), ("leagues", Narrow::Leagues)],
    },
  ],
};

pub const SPEED: TableDef = TableDef {
  id: "speed",
  title: "Max speeds",
  page_path: "/sel/speed",
  api_path: "/api/sel/speed",
  columns: &[
    text("rider_name", "Name", 12),
    text("rider_surname", "Surname", 16),
    text("team", "Team", 14),
    num("max_speed", "Speed", 6),
    num("z_score", "Z", 5),
    num("track_avg_speed", "Track avg", 9),
    num("speed_diff", "Diff", 6),
    text("track", "Track", 14),
    text("date", "Date", 10),
    text("match", "Match", 20),
    num("heat", "Heat", 4),
    num("points", "Pts", 3),
    num("season", "Season", 6),
  ],
  search_fields: &["rider_name", "rider_surname"],
  heats_field: None,
  season_field: "season",
  identity_fields: &["season", "date", "match", "heat", "rider_name", "rider_surname"],
  options: &[
    OptionSource {
      key: keys::SEASON,
      endpoint: "/api/sel/speed/seasons",
      narrowed_by: &[],
    },
    OptionSource {
      key: keys::TEAM,
      endpoint: "/api/sel/speed/teams",
      narrowed_by: &[],
    },
    OptionSource {
      key: keys::TRACK,
      endpoint: "/api/sel/speed/tracks",
      narrowed_by: &[],
    },
  ],
};

pub const TABLES: [&TableDef; 2] = [&STATS, &SPEED];

pub fn find(id: &str) -> Option<&'static TableDef> {
  TABLES.into_iter().find(|t| t.id == id)
}

pub fn find_by_path(path: &str) -> Option<&'static TableDef> {
  TABLES.into_iter().find(|t| t.page_path == path)
}

/// Display text for one cell.
pub fn cell_text(row: &Row, key: &str) -> String {
  match row.get(key) {
    None | Some(Value::Null) => String::new(),
    Some(Value::String(s)) => s.clone(),
    Some(Value::Number(n)) => match n.as_i64() {
      Some(i) => i.to_string(),
      None => n.as_f64().map(|f| format!("{:.2}", f)).unwrap_or_default(),
    },
    Some(other) => other.to_string(),
  }
}
