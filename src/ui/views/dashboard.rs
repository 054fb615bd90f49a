use crate::api::{ApiClient, Fetch, Row};
use crate::app::{AppContext, DASHBOARD_PATH};
use crate::cache::{KeyedCache, Prefetcher, SeasonCache};
use crate::filters::{FilterController, FilterState, Location};
use crate::query::{Query, QueryState};
use crate::table::{self, STATS};
use crate::ui::renderfns::truncate;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row as TableRow, Table};
use serde_json::Value;
use std::sync::Arc;

/// (field, title, width) of a dashboard panel column
type PanelColumn = (&'static str, &'static str, u16);

const AVERAGE_COLUMNS: &[PanelColumn] = &[
  ("No", "#", 3),
  ("Name", "Name", 22),
  ("Team", "Team", 14),
  ("Average", "Avg", 5),
];

const SPEED_COLUMNS: &[PanelColumn] = &[
  ("No", "#", 3),
  ("Name", "Name", 22),
  ("Team", "Team", 12),
  ("Speed", "km/h", 6),
  ("Track", "Track", 12),
  ("Date", "Date", 10),
];

/// Best averages and top speeds for the current season and all time
pub struct DashboardView {
  season: i32,
  filters: Arc<FilterController>,
  prefetcher: Prefetcher<ApiClient>,
  stats_cache: SeasonCache<ApiClient>,
  seasons: KeyedQuery<ApiClient>,
  telemetry_seasons: KeyedQuery<ApiClient>,
  best_season: KeyedQuery<ApiClient>,
  best_all: KeyedQuery<ApiClient>,
  speeds_season: KeyedQuery<ApiClient>,
  speeds_all: KeyedQuery<ApiClient>,
  /// Top speeds wait until both averages tables settled
  speeds_started: bool,
}

/// A document read through the keyed cache.
struct KeyedQuery<F: Fetch> {
  keyed: KeyedCache<F>,
  url: String,
  query: Query<Value>,
}

impl<F: Fetch + 'static> KeyedQuery<F> {
  fn new(keyed: &KeyedCache<F>, url: String) -> Self {
    let query = {
      let keyed = keyed.clone();
      let url = url.clone();
      Query::new(move || {
        let keyed = keyed.clone();
        let url = url.clone();
        async move {
          keyed
            .get(&url)
            .await
            .map(|r| r.data)
            .map_err(|e| e.to_string())
        }
      })
    };
    Self {
      keyed: keyed.clone(),
      url,
      query,
    }
  }

  /// Drop the cached copy and fetch from the network.
  fn reload(&mut self) {
    self.keyed.invalidate(&self.url);
    self.query.refetch();
  }
}

impl DashboardView {
  pub fn new(ctx: &AppContext) -> Self {
    let season = ctx.current_season;
    let keyed = &ctx.keyed;

    let mut view = Self {
      season,
      filters: Arc::clone(&ctx.filters),
      prefetcher: ctx.prefetcher.clone(),
      stats_cache: SeasonCache::new(ctx.api.clone(), ctx.env.clone(), STATS.schema()),
      seasons: KeyedQuery::new(keyed, "/api/sel/seasons".to_string()),
      telemetry_seasons: KeyedQuery::new(
        keyed,
        "/api/sel/dashboard/max-speeds/telem-seasons".to_string(),
      ),
      best_season: KeyedQuery::new(
        keyed,
        format!("/api/sel/dashboard/best-averages?season={}", season),
      ),
      best_all: KeyedQuery::new(
        keyed,
        "/api/sel/dashboard/best-averages?season=all".to_string(),
      ),
      speeds_season: KeyedQuery::new(
        keyed,
        format!("/api/sel/dashboard/max-speeds?season={}", season),
      ),
      speeds_all: KeyedQuery::new(
        keyed,
        "/api/sel/dashboard/max-speeds?season=all".to_string(),
      ),
      speeds_started: false,
    };

    view.seasons.query.fetch();
    view.telemetry_seasons.query.fetch();
    view.best_season.query.fetch();
    view.best_all.query.fetch();
    view
  }

  /// Table pages reachable with 1, 2 and 3.
  fn links(&self) -> [String; 3] {
    [
      format!("/sel/stats?season={}&league=PGEE", self.season),
      "/sel/stats?league=PGEE".to_string(),
      format!("/sel/speed?season={}", self.season),
    ]
  }

  fn start_secondary_loads(&mut self) {
    self.speeds_started = true;
    self.speeds_season.query.fetch();
    self.speeds_all.query.fetch();

    // Prime the option lists and stats scopes behind the first two links
    let prefetcher = self.prefetcher.clone();
    let cache = self.stats_cache.clone();
    let targets = prefetch_targets(&self.links()[..2]);
    tokio::spawn(async move {
      for (option_urls, scope_url) in targets {
        prefetcher.prefetch_endpoints(&option_urls).await;
        prefetcher.prefetch_scope(&cache, &scope_url).await;
      }
    });
  }

  fn year_list(query: &Query<Value>) -> String {
    match query.data().and_then(Value::as_array) {
      Some(years) => years
        .iter()
        .map(|y| match y {
          Value::Object(map) => map
            .values()
            .next()
            .map(table_value)
            .unwrap_or_default(),
          other => table_value(other),
        })
        .collect::<Vec<_>>()
        .join(", "),
      None => String::from("-"),
    }
  }

  fn render_panel(
    frame: &mut Frame,
    area: Rect,
    title: String,
    query: &Query<Value>,
    columns: &[PanelColumn],
  ) {
    let block = Block::default()
      .title(title)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let rows: &[Row] = match query.state() {
      QueryState::Success(Value::Array(rows)) => rows,
      QueryState::Idle | QueryState::Loading => {
        let paragraph = Paragraph::new("Loading...")
          .block(block)
          .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(paragraph, area);
        return;
      }
      QueryState::Error(e) => {
        let paragraph = Paragraph::new(format!("Failed to load: {}", e))
          .block(block)
          .style(Style::default().fg(Color::Red));
        frame.render_widget(paragraph, area);
        return;
      }
      // Error-shaped JSON renders as an empty panel
      QueryState::Success(_) => &[],
    };

    let header = TableRow::new(columns.iter().map(|(_, title, _)| Cell::from(*title)))
      .style(Style::default().fg(Color::Cyan).bold());
    let body: Vec<TableRow> = rows
      .iter()
      .map(|row| {
        TableRow::new(columns.iter().map(|(key, _, width)| {
          Cell::from(truncate(&table::cell_text(row, key), *width as usize))
        }))
      })
      .collect();
    let widths = columns.iter().map(|(_, _, width)| Constraint::Length(*width));

    frame.render_widget(Table::new(body, widths).header(header).block(block), area);
  }
}

/// Option list URLs and the stats request behind each link.
fn prefetch_targets(links: &[String]) -> Vec<(Vec<String>, String)> {
  links
    .iter()
    .map(|link| {
      let query = Location::parse(link).query;
      (
        table::option_urls(&STATS, &FilterState::from_query(&query)),
        table::request_url(STATS.api_path, &query),
      )
    })
    .collect()
}

fn table_value(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

impl View for DashboardView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    let link = match key.code {
      KeyCode::Char('1') => Some(0),
      KeyCode::Char('2') => Some(1),
      KeyCode::Char('3') => Some(2),
      KeyCode::Char('r') => {
        self.seasons.reload();
        self.telemetry_seasons.reload();
        self.best_season.reload();
        self.best_all.reload();
        if self.speeds_started {
          self.speeds_season.reload();
          self.speeds_all.reload();
        }
        None
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => None,
    };

    if let Some(idx) = link {
      let links = self.links();
      self.filters.navigate(Location::parse(&links[idx]));
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let rows = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(2),
        Constraint::Percentage(50),
        Constraint::Percentage(50),
      ])
      .split(area);

    let links = self.links();
    let intro = vec![
      Line::from(vec![
        Span::styled(" Seasons: ", Style::default().fg(Color::DarkGray)),
        Span::raw(Self::year_list(&self.seasons.query)),
        Span::styled("   Telemetry: ", Style::default().fg(Color::DarkGray)),
        Span::raw(Self::year_list(&self.telemetry_seasons.query)),
      ]),
      Line::from(vec![
        Span::styled(" <1> ", Style::default().fg(Color::Cyan)),
        Span::styled(links[0].clone(), Style::default().fg(Color::DarkGray)),
        Span::styled("  <2> ", Style::default().fg(Color::Cyan)),
        Span::styled(links[1].clone(), Style::default().fg(Color::DarkGray)),
        Span::styled("  <3> ", Style::default().fg(Color::Cyan)),
        Span::styled(links[2].clone(), Style::default().fg(Color::DarkGray)),
      ]),
    ];
    frame.render_widget(Paragraph::new(intro), rows[0]);

    let halves = |area: Rect| {
      Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area)
    };

    let top = halves(rows[1]);
    Self::render_panel(
      frame,
      top[0],
      format!(" Best averages {} ", self.season),
      &self.best_season.query,
      AVERAGE_COLUMNS,
    );
    Self::render_panel(
      frame,
      top[1],
      " Best averages all time ".to_string(),
      &self.best_all.query,
      AVERAGE_COLUMNS,
    );

    let bottom = halves(rows[2]);
    Self::render_panel(
      frame,
      bottom[0],
      format!(" Top speeds {} ", self.season),
      &self.speeds_season.query,
      SPEED_COLUMNS,
    );
    Self::render_panel(
      frame,
      bottom[1],
      " Top speeds all time ".to_string(),
      &self.speeds_all.query,
      SPEED_COLUMNS,
    );
  }

  fn breadcrumb_label(&self) -> String {
    format!("Dashboard [{}]", DASHBOARD_PATH)
  }

  fn tick(&mut self) {
    self.seasons.query.poll();
    self.telemetry_seasons.query.poll();
    self.best_season.query.poll();
    self.best_all.query.poll();
    self.speeds_season.query.poll();
    self.speeds_all.query.poll();

    let settled = |q: &KeyedQuery<ApiClient>| {
      !matches!(q.query.state(), QueryState::Idle | QueryState::Loading)
    };
    if !self.speeds_started && settled(&self.best_season) && settled(&self.best_all) {
      self.start_secondary_loads();
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("1-3", "open table").with_priority(20),
      ShortcutInfo::new("r", "reload").with_priority(30),
      ShortcutInfo::new("q", "quit").with_priority(40),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::testing::{env_at, FakeApi};
  use serde_json::json;
  use std::time::Duration;

  #[test]
  fn test_links_prefetch_their_option_lists() {
    let links = [
      "/sel/stats?season=2024&league=PGEE".to_string(),
      "/sel/stats?league=PGEE".to_string(),
    ];
    let targets = prefetch_targets(&links);

    assert_eq!(
      targets[0].0,
      vec![
        "/api/sel/stats/seasons?leagues=PGEE",
        "/api/sel/stats/leagues",
        "/api/sel/stats/teams?leagues=PGEE&seasons=2024",
      ]
    );
    assert_eq!(targets[0].1, "/api/sel/stats?league=PGEE&season=2024");
    assert_eq!(targets[1].0[2], "/api/sel/stats/teams?leagues=PGEE");
    assert_eq!(targets[1].1, "/api/sel/stats?league=PGEE");
  }

  #[tokio::test]
  async fn test_reload_bypasses_cached_panel() {
    let api = Arc::new(FakeApi::new());
    let url = "/api/sel/dashboard/best-averages?season=2024";
    api.respond(url, json!([{ "Name": "R1" }]));
    let (env, _clock) = env_at("2024-05-10T12:00:00Z");
    let keyed = KeyedCache::new(api.clone(), env);

    let mut panel = KeyedQuery::new(&keyed, url.to_string());
    panel.query.fetch();
    tokio::time::sleep(Duration::from_millis(20)).await;
    panel.query.poll();

    api.respond(url, json!([{ "Name": "R2" }]));
    panel.query.refetch();
    tokio::time::sleep(Duration::from_millis(20)).await;
    panel.query.poll();
    assert_eq!(api.requests().len(), 1);

    panel.reload();
    tokio::time::sleep(Duration::from_millis(20)).await;
    panel.query.poll();
    assert_eq!(api.requests().len(), 2);
    assert_eq!(panel.query.data(), Some(&json!([{ "Name": "R2" }])));
  }

  #[tokio::test]
  async fn test_year_list_formats_arrays_and_objects() {
    let mut plain: Query<Value> = Query::manual();
    plain.run(async { Ok(json!([2022, 2023])) });
    let mut objects: Query<Value> = Query::manual();
    objects.run(async { Ok(json!([{ "season": 2024 }])) });

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    plain.poll();
    objects.poll();

    assert_eq!(DashboardView::year_list(&plain), "2022, 2023");
    assert_eq!(DashboardView::year_list(&objects), "2024");
    assert_eq!(DashboardView::year_list(&Query::manual()), "-");
  }
}
