use crate::api::ApiClient;
use crate::cache::{CacheEnv, KeyedCache, Prefetcher};
use crate::commands::{self, Action};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::filters::{keys, FilterController, Location, SortColumn};
use crate::table::{self, TableDef};
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{DashboardView, TableView};
use color_eyre::{eyre::eyre, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Location path of the dashboard.
pub const DASHBOARD_PATH: &str = "/sel";

/// Endpoints the dashboard reads through the keyed cache.
pub fn dashboard_endpoints(season: i32) -> Vec<String> {
  vec![
    "/api/sel/seasons".to_string(),
    "/api/sel/dashboard/max-speeds/telem-seasons".to_string(),
    format!("/api/sel/dashboard/best-averages?season={}", season),
    "/api/sel/dashboard/best-averages?season=all".to_string(),
  ]
}

/// Resolve a start page: a page id ("dashboard", "stats", "speed") or a
/// location such as `/sel/stats?season=2024`.
pub fn start_location(page: &str) -> Result<Location> {
  if page.starts_with('/') {
    let location = Location::parse(page);
    if location.path == DASHBOARD_PATH || table::find_by_path(&location.path).is_some() {
      return Ok(location);
    }
    return Err(eyre!("Unknown page path: {}", location.path));
  }

  match page {
    "dashboard" => Ok(Location::parse(DASHBOARD_PATH)),
    id => table::find(id)
      .map(|def| Location::parse(def.page_path))
      .ok_or_else(|| eyre!("Unknown page: {} (expected dashboard, stats or speed)", id)),
  }
}

/// Services shared by every view.
#[derive(Clone)]
pub struct AppContext {
  pub api: Arc<ApiClient>,
  pub env: CacheEnv,
  pub keyed: KeyedCache<ApiClient>,
  pub prefetcher: Prefetcher<ApiClient>,
  pub filters: Arc<FilterController>,
  pub current_season: i32,
}

impl AppContext {
  pub fn new(config: &Config, api: ApiClient, env: CacheEnv, start: Location) -> Self {
    let api = Arc::new(api);
    let keyed = KeyedCache::new(api.clone(), env.clone());
    Self {
      prefetcher: Prefetcher::new(keyed.clone()),
      keyed,
      api,
      env,
      filters: Arc::new(FilterController::new(start)),
      current_season: config.current_season(),
    }
  }
}

/// Main application state
pub struct App {
  ctx: AppContext,

  /// Navigation stack - the root view follows the location path
  view_stack: Vec<Box<dyn View>>,

  /// Path the root view was built for
  root_path: String,

  location: watch::Receiver<Location>,

  command: CommandInput,

  /// Last command error or notice, shown in the footer
  status: Option<String>,

  should_quit: bool,
}

impl App {
  pub fn new(ctx: AppContext) -> Self {
    let mut location = ctx.filters.subscribe();
    let path = location.borrow_and_update().path.clone();
    let root = root_view(&ctx, &path);

    if path != DASHBOARD_PATH {
      // Warm the dashboard so switching to it is instant
      let prefetcher = ctx.prefetcher.clone();
      let endpoints = dashboard_endpoints(ctx.current_season);
      tokio::spawn(async move { prefetcher.prefetch_endpoints(&endpoints).await });
    }

    Self {
      ctx,
      view_stack: vec![root],
      root_path: path,
      location,
      command: CommandInput::new(),
      status: None,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(Duration::from_millis(250));

    let result = self.event_loop(&mut terminal, &mut events).await;

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop<B: Backend>(
    &mut self,
    terminal: &mut Terminal<B>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Tick) => self.tick(),
        Some(Event::Resize) => {}
        None => break,
      }
    }
    Ok(())
  }

  fn tick(&mut self) {
    if self.location.has_changed().unwrap_or(false) {
      let path = self.location.borrow_and_update().path.clone();
      if path != self.root_path {
        tracing::debug!(from = %self.root_path, to = %path, "switching page");
        self.view_stack = vec![root_view(&self.ctx, &path)];
        self.root_path = path;
      }
    }

    for view in &mut self.view_stack {
      view.tick();
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    let capturing = self
      .view_stack
      .last()
      .map(|v| v.is_capturing_input())
      .unwrap_or(false);

    if self.command.is_active() || !capturing {
      match self.command.handle_key(key) {
        KeyResult::Event(CommandEvent::Submitted(line)) => {
          self.execute(&line);
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => {
          self.status = None;
          return;
        }
        KeyResult::NotHandled => {}
      }
    }

    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };

    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  fn execute(&mut self, line: &str) {
    tracing::debug!(command = line, "execute");
    match commands::parse(line) {
      Ok(action) => {
        if let Err(msg) = self.apply(action) {
          self.status = Some(msg);
        }
      }
      Err(msg) => self.status = Some(msg),
    }
  }

  fn apply(&mut self, action: Action) -> Result<(), String> {
    let filters = Arc::clone(&self.ctx.filters);
    let changed = match action {
      Action::Open(id) => {
        filters.navigate(self.location_for(id));
        true
      }
      Action::Seasons(seasons) => filters.set_seasons(&seasons),
      Action::Teams(teams) => filters.set_teams(&teams),
      Action::Leagues(leagues) => filters.set_leagues(&leagues),
      Action::Tracks(tracks) => filters.set_tracks(&tracks),
      Action::Heats(range) => filters.set_heats(range),
      Action::Sort(None) => filters.set_sort(&[]),
      Action::Sort(Some((name, direction))) => {
        let column = self
          .current_table()
          .ok_or_else(|| "Sorting applies to table pages".to_string())?
          .column(&name)
          .ok_or_else(|| format!("Unknown column: {}", name))?;
        filters.set_sort(&[SortColumn {
          column_key: column.key.to_string(),
          direction,
        }])
      }
      Action::PageSize(size) => filters.set_page_size(size),
      Action::Clear => filters.clear_filters(),
      Action::Quit => {
        self.should_quit = true;
        false
      }
    };

    // A changed filter invalidates the current page number
    if changed {
      filters.set_page(1);
    }
    self.status = None;
    Ok(())
  }

  /// Location for a page id, keeping filters when moving between tables.
  fn location_for(&self, id: &str) -> Location {
    match table::find(id) {
      Some(def) => Location {
        path: def.page_path.to_string(),
        query: self.ctx.filters.location().query.without(&[keys::PAGE]),
      },
      None => Location::parse(DASHBOARD_PATH),
    }
  }

  fn current_table(&self) -> Option<&'static TableDef> {
    table::find_by_path(&self.root_path)
  }

  // Accessors for UI rendering

  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.view_stack.last_mut()
  }

  pub fn command_input(&self) -> &CommandInput {
    &self.command
  }

  pub fn base_url(&self) -> &str {
    self.ctx.api.base_url()
  }

  pub fn href(&self) -> String {
    self.ctx.filters.location().href()
  }

  pub fn status(&self) -> Option<&str> {
    self.status.as_deref()
  }

  pub fn view_breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|v| v.breadcrumb_label())
      .collect()
  }

  pub fn shortcuts(&self) -> Vec<ui::view::ShortcutInfo> {
    self
      .view_stack
      .last()
      .map(|v| v.shortcuts())
      .unwrap_or_default()
  }
}

fn root_view(ctx: &AppContext, path: &str) -> Box<dyn View> {
  match table::find_by_path(path) {
    Some(def) => Box::new(TableView::new(def, ctx)),
    None => Box::new(DashboardView::new(ctx)),
  }
}
