use crate::api::ApiClient;
use crate::app::AppContext;
use crate::filters::{FilterController, FilterState, Location};
use crate::table::{self, FilterOptions, RowPage, TableBinding, TableData, TableDef};
use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::truncate;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::RowDetailView;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};
use std::sync::Arc;
use tokio::sync::watch;

/// A statistics table following the shared location
pub struct TableView {
  binding: TableBinding<ApiClient>,
  options: FilterOptions<ApiClient>,
  filters: Arc<FilterController>,
  location: watch::Receiver<Location>,
  state: FilterState,
  data: TableData,
  page: RowPage,
  table_state: TableState,
  search: SearchInput,
}

impl TableView {
  pub fn new(def: &'static TableDef, ctx: &AppContext) -> Self {
    let mut location = ctx.filters.subscribe();
    let current = location.borrow_and_update().clone();
    let state = ctx.filters.state();

    let mut binding = TableBinding::new(def, ctx.api.clone(), ctx.env.clone());
    binding.sync(&current);
    let mut options = FilterOptions::new(def, ctx.keyed.clone());
    options.sync(&state);

    let mut view = Self {
      binding,
      options,
      filters: Arc::clone(&ctx.filters),
      location,
      page: table::apply(def, &[], &state),
      state,
      data: TableData::default(),
      table_state: TableState::default(),
      search: SearchInput::new(),
    };
    view.refresh();
    view
  }

  fn def(&self) -> &'static TableDef {
    self.binding.def()
  }

  /// Recompute the visible page from the latest rows and filters.
  fn refresh(&mut self) {
    self.data = self.binding.data();
    self.page = table::apply(self.def(), &self.data.rows, &self.state);
    ensure_valid_selection(&mut self.table_state, self.page.rows.len());
  }

  fn go_to_page(&mut self, page: usize) {
    if page >= 1 && page <= self.page.page_count && page != self.page.page {
      self.filters.set_page(page);
    }
  }

  fn title(&self) -> String {
    let def = self.def();
    if self.data.is_loading {
      return format!(" {} (loading...) ", def.title);
    }
    if self.data.error.is_some() {
      return format!(" {} (error) ", def.title);
    }
    format!(
      " {} ({}) page {}/{} ",
      def.title, self.page.total, self.page.page, self.page.page_count
    )
  }

  fn filter_summary(&self) -> Line<'static> {
    let s = &self.state;
    let mut parts: Vec<(String, String)> = Vec::new();
    if !s.seasons.is_empty() {
      let seasons: Vec<String> = s.seasons.iter().map(|y| y.to_string()).collect();
      parts.push(("season".to_string(), seasons.join(",")));
    }
    for (label, values) in [("team", &s.teams), ("league", &s.leagues), ("track", &s.tracks)] {
      if !values.is_empty() {
        parts.push((label.to_string(), values.join(",")));
      }
    }
    if let Some((min, max)) = s.heats_range {
      parts.push(("heats".to_string(), format!("{}-{}", min, max)));
    }
    if !s.search.is_empty() {
      parts.push(("search".to_string(), s.search.clone()));
    }
    if let Some(first) = s.sort.first() {
      parts.push((
        "sort".to_string(),
        format!("{} {:?}", first.column_key, first.direction).to_lowercase(),
      ));
    }

    if parts.is_empty() {
      return Line::from(Span::styled(
        " no filters (all seasons)",
        Style::default().fg(Color::DarkGray),
      ));
    }

    let mut spans = Vec::new();
    for (key, value) in parts {
      spans.push(Span::styled(format!(" {}:", key), Style::default().fg(Color::DarkGray)));
      spans.push(Span::styled(value, Style::default().fg(Color::Yellow)));
    }
    Line::from(spans)
  }

  /// Values the API offers for each filter of this page.
  fn available_options(&self, width: usize) -> Line<'static> {
    let mut spans = vec![Span::styled(" available", Style::default().fg(Color::DarkGray))];
    for source in self.def().options {
      let values = self.options.values(source.key);
      let text = if values.is_empty() {
        "-".to_string()
      } else {
        values.join(",")
      };
      spans.push(Span::styled(
        format!(" {}:", source.key),
        Style::default().fg(Color::DarkGray),
      ));
      spans.push(Span::raw(truncate(&text, (width / 4).max(8))));
    }
    Line::from(spans)
  }

  fn render_table(&mut self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if self.page.rows.is_empty() {
      let (content, color) = if self.data.is_loading {
        ("Loading...".to_string(), Color::DarkGray)
      } else if let Some(error) = &self.data.error {
        (
          format!("Failed to load: {}\n\nPress 'r' to retry.", error),
          Color::Red,
        )
      } else {
        ("No rows match the current filters.".to_string(), Color::DarkGray)
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(color));
      frame.render_widget(paragraph, area);
      return;
    }

    let def = self.def();
    let header = Row::new(
      std::iter::once(Cell::from("#"))
        .chain(def.columns.iter().map(|c| Cell::from(c.title))),
    )
    .style(Style::default().fg(Color::Cyan).bold());

    let rows: Vec<Row> = self
      .page
      .rows
      .iter()
      .map(|ranked| {
        let cells = std::iter::once(Cell::from(ranked.rank.to_string())).chain(
          def.columns.iter().map(|c| {
            Cell::from(truncate(
              &table::cell_text(&ranked.row, c.key),
              c.width as usize,
            ))
          }),
        );
        Row::new(cells)
      })
      .collect();

    let widths = std::iter::once(Constraint::Length(4))
      .chain(def.columns.iter().map(|c| Constraint::Length(c.width)));

    let table = Table::new(rows, widths)
      .header(header)
      .block(block)
      .row_highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(table, area, &mut self.table_state);
  }
}

impl View for TableView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key, &self.state.search) {
      KeyResult::Event(SearchEvent::Changed(text)) => {
        if self.filters.set_search(&text) {
          self.filters.set_page(1);
        }
        return ViewAction::None;
      }
      KeyResult::Event(SearchEvent::Submitted) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.table_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.table_state.select_previous(),
      KeyCode::Char('n') | KeyCode::Right | KeyCode::PageDown => {
        self.go_to_page(self.page.page + 1)
      }
      KeyCode::Char('p') | KeyCode::Left | KeyCode::PageUp => {
        self.go_to_page(self.page.page.saturating_sub(1))
      }
      KeyCode::Char('r') => {
        self.binding.reload();
        self.options.reload();
        self.refresh();
      }
      KeyCode::Enter => {
        let selected = self
          .table_state
          .selected()
          .and_then(|idx| self.page.rows.get(idx));
        if let Some(ranked) = selected {
          return ViewAction::Push(Box::new(RowDetailView::new(self.def(), ranked.clone())));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(1),
      ])
      .split(area);

    frame.render_widget(Paragraph::new(self.filter_summary()), chunks[0]);
    frame.render_widget(
      Paragraph::new(self.available_options(area.width as usize)),
      chunks[1],
    );
    self.render_table(frame, chunks[2]);
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    self.def().title.to_string()
  }

  fn is_capturing_input(&self) -> bool {
    self.search.is_active()
  }

  fn tick(&mut self) {
    let mut changed = false;

    if self.location.has_changed().unwrap_or(false) {
      let location = self.location.borrow_and_update().clone();
      // The App swaps this view out when the path changes
      if location.path == self.def().page_path {
        self.state = FilterState::from_query(&location.query);
        self.binding.sync(&location);
        self.options.sync(&self.state);
        changed = true;
      }
    }

    if self.binding.poll() {
      changed = true;
    }
    // Option lists only feed the render
    self.options.poll();

    if changed {
      self.refresh();
    }
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("n/p", "page").with_priority(30),
      ShortcutInfo::new("r", "reload").with_priority(40),
      ShortcutInfo::new("q", "back").with_priority(50),
    ]
  }
}
