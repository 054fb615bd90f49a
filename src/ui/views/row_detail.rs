use crate::table::{cell_text, RankedRow, TableDef};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// Every field of one table row
pub struct RowDetailView {
  def: &'static TableDef,
  row: RankedRow,
  scroll: u16,
}

impl RowDetailView {
  pub fn new(def: &'static TableDef, row: RankedRow) -> Self {
    Self { def, row, scroll: 0 }
  }

  fn label(&self) -> String {
    let name: Vec<String> = self
      .def
      .search_fields
      .iter()
      .map(|f| cell_text(&self.row.row, f))
      .filter(|s| !s.is_empty())
      .collect();
    if name.is_empty() {
      format!("#{}", self.row.rank)
    } else {
      name.join(" ")
    }
  }

  /// Table columns first, then any extra fields the API sent.
  fn lines(&self) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(vec![
      Span::styled(format!("{:<16}", "Rank"), Style::default().fg(Color::DarkGray)),
      Span::raw(self.row.rank.to_string()),
    ])];

    for column in self.def.columns {
      lines.push(Line::from(vec![
        Span::styled(
          format!("{:<16}", column.title),
          Style::default().fg(Color::DarkGray),
        ),
        Span::raw(cell_text(&self.row.row, column.key)),
      ]));
    }

    if let Some(fields) = self.row.row.as_object() {
      let extra: Vec<&String> = fields
        .keys()
        .filter(|k| self.def.columns.iter().all(|c| c.key != k.as_str()))
        .collect();
      if !extra.is_empty() {
        lines.push(Line::from(""));
        for key in extra {
          lines.push(Line::from(vec![
            Span::styled(format!("{:<16}", key), Style::default().fg(Color::DarkGray)),
            Span::raw(cell_text(&self.row.row, key)),
          ]));
        }
      }
    }

    lines
  }
}

impl View for RowDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
      KeyCode::Char('k') | KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let block = Block::default()
      .title(format!(" {} ", self.label()))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let paragraph = Paragraph::new(self.lines())
      .block(block)
      .wrap(Wrap { trim: true })
      .scroll((self.scroll, 0));
    frame.render_widget(paragraph, area);
  }

  fn breadcrumb_label(&self) -> String {
    self.label()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new("j/k", "scroll").with_priority(10),
      ShortcutInfo::new("q", "back").with_priority(20),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::table::{SPEED, STATS};
  use serde_json::json;

  #[test]
  fn test_label_joins_name_fields() {
    let row = RankedRow {
      rank: 3,
      row: json!({ "rider_name": "Bartosz", "rider_surname": "Zmarzlik" }),
    };
    assert_eq!(RowDetailView::new(&SPEED, row).label(), "Bartosz Zmarzlik");

    let unnamed = RankedRow {
      rank: 7,
      row: json!({ "Team": "Lublin" }),
    };
    assert_eq!(RowDetailView::new(&STATS, unnamed).label(), "#7");
  }

  #[test]
  fn test_extra_fields_are_listed() {
    let row = RankedRow {
      rank: 1,
      row: json!({ "Name": "R1", "Warn": 2 }),
    };
    let view = RowDetailView::new(&STATS, row);
    // Rank + every column + blank separator + one extra field
    assert_eq!(view.lines().len(), 1 + STATS.columns.len() + 2);
  }
}
