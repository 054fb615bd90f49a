use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::commands::{self, Command};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

const MAX_SUGGESTIONS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
  Submitted(String),
  Cancelled,
}

/// `:` prompt with command name completion.
#[derive(Debug, Clone, Default)]
pub struct CommandInput {
  input: TextInput,
  active: bool,
  /// Highlighted suggestion, reset whenever the text changes
  selected: usize,
}

impl CommandInput {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  pub fn activate(&mut self) {
    self.active = true;
    self.input.clear();
    self.selected = 0;
  }

  pub fn suggestions(&self) -> Vec<&'static Command> {
    commands::get_suggestions(self.input.value())
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<CommandEvent> {
    if !self.active {
      if key.code == KeyCode::Char(':') {
        self.activate();
        return KeyResult::Handled;
      }
      return KeyResult::NotHandled;
    }

    let step = match key.code {
      KeyCode::Tab | KeyCode::Down => Some(1),
      KeyCode::BackTab | KeyCode::Up => Some(-1),
      _ => None,
    };
    if let Some(step) = step {
      let count = self.suggestions().len().min(MAX_SUGGESTIONS) as isize;
      if count > 0 {
        self.selected = (self.selected as isize + step).rem_euclid(count) as usize;
      }
      return KeyResult::Handled;
    }

    match self.input.handle_key(key) {
      InputResult::Submitted(_) => {
        let line = self.resolve();
        self.active = false;
        KeyResult::Event(CommandEvent::Submitted(line))
      }
      InputResult::Cancelled => {
        self.active = false;
        KeyResult::Event(CommandEvent::Cancelled)
      }
      InputResult::Consumed => {
        self.selected = 0;
        KeyResult::Handled
      }
      InputResult::NotHandled => KeyResult::Handled,
    }
  }

  /// A bare word becomes the highlighted command name. Input with
  /// arguments is submitted as typed.
  fn resolve(&self) -> String {
    let typed = self.input.value().trim();
    match self.suggestions().get(self.selected) {
      Some(cmd) if !typed.contains(char::is_whitespace) => cmd.name.to_string(),
      _ => typed.to_string(),
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active {
      return;
    }

    let suggestions = self.suggestions();
    let shown = suggestions.len().min(MAX_SUGGESTIONS);
    let width = (area.width * 60 / 100).clamp(30, 60).min(area.width);
    let height = (3 + shown as u16).min(area.height);
    let overlay_area = Rect::new(area.x + 1, area.y + 1, width, height);

    frame.render_widget(Clear, overlay_area);

    let mut lines = vec![Line::from(vec![
      Span::styled(":", Style::default().fg(Color::Yellow)),
      Span::raw(self.input.value().to_string()),
      Span::styled("_", Style::default().fg(Color::Yellow)),
    ])];
    for (idx, cmd) in suggestions.iter().take(MAX_SUGGESTIONS).enumerate() {
      let style = if idx == self.selected {
        Style::default().bg(Color::DarkGray).fg(Color::White)
      } else {
        Style::default()
      };
      lines.push(
        Line::from(vec![
          Span::styled(format!("{:<11}", cmd.name), Style::default().fg(Color::Cyan)),
          Span::styled(cmd.description, Style::default().fg(Color::DarkGray)),
        ])
        .style(style),
      );
    }

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(" Command ");
    frame.render_widget(Paragraph::new(lines).block(block), overlay_area);
  }
}
