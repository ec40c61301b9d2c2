use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::items::ItemId;
use crossterm::event::{KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

/// Events emitted by the rename prompt that the parent needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameEvent {
  /// New name confirmed for the item
  Submitted { id: ItemId, name: String },
  Cancelled,
}

/// Overlay prompt for renaming one item
#[derive(Debug, Clone, Default)]
pub struct RenamePrompt {
  target: Option<ItemId>,
  input: TextInput,
}

impl RenamePrompt {
  pub fn is_active(&self) -> bool {
    self.target.is_some()
  }

  /// Open the prompt for `id`, prefilled with its current name
  pub fn open(&mut self, id: ItemId, current_name: &str) {
    self.target = Some(id);
    self.input = TextInput::with_value(current_name);
  }

  fn close(&mut self) {
    self.target = None;
    self.input = TextInput::default();
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<RenameEvent> {
    let Some(id) = self.target else {
      return KeyResult::NotHandled;
    };

    match self.input.handle_key(key) {
      InputResult::Submitted(name) => {
        let name = name.trim().to_string();
        self.close();
        if name.is_empty() {
          KeyResult::Event(RenameEvent::Cancelled)
        } else {
          KeyResult::Event(RenameEvent::Submitted { id, name })
        }
      }
      InputResult::Cancelled => {
        self.close();
        KeyResult::Event(RenameEvent::Cancelled)
      }
      InputResult::Consumed => KeyResult::Handled,
      // Modal: swallow everything except Ctrl-C
      InputResult::NotHandled if key.modifiers.contains(KeyModifiers::CONTROL) => {
        KeyResult::NotHandled
      }
      InputResult::NotHandled => KeyResult::Handled,
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    let Some(id) = self.target else {
      return;
    };

    let width = (area.width * 60 / 100).clamp(30.min(area.width), 70.min(area.width));
    let height = 3.min(area.height);
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    let overlay_area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(format!(" Rename #{} ", id));

    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);

    if inner.height == 0 {
      return;
    }

    let (before, after) = self.input.split_at_cursor();
    let line = Line::from(vec![
      Span::raw(before),
      Span::styled("_", Style::default().fg(Color::Yellow)), // Cursor
      Span::raw(after),
    ]);
    frame.render_widget(Paragraph::new(line), inner);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyCode;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  #[test]
  fn test_inactive_prompt_ignores_keys() {
    let mut prompt = RenamePrompt::default();
    assert_eq!(
      prompt.handle_key(key(KeyCode::Char('x'))),
      KeyResult::NotHandled
    );
  }

  #[test]
  fn test_submit_new_name() {
    let mut prompt = RenamePrompt::default();
    prompt.open(4, "Old");
    for _ in 0..3 {
      prompt.handle_key(key(KeyCode::Backspace));
    }
    for c in "New".chars() {
      assert_eq!(prompt.handle_key(key(KeyCode::Char(c))), KeyResult::Handled);
    }

    assert_eq!(
      prompt.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(RenameEvent::Submitted {
        id: 4,
        name: "New".to_string()
      })
    );
    assert!(!prompt.is_active());
  }

  #[test]
  fn test_blank_name_cancels() {
    let mut prompt = RenamePrompt::default();
    prompt.open(4, "");
    prompt.handle_key(key(KeyCode::Char(' ')));
    assert_eq!(
      prompt.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(RenameEvent::Cancelled)
    );
  }

  #[test]
  fn test_escape_cancels() {
    let mut prompt = RenamePrompt::default();
    prompt.open(4, "Old");
    assert_eq!(
      prompt.handle_key(key(KeyCode::Esc)),
      KeyResult::Event(RenameEvent::Cancelled)
    );
    assert!(!prompt.is_active());
  }
}
