use crate::items::EntryState;
use ratatui::prelude::Color;

/// Truncate a string to at most `max_len` characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Short marker and color for an entry's optimistic state, `None` when clean
pub fn state_badge(state: &EntryState) -> Option<(&'static str, Color)> {
  match state {
    EntryState::Clean => None,
    EntryState::Pending => Some(("saving", Color::Yellow)),
    EntryState::Confirmed => Some(("saved", Color::Green)),
    EntryState::Reverted(_) => Some(("reverted", Color::Red)),
    EntryState::Stale(_) => Some(("unsaved", Color::Magenta)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("ééééééé", 5), "éé...");
  }

  #[test]
  fn test_state_badge() {
    assert_eq!(state_badge(&EntryState::Clean), None);
    assert_eq!(
      state_badge(&EntryState::Pending),
      Some(("saving", Color::Yellow))
    );
    assert_eq!(
      state_badge(&EntryState::Reverted("boom".into())),
      Some(("reverted", Color::Red))
    );
    assert_eq!(
      state_badge(&EntryState::Stale("boom".into())),
      Some(("unsaved", Color::Magenta))
    );
  }
}
