use crate::cache::{CacheResult, CacheSource};
use crate::items::{
  CachedItemsClient, EntryState, Item, ItemId, ItemPatch, ItemStore, UpdateTicket,
};
use crate::query::{FetchMode, Mutation, Query, QueryState};
use crate::ui::components::{KeyResult, RenameEvent, RenamePrompt};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{state_badge, truncate};
use crate::ui::view::{Shortcut, View, ViewAction};
use chrono::{DateTime, Local, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use tracing::{info, warn};

/// Name written by the quick-update key
const QUICK_UPDATE_NAME: &str = "Updated Name";

type UpdateInput = (UpdateTicket, ItemPatch);

/// The item list: loads once, renders from the store, renames optimistically
pub struct ItemListView {
  store: ItemStore,
  query: Query<CacheResult<Vec<Item>>>,
  updates: Mutation<UpdateInput, Item>,
  list_state: ListState,
  rename: RenamePrompt,
  /// Where the data currently shown came from
  source: Option<CacheSource>,
  cached_at: Option<DateTime<Utc>>,
}

impl ItemListView {
  pub fn new(client: CachedItemsClient, store: ItemStore) -> Self {
    let list_client = client.clone();
    let mut query = Query::new(move |mode| {
      let client = list_client.clone();
      async move {
        let result = match mode {
          FetchMode::PreferCache => client.list_items().await,
          FetchMode::Refresh => client.refresh_items().await,
        };
        result.map_err(|e| e.to_string())
      }
    });

    let updates = Mutation::new(move |(ticket, patch): UpdateInput| {
      let client = client.clone();
      async move {
        client
          .update_item(ticket.id, &patch)
          .await
          .map_err(|e| e.to_string())
      }
    });

    // Start fetching immediately
    query.fetch();

    Self {
      store,
      query,
      updates,
      list_state: ListState::default(),
      rename: RenamePrompt::default(),
      source: None,
      cached_at: None,
    }
  }

  fn items(&self) -> &[Item] {
    self.store.items().unwrap_or(&[])
  }

  fn selected_item(&self) -> Option<&Item> {
    self
      .list_state
      .selected()
      .and_then(|idx| self.items().get(idx))
  }

  /// Patch the store now, send the request in the background
  fn submit_update(&mut self, id: ItemId, patch: ItemPatch) {
    if patch.is_empty() {
      return;
    }
    if let Some(ticket) = self.store.begin_update(id, patch.clone()) {
      info!(id, "Submitting item update");
      self.updates.mutate((ticket, patch));
    }
  }

  fn apply_settled_updates(&mut self) {
    for settled in self.updates.poll() {
      let (ticket, _) = settled.input;
      match settled.result {
        Ok(item) => self.store.confirm(ticket, item),
        Err(error) => self.store.fail(ticket, error),
      }
    }
  }

  fn title(&self) -> String {
    let count = self.items().len();
    let pending = self.updates.in_flight();
    let mut title = match self.query.state() {
      QueryState::Loading if self.store.is_loaded() => format!(" Items ({}) refreshing... ", count),
      QueryState::Loading | QueryState::Idle => " Items (loading...) ".to_string(),
      QueryState::Error(e) if !self.store.is_loaded() => format!(" Items (error: {}) ", e),
      _ => format!(" Items ({}) ", count),
    };
    if let (Some(CacheSource::Offline), Some(at)) = (self.source, self.cached_at) {
      title.push_str(&format!(
        "[offline, cached {}] ",
        at.with_timezone(&Local).format("%H:%M")
      ));
    }
    if pending > 0 {
      title.push_str(&format!("[{} saving] ", pending));
    }
    title
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.items().len();
    ensure_valid_selection(&mut self.list_state, len);

    let block = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if self.items().is_empty() {
      let content = if !self.store.is_loaded() && self.query.is_error() {
        "Failed to load items. Press 'r' to retry."
      } else if !self.store.is_loaded() {
        "Loading..."
      } else {
        "No items."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let name_width = (area.width as usize).saturating_sub(24).max(10);
    let rows: Vec<ListItem> = self
      .items()
      .iter()
      .map(|item| {
        let mut spans = vec![
          Span::styled(
            format!("{:>6}", format!("#{}", item.id)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw("  "),
          Span::raw(truncate(&item.name, name_width)),
        ];
        if let Some((label, color)) = state_badge(&self.store.state(item.id)) {
          spans.push(Span::raw("  "));
          spans.push(Span::styled(
            format!("[{}]", label),
            Style::default().fg(color),
          ));
        }
        ListItem::new(Line::from(spans))
      })
      .collect();

    let list = List::new(rows)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for ItemListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    // The rename prompt is modal while open
    match self.rename.handle_key(key) {
      KeyResult::Handled | KeyResult::Event(RenameEvent::Cancelled) => return ViewAction::None,
      KeyResult::Event(RenameEvent::Submitted { id, name }) => {
        self.submit_update(id, ItemPatch::rename(name));
        return ViewAction::None;
      }
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        return ViewAction::Quit
      }
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('g') | KeyCode::Home => self.list_state.select_first(),
      KeyCode::Char('G') | KeyCode::End => self.list_state.select_last(),
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('e') | KeyCode::Enter => {
        if let Some(item) = self.selected_item() {
          let (id, name) = (item.id, item.name.clone());
          self.rename.open(id, &name);
        }
      }
      KeyCode::Char('u') => {
        if let Some(id) = self.selected_item().map(|item| item.id) {
          self.submit_update(id, ItemPatch::rename(QUICK_UPDATE_NAME));
        }
      }
      KeyCode::Char('x') => self.store.clear_error(),
      KeyCode::Char('q') | KeyCode::Esc => {
        let pending = self.store.pending_count();
        if pending > 0 {
          warn!(pending, "Quitting with updates still in flight");
        }
        return ViewAction::Quit;
      }
      _ => {}
    }

    let len = self.items().len();
    ensure_valid_selection(&mut self.list_state, len);
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.rename.render_overlay(frame, area);
  }

  fn tick(&mut self) {
    if self.query.poll() {
      if let Some(result) = self.query.data() {
        info!(count = result.data.len(), source = ?result.source, "Item list loaded");
        self.source = Some(result.source);
        self.cached_at = result.cached_at;
        self.store.seed(result.data.clone());
      }
      let len = self.items().len();
      ensure_valid_selection(&mut self.list_state, len);
    }
    self.apply_settled_updates();
  }

  fn status(&self) -> Option<String> {
    if let Some(error) = self.store.last_error() {
      return Some(format!("{}  (x to dismiss)", error));
    }
    if let (Some(error), true) = (self.query.error(), self.store.is_loaded()) {
      // A failed refresh keeps showing the old list
      return Some(format!("Refresh failed: {}", error));
    }
    let item = self.selected_item()?;
    match self.store.state(item.id) {
      EntryState::Reverted(error) => Some(format!("#{} reverted: {}", item.id, error)),
      EntryState::Stale(error) => Some(format!("#{} not saved: {}", item.id, error)),
      _ => None,
    }
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    if self.rename.is_active() {
      return vec![Shortcut::new("Enter", "save"), Shortcut::new("Esc", "cancel")];
    }
    let mut shortcuts = vec![
      Shortcut::new("j/k", "nav"),
      Shortcut::new("e", "rename"),
      Shortcut::new("u", "quick update"),
    ];
    if !self.query.is_loading() {
      shortcuts.push(Shortcut::new("r", "refresh"));
    }
    if self.store.last_error().is_some() {
      shortcuts.push(Shortcut::new("x", "dismiss"));
    }
    shortcuts.push(Shortcut::new("q", "quit"));
    shortcuts
  }
}
