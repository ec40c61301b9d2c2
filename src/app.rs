use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::items::{CachedItemsClient, ItemStore};
use crate::ui;
use crate::ui::renderfns::header::display_host;
use crate::ui::view::{View, ViewAction};
use crate::ui::views::ItemListView;
use color_eyre::Result;
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tracing::info;

/// Main application state
pub struct App {
  /// The item list; the only view there is
  view: Box<dyn View>,

  /// Header title
  title: String,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let client = CachedItemsClient::new(&config)?;
    let title = config
      .title
      .clone()
      .unwrap_or_else(|| display_host(client.base_url()));

    // Lives exactly as long as the session
    let store = ItemStore::new(config.on_update_failure);
    info!(base_url = %client.base_url(), policy = ?config.on_update_failure, "Starting session");

    Ok(Self {
      view: Box::new(ItemListView::new(client, store)),
      title,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;

    let result = self.event_loop().await;

    // Restore the terminal even if the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    info!("Session ended");
    result
  }

  async fn event_loop(&mut self) -> Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    let mut events = EventHandler::new(Duration::from_millis(250));

    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }

    Ok(())
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => {
        if self.view.handle_key(key) == ViewAction::Quit {
          self.should_quit = true;
        }
        // Pick up anything that settled while we waited for the key
        self.view.tick();
      }
      Event::Tick => self.view.tick(),
      Event::Resize => {} // Redrawn on the next loop iteration
    }
  }

  // Accessors for UI rendering
  pub fn view(&self) -> &dyn View {
    self.view.as_ref()
  }

  pub fn view_mut(&mut self) -> &mut dyn View {
    self.view.as_mut()
  }

  pub fn title(&self) -> &str {
    &self.title
  }
}
