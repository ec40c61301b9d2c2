mod app;
mod cache;
mod config;
mod event;
mod items;
mod logging;
mod query;
mod ui;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "itemview")]
#[command(about = "A terminal UI for browsing and renaming items behind a REST API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/itemview/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Base URL of the items API, e.g. http://localhost:3000
  #[arg(short, long)]
  url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _log_guard = logging::init()?;

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Override base URL if specified on command line
  if let Some(url) = args.url {
    config.api.base_url = url;
  }

  // Initialize and run the app
  let mut app = app::App::new(config)?;
  app.run().await?;

  Ok(())
}
