mod api;
mod app;
mod cache;
mod commands;
mod config;
mod event;
mod filters;
mod params;
mod query;
mod table;
mod ui;

use cache::{CacheEnv, ExpiryPolicy, KeyValueStore, MemoryStorage, NoopStorage, SqliteStorage};
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "selstats")]
#[command(about = "A terminal dashboard for speedway league statistics")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/selstats/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Statistics site origin, overrides the config file
  #[arg(long)]
  api_url: Option<String>,

  /// Keep cached responses in memory for this session only
  #[arg(long)]
  no_cache: bool,

  /// Remove every cached response and exit
  #[arg(long)]
  clear_cache: bool,

  /// Page to open: dashboard, stats, speed or a path like /sel/stats?season=2024
  #[arg(short, long)]
  page: Option<String>,
}

/// Log to a file: the terminal belongs to the UI.
fn init_logging() -> Result<WorkerGuard> {
  let dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("selstats");
  std::fs::create_dir_all(&dir).map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(
    &dir,
    "selstats.log",
  ));

  let filter = EnvFilter::try_from_env("SELSTATS_LOG")
    .or_else(|_| EnvFilter::try_from_default_env())
    .unwrap_or_else(|_| EnvFilter::new("warn"));

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .with(filter)
    .init();

  Ok(guard)
}

fn open_store(config: &config::Config, no_cache: bool) -> Result<Arc<dyn KeyValueStore>> {
  if no_cache {
    return Ok(Arc::new(MemoryStorage::new()));
  }
  if !config.cache.enabled {
    return Ok(Arc::new(NoopStorage));
  }
  Ok(Arc::new(SqliteStorage::open(config.cache.path.as_deref())?))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging()?;

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(url) = args.api_url {
    config.api.base_url = url;
  }

  let store = open_store(&config, args.no_cache)?;
  let env = CacheEnv::new(store, ExpiryPolicy::at_hour(config.cache.expiry_hour_utc));

  if args.clear_cache {
    let removed = env.clear()?;
    tracing::info!(removed, "cleared cache");
    println!("Removed {} cached responses", removed);
    return Ok(());
  }

  let page = args
    .page
    .or_else(|| config.start_page.clone())
    .unwrap_or_else(|| "dashboard".to_string());
  let start = app::start_location(&page)?;

  let api = api::ApiClient::new(&config.api)?;
  tracing::info!(base_url = api.base_url(), page = %page, "starting");

  // Initialize and run the app
  let ctx = app::AppContext::new(&config, api, env, start);
  let mut app = app::App::new(ctx);
  app.run().await?;

  Ok(())
}
