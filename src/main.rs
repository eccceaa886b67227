mod commands;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use rentsync::auth::{SqliteStore, TokenManager};
use rentsync::cache::spawn_gc_task;
use rentsync::config::Config;
use rentsync::{logging, QueryClient};

const GC_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "rentsync")]
#[command(about = "Cached client and session sync for the rental service")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/rentsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Also log to stderr
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&Config::data_dir()?.join("logs"), args.verbose)?;
  info!(base_url = %config.api.base_url, "starting");

  // Token storage shared with other rentsync processes
  let store = Arc::new(SqliteStore::open(&config.storage_path()?)?);
  let external_watch = store.spawn_external_watch(config.poll_interval());

  let tokens = TokenManager::new(store.clone());
  let client = QueryClient::from_config(&config, tokens)?;
  let gc = spawn_gc_task(client.cache().clone(), GC_INTERVAL, config.gc_time());

  let result = commands::run(args.command, &client).await;

  gc.abort();
  external_watch.abort();
  result
}
