mod config;
mod fetch;
mod http;
mod store;
mod takt;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use fetch::HttpFetcher;
use http::Request;
use store::{CacheStore, SqliteStore};
use takt::{InputStore, TaktInput};
use worker::{OfflineWorker, WorkerHost};

#[derive(Parser, Debug)]
#[command(name = "taktcache")]
#[command(about = "Offline asset cache for the Takt Time calculator")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/taktcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install the configured cache generation and prune stale ones
  Update,
  /// Fetch a path through the cache (network first, cache fallback)
  Fetch {
    /// Root-relative path, e.g. /icon-192.png
    path: String,
  },
  /// Show cached generations and their entries
  Status,
  /// Compute takt time from shift parameters
  Calc {
    /// Shift length in hours
    #[arg(long)]
    working_hours: Option<f64>,
    /// Break time in minutes
    #[arg(long)]
    break_minutes: Option<f64>,
    /// Units to produce during the shift
    #[arg(long)]
    target_quantity: Option<f64>,
  },
}

fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(std::io::stderr))
    .with(filter)
    .init();
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  init_tracing();

  let args = Args::parse();

  match args.command {
    Command::Update => {
      let config = Config::load(args.config.as_deref())?;
      run_update(&config).await
    }
    Command::Fetch { path } => {
      let config = Config::load(args.config.as_deref())?;
      run_fetch(&config, &path).await
    }
    Command::Status => {
      let config = Config::load(args.config.as_deref())?;
      run_status(&config)
    }
    Command::Calc {
      working_hours,
      break_minutes,
      target_quantity,
    } => run_calc(working_hours, break_minutes, target_quantity),
  }
}

fn open_store(config: &Config) -> Result<SqliteStore> {
  match &config.database {
    Some(path) => SqliteStore::open_at(path),
    None => SqliteStore::open(),
  }
}

fn build_worker(
  config: &Config,
  store: Arc<SqliteStore>,
) -> Result<OfflineWorker<SqliteStore, HttpFetcher>> {
  let fetcher = Arc::new(HttpFetcher::new(&config.origin)?);
  Ok(OfflineWorker::new(
    store,
    fetcher,
    config.cache.name.clone(),
    config.cache.manifest.clone(),
  ))
}

async fn run_update(config: &Config) -> Result<()> {
  let store = Arc::new(open_store(config)?);
  let worker = build_worker(config, Arc::clone(&store))?;

  let mut host = WorkerHost::new(worker);
  host.register().await?;

  let entries = store.entries(&config.cache.name)?;
  println!(
    "{} now holds {} pre-cached assets",
    config.cache.name,
    entries.len()
  );
  Ok(())
}

async fn run_fetch(config: &Config, path: &str) -> Result<()> {
  let store = Arc::new(open_store(config)?);
  let installed = store.list_buckets()?.contains(&config.cache.name);
  let worker = build_worker(config, Arc::clone(&store))?;

  let mut host = WorkerHost::new(worker);
  if installed {
    // Durable state survives restarts; no need to replay install
    host.adopt();
  } else {
    host.register().await?;
  }
  debug!(state = ?host.state(), "Worker ready");

  let response = host.fetch(&Request::get(path)).await?;
  info!(
    status = response.status,
    status_text = %response.status_text,
    content_type = response.header("content-type").unwrap_or("-"),
    "Response for {}", path
  );
  std::io::stdout().write_all(&response.body)?;

  // The cache refresh after a 200 is a detached task; unlike a long-lived
  // page, this process exits right away, so give the write a moment to land.
  tokio::time::sleep(std::time::Duration::from_millis(20)).await;
  Ok(())
}

fn run_status(config: &Config) -> Result<()> {
  let store = open_store(config)?;
  let buckets = store.list_buckets()?;

  if buckets.is_empty() {
    println!("No cache generations installed");
    return Ok(());
  }

  for bucket in buckets {
    let marker = if bucket == config.cache.name {
      "current"
    } else {
      "stale"
    };
    println!("{} ({})", bucket, marker);
    for entry in store.entries(&bucket)? {
      println!(
        "  {}  {}  cached {}",
        entry.path,
        entry.status,
        entry.cached_at.format("%Y-%m-%d %H:%M:%S")
      );
    }
  }
  Ok(())
}

fn run_calc(
  working_hours: Option<f64>,
  break_minutes: Option<f64>,
  target_quantity: Option<f64>,
) -> Result<()> {
  let inputs = InputStore::new()?;
  let saved = inputs.load().unwrap_or_else(|e| {
    debug!(error = %e, "Failed to load saved inputs");
    None
  });

  // Each omitted flag falls back to the last-used value, then the defaults
  let base = saved.unwrap_or_default();
  let input = TaktInput {
    working_hours: working_hours.unwrap_or(base.working_hours),
    break_minutes: break_minutes.unwrap_or(base.break_minutes),
    target_quantity: target_quantity.unwrap_or(base.target_quantity),
  };

  let result = input.compute();
  println!("Available time: {:.0} min", input.available_minutes());
  println!("Takt time:      {:.1} s/unit", result.takt_time_secs);
  println!("Hourly target:  {:.1} units/h", result.hourly_target);

  if let Err(e) = inputs.save(&input) {
    debug!(error = %e, "Failed to save inputs");
  }
  Ok(())
}
