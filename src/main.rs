mod demo;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crutch::cache::CacheableUniqueCacheKey;
use crutch::config::{Config, LoggingConfig};
use demo::Strategy;

#[derive(Parser, Debug)]
#[command(name = "crutch")]
#[command(about = "Exercise the crutch pager and cache-or-fetch strategies")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/crutch/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Page through a synthetic list until no pages are left
  Pages {
    /// Number of items in the list
    #[arg(long)]
    total: u32,

    /// Items per page (overrides the config file)
    #[arg(long)]
    page_size: Option<u32>,

    /// Fail the first request for this page
    #[arg(long)]
    fail_page: Option<u32>,
  },

  /// Read a timestamped value through one cache strategy
  Cache {
    #[arg(long)]
    key: String,

    #[arg(long)]
    sub_key: Option<String>,

    #[arg(long, value_enum, default_value = "cached-or-new")]
    strategy: Strategy,

    /// Do not store freshly fetched values
    #[arg(long)]
    no_store: bool,
  },
}

fn init_tracing(config: &LoggingConfig) -> Result<WorkerGuard> {
  let (writer, guard) = match &config.directory {
    Some(directory) => {
      tracing_appender::non_blocking(tracing_appender::rolling::daily(directory, "crutch.log"))
    }
    None => tracing_appender::non_blocking(std::io::stderr()),
  };

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_env("CRUTCH_LOG").unwrap_or_else(|_| EnvFilter::new("crutch=debug")))
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(config.directory.is_none()),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;

  // Flushes buffered log lines on drop
  let _guard = init_tracing(&config.logging)?;

  match args.command {
    Command::Pages {
      total,
      page_size,
      fail_page,
    } => demo::run_pages(&config, total, page_size, fail_page).await,
    Command::Cache {
      key,
      sub_key,
      strategy,
      no_store,
    } => {
      let key = match sub_key {
        Some(sub_key) => CacheableUniqueCacheKey::with_sub_key(key, sub_key),
        None => CacheableUniqueCacheKey::new(key),
      };
      demo::run_cache(&config, key, strategy, !no_store).await
    }
  }
}
