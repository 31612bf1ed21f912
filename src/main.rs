mod app;
mod cache;
mod config;
mod db;
mod fetch;
mod http;
mod intercept;
mod manga;
mod progress;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "mangashelf")]
#[command(about = "Manga reader client with an offline cache and reading history")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/mangashelf/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Reinstall the offline worker and refresh the static assets
  Install,
  /// List cache generations and their entry counts
  Generations,
  /// Drop the image cache
  ClearCache,
  /// Post a JSON message to the offline worker and print its reply
  PostMessage {
    /// e.g. {"type":"CLEAR_CACHE"}
    message: String,
  },
  /// Fetch a URL through the offline worker
  Fetch {
    url: String,
    /// Treat the request as an image
    #[arg(long)]
    image: bool,
    /// Write the body to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// List manga
  List {
    #[arg(long, default_value_t = 50)]
    limit: u32,
    #[arg(long, default_value_t = 0)]
    skip: u32,
  },
  /// Search manga by title
  Search { query: String },
  /// Most recently added manga
  Featured {
    #[arg(long, default_value_t = 6)]
    limit: u32,
  },
  /// Show one manga
  Manga { id: String },
  /// List the chapters of a manga
  Chapters { manga_id: String },
  /// Open a chapter at a page and record it in the reading history
  Read {
    chapter_id: String,
    /// Zero-based page index
    #[arg(short, long, default_value_t = 0)]
    page: u32,
  },
  /// Save every page of a chapter as page_001.jpg, page_002.jpg, ...
  Download {
    chapter_id: String,
    /// Target directory (default: ./manga_chapter_<CHAPTER_ID>)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Show or edit the reading history
  History {
    #[command(subcommand)]
    action: Option<HistoryAction>,
  },
  /// Show or clear where to resume a manga
  Progress {
    manga_id: String,
    #[arg(long)]
    clear: bool,
  },
}

#[derive(Subcommand, Debug)]
pub enum HistoryAction {
  /// Remove one manga from the history
  Remove { manga_id: String },
  /// Remove everything from the history
  Clear,
}

/// Initialize the tracing subscriber for logging
///
/// Logs go to stderr and to a daily file under the data directory. Use the
/// RUST_LOG env var to control the level (e.g., RUST_LOG=debug).
fn init_tracing(log_dir: &Path) -> WorkerGuard {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  let file_appender = tracing_appender::rolling::daily(log_dir, "mangashelf.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(io::stderr))
    .with(fmt::layer().with_ansi(false).with_writer(file_writer))
    .with(filter)
    .init();

  guard
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let data_dir = config.data_dir()?;
  let log_dir = data_dir.join("logs");
  std::fs::create_dir_all(&log_dir)?;
  let _log_guard = init_tracing(&log_dir);
  info!(data_dir = %data_dir.display(), "mangashelf starting");

  let force_install = matches!(args.command, Command::Install);
  let app = app::App::new(config, force_install).await?;
  let result = app.run(args.command).await;

  // Let background cache writes land before exiting
  app.shutdown().await;
  result
}
