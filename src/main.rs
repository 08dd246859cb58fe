use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mailcue_engine::{CycleError, CycleOptions, Orchestrator};
use mailcue_render::Renderer;
use mailcue_source::{ConfigStore, FsConfigStore, FsSourceRecords, SourceRecords};
use mailcue_store::{SqliteStore, StateStore};
use mailcue_transport::{GraphMailer, Mailer, NoopMailer};

/// Mailcue - trigger-driven email notifications over external source tables
#[derive(Parser)]
#[command(name = "mailcue")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.mailcue)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run poll cycles
  Run {
    /// Seconds between cycles; runs a single cycle when omitted
    #[arg(long)]
    interval: Option<u64>,

    /// Log sends instead of delivering
    #[arg(long)]
    dry_run: bool,
  },

  /// Inspect or reset trigger state
  State {
    #[command(subcommand)]
    action: StateAction,
  },
}

#[derive(Subcommand)]
enum StateAction {
  /// List all trigger state rows as JSON
  List,

  /// Delete a trigger state row so the pair can fire again
  Reset {
    /// Configuration id
    configuration: String,

    /// Record id
    record: String,
  },
}

fn main() -> Result<()> {
  dotenvy::dotenv().ok();
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let cli = Cli::parse();

  let data_dir = cli.data_dir.unwrap_or_else(|| {
    dirs::home_dir()
      .expect("could not determine home directory")
      .join(".mailcue")
  });

  match cli.command {
    Some(Commands::Run { interval, dry_run }) => {
      run(data_dir, interval, dry_run)?;
    }
    Some(Commands::State { action }) => {
      state(data_dir, action)?;
    }
    None => {
      println!("mailcue - use --help to see available commands");
    }
  }

  Ok(())
}

fn run(data_dir: PathBuf, interval: Option<u64>, dry_run: bool) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_async(data_dir, interval, dry_run).await })
}

async fn run_async(data_dir: PathBuf, interval: Option<u64>, dry_run: bool) -> Result<()> {
  let store = open_store(&data_dir).await?;
  let configs = FsConfigStore::new(data_dir.join("config"));
  let records = FsSourceRecords::new(data_dir.join("sources"));
  let renderer = Renderer::new(data_dir.join("templates"));
  let options = CycleOptions::default();

  let cancel = CancellationToken::new();
  {
    let cancel = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        cancel.cancel();
      }
    });
  }

  if dry_run {
    let orchestrator = Orchestrator::new(configs, records, store, NoopMailer, renderer, options);
    run_cycles(&orchestrator, interval, &cancel).await
  } else {
    let token = std::env::var("MAILCUE_GRAPH_TOKEN")
      .context("MAILCUE_GRAPH_TOKEN is not set (use --dry-run to skip delivery)")?;
    let mailer = GraphMailer::new(token);
    let orchestrator = Orchestrator::new(configs, records, store, mailer, renderer, options);
    run_cycles(&orchestrator, interval, &cancel).await
  }
}

async fn run_cycles<C, R, S, M>(
  orchestrator: &Orchestrator<C, R, S, M>,
  interval: Option<u64>,
  cancel: &CancellationToken,
) -> Result<()>
where
  C: ConfigStore,
  R: SourceRecords,
  S: StateStore,
  M: Mailer,
{
  let Some(seconds) = interval else {
    let report = orchestrator.run_cycle(cancel).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    return Ok(());
  };

  let period = Duration::from_secs(seconds);
  loop {
    match orchestrator.run_cycle(cancel).await {
      Ok(report) => {
        info!(
          sent = report.sent,
          faults = report.audit.len(),
          "cycle finished"
        );
      }
      Err(CycleError::Cancelled) => break,
      Err(e) => error!(error = %e, "cycle failed"),
    }

    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = tokio::time::sleep(period) => {}
    }
  }

  Ok(())
}

fn state(data_dir: PathBuf, action: StateAction) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let store = open_store(&data_dir).await?;

    match action {
      StateAction::List => {
        let rows = store.list().await?;
        println!("{}", serde_json::to_string_pretty(&rows)?);
      }
      StateAction::Reset {
        configuration,
        record,
      } => {
        store
          .reset(&configuration, &record)
          .await
          .with_context(|| format!("no trigger state for ({configuration}, {record})"))?;
        eprintln!("reset ({configuration}, {record})");
      }
    }

    Ok(())
  })
}

async fn open_store(data_dir: &Path) -> Result<SqliteStore> {
  std::fs::create_dir_all(data_dir)
    .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

  let options = SqliteConnectOptions::new()
    .filename(data_dir.join("state.db"))
    .create_if_missing(true);
  let pool = SqlitePoolOptions::new()
    .connect_with(options)
    .await
    .context("failed to open state database")?;

  let store = SqliteStore::new(pool);
  store.migrate().await.context("failed to run migrations")?;
  Ok(store)
}
