//! Dumpwatch - real-time tailing and classification of crash/stack-dump logs.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dumpwatch::classify::fold_text;
use dumpwatch::config::{ConfigLoader, MonitorConfig};
use dumpwatch::display;
use dumpwatch::history::{spawn_recorder, SnapshotHistory, DEFAULT_HISTORY_CAPACITY};
use dumpwatch::monitor::{AggregateSnapshot, TailingAggregator};
use dumpwatch::tail::read_full;

#[derive(Parser)]
#[command(
    name = "dumpwatch",
    about = "Tail a game log and count stack dumps, warnings and errors",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor a log file and print a snapshot whenever the totals change.
    Watch {
        /// Log file to monitor (overrides the config file).
        path: Option<PathBuf>,
        /// Explicit config file instead of the default search paths.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Poll interval in milliseconds.
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Poll on a timer instead of using filesystem notifications.
        #[arg(long)]
        poll: bool,
        /// Print snapshots as JSON lines.
        #[arg(long)]
        json: bool,
        /// Number of snapshots kept in the session history.
        #[arg(long, default_value_t = DEFAULT_HISTORY_CAPACITY)]
        history: usize,
    },
    /// Classify a whole log file once and print the totals.
    Scan {
        /// Log file to classify.
        path: PathBuf,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(
    config_path: Option<PathBuf>,
    path: Option<PathBuf>,
    interval_ms: Option<u64>,
    poll: bool,
) -> Result<MonitorConfig, String> {
    let loader = config_path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    match loader.find_config_file() {
        Some(file) => tracing::info!(path = %file.display(), "Using config file"),
        None => tracing::info!(
            searched = ?loader.search_paths(),
            "No config file found, using defaults"
        ),
    }
    let mut config = loader.load().map_err(|e| e.to_string())?;

    if let Some(path) = path {
        config.file_path = path;
    }
    if let Some(interval_ms) = interval_ms {
        config.poll_interval_ms = interval_ms;
    }
    if poll {
        config.use_notification_watcher = false;
    }
    Ok(config)
}

fn print(snapshot: &AggregateSnapshot, json: bool) {
    if json {
        display::print_snapshot_json(snapshot);
    } else {
        display::print_snapshot(snapshot);
    }
}

async fn run_watch(config: MonitorConfig, json: bool, history_capacity: usize) -> ExitCode {
    let aggregator = TailingAggregator::new();
    let mut snapshots = aggregator.snapshot_stream();
    let mut errors = aggregator.error_stream();
    let mut states = aggregator.subscribe_state();

    let history = Arc::new(Mutex::new(SnapshotHistory::with_capacity(history_capacity)));
    let recorder_cancel = CancellationToken::new();
    let recorder = spawn_recorder(
        Arc::clone(&history),
        aggregator.subscribe_snapshots(),
        recorder_cancel.clone(),
    );

    if let Err(e) = aggregator.start(config).await {
        display::print_error(&e.to_string());
        recorder_cancel.cancel();
        return ExitCode::FAILURE;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping");
                break;
            }
            Some(snapshot) = snapshots.next() => match snapshot {
                Ok(snapshot) => print(&snapshot, json),
                Err(e) => tracing::warn!(error = %e, "Snapshot display lagged"),
            },
            Some(message) = errors.next() => {
                if let Ok(message) = message {
                    display::print_error(&message);
                }
            }
            Ok(()) = states.changed() => {
                if !json {
                    display::print_state(*states.borrow_and_update());
                }
            }
        }
    }

    aggregator.stop().await;
    recorder_cancel.cancel();
    let _ = recorder.await;

    let recorded = history.lock().unwrap_or_else(PoisonError::into_inner).len();
    tracing::info!(snapshots = recorded, "Session history");
    ExitCode::SUCCESS
}

async fn run_scan(path: PathBuf, json: bool) -> ExitCode {
    match read_full(&path).await {
        Ok(full) => {
            let snapshot = AggregateSnapshot::from_counts(fold_text(&full.lines));
            print(&snapshot, json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            display::print_error(&format!("Failed to read {}: {e}", path.display()));
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Watch {
            path,
            config,
            interval_ms,
            poll,
            json,
            history,
        } => match load_config(config, path, interval_ms, poll) {
            Ok(config) => {
                tracing::info!(
                    path = %config.file_path.display(),
                    notifications = config.use_notification_watcher,
                    "Starting dumpwatch"
                );
                run_watch(config, json, history).await
            }
            Err(e) => {
                display::print_error(&e);
                ExitCode::FAILURE
            }
        },
        Commands::Scan { path, json } => run_scan(path, json).await,
    }
}
