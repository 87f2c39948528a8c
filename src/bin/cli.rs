//! CLI binary for the Fae updater.

use anyhow::Context;
use clap::{Parser, Subcommand};
use fae_updater::{UpdateCoordinator, UpdateEvent, UpdateSnapshot, UpdateState, UpdaterConfig};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Check for, download and install Fae updates.
#[derive(Parser)]
#[command(name = "fae-update", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Descriptor URL, overriding the configuration file.
    #[arg(long)]
    server_url: Option<String>,

    /// Pretend to be this version instead of the configured one.
    #[arg(long)]
    current_version: Option<String>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Poll the server and print the updater state as JSON.
    Status,

    /// Poll the server and report whether an update is available.
    Check,

    /// Download the advertised update.
    Download {
        /// Cancel once this many bytes have arrived.
        #[arg(long, value_name = "BYTES")]
        cancel_after: Option<u64>,
    },

    /// Download the advertised update and run its installer.
    Install,
}

/// JSON shape printed by `status`.
#[derive(Serialize)]
struct StatusReport<'a> {
    enabled: bool,
    current_version: String,
    latest_version: Option<String>,
    download_url: Option<String>,
    update_available: bool,
    target_path: &'a Path,
    #[serde(flatten)]
    session: UpdateSnapshot,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fae_updater=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let coordinator = UpdateCoordinator::new(config).context("cannot start updater")?;

    let outcome = match cli.command.unwrap_or(Command::Check) {
        Command::Status => run_status(&coordinator),
        Command::Check => run_check(&coordinator),
        Command::Download { cancel_after } => run_download(&coordinator, cancel_after),
        Command::Install => run_install(&coordinator),
    };

    coordinator.shutdown()?;
    outcome
}

fn load_config(cli: &Cli) -> anyhow::Result<UpdaterConfig> {
    let mut config = match &cli.config {
        Some(path) => UpdaterConfig::from_file(path)
            .with_context(|| format!("cannot load {}", path.display()))?,
        None => {
            let path = UpdaterConfig::default_config_path();
            if path.exists() {
                debug!("loading updater config from {}", path.display());
                UpdaterConfig::from_file(&path)?
            } else {
                UpdaterConfig::default()
            }
        }
    };

    if let Some(url) = &cli.server_url {
        config.server_url = Some(url.clone());
    }
    if let Some(version) = &cli.current_version {
        config.current_version = version.clone();
    }
    Ok(config)
}

/// Poll and wait for the result.
fn poll(coordinator: &UpdateCoordinator) -> anyhow::Result<()> {
    if !coordinator.is_enabled() {
        anyhow::bail!("updates are disabled: no server URL configured (use --server-url)");
    }
    coordinator.poll_server();
    coordinator.sync()?;
    Ok(())
}

/// Turn the session's error state into a CLI error.
fn check_failed(coordinator: &UpdateCoordinator) -> anyhow::Result<()> {
    if let Some(cause) = coordinator.error_cause() {
        return match cause.cause() {
            Some(source) => Err(anyhow::anyhow!("{}: {source}", cause.message())),
            None => Err(anyhow::anyhow!("{}", cause.message())),
        };
    }
    Ok(())
}

fn run_status(coordinator: &UpdateCoordinator) -> anyhow::Result<()> {
    if coordinator.is_enabled() {
        coordinator.poll_server();
        coordinator.sync()?;
    }

    let report = StatusReport {
        enabled: coordinator.is_enabled(),
        current_version: coordinator.current_version().to_string(),
        latest_version: coordinator.latest_version().map(|v| v.to_string()),
        download_url: coordinator.download_url(),
        update_available: coordinator.is_update_available(),
        target_path: coordinator.target_path(),
        session: coordinator.snapshot(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_check(coordinator: &UpdateCoordinator) -> anyhow::Result<()> {
    poll(coordinator)?;
    check_failed(coordinator)?;

    match coordinator.latest_version() {
        Some(latest) if coordinator.is_update_available() => {
            println!(
                "Update available: {} -> {latest}",
                coordinator.current_version()
            );
        }
        Some(latest) => println!(
            "Fae {} is up to date (server has {latest})",
            coordinator.current_version()
        ),
        None => println!("Server did not report a version"),
    }
    Ok(())
}

fn run_download(coordinator: &UpdateCoordinator, cancel_after: Option<u64>) -> anyhow::Result<()> {
    poll(coordinator)?;
    check_failed(coordinator)?;
    if !coordinator.is_update_available() {
        println!("Fae {} is up to date", coordinator.current_version());
        return Ok(());
    }

    download_with_progress(coordinator, cancel_after)?;
    check_failed(coordinator)?;
    println!("Installer saved to {}", coordinator.target_path().display());
    Ok(())
}

fn run_install(coordinator: &UpdateCoordinator) -> anyhow::Result<()> {
    poll(coordinator)?;
    check_failed(coordinator)?;
    if !coordinator.is_update_available() {
        println!("Fae {} is up to date", coordinator.current_version());
        return Ok(());
    }

    download_with_progress(coordinator, None)?;
    check_failed(coordinator)?;

    println!("Starting installer {}", coordinator.target_path().display());
    coordinator.launch_update();
    coordinator.sync()?;
    check_failed(coordinator)?;

    if coordinator.state() == UpdateState::ExecutingSetup {
        info!("installer launched");
    }
    Ok(())
}

/// Queue a download and render its progress until it finishes or fails.
fn download_with_progress(
    coordinator: &UpdateCoordinator,
    cancel_after: Option<u64>,
) -> anyhow::Result<()> {
    let events = coordinator.subscribe();

    std::thread::scope(|scope| {
        let watcher = scope.spawn(|| watch_download(coordinator, events, cancel_after));
        coordinator.download_update();
        let synced = coordinator.sync();
        let _ = watcher.join();
        synced
    })?;
    Ok(())
}

fn watch_download(
    coordinator: &UpdateCoordinator,
    mut events: broadcast::Receiver<UpdateEvent>,
    cancel_after: Option<u64>,
) {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(
        "  {msg} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}",
    ) {
        pb.set_style(style);
    }
    pb.set_message("downloading update");

    loop {
        match events.blocking_recv() {
            Ok(UpdateEvent::Progress {
                bytes_downloaded,
                total_bytes,
            }) => {
                if let Some(total) = total_bytes {
                    pb.set_length(total);
                }
                pb.set_position(bytes_downloaded);
                if cancel_after.is_some_and(|limit| bytes_downloaded >= limit)
                    && !coordinator.is_download_cancelled()
                {
                    coordinator.cancel_download();
                }
            }
            Ok(UpdateEvent::StateChanged {
                state: UpdateState::DownloadFinished,
            }) => {
                pb.finish_with_message("download complete");
                return;
            }
            Ok(UpdateEvent::StateChanged {
                state: UpdateState::Error,
            }) => {
                pb.abandon_with_message("download failed");
                return;
            }
            Ok(UpdateEvent::StateChanged { .. }) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => {
                pb.abandon();
                return;
            }
        }
    }
}
