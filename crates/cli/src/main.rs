mod config;
mod presenter;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use migration_monitor_api_client::MigrationClient;
use migration_monitor_core::{
    reconcile, LogReconciler, MigrationPhase, PollingController, Presenter, StatusSource,
};
use presenter::TerminalPresenter;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "migration-monitor",
    about = "Start and follow a group/project migration running on a migration server"
)]
struct Cli {
    /// Config file (default: ~/.config/migration-monitor/monitor.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Migration server base URL
    #[arg(long, global = true)]
    server: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long, global = true)]
    interval_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the server to start a migration, then follow it to the end
    Start,

    /// Show the current status and follow a migration already in progress
    Watch,

    /// Fetch and print the current status once
    Status {
        /// Print the reconciled state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,migration_monitor=info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns whether the command ended in a successful state.
async fn run(cli: Cli) -> Result<bool> {
    let mut cfg = config::load_config(cli.config.as_deref())?;
    cfg.apply_overrides(cli.server, cli.interval_ms);
    cfg.validate()?;

    match cli.command {
        Commands::Config => {
            print!("{}", config::render_config(&cfg)?);
            Ok(true)
        }
        Commands::Status { json } => show_status(&cfg, json).await,
        Commands::Start => follow(&cfg, true).await,
        Commands::Watch => follow(&cfg, false).await,
    }
}

fn build_client(cfg: &config::MonitorConfig) -> Result<MigrationClient> {
    MigrationClient::new(&cfg.server.url, cfg.timeout())
        .with_context(|| format!("Failed to build HTTP client for {}", cfg.server.url))
}

async fn show_status(cfg: &config::MonitorConfig, json: bool) -> Result<bool> {
    let client = build_client(cfg)?;
    let payload = client
        .fetch_status()
        .await
        .with_context(|| format!("Failed to fetch status from {}", client.base_url()))?;
    let state = reconcile(&payload);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&state).context("Failed to serialize status")?
        );
    } else {
        let mut presenter = TerminalPresenter::new(std::io::stdout());
        let mut log = LogReconciler::new(cfg.log.scroll_tolerance);
        presenter.render(&state, &log.merge(&payload.logs, None));
    }
    Ok(!state.is_error)
}

/// `start` issues a start request first; `watch` only observes. Both poll
/// until the migration reaches a terminal phase or a signal arrives.
async fn follow(cfg: &config::MonitorConfig, start: bool) -> Result<bool> {
    let client = build_client(cfg)?;
    let presenter = TerminalPresenter::new(std::io::stdout());
    let mut controller = PollingController::new(client, presenter, &cfg.polling_config());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown().await;
        let _ = shutdown_tx.send(true);
    });

    let settled = first_request_or_shutdown(&mut controller, start, shutdown_rx.clone()).await?;
    if let Some(success) = settled {
        return Ok(success);
    }

    controller.poll_until_stopped(shutdown_rx).await;

    match controller.outcome()? {
        Some(state) if state.phase == MigrationPhase::Completed => Ok(true),
        Some(state) => {
            info!(phase = %state.phase, "stopped before the migration finished");
            Ok(false)
        }
        None => Ok(false),
    }
}

/// Race the first request against a shutdown signal. A signal counts as an
/// unsuccessful end.
async fn first_request_or_shutdown<S, P>(
    controller: &mut PollingController<S, P>,
    start: bool,
    mut signalled: watch::Receiver<bool>,
) -> Result<Option<bool>>
where
    S: StatusSource,
    P: Presenter,
{
    tokio::select! {
        result = first_request(controller, start) => result,
        Ok(()) = signalled.changed() => {
            info!("Shutdown requested before the server answered");
            controller.stop();
            Ok(Some(false))
        }
    }
}

/// Start or observe. `Some(success)` when there is nothing left to poll.
async fn first_request<S, P>(controller: &mut PollingController<S, P>, start: bool) -> Result<Option<bool>>
where
    S: StatusSource,
    P: Presenter,
{
    if start {
        let outcome = controller.start().await?;
        info!(?outcome, "start acknowledged");
        return Ok(None);
    }
    let state = controller.observe().await?;
    Ok((!controller.session().is_active()).then_some(!state.is_error))
}

/// Wait for SIGTERM or Ctrl+C
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
                }
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {e}");
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C");
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C");
        } else {
            warn!("Failed to register Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration_monitor_core::testing::{payload, RecordingPresenter, ScriptedSource};
    use migration_monitor_core::{PollingConfig, PollingState};
    use std::sync::Arc;
    use tokio::sync::Notify;

    fn controller(source: ScriptedSource) -> PollingController<ScriptedSource, RecordingPresenter> {
        PollingController::new(source, RecordingPresenter::default(), &PollingConfig::default())
    }

    #[tokio::test]
    async fn signal_during_first_request_ends_without_polling() {
        let gate = Arc::new(Notify::new());
        let source = ScriptedSource::new(vec![Ok(payload("running", (0, 0), (0, 0)))])
            .gated(Arc::clone(&gate));
        let mut c = controller(source);

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let settled = first_request_or_shutdown(&mut c, false, rx).await.unwrap();
        assert_eq!(settled, Some(false));
        assert_eq!(c.session().state(), PollingState::Stopped);
        assert!(c.presenter().frames.is_empty());
    }

    #[tokio::test]
    async fn watch_on_idle_server_has_nothing_to_poll() {
        let mut c = controller(ScriptedSource::new(vec![Ok(payload("idle", (0, 0), (0, 0)))]));
        let (_tx, rx) = watch::channel(false);

        let settled = first_request_or_shutdown(&mut c, false, rx).await.unwrap();
        assert_eq!(settled, Some(true));
    }

    #[tokio::test]
    async fn start_leaves_polling_to_the_caller() {
        let mut c = controller(ScriptedSource::new(vec![]));
        let (_tx, rx) = watch::channel(false);

        let settled = first_request_or_shutdown(&mut c, true, rx).await.unwrap();
        assert_eq!(settled, None);
        assert!(c.session().is_polling());
    }
}
