mod api;
mod app_state;
mod config;
mod dto;
mod error;
mod orchestrator;
mod registry;
mod resolver;
mod sync;
mod tag;
#[cfg(test)]
mod testing;

use std::fs;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::ServiceExt;
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tower_http::normalize_path::NormalizePathLayer;
use tower_layer::Layer;
use tracing::metadata::LevelFilter;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter, EnvFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use app_state::AppState;
use config::{Config, LogConfig};
use dto::service::ManagementLabels;
use error::AppError;
use orchestrator::{Orchestrator, swarm::SwarmClient};
use registry::{TagRegistry, distribution::DistributionClient};
use sync::{reconciler::Reconciler, scheduler::BatchScheduler};

/// Keeps swarm services on the newest image tag their labels ask for.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path of the config file, defaults to `$SWARM_SYNC_CONFIG` or `config.toml`.
    #[arg(long)]
    config_path: Option<String>,
    /// Run a single pass, print its report and exit.
    #[arg(long)]
    once: bool,
}

/// Set up stdout and rolling file logging.
///
/// The returned guards flush the non blocking writers when dropped, keep them alive.
fn init_logging(logc: &LogConfig) -> anyhow::Result<Vec<WorkerGuard>> {
    let mut logging_guards = Vec::new();

    // Create log directory if it doesn't exist
    let log_path = &logc.path;
    fs::create_dir_all(log_path)?;

    // Get a rolling file appender depending on the config
    let file_appender = match logc.roll_period {
        config::RollPeriod::Minutely => tracing_appender::rolling::minutely(log_path, "swarm-sync.log"),
        config::RollPeriod::Hourly => tracing_appender::rolling::hourly(log_path, "swarm-sync.log"),
        config::RollPeriod::Daily => tracing_appender::rolling::daily(log_path, "swarm-sync.log"),
        config::RollPeriod::Never => tracing_appender::rolling::never(log_path, "swarm-sync.log"),
    };

    // Create non blocking loggers
    let (file_appender_nb, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    logging_guards.push(file_guard);
    logging_guards.push(stdout_guard);

    // Get json or text layers
    let (json_a, json_b, plain_a, plain_b) = match logc.format {
        config::LogFormat::Json => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_appender_nb)
                    .json()
            ),
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(stdout_nb)
                    .json()
            ),
            None,
            None
        ),
        config::LogFormat::Human => (
            None,
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_appender_nb)
                    .with_ansi(false)
            ),
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(stdout_nb)
            )
        )
    };

    // Only log swarm_sync at the configured level, unless an env filter is given
    let targets_filter = if logc.env_filter.is_some() {
        None
    } else {
        Some(
            filter::Targets::new()
                .with_target("swarm_sync", logc.level)
                .with_default(LevelFilter::INFO)
        )
    };

    let env_filter = match &logc.env_filter {
        Some(env_filter) => Some(EnvFilter::from_str(env_filter)?),
        None => None,
    };

    tracing_subscriber::registry()
        .with(json_a)
        .with(json_b)
        .with(plain_a)
        .with(plain_b)
        .with(targets_filter)
        .with(env_filter)
        .init();

    Ok(logging_guards)
}

/// Trigger a pass every `period` until the process exits.
async fn run_periodically(state: Arc<AppState>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match state.run_pass().await {
            Ok(_) => {},
            Err(AppError::PassInProgress) => info!("Skipping scheduled pass, another pass is still running"),
            Err(e) => error!("Scheduled pass failed: {}", e),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::new(args.config_path)?;

    let _logging_guards = init_logging(&config.log)?;

    // One client per collaborator, shared by everything that needs it.
    let registry: Arc<dyn TagRegistry> = Arc::new(DistributionClient::new(&config.registry)?);
    let orchestrator: Arc<dyn Orchestrator> = Arc::new(SwarmClient::new(&config.docker));

    let scheduler = BatchScheduler::new(
        Reconciler::new(registry.clone(), orchestrator),
        ManagementLabels::new(&config.sync.label_prefix),
        Duration::from_millis(config.docker.update_interval_ms),
    );
    let state = Arc::new(AppState::new(config.clone(), registry, scheduler));

    if args.once {
        let report = state.run_pass().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(interval) = config.sync.interval_secs {
        info!("Running a pass every {} seconds", interval);
        let period = Duration::from_secs(interval.max(1));
        tokio::spawn(run_periodically(state.clone(), period));
    }

    if config.api.enable {
        let app_addr = SocketAddr::from_str(&format!("{}:{}", config.listen_address, config.listen_port))?;
        let app = NormalizePathLayer::trim_trailing_slash().layer(api::router(state));

        info!("Starting http server, listening on {}", app_addr);
        axum::Server::bind(&app_addr)
            .serve(app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        shutdown_signal().await;
    }

    Ok(())
}
