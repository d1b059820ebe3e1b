//! skenariod — the Skenario daemon.
//!
//! Single binary with two modes:
//!
//! - **run** — execute one scenario headless and write results to SQLite
//! - **serve** — expose `GET /simulate` over HTTP
//!
//! # Usage
//!
//! ```text
//! skenariod run --run-for 600 --number-of-requests 50 --db skenario.db
//! skenariod run --traffic-pattern ramp --ramp-delta-v 1 --ramp-max-rps 10
//! skenariod serve --port 3000 --db skenario.db
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sken_core::{AutoscalerConfig, ClusterConfig};
use skenario_model::{ScenarioConfig, TrafficPattern};
use skenario_store::Storer;
use tracing::info;

#[derive(Parser)]
#[command(name = "skenariod", about = "Skenario cluster simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute one scenario headless and store the results in SQLite.
    Run {
        /// Simulated run length in seconds.
        #[arg(long, default_value = "600")]
        run_for: f64,

        /// Replica launch delay in seconds.
        #[arg(long, default_value = "5")]
        launch_delay: f64,

        /// Replica terminate delay in seconds.
        #[arg(long, default_value = "1")]
        terminate_delay: f64,

        /// Autoscaler tick interval in seconds.
        #[arg(long, default_value = "2")]
        tick_interval: f64,

        /// Autoscaler stable window in seconds.
        #[arg(long, default_value = "60")]
        stable_window: f64,

        /// Autoscaler panic window in seconds.
        #[arg(long, default_value = "6")]
        panic_window: f64,

        /// Scale-to-zero grace period in seconds.
        #[arg(long, default_value = "30")]
        scale_to_zero_grace_period: f64,

        /// Target concurrent requests per replica.
        #[arg(long, default_value = "2.0")]
        target_concurrency_default: f64,

        /// Fraction of the concurrency target to aim for.
        #[arg(long, default_value = "0.5")]
        target_concurrency_percentage: f64,

        /// Upper bound on scale-up per decision.
        #[arg(long, default_value = "10.0")]
        max_scale_up_rate: f64,

        /// Number of requests the traffic source emits.
        #[arg(long, default_value = "10")]
        number_of_requests: u32,

        /// Arrival pattern: uniform_random or ramp.
        #[arg(long, default_value = "uniform_random")]
        traffic_pattern: String,

        /// Ramp pattern: requests-per-second increase per second.
        #[arg(long, default_value = "1.0")]
        ramp_delta_v: f64,

        /// Ramp pattern: requests-per-second ceiling.
        #[arg(long, default_value = "10.0")]
        ramp_max_rps: f64,

        /// Seed for the arrival-time RNG.
        #[arg(long, default_value = "1")]
        seed: u64,

        /// SQLite database file for the results.
        #[arg(long, default_value = "skenario.db")]
        db: PathBuf,
    },

    /// Serve the simulation API over HTTP.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "3000")]
        port: u16,

        /// SQLite database file for non-inmemory runs.
        #[arg(long, default_value = "skenario.db")]
        db: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,skenariod=debug,skenario=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            run_for,
            launch_delay,
            terminate_delay,
            tick_interval,
            stable_window,
            panic_window,
            scale_to_zero_grace_period,
            target_concurrency_default,
            target_concurrency_percentage,
            max_scale_up_rate,
            number_of_requests,
            traffic_pattern,
            ramp_delta_v,
            ramp_max_rps,
            seed,
            db,
        } => {
            let traffic = parse_traffic_pattern(&traffic_pattern, ramp_delta_v, ramp_max_rps)?;
            let config = ScenarioConfig {
                run_for: positive_secs("run-for", run_for)?,
                seed,
                traffic,
                cluster: ClusterConfig {
                    launch_delay: positive_secs("launch-delay", launch_delay)?,
                    terminate_delay: positive_secs("terminate-delay", terminate_delay)?,
                    number_of_requests,
                },
                autoscaler: AutoscalerConfig {
                    tick_interval: positive_secs("tick-interval", tick_interval)?,
                    stable_window: positive_secs("stable-window", stable_window)?,
                    panic_window: positive_secs("panic-window", panic_window)?,
                    scale_to_zero_grace_period: positive_secs(
                        "scale-to-zero-grace-period",
                        scale_to_zero_grace_period,
                    )?,
                    target_concurrency_default,
                    target_concurrency_percentage,
                    max_scale_up_rate,
                },
                ..ScenarioConfig::default()
            };
            run_headless(config, db)
        }
        Command::Serve { port, db } => serve(port, db).await,
    }
}

fn parse_traffic_pattern(
    pattern: &str,
    delta_v: f64,
    max_rps: f64,
) -> anyhow::Result<TrafficPattern> {
    match pattern {
        "uniform_random" => Ok(TrafficPattern::UniformRandom),
        "ramp" => Ok(TrafficPattern::Ramp { delta_v, max_rps }),
        other => anyhow::bail!("unknown traffic pattern: {other}"),
    }
}

fn positive_secs(name: &str, value: f64) -> anyhow::Result<Duration> {
    if !(value > 0.0) {
        anyhow::bail!("--{name} must be positive, got {value}");
    }
    Ok(Duration::from_secs_f64(value))
}

fn run_headless(config: ScenarioConfig, db: PathBuf) -> anyhow::Result<()> {
    info!(
        pattern = config.traffic.id(),
        run_for_secs = config.run_for.as_secs_f64(),
        requests = config.cluster.number_of_requests,
        "executing scenario"
    );

    let outcome = skenario_model::run_scenario(&config).context("scenario execution failed")?;

    let mut storer = Storer::open(&db).context("opening result database")?;
    let run_id = storer
        .store(&outcome, &config.cluster, &config.autoscaler, "skenario_cli")
        .context("storing scenario results")?;

    let final_replicas = outcome
        .replica_series
        .last()
        .map(|sample| sample.active)
        .unwrap_or(0);
    info!(
        run_id,
        completed = outcome.completed.len(),
        ignored = outcome.ignored.len(),
        final_active_replicas = final_replicas,
        db = %db.display(),
        "scenario stored"
    );
    Ok(())
}

async fn serve(port: u16, db: PathBuf) -> anyhow::Result<()> {
    let state = skenario_api::ApiState { db_path: db };
    let router = skenario_api::build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
        })
        .await?;

    info!("skenariod stopped");
    Ok(())
}
