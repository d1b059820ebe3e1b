//! HTTP handlers for executing simulations.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use sken_core::{AutoscalerConfig, ClusterConfig};
use skenario_model::{MovementRecord, ScenarioConfig, TickSample, TrafficPattern};
use skenario_store::Storer;
use tracing::{error, info};

use crate::ApiState;

/// Origin tag stamped onto runs triggered over HTTP.
const API_ORIGIN: &str = "skenario_api";

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Query parameters for `GET /simulate`. Durations are in (fractional)
/// seconds; omitted parameters fall back to the scenario defaults.
#[derive(Debug, Deserialize)]
pub struct SimulateParams {
    #[serde(default = "default_run_for")]
    pub run_for: f64,
    #[serde(default = "default_launch_delay")]
    pub launch_delay: f64,
    #[serde(default = "default_terminate_delay")]
    pub terminate_delay: f64,
    #[serde(default = "default_tick_interval")]
    pub tick_interval: f64,
    #[serde(default = "default_stable_window")]
    pub stable_window: f64,
    #[serde(default = "default_panic_window")]
    pub panic_window: f64,
    #[serde(default = "default_grace_period")]
    pub scale_to_zero_grace_period: f64,
    #[serde(default = "default_target_concurrency")]
    pub target_concurrency_default: f64,
    #[serde(default = "default_target_percentage")]
    pub target_concurrency_percentage: f64,
    #[serde(default = "default_max_scale_up_rate")]
    pub max_scale_up_rate: f64,
    #[serde(default = "default_number_of_requests")]
    pub number_of_requests: u32,
    /// Store results in an in-memory database instead of the API's
    /// configured database file.
    #[serde(default)]
    pub inmemory: bool,
    #[serde(default = "default_traffic_pattern")]
    pub traffic_pattern: String,
    #[serde(default = "default_ramp_delta_v")]
    pub ramp_delta_v: f64,
    #[serde(default = "default_ramp_max_rps")]
    pub ramp_max_rps: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_run_for() -> f64 {
    600.0
}
fn default_launch_delay() -> f64 {
    5.0
}
fn default_terminate_delay() -> f64 {
    1.0
}
fn default_tick_interval() -> f64 {
    2.0
}
fn default_stable_window() -> f64 {
    60.0
}
fn default_panic_window() -> f64 {
    6.0
}
fn default_grace_period() -> f64 {
    30.0
}
fn default_target_concurrency() -> f64 {
    2.0
}
fn default_target_percentage() -> f64 {
    0.5
}
fn default_max_scale_up_rate() -> f64 {
    10.0
}
fn default_number_of_requests() -> u32 {
    10
}
fn default_traffic_pattern() -> String {
    "uniform_random".to_string()
}
fn default_ramp_delta_v() -> f64 {
    1.0
}
fn default_ramp_max_rps() -> f64 {
    10.0
}
fn default_seed() -> u64 {
    1
}

impl SimulateParams {
    fn scenario_config(&self) -> Result<ScenarioConfig, String> {
        if !(self.run_for > 0.0) {
            return Err("run_for must be positive".to_string());
        }
        for (name, value) in [
            ("launch_delay", self.launch_delay),
            ("terminate_delay", self.terminate_delay),
            ("tick_interval", self.tick_interval),
            ("stable_window", self.stable_window),
            ("panic_window", self.panic_window),
            (
                "scale_to_zero_grace_period",
                self.scale_to_zero_grace_period,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{name} must be a non-negative number"));
            }
        }

        let traffic = match self.traffic_pattern.as_str() {
            "uniform_random" => TrafficPattern::UniformRandom,
            "ramp" => TrafficPattern::Ramp {
                delta_v: self.ramp_delta_v,
                max_rps: self.ramp_max_rps,
            },
            other => return Err(format!("unknown traffic pattern: {other}")),
        };

        Ok(ScenarioConfig {
            run_for: Duration::from_secs_f64(self.run_for),
            seed: self.seed,
            traffic,
            cluster: ClusterConfig {
                launch_delay: Duration::from_secs_f64(self.launch_delay),
                terminate_delay: Duration::from_secs_f64(self.terminate_delay),
                number_of_requests: self.number_of_requests,
            },
            autoscaler: AutoscalerConfig {
                tick_interval: Duration::from_secs_f64(self.tick_interval),
                stable_window: Duration::from_secs_f64(self.stable_window),
                panic_window: Duration::from_secs_f64(self.panic_window),
                scale_to_zero_grace_period: Duration::from_secs_f64(
                    self.scale_to_zero_grace_period,
                ),
                target_concurrency_default: self.target_concurrency_default,
                target_concurrency_percentage: self.target_concurrency_percentage,
                max_scale_up_rate: self.max_scale_up_rate,
            },
            ..ScenarioConfig::default()
        })
    }
}

/// The body of a successful `/simulate` response.
#[derive(Serialize)]
pub struct SimulateResult {
    pub traffic_pattern: String,
    pub requests_scheduled: u32,
    pub completed_count: usize,
    pub ignored_count: usize,
    pub replica_series: Vec<TickSample>,
    pub movements: Vec<MovementRecord>,
}

/// GET /simulate
pub async fn simulate(
    State(state): State<ApiState>,
    Query(params): Query<SimulateParams>,
) -> impl IntoResponse {
    let config = match params.scenario_config() {
        Ok(config) => config,
        Err(msg) => return error_response(&msg, StatusCode::BAD_REQUEST).into_response(),
    };

    let inmemory = params.inmemory;
    let db_path = state.db_path.clone();

    // The simulation is synchronous CPU work; keep it off the async runtime.
    let result = tokio::task::spawn_blocking(move || {
        let outcome = skenario_model::run_scenario(&config)?;

        let mut storer = if inmemory {
            Storer::open_in_memory().map_err(|e| anyhow::anyhow!(e))?
        } else {
            Storer::open(&db_path).map_err(|e| anyhow::anyhow!(e))?
        };
        storer
            .store(&outcome, &config.cluster, &config.autoscaler, API_ORIGIN)
            .map_err(|e| anyhow::anyhow!(e))?;

        anyhow::Ok(outcome)
    })
    .await;

    match result {
        Ok(Ok(outcome)) => {
            info!(
                pattern = %outcome.traffic_pattern,
                completed = outcome.completed.len(),
                ignored = outcome.ignored.len(),
                "simulation served"
            );
            ApiResponse::ok(SimulateResult {
                traffic_pattern: outcome.traffic_pattern.clone(),
                requests_scheduled: outcome.requests_scheduled,
                completed_count: outcome.completed.len(),
                ignored_count: outcome.ignored.len(),
                replica_series: outcome.replica_series,
                movements: outcome.completed,
            })
            .into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "simulation failed");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
        Err(e) => {
            error!(error = %e, "simulation task panicked");
            error_response("simulation task failed", StatusCode::INTERNAL_SERVER_ERROR)
                .into_response()
        }
    }
}
