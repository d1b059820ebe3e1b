//! skenario-api — HTTP surface for running simulations.
//!
//! A single route:
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/simulate` | Execute a scenario and return its results as JSON |
//!
//! Query parameters mirror the CLI flags (durations in seconds). With
//! `inmemory=true` the results are written to a throwaway in-memory
//! database; otherwise they land in the server's configured database
//! file. The response carries the replica time series and the raw
//! movement log.

pub mod handlers;

use std::path::PathBuf;

use axum::routing::get;
use axum::Router;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Database file used when a request does not ask for `inmemory`.
    pub db_path: PathBuf,
}

/// Build the API router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/simulate", get(handlers::simulate))
        .with_state(state)
}
