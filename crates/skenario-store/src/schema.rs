//! SQLite table definitions for the result store.
//!
//! One `scenario_runs` row per execution, with durations stored as
//! integer nanoseconds; `entities` and `stocks` snapshot what the run
//! touched; `movements` holds one row per completed and ignored movement.

pub const CREATE_SCENARIO_RUNS: &str = "
CREATE TABLE IF NOT EXISTS scenario_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recorded TEXT NOT NULL,
    origin TEXT NOT NULL,
    traffic_pattern TEXT NOT NULL,
    cluster_launch_delay INTEGER NOT NULL,
    cluster_terminate_delay INTEGER NOT NULL,
    cluster_number_of_requests INTEGER NOT NULL,
    autoscaler_tick_interval INTEGER NOT NULL,
    autoscaler_stable_window INTEGER NOT NULL,
    autoscaler_panic_window INTEGER NOT NULL,
    autoscaler_scale_to_zero_grace_period INTEGER NOT NULL,
    autoscaler_target_concurrency_default REAL NOT NULL,
    autoscaler_target_concurrency_percentage REAL NOT NULL,
    autoscaler_max_scale_up_rate REAL NOT NULL
)";

pub const CREATE_ENTITIES: &str = "
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    kind TEXT NOT NULL
)";

pub const CREATE_STOCKS: &str = "
CREATE TABLE IF NOT EXISTS stocks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    kind_stocked TEXT NOT NULL
)";

pub const CREATE_MOVEMENTS: &str = "
CREATE TABLE IF NOT EXISTS movements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scenario_run_id INTEGER NOT NULL REFERENCES scenario_runs(id),
    kind TEXT NOT NULL,
    occurs_at INTEGER NOT NULL,
    from_stock TEXT NOT NULL,
    to_stock TEXT NOT NULL,
    entity TEXT,
    note TEXT NOT NULL
)";
