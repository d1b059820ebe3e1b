//! skenario-store — SQLite persistence for scenario results.
//!
//! One `scenario_runs` row per execution (configuration and metadata),
//! plus `entities`, `stocks`, and `movements` rows describing everything
//! the run touched. Durations are stored as integer nanoseconds and the
//! `recorded` column is an RFC 3339 UTC timestamp.

pub mod error;
pub mod schema;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::Storer;
