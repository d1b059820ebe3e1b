//! skenario-model — the cluster and autoscaler models on top of the
//! simulation kernel.
//!
//! The models are plain listeners and stocks plugged into a
//! `skenario_sim::Environment`:
//!
//! - [`cluster::ClusterModel`] — replica stocks and `set_desired` reconciliation
//! - [`processing`] — per-replica CPU-time accounting for requests
//! - [`traffic`] — the request factory and arrival patterns
//! - [`dispatch::RequestDispatcher`] — routes buffered requests to replicas
//! - [`autoscaler::AutoscalerModel`] — the periodic calc/wait adaptor
//! - [`scaling`] — the autoscaler contract and a sliding-window implementation
//! - [`scenario`] — wires it all together and flattens the results

pub mod autoscaler;
pub mod cluster;
pub mod dispatch;
pub mod processing;
pub mod scaling;
pub mod scenario;
pub mod traffic;

/// Entity kind of replicas.
pub const REPLICA_KIND: &str = "Replica";
/// Entity kind of requests.
pub const REQUEST_KIND: &str = "Request";
/// Entity kind of the autoscaler's marker entity.
pub const AUTOSCALER_KIND: &str = "Autoscaler";

pub use autoscaler::{AutoscalerModel, TickSample};
pub use cluster::ClusterModel;
pub use dispatch::RequestDispatcher;
pub use scaling::{Autoscaler, SlidingWindowAutoscaler, Stat};
pub use scenario::{
    collect_outcome, run_scenario, EntityRecord, MovementRecord, ScenarioConfig, ScenarioOutcome,
    StockRecord,
};
pub use traffic::{schedule_traffic, TrafficPattern, TrafficSourceStock};
