//! Scenario runner — wires the models into an environment and runs it.
//!
//! A scenario is: a traffic source feeding a request buffer, a cluster
//! reconciling replica stocks, a dispatcher routing buffered requests to
//! replica processing stocks, and an autoscaler adaptor closing the loop.
//! The runner executes the environment and flattens the results into
//! plain serializable records for the store and the API.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sken_core::{AutoscalerConfig, ClusterConfig, SimTime};
use skenario_sim::{
    CompletedMovement, Environment, IgnoredMovement, SimResult, SinkStock, ThroughStock,
};
use tracing::info;

use crate::autoscaler::{AutoscalerModel, TickSample};
use crate::cluster::ClusterModel;
use crate::dispatch::RequestDispatcher;
use crate::scaling::SlidingWindowAutoscaler;
use crate::traffic::{schedule_traffic, TrafficPattern, TrafficSourceStock};
use crate::REQUEST_KIND;

/// Everything needed to execute one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub start_at: SimTime,
    pub run_for: Duration,
    /// Seed for the arrival-time RNG; same seed, same run.
    pub seed: u64,
    /// Replicas asked for before the autoscaler's first decision.
    pub initial_desired: i32,
    pub traffic: TrafficPattern,
    pub cluster: ClusterConfig,
    pub autoscaler: AutoscalerConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            start_at: SimTime::UNIX_EPOCH,
            run_for: Duration::from_secs(600),
            seed: 1,
            initial_desired: 1,
            traffic: TrafficPattern::UniformRandom,
            cluster: ClusterConfig::default(),
            autoscaler: AutoscalerConfig::default(),
        }
    }
}

/// One movement flattened for storage: stock ids resolved to names,
/// notes joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub kind: String,
    pub occurs_at: i64,
    pub from_stock: String,
    pub to_stock: String,
    pub entity: Option<String>,
    pub note: String,
}

/// One distinct entity seen during the run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,
    pub kind: String,
}

/// One registered stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub name: String,
    pub kind_stocked: String,
}

/// The flattened result of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub traffic_pattern: String,
    pub requests_scheduled: u32,
    pub completed: Vec<MovementRecord>,
    pub ignored: Vec<MovementRecord>,
    pub entities: Vec<EntityRecord>,
    pub stocks: Vec<StockRecord>,
    pub replica_series: Vec<TickSample>,
}

/// Build, run, and flatten one scenario.
pub fn run_scenario(config: &ScenarioConfig) -> SimResult<ScenarioOutcome> {
    let mut env = Environment::new(config.start_at, config.run_for);

    let completed_sink =
        env.register_stock(Box::new(SinkStock::new("RequestsCompleted", REQUEST_KIND)));
    let buffer = env.register_stock(Box::new(ThroughStock::new("RequestsBuffer", REQUEST_KIND)));
    let source = env.register_stock(Box::new(TrafficSourceStock::default()));

    let cluster = Rc::new(RefCell::new(ClusterModel::new(
        &mut env,
        config.cluster.clone(),
        completed_sink,
    )));
    cluster
        .borrow_mut()
        .set_desired(&mut env, config.initial_desired)?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let requests_scheduled = schedule_traffic(
        &mut env,
        source,
        buffer,
        &config.traffic,
        config.cluster.number_of_requests,
        &mut rng,
    )?;

    env.add_movement_listener(Box::new(RequestDispatcher::new(cluster.clone(), buffer)));
    let series = AutoscalerModel::install(
        &mut env,
        cluster.clone(),
        Box::new(SlidingWindowAutoscaler::new(config.autoscaler.clone())),
        &config.autoscaler,
    )?;

    env.run()?;

    let replica_series = series.borrow().clone();
    info!(
        pattern = config.traffic.id(),
        requests = requests_scheduled,
        ticks = replica_series.len(),
        "scenario complete"
    );
    Ok(collect_outcome(
        &env,
        config.traffic.id(),
        requests_scheduled,
        replica_series,
    ))
}

/// Flatten a finished environment into storable records.
pub fn collect_outcome(
    env: &Environment,
    traffic_pattern: &str,
    requests_scheduled: u32,
    replica_series: Vec<TickSample>,
) -> ScenarioOutcome {
    let completed = env
        .completed()
        .iter()
        .map(|c| completed_record(env, c))
        .collect();
    let ignored = env
        .ignored()
        .iter()
        .map(|i| ignored_record(env, i))
        .collect();

    // Distinct entities: everything that moved plus everything still
    // sitting in a stock at the end of the run.
    let mut entities: Vec<EntityRecord> = env
        .completed()
        .iter()
        .filter_map(|c| c.entity.as_ref())
        .map(|e| EntityRecord {
            name: e.name.to_string(),
            kind: e.kind.to_string(),
        })
        .chain(env.stocks().flat_map(|stock| {
            stock
                .entities()
                .into_iter()
                .map(|e| EntityRecord {
                    name: e.name().to_string(),
                    kind: e.kind().to_string(),
                })
                .collect::<Vec<_>>()
        }))
        .collect();
    entities.sort();
    entities.dedup();

    let stocks = env
        .stocks()
        .map(|stock| StockRecord {
            name: stock.name().to_string(),
            kind_stocked: stock.kind_stocked().to_string(),
        })
        .collect();

    ScenarioOutcome {
        traffic_pattern: traffic_pattern.to_string(),
        requests_scheduled,
        completed,
        ignored,
        entities,
        stocks,
        replica_series,
    }
}

fn completed_record(env: &Environment, completed: &CompletedMovement) -> MovementRecord {
    let movement = &completed.movement;
    MovementRecord {
        kind: movement.kind().to_string(),
        occurs_at: movement.occurs_at().nanos(),
        from_stock: env.stock(movement.from()).name().to_string(),
        to_stock: env.stock(movement.to()).name().to_string(),
        entity: completed.entity.as_ref().map(|e| e.name.to_string()),
        note: movement.notes().join("; "),
    }
}

fn ignored_record(env: &Environment, ignored: &IgnoredMovement) -> MovementRecord {
    let movement = &ignored.movement;
    let note = if movement.notes().is_empty() {
        format!("ignored: {}", ignored.reason)
    } else {
        format!("{}; ignored: {}", movement.notes().join("; "), ignored.reason)
    };
    MovementRecord {
        kind: movement.kind().to_string(),
        occurs_at: movement.occurs_at().nanos(),
        from_stock: env.stock(movement.from()).name().to_string(),
        to_stock: env.stock(movement.to()).name().to_string(),
        entity: None,
        note,
    }
}
