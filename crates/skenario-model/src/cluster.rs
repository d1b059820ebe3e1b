//! Cluster model — replica stocks and desired-count reconciliation.
//!
//! Three stocks hold replica entities: `ReplicasLaunching` and
//! `ReplicasActive` are through stocks, `ReplicasTerminating` is a sink.
//! `set_desired` closes the gap between `|launching| + |active|` and the
//! requested count by fabricating replicas or scheduling decommissions;
//! everything else happens through the movements it puts on the schedule.

use std::collections::HashMap;

use sken_core::{ClusterConfig, SimTime};
use skenario_sim::{
    Entity, EntityName, Environment, Movement, SimResult, SinkStock, StockId, ThroughStock,
};
use std::time::Duration;
use tracing::debug;

use crate::processing;
use crate::scaling::{Autoscaler, Stat};
use crate::REPLICA_KIND;

/// Movement kind for a replica finishing its launch.
pub const LAUNCHING_TO_ACTIVE: &str = "launching -> active";
/// Movement kind for cancelling a replica that never became active.
pub const LAUNCHING_TO_TERMINATED: &str = "launching -> terminated";
/// Movement kind for decommissioning an active replica.
pub const ACTIVE_TO_TERMINATED: &str = "active -> terminated";

/// The replica stocks plus the desired count they converge toward.
pub struct ClusterModel {
    config: ClusterConfig,
    launching: StockId,
    active: StockId,
    terminating: StockId,
    request_sink: StockId,
    current_desired: i32,
    replica_seq: u64,
    processing: HashMap<EntityName, StockId>,
}

impl ClusterModel {
    /// Register the replica stocks and return the model. `request_sink`
    /// is where each replica's completed requests end up.
    pub fn new(env: &mut Environment, config: ClusterConfig, request_sink: StockId) -> Self {
        let launching =
            env.register_stock(Box::new(ThroughStock::new("ReplicasLaunching", REPLICA_KIND)));
        let active =
            env.register_stock(Box::new(ThroughStock::new("ReplicasActive", REPLICA_KIND)));
        let terminating =
            env.register_stock(Box::new(SinkStock::new("ReplicasTerminating", REPLICA_KIND)));

        Self {
            config,
            launching,
            active,
            terminating,
            request_sink,
            current_desired: 0,
            replica_seq: 0,
            processing: HashMap::new(),
        }
    }

    pub fn current_desired(&self) -> i32 {
        self.current_desired
    }

    pub fn current_launching(&self, env: &Environment) -> u64 {
        env.stock(self.launching).count()
    }

    pub fn current_active(&self, env: &Environment) -> u64 {
        env.stock(self.active).count()
    }

    /// Reconcile the replica stocks toward `desired`.
    ///
    /// Scale-up fabricates fresh replicas into `ReplicasLaunching` and
    /// schedules their activation at `now + launch_delay`. Scale-down
    /// prefers cancelling launching replicas (scheduled 1 ns out) before
    /// draining active ones at `now + terminate_delay`. Bursts are
    /// staggered by 1 ns per movement to honor the queue's unique-time
    /// rule. Calling twice with the same value is a no-op.
    pub fn set_desired(&mut self, env: &mut Environment, desired: i32) -> SimResult<()> {
        let desired = desired.max(0);
        let launching = self.current_launching(env) as i64;
        let active = self.current_active(env) as i64;
        let gap = desired as i64 - (launching + active);
        let now = env.current_movement_time();

        if gap > 0 {
            let mut at = now + self.config.launch_delay;
            for _ in 0..gap {
                at = self.launch_replica(env, at)? + Duration::from_nanos(1);
            }
        } else if gap < 0 {
            let excess = (-gap) as u64;
            let cancel = excess.min(launching as u64);

            let mut at = now + Duration::from_nanos(1);
            for _ in 0..cancel {
                let movement =
                    Movement::new(LAUNCHING_TO_TERMINATED, at, self.launching, self.terminating);
                at = env.schedule_staggered(movement)? + Duration::from_nanos(1);
            }

            let mut at = now + self.config.terminate_delay;
            for _ in 0..(excess - cancel) {
                let movement =
                    Movement::new(ACTIVE_TO_TERMINATED, at, self.active, self.terminating);
                at = env.schedule_staggered(movement)? + Duration::from_nanos(1);
            }
        }

        debug!(desired, gap, "cluster reconciled");
        self.current_desired = desired;
        Ok(())
    }

    /// Fabricate one replica, put it in `ReplicasLaunching`, and schedule
    /// its activation no earlier than `at`. Returns the scheduled time.
    fn launch_replica(&mut self, env: &mut Environment, at: SimTime) -> SimResult<SimTime> {
        self.replica_seq += 1;
        let name = EntityName::from(format!("replica-{}", self.replica_seq));

        let processing_stock =
            processing::register_replica_processing(env, self.replica_seq, self.request_sink, 0);
        self.processing.insert(name.clone(), processing_stock);

        env.add_entity(self.launching, Entity::new(name, REPLICA_KIND))?;
        let movement = Movement::new(LAUNCHING_TO_ACTIVE, at, self.launching, self.active);
        env.schedule_staggered(movement)
    }

    /// Submit one statistics record per active replica, in stock order.
    pub fn record_to_autoscaler(
        &self,
        env: &Environment,
        autoscaler: &mut dyn Autoscaler,
        at: SimTime,
    ) {
        for entity in env.stock(self.active).entities() {
            autoscaler.record(Stat {
                pod_name: entity.name().clone(),
                time: at,
                average_concurrent_requests: 1.0,
                request_count: 1,
            });
        }
    }

    /// Processing stocks of the currently active replicas, in stock order.
    pub fn active_processing(&self, env: &Environment) -> Vec<StockId> {
        env.stock(self.active)
            .entities()
            .iter()
            .filter_map(|entity| self.processing.get(entity.name()).copied())
            .collect()
    }

    pub fn launching_stock(&self) -> StockId {
        self.launching
    }

    pub fn active_stock(&self) -> StockId {
        self.active
    }

    pub fn terminating_stock(&self) -> StockId {
        self.terminating
    }
}
