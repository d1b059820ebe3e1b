//! Autoscaler adaptor — the periodic calc/wait state machine.
//!
//! A single-slot ticktock stock hosts a marker entity that shuttles
//! between two self-loop movements: `autoscaler_calc` records statistics,
//! asks the autoscaler for a decision, and applies it to the cluster;
//! `autoscaler_wait` schedules the next calculation one tick later. The
//! first calculation fires at `start_at + 2001 ms`; the 1 ms offset keeps
//! it clear of anything scheduled on whole-second boundaries.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sken_core::{AutoscalerConfig, SimTime};
use skenario_sim::{
    check_kind, Effects, Entity, EntityKind, Environment, Movement, MovementListener, Rejected,
    SimError, SimResult, Stock, StockId, StockName,
};
use tracing::debug;

use crate::cluster::ClusterModel;
use crate::scaling::Autoscaler;
use crate::AUTOSCALER_KIND;

/// Movement kind for the waiting-to-calculating transition.
pub const AUTOSCALER_CALC: &str = "autoscaler_calc";
/// Movement kind for the calculating-to-waiting transition.
pub const AUTOSCALER_WAIT: &str = "autoscaler_wait";

/// Offset of the first calculation from the scenario start.
pub const FIRST_CALC_OFFSET: Duration = Duration::from_millis(2001);

/// Desired/launching/active counts sampled at one autoscaler tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSample {
    pub at: SimTime,
    pub desired: i32,
    pub launching: u64,
    pub active: u64,
}

/// Single-slot stock hosting the autoscaler's marker entity.
struct TickTockStock {
    name: StockName,
    kind_stocked: EntityKind,
    slot: Option<Entity>,
}

impl TickTockStock {
    fn new() -> Self {
        Self {
            name: StockName::from("AutoscalerTicktock"),
            kind_stocked: EntityKind::from(AUTOSCALER_KIND),
            slot: None,
        }
    }
}

impl Stock for TickTockStock {
    fn name(&self) -> &StockName {
        &self.name
    }

    fn kind_stocked(&self) -> &EntityKind {
        &self.kind_stocked
    }

    fn count(&self) -> u64 {
        self.slot.is_some() as u64
    }

    fn entities(&self) -> Vec<&Entity> {
        self.slot.iter().collect()
    }

    fn add(&mut self, entity: Entity, _fx: &mut Effects) -> Result<(), Rejected> {
        let entity = check_kind(&self.name, &self.kind_stocked, entity)?;
        self.slot = Some(entity);
        Ok(())
    }

    fn remove(&mut self, _fx: &mut Effects) -> Result<Entity, SimError> {
        self.slot.take().ok_or(SimError::StockEmpty {
            stock: self.name.clone(),
        })
    }
}

/// Movement listener that drives the cluster from autoscaler decisions.
pub struct AutoscalerModel {
    cluster: Rc<RefCell<ClusterModel>>,
    autoscaler: Box<dyn Autoscaler>,
    ticktock: StockId,
    tick_interval: Duration,
    series: Rc<RefCell<Vec<TickSample>>>,
}

impl AutoscalerModel {
    /// Register the ticktock stock, seed the marker entity, schedule the
    /// first calculation, and install the adaptor as a movement listener.
    /// Returns a handle onto the per-tick replica series.
    pub fn install(
        env: &mut Environment,
        cluster: Rc<RefCell<ClusterModel>>,
        autoscaler: Box<dyn Autoscaler>,
        config: &AutoscalerConfig,
    ) -> SimResult<Rc<RefCell<Vec<TickSample>>>> {
        let ticktock = env.register_stock(Box::new(TickTockStock::new()));
        env.add_entity(ticktock, Entity::new("autoscaler", AUTOSCALER_KIND))?;

        let mut first = Movement::new(
            AUTOSCALER_CALC,
            env.start_at() + FIRST_CALC_OFFSET,
            ticktock,
            ticktock,
        );
        first.add_note("first calculation");
        env.schedule_staggered(first)?;

        let series = Rc::new(RefCell::new(Vec::new()));
        env.add_movement_listener(Box::new(Self {
            cluster,
            autoscaler,
            ticktock,
            tick_interval: config.tick_interval,
            series: series.clone(),
        }));
        Ok(series)
    }

    fn on_calculate(&mut self, env: &mut Environment, movement: &mut Movement) -> SimResult<()> {
        let at = movement.occurs_at();

        {
            let cluster = self.cluster.borrow();
            cluster.record_to_autoscaler(env, self.autoscaler.as_mut(), at);
        }

        let currently_active = self.cluster.borrow().current_active(env) as i32;
        match self.autoscaler.scale(at) {
            Some(desired) => {
                if desired > currently_active {
                    movement.add_note(format!("{currently_active} \u{21d1} {desired}"));
                    self.cluster.borrow_mut().set_desired(env, desired)?;
                } else if desired < currently_active {
                    movement.add_note(format!("{currently_active} \u{2965} {desired}"));
                    self.cluster.borrow_mut().set_desired(env, desired)?;
                }
            }
            None => {
                debug!(at = %at, "autoscaler made no decision; holding desired count");
                movement.add_note("autoscaler made no decision");
            }
        }

        {
            let cluster = self.cluster.borrow();
            self.series.borrow_mut().push(TickSample {
                at,
                desired: cluster.current_desired(),
                launching: cluster.current_launching(env),
                active: cluster.current_active(env),
            });
        }

        env.schedule_staggered(Movement::new(
            AUTOSCALER_WAIT,
            at + Duration::from_nanos(1),
            self.ticktock,
            self.ticktock,
        ))?;
        Ok(())
    }

    fn on_wait(&mut self, env: &mut Environment, movement: &Movement) -> SimResult<()> {
        env.schedule_staggered(Movement::new(
            AUTOSCALER_CALC,
            movement.occurs_at() + self.tick_interval,
            self.ticktock,
            self.ticktock,
        ))?;
        Ok(())
    }
}

impl MovementListener for AutoscalerModel {
    fn on_movement(&mut self, env: &mut Environment, movement: &mut Movement) -> SimResult<()> {
        match movement.kind().as_str() {
            AUTOSCALER_CALC => self.on_calculate(env, movement),
            AUTOSCALER_WAIT => self.on_wait(env, movement),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sken_core::ClusterConfig;
    use skenario_sim::SinkStock;

    use crate::scaling::Stat;
    use crate::REQUEST_KIND;

    /// Scripted autoscaler returning a fixed sequence of decisions.
    struct ScriptedScaler {
        decisions: Vec<Option<i32>>,
        recorded: Vec<Stat>,
    }

    impl Autoscaler for ScriptedScaler {
        fn record(&mut self, stat: Stat) {
            self.recorded.push(stat);
        }
        fn scale(&mut self, _at: SimTime) -> Option<i32> {
            if self.decisions.is_empty() {
                None
            } else {
                self.decisions.remove(0)
            }
        }
    }

    fn harness(
        run_secs: u64,
        decisions: Vec<Option<i32>>,
    ) -> (Environment, Rc<RefCell<ClusterModel>>, Rc<RefCell<Vec<TickSample>>>) {
        let mut env = Environment::new(SimTime::UNIX_EPOCH, Duration::from_secs(run_secs));
        let sink = env.register_stock(Box::new(SinkStock::new("RequestsCompleted", REQUEST_KIND)));
        let cluster = Rc::new(RefCell::new(ClusterModel::new(
            &mut env,
            ClusterConfig::default(),
            sink,
        )));
        let scaler = Box::new(ScriptedScaler {
            decisions,
            recorded: Vec::new(),
        });
        let series = AutoscalerModel::install(
            &mut env,
            cluster.clone(),
            scaler,
            &AutoscalerConfig::default(),
        )
        .unwrap();
        (env, cluster, series)
    }

    const MS: i64 = 1_000_000;
    const SEC: i64 = 1_000_000_000;

    #[test]
    fn tick_cadence_matches_the_calc_wait_choreography() {
        let (mut env, _cluster, _series) = harness(5, vec![]);
        env.run().unwrap();

        let calcs: Vec<i64> = env
            .completed()
            .iter()
            .filter(|c| c.movement.kind().as_str() == AUTOSCALER_CALC)
            .map(|c| c.movement.occurs_at().nanos())
            .collect();
        // First at 2.001 s, then 1 ns (wait) + 2 s later.
        assert_eq!(calcs, vec![2 * SEC + MS, 4 * SEC + MS + 1]);

        let waits: Vec<i64> = env
            .completed()
            .iter()
            .filter(|c| c.movement.kind().as_str() == AUTOSCALER_WAIT)
            .map(|c| c.movement.occurs_at().nanos())
            .collect();
        assert_eq!(waits, vec![2 * SEC + MS + 1, 4 * SEC + MS + 2]);
    }

    #[test]
    fn scale_up_decision_is_applied_and_annotated() {
        let (mut env, cluster, _series) = harness(10, vec![Some(2)]);
        env.run().unwrap();

        assert_eq!(cluster.borrow().current_desired(), 2);
        // launch_delay is 5 s from the 2.001 s tick, so both replicas
        // activate within the 10 s run.
        assert_eq!(cluster.borrow().current_active(&env), 2);

        let calc = env
            .completed()
            .iter()
            .find(|c| c.movement.kind().as_str() == AUTOSCALER_CALC)
            .unwrap();
        assert!(calc.movement.notes().iter().any(|n| n == "0 \u{21d1} 2"));
    }

    #[test]
    fn scale_down_decision_is_applied_and_annotated() {
        let (mut env, cluster, _series) = harness(10, vec![Some(0)]);
        for i in 1..=2 {
            env.add_entity(
                cluster.borrow().active_stock(),
                Entity::new(format!("replica-{i}"), crate::REPLICA_KIND),
            )
            .unwrap();
        }

        env.run().unwrap();

        assert_eq!(cluster.borrow().current_desired(), 0);
        let calc = env
            .completed()
            .iter()
            .find(|c| c.movement.kind().as_str() == AUTOSCALER_CALC)
            .unwrap();
        assert!(calc.movement.notes().iter().any(|n| n == "2 \u{2965} 0"));
    }

    #[test]
    fn no_decision_holds_the_desired_count() {
        let (mut env, cluster, _series) = harness(5, vec![None]);
        env.run().unwrap();

        assert_eq!(cluster.borrow().current_desired(), 0);
        let calc = env
            .completed()
            .iter()
            .find(|c| c.movement.kind().as_str() == AUTOSCALER_CALC)
            .unwrap();
        assert!(calc
            .movement
            .notes()
            .iter()
            .any(|n| n == "autoscaler made no decision"));
    }

    #[test]
    fn first_calculation_carries_its_note() {
        let (mut env, _cluster, _series) = harness(3, vec![]);
        env.run().unwrap();

        let calc = env
            .completed()
            .iter()
            .find(|c| c.movement.kind().as_str() == AUTOSCALER_CALC)
            .unwrap();
        assert!(calc.movement.notes().iter().any(|n| n == "first calculation"));
    }

    #[test]
    fn series_samples_every_tick() {
        let (mut env, _cluster, series) = harness(9, vec![Some(1)]);
        env.run().unwrap();

        // Ticks at 2.001 s, 4.001 s, 6.001 s, 8.001 s.
        let series = series.borrow();
        assert_eq!(series.len(), 4);
        assert_eq!(series[0].desired, 1);
        assert!(series.iter().all(|s| s.desired == 1));
    }
}
