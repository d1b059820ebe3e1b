//! Environment — the kernel that owns time, the movement queue, and the
//! stock arena, and drives the run loop.
//!
//! The run loop is the only executor in the simulator. It drains the
//! queue in strict ascending time order, mediating one entity transfer
//! per movement and notifying listeners synchronously before the next
//! dequeue. Every run is bracketed by two sentinel movements that walk a
//! `Scenario` entity from `BeforeScenario` through `RunningScenario`
//! into `AfterScenario`.

use std::collections::VecDeque;
use std::mem;
use std::time::Duration;

use sken_core::SimTime;
use tracing::{debug, info};

use crate::entity::Entity;
use crate::error::{SimError, SimResult};
use crate::movement::{
    CompletedMovement, EntityRef, IgnoredMovement, Movement, MovementListener, SchedulingListener,
};
use crate::queue::MovementPriorityQueue;
use crate::stock::{Effects, SinkStock, Stock, StockId, ThroughStock};

/// Movement kind of the sentinel that opens a run.
pub const SCENARIO_START: &str = "scenario_start";
/// Movement kind of the sentinel that closes a run.
pub const SCENARIO_END: &str = "scenario_end";

/// Entity and stock kind of the scenario marker.
pub const SCENARIO_KIND: &str = "Scenario";

const AFTER_HORIZON: &str = "after horizon";

/// The simulation kernel.
pub struct Environment {
    now: SimTime,
    start_at: SimTime,
    end_at: SimTime,
    queue: MovementPriorityQueue,
    stocks: Vec<Box<dyn Stock>>,
    movement_listeners: Vec<Box<dyn MovementListener>>,
    scheduling_listeners: Vec<Box<dyn SchedulingListener>>,
    completed: Vec<CompletedMovement>,
    ignored: Vec<IgnoredMovement>,
}

impl Environment {
    /// Create an environment whose clock starts at `start_at` and whose
    /// horizon is `start_at + run_for`, with the scenario sentinels
    /// already registered and seeded onto the queue.
    pub fn new(start_at: SimTime, run_for: Duration) -> Self {
        let end_at = start_at + run_for;
        let mut env = Self {
            now: start_at,
            start_at,
            end_at,
            queue: MovementPriorityQueue::new(),
            stocks: Vec::new(),
            movement_listeners: Vec::new(),
            scheduling_listeners: Vec::new(),
            completed: Vec::new(),
            ignored: Vec::new(),
        };

        let before = env.register_stock(Box::new(ThroughStock::new("BeforeScenario", SCENARIO_KIND)));
        let running = env.register_stock(Box::new(ThroughStock::new("RunningScenario", SCENARIO_KIND)));
        let after = env.register_stock(Box::new(SinkStock::new("AfterScenario", SCENARIO_KIND)));

        // Sentinel seeding bypasses add_to_schedule: scenario_start occurs
        // exactly at the current clock, which the public path forbids.
        let mut fx = Effects::new(start_at);
        env.stocks[before.index()]
            .add(Entity::new(SCENARIO_KIND, SCENARIO_KIND), &mut fx)
            .expect("sentinel stock accepts the scenario entity");
        env.queue
            .enqueue(Movement::new(SCENARIO_START, start_at, before, running))
            .expect("empty queue accepts the start sentinel");
        env.queue
            .enqueue(Movement::new(SCENARIO_END, end_at, running, after))
            .expect("queue accepts the end sentinel");

        env
    }

    // ── Registration ───────────────────────────────────────────────

    /// Add a stock to the arena, returning its id.
    pub fn register_stock(&mut self, stock: Box<dyn Stock>) -> StockId {
        let id = StockId(self.stocks.len());
        self.stocks.push(stock);
        id
    }

    /// Add a stock that needs to know its own id (for self-loop
    /// movements) before it is constructed.
    pub fn register_stock_with<F>(&mut self, build: F) -> StockId
    where
        F: FnOnce(StockId) -> Box<dyn Stock>,
    {
        let id = StockId(self.stocks.len());
        let stock = build(id);
        self.stocks.push(stock);
        id
    }

    pub fn add_movement_listener(&mut self, listener: Box<dyn MovementListener>) {
        self.movement_listeners.push(listener);
    }

    pub fn add_scheduling_listener(&mut self, listener: Box<dyn SchedulingListener>) {
        self.scheduling_listeners.push(listener);
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn current_movement_time(&self) -> SimTime {
        self.now
    }

    pub fn start_at(&self) -> SimTime {
        self.start_at
    }

    pub fn end_at(&self) -> SimTime {
        self.end_at
    }

    pub fn stock(&self, id: StockId) -> &dyn Stock {
        self.stocks[id.index()].as_ref()
    }

    /// All registered stocks, in registration order.
    pub fn stocks(&self) -> impl Iterator<Item = &dyn Stock> {
        self.stocks.iter().map(|s| s.as_ref())
    }

    pub fn completed(&self) -> &[CompletedMovement] {
        &self.completed
    }

    pub fn ignored(&self) -> &[IgnoredMovement] {
        &self.ignored
    }

    /// Number of movements still waiting on the queue.
    pub fn pending_movements(&self) -> usize {
        self.queue.len()
    }

    // ── Mutation ───────────────────────────────────────────────────

    /// Put an entity into a stock directly. Used during the setup phase
    /// and by models fabricating entities; after `run()` starts, state
    /// changes otherwise flow only through movements.
    pub fn add_entity(&mut self, id: StockId, entity: Entity) -> SimResult<()> {
        let mut fx = Effects::new(self.now);
        let result = self.stocks[id.index()]
            .add(entity, &mut fx)
            .map_err(|rejected| rejected.error);
        self.apply_effects(fx);
        result
    }

    /// Validate and enqueue a movement, notifying scheduling listeners on
    /// acceptance.
    ///
    /// A movement past the horizon is recorded as ignored and dropped,
    /// which is not an error for the caller. A movement not strictly
    /// after the current clock, or colliding with an already-occupied
    /// time, is returned to the caller.
    pub fn add_to_schedule(&mut self, movement: Movement) -> SimResult<()> {
        let at = movement.occurs_at();
        if at <= self.now {
            return Err(SimError::ScheduledInPast { at, now: self.now });
        }
        if at > self.end_at {
            debug!(kind = %movement.kind(), at = %at, "movement scheduled past the horizon");
            self.ignored.push(IgnoredMovement {
                movement,
                reason: AFTER_HORIZON.to_string(),
            });
            return Ok(());
        }
        self.queue.enqueue(movement.clone())?;
        for listener in &mut self.scheduling_listeners {
            listener.on_schedule(&movement);
        }
        Ok(())
    }

    /// Schedule a movement, bumping it forward 1 ns at a time past any
    /// occupied slots. Returns the time actually accepted (or at which
    /// the movement fell past the horizon).
    pub fn schedule_staggered(&mut self, movement: Movement) -> SimResult<SimTime> {
        let mut movement = movement;
        loop {
            match self.add_to_schedule(movement.clone()) {
                Ok(()) => return Ok(movement.occurs_at()),
                Err(SimError::DuplicateTime { at }) => {
                    movement = movement.with_occurs_at(at + Duration::from_nanos(1));
                }
                Err(err) => return Err(err),
            }
        }
    }

    // ── The run loop ───────────────────────────────────────────────

    /// Drain the queue in strict time order until the end sentinel
    /// executes or the queue runs dry.
    pub fn run(&mut self) -> SimResult<()> {
        info!(start = %self.start_at, end = %self.end_at, "scenario starting");

        loop {
            let (movement, closed) = self.queue.dequeue()?;
            let Some(mut movement) = movement else {
                if !closed {
                    debug!("queue drained before the end sentinel; stopping");
                }
                break;
            };

            let at = movement.occurs_at();
            if at > self.end_at {
                self.ignored.push(IgnoredMovement {
                    movement,
                    reason: AFTER_HORIZON.to_string(),
                });
                continue;
            }
            if at < self.now {
                return Err(SimError::ClockRegression { at, now: self.now });
            }
            self.now = at;

            let mut fx = Effects::new(self.now);
            let entity = match self.stocks[movement.from().index()].remove(&mut fx) {
                Ok(entity) => entity,
                Err(err) => {
                    self.apply_effects(fx);
                    self.ignored.push(IgnoredMovement {
                        movement,
                        reason: err.ignore_reason(),
                    });
                    continue;
                }
            };

            let entity_ref = EntityRef {
                name: entity.name().clone(),
                kind: entity.kind().clone(),
            };

            if let Err(rejected) = self.stocks[movement.to().index()].add(entity, &mut fx) {
                let mut reason = format!("add returned error: {}", rejected.error);
                let mut restore_fx = Effects::new(self.now);
                if let Err(second) = self.stocks[movement.from().index()]
                    .add(rejected.entity, &mut restore_fx)
                {
                    // Best effort failed; the entity is dropped.
                    reason.push_str(&format!("; restore failed: {}", second.error));
                }
                self.apply_effects(fx);
                self.apply_effects(restore_fx);
                self.ignored.push(IgnoredMovement { movement, reason });
                continue;
            }
            self.apply_effects(fx);

            self.dispatch_movement_listeners(&mut movement);

            let is_end = movement.kind().as_str() == SCENARIO_END;
            self.completed.push(CompletedMovement {
                movement,
                entity: Some(entity_ref),
            });

            if is_end {
                self.queue.close();
                break;
            }
        }

        info!(
            completed = self.completed.len(),
            ignored = self.ignored.len(),
            "scenario finished"
        );
        Ok(())
    }

    fn dispatch_movement_listeners(&mut self, movement: &mut Movement) {
        // Listeners receive the environment by parameter, so they are
        // taken out of it for the duration of the dispatch. Listeners
        // registered during dispatch are appended afterwards.
        let mut listeners = mem::take(&mut self.movement_listeners);
        for listener in listeners.iter_mut() {
            if let Err(err) = listener.on_movement(self, movement) {
                movement.add_note(format!("listener error: {err}"));
            }
        }
        let registered_during_dispatch = mem::take(&mut self.movement_listeners);
        listeners.extend(registered_during_dispatch);
        self.movement_listeners = listeners;
    }

    /// Apply the deferred effects of a stock mutation: scheduled
    /// movements go through the staggered scheduling path, deposits run
    /// the target stock's `add` (whose own effects join the worklist).
    fn apply_effects(&mut self, fx: Effects) {
        let mut scheduled = fx.scheduled;
        let mut deposits: VecDeque<_> = fx.deposits.into();

        loop {
            for movement in scheduled.drain(..) {
                if let Err(err) = self.schedule_staggered(movement) {
                    debug!(error = %err, "follow-up movement dropped");
                }
            }
            let Some((id, entity)) = deposits.pop_front() else {
                break;
            };
            let mut fx = Effects::new(self.now);
            if let Err(rejected) = self.stocks[id.index()].add(entity, &mut fx) {
                // A failed hand-off between sibling stocks is dropped,
                // not propagated.
                debug!(
                    stock = %self.stocks[id.index()].name(),
                    error = %rejected.error,
                    "deposit rejected; entity dropped"
                );
            }
            scheduled = fx.scheduled;
            deposits.extend(fx.deposits);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::entity::EntityKind;

    fn env_for(run_secs: u64) -> Environment {
        Environment::new(SimTime::UNIX_EPOCH, Duration::from_secs(run_secs))
    }

    struct RecordingListener {
        seen: Rc<RefCell<Vec<String>>>,
    }

    impl MovementListener for RecordingListener {
        fn on_movement(&mut self, _env: &mut Environment, movement: &mut Movement) -> SimResult<()> {
            self.seen.borrow_mut().push(movement.kind().to_string());
            Ok(())
        }
    }

    struct RecordingScheduleListener {
        seen: Rc<RefCell<Vec<SimTime>>>,
    }

    impl SchedulingListener for RecordingScheduleListener {
        fn on_schedule(&mut self, movement: &Movement) {
            self.seen.borrow_mut().push(movement.occurs_at());
        }
    }

    #[test]
    fn empty_run_completes_only_the_sentinels() {
        let mut env = env_for(600);
        env.run().unwrap();

        let kinds: Vec<&str> = env
            .completed()
            .iter()
            .map(|c| c.movement.kind().as_str())
            .collect();
        assert_eq!(kinds, vec![SCENARIO_START, SCENARIO_END]);
        assert!(env.ignored().is_empty());

        // The sentinel stocks and the scenario entity are all there is.
        assert_eq!(env.stocks().count(), 3);
        let entity = env.completed()[0].entity.as_ref().unwrap();
        assert_eq!(entity.kind, EntityKind::from(SCENARIO_KIND));
    }

    #[test]
    fn duplicate_time_is_rejected_and_run_still_completes() {
        let mut env = env_for(600);
        let from = env.register_stock(Box::new(ThroughStock::new("A", "Widget")));
        let to = env.register_stock(Box::new(ThroughStock::new("B", "Widget")));
        env.add_entity(from, Entity::new("widget-1", "Widget")).unwrap();

        let at = SimTime::UNIX_EPOCH + Duration::from_secs(5);
        env.add_to_schedule(Movement::new("first", at, from, to)).unwrap();
        let err = env
            .add_to_schedule(Movement::new("second", at, from, to))
            .unwrap_err();
        assert_eq!(err, SimError::DuplicateTime { at });

        env.run().unwrap();
        let kinds: Vec<&str> = env
            .completed()
            .iter()
            .map(|c| c.movement.kind().as_str())
            .collect();
        assert_eq!(kinds, vec![SCENARIO_START, "first", SCENARIO_END]);
    }

    #[test]
    fn dequeued_times_are_strictly_increasing() {
        let mut env = env_for(60);
        let from = env.register_stock(Box::new(ThroughStock::new("A", "Widget")));
        let to = env.register_stock(Box::new(ThroughStock::new("B", "Widget")));
        for i in 0..5 {
            env.add_entity(from, Entity::new(format!("widget-{i}"), "Widget"))
                .unwrap();
        }
        for i in [40, 10, 30, 20, 50] {
            let at = SimTime::UNIX_EPOCH + Duration::from_secs(i);
            env.add_to_schedule(Movement::new("shuffle", at, from, to)).unwrap();
        }

        env.run().unwrap();

        let times: Vec<i64> = env
            .completed()
            .iter()
            .map(|c| c.movement.occurs_at().nanos())
            .collect();
        let mut sorted = times.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(times, sorted);
    }

    #[test]
    fn every_movement_lands_in_completed_or_ignored() {
        let mut env = env_for(60);
        let from = env.register_stock(Box::new(ThroughStock::new("A", "Widget")));
        let to = env.register_stock(Box::new(ThroughStock::new("B", "Widget")));
        // Only two entities for three movements: one will find A empty.
        env.add_entity(from, Entity::new("widget-1", "Widget")).unwrap();
        env.add_entity(from, Entity::new("widget-2", "Widget")).unwrap();
        for i in [10, 20, 30] {
            let at = SimTime::UNIX_EPOCH + Duration::from_secs(i);
            env.add_to_schedule(Movement::new("drain", at, from, to)).unwrap();
        }

        env.run().unwrap();

        // 2 sentinels + 3 drains, disjointly split.
        assert_eq!(env.completed().len() + env.ignored().len(), 5);
        assert_eq!(env.ignored().len(), 1);
        assert_eq!(env.ignored()[0].reason, "from-stock empty");
    }

    #[test]
    fn scheduling_past_horizon_records_ignored() {
        let mut env = env_for(10);
        let from = env.register_stock(Box::new(ThroughStock::new("A", "Widget")));
        let to = env.register_stock(Box::new(ThroughStock::new("B", "Widget")));

        let at = SimTime::UNIX_EPOCH + Duration::from_secs(11);
        env.add_to_schedule(Movement::new("late", at, from, to)).unwrap();

        assert_eq!(env.ignored().len(), 1);
        assert_eq!(env.ignored()[0].reason, "after horizon");
        env.run().unwrap();
        assert_eq!(env.ignored().len(), 1);
    }

    #[test]
    fn scheduling_at_horizon_collides_with_end_sentinel() {
        let mut env = env_for(10);
        let from = env.register_stock(Box::new(ThroughStock::new("A", "Widget")));
        let to = env.register_stock(Box::new(ThroughStock::new("B", "Widget")));

        let err = env
            .add_to_schedule(Movement::new("edge", env.end_at(), from, to))
            .unwrap_err();
        assert!(matches!(err, SimError::DuplicateTime { .. }));
    }

    #[test]
    fn scheduling_not_after_now_is_an_error() {
        let mut env = env_for(10);
        let from = env.register_stock(Box::new(ThroughStock::new("A", "Widget")));
        let to = env.register_stock(Box::new(ThroughStock::new("B", "Widget")));

        let err = env
            .add_to_schedule(Movement::new("now", env.current_movement_time(), from, to))
            .unwrap_err();
        assert!(matches!(err, SimError::ScheduledInPast { .. }));
    }

    #[test]
    fn add_error_restores_the_entity_to_the_from_stock() {
        let mut env = env_for(60);
        let from = env.register_stock(Box::new(ThroughStock::new("A", "Widget")));
        // Destination stocks a different kind, so the add is rejected.
        let to = env.register_stock(Box::new(ThroughStock::new("B", "Gadget")));
        env.add_entity(from, Entity::new("widget-1", "Widget")).unwrap();

        let at = SimTime::UNIX_EPOCH + Duration::from_secs(5);
        env.add_to_schedule(Movement::new("mismatch", at, from, to)).unwrap();
        env.run().unwrap();

        assert_eq!(env.ignored().len(), 1);
        assert!(env.ignored()[0].reason.starts_with("add returned error:"));
        // Put back where it came from.
        assert_eq!(env.stock(from).count(), 1);
        assert_eq!(env.stock(to).count(), 0);
    }

    #[test]
    fn completed_entity_kind_matches_destination_kind() {
        let mut env = env_for(60);
        let from = env.register_stock(Box::new(ThroughStock::new("A", "Widget")));
        let to = env.register_stock(Box::new(ThroughStock::new("B", "Widget")));
        env.add_entity(from, Entity::new("widget-1", "Widget")).unwrap();

        let at = SimTime::UNIX_EPOCH + Duration::from_secs(5);
        env.add_to_schedule(Movement::new("move", at, from, to)).unwrap();
        env.run().unwrap();

        for completed in env.completed() {
            let entity = completed.entity.as_ref().unwrap();
            let destination = env.stock(completed.movement.to());
            assert_eq!(&entity.kind, destination.kind_stocked());
        }
    }

    #[test]
    fn movement_listeners_run_in_registration_order() {
        let mut env = env_for(10);
        let seen = Rc::new(RefCell::new(Vec::new()));
        env.add_movement_listener(Box::new(RecordingListener { seen: seen.clone() }));
        env.add_movement_listener(Box::new(RecordingListener { seen: seen.clone() }));

        env.run().unwrap();

        // Both listeners see both sentinels, first listener first.
        assert_eq!(
            &*seen.borrow(),
            &[SCENARIO_START, SCENARIO_START, SCENARIO_END, SCENARIO_END]
        );
    }

    #[test]
    fn listener_error_is_noted_and_run_continues() {
        struct FailingListener;
        impl MovementListener for FailingListener {
            fn on_movement(&mut self, env: &mut Environment, _m: &mut Movement) -> SimResult<()> {
                Err(SimError::StockEmpty {
                    stock: env.stock(StockId(0)).name().clone(),
                })
            }
        }

        let mut env = env_for(10);
        env.add_movement_listener(Box::new(FailingListener));
        env.run().unwrap();

        assert_eq!(env.completed().len(), 2);
        assert!(env.completed()[0]
            .movement
            .notes()
            .iter()
            .any(|n| n.starts_with("listener error:")));
    }

    #[test]
    fn listener_may_tail_schedule_follow_ups() {
        struct TailScheduler {
            from: StockId,
            to: StockId,
            done: bool,
        }
        impl MovementListener for TailScheduler {
            fn on_movement(&mut self, env: &mut Environment, m: &mut Movement) -> SimResult<()> {
                if m.kind().as_str() == SCENARIO_START && !self.done {
                    self.done = true;
                    let at = env.current_movement_time() + Duration::from_secs(1);
                    env.add_to_schedule(Movement::new("follow-up", at, self.from, self.to))?;
                }
                Ok(())
            }
        }

        let mut env = env_for(10);
        let from = env.register_stock(Box::new(ThroughStock::new("A", "Widget")));
        let to = env.register_stock(Box::new(ThroughStock::new("B", "Widget")));
        env.add_entity(from, Entity::new("widget-1", "Widget")).unwrap();
        env.add_movement_listener(Box::new(TailScheduler { from, to, done: false }));

        env.run().unwrap();

        let kinds: Vec<&str> = env
            .completed()
            .iter()
            .map(|c| c.movement.kind().as_str())
            .collect();
        assert_eq!(kinds, vec![SCENARIO_START, "follow-up", SCENARIO_END]);
    }

    #[test]
    fn scheduling_listeners_are_notified_synchronously() {
        let mut env = env_for(60);
        let from = env.register_stock(Box::new(ThroughStock::new("A", "Widget")));
        let to = env.register_stock(Box::new(ThroughStock::new("B", "Widget")));
        let seen = Rc::new(RefCell::new(Vec::new()));
        env.add_scheduling_listener(Box::new(RecordingScheduleListener { seen: seen.clone() }));

        let at = SimTime::UNIX_EPOCH + Duration::from_secs(5);
        env.add_to_schedule(Movement::new("watched", at, from, to)).unwrap();

        assert_eq!(&*seen.borrow(), &[at]);
    }

    #[test]
    fn schedule_staggered_walks_past_occupied_slots() {
        let mut env = env_for(60);
        let from = env.register_stock(Box::new(ThroughStock::new("A", "Widget")));
        let to = env.register_stock(Box::new(ThroughStock::new("B", "Widget")));

        let at = SimTime::UNIX_EPOCH + Duration::from_secs(5);
        env.add_to_schedule(Movement::new("first", at, from, to)).unwrap();

        let accepted = env
            .schedule_staggered(Movement::new("second", at, from, to))
            .unwrap();
        assert_eq!(accepted, at + Duration::from_nanos(1));
    }
}
