//! Request dispatch — routes buffered requests onto replica processing
//! stocks.
//!
//! A movement listener watches for requests arriving in the buffer and
//! for replicas becoming active. Whenever there is both a backlog and at
//! least one active replica, it schedules `send_request` movements from
//! the buffer to a processing stock chosen round-robin across the active
//! replicas. Requests that arrive while no replica is active simply wait
//! in the buffer.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use skenario_sim::{Environment, Movement, MovementListener, SimResult, StockId};
use tracing::debug;

use crate::cluster::{ClusterModel, LAUNCHING_TO_ACTIVE};
use crate::traffic::ARRIVE_AT_BUFFER;

/// Movement kind for a buffered request heading to a replica.
pub const SEND_REQUEST: &str = "send_request";

/// Round-robin selector over a changing pool size.
struct RoundRobin {
    counter: usize,
}

impl RoundRobin {
    fn new() -> Self {
        Self { counter: 0 }
    }

    fn next(&mut self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let index = self.counter % count;
        self.counter += 1;
        Some(index)
    }
}

/// Listener that keeps the buffer draining toward active replicas.
pub struct RequestDispatcher {
    cluster: Rc<RefCell<ClusterModel>>,
    buffer: StockId,
    balancer: RoundRobin,
    /// Sends scheduled but not yet executed, so the backlog is not
    /// double-dispatched.
    pending_sends: u64,
}

impl RequestDispatcher {
    pub fn new(cluster: Rc<RefCell<ClusterModel>>, buffer: StockId) -> Self {
        Self {
            cluster,
            buffer,
            balancer: RoundRobin::new(),
            pending_sends: 0,
        }
    }

    fn dispatch_backlog(&mut self, env: &mut Environment) -> SimResult<()> {
        let targets = self.cluster.borrow().active_processing(env);
        if targets.is_empty() {
            return Ok(());
        }

        let backlog = env
            .stock(self.buffer)
            .count()
            .saturating_sub(self.pending_sends);
        if backlog == 0 {
            return Ok(());
        }

        let mut at = env.current_movement_time() + Duration::from_nanos(1);
        for _ in 0..backlog {
            let index = self
                .balancer
                .next(targets.len())
                .expect("targets is non-empty");
            let movement = Movement::new(SEND_REQUEST, at, self.buffer, targets[index]);
            at = env.schedule_staggered(movement)? + Duration::from_nanos(1);
            self.pending_sends += 1;
        }
        debug!(dispatched = backlog, replicas = targets.len(), "backlog dispatched");
        Ok(())
    }
}

impl MovementListener for RequestDispatcher {
    fn on_movement(&mut self, env: &mut Environment, movement: &mut Movement) -> SimResult<()> {
        match movement.kind().as_str() {
            SEND_REQUEST if movement.from() == self.buffer => {
                self.pending_sends = self.pending_sends.saturating_sub(1);
                Ok(())
            }
            ARRIVE_AT_BUFFER | LAUNCHING_TO_ACTIVE => self.dispatch_backlog(env),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sken_core::{ClusterConfig, SimTime};
    use skenario_sim::{SinkStock, ThroughStock};

    use crate::traffic::TrafficSourceStock;
    use crate::REQUEST_KIND;

    fn harness(run_secs: u64) -> (Environment, Rc<RefCell<ClusterModel>>, StockId, StockId) {
        let mut env = Environment::new(SimTime::UNIX_EPOCH, Duration::from_secs(run_secs));
        let sink = env.register_stock(Box::new(SinkStock::new("RequestsCompleted", REQUEST_KIND)));
        let buffer = env.register_stock(Box::new(ThroughStock::new("RequestsBuffer", REQUEST_KIND)));
        let cluster = Rc::new(RefCell::new(ClusterModel::new(
            &mut env,
            ClusterConfig {
                launch_delay: Duration::from_secs(1),
                terminate_delay: Duration::from_secs(1),
                number_of_requests: 0,
            },
            sink,
        )));
        (env, cluster, buffer, sink)
    }

    #[test]
    fn arrivals_are_routed_once_a_replica_is_active() {
        let (mut env, cluster, buffer, sink) = harness(60);
        cluster.borrow_mut().set_desired(&mut env, 1).unwrap();

        let source = env.register_stock(Box::new(TrafficSourceStock::new(Duration::from_millis(100))));
        for i in 0..5u64 {
            let at = SimTime::UNIX_EPOCH + Duration::from_secs(5 + i);
            env.add_to_schedule(Movement::new(ARRIVE_AT_BUFFER, at, source, buffer))
                .unwrap();
        }

        env.add_movement_listener(Box::new(RequestDispatcher::new(cluster.clone(), buffer)));
        env.run().unwrap();

        // Every request reached the completion sink.
        assert_eq!(env.stock(sink).count(), 5);
        assert_eq!(env.stock(buffer).count(), 0);

        let sends = env
            .completed()
            .iter()
            .filter(|c| c.movement.kind().as_str() == SEND_REQUEST)
            .count();
        assert_eq!(sends, 5);
    }

    #[test]
    fn requests_wait_in_the_buffer_until_activation() {
        let (mut env, cluster, buffer, sink) = harness(60);

        // Arrival at 2 s, replica asked for at 10 s (via a listener), so
        // the buffer holds the request for 8+ seconds.
        struct LateScaler {
            cluster: Rc<RefCell<ClusterModel>>,
            scaled: bool,
        }
        impl MovementListener for LateScaler {
            fn on_movement(&mut self, env: &mut Environment, m: &mut Movement) -> SimResult<()> {
                if !self.scaled && m.occurs_at() >= SimTime::UNIX_EPOCH + Duration::from_secs(10) {
                    self.scaled = true;
                    self.cluster.borrow_mut().set_desired(env, 1)?;
                }
                Ok(())
            }
        }

        let source = env.register_stock(Box::new(TrafficSourceStock::new(Duration::from_millis(50))));
        let arrival = Movement::new(
            ARRIVE_AT_BUFFER,
            SimTime::UNIX_EPOCH + Duration::from_secs(2),
            source,
            buffer,
        );
        env.add_to_schedule(arrival).unwrap();
        // A marker movement at 10 s gives the late scaler something to react to.
        let marker = Movement::new(
            ARRIVE_AT_BUFFER,
            SimTime::UNIX_EPOCH + Duration::from_secs(10),
            source,
            buffer,
        );
        env.add_to_schedule(marker).unwrap();

        env.add_movement_listener(Box::new(RequestDispatcher::new(cluster.clone(), buffer)));
        env.add_movement_listener(Box::new(LateScaler {
            cluster: cluster.clone(),
            scaled: false,
        }));

        env.run().unwrap();

        // Both requests drained after the replica came up at ~11 s.
        assert_eq!(env.stock(sink).count(), 2);

        let first_send = env
            .completed()
            .iter()
            .find(|c| c.movement.kind().as_str() == SEND_REQUEST)
            .unwrap();
        assert!(first_send.movement.occurs_at() > SimTime::UNIX_EPOCH + Duration::from_secs(11));
    }

    #[test]
    fn round_robin_spreads_requests_across_replicas() {
        let (mut env, cluster, buffer, _sink) = harness(60);
        cluster.borrow_mut().set_desired(&mut env, 2).unwrap();

        let source = env.register_stock(Box::new(TrafficSourceStock::new(Duration::from_millis(50))));
        for i in 0..4u64 {
            let at = SimTime::UNIX_EPOCH + Duration::from_secs(5 + i);
            env.add_to_schedule(Movement::new(ARRIVE_AT_BUFFER, at, source, buffer))
                .unwrap();
        }

        env.add_movement_listener(Box::new(RequestDispatcher::new(cluster.clone(), buffer)));
        env.run().unwrap();

        let mut send_targets: Vec<String> = env
            .completed()
            .iter()
            .filter(|c| c.movement.kind().as_str() == SEND_REQUEST)
            .map(|c| env.stock(c.movement.to()).name().to_string())
            .collect();
        assert_eq!(send_targets.len(), 4);
        send_targets.sort();
        send_targets.dedup();
        // Both replicas saw traffic.
        assert_eq!(send_targets.len(), 2);
    }
}
