//! Per-replica request processing.
//!
//! Each replica owns a `RequestsProcessing` stock. Adding a request
//! consumes CPU time in slices of at most 200 ms: the stock charges one
//! slice, schedules an `interrupt_request` self-loop for when the slice
//! ends, and the interrupt re-adds the request for its next slice. A
//! request with no CPU time left is exhausted: it is parked in the
//! replica's `RequestsExhausted` stock and a `complete_request` movement
//! carries it into the completion sink 2 ns later.

use std::collections::VecDeque;
use std::time::Duration;

use skenario_sim::{
    check_kind, Effects, Entity, EntityKind, Environment, Movement, Rejected, SimError, Stock,
    StockId, StockName,
};

use crate::REQUEST_KIND;

/// Movement kind for a CPU slice ending.
pub const INTERRUPT_REQUEST: &str = "interrupt_request";
/// Movement kind for an exhausted request reaching the completion sink.
pub const COMPLETE_REQUEST: &str = "complete_request";

/// Longest CPU slice a request may consume before being interrupted.
pub const INTERRUPT_SLICE: Duration = Duration::from_millis(200);

/// Register the processing and exhausted stocks for one replica.
/// Returns the processing stock's id; movements self-loop on it while a
/// request still owes CPU time.
pub fn register_replica_processing(
    env: &mut Environment,
    replica_number: u64,
    completed: StockId,
    replica_max_rps_capacity: i64,
) -> StockId {
    let exhausted = env.register_stock(Box::new(skenario_sim::ThroughStock::new(
        format!("RequestsExhausted [{replica_number}]"),
        REQUEST_KIND,
    )));
    env.register_stock_with(|id| {
        Box::new(RequestsProcessingStock {
            id,
            name: StockName::from(format!("RequestsProcessing [{replica_number}]")),
            kind_stocked: EntityKind::from(REQUEST_KIND),
            delegate: VecDeque::new(),
            exhausted,
            completed,
            replica_max_rps_capacity,
        })
    })
}

/// A through stock that charges CPU time on every add.
pub struct RequestsProcessingStock {
    id: StockId,
    name: StockName,
    kind_stocked: EntityKind,
    delegate: VecDeque<Entity>,
    exhausted: StockId,
    completed: StockId,
    /// Reserved; accepted but not yet consulted.
    #[allow(dead_code)]
    replica_max_rps_capacity: i64,
}

impl Stock for RequestsProcessingStock {
    fn name(&self) -> &StockName {
        &self.name
    }

    fn kind_stocked(&self) -> &EntityKind {
        &self.kind_stocked
    }

    fn count(&self) -> u64 {
        self.delegate.len() as u64
    }

    fn entities(&self) -> Vec<&Entity> {
        self.delegate.iter().collect()
    }

    fn add(&mut self, entity: Entity, fx: &mut Effects) -> Result<(), Rejected> {
        let mut entity = check_kind(&self.name, &self.kind_stocked, entity)?;

        let remaining = entity
            .usage()
            .map(|usage| usage.remaining())
            .unwrap_or(Duration::ZERO);

        if remaining > Duration::ZERO {
            let slice = remaining.min(INTERRUPT_SLICE);
            if let Some(usage) = entity.usage_mut() {
                usage.consume(slice);
            }
            fx.schedule(Movement::new(
                INTERRUPT_REQUEST,
                fx.now() + slice,
                self.id,
                self.id,
            ));
            self.delegate.push_back(entity);
            return Ok(());
        }

        // Exhausted: one last interrupt fires 1 ns out, and the request
        // leaves through the exhausted stock 2 ns out.
        fx.schedule(Movement::new(
            INTERRUPT_REQUEST,
            fx.now() + Duration::from_nanos(1),
            self.id,
            self.id,
        ));
        fx.schedule(Movement::new(
            COMPLETE_REQUEST,
            fx.now() + Duration::from_nanos(2),
            self.exhausted,
            self.completed,
        ));
        fx.deposit(self.exhausted, entity);
        Ok(())
    }

    fn remove(&mut self, _fx: &mut Effects) -> Result<Entity, SimError> {
        self.delegate.pop_front().ok_or(SimError::StockEmpty {
            stock: self.name.clone(),
        })
    }
}
