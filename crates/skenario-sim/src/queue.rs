//! Movement priority queue.
//!
//! A min-heap keyed on `occurs_at` with an auxiliary set of occupied
//! times. The strict no-two-movements-at-the-same-time rule is what makes
//! execution order total and deterministic without any secondary
//! tie-break key.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use sken_core::SimTime;

use crate::error::{SimError, SimResult};
use crate::movement::Movement;

/// Heap entry ordered by `occurs_at` alone. Times are unique by
/// construction, so no further ordering is needed.
struct QueuedMovement(Movement);

impl PartialEq for QueuedMovement {
    fn eq(&self, other: &Self) -> bool {
        self.0.occurs_at() == other.0.occurs_at()
    }
}

impl Eq for QueuedMovement {}

impl PartialOrd for QueuedMovement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMovement {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.occurs_at().cmp(&other.0.occurs_at())
    }
}

/// Time-ordered queue of pending movements.
pub struct MovementPriorityQueue {
    heap: BinaryHeap<Reverse<QueuedMovement>>,
    occupied: HashSet<SimTime>,
    closed: bool,
}

impl MovementPriorityQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            occupied: HashSet::new(),
            closed: false,
        }
    }

    /// Insert a movement, rejecting it if its time is already taken.
    pub fn enqueue(&mut self, movement: Movement) -> SimResult<()> {
        let at = movement.occurs_at();
        if !self.occupied.insert(at) {
            return Err(SimError::DuplicateTime { at });
        }
        self.heap.push(Reverse(QueuedMovement(movement)));
        Ok(())
    }

    /// Pop the earliest movement. Returns `(None, true)` once the queue
    /// has been closed and drained; `(None, false)` means the queue is
    /// empty but still open, which is terminal for a single-threaded
    /// driver.
    pub fn dequeue(&mut self) -> SimResult<(Option<Movement>, bool)> {
        match self.heap.pop() {
            Some(Reverse(QueuedMovement(movement))) => {
                if !self.occupied.remove(&movement.occurs_at()) {
                    return Err(SimError::QueueCorrupted(format!(
                        "dequeued time {} was not in the occupied set",
                        movement.occurs_at()
                    )));
                }
                Ok((Some(movement), self.closed))
            }
            None => Ok((None, self.closed)),
        }
    }

    /// Mark the queue closed. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl Default for MovementPriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::StockId;

    fn movement_at(nanos: i64) -> Movement {
        Movement::new("test", SimTime::from_nanos(nanos), StockId(0), StockId(1))
    }

    #[test]
    fn enqueue_accepts_distinct_times() {
        let mut queue = MovementPriorityQueue::new();
        queue.enqueue(movement_at(100)).unwrap();
        queue.enqueue(movement_at(200)).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn enqueue_rejects_duplicate_time() {
        let mut queue = MovementPriorityQueue::new();
        queue.enqueue(movement_at(100)).unwrap();

        let err = queue.enqueue(movement_at(100)).unwrap_err();
        assert_eq!(
            err,
            SimError::DuplicateTime {
                at: SimTime::from_nanos(100)
            }
        );
    }

    #[test]
    fn dequeue_returns_movements_in_time_order() {
        let mut queue = MovementPriorityQueue::new();
        queue.enqueue(movement_at(300)).unwrap();
        queue.enqueue(movement_at(100)).unwrap();
        queue.enqueue(movement_at(200)).unwrap();

        let times: Vec<i64> = std::iter::from_fn(|| {
            queue.dequeue().unwrap().0.map(|m| m.occurs_at().nanos())
        })
        .collect();
        assert_eq!(times, vec![100, 200, 300]);
    }

    #[test]
    fn dequeue_time_is_freed_for_reuse() {
        let mut queue = MovementPriorityQueue::new();
        queue.enqueue(movement_at(100)).unwrap();
        queue.dequeue().unwrap();

        // The slot opens up again once the movement has been dequeued.
        queue.enqueue(movement_at(100)).unwrap();
    }

    #[test]
    fn dequeue_reports_closed_flag() {
        let mut queue = MovementPriorityQueue::new();
        assert!(!queue.is_closed());

        let (movement, closed) = queue.dequeue().unwrap();
        assert!(movement.is_none());
        assert!(!closed);

        queue.close();
        queue.close(); // idempotent

        let (movement, closed) = queue.dequeue().unwrap();
        assert!(movement.is_none());
        assert!(closed);
    }
}
