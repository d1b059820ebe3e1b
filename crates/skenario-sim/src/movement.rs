//! Movements — scheduled transfers of entities between stocks.
//!
//! A movement is the only object that causes a state change. It carries
//! a kind tag, the virtual time at which it occurs, the source and
//! destination stock ids, and free-form notes that listeners may append
//! during execution.

use std::fmt;

use serde::{Deserialize, Serialize};
use sken_core::SimTime;

use crate::entity::{EntityKind, EntityName};
use crate::environment::Environment;
use crate::error::SimResult;
use crate::stock::StockId;

/// Tag describing what a movement does (`launching -> active`,
/// `interrupt_request`, `scenario_end`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementKind(String);

impl MovementKind {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MovementKind {
    fn from(value: &str) -> Self {
        MovementKind(value.to_string())
    }
}

impl From<String> for MovementKind {
    fn from(value: String) -> Self {
        MovementKind(value)
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A scheduled transfer of (at most) one entity from one stock to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    kind: MovementKind,
    occurs_at: SimTime,
    from: StockId,
    to: StockId,
    notes: Vec<String>,
}

impl Movement {
    pub fn new(kind: impl Into<MovementKind>, occurs_at: SimTime, from: StockId, to: StockId) -> Self {
        Self {
            kind: kind.into(),
            occurs_at,
            from,
            to,
            notes: Vec::new(),
        }
    }

    pub fn kind(&self) -> &MovementKind {
        &self.kind
    }

    pub fn occurs_at(&self) -> SimTime {
        self.occurs_at
    }

    pub fn from(&self) -> StockId {
        self.from
    }

    pub fn to(&self) -> StockId {
        self.to
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn add_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Same movement re-targeted at a different time. Used by schedulers
    /// that bump a movement by 1 ns after a duplicate-time rejection.
    pub fn with_occurs_at(mut self, occurs_at: SimTime) -> Self {
        self.occurs_at = occurs_at;
        self
    }
}

/// Snapshot of the entity a completed movement carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub name: EntityName,
    pub kind: EntityKind,
}

/// A movement that executed: the original plus the moved entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedMovement {
    pub movement: Movement,
    pub entity: Option<EntityRef>,
}

/// A movement that was recorded but never executed, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgnoredMovement {
    pub movement: Movement,
    pub reason: String,
}

/// Observer invoked from the run loop after a movement executes.
///
/// Listeners run in registration order, single-threaded. A listener may
/// schedule follow-up movements through the environment; they take effect
/// on subsequent dequeues, never the current one. A listener error is
/// captured into the movement's notes and does not abort the run.
pub trait MovementListener {
    fn on_movement(&mut self, env: &mut Environment, movement: &mut Movement) -> SimResult<()>;
}

/// Observer invoked synchronously when a movement is accepted onto the
/// schedule.
pub trait SchedulingListener {
    fn on_schedule(&mut self, movement: &Movement);
}
