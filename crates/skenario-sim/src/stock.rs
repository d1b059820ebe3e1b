//! Stocks — named, kinded containers of entities.
//!
//! Three shapes share one trait: *through* stocks are ordinary FIFOs,
//! *source* stocks fabricate entities on `remove` and reject `add`, and
//! *sink* stocks accept entities forever and reject `remove`. A stock
//! rejects entities whose kind differs from its `kind_stocked`.
//!
//! Stocks are owned by the environment's arena and addressed by opaque
//! `StockId`s; movements carry ids, never references. Stocks that need
//! to schedule follow-up movements or deposit entities into sibling
//! stocks do so through the [`Effects`] buffer passed to `add`/`remove`,
//! and the environment applies those effects after the call returns.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use sken_core::SimTime;

use crate::entity::{Entity, EntityKind};
use crate::error::SimError;
use crate::movement::Movement;

/// Opaque index of a stock in the environment's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockId(pub(crate) usize);

impl StockId {
    pub(crate) fn index(&self) -> usize {
        self.0
    }
}

/// Display name of a stock (`ReplicasActive`, `TrafficSource`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockName(String);

impl From<&str> for StockName {
    fn from(value: &str) -> Self {
        StockName(value.to_string())
    }
}

impl From<String> for StockName {
    fn from(value: String) -> Self {
        StockName(value)
    }
}

impl fmt::Display for StockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deferred side effects of a stock mutation.
///
/// Collected while a stock's `add`/`remove` runs and applied by the
/// environment afterwards, so stocks never need a reference back to the
/// environment that owns them.
pub struct Effects {
    now: SimTime,
    pub(crate) scheduled: Vec<Movement>,
    pub(crate) deposits: Vec<(StockId, Entity)>,
}

impl Effects {
    pub fn new(now: SimTime) -> Self {
        Self {
            now,
            scheduled: Vec::new(),
            deposits: Vec::new(),
        }
    }

    /// The current movement time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedule a follow-up movement. Applied through the environment's
    /// normal scheduling path once the stock call returns.
    pub fn schedule(&mut self, movement: Movement) {
        self.scheduled.push(movement);
    }

    /// Hand an entity to another stock once the current call returns.
    pub fn deposit(&mut self, stock: StockId, entity: Entity) {
        self.deposits.push((stock, entity));
    }
}

/// An `add` rejection carrying the entity back so the caller can restore
/// it to where it came from.
#[derive(Debug)]
pub struct Rejected {
    pub entity: Entity,
    pub error: SimError,
}

/// Common contract for all stock shapes.
pub trait Stock {
    fn name(&self) -> &StockName;

    fn kind_stocked(&self) -> &EntityKind;

    /// Number of entities currently held. Sources report 0.
    fn count(&self) -> u64;

    /// View of the held entities. Sources report an empty view.
    fn entities(&self) -> Vec<&Entity>;

    fn add(&mut self, entity: Entity, fx: &mut Effects) -> Result<(), Rejected>;

    fn remove(&mut self, fx: &mut Effects) -> Result<Entity, SimError>;
}

/// Checks an incoming entity against the stock's kind, building the
/// rejection if it does not match. Custom stock shapes in model crates
/// use this for the same kind discipline as the built-in shapes.
pub fn check_kind(
    name: &StockName,
    kind_stocked: &EntityKind,
    entity: Entity,
) -> Result<Entity, Rejected> {
    if entity.kind() != kind_stocked {
        let error = SimError::KindMismatch {
            stock: name.clone(),
            expected: kind_stocked.clone(),
            got: entity.kind().clone(),
        };
        return Err(Rejected { entity, error });
    }
    Ok(entity)
}

/// Ordinary FIFO stock: `add` appends, `remove` pops the head.
pub struct ThroughStock {
    name: StockName,
    kind_stocked: EntityKind,
    entities: VecDeque<Entity>,
}

impl ThroughStock {
    pub fn new(name: impl Into<StockName>, kind_stocked: impl Into<EntityKind>) -> Self {
        Self {
            name: name.into(),
            kind_stocked: kind_stocked.into(),
            entities: VecDeque::new(),
        }
    }
}

impl Stock for ThroughStock {
    fn name(&self) -> &StockName {
        &self.name
    }

    fn kind_stocked(&self) -> &EntityKind {
        &self.kind_stocked
    }

    fn count(&self) -> u64 {
        self.entities.len() as u64
    }

    fn entities(&self) -> Vec<&Entity> {
        self.entities.iter().collect()
    }

    fn add(&mut self, entity: Entity, _fx: &mut Effects) -> Result<(), Rejected> {
        let entity = check_kind(&self.name, &self.kind_stocked, entity)?;
        self.entities.push_back(entity);
        Ok(())
    }

    fn remove(&mut self, _fx: &mut Effects) -> Result<Entity, SimError> {
        self.entities.pop_front().ok_or(SimError::StockEmpty {
            stock: self.name.clone(),
        })
    }
}

/// Terminal stock: `add` accepts forever, `remove` always fails.
pub struct SinkStock {
    name: StockName,
    kind_stocked: EntityKind,
    entities: Vec<Entity>,
}

impl SinkStock {
    pub fn new(name: impl Into<StockName>, kind_stocked: impl Into<EntityKind>) -> Self {
        Self {
            name: name.into(),
            kind_stocked: kind_stocked.into(),
            entities: Vec::new(),
        }
    }
}

impl Stock for SinkStock {
    fn name(&self) -> &StockName {
        &self.name
    }

    fn kind_stocked(&self) -> &EntityKind {
        &self.kind_stocked
    }

    fn count(&self) -> u64 {
        self.entities.len() as u64
    }

    fn entities(&self) -> Vec<&Entity> {
        self.entities.iter().collect()
    }

    fn add(&mut self, entity: Entity, _fx: &mut Effects) -> Result<(), Rejected> {
        let entity = check_kind(&self.name, &self.kind_stocked, entity)?;
        self.entities.push(entity);
        Ok(())
    }

    fn remove(&mut self, _fx: &mut Effects) -> Result<Entity, SimError> {
        Err(SimError::SinkRemove {
            stock: self.name.clone(),
        })
    }
}
