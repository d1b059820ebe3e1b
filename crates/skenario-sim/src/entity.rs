//! Entities — the indivisible units that flow between stocks.
//!
//! An entity is identified by a unique name and tagged with a kind.
//! Request entities additionally carry CPU-time accounting used by the
//! request-processing model.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Unique name of an entity (`request-1`, `replica-3`, `Scenario`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityName(String);

impl From<&str> for EntityName {
    fn from(value: &str) -> Self {
        EntityName(value.to_string())
    }
}

impl From<String> for EntityName {
    fn from(value: String) -> Self {
        EntityName(value)
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short tag describing what an entity is (`Request`, `Replica`, `Scenario`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKind(String);

impl From<&str> for EntityKind {
    fn from(value: &str) -> Self {
        EntityKind(value.to_string())
    }
}

impl From<String> for EntityKind {
    fn from(value: String) -> Self {
        EntityKind(value)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// CPU-time accounting carried by request entities.
///
/// `consumed` only ever grows and never exceeds `required`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestUsage {
    required: Duration,
    consumed: Duration,
}

impl RequestUsage {
    pub fn new(required: Duration) -> Self {
        Self {
            required,
            consumed: Duration::ZERO,
        }
    }

    pub fn required(&self) -> Duration {
        self.required
    }

    pub fn consumed(&self) -> Duration {
        self.consumed
    }

    /// CPU time still owed before the request is exhausted.
    pub fn remaining(&self) -> Duration {
        self.required.saturating_sub(self.consumed)
    }

    /// Consume up to `slice` of the remaining CPU time; returns the amount
    /// actually consumed.
    pub fn consume(&mut self, slice: Duration) -> Duration {
        let taken = slice.min(self.remaining());
        self.consumed += taken;
        taken
    }
}

/// An indivisible simulated object owned by whichever stock holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    name: EntityName,
    kind: EntityKind,
    usage: Option<RequestUsage>,
}

impl Entity {
    /// A plain entity with no CPU accounting (replicas, markers).
    pub fn new(name: impl Into<EntityName>, kind: impl Into<EntityKind>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            usage: None,
        }
    }

    /// A request entity that owes `required` CPU time.
    pub fn request(
        name: impl Into<EntityName>,
        kind: impl Into<EntityKind>,
        required: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            usage: Some(RequestUsage::new(required)),
        }
    }

    pub fn name(&self) -> &EntityName {
        &self.name
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn usage(&self) -> Option<&RequestUsage> {
        self.usage.as_ref()
    }

    pub fn usage_mut(&mut self) -> Option<&mut RequestUsage> {
        self.usage.as_mut()
    }
}
