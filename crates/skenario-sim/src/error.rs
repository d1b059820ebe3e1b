//! Kernel error types.

use sken_core::SimTime;
use thiserror::Error;

use crate::entity::EntityKind;
use crate::stock::StockName;

/// Result type alias for kernel operations.
pub type SimResult<T> = Result<T, SimError>;

/// Errors raised by the simulation kernel and the models driving it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("another movement is already scheduled at {at}")]
    DuplicateTime { at: SimTime },

    #[error("stock {stock} holds {expected} entities, got {got}")]
    KindMismatch {
        stock: StockName,
        expected: EntityKind,
        got: EntityKind,
    },

    #[error("source stock {stock} does not accept entities")]
    SourceAdd { stock: StockName },

    #[error("sink stock {stock} does not release entities")]
    SinkRemove { stock: StockName },

    #[error("stock {stock} is empty")]
    StockEmpty { stock: StockName },

    #[error("movement at {at} is not after the current time {now}")]
    ScheduledInPast { at: SimTime, now: SimTime },

    #[error("clock regression: movement at {at} dequeued while clock is at {now}")]
    ClockRegression { at: SimTime, now: SimTime },

    #[error("movement queue invariant violated: {0}")]
    QueueCorrupted(String),
}

impl SimError {
    /// Short reason string used when a movement is recorded as ignored.
    pub(crate) fn ignore_reason(&self) -> String {
        match self {
            SimError::StockEmpty { .. } => "from-stock empty".to_string(),
            other => other.to_string(),
        }
    }
}
