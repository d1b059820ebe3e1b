//! Traffic source and arrival patterns.
//!
//! `TrafficSourceStock` is a source-shaped stock: it reports a count of
//! zero, rejects `add`, and fabricates a fresh request entity on every
//! `remove`, with sequential names `request-1`, `request-2`, and so on.
//! Arrival scheduling is done up front by [`schedule_traffic`], which
//! pre-enqueues `arrive_at_buffer` movements at times computed from the
//! chosen pattern.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use skenario_sim::{
    Effects, Entity, EntityKind, Environment, Movement, Rejected, SimError, SimResult, Stock,
    StockId, StockName,
};
use tracing::debug;

use crate::REQUEST_KIND;

/// Movement kind for a request arriving from the traffic source.
pub const ARRIVE_AT_BUFFER: &str = "arrive_at_buffer";

/// CPU time a fabricated request owes unless configured otherwise.
pub const DEFAULT_CPU_PER_REQUEST: Duration = Duration::from_secs(1);

/// Lazy factory of request entities.
pub struct TrafficSourceStock {
    name: StockName,
    kind_stocked: EntityKind,
    cpu_per_request: Duration,
    sequence: u64,
}

impl TrafficSourceStock {
    pub fn new(cpu_per_request: Duration) -> Self {
        Self {
            name: StockName::from("TrafficSource"),
            kind_stocked: EntityKind::from(REQUEST_KIND),
            cpu_per_request,
            sequence: 0,
        }
    }
}

impl Default for TrafficSourceStock {
    fn default() -> Self {
        Self::new(DEFAULT_CPU_PER_REQUEST)
    }
}

impl Stock for TrafficSourceStock {
    fn name(&self) -> &StockName {
        &self.name
    }

    fn kind_stocked(&self) -> &EntityKind {
        &self.kind_stocked
    }

    fn count(&self) -> u64 {
        0
    }

    fn entities(&self) -> Vec<&Entity> {
        Vec::new()
    }

    fn add(&mut self, entity: Entity, _fx: &mut Effects) -> Result<(), Rejected> {
        Err(Rejected {
            entity,
            error: SimError::SourceAdd {
                stock: self.name.clone(),
            },
        })
    }

    fn remove(&mut self, _fx: &mut Effects) -> Result<Entity, SimError> {
        self.sequence += 1;
        Ok(Entity::request(
            format!("request-{}", self.sequence),
            REQUEST_KIND,
            self.cpu_per_request,
        ))
    }
}

/// Named arrival pattern; the identifier lands in the scenario metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrafficPattern {
    /// Arrivals uniformly distributed over the run window.
    UniformRandom,
    /// Requests per second ramping linearly at `delta_v` per second,
    /// capped at `max_rps`.
    Ramp { delta_v: f64, max_rps: f64 },
}

impl TrafficPattern {
    pub fn id(&self) -> &'static str {
        match self {
            TrafficPattern::UniformRandom => "uniform_random",
            TrafficPattern::Ramp { .. } => "ramp",
        }
    }
}

/// Pre-enqueue `arrive_at_buffer` movements per the pattern. Returns the
/// number of arrivals scheduled.
pub fn schedule_traffic(
    env: &mut Environment,
    source: StockId,
    buffer: StockId,
    pattern: &TrafficPattern,
    number_of_requests: u32,
    rng: &mut StdRng,
) -> SimResult<u32> {
    let start = env.start_at();
    let span = env.end_at().duration_since(start);
    let mut scheduled = 0u32;

    match pattern {
        TrafficPattern::UniformRandom => {
            // Strictly inside the window: the first instant belongs to the
            // start sentinel and the last to the end sentinel.
            let span_nanos = span.as_nanos() as i64;
            for _ in 0..number_of_requests {
                let offset = rng.gen_range(1..span_nanos.max(2));
                let at = start + Duration::from_nanos(offset as u64);
                let movement = Movement::new(ARRIVE_AT_BUFFER, at, source, buffer);
                env.schedule_staggered(movement)?;
                scheduled += 1;
            }
        }
        TrafficPattern::Ramp { delta_v, max_rps } => {
            for second in 0..span.as_secs() {
                let rate = (delta_v * (second as f64 + 1.0)).min(*max_rps);
                let arrivals = rate.floor() as u64;
                if arrivals == 0 {
                    continue;
                }
                let step = Duration::from_nanos(1_000_000_000 / arrivals);
                for k in 0..arrivals {
                    let at = start + Duration::from_secs(second) + step * (k as u32 + 1);
                    let movement = Movement::new(ARRIVE_AT_BUFFER, at, source, buffer);
                    env.schedule_staggered(movement)?;
                    scheduled += 1;
                }
            }
        }
    }

    debug!(pattern = pattern.id(), scheduled, "traffic scheduled");
    Ok(scheduled)
}
