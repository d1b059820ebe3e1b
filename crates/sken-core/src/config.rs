//! Scenario configuration surface.
//!
//! Two structs describe a run: `ClusterConfig` for replica lifecycle
//! timings and traffic volume, `AutoscalerConfig` for the autoscaler's
//! windows and gains. Both serialize to JSON for the API and are stored
//! with every scenario run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cluster-side parameters for a scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Delay between a replica being asked for and it becoming active.
    pub launch_delay: Duration,
    /// Delay between a replica being decommissioned and it terminating.
    pub terminate_delay: Duration,
    /// Number of requests the traffic source emits over the run.
    pub number_of_requests: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            launch_delay: Duration::from_secs(5),
            terminate_delay: Duration::from_secs(1),
            number_of_requests: 10,
        }
    }
}

/// Autoscaler parameters for a scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoscalerConfig {
    /// Interval between autoscaler calculations.
    pub tick_interval: Duration,
    /// Averaging window for steady-state scaling decisions.
    pub stable_window: Duration,
    /// Short window used to detect sudden load spikes.
    pub panic_window: Duration,
    /// How long concurrency must stay at zero before scaling to zero.
    pub scale_to_zero_grace_period: Duration,
    /// Target concurrent requests per replica.
    pub target_concurrency_default: f64,
    /// Fraction of the target the scaler aims to keep utilized.
    pub target_concurrency_percentage: f64,
    /// Upper bound on the ratio of new to current replicas per decision.
    pub max_scale_up_rate: f64,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            stable_window: Duration::from_secs(60),
            panic_window: Duration::from_secs(6),
            scale_to_zero_grace_period: Duration::from_secs(30),
            target_concurrency_default: 2.0,
            target_concurrency_percentage: 0.5,
            max_scale_up_rate: 10.0,
        }
    }
}
