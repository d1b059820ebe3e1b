//! Autoscaler contract and the bundled sliding-window implementation.
//!
//! The simulator drives any autoscaler through two calls: `record` feeds
//! it one statistics sample per active replica per tick, and `scale` asks
//! for a desired replica count (`None` when the autoscaler has nothing to
//! say, in which case the current desired count is held).
//!
//! `SlidingWindowAutoscaler` is a Knative-shaped reference
//! implementation: average concurrency over a long stable window drives
//! steady-state decisions, a short panic window guards against sudden
//! spikes by refusing to scale down while panicking, scale-up is rate
//! limited, and scale-to-zero waits out a grace period.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use sken_core::{AutoscalerConfig, SimTime};
use skenario_sim::EntityName;
use tracing::debug;

/// One statistics sample for one replica at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Stat {
    pub pod_name: EntityName,
    pub time: SimTime,
    pub average_concurrent_requests: f64,
    pub request_count: i32,
}

/// The contract by which the simulator drives an autoscaler.
pub trait Autoscaler {
    /// Feed one statistics sample.
    fn record(&mut self, stat: Stat);

    /// Ask for a desired replica count as of `at`. `None` means the
    /// autoscaler cannot make a decision yet.
    fn scale(&mut self, at: SimTime) -> Option<i32>;
}

/// Windowed-concurrency autoscaler.
pub struct SlidingWindowAutoscaler {
    config: AutoscalerConfig,
    stats: VecDeque<Stat>,
    has_recorded: bool,
    last_desired: i32,
    panicking: bool,
    zero_since: Option<SimTime>,
}

impl SlidingWindowAutoscaler {
    pub fn new(config: AutoscalerConfig) -> Self {
        Self {
            config,
            stats: VecDeque::new(),
            has_recorded: false,
            last_desired: 0,
            panicking: false,
            zero_since: None,
        }
    }

    /// Concurrent requests per replica the scaler aims for.
    fn per_pod_target(&self) -> f64 {
        (self.config.target_concurrency_default * self.config.target_concurrency_percentage)
            .max(f64::EPSILON)
    }

    /// Average total concurrency across the sample instants that fall
    /// within `window` of `at`. Zero when the window holds no samples.
    fn windowed_concurrency(&self, window: std::time::Duration, at: SimTime) -> f64 {
        let mut per_instant: BTreeMap<SimTime, f64> = BTreeMap::new();
        for stat in &self.stats {
            if at.duration_since(stat.time) <= window {
                *per_instant.entry(stat.time).or_insert(0.0) += stat.average_concurrent_requests;
            }
        }
        if per_instant.is_empty() {
            return 0.0;
        }
        per_instant.values().sum::<f64>() / per_instant.len() as f64
    }

    /// Distinct replicas seen within the panic window, floored at one.
    fn ready_pods(&self, at: SimTime) -> i32 {
        let pods: BTreeSet<&EntityName> = self
            .stats
            .iter()
            .filter(|stat| at.duration_since(stat.time) <= self.config.panic_window)
            .map(|stat| &stat.pod_name)
            .collect();
        (pods.len() as i32).max(1)
    }
}

impl Autoscaler for SlidingWindowAutoscaler {
    fn record(&mut self, stat: Stat) {
        self.has_recorded = true;
        self.stats.push_back(stat);
    }

    fn scale(&mut self, at: SimTime) -> Option<i32> {
        // Nothing recorded yet: no basis for a decision.
        if !self.has_recorded {
            return None;
        }

        while let Some(front) = self.stats.front() {
            if at.duration_since(front.time) > self.config.stable_window {
                self.stats.pop_front();
            } else {
                break;
            }
        }

        let target = self.per_pod_target();
        let stable = self.windowed_concurrency(self.config.stable_window, at);
        let panic = self.windowed_concurrency(self.config.panic_window, at);
        let ready = self.ready_pods(at);

        let mut desired = (stable / target).ceil() as i32;

        let spiking = panic / ready as f64 >= 2.0 * target;
        if spiking {
            // While panicking, never go below what the panic window says
            // or below the last decision.
            self.panicking = true;
            desired = desired
                .max((panic / target).ceil() as i32)
                .max(self.last_desired);
        } else {
            self.panicking = false;
        }

        let max_up = ((ready as f64) * self.config.max_scale_up_rate).ceil().max(1.0) as i32;
        desired = desired.min(max_up);

        if desired == 0 && self.last_desired > 0 {
            // Hold one replica until concurrency has been zero for the
            // whole grace period.
            let since = *self.zero_since.get_or_insert(at);
            if at.duration_since(since) < self.config.scale_to_zero_grace_period {
                desired = 1;
            }
        } else if desired > 0 {
            self.zero_since = None;
        }

        debug!(stable, panic, ready, desired, panicking = self.panicking, "scale decision");
        self.last_desired = desired;
        Some(desired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn scaler() -> SlidingWindowAutoscaler {
        SlidingWindowAutoscaler::new(AutoscalerConfig::default())
    }

    fn at(secs: u64) -> SimTime {
        SimTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn record_pods(scaler: &mut SlidingWindowAutoscaler, time: SimTime, pods: u32, concurrency: f64) {
        for i in 1..=pods {
            scaler.record(Stat {
                pod_name: EntityName::from(format!("replica-{i}")),
                time,
                average_concurrent_requests: concurrency,
                request_count: 1,
            });
        }
    }

    #[test]
    fn no_samples_means_no_decision() {
        let mut scaler = scaler();
        assert_eq!(scaler.scale(at(2)), None);
    }

    #[test]
    fn steady_concurrency_holds_the_replica_count() {
        let mut scaler = scaler();
        // Default per-pod target is 2.0 * 0.5 = 1.0; three pods at 1.0
        // concurrency each want exactly three replicas.
        for tick in [2, 4, 6] {
            record_pods(&mut scaler, at(tick), 3, 1.0);
        }

        assert_eq!(scaler.scale(at(6)), Some(3));
    }

    #[test]
    fn overload_scales_up() {
        let mut scaler = scaler();
        record_pods(&mut scaler, at(2), 2, 3.0);

        // 6 total concurrency against a per-pod target of 1.0.
        assert_eq!(scaler.scale(at(2)), Some(6));
    }

    #[test]
    fn scale_up_is_rate_limited() {
        let mut scaler = scaler();
        record_pods(&mut scaler, at(2), 1, 100.0);

        // One ready pod, max_scale_up_rate 10: clamp 100 to 10.
        assert_eq!(scaler.scale(at(2)), Some(10));
    }

    #[test]
    fn panic_refuses_to_scale_down() {
        let mut scaler = scaler();
        record_pods(&mut scaler, at(2), 4, 3.0);
        assert_eq!(scaler.scale(at(2)), Some(12));

        // Spike still inside the panic window: hold the high count even
        // though the newest sample alone would want fewer replicas.
        record_pods(&mut scaler, at(4), 4, 2.5);
        let decision = scaler.scale(at(4)).unwrap();
        assert!(decision >= 12);
    }

    #[test]
    fn zero_concurrency_waits_out_the_grace_period() {
        let mut scaler = scaler();
        record_pods(&mut scaler, at(2), 1, 1.0);
        assert_eq!(scaler.scale(at(2)), Some(1));

        // Concurrency disappears; samples age out of the stable window.
        let silent_start = 2 + 61;
        assert_eq!(scaler.scale(at(silent_start)), Some(1));
        // Still inside the 30 s grace period.
        assert_eq!(scaler.scale(at(silent_start + 10)), Some(1));
        // Grace period over.
        assert_eq!(scaler.scale(at(silent_start + 31)), Some(0));
    }
}
