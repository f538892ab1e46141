//! Rotational speed estimation from a rising-edge pulse train.
//!
//! A slotted disc or Hall sensor produces `pulses_per_rev` rising edges per
//! wheel revolution. The estimator tracks an exponentially smoothed
//! inter-edge period in microseconds and converts it to RPM on demand.
//!
//! Two details keep the reading honest on a real vehicle:
//!
//! - The pulse timer's tick counter is a `u32` that wraps every ~71 minutes;
//!   intervals are taken as the forward difference modulo 2^32.
//! - When the wheel slows to a stop no more edges arrive, so the last period
//!   would be reported forever. Every watchdog [`Timeout`](EdgeEvent::Timeout)
//!   lengthens the period by one watchdog interval instead, which walks the
//!   RPM down until it drops under the minimum and reads 0.
//!
//! # Example
//!
//! ```rust
//! use rs_buggy::config::EstimatorConfig;
//! use rs_buggy::estimator::RpmEstimator;
//! use rs_buggy::traits::EdgeEvent;
//!
//! let estimator = RpmEstimator::new(&EstimatorConfig::default()).unwrap();
//! assert_eq!(estimator.sample(), 0.0);
//!
//! // 20 pulses per rev, one pulse every 50ms -> 1 rev/s
//! estimator.on_edge(EdgeEvent::Rising { tick: 0 });
//! estimator.on_edge(EdgeEvent::Rising { tick: 50_000 });
//! assert!((estimator.sample() - 60.0).abs() < 1e-3);
//! ```

use std::sync::{Mutex, PoisonError};

use crate::config::EstimatorConfig;
use crate::error::ConfigError;
pub use crate::traits::EdgeEvent;

/// Periods at or above this many microseconds stop growing on timeout.
///
/// Guards the accumulator against unbounded growth during long silence; at
/// 20 pulses/rev it corresponds to far below any reportable RPM.
pub const PERIOD_CEILING_US: f64 = 2_000_000_000.0;

/// Upper bound on the smoothing weight.
pub const MAX_WEIGHTING: f32 = 0.99;

/// Reportable minimum RPM bounds.
pub const MIN_RPM_RANGE: (f32, f32) = (1.0, 1000.0);

const MICROS_PER_MINUTE: f64 = 60_000_000.0;

/// Smoothed pulse period state.
///
/// Owned by exactly one [`RpmEstimator`]; mutated only by
/// [`update`](Self::update).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeriodEstimate {
    smoothed_us: Option<f64>,
    last_rising: Option<u32>,
    watchdog_us: f64,
    weight_old: f64,
    weight_new: f64,
}

impl PeriodEstimate {
    /// Empty estimate. `weighting` must already be clamped.
    pub fn new(weighting: f32, watchdog_ms: u32) -> Self {
        let weight_old = f64::from(weighting);
        Self {
            smoothed_us: None,
            last_rising: None,
            watchdog_us: f64::from(watchdog_ms) * 1000.0,
            weight_old,
            weight_new: 1.0 - weight_old,
        }
    }

    /// Fold one edge event into the estimate.
    pub fn update(&mut self, event: EdgeEvent) {
        match event {
            EdgeEvent::Rising { tick } => {
                if let Some(last) = self.last_rising {
                    let delta = f64::from(tick.wrapping_sub(last));
                    self.smoothed_us = Some(match self.smoothed_us {
                        Some(period) => self.weight_old * period + self.weight_new * delta,
                        None => delta,
                    });
                }
                self.last_rising = Some(tick);
            }
            EdgeEvent::Timeout => {
                if let Some(period) = self.smoothed_us.as_mut() {
                    if *period < PERIOD_CEILING_US {
                        *period += self.watchdog_us;
                    }
                }
            }
        }
    }

    /// Smoothed period in microseconds, if at least two edges were seen.
    #[inline]
    pub fn period_us(&self) -> Option<f64> {
        self.smoothed_us
    }

    /// Tick of the most recent rising edge.
    #[inline]
    pub fn last_rising(&self) -> Option<u32> {
        self.last_rising
    }
}

/// Thread-safe RPM estimator.
///
/// [`on_edge`](Self::on_edge) is called from the edge consumer;
/// [`sample`](Self::sample) from the control loop. Both only hold the inner
/// lock long enough to update or copy the period.
#[derive(Debug)]
pub struct RpmEstimator {
    state: Mutex<PeriodEstimate>,
    pulses_per_rev: f64,
    min_rpm: f64,
    watchdog_ms: u32,
}

impl RpmEstimator {
    /// Validate `config` and build an estimator.
    ///
    /// `weighting` is clamped to [0, 0.99] and `min_rpm` to [1, 1000].
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidPulsesPerRev`] if `pulses_per_rev` is not a
    /// positive finite number, [`ConfigError::InvalidWatchdog`] if the
    /// watchdog interval is zero.
    pub fn new(config: &EstimatorConfig) -> Result<Self, ConfigError> {
        if !(config.pulses_per_rev.is_finite() && config.pulses_per_rev > 0.0) {
            return Err(ConfigError::InvalidPulsesPerRev(config.pulses_per_rev));
        }
        if config.watchdog_ms == 0 {
            return Err(ConfigError::InvalidWatchdog);
        }

        let weighting = if config.weighting.is_nan() {
            0.0
        } else {
            config.weighting.clamp(0.0, MAX_WEIGHTING)
        };
        let min_rpm = if config.min_rpm.is_nan() {
            MIN_RPM_RANGE.0
        } else {
            config.min_rpm.clamp(MIN_RPM_RANGE.0, MIN_RPM_RANGE.1)
        };

        Ok(Self {
            state: Mutex::new(PeriodEstimate::new(weighting, config.watchdog_ms)),
            pulses_per_rev: f64::from(config.pulses_per_rev),
            min_rpm: f64::from(min_rpm),
            watchdog_ms: config.watchdog_ms,
        })
    }

    /// Handle one event from the pulse input.
    pub fn on_edge(&self, event: EdgeEvent) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.update(event);
        if let (EdgeEvent::Rising { .. }, Some(period)) = (event, state.period_us()) {
            tracing::trace!(period_ms = period / 1000.0, "edge");
        }
    }

    /// Current speed in RPM, 0 when unknown or below the minimum.
    pub fn sample(&self) -> f32 {
        match self.period_us() {
            Some(period) if period > 0.0 => {
                let rpm = MICROS_PER_MINUTE / (period * self.pulses_per_rev);
                if rpm < self.min_rpm {
                    0.0
                } else {
                    rpm as f32
                }
            }
            _ => 0.0,
        }
    }

    /// Snapshot of the smoothed period in microseconds.
    pub fn period_us(&self) -> Option<f64> {
        self.snapshot().period_us()
    }

    /// Copy of the full estimator state.
    pub fn snapshot(&self) -> PeriodEstimate {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Watchdog interval the pulse input should be armed with.
    #[inline]
    pub fn watchdog_ms(&self) -> u32 {
        self.watchdog_ms
    }

    /// Effective minimum RPM after clamping.
    #[inline]
    pub fn min_rpm(&self) -> f32 {
        self.min_rpm as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator(weighting: f32) -> RpmEstimator {
        RpmEstimator::new(&EstimatorConfig::default().with_weighting(weighting)).unwrap()
    }

    fn rising(tick: u32) -> EdgeEvent {
        EdgeEvent::Rising { tick }
    }

    // =========================================================================
    // Construction
    // =========================================================================

    #[test]
    fn rejects_non_positive_pulses() {
        for pulses in [0.0, -1.0, f32::NAN] {
            let err = RpmEstimator::new(&EstimatorConfig::default().with_pulses_per_rev(pulses));
            assert!(matches!(err, Err(ConfigError::InvalidPulsesPerRev(_))));
        }
    }

    #[test]
    fn rejects_zero_watchdog() {
        let err = RpmEstimator::new(&EstimatorConfig::default().with_watchdog_ms(0));
        assert!(matches!(err, Err(ConfigError::InvalidWatchdog)));
    }

    #[test]
    fn min_rpm_is_clamped() {
        let low = RpmEstimator::new(&EstimatorConfig::default().with_min_rpm(0.1)).unwrap();
        assert_eq!(low.min_rpm(), 1.0);

        let high = RpmEstimator::new(&EstimatorConfig::default().with_min_rpm(5000.0)).unwrap();
        assert_eq!(high.min_rpm(), 1000.0);
    }

    #[test]
    fn weighting_is_clamped() {
        let est = estimator(2.0);
        est.on_edge(rising(0));
        est.on_edge(rising(1000));
        est.on_edge(rising(3000));
        // 0.99 * 1000 + 0.01 * 2000
        assert!((est.period_us().unwrap() - 1010.0).abs() < 1e-3);

        let est = estimator(-1.0);
        est.on_edge(rising(0));
        est.on_edge(rising(1000));
        est.on_edge(rising(3000));
        assert!((est.period_us().unwrap() - 2000.0).abs() < 1e-6);
    }

    // =========================================================================
    // Rising edges
    // =========================================================================

    #[test]
    fn no_edges_reads_zero() {
        assert_eq!(estimator(0.0).sample(), 0.0);
    }

    #[test]
    fn single_edge_reads_zero() {
        let est = estimator(0.0);
        est.on_edge(rising(1234));
        assert_eq!(est.sample(), 0.0);
        assert_eq!(est.snapshot().last_rising(), Some(1234));
    }

    #[test]
    fn constant_interval_converges_immediately_without_smoothing() {
        let est = estimator(0.0);
        est.on_edge(rising(0));
        est.on_edge(rising(10_000));
        // 60e6 / (10_000 * 20) = 300
        assert!((est.sample() - 300.0).abs() < 1e-3);
        est.on_edge(rising(20_000));
        assert!((est.sample() - 300.0).abs() < 1e-3);
    }

    #[test]
    fn smoothing_blends_old_and_new() {
        let est = estimator(0.5);
        est.on_edge(rising(0));
        est.on_edge(rising(10_000));
        est.on_edge(rising(40_000));
        assert!((est.period_us().unwrap() - 20_000.0).abs() < 1e-6);
    }

    #[test]
    fn tick_wraparound_uses_forward_difference() {
        let est = estimator(0.0);
        est.on_edge(rising(u32::MAX - 4_999));
        est.on_edge(rising(5_000));
        assert!((est.period_us().unwrap() - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn below_min_rpm_reads_zero() {
        let est = estimator(0.0);
        est.on_edge(rising(0));
        // 60e6 / (1_000_000 * 20) = 3 rpm < 5
        est.on_edge(rising(1_000_000));
        assert_eq!(est.sample(), 0.0);
    }

    // =========================================================================
    // Watchdog timeouts
    // =========================================================================

    #[test]
    fn timeout_without_period_is_ignored() {
        let est = estimator(0.0);
        est.on_edge(EdgeEvent::Timeout);
        est.on_edge(rising(0));
        est.on_edge(EdgeEvent::Timeout);
        assert_eq!(est.period_us(), None);
        assert_eq!(est.sample(), 0.0);
    }

    #[test]
    fn timeout_lengthens_period_by_watchdog() {
        let est = estimator(0.0);
        est.on_edge(rising(0));
        est.on_edge(rising(10_000));
        est.on_edge(EdgeEvent::Timeout);
        assert!((est.period_us().unwrap() - 210_000.0).abs() < 1e-6);
    }

    #[test]
    fn repeated_timeouts_walk_rpm_to_zero() {
        let est = estimator(0.0);
        est.on_edge(rising(0));
        est.on_edge(rising(10_000));

        let mut last_rpm = est.sample();
        let mut last_period = est.period_us().unwrap();
        for _ in 0..5 {
            est.on_edge(EdgeEvent::Timeout);
            let period = est.period_us().unwrap();
            let rpm = est.sample();
            assert!(period > last_period);
            assert!(rpm < last_rpm || rpm == 0.0);
            last_period = period;
            last_rpm = rpm;
        }
        // 10ms + 5 * 200ms = 1.01s per pulse -> ~2.97 rpm, under the 5 rpm floor
        assert_eq!(est.sample(), 0.0);
    }

    #[test]
    fn timeout_stops_growing_at_ceiling() {
        let mut estimate = PeriodEstimate::new(0.0, 200);
        estimate.update(rising(0));
        estimate.update(rising(u32::MAX));
        // ~4.29e9 us, already above the ceiling
        let before = estimate.period_us().unwrap();
        estimate.update(EdgeEvent::Timeout);
        assert_eq!(estimate.period_us().unwrap(), before);
    }

    #[test]
    fn rising_edge_after_timeouts_recovers() {
        let est = estimator(0.0);
        est.on_edge(rising(0));
        est.on_edge(rising(10_000));
        est.on_edge(EdgeEvent::Timeout);
        est.on_edge(EdgeEvent::Timeout);
        est.on_edge(rising(20_000));
        assert!((est.sample() - 300.0).abs() < 1e-3);
    }
}
