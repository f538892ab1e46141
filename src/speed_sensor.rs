//! Wheel speed sensor: a [`PulseInput`] feeding an [`RpmEstimator`].
//!
//! The pulse input pushes [`EdgeEvent`]s into a channel from its own
//! interrupt/callback context. A dedicated consumer thread drains the channel
//! into the estimator so edge handling never waits on the control loop.
//!
//! ```text
//! PulseInput --mpsc--> edge consumer thread --on_edge--> RpmEstimator
//!                                                           ^
//!                        control loop --- read() ----------'
//! ```

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::EstimatorConfig;
use crate::error::ConfigError;
use crate::estimator::RpmEstimator;
use crate::hal::join_worker;
use crate::traits::{EdgeEvent, PulseInput, Telemetry, TelemetrySource};

/// A running speed sensor publishing its RPM under one telemetry key.
///
/// Dropping the sensor cancels it.
///
/// # Example
///
/// ```rust
/// use rs_buggy::config::EstimatorConfig;
/// use rs_buggy::hal::MockPulseInput;
/// use rs_buggy::speed_sensor::SpeedSensor;
/// use rs_buggy::traits::{EdgeEvent, TelemetrySource};
///
/// let input = MockPulseInput::new();
/// let handle = input.handle();
/// let mut sensor = SpeedSensor::start("rpm1i", input, &EstimatorConfig::default()).unwrap();
///
/// handle.emit(EdgeEvent::Rising { tick: 0 });
/// handle.emit(EdgeEvent::Rising { tick: 50_000 });
/// sensor.cancel(); // drains pending edges
///
/// assert_eq!(sensor.read()["rpm1i"], 60.0);
/// ```
pub struct SpeedSensor<P: PulseInput> {
    key: String,
    estimator: Arc<RpmEstimator>,
    input: P,
    consumer: Option<JoinHandle<()>>,
}

impl<P: PulseInput> SpeedSensor<P> {
    /// Validate `config`, arm `input`'s watchdog and start consuming edges.
    ///
    /// # Errors
    ///
    /// Invalid estimator settings, a pulse input that refuses to start, or a
    /// consumer thread that cannot be spawned. All are setup failures.
    pub fn start(
        key: impl Into<String>,
        mut input: P,
        config: &EstimatorConfig,
    ) -> Result<Self, ConfigError> {
        let key = key.into();
        let estimator = Arc::new(RpmEstimator::new(config)?);

        let (tx, rx) = mpsc::channel::<EdgeEvent>();
        let sink = Arc::clone(&estimator);
        let consumer = thread::Builder::new()
            .name(format!("edges-{key}"))
            .spawn(move || {
                for event in rx {
                    sink.on_edge(event);
                }
            })?;

        if let Err(e) = input.start(estimator.watchdog_ms(), tx) {
            input.stop();
            join_worker(consumer);
            return Err(ConfigError::PulseInput {
                key,
                reason: format!("{e:?}"),
            });
        }

        tracing::info!(key = %key, watchdog_ms = estimator.watchdog_ms(), "speed sensor started");

        Ok(Self {
            key,
            estimator,
            input,
            consumer: Some(consumer),
        })
    }

    /// Telemetry key this sensor reports under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current RPM.
    pub fn rpm(&self) -> f32 {
        self.estimator.sample()
    }

    /// Whether the sensor is still consuming edges.
    pub fn is_running(&self) -> bool {
        self.consumer.is_some()
    }

    /// Stop the pulse input and wait for queued edges to drain.
    ///
    /// Safe to call more than once.
    pub fn cancel(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            self.input.stop();
            join_worker(consumer);
            tracing::info!(key = %self.key, "speed sensor released");
        }
    }
}

impl<P: PulseInput> TelemetrySource for SpeedSensor<P> {
    fn keys(&self) -> Vec<String> {
        vec![self.key.clone()]
    }

    /// RPM truncated to a whole number.
    fn read(&self) -> Telemetry {
        let mut reading = Telemetry::new();
        reading.insert(self.key.clone(), f64::from(self.rpm()).trunc());
        reading
    }

    fn release(&mut self) {
        self.cancel();
    }
}

impl<P: PulseInput> Drop for SpeedSensor<P> {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockPulseInput;

    #[test]
    fn start_arms_watchdog() {
        let input = MockPulseInput::new();
        let handle = input.handle();
        let config = EstimatorConfig::default().with_watchdog_ms(150);
        let _sensor = SpeedSensor::start("rpm", input, &config).unwrap();

        assert_eq!(handle.watchdog_ms(), Some(150));
        assert!(handle.is_started());
    }

    #[test]
    fn start_rejects_invalid_config() {
        let input = MockPulseInput::new();
        let handle = input.handle();
        let config = EstimatorConfig::default().with_pulses_per_rev(0.0);

        let result = SpeedSensor::start("rpm", input, &config);
        assert!(matches!(result, Err(ConfigError::InvalidPulsesPerRev(_))));
        assert!(!handle.is_started());
    }

    #[test]
    fn start_reports_input_failure() {
        let input = MockPulseInput::failing();
        let result = SpeedSensor::start("rpm", input, &EstimatorConfig::default());
        assert!(matches!(result, Err(ConfigError::PulseInput { .. })));
    }

    #[test]
    fn edges_reach_estimator() {
        let input = MockPulseInput::new();
        let handle = input.handle();
        let mut sensor = SpeedSensor::start("rpm2i", input, &EstimatorConfig::default()).unwrap();

        handle.emit(EdgeEvent::Rising { tick: 0 });
        handle.emit(EdgeEvent::Rising { tick: 10_000 });
        sensor.cancel();

        assert_eq!(sensor.keys(), vec!["rpm2i".to_string()]);
        assert_eq!(sensor.read()["rpm2i"], 300.0);
    }

    #[test]
    fn reading_is_truncated() {
        let input = MockPulseInput::new();
        let handle = input.handle();
        let mut sensor = SpeedSensor::start("rpm", input, &EstimatorConfig::default()).unwrap();

        // 60e6 / (7_000 * 20) = 428.57
        handle.emit(EdgeEvent::Rising { tick: 0 });
        handle.emit(EdgeEvent::Rising { tick: 7_000 });
        sensor.cancel();

        assert_eq!(sensor.read()["rpm"], 428.0);
    }

    #[test]
    fn no_edges_reads_zero() {
        let input = MockPulseInput::new();
        let sensor = SpeedSensor::start("rpm", input, &EstimatorConfig::default()).unwrap();
        assert_eq!(sensor.read()["rpm"], 0.0);
    }

    #[test]
    fn cancel_is_idempotent() {
        let input = MockPulseInput::new();
        let handle = input.handle();
        let mut sensor = SpeedSensor::start("rpm", input, &EstimatorConfig::default()).unwrap();

        sensor.cancel();
        sensor.cancel();
        sensor.release();

        assert!(!sensor.is_running());
        assert_eq!(handle.stop_count(), 1);
    }

    #[test]
    fn drop_releases_input() {
        let input = MockPulseInput::new();
        let handle = input.handle();
        {
            let _sensor = SpeedSensor::start("rpm", input, &EstimatorConfig::default()).unwrap();
        }
        assert!(!handle.is_started());
        assert_eq!(handle.stop_count(), 1);
    }
}
