//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for all hardware and network traits,
//! enabling development and testing on desktop without a buggy or a broker.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockMotor`] | [`Actuator`] | Records every drive call |
//! | [`MockPulseInput`] | [`PulseInput`] | Test-driven edge events via [`MockPulseHandle`] |
//! | [`MockSensor`] | [`TelemetrySource`] | Fixed readings, counts reads and releases |
//! | [`MockMqtt`] | [`MqttClient`] | Captures pub/sub operations |
//!
//! # Example
//!
//! ```rust
//! use rs_buggy::hal::{MockMotor, MockMqtt};
//! use rs_buggy::traits::{Actuator, MqttClient};
//!
//! let mut motor = MockMotor::new();
//! motor.backward(30).unwrap();
//! motor.stop().unwrap();
//! assert_eq!(motor.calls.len(), 2);
//!
//! let mut mqtt = MockMqtt::new();
//! mqtt.publish("pi2nred/buggy/pispeedSensor", br#"{"rpm1i":60}"#).unwrap();
//! assert_eq!(mqtt.published_to("pi2nred/buggy/pispeedSensor").len(), 1);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::commands::DriveAction;
use crate::error::TransportError;
use crate::traits::{
    Actuator, Direction, EdgeEvent, MqttClient, MqttMessage, PulseInput, Telemetry,
    TelemetrySource,
};

// ============================================================================
// Hardware Mocks
// ============================================================================

/// Mock motor for testing.
///
/// Records all drive calls for verification. Use the public fields to
/// inspect state after test operations.
///
/// # Example
///
/// ```rust
/// use rs_buggy::commands::DriveAction;
/// use rs_buggy::hal::MockMotor;
/// use rs_buggy::traits::{Actuator, Direction};
///
/// let mut motor = MockMotor::new();
/// motor.forward(75).unwrap();
///
/// assert_eq!(motor.direction, Direction::Forward);
/// assert_eq!(motor.magnitude, 75);
/// assert_eq!(motor.last_call(), Some(DriveAction::Forward(75)));
/// ```
#[derive(Debug, Default)]
pub struct MockMotor {
    /// Current direction.
    pub direction: Direction,
    /// Current duty in percent.
    pub magnitude: u8,
    /// Every call, oldest first.
    pub calls: Vec<DriveAction>,
    /// Number of `stop` calls.
    pub stop_count: usize,
    /// Fail every call when set.
    pub fail: bool,
}

impl MockMotor {
    /// Creates a new stopped mock motor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock motor whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Most recent call.
    pub fn last_call(&self) -> Option<DriveAction> {
        self.calls.last().copied()
    }

    fn record(&mut self, action: DriveAction) -> Result<(), ()> {
        self.calls.push(action);
        if self.fail {
            return Err(());
        }
        self.direction = action.direction();
        self.magnitude = match action {
            DriveAction::Forward(m) | DriveAction::Backward(m) => m,
            DriveAction::Stop => 0,
        };
        Ok(())
    }
}

impl Actuator for MockMotor {
    type Error = ();

    fn forward(&mut self, magnitude: u8) -> Result<(), ()> {
        self.record(DriveAction::Forward(magnitude))
    }

    fn backward(&mut self, magnitude: u8) -> Result<(), ()> {
        self.record(DriveAction::Backward(magnitude))
    }

    fn stop(&mut self) -> Result<(), ()> {
        self.stop_count += 1;
        self.record(DriveAction::Stop)
    }
}

#[derive(Debug, Default)]
struct PulseShared {
    sink: Option<Sender<EdgeEvent>>,
    watchdog_ms: Option<u32>,
    stop_count: usize,
}

/// Mock pulse input for testing.
///
/// The input itself is handed to a
/// [`SpeedSensor`](crate::speed_sensor::SpeedSensor); the test keeps a
/// [`MockPulseHandle`] to emit edges and inspect lifecycle calls.
#[derive(Debug, Default)]
pub struct MockPulseInput {
    shared: Arc<Mutex<PulseShared>>,
    fail: bool,
}

impl MockPulseInput {
    /// Creates a new idle mock pulse input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock pulse input whose `start` fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Handle for driving this input from a test.
    pub fn handle(&self) -> MockPulseHandle {
        MockPulseHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PulseShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PulseInput for MockPulseInput {
    type Error = &'static str;

    fn start(&mut self, watchdog_ms: u32, sink: Sender<EdgeEvent>) -> Result<(), Self::Error> {
        if self.fail {
            return Err("pin unavailable");
        }
        let mut shared = self.lock();
        shared.sink = Some(sink);
        shared.watchdog_ms = Some(watchdog_ms);
        Ok(())
    }

    fn stop(&mut self) {
        let mut shared = self.lock();
        shared.sink = None;
        shared.stop_count += 1;
    }
}

/// Test-side handle to a [`MockPulseInput`].
#[derive(Clone, Debug)]
pub struct MockPulseHandle {
    shared: Arc<Mutex<PulseShared>>,
}

impl MockPulseHandle {
    fn lock(&self) -> MutexGuard<'_, PulseShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver an event. Returns false once the input is stopped.
    pub fn emit(&self, event: EdgeEvent) -> bool {
        match &self.lock().sink {
            Some(sink) => sink.send(event).is_ok(),
            None => false,
        }
    }

    /// Watchdog interval passed to `start`.
    pub fn watchdog_ms(&self) -> Option<u32> {
        self.lock().watchdog_ms
    }

    /// Whether the input holds a live sink.
    pub fn is_started(&self) -> bool {
        self.lock().sink.is_some()
    }

    /// Number of `stop` calls.
    pub fn stop_count(&self) -> usize {
        self.lock().stop_count
    }
}

/// Mock telemetry sensor with settable readings.
///
/// # Example
///
/// ```rust
/// use rs_buggy::hal::MockSensor;
/// use rs_buggy::traits::TelemetrySource;
///
/// let mut sensor = MockSensor::new("rpm1i", 120.0);
/// assert_eq!(sensor.read()["rpm1i"], 120.0);
///
/// sensor.set("rpm1i", 80.0);
/// assert_eq!(sensor.read()["rpm1i"], 80.0);
/// assert_eq!(sensor.read_count(), 2);
/// ```
#[derive(Debug, Default)]
pub struct MockSensor {
    /// Readings returned by `read`.
    pub readings: Telemetry,
    /// Number of `release` calls.
    pub release_count: usize,
    reads: AtomicUsize,
}

impl MockSensor {
    /// Sensor with a single key.
    pub fn new(key: &str, value: f64) -> Self {
        Self::default().with_reading(key, value)
    }

    /// Add a key.
    pub fn with_reading(mut self, key: &str, value: f64) -> Self {
        self.set(key, value);
        self
    }

    /// Change a reading.
    pub fn set(&mut self, key: &str, value: f64) {
        self.readings.insert(key.to_string(), value);
    }

    /// Number of `read` calls.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl TelemetrySource for MockSensor {
    fn keys(&self) -> Vec<String> {
        self.readings.keys().cloned().collect()
    }

    fn read(&self) -> Telemetry {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.readings.clone()
    }

    fn release(&mut self) {
        self.release_count += 1;
    }
}

// ============================================================================
// Network Mocks
// ============================================================================

/// Mock MQTT client for testing.
///
/// Records all publish/subscribe operations and allows injecting
/// incoming messages for testing message handling.
///
/// # Example
///
/// ```rust
/// use rs_buggy::hal::MockMqtt;
/// use rs_buggy::traits::MqttClient;
///
/// let mut mqtt = MockMqtt::new();
///
/// // Queue incoming message
/// mqtt.queue_message("nred2pi/buggyZCMD/drive", br#"{"right": 50}"#.to_vec());
/// assert_eq!(mqtt.next_message().unwrap().topic, "nred2pi/buggyZCMD/drive");
///
/// // Check subscriptions
/// mqtt.subscribe("nred2pi/buggyZCMD/+").unwrap();
/// assert!(mqtt.is_subscribed("nred2pi/buggyZCMD/+"));
///
/// // Failing publishes are still recorded as attempts
/// mqtt.fail_publish = true;
/// assert!(mqtt.publish("pi2nred/buggy/x", b"{}").is_err());
/// assert_eq!(mqtt.publish_attempts, 1);
/// assert!(mqtt.published.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct MockMqtt {
    /// Messages that have been published (topic, payload).
    pub published: Vec<(String, Vec<u8>)>,
    /// Number of `publish` calls, including failed ones.
    pub publish_attempts: usize,
    /// Topics that have been subscribed to.
    pub subscriptions: Vec<String>,
    /// Queue of incoming messages returned by `next_message()`.
    pub incoming: Vec<MqttMessage>,
    /// Whether the client is connected.
    pub connected: bool,
    /// Reject every publish when set.
    pub fail_publish: bool,
}

impl MockMqtt {
    /// Creates a new mock MQTT client in connected state.
    pub fn new() -> Self {
        Self {
            connected: true,
            ..Default::default()
        }
    }

    /// Queue an incoming message
    pub fn queue_message(&mut self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) {
        self.incoming.push(MqttMessage::new(topic, payload));
    }

    /// Pop the oldest queued incoming message
    pub fn next_message(&mut self) -> Option<MqttMessage> {
        if self.incoming.is_empty() {
            None
        } else {
            Some(self.incoming.remove(0))
        }
    }

    /// Check if a topic was subscribed to
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.iter().any(|t| t == topic)
    }

    /// Get published payloads for a topic
    pub fn published_to(&self, topic: &str) -> Vec<&[u8]> {
        self.published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.as_slice())
            .collect()
    }
}

impl MqttClient for MockMqtt {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.publish_attempts += 1;
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.fail_publish {
            return Err(TransportError::Publish {
                topic: topic.to_string(),
                reason: "request queue full".into(),
            });
        }
        self.published.push((topic.into(), payload.to_vec()));
        Ok(())
    }

    fn subscribe(&mut self, pattern: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.subscriptions.push(pattern.into());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    // =========================================================================
    // MockMotor Tests
    // =========================================================================

    #[test]
    fn mock_motor_default() {
        let motor = MockMotor::new();
        assert_eq!(motor.direction, Direction::Stopped);
        assert_eq!(motor.magnitude, 0);
        assert!(motor.calls.is_empty());
    }

    #[test]
    fn mock_motor_records_calls() {
        let mut motor = MockMotor::new();
        motor.forward(40).unwrap();
        motor.backward(20).unwrap();
        assert_eq!(motor.direction, Direction::Reverse);
        assert_eq!(motor.magnitude, 20);

        motor.stop().unwrap();
        assert_eq!(motor.direction, Direction::Stopped);
        assert_eq!(motor.magnitude, 0);
        assert_eq!(
            motor.calls,
            vec![
                DriveAction::Forward(40),
                DriveAction::Backward(20),
                DriveAction::Stop
            ]
        );
        assert_eq!(motor.stop_count, 1);
    }

    #[test]
    fn mock_motor_failing() {
        let mut motor = MockMotor::failing();
        assert!(motor.forward(10).is_err());
        assert_eq!(motor.direction, Direction::Stopped);
        assert_eq!(motor.calls.len(), 1);
    }

    // =========================================================================
    // MockPulseInput Tests
    // =========================================================================

    #[test]
    fn mock_pulse_input_lifecycle() {
        let mut input = MockPulseInput::new();
        let handle = input.handle();
        let (tx, rx) = mpsc::channel();

        assert!(!handle.emit(EdgeEvent::Timeout));
        input.start(200, tx).unwrap();
        assert!(handle.is_started());
        assert_eq!(handle.watchdog_ms(), Some(200));

        assert!(handle.emit(EdgeEvent::Rising { tick: 7 }));
        assert_eq!(rx.recv().unwrap(), EdgeEvent::Rising { tick: 7 });

        input.stop();
        assert!(!handle.is_started());
        assert!(!handle.emit(EdgeEvent::Timeout));
        // sender dropped, channel closes
        assert!(rx.recv().is_err());
        assert_eq!(handle.stop_count(), 1);
    }

    #[test]
    fn mock_pulse_input_failing() {
        let mut input = MockPulseInput::failing();
        let handle = input.handle();
        let (tx, _rx) = mpsc::channel();
        assert!(input.start(200, tx).is_err());
        assert!(!handle.is_started());
    }

    // =========================================================================
    // MockSensor Tests
    // =========================================================================

    #[test]
    fn mock_sensor_keys_and_release() {
        let mut sensor = MockSensor::new("rpm1i", 1.0).with_reading("rpm2i", 2.0);
        assert_eq!(sensor.keys(), vec!["rpm1i".to_string(), "rpm2i".to_string()]);
        assert_eq!(sensor.read_count(), 0);

        sensor.release();
        assert_eq!(sensor.release_count, 1);
    }

    // =========================================================================
    // MockMqtt Tests
    // =========================================================================

    #[test]
    fn mock_mqtt_default() {
        let mqtt = MockMqtt::new();
        assert!(mqtt.connected);
        assert!(mqtt.published.is_empty());
        assert!(mqtt.subscriptions.is_empty());
        assert!(mqtt.incoming.is_empty());
    }

    #[test]
    fn mock_mqtt_message_queue_is_fifo() {
        let mut mqtt = MockMqtt::new();
        mqtt.queue_message("a", b"1".to_vec());
        mqtt.queue_message("b", b"2".to_vec());

        assert_eq!(mqtt.next_message().unwrap().topic, "a");
        assert_eq!(mqtt.next_message().unwrap().topic, "b");
        assert!(mqtt.next_message().is_none());
    }

    #[test]
    fn mock_mqtt_published_to() {
        let mut mqtt = MockMqtt::new();
        mqtt.publish("topic/a", &[1, 2, 3]).unwrap();
        mqtt.publish("topic/b", &[4, 5]).unwrap();
        mqtt.publish("topic/a", &[6]).unwrap();

        let to_a = mqtt.published_to("topic/a");
        assert_eq!(to_a, vec![&[1u8, 2, 3][..], &[6u8][..]]);
        assert_eq!(mqtt.published_to("topic/c").len(), 0);
    }

    #[test]
    fn mock_mqtt_disconnected() {
        let mut mqtt = MockMqtt::new();
        mqtt.connected = false;
        assert!(matches!(
            mqtt.publish("t", b"x"),
            Err(TransportError::NotConnected)
        ));
        assert!(mqtt.subscribe("t").is_err());
        assert_eq!(mqtt.publish_attempts, 1);
    }
}
