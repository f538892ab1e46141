//! Network abstraction for the pub/sub transport.
//!
//! The control core only needs three things from the transport: subscribe to
//! a topic filter, publish bytes to a topic without waiting for an
//! acknowledgement, and hand inbound messages to the
//! [`CommandRouter`](crate::router::CommandRouter). Connection, retry and
//! authentication all live inside the implementation.
//!
//! # Topic Layout
//!
//! ```text
//! nred2pi/buggyZCMD/+         - Inbound commands for the "buggy" class
//! pi2nred/buggy/pispeedSensor - Outbound telemetry
//! ```

use crate::error::TransportError;

/// MQTT client trait for pub/sub messaging.
///
/// # Implementation Notes
///
/// - `publish` must not block on a broker round trip; queue and return
/// - `subscribe` supports `+` and `#` wildcards
/// - Inbound delivery happens on the implementation's own context
///
/// # Example
///
/// ```rust
/// use rs_buggy::traits::MqttClient;
/// use rs_buggy::hal::MockMqtt;
///
/// let mut client = MockMqtt::new();
/// client.publish("pi2nred/buggy/speed", br#"{"rpm1i":120}"#).unwrap();
/// assert_eq!(client.published_to("pi2nred/buggy/speed").len(), 1);
/// ```
pub trait MqttClient {
    /// Publish a message to a topic, fire-and-forget.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Subscribe to a topic filter.
    fn subscribe(&mut self, pattern: &str) -> Result<(), TransportError>;

    /// Check if connected to broker.
    fn is_connected(&self) -> bool;
}

/// An MQTT message received from a subscription.
#[derive(Clone, Debug, PartialEq)]
pub struct MqttMessage {
    /// Topic the message was published to.
    pub topic: String,
    /// Message payload as raw bytes.
    pub payload: Vec<u8>,
}

impl MqttMessage {
    /// Create a new MQTT message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Returns true if `topic` matches the MQTT topic filter `pattern`.
///
/// `+` matches exactly one non-empty level, a trailing `#` matches any
/// remaining levels.
///
/// ```
/// use rs_buggy::traits::topic_matches;
///
/// assert!(topic_matches("nred2pi/buggyZCMD/+", "nred2pi/buggyZCMD/drive"));
/// assert!(!topic_matches("nred2pi/buggyZCMD/+", "nred2pi/buggyZCMD"));
/// assert!(topic_matches("nred2pi/#", "nred2pi/a/b/c"));
/// ```
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut pattern_levels = pattern.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (pattern_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(level)) => {
                if level.is_empty() {
                    return false;
                }
            }
            (Some(p), Some(t)) => {
                if p != t {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}
