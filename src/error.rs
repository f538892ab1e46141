//! Error types shared across the crate.
//!
//! Setup problems ([`ConfigError`], [`RegistryError`]) are fatal and abort
//! startup before the control loop begins. Runtime problems on the hot path
//! (a malformed command, a failed publish, an actuator hiccup) are logged and
//! never surface as errors from the loop.

use thiserror::Error;

/// Invalid or unloadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `pulses_per_rev` must be strictly positive.
    #[error("pulses per revolution must be > 0, got {0}")]
    InvalidPulsesPerRev(f32),

    /// Watchdog interval must be non-zero.
    #[error("watchdog interval must be > 0 ms")]
    InvalidWatchdog,

    /// Control cadence must be non-zero.
    #[error("cadence must be > 0 ms")]
    InvalidCadence,

    /// An environment variable held an unparseable value.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },

    /// The credentials file could not be read.
    #[error("failed to read credentials from {path}: {source}")]
    Credentials {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The credentials file did not contain a user and a password line.
    #[error("credentials file {0} must contain a user line and a password line")]
    IncompleteCredentials(String),

    /// A pulse input refused its pin or timer assignment.
    #[error("pulse input for {key} failed to start: {reason}")]
    PulseInput {
        /// Telemetry key of the sensor being set up.
        key: String,
        /// Driver-reported reason.
        reason: String,
    },

    /// The edge consumer thread could not be spawned.
    #[error("failed to spawn edge consumer: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Device registration and binding errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A device with this id is already registered.
    #[error("device {0} already in use, device names must be unique")]
    DuplicateDevice(String),

    /// A binding referenced a device that was never registered.
    #[error("unknown device {0}")]
    UnknownDevice(String),

    /// An actuator binding referenced a command field the device doesn't declare.
    #[error("device {device} has no numeric command field {field}")]
    UnknownField {
        /// Device id.
        device: String,
        /// Field name.
        field: String,
    },
}

/// Transport failures reported by an [`MqttClient`](crate::traits::MqttClient).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The client is not connected to a broker.
    #[error("not connected")]
    NotConnected,

    /// The broker answered CONNECT with a failure return code.
    #[error("broker refused the connection: {reason}")]
    Refused {
        /// Return code reported in the CONNACK.
        reason: String,
    },

    /// The connection task ended before the broker answered.
    #[error("connection task stopped")]
    Closed,

    /// The outbound request queue rejected the message.
    #[error("publish to {topic} failed: {reason}")]
    Publish {
        /// Destination topic.
        topic: String,
        /// Client-reported reason.
        reason: String,
    },

    /// A subscription request failed.
    #[error("subscribe to {pattern} failed: {reason}")]
    Subscribe {
        /// Topic filter.
        pattern: String,
        /// Client-reported reason.
        reason: String,
    },
}
