//! # rs-buggy
//!
//! A two-motor buggy controller that measures wheel speed from encoder
//! pulses, takes drive commands from an MQTT dashboard and publishes wheel
//! RPM back to it.
//!
//! ## Features
//!
//! - **RPM estimation**: Smoothed pulse-period tracking with tick wraparound
//!   and a watchdog that walks the reading to zero when the wheel stops
//! - **Device registry**: Topic patterns, command fields and telemetry keys
//!   for every device in one place
//! - **Command routing**: JSON commands applied atomically, bad messages
//!   dropped without disturbing anything else
//! - **Control loop**: Motors driven every iteration, telemetry sampled and
//!   published on a fixed cadence
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `traits` - Hardware and network abstractions
//! - `estimator` / `speed_sensor` - Edge events to RPM
//! - `registry` / `router` / `commands` - Devices and inbound commands
//! - `control_loop` - Apply, sample, publish
//! - `hal` - Concrete implementations (mock for testing, sim for headless runs)
//! - `services` - `rumqttc` transport (feature `mqtt`)
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Instant;
//!
//! use rs_buggy::{
//!     CommandField, CommandRouter, ControlLoop, DeviceRegistry, DeviceSpec, LoopConfig,
//!     hal::{MockMotor, MockMqtt, MockSensor},
//! };
//!
//! let mut registry = DeviceRegistry::new();
//! registry.register(
//!     DeviceSpec::new("buggy")
//!         .with_inbound("nred2pi/buggyZCMD/+")
//!         .with_command_field(CommandField::number("left")),
//! ).unwrap();
//! let registry = Arc::new(registry);
//!
//! let router = CommandRouter::new(Arc::clone(&registry));
//! let mut control: ControlLoop<MockMotor, MockSensor, MockMqtt> =
//!     ControlLoop::new(registry, MockMqtt::new(), &LoopConfig::default()).unwrap();
//! control.bind_actuator("buggy", "left", MockMotor::new()).unwrap();
//!
//! router.route("nred2pi/buggyZCMD/drive", br#"{"left": -25}"#);
//! control.run_iteration(Instant::now());
//!
//! assert_eq!(control.actuator(0).unwrap().magnitude, 25);
//! ```

#![warn(missing_docs)]

/// Command fields, values and drive actions.
pub mod commands;
/// Configuration with defaults, builders and environment loading.
pub mod config;
/// The apply/sample/publish loop.
pub mod control_loop;
/// Error types.
pub mod error;
/// Pulse period smoothing and RPM conversion.
pub mod estimator;
/// Hardware abstraction layer with mock and simulated implementations.
pub mod hal;
/// Log subscriber setup.
pub mod logging;
/// Telemetry wire format.
pub mod messages;
/// Device table and topic lookup.
pub mod registry;
/// Inbound command routing.
pub mod router;
/// Network services (feature-gated).
pub mod services;
/// Pulse input plus estimator as a telemetry source.
pub mod speed_sensor;
/// Core traits for hardware and network abstraction.
pub mod traits;

// Re-exports for convenience
pub use commands::{Command, CommandField, CommandState, CommandValue, DriveAction, FieldKind};
pub use config::{Config, EstimatorConfig, LoopConfig, MqttConfig};
pub use control_loop::{ActuatorBinding, ControlLoop, IterationReport, SensorBinding};
pub use error::{ConfigError, RegistryError, TransportError};
pub use estimator::{PeriodEstimate, RpmEstimator};
pub use registry::{Device, DeviceRegistry, DeviceSpec, DeviceState};
pub use router::{CommandRouter, RouteOutcome, TopicParts};
pub use speed_sensor::SpeedSensor;
pub use traits::{
    // Hardware
    Actuator,
    Direction,
    EdgeEvent,
    PulseInput,
    Telemetry,
    TelemetrySource,
    // Network
    MqttClient,
    MqttMessage,
};
