//! Trait definitions for hardware and network abstraction.
//!
//! # Submodules
//!
//! - `hardware`: Motor actuators, pulse inputs, telemetry sources
//! - `network`: MQTT client trait and topic matching
//!
//! # Hardware Abstraction
//!
//! - [`Actuator`]: signed duty-cycle DC motor
//! - [`PulseInput`]: rising-edge timer feeding the RPM estimator
//! - [`TelemetrySource`]: keyed readings pulled by the control loop

pub mod hardware;
pub mod network;

pub use hardware::*;
pub use network::*;
