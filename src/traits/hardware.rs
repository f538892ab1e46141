//! Hardware abstraction traits for motors, pulse inputs and telemetry sensors.
//!
//! This module defines the interfaces between the control core and the
//! physical world. Everything on the far side of these traits (PWM drivers,
//! GPIO edge timers) is an external collaborator.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`Actuator`] | Signed duty-cycle DC motor drive |
//! | [`PulseInput`] | Rising-edge timestamps and watchdog timeouts |
//! | [`TelemetrySource`] | Keyed numeric readings pulled by the control loop |
//!
//! # Implementation
//!
//! For tests use the mocks from [`crate::hal::mock`]; for a hardware-free
//! run use the simulated drivers in [`crate::hal::sim`].
//!
//! # Example
//!
//! ```rust
//! use rs_buggy::traits::{Actuator, Direction};
//! use rs_buggy::hal::MockMotor;
//!
//! let mut motor = MockMotor::new();
//! motor.forward(40).unwrap();
//! assert_eq!(motor.direction, Direction::Forward);
//! assert_eq!(motor.magnitude, 40);
//! ```

use std::collections::BTreeMap;
use std::sync::mpsc::Sender;

/// Keyed numeric telemetry, serialized as a flat JSON object.
pub type Telemetry = BTreeMap<String, f64>;

/// Direction of wheel rotation.
///
/// # Default
///
/// Defaults to [`Stopped`](Self::Stopped) for safety.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Driving forward.
    Forward,
    /// Driving backward.
    Reverse,
    /// Not driven.
    #[default]
    Stopped,
}

impl Direction {
    /// Returns the direction as a lowercase string.
    ///
    /// ```
    /// use rs_buggy::Direction;
    ///
    /// assert_eq!(Direction::Forward.as_str(), "forward");
    /// assert_eq!(Direction::Stopped.as_str(), "stopped");
    /// ```
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
            Direction::Stopped => "stopped",
        }
    }

    /// Direction implied by the sign of a duty-cycle command.
    ///
    /// Only an exact zero maps to [`Stopped`](Self::Stopped).
    ///
    /// ```
    /// use rs_buggy::Direction;
    ///
    /// assert_eq!(Direction::from_duty(12.0), Direction::Forward);
    /// assert_eq!(Direction::from_duty(-0.5), Direction::Reverse);
    /// assert_eq!(Direction::from_duty(0.0), Direction::Stopped);
    /// ```
    pub fn from_duty(duty: f64) -> Self {
        if duty > 0.0 {
            Direction::Forward
        } else if duty < 0.0 {
            Direction::Reverse
        } else {
            Direction::Stopped
        }
    }
}

/// DC motor driven by a signed duty cycle.
///
/// The driver reports nothing back; the control loop treats every call as
/// best effort and only logs a returned error.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use rs_buggy::traits::Actuator;
///
/// struct HBridge { /* pwm handles */ }
///
/// impl Actuator for HBridge {
///     type Error = ();
///
///     fn forward(&mut self, magnitude: u8) -> Result<(), ()> {
///         // IN1 = duty, IN2 = 0
///         Ok(())
///     }
///
///     fn backward(&mut self, magnitude: u8) -> Result<(), ()> {
///         // IN1 = 0, IN2 = duty
///         Ok(())
///     }
///
///     fn stop(&mut self) -> Result<(), ()> {
///         Ok(())
///     }
/// }
/// ```
pub trait Actuator {
    /// Error type for driver operations.
    type Error: core::fmt::Debug;

    /// Drive forward at `magnitude` percent duty (0 to 100).
    fn forward(&mut self, magnitude: u8) -> Result<(), Self::Error>;

    /// Drive backward at `magnitude` percent duty (0 to 100).
    fn backward(&mut self, magnitude: u8) -> Result<(), Self::Error>;

    /// Remove drive from the motor.
    fn stop(&mut self) -> Result<(), Self::Error>;
}

/// One event from a pulse timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeEvent {
    /// A rising edge at `tick` microseconds. The counter wraps at 2^32.
    Rising {
        /// Timer tick in microseconds, modulo 2^32.
        tick: u32,
    },
    /// No edge was seen within the watchdog interval.
    Timeout,
}

/// A GPIO pulse timer that reports rising edges and watchdog timeouts.
///
/// After [`start`](Self::start) the input sends every event to `sink`. A
/// [`Timeout`](EdgeEvent::Timeout) is sent whenever `watchdog_ms` passes
/// without an edge. [`stop`](Self::stop) cancels the watchdog and the edge
/// callback and drops the sender; it must be safe to call more than once.
pub trait PulseInput {
    /// Error type for pulse input setup.
    type Error: core::fmt::Debug;

    /// Begin delivering edge events to `sink`.
    fn start(&mut self, watchdog_ms: u32, sink: Sender<EdgeEvent>) -> Result<(), Self::Error>;

    /// Stop delivering events and release the pin.
    fn stop(&mut self);
}

/// A sensor whose readings the control loop pulls once per cadence.
pub trait TelemetrySource {
    /// Telemetry keys this source writes.
    fn keys(&self) -> Vec<String>;

    /// Take a fresh reading.
    fn read(&self) -> Telemetry;

    /// Release the underlying subscription. Must be idempotent.
    fn release(&mut self);
}
