//! Simulated drivers for running the full stack without a buggy.
//!
//! A [`SimMotor`] and [`SimPulseInput`] created together by [`sim_wheel`]
//! share the commanded duty. The pulse input turns that duty into a wheel
//! speed proportional to it and emits rising edges at the matching rate, or
//! watchdog timeouts while the wheel stands still.
//!
//! # Example
//!
//! ```rust
//! use rs_buggy::hal::sim::sim_wheel;
//! use rs_buggy::traits::Actuator;
//!
//! let (mut motor, _wheel) = sim_wheel("right", 200.0, 20.0);
//! motor.forward(50).unwrap();
//! assert_eq!(motor.duty(), 50);
//! ```

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::join_worker;
use crate::traits::{Actuator, EdgeEvent, PulseInput};

/// Create a motor and the pulse input of the wheel it drives.
///
/// `max_rpm` is the wheel speed at 100 % duty; `pulses_per_rev` is the
/// encoder resolution.
pub fn sim_wheel(name: &str, max_rpm: f32, pulses_per_rev: f32) -> (SimMotor, SimPulseInput) {
    let duty = Arc::new(AtomicI32::new(0));
    let motor = SimMotor {
        name: name.to_string(),
        duty: Arc::clone(&duty),
    };
    let input = SimPulseInput {
        name: name.to_string(),
        duty,
        max_rpm,
        pulses_per_rev,
        running: Arc::new(AtomicBool::new(false)),
        worker: None,
    };
    (motor, input)
}

// ────────────────────────────────────────────────────────────────────────────
// Motor
// ────────────────────────────────────────────────────────────────────────────

/// A simulated H-bridge motor. Always succeeds.
#[derive(Debug)]
pub struct SimMotor {
    name: String,
    duty: Arc<AtomicI32>,
}

impl SimMotor {
    /// Signed duty last commanded, in percent.
    pub fn duty(&self) -> i32 {
        self.duty.load(Ordering::Relaxed)
    }

    fn set(&self, duty: i32) {
        if self.duty.swap(duty, Ordering::Relaxed) != duty {
            tracing::debug!(motor = %self.name, duty, "sim motor");
        }
    }
}

impl Actuator for SimMotor {
    type Error = core::convert::Infallible;

    fn forward(&mut self, magnitude: u8) -> Result<(), Self::Error> {
        self.set(i32::from(magnitude.min(100)));
        Ok(())
    }

    fn backward(&mut self, magnitude: u8) -> Result<(), Self::Error> {
        self.set(-i32::from(magnitude.min(100)));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Self::Error> {
        self.set(0);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pulse input
// ────────────────────────────────────────────────────────────────────────────

/// A simulated wheel encoder driven by its paired [`SimMotor`].
#[derive(Debug)]
pub struct SimPulseInput {
    name: String,
    duty: Arc<AtomicI32>,
    max_rpm: f32,
    pulses_per_rev: f32,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SimPulseInput {
    /// Time between edges at `duty`, or `None` when the wheel is still.
    fn edge_period(duty: i32, max_rpm: f32, pulses_per_rev: f32) -> Option<Duration> {
        let rpm = max_rpm * duty.unsigned_abs() as f32 / 100.0;
        if rpm <= 0.0 || pulses_per_rev <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f32(60.0 / (rpm * pulses_per_rev)))
    }
}

impl PulseInput for SimPulseInput {
    type Error = std::io::Error;

    fn start(&mut self, watchdog_ms: u32, sink: Sender<EdgeEvent>) -> Result<(), Self::Error> {
        self.stop();

        let watchdog = Duration::from_millis(u64::from(watchdog_ms));
        let duty = Arc::clone(&self.duty);
        let running = Arc::clone(&self.running);
        let (max_rpm, ppr) = (self.max_rpm, self.pulses_per_rev);
        running.store(true, Ordering::Release);

        let worker = thread::Builder::new()
            .name(format!("sim-wheel-{}", self.name))
            .spawn(move || {
                let epoch = Instant::now();
                while running.load(Ordering::Acquire) {
                    let event = match Self::edge_period(duty.load(Ordering::Relaxed), max_rpm, ppr)
                    {
                        Some(period) if period < watchdog => {
                            thread::sleep(period);
                            // microsecond counter wraps at 2^32 like the hardware timer
                            EdgeEvent::Rising {
                                tick: epoch.elapsed().as_micros() as u32,
                            }
                        }
                        _ => {
                            thread::sleep(watchdog);
                            EdgeEvent::Timeout
                        }
                    };
                    if sink.send(event).is_err() {
                        break;
                    }
                }
            });

        match worker {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            join_worker(worker);
        }
    }
}

impl Drop for SimPulseInput {
    fn drop(&mut self) {
        self.stop();
    }
}
