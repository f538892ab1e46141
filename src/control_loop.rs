//! The control/telemetry loop.
//!
//! Each iteration runs up to four phases:
//!
//! 1. **Apply** (every iteration): each actuator binding reads its device's
//!    command field and drives the motor with exactly one call.
//! 2. **Sample** (once per cadence): each sensor binding is read into its
//!    device's latest telemetry, which marks the device dirty.
//! 3. **Publish** (same gate): each dirty device's telemetry is published to
//!    its outbound topic and the dirty flag cleared, even if publishing fails.
//! 4. **Reset**: the cadence timer restarts at the iteration's start time.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//!
//! use rs_buggy::commands::CommandField;
//! use rs_buggy::config::LoopConfig;
//! use rs_buggy::control_loop::ControlLoop;
//! use rs_buggy::hal::{MockMotor, MockMqtt, MockSensor};
//! use rs_buggy::registry::{DeviceRegistry, DeviceSpec};
//! use rs_buggy::router::CommandRouter;
//!
//! let mut registry = DeviceRegistry::new();
//! registry
//!     .register(
//!         DeviceSpec::new("buggy")
//!             .with_inbound("nred2pi/buggyZCMD/+")
//!             .with_outbound("pi2nred/buggy/pispeedSensor")
//!             .with_command_field(CommandField::number("right"))
//!             .with_sensor_key("rpm1i"),
//!     )
//!     .unwrap();
//! let registry = Arc::new(registry);
//! let router = CommandRouter::new(Arc::clone(&registry));
//!
//! let mut control: ControlLoop<MockMotor, MockSensor, MockMqtt> =
//!     ControlLoop::new(Arc::clone(&registry), MockMqtt::new(), &LoopConfig::default()).unwrap();
//! control.bind_actuator("buggy", "right", MockMotor::new()).unwrap();
//! control.bind_sensor("buggy", MockSensor::new("rpm1i", 60.0)).unwrap();
//!
//! router.route("nred2pi/buggyZCMD/drive", br#"{"right": 40}"#);
//!
//! let t0 = Instant::now();
//! control.run_iteration(t0);
//! control.run_iteration(t0 + Duration::from_millis(500));
//!
//! assert_eq!(control.actuator(0).unwrap().magnitude, 40);
//! assert_eq!(control.client().published_to("pi2nred/buggy/pispeedSensor"), vec![br#"{"rpm1i":60}"#]);
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;

use crate::commands::DriveAction;
use crate::config::LoopConfig;
use crate::error::{ConfigError, RegistryError};
use crate::messages::encode_telemetry;
use crate::registry::DeviceRegistry;
use crate::traits::{Actuator, MqttClient, TelemetrySource};

// ============================================================================
// Bindings
// ============================================================================

/// An actuator driven by one numeric command field of a device.
#[derive(Debug)]
pub struct ActuatorBinding<A> {
    /// Device id.
    pub device: String,
    /// Command field holding the signed duty.
    pub field: String,
    /// The motor.
    pub actuator: A,
}

/// A telemetry source feeding one device.
#[derive(Debug)]
pub struct SensorBinding<S> {
    /// Device id.
    pub device: String,
    /// The sensor.
    pub sensor: S,
}

/// What one call to [`ControlLoop::run_iteration`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IterationReport {
    /// Actuator calls made.
    pub applied: usize,
    /// Whether the cadence gate opened.
    pub sampled: bool,
    /// Messages handed to the client successfully.
    pub published: usize,
}

// ============================================================================
// Control Loop
// ============================================================================

/// Drives actuators from device commands and publishes sensor telemetry.
pub struct ControlLoop<A: Actuator, S: TelemetrySource, C: MqttClient> {
    registry: Arc<DeviceRegistry>,
    client: C,
    actuators: Vec<ActuatorBinding<A>>,
    sensors: Vec<SensorBinding<S>>,
    cadence: Duration,
    apply_interval: Duration,
    speed_sensor_enabled: bool,
    last_cadence: Option<Instant>,
    shut_down: bool,
}

impl<A: Actuator, S: TelemetrySource, C: MqttClient> ControlLoop<A, S, C> {
    /// Loop over a frozen registry, publishing through `client`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidCadence`] for a zero cadence.
    pub fn new(
        registry: Arc<DeviceRegistry>,
        client: C,
        config: &LoopConfig,
    ) -> Result<Self, ConfigError> {
        if config.cadence_ms == 0 {
            return Err(ConfigError::InvalidCadence);
        }
        Ok(Self {
            registry,
            client,
            actuators: Vec::new(),
            sensors: Vec::new(),
            cadence: Duration::from_millis(u64::from(config.cadence_ms)),
            apply_interval: Duration::from_millis(u64::from(config.apply_interval_ms.max(1))),
            speed_sensor_enabled: config.speed_sensor_enabled,
            last_cadence: None,
            shut_down: false,
        })
    }

    /// Drive `actuator` from numeric command `field` of `device`.
    ///
    /// # Errors
    ///
    /// The device is unknown or doesn't declare `field` as a number.
    pub fn bind_actuator(
        &mut self,
        device: &str,
        field: &str,
        actuator: A,
    ) -> Result<(), RegistryError> {
        self.registry.require_number_field(device, field)?;
        tracing::info!(device = %device, field = %field, "actuator bound");
        self.actuators.push(ActuatorBinding {
            device: device.to_string(),
            field: field.to_string(),
            actuator,
        });
        Ok(())
    }

    /// Feed `sensor`'s readings into `device`.
    ///
    /// With speed sensing disabled the sensor is released straight away.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownDevice`].
    pub fn bind_sensor(&mut self, device: &str, mut sensor: S) -> Result<(), RegistryError> {
        if self.registry.get(device).is_none() {
            return Err(RegistryError::UnknownDevice(device.to_string()));
        }
        if !self.speed_sensor_enabled {
            tracing::info!(device = %device, "speed sensing disabled, sensor not attached");
            sensor.release();
            return Ok(());
        }
        tracing::info!(device = %device, keys = ?sensor.keys(), "sensor bound");
        self.sensors.push(SensorBinding {
            device: device.to_string(),
            sensor,
        });
        Ok(())
    }

    /// Subscribe the client to every inbound pattern in the registry.
    ///
    /// Returns the number of successful subscriptions; failures are logged.
    pub fn subscribe(&mut self) -> usize {
        let mut ok = 0;
        for pattern in self.registry.subscriptions() {
            match self.client.subscribe(&pattern) {
                Ok(()) => {
                    tracing::info!(pattern = %pattern, "subscribed");
                    ok += 1;
                }
                Err(e) => tracing::warn!(pattern = %pattern, error = %e, "subscribe failed"),
            }
        }
        ok
    }

    /// Run one iteration with `now` as the phase start time.
    ///
    /// The first iteration starts the cadence timer without sampling.
    pub fn run_iteration(&mut self, now: Instant) -> IterationReport {
        let mut report = IterationReport {
            applied: self.apply(),
            ..IterationReport::default()
        };

        let Some(last) = self.last_cadence else {
            self.last_cadence = Some(now);
            return report;
        };
        if now.saturating_duration_since(last) < self.cadence {
            return report;
        }

        self.sample();
        report.sampled = true;
        report.published = self.publish();
        self.last_cadence = Some(now);
        report
    }

    fn apply(&mut self) -> usize {
        let registry = &self.registry;
        let mut calls = 0;
        for binding in &mut self.actuators {
            let value = registry
                .get(&binding.device)
                .and_then(|d| d.command_number(&binding.field))
                .unwrap_or(0.0);

            let result = match DriveAction::from_magnitude(value) {
                DriveAction::Forward(m) => binding.actuator.forward(m),
                DriveAction::Backward(m) => binding.actuator.backward(m),
                DriveAction::Stop => binding.actuator.stop(),
            };
            calls += 1;

            if let Err(e) = result {
                tracing::warn!(
                    device = %binding.device,
                    field = %binding.field,
                    error = ?e,
                    "actuator command failed"
                );
            }
        }
        calls
    }

    fn sample(&mut self) {
        for binding in &self.sensors {
            let Some(device) = self.registry.get(&binding.device) else {
                continue;
            };
            let reading = binding.sensor.read();
            let mut state = device.state();
            state.latest_telemetry.extend(reading);
            state.dirty = true;
        }
    }

    fn publish(&mut self) -> usize {
        let mut sent = 0;
        for device in self.registry.devices() {
            let payload = {
                let mut state = device.state();
                if !state.dirty {
                    continue;
                }
                state.dirty = false;
                encode_telemetry(&state.latest_telemetry)
            };

            let Some(topic) = device.outbound_topic() else {
                continue;
            };
            tracing::debug!(
                topic = %topic,
                payload = %String::from_utf8_lossy(&payload),
                "publishing telemetry"
            );
            match self.client.publish(topic, &payload) {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!(device = %device.id(), error = %e, "publish failed"),
            }
        }
        sent
    }

    /// Iterate every apply interval until `shutdown` resolves, then release
    /// all hardware.
    ///
    /// A running iteration always completes before shutdown.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.apply_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            actuators = self.actuators.len(),
            sensors = self.sensors.len(),
            cadence_ms = self.cadence.as_millis() as u64,
            "control loop running"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.run_iteration(tokio::time::Instant::now().into_std());
                }
            }
        }

        self.shutdown();
    }

    /// Stop every actuator and release every sensor. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        for binding in &mut self.actuators {
            if let Err(e) = binding.actuator.stop() {
                tracing::warn!(device = %binding.device, error = ?e, "failed to stop actuator");
            }
        }
        for binding in &mut self.sensors {
            binding.sensor.release();
        }
        tracing::info!("control loop shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// The shared registry.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// The outbound client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Mutable access to the outbound client.
    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// Actuator of the `index`th binding.
    pub fn actuator(&self, index: usize) -> Option<&A> {
        self.actuators.get(index).map(|b| &b.actuator)
    }

    /// Sensor of the `index`th binding.
    pub fn sensor(&self, index: usize) -> Option<&S> {
        self.sensors.get(index).map(|b| &b.sensor)
    }
}

impl<A: Actuator, S: TelemetrySource, C: MqttClient> Drop for ControlLoop<A, S, C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
