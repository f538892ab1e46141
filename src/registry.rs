//! Device registry: the single source of truth mapping devices to their
//! topics, command fields and telemetry keys.
//!
//! Devices are registered during setup. The registry is then frozen behind an
//! `Arc` and shared by the [`CommandRouter`](crate::router::CommandRouter)
//! and the [`ControlLoop`](crate::control_loop::ControlLoop).
//!
//! # Topic lookup
//!
//! Inbound patterns of the shape `<namespace>/<class>/+` are indexed by
//! pattern, so a topic `a/b/c` resolves with one hash lookup on `a/b/+`.
//! Patterns of any other shape fall back to a linear wildcard scan in
//! registration order.
//!
//! ```rust
//! use rs_buggy::commands::CommandField;
//! use rs_buggy::registry::{DeviceRegistry, DeviceSpec};
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
//!
//! assert_eq!(registry.lookup_by_topic("nred2pi/buggyZCMD/drive"), Some("buggy"));
//! assert_eq!(registry.lookup_by_topic("nred2pi/otherZCMD/drive"), None);
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::commands::{CommandField, CommandState, FieldKind};
use crate::error::RegistryError;
use crate::traits::{topic_matches, Telemetry};

// ============================================================================
// Device Description
// ============================================================================

/// Everything needed to register a device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Unique device id.
    pub id: String,
    /// Topic filter commands arrive on.
    pub inbound_pattern: Option<String>,
    /// Topic telemetry is published to.
    pub outbound_topic: Option<String>,
    /// Command fields the device accepts.
    pub command_fields: Vec<CommandField>,
    /// Telemetry keys this device owns.
    pub sensor_keys: Vec<String>,
}

impl DeviceSpec {
    /// Bare device with no topics, fields or sensors.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Subscribe to commands on `pattern`.
    pub fn with_inbound(mut self, pattern: impl Into<String>) -> Self {
        self.inbound_pattern = Some(pattern.into());
        self
    }

    /// Publish telemetry to `topic`.
    pub fn with_outbound(mut self, topic: impl Into<String>) -> Self {
        self.outbound_topic = Some(topic.into());
        self
    }

    /// Accept a command field.
    pub fn with_command_field(mut self, field: CommandField) -> Self {
        self.command_fields.push(field);
        self
    }

    /// Own a telemetry key.
    pub fn with_sensor_key(mut self, key: impl Into<String>) -> Self {
        self.sensor_keys.push(key.into());
        self
    }
}

/// Mutable per-device state, always accessed under the device's lock.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceState {
    /// Latest command values.
    pub command: CommandState,
    /// Latest sampled telemetry.
    pub latest_telemetry: Telemetry,
    /// Telemetry changed since the last publish.
    pub dirty: bool,
}

/// A registered device.
#[derive(Debug)]
pub struct Device {
    id: String,
    inbound_pattern: Option<String>,
    outbound_topic: Option<String>,
    command_fields: Vec<CommandField>,
    sensor_keys: Vec<String>,
    state: Mutex<DeviceState>,
}

impl Device {
    fn from_spec(spec: DeviceSpec) -> Self {
        let state = DeviceState {
            command: CommandState::from_fields(&spec.command_fields),
            ..DeviceState::default()
        };
        Self {
            id: spec.id,
            inbound_pattern: spec.inbound_pattern,
            outbound_topic: spec.outbound_topic,
            command_fields: spec.command_fields,
            sensor_keys: spec.sensor_keys,
            state: Mutex::new(state),
        }
    }

    /// Device id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Inbound command pattern, if any.
    pub fn inbound_pattern(&self) -> Option<&str> {
        self.inbound_pattern.as_deref()
    }

    /// Outbound telemetry topic, if any.
    pub fn outbound_topic(&self) -> Option<&str> {
        self.outbound_topic.as_deref()
    }

    /// Declared command fields.
    pub fn command_fields(&self) -> &[CommandField] {
        &self.command_fields
    }

    /// Declared field named `name`.
    pub fn command_field(&self, name: &str) -> Option<&CommandField> {
        self.command_fields.iter().find(|f| f.name == name)
    }

    /// Owned telemetry keys.
    pub fn sensor_keys(&self) -> &[String] {
        &self.sensor_keys
    }

    /// Lock the device state.
    ///
    /// A poisoned lock is recovered; the state is plain data and stays valid.
    pub fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> DeviceState {
        self.state().clone()
    }

    /// Numeric command value of `field`.
    pub fn command_number(&self, field: &str) -> Option<f64> {
        self.state().command.number(field)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Append-only table of devices.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    by_id: HashMap<String, usize>,
    indexed_patterns: HashMap<String, usize>,
    scanned_patterns: Vec<(String, usize)>,
    key_owners: HashMap<String, usize>,
}

impl DeviceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device.
    ///
    /// A sensor key already owned by another device is logged as a collision
    /// and the registration proceeds. An inbound pattern already owned by
    /// another device keeps routing to that device.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateDevice`] when the id is taken.
    pub fn register(&mut self, spec: DeviceSpec) -> Result<(), RegistryError> {
        if self.by_id.contains_key(&spec.id) {
            return Err(RegistryError::DuplicateDevice(spec.id));
        }

        let index = self.devices.len();
        let device = Device::from_spec(spec);

        for key in &device.sensor_keys {
            match self.key_owners.get(key) {
                Some(&owner) => tracing::warn!(
                    key = %key,
                    owner = %self.devices[owner].id,
                    device = %device.id,
                    "sensor key collision, key already used by another device"
                ),
                None => {
                    self.key_owners.insert(key.clone(), index);
                }
            }
        }

        if let Some(pattern) = &device.inbound_pattern {
            self.index_pattern(pattern, index, &device.id);
        }

        tracing::info!(
            device = %device.id,
            inbound = device.inbound_pattern.as_deref().unwrap_or("-"),
            outbound = device.outbound_topic.as_deref().unwrap_or("-"),
            "device registered"
        );

        self.by_id.insert(device.id.clone(), index);
        self.devices.push(device);
        Ok(())
    }

    fn index_pattern(&mut self, pattern: &str, index: usize, id: &str) {
        let owner = self.indexed_patterns.get(pattern).copied().or_else(|| {
            self.scanned_patterns
                .iter()
                .find(|(p, _)| p == pattern)
                .map(|&(_, i)| i)
        });
        if let Some(owner) = owner {
            tracing::warn!(
                pattern = %pattern,
                owner = %self.devices[owner].id,
                device = %id,
                "inbound pattern already registered, keeping first owner"
            );
            return;
        }

        if is_indexable(pattern) {
            self.indexed_patterns.insert(pattern.to_string(), index);
        } else {
            self.scanned_patterns.push((pattern.to_string(), index));
        }
    }

    /// Id of the device whose inbound pattern matches `topic`.
    pub fn lookup_by_topic(&self, topic: &str) -> Option<&str> {
        self.device_for_topic(topic).map(Device::id)
    }

    /// Device whose inbound pattern matches `topic`.
    pub fn device_for_topic(&self, topic: &str) -> Option<&Device> {
        let indexed = topic
            .rsplit_once('/')
            .filter(|(prefix, last)| !last.is_empty() && prefix.matches('/').count() == 1)
            .and_then(|(prefix, _)| self.indexed_patterns.get(&format!("{prefix}/+")));

        indexed
            .or_else(|| {
                self.scanned_patterns
                    .iter()
                    .find(|(pattern, _)| topic_matches(pattern, topic))
                    .map(|(_, index)| index)
            })
            .map(|&index| &self.devices[index])
    }

    /// Device by id.
    pub fn get(&self, id: &str) -> Option<&Device> {
        self.by_id.get(id).map(|&i| &self.devices[i])
    }

    /// Devices in registration order.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    /// Inbound patterns to subscribe to, without duplicates.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut patterns: Vec<String> = Vec::new();
        for pattern in self.devices.iter().filter_map(Device::inbound_pattern) {
            if !patterns.iter().any(|p| p == pattern) {
                patterns.push(pattern.to_string());
            }
        }
        patterns
    }

    /// Check that `device` declares numeric `field`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownDevice`] or [`RegistryError::UnknownField`].
    pub fn require_number_field(&self, device: &str, field: &str) -> Result<(), RegistryError> {
        let dev = self
            .get(device)
            .ok_or_else(|| RegistryError::UnknownDevice(device.to_string()))?;
        match dev.command_field(field) {
            Some(f) if f.kind == FieldKind::Number => Ok(()),
            _ => Err(RegistryError::UnknownField {
                device: device.to_string(),
                field: field.to_string(),
            }),
        }
    }

    /// Number of devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// No devices registered.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// `<ns>/<lvl2>/+` with literal first two levels.
fn is_indexable(pattern: &str) -> bool {
    let levels: Vec<&str> = pattern.split('/').collect();
    levels.len() == 3
        && levels[2] == "+"
        && levels[..2]
            .iter()
            .all(|l| !l.is_empty() && *l != "+" && *l != "#")
}
