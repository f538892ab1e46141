//! Command types for remote control of devices.
//!
//! Inbound commands are flat JSON objects whose fields each device declares
//! up front with a [`CommandField`]. A parsed [`Command`] carries only the
//! fields present in the message; applying it to a [`CommandState`]
//! overwrites those fields and leaves the rest alone.
//!
//! # Command Flow
//!
//! 1. The [`CommandRouter`](crate::router::CommandRouter) resolves the topic to a device
//! 2. [`Command::parse`] validates the payload against the device's fields
//! 3. The command is applied to the device's [`CommandState`] under its lock
//! 4. The control loop reads numeric fields each iteration and converts them
//!    to a [`DriveAction`] for the bound actuator
//!
//! ```rust
//! use rs_buggy::commands::{Command, CommandField, CommandState, CommandValue};
//!
//! let fields = [
//!     CommandField::number("right"),
//!     CommandField::number("left"),
//!     CommandField::text("moving"),
//! ];
//! let mut state = CommandState::from_fields(&fields);
//!
//! let cmd = Command::parse("buggy", br#"{"right": 50, "moving": "go"}"#, &fields).unwrap();
//! state.apply(&cmd);
//!
//! assert_eq!(state.number("right"), Some(50.0));
//! assert_eq!(state.number("left"), Some(0.0));
//! assert_eq!(state.get("moving"), Some(&CommandValue::Text("go".into())));
//! ```

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::traits::Direction;

/// Magnitude limit for duty-cycle commands, in percent.
pub const MAX_MAGNITUDE: f64 = 100.0;

// ============================================================================
// Field Declarations
// ============================================================================

/// The JSON type a command field accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// A JSON number.
    Number,
    /// A JSON boolean.
    Bool,
    /// A JSON string.
    Text,
}

/// A command field a device accepts.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CommandField {
    /// JSON key.
    pub name: String,
    /// Accepted value type.
    pub kind: FieldKind,
}

impl CommandField {
    /// Numeric field.
    pub fn number(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Number,
        }
    }

    /// Boolean field.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Bool,
        }
    }

    /// String field.
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Text,
        }
    }
}

// ============================================================================
// Values and State
// ============================================================================

/// A single command field value.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum CommandValue {
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Bool(bool),
    /// String value.
    Text(String),
}

impl CommandValue {
    /// Zero value for a field kind.
    pub fn default_for(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Number => CommandValue::Number(0.0),
            FieldKind::Bool => CommandValue::Bool(false),
            FieldKind::Text => CommandValue::Text(String::new()),
        }
    }

    /// Numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CommandValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn from_json(kind: FieldKind, value: &Value) -> Option<Self> {
        match (kind, value) {
            (FieldKind::Number, Value::Number(n)) => n.as_f64().map(CommandValue::Number),
            (FieldKind::Bool, Value::Bool(b)) => Some(CommandValue::Bool(*b)),
            (FieldKind::Text, Value::String(s)) => Some(CommandValue::Text(s.clone())),
            _ => None,
        }
    }
}

/// Live command values of one device.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandState {
    fields: BTreeMap<String, CommandValue>,
}

impl CommandState {
    /// State with every declared field at its zero value.
    pub fn from_fields(fields: &[CommandField]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|f| (f.name.clone(), CommandValue::default_for(f.kind)))
                .collect(),
        }
    }

    /// Overwrite the fields named in `cmd`.
    pub fn apply(&mut self, cmd: &Command) {
        for (name, value) in &cmd.fields {
            self.fields.insert(name.clone(), value.clone());
        }
    }

    /// Value of a field.
    pub fn get(&self, name: &str) -> Option<&CommandValue> {
        self.fields.get(name)
    }

    /// Numeric value of a field.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(CommandValue::as_number)
    }

    /// Iterate over all fields.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CommandValue)> {
        self.fields.iter()
    }
}

// ============================================================================
// Parsed Command
// ============================================================================

/// Why an inbound payload was rejected.
#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    /// Payload bytes were not valid UTF-8.
    #[error("payload is not UTF-8")]
    NotUtf8,
    /// Payload was not valid JSON.
    #[error("payload is not JSON: {0}")]
    NotJson(String),
    /// Payload was JSON but not an object.
    #[error("payload is not a JSON object")]
    NotObject,
    /// A declared field had the wrong JSON type.
    #[error("field {field} must be a {expected:?}")]
    WrongType {
        /// Field name.
        field: String,
        /// Declared kind.
        expected: FieldKind,
    },
    /// The object held none of the device's fields.
    #[error("payload has none of the expected fields")]
    NoKnownFields,
}

/// A command addressed to one device. Transient: applied as soon as parsed.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    /// Device the command targets.
    pub target: String,
    /// Fields present in the message.
    pub fields: BTreeMap<String, CommandValue>,
}

impl Command {
    /// Parse a JSON payload against a device's declared fields.
    ///
    /// Undeclared keys are ignored. Every declared key that is present must
    /// have the declared type, and at least one must be present.
    pub fn parse(
        target: &str,
        payload: &[u8],
        declared: &[CommandField],
    ) -> Result<Self, PayloadError> {
        let text = core::str::from_utf8(payload).map_err(|_| PayloadError::NotUtf8)?;
        let json: Value =
            serde_json::from_str(text).map_err(|e| PayloadError::NotJson(e.to_string()))?;
        let object = json.as_object().ok_or(PayloadError::NotObject)?;

        let mut fields = BTreeMap::new();
        for field in declared {
            if let Some(raw) = object.get(&field.name) {
                let value =
                    CommandValue::from_json(field.kind, raw).ok_or_else(|| PayloadError::WrongType {
                        field: field.name.clone(),
                        expected: field.kind,
                    })?;
                fields.insert(field.name.clone(), value);
            }
        }

        if fields.is_empty() {
            return Err(PayloadError::NoKnownFields);
        }

        Ok(Self {
            target: target.to_string(),
            fields,
        })
    }
}

// ============================================================================
// Drive Actions
// ============================================================================

/// The single actuator call one apply step makes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriveAction {
    /// `forward(magnitude)`
    Forward(u8),
    /// `backward(magnitude)`
    Backward(u8),
    /// `stop()`
    Stop,
}

impl DriveAction {
    /// Clamp a signed duty command to [-100, 100] and pick the call by sign.
    ///
    /// Only an exact zero stops; NaN is treated as zero.
    ///
    /// ```
    /// use rs_buggy::commands::DriveAction;
    ///
    /// assert_eq!(DriveAction::from_magnitude(150.0), DriveAction::Forward(100));
    /// assert_eq!(DriveAction::from_magnitude(-150.0), DriveAction::Backward(100));
    /// assert_eq!(DriveAction::from_magnitude(0.0), DriveAction::Stop);
    /// ```
    pub fn from_magnitude(magnitude: f64) -> Self {
        let magnitude = if magnitude.is_nan() { 0.0 } else { magnitude };
        let clamped = magnitude.clamp(-MAX_MAGNITUDE, MAX_MAGNITUDE);
        let duty = clamped.abs().round() as u8;
        match Direction::from_duty(clamped) {
            Direction::Forward => DriveAction::Forward(duty),
            Direction::Reverse => DriveAction::Backward(duty),
            Direction::Stopped => DriveAction::Stop,
        }
    }

    /// Direction this action drives in.
    pub fn direction(&self) -> Direction {
        match self {
            DriveAction::Forward(_) => Direction::Forward,
            DriveAction::Backward(_) => Direction::Reverse,
            DriveAction::Stop => Direction::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buggy_fields() -> Vec<CommandField> {
        vec![
            CommandField::number("right"),
            CommandField::number("left"),
            CommandField::text("moving"),
        ]
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    #[test]
    fn parse_full_payload() {
        let cmd = Command::parse(
            "buggy",
            br#"{"right": 50, "left": -30, "moving": "go"}"#,
            &buggy_fields(),
        )
        .unwrap();

        assert_eq!(cmd.target, "buggy");
        assert_eq!(cmd.fields["right"], CommandValue::Number(50.0));
        assert_eq!(cmd.fields["left"], CommandValue::Number(-30.0));
        assert_eq!(cmd.fields["moving"], CommandValue::Text("go".into()));
    }

    #[test]
    fn parse_ignores_undeclared_keys() {
        let cmd = Command::parse("buggy", br#"{"right": 1, "turbo": true}"#, &buggy_fields())
            .unwrap();
        assert_eq!(cmd.fields.len(), 1);
    }

    #[test]
    fn parse_rejects_invalid_utf8() {
        let err = Command::parse("buggy", &[0xFF, 0xFE], &buggy_fields()).unwrap_err();
        assert_eq!(err, PayloadError::NotUtf8);
    }

    #[test]
    fn parse_rejects_non_json() {
        let err = Command::parse("buggy", b"fast please", &buggy_fields()).unwrap_err();
        assert!(matches!(err, PayloadError::NotJson(_)));
    }

    #[test]
    fn parse_rejects_non_object() {
        let err = Command::parse("buggy", b"[50, -30]", &buggy_fields()).unwrap_err();
        assert_eq!(err, PayloadError::NotObject);
    }

    #[test]
    fn parse_rejects_wrong_type() {
        let err = Command::parse("buggy", br#"{"right": "fast"}"#, &buggy_fields()).unwrap_err();
        assert_eq!(
            err,
            PayloadError::WrongType {
                field: "right".into(),
                expected: FieldKind::Number
            }
        );
    }

    #[test]
    fn parse_rejects_no_known_fields() {
        let err = Command::parse("buggy", br#"{"speed": 10}"#, &buggy_fields()).unwrap_err();
        assert_eq!(err, PayloadError::NoKnownFields);
    }

    #[test]
    fn parse_bool_field() {
        let fields = [CommandField::boolean("lights")];
        let cmd = Command::parse("lamp", br#"{"lights": true}"#, &fields).unwrap();
        assert_eq!(cmd.fields["lights"], CommandValue::Bool(true));
    }

    // =========================================================================
    // State
    // =========================================================================

    #[test]
    fn state_starts_at_zero_values() {
        let state = CommandState::from_fields(&buggy_fields());
        assert_eq!(state.number("right"), Some(0.0));
        assert_eq!(state.get("moving"), Some(&CommandValue::Text(String::new())));
        assert_eq!(state.get("missing"), None);
    }

    #[test]
    fn partial_update_leaves_other_fields() {
        let fields = buggy_fields();
        let mut state = CommandState::from_fields(&fields);
        state.apply(&Command::parse("buggy", br#"{"right": 50, "left": -30}"#, &fields).unwrap());
        state.apply(&Command::parse("buggy", br#"{"left": 10}"#, &fields).unwrap());

        assert_eq!(state.number("right"), Some(50.0));
        assert_eq!(state.number("left"), Some(10.0));
    }

    #[test]
    fn number_of_text_field_is_none() {
        let state = CommandState::from_fields(&buggy_fields());
        assert_eq!(state.number("moving"), None);
    }

    // =========================================================================
    // Drive actions
    // =========================================================================

    #[test]
    fn drive_action_clamps() {
        assert_eq!(DriveAction::from_magnitude(150.0), DriveAction::Forward(100));
        assert_eq!(DriveAction::from_magnitude(-150.0), DriveAction::Backward(100));
        assert_eq!(DriveAction::from_magnitude(f64::INFINITY), DriveAction::Forward(100));
    }

    #[test]
    fn drive_action_in_range() {
        assert_eq!(DriveAction::from_magnitude(42.0), DriveAction::Forward(42));
        assert_eq!(DriveAction::from_magnitude(-7.0), DriveAction::Backward(7));
    }

    #[test]
    fn drive_action_zero_and_nan_stop() {
        assert_eq!(DriveAction::from_magnitude(0.0), DriveAction::Stop);
        assert_eq!(DriveAction::from_magnitude(f64::NAN), DriveAction::Stop);
    }

    #[test]
    fn drive_action_direction() {
        assert_eq!(DriveAction::Forward(1).direction(), Direction::Forward);
        assert_eq!(DriveAction::Backward(1).direction(), Direction::Reverse);
        assert_eq!(DriveAction::Stop.direction(), Direction::Stopped);
    }
}
