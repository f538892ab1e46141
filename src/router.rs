//! Inbound command routing.
//!
//! The router resolves a message topic to a device through the
//! [`DeviceRegistry`], parses the payload against that device's declared
//! command fields and applies the result under the device's lock. A bad
//! message is logged at debug and dropped; it never reaches the caller as an
//! error, so one faulty publisher cannot disturb other devices.

use std::sync::Arc;

use crate::commands::Command;
use crate::registry::DeviceRegistry;
use crate::traits::MqttMessage;

/// The three levels of a command topic, `<namespace>/<class>/<detail>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TopicParts<'a> {
    /// First level.
    pub namespace: &'a str,
    /// Device class.
    pub class: &'a str,
    /// Free-form routing detail.
    pub detail: &'a str,
}

impl<'a> TopicParts<'a> {
    /// Split a three-level topic. Other shapes yield `None`.
    ///
    /// ```
    /// use rs_buggy::router::TopicParts;
    ///
    /// let parts = TopicParts::parse("nred2pi/buggyZCMD/drive").unwrap();
    /// assert_eq!(parts.class, "buggyZCMD");
    /// assert_eq!(parts.detail, "drive");
    /// assert!(TopicParts::parse("a/b").is_none());
    /// ```
    pub fn parse(topic: &'a str) -> Option<Self> {
        let mut levels = topic.split('/');
        let namespace = levels.next()?;
        let class = levels.next()?;
        let detail = levels.next()?;
        if levels.next().is_some() {
            return None;
        }
        Some(Self {
            namespace,
            class,
            detail,
        })
    }
}

/// What happened to one inbound message.
#[derive(Clone, Debug, PartialEq)]
pub enum RouteOutcome {
    /// Fields were applied to a device.
    Applied {
        /// Device id.
        device: String,
        /// Names of the fields that changed.
        fields: Vec<String>,
    },
    /// No device listens on this topic.
    Unmatched,
    /// The payload was rejected.
    Malformed(String),
}

impl RouteOutcome {
    /// Whether the message reached a device.
    pub fn is_applied(&self) -> bool {
        matches!(self, RouteOutcome::Applied { .. })
    }
}

/// Applies inbound commands to registered devices.
#[derive(Clone, Debug)]
pub struct CommandRouter {
    registry: Arc<DeviceRegistry>,
}

impl CommandRouter {
    /// Router over a frozen registry.
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    /// Registry this router writes into.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Route one message.
    pub fn route(&self, topic: &str, payload: &[u8]) -> RouteOutcome {
        let Some(device) = self.registry.device_for_topic(topic) else {
            tracing::debug!(topic = %topic, "no device for topic, dropping");
            return RouteOutcome::Unmatched;
        };

        let command = match Command::parse(device.id(), payload, device.command_fields()) {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::debug!(
                    topic = %topic,
                    device = %device.id(),
                    error = %e,
                    "malformed command, dropping"
                );
                return RouteOutcome::Malformed(e.to_string());
            }
        };

        device.state().command.apply(&command);

        let fields: Vec<String> = command.fields.keys().cloned().collect();
        match TopicParts::parse(topic) {
            Some(parts) => tracing::debug!(
                device = %device.id(),
                class = parts.class,
                detail = parts.detail,
                ?fields,
                "command applied"
            ),
            None => tracing::debug!(device = %device.id(), ?fields, "command applied"),
        }

        RouteOutcome::Applied {
            device: command.target,
            fields,
        }
    }

    /// Route a received [`MqttMessage`].
    pub fn route_message(&self, msg: &MqttMessage) -> RouteOutcome {
        self.route(&msg.topic, &msg.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandField, CommandValue};
    use crate::registry::DeviceSpec;

    fn router() -> CommandRouter {
        let mut registry = DeviceRegistry::new();
        registry
            .register(
                DeviceSpec::new("buggy")
                    .with_inbound("nred2pi/buggyZCMD/+")
                    .with_command_field(CommandField::number("right"))
                    .with_command_field(CommandField::number("left"))
                    .with_command_field(CommandField::text("moving")),
            )
            .unwrap();
        registry
            .register(
                DeviceSpec::new("lamp")
                    .with_inbound("nred2pi/lampZCMD/+")
                    .with_command_field(CommandField::boolean("on")),
            )
            .unwrap();
        CommandRouter::new(Arc::new(registry))
    }

    fn number(router: &CommandRouter, device: &str, field: &str) -> Option<f64> {
        router.registry().get(device).unwrap().command_number(field)
    }

    #[test]
    fn applies_full_command() {
        let router = router();
        let outcome = router.route(
            "nred2pi/buggyZCMD/drive",
            br#"{"right": 50, "left": -30, "moving": "go"}"#,
        );

        assert_eq!(
            outcome,
            RouteOutcome::Applied {
                device: "buggy".into(),
                fields: vec!["left".into(), "moving".into(), "right".into()],
            }
        );
        assert_eq!(number(&router, "buggy", "right"), Some(50.0));
        assert_eq!(number(&router, "buggy", "left"), Some(-30.0));
    }

    #[test]
    fn partial_update() {
        let router = router();
        router.route("nred2pi/buggyZCMD/drive", br#"{"right": 50, "left": -30}"#);
        router.route("nred2pi/buggyZCMD/drive", br#"{"left": 20}"#);

        assert_eq!(number(&router, "buggy", "right"), Some(50.0));
        assert_eq!(number(&router, "buggy", "left"), Some(20.0));
    }

    #[test]
    fn unmatched_topic() {
        let router = router();
        assert_eq!(
            router.route("nred2pi/tankZCMD/drive", br#"{"right": 1}"#),
            RouteOutcome::Unmatched
        );
    }

    #[test]
    fn malformed_leaves_state_untouched() {
        let router = router();
        router.route("nred2pi/buggyZCMD/drive", br#"{"right": 10}"#);

        let outcome = router.route("nred2pi/buggyZCMD/drive", b"not json");
        assert!(matches!(outcome, RouteOutcome::Malformed(_)));

        // one bad field rejects the whole message
        let outcome = router.route("nred2pi/buggyZCMD/drive", br#"{"right": 99, "left": "x"}"#);
        assert!(matches!(outcome, RouteOutcome::Malformed(_)));
        assert_eq!(number(&router, "buggy", "right"), Some(10.0));
        assert_eq!(number(&router, "buggy", "left"), Some(0.0));
    }

    #[test]
    fn bad_message_does_not_affect_other_devices() {
        let router = router();
        router.route("nred2pi/lampZCMD/x", br#"{"on": true}"#);
        router.route("nred2pi/buggyZCMD/x", b"{");

        let lamp = router.registry().get("lamp").unwrap().snapshot();
        assert_eq!(lamp.command.get("on"), Some(&CommandValue::Bool(true)));
    }

    #[test]
    fn route_message() {
        let router = router();
        let msg = MqttMessage::new("nred2pi/buggyZCMD/drive", r#"{"left": 5}"#);
        assert!(router.route_message(&msg).is_applied());
        assert_eq!(number(&router, "buggy", "left"), Some(5.0));
    }

    #[test]
    fn topic_parts() {
        let parts = TopicParts::parse("a/b/c").unwrap();
        assert_eq!(
            parts,
            TopicParts {
                namespace: "a",
                class: "b",
                detail: "c"
            }
        );
        assert!(TopicParts::parse("a/b/c/d").is_none());
        assert!(TopicParts::parse("a").is_none());
    }
}
