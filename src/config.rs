//! Application configuration.
//!
//! Every section has sensible defaults (the buggy's Node-RED topic
//! layout) and `with_*` builder setters. [`Config::from_env`] overlays
//! `BUGGY_*` environment variables on top of the defaults.
//!
//! # Example
//!
//! ```rust
//! use rs_buggy::config::{Config, LoopConfig, MqttConfig};
//!
//! let config = Config::default()
//!     .with_mqtt(MqttConfig::default().with_host("192.168.1.100"))
//!     .with_control(LoopConfig::default().with_cadence_ms(250));
//!
//! assert_eq!(config.mqtt.subscribe_pattern("buggy"), "nred2pi/buggyZCMD/+");
//! assert_eq!(config.mqtt.publish_topic("buggy", "pispeedSensor"), "pi2nred/buggy/pispeedSensor");
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Suffix appended to a device class to form its inbound command level.
pub const COMMAND_CLASS_SUFFIX: &str = "ZCMD";

// ============================================================================
// Main Config
// ============================================================================

/// Complete application configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// MQTT client configuration
    pub mqtt: MqttConfig,
    /// Control/telemetry loop configuration
    pub control: LoopConfig,
    /// Speed sensor estimator configuration
    pub estimator: EstimatorConfig,
}

impl Config {
    /// Set MQTT configuration
    pub fn with_mqtt(mut self, mqtt: MqttConfig) -> Self {
        self.mqtt = mqtt;
        self
    }

    /// Set control loop configuration
    pub fn with_control(mut self, control: LoopConfig) -> Self {
        self.control = control;
        self
    }

    /// Set estimator configuration
    pub fn with_estimator(mut self, estimator: EstimatorConfig) -> Self {
        self.estimator = estimator;
        self
    }

    /// Defaults overlaid with `BUGGY_*` environment variables.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `BUGGY_MQTT_HOST` | `mqtt.host` |
    /// | `BUGGY_MQTT_PORT` | `mqtt.port` |
    /// | `BUGGY_CLIENT_ID` | `mqtt.client_id` (and the inbound namespace) |
    /// | `BUGGY_MQTT_USER` / `BUGGY_MQTT_PASSWORD` | credentials |
    /// | `BUGGY_CREDENTIALS_FILE` | two-line credentials file |
    /// | `BUGGY_SPEED_SENSOR` | `control.speed_sensor_enabled` |
    /// | `BUGGY_CADENCE_MS` | `control.cadence_ms` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(host) = lookup("BUGGY_MQTT_HOST") {
            config.mqtt.host = host;
        }
        if let Some(port) = lookup("BUGGY_MQTT_PORT") {
            config.mqtt.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "BUGGY_MQTT_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(id) = lookup("BUGGY_CLIENT_ID") {
            config.mqtt = config.mqtt.with_client_id(&id);
        }
        if let Some(path) = lookup("BUGGY_CREDENTIALS_FILE") {
            config.mqtt = config.mqtt.load_credentials(path)?;
        }
        if let (Some(user), Some(password)) =
            (lookup("BUGGY_MQTT_USER"), lookup("BUGGY_MQTT_PASSWORD"))
        {
            config.mqtt = config.mqtt.with_auth(&user, &password);
        }
        if let Some(flag) = lookup("BUGGY_SPEED_SENSOR") {
            config.control.speed_sensor_enabled = parse_flag(&flag).ok_or(
                ConfigError::InvalidEnv {
                    var: "BUGGY_SPEED_SENSOR",
                    value: flag.clone(),
                },
            )?;
        }
        if let Some(ms) = lookup("BUGGY_CADENCE_MS") {
            let cadence: u32 = ms.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "BUGGY_CADENCE_MS",
                value: ms.clone(),
            })?;
            if cadence == 0 {
                return Err(ConfigError::InvalidCadence);
            }
            config.control.cadence_ms = cadence;
        }

        Ok(config)
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

// ============================================================================
// MQTT Config
// ============================================================================

/// MQTT client configuration
///
/// Topic levels follow a `from-to / device class / free form` layout:
/// commands arrive on `nred2<client_id>/<class>ZCMD/+` and telemetry goes
/// out on `pi2nred/<class>/<lvl3>`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker hostname or IP
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Client ID (should be unique per vehicle)
    pub client_id: String,
    /// First topic level of inbound commands
    pub sub_namespace: String,
    /// First topic level of outbound telemetry
    pub pub_namespace: String,
    /// Username for authentication (empty = no auth)
    pub username: String,
    /// Password for authentication
    pub password: String,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
    /// Capacity of the client's outbound request queue
    pub request_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "pi".to_string(),
            sub_namespace: "nred2pi".to_string(),
            pub_namespace: "pi2nred".to_string(),
            username: String::new(),
            password: String::new(),
            keep_alive_secs: 30,
            request_capacity: 64,
        }
    }
}

impl MqttConfig {
    /// Set the broker host
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Set the broker port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the client ID. The inbound namespace follows it (`nred2<id>`).
    pub fn with_client_id(mut self, id: &str) -> Self {
        self.client_id = id.to_string();
        self.sub_namespace = format!("nred2{id}");
        self
    }

    /// Set the inbound and outbound namespaces
    pub fn with_namespaces(mut self, sub: &str, publish: &str) -> Self {
        self.sub_namespace = sub.to_string();
        self.pub_namespace = publish.to_string();
        self
    }

    /// Set authentication credentials
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    /// Read credentials from a file holding the user on the first line and
    /// the password on the second.
    pub fn load_credentials(self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Credentials {
            path: path.display().to_string(),
            source,
        })?;
        let mut lines = contents.lines();
        match (lines.next(), lines.next()) {
            (Some(user), Some(password)) if !user.trim().is_empty() => {
                Ok(self.with_auth(user.trim(), password.trim()))
            }
            _ => Err(ConfigError::IncompleteCredentials(path.display().to_string())),
        }
    }

    /// Check if authentication is configured
    pub fn has_auth(&self) -> bool {
        !self.username.is_empty()
    }

    /// Inbound command filter for a device class: `<sub_ns>/<class>ZCMD/+`
    pub fn subscribe_pattern(&self, class: &str) -> String {
        format!("{}/{}{}/+", self.sub_namespace, class, COMMAND_CLASS_SUFFIX)
    }

    /// Outbound telemetry topic: `<pub_ns>/<class>/<lvl3>`
    pub fn publish_topic(&self, class: &str, lvl3: &str) -> String {
        format!("{}/{}/{}", self.pub_namespace, class, lvl3)
    }
}

// ============================================================================
// Loop Config
// ============================================================================

/// Control/telemetry loop configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Sample/publish cadence in milliseconds
    pub cadence_ms: u32,
    /// Pause between apply iterations in milliseconds (minimum 1)
    pub apply_interval_ms: u32,
    /// Whether wheel speed sensors are attached and sampled
    pub speed_sensor_enabled: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            cadence_ms: 500,
            apply_interval_ms: 1,
            speed_sensor_enabled: true,
        }
    }
}

impl LoopConfig {
    /// Set the sample/publish cadence
    pub fn with_cadence_ms(mut self, ms: u32) -> Self {
        self.cadence_ms = ms;
        self
    }

    /// Set the apply interval
    pub fn with_apply_interval_ms(mut self, ms: u32) -> Self {
        self.apply_interval_ms = ms;
        self
    }

    /// Enable or disable speed sensing
    pub fn with_speed_sensor(mut self, enabled: bool) -> Self {
        self.speed_sensor_enabled = enabled;
        self
    }
}

// ============================================================================
// Estimator Config
// ============================================================================

/// Raw RPM estimator settings.
///
/// Validated (and clamped) when an
/// [`RpmEstimator`](crate::estimator::RpmEstimator) is built from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Pulses per full revolution, must be > 0
    pub pulses_per_rev: f32,
    /// Weight of the previous period in the moving average, clamped to [0, 0.99]
    pub weighting: f32,
    /// Readings below this RPM report 0, clamped to [1, 1000]
    pub min_rpm: f32,
    /// Watchdog interval in milliseconds
    pub watchdog_ms: u32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            pulses_per_rev: 20.0,
            weighting: 0.0,
            min_rpm: 5.0,
            watchdog_ms: 200,
        }
    }
}

impl EstimatorConfig {
    /// Set pulses per revolution
    pub fn with_pulses_per_rev(mut self, pulses: f32) -> Self {
        self.pulses_per_rev = pulses;
        self
    }

    /// Set the smoothing weight
    pub fn with_weighting(mut self, weighting: f32) -> Self {
        self.weighting = weighting;
        self
    }

    /// Set the minimum reportable RPM
    pub fn with_min_rpm(mut self, min_rpm: f32) -> Self {
        self.min_rpm = min_rpm;
        self
    }

    /// Set the watchdog interval
    pub fn with_watchdog_ms(mut self, ms: u32) -> Self {
        self.watchdog_ms = ms;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.client_id, "pi");
        assert_eq!(config.control.cadence_ms, 500);
        assert_eq!(config.control.apply_interval_ms, 1);
        assert_eq!(config.estimator.pulses_per_rev, 20.0);
        assert_eq!(config.estimator.watchdog_ms, 200);
    }

    #[test]
    fn topic_building() {
        let mqtt = MqttConfig::default();
        assert_eq!(mqtt.subscribe_pattern("servo"), "nred2pi/servoZCMD/+");
        assert_eq!(mqtt.publish_topic("adc", "a0"), "pi2nred/adc/a0");
    }

    #[test]
    fn client_id_moves_inbound_namespace() {
        let mqtt = MqttConfig::default().with_client_id("rover");
        assert_eq!(mqtt.sub_namespace, "nred2rover");
        assert_eq!(mqtt.pub_namespace, "pi2nred");
    }

    #[test]
    fn mqtt_auth_detection() {
        assert!(!MqttConfig::default().has_auth());
        assert!(MqttConfig::default().with_auth("user", "pass").has_auth());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::default()
            .with_mqtt(MqttConfig::default().with_host("broker.local").with_port(8883))
            .with_control(LoopConfig::default().with_speed_sensor(false))
            .with_estimator(EstimatorConfig::default().with_weighting(0.5));

        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 8883);
        assert!(!config.control.speed_sensor_enabled);
        assert_eq!(config.estimator.weighting, 0.5);
    }

    #[test]
    fn from_lookup_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("BUGGY_MQTT_HOST", "10.0.0.115"),
            ("BUGGY_MQTT_PORT", "1884"),
            ("BUGGY_CLIENT_ID", "pi2"),
            ("BUGGY_MQTT_USER", "node"),
            ("BUGGY_MQTT_PASSWORD", "red"),
            ("BUGGY_SPEED_SENSOR", "off"),
            ("BUGGY_CADENCE_MS", "1000"),
        ]))
        .unwrap();

        assert_eq!(config.mqtt.host, "10.0.0.115");
        assert_eq!(config.mqtt.port, 1884);
        assert_eq!(config.mqtt.sub_namespace, "nred2pi2");
        assert_eq!(config.mqtt.username, "node");
        assert_eq!(config.mqtt.password, "red");
        assert!(!config.control.speed_sensor_enabled);
        assert_eq!(config.control.cadence_ms, 1000);
    }

    #[test]
    fn from_lookup_rejects_bad_port() {
        let err = Config::from_lookup(lookup_from(&[("BUGGY_MQTT_PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: "BUGGY_MQTT_PORT", .. }));
    }

    #[test]
    fn from_lookup_rejects_zero_cadence() {
        let err = Config::from_lookup(lookup_from(&[("BUGGY_CADENCE_MS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCadence));
    }

    #[test]
    fn user_without_password_is_ignored() {
        let config = Config::from_lookup(lookup_from(&[("BUGGY_MQTT_USER", "node")])).unwrap();
        assert!(!config.mqtt.has_auth());
    }

    #[test]
    fn credentials_file_two_lines() {
        let path = std::env::temp_dir().join(format!("rs-buggy-creds-{}", std::process::id()));
        std::fs::write(&path, "node\nred\n").unwrap();

        let mqtt = MqttConfig::default().load_credentials(&path).unwrap();
        assert_eq!(mqtt.username, "node");
        assert_eq!(mqtt.password, "red");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn credentials_file_missing_password() {
        let path = std::env::temp_dir().join(format!("rs-buggy-creds-short-{}", std::process::id()));
        std::fs::write(&path, "node\n").unwrap();

        let err = MqttConfig::default().load_credentials(&path).unwrap_err();
        assert!(matches!(err, ConfigError::IncompleteCredentials(_)));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn credentials_file_absent() {
        let err = MqttConfig::default()
            .load_credentials("/nonexistent/rs-buggy/stem")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Credentials { .. }));
    }
}
