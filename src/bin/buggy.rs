//! Two-motor buggy bridged to an MQTT dashboard.
//!
//! Runs a control loop that:
//! - Drives the right and left motors from `{"right", "left"}` commands on
//!   `nred2<client_id>/buggyZCMD/+`
//! - Samples both wheel speed sensors every cadence
//! - Publishes `{"rpm1i", "rpm2i"}` to `pi2nred/buggy/<client_id>speedSensor`
//!
//! Motors and encoders are simulated; the wheel spins in proportion to the
//! commanded duty.
//!
//! # Run
//!
//! ```bash
//! BUGGY_MQTT_HOST=10.0.0.115 BUGGY_CREDENTIALS_FILE=~/stem \
//!     cargo run --features mqtt --bin buggy
//! ```
//!
//! The loop starts once the broker accepts the connection; a refused login
//! exits with an error. Stop with Ctrl-C; the motors are stopped and the
//! sensors released.

use std::sync::Arc;

use anyhow::Context;
use rs_buggy::commands::CommandField;
use rs_buggy::config::{Config, MqttConfig};
use rs_buggy::control_loop::ControlLoop;
use rs_buggy::hal::sim::sim_wheel;
use rs_buggy::registry::{DeviceRegistry, DeviceSpec};
use rs_buggy::router::CommandRouter;
use rs_buggy::services::mqtt::RumqttTransport;
use rs_buggy::speed_sensor::SpeedSensor;

/// Device id and topic class of the buggy.
const DEVICE: &str = "buggy";

/// Simulated wheel speed at full duty.
const SIM_MAX_RPM: f32 = 200.0;

/// (command field, rpm key) per wheel, right wheel first.
const WHEELS: [(&str, &str); 2] = [("right", "rpm1i"), ("left", "rpm2i")];

fn buggy_registry(mqtt: &MqttConfig) -> anyhow::Result<DeviceRegistry> {
    let mut spec = DeviceSpec::new(DEVICE)
        .with_inbound(mqtt.subscribe_pattern(DEVICE))
        .with_outbound(mqtt.publish_topic(DEVICE, &format!("{}speedSensor", mqtt.client_id)))
        .with_command_field(CommandField::text("moving"));
    for (field, key) in WHEELS {
        spec = spec
            .with_command_field(CommandField::number(field))
            .with_sensor_key(key);
    }

    let mut registry = DeviceRegistry::new();
    registry.register(spec)?;
    Ok(registry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rs_buggy::logging::init_tracing();

    let config = Config::from_env().context("loading configuration")?;
    let registry = Arc::new(buggy_registry(&config.mqtt)?);
    let router = Arc::new(CommandRouter::new(Arc::clone(&registry)));

    let transport = RumqttTransport::connect(&config.mqtt, router);
    tokio::select! {
        result = transport.wait_connected() => {
            result.context("connecting to MQTT broker")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received before the broker answered");
            return Ok(());
        }
    }

    let mut control = ControlLoop::new(Arc::clone(&registry), transport, &config.control)?;

    for (field, key) in WHEELS {
        let (motor, wheel) = sim_wheel(field, SIM_MAX_RPM, config.estimator.pulses_per_rev);
        control.bind_actuator(DEVICE, field, motor)?;
        if config.control.speed_sensor_enabled {
            let sensor = SpeedSensor::start(key, wheel, &config.estimator)
                .with_context(|| format!("starting speed sensor {key}"))?;
            control.bind_sensor(DEVICE, sensor)?;
        }
    }

    control.subscribe();

    control
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
            tracing::info!("interrupt received, shutting down");
        })
        .await;

    Ok(())
}
