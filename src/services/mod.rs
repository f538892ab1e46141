//! Network services.
//!
//! - `mqtt` feature: `rumqttc` transport for the control loop, routing
//!   inbound commands into the shared [`CommandRouter`](crate::router::CommandRouter).

#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "mqtt")]
pub use mqtt::*;
