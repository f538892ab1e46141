//! MQTT transport backed by `rumqttc`.
//!
//! [`RumqttTransport`] implements [`MqttClient`] for the control loop and
//! drives the `rumqttc` event loop on a tokio task. Inbound publishes are
//! handed straight to the shared [`CommandRouter`] on that task.
//!
//! Subscriptions are remembered and replayed on every `ConnAck`, so commands
//! keep arriving after the broker drops and the event loop reconnects.
//! [`RumqttTransport::wait_connected`] reports the broker's first answer, so
//! a refused login can stop the caller before the loop starts.
//!
//! ```ignore
//! let router = Arc::new(CommandRouter::new(Arc::clone(&registry)));
//! let transport = RumqttTransport::connect(&config.mqtt, router);
//! transport.wait_connected().await?;
//! let mut control = ControlLoop::new(registry, transport, &config.control)?;
//! control.subscribe();
//! control.run(shutdown).await;
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::MqttConfig;
use crate::error::TransportError;
use crate::router::CommandRouter;
use crate::traits::MqttClient;

/// Pause before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Connection state as last reported by the event loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No answer from the broker yet, or the connection was lost.
    Connecting,
    /// The broker accepted the connection.
    Connected,
    /// The broker refused the connection with this return code.
    Refused(String),
}

impl ConnectionStatus {
    /// True once the broker has answered, either way.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Connecting)
    }
}

/// Broker-backed [`MqttClient`].
///
/// Publishing and subscribing never block: requests go onto the client's
/// bounded queue and fail if it is full.
pub struct RumqttTransport {
    client: AsyncClient,
    status: watch::Receiver<ConnectionStatus>,
    patterns: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl RumqttTransport {
    /// Connect to the broker in `config` and route inbound commands.
    ///
    /// Must be called inside a tokio runtime. The connection is made by the
    /// background task; [`is_connected`](MqttClient::is_connected) turns true
    /// once the broker acknowledges it.
    pub fn connect(config: &MqttConfig, router: Arc<CommandRouter>) -> Self {
        let (client, eventloop) = AsyncClient::new(options(config), config.request_capacity);
        let (status_tx, status) = watch::channel(ConnectionStatus::Connecting);
        let patterns = Arc::new(Mutex::new(Vec::new()));

        tracing::info!(
            host = %config.host,
            port = config.port,
            client_id = %config.client_id,
            "connecting to MQTT broker"
        );

        let task = tokio::spawn(drive(
            eventloop,
            client.clone(),
            router,
            status_tx,
            Arc::clone(&patterns),
        ));

        Self {
            client,
            status,
            patterns,
            task,
        }
    }

    /// Latest connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Wait for the broker's answer to the first connection attempt.
    ///
    /// Resolves immediately if the broker has already answered. Network
    /// errors before any answer keep it waiting while the event loop retries.
    pub async fn wait_connected(&self) -> Result<(), TransportError> {
        let mut status = self.status.clone();
        let settled = status
            .wait_for(ConnectionStatus::is_settled)
            .await
            .map_err(|_| TransportError::Closed)?
            .clone();
        match settled {
            ConnectionStatus::Refused(reason) => Err(TransportError::Refused { reason }),
            _ => Ok(()),
        }
    }

    /// Patterns that are (re)subscribed on every connect.
    pub fn patterns(&self) -> Vec<String> {
        self.patterns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Send a DISCONNECT and stop the event loop task.
    pub async fn disconnect(self) {
        if let Err(e) = self.client.disconnect().await {
            tracing::debug!(error = %e, "disconnect request failed");
        }
        self.task.abort();
    }
}

/// `rumqttc` options for `config`.
pub fn options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(u64::from(config.keep_alive_secs)));
    if config.has_auth() {
        options.set_credentials(&config.username, &config.password);
    }
    options
}

async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    router: Arc<CommandRouter>,
    status: watch::Sender<ConnectionStatus>,
    patterns: Arc<Mutex<Vec<String>>>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                status.send_replace(ConnectionStatus::Connected);
                tracing::info!("connected to MQTT broker");
                let patterns = patterns
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                for pattern in patterns {
                    if let Err(e) = client.try_subscribe(pattern.as_str(), QoS::AtMostOnce) {
                        tracing::warn!(pattern = %pattern, error = %e, "resubscribe failed");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                router.route(&publish.topic, &publish.payload);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                status.send_replace(ConnectionStatus::Connecting);
                tracing::warn!("broker closed the connection");
            }
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) => {
                tracing::error!(code = ?code, "broker refused the connection");
                status.send_replace(ConnectionStatus::Refused(format!("{code:?}")));
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
            Err(e) => {
                let was_connected = *status.borrow() == ConnectionStatus::Connected;
                if was_connected {
                    status.send_replace(ConnectionStatus::Connecting);
                    tracing::warn!(error = %e, "MQTT connection lost");
                } else {
                    tracing::warn!(error = %e, "MQTT connect failed");
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

impl MqttClient for RumqttTransport {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    fn subscribe(&mut self, pattern: &str) -> Result<(), TransportError> {
        {
            let mut patterns = self.patterns.lock().unwrap_or_else(PoisonError::into_inner);
            if !patterns.iter().any(|p| p == pattern) {
                patterns.push(pattern.to_string());
            }
        }
        // Not yet connected: the ConnAck handler subscribes.
        if !self.is_connected() {
            return Ok(());
        }
        self.client
            .try_subscribe(pattern, QoS::AtMostOnce)
            .map_err(|e| TransportError::Subscribe {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    fn is_connected(&self) -> bool {
        *self.status.borrow() == ConnectionStatus::Connected
    }
}

impl Drop for RumqttTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}
