//! High-level manager that wires the transport components together.
//!
//! The `MqttManager` is the entry point for applications. It:
//! 1. Validates the configuration and builds the MQTT client
//! 2. Creates the shared connection state and the handshake channel
//! 3. Spawns the connection kernel on its own task
//! 4. Returns an `MqttInstance` for application use
//!
//! No connection is attempted at build time. The first call to
//! `ensure_connected` (directly or through a publish) starts the handshake.
//!
//! # Typical Usage
//!
//! ```ignore
//! let instance = MqttManager::from_config(config)?.build_and_start()?;
//! instance.ensure_connected().await?;
//!
//! let publisher = instance.publisher();
//! publisher.publish(&event).await?;
//!
//! instance.shutdown().await;
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use tokio::{sync::Notify, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use validator::Validate;

use super::{
    client::ClientBuilder,
    config::Config,
    connection::{ConnectionKernel, ConnectionManager},
    error::TransferError,
    publisher::{Publisher, Session},
    state::{ConnectionState, SharedState},
};

/// Entry point for building the broker session.
pub struct MqttManager {
    config: Config,

    /// Cancellation token for coordinating shutdown
    cancel_token: CancellationToken,
}

impl MqttManager {
    /// Creates a manager from an existing configuration struct.
    ///
    /// # Errors
    /// `TransferError::ConfigError` if the configuration fails validation.
    pub fn from_config(config: Config) -> Result<Self, TransferError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel_token: CancellationToken::new(),
        })
    }

    /// Creates a manager for `host:port` with every other setting at its default.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, TransferError> {
        Self::from_config(Config {
            host: host.into(),
            port,
            ..Default::default()
        })
    }

    /// Uses an externally owned cancellation token, so the session stops
    /// together with the rest of the application.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Builds the client and spawns the connection kernel.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build_and_start(self) -> Result<MqttInstance, TransferError> {
        info!(
            "Building MQTT session for {} (topic '{}')",
            self.config.address(),
            self.config.outbound_topic
        );

        let (client, event_loop) = ClientBuilder::from_config(&self.config)?.build();

        let state = SharedState::new();
        let connect_requests = Arc::new(Notify::new());

        let kernel = ConnectionKernel::new(
            client.clone(),
            event_loop,
            &self.config,
            state.clone(),
            connect_requests.clone(),
            self.cancel_token.clone(),
        );
        let connection = ConnectionManager::new(
            &self.config,
            state,
            connect_requests,
            self.cancel_token.clone(),
        );

        let handle = tokio::spawn(kernel.run());

        Ok(MqttInstance {
            client,
            connection,
            outbound_topic: self.config.outbound_topic.clone(),
            qos: self.config.publish_qos(),
            cancel_token: self.cancel_token,
            kernel: Arc::new(Mutex::new(Some(handle))),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

/// An active broker session.
///
/// Returned by `MqttManager::build_and_start()`. Cloning is cheap and every
/// clone refers to the same session.
#[derive(Debug, Clone)]
pub struct MqttInstance {
    /// Shared handle used to enqueue publishes
    client: AsyncClient,

    connection: ConnectionManager,

    outbound_topic: String,
    qos: QoS,

    cancel_token: CancellationToken,

    /// Kernel task, taken by the first `shutdown` call
    kernel: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MqttInstance {
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// See [`ConnectionManager::ensure_connected`].
    pub async fn ensure_connected(&self) -> Result<(), TransferError> {
        self.connection.ensure_connected().await
    }

    /// A publisher bound to the configured outbound topic and QoS.
    pub fn publisher(&self) -> Publisher<MqttInstance> {
        Publisher::new(Arc::new(self.clone()), self.outbound_topic.clone(), self.qos)
    }

    /// Stops the connection kernel and waits for it to finish.
    ///
    /// The kernel sends DISCONNECT if a session is up. Calling this more than
    /// once is harmless.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();

        let handle = match self.kernel.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Connection kernel task failed: {}", e);
            }
        }
        info!("MQTT session closed");
    }
}

#[async_trait]
impl Session for MqttInstance {
    fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    async fn ensure_connected(&self) -> Result<(), TransferError> {
        self.connection.ensure_connected().await
    }

    fn mark_disconnected(&self, reason: &str) {
        self.connection.mark_disconnected(reason);
    }

    /// Queues the publish on the client. Refused outright while no session is
    /// up, so nothing piles up in the request queue during an outage.
    fn send(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), TransferError> {
        if !self.connection.state().is_connected() {
            return Err(TransferError::NotConnected);
        }
        self.client.try_publish(topic, qos, false, payload)?;
        Ok(())
    }
}
