//! Message publishing with reconnect-on-failure.
//!
//! The `Publisher` sends serialized messages on a single outbound topic. It
//! handles:
//! - Waiting for a session before the first send
//! - Compact JSON serialization
//! - Forcing a reconnect when a send fails
//!
//! It does not retry or requeue: a message whose send fails is dropped after
//! the session has been re-established.
//!
//! The session is reached through the [`Session`] trait, so the publishing
//! rules can be exercised against an in-memory fake.
//!
//! # Examples
//!
//! ```ignore
//! #[derive(Serialize)]
//! struct Scan { code: String }
//!
//! let publisher = Publisher::new(Arc::new(instance), "openhouse/scan", QoS::AtMostOnce);
//! publisher.publish(&Scan { code: "e2462d7c".into() }).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use rumqttc::QoS;
use serde::Serialize;
use tracing::{error, info, warn};

use super::{error::TransferError, state::ConnectionState};

/// What the publisher needs from a broker session.
#[async_trait]
pub trait Session: Send + Sync {
    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Blocks until the session is connected or shutdown is requested.
    async fn ensure_connected(&self) -> Result<(), TransferError>;

    /// Forces the session into `Disconnected` after a failed send.
    fn mark_disconnected(&self, reason: &str);

    /// Enqueues a non-retained publish. Must not block on a full queue.
    fn send(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Result<(), TransferError>;
}

/// Publishes serializable messages on one topic.
pub struct Publisher<S: Session + ?Sized> {
    session: Arc<S>,
    topic: String,
    qos: QoS,
}

impl<S: Session + ?Sized> Clone for Publisher<S> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            topic: self.topic.clone(),
            qos: self.qos,
        }
    }
}

impl<S: Session + ?Sized> Publisher<S> {
    pub fn new(session: Arc<S>, topic: impl Into<String>, qos: QoS) -> Self {
        Self {
            session,
            topic: topic.into(),
            qos,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    /// Serializes `data` as compact JSON and sends it.
    ///
    /// # Returns
    /// - `Ok(())`: the message was handed to the session
    /// - `Err(TransferError::Shutdown)`: shutdown interrupted the wait for a session
    /// - `Err(_)`: serialization or send failure; the message is dropped
    pub async fn publish<T: Serialize + Sync + ?Sized>(&self, data: &T) -> Result<(), TransferError> {
        if !self.session.state().is_connected() {
            warn!("Not connected to MQTT. Trying to reconnect...");
            self.session.ensure_connected().await?;
        }

        let payload = serde_json::to_vec(data)?;
        let text = String::from_utf8_lossy(&payload).into_owned();

        match self.session.send(&self.topic, self.qos, payload) {
            Ok(()) => {
                info!("Sent MQTT message → {}", text);
                Ok(())
            }
            Err(e) => {
                error!("Publish failed: {}", e);
                self.session.mark_disconnected(&e.to_string());
                match self.session.ensure_connected().await {
                    Ok(()) => warn!("Reconnected after failed publish; message dropped: {}", text),
                    Err(reconnect) => warn!("Reconnect after failed publish aborted: {}", reconnect),
                }
                Err(e)
            }
        }
    }
}
