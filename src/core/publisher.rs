//! Scan publishing on top of the transport publisher.

use std::sync::Arc;

use boothscan_mqtt::{Publisher, QoS, Session, TransferError};
use thiserror::Error;

use super::event::{EventError, ScanEvent};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Event(#[from] EventError),

    #[error("MQTT publish error: {0}")]
    Transfer(#[from] TransferError),
}

impl PublishError {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, PublishError::Transfer(TransferError::Shutdown))
    }
}

/// Publishes identifiers as [`ScanEvent`]s for one booth.
pub struct ScanPublisher<S: Session + ?Sized> {
    inner: Publisher<S>,
    station_id: i64,
}

impl<S: Session + ?Sized> ScanPublisher<S> {
    pub fn new(publisher: Publisher<S>, station_id: i64) -> Self {
        Self {
            inner: publisher,
            station_id,
        }
    }

    /// Shorthand for a session, topic and QoS.
    pub fn with_session(session: Arc<S>, topic: &str, qos: QoS, station_id: i64) -> Self {
        Self::new(Publisher::new(session, topic, qos), station_id)
    }

    pub fn station_id(&self) -> i64 {
        self.station_id
    }

    pub fn session(&self) -> &Arc<S> {
        self.inner.session()
    }

    /// Publishes `identifier`. A blank identifier is dropped without a trace.
    pub async fn publish(&self, identifier: &str) -> Result<(), PublishError> {
        if identifier.trim().is_empty() {
            return Ok(());
        }
        let event = ScanEvent::new(identifier, self.station_id)?;
        self.inner.publish(&event).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    };

    use async_trait::async_trait;
    use boothscan_mqtt::ConnectionState;

    use super::*;

    /// In-memory session shared by the core tests.
    #[derive(Default)]
    pub(crate) struct RecordingSession {
        pub connected: AtomicBool,
        pub shutting_down: AtomicBool,
        pub ensure_calls: AtomicUsize,
        pub sent: Mutex<Vec<String>>,
    }

    impl RecordingSession {
        pub fn connected() -> Arc<Self> {
            let session = Self::default();
            session.connected.store(true, Ordering::SeqCst);
            Arc::new(session)
        }

        pub fn payloads(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Session for RecordingSession {
        fn state(&self) -> ConnectionState {
            if self.connected.load(Ordering::SeqCst) {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            }
        }

        async fn ensure_connected(&self) -> Result<(), TransferError> {
            self.ensure_calls.fetch_add(1, Ordering::SeqCst);
            if self.shutting_down.load(Ordering::SeqCst) {
                return Err(TransferError::Shutdown);
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn mark_disconnected(&self, _reason: &str) {
            self.connected.store(false, Ordering::SeqCst);
        }

        fn send(&self, _topic: &str, _qos: QoS, payload: Vec<u8>) -> Result<(), TransferError> {
            self.sent
                .lock()
                .unwrap()
                .push(String::from_utf8(payload).unwrap());
            Ok(())
        }
    }

    fn publisher(session: &Arc<RecordingSession>) -> ScanPublisher<RecordingSession> {
        ScanPublisher::with_session(session.clone(), "openhouse/scan", QoS::AtMostOnce, 1)
    }

    #[tokio::test]
    async fn test_publishes_event_payload() {
        let session = RecordingSession::connected();
        publisher(&session).publish("e2462d7c").await.unwrap();
        assert_eq!(
            session.payloads(),
            vec![r#"{"qrCode":"e2462d7c","boothId":1}"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_blank_identifier_is_silently_dropped() {
        let session = Arc::new(RecordingSession::default());
        publisher(&session).publish("  ").await.unwrap();
        assert!(session.payloads().is_empty());
        // Not even a reconnect attempt
        assert_eq!(session.ensure_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_short_identifier_is_rejected() {
        let session = RecordingSession::connected();
        let err = publisher(&session).publish("ab").await.unwrap_err();
        assert!(matches!(err, PublishError::Event(_)));
        assert!(session.payloads().is_empty());
    }

    #[tokio::test]
    async fn test_publish_while_disconnected_connects_first() {
        let session = Arc::new(RecordingSession::default());
        publisher(&session).publish("xyz123").await.unwrap();
        assert_eq!(session.ensure_calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.payloads().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_during_reconnect() {
        let session = Arc::new(RecordingSession::default());
        session.shutting_down.store(true, Ordering::SeqCst);

        let err = publisher(&session).publish("xyz123").await.unwrap_err();
        assert!(err.is_shutdown());
        assert!(session.payloads().is_empty());
    }
}
