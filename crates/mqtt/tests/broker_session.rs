//! Session lifecycle against a minimal in-process broker.
//!
//! The broker only speaks as much MQTT 3.1.1 as the producer needs: it
//! answers CONNECT with a CONNACK carrying a chosen return code and records
//! every byte the client sends afterwards. It can also hang up on the first
//! session shortly after accepting it.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use boothscan_mqtt::{Config, ConnectionState, MqttInstance, MqttManager, TransferError};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

struct FakeBroker {
    port: u16,
    connections: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<u8>>>,
}

impl FakeBroker {
    async fn start(return_code: u8) -> Self {
        Self::start_with(return_code, None).await
    }

    /// Like `start`, but closes the first session `drop_after` its CONNACK.
    async fn start_with(return_code: u8, drop_after: Option<Duration>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));

        let (conns, recv) = (connections.clone(), received.clone());
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let nth = conns.fetch_add(1, Ordering::SeqCst);
                let hang_up = drop_after.filter(|_| nth == 0);
                let recv = recv.clone();
                tokio::spawn(async move {
                    // CONNECT: fixed header + single-byte remaining length
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 512];
                    while buf.len() < 2 || buf.len() < 2 + buf[1] as usize {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    assert_eq!(buf[0], 0x10, "first packet must be CONNECT");
                    let rest = buf.split_off(2 + buf[1] as usize);

                    if socket.write_all(&[0x20, 0x02, 0x00, return_code]).await.is_err() {
                        return;
                    }
                    recv.lock().unwrap().extend_from_slice(&rest);
                    if let Some(after) = hang_up {
                        tokio::time::sleep(after).await;
                        return;
                    }
                    loop {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => recv.lock().unwrap().extend_from_slice(&chunk[..n]),
                        }
                    }
                });
            }
        });

        Self {
            port,
            connections,
            received,
        }
    }

    fn config(&self) -> Config {
        Config {
            host: "127.0.0.1".into(),
            port: self.port,
            client_id: "booth-test".into(),
            retry_delay: 1,
            ack_poll_attempts: 10,
            ack_poll_interval_ms: 50,
            ..Default::default()
        }
    }

    fn received_contains(&self, needle: &[u8]) -> bool {
        self.received
            .lock()
            .unwrap()
            .windows(needle.len())
            .any(|w| w == needle)
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    async fn wait_for(&self, needle: &[u8]) -> bool {
        for _ in 0..100 {
            if self.received_contains(needle) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

#[tokio::test]
async fn test_connect_publish_and_disconnect() {
    let broker = FakeBroker::start(0x00).await;
    let instance = MqttManager::from_config(broker.config())
        .unwrap()
        .build_and_start()
        .unwrap();
    assert_eq!(instance.state(), ConnectionState::Disconnected);

    instance.ensure_connected().await.unwrap();
    assert_eq!(instance.state(), ConnectionState::Connected);

    // Already connected: returns at once, no second handshake.
    instance.ensure_connected().await.unwrap();
    assert_eq!(broker.connections.load(Ordering::SeqCst), 1);

    // SUBSCRIBE to the inbound topic follows the handshake.
    assert!(broker.wait_for(b"openhouse/scan").await);

    instance
        .publisher()
        .publish(&serde_json::json!({"qrCode": "e2462d7c"}))
        .await
        .unwrap();
    assert!(broker.wait_for(br#"{"qrCode":"e2462d7c"}"#).await);

    instance.shutdown().await;
    assert!(broker.wait_for(&[0xE0, 0x00]).await, "DISCONNECT not sent");
    assert_eq!(instance.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_refused_handshake_is_retried_until_shutdown() {
    // 0x05: not authorized
    let broker = FakeBroker::start(0x05).await;
    let instance = MqttManager::from_config(broker.config())
        .unwrap()
        .build_and_start()
        .unwrap();

    let canceller = instance.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        canceller.cancel();
    });

    let result = instance.ensure_connected().await;
    assert!(matches!(result, Err(TransferError::Shutdown)));
    assert!(broker.connections.load(Ordering::SeqCst) >= 2);
    assert_ne!(instance.state(), ConnectionState::Connected);

    instance.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_broker_is_retried_until_shutdown() {
    // Bind then drop to get a port nobody listens on.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = Config {
        host: "127.0.0.1".into(),
        port,
        retry_delay: 1,
        ack_poll_attempts: 2,
        ack_poll_interval_ms: 50,
        ..Default::default()
    };
    let instance = MqttManager::from_config(config)
        .unwrap()
        .build_and_start()
        .unwrap();

    let canceller = instance.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        canceller.cancel();
    });

    assert!(matches!(
        instance.ensure_connected().await,
        Err(TransferError::Shutdown)
    ));
    instance.shutdown().await;
}

async fn wait_for_state(instance: &MqttInstance, state: ConnectionState) -> bool {
    for _ in 0..100 {
        if instance.state() == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_broker_hang_up_forces_reconnect() {
    let broker = FakeBroker::start_with(0x00, Some(Duration::from_millis(200))).await;
    let instance = MqttManager::from_config(broker.config())
        .unwrap()
        .build_and_start()
        .unwrap();

    instance.ensure_connected().await.unwrap();
    assert_eq!(broker.connections(), 1);

    // The broker closes the socket; the kernel must notice on its own.
    assert!(wait_for_state(&instance, ConnectionState::Disconnected).await);
    assert_eq!(broker.connections(), 1, "no reconnect before it is asked for");

    instance.ensure_connected().await.unwrap();
    assert_eq!(instance.state(), ConnectionState::Connected);
    assert_eq!(broker.connections(), 2);

    instance.shutdown().await;
}

#[tokio::test]
async fn test_marked_disconnect_opens_fresh_session() {
    let broker = FakeBroker::start(0x00).await;
    let instance = MqttManager::from_config(broker.config())
        .unwrap()
        .build_and_start()
        .unwrap();

    instance.ensure_connected().await.unwrap();
    instance.connection().mark_disconnected("send failed");
    assert_eq!(instance.state(), ConnectionState::Disconnected);

    instance.ensure_connected().await.unwrap();
    assert_eq!(instance.state(), ConnectionState::Connected);
    // The old socket was dropped, so a second CONNECT was needed.
    assert_eq!(broker.connections(), 2);

    instance.shutdown().await;
}
