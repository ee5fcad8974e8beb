//! # boothscan-mqtt: single-topic MQTT producer with connect-or-retry semantics
//!
//! Built on top of `rumqttc`, this crate keeps one broker session alive for a
//! producer that publishes small JSON events on a fixed topic:
//!
//! - **Connect on demand**: `ensure_connected` blocks until CONNACK, retrying
//!   forever with a fixed delay
//! - **Explicit state machine**: every state change goes through the pure
//!   [`state::transition`] function
//! - **Reconnect on failed send**: a publish that cannot be queued forces the
//!   session down and re-establishes it
//! - **Graceful shutdown**: DISCONNECT is sent when the cancellation token fires
//!
//! # Quick Start
//!
//! ```ignore
//! use boothscan_mqtt::MqttManager;
//!
//! let instance = MqttManager::new("192.168.106.196", 1883)?.build_and_start()?;
//! instance.ensure_connected().await?;
//!
//! instance.publisher().publish(&serde_json::json!({"qrCode": "e2462d7c"})).await?;
//! instance.shutdown().await;
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │     Application                      │
//! │ (scan loop)                          │
//! └────────────┬─────────────────────────┘
//!              │
//! ┌────────────▼─────────────────────────┐
//! │     High-Level API                   │
//! │ MqttManager, MqttInstance, Publisher │
//! └────────────┬─────────────────────────┘
//!              │
//! ┌────────────▼─────────────────────────┐
//! │     Core Components                  │
//! │ ConnectionManager, ConnectionKernel  │
//! │ SharedState, RetryPolicy             │
//! └────────────┬─────────────────────────┘
//!              │
//! ┌────────────▼─────────────────────────┐
//! │     rumqttc                          │
//! │ AsyncClient, EventLoop, MQTT Packets │
//! └──────────────────────────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! ```text
//! Disconnected ──(ensure_connected)──> Connecting ──(CONNACK ok)──> Connected
//!      ▲                                   │                            │
//!      └──────(refused / socket error)─────┘                            │
//!      └──────────────(broker disconnect / failed send)─────────────────┘
//! ```

// Module declarations
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod publisher;
pub mod retry;
pub mod state;

// Re-exports: Configuration
pub use config::{Config, DEFAULT_TOPIC};
// Re-exports: Connection management
pub use connection::{ConnectionKernel, ConnectionManager};
// Re-exports: Error handling
pub use error::TransferError;
// Re-exports: High-level types
pub use manager::{MqttInstance, MqttManager};
pub use publisher::{Publisher, Session};
// Re-exports: State monitoring
pub use state::{ConnectionState, SharedState};

pub use rumqttc::QoS;

