//! Configuration for the broker session.
//!
//! All fields have serde defaults, so an empty `[transport]` table yields a
//! working configuration against a broker on `localhost:1883`. Constraints are
//! declared with `validator` attributes and checked once at startup.
//!
//! # Examples
//!
//! ```toml
//! host = "192.168.106.196"
//! port = 1883
//! outbound_topic = "openhouse/scan"
//! inbound_topic = "openhouse/scan"
//! retry_delay = 2
//! ```

use std::time::Duration;

use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Default topic used for both directions in the booth deployment.
pub const DEFAULT_TOPIC: &str = "openhouse/scan";

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Broker hostname or IP address.
    #[validate(length(
        min = 1,
        max = 255,
        message = "Host must be between 1 and 255 characters"
    ))]
    pub host: String,

    /// Broker port.
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Client identifier. Empty means a UUID is generated when the client is built.
    #[validate(length(max = 36, message = "Client ID must not exceed 36 characters"))]
    pub client_id: String,

    /// Keep-alive interval in seconds, also bounds how long the broker waits
    /// on a silent client during the handshake.
    #[validate(range(
        min = 5,
        max = 3600,
        message = "Keep alive must be between 5 and 3600 seconds"
    ))]
    pub keep_alive: u64,

    /// Request a clean session on every CONNECT.
    pub clean_session: bool,

    /// Optional broker credentials.
    pub username: Option<String>,
    pub password: Option<String>,

    /// Topic subscribed to after every successful handshake.
    #[validate(custom(function = "validate_topic"))]
    pub inbound_topic: String,

    /// Topic scan events are published on.
    #[validate(custom(function = "validate_topic"))]
    pub outbound_topic: String,

    /// QoS for published events (0, 1 or 2).
    #[validate(range(max = 2, message = "Invalid QoS value, must be 0, 1, or 2"))]
    pub qos: u8,

    /// Fixed delay between connection attempts, in seconds.
    #[validate(range(
        min = 1,
        max = 300,
        message = "Retry delay must be between 1 and 300 seconds"
    ))]
    pub retry_delay: u64,

    /// How many times to look at the connection state after a handshake is
    /// initiated before giving up on this attempt.
    #[validate(range(min = 1, max = 100))]
    pub ack_poll_attempts: u32,

    /// Interval between those looks, in milliseconds.
    #[validate(range(min = 10, max = 10_000))]
    pub ack_poll_interval_ms: u64,

    /// Capacity of the client's request queue.
    #[validate(range(
        min = 1,
        max = 1000,
        message = "Request channel capacity must be between 1 and 1000"
    ))]
    pub request_channel_capacity: usize,

    /// Maximum MQTT packet size in bytes, applied to both directions.
    #[validate(range(
        min = 64,
        max = 268_435_455,
        message = "Max packet size must be between 64 and 268435455 bytes"
    ))]
    pub max_packet_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "localhost".to_string(),
            port: 1883,
            client_id: String::new(),
            keep_alive: 60,
            clean_session: true,
            username: None,
            password: None,
            inbound_topic: DEFAULT_TOPIC.to_string(),
            outbound_topic: DEFAULT_TOPIC.to_string(),
            qos: 0,
            retry_delay: 2,
            ack_poll_attempts: 10,
            ack_poll_interval_ms: 300,
            request_channel_capacity: 10,
            max_packet_size: None,
        }
    }
}

impl Config {
    /// `host:port`, used in log lines.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The configured client id, or a fresh UUID when none is set.
    pub fn resolved_client_id(&self) -> String {
        if self.client_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            self.client_id.clone()
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    pub fn ack_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ack_poll_interval_ms)
    }

    /// Total time a single connection attempt may wait for CONNACK.
    pub fn ack_window(&self) -> Duration {
        self.ack_poll_interval() * self.ack_poll_attempts
    }

    /// Maps the numeric QoS onto rumqttc's enum. Values above 2 never pass
    /// validation; they fall back to at-most-once.
    pub fn publish_qos(&self) -> QoS {
        match self.qos {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtMostOnce,
        }
    }
}

/// Topics must be non-empty and concrete (no wildcards) since the same value
/// may be used for publishing.
fn validate_topic(topic: &str) -> Result<(), ValidationError> {
    if topic.is_empty() {
        return Err(ValidationError::new("empty_topic").with_message("Topic cannot be empty".into()));
    }
    if topic.contains('+') || topic.contains('#') {
        return Err(ValidationError::new("wildcard_topic")
            .with_message(format!("Topic must not contain wildcards: {topic}").into()));
    }
    Ok(())
}
