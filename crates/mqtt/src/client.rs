//! MQTT client construction.
//!
//! `ClientBuilder` turns a validated [`Config`] into rumqttc's `AsyncClient`
//! (the shared session handle used for publishing) and its `EventLoop` (driven
//! exclusively by the connection kernel).
//!
//! ```ignore
//! let (client, event_loop) = ClientBuilder::from_config(&config)?.build();
//! ```

use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, MqttOptions};
use validator::Validate;

use super::{config::Config, error::TransferError};

/// Builder for the rumqttc client and event loop.
pub struct ClientBuilder {
    opts: MqttOptions,

    /// Capacity of the request queue between `AsyncClient` and `EventLoop`.
    cap: usize,
}

impl ClientBuilder {
    /// Minimal builder for a plain TCP connection.
    pub fn new(client_id: impl Into<String>, host: impl Into<String>, port: u16, cap: usize) -> Self {
        Self {
            opts: MqttOptions::new(client_id, host, port),
            cap: cap.max(1),
        }
    }

    /// Builds options from a configuration, validating it first.
    ///
    /// # Errors
    ///
    /// `TransferError::ConfigError` if any field violates its constraints, or
    /// `TransferError::ClientSetup` if credentials are only half configured.
    pub fn from_config(config: &Config) -> Result<Self, TransferError> {
        config.validate()?;

        let mut builder = Self::new(
            config.resolved_client_id(),
            config.host.clone(),
            config.port,
            config.request_channel_capacity,
        )
        .keep_alive(config.keep_alive)
        .clean_session(config.clean_session);

        if let Some(size) = config.max_packet_size {
            builder = builder.max_packet_size(size, size);
        }

        match (&config.username, &config.password) {
            (Some(user), Some(pass)) => builder = builder.credentials(user, pass),
            (None, None) => {}
            _ => {
                return Err(TransferError::ClientSetup(
                    "Both username and password must be provided or neither".into(),
                ))
            }
        }

        Ok(builder)
    }

    /// Keep-alive interval in seconds. rumqttc pings the broker when the
    /// link has been idle this long.
    pub fn keep_alive(mut self, secs: u64) -> Self {
        self.opts.set_keep_alive(Duration::from_secs(secs));
        self
    }

    pub fn max_packet_size(mut self, incoming: usize, outgoing: usize) -> Self {
        self.opts.set_max_packet_size(incoming, outgoing);
        self
    }

    pub fn clean_session(mut self, clean: bool) -> Self {
        self.opts.set_clean_session(clean);
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.opts.set_credentials(username, password);
        self
    }

    /// Constructs the client and its event loop.
    ///
    /// No network activity happens here: rumqttc only dials the broker once
    /// the event loop is polled.
    pub fn build(self) -> (AsyncClient, EventLoop) {
        AsyncClient::new(self.opts, self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_tcp_client() {
        let (client, _event_loop) = ClientBuilder::new("booth", "localhost", 1883, 10)
            .keep_alive(60)
            .clean_session(true)
            .credentials("user", "pass")
            .build();
        assert!(!format!("{:?}", client).is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let builder = ClientBuilder::new("booth", "localhost", 1883, 0);
        assert_eq!(builder.cap, 1);
    }

    #[test]
    fn test_from_config() {
        let config = Config {
            client_id: "booth-1".into(),
            ..Default::default()
        };
        let builder = ClientBuilder::from_config(&config).unwrap();
        assert_eq!(builder.opts.client_id(), "booth-1");
        assert_eq!(builder.opts.keep_alive(), Duration::from_secs(60));
        assert_eq!(builder.opts.broker_address(), ("localhost".to_string(), 1883));
    }

    #[test]
    fn test_from_config_invalid() {
        let config = Config {
            host: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            ClientBuilder::from_config(&config),
            Err(TransferError::ConfigError(_))
        ));
    }

    #[test]
    fn test_half_credentials_rejected() {
        let config = Config {
            username: Some("booth".into()),
            ..Default::default()
        };
        assert!(matches!(
            ClientBuilder::from_config(&config),
            Err(TransferError::ClientSetup(_))
        ));
    }
}
