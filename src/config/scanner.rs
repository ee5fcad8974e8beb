//! Scanner input configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ScannerConfig {
    /// Station identifier carried in every published event.
    pub booth_id: i64,

    /// Pause after each processed scan, in milliseconds.
    #[validate(range(max = 10_000, message = "Debounce must not exceed 10000 ms"))]
    pub debounce_ms: u64,

    /// Print an interactive prompt before each read.
    pub prompt: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            booth_id: 1,
            debounce_ms: 200,
            prompt: true,
        }
    }
}

impl ScannerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScannerConfig::default();
        assert_eq!(config.booth_id, 1);
        assert_eq!(config.debounce(), Duration::from_millis(200));
        assert!(config.prompt);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debounce_limit() {
        let config = ScannerConfig {
            debounce_ms: 60_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
