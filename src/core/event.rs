//! The event published for every accepted scan.

use serde::Serialize;
use thiserror::Error;

use super::identifier::{self, IdentifierError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),
}

/// One accepted scan.
///
/// Serializes to exactly `{"qrCode":"<identifier>","boothId":<station>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanEvent {
    #[serde(rename = "qrCode")]
    identifier: String,

    #[serde(rename = "boothId")]
    station_id: i64,
}

impl ScanEvent {
    /// Builds an event, refusing empty or sub-minimum identifiers.
    pub fn new(identifier: impl Into<String>, station_id: i64) -> Result<Self, EventError> {
        let identifier = identifier.into();
        if identifier.trim().is_empty() {
            return Err(IdentifierError::EmptyInput.into());
        }
        identifier::validate(&identifier)?;
        Ok(Self {
            identifier,
            station_id,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn station_id(&self) -> i64 {
        self.station_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let event = ScanEvent::new("e2462d7c", 1).unwrap();
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"qrCode":"e2462d7c","boothId":1}"#
        );
    }

    #[test]
    fn test_identifier_is_escaped() {
        let event = ScanEvent::new("a\"b\\c", 42).unwrap();
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"qrCode":"a\"b\\c","boothId":42}"#
        );
    }

    #[test]
    fn test_rejects_short_and_empty() {
        assert_eq!(
            ScanEvent::new("abc", 1),
            Err(EventError::InvalidIdentifier(IdentifierError::TooShort(
                "abc".into()
            )))
        );
        assert_eq!(
            ScanEvent::new("    ", 1),
            Err(EventError::InvalidIdentifier(IdentifierError::EmptyInput))
        );
    }
}
