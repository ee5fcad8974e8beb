//! Canonical identifier extraction from raw scanner input.
//!
//! Badges carry either a bare code or a registration link such as
//! `http://192.168.1.51:5173/uuid/e2462d7c`. Links are reduced to the token
//! after `/uuid/`; anything else is used as-is after trimming.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Shortest identifier accepted for publishing.
pub const MIN_IDENTIFIER_LEN: usize = 4;

static UUID_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/uuid/([A-Za-z0-9_-]+)").expect("uuid path pattern compiles"));

/// Reasons a scan is discarded before publishing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Nothing but whitespace was scanned.
    #[error("Empty scan")]
    EmptyInput,

    /// The identifier is shorter than `MIN_IDENTIFIER_LEN` characters.
    #[error("Invalid QR (too short): {0}")]
    TooShort(String),
}

/// Reduces raw scanned text to its identifier.
///
/// Deterministic and side-effect free. Length is counted in characters.
pub fn extract(raw: &str) -> Result<String, IdentifierError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IdentifierError::EmptyInput);
    }

    let identifier = UUID_PATH
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map_or(trimmed, |token| token.as_str());

    validate(identifier)?;
    Ok(identifier.to_string())
}

/// Checks the length rule on an already extracted identifier.
pub fn validate(identifier: &str) -> Result<(), IdentifierError> {
    if identifier.chars().count() < MIN_IDENTIFIER_LEN {
        return Err(IdentifierError::TooShort(identifier.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_link_is_reduced_to_token() {
        assert_eq!(
            extract("http://192.168.1.51:5173/uuid/e2462d7c").unwrap(),
            "e2462d7c"
        );
    }

    #[test]
    fn test_token_stops_at_disallowed_character() {
        assert_eq!(
            extract("https://host/uuid/ab_cd-12?ref=badge").unwrap(),
            "ab_cd-12"
        );
    }

    #[test]
    fn test_first_match_wins() {
        assert_eq!(extract("/uuid/first1/uuid/second2").unwrap(), "first1");
    }

    #[test]
    fn test_plain_input_is_trimmed() {
        assert_eq!(extract("  xyz123 \t\r\n").unwrap(), "xyz123");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(extract(""), Err(IdentifierError::EmptyInput));
        assert_eq!(extract("   \n"), Err(IdentifierError::EmptyInput));
    }

    #[test]
    fn test_too_short() {
        assert_eq!(extract("ab"), Err(IdentifierError::TooShort("ab".into())));
        assert_eq!(
            extract("http://host/uuid/abc"),
            Err(IdentifierError::TooShort("abc".into()))
        );
    }

    #[test]
    fn test_length_counts_characters() {
        // Four characters, more than four bytes.
        assert_eq!(extract("éééé").unwrap(), "éééé");
        assert!(extract("ééé").is_err());
    }

    #[test]
    fn test_link_without_token_falls_back_to_input() {
        assert_eq!(extract("http://host/uuid/").unwrap(), "http://host/uuid/");
    }
}
