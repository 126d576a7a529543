//! Base64 helpers. Pure functions, no backend involved.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{BridgeError, Result};

pub fn base64_encode(input: &[u8]) -> String {
    STANDARD.encode(input)
}

pub fn base64_decode(input: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(input.trim())
        .map_err(|e| BridgeError::InvalidBase64(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_beyond_ascii() {
        for input in ["", "plain", "ключ,значение", "tab\tnull\0end", "🦀"] {
            let encoded = base64_encode(input.as_bytes());
            assert_eq!(base64_decode(&encoded).unwrap(), input.as_bytes());
        }
    }

    #[test]
    fn test_known_vector() {
        assert_eq!(base64_encode(b"hi"), "aGk=");
    }

    #[test]
    fn test_rejects_invalid_input() {
        assert!(base64_decode("not base64!").is_err());
    }
}
