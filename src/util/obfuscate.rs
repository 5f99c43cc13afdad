//! Reversible text obfuscation
//!
//! Text is written as [`PREFIX`] followed by two lowercase hex digits per UTF-8
//! byte, so every encoded value has odd length. An absent value is written as
//! the single character [`NULL_MARKER`].
//!
//! This hides values from casual inspection only. It is not encryption.

use crate::error::{DataError, Result};

/// Leading character of every encoded value
pub const PREFIX: char = '_';

/// Encoding of an absent value
pub const NULL_MARKER: &str = "~";

/// Encode text; `None` becomes [`NULL_MARKER`]
#[must_use]
pub fn encode(text: Option<&str>) -> String {
    match text {
        Some(text) => format!("{PREFIX}{}", hex::encode(text)),
        None => NULL_MARKER.to_string(),
    }
}

/// Decode text produced by [`encode`]
///
/// Fails with `NullArgument` for `None` and `MalformedEncodedText` when the
/// prefix is missing, the length is even, a digit is not hex, or the bytes
/// are not valid UTF-8.
pub fn decode(text: Option<&str>) -> Result<Option<String>> {
    let text = text.ok_or(DataError::NullArgument("text"))?;

    if text == NULL_MARKER {
        return Ok(None);
    }

    let Some(digits) = text.strip_prefix(PREFIX).filter(|_| text.len() % 2 == 1) else {
        return Err(DataError::malformed(format!("'{text}' lacks the prefix or has even length")));
    };

    let bytes = hex::decode(digits)
        .map_err(|e| DataError::malformed(format!("Error decoding '{text}': {e}")))?;
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|e| DataError::malformed(format!("Error decoding '{text}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_ascii() {
        assert_eq!(encode(Some("AB")), "_4142");
        assert_eq!(encode(Some("\n")), "_0a");
    }

    #[test]
    fn test_encode_empty_and_null_differ() {
        assert_eq!(encode(Some("")), "_");
        assert_eq!(encode(None), NULL_MARKER);
    }

    #[test]
    fn test_decode_null_marker() {
        assert_eq!(decode(Some(NULL_MARKER)).unwrap(), None);
        assert_eq!(decode(Some("_")).unwrap(), Some(String::new()));
    }

    #[test]
    fn test_decode_accepts_upper_case_hex() {
        assert_eq!(decode(Some("_4A4b")).unwrap(), Some("JK".to_string()));
    }

    #[test]
    fn test_decode_null_argument() {
        let err = decode(None).unwrap_err();
        assert!(matches!(err, DataError::NullArgument("text")));
    }

    #[test]
    fn test_decode_rejects_missing_prefix() {
        assert_eq!(decode(Some("414")).unwrap_err().error_code(), "MALFORMED_ENCODED_TEXT");
    }

    #[test]
    fn test_decode_rejects_even_length() {
        assert_eq!(decode(Some("_414")).unwrap_err().error_code(), "MALFORMED_ENCODED_TEXT");
    }

    #[test]
    fn test_decode_rejects_non_hex() {
        assert_eq!(decode(Some("_4g")).unwrap_err().error_code(), "MALFORMED_ENCODED_TEXT");
        // multi-byte character after the prefix must not panic on slicing
        assert_eq!(decode(Some("_é")).unwrap_err().error_code(), "MALFORMED_ENCODED_TEXT");
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        assert_eq!(decode(Some("_ff")).unwrap_err().error_code(), "MALFORMED_ENCODED_TEXT");
    }

    #[test]
    fn test_round_trip_non_ascii() {
        let text = "Zoë – 東京 🚀";
        assert_eq!(decode(Some(&encode(Some(text)))).unwrap().as_deref(), Some(text));
    }
}
