//! Defensive JSON decoding with typed fallbacks.
//!
//! Generation services are asked for structured JSON but occasionally return
//! something else. Every consumer goes through [`decode_with_fallback`] so a
//! malformed payload degrades to a known default instead of aborting the
//! surrounding pipeline.

use serde::de::DeserializeOwned;
use tracing::warn;

/// A decoded value, tagged with whether the fallback was used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded<T> {
    /// The payload parsed cleanly.
    Parsed(T),
    /// The payload was unusable; this is the caller's fallback.
    Fallback(T),
}

impl<T> Decoded<T> {
    /// Unwrap into the inner value, whichever way it was produced.
    pub fn into_value(self) -> T {
        match self {
            Self::Parsed(value) | Self::Fallback(value) => value,
        }
    }

    /// Whether the fallback was used.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// Decode `json` into `T`, substituting `fallback` on any parse failure.
///
/// Fails open: the parse error is logged at `warn`, never propagated.
pub fn decode_with_fallback<T: DeserializeOwned>(json: &str, fallback: T) -> Decoded<T> {
    match serde_json::from_str(json) {
        Ok(value) => Decoded::Parsed(value),
        Err(err) => {
            warn!(
                error = %err,
                preview = preview(json),
                "structured response failed to parse, using fallback"
            );
            Decoded::Fallback(fallback)
        }
    }
}

/// At most 100 bytes of `json`, cut on a char boundary.
fn preview(json: &str) -> &str {
    let mut end = json.len().min(100);
    while !json.is_char_boundary(end) {
        end -= 1;
    }
    &json[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Default, PartialEq)]
    struct StoryPayload {
        story: String,
    }

    #[test]
    fn parses_valid_payload() {
        let decoded =
            decode_with_fallback::<StoryPayload>(r#"{"story":"once"}"#, StoryPayload::default());
        assert!(!decoded.is_fallback());
        assert_eq!(decoded.into_value().story, "once");
    }

    #[test]
    fn malformed_payload_uses_fallback() {
        let decoded = decode_with_fallback::<StoryPayload>("not json", StoryPayload::default());
        assert!(decoded.is_fallback());
        assert_eq!(decoded.into_value().story, "");
    }

    #[test]
    fn wrong_shape_uses_fallback() {
        let decoded = decode_with_fallback::<Vec<String>>(r#"{"story":"x"}"#, Vec::new());
        assert!(decoded.is_fallback());
        assert!(decoded.into_value().is_empty());
    }

    #[test]
    fn multibyte_payload_never_splits_the_log_preview() {
        // With a subscriber installed the warn fields are evaluated, so the
        // preview must land on a char boundary.
        let subscriber = tracing_subscriber::fmt().with_test_writer().finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let payload = "あ".repeat(50);
        let decoded = decode_with_fallback::<StoryPayload>(&payload, StoryPayload::default());
        assert!(decoded.is_fallback());
        assert_eq!(preview(&payload), "あ".repeat(33));
    }
}
