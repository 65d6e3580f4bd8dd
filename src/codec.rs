//! Plaintext body encoding (what goes inside the AES ciphertext).
//!
//! Current clients encrypt a small JSON object, `{"text": .., "image": ..}`. Early clients
//! encrypted the bare message text. Parsing tries the structured form first and falls back to
//! raw text explicitly, so the two shapes never get confused for one another.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// DecryptedPayload is what a reader reconstructs. Never persisted, never sent in the clear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecryptedPayload {
    pub text: String,
    /// Reference (URL) to an attachment held in object storage.
    pub image: Option<String>,
}

impl DecryptedPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), image: None }
    }

    pub fn with_image(text: impl Into<String>, image: impl Into<String>) -> Self {
        Self { text: text.into(), image: Some(image.into()) }
    }
}

/// WirePayload is which shape the decrypted bytes turned out to have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirePayload {
    Structured(DecryptedPayload),
    RawText(String),
}

impl WirePayload {
    pub fn into_payload(self) -> DecryptedPayload {
        match self {
            WirePayload::Structured(payload) => payload,
            WirePayload::RawText(text) => DecryptedPayload { text, image: None },
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StructuredBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
}

/// serialize encodes a payload into the structured form
pub fn serialize(payload: &DecryptedPayload) -> Result<Vec<u8>> {
    let body = StructuredBody {
        text: Some(payload.text.clone()),
        image: payload.image.clone().filter(|image| !image.is_empty()),
    };
    serde_json::to_vec(&body).map_err(|e| Error::Codec(e.to_string()))
}

/// parse classifies decrypted bytes. Only non-UTF-8 input is an error.
pub fn parse(bytes: &[u8]) -> Result<WirePayload> {
    let text = std::str::from_utf8(bytes).map_err(|e| Error::Codec(format!("payload is not utf-8: {e}")))?;
    match structured_body(text) {
        // An object with neither field carries nothing; treat it as somebody's literal text
        None | Some(StructuredBody { text: None, image: None }) => Ok(WirePayload::RawText(text.to_owned())),
        Some(body) => Ok(WirePayload::Structured(DecryptedPayload {
            text: body.text.unwrap_or_default(),
            image: body.image.filter(|image| !image.is_empty()),
        })),
    }
}

// Derived struct deserialisation also accepts a JSON array by position, so only an object counts
fn structured_body(text: &str) -> Option<StructuredBody> {
    match serde_json::from_str::<Value>(text) {
        Ok(object @ Value::Object(_)) => serde_json::from_value(object).ok(),
        _ => None,
    }
}

/// deserialize is parse, flattened to a payload
pub fn deserialize(bytes: &[u8]) -> Result<DecryptedPayload> {
    parse(bytes).map(WirePayload::into_payload)
}

/* ------------------------------------------------------------------------- */

// TESTS

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_round_trip() {
        let payload = DecryptedPayload::with_image("look", "https://cdn.example/cat.png");
        let bytes = serialize(&payload).unwrap();
        assert_eq!(parse(&bytes).unwrap(), WirePayload::Structured(payload));
    }

    #[test]
    fn absent_image_is_omitted_and_stays_absent() {
        let bytes = serialize(&DecryptedPayload::text("hi")).unwrap();
        assert_eq!(bytes, br#"{"text":"hi"}"#);
        assert_eq!(deserialize(&bytes).unwrap(), DecryptedPayload::text("hi"));
    }

    #[test]
    fn image_only_message_keeps_empty_text() {
        let bytes = br#"{"image":"https://cdn.example/a.png"}"#;
        let payload = deserialize(bytes).unwrap();
        assert_eq!(payload.text, "");
        assert_eq!(payload.image.as_deref(), Some("https://cdn.example/a.png"));
    }

    #[test]
    fn null_and_empty_image_normalise_to_none() {
        assert_eq!(deserialize(br#"{"text":"a","image":null}"#).unwrap().image, None);
        assert_eq!(deserialize(br#"{"text":"a","image":""}"#).unwrap().image, None);
    }

    #[test]
    fn legacy_raw_text() {
        let parsed = parse(b"hello from 2023").unwrap();
        assert_eq!(parsed, WirePayload::RawText("hello from 2023".into()));
        assert_eq!(parsed.into_payload(), DecryptedPayload::text("hello from 2023"));
    }

    #[test]
    fn json_that_is_not_our_shape_is_raw_text() {
        for raw in [r#"{"foo":1}"#, "{}", "42", r#"["text"]"#, r#"{"text":"a","extra":true}"#] {
            assert_eq!(parse(raw.as_bytes()).unwrap(), WirePayload::RawText(raw.into()), "{raw}");
        }
    }

    #[test]
    fn json_array_is_never_read_by_position() {
        let raw = r#"["ok","https://evil.example/x.png"]"#;
        assert_eq!(parse(raw.as_bytes()).unwrap(), WirePayload::RawText(raw.into()));
        assert_eq!(deserialize(raw.as_bytes()).unwrap(), DecryptedPayload::text(raw));
    }

    #[test]
    fn text_containing_json_syntax_survives() {
        let payload = DecryptedPayload::text(r#"{"text":"nested"}"#);
        assert_eq!(deserialize(&serialize(&payload).unwrap()).unwrap(), payload);
    }

    #[test]
    fn invalid_utf8_is_a_codec_error() {
        let err = deserialize(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }
}
