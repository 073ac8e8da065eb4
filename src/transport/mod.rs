//! On-queue message representation.
//!
//! Decouples the broker envelope from the in-memory [`Message`]: short
//! descriptors travel as envelope attributes (header form), everything else
//! as a JSON payload (inline form).

mod kind;
mod message;

pub use kind::Kind;
pub use message::{Message, MIME_HEADER, MIME_INLINE};

/// Serde adapter encoding byte fields as standard base64 strings.
pub(crate) mod b64 {
    use data_encoding::BASE64;
    use serde::de::{Deserialize, Deserializer};
    use serde::ser::Serializer;

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BASE64
            .decode(raw.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
