//! Ordered task identifiers.
//!
//! An [`Ident`] is a 20-character identifier that sorts lexically in
//! descending creation order: listing identifiers in ascending string order
//! yields the newest first. The first six bytes are the bitwise complement
//! of the Unix epoch milliseconds, the remaining four are entropy.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use data_encoding::HEXLOWER;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use uuid::Uuid;

use crate::error::Error;

const IDENT_LEN: usize = 10;
const IDENT_STR_LEN: usize = 20;

/// A 20-character identifier, lexically descending by creation time.
///
/// The default value is the zero identifier, which displays as twenty
/// zeros and marks a message that has not been assigned one yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Ident([u8; IDENT_LEN]);

impl Ident {
    /// The zero identifier.
    pub const ZERO: Ident = Ident([0; IDENT_LEN]);

    /// Mint a fresh identifier for the current instant.
    pub fn new() -> Self {
        let ms = Utc::now().timestamp_millis() as u64;
        let inverted = (!ms).to_be_bytes();
        let entropy = Uuid::new_v4();

        let mut buf = [0u8; IDENT_LEN];
        buf[..6].copy_from_slice(&inverted[2..8]);
        buf[6..].copy_from_slice(&entropy.as_bytes()[..4]);
        Ident(buf)
    }

    pub fn is_zero(&self) -> bool {
        *self == Ident::ZERO
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&HEXLOWER.encode(&self.0))
    }
}

impl FromStr for Ident {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != IDENT_STR_LEN {
            return Err(Error::InvalidParameters(format!(
                "identifier must be {IDENT_STR_LEN} characters, got {}",
                s.len()
            )));
        }
        let raw = HEXLOWER
            .decode(s.as_bytes())
            .map_err(|err| Error::InvalidParameters(format!("invalid identifier: {err}")))?;
        let mut buf = [0u8; IDENT_LEN];
        buf.copy_from_slice(&raw);
        Ok(Ident(buf))
    }
}

impl Serialize for Ident {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Ident {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // null decodes as the zero identifier
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(Ident::ZERO),
            Some(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
