//! Message kinds.

use std::fmt;
use std::str::FromStr;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

use crate::error::Error;

/// How a task is executed and accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Kind {
    /// Work is logged, duplicates suppressed, failures retryable.
    Managed,
    /// Best-effort execution; no durable record. The zero value: an absent
    /// or empty kind decodes as oneshot.
    #[default]
    Oneshot,
    /// A managed task injected by an external scheduler without a
    /// pre-assigned identifier.
    Cronjob,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Managed => "managed",
            Kind::Oneshot => "oneshot",
            Kind::Cronjob => "cronjob",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Kind::Oneshot);
        }
        if s.eq_ignore_ascii_case("managed") {
            Ok(Kind::Managed)
        } else if s.eq_ignore_ascii_case("oneshot") {
            Ok(Kind::Oneshot)
        } else if s.eq_ignore_ascii_case("cronjob") {
            Ok(Kind::Cronjob)
        } else {
            Err(Error::InvalidParameters(format!("invalid kind: {s}")))
        }
    }
}

impl Serialize for Kind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Kind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
