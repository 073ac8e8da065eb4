//! The task envelope and its queue encodings.

use std::fmt;

use chrono::{DateTime, Utc};
use data_encoding::BASE64;
use serde::{Deserialize, Serialize};

use super::{b64, Kind};
use crate::attrs::Attributes;
use crate::broker::Envelope;
use crate::error::{Error, Result};
use crate::ident::Ident;
use crate::worklog::{Entry, State, Triggers};

/// The header-oriented encoding: the descriptor travels as envelope
/// attributes, the payload is the opaque task data.
pub const MIME_HEADER: &str = "tasks/header";
/// The inlined encoding: the entire message travels as the JSON payload.
pub const MIME_INLINE: &str = "tasks/inline";

/// Brokers bound attribute values; descriptors longer than this are
/// carried inline.
const ATTR_LIMIT: usize = 1024;

const ATTR_ID: &str = "id";
const ATTR_TYPE: &str = "type";
const ATTR_SEQ: &str = "seq";
const ATTR_UTD: &str = "utd";
const ATTR_MIME: &str = "mime";

/// A task envelope: the unit of work a producer submits and a consumer
/// executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Ordered identifier; assigned on publish if zero.
    #[serde(default, skip_serializing_if = "Ident::is_zero")]
    pub id: Ident,
    /// Producer-controlled task sequence; generally, don't mess with it.
    #[serde(default)]
    pub seq: i64,
    #[serde(rename = "type", default)]
    pub kind: Kind,
    pub utd: String,
    /// Opaque payload.
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "b64")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Attributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Triggers>,
}

impl Message {
    /// A managed message for the given descriptor.
    pub fn new(utd: impl Into<String>) -> Self {
        Self {
            id: Ident::ZERO,
            seq: 0,
            kind: Kind::Managed,
            utd: utd.into(),
            data: Vec::new(),
            attrs: None,
            triggers: None,
        }
    }

    pub fn with_id(id: Ident, utd: impl Into<String>) -> Self {
        Self {
            id,
            ..Self::new(utd)
        }
    }

    pub fn kind(mut self, kind: Kind) -> Self {
        self.kind = kind;
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = Some(attrs);
        self
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs
            .get_or_insert_with(Attributes::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn triggers(mut self, triggers: Triggers) -> Self {
        self.triggers = Some(triggers);
        self
    }

    pub fn add_trigger(
        mut self,
        state: State,
        utds: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.triggers
            .get_or_insert_with(Triggers::new)
            .add(state, utds);
        self
    }

    /// Pop the first follow-up descriptor declared for a state, returning
    /// it together with the triggers that remain for that state.
    pub fn trigger_for_state(&self, state: State) -> Option<(String, Triggers)> {
        let utds = self.triggers.as_ref()?.get(&state)?;
        let first = utds.first()?.clone();
        let mut rest = Triggers::new();
        rest.insert(state, utds[1..].to_vec());
        Some((first, rest))
    }

    /// Seed a worklog entry from this message. Triggers are retained here,
    /// in the initial entry only; successors never inherit them.
    pub fn entry(&self, state: State, when: DateTime<Utc>) -> Entry {
        Entry::new(self.id, self.utd.clone(), state, when)
            .data(self.data.clone())
            .attrs(self.attrs.clone().unwrap_or_default())
            .triggers(self.triggers.clone().unwrap_or_default())
    }

    fn has_attrs_or_triggers(&self) -> bool {
        self.attrs.as_ref().is_some_and(|a| !a.is_empty())
            || self.triggers.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Encode for the broker, choosing the header form when the descriptor
    /// fits the attribute limit and nothing would be lost by it.
    pub fn encode(&self) -> Result<Envelope> {
        self.encode_with_limit(ATTR_LIMIT)
    }

    pub(crate) fn encode_with_limit(&self, limit: usize) -> Result<Envelope> {
        // attrs and triggers have no header representation; they force the
        // inline form so every message survives a round trip
        if self.utd.len() <= limit && !self.has_attrs_or_triggers() {
            let attributes: Attributes = [
                (ATTR_ID, self.id.to_string()),
                (ATTR_TYPE, self.kind.to_string()),
                (ATTR_UTD, self.utd.clone()),
                (ATTR_SEQ, self.seq.to_string()),
                (ATTR_MIME, MIME_HEADER.to_string()),
            ]
            .into_iter()
            .collect();
            Ok(Envelope {
                attributes,
                data: self.data.clone(),
            })
        } else {
            let attributes: Attributes =
                [(ATTR_MIME, MIME_INLINE.to_string())].into_iter().collect();
            Ok(Envelope {
                attributes,
                data: serde_json::to_vec(self)?,
            })
        }
    }

    /// Decode a broker envelope.
    pub fn parse(env: &Envelope) -> Result<Message> {
        match env.attributes.get(ATTR_MIME).map(String::as_str) {
            Some(MIME_INLINE) => {
                let msg: Message = serde_json::from_slice(&env.data)
                    .map_err(|err| Error::Encoding(format!("bad inline message: {err}")))?;
                if msg.utd.is_empty() {
                    return Err(Error::Malformed("message has no UTD".to_string()));
                }
                Ok(msg)
            }
            Some(MIME_HEADER) | None => Self::parse_header(env),
            Some(other) => Err(Error::Encoding(format!(
                "unsupported message encoding: {other}"
            ))),
        }
    }

    fn parse_header(env: &Envelope) -> Result<Message> {
        let id = match env.attributes.get(ATTR_ID) {
            Some(raw) => raw.parse()?,
            None => Ident::ZERO,
        };
        let kind: Kind = env
            .attributes
            .get(ATTR_TYPE)
            .map(String::as_str)
            .unwrap_or("")
            .parse()?;
        let seq = match env.attributes.get(ATTR_SEQ) {
            Some(raw) => raw
                .parse()
                .map_err(|err| Error::Encoding(format!("bad sequence: {err}")))?,
            None => 0,
        };

        // without a UTD attribute the raw payload is the descriptor itself;
        // this is the legacy cron-ingest path
        let (utd, data) = match env.attributes.get(ATTR_UTD) {
            Some(utd) => (utd.clone(), env.data.clone()),
            None => {
                let utd = String::from_utf8(env.data.clone())
                    .map_err(|err| Error::Encoding(format!("bad payload UTD: {err}")))?;
                (utd, Vec::new())
            }
        };
        if utd.is_empty() {
            return Err(Error::Malformed("message has no UTD".to_string()));
        }

        Ok(Message {
            id,
            seq,
            kind,
            utd,
            data,
            attrs: None,
            triggers: None,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} [{}] {} {}>",
            self.id,
            self.utd,
            self.kind,
            BASE64.encode(&self.data)
        )
    }
}
