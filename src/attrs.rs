//! String attribute maps attached to messages and worklog entries.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An ordered string-to-string attribute map. Persists as a JSON object;
/// ordering is deterministic so stored forms compare stably.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a value and parse it as an integer.
    pub fn int(&self, key: &str) -> Result<i64> {
        match self.0.get(key) {
            None => Err(Error::NotFound(key.to_string())),
            Some(v) => v
                .parse()
                .map_err(|err| Error::InvalidParameters(format!("{key}: {err}"))),
        }
    }

    pub fn set_int(&mut self, key: &str, value: i64) {
        self.0.insert(key.to_string(), value.to_string());
    }

    /// Fetch a value and parse it as a boolean.
    pub fn bool(&self, key: &str) -> Result<bool> {
        match self.0.get(key) {
            None => Err(Error::NotFound(key.to_string())),
            Some(v) => v
                .parse()
                .map_err(|err| Error::InvalidParameters(format!("{key}: {err}"))),
        }
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.0.insert(key.to_string(), value.to_string());
    }
}

impl Deref for Attributes {
    type Target = BTreeMap<String, String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Attributes {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
