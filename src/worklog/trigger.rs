//! Follow-up task declarations.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use super::State;

/// Maps a state to the UTDs that should be enqueued when the controlling
/// task reaches that state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Triggers(BTreeMap<State, Vec<String>>);

impl Triggers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append follow-up UTDs for a state.
    pub fn add(&mut self, state: State, utds: impl IntoIterator<Item = impl Into<String>>) {
        self.0
            .entry(state)
            .or_default()
            .extend(utds.into_iter().map(Into::into));
    }
}

impl Deref for Triggers {
    type Target = BTreeMap<State, Vec<String>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Triggers {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
