//! Lifecycle states of a worklog entry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Lifecycle state of a task attempt.
///
/// States carry an ordinal for relative comparison: `Pending(0)` precedes
/// `Running(1)`, which precedes the terminal states `Complete(2)`,
/// `Canceled(3)` and `Failed(4)`. `Unknown` sits before everything at -1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Unknown,
    Pending,
    Running,
    Complete,
    Canceled,
    Failed,
}

impl State {
    pub fn ordinal(self) -> i8 {
        match self {
            State::Unknown => -1,
            State::Pending => 0,
            State::Running => 1,
            State::Complete => 2,
            State::Canceled => 3,
            State::Failed => 4,
        }
    }

    pub fn before(self, other: State) -> bool {
        self.ordinal() < other.ordinal()
    }

    pub fn after(self, other: State) -> bool {
        self.ordinal() > other.ordinal()
    }

    /// Terminal states: the attempt has reached an outcome.
    pub fn resolved(self) -> bool {
        matches!(self, State::Complete | State::Canceled | State::Failed)
    }

    /// Terminal states that are not success.
    pub fn failure(self) -> bool {
        matches!(self, State::Canceled | State::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Unknown => "unknown",
            State::Pending => "pending",
            State::Running => "running",
            State::Complete => "complete",
            State::Canceled => "canceled",
            State::Failed => "failed",
        }
    }

    /// The human-readable name of this state.
    pub fn name(self) -> &'static str {
        match self {
            State::Unknown => "Unknown",
            State::Pending => "Pending",
            State::Running => "Running",
            State::Complete => "Complete",
            State::Canceled => "Canceled",
            State::Failed => "Failed",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(State::Unknown),
            "pending" => Ok(State::Pending),
            "running" => Ok(State::Running),
            "complete" => Ok(State::Complete),
            "canceled" => Ok(State::Canceled),
            "failed" => Ok(State::Failed),
            other => Err(Error::InvalidParameters(format!("invalid state: {other}"))),
        }
    }
}
