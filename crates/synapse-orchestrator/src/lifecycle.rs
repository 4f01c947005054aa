//! Session lifecycle states.
//!
//! `initialized -> training -> {completed, error, cancelled}`. Terminal states have no
//! outgoing edges, so a session never returns to `training`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Configured and waiting for an observer to start training.
    Initialized,
    /// The fit loop is running.
    Training,
    /// All configured epochs finished; the model answers predictions.
    Completed,
    /// Compilation or fitting failed.
    Error,
    /// The observer disconnected while training.
    Cancelled,
}

impl SessionState {
    pub const ALL: [Self; 5] =
        [Self::Initialized, Self::Training, Self::Completed, Self::Error, Self::Cancelled];

    /// Checks if the session can move to the given state.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Initialized, Self::Training)
                | (Self::Training, Self::Completed | Self::Error | Self::Cancelled)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Training => "training",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
