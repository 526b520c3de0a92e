mod sessions;

pub use sessions::{InputRequest, NoopSession, Session, SessionError};

use thiserror::Error;

pub type TaskId = usize;

/// Why a task was aborted for exceeding a resource budget.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AbortLimitReason {
    /// The task hit its tick budget.
    Ticks(usize),
    /// The task hit its wall-clock budget.
    Time(std::time::Duration),
}

/// Failures in turning a command line into a verb invocation.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum CommandError {
    #[error("Could not parse command")]
    CouldNotParseCommand,
    #[error("Could not find object match for command")]
    NoObjectMatch,
    #[error("Could not find verb match for command")]
    NoCommandMatch,
    #[error("Permission denied for command")]
    PermissionDenied,
}

impl CommandError {
    /// The canonical line shown to the player for each failure.
    pub fn to_player_message(&self) -> &'static str {
        match self {
            CommandError::CouldNotParseCommand => "I couldn't understand that.",
            CommandError::NoObjectMatch => "I don't see that here.",
            CommandError::NoCommandMatch => "I don't understand that.",
            CommandError::PermissionDenied => "You can't do that.",
        }
    }
}
