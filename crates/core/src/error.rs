use std::path::PathBuf;

use crate::slot::SlotId;

/// Result alias that carries the custom [`ShowloopError`] type.
pub type Result<T> = std::result::Result<T, ShowloopError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum ShowloopError {
    /// Free-form message, mostly used by the application crate.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// The configuration parsed but holds values the player cannot run with.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Assign(#[from] AssignError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// A state handler was dispatched for a state it does not define.
    #[error("operation `{operation}` is not defined in state {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },
}

impl ShowloopError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for ShowloopError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for ShowloopError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

/// Reasons a video could not be put into a playback slot.
#[derive(Debug, thiserror::Error)]
pub enum AssignError {
    /// The playlist had nothing to offer.
    #[error("no video available, the playlist is empty")]
    NoIdentifier,
    #[error("slot {0} already holds a live player")]
    AlreadyOccupied(SlotId),
    #[error("slot {0} holds no player to load a video into")]
    Vacant(SlotId),
    #[error("video file `{}` not found", .0.display())]
    NotFound(PathBuf),
    #[error("video file `{}` is a directory", .0.display())]
    IsDirectory(PathBuf),
    #[error("read permission denied for video file `{}`", .0.display())]
    PermissionDenied(PathBuf),
    #[error("player initialisation failed for `{}`: {source}", path.display())]
    EngineInitFailed { path: PathBuf, source: EngineError },
    #[error("duration of `{}` could not be evaluated: {source}", path.display())]
    DurationUnavailable { path: PathBuf, source: EngineError },
}

impl AssignError {
    /// Empty playlists are reported as warnings and retried.
    pub fn is_selection(&self) -> bool {
        matches!(self, Self::NoIdentifier)
    }
}

/// Failure talking to a playback engine or one of its handles.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("player has already been closed")]
    Closed,
    #[error("engine rejected `{command}`: {reason}")]
    Rejected { command: String, reason: String },
    #[error("malformed engine reply: {0}")]
    Protocol(String),
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_assign_errors() {
        assert!(AssignError::NoIdentifier.is_selection());
        assert!(!AssignError::NotFound(PathBuf::from("a.mp4")).is_selection());
        let engine = AssignError::EngineInitFailed {
            path: PathBuf::from("a.mp4"),
            source: EngineError::Closed,
        };
        assert!(!engine.is_selection());
    }

    #[test]
    fn messages_name_the_file() {
        let err = ShowloopError::from(AssignError::NotFound(PathBuf::from("missing.mp4")));
        assert!(format!("{err}").contains("missing.mp4"));
    }
}
