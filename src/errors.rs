// SPDX-License-Identifier: MPL-2.0

//! Error types for chroma key sessions
//!
//! Every failure a session can hit falls into one of four classes:
//!
//! - [`SessionError::Configuration`]: bad or missing host arguments, detected
//!   before any device is opened
//! - [`SessionError::Resource`]: a camera or background source could not be
//!   initialized while building the pipeline
//! - [`SessionError::Runtime`]: the encoder or a file write failed while
//!   recording
//! - [`SessionError::Cancelled`]: the user closed the session
//!
//! [`SessionError::Rejected`] is not terminal: the command was not valid in
//! the current state and the session carries on.

use crate::backends::camera::types::BackendError;

/// Result type alias using SessionError
pub type SessionResult<T> = Result<T, SessionError>;

/// Reason string reported to the host when the user closes the session
pub const USER_CLOSED: &str = "user closed";

/// Top-level session error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    Configuration(#[from] ConfigError),
    #[error("{0}")]
    Resource(BackendError),
    #[error("{0}")]
    Runtime(String),
    #[error("{}", USER_CLOSED)]
    Cancelled,
    #[error("{0}")]
    Rejected(String),
}

impl SessionError {
    /// Message delivered through the host's error callback
    pub fn host_message(&self) -> String {
        self.to_string()
    }
}

/// Errors from the host argument parse step and the settings file
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid mode: {0}")]
    InvalidMode(String),
    #[error("invalid background mode: {0}")]
    InvalidBackgroundMode(String),
    #[error("invalid color: {0}")]
    InvalidColor(String),
    #[error("missing mandatory argument: {0}")]
    MissingArgument(&'static str),
    #[error("{name} must be within [0, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f32,
        max: f32,
    },
    #[error("background source does not match background mode")]
    BackgroundMismatch,
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("settings file error: {0}")]
    Settings(String),
}

/// Recording controller errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordingError {
    /// Command not valid in the current capture state
    #[error("cannot {command} while {state}")]
    InvalidState {
        command: &'static str,
        state: &'static str,
    },
    /// Command not available for this session's operation mode
    #[error("{0} is not available in this mode")]
    WrongMode(&'static str),
    /// Rewind needs a looping video background
    #[error("rewind requires a video background")]
    RewindUnavailable,
    /// The recording was stopped before any frame was encoded
    #[error("recording contains no frames")]
    EmptyRecording,
    #[error("still capture failed: {0}")]
    CaptureFailed(String),
    #[error("encoder failed: {0}")]
    Encoder(String),
    #[error("file error: {0}")]
    Storage(String),
    /// The frame-processing thread stopped responding
    #[error("pipeline unavailable: {0}")]
    Pipeline(String),
}

impl RecordingError {
    /// Whether this failure ends the session (as opposed to a rejected command)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RecordingError::EmptyRecording
                | RecordingError::CaptureFailed(_)
                | RecordingError::Encoder(_)
                | RecordingError::Storage(_)
                | RecordingError::Pipeline(_)
        )
    }
}

impl From<RecordingError> for SessionError {
    fn from(err: RecordingError) -> Self {
        if err.is_fatal() {
            SessionError::Runtime(err.to_string())
        } else {
            SessionError::Rejected(err.to_string())
        }
    }
}

impl From<std::io::Error> for RecordingError {
    fn from(err: std::io::Error) -> Self {
        RecordingError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_reports_user_closed() {
        assert_eq!(SessionError::Cancelled.host_message(), "user closed");
    }

    #[test]
    fn test_config_messages() {
        let err = SessionError::from(ConfigError::InvalidMode("movie".into()));
        assert_eq!(err.host_message(), "invalid mode: movie");
        let err = ConfigError::MissingArgument("backgroundVideo");
        assert_eq!(err.to_string(), "missing mandatory argument: backgroundVideo");
    }

    #[test]
    fn test_rejected_commands_are_not_runtime_errors() {
        let err = SessionError::from(RecordingError::RewindUnavailable);
        assert_eq!(err, SessionError::Rejected("rewind requires a video background".into()));
        let err = SessionError::from(RecordingError::EmptyRecording);
        assert!(matches!(err, SessionError::Runtime(_)));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(RecordingError::EmptyRecording.is_fatal());
        assert!(!RecordingError::RewindUnavailable.is_fatal());
        assert!(
            !RecordingError::InvalidState {
                command: "accept",
                state: "idle"
            }
            .is_fatal()
        );
    }
}
