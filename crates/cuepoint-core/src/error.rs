//! Error types for Cuepoint Core

use thiserror::Error;

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Session error types
#[derive(Error, Debug)]
pub enum Error {
    // Engine errors
    #[error("Playback was rejected by the engine (autoplay blocked)")]
    AutoplayBlocked,

    #[error("Engine error: {0}")]
    Engine(String),

    // Marker configuration errors
    #[error("Duplicate marker identifier: {identifier}")]
    DuplicateMarker { identifier: String },

    #[error("Invalid marker {identifier}: {reason}")]
    InvalidMarker { identifier: String, reason: String },

    // Question service errors
    #[error("Failed to fetch question {identifier}: {message}")]
    QuestionFetch { identifier: String, message: String },

    #[error("Question service returned HTTP {status} for {identifier}")]
    QuestionStatus { identifier: String, status: u16 },

    // Network errors
    #[cfg(feature = "http")]
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // Telemetry errors
    #[error("Heartbeat delivery failed: {0}")]
    Heartbeat(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Session lifecycle
    #[error("Session has been disposed")]
    SessionClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a question fetch error
    pub fn question(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Error::QuestionFetch {
            identifier: identifier.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error is recovered locally without surfacing it
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::AutoplayBlocked
            | Error::QuestionFetch { .. }
            | Error::QuestionStatus { .. }
            | Error::Heartbeat(_) => true,
            #[cfg(feature = "http")]
            Error::Network(_) => true,
            _ => false,
        }
    }

    /// Returns true for marker list and config problems detected at load time
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::DuplicateMarker { .. } | Error::InvalidMarker { .. } | Error::InvalidConfig(_)
        )
    }

    /// Returns the error code for logs and telemetry
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::AutoplayBlocked => "AUTOPLAY_BLOCKED",
            Error::Engine(_) => "ENGINE",
            Error::DuplicateMarker { .. } => "DUPLICATE_MARKER",
            Error::InvalidMarker { .. } => "INVALID_MARKER",
            Error::QuestionFetch { .. } => "QUESTION_FETCH",
            Error::QuestionStatus { .. } => "QUESTION_STATUS",
            #[cfg(feature = "http")]
            Error::Network(_) => "NETWORK",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::Heartbeat(_) => "HEARTBEAT",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::SessionClosed => "SESSION_CLOSED",
            Error::Json(_) => "JSON",
            Error::Io(_) => "IO",
        }
    }
}
