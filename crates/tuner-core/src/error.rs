//! Error types for Tuner Core
//!
//! Every fault raised by a native backend is classified where it originates and
//! surfaced as a single structured [`Error`]. The `kind` drives the recovery verb,
//! the `fatal` flag overrides it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error codes reported alongside the error kind
pub mod codes {
    pub const INVALID_STATE: &str = "INVALID_STATE";
    pub const INVALID_CONFIG: &str = "INVALID_CONFIG";
    pub const ABORTED: &str = "ABORTED";
    pub const NETWORK: &str = "NETWORK";
    pub const DECODE: &str = "DECODE";
    pub const SRC_NOT_SUPPORTED: &str = "SRC_NOT_SUPPORTED";
    pub const UNRECOGNIZED: &str = "UNRECOGNIZED";
    pub const MEDIA: &str = "MEDIA";
    pub const DRM: &str = "DRM";
    pub const MANIFEST: &str = "MANIFEST";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const UNSUPPORTED_AUDIO: &str = "UNSUPPORTED_AUDIO";
    pub const UNSUPPORTED_ENGINE: &str = "UNSUPPORTED_ENGINE";
    pub const QUALITY_NOT_FOUND: &str = "QUALITY_NOT_FOUND";
    pub const TRACK_NOT_FOUND: &str = "TRACK_NOT_FOUND";
}

/// Error taxonomy shared by every engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Media,
    Drm,
    UnsupportedFormat,
    UnsupportedAudio,
    Timeout,
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::Media => write!(f, "media"),
            ErrorKind::Drm => write!(f, "drm"),
            ErrorKind::UnsupportedFormat => write!(f, "unsupported_format"),
            ErrorKind::UnsupportedAudio => write!(f, "unsupported_audio"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Structured playback error
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind} error [{code}]: {message}")]
pub struct Error {
    /// Taxonomy bucket
    pub kind: ErrorKind,
    /// Stable code for analytics
    pub code: String,
    /// Human-readable description
    pub message: String,
    /// A fatal error is never retried, whatever its kind
    pub fatal: bool,
    /// Native payload, when the backend provided one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Error {
    /// Create a non-fatal error
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            fatal: false,
            details: None,
        }
    }

    /// Set the fatal flag
    pub fn with_fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    /// Attach a native payload
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Operation is illegal in the current lifecycle or native state
    pub fn invalid_state(operation: &str, state: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::Unknown,
            codes::INVALID_STATE,
            format!("{} is not allowed in state {}", operation, state),
        )
        .with_details(serde_json::json!({
            "operation": operation,
            "state": state.to_string(),
        }))
    }

    /// Operation called before `initialize`
    pub fn not_initialized(operation: &str) -> Self {
        Self::invalid_state(operation, "uninitialized")
    }

    /// Configuration could not be parsed or is out of range
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, codes::INVALID_CONFIG, message)
    }

    /// No engine can handle the stream/platform combination
    pub fn unsupported_engine(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedFormat, codes::UNSUPPORTED_ENGINE, message).with_fatal(true)
    }

    pub fn quality_not_found(id: &str) -> Self {
        Self::new(ErrorKind::Unknown, codes::QUALITY_NOT_FOUND, format!("no quality level with id {}", id))
    }

    pub fn track_not_found(id: &str) -> Self {
        Self::new(ErrorKind::Unknown, codes::TRACK_NOT_FOUND, format!("no track with id {}", id))
    }

    /// Returns true if this error was raised by a lifecycle or state guard
    pub fn is_invalid_state(&self) -> bool {
        self.code == codes::INVALID_STATE
    }

    /// Returns true if the recovery coordinator may act on this error
    pub fn is_recoverable(&self) -> bool {
        crate::fault::is_recoverable(self)
    }

    /// Returns the error code for analytics
    pub fn error_code(&self) -> &str {
        &self.code
    }
}
