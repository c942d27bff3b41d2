//! Fault taxonomy and classification
//!
//! Pure functions mapping the native fault shapes of each backend onto the
//! structured [`Error`], and each error onto a recovery verb.

use crate::error::{codes, Error, ErrorKind};
use crate::native::{FaultCategory, LibraryFault, MediaFault, NativeFaultCode, PlayerFault};
use serde::{Deserialize, Serialize};

/// Recovery verb chosen for a classified error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryAction {
    /// Retry the same work after a backoff
    Retry,
    /// Give up on the current unit of work (e.g. the channel) and move on
    Skip,
    /// Rebuild playback with a different concrete engine
    Fallback,
    /// Surface a terminal error
    Fail,
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryAction::Retry => write!(f, "retry"),
            RecoveryAction::Skip => write!(f, "skip"),
            RecoveryAction::Fallback => write!(f, "fallback"),
            RecoveryAction::Fail => write!(f, "fail"),
        }
    }
}

impl ErrorKind {
    /// Verb for a non-fatal error of this kind
    pub fn default_action(&self) -> RecoveryAction {
        match self {
            ErrorKind::Network | ErrorKind::Media | ErrorKind::Timeout => RecoveryAction::Retry,
            ErrorKind::UnsupportedAudio => RecoveryAction::Skip,
            ErrorKind::UnsupportedFormat => RecoveryAction::Fallback,
            ErrorKind::Drm | ErrorKind::Unknown => RecoveryAction::Fail,
        }
    }
}

/// Verb for an error; the fatal flag always forces `Fail`
pub fn recovery_action(error: &Error) -> RecoveryAction {
    if error.fatal {
        RecoveryAction::Fail
    } else {
        error.kind.default_action()
    }
}

/// Returns true if the coordinator may retry, skip or fall back
pub fn is_recoverable(error: &Error) -> bool {
    !error.fatal
        && matches!(
            recovery_action(error),
            RecoveryAction::Retry | RecoveryAction::Skip | RecoveryAction::Fallback
        )
}

/// Classify a media element error code
pub fn classify_native_fault(code: NativeFaultCode) -> Error {
    match code {
        NativeFaultCode::Aborted => Error::new(ErrorKind::Media, codes::ABORTED, "media loading aborted"),
        NativeFaultCode::Network => Error::new(ErrorKind::Network, codes::NETWORK, "network error while loading media"),
        NativeFaultCode::Decode => {
            Error::new(ErrorKind::Media, codes::DECODE, "media decoding failed").with_fatal(true)
        }
        NativeFaultCode::SourceNotSupported => Error::new(
            ErrorKind::UnsupportedFormat,
            codes::SRC_NOT_SUPPORTED,
            "media source or format not supported",
        )
        .with_fatal(true),
        NativeFaultCode::Unrecognized(raw) => Error::new(
            ErrorKind::Unknown,
            codes::UNRECOGNIZED,
            format!("unrecognized media error code {}", raw),
        ),
    }
}

/// Classify a media element fault, keeping its message as details
pub fn classify_media_fault(fault: &MediaFault) -> Error {
    let error = classify_native_fault(fault.code);
    if fault.message.is_empty() {
        return error;
    }
    error.with_details(serde_json::json!({
        "native_code": fault.code.as_code(),
        "native_message": fault.message,
    }))
}

/// Classify a streaming library fault
pub fn classify_library_fault(fault: &LibraryFault) -> Error {
    let (kind, code) = match fault.category {
        FaultCategory::Network => (ErrorKind::Network, codes::NETWORK),
        FaultCategory::Media | FaultCategory::Mux => (ErrorKind::Media, codes::MEDIA),
        FaultCategory::Drm => (ErrorKind::Drm, codes::DRM),
        FaultCategory::Manifest => (ErrorKind::UnsupportedFormat, codes::MANIFEST),
        FaultCategory::Timeout => (ErrorKind::Timeout, codes::TIMEOUT),
        FaultCategory::Other => (ErrorKind::Unknown, codes::UNRECOGNIZED),
    };
    // DRM is never recoverable
    let fatal = fault.critical || kind == ErrorKind::Drm;

    Error::new(kind, code, fault.message.clone())
        .with_fatal(fatal)
        .with_details(serde_json::json!({
            "category": fault.category,
            "native_code": fault.code,
        }))
}

/// Known fault vocabulary for the audio codec family the embedded decoder rejects.
///
/// Heuristic: matched case-insensitively against the native fault message.
pub const UNDECODABLE_AUDIO_PATTERNS: &[&str] = &[
    "ac3",
    "ac-3",
    "e-ac-3",
    "dolby",
    "unsupported audio",
    "audio codec not supported",
    "not_supported_audio_codec",
];

/// Returns true if a native fault message names the undecodable audio codec
pub fn is_undecodable_audio(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    UNDECODABLE_AUDIO_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

/// Classify an embedded player fault from its message text
pub fn classify_player_fault(fault: &PlayerFault) -> Error {
    let lower = fault.message.to_ascii_lowercase();
    let details = serde_json::json!({ "native_message": fault.message });

    // Must run before the generic buckets: these faults often also say "not supported"
    if is_undecodable_audio(&lower) {
        return Error::new(
            ErrorKind::UnsupportedAudio,
            codes::UNSUPPORTED_AUDIO,
            "audio codec not decodable on this platform",
        )
        .with_details(details);
    }

    let error = if lower.contains("connection") || lower.contains("network") {
        Error::new(ErrorKind::Network, codes::NETWORK, fault.message.clone())
    } else if lower.contains("timeout") || lower.contains("timed out") {
        Error::new(ErrorKind::Timeout, codes::TIMEOUT, fault.message.clone())
    } else if lower.contains("drm") {
        Error::new(ErrorKind::Drm, codes::DRM, fault.message.clone()).with_fatal(true)
    } else if lower.contains("not_supported_file")
        || lower.contains("unsupported_file")
        || lower.contains("invalid_uri")
        || lower.contains("unsupported format")
    {
        Error::new(ErrorKind::UnsupportedFormat, codes::SRC_NOT_SUPPORTED, fault.message.clone())
            .with_fatal(true)
    } else {
        Error::new(ErrorKind::Media, codes::MEDIA, fault.message.clone())
    };

    error.with_details(details)
}
