//! Explicit state machine for the embedded native player
//!
//! The native player rejects calls made in the wrong state, often without a
//! usable error. Every call is checked against this table first so misuse
//! surfaces as an `INVALID_STATE` error instead.

use crate::error::{Error, Result};
use crate::native::NativePlayerState;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Native player state, plus the sticky error state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EmbeddedState {
    None,
    Idle,
    Ready,
    Playing,
    Paused,
    Error,
}

impl From<NativePlayerState> for EmbeddedState {
    fn from(state: NativePlayerState) -> Self {
        match state {
            NativePlayerState::None => EmbeddedState::None,
            NativePlayerState::Idle => EmbeddedState::Idle,
            NativePlayerState::Ready => EmbeddedState::Ready,
            NativePlayerState::Playing => EmbeddedState::Playing,
            NativePlayerState::Paused => EmbeddedState::Paused,
        }
    }
}

impl std::fmt::Display for EmbeddedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddedState::None => write!(f, "NONE"),
            EmbeddedState::Idle => write!(f, "IDLE"),
            EmbeddedState::Ready => write!(f, "READY"),
            EmbeddedState::Playing => write!(f, "PLAYING"),
            EmbeddedState::Paused => write!(f, "PAUSED"),
            EmbeddedState::Error => write!(f, "ERROR"),
        }
    }
}

/// Native operations subject to state checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddedOp {
    Open,
    Prepare,
    Play,
    Pause,
    Stop,
    Seek,
    SelectTrack,
    Close,
}

impl EmbeddedOp {
    /// States in which the native player accepts this operation
    pub fn allowed_from(&self) -> &'static [EmbeddedState] {
        use EmbeddedState as S;
        match self {
            EmbeddedOp::Open => &[S::None, S::Idle],
            EmbeddedOp::Prepare => &[S::Idle],
            EmbeddedOp::Play => &[S::Ready, S::Paused],
            EmbeddedOp::Pause => &[S::Playing],
            EmbeddedOp::Stop => &[S::Playing, S::Paused],
            EmbeddedOp::Seek | EmbeddedOp::SelectTrack => &[S::Ready, S::Playing, S::Paused],
            EmbeddedOp::Close => &[S::None, S::Idle, S::Ready, S::Playing, S::Paused, S::Error],
        }
    }

    pub fn is_allowed(&self, state: EmbeddedState) -> bool {
        self.allowed_from().contains(&state)
    }
}

impl std::fmt::Display for EmbeddedOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddedOp::Open => write!(f, "open"),
            EmbeddedOp::Prepare => write!(f, "prepare"),
            EmbeddedOp::Play => write!(f, "play"),
            EmbeddedOp::Pause => write!(f, "pause"),
            EmbeddedOp::Stop => write!(f, "stop"),
            EmbeddedOp::Seek => write!(f, "seek"),
            EmbeddedOp::SelectTrack => write!(f, "select_track"),
            EmbeddedOp::Close => write!(f, "close"),
        }
    }
}

/// Tracks the error overlay on top of the native state
///
/// The native player has no error state of its own; once a fault is seen
/// only `Close` is legal until the error is cleared by a new load.
#[derive(Debug, Default)]
pub struct EmbeddedStateMachine {
    errored: AtomicBool,
}

impl EmbeddedStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, native: NativePlayerState) -> EmbeddedState {
        if self.errored.load(Ordering::SeqCst) {
            EmbeddedState::Error
        } else {
            native.into()
        }
    }

    /// Reject `op` unless the current state allows it
    pub fn check(&self, op: EmbeddedOp, native: NativePlayerState) -> Result<()> {
        let state = self.state(native);
        if op.is_allowed(state) {
            Ok(())
        } else {
            Err(Error::invalid_state(&op.to_string(), state))
        }
    }

    pub fn set_error(&self) {
        self.errored.store(true, Ordering::SeqCst);
    }

    pub fn clear_error(&self) {
        self.errored.store(false, Ordering::SeqCst);
    }

    pub fn is_errored(&self) -> bool {
        self.errored.load(Ordering::SeqCst)
    }
}
