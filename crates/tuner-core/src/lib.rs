//! Tuner Core - Playback engine abstraction for live IPTV streams
//!
//! This crate provides the core functionality for playing a channel on
//! whatever native media stack the host runtime offers:
//! - A single engine contract over four native playback backends
//! - Engine selection from stream type and platform
//! - Fault classification into a closed error taxonomy
//! - Per-context retry with exponential backoff
//! - Playback sessions with engine fallback
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Tuner Core                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Engine    │  │    Fault     │  │   Recovery   │           │
//! │  │   Selector   │  │  Classifier  │  │ Coordinator  │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │  Playback   │                              │
//! │                    │   Session   │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌────────────┐ ┌─────────┴──┐ ┌────────────┐ ┌────────────┐    │
//! │  │  Adaptive  │ │  Segment   │ │Progressive │ │  Embedded  │    │
//! │  │   Engine   │ │   Engine   │ │   Engine   │ │   Engine   │    │
//! │  └─────┬──────┘ └─────┬──────┘ └─────┬──────┘ └─────┬──────┘    │
//! │        └──────────────┴──────┬───────┴──────────────┘           │
//! │                       ┌──────┴──────┐                           │
//! │                       │   Native    │                           │
//! │                       │   Runtime   │                           │
//! │                       └─────────────┘                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod native;
pub mod events;
pub mod fault;
pub mod time;
pub mod recovery;
pub mod engine;
pub mod selector;
pub mod config;
pub mod session;
pub mod sim;

pub use error::{Error, ErrorKind, Result};
pub use types::*;
pub use engine::{AdaptiveEngine, EmbeddedEngine, PlaybackEngine, ProgressiveEngine, SegmentEngine};
pub use events::{EventBus, EventType, Listener, ListenerId, PlayerEvent};
pub use fault::{recovery_action, RecoveryAction};
pub use recovery::{RecoveryConfig, RecoveryCoordinator, RecoveryOutcome};
pub use selector::{detect_stream_type, EngineSelector, SelectorOptions};
pub use config::TunerConfig;
pub use session::{PlaybackSession, SessionOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tuner library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "Tuner Core initialized");
}
