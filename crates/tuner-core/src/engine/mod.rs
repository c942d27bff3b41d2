//! Playback engine contract
//!
//! Every concrete engine implements [`PlaybackEngine`] identically at the
//! boundary:
//! - operations other than `initialize`/`is_initialized` fail with an
//!   `INVALID_STATE` error until `initialize` succeeds, without side effects
//! - volume is clamped to [0, 1] and always reported through `volumechange`
//! - `statechange` fires synchronously with each transition
//! - `destroy` is idempotent and silences the engine for good

mod shared;
mod media;

pub mod adaptive;
pub mod embedded;
pub mod progressive;
pub mod segment;

pub use adaptive::AdaptiveEngine;
pub use embedded::{EmbeddedEngine, EmbeddedOp, EmbeddedState, EmbeddedStateMachine};
pub use progressive::ProgressiveEngine;
pub use segment::SegmentEngine;

pub(crate) use shared::{EngineCore, LoadSlot};

use crate::events::{EventType, Listener, ListenerId};
use crate::types::*;
use crate::Result;
use async_trait::async_trait;

/// Uniform contract over one native media backend
#[async_trait]
pub trait PlaybackEngine: Send + Sync + std::fmt::Debug {
    /// Instance identifier
    fn id(&self) -> EngineId;

    /// Engine variant
    fn kind(&self) -> EngineKind;

    /// Attach to the render target and apply the configuration; only once
    async fn initialize(&self, config: EngineConfig) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// Open a stream; resolves once it is ready to play
    async fn load(&self, stream: &StreamDescriptor) -> Result<()>;

    async fn play(&self) -> Result<()>;

    fn pause(&self) -> Result<()>;

    /// Stop playback and release the loaded stream
    fn stop(&self) -> Result<()>;

    /// Move the playhead, in seconds
    fn seek(&self, seconds: f64) -> Result<()>;

    fn state(&self) -> Result<PlaybackState>;

    /// Playhead position in seconds
    fn current_time(&self) -> Result<f64>;

    /// Duration in seconds; infinite for live streams
    fn duration(&self) -> Result<f64>;

    fn volume(&self) -> Result<f64>;

    /// Set volume; out-of-range values are clamped, never rejected
    fn set_volume(&self, volume: f64) -> Result<()>;

    fn is_muted(&self) -> Result<bool>;

    fn set_muted(&self, muted: bool) -> Result<()>;

    fn quality_levels(&self) -> Result<Vec<QualityLevel>>;

    fn current_quality(&self) -> Result<Option<QualityLevel>>;

    /// Lock a quality level, or return to automatic selection with `None`
    fn set_quality(&self, id: Option<&str>) -> Result<()>;

    fn set_adaptive_bitrate(&self, enabled: bool) -> Result<()>;

    fn is_adaptive_bitrate(&self) -> Result<bool>;

    fn audio_tracks(&self) -> Result<Vec<AudioTrack>>;

    fn current_audio_track(&self) -> Result<Option<AudioTrack>>;

    fn set_audio_track(&self, id: &str) -> Result<()>;

    fn subtitle_tracks(&self) -> Result<Vec<SubtitleTrack>>;

    fn current_subtitle_track(&self) -> Result<Option<SubtitleTrack>>;

    /// Show a subtitle track, or hide subtitles with `None`
    fn set_subtitle_track(&self, id: Option<&str>) -> Result<()>;

    fn metrics(&self) -> Result<PlaybackMetrics>;

    fn on(&self, event_type: EventType, listener: Listener) -> Result<ListenerId>;

    /// Returns false if the listener was not registered
    fn off(&self, event_type: EventType, id: ListenerId) -> Result<bool>;

    /// Whether this engine can handle the URL on the current runtime
    fn can_play_stream(&self, url: &str) -> Result<bool>;

    /// Release the render target, native handles, timers and listeners
    fn destroy(&self);
}

/// Seconds to native milliseconds
pub(crate) fn seconds_to_ms(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    }
}

/// Native milliseconds to seconds
pub(crate) fn ms_to_seconds(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversion() {
        assert_eq!(seconds_to_ms(1.5), 1500);
        assert_eq!(seconds_to_ms(-3.0), 0);
        assert_eq!(seconds_to_ms(f64::NAN), 0);
        assert_eq!(ms_to_seconds(2500), 2.5);
    }
}
