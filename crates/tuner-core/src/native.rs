//! Native backend seams
//!
//! Each trait mirrors one family of native media API that a host integration
//! provides. Engines only ever talk to these traits, and translate the native
//! callback shapes below into the common [`PlayerEvent`](crate::events::PlayerEvent)
//! catalog.
//!
//! Native callbacks are delivered through a [`SignalHandler`] installed with
//! `set_listener`. Passing `None` detaches it.

use crate::types::{DisplayRect, RenderTarget};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Callback installed on a native backend
pub type SignalHandler<S> = Arc<dyn Fn(S) + Send + Sync>;

// =============================================================================
// Media element
// =============================================================================

/// Media element error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NativeFaultCode {
    /// Fetching was aborted by the user agent
    Aborted,
    /// Network error while fetching
    Network,
    /// Decoding failed
    Decode,
    /// Source or format not supported
    SourceNotSupported,
    /// Anything outside the known code range
    Unrecognized(u16),
}

impl NativeFaultCode {
    /// Map a numeric media element error code
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => NativeFaultCode::Aborted,
            2 => NativeFaultCode::Network,
            3 => NativeFaultCode::Decode,
            4 => NativeFaultCode::SourceNotSupported,
            other => NativeFaultCode::Unrecognized(other),
        }
    }

    pub fn as_code(&self) -> u16 {
        match self {
            NativeFaultCode::Aborted => 1,
            NativeFaultCode::Network => 2,
            NativeFaultCode::Decode => 3,
            NativeFaultCode::SourceNotSupported => 4,
            NativeFaultCode::Unrecognized(code) => *code,
        }
    }
}

/// Fault reported by a media element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFault {
    pub code: NativeFaultCode,
    pub message: String,
}

impl MediaFault {
    pub fn new(code: NativeFaultCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Answer of a media element's type probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanPlay {
    Probably,
    Maybe,
    No,
}

/// Buffered time range in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn contains(&self, position: f64) -> bool {
        self.start <= position && position <= self.end
    }
}

/// Decoder frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub dropped: u64,
    pub total: u64,
}

/// Track from the media element's experimental track lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementTrack {
    pub id: String,
    pub language: String,
    pub label: String,
    pub enabled: bool,
}

/// Media element callbacks
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSignal {
    LoadedMetadata,
    DurationChange(f64),
    TimeUpdate(f64),
    Playing,
    Pause,
    Waiting,
    Ended,
    Error(MediaFault),
}

/// Video element with a native decoder
#[async_trait]
pub trait MediaElement: Send + Sync {
    /// Probe whether the native decoder handles a MIME type
    fn can_play_type(&self, mime: &str) -> CanPlay;

    fn set_listener(&self, handler: Option<SignalHandler<MediaSignal>>);

    fn attach(&self, target: &RenderTarget);

    fn detach(&self);

    /// Start loading a source; completion arrives as `LoadedMetadata` or `Error`
    fn set_source(&self, url: Option<&str>);

    async fn play(&self) -> Result<(), MediaFault>;

    fn pause(&self);

    fn current_time(&self) -> f64;

    fn set_current_time(&self, seconds: f64);

    fn duration(&self) -> f64;

    fn set_volume(&self, volume: f64);

    fn set_muted(&self, muted: bool);

    fn buffered(&self) -> Vec<TimeRange>;

    /// Frame counters, when the runtime exposes playback quality
    fn frame_stats(&self) -> Option<FrameStats>;

    /// Experimental audio track list; `None` when the runtime lacks it
    fn audio_tracks(&self) -> Option<Vec<ElementTrack>>;

    fn enable_audio_track(&self, id: &str) -> bool;

    /// Text track list; `None` when the runtime lacks it
    fn text_tracks(&self) -> Option<Vec<ElementTrack>>;

    /// Show one text track, or hide all with `None`
    fn show_text_track(&self, id: Option<&str>) -> bool;
}

// =============================================================================
// Streaming libraries
// =============================================================================

/// Fault category reported by streaming libraries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCategory {
    Network,
    Media,
    Mux,
    Drm,
    Manifest,
    Timeout,
    Other,
}

/// Fault reported by a streaming library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryFault {
    pub category: FaultCategory,
    pub code: i32,
    pub message: String,
    /// Library gave up on the stream
    pub critical: bool,
}

impl LibraryFault {
    pub fn new(category: FaultCategory, code: i32, message: impl Into<String>, critical: bool) -> Self {
        Self {
            category,
            code,
            message: message.into(),
            critical,
        }
    }
}

/// Streaming library callbacks
#[derive(Debug, Clone, PartialEq)]
pub enum LibrarySignal {
    Buffering(bool),
    /// Active variant changed; carries the variant id or level index
    VariantChanged(String),
    Error(LibraryFault),
}

/// Variant of an adaptive presentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub bandwidth: u64,
    pub codecs: Option<String>,
    pub active: bool,
}

/// Language-keyed track of an adaptive presentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageTrack {
    pub id: String,
    pub language: String,
    pub label: String,
    pub codec: Option<String>,
    pub channels: Option<u16>,
    pub active: bool,
}

/// Statistics object of the adaptive library
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AdaptiveStats {
    pub estimated_bandwidth: f64,
    pub dropped_frames: u64,
    pub decoded_frames: u64,
}

/// Settings pushed to the adaptive library
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveSettings {
    pub abr_enabled: bool,
    pub buffering_goal: f64,
    pub preferred_audio_language: Option<String>,
    pub preferred_text_language: Option<String>,
}

/// Full-featured adaptive streaming library (HLS and DASH)
#[async_trait]
pub trait AdaptiveLibrary: Send + Sync {
    /// Capability probe for the current runtime
    fn is_supported(&self) -> bool;

    /// Element the library renders into
    fn media(&self) -> Arc<dyn MediaElement>;

    fn configure(&self, settings: &AdaptiveSettings);

    fn set_listener(&self, handler: Option<SignalHandler<LibrarySignal>>);

    async fn load(&self, url: &str) -> Result<(), LibraryFault>;

    fn unload(&self);

    fn variants(&self) -> Vec<Variant>;

    fn select_variant(&self, id: &str) -> bool;

    fn set_abr_enabled(&self, enabled: bool);

    fn audio_tracks(&self) -> Vec<LanguageTrack>;

    fn select_audio_language(&self, language: &str);

    fn text_tracks(&self) -> Vec<LanguageTrack>;

    fn select_text_track(&self, id: &str) -> bool;

    fn set_text_visibility(&self, visible: bool);

    fn stats(&self) -> AdaptiveStats;

    fn destroy(&self);
}

/// Bitrate level of a segment stream, addressed by index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub width: u32,
    pub height: u32,
    pub bitrate: u64,
    pub codec: Option<String>,
    pub name: Option<String>,
}

/// Audio or subtitle track of a segment stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTrack {
    pub id: u32,
    pub language: String,
    pub name: String,
    pub codec: Option<String>,
    pub channels: Option<u16>,
}

/// Segment-streaming-only library (HLS over media source extensions)
#[async_trait]
pub trait SegmentLibrary: Send + Sync {
    /// Capability probe for the current runtime
    fn is_supported(&self) -> bool;

    fn attach_media(&self, media: Arc<dyn MediaElement>);

    fn detach_media(&self);

    /// Level switches are reported as `VariantChanged(index)`
    fn set_listener(&self, handler: Option<SignalHandler<LibrarySignal>>);

    /// Resolves once the manifest is parsed
    async fn load_source(&self, url: &str, max_buffer_length: f64) -> Result<(), LibraryFault>;

    fn stop_load(&self);

    fn levels(&self) -> Vec<Level>;

    fn current_level(&self) -> Option<usize>;

    /// Lock a level, or return to automatic selection with `None`
    fn set_current_level(&self, level: Option<usize>);

    fn auto_level_enabled(&self) -> bool;

    fn audio_tracks(&self) -> Vec<SegmentTrack>;

    fn audio_track(&self) -> Option<u32>;

    fn set_audio_track(&self, id: u32) -> bool;

    fn subtitle_tracks(&self) -> Vec<SegmentTrack>;

    fn subtitle_track(&self) -> Option<u32>;

    fn set_subtitle_track(&self, id: Option<u32>) -> bool;

    fn bandwidth_estimate(&self) -> f64;

    fn destroy(&self);
}

// =============================================================================
// Embedded native player
// =============================================================================

/// States of the embedded platform's native player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NativePlayerState {
    None,
    Idle,
    Ready,
    Playing,
    Paused,
}

impl std::fmt::Display for NativePlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativePlayerState::None => write!(f, "NONE"),
            NativePlayerState::Idle => write!(f, "IDLE"),
            NativePlayerState::Ready => write!(f, "READY"),
            NativePlayerState::Playing => write!(f, "PLAYING"),
            NativePlayerState::Paused => write!(f, "PAUSED"),
        }
    }
}

/// Fault raised by the embedded player; only the message text is meaningful
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerFault {
    pub message: String,
}

impl PlayerFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Embedded player callbacks; there is no playhead push
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerSignal {
    BufferingStart,
    BufferingProgress(u8),
    BufferingComplete,
    StreamCompleted,
    Error(PlayerFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeTrackKind {
    Video,
    Audio,
    Text,
}

/// Track info as reported by the embedded player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeTrack {
    pub index: u32,
    pub kind: NativeTrackKind,
    pub language: String,
    pub codec: Option<String>,
    pub channels: Option<u16>,
    pub width: u32,
    pub height: u32,
    pub bitrate: u64,
}

/// Completion callback of `prepare_async`
pub type PrepareCallback = Box<dyn FnOnce(Result<(), PlayerFault>) + Send>;

/// Embedded platform native player
///
/// Every call is only legal in specific native states; times are milliseconds.
pub trait ConstrainedPlayer: Send + Sync {
    fn state(&self) -> NativePlayerState;

    fn set_listener(&self, handler: Option<SignalHandler<PlayerSignal>>);

    fn open(&self, url: &str) -> Result<(), PlayerFault>;

    fn set_display_rect(&self, rect: DisplayRect) -> Result<(), PlayerFault>;

    fn set_buffering_time_ms(&self, ms: u64) -> Result<(), PlayerFault>;

    fn prepare_async(&self, on_complete: PrepareCallback);

    fn play(&self) -> Result<(), PlayerFault>;

    fn pause(&self) -> Result<(), PlayerFault>;

    fn stop(&self) -> Result<(), PlayerFault>;

    fn close(&self);

    fn seek_to(&self, position_ms: u64) -> Result<(), PlayerFault>;

    fn current_time_ms(&self) -> u64;

    fn duration_ms(&self) -> u64;

    fn tracks(&self) -> Vec<NativeTrack>;

    fn current_track(&self, kind: NativeTrackKind) -> Option<u32>;

    fn select_track(&self, kind: NativeTrackKind, index: u32) -> Result<(), PlayerFault>;

    fn set_subtitles_hidden(&self, hidden: bool);
}

// =============================================================================
// Runtime
// =============================================================================

/// Source of native handles for the current runtime
///
/// Optional libraries return `None` when they are not present at all; a present
/// library still has to pass its own `is_supported` probe.
pub trait NativeRuntime: Send + Sync {
    fn create_media_element(&self) -> Arc<dyn MediaElement>;

    fn adaptive_library(&self) -> Option<Arc<dyn AdaptiveLibrary>>;

    fn segment_library(&self) -> Option<Arc<dyn SegmentLibrary>>;

    fn constrained_player(&self) -> Option<Arc<dyn ConstrainedPlayer>>;
}
