//! Core types for Tuner

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineId(pub Uuid);

impl EngineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EngineId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EngineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playback state exposed by every engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Nothing loaded, or playback stopped
    Idle,
    /// Stream is being opened
    Loading,
    /// Content is playing
    Playing,
    /// Loaded but not playing
    Paused,
    /// Playback stalled waiting for data
    Buffering,
    /// A fault ended playback
    Error,
    /// End of stream reached
    Ended,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Loading => write!(f, "loading"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Error => write!(f, "error"),
            PlaybackState::Ended => write!(f, "ended"),
        }
    }
}

/// Protocol hint for a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    /// Segment-based adaptive streaming (HLS playlists)
    Hls,
    /// DASH-like manifest
    Dash,
    /// Single progressive file
    Progressive,
    /// No hint available
    Unknown,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamType::Hls => write!(f, "hls"),
            StreamType::Dash => write!(f, "dash"),
            StreamType::Progressive => write!(f, "progressive"),
            StreamType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Stream handed over by the playlist/EPG layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamDescriptor {
    url: String,
    hint: StreamType,
}

impl StreamDescriptor {
    /// Descriptor without a protocol hint
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_hint(url, StreamType::Unknown)
    }

    pub fn with_hint(url: impl Into<String>, hint: StreamType) -> Self {
        Self {
            url: url.into(),
            hint,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn hint(&self) -> StreamType {
        self.hint
    }

    /// The hint, or the type detected from the URL when no hint was given
    pub fn effective_type(&self) -> StreamType {
        match self.hint {
            StreamType::Unknown => crate::selector::detect_stream_type(&self.url),
            hint => hint,
        }
    }
}

impl From<&str> for StreamDescriptor {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

/// Selectable video quality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityLevel {
    pub id: String,
    pub width: u32,
    pub height: u32,
    /// Bits per second
    pub bitrate: u64,
    pub codec: Option<String>,
    pub label: String,
}

impl QualityLevel {
    /// Label derived from the frame height, e.g. "720p"
    pub fn height_label(height: u32) -> String {
        if height == 0 {
            "auto".to_string()
        } else {
            format!("{}p", height)
        }
    }
}

/// Audio track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub id: String,
    /// BCP-47 language code
    pub language: String,
    pub label: String,
    pub codec: Option<String>,
    pub channels: Option<u16>,
}

/// Subtitle track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub id: String,
    /// BCP-47 language code
    pub language: String,
    pub label: String,
}

/// Playback metrics snapshot, recomputed on every call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackMetrics {
    /// Playhead position in seconds
    pub current_time: f64,
    /// Content duration in seconds (infinite for live)
    pub duration: f64,
    /// Seconds buffered ahead of the playhead
    pub buffered_time: f64,
    pub dropped_frames: u64,
    pub total_frames: u64,
    /// Bits per second
    pub estimated_bandwidth: f64,
    /// Seconds spent in the last `load`
    pub load_time: f64,
}

/// Runtime environment family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Platforms with rich adaptive-streaming libraries
    General,
    /// Memory-constrained platform with a strict native player
    Embedded,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::General => write!(f, "general"),
            Platform::Embedded => write!(f, "embedded"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "general" | "desktop" | "web" => Ok(Platform::General),
            "embedded" | "tv" => Ok(Platform::Embedded),
            other => Err(crate::Error::invalid_config(format!("unknown platform: {}", other))),
        }
    }
}

/// Concrete engine variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Full adaptive-streaming library
    Adaptive,
    /// Segment-streaming-only library with native decoder fallback
    SegmentOnly,
    /// Progressive file playback on the media element
    Progressive,
    /// Embedded platform native player
    Embedded,
}

impl EngineKind {
    /// Static capability description for this engine kind
    pub fn capability(&self) -> EngineCapability {
        match self {
            EngineKind::Adaptive => EngineCapability {
                platform: Platform::General,
                stream_types: &[StreamType::Hls, StreamType::Dash],
                drm: true,
                adaptive_bitrate: true,
            },
            EngineKind::SegmentOnly => EngineCapability {
                platform: Platform::General,
                stream_types: &[StreamType::Hls],
                drm: false,
                adaptive_bitrate: true,
            },
            EngineKind::Progressive => EngineCapability {
                platform: Platform::General,
                stream_types: &[StreamType::Progressive],
                drm: false,
                adaptive_bitrate: false,
            },
            EngineKind::Embedded => EngineCapability {
                platform: Platform::Embedded,
                stream_types: &[StreamType::Hls, StreamType::Progressive],
                drm: false,
                adaptive_bitrate: true,
            },
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Adaptive => write!(f, "adaptive"),
            EngineKind::SegmentOnly => write!(f, "segment_only"),
            EngineKind::Progressive => write!(f, "progressive"),
            EngineKind::Embedded => write!(f, "embedded"),
        }
    }
}

impl std::str::FromStr for EngineKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "adaptive" => Ok(EngineKind::Adaptive),
            "segment_only" | "segment" => Ok(EngineKind::SegmentOnly),
            "progressive" => Ok(EngineKind::Progressive),
            "embedded" => Ok(EngineKind::Embedded),
            other => Err(crate::Error::invalid_config(format!("unknown engine: {}", other))),
        }
    }
}

/// What a concrete engine can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineCapability {
    pub platform: Platform,
    pub stream_types: &'static [StreamType],
    pub drm: bool,
    pub adaptive_bitrate: bool,
}

impl EngineCapability {
    pub fn accepts(&self, stream_type: StreamType) -> bool {
        self.stream_types.contains(&stream_type)
    }
}

/// Screen rectangle in platform pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl DisplayRect {
    pub const FULL_HD: DisplayRect = DisplayRect { x: 0, y: 0, width: 1920, height: 1080 };
}

/// Opaque handle to the surface an engine draws into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderTarget {
    /// Host identifier of the surface (element id, window handle...)
    pub id: String,
    /// Placement, for backends that render into a fixed screen area
    #[serde(default)]
    pub rect: Option<DisplayRect>,
}

impl RenderTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), rect: None }
    }

    pub fn with_rect(mut self, rect: DisplayRect) -> Self {
        self.rect = Some(rect);
        self
    }
}

impl Default for RenderTarget {
    fn default() -> Self {
        Self::new("video")
    }
}

/// Engine initialization configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Surface the engine attaches to
    pub render_target: RenderTarget,
    /// Start playback as soon as a load completes
    pub auto_play: bool,
    /// Initial mute state
    pub muted: bool,
    /// Initial volume (0-1)
    pub volume: f64,
    /// BCP-47 language to select after load
    pub preferred_audio_language: Option<String>,
    /// BCP-47 language to select after load
    pub preferred_subtitle_language: Option<String>,
    /// Start with automatic bitrate selection
    pub adaptive_bitrate: bool,
    /// Quality id to lock after load
    pub start_quality: Option<String>,
    /// Forward buffer target in seconds
    pub max_buffer_length: f64,
    /// Engine family tag
    pub platform: Platform,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            render_target: RenderTarget::default(),
            auto_play: false,
            muted: false,
            volume: 1.0,
            preferred_audio_language: None,
            preferred_subtitle_language: None,
            adaptive_bitrate: true,
            start_quality: None,
            max_buffer_length: 30.0,
            platform: Platform::General,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_hint_wins() {
        let stream = StreamDescriptor::with_hint("http://x/live", StreamType::Progressive);
        assert_eq!(stream.effective_type(), StreamType::Progressive);

        let stream = StreamDescriptor::new("http://x/manifest.mpd");
        assert_eq!(stream.effective_type(), StreamType::Dash);
    }

    #[test]
    fn test_capabilities() {
        assert!(EngineKind::Adaptive.capability().drm);
        assert!(EngineKind::Embedded.capability().accepts(StreamType::Progressive));
        assert!(!EngineKind::Embedded.capability().accepts(StreamType::Dash));
        assert!(!EngineKind::Progressive.capability().adaptive_bitrate);
    }

    #[test]
    fn test_engine_kind_parse() {
        assert_eq!("segment-only".parse::<EngineKind>().unwrap(), EngineKind::SegmentOnly);
        assert!("flash".parse::<EngineKind>().is_err());
        assert_eq!("TV".parse::<Platform>().unwrap(), Platform::Embedded);
    }

    #[test]
    fn test_engine_config_partial_json() {
        let config: EngineConfig = serde_json::from_str(r#"{"auto_play": true, "volume": 0.5}"#).unwrap();
        assert!(config.auto_play);
        assert_eq!(config.volume, 0.5);
        assert_eq!(config.max_buffer_length, 30.0);
        assert_eq!(config.render_target.id, "video");
    }
}
