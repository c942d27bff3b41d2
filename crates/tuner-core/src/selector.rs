//! Engine selection
//!
//! Chooses and constructs the concrete engine for a stream on the current
//! platform. Native capability is probed when an engine is built, never when
//! the selector itself is created.

use crate::engine::{AdaptiveEngine, EmbeddedEngine, PlaybackEngine, ProgressiveEngine, SegmentEngine};
use crate::error::{Error, Result};
use crate::native::NativeRuntime;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Detect the stream protocol from a URL
///
/// Case-insensitive. Playlists win over manifests, and anything unrecognized
/// is treated as HLS since live channels rarely carry an extension.
pub fn detect_stream_type(url: &str) -> StreamType {
    let url = url.to_ascii_lowercase();
    if url.contains(".m3u8") || url.contains(".m3u") {
        StreamType::Hls
    } else if url.contains(".mpd") {
        StreamType::Dash
    } else if [".mp4", ".webm", ".ogg"].iter().any(|ext| url.ends_with(ext)) {
        StreamType::Progressive
    } else {
        StreamType::Hls
    }
}

/// Options for engine creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorOptions {
    pub platform: Platform,
    /// Explicit engine request; validated against the stream and platform
    pub preferred_engine: Option<EngineKind>,
}

impl Default for SelectorOptions {
    fn default() -> Self {
        Self {
            platform: Platform::General,
            preferred_engine: None,
        }
    }
}

impl SelectorOptions {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            preferred_engine: None,
        }
    }

    pub fn with_preferred_engine(mut self, kind: EngineKind) -> Self {
        self.preferred_engine = Some(kind);
        self
    }
}

/// Builds engines from the native handles of one runtime
pub struct EngineSelector {
    runtime: Arc<dyn NativeRuntime>,
}

impl EngineSelector {
    pub fn new(runtime: Arc<dyn NativeRuntime>) -> Self {
        Self { runtime }
    }

    fn adaptive_supported(&self) -> bool {
        self.runtime
            .adaptive_library()
            .map(|library| library.is_supported())
            .unwrap_or(false)
    }

    /// Engine kind for a stream type under the given options
    pub fn resolve_kind(&self, stream_type: StreamType, options: &SelectorOptions) -> Result<EngineKind> {
        if options.platform == Platform::Embedded {
            return Ok(EngineKind::Embedded);
        }

        match (stream_type, options.preferred_engine) {
            (StreamType::Hls | StreamType::Dash, Some(EngineKind::SegmentOnly)) => Ok(EngineKind::SegmentOnly),
            (StreamType::Hls | StreamType::Dash, None | Some(EngineKind::Adaptive)) => {
                if self.adaptive_supported() {
                    Ok(EngineKind::Adaptive)
                } else {
                    debug!(stream_type = %stream_type, "Adaptive library unavailable, using segment engine");
                    Ok(EngineKind::SegmentOnly)
                }
            }
            (StreamType::Progressive, None | Some(EngineKind::Progressive)) => Ok(EngineKind::Progressive),
            (stream_type, preferred) => Err(Error::unsupported_engine(format!(
                "no engine for {} stream on {} platform (preferred: {})",
                stream_type,
                options.platform,
                preferred.map(|kind| kind.to_string()).unwrap_or_else(|| "none".to_string()),
            ))),
        }
    }

    /// Construct an uninitialized engine for a stream
    pub fn create_engine(
        &self,
        stream: &StreamDescriptor,
        options: &SelectorOptions,
    ) -> Result<Box<dyn PlaybackEngine>> {
        let stream_type = stream.effective_type();
        let kind = self.resolve_kind(stream_type, options)?;
        info!(
            url = %stream.url(),
            stream_type = %stream_type,
            platform = %options.platform,
            engine = %kind,
            "Engine selected"
        );
        self.create_engine_of_kind(kind)
    }

    /// Construct a specific engine kind after probing its native backend
    pub fn create_engine_of_kind(&self, kind: EngineKind) -> Result<Box<dyn PlaybackEngine>> {
        match kind {
            EngineKind::Adaptive => {
                let library = self
                    .runtime
                    .adaptive_library()
                    .filter(|library| library.is_supported())
                    .ok_or_else(|| Error::unsupported_engine("adaptive streaming library is not available"))?;
                Ok(Box::new(AdaptiveEngine::new(library)))
            }
            EngineKind::SegmentOnly => Ok(Box::new(SegmentEngine::new(
                self.runtime.create_media_element(),
                self.runtime.segment_library(),
            ))),
            EngineKind::Progressive => Ok(Box::new(ProgressiveEngine::new(
                self.runtime.create_media_element(),
            ))),
            EngineKind::Embedded => {
                let player = self
                    .runtime
                    .constrained_player()
                    .ok_or_else(|| Error::unsupported_engine("embedded native player is not available"))?;
                Ok(Box::new(EmbeddedEngine::new(player)))
            }
        }
    }

    /// Next engine to try when `kind` cannot handle a format
    pub fn fallback_for(kind: EngineKind) -> Option<EngineKind> {
        match kind {
            EngineKind::Adaptive => Some(EngineKind::SegmentOnly),
            EngineKind::SegmentOnly => Some(EngineKind::Progressive),
            EngineKind::Progressive | EngineKind::Embedded => None,
        }
    }

    /// Next engine down the fallback chain that accepts `stream_type`
    pub fn fallback_for_stream(kind: EngineKind, stream_type: StreamType) -> Option<EngineKind> {
        let mut next = Self::fallback_for(kind);
        while let Some(candidate) = next {
            if candidate.capability().accepts(stream_type) {
                return Some(candidate);
            }
            debug!(engine = %candidate, %stream_type, "Fallback engine cannot play stream type");
            next = Self::fallback_for(candidate);
        }
        None
    }

    /// Whether the platform can play the URL at all
    pub fn can_play_stream(url: &str, platform: Platform) -> bool {
        match platform {
            Platform::Embedded => EngineKind::Embedded
                .capability()
                .accepts(detect_stream_type(url)),
            Platform::General => true,
        }
    }

    /// Advisory engine choice, without probing
    pub fn recommended_engine(url: &str, platform: Platform) -> EngineKind {
        if platform == Platform::Embedded {
            return EngineKind::Embedded;
        }
        match detect_stream_type(url) {
            StreamType::Dash | StreamType::Hls => EngineKind::Adaptive,
            StreamType::Progressive | StreamType::Unknown => EngineKind::Progressive,
        }
    }
}

impl std::fmt::Debug for EngineSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSelector").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{codes, ErrorKind};
    use crate::sim::{SimAdaptiveLibrary, SimRuntime};

    #[test]
    fn test_detect_stream_type() {
        assert_eq!(detect_stream_type("http://a/b/index.M3U8?token=1"), StreamType::Hls);
        assert_eq!(detect_stream_type("http://a/list.m3u"), StreamType::Hls);
        assert_eq!(detect_stream_type("http://a/manifest.mpd"), StreamType::Dash);
        assert_eq!(detect_stream_type("http://a/movie.mp4"), StreamType::Progressive);
        assert_eq!(detect_stream_type("http://a/clip.WEBM"), StreamType::Progressive);
        assert_eq!(detect_stream_type("http://a/live/channel/42"), StreamType::Hls);
    }

    #[test]
    fn test_general_prefers_adaptive_when_supported() {
        let selector = EngineSelector::new(Arc::new(SimRuntime::general()));
        let options = SelectorOptions::default();

        let engine = selector.create_engine(&"http://a/live.m3u8".into(), &options).unwrap();
        assert_eq!(engine.kind(), EngineKind::Adaptive);

        let engine = selector.create_engine(&"http://a/movie.mp4".into(), &options).unwrap();
        assert_eq!(engine.kind(), EngineKind::Progressive);
    }

    #[test]
    fn test_unsupported_adaptive_falls_to_segment() {
        let runtime = SimRuntime::general().with_adaptive(Some(Arc::new(SimAdaptiveLibrary::new().unsupported())));
        let selector = EngineSelector::new(Arc::new(runtime));

        let engine = selector
            .create_engine(&"http://a/manifest.mpd".into(), &SelectorOptions::default())
            .unwrap();
        assert_eq!(engine.kind(), EngineKind::SegmentOnly);
    }

    #[test]
    fn test_explicit_segment_preference() {
        let selector = EngineSelector::new(Arc::new(SimRuntime::general()));
        let options = SelectorOptions::default().with_preferred_engine(EngineKind::SegmentOnly);

        let engine = selector.create_engine(&"http://a/live.m3u8".into(), &options).unwrap();
        assert_eq!(engine.kind(), EngineKind::SegmentOnly);
    }

    #[test]
    fn test_invalid_combinations_are_fatal() {
        let selector = EngineSelector::new(Arc::new(SimRuntime::general()));

        for (url, preferred) in [
            ("http://a/live.m3u8", EngineKind::Progressive),
            ("http://a/live.m3u8", EngineKind::Embedded),
            ("http://a/movie.mp4", EngineKind::Adaptive),
        ] {
            let options = SelectorOptions::default().with_preferred_engine(preferred);
            let err = selector.create_engine(&url.into(), &options).unwrap_err();
            assert_eq!(err.kind, ErrorKind::UnsupportedFormat);
            assert!(err.fatal);
        }
    }

    #[test]
    fn test_embedded_platform() {
        let selector = EngineSelector::new(Arc::new(SimRuntime::embedded()));
        let options = SelectorOptions::new(Platform::Embedded);

        let engine = selector.create_engine(&"http://a/manifest.mpd".into(), &options).unwrap();
        assert_eq!(engine.kind(), EngineKind::Embedded);

        let selector = EngineSelector::new(Arc::new(SimRuntime::general()));
        let err = selector.create_engine(&"http://a/live.m3u8".into(), &options).unwrap_err();
        assert_eq!(err.code, codes::UNSUPPORTED_ENGINE);
        assert!(err.fatal);
    }

    #[test]
    fn test_can_play_and_recommendation() {
        assert!(EngineSelector::can_play_stream("http://a/live.m3u8", Platform::Embedded));
        assert!(EngineSelector::can_play_stream("http://a/movie.mp4", Platform::Embedded));
        assert!(!EngineSelector::can_play_stream("http://a/manifest.mpd", Platform::Embedded));
        assert!(EngineSelector::can_play_stream("http://a/manifest.mpd", Platform::General));

        assert_eq!(
            EngineSelector::recommended_engine("http://a/manifest.mpd", Platform::General),
            EngineKind::Adaptive
        );
        assert_eq!(
            EngineSelector::recommended_engine("http://a/movie.mp4", Platform::General),
            EngineKind::Progressive
        );
        assert_eq!(
            EngineSelector::recommended_engine("http://a/movie.mp4", Platform::Embedded),
            EngineKind::Embedded
        );
    }

    #[test]
    fn test_fallback_chain() {
        assert_eq!(EngineSelector::fallback_for(EngineKind::Adaptive), Some(EngineKind::SegmentOnly));
        assert_eq!(EngineSelector::fallback_for(EngineKind::SegmentOnly), Some(EngineKind::Progressive));
        assert_eq!(EngineSelector::fallback_for(EngineKind::Progressive), None);
        assert_eq!(EngineSelector::fallback_for(EngineKind::Embedded), None);
    }

    #[test]
    fn test_fallback_skips_engines_that_reject_the_stream() {
        assert_eq!(
            EngineSelector::fallback_for_stream(EngineKind::Adaptive, StreamType::Hls),
            Some(EngineKind::SegmentOnly)
        );
        assert_eq!(EngineSelector::fallback_for_stream(EngineKind::Adaptive, StreamType::Dash), None);
        assert_eq!(EngineSelector::fallback_for_stream(EngineKind::SegmentOnly, StreamType::Hls), None);
        assert_eq!(
            EngineSelector::fallback_for_stream(EngineKind::Adaptive, StreamType::Progressive),
            Some(EngineKind::Progressive)
        );
    }
}
