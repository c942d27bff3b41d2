//! Segment-streaming engine
//!
//! Drives a segment-only streaming library attached to a media element. Where
//! the library is missing or unsupported, the element's own HLS decoder plays
//! the stream directly and the quality and track surfaces shrink to what the
//! element exposes.

use super::{media, EngineCore, LoadSlot, PlaybackEngine};
use crate::error::{Error, Result};
use crate::events::{EventType, Listener, ListenerId, PlayerEvent};
use crate::fault::classify_library_fault;
use crate::native::{CanPlay, Level, MediaElement, SegmentLibrary, SegmentTrack};
use crate::selector::detect_stream_type;
use crate::types::*;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// MIME type of HLS playlists, probed for native playback
pub const HLS_MIME: &str = "application/vnd.apple.mpegurl";

fn level_to_quality(index: usize, level: &Level) -> QualityLevel {
    QualityLevel {
        id: index.to_string(),
        width: level.width,
        height: level.height,
        bitrate: level.bitrate,
        codec: level.codec.clone(),
        label: level
            .name
            .clone()
            .unwrap_or_else(|| QualityLevel::height_label(level.height)),
    }
}

fn to_audio(track: &SegmentTrack) -> AudioTrack {
    AudioTrack {
        id: track.id.to_string(),
        language: track.language.clone(),
        label: track.name.clone(),
        codec: track.codec.clone(),
        channels: track.channels,
    }
}

fn to_subtitle(track: &SegmentTrack) -> SubtitleTrack {
    SubtitleTrack {
        id: track.id.to_string(),
        language: track.language.clone(),
        label: track.name.clone(),
    }
}

/// Engine for segment streams, with native decoder fallback
pub struct SegmentEngine {
    core: Arc<EngineCore>,
    element: Arc<dyn MediaElement>,
    library: Option<Arc<dyn SegmentLibrary>>,
    load_slot: Arc<LoadSlot>,
}

impl SegmentEngine {
    /// The library is only used when its capability probe passes
    pub fn new(element: Arc<dyn MediaElement>, library: Option<Arc<dyn SegmentLibrary>>) -> Self {
        let library = library.filter(|library| library.is_supported());
        Self {
            core: Arc::new(EngineCore::new(EngineKind::SegmentOnly)),
            element,
            library,
            load_slot: Arc::new(LoadSlot::new()),
        }
    }

    /// True when the element decodes the stream without a library
    pub fn uses_native_playback(&self) -> bool {
        self.library.is_none()
    }

    async fn open(&self, url: &str) -> Result<()> {
        match &self.library {
            Some(library) => {
                let max_buffer_length = self.core.config().max_buffer_length;
                library
                    .load_source(url, max_buffer_length)
                    .await
                    .map_err(|fault| classify_library_fault(&fault))
            }
            None => {
                let pending = self.load_slot.arm();
                self.element.set_source(Some(url));
                LoadSlot::wait(pending, "load").await
            }
        }
    }

    fn lock_level(&self, library: &dyn SegmentLibrary, index: usize) {
        library.set_current_level(Some(index));
        self.core.emit(PlayerEvent::QualityChange {
            quality_id: index.to_string(),
        });
    }

    /// Start quality and preferred languages; misses are logged, not fatal
    fn apply_preferences(&self) {
        let config = self.core.config();
        if let Some(quality) = config.start_quality.as_deref() {
            if let Err(error) = self.set_quality(Some(quality)) {
                warn!(quality, code = %error.code, "Start quality unavailable");
            }
        } else if !config.adaptive_bitrate {
            if let Err(error) = self.set_adaptive_bitrate(false) {
                warn!(code = %error.code, "Could not disable automatic level selection");
            }
        }

        let Some(library) = &self.library else {
            return;
        };
        if let Some(language) = config.preferred_audio_language.as_deref() {
            let tracks = library.audio_tracks();
            match media::match_language(&tracks, language, |t| t.language.as_str()) {
                Some(track) => {
                    library.set_audio_track(track.id);
                }
                None => debug!(language, "No audio track for preferred language"),
            }
        }
        if let Some(language) = config.preferred_subtitle_language.as_deref() {
            let tracks = library.subtitle_tracks();
            if let Some(track) = media::match_language(&tracks, language, |t| t.language.as_str()) {
                library.set_subtitle_track(Some(track.id));
            }
        }
    }
}

#[async_trait]
impl PlaybackEngine for SegmentEngine {
    fn id(&self) -> EngineId {
        self.core.id()
    }

    fn kind(&self) -> EngineKind {
        self.core.kind()
    }

    async fn initialize(&self, config: EngineConfig) -> Result<()> {
        self.core.begin_initialize()?;
        self.element.attach(&config.render_target);

        let slot = self.library.is_none().then(|| Arc::clone(&self.load_slot));
        self.element.set_listener(Some(media::element_handler(&self.core, slot)));
        if let Some(library) = &self.library {
            library.attach_media(Arc::clone(&self.element));
            library.set_listener(Some(media::library_handler(&self.core)));
        }

        self.core.finish_initialize(config);
        self.element.set_volume(self.core.volume());
        self.element.set_muted(self.core.muted());
        debug!(native = self.uses_native_playback(), "Segment engine initialized");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.core.is_initialized()
    }

    #[instrument(skip(self, stream), fields(url = %stream.url()))]
    async fn load(&self, stream: &StreamDescriptor) -> Result<()> {
        self.core.guard("load")?;
        info!(native = self.uses_native_playback(), "Loading segment stream");

        self.core.begin_load(stream);
        if let Err(error) = self.open(stream.url()).await {
            if !self.core.is_destroyed() {
                self.core.fail(error.clone());
            }
            return Err(error);
        }

        let load_time = self.core.finish_load();
        info!(load_time, "Segment stream ready");
        self.core.emit(PlayerEvent::DurationChange {
            duration: self.element.duration(),
        });
        self.apply_preferences();

        if self.core.config().auto_play {
            self.play().await
        } else {
            self.core.loaded_paused();
            Ok(())
        }
    }

    async fn play(&self) -> Result<()> {
        self.core.guard("play")?;
        media::play_element(&self.core, self.element.as_ref()).await
    }

    fn pause(&self) -> Result<()> {
        self.core.guard("pause")?;
        media::pause_element(&self.core, self.element.as_ref());
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.core.guard("stop")?;
        self.element.pause();
        match &self.library {
            Some(library) => library.stop_load(),
            None => {
                self.load_slot.cancel();
                self.element.set_source(None);
            }
        }
        self.core.unload();
        Ok(())
    }

    fn seek(&self, seconds: f64) -> Result<()> {
        self.core.guard("seek")?;
        self.element.set_current_time(seconds.max(0.0));
        Ok(())
    }

    fn state(&self) -> Result<PlaybackState> {
        self.core.guard("state")?;
        Ok(self.core.state())
    }

    fn current_time(&self) -> Result<f64> {
        self.core.guard("current_time")?;
        Ok(self.element.current_time())
    }

    fn duration(&self) -> Result<f64> {
        self.core.guard("duration")?;
        Ok(self.element.duration())
    }

    fn volume(&self) -> Result<f64> {
        self.core.guard("volume")?;
        Ok(self.core.volume())
    }

    fn set_volume(&self, volume: f64) -> Result<()> {
        self.core.guard("set_volume")?;
        let volume = self.core.set_volume(volume);
        self.element.set_volume(volume);
        Ok(())
    }

    fn is_muted(&self) -> Result<bool> {
        self.core.guard("is_muted")?;
        Ok(self.core.muted())
    }

    fn set_muted(&self, muted: bool) -> Result<()> {
        self.core.guard("set_muted")?;
        self.element.set_muted(muted);
        self.core.set_muted(muted);
        Ok(())
    }

    fn quality_levels(&self) -> Result<Vec<QualityLevel>> {
        self.core.guard("quality_levels")?;
        Ok(self
            .library
            .as_ref()
            .map(|library| {
                library
                    .levels()
                    .iter()
                    .enumerate()
                    .map(|(index, level)| level_to_quality(index, level))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn current_quality(&self) -> Result<Option<QualityLevel>> {
        self.core.guard("current_quality")?;
        let Some(library) = &self.library else {
            return Ok(None);
        };
        Ok(library.current_level().and_then(|index| {
            library
                .levels()
                .get(index)
                .map(|level| level_to_quality(index, level))
        }))
    }

    fn set_quality(&self, id: Option<&str>) -> Result<()> {
        self.core.guard("set_quality")?;
        let Some(id) = id else {
            if let Some(library) = &self.library {
                library.set_current_level(None);
            }
            return Ok(());
        };
        let library = self
            .library
            .as_ref()
            .ok_or_else(|| Error::quality_not_found(id))?;
        let index = id
            .parse::<usize>()
            .ok()
            .filter(|index| *index < library.levels().len())
            .ok_or_else(|| Error::quality_not_found(id))?;
        self.lock_level(library.as_ref(), index);
        Ok(())
    }

    fn set_adaptive_bitrate(&self, enabled: bool) -> Result<()> {
        self.core.guard("set_adaptive_bitrate")?;
        let Some(library) = &self.library else {
            return Ok(());
        };
        if enabled {
            library.set_current_level(None);
        } else if !library.levels().is_empty() {
            let index = library.current_level().unwrap_or(0);
            self.lock_level(library.as_ref(), index);
        }
        Ok(())
    }

    fn is_adaptive_bitrate(&self) -> Result<bool> {
        self.core.guard("is_adaptive_bitrate")?;
        Ok(self
            .library
            .as_ref()
            .map(|library| library.auto_level_enabled())
            .unwrap_or(true))
    }

    fn audio_tracks(&self) -> Result<Vec<AudioTrack>> {
        self.core.guard("audio_tracks")?;
        Ok(match &self.library {
            Some(library) => library.audio_tracks().iter().map(to_audio).collect(),
            None => media::audio_tracks(self.element.as_ref()),
        })
    }

    fn current_audio_track(&self) -> Result<Option<AudioTrack>> {
        self.core.guard("current_audio_track")?;
        Ok(match &self.library {
            Some(library) => library.audio_track().and_then(|current| {
                library
                    .audio_tracks()
                    .iter()
                    .find(|track| track.id == current)
                    .map(to_audio)
            }),
            None => media::current_audio_track(self.element.as_ref()),
        })
    }

    fn set_audio_track(&self, id: &str) -> Result<()> {
        self.core.guard("set_audio_track")?;
        let Some(library) = &self.library else {
            return media::select_audio_track(self.element.as_ref(), id);
        };
        match id.parse::<u32>() {
            Ok(track) if library.set_audio_track(track) => Ok(()),
            _ => Err(Error::track_not_found(id)),
        }
    }

    fn subtitle_tracks(&self) -> Result<Vec<SubtitleTrack>> {
        self.core.guard("subtitle_tracks")?;
        Ok(match &self.library {
            Some(library) => library.subtitle_tracks().iter().map(to_subtitle).collect(),
            None => media::subtitle_tracks(self.element.as_ref()),
        })
    }

    fn current_subtitle_track(&self) -> Result<Option<SubtitleTrack>> {
        self.core.guard("current_subtitle_track")?;
        Ok(match &self.library {
            Some(library) => library.subtitle_track().and_then(|current| {
                library
                    .subtitle_tracks()
                    .iter()
                    .find(|track| track.id == current)
                    .map(to_subtitle)
            }),
            None => media::current_subtitle_track(self.element.as_ref()),
        })
    }

    fn set_subtitle_track(&self, id: Option<&str>) -> Result<()> {
        self.core.guard("set_subtitle_track")?;
        let Some(library) = &self.library else {
            return media::select_subtitle_track(self.element.as_ref(), id);
        };
        match id {
            None => {
                library.set_subtitle_track(None);
                Ok(())
            }
            Some(id) => match id.parse::<u32>() {
                Ok(track) if library.set_subtitle_track(Some(track)) => Ok(()),
                _ => Err(Error::track_not_found(id)),
            },
        }
    }

    fn metrics(&self) -> Result<PlaybackMetrics> {
        self.core.guard("metrics")?;
        let mut metrics = media::element_metrics(self.element.as_ref(), self.core.load_time());
        if let Some(library) = &self.library {
            metrics.estimated_bandwidth = library.bandwidth_estimate();
        }
        Ok(metrics)
    }

    fn on(&self, event_type: EventType, listener: Listener) -> Result<ListenerId> {
        self.core.guard("on")?;
        Ok(self.core.on(event_type, listener))
    }

    fn off(&self, event_type: EventType, id: ListenerId) -> Result<bool> {
        self.core.guard("off")?;
        Ok(self.core.off(event_type, id))
    }

    fn can_play_stream(&self, url: &str) -> Result<bool> {
        self.core.guard("can_play_stream")?;
        if !self.core.kind().capability().accepts(detect_stream_type(url)) {
            return Ok(false);
        }
        Ok(self.library.is_some() || self.element.can_play_type(HLS_MIME) != CanPlay::No)
    }

    fn destroy(&self) {
        if !self.core.destroy() {
            return;
        }
        if let Some(library) = &self.library {
            library.set_listener(None);
            library.destroy();
        }
        self.element.set_listener(None);
        self.load_slot.cancel();
        self.element.pause();
        self.element.detach();
        info!(engine = %self.core.kind(), "Segment engine destroyed");
    }
}

impl std::fmt::Debug for SegmentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentEngine")
            .field("core", &self.core)
            .field("native", &self.uses_native_playback())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{FaultCategory, LibraryFault, LibrarySignal};
    use crate::sim::{SimMediaElement, SimSegmentLibrary};
    use parking_lot::Mutex;

    fn ladder() -> Vec<Level> {
        [(640, 360, 800_000), (1280, 720, 2_500_000), (1920, 1080, 5_000_000)]
            .into_iter()
            .map(|(width, height, bitrate)| Level {
                width,
                height,
                bitrate,
                codec: Some("avc1.64001f".to_string()),
                name: None,
            })
            .collect()
    }

    async fn ready(library: Option<Arc<SimSegmentLibrary>>) -> (SegmentEngine, Arc<SimMediaElement>) {
        let element = Arc::new(SimMediaElement::new());
        let engine = SegmentEngine::new(
            element.clone(),
            library.map(|library| library as Arc<dyn SegmentLibrary>),
        );
        engine.initialize(EngineConfig::default()).await.unwrap();
        (engine, element)
    }

    #[tokio::test]
    async fn test_abr_disabled_by_config_locks_current_level() {
        let library = Arc::new(SimSegmentLibrary::new().with_levels(ladder()));
        let engine = SegmentEngine::new(
            Arc::new(SimMediaElement::new()),
            Some(library.clone() as Arc<dyn SegmentLibrary>),
        );
        let config = EngineConfig {
            adaptive_bitrate: false,
            ..EngineConfig::default()
        };
        engine.initialize(config).await.unwrap();
        engine.load(&"http://cdn/live.m3u8".into()).await.unwrap();

        assert!(!engine.is_adaptive_bitrate().unwrap());
        assert_eq!(engine.current_quality().unwrap().unwrap().id, "0");
    }

    #[tokio::test]
    async fn test_levels_are_index_keyed() {
        let library = Arc::new(SimSegmentLibrary::new().with_levels(ladder()));
        let (engine, _) = ready(Some(library.clone())).await;
        engine.load(&"http://cdn/live.m3u8".into()).await.unwrap();

        let levels = engine.quality_levels().unwrap();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[1].id, "1");
        assert_eq!(levels[1].label, "720p");

        engine.set_quality(Some("2")).unwrap();
        assert_eq!(library.current_level(), Some(2));
        assert!(!engine.is_adaptive_bitrate().unwrap());

        engine.set_quality(None).unwrap();
        assert!(engine.is_adaptive_bitrate().unwrap());
        assert!(engine.set_quality(Some("9")).is_err());
    }

    #[tokio::test]
    async fn test_level_switch_emits_quality_change() {
        let library = Arc::new(SimSegmentLibrary::new().with_levels(ladder()));
        let (engine, _) = ready(Some(library.clone())).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine
            .on(
                EventType::QualityChange,
                Arc::new(move |event: &PlayerEvent| sink.lock().push(event.clone())),
            )
            .unwrap();

        library.emit(LibrarySignal::VariantChanged("1".to_string()));
        assert_eq!(
            seen.lock().as_slice(),
            &[PlayerEvent::QualityChange { quality_id: "1".to_string() }]
        );
    }

    #[tokio::test]
    async fn test_critical_fault_fails_engine() {
        let library = Arc::new(SimSegmentLibrary::new().with_levels(ladder()));
        let (engine, _) = ready(Some(library.clone())).await;
        engine.load(&"http://cdn/live.m3u8".into()).await.unwrap();

        library.emit(LibrarySignal::Error(LibraryFault::new(
            FaultCategory::Network,
            1001,
            "fragment load error",
            false,
        )));
        assert_eq!(engine.state().unwrap(), PlaybackState::Paused);

        library.emit(LibrarySignal::Error(LibraryFault::new(
            FaultCategory::Media,
            3016,
            "buffer append error",
            true,
        )));
        assert_eq!(engine.state().unwrap(), PlaybackState::Error);
    }

    #[tokio::test]
    async fn test_unsupported_library_falls_back_to_element() {
        let library = Arc::new(SimSegmentLibrary::new().unsupported());
        let (engine, element) = ready(Some(library)).await;
        assert!(engine.uses_native_playback());

        engine.load(&"http://cdn/live.m3u8".into()).await.unwrap();
        assert_eq!(element.source().as_deref(), Some("http://cdn/live.m3u8"));
        assert!(engine.quality_levels().unwrap().is_empty());
        assert!(engine.set_quality(Some("0")).is_err());
    }

    #[tokio::test]
    async fn test_native_playback_probe() {
        let (engine, element) = ready(None).await;
        assert!(engine.can_play_stream("http://cdn/live.m3u8").unwrap());
        assert!(!engine.can_play_stream("http://cdn/manifest.mpd").unwrap());

        element.reject_mime(HLS_MIME);
        assert!(!engine.can_play_stream("http://cdn/live.m3u8").unwrap());
    }
}
