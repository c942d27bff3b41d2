//! Adaptive-streaming engine
//!
//! Wraps a full adaptive library (HLS and DASH, DRM capable). The library owns
//! its media element, variant selection and audio/text switching; this engine
//! maps those onto the common contract.

use super::{media, EngineCore, PlaybackEngine};
use crate::error::{Error, Result};
use crate::events::{EventType, Listener, ListenerId, PlayerEvent};
use crate::fault::classify_library_fault;
use crate::native::{AdaptiveLibrary, AdaptiveSettings, LanguageTrack, MediaElement, Variant};
use crate::selector::detect_stream_type;
use crate::types::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

fn variant_to_quality(variant: &Variant) -> QualityLevel {
    QualityLevel {
        id: variant.id.clone(),
        width: variant.width,
        height: variant.height,
        bitrate: variant.bandwidth,
        codec: variant.codecs.clone(),
        label: QualityLevel::height_label(variant.height),
    }
}

fn to_audio(track: &LanguageTrack) -> AudioTrack {
    AudioTrack {
        id: track.id.clone(),
        language: track.language.clone(),
        label: track.label.clone(),
        codec: track.codec.clone(),
        channels: track.channels,
    }
}

fn to_subtitle(track: &LanguageTrack) -> SubtitleTrack {
    SubtitleTrack {
        id: track.id.clone(),
        language: track.language.clone(),
        label: track.label.clone(),
    }
}

/// Engine for HLS/DASH through the adaptive library
pub struct AdaptiveEngine {
    core: Arc<EngineCore>,
    library: Arc<dyn AdaptiveLibrary>,
    element: Arc<dyn MediaElement>,
    abr_enabled: AtomicBool,
    text_visible: AtomicBool,
}

impl AdaptiveEngine {
    pub fn new(library: Arc<dyn AdaptiveLibrary>) -> Self {
        let element = library.media();
        Self {
            core: Arc::new(EngineCore::new(EngineKind::Adaptive)),
            library,
            element,
            abr_enabled: AtomicBool::new(true),
            text_visible: AtomicBool::new(false),
        }
    }

    fn settings(config: &EngineConfig) -> AdaptiveSettings {
        AdaptiveSettings {
            abr_enabled: config.adaptive_bitrate,
            buffering_goal: config.max_buffer_length,
            preferred_audio_language: config.preferred_audio_language.clone(),
            preferred_text_language: config.preferred_subtitle_language.clone(),
        }
    }

    fn apply_start_quality(&self) {
        let config = self.core.config();
        if let Some(quality) = config.start_quality.as_deref() {
            if let Err(error) = self.set_quality(Some(quality)) {
                warn!(quality, code = %error.code, "Start quality unavailable");
            }
        }
        if config.preferred_subtitle_language.is_some() {
            let visible = self.library.text_tracks().iter().any(|track| track.active);
            self.library.set_text_visibility(visible);
            self.text_visible.store(visible, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl PlaybackEngine for AdaptiveEngine {
    fn id(&self) -> EngineId {
        self.core.id()
    }

    fn kind(&self) -> EngineKind {
        self.core.kind()
    }

    async fn initialize(&self, config: EngineConfig) -> Result<()> {
        self.core.begin_initialize()?;
        if !self.library.is_supported() {
            self.core.abort_initialize();
            return Err(Error::unsupported_engine(
                "adaptive streaming library is not supported on this runtime",
            ));
        }

        self.element.attach(&config.render_target);
        self.element.set_listener(Some(media::element_handler(&self.core, None)));
        self.library.set_listener(Some(media::library_handler(&self.core)));
        self.library.configure(&Self::settings(&config));
        self.abr_enabled.store(config.adaptive_bitrate, Ordering::SeqCst);

        self.core.finish_initialize(config);
        self.element.set_volume(self.core.volume());
        self.element.set_muted(self.core.muted());
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.core.is_initialized()
    }

    #[instrument(skip(self, stream), fields(url = %stream.url()))]
    async fn load(&self, stream: &StreamDescriptor) -> Result<()> {
        self.core.guard("load")?;
        info!(stream_type = %stream.effective_type(), "Loading adaptive stream");

        self.core.begin_load(stream);
        if let Err(fault) = self.library.load(stream.url()).await {
            let error = classify_library_fault(&fault);
            if !self.core.is_destroyed() {
                self.core.fail(error.clone());
            }
            return Err(error);
        }
        if self.core.is_destroyed() {
            return Err(Error::invalid_state("load", "destroyed"));
        }

        let load_time = self.core.finish_load();
        info!(load_time, variants = self.library.variants().len(), "Adaptive stream ready");
        self.core.emit(PlayerEvent::DurationChange {
            duration: self.element.duration(),
        });
        self.apply_start_quality();

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
        self.library.unload();
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
        Ok(self.library.variants().iter().map(variant_to_quality).collect())
    }

    fn current_quality(&self) -> Result<Option<QualityLevel>> {
        self.core.guard("current_quality")?;
        Ok(self
            .library
            .variants()
            .iter()
            .find(|variant| variant.active)
            .map(variant_to_quality))
    }

    /// Selecting a variant disables automatic selection
    fn set_quality(&self, id: Option<&str>) -> Result<()> {
        self.core.guard("set_quality")?;
        let Some(id) = id else {
            return self.set_adaptive_bitrate(true);
        };
        if !self.library.variants().iter().any(|variant| variant.id == id) {
            return Err(Error::quality_not_found(id));
        }

        self.library.set_abr_enabled(false);
        self.abr_enabled.store(false, Ordering::SeqCst);
        if !self.library.select_variant(id) {
            return Err(Error::quality_not_found(id));
        }
        debug!(quality = id, "Variant locked");
        self.core.emit(PlayerEvent::QualityChange {
            quality_id: id.to_string(),
        });
        Ok(())
    }

    fn set_adaptive_bitrate(&self, enabled: bool) -> Result<()> {
        self.core.guard("set_adaptive_bitrate")?;
        self.library.set_abr_enabled(enabled);
        self.abr_enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn is_adaptive_bitrate(&self) -> Result<bool> {
        self.core.guard("is_adaptive_bitrate")?;
        Ok(self.abr_enabled.load(Ordering::SeqCst))
    }

    fn audio_tracks(&self) -> Result<Vec<AudioTrack>> {
        self.core.guard("audio_tracks")?;
        Ok(self.library.audio_tracks().iter().map(to_audio).collect())
    }

    fn current_audio_track(&self) -> Result<Option<AudioTrack>> {
        self.core.guard("current_audio_track")?;
        Ok(self
            .library
            .audio_tracks()
            .iter()
            .find(|track| track.active)
            .map(to_audio))
    }

    /// Audio switching is keyed by the track's language
    fn set_audio_track(&self, id: &str) -> Result<()> {
        self.core.guard("set_audio_track")?;
        let tracks = self.library.audio_tracks();
        let track = tracks
            .iter()
            .find(|track| track.id == id)
            .ok_or_else(|| Error::track_not_found(id))?;
        self.library.select_audio_language(&track.language);
        Ok(())
    }

    fn subtitle_tracks(&self) -> Result<Vec<SubtitleTrack>> {
        self.core.guard("subtitle_tracks")?;
        Ok(self.library.text_tracks().iter().map(to_subtitle).collect())
    }

    fn current_subtitle_track(&self) -> Result<Option<SubtitleTrack>> {
        self.core.guard("current_subtitle_track")?;
        if !self.text_visible.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self
            .library
            .text_tracks()
            .iter()
            .find(|track| track.active)
            .map(to_subtitle))
    }

    fn set_subtitle_track(&self, id: Option<&str>) -> Result<()> {
        self.core.guard("set_subtitle_track")?;
        match id {
            None => {
                self.library.set_text_visibility(false);
                self.text_visible.store(false, Ordering::SeqCst);
                Ok(())
            }
            Some(id) => {
                if !self.library.select_text_track(id) {
                    return Err(Error::track_not_found(id));
                }
                self.library.set_text_visibility(true);
                self.text_visible.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn metrics(&self) -> Result<PlaybackMetrics> {
        self.core.guard("metrics")?;
        let stats = self.library.stats();
        let mut metrics = media::element_metrics(self.element.as_ref(), self.core.load_time());
        metrics.estimated_bandwidth = stats.estimated_bandwidth;
        metrics.dropped_frames = stats.dropped_frames;
        metrics.total_frames = stats.decoded_frames;
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
        Ok(self.library.is_supported() && self.core.kind().capability().accepts(detect_stream_type(url)))
    }

    fn destroy(&self) {
        if !self.core.destroy() {
            return;
        }
        self.library.set_listener(None);
        self.element.set_listener(None);
        self.element.pause();
        self.library.destroy();
        self.element.detach();
        info!(engine = %self.core.kind(), "Adaptive engine destroyed");
    }
}

impl std::fmt::Debug for AdaptiveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveEngine")
            .field("core", &self.core)
            .field("abr_enabled", &self.abr_enabled.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{codes, ErrorKind};
    use crate::native::{FaultCategory, LibraryFault};
    use crate::sim::SimAdaptiveLibrary;
    use parking_lot::Mutex;

    fn variants() -> Vec<Variant> {
        vec![
            Variant {
                id: "v-360".to_string(),
                width: 640,
                height: 360,
                bandwidth: 800_000,
                codecs: None,
                active: true,
            },
            Variant {
                id: "v-1080".to_string(),
                width: 1920,
                height: 1080,
                bandwidth: 5_000_000,
                codecs: Some("avc1.640028".to_string()),
                active: false,
            },
        ]
    }

    fn audio() -> Vec<LanguageTrack> {
        ["en", "de"]
            .into_iter()
            .enumerate()
            .map(|(index, language)| LanguageTrack {
                id: format!("a{}", index),
                language: language.to_string(),
                label: language.to_uppercase(),
                codec: Some("mp4a.40.2".to_string()),
                channels: Some(2),
                active: index == 0,
            })
            .collect()
    }

    async fn ready(library: &Arc<SimAdaptiveLibrary>) -> AdaptiveEngine {
        let engine = AdaptiveEngine::new(library.clone());
        engine.initialize(EngineConfig::default()).await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_initialize_rejects_unsupported_library() {
        let library = Arc::new(SimAdaptiveLibrary::new().unsupported());
        let engine = AdaptiveEngine::new(library);

        let err = engine.initialize(EngineConfig::default()).await.unwrap_err();
        assert_eq!(err.code, codes::UNSUPPORTED_ENGINE);
        assert!(!engine.is_initialized());
    }

    #[tokio::test]
    async fn test_configure_receives_preferences() {
        let library = Arc::new(SimAdaptiveLibrary::new());
        let engine = AdaptiveEngine::new(library.clone());
        let config = EngineConfig {
            preferred_audio_language: Some("de".to_string()),
            max_buffer_length: 12.0,
            ..EngineConfig::default()
        };
        engine.initialize(config).await.unwrap();

        let settings = library.settings().unwrap();
        assert_eq!(settings.preferred_audio_language.as_deref(), Some("de"));
        assert_eq!(settings.buffering_goal, 12.0);
    }

    #[tokio::test]
    async fn test_manual_quality_disables_abr() {
        let library = Arc::new(SimAdaptiveLibrary::new().with_variants(variants()));
        let engine = ready(&library).await;
        engine.load(&"http://cdn/master.mpd".into()).await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine
            .on(
                EventType::QualityChange,
                Arc::new(move |event: &PlayerEvent| sink.lock().push(event.clone())),
            )
            .unwrap();

        engine.set_quality(Some("v-1080")).unwrap();
        assert!(!engine.is_adaptive_bitrate().unwrap());
        assert!(!library.abr_enabled());
        assert_eq!(engine.current_quality().unwrap().unwrap().label, "1080p");
        assert_eq!(seen.lock().len(), 1);

        engine.set_quality(None).unwrap();
        assert!(engine.is_adaptive_bitrate().unwrap());
        assert_eq!(
            engine.set_quality(Some("v-4k")).unwrap_err().code,
            codes::QUALITY_NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_audio_switch_by_language() {
        let library = Arc::new(SimAdaptiveLibrary::new().with_audio(audio()));
        let engine = ready(&library).await;
        engine.load(&"http://cdn/master.m3u8".into()).await.unwrap();

        engine.set_audio_track("a1").unwrap();
        assert_eq!(engine.current_audio_track().unwrap().unwrap().language, "de");
        assert!(engine.set_audio_track("a7").is_err());
    }

    #[tokio::test]
    async fn test_drm_fault_is_fatal() {
        let library = Arc::new(SimAdaptiveLibrary::new());
        library.fail_next_load(LibraryFault::new(FaultCategory::Drm, 6007, "license request failed", false));
        let engine = ready(&library).await;

        let err = engine.load(&"http://cdn/protected.mpd".into()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Drm);
        assert!(err.fatal);
        assert_eq!(engine.state().unwrap(), PlaybackState::Error);
    }
}
