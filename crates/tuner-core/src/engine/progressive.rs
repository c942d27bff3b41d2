//! Progressive file engine
//!
//! Plays single-file sources (MP4, WebM, Ogg) straight on a media element.
//! There is no bitrate ladder, so the quality surface is empty.

use super::{media, EngineCore, LoadSlot, PlaybackEngine};
use crate::error::{Error, Result};
use crate::events::{EventType, Listener, ListenerId, PlayerEvent};
use crate::native::{CanPlay, MediaElement};
use crate::selector::detect_stream_type;
use crate::types::*;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

/// MIME type probed for a progressive URL
pub(crate) fn progressive_mime(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".mp4") {
        Some("video/mp4")
    } else if path.ends_with(".webm") {
        Some("video/webm")
    } else if path.ends_with(".ogg") {
        Some("video/ogg")
    } else {
        None
    }
}

/// Engine for progressive sources on a media element
pub struct ProgressiveEngine {
    core: Arc<EngineCore>,
    element: Arc<dyn MediaElement>,
    load_slot: Arc<LoadSlot>,
}

impl ProgressiveEngine {
    pub fn new(element: Arc<dyn MediaElement>) -> Self {
        Self {
            core: Arc::new(EngineCore::new(EngineKind::Progressive)),
            element,
            load_slot: Arc::new(LoadSlot::new()),
        }
    }
}

#[async_trait]
impl PlaybackEngine for ProgressiveEngine {
    fn id(&self) -> EngineId {
        self.core.id()
    }

    fn kind(&self) -> EngineKind {
        self.core.kind()
    }

    async fn initialize(&self, config: EngineConfig) -> Result<()> {
        self.core.begin_initialize()?;
        self.element.attach(&config.render_target);
        self.element.set_listener(Some(media::element_handler(
            &self.core,
            Some(Arc::clone(&self.load_slot)),
        )));
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
        info!(engine = %self.core.kind(), "Loading progressive source");

        self.core.begin_load(stream);
        let pending = self.load_slot.arm();
        self.element.set_source(Some(stream.url()));

        if let Err(error) = LoadSlot::wait(pending, "load").await {
            if !self.core.is_destroyed() {
                self.core.fail(error.clone());
            }
            return Err(error);
        }

        let load_time = self.core.finish_load();
        info!(load_time, "Progressive source ready");
        self.core.emit(PlayerEvent::DurationChange {
            duration: self.element.duration(),
        });

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
        self.load_slot.cancel();
        self.element.pause();
        self.element.set_source(None);
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
        Ok(Vec::new())
    }

    fn current_quality(&self) -> Result<Option<QualityLevel>> {
        self.core.guard("current_quality")?;
        Ok(None)
    }

    fn set_quality(&self, id: Option<&str>) -> Result<()> {
        self.core.guard("set_quality")?;
        match id {
            None => Ok(()),
            Some(id) => Err(Error::quality_not_found(id)),
        }
    }

    fn set_adaptive_bitrate(&self, _enabled: bool) -> Result<()> {
        self.core.guard("set_adaptive_bitrate")?;
        Ok(())
    }

    fn is_adaptive_bitrate(&self) -> Result<bool> {
        self.core.guard("is_adaptive_bitrate")?;
        Ok(false)
    }

    fn audio_tracks(&self) -> Result<Vec<AudioTrack>> {
        self.core.guard("audio_tracks")?;
        Ok(media::audio_tracks(self.element.as_ref()))
    }

    fn current_audio_track(&self) -> Result<Option<AudioTrack>> {
        self.core.guard("current_audio_track")?;
        Ok(media::current_audio_track(self.element.as_ref()))
    }

    fn set_audio_track(&self, id: &str) -> Result<()> {
        self.core.guard("set_audio_track")?;
        media::select_audio_track(self.element.as_ref(), id)
    }

    fn subtitle_tracks(&self) -> Result<Vec<SubtitleTrack>> {
        self.core.guard("subtitle_tracks")?;
        Ok(media::subtitle_tracks(self.element.as_ref()))
    }

    fn current_subtitle_track(&self) -> Result<Option<SubtitleTrack>> {
        self.core.guard("current_subtitle_track")?;
        Ok(media::current_subtitle_track(self.element.as_ref()))
    }

    fn set_subtitle_track(&self, id: Option<&str>) -> Result<()> {
        self.core.guard("set_subtitle_track")?;
        media::select_subtitle_track(self.element.as_ref(), id)
    }

    fn metrics(&self) -> Result<PlaybackMetrics> {
        self.core.guard("metrics")?;
        Ok(media::element_metrics(self.element.as_ref(), self.core.load_time()))
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
        if detect_stream_type(url) != StreamType::Progressive {
            return Ok(false);
        }
        Ok(progressive_mime(url)
            .map(|mime| self.element.can_play_type(mime) != CanPlay::No)
            .unwrap_or(false))
    }

    fn destroy(&self) {
        if !self.core.destroy() {
            return;
        }
        self.element.set_listener(None);
        self.load_slot.cancel();
        self.element.pause();
        self.element.set_source(None);
        self.element.detach();
        info!(engine = %self.core.kind(), "Progressive engine destroyed");
    }
}

impl std::fmt::Debug for ProgressiveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressiveEngine").field("core", &self.core).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{MediaSignal, NativeFaultCode};
    use crate::sim::{ElementScript, SimMediaElement};
    use parking_lot::Mutex;

    async fn ready(element: &Arc<SimMediaElement>) -> ProgressiveEngine {
        let engine = ProgressiveEngine::new(element.clone());
        engine.initialize(EngineConfig::default()).await.unwrap();
        engine
    }

    #[test]
    fn test_progressive_mime() {
        assert_eq!(progressive_mime("http://x/a.MP4?token=1"), Some("video/mp4"));
        assert_eq!(progressive_mime("http://x/a.webm"), Some("video/webm"));
        assert_eq!(progressive_mime("http://x/a.m3u8"), None);
    }

    #[tokio::test]
    async fn test_load_settles_paused() {
        let element = Arc::new(SimMediaElement::new());
        let engine = ready(&element).await;

        engine.load(&"http://cdn/movie.mp4".into()).await.unwrap();
        assert_eq!(engine.state().unwrap(), PlaybackState::Paused);
        assert_eq!(element.source().as_deref(), Some("http://cdn/movie.mp4"));
    }

    #[tokio::test]
    async fn test_load_failure_moves_to_error() {
        let element = Arc::new(SimMediaElement::new());
        element.script(ElementScript::Fail(NativeFaultCode::SourceNotSupported));
        let engine = ready(&element).await;

        let err = engine.load(&"http://cdn/movie.mp4".into()).await.unwrap_err();
        assert_eq!(err.code, crate::error::codes::SRC_NOT_SUPPORTED);
        assert_eq!(engine.state().unwrap(), PlaybackState::Error);
    }

    #[tokio::test]
    async fn test_waiting_and_playing_drive_buffering() {
        let element = Arc::new(SimMediaElement::new());
        let engine = ready(&element).await;
        engine.load(&"http://cdn/movie.mp4".into()).await.unwrap();
        engine.play().await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine
            .on(
                EventType::Buffering,
                Arc::new(move |event: &PlayerEvent| sink.lock().push(event.clone())),
            )
            .unwrap();

        element.emit(MediaSignal::Waiting);
        assert_eq!(engine.state().unwrap(), PlaybackState::Buffering);
        element.emit(MediaSignal::Playing);
        assert_eq!(engine.state().unwrap(), PlaybackState::Playing);
        assert_eq!(
            seen.lock().as_slice(),
            &[
                PlayerEvent::Buffering { buffering: true },
                PlayerEvent::Buffering { buffering: false }
            ]
        );
    }

    #[tokio::test]
    async fn test_quality_surface_is_empty() {
        let element = Arc::new(SimMediaElement::new());
        let engine = ready(&element).await;

        assert!(engine.quality_levels().unwrap().is_empty());
        assert!(engine.set_quality(None).is_ok());
        assert_eq!(
            engine.set_quality(Some("720p")).unwrap_err().code,
            crate::error::codes::QUALITY_NOT_FOUND
        );
        assert!(!engine.is_adaptive_bitrate().unwrap());
    }

    #[tokio::test]
    async fn test_can_play_stream() {
        let element = Arc::new(SimMediaElement::new());
        element.reject_mime("video/ogg");
        let engine = ready(&element).await;

        assert!(engine.can_play_stream("http://cdn/a.mp4").unwrap());
        assert!(!engine.can_play_stream("http://cdn/a.ogg").unwrap());
        assert!(!engine.can_play_stream("http://cdn/a.m3u8").unwrap());
    }
}
