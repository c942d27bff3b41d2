//! Embedded platform engine
//!
//! Drives the constrained native player of memory-limited devices. Every native
//! call goes through [`EmbeddedStateMachine`], times are converted between
//! seconds and milliseconds at this boundary, and the playhead is polled once a
//! second while playing because the player never pushes it.

mod state;

pub use state::{EmbeddedOp, EmbeddedState, EmbeddedStateMachine};

use super::{ms_to_seconds, seconds_to_ms, EngineCore, LoadSlot, PlaybackEngine};
use crate::error::{Error, Result};
use crate::events::{EventType, Listener, ListenerId, PlayerEvent};
use crate::fault::classify_player_fault;
use crate::native::{
    ConstrainedPlayer, NativePlayerState, NativeTrack, NativeTrackKind, PlayerFault, PlayerSignal,
    SignalHandler,
};
use crate::selector::detect_stream_type;
use crate::types::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, trace, warn};

/// Playhead poll period while playing
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

fn to_quality(track: &NativeTrack) -> QualityLevel {
    QualityLevel {
        id: track.index.to_string(),
        width: track.width,
        height: track.height,
        bitrate: track.bitrate,
        codec: track.codec.clone(),
        label: QualityLevel::height_label(track.height),
    }
}

fn to_audio(track: &NativeTrack) -> AudioTrack {
    AudioTrack {
        id: track.index.to_string(),
        language: track.language.clone(),
        label: track.language.clone(),
        codec: track.codec.clone(),
        channels: track.channels,
    }
}

fn to_subtitle(track: &NativeTrack) -> SubtitleTrack {
    SubtitleTrack {
        id: track.index.to_string(),
        language: track.language.clone(),
        label: track.language.clone(),
    }
}

struct Shared {
    core: Arc<EngineCore>,
    player: Arc<dyn ConstrainedPlayer>,
    machine: EmbeddedStateMachine,
    poller: Mutex<Option<JoinHandle<()>>>,
    prepare_slot: Arc<LoadSlot>,
    subtitles_visible: AtomicBool,
}

impl Shared {
    fn native_state(&self) -> EmbeddedState {
        self.machine.state(self.player.state())
    }

    /// State-checked native call
    fn call<T>(
        &self,
        op: EmbeddedOp,
        f: impl FnOnce(&dyn ConstrainedPlayer) -> std::result::Result<T, PlayerFault>,
    ) -> Result<T> {
        self.machine.check(op, self.player.state())?;
        f(self.player.as_ref()).map_err(|fault| {
            let error = classify_player_fault(&fault);
            warn!(op = %op, code = %error.code, message = %fault.message, "Native player call failed");
            error
        })
    }

    fn tracks(&self, kind: NativeTrackKind) -> Vec<NativeTrack> {
        self.player
            .tracks()
            .into_iter()
            .filter(|track| track.kind == kind)
            .collect()
    }

    fn current(&self, kind: NativeTrackKind) -> Option<NativeTrack> {
        let index = self.player.current_track(kind)?;
        self.tracks(kind).into_iter().find(|track| track.index == index)
    }

    /// Resolve a contract track id to a native index of the given kind
    fn track_index(&self, kind: NativeTrackKind, id: &str) -> Option<u32> {
        let index = id.parse::<u32>().ok()?;
        self.tracks(kind)
            .iter()
            .any(|track| track.index == index)
            .then_some(index)
    }

    fn start_polling(self: &Arc<Self>) {
        let shared: Weak<Shared> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + POLL_INTERVAL, POLL_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let current_time = ms_to_seconds(shared.player.current_time_ms());
                shared.core.emit(PlayerEvent::TimeUpdate { current_time });
            }
        });
        if let Some(previous) = self.poller.lock().replace(handle) {
            previous.abort();
        }
        trace!("Playhead polling started");
    }

    fn stop_polling(&self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
            trace!("Playhead polling stopped");
        }
    }

    fn is_polling(&self) -> bool {
        self.poller.lock().is_some()
    }

    fn fail(&self, error: Error) {
        self.machine.set_error();
        self.stop_polling();
        self.core.fail(error);
    }

    fn handle_signal(&self, signal: PlayerSignal) {
        match signal {
            PlayerSignal::BufferingStart => {
                self.core.transition(PlaybackState::Buffering);
                self.core.emit(PlayerEvent::Buffering { buffering: true });
            }
            PlayerSignal::BufferingProgress(percent) => {
                trace!(percent, "Buffering progress");
            }
            PlayerSignal::BufferingComplete => {
                self.core.emit(PlayerEvent::Buffering { buffering: false });
                if self.core.state() == PlaybackState::Buffering {
                    match self.player.state() {
                        NativePlayerState::Playing => {
                            self.core.transition(PlaybackState::Playing);
                        }
                        NativePlayerState::Paused | NativePlayerState::Ready => {
                            self.core.transition(PlaybackState::Paused);
                        }
                        NativePlayerState::None | NativePlayerState::Idle => {}
                    }
                }
            }
            PlayerSignal::StreamCompleted => {
                self.stop_polling();
                self.core.transition(PlaybackState::Ended);
                self.core.emit(PlayerEvent::Ended {});
            }
            PlayerSignal::Error(fault) => {
                let error = classify_player_fault(&fault);
                if self.prepare_slot.resolve(Err(error.clone())) {
                    return;
                }
                warn!(code = %error.code, message = %fault.message, "Native player error");
                self.fail(error);
            }
        }
    }

    async fn open_and_prepare(&self, url: &str, config: &EngineConfig) -> Result<()> {
        self.call(EmbeddedOp::Open, |player| player.open(url))?;

        let rect = config.render_target.rect.unwrap_or(DisplayRect::FULL_HD);
        let buffering_ms = seconds_to_ms(config.max_buffer_length);
        self.player
            .set_display_rect(rect)
            .and_then(|_| self.player.set_buffering_time_ms(buffering_ms))
            .map_err(|fault| classify_player_fault(&fault))?;

        self.machine.check(EmbeddedOp::Prepare, self.player.state())?;
        let pending = self.prepare_slot.arm();
        let slot = Arc::clone(&self.prepare_slot);
        self.player.prepare_async(Box::new(move |result: std::result::Result<(), PlayerFault>| {
            slot.resolve(result.map_err(|fault| classify_player_fault(&fault)));
        }));
        LoadSlot::wait(pending, "load").await
    }

    /// Preferred languages; misses are logged, not fatal
    fn apply_preferences(&self, config: &EngineConfig) {
        let select = |kind: NativeTrackKind, language: &str| {
            let track = self
                .tracks(kind)
                .into_iter()
                .find(|track| track.language.eq_ignore_ascii_case(language));
            match track {
                Some(track) => {
                    if let Err(error) = self.call(EmbeddedOp::SelectTrack, |p| p.select_track(kind, track.index)) {
                        warn!(language, code = %error.code, "Preferred track selection failed");
                        false
                    } else {
                        true
                    }
                }
                None => {
                    debug!(language, ?kind, "No track for preferred language");
                    false
                }
            }
        };

        if let Some(language) = config.preferred_audio_language.as_deref() {
            select(NativeTrackKind::Audio, language);
        }
        if let Some(language) = config.preferred_subtitle_language.as_deref() {
            if select(NativeTrackKind::Text, language) {
                self.player.set_subtitles_hidden(false);
                self.subtitles_visible.store(true, Ordering::SeqCst);
            }
        }
    }
}

/// Engine for the embedded platform's native player
pub struct EmbeddedEngine {
    shared: Arc<Shared>,
}

impl EmbeddedEngine {
    pub fn new(player: Arc<dyn ConstrainedPlayer>) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: Arc::new(EngineCore::new(EngineKind::Embedded)),
                player,
                machine: EmbeddedStateMachine::new(),
                poller: Mutex::new(None),
                prepare_slot: Arc::new(LoadSlot::new()),
                subtitles_visible: AtomicBool::new(false),
            }),
        }
    }

    /// Native state with the error overlay applied
    pub fn native_state(&self) -> EmbeddedState {
        self.shared.native_state()
    }

    /// True while the playhead poll is scheduled
    pub fn is_polling(&self) -> bool {
        self.shared.is_polling()
    }

    fn signal_handler(&self) -> SignalHandler<PlayerSignal> {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Arc::new(move |signal: PlayerSignal| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            if shared.core.is_destroyed() {
                return;
            }
            shared.handle_signal(signal);
        })
    }

    fn core(&self) -> &EngineCore {
        &self.shared.core
    }
}

#[async_trait]
impl PlaybackEngine for EmbeddedEngine {
    fn id(&self) -> EngineId {
        self.core().id()
    }

    fn kind(&self) -> EngineKind {
        self.core().kind()
    }

    async fn initialize(&self, config: EngineConfig) -> Result<()> {
        self.core().begin_initialize()?;
        self.shared.player.set_listener(Some(self.signal_handler()));
        self.shared.player.set_subtitles_hidden(true);
        self.core().finish_initialize(config);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.core().is_initialized()
    }

    /// close, open, display rect, buffering time, then prepare
    #[instrument(skip(self, stream), fields(url = %stream.url()))]
    async fn load(&self, stream: &StreamDescriptor) -> Result<()> {
        self.core().guard("load")?;
        let shared = &self.shared;
        info!(previous = %shared.native_state(), "Opening stream on native player");

        shared.stop_polling();
        shared.prepare_slot.cancel();
        shared.player.close();
        shared.machine.clear_error();
        shared.subtitles_visible.store(false, Ordering::SeqCst);

        shared.core.begin_load(stream);
        let config = shared.core.config();
        if let Err(error) = shared.open_and_prepare(stream.url(), &config).await {
            if !shared.core.is_destroyed() {
                shared.fail(error.clone());
            }
            return Err(error);
        }

        let load_time = shared.core.finish_load();
        info!(load_time, duration_ms = shared.player.duration_ms(), "Native player prepared");
        shared.core.emit(PlayerEvent::DurationChange {
            duration: ms_to_seconds(shared.player.duration_ms()),
        });
        shared.apply_preferences(&config);

        if config.auto_play {
            self.play().await
        } else {
            shared.core.loaded_paused();
            Ok(())
        }
    }

    async fn play(&self) -> Result<()> {
        self.core().guard("play")?;
        if let Err(error) = self.shared.call(EmbeddedOp::Play, |player| player.play()) {
            if !error.is_invalid_state() {
                self.shared.fail(error.clone());
            }
            return Err(error);
        }
        self.core().transition(PlaybackState::Playing);
        self.shared.start_polling();
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.core().guard("pause")?;
        self.shared.call(EmbeddedOp::Pause, |player| player.pause())?;
        self.shared.stop_polling();
        self.core().transition(PlaybackState::Paused);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.core().guard("stop")?;
        self.shared.call(EmbeddedOp::Stop, |player| player.stop())?;
        self.shared.stop_polling();
        self.core().unload();
        Ok(())
    }

    fn seek(&self, seconds: f64) -> Result<()> {
        self.core().guard("seek")?;
        let position_ms = seconds_to_ms(seconds);
        self.shared.call(EmbeddedOp::Seek, |player| player.seek_to(position_ms))?;
        self.core().emit(PlayerEvent::TimeUpdate {
            current_time: ms_to_seconds(position_ms),
        });
        Ok(())
    }

    fn state(&self) -> Result<PlaybackState> {
        self.core().guard("state")?;
        Ok(self.core().state())
    }

    fn current_time(&self) -> Result<f64> {
        self.core().guard("current_time")?;
        Ok(ms_to_seconds(self.shared.player.current_time_ms()))
    }

    fn duration(&self) -> Result<f64> {
        self.core().guard("duration")?;
        Ok(ms_to_seconds(self.shared.player.duration_ms()))
    }

    fn volume(&self) -> Result<f64> {
        self.core().guard("volume")?;
        Ok(self.core().volume())
    }

    /// Device volume belongs to the platform; only the reported value changes
    fn set_volume(&self, volume: f64) -> Result<()> {
        self.core().guard("set_volume")?;
        self.core().set_volume(volume);
        Ok(())
    }

    fn is_muted(&self) -> Result<bool> {
        self.core().guard("is_muted")?;
        Ok(self.core().muted())
    }

    fn set_muted(&self, muted: bool) -> Result<()> {
        self.core().guard("set_muted")?;
        self.core().set_muted(muted);
        Ok(())
    }

    fn quality_levels(&self) -> Result<Vec<QualityLevel>> {
        self.core().guard("quality_levels")?;
        Ok(self.shared.tracks(NativeTrackKind::Video).iter().map(to_quality).collect())
    }

    fn current_quality(&self) -> Result<Option<QualityLevel>> {
        self.core().guard("current_quality")?;
        Ok(self.shared.current(NativeTrackKind::Video).as_ref().map(to_quality))
    }

    /// The native player picks the bitrate itself; known ids are accepted
    fn set_quality(&self, id: Option<&str>) -> Result<()> {
        self.core().guard("set_quality")?;
        match id {
            None => Ok(()),
            Some(id) if self.shared.track_index(NativeTrackKind::Video, id).is_some() => {
                debug!(quality = id, "Manual quality is not supported by the native player");
                Ok(())
            }
            Some(id) => Err(Error::quality_not_found(id)),
        }
    }

    fn set_adaptive_bitrate(&self, _enabled: bool) -> Result<()> {
        self.core().guard("set_adaptive_bitrate")?;
        Ok(())
    }

    fn is_adaptive_bitrate(&self) -> Result<bool> {
        self.core().guard("is_adaptive_bitrate")?;
        Ok(true)
    }

    fn audio_tracks(&self) -> Result<Vec<AudioTrack>> {
        self.core().guard("audio_tracks")?;
        Ok(self.shared.tracks(NativeTrackKind::Audio).iter().map(to_audio).collect())
    }

    fn current_audio_track(&self) -> Result<Option<AudioTrack>> {
        self.core().guard("current_audio_track")?;
        Ok(self.shared.current(NativeTrackKind::Audio).as_ref().map(to_audio))
    }

    fn set_audio_track(&self, id: &str) -> Result<()> {
        self.core().guard("set_audio_track")?;
        self.shared.machine.check(EmbeddedOp::SelectTrack, self.shared.player.state())?;
        let index = self
            .shared
            .track_index(NativeTrackKind::Audio, id)
            .ok_or_else(|| Error::track_not_found(id))?;
        self.shared.call(EmbeddedOp::SelectTrack, |player| {
            player.select_track(NativeTrackKind::Audio, index)
        })
    }

    fn subtitle_tracks(&self) -> Result<Vec<SubtitleTrack>> {
        self.core().guard("subtitle_tracks")?;
        Ok(self.shared.tracks(NativeTrackKind::Text).iter().map(to_subtitle).collect())
    }

    fn current_subtitle_track(&self) -> Result<Option<SubtitleTrack>> {
        self.core().guard("current_subtitle_track")?;
        if !self.shared.subtitles_visible.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.shared.current(NativeTrackKind::Text).as_ref().map(to_subtitle))
    }

    fn set_subtitle_track(&self, id: Option<&str>) -> Result<()> {
        self.core().guard("set_subtitle_track")?;
        let Some(id) = id else {
            self.shared.player.set_subtitles_hidden(true);
            self.shared.subtitles_visible.store(false, Ordering::SeqCst);
            return Ok(());
        };
        self.shared.machine.check(EmbeddedOp::SelectTrack, self.shared.player.state())?;
        let index = self
            .shared
            .track_index(NativeTrackKind::Text, id)
            .ok_or_else(|| Error::track_not_found(id))?;
        self.shared.call(EmbeddedOp::SelectTrack, |player| {
            player.select_track(NativeTrackKind::Text, index)
        })?;
        self.shared.player.set_subtitles_hidden(false);
        self.shared.subtitles_visible.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn metrics(&self) -> Result<PlaybackMetrics> {
        self.core().guard("metrics")?;
        let player = &self.shared.player;
        Ok(PlaybackMetrics {
            current_time: ms_to_seconds(player.current_time_ms()),
            duration: ms_to_seconds(player.duration_ms()),
            load_time: self.core().load_time(),
            ..PlaybackMetrics::default()
        })
    }

    fn on(&self, event_type: EventType, listener: Listener) -> Result<ListenerId> {
        self.core().guard("on")?;
        Ok(self.core().on(event_type, listener))
    }

    fn off(&self, event_type: EventType, id: ListenerId) -> Result<bool> {
        self.core().guard("off")?;
        Ok(self.core().off(event_type, id))
    }

    fn can_play_stream(&self, url: &str) -> Result<bool> {
        self.core().guard("can_play_stream")?;
        Ok(self.core().kind().capability().accepts(detect_stream_type(url)))
    }

    fn destroy(&self) {
        if !self.core().destroy() {
            return;
        }
        let shared = &self.shared;
        shared.player.set_listener(None);
        shared.stop_polling();
        shared.prepare_slot.cancel();
        shared.player.close();
        info!(engine = %shared.core.kind(), "Embedded engine destroyed");
    }
}

impl Drop for EmbeddedEngine {
    fn drop(&mut self) {
        self.shared.stop_polling();
    }
}

impl std::fmt::Debug for EmbeddedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedEngine")
            .field("core", &self.shared.core)
            .field("native_state", &self.native_state())
            .field("polling", &self.is_polling())
            .finish()
    }
}
