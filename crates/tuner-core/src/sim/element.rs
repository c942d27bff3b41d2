//! Simulated media element

use crate::native::{
    CanPlay, ElementTrack, FrameStats, MediaElement, MediaFault, MediaSignal, NativeFaultCode,
    SignalHandler, TimeRange,
};
use crate::types::RenderTarget;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

/// What a simulated element does when a source is set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementScript {
    /// Report duration and metadata immediately
    Succeed,
    /// Report the given fault
    Fail(NativeFaultCode),
    /// Never report anything
    Hang,
}

#[derive(Debug)]
struct ElementState {
    script: ElementScript,
    source: Option<String>,
    target: Option<RenderTarget>,
    media_duration: f64,
    duration: f64,
    current_time: f64,
    volume: f64,
    muted: bool,
    paused: bool,
    buffered: Vec<TimeRange>,
    frames: Option<FrameStats>,
    audio: Option<Vec<ElementTrack>>,
    text: Option<Vec<ElementTrack>>,
    rejected: Vec<String>,
    play_fault: Option<MediaFault>,
}

/// Media element whose load outcome is scripted
///
/// Signals are delivered synchronously from the call that causes them.
pub struct SimMediaElement {
    state: Mutex<ElementState>,
    listener: Mutex<Option<SignalHandler<MediaSignal>>>,
}

impl SimMediaElement {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ElementState {
                script: ElementScript::Succeed,
                source: None,
                target: None,
                media_duration: 600.0,
                duration: f64::NAN,
                current_time: 0.0,
                volume: 1.0,
                muted: false,
                paused: true,
                buffered: Vec::new(),
                frames: None,
                audio: None,
                text: None,
                rejected: Vec::new(),
                play_fault: None,
            }),
            listener: Mutex::new(None),
        }
    }

    pub fn with_script(self, script: ElementScript) -> Self {
        self.script(script);
        self
    }

    pub fn with_media_duration(self, seconds: f64) -> Self {
        self.state.lock().media_duration = seconds;
        self
    }

    /// Expose experimental track lists
    pub fn with_tracks(self, audio: Vec<ElementTrack>, text: Vec<ElementTrack>) -> Self {
        {
            let mut state = self.state.lock();
            state.audio = Some(audio);
            state.text = Some(text);
        }
        self
    }

    pub fn with_buffered(self, ranges: Vec<TimeRange>, frames: FrameStats) -> Self {
        {
            let mut state = self.state.lock();
            state.buffered = ranges;
            state.frames = Some(frames);
        }
        self
    }

    /// Outcome of the next `set_source` calls
    pub fn script(&self, script: ElementScript) {
        self.state.lock().script = script;
    }

    /// Make `can_play_type` answer "no" for a MIME type
    pub fn reject_mime(&self, mime: &str) {
        self.state.lock().rejected.push(mime.to_string());
    }

    /// Make the next `play` call reject
    pub fn reject_next_play(&self, fault: MediaFault) {
        self.state.lock().play_fault = Some(fault);
    }

    pub fn source(&self) -> Option<String> {
        self.state.lock().source.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().target.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }

    pub fn element_volume(&self) -> (f64, bool) {
        let state = self.state.lock();
        (state.volume, state.muted)
    }

    /// Deliver a signal to the installed listener
    pub fn emit(&self, signal: MediaSignal) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            trace!(?signal, "Simulated element signal");
            listener(signal);
        }
    }
}

impl Default for SimMediaElement {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaElement for SimMediaElement {
    fn can_play_type(&self, mime: &str) -> CanPlay {
        if self.state.lock().rejected.iter().any(|rejected| rejected == mime) {
            CanPlay::No
        } else if mime == "video/mp4" {
            CanPlay::Probably
        } else {
            CanPlay::Maybe
        }
    }

    fn set_listener(&self, handler: Option<SignalHandler<MediaSignal>>) {
        *self.listener.lock() = handler;
    }

    fn attach(&self, target: &RenderTarget) {
        self.state.lock().target = Some(target.clone());
    }

    fn detach(&self) {
        self.state.lock().target = None;
    }

    fn set_source(&self, url: Option<&str>) {
        let outcome = {
            let mut state = self.state.lock();
            state.source = url.map(str::to_string);
            state.current_time = 0.0;
            state.paused = true;
            match url {
                None => {
                    state.duration = f64::NAN;
                    return;
                }
                Some(_) => {
                    if state.script == ElementScript::Succeed {
                        state.duration = state.media_duration;
                    }
                    (state.script, state.duration)
                }
            }
        };

        match outcome {
            (ElementScript::Succeed, duration) => {
                self.emit(MediaSignal::DurationChange(duration));
                self.emit(MediaSignal::LoadedMetadata);
            }
            (ElementScript::Fail(code), _) => {
                self.emit(MediaSignal::Error(MediaFault::new(code, "simulated media fault")));
            }
            (ElementScript::Hang, _) => {}
        }
    }

    async fn play(&self) -> Result<(), MediaFault> {
        {
            let mut state = self.state.lock();
            if let Some(fault) = state.play_fault.take() {
                return Err(fault);
            }
            state.paused = false;
        }
        self.emit(MediaSignal::Playing);
        Ok(())
    }

    fn pause(&self) {
        let was_playing = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.paused, true)
        };
        if !was_playing {
            self.emit(MediaSignal::Pause);
        }
    }

    fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    fn set_current_time(&self, seconds: f64) {
        self.state.lock().current_time = seconds;
        self.emit(MediaSignal::TimeUpdate(seconds));
    }

    fn duration(&self) -> f64 {
        self.state.lock().duration
    }

    fn set_volume(&self, volume: f64) {
        self.state.lock().volume = volume;
    }

    fn set_muted(&self, muted: bool) {
        self.state.lock().muted = muted;
    }

    fn buffered(&self) -> Vec<TimeRange> {
        self.state.lock().buffered.clone()
    }

    fn frame_stats(&self) -> Option<FrameStats> {
        self.state.lock().frames
    }

    fn audio_tracks(&self) -> Option<Vec<ElementTrack>> {
        self.state.lock().audio.clone()
    }

    fn enable_audio_track(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        let Some(tracks) = state.audio.as_mut() else {
            return false;
        };
        if !tracks.iter().any(|track| track.id == id) {
            return false;
        }
        for track in tracks.iter_mut() {
            track.enabled = track.id == id;
        }
        true
    }

    fn text_tracks(&self) -> Option<Vec<ElementTrack>> {
        self.state.lock().text.clone()
    }

    fn show_text_track(&self, id: Option<&str>) -> bool {
        let mut state = self.state.lock();
        let Some(tracks) = state.text.as_mut() else {
            return id.is_none();
        };
        if let Some(id) = id {
            if !tracks.iter().any(|track| track.id == id) {
                return false;
            }
        }
        for track in tracks.iter_mut() {
            track.enabled = Some(track.id.as_str()) == id;
        }
        true
    }
}
