//! Simulated streaming libraries

use super::SimMediaElement;
use crate::native::{
    AdaptiveLibrary, AdaptiveSettings, AdaptiveStats, LanguageTrack, Level, LibraryFault, LibrarySignal,
    MediaElement, SegmentLibrary, SegmentTrack, SignalHandler, Variant,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

fn deliver(listener: &Mutex<Option<SignalHandler<LibrarySignal>>>, signal: LibrarySignal) {
    let listener = listener.lock().clone();
    if let Some(listener) = listener {
        trace!(?signal, "Simulated library signal");
        listener(signal);
    }
}

// =============================================================================
// Adaptive library
// =============================================================================

#[derive(Debug)]
struct AdaptiveState {
    supported: bool,
    settings: Option<AdaptiveSettings>,
    abr_enabled: bool,
    variants: Vec<Variant>,
    audio: Vec<LanguageTrack>,
    text: Vec<LanguageTrack>,
    text_visible: bool,
    stats: AdaptiveStats,
    loaded: Option<String>,
    loads: usize,
    load_faults: VecDeque<LibraryFault>,
}

/// Adaptive library with scripted load faults
///
/// Loads resolve immediately unless a fault was queued with
/// [`fail_next_load`](Self::fail_next_load).
pub struct SimAdaptiveLibrary {
    element: Arc<SimMediaElement>,
    state: Mutex<AdaptiveState>,
    listener: Mutex<Option<SignalHandler<LibrarySignal>>>,
}

impl SimAdaptiveLibrary {
    pub fn new() -> Self {
        Self {
            element: Arc::new(SimMediaElement::new()),
            state: Mutex::new(AdaptiveState {
                supported: true,
                settings: None,
                abr_enabled: true,
                variants: Vec::new(),
                audio: Vec::new(),
                text: Vec::new(),
                text_visible: false,
                stats: AdaptiveStats::default(),
                loaded: None,
                loads: 0,
                load_faults: VecDeque::new(),
            }),
            listener: Mutex::new(None),
        }
    }

    /// Fail the capability probe
    pub fn unsupported(self) -> Self {
        self.state.lock().supported = false;
        self
    }

    pub fn with_variants(self, variants: Vec<Variant>) -> Self {
        self.state.lock().variants = variants;
        self
    }

    pub fn with_audio(self, tracks: Vec<LanguageTrack>) -> Self {
        self.state.lock().audio = tracks;
        self
    }

    pub fn with_text(self, tracks: Vec<LanguageTrack>) -> Self {
        self.state.lock().text = tracks;
        self
    }

    pub fn with_stats(self, stats: AdaptiveStats) -> Self {
        self.state.lock().stats = stats;
        self
    }

    /// Queue a fault for the next load
    pub fn fail_next_load(&self, fault: LibraryFault) {
        self.state.lock().load_faults.push_back(fault);
    }

    pub fn element(&self) -> Arc<SimMediaElement> {
        Arc::clone(&self.element)
    }

    /// Last settings pushed with `configure`
    pub fn settings(&self) -> Option<AdaptiveSettings> {
        self.state.lock().settings.clone()
    }

    pub fn abr_enabled(&self) -> bool {
        self.state.lock().abr_enabled
    }

    pub fn text_visible(&self) -> bool {
        self.state.lock().text_visible
    }

    /// Number of load attempts, failed ones included
    pub fn load_count(&self) -> usize {
        self.state.lock().loads
    }

    pub fn loaded_url(&self) -> Option<String> {
        self.state.lock().loaded.clone()
    }

    pub fn emit(&self, signal: LibrarySignal) {
        deliver(&self.listener, signal);
    }
}

impl Default for SimAdaptiveLibrary {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdaptiveLibrary for SimAdaptiveLibrary {
    fn is_supported(&self) -> bool {
        self.state.lock().supported
    }

    fn media(&self) -> Arc<dyn MediaElement> {
        self.element.clone()
    }

    fn configure(&self, settings: &AdaptiveSettings) {
        let mut state = self.state.lock();
        state.abr_enabled = settings.abr_enabled;
        state.settings = Some(settings.clone());
    }

    fn set_listener(&self, handler: Option<SignalHandler<LibrarySignal>>) {
        *self.listener.lock() = handler;
    }

    async fn load(&self, url: &str) -> Result<(), LibraryFault> {
        let mut state = self.state.lock();
        state.loads += 1;
        if let Some(fault) = state.load_faults.pop_front() {
            state.loaded = None;
            return Err(fault);
        }
        state.loaded = Some(url.to_string());
        Ok(())
    }

    fn unload(&self) {
        self.state.lock().loaded = None;
    }

    fn variants(&self) -> Vec<Variant> {
        self.state.lock().variants.clone()
    }

    fn select_variant(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        if !state.variants.iter().any(|variant| variant.id == id) {
            return false;
        }
        for variant in state.variants.iter_mut() {
            variant.active = variant.id == id;
        }
        true
    }

    fn set_abr_enabled(&self, enabled: bool) {
        self.state.lock().abr_enabled = enabled;
    }

    fn audio_tracks(&self) -> Vec<LanguageTrack> {
        self.state.lock().audio.clone()
    }

    fn select_audio_language(&self, language: &str) {
        let mut state = self.state.lock();
        if !state.audio.iter().any(|track| track.language == language) {
            return;
        }
        for track in state.audio.iter_mut() {
            track.active = track.language == language;
        }
    }

    fn text_tracks(&self) -> Vec<LanguageTrack> {
        self.state.lock().text.clone()
    }

    fn select_text_track(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        if !state.text.iter().any(|track| track.id == id) {
            return false;
        }
        for track in state.text.iter_mut() {
            track.active = track.id == id;
        }
        true
    }

    fn set_text_visibility(&self, visible: bool) {
        self.state.lock().text_visible = visible;
    }

    fn stats(&self) -> AdaptiveStats {
        self.state.lock().stats
    }

    fn destroy(&self) {
        self.state.lock().loaded = None;
        *self.listener.lock() = None;
    }
}

// =============================================================================
// Segment library
// =============================================================================

#[derive(Debug)]
struct SegmentState {
    supported: bool,
    attached: bool,
    levels: Vec<Level>,
    locked_level: Option<usize>,
    audio: Vec<SegmentTrack>,
    audio_track: Option<u32>,
    subtitles: Vec<SegmentTrack>,
    subtitle_track: Option<u32>,
    bandwidth: f64,
    loaded: Option<String>,
    max_buffer_length: Option<f64>,
    loads: usize,
    load_faults: VecDeque<LibraryFault>,
}

/// Segment library with scripted load faults
///
/// In automatic mode the lowest level is reported as current.
pub struct SimSegmentLibrary {
    state: Mutex<SegmentState>,
    listener: Mutex<Option<SignalHandler<LibrarySignal>>>,
}

impl SimSegmentLibrary {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SegmentState {
                supported: true,
                attached: false,
                levels: Vec::new(),
                locked_level: None,
                audio: Vec::new(),
                audio_track: None,
                subtitles: Vec::new(),
                subtitle_track: None,
                bandwidth: 0.0,
                loaded: None,
                max_buffer_length: None,
                loads: 0,
                load_faults: VecDeque::new(),
            }),
            listener: Mutex::new(None),
        }
    }

    pub fn unsupported(self) -> Self {
        self.state.lock().supported = false;
        self
    }

    pub fn with_levels(self, levels: Vec<Level>) -> Self {
        self.state.lock().levels = levels;
        self
    }

    /// Audio and subtitle tracks; the first audio track starts active
    pub fn with_tracks(self, audio: Vec<SegmentTrack>, subtitles: Vec<SegmentTrack>) -> Self {
        {
            let mut state = self.state.lock();
            state.audio_track = audio.first().map(|track| track.id);
            state.audio = audio;
            state.subtitles = subtitles;
        }
        self
    }

    pub fn with_bandwidth(self, bits_per_second: f64) -> Self {
        self.state.lock().bandwidth = bits_per_second;
        self
    }

    pub fn fail_next_load(&self, fault: LibraryFault) {
        self.state.lock().load_faults.push_back(fault);
    }

    pub fn load_count(&self) -> usize {
        self.state.lock().loads
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    /// Buffer cap passed with the last load
    pub fn max_buffer_length(&self) -> Option<f64> {
        self.state.lock().max_buffer_length
    }

    pub fn emit(&self, signal: LibrarySignal) {
        deliver(&self.listener, signal);
    }
}

impl Default for SimSegmentLibrary {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SegmentLibrary for SimSegmentLibrary {
    fn is_supported(&self) -> bool {
        self.state.lock().supported
    }

    fn attach_media(&self, _media: Arc<dyn MediaElement>) {
        self.state.lock().attached = true;
    }

    fn detach_media(&self) {
        self.state.lock().attached = false;
    }

    fn set_listener(&self, handler: Option<SignalHandler<LibrarySignal>>) {
        *self.listener.lock() = handler;
    }

    async fn load_source(&self, url: &str, max_buffer_length: f64) -> Result<(), LibraryFault> {
        let mut state = self.state.lock();
        state.loads += 1;
        state.max_buffer_length = Some(max_buffer_length);
        if let Some(fault) = state.load_faults.pop_front() {
            state.loaded = None;
            return Err(fault);
        }
        state.loaded = Some(url.to_string());
        Ok(())
    }

    fn stop_load(&self) {
        self.state.lock().loaded = None;
    }

    fn levels(&self) -> Vec<Level> {
        self.state.lock().levels.clone()
    }

    fn current_level(&self) -> Option<usize> {
        let state = self.state.lock();
        if state.levels.is_empty() {
            None
        } else {
            Some(state.locked_level.unwrap_or(0))
        }
    }

    fn set_current_level(&self, level: Option<usize>) {
        let mut state = self.state.lock();
        state.locked_level = level.filter(|index| *index < state.levels.len());
    }

    fn auto_level_enabled(&self) -> bool {
        self.state.lock().locked_level.is_none()
    }

    fn audio_tracks(&self) -> Vec<SegmentTrack> {
        self.state.lock().audio.clone()
    }

    fn audio_track(&self) -> Option<u32> {
        self.state.lock().audio_track
    }

    fn set_audio_track(&self, id: u32) -> bool {
        let mut state = self.state.lock();
        if !state.audio.iter().any(|track| track.id == id) {
            return false;
        }
        state.audio_track = Some(id);
        true
    }

    fn subtitle_tracks(&self) -> Vec<SegmentTrack> {
        self.state.lock().subtitles.clone()
    }

    fn subtitle_track(&self) -> Option<u32> {
        self.state.lock().subtitle_track
    }

    fn set_subtitle_track(&self, id: Option<u32>) -> bool {
        let mut state = self.state.lock();
        if let Some(id) = id {
            if !state.subtitles.iter().any(|track| track.id == id) {
                return false;
            }
        }
        state.subtitle_track = id;
        true
    }

    fn bandwidth_estimate(&self) -> f64 {
        self.state.lock().bandwidth
    }

    fn destroy(&self) {
        {
            let mut state = self.state.lock();
            state.loaded = None;
            state.attached = false;
        }
        *self.listener.lock() = None;
    }
}
