//! Simulated embedded player
//!
//! Enforces the same native state rules as the real device player, so calls
//! made in the wrong state fail the way they would on hardware.

use crate::native::{
    ConstrainedPlayer, NativePlayerState, NativeTrack, NativeTrackKind, PlayerFault, PlayerSignal,
    PrepareCallback, SignalHandler,
};
use crate::types::DisplayRect;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::trace;

#[derive(Debug)]
struct PlayerState {
    state: NativePlayerState,
    url: Option<String>,
    rect: Option<DisplayRect>,
    buffering_ms: Option<u64>,
    position_ms: u64,
    duration_ms: u64,
    tracks: Vec<NativeTrack>,
    selected: HashMap<NativeTrackKind, u32>,
    subtitles_hidden: bool,
    prepare_faults: VecDeque<PlayerFault>,
    calls: Vec<String>,
}

impl PlayerState {
    fn require(&self, op: &str, allowed: &[NativePlayerState]) -> Result<(), PlayerFault> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(PlayerFault::new(format!(
                "PLAYER_ERROR_INVALID_STATE: {} not allowed in {}",
                op, self.state
            )))
        }
    }
}

/// Embedded player with a native state machine
pub struct SimConstrainedPlayer {
    state: Mutex<PlayerState>,
    listener: Mutex<Option<SignalHandler<PlayerSignal>>>,
}

impl SimConstrainedPlayer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PlayerState {
                state: NativePlayerState::None,
                url: None,
                rect: None,
                buffering_ms: None,
                position_ms: 0,
                duration_ms: 600_000,
                tracks: Vec::new(),
                selected: HashMap::new(),
                subtitles_hidden: true,
                prepare_faults: VecDeque::new(),
                calls: Vec::new(),
            }),
            listener: Mutex::new(None),
        }
    }

    pub fn with_duration_ms(self, duration_ms: u64) -> Self {
        self.state.lock().duration_ms = duration_ms;
        self
    }

    pub fn with_tracks(self, tracks: Vec<NativeTrack>) -> Self {
        self.state.lock().tracks = tracks;
        self
    }

    /// Make the next prepare report a fault; the player stays IDLE
    pub fn fail_next_prepare(&self, fault: PlayerFault) {
        self.state.lock().prepare_faults.push_back(fault);
    }

    /// Native operations invoked so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn display_rect(&self) -> Option<DisplayRect> {
        self.state.lock().rect
    }

    pub fn buffering_time_ms(&self) -> Option<u64> {
        self.state.lock().buffering_ms
    }

    pub fn opened_url(&self) -> Option<String> {
        self.state.lock().url.clone()
    }

    pub fn subtitles_hidden(&self) -> bool {
        self.state.lock().subtitles_hidden
    }

    /// Move the playhead as if playback had advanced
    pub fn set_position_ms(&self, position_ms: u64) {
        self.state.lock().position_ms = position_ms;
    }

    pub fn emit(&self, signal: PlayerSignal) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            trace!(?signal, "Simulated player signal");
            listener(signal);
        }
    }

    fn transition(
        &self,
        op: &str,
        allowed: &[NativePlayerState],
        next: NativePlayerState,
    ) -> Result<(), PlayerFault> {
        let mut state = self.state.lock();
        state.require(op, allowed)?;
        state.calls.push(op.to_string());
        state.state = next;
        Ok(())
    }
}

impl Default for SimConstrainedPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstrainedPlayer for SimConstrainedPlayer {
    fn state(&self) -> NativePlayerState {
        self.state.lock().state
    }

    fn set_listener(&self, handler: Option<SignalHandler<PlayerSignal>>) {
        *self.listener.lock() = handler;
    }

    fn open(&self, url: &str) -> Result<(), PlayerFault> {
        use NativePlayerState as N;
        self.transition("open", &[N::None, N::Idle], N::Idle)?;
        let mut state = self.state.lock();
        state.url = Some(url.to_string());
        state.position_ms = 0;
        Ok(())
    }

    fn set_display_rect(&self, rect: DisplayRect) -> Result<(), PlayerFault> {
        use NativePlayerState as N;
        let mut state = self.state.lock();
        state.require("set_display_rect", &[N::Idle, N::Ready, N::Playing, N::Paused])?;
        state.calls.push("set_display_rect".to_string());
        state.rect = Some(rect);
        Ok(())
    }

    fn set_buffering_time_ms(&self, ms: u64) -> Result<(), PlayerFault> {
        let mut state = self.state.lock();
        state.require("set_buffering_time", &[NativePlayerState::Idle])?;
        state.calls.push("set_buffering_time".to_string());
        state.buffering_ms = Some(ms);
        Ok(())
    }

    fn prepare_async(&self, on_complete: PrepareCallback) {
        let result = {
            let mut state = self.state.lock();
            match state.require("prepare", &[NativePlayerState::Idle]) {
                Err(fault) => Err(fault),
                Ok(()) => {
                    state.calls.push("prepare".to_string());
                    match state.prepare_faults.pop_front() {
                        Some(fault) => Err(fault),
                        None => {
                            state.state = NativePlayerState::Ready;
                            Ok(())
                        }
                    }
                }
            }
        };
        on_complete(result);
    }

    fn play(&self) -> Result<(), PlayerFault> {
        use NativePlayerState as N;
        self.transition("play", &[N::Ready, N::Paused], N::Playing)
    }

    fn pause(&self) -> Result<(), PlayerFault> {
        use NativePlayerState as N;
        self.transition("pause", &[N::Playing], N::Paused)
    }

    fn stop(&self) -> Result<(), PlayerFault> {
        use NativePlayerState as N;
        self.transition("stop", &[N::Playing, N::Paused], N::Idle)
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.calls.push("close".to_string());
        state.state = NativePlayerState::None;
        state.url = None;
        state.position_ms = 0;
        state.selected.clear();
    }

    fn seek_to(&self, position_ms: u64) -> Result<(), PlayerFault> {
        use NativePlayerState as N;
        let mut state = self.state.lock();
        state.require("seek", &[N::Ready, N::Playing, N::Paused])?;
        state.calls.push("seek".to_string());
        state.position_ms = position_ms.min(state.duration_ms);
        Ok(())
    }

    fn current_time_ms(&self) -> u64 {
        self.state.lock().position_ms
    }

    fn duration_ms(&self) -> u64 {
        let state = self.state.lock();
        match state.state {
            NativePlayerState::None | NativePlayerState::Idle => 0,
            _ => state.duration_ms,
        }
    }

    fn tracks(&self) -> Vec<NativeTrack> {
        self.state.lock().tracks.clone()
    }

    fn current_track(&self, kind: NativeTrackKind) -> Option<u32> {
        let state = self.state.lock();
        state.selected.get(&kind).copied().or_else(|| {
            state
                .tracks
                .iter()
                .find(|track| track.kind == kind)
                .map(|track| track.index)
        })
    }

    fn select_track(&self, kind: NativeTrackKind, index: u32) -> Result<(), PlayerFault> {
        use NativePlayerState as N;
        let mut state = self.state.lock();
        state.require("select_track", &[N::Ready, N::Playing, N::Paused])?;
        if !state.tracks.iter().any(|track| track.kind == kind && track.index == index) {
            return Err(PlayerFault::new(format!("PLAYER_ERROR_INVALID_PARAMETER: no track {}", index)));
        }
        state.calls.push("select_track".to_string());
        state.selected.insert(kind, index);
        Ok(())
    }

    fn set_subtitles_hidden(&self, hidden: bool) {
        self.state.lock().subtitles_hidden = hidden;
    }
}
