//! State shared by every concrete engine
//!
//! Centralizes the lifecycle guard, the contract-level playback state, local
//! volume/mute bookkeeping and event emission, so the four engines behave the
//! same at the contract boundary.

use crate::error::{Error, Result};
use crate::events::{EventBus, EventType, Listener, ListenerId, PlayerEvent};
use crate::types::*;
use parking_lot::Mutex;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Initializing,
    Initialized,
    Destroyed,
}

#[derive(Debug)]
struct CoreState {
    lifecycle: Lifecycle,
    state: PlaybackState,
    volume: f64,
    muted: bool,
    config: EngineConfig,
    stream: Option<StreamDescriptor>,
    load_started: Option<Instant>,
    load_time: f64,
}

#[derive(Debug)]
pub(crate) struct EngineCore {
    id: EngineId,
    kind: EngineKind,
    inner: Mutex<CoreState>,
    bus: EventBus,
}

/// Clamp to [0, 1]; NaN becomes 0
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

impl EngineCore {
    pub fn new(kind: EngineKind) -> Self {
        Self {
            id: EngineId::new(),
            kind,
            inner: Mutex::new(CoreState {
                lifecycle: Lifecycle::Created,
                state: PlaybackState::Idle,
                volume: 1.0,
                muted: false,
                config: EngineConfig::default(),
                stream: None,
                load_started: None,
                load_time: 0.0,
            }),
            bus: EventBus::new(),
        }
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    // === Lifecycle ===

    /// Claim the single initialization of this engine
    pub fn begin_initialize(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.lifecycle {
            Lifecycle::Created => {
                inner.lifecycle = Lifecycle::Initializing;
                Ok(())
            }
            Lifecycle::Initializing | Lifecycle::Initialized => {
                Err(Error::invalid_state("initialize", "initialized"))
            }
            Lifecycle::Destroyed => Err(Error::invalid_state("initialize", "destroyed")),
        }
    }

    /// Roll back a failed initialization
    pub fn abort_initialize(&self) {
        let mut inner = self.inner.lock();
        if inner.lifecycle == Lifecycle::Initializing {
            inner.lifecycle = Lifecycle::Created;
        }
    }

    pub fn finish_initialize(&self, config: EngineConfig) {
        let mut inner = self.inner.lock();
        if inner.lifecycle != Lifecycle::Initializing {
            return;
        }
        inner.volume = clamp_unit(config.volume);
        inner.muted = config.muted;
        inner.config = config;
        inner.lifecycle = Lifecycle::Initialized;
        debug!(engine = %self.kind, id = %self.id, "Engine initialized");
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().lifecycle == Lifecycle::Initialized
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().lifecycle == Lifecycle::Destroyed
    }

    /// Lifecycle guard run at the top of every contract operation
    pub fn guard(&self, operation: &str) -> Result<()> {
        match self.inner.lock().lifecycle {
            Lifecycle::Initialized => Ok(()),
            Lifecycle::Destroyed => Err(Error::invalid_state(operation, "destroyed")),
            Lifecycle::Created | Lifecycle::Initializing => Err(Error::not_initialized(operation)),
        }
    }

    /// Mark destroyed and drop every listener; false if there was nothing to destroy
    pub fn destroy(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            match inner.lifecycle {
                Lifecycle::Initializing | Lifecycle::Initialized => {
                    inner.lifecycle = Lifecycle::Destroyed;
                    inner.stream = None;
                }
                Lifecycle::Created | Lifecycle::Destroyed => return false,
            }
        }
        self.bus.clear();
        debug!(engine = %self.kind, id = %self.id, "Engine destroyed");
        true
    }

    // === State & events ===

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    /// Move to `next` and emit `statechange`; re-entering the current state is silent
    pub fn transition(&self, next: PlaybackState) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.lifecycle == Lifecycle::Destroyed || inner.state == next {
                return false;
            }
            let previous = std::mem::replace(&mut inner.state, next);
            debug!(engine = %self.kind, from = %previous, to = %next, "State transition");
        }
        self.bus.emit(&PlayerEvent::StateChange { state: next });
        true
    }

    pub fn emit(&self, event: PlayerEvent) {
        if self.is_destroyed() {
            return;
        }
        self.bus.emit(&event);
    }

    /// Enter the error state and publish the error
    pub fn fail(&self, error: Error) {
        self.transition(PlaybackState::Error);
        self.emit(PlayerEvent::Error { error });
    }

    pub fn on(&self, event_type: EventType, listener: Listener) -> ListenerId {
        self.bus.on(event_type, listener)
    }

    pub fn off(&self, event_type: EventType, id: ListenerId) -> bool {
        self.bus.off(event_type, id)
    }

    // === Volume ===

    pub fn volume(&self) -> f64 {
        self.inner.lock().volume
    }

    pub fn muted(&self) -> bool {
        self.inner.lock().muted
    }

    /// Store the clamped volume, emit it and return it
    pub fn set_volume(&self, volume: f64) -> f64 {
        let volume = clamp_unit(volume);
        self.inner.lock().volume = volume;
        self.emit(PlayerEvent::VolumeChange {
            volume: Some(volume),
            muted: None,
        });
        volume
    }

    pub fn set_muted(&self, muted: bool) {
        self.inner.lock().muted = muted;
        self.emit(PlayerEvent::VolumeChange {
            volume: None,
            muted: Some(muted),
        });
    }

    // === Loading ===

    pub fn config(&self) -> EngineConfig {
        self.inner.lock().config.clone()
    }

    pub fn stream(&self) -> Option<StreamDescriptor> {
        self.inner.lock().stream.clone()
    }

    pub fn begin_load(&self, stream: &StreamDescriptor) {
        {
            let mut inner = self.inner.lock();
            inner.stream = Some(stream.clone());
            inner.load_started = Some(Instant::now());
        }
        self.transition(PlaybackState::Loading);
    }

    pub fn finish_load(&self) -> f64 {
        let mut inner = self.inner.lock();
        if let Some(started) = inner.load_started.take() {
            inner.load_time = started.elapsed().as_secs_f64();
        }
        inner.load_time
    }

    pub fn load_time(&self) -> f64 {
        self.inner.lock().load_time
    }

    /// Forget the loaded stream and return to idle
    pub fn unload(&self) {
        {
            let mut inner = self.inner.lock();
            inner.stream = None;
            inner.load_started = None;
        }
        self.transition(PlaybackState::Idle);
    }

    /// Settle the end of a successful load: auto-play is the caller's job
    pub fn loaded_paused(&self) {
        self.transition(PlaybackState::Paused);
    }
}

/// Bridge from a native completion callback to an awaiting `load`
#[derive(Debug, Default)]
pub(crate) struct LoadSlot {
    sender: Mutex<Option<oneshot::Sender<Result<()>>>>,
}

impl LoadSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting; a previously armed waiter is superseded
    pub fn arm(&self) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();
        *self.sender.lock() = Some(tx);
        rx
    }

    /// Complete the pending wait; false if nothing was waiting
    pub fn resolve(&self, result: Result<()>) -> bool {
        match self.sender.lock().take() {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Drop the pending wait; the waiter observes a destroyed engine
    pub fn cancel(&self) {
        self.sender.lock().take();
    }

    pub async fn wait(rx: oneshot::Receiver<Result<()>>, operation: &str) -> Result<()> {
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::invalid_state(operation, "cancelled")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn initialized() -> EngineCore {
        let core = EngineCore::new(EngineKind::Progressive);
        core.begin_initialize().unwrap();
        core.finish_initialize(EngineConfig::default());
        core
    }

    #[test]
    fn test_guard_before_initialize() {
        let core = EngineCore::new(EngineKind::Adaptive);
        let err = core.guard("play").unwrap_err();
        assert!(err.is_invalid_state());
        assert!(!core.is_initialized());
    }

    #[test]
    fn test_single_initialization() {
        let core = initialized();
        assert!(core.begin_initialize().unwrap_err().is_invalid_state());
        assert!(core.destroy());
        assert!(!core.destroy());
        assert!(core.begin_initialize().is_err());
    }

    #[test]
    fn test_volume_clamped() {
        let core = initialized();
        assert_eq!(core.set_volume(3.0), 1.0);
        assert_eq!(core.set_volume(-0.5), 0.0);
        assert_eq!(core.set_volume(f64::NAN), 0.0);
    }

    #[test]
    fn test_transition_dedup_and_silence_after_destroy() {
        let core = initialized();
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        core.on(
            EventType::StateChange,
            Arc::new(move |_: &PlayerEvent| *sink.lock() += 1),
        );

        assert!(core.transition(PlaybackState::Loading));
        assert!(!core.transition(PlaybackState::Loading));
        core.destroy();
        assert!(!core.transition(PlaybackState::Playing));
        assert_eq!(*count.lock(), 1);
    }

    #[tokio::test]
    async fn test_load_slot_cancel() {
        let slot = LoadSlot::new();
        let rx = slot.arm();
        slot.cancel();
        let err = LoadSlot::wait(rx, "load").await.unwrap_err();
        assert!(err.is_invalid_state());
        assert!(!slot.resolve(Ok(())));
    }
}
