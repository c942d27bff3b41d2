//! Engine event catalog and the per-engine publish/subscribe channel
//!
//! Listeners are invoked synchronously, in emission order, on the thread that
//! caused the event. No engine lock is held while a listener runs, so listeners
//! may call back into the engine.

use crate::error::Error;
use crate::types::PlaybackState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

/// Event names, used to (un)register listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    StateChange,
    TimeUpdate,
    DurationChange,
    VolumeChange,
    QualityChange,
    Buffering,
    Error,
    Ended,
}

impl EventType {
    pub const ALL: [EventType; 8] = [
        EventType::StateChange,
        EventType::TimeUpdate,
        EventType::DurationChange,
        EventType::VolumeChange,
        EventType::QualityChange,
        EventType::Buffering,
        EventType::Error,
        EventType::Ended,
    ];
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::StateChange => write!(f, "statechange"),
            EventType::TimeUpdate => write!(f, "timeupdate"),
            EventType::DurationChange => write!(f, "durationchange"),
            EventType::VolumeChange => write!(f, "volumechange"),
            EventType::QualityChange => write!(f, "qualitychange"),
            EventType::Buffering => write!(f, "buffering"),
            EventType::Error => write!(f, "error"),
            EventType::Ended => write!(f, "ended"),
        }
    }
}

/// Events emitted by every engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlayerEvent {
    StateChange {
        state: PlaybackState,
    },
    TimeUpdate {
        current_time: f64,
    },
    DurationChange {
        duration: f64,
    },
    VolumeChange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        volume: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        muted: Option<bool>,
    },
    QualityChange {
        quality_id: String,
    },
    Buffering {
        buffering: bool,
    },
    Error {
        error: Error,
    },
    Ended {},
}

impl PlayerEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            PlayerEvent::StateChange { .. } => EventType::StateChange,
            PlayerEvent::TimeUpdate { .. } => EventType::TimeUpdate,
            PlayerEvent::DurationChange { .. } => EventType::DurationChange,
            PlayerEvent::VolumeChange { .. } => EventType::VolumeChange,
            PlayerEvent::QualityChange { .. } => EventType::QualityChange,
            PlayerEvent::Buffering { .. } => EventType::Buffering,
            PlayerEvent::Error { .. } => EventType::Error,
            PlayerEvent::Ended {} => EventType::Ended,
        }
    }
}

/// Event listener callback
pub type Listener = Arc<dyn Fn(&PlayerEvent) + Send + Sync>;

/// Handle returned by `on`, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Typed publish/subscribe channel owned by one engine
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<HashMap<EventType, Vec<(ListenerId, Listener)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event type
    pub fn on(&self, event_type: EventType, listener: Listener) -> ListenerId {
        let id = ListenerId::new();
        self.listeners
            .lock()
            .entry(event_type)
            .or_default()
            .push((id, listener));
        id
    }

    /// Unregister a listener; returns false if it was not registered
    pub fn off(&self, event_type: EventType, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(entries) = listeners.get_mut(&event_type) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        before != entries.len()
    }

    /// Deliver an event to every listener of its type
    pub fn emit(&self, event: &PlayerEvent) {
        let targets: Vec<Listener> = match self.listeners.lock().get(&event.event_type()) {
            Some(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return,
        };

        trace!(event = %event.event_type(), listeners = targets.len(), "Dispatching event");
        for listener in targets {
            listener(event);
        }
    }

    pub fn listener_count(&self, event_type: EventType) -> usize {
        self.listeners
            .lock()
            .get(&event_type)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Detach every listener
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<EventType, usize> = self
            .listeners
            .lock()
            .iter()
            .map(|(ty, entries)| (*ty, entries.len()))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}
