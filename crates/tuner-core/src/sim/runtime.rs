//! Simulated native runtime

use super::{ElementScript, SimAdaptiveLibrary, SimConstrainedPlayer, SimMediaElement, SimSegmentLibrary};
use crate::native::{AdaptiveLibrary, ConstrainedPlayer, MediaElement, NativeRuntime, SegmentLibrary};
use crate::time::Timer;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Runtime handing out simulated native handles
///
/// Every element it creates follows the configured [`ElementScript`].
pub struct SimRuntime {
    adaptive: Option<Arc<SimAdaptiveLibrary>>,
    segment: Option<Arc<SimSegmentLibrary>>,
    player: Option<Arc<SimConstrainedPlayer>>,
    element_script: ElementScript,
    elements: Mutex<Vec<Arc<SimMediaElement>>>,
}

impl SimRuntime {
    /// Desktop-like runtime: both streaming libraries, no embedded player
    pub fn general() -> Self {
        Self {
            adaptive: Some(Arc::new(SimAdaptiveLibrary::new())),
            segment: Some(Arc::new(SimSegmentLibrary::new())),
            player: None,
            element_script: ElementScript::Succeed,
            elements: Mutex::new(Vec::new()),
        }
    }

    /// Television runtime: only the embedded player
    pub fn embedded() -> Self {
        Self {
            adaptive: None,
            segment: None,
            player: Some(Arc::new(SimConstrainedPlayer::new())),
            element_script: ElementScript::Succeed,
            elements: Mutex::new(Vec::new()),
        }
    }

    pub fn with_adaptive(mut self, library: Option<Arc<SimAdaptiveLibrary>>) -> Self {
        self.adaptive = library;
        self
    }

    pub fn with_segment(mut self, library: Option<Arc<SimSegmentLibrary>>) -> Self {
        self.segment = library;
        self
    }

    pub fn with_player(mut self, player: Option<Arc<SimConstrainedPlayer>>) -> Self {
        self.player = player;
        self
    }

    pub fn with_element_script(mut self, script: ElementScript) -> Self {
        self.element_script = script;
        self
    }

    pub fn adaptive(&self) -> Option<Arc<SimAdaptiveLibrary>> {
        self.adaptive.clone()
    }

    pub fn segment(&self) -> Option<Arc<SimSegmentLibrary>> {
        self.segment.clone()
    }

    pub fn player(&self) -> Option<Arc<SimConstrainedPlayer>> {
        self.player.clone()
    }

    /// Elements created so far, oldest first
    pub fn elements(&self) -> Vec<Arc<SimMediaElement>> {
        self.elements.lock().clone()
    }
}

impl NativeRuntime for SimRuntime {
    fn create_media_element(&self) -> Arc<dyn MediaElement> {
        let element = Arc::new(SimMediaElement::new().with_script(self.element_script));
        self.elements.lock().push(Arc::clone(&element));
        element
    }

    fn adaptive_library(&self) -> Option<Arc<dyn AdaptiveLibrary>> {
        self.adaptive
            .clone()
            .map(|library| library as Arc<dyn AdaptiveLibrary>)
    }

    fn segment_library(&self) -> Option<Arc<dyn SegmentLibrary>> {
        self.segment
            .clone()
            .map(|library| library as Arc<dyn SegmentLibrary>)
    }

    fn constrained_player(&self) -> Option<Arc<dyn ConstrainedPlayer>> {
        self.player
            .clone()
            .map(|player| player as Arc<dyn ConstrainedPlayer>)
    }
}

impl std::fmt::Debug for SimRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRuntime")
            .field("adaptive", &self.adaptive.is_some())
            .field("segment", &self.segment.is_some())
            .field("player", &self.player.is_some())
            .field("element_script", &self.element_script)
            .field("elements", &self.elements.lock().len())
            .finish()
    }
}

/// Timer that records requested delays and returns immediately
#[derive(Debug, Default)]
pub struct RecordingTimer {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }

    pub fn total(&self) -> Duration {
        self.delays.lock().iter().sum()
    }
}

#[async_trait]
impl Timer for RecordingTimer {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
        tokio::task::yield_now().await;
    }
}
