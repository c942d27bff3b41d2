//! Playback Session - drives one stream through selection, loading and recovery
//!
//! Coordinates:
//! - Engine selection and initialization
//! - Load failures routed through the recovery coordinator
//! - Fallback to the next engine kind when a format is rejected
//! - Listener re-attachment across engine swaps

use crate::{
    config::TunerConfig,
    engine::PlaybackEngine,
    events::{EventType, Listener},
    fault::RecoveryAction,
    native::NativeRuntime,
    recovery::RecoveryCoordinator,
    selector::{EngineSelector, SelectorOptions},
    types::*,
    Error, Result,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// How `open` ended when it did not fail
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SessionOutcome {
    /// A stream is loaded on this engine
    Playing { engine: EngineKind },
    /// The stream was given up on; the caller moves to the next one
    Skipped { error: Error },
}

/// Playback of one stream at a time, with recovery
pub struct PlaybackSession {
    selector: EngineSelector,
    coordinator: Arc<RecoveryCoordinator>,
    options: SelectorOptions,
    config: EngineConfig,
    engine: Option<Box<dyn PlaybackEngine>>,
    listeners: Vec<(EventType, Listener)>,
    context_id: Option<String>,
}

impl PlaybackSession {
    pub fn new(
        selector: EngineSelector,
        coordinator: Arc<RecoveryCoordinator>,
        options: SelectorOptions,
        config: EngineConfig,
    ) -> Self {
        Self {
            selector,
            coordinator,
            options,
            config,
            engine: None,
            listeners: Vec::new(),
            context_id: None,
        }
    }

    /// Session over a runtime with its own coordinator
    pub fn from_config(runtime: Arc<dyn NativeRuntime>, config: &TunerConfig) -> Self {
        Self::new(
            EngineSelector::new(runtime),
            Arc::new(RecoveryCoordinator::new(config.recovery.clone())),
            config.selector_options(),
            config.engine.clone(),
        )
    }

    /// Current engine, if a stream is open
    pub fn engine(&self) -> Option<&dyn PlaybackEngine> {
        self.engine.as_deref()
    }

    pub fn coordinator(&self) -> &Arc<RecoveryCoordinator> {
        &self.coordinator
    }

    /// Register a listener on the current engine and on every future one
    pub fn on(&mut self, event_type: EventType, listener: Listener) -> Result<()> {
        if let Some(engine) = &self.engine {
            engine.on(event_type, Arc::clone(&listener))?;
        }
        self.listeners.push((event_type, listener));
        Ok(())
    }

    async fn prepare(&self, engine: Box<dyn PlaybackEngine>) -> Result<Box<dyn PlaybackEngine>> {
        engine.initialize(self.config.clone()).await?;
        for (event_type, listener) in &self.listeners {
            engine.on(*event_type, Arc::clone(listener))?;
        }
        Ok(engine)
    }

    /// Create, initialize and load an engine, recovering from load failures
    #[instrument(skip(self, stream), fields(url = %stream.url()))]
    pub async fn open(&mut self, context_id: &str, stream: &StreamDescriptor) -> Result<SessionOutcome> {
        self.close();
        self.context_id = Some(context_id.to_string());

        let mut engine = self
            .prepare(self.selector.create_engine(stream, &self.options)?)
            .await?;
        let first = engine.load(stream).await;
        let mut last_error = match first {
            Ok(()) => return Ok(self.playing(engine)),
            Err(e) => e,
        };

        loop {
            let failure: Mutex<Option<Error>> = Mutex::new(None);
            let outcome = self
                .coordinator
                .recover(&last_error, context_id, || async {
                    engine.load(stream).await.map_err(|e| {
                        *failure.lock() = Some(e.clone());
                        e
                    })
                })
                .await;
            if let Some(e) = failure.into_inner() {
                last_error = e;
            }

            match outcome.action {
                RecoveryAction::Retry if outcome.success => return Ok(self.playing(engine)),
                RecoveryAction::Retry => {}
                RecoveryAction::Skip => {
                    engine.destroy();
                    self.coordinator.clear(context_id);
                    info!(context_id, code = %last_error.code, "Stream skipped");
                    return Ok(SessionOutcome::Skipped { error: last_error });
                }
                RecoveryAction::Fallback => {
                    let failed = engine.kind();
                    engine.destroy();
                    let stream_type = stream.effective_type();
                    let Some(next) = EngineSelector::fallback_for_stream(failed, stream_type) else {
                        warn!(context_id, engine = %failed, %stream_type, "No fallback engine left");
                        return Err(last_error);
                    };
                    info!(context_id, from = %failed, to = %next, "Falling back to next engine");

                    engine = self.prepare(self.selector.create_engine_of_kind(next)?).await?;
                    let reloaded = engine.load(stream).await;
                    match reloaded {
                        Ok(()) => return Ok(self.playing(engine)),
                        Err(e) => last_error = e,
                    }
                }
                RecoveryAction::Fail => {
                    engine.destroy();
                    warn!(context_id, code = %last_error.code, "Stream failed");
                    return Err(last_error);
                }
            }
        }
    }

    fn playing(&mut self, engine: Box<dyn PlaybackEngine>) -> SessionOutcome {
        let kind = engine.kind();
        info!(engine = %kind, "Stream open");
        self.engine = Some(engine);
        SessionOutcome::Playing { engine: kind }
    }

    /// Destroy the engine and forget the context's retry state
    pub fn close(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.destroy();
        }
        if let Some(context_id) = self.context_id.take() {
            self.coordinator.clear(&context_id);
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("options", &self.options)
            .field("engine", &self.engine.as_ref().map(|engine| engine.kind()))
            .field("context_id", &self.context_id)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{codes, ErrorKind};
    use crate::native::{FaultCategory, LibraryFault, NativeFaultCode};
    use crate::recovery::RecoveryConfig;
    use crate::sim::{ElementScript, RecordingTimer, SimAdaptiveLibrary, SimRuntime, SimSegmentLibrary};
    use crate::time::SystemClock;

    fn session(runtime: SimRuntime, timer: Arc<RecordingTimer>) -> PlaybackSession {
        let coordinator = RecoveryCoordinator::with_time(RecoveryConfig::default(), timer, Arc::new(SystemClock));
        PlaybackSession::new(
            EngineSelector::new(Arc::new(runtime)),
            Arc::new(coordinator),
            SelectorOptions::default(),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_open_first_try() {
        let mut session = session(SimRuntime::general(), Arc::new(RecordingTimer::new()));
        let outcome = session.open("ch-1", &"http://cdn/movie.mp4".into()).await.unwrap();

        assert_eq!(outcome, SessionOutcome::Playing { engine: EngineKind::Progressive });
        assert_eq!(session.engine().unwrap().state().unwrap(), PlaybackState::Paused);
    }

    #[tokio::test]
    async fn test_network_fault_retried_on_same_engine() {
        let library = Arc::new(SimAdaptiveLibrary::new());
        library.fail_next_load(LibraryFault::new(FaultCategory::Network, 1001, "timeout fetching playlist", false));
        let timer = Arc::new(RecordingTimer::new());
        let mut session = session(SimRuntime::general().with_adaptive(Some(library.clone())), timer.clone());

        let outcome = session.open("ch-1", &"http://cdn/live.m3u8".into()).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Playing { engine: EngineKind::Adaptive });
        assert_eq!(library.load_count(), 2);
        assert_eq!(timer.delays().len(), 1);
        assert!(!session.coordinator().is_retrying("ch-1"));
    }

    #[tokio::test]
    async fn test_manifest_rejection_falls_back() {
        let library = Arc::new(SimAdaptiveLibrary::new());
        library.fail_next_load(LibraryFault::new(FaultCategory::Manifest, 4000, "unsupported manifest", false));
        let mut session = session(
            SimRuntime::general().with_adaptive(Some(library)),
            Arc::new(RecordingTimer::new()),
        );

        let outcome = session.open("ch-1", &"http://cdn/live.m3u8".into()).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Playing { engine: EngineKind::SegmentOnly });
    }

    #[tokio::test]
    async fn test_dash_manifest_rejection_has_no_fallback() {
        let library = Arc::new(SimAdaptiveLibrary::new());
        library.fail_next_load(LibraryFault::new(FaultCategory::Manifest, 4000, "unsupported manifest", false));
        let mut session = session(
            SimRuntime::general().with_adaptive(Some(library.clone())),
            Arc::new(RecordingTimer::new()),
        );

        let err = session.open("ch-1", &"http://cdn/manifest.mpd".into()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedFormat);
        assert_eq!(library.load_count(), 1);
        assert!(session.engine().is_none());
    }

    #[tokio::test]
    async fn test_hls_rejected_by_every_segment_engine_fails() {
        let adaptive = Arc::new(SimAdaptiveLibrary::new());
        adaptive.fail_next_load(LibraryFault::new(FaultCategory::Manifest, 4000, "unsupported manifest", false));
        let segment = Arc::new(SimSegmentLibrary::new());
        segment.fail_next_load(LibraryFault::new(FaultCategory::Manifest, 4000, "unsupported manifest", false));
        let mut session = session(
            SimRuntime::general()
                .with_adaptive(Some(adaptive))
                .with_segment(Some(segment.clone())),
            Arc::new(RecordingTimer::new()),
        );

        let err = session.open("ch-1", &"http://cdn/live.m3u8".into()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedFormat);
        assert_eq!(segment.load_count(), 1);
        assert!(session.engine().is_none());
    }

    #[tokio::test]
    async fn test_fatal_fault_fails_without_retry() {
        let runtime = SimRuntime::general().with_element_script(ElementScript::Fail(NativeFaultCode::Decode));
        let timer = Arc::new(RecordingTimer::new());
        let mut session = session(runtime, timer.clone());

        let err = session.open("ch-1", &"http://cdn/movie.mp4".into()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Media);
        assert_eq!(err.code, codes::DECODE);
        assert!(timer.delays().is_empty());
        assert!(session.engine().is_none());
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail() {
        let runtime = SimRuntime::general().with_element_script(ElementScript::Fail(NativeFaultCode::Network));
        let timer = Arc::new(RecordingTimer::new());
        let mut session = session(runtime, timer.clone());

        let err = session.open("ch-1", &"http://cdn/movie.mp4".into()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
        assert_eq!(timer.delays().len(), 3);
        assert!(!session.coordinator().is_retrying("ch-1"));
    }

    #[tokio::test]
    async fn test_listeners_follow_fallback_engine() {
        let library = Arc::new(SimAdaptiveLibrary::new());
        library.fail_next_load(LibraryFault::new(FaultCategory::Manifest, 4000, "unsupported manifest", false));
        let mut session = session(
            SimRuntime::general().with_adaptive(Some(library)),
            Arc::new(RecordingTimer::new()),
        );

        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);
        session
            .on(
                EventType::StateChange,
                Arc::new(move |event: &crate::events::PlayerEvent| sink.lock().push(event.clone())),
            )
            .unwrap();

        session.open("ch-1", &"http://cdn/live.m3u8".into()).await.unwrap();
        assert_eq!(session.engine().unwrap().kind(), EngineKind::SegmentOnly);
        assert!(states.lock().contains(&crate::events::PlayerEvent::StateChange {
            state: PlaybackState::Paused
        }));
    }
}
