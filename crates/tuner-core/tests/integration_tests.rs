//! Integration tests for Tuner Core

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use tuner_core::error::codes;
use tuner_core::fault::{classify_library_fault, classify_native_fault, classify_player_fault};
use tuner_core::native::{
    ConstrainedPlayer, FaultCategory, LibraryFault, MediaElement, NativeFaultCode, PlayerFault,
};
use tuner_core::sim::{
    ElementScript, RecordingTimer, SimAdaptiveLibrary, SimConstrainedPlayer, SimMediaElement, SimRuntime,
};
use tuner_core::time::{SystemClock, TokioTimer};
use tuner_core::{
    detect_stream_type, EmbeddedEngine, EngineConfig, EngineKind, EngineSelector, Error, ErrorKind,
    EventType, Listener, PlaybackEngine, PlaybackSession, PlaybackState, PlayerEvent, Platform,
    ProgressiveEngine, RecoveryAction, RecoveryConfig, RecoveryCoordinator, RecoveryOutcome, SelectorOptions,
    SessionOutcome, StreamType, TunerConfig,
};

fn recorder() -> (Listener, Arc<Mutex<Vec<PlayerEvent>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (Arc::new(move |event: &PlayerEvent| sink.lock().push(event.clone())), seen)
}

fn coordinator(timer: Arc<RecordingTimer>) -> RecoveryCoordinator {
    RecoveryCoordinator::with_time(RecoveryConfig::default(), timer, Arc::new(SystemClock))
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_operations_before_initialize_are_rejected() {
    let element = Arc::new(SimMediaElement::new());
    let engine = ProgressiveEngine::new(element.clone());
    let (listener, _) = recorder();

    assert!(engine.play().await.unwrap_err().is_invalid_state());
    assert!(engine.load(&"http://cdn/a.mp4".into()).await.unwrap_err().is_invalid_state());
    assert!(engine.pause().unwrap_err().is_invalid_state());
    assert!(engine.set_volume(0.5).unwrap_err().is_invalid_state());
    assert!(engine.on(EventType::StateChange, listener).unwrap_err().is_invalid_state());

    // No native side effects
    assert!(element.source().is_none());
    assert!(!element.is_attached());
    assert!(!element.has_listener());
}

#[tokio::test]
async fn test_initialize_only_once() {
    let engine = ProgressiveEngine::new(Arc::new(SimMediaElement::new()));
    assert_ok!(engine.initialize(EngineConfig::default()).await);

    let err = assert_err!(engine.initialize(EngineConfig::default()).await);
    assert!(err.is_invalid_state());
}

#[tokio::test]
async fn test_double_destroy_is_harmless() {
    let element = Arc::new(SimMediaElement::new());
    let engine = ProgressiveEngine::new(element.clone());
    engine.initialize(EngineConfig::default()).await.unwrap();
    engine.load(&"http://cdn/a.mp4".into()).await.unwrap();

    engine.destroy();
    assert!(!engine.is_initialized());
    engine.destroy();
    assert!(!engine.is_initialized());

    assert!(!element.is_attached());
    assert!(element.source().is_none());
    assert!(engine.state().unwrap_err().is_invalid_state());
}

#[tokio::test]
async fn test_no_events_after_destroy() {
    let element = Arc::new(SimMediaElement::new());
    let engine = ProgressiveEngine::new(element.clone());
    engine.initialize(EngineConfig::default()).await.unwrap();
    let (listener, seen) = recorder();
    engine.on(EventType::Ended, listener).unwrap();

    engine.destroy();
    element.emit(tuner_core::native::MediaSignal::Ended);
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn test_volume_clamped_with_one_event_each() {
    let engine = ProgressiveEngine::new(Arc::new(SimMediaElement::new()));
    engine.initialize(EngineConfig::default()).await.unwrap();
    let (listener, seen) = recorder();
    engine.on(EventType::VolumeChange, listener).unwrap();

    engine.set_volume(1.7).unwrap();
    assert_eq!(engine.volume().unwrap(), 1.0);
    engine.set_volume(-0.2).unwrap();
    assert_eq!(engine.volume().unwrap(), 0.0);

    assert_eq!(
        seen.lock().as_slice(),
        &[
            PlayerEvent::VolumeChange { volume: Some(1.0), muted: None },
            PlayerEvent::VolumeChange { volume: Some(0.0), muted: None },
        ]
    );
}

#[tokio::test]
async fn test_state_changes_arrive_in_order() {
    let engine = ProgressiveEngine::new(Arc::new(SimMediaElement::new()));
    engine.initialize(EngineConfig::default()).await.unwrap();
    let (listener, seen) = recorder();
    engine.on(EventType::StateChange, listener).unwrap();

    engine.load(&"http://cdn/a.mp4".into()).await.unwrap();
    engine.play().await.unwrap();

    let states: Vec<PlaybackState> = seen
        .lock()
        .iter()
        .filter_map(|event| match event {
            PlayerEvent::StateChange { state } => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![PlaybackState::Loading, PlaybackState::Paused, PlaybackState::Playing]
    );
}

// =============================================================================
// Selection Tests
// =============================================================================

#[test]
fn test_stream_type_detection() {
    assert_eq!(detect_stream_type("http://x/live/index.m3u8"), StreamType::Hls);
    assert_eq!(detect_stream_type("http://x/vod/manifest.mpd"), StreamType::Dash);
    assert_eq!(detect_stream_type("http://x/movie.mp4"), StreamType::Progressive);
    assert_eq!(detect_stream_type("http://x/channel/7"), StreamType::Hls);
}

#[test]
fn test_embedded_platform_always_gets_embedded_engine() {
    let selector = EngineSelector::new(Arc::new(SimRuntime::embedded()));
    let options = SelectorOptions::new(Platform::Embedded);

    for url in ["http://x/live.m3u8", "http://x/movie.mp4", "http://x/channel/7"] {
        let engine = selector.create_engine(&url.into(), &options).unwrap();
        assert_eq!(engine.kind(), EngineKind::Embedded);
    }
}

// =============================================================================
// Fault Classification Tests
// =============================================================================

#[test]
fn test_decode_fault_is_fatal_media() {
    let err = classify_native_fault(NativeFaultCode::Decode);
    assert_eq!(err.kind, ErrorKind::Media);
    assert!(err.fatal);
    assert_eq!(tuner_core::recovery_action(&err), RecoveryAction::Fail);
}

#[test]
fn test_library_faults_map_to_taxonomy() {
    let drm = classify_library_fault(&LibraryFault::new(FaultCategory::Drm, 6007, "license", false));
    assert_eq!(drm.kind, ErrorKind::Drm);
    assert!(drm.fatal);

    let manifest = classify_library_fault(&LibraryFault::new(FaultCategory::Manifest, 4000, "bad", false));
    assert_eq!(tuner_core::recovery_action(&manifest), RecoveryAction::Fallback);
}

#[test]
fn test_undecodable_audio_is_skipped() {
    let err = classify_player_fault(&PlayerFault::new("PLAYER_ERROR_NOT_SUPPORTED: Dolby Digital"));
    assert_eq!(err.kind, ErrorKind::UnsupportedAudio);
    assert_eq!(tuner_core::recovery_action(&err), RecoveryAction::Skip);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[tokio::test]
async fn test_backoff_sequence() {
    let timer = Arc::new(RecordingTimer::new());
    let coordinator = coordinator(timer.clone());
    let error = Error::new(ErrorKind::Network, codes::NETWORK, "reset");

    let mut outcomes = Vec::new();
    for _ in 0..3 {
        outcomes.push(
            coordinator
                .recover(&error, "ch-9", || async { Err(error.clone()) })
                .await,
        );
    }

    assert_eq!(
        outcomes,
        vec![
            RecoveryOutcome { success: false, action: RecoveryAction::Retry, next_attempt: Some(2) },
            RecoveryOutcome { success: false, action: RecoveryAction::Retry, next_attempt: Some(3) },
            RecoveryOutcome { success: false, action: RecoveryAction::Fail, next_attempt: None },
        ]
    );

    assert_eq!(
        timer.delays(),
        vec![
            Duration::from_millis(1000),
            Duration::from_millis(2000),
            Duration::from_millis(4000),
        ]
    );
    assert!(!coordinator.is_retrying("ch-9"));

    let outcome = coordinator
        .recover(&error, "ch-9", || async { Err(error.clone()) })
        .await;
    assert_eq!(outcome.action, RecoveryAction::Retry);
}

#[tokio::test]
async fn test_drm_fails_without_retry_state() {
    let timer = Arc::new(RecordingTimer::new());
    let coordinator = coordinator(timer.clone());
    let error = Error::new(ErrorKind::Drm, codes::DRM, "license denied").with_fatal(true);

    let outcome = coordinator.recover(&error, "ch-1", || async { Ok(()) }).await;
    assert_eq!(outcome.action, RecoveryAction::Fail);
    assert!(!outcome.success);
    assert!(coordinator.retry_state("ch-1").is_none());
    assert!(timer.delays().is_empty());
}

#[tokio::test]
async fn test_unsupported_audio_skips_without_retry_state() {
    let timer = Arc::new(RecordingTimer::new());
    let coordinator = coordinator(timer.clone());
    let error = Error::new(ErrorKind::UnsupportedAudio, codes::UNSUPPORTED_AUDIO, "ac3");

    let outcome = coordinator.recover(&error, "ch-1", || async { Ok(()) }).await;
    assert_eq!(outcome.action, RecoveryAction::Skip);
    assert!(outcome.success);
    assert!(coordinator.retry_state("ch-1").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_backoff_waits_on_runtime_clock() {
    let coordinator = RecoveryCoordinator::with_time(
        RecoveryConfig::default(),
        Arc::new(TokioTimer),
        Arc::new(SystemClock),
    );
    let error = Error::new(ErrorKind::Timeout, codes::TIMEOUT, "slow origin");
    let start = tokio::time::Instant::now();

    let first = coordinator.recover(&error, "ch-2", || async { Err(error.clone()) }).await;
    assert_eq!(first.next_attempt, Some(2));
    let second = coordinator.recover(&error, "ch-2", || async { Ok(()) }).await;
    assert!(second.success);

    assert!(start.elapsed() >= Duration::from_millis(3000));
    assert!(!coordinator.is_retrying("ch-2"));
}

#[tokio::test]
async fn test_independent_coordinators() {
    let first = coordinator(Arc::new(RecordingTimer::new()));
    let second = coordinator(Arc::new(RecordingTimer::new()));
    let error = Error::new(ErrorKind::Network, codes::NETWORK, "reset");

    first.recover(&error, "ch-1", || async { Err(error.clone()) }).await;
    assert_eq!(first.attempts("ch-1"), 1);
    assert_eq!(second.attempts("ch-1"), 0);
}

// =============================================================================
// Embedded Engine Tests
// =============================================================================

#[tokio::test]
async fn test_embedded_play_in_idle_never_reaches_native() {
    let player = Arc::new(SimConstrainedPlayer::new());
    let engine = EmbeddedEngine::new(player.clone());
    engine.initialize(EngineConfig::default()).await.unwrap();
    engine.load(&"http://tv/live.m3u8".into()).await.unwrap();
    engine.play().await.unwrap();
    engine.stop().unwrap();
    assert_eq!(player.state(), tuner_core::native::NativePlayerState::Idle);

    let plays_before = player.calls().iter().filter(|call| *call == "play").count();
    let err = assert_err!(engine.play().await);
    assert!(err.is_invalid_state());
    assert_eq!(
        player.calls().iter().filter(|call| *call == "play").count(),
        plays_before
    );
}

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_session_from_config() {
    let config = TunerConfig::from_json_str(r#"{ "recovery": { "max_attempts": 1 } }"#).unwrap();
    let runtime = SimRuntime::general().with_element_script(ElementScript::Fail(NativeFaultCode::Network));
    let mut session = PlaybackSession::from_config(Arc::new(runtime), &config);

    let err = session.open("ch-1", &"http://cdn/movie.mp4".into()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Network);
    assert!(!session.coordinator().is_retrying("ch-1"));
}

#[tokio::test]
async fn test_session_skips_undecodable_audio_channel() {
    let player = Arc::new(SimConstrainedPlayer::new());
    player.fail_next_prepare(PlayerFault::new("PLAYER_ERROR_NOT_SUPPORTED_AUDIO_CODEC"));
    let runtime = SimRuntime::embedded().with_player(Some(player));
    let timer = Arc::new(RecordingTimer::new());
    let mut session = PlaybackSession::new(
        EngineSelector::new(Arc::new(runtime)),
        Arc::new(coordinator(timer.clone())),
        SelectorOptions::new(Platform::Embedded),
        EngineConfig::default(),
    );

    let outcome = session.open("ch-5", &"http://tv/ch5.m3u8".into()).await.unwrap();
    let SessionOutcome::Skipped { error } = outcome else {
        panic!("expected skip, got {:?}", outcome);
    };
    assert_eq!(error.kind, ErrorKind::UnsupportedAudio);
    assert!(timer.delays().is_empty());
    assert!(session.engine().is_none());
}

#[tokio::test]
async fn test_session_falls_back_from_adaptive() {
    let library = Arc::new(SimAdaptiveLibrary::new());
    library.fail_next_load(LibraryFault::new(FaultCategory::Manifest, 4001, "no playable variant", false));
    let runtime = Arc::new(SimRuntime::general().with_adaptive(Some(library.clone())));
    let mut session = PlaybackSession::new(
        EngineSelector::new(runtime.clone()),
        Arc::new(coordinator(Arc::new(RecordingTimer::new()))),
        SelectorOptions::default(),
        EngineConfig::default(),
    );

    let outcome = session.open("ch-3", &"http://cdn/live.m3u8".into()).await.unwrap();
    assert_eq!(outcome, SessionOutcome::Playing { engine: EngineKind::SegmentOnly });
    assert_eq!(library.load_count(), 1);
    assert!(runtime.elements().last().is_some());

    session.close();
    assert!(session.engine().is_none());
}

// =============================================================================
// Serialization Tests
// =============================================================================

#[test]
fn test_event_json_shape() {
    let event = PlayerEvent::StateChange { state: PlaybackState::Buffering };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "statechange");

    let event = PlayerEvent::Error {
        error: classify_native_fault(NativeFaultCode::Network),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["error"]["kind"], "network");
    assert_eq!(json["error"]["code"], "NETWORK");
    assert_eq!(json["error"]["fatal"], false);
}

#[test]
fn test_element_play_outside_runtime() {
    let element = SimMediaElement::new();
    assert_ok!(tokio_test::block_on(element.play()));
    assert!(!element.is_paused());
}
