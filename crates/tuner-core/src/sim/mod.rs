//! Simulated native backends
//!
//! In-process stand-ins for every native seam: a scriptable media element,
//! both streaming libraries, the embedded player and a runtime that hands them
//! out. They back the test suites and the CLI's `simulate` command, and let a
//! fault be injected at any point of a load.

mod element;
mod library;
mod player;
mod runtime;

pub use element::{ElementScript, SimMediaElement};
pub use library::{SimAdaptiveLibrary, SimSegmentLibrary};
pub use player::SimConstrainedPlayer;
pub use runtime::{RecordingTimer, SimRuntime};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::*;
    use crate::time::Timer;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_element_reports_metadata() {
        let element = SimMediaElement::new().with_media_duration(42.0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        element.set_listener(Some(Arc::new(move |signal: MediaSignal| sink.lock().push(signal))));

        element.set_source(Some("http://cdn/a.mp4"));
        assert_eq!(
            seen.lock().as_slice(),
            &[MediaSignal::DurationChange(42.0), MediaSignal::LoadedMetadata]
        );
        assert_eq!(element.duration(), 42.0);

        element.set_source(None);
        assert!(element.duration().is_nan());
    }

    #[test]
    fn test_element_scripted_fault() {
        let element = SimMediaElement::new().with_script(ElementScript::Fail(NativeFaultCode::Network));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        element.set_listener(Some(Arc::new(move |signal: MediaSignal| sink.lock().push(signal))));

        element.set_source(Some("http://cdn/a.mp4"));
        let seen = seen.lock();
        assert!(matches!(&seen[..], [MediaSignal::Error(fault)] if fault.code == NativeFaultCode::Network));
    }

    #[test]
    fn test_player_enforces_native_states() {
        let player = SimConstrainedPlayer::new();
        assert!(player.play().is_err());

        player.open("http://tv/live").unwrap();
        player.prepare_async(Box::new(|result: Result<(), PlayerFault>| assert!(result.is_ok())));
        assert_eq!(player.state(), NativePlayerState::Ready);
        assert!(player.pause().is_err());

        player.play().unwrap();
        player.pause().unwrap();
        player.stop().unwrap();
        assert_eq!(player.state(), NativePlayerState::Idle);
        assert_eq!(player.calls(), vec!["open", "prepare", "play", "pause", "stop"]);
    }

    #[test]
    fn test_segment_levels_lock_and_release() {
        let level = Level {
            width: 1280,
            height: 720,
            bitrate: 2_500_000,
            codec: None,
            name: None,
        };
        let library = SimSegmentLibrary::new().with_levels(vec![level.clone(), level]);
        assert!(library.auto_level_enabled());

        library.set_current_level(Some(1));
        assert_eq!(library.current_level(), Some(1));
        assert!(!library.auto_level_enabled());

        library.set_current_level(Some(7));
        assert!(library.auto_level_enabled());
    }

    #[tokio::test]
    async fn test_adaptive_queued_faults() {
        let library = SimAdaptiveLibrary::new();
        library.fail_next_load(LibraryFault::new(FaultCategory::Network, 1001, "timeout", false));

        assert!(library.load("http://cdn/a.mpd").await.is_err());
        assert!(library.load("http://cdn/a.mpd").await.is_ok());
        assert_eq!(library.load_count(), 2);
        assert_eq!(library.loaded_url().as_deref(), Some("http://cdn/a.mpd"));
    }

    #[tokio::test]
    async fn test_recording_timer() {
        let timer = RecordingTimer::new();
        timer.sleep(Duration::from_secs(1)).await;
        timer.sleep(Duration::from_secs(2)).await;
        assert_eq!(timer.delays().len(), 2);
        assert_eq!(timer.total(), Duration::from_secs(3));
    }
}
