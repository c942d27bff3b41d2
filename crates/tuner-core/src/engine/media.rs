//! Media element plumbing shared by the element-backed engines

use super::{EngineCore, LoadSlot};
use crate::error::{Error, Result};
use crate::events::PlayerEvent;
use crate::fault::{classify_library_fault, classify_media_fault};
use crate::native::{ElementTrack, LibrarySignal, MediaElement, MediaSignal, SignalHandler, TimeRange};
use crate::types::*;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Build the listener installed on a media element
///
/// With a load slot the element owns loading: `LoadedMetadata` and `Error`
/// settle the pending load. Without one a streaming library drives the
/// element and reports faults itself, so element errors are only logged.
pub(crate) fn element_handler(
    core: &Arc<EngineCore>,
    slot: Option<Arc<LoadSlot>>,
) -> SignalHandler<MediaSignal> {
    let core: Weak<EngineCore> = Arc::downgrade(core);
    Arc::new(move |signal: MediaSignal| {
        let Some(core) = core.upgrade() else {
            return;
        };
        if core.is_destroyed() {
            return;
        }
        handle_signal(&core, slot.as_deref(), signal);
    })
}

fn handle_signal(core: &EngineCore, slot: Option<&LoadSlot>, signal: MediaSignal) {
    match signal {
        MediaSignal::LoadedMetadata => {
            if let Some(slot) = slot {
                slot.resolve(Ok(()));
            }
        }
        MediaSignal::DurationChange(duration) => {
            core.emit(PlayerEvent::DurationChange { duration });
        }
        MediaSignal::TimeUpdate(current_time) => {
            core.emit(PlayerEvent::TimeUpdate { current_time });
        }
        MediaSignal::Playing => {
            if core.state() == PlaybackState::Buffering {
                core.emit(PlayerEvent::Buffering { buffering: false });
            }
            core.transition(PlaybackState::Playing);
        }
        MediaSignal::Pause => {
            if matches!(core.state(), PlaybackState::Playing | PlaybackState::Buffering) {
                core.transition(PlaybackState::Paused);
            }
        }
        MediaSignal::Waiting => {
            core.transition(PlaybackState::Buffering);
            core.emit(PlayerEvent::Buffering { buffering: true });
        }
        MediaSignal::Ended => {
            core.transition(PlaybackState::Ended);
            core.emit(PlayerEvent::Ended {});
        }
        MediaSignal::Error(fault) => {
            let Some(slot) = slot else {
                debug!(code = fault.code.as_code(), "Element fault left to the streaming library");
                return;
            };
            let error = classify_media_fault(&fault);
            if !slot.resolve(Err(error.clone())) {
                warn!(engine = %core.kind(), code = %error.code, "Media element error during playback");
                core.fail(error);
            }
        }
    }
}

/// Start playback on the element once a stream is loaded
pub(crate) async fn play_element(core: &EngineCore, element: &dyn MediaElement) -> Result<()> {
    if core.stream().is_none() {
        return Err(Error::invalid_state("play", core.state()));
    }
    if let Err(fault) = element.play().await {
        let error = classify_media_fault(&fault);
        warn!(engine = %core.kind(), code = %error.code, "Play request rejected");
        core.fail(error.clone());
        return Err(error);
    }
    core.transition(PlaybackState::Playing);
    Ok(())
}

pub(crate) fn pause_element(core: &EngineCore, element: &dyn MediaElement) {
    element.pause();
    if matches!(core.state(), PlaybackState::Playing | PlaybackState::Buffering) {
        core.transition(PlaybackState::Paused);
    }
}

/// Build the listener installed on a streaming library
///
/// Non-critical library faults are published without leaving the current
/// state; the library keeps retrying on its own.
pub(crate) fn library_handler(core: &Arc<EngineCore>) -> SignalHandler<LibrarySignal> {
    let core: Weak<EngineCore> = Arc::downgrade(core);
    Arc::new(move |signal: LibrarySignal| {
        let Some(core) = core.upgrade() else {
            return;
        };
        if core.is_destroyed() {
            return;
        }
        match signal {
            LibrarySignal::Buffering(true) => {
                core.transition(PlaybackState::Buffering);
                core.emit(PlayerEvent::Buffering { buffering: true });
            }
            LibrarySignal::Buffering(false) => {
                core.emit(PlayerEvent::Buffering { buffering: false });
                if core.state() == PlaybackState::Buffering {
                    core.transition(PlaybackState::Playing);
                }
            }
            LibrarySignal::VariantChanged(quality_id) => {
                debug!(engine = %core.kind(), quality = %quality_id, "Variant switched");
                core.emit(PlayerEvent::QualityChange { quality_id });
            }
            LibrarySignal::Error(fault) => {
                let error = classify_library_fault(&fault);
                if error.fatal {
                    warn!(engine = %core.kind(), code = %error.code, "Critical library fault");
                    core.fail(error);
                } else {
                    debug!(engine = %core.kind(), code = %error.code, "Library fault");
                    core.emit(PlayerEvent::Error { error });
                }
            }
        }
    })
}

/// First track whose language matches, ignoring case
pub(crate) fn match_language<'a, T>(
    tracks: &'a [T],
    language: &str,
    language_of: impl Fn(&T) -> &str,
) -> Option<&'a T> {
    tracks
        .iter()
        .find(|track| language_of(track).eq_ignore_ascii_case(language))
}

/// Seconds buffered ahead of `position`
pub(crate) fn buffered_ahead(ranges: &[TimeRange], position: f64) -> f64 {
    ranges
        .iter()
        .find(|range| range.contains(position))
        .map(|range| (range.end - position).max(0.0))
        .unwrap_or(0.0)
}

/// Metrics read straight off a media element
pub(crate) fn element_metrics(element: &dyn MediaElement, load_time: f64) -> PlaybackMetrics {
    let current_time = element.current_time();
    let frames = element.frame_stats().unwrap_or_default();
    PlaybackMetrics {
        current_time,
        duration: element.duration(),
        buffered_time: buffered_ahead(&element.buffered(), current_time),
        dropped_frames: frames.dropped,
        total_frames: frames.total,
        estimated_bandwidth: 0.0,
        load_time,
    }
}

fn to_audio(track: &ElementTrack) -> AudioTrack {
    AudioTrack {
        id: track.id.clone(),
        language: track.language.clone(),
        label: track.label.clone(),
        codec: None,
        channels: None,
    }
}

fn to_subtitle(track: &ElementTrack) -> SubtitleTrack {
    SubtitleTrack {
        id: track.id.clone(),
        language: track.language.clone(),
        label: track.label.clone(),
    }
}

pub(crate) fn audio_tracks(element: &dyn MediaElement) -> Vec<AudioTrack> {
    element
        .audio_tracks()
        .map(|tracks| tracks.iter().map(to_audio).collect())
        .unwrap_or_default()
}

pub(crate) fn current_audio_track(element: &dyn MediaElement) -> Option<AudioTrack> {
    element
        .audio_tracks()?
        .iter()
        .find(|track| track.enabled)
        .map(to_audio)
}

pub(crate) fn subtitle_tracks(element: &dyn MediaElement) -> Vec<SubtitleTrack> {
    element
        .text_tracks()
        .map(|tracks| tracks.iter().map(to_subtitle).collect())
        .unwrap_or_default()
}

pub(crate) fn current_subtitle_track(element: &dyn MediaElement) -> Option<SubtitleTrack> {
    element
        .text_tracks()?
        .iter()
        .find(|track| track.enabled)
        .map(to_subtitle)
}

pub(crate) fn select_audio_track(element: &dyn MediaElement, id: &str) -> Result<()> {
    if element.enable_audio_track(id) {
        Ok(())
    } else {
        Err(Error::track_not_found(id))
    }
}

pub(crate) fn select_subtitle_track(element: &dyn MediaElement, id: Option<&str>) -> Result<()> {
    match id {
        None => {
            element.show_text_track(None);
            Ok(())
        }
        Some(id) if element.show_text_track(Some(id)) => Ok(()),
        Some(id) => Err(Error::track_not_found(id)),
    }
}
