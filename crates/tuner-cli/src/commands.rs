//! CLI command implementations

use crate::output::{print_table, OutputFormat};
use clap::ValueEnum;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;
use tracing::{debug, info, warn};
use tuner_core::native::{FaultCategory, LibraryFault, NativeFaultCode, PlayerFault};
use tuner_core::sim::{ElementScript, RecordingTimer, SimAdaptiveLibrary, SimConstrainedPlayer, SimRuntime, SimSegmentLibrary};
use tuner_core::time::{SystemClock, Timer, TokioTimer};
use tuner_core::{
    detect_stream_type, EngineKind, EngineSelector, EventType, Platform, PlaybackEngine, PlaybackSession, PlayerEvent,
    RecoveryConfig, RecoveryCoordinator, SessionOutcome, StreamDescriptor, StreamType, TunerConfig,
};
use url::Url;

// =============================================================================
// detect
// =============================================================================

#[derive(Serialize, Tabled)]
struct PlatformReport {
    platform: Platform,
    recommended_engine: EngineKind,
    playable: bool,
}

#[derive(Serialize)]
struct DetectReport {
    url: String,
    stream_type: StreamType,
    platforms: Vec<PlatformReport>,
}

/// Detect stream type and per-platform engine choice
pub fn detect(stream_url: &str, format: &str) -> anyhow::Result<()> {
    let url = Url::parse(stream_url)?;
    let stream_type = detect_stream_type(url.as_str());

    let platforms: Vec<PlatformReport> = [Platform::General, Platform::Embedded]
        .into_iter()
        .map(|platform| PlatformReport {
            platform,
            recommended_engine: EngineSelector::recommended_engine(url.as_str(), platform),
            playable: EngineSelector::can_play_stream(url.as_str(), platform),
        })
        .collect();

    let report = DetectReport {
        url: url.to_string(),
        stream_type,
        platforms,
    };

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => {
            println!("Stream type: {}", report.stream_type);
            print_table(&report.platforms);
        }
        OutputFormat::Text => {
            println!("Stream: {}", report.url);
            println!("  Type: {}", report.stream_type);
            for p in &report.platforms {
                println!(
                    "  {:10} -> {:14} {}",
                    p.platform.to_string(),
                    p.recommended_engine.to_string(),
                    if p.playable { "playable" } else { "not playable" }
                );
            }
        }
    }

    Ok(())
}

// =============================================================================
// backoff
// =============================================================================

#[derive(Serialize, Tabled)]
struct BackoffRow {
    attempt: u32,
    delay_ms: u64,
    elapsed_ms: u64,
}

/// Print the delay schedule of a recovery configuration
pub fn backoff(config: &RecoveryConfig, format: &str) -> anyhow::Result<()> {
    config.validate()?;
    debug!(max_attempts = config.max_attempts, "Computing backoff schedule");

    let mut elapsed_ms = 0u64;
    let rows: Vec<BackoffRow> = config
        .delay_schedule()
        .into_iter()
        .enumerate()
        .map(|(i, delay)| {
            let delay_ms = delay.as_millis() as u64;
            elapsed_ms = elapsed_ms.saturating_add(delay_ms);
            BackoffRow {
                attempt: i as u32 + 1,
                delay_ms,
                elapsed_ms,
            }
        })
        .collect();

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Table => print_table(&rows),
        OutputFormat::Text => {
            println!(
                "Backoff: {} attempts, {}ms initial, x{}, capped at {}ms",
                config.max_attempts, config.initial_delay_ms, config.backoff_multiplier, config.max_delay_ms
            );
            for row in &rows {
                println!("  #{}: wait {}ms (total {}ms)", row.attempt, row.delay_ms, row.elapsed_ms);
            }
        }
    }

    Ok(())
}

// =============================================================================
// simulate
// =============================================================================

/// Native fault injected into a simulated run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Fault {
    #[value(name = "none")]
    Clean,
    Network,
    Timeout,
    Decode,
    Format,
    Drm,
    Audio,
}

impl Fault {
    fn element_script(&self) -> ElementScript {
        match self {
            Fault::Clean | Fault::Audio | Fault::Drm => ElementScript::Succeed,
            Fault::Network | Fault::Timeout => ElementScript::Fail(NativeFaultCode::Network),
            Fault::Decode => ElementScript::Fail(NativeFaultCode::Decode),
            Fault::Format => ElementScript::Fail(NativeFaultCode::SourceNotSupported),
        }
    }

    fn library_fault(&self) -> Option<LibraryFault> {
        let (category, code, message, critical) = match self {
            Fault::Clean | Fault::Audio => return None,
            Fault::Network => (FaultCategory::Network, 1001, "playlist request failed", false),
            Fault::Timeout => (FaultCategory::Timeout, 1003, "segment request timed out", false),
            Fault::Decode => (FaultCategory::Media, 3016, "buffer append error", true),
            Fault::Format => (FaultCategory::Manifest, 4000, "unsupported manifest", false),
            Fault::Drm => (FaultCategory::Drm, 6007, "license request failed", false),
        };
        Some(LibraryFault::new(category, code, message, critical))
    }

    fn player_fault(&self) -> Option<PlayerFault> {
        let message = match self {
            Fault::Clean => return None,
            Fault::Network => "PLAYER_ERROR_CONNECTION_FAILED",
            Fault::Timeout => "PLAYER_ERROR_TIMEOUT",
            Fault::Decode => "PLAYER_ERROR_GENERIC: decoder failure",
            Fault::Format => "PLAYER_ERROR_NOT_SUPPORTED_FILE",
            Fault::Drm => "PLAYER_ERROR_DRM: license rejected",
            Fault::Audio => "PLAYER_ERROR_NOT_SUPPORTED_AUDIO_CODEC: AC3",
        };
        Some(PlayerFault::new(message))
    }
}

/// Options of one simulated run
#[derive(Debug)]
pub struct SimulateArgs {
    pub url: String,
    pub platform: Option<Platform>,
    pub engine: Option<EngineKind>,
    pub fault: Fault,
    pub repeat: usize,
    pub no_wait: bool,
}

fn build_runtime(platform: Platform, fault: Fault, repeat: usize) -> SimRuntime {
    let runtime = match platform {
        Platform::General => SimRuntime::general(),
        Platform::Embedded => SimRuntime::embedded(),
    };

    let adaptive = Arc::new(SimAdaptiveLibrary::new());
    let segment = Arc::new(SimSegmentLibrary::new());
    let player = Arc::new(SimConstrainedPlayer::new());
    for _ in 0..repeat {
        if let Some(library_fault) = fault.library_fault() {
            adaptive.fail_next_load(library_fault.clone());
            segment.fail_next_load(library_fault);
        }
        if let Some(player_fault) = fault.player_fault() {
            player.fail_next_prepare(player_fault);
        }
    }

    let runtime = match platform {
        Platform::General => runtime.with_adaptive(Some(adaptive)).with_segment(Some(segment)),
        Platform::Embedded => runtime.with_player(Some(player)),
    };
    runtime.with_element_script(fault.element_script())
}

#[derive(Serialize)]
struct EventRecord {
    at: String,
    #[serde(flatten)]
    event: PlayerEvent,
}

/// Open a stream against the simulated runtime and report what happened
pub async fn simulate(config: &TunerConfig, args: SimulateArgs, format: &str) -> anyhow::Result<()> {
    let mut options = config.selector_options();
    if let Some(platform) = args.platform {
        options.platform = platform;
    }
    if let Some(engine) = args.engine {
        options.preferred_engine = Some(engine);
    }
    let mut engine_config = config.engine.clone();
    engine_config.platform = options.platform;

    let runtime = Arc::new(build_runtime(options.platform, args.fault, args.repeat));
    let timer: Arc<dyn Timer> = if args.no_wait {
        Arc::new(RecordingTimer::new())
    } else {
        Arc::new(TokioTimer)
    };
    let coordinator = Arc::new(RecoveryCoordinator::with_time(
        config.recovery.clone(),
        timer,
        Arc::new(SystemClock),
    ));
    let mut session = PlaybackSession::new(
        EngineSelector::new(runtime),
        coordinator,
        options,
        engine_config,
    );

    let log: Arc<Mutex<Vec<EventRecord>>> = Arc::new(Mutex::new(Vec::new()));
    for event_type in EventType::ALL {
        let sink = Arc::clone(&log);
        session.on(
            event_type,
            Arc::new(move |event: &PlayerEvent| {
                sink.lock().push(EventRecord {
                    at: chrono::Utc::now().format("%H:%M:%S%.3f").to_string(),
                    event: event.clone(),
                })
            }),
        )?;
    }

    if OutputFormat::from(format) != OutputFormat::Json {
        println!("Simulating: {}", args.url);
        println!("  Platform: {}", options.platform);
        println!("  Fault: {:?} x{}", args.fault, args.repeat);
    }

    let stream = StreamDescriptor::new(args.url.clone());
    let result = session.open("simulate", &stream).await;
    if let Ok(SessionOutcome::Playing { .. }) = &result {
        if let Some(engine) = session.engine() {
            engine.play().await?;
        }
    }
    session.close();

    let events = std::mem::take(&mut *log.lock());
    match &result {
        Ok(outcome) => info!(?outcome, events = events.len(), "Simulation finished"),
        Err(error) => warn!(code = %error.code, events = events.len(), "Simulation failed"),
    }
    match OutputFormat::from(format) {
        OutputFormat::Json => {
            let report = match &result {
                Ok(outcome) => serde_json::json!({ "outcome": outcome, "events": events }),
                Err(error) => serde_json::json!({
                    "outcome": { "outcome": "failed", "error": error },
                    "events": events,
                }),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table | OutputFormat::Text => {
            println!("\nEvents:");
            for record in &events {
                println!("  [{}] {}", record.at, serde_json::to_string(&record.event)?);
            }
            println!();
            match &result {
                Ok(SessionOutcome::Playing { engine }) => {
                    println!("Outcome: {} on {} engine", console::style("PLAYING").green().bold(), engine)
                }
                Ok(SessionOutcome::Skipped { error }) => {
                    println!("Outcome: {} ({})", console::style("SKIPPED").yellow().bold(), error)
                }
                Err(error) => println!("Outcome: {} ({})", console::style("FAILED").red().bold(), error),
            }
        }
    }

    if result.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuner_core::native::NativeRuntime;

    #[test]
    fn test_faults_reach_every_backend() {
        assert!(Fault::Clean.library_fault().is_none());
        assert!(Fault::Audio.library_fault().is_none());
        assert!(Fault::Audio.player_fault().is_some());
        assert_eq!(Fault::Decode.element_script(), ElementScript::Fail(NativeFaultCode::Decode));
    }

    #[test]
    fn test_runtime_matches_platform() {
        let runtime = build_runtime(Platform::Embedded, Fault::Network, 2);
        assert!(runtime.constrained_player().is_some());
        assert!(runtime.adaptive_library().is_none());

        let runtime = build_runtime(Platform::General, Fault::Clean, 1);
        assert!(runtime.constrained_player().is_none());
        assert!(runtime.segment_library().is_some());
    }
}
