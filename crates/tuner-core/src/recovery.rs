//! Recovery coordinator
//!
//! Single authority deciding whether a classified error is retried, skipped,
//! handed to a fallback engine, or surfaced as terminal. Retry bookkeeping is
//! keyed by a caller-chosen context id (channel, session...) and lives as long as
//! the coordinator. Engines never retry on their own.
//!
//! Only one `recover` call per context id may be in flight at a time.

use crate::error::{Error, Result};
use crate::fault::{is_recoverable, recovery_action, RecoveryAction};
use crate::time::{Clock, SystemClock, Timer, TokioTimer};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Backoff configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Retries allowed per context before failing
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
    /// Growth factor applied after each retry
    pub backoff_multiplier: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RecoveryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Reject values the backoff arithmetic cannot handle
    pub fn validate(&self) -> Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 0.0 {
            return Err(Error::invalid_config(format!(
                "backoff_multiplier must be a positive number, got {}",
                self.backoff_multiplier
            )));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            warn!(
                initial_delay_ms = self.initial_delay_ms,
                max_delay_ms = self.max_delay_ms,
                "Initial delay exceeds max delay, every retry will use max delay"
            );
        }
        Ok(())
    }

    /// Delays requested by consecutive retries of one context
    pub fn delay_schedule(&self) -> Vec<Duration> {
        let mut next = self.initial_delay();
        (0..self.max_attempts)
            .map(|_| {
                let delay = next.min(self.max_delay());
                next = grow(delay, self.backoff_multiplier);
                delay
            })
            .collect()
    }
}

fn grow(delay: Duration, multiplier: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * multiplier).unwrap_or(Duration::MAX)
}

/// Retry bookkeeping for one context id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryState {
    /// Retries already started
    pub attempts: u32,
    /// When the last retry started
    pub last_attempt_time: Option<DateTime<Utc>>,
    /// Delay the next retry will request (before capping)
    pub next_delay: Duration,
}

impl RetryState {
    fn new(initial_delay: Duration) -> Self {
        Self {
            attempts: 0,
            last_attempt_time: None,
            next_delay: initial_delay,
        }
    }
}

/// Result of a `recover` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecoveryOutcome {
    /// The chosen action succeeded, or can be carried out by the caller
    pub success: bool,
    pub action: RecoveryAction,
    /// Attempt number the next `recover` call for this context will make
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt: Option<u32>,
}

impl RecoveryOutcome {
    fn done(success: bool, action: RecoveryAction) -> Self {
        Self {
            success,
            action,
            next_attempt: None,
        }
    }
}

/// Decides and executes retry/skip/fallback/fail
pub struct RecoveryCoordinator {
    config: RecoveryConfig,
    timer: Arc<dyn Timer>,
    clock: Arc<dyn Clock>,
    states: Mutex<HashMap<String, RetryState>>,
}

impl RecoveryCoordinator {
    /// Coordinator on the tokio timer and system clock
    pub fn new(config: RecoveryConfig) -> Self {
        Self::with_time(config, Arc::new(TokioTimer), Arc::new(SystemClock))
    }

    /// Coordinator with injected time sources
    pub fn with_time(config: RecoveryConfig, timer: Arc<dyn Timer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            timer,
            clock,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Decide what to do about `error` and, for retries, run `retry_action`
    /// after the backoff delay
    #[instrument(skip(self, error, retry_action), fields(kind = %error.kind, code = %error.code))]
    pub async fn recover<F, Fut>(&self, error: &Error, context_id: &str, retry_action: F) -> RecoveryOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if !is_recoverable(error) {
            info!(context_id, fatal = error.fatal, "Error is not recoverable");
            return RecoveryOutcome::done(false, RecoveryAction::Fail);
        }

        match recovery_action(error) {
            RecoveryAction::Skip => {
                info!(context_id, "Skipping after unrecoverable content fault");
                RecoveryOutcome::done(true, RecoveryAction::Skip)
            }
            RecoveryAction::Fallback => {
                info!(context_id, "Requesting fallback engine");
                RecoveryOutcome::done(true, RecoveryAction::Fallback)
            }
            RecoveryAction::Retry => self.retry(context_id, retry_action).await,
            RecoveryAction::Fail => RecoveryOutcome::done(false, RecoveryAction::Fail),
        }
    }

    async fn retry<F, Fut>(&self, context_id: &str, retry_action: F) -> RecoveryOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let (attempt, delay) = {
            let mut states = self.states.lock();
            let state = states
                .entry(context_id.to_string())
                .or_insert_with(|| RetryState::new(self.config.initial_delay()));

            if state.attempts >= self.config.max_attempts {
                states.remove(context_id);
                warn!(context_id, max_attempts = self.config.max_attempts, "Retry attempts exhausted");
                return RecoveryOutcome::done(false, RecoveryAction::Fail);
            }

            let delay = state.next_delay.min(self.config.max_delay());
            state.attempts += 1;
            state.next_delay = grow(delay, self.config.backoff_multiplier);
            state.last_attempt_time = Some(self.clock.now());
            (state.attempts, delay)
        };

        info!(
            context_id,
            attempt,
            max_attempts = self.config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Retrying after backoff"
        );
        self.timer.sleep(delay).await;

        match retry_action().await {
            Ok(()) => {
                self.states.lock().remove(context_id);
                info!(context_id, attempt, "Retry succeeded");
                RecoveryOutcome::done(true, RecoveryAction::Retry)
            }
            Err(e) if attempt < self.config.max_attempts => {
                debug!(context_id, attempt, error = %e, "Retry failed, attempts remain");
                RecoveryOutcome {
                    success: false,
                    action: RecoveryAction::Retry,
                    next_attempt: Some(attempt + 1),
                }
            }
            Err(e) => {
                self.states.lock().remove(context_id);
                warn!(context_id, attempt, error = %e, "Final retry failed");
                RecoveryOutcome::done(false, RecoveryAction::Fail)
            }
        }
    }

    /// Returns true while a retry sequence is tracked for the context
    pub fn is_retrying(&self, context_id: &str) -> bool {
        self.states.lock().contains_key(context_id)
    }

    /// Retries started so far for the context
    pub fn attempts(&self, context_id: &str) -> u32 {
        self.states
            .lock()
            .get(context_id)
            .map(|state| state.attempts)
            .unwrap_or(0)
    }

    /// Snapshot of the retry bookkeeping for the context
    pub fn retry_state(&self, context_id: &str) -> Option<RetryState> {
        self.states.lock().get(context_id).cloned()
    }

    /// Forget one context
    pub fn clear(&self, context_id: &str) {
        self.states.lock().remove(context_id);
    }

    /// Forget every context; a backoff wait already in progress is not interrupted
    pub fn clear_all(&self) {
        let mut states = self.states.lock();
        debug!(contexts = states.len(), "Clearing all retry state");
        states.clear();
    }
}

impl Default for RecoveryCoordinator {
    fn default() -> Self {
        Self::new(RecoveryConfig::default())
    }
}

impl std::fmt::Debug for RecoveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCoordinator")
            .field("config", &self.config)
            .field("contexts", &self.states.lock().len())
            .finish()
    }
}
