//! Resilient external call invoker: bounded exponential backoff around a
//! pipeline of dependent provider calls, with degraded fallbacks.
//!
//! ## State machine
//!
//! ```text
//!            invoke
//!   Idle ──────────▶ Attempting ──── Ok ─────────────────────────▶ Succeeded
//!                     │   ▲
//!   retryable error,  │   │ sleep(backoff), backoff *= 2
//!   attempts remain   ▼   │
//!                    Backoff
//!
//!   Attempting ── ParseFailure ──────────────────────────────────▶ Degraded
//!   Attempting ── retryable error, ceiling hit, partial output ──▶ Degraded
//!   Attempting ── RateLimited, ceiling hit, no partial output ──▶ Degraded (generic)
//!   Attempting ── TransientNetwork, ceiling hit, no partial ─────▶ Fatal (503)
//!   Attempting ── Other ─────────────────────────────────────────▶ Fatal (500)
//! ```
//!
//! Every retry restarts the whole pipeline from its first stage. Outputs of
//! stages that succeeded before a failure are never reused as inputs; the
//! only thing carried across attempts is the most recent *partial output*
//! a failed attempt reported, which the degraded payload may quote.
//!
//! ## Backoff
//!
//! With `max_retries = N` a pipeline that always fails retryably runs N times
//! and sleeps N-1 times: `initial`, `2 × initial`, `4 × initial`, …
//! Sleeps go through `tokio::time::sleep`, so they park only the task serving
//! the request.

use crate::error::{AssistError, StageError};
use crate::observer::InvocationObserver;
use crate::output::{Completion, DegradeReason, Invocation};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Attempt ceiling and initial delay. The multiplier is fixed at 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum pipeline runs, at least 1.
    pub max_retries: u32,
    /// Delay before the second run.
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub const BACKOFF_MULTIPLIER: u32 = 2;

    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            initial_backoff,
        }
    }

    /// The delays a pipeline that never succeeds would sleep through.
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        let mut attempt = CallAttempt::new(self);
        std::iter::from_fn(|| attempt.record_failure()).collect()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}

/// Per-invocation attempt bookkeeping.
///
/// Created when an invocation starts, mutated on each failure and dropped on
/// exit.
#[derive(Debug, Clone)]
pub struct CallAttempt {
    attempt_number: u32,
    max_attempts: u32,
    backoff: Duration,
}

impl CallAttempt {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt_number: 0,
            max_attempts: policy.max_retries.max(1),
            backoff: policy.initial_backoff,
        }
    }

    /// Failed attempts recorded so far.
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay that will be returned by the next non-final failure.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Record a retryable failure.
    ///
    /// Returns the delay to sleep before the next attempt, or `None` once the
    /// ceiling is reached.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.attempt_number += 1;
        if self.attempt_number >= self.max_attempts {
            return None;
        }
        let delay = self.backoff;
        self.backoff = self.backoff.saturating_mul(RetryPolicy::BACKOFF_MULTIPLIER);
        Some(delay)
    }
}

/// A failed pipeline run: the classified stage error plus any partial output
/// obtained before it (e.g. OCR text when the following chat stage failed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineFailure {
    pub error: StageError,
    pub partial: Option<String>,
}

impl PipelineFailure {
    pub fn with_partial(mut self, partial: impl Into<String>) -> Self {
        self.partial = Some(partial.into());
        self
    }
}

impl From<StageError> for PipelineFailure {
    fn from(error: StageError) -> Self {
        Self {
            error,
            partial: None,
        }
    }
}

/// What the degrade callback is asked to build a payload from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation<'a> {
    /// Rate limited until the ceiling; `partial` is the latest partial output, if any.
    RateLimited { partial: Option<&'a str> },
    /// Network errors until the ceiling, but a partial output exists.
    NetworkExhausted { partial: &'a str },
    /// The provider replied with something that could not be parsed.
    Unparseable { raw: &'a str },
}

impl Degradation<'_> {
    pub fn reason(&self) -> DegradeReason {
        match self {
            Self::RateLimited { .. } => DegradeReason::RateLimited,
            Self::NetworkExhausted { .. } => DegradeReason::NetworkExhausted,
            Self::Unparseable { .. } => DegradeReason::Unparseable,
        }
    }
}

enum Phase {
    Attempting,
    Backoff(Duration),
}

/// Run `pipeline` under `policy`, degrading through `degrade` when needed.
///
/// `pipeline` receives the 1-based attempt number and must run every stage
/// from the first one. `label` names the invocation in logs and observer
/// events.
///
/// # Errors
/// - [`AssistError::Upstream`] on the first unclassified (`Other`) failure.
/// - [`AssistError::ServiceUnavailable`] when network retries are exhausted
///   and no partial output was ever obtained.
pub async fn invoke<T, F, Fut, D>(
    label: &str,
    policy: &RetryPolicy,
    observer: &dyn InvocationObserver,
    mut pipeline: F,
    degrade: D,
) -> Result<Invocation<T>, AssistError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, PipelineFailure>>,
    D: Fn(Degradation<'_>) -> T,
{
    let start = Instant::now();
    let mut attempt = CallAttempt::new(policy);
    let mut partial: Option<String> = None;
    let mut phase = Phase::Attempting;

    loop {
        phase = match phase {
            Phase::Backoff(delay) => {
                sleep(delay).await;
                Phase::Attempting
            }
            Phase::Attempting => {
                let number = attempt.attempt_number() + 1;
                observer.on_attempt(label, number, attempt.max_attempts());
                debug!("{}: attempt {}/{}", label, number, attempt.max_attempts());

                let failure = match pipeline(number).await {
                    Ok(value) => {
                        info!("{}: succeeded on attempt {}", label, number);
                        observer.on_succeeded(label, number);
                        return Ok(Invocation {
                            value,
                            completion: Completion::Succeeded,
                            attempts: number,
                            duration_ms: start.elapsed().as_millis() as u64,
                        });
                    }
                    Err(failure) => failure,
                };

                if failure.partial.is_some() {
                    partial = failure.partial;
                }

                match failure.error {
                    StageError::Other { stage, detail } => {
                        let err = AssistError::Upstream { stage, detail };
                        error!("{}: attempt {} failed fatally: {}", label, number, err);
                        observer.on_fatal(label, &err);
                        return Err(err);
                    }
                    StageError::ParseFailure { stage, detail, raw } => {
                        warn!("{}: {} reply unparseable: {}", label, stage, detail);
                        let value = degrade(Degradation::Unparseable { raw: &raw });
                        let reason = DegradeReason::Unparseable;
                        return Ok(degraded(label, value, reason, number, start, observer));
                    }
                    retryable => match attempt.record_failure() {
                        Some(delay) => {
                            warn!(
                                "{}: attempt {}/{} failed: {}; retrying in {}ms",
                                label,
                                number,
                                attempt.max_attempts(),
                                retryable,
                                delay.as_millis()
                            );
                            observer.on_backoff(label, &retryable, delay);
                            Phase::Backoff(delay)
                        }
                        None => {
                            warn!("{}: giving up after {} attempts: {}", label, number, retryable);
                            let degradation = match (&retryable, partial.as_deref()) {
                                (StageError::RateLimited { .. }, partial) => {
                                    Degradation::RateLimited { partial }
                                }
                                (_, Some(partial)) => Degradation::NetworkExhausted { partial },
                                (_, None) => {
                                    let err = AssistError::ServiceUnavailable {
                                        attempts: number,
                                        detail: retryable.to_string(),
                                    };
                                    error!("{}: {}", label, err);
                                    observer.on_fatal(label, &err);
                                    return Err(err);
                                }
                            };
                            let reason = degradation.reason();
                            let value = degrade(degradation);
                            return Ok(degraded(label, value, reason, number, start, observer));
                        }
                    },
                }
            }
        };
    }
}

fn degraded<T>(
    label: &str,
    value: T,
    reason: DegradeReason,
    attempts: u32,
    start: Instant,
    observer: &dyn InvocationObserver,
) -> Invocation<T> {
    info!("{}: returning degraded result ({:?}) after {} attempts", label, reason, attempts);
    observer.on_degraded(label, reason, attempts);
    Invocation {
        value,
        completion: Completion::Degraded(reason),
        attempts,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}
