//! Observer trait for retry-loop events.
//!
//! Inject an [`Arc<dyn InvocationObserver>`] via
//! [`crate::assist::CodeAssistant::with_observer`] to receive events as the
//! invoker attempts, backs off and settles. Tracing already records every
//! transition; the observer exists for callers that want the events as data
//! (metrics counters, test assertions on the backoff schedule).
//!
//! # Example
//!
//! ```rust
//! use code_assist::InvocationObserver;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! struct CountingObserver {
//!     attempts: AtomicU32,
//! }
//!
//! impl InvocationObserver for CountingObserver {
//!     fn on_attempt(&self, _label: &str, _attempt: u32, _max_attempts: u32) {
//!         self.attempts.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//! ```

use crate::error::{AssistError, StageError};
use crate::output::DegradeReason;
use std::sync::Arc;
use std::time::Duration;

/// Called by [`crate::invoker::invoke`] at each state transition.
///
/// Implementations must be `Send + Sync`: requests are served concurrently
/// and share one observer. All methods default to no-ops.
pub trait InvocationObserver: Send + Sync {
    /// A pipeline run is about to start (`attempt` is 1-based).
    fn on_attempt(&self, label: &str, attempt: u32, max_attempts: u32) {
        let _ = (label, attempt, max_attempts);
    }

    /// A retryable failure occurred and the invoker will sleep for `delay`.
    fn on_backoff(&self, label: &str, error: &StageError, delay: Duration) {
        let _ = (label, error, delay);
    }

    /// The pipeline completed cleanly.
    fn on_succeeded(&self, label: &str, attempts: u32) {
        let _ = (label, attempts);
    }

    /// The invoker settled for a degraded payload.
    fn on_degraded(&self, label: &str, reason: DegradeReason, attempts: u32) {
        let _ = (label, reason, attempts);
    }

    /// The invocation failed fatally.
    fn on_fatal(&self, label: &str, error: &AssistError) {
        let _ = (label, error);
    }
}

/// The default observer.
pub struct NoopObserver;

impl InvocationObserver for NoopObserver {}

/// Convenience alias for the shared observer handle.
pub type SharedObserver = Arc<dyn InvocationObserver>;
