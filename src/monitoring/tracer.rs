/*!
 * Structured Tracing
 * Subscriber setup and timing spans for scheduler evaluations
 */

use std::time::{Duration, Instant};
use tracing::{debug, span, warn, Level, Span};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Evaluations slower than this are reported at warn level
pub const SLOW_EVALUATION: Duration = Duration::from_millis(1);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - RMS_TRACE_JSON: Enable JSON output (default: false)
///
/// Returns false if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("RMS_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        debug!(json = use_json, "Structured tracing initialized");
    }
    installed
}

/// Times one scheduler evaluation; reports on drop
pub struct EvaluationSpan {
    span: Span,
    start: Instant,
    slow_after: Duration,
}

impl EvaluationSpan {
    pub fn new() -> Self {
        Self::with_threshold(SLOW_EVALUATION)
    }

    pub fn with_threshold(slow_after: Duration) -> Self {
        Self {
            span: span!(
                Level::TRACE,
                "evaluation",
                running = tracing::field::Empty,
                duration_us = tracing::field::Empty
            ),
            start: Instant::now(),
            slow_after,
        }
    }

    /// Record the task left holding the resource
    pub fn record_running(&self, id: Option<u32>) {
        if let Some(id) = id {
            self.span.record("running", id);
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn is_slow(&self) -> bool {
        self.elapsed() > self.slow_after
    }
}

impl Default for EvaluationSpan {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EvaluationSpan {
    fn drop(&mut self) {
        let elapsed = self.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_us", elapsed.as_micros() as u64);

        if elapsed > self.slow_after {
            warn!(
                duration_us = elapsed.as_micros() as u64,
                slow = true,
                "slow scheduler evaluation"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        assert!(!init_tracing());
    }

    #[test]
    fn test_span_threshold() {
        let fast = EvaluationSpan::with_threshold(Duration::from_secs(60));
        fast.record_running(Some(3));
        assert!(!fast.is_slow());

        let slow = EvaluationSpan::with_threshold(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(1));
        assert!(slow.is_slow());
    }
}
