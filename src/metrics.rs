//! Decoder metrics.
//!
//! Recorded through the `metrics` facade; without an installed recorder every
//! call is a no-op. Applications that export metrics call [`describe_metrics`]
//! once after installing their recorder.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::Strategy;

pub const DECODE_CALLS: &str = "bestpath_decode_calls_total";
pub const DECODE_FAILURES: &str = "bestpath_decode_failures_total";
pub const DECODE_DURATION: &str = "bestpath_decode_duration_seconds";
pub const DECODED_LABELS: &str = "bestpath_decoded_labels_total";

/// Register descriptions for all decoder metrics.
pub fn describe_metrics() {
    describe_counter!(DECODE_CALLS, "Total number of batch decode calls");
    describe_counter!(
        DECODE_FAILURES,
        "Total number of decode calls that returned an error"
    );
    describe_histogram!(
        DECODE_DURATION,
        "Duration of a batch decode call in seconds"
    );
    describe_counter!(
        DECODED_LABELS,
        "Total number of non-blank labels emitted by decode calls"
    );
}

/// Times one decode call.
pub struct DecodeTimer {
    strategy: Strategy,
    start: Instant,
}

impl DecodeTimer {
    /// Start timing a call using `strategy`.
    pub fn start(strategy: Strategy) -> Self {
        Self {
            strategy,
            start: Instant::now(),
        }
    }

    /// Record the elapsed time and return it.
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        histogram!(DECODE_DURATION, "strategy" => self.strategy.as_str())
            .record(elapsed.as_secs_f64());

        debug!(
            "Decode ({}) took {:.3}ms",
            self.strategy,
            elapsed.as_secs_f64() * 1000.0
        );
        elapsed
    }
}

/// Record the start of a decode call.
pub fn record_decode_call(strategy: Strategy) {
    counter!(DECODE_CALLS, "strategy" => strategy.as_str()).increment(1);
}

/// Record a failed decode call.
pub fn record_decode_failure(strategy: Strategy, error_kind: &'static str) {
    counter!(
        DECODE_FAILURES,
        "strategy" => strategy.as_str(),
        "error" => error_kind
    )
    .increment(1);
}

/// Record the labels a successful call emitted.
pub fn record_decoded_labels(count: usize) {
    counter!(DECODED_LABELS).increment(count as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        record_decode_call(Strategy::Fused);
        record_decode_failure(Strategy::TwoPhase, "backend");
        record_decoded_labels(3);

        let timer = DecodeTimer::start(Strategy::Fused);
        assert!(timer.finish() < Duration::from_secs(60));
    }
}
