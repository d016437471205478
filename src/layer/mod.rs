//! Layer contract, priorities, and the statistics-collecting wrapper
//! (spec.md §4.5).

pub mod dictionary;
pub mod grammar;
pub mod post_processing;
pub mod phrase;
pub mod preprocessing;
pub mod word_order;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::context::Context;
use crate::model::{LayerDebugInfo, LayerResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LayerPriority {
    Preprocessing = 0,
    Phrase = 100,
    Dictionary = 200,
    Grammar = 300,
    WordOrder = 400,
    PostProcessing = 500,
}

impl LayerPriority {
    #[must_use]
    pub fn value(self) -> i32 {
        self as i32
    }
}

/// Every pipeline stage implements this. `process` must stay free of I/O side
/// effects beyond repository reads, and must never panic past
/// [`process_with_metrics`] (spec.md §4.5 contract).
pub trait Layer: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn version(&self) -> &str {
        "1.0"
    }
    fn priority(&self) -> LayerPriority;

    /// Gate based on prerequisites (e.g. tokens already produced upstream).
    fn can_handle(&self, text: &str, context: &Context) -> bool {
        self.validate_input(text, context)
    }

    fn validate_input(&self, text: &str, context: &Context) -> bool {
        !text.is_empty() && !context.source_language.is_empty() && !context.target_language.is_empty()
    }

    /// Pure transformation; may mutate `context`'s metadata slots.
    fn process(&self, text: &str, context: &mut Context) -> LayerResult;

    fn stats(&self) -> LayerStatsSnapshot;
}

/// Per-layer counters. Layers may be invoked concurrently from multiple
/// requests (spec.md §5), so these are plain atomics rather than a mutex
/// around a struct.
#[derive(Default)]
pub struct LayerStats {
    processed: AtomicU64,
    succeeded: AtomicU64,
    errored: AtomicU64,
    skipped: AtomicU64,
    total_time_ms: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LayerStatsSnapshot {
    pub processed: u64,
    pub succeeded: u64,
    pub errored: u64,
    pub skipped: u64,
    pub total_time_ms: u64,
}

impl LayerStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, elapsed_ms: u64) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.total_time_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
    }

    pub fn record_error(&self, elapsed_ms: u64) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.errored.fetch_add(1, Ordering::Relaxed);
        self.total_time_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
    }

    /// Zeroes every counter; used by `Engine::reset()` (spec.md §6).
    pub fn reset(&self) {
        self.processed.store(0, Ordering::Relaxed);
        self.succeeded.store(0, Ordering::Relaxed);
        self.errored.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
        self.total_time_ms.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> LayerStatsSnapshot {
        LayerStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            total_time_ms: self.total_time_ms.load(Ordering::Relaxed),
        }
    }
}

/// Wraps a layer's `process` call: measures wall time, updates `stats`,
/// injects elapsed time into debug info, and converts panics into
/// `LayerResult::error` without letting them reach the pipeline
/// (spec.md §4.5 / §7 LayerError).
pub fn process_with_metrics(
    layer: &dyn Layer,
    stats: &LayerStats,
    text: &str,
    context: &mut Context,
) -> LayerResult {
    let start = Instant::now();
    let layer_name = layer.name().to_string();
    let result = panic::catch_unwind(AssertUnwindSafe(|| layer.process(text, context)));
    let elapsed_ms = start.elapsed().as_millis() as u64;

    let mut result = match result {
        Ok(r) => r,
        Err(_) => crate::model::LayerResult::error(
            text,
            "layer panicked during process()",
            &layer_name,
        ),
    };

    result.debug_info.layer_name = layer_name;
    result.debug_info.processing_time_ms = elapsed_ms;

    if result.is_error() {
        stats.record_error(elapsed_ms);
    } else {
        stats.record_success(elapsed_ms);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LayerResult;

    struct PanicLayer;

    impl Layer for PanicLayer {
        fn name(&self) -> &str {
            "panic_layer"
        }
        fn description(&self) -> &str {
            "test layer that panics"
        }
        fn priority(&self) -> LayerPriority {
            LayerPriority::Grammar
        }
        fn process(&self, _text: &str, _context: &mut Context) -> LayerResult {
            panic!("boom");
        }
        fn stats(&self) -> LayerStatsSnapshot {
            LayerStatsSnapshot::default()
        }
    }

    #[test]
    fn panics_become_layer_errors() {
        let stats = LayerStats::new();
        let mut ctx = Context::new("en", "ru");
        let result = process_with_metrics(&PanicLayer, &stats, "hello", &mut ctx);
        assert!(result.is_error());
        assert_eq!(result.processed_text, "hello");
        assert_eq!(stats.snapshot().errored, 1);
    }
}
