//! Ordered layer registry and the translate execution loop (spec.md §4.6).

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::context::Context;
use crate::layer::{process_with_metrics, Layer, LayerStats};
use crate::model::{LayerDebugInfo, LayerOutcome, LayerResult};

struct RegisteredLayer {
    layer: Box<dyn Layer>,
    stats: LayerStats,
    enabled: bool,
}

/// Holds every layer sorted by ascending priority (ties broken by
/// registration order) and runs a request through all enabled ones.
pub struct Pipeline {
    layers: Vec<RegisteredLayer>,
}

pub struct PipelineRun {
    pub text: String,
    pub debug_infos: Vec<LayerDebugInfo>,
    pub confidences: Vec<f32>,
    pub timed_out: bool,
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Layers are kept in registration order within a priority tier; the
    /// final ordering is a stable sort by priority (spec.md §4.6).
    pub fn register(&mut self, layer: Box<dyn Layer>) {
        self.layers.push(RegisteredLayer {
            layer,
            stats: LayerStats::new(),
            enabled: true,
        });
        self.layers.sort_by_key(|r| r.layer.priority());
    }

    pub fn set_enabled(&mut self, layer_name: &str, enabled: bool) {
        if let Some(r) = self.layers.iter_mut().find(|r| r.layer.name() == layer_name) {
            r.enabled = enabled;
        }
    }

    pub fn layer_stats(&self) -> Vec<(String, crate::layer::LayerStatsSnapshot)> {
        self.layers
            .iter()
            .map(|r| (r.layer.name().to_string(), r.stats.snapshot()))
            .collect()
    }

    /// Zeroes every layer's statistics counters (spec.md §6 `reset()`).
    pub fn reset_stats(&self) {
        for registered in &self.layers {
            registered.stats.reset();
        }
    }

    /// Runs `original_text` through every enabled layer in priority order.
    /// `deadline` is checked between layers only, never mid-layer (spec.md §5).
    pub fn run(&self, original_text: &str, context: &mut Context, deadline: Option<Instant>) -> PipelineRun {
        let mut current_text = original_text.to_string();
        let mut debug_infos = Vec::new();
        let mut confidences = Vec::new();
        let mut timed_out = false;

        for registered in &self.layers {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    timed_out = true;
                    warn!(layer = registered.layer.name(), "pipeline deadline exceeded before layer ran");
                    break;
                }
            }

            if !registered.enabled {
                continue;
            }

            if !registered.layer.can_handle(&current_text, context) {
                let mut debug_info = LayerDebugInfo {
                    layer_name: registered.layer.name().to_string(),
                    is_successful: true,
                    ..Default::default()
                };
                debug_info.warnings.push("skipped: can_handle() returned false".to_string());
                registered.stats.record_skip();
                debug_infos.push(debug_info);
                continue;
            }

            let result = process_with_metrics(registered.layer.as_ref(), &registered.stats, &current_text, context);
            debug!(
                layer = registered.layer.name(),
                outcome = ?result.outcome,
                confidence = result.confidence,
                "layer processed"
            );

            debug_infos.push(result.debug_info.clone());

            match result.outcome {
                LayerOutcome::Success => {
                    current_text = result.processed_text;
                    confidences.push(result.confidence);
                }
                LayerOutcome::NoChange => {}
                LayerOutcome::Error => {
                    // LayerError never aborts the pipeline (spec.md §7): the
                    // original (pre-layer) text is kept and execution moves on.
                    warn!(layer = registered.layer.name(), error = ?result.error_message, "layer error, continuing");
                }
            }
        }

        PipelineRun {
            text: current_text,
            debug_infos,
            confidences,
            timed_out,
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use]
pub fn timeout_deadline(timeout: Option<Duration>) -> Option<Instant> {
    timeout.map(|d| Instant::now() + d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{LayerPriority, LayerStatsSnapshot};

    struct UppercaseLayer;
    impl Layer for UppercaseLayer {
        fn name(&self) -> &str {
            "uppercase"
        }
        fn description(&self) -> &str {
            "test"
        }
        fn priority(&self) -> LayerPriority {
            LayerPriority::Grammar
        }
        fn process(&self, text: &str, _context: &mut Context) -> LayerResult {
            LayerResult::success(text.to_uppercase(), 1.0, LayerDebugInfo::default())
        }
        fn stats(&self) -> LayerStatsSnapshot {
            LayerStatsSnapshot::default()
        }
    }

    struct NoopLayer;
    impl Layer for NoopLayer {
        fn name(&self) -> &str {
            "noop"
        }
        fn description(&self) -> &str {
            "test"
        }
        fn priority(&self) -> LayerPriority {
            LayerPriority::PostProcessing
        }
        fn process(&self, text: &str, _context: &mut Context) -> LayerResult {
            LayerResult::no_change(text, LayerDebugInfo::default())
        }
        fn stats(&self) -> LayerStatsSnapshot {
            LayerStatsSnapshot::default()
        }
    }

    #[test]
    fn runs_layers_in_priority_order_and_advances_text() {
        let mut pipeline = Pipeline::new();
        pipeline.register(Box::new(NoopLayer));
        pipeline.register(Box::new(UppercaseLayer));
        let mut ctx = Context::new("en", "ru");
        let run = pipeline.run("hello", &mut ctx, None);
        assert_eq!(run.text, "HELLO");
        assert!(!run.timed_out);
        assert_eq!(run.debug_infos.len(), 2);
    }

    #[test]
    fn disabled_layer_is_skipped() {
        let mut pipeline = Pipeline::new();
        pipeline.register(Box::new(UppercaseLayer));
        pipeline.set_enabled("uppercase", false);
        let mut ctx = Context::new("en", "ru");
        let run = pipeline.run("hello", &mut ctx, None);
        assert_eq!(run.text, "hello");
    }

    #[test]
    fn expired_deadline_halts_before_remaining_layers() {
        let mut pipeline = Pipeline::new();
        pipeline.register(Box::new(UppercaseLayer));
        let mut ctx = Context::new("en", "ru");
        let past_deadline = Instant::now() - Duration::from_secs(1);
        let run = pipeline.run("hello", &mut ctx, Some(past_deadline));
        assert!(run.timed_out);
        assert_eq!(run.text, "hello");
    }
}
