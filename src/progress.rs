//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive an
//! event each time a real stage starts or finishes. Progress therefore moves
//! when work is done, never on a timer.
//!
//! # Example
//!
//! ```rust
//! use medbuddy::{AnalysisConfig, PipelineProgressCallback, PipelineStage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_stage_complete(&self, stage: PipelineStage, elapsed_ms: u64) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage} finished in {elapsed_ms}ms");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { done: AtomicUsize::new(0) });
//! let config = AnalysisConfig::builder()
//!     .progress_callback(cb as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::domain::ReportKind;
use std::fmt;
use std::sync::Arc;

/// One step of an analysis run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Extract,
    BuildPrompt,
    Analyze,
    Render,
}

impl PipelineStage {
    /// Stages executed by [`crate::analyze::Pipeline::analyze`].
    pub const ANALYSIS: [PipelineStage; 3] = [
        PipelineStage::Extract,
        PipelineStage::BuildPrompt,
        PipelineStage::Analyze,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Extract => "extract",
            PipelineStage::BuildPrompt => "build-prompt",
            PipelineStage::Analyze => "analyze",
            PipelineStage::Render => "render",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Called by the pipeline as a run moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The trait is `Send + Sync` because one pipeline
/// may serve several HTTP requests at once.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before extraction begins.
    ///
    /// # Arguments
    /// * `kind`: report family of the artifact
    /// * `stages`: number of stages this run will go through
    fn on_run_start(&self, kind: ReportKind, stages: usize) {
        let _ = (kind, stages);
    }

    fn on_stage_start(&self, stage: PipelineStage) {
        let _ = stage;
    }

    fn on_stage_complete(&self, stage: PipelineStage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called when a stage fails; no further stage events follow for the run.
    fn on_stage_error(&self, stage: PipelineStage, error: &str) {
        let _ = (stage, error);
    }

    /// Called once when the run ends, successfully or not.
    fn on_run_complete(&self, success: bool) {
        let _ = success;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        started: Mutex<Vec<PipelineStage>>,
        completed: AtomicUsize,
        errors: AtomicUsize,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_stage_start(&self, stage: PipelineStage) {
            self.started.lock().unwrap().push(stage);
        }

        fn on_stage_complete(&self, _stage: PipelineStage, _elapsed_ms: u64) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_error(&self, _stage: PipelineStage, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(ReportKind::Medical, 3);
        cb.on_stage_start(PipelineStage::Extract);
        cb.on_stage_complete(PipelineStage::Extract, 12);
        cb.on_stage_error(PipelineStage::Analyze, "timeout");
        cb.on_run_complete(false);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        for stage in PipelineStage::ANALYSIS {
            tracker.on_stage_start(stage);
            tracker.on_stage_complete(stage, 1);
        }
        tracker.on_stage_start(PipelineStage::Render);
        tracker.on_stage_error(PipelineStage::Render, "disk full");

        assert_eq!(
            *tracker.started.lock().unwrap(),
            vec![
                PipelineStage::Extract,
                PipelineStage::BuildPrompt,
                PipelineStage::Analyze,
                PipelineStage::Render
            ]
        );
        assert_eq!(tracker.completed.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stage_names() {
        assert_eq!(PipelineStage::BuildPrompt.to_string(), "build-prompt");
    }
}
