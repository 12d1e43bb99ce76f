//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the run moves through its stages and as the streaming fallback
//! produces DocTags fragments.
//!
//! # Example
//!
//! ```rust
//! use edgequake_doctags::{ConversionProgressCallback, PipelineConfig, Stage};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl ConversionProgressCallback for Echo {
//!     fn on_stage_start(&self, stage: Stage) {
//!         eprintln!("→ {stage}");
//!     }
//!     fn on_fragment(&self, fragment: &str) {
//!         print!("{fragment}");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(Echo) as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::llm::GenerationStrategy;
use std::fmt;
use std::sync::Arc;

/// The stages of one run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Ocr,
    Generate,
    Parse,
    Export,
    Compare,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Ocr => "textract",
            Stage::Generate => "generate",
            Stage::Parse => "parse",
            Stage::Export => "export",
            Stage::Compare => "compare",
        };
        f.write_str(name)
    }
}

/// Called by the pipeline as it runs.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes, successfully or degraded.
    fn on_stage_complete(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called for every fragment the streaming strategy appends, in order.
    fn on_fragment(&self, fragment: &str) {
        let _ = fragment;
    }

    /// Called when `strategy` failed and the driver moves on.
    fn on_strategy_failed(&self, strategy: GenerationStrategy, error: &str) {
        let _ = (strategy, error);
    }

    /// Called before a PDF is rendered while the pdfium library is not yet
    /// cached locally; binding it will download it first.
    fn on_pdf_engine_download(&self) {}
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ConversionProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("start:{stage}"));
        }

        fn on_stage_complete(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("done:{stage}"));
        }

        fn on_fragment(&self, fragment: &str) {
            self.events.lock().unwrap().push(format!("frag:{fragment}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Load);
        cb.on_fragment("<doctag>");
        cb.on_strategy_failed(GenerationStrategy::Batch, "boom");
        cb.on_pdf_engine_download();
        cb.on_stage_complete(Stage::Load);
    }

    #[test]
    fn recorder_keeps_event_order() {
        let rec = Recorder::default();
        rec.on_stage_start(Stage::Generate);
        rec.on_fragment("<doctag>");
        rec.on_fragment("</doctag>");
        rec.on_stage_complete(Stage::Generate);

        let events = rec.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "start:generate",
                "frag:<doctag>",
                "frag:</doctag>",
                "done:generate"
            ]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start(Stage::Ocr);
    }
}
