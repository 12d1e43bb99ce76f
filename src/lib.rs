//! # edgequake-doctags
//!
//! Convert one document page into structured text with a DocTags vision
//! model, and compare the result with AWS Textract.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image / PDF (path or URL)
//!  │
//!  ├─ 1. Load     fetch or read; rasterise PDF page 1 at 2× via pdfium
//!  ├─ 2. OCR      optional Textract AnalyzeDocument (TABLES + FORMS)
//!  ├─ 3. Generate batch call, streaming fallback stopped at </doctag>
//!  ├─ 4. Parse    DocTags → StructuredDocument anchored on the page image
//!  ├─ 5. Export   Markdown (stdout) and self-contained HTML
//!  └─ 6. Compare  Markdown next to the Textract summary, written to disk
//! ```
//!
//! OCR and generation failures degrade to placeholder text; only loading,
//! malformed DocTags and artifact writes fail a run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doctags::{convert, Collaborators, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .source("page.png")
//!         .compare_with_textract(false)
//!         .build()?;
//!     let collaborators = Collaborators::from_config(&config)?;
//!     let output = convert(&config, &collaborators).await?;
//!     println!("{}", output.markdown);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `doctags` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//! | `bundled` | off     | Embeds the pdfium shared library through `pdfium-auto` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use convert::{convert, convert_sync, Collaborators};
pub use document::{export_markdown, parse_doctags, render_html, save_html, StructuredDocument};
pub use error::{DoctagsError, GenerationError, OcrError};
pub use output::{format_comparison, persist_report, ConversionOutput, ConversionStats};
pub use pipeline::input::{load, load_with_progress, DocumentKind, LoadedDocument};
pub use pipeline::llm::{
    generate, FragmentStream, Generation, GenerationRequest, GenerationSource, GenerationStrategy,
    ServedModel, VisionModel,
};
pub use pipeline::ocr::{
    extract_summary, CredentialSource, DocumentAnalyzer, OcrAdapter, OcrBlock, OcrResult,
};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
