//! The single-document run: load → (ocr) → generate → parse → export → compare.
//!
//! Stages are strictly sequential. The only fatal failures are loading the
//! source, malformed DocTags and artifact writes; OCR and generation degrade
//! to placeholders instead of failing the run.

use crate::config::PipelineConfig;
use crate::document::{self, StructuredDocument};
use crate::error::DoctagsError;
use crate::output::{self, ConversionOutput, ConversionStats};
use crate::pipeline::llm::{self, GenerationRequest, ServedModel, VisionModel};
use crate::pipeline::ocr::{self, OcrAdapter};
use crate::pipeline::{encode, input};
use crate::progress::{ProgressCallback, Stage};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// External collaborators of a run.
pub struct Collaborators {
    pub model: Arc<dyn VisionModel>,
    pub ocr: OcrAdapter,
}

impl Collaborators {
    /// Production collaborators: an edgequake-llm provider for the model and
    /// the AWS credential chain for Textract.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, DoctagsError> {
        let provider = create_vision_provider(&config.provider_name, &config.model)?;
        Ok(Self {
            model: Arc::new(ServedModel::new(provider)),
            ocr: OcrAdapter::aws(&config.aws_profile, &config.aws_region),
        })
    }
}

/// Create the batch provider via [`ProviderFactory::create_llm_provider`],
/// which reads the matching API key from the environment.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, DoctagsError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DoctagsError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

struct Progress<'a>(Option<&'a ProgressCallback>);

impl Progress<'_> {
    fn start(&self, stage: Stage) {
        info!("Stage: {}", stage);
        if let Some(cb) = self.0 {
            cb.on_stage_start(stage);
        }
    }

    fn complete(&self, stage: Stage) {
        if let Some(cb) = self.0 {
            cb.on_stage_complete(stage);
        }
    }
}

/// Run the whole pipeline for `config.source`.
///
/// # Errors
/// - [`DoctagsError::FileNotFound`] / [`DoctagsError::DownloadFailed`] and
///   friends when the source cannot be loaded
/// - [`DoctagsError::MalformedTags`] when the generated DocTags don't parse;
///   the error carries the raw tags
/// - [`DoctagsError::OutputWriteFailed`] when an artifact can't be written
pub async fn convert(
    config: &PipelineConfig,
    collaborators: &Collaborators,
) -> Result<ConversionOutput, DoctagsError> {
    let total_start = Instant::now();
    let progress = Progress(config.progress_callback.as_ref());
    let mut stats = ConversionStats::default();
    info!("Starting run: {}", config.source);

    // ── Step 1: Load ─────────────────────────────────────────────────────
    progress.start(Stage::Load);
    let load_start = Instant::now();
    let loaded = input::load_with_progress(
        &config.source,
        config.download_timeout_secs,
        config.progress_callback.as_ref(),
    )
    .await?;
    stats.load_duration_ms = load_start.elapsed().as_millis() as u64;
    info!(
        "Loaded {:?} page: {}x{} px",
        loaded.kind,
        loaded.image.width(),
        loaded.image.height()
    );
    progress.complete(Stage::Load);

    // ── Step 2: OCR (optional) ───────────────────────────────────────────
    let ocr_summary = if config.compare_with_textract {
        progress.start(Stage::Ocr);
        let ocr_start = Instant::now();
        let result = collaborators.ocr.analyze(&loaded.bytes).await;
        stats.ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;
        stats.ocr_blocks = result.as_ref().map_or(0, |r| r.blocks.len());
        progress.complete(Stage::Ocr);
        Some(ocr::extract_summary(result.as_ref()))
    } else {
        debug!("Textract comparison disabled");
        None
    };

    // ── Step 3: Generate ─────────────────────────────────────────────────
    progress.start(Stage::Generate);
    let image = encode::encode_page(&loaded.image).map_err(|e| DoctagsError::ImageDecodeFailed {
        detail: format!("Image encoding failed: {}", e),
    })?;
    let request = GenerationRequest {
        prompt: config.prompt.clone(),
        image,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    };
    let generation = llm::generate(
        collaborators.model.as_ref(),
        &request,
        config.progress_callback.as_ref(),
    )
    .await;
    stats.generation_duration_ms = generation.duration_ms;
    progress.complete(Stage::Generate);

    // ── Step 4: Parse ────────────────────────────────────────────────────
    progress.start(Stage::Parse);
    let doc: StructuredDocument =
        document::parse_doctags(&generation.text, &loaded.image, &config.document_name)?;
    stats.items = doc.items.len();
    progress.complete(Stage::Parse);

    // ── Step 5: Export ───────────────────────────────────────────────────
    progress.start(Stage::Export);
    let markdown = document::export_markdown(&doc);
    let html_path = if config.show_in_browser {
        document::save_html(&doc, &config.output_html_path).await?;
        Some(config.output_html_path.clone())
    } else {
        None
    };
    progress.complete(Stage::Export);

    // ── Step 6: Compare ──────────────────────────────────────────────────
    let report_path = match ocr_summary.as_deref() {
        Some(summary) => {
            progress.start(Stage::Compare);
            if summary == ocr::OCR_FAILED_PLACEHOLDER {
                warn!("Textract comparison was enabled but failed. Check AWS credentials.");
            }
            let report = output::format_comparison(&markdown, summary);
            output::persist_report(&report, &config.comparison_output_path).await?;
            progress.complete(Stage::Compare);
            Some(config.comparison_output_path.clone())
        }
        None => None,
    };

    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!("Run complete in {}ms", stats.total_duration_ms);

    Ok(ConversionOutput {
        kind: loaded.kind,
        generation,
        document: doc,
        markdown,
        ocr_summary,
        html_path,
        report_path,
        stats,
    })
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    config: &PipelineConfig,
    collaborators: &Collaborators,
) -> Result<ConversionOutput, DoctagsError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DoctagsError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(config, collaborators))
}

