//! OCR comparison using AWS Textract.
//!
//! Textract is a collaborator: its output is never fed back into the DocTags
//! conversion, only printed next to it. Every failure on this path degrades
//! to `None` and the run carries on.
//!
//! Credentials are resolved through an ordered list of [`CredentialSource`]s.
//! The first source that produces working credentials wins; when all of them
//! fail the adapter stops with [`OcrError::CredentialsUnavailable`] and the
//! service is never called.

use crate::error::OcrError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_textract::config::Region;
use aws_sdk_textract::error::DisplayErrorContext;
use aws_sdk_textract::primitives::Blob;
use aws_sdk_textract::types::{Block, BlockType, Document, FeatureType};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Placeholder summary when no OCR result is available.
pub const OCR_FAILED_PLACEHOLDER: &str = "Textract analysis failed - check AWS credentials";

/// Header of a successful summary.
pub const OCR_SUMMARY_HEADER: &str = "=== AMAZON TEXTRACT OUTPUT ===";

/// Classification of a Textract block.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum BlockKind {
    Page,
    Line,
    Word,
    Table,
    Cell,
    KeyValueSet,
    Other(String),
}

impl From<&BlockType> for BlockKind {
    fn from(block_type: &BlockType) -> Self {
        match block_type {
            BlockType::Page => BlockKind::Page,
            BlockType::Line => BlockKind::Line,
            BlockType::Word => BlockKind::Word,
            BlockType::Table => BlockKind::Table,
            BlockType::Cell => BlockKind::Cell,
            BlockType::KeyValueSet => BlockKind::KeyValueSet,
            other => BlockKind::Other(other.as_str().to_string()),
        }
    }
}

/// One detected region.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OcrBlock {
    pub kind: BlockKind,
    pub text: Option<String>,
    /// Confidence in percent, when the service reports one.
    pub confidence: Option<f32>,
}

impl OcrBlock {
    fn from_textract(block: &Block) -> Self {
        Self {
            kind: block
                .block_type()
                .map(BlockKind::from)
                .unwrap_or_else(|| BlockKind::Other("UNKNOWN".to_string())),
            text: block.text().map(str::to_string),
            confidence: block.confidence(),
        }
    }
}

/// The analysed document, blocks in service order.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct OcrResult {
    pub blocks: Vec<OcrBlock>,
}

/// A document-analysis service.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Analyse one page image. Called at most once per run.
    async fn analyze(&self, image_bytes: &[u8]) -> Result<OcrResult, OcrError>;
}

/// One way of obtaining an authenticated [`DocumentAnalyzer`].
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Short human-readable description, used in logs.
    fn describe(&self) -> String;

    /// Build an analyzer, failing if credentials cannot be resolved.
    async fn connect(&self) -> Result<Arc<dyn DocumentAnalyzer>, OcrError>;
}

/// Credentials from a named AWS profile.
#[derive(Debug, Clone)]
pub struct ProfileCredentials {
    pub profile: String,
    pub region: String,
}

#[async_trait]
impl CredentialSource for ProfileCredentials {
    fn describe(&self) -> String {
        format!("AWS profile '{}' in region '{}'", self.profile, self.region)
    }

    async fn connect(&self) -> Result<Arc<dyn DocumentAnalyzer>, OcrError> {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(&self.profile)
            .region(Region::new(self.region.clone()))
            .load()
            .await;
        TextractAnalyzer::from_sdk_config(&config).await
    }
}

/// Credentials from the default AWS provider chain.
#[derive(Debug, Clone)]
pub struct DefaultCredentials {
    pub region: String,
}

#[async_trait]
impl CredentialSource for DefaultCredentials {
    fn describe(&self) -> String {
        format!("default AWS credentials in region '{}'", self.region)
    }

    async fn connect(&self) -> Result<Arc<dyn DocumentAnalyzer>, OcrError> {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .load()
            .await;
        TextractAnalyzer::from_sdk_config(&config).await
    }
}

/// [`DocumentAnalyzer`] backed by `AnalyzeDocument` with TABLES and FORMS.
pub struct TextractAnalyzer {
    client: aws_sdk_textract::Client,
}

impl TextractAnalyzer {
    /// Create an analyzer after checking that `config` yields credentials.
    ///
    /// Resolving credentials here makes a missing or broken profile fail at
    /// connect time, so the next credential source gets its turn.
    pub async fn from_sdk_config(
        config: &aws_config::SdkConfig,
    ) -> Result<Arc<dyn DocumentAnalyzer>, OcrError> {
        let provider = config
            .credentials_provider()
            .ok_or_else(|| OcrError::MissingCredentials("no credentials provider configured".into()))?;
        provider
            .provide_credentials()
            .await
            .map_err(|e| OcrError::MissingCredentials(DisplayErrorContext(&e).to_string()))?;

        Ok(Arc::new(Self {
            client: aws_sdk_textract::Client::new(config),
        }))
    }
}

#[async_trait]
impl DocumentAnalyzer for TextractAnalyzer {
    async fn analyze(&self, image_bytes: &[u8]) -> Result<OcrResult, OcrError> {
        let document = Document::builder()
            .bytes(Blob::new(image_bytes.to_vec()))
            .build();

        let response = self
            .client
            .analyze_document()
            .document(document)
            .feature_types(FeatureType::Tables)
            .feature_types(FeatureType::Forms)
            .send()
            .await
            .map_err(|e| OcrError::classify(DisplayErrorContext(&e).to_string()))?;

        trace!("Textract response: {response:#?}");
        let blocks: Vec<OcrBlock> = response.blocks().iter().map(OcrBlock::from_textract).collect();
        debug!("Textract returned {} blocks", blocks.len());
        Ok(OcrResult { blocks })
    }
}

/// The OCR collaborator adapter: credential chain plus one analysis call.
pub struct OcrAdapter {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl OcrAdapter {
    /// Build an adapter trying `sources` in order.
    pub fn new(sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self { sources }
    }

    /// The standard AWS chain: named profile first, then default credentials.
    pub fn aws(profile: &str, region: &str) -> Self {
        Self::new(vec![
            Box::new(ProfileCredentials {
                profile: profile.to_string(),
                region: region.to_string(),
            }),
            Box::new(DefaultCredentials {
                region: region.to_string(),
            }),
        ])
    }

    /// Try every credential source in order; the first success wins.
    pub async fn connect(&self) -> Result<Arc<dyn DocumentAnalyzer>, OcrError> {
        let mut attempts = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let description = source.describe();
            match source.connect().await {
                Ok(analyzer) => {
                    info!("Using {}", description);
                    return Ok(analyzer);
                }
                Err(e) => {
                    debug!("Credential source {} failed: {}", description, e);
                    attempts.push(description);
                }
            }
        }
        Err(OcrError::CredentialsUnavailable { attempts })
    }

    /// Analyse `image_bytes`, degrading every failure to `None`.
    pub async fn analyze(&self, image_bytes: &[u8]) -> Option<OcrResult> {
        let outcome = match self.connect().await {
            Ok(analyzer) => analyzer.analyze(image_bytes).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => Some(result),
            Err(e) => {
                error!("{}", e);
                let guidance = e.guidance();
                if !guidance.is_empty() {
                    warn!("{}", guidance);
                }
                None
            }
        }
    }
}

/// Flatten an OCR result into the text block used by the comparison report.
pub fn extract_summary(result: Option<&OcrResult>) -> String {
    let Some(result) = result else {
        return OCR_FAILED_PLACEHOLDER.to_string();
    };

    let lines: Vec<&str> = result
        .blocks
        .iter()
        .filter(|b| b.kind == BlockKind::Line)
        .filter_map(|b| b.text.as_deref())
        .collect();
    let tables: Vec<&OcrBlock> = result
        .blocks
        .iter()
        .filter(|b| b.kind == BlockKind::Table)
        .collect();

    let mut table_output = String::new();
    if !tables.is_empty() {
        table_output.push_str(&format!("\n\nTables detected: {}\n", tables.len()));
        for (i, table) in tables.iter().enumerate() {
            let confidence = table
                .confidence
                .map(format_confidence)
                .unwrap_or_else(|| "N/A".to_string());
            table_output.push_str(&format!("Table {}: {}% confidence\n", i + 1, confidence));
        }
    }

    format!("{OCR_SUMMARY_HEADER}\n\n{}{table_output}", lines.join("\n"))
}

/// Shortest round-trip form, keeping one decimal for whole numbers (`99.0`).
fn format_confidence(c: f32) -> String {
    if c.is_finite() && c.fract() == 0.0 {
        format!("{c:.1}")
    } else {
        c.to_string()
    }
}
