//! Configuration for a single DocTags run.
//!
//! Every option the pipeline reads lives in [`PipelineConfig`]. The struct is
//! built once (by the CLI from flags and environment, or by a library caller
//! through [`PipelineConfigBuilder`]) and then passed by reference to each
//! stage. No stage reads the process environment on its own.

use crate::error::DoctagsError;
use crate::progress::ProgressCallback;
use crate::prompts::{DEFAULT_DOCUMENT_NAME, DOCTAGS_PROMPT};
use std::fmt;
use std::path::PathBuf;

/// Source used when none is given.
pub const DEFAULT_SOURCE: &str =
    "https://www.cigna.com/static/www-cigna-com/docs/ifp/m-25-sbc-co-945220-b-connectflex9200rx.pdf";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "ds4sd/SmolDocling-256M-preview-mlx-bf16";

/// Default AWS profile for the first credential strategy.
pub const DEFAULT_AWS_PROFILE: &str = "ds";

/// Default AWS region for both credential strategies.
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Configuration for one run of the pipeline.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Document URL or local path. Default: [`DEFAULT_SOURCE`].
    pub source: String,

    /// Write the self-contained HTML export. Default: true.
    pub show_in_browser: bool,

    /// Run the Textract comparison and write the report. Default: true.
    pub compare_with_textract: bool,

    /// AWS profile tried first. Default: `ds`.
    pub aws_profile: String,

    /// AWS region used by every credential strategy. Default: `us-east-1`.
    pub aws_region: String,

    /// Model identifier or path. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// edgequake-llm provider name used for both generation strategies. Default: `openai`.
    pub provider_name: String,

    /// Instruction sent with the image. Default: [`DOCTAGS_PROMPT`].
    pub prompt: String,

    /// Maximum tokens the model may generate. Default: 4096.
    pub max_tokens: usize,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Timeout for fetching a URL source, in seconds. Default: 10.
    pub download_timeout_secs: u64,

    /// Where the HTML export is written. Default: `./output.html`.
    pub output_html_path: PathBuf,

    /// Where the comparison report is written. Default: `./comparison_output.txt`.
    pub comparison_output_path: PathBuf,

    /// Name of the structured document. Default: `SampleDocument`.
    pub document_name: String,

    /// Optional observer for stage and fragment events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            show_in_browser: true,
            compare_with_textract: true,
            aws_profile: DEFAULT_AWS_PROFILE.to_string(),
            aws_region: DEFAULT_AWS_REGION.to_string(),
            model: DEFAULT_MODEL.to_string(),
            provider_name: "openai".to_string(),
            prompt: DOCTAGS_PROMPT.to_string(),
            max_tokens: 4096,
            temperature: 0.0,
            download_timeout_secs: 10,
            output_html_path: PathBuf::from("./output.html"),
            comparison_output_path: PathBuf::from("./comparison_output.txt"),
            document_name: DEFAULT_DOCUMENT_NAME.to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("source", &self.source)
            .field("show_in_browser", &self.show_in_browser)
            .field("compare_with_textract", &self.compare_with_textract)
            .field("aws_profile", &self.aws_profile)
            .field("aws_region", &self.aws_region)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("output_html_path", &self.output_html_path)
            .field("comparison_output_path", &self.comparison_output_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.config.source = source.into();
        self
    }

    pub fn show_in_browser(mut self, v: bool) -> Self {
        self.config.show_in_browser = v;
        self
    }

    pub fn compare_with_textract(mut self, v: bool) -> Self {
        self.config.compare_with_textract = v;
        self
    }

    pub fn aws_profile(mut self, profile: impl Into<String>) -> Self {
        self.config.aws_profile = profile.into();
        self
    }

    pub fn aws_region(mut self, region: impl Into<String>) -> Self {
        self.config.aws_region = region.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = prompt.into();
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn output_html_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_html_path = path.into();
        self
    }

    pub fn comparison_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.comparison_output_path = path.into();
        self
    }

    pub fn document_name(mut self, name: impl Into<String>) -> Self {
        self.config.document_name = name.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, DoctagsError> {
        let c = &self.config;
        if c.source.trim().is_empty() {
            return Err(DoctagsError::InvalidConfig("source must not be empty".into()));
        }
        if c.max_tokens == 0 {
            return Err(DoctagsError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.download_timeout_secs == 0 {
            return Err(DoctagsError::InvalidConfig(
                "download timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PipelineConfig::default();
        assert!(c.show_in_browser);
        assert!(c.compare_with_textract);
        assert_eq!(c.aws_profile, "ds");
        assert_eq!(c.aws_region, "us-east-1");
        assert_eq!(c.model, DEFAULT_MODEL);
        assert_eq!(c.max_tokens, 4096);
        assert_eq!(c.download_timeout_secs, 10);
        assert_eq!(c.output_html_path, PathBuf::from("./output.html"));
        assert_eq!(
            c.comparison_output_path,
            PathBuf::from("./comparison_output.txt")
        );
        assert_eq!(c.prompt, DOCTAGS_PROMPT);
    }

    #[test]
    fn builder_rejects_zero_tokens() {
        let err = PipelineConfig::builder().max_tokens(0).build().unwrap_err();
        assert!(err.to_string().contains("max_tokens"));
    }

    #[test]
    fn builder_rejects_blank_source() {
        assert!(PipelineConfig::builder().source("  ").build().is_err());
    }

    #[test]
    fn debug_names_callback_without_printing_it() {
        let c = PipelineConfig::builder()
            .progress_callback(std::sync::Arc::new(crate::progress::NoopProgressCallback))
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("<dyn ConversionProgressCallback>"));
        assert!(dbg.contains("provider_name"));
    }
}
