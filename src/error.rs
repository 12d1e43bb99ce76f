//! Error types for the edgequake-doctags library.
//!
//! Three error types reflect the three ways a stage can fail:
//!
//! * [`DoctagsError`]: **Fatal**: the run cannot continue (source missing,
//!   download failed, DocTags unparseable, artifact not writable). Returned as
//!   `Err(DoctagsError)` from [`crate::convert::convert`] and the stage
//!   functions it calls.
//!
//! * [`GenerationError`]: a single generation strategy failed. Never leaves
//!   [`crate::pipeline::llm::generate`]: the driver falls through to the next
//!   strategy and finally to a placeholder tag string.
//!
//! * [`OcrError`]: the Textract comparison failed. Never leaves
//!   [`crate::pipeline::ocr::OcrAdapter::analyze`]: the adapter logs guidance
//!   and yields `None`, and the comparison report embeds a placeholder.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-doctags library.
#[derive(Debug, Error)]
pub enum DoctagsError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Local read failed for a reason other than a missing file or permissions.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input string is empty or otherwise unusable.
    #[error("Invalid input '{input}': not a file path or a valid URL")]
    InvalidInput { input: String },

    /// URL was syntactically valid but the download failed (network error or non-2xx).
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes are not a decodable raster image.
    #[error("Could not decode image: {detail}")]
    ImageDecodeFailed { detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not open or render the first page.
    #[error("Rasterisation of the first PDF page failed: {detail}")]
    RasterisationFailed { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, you can:\n\
  • Check your internet connection and try again.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider could not be created (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Parse errors ──────────────────────────────────────────────────────
    /// The model output cannot be interpreted as DocTags.
    ///
    /// `doctags` keeps the raw model output so callers can still show it.
    #[error("Malformed DocTags: {detail}\nMake sure the model output contains valid DocTags format.")]
    MalformedTags { detail: String, doctags: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DoctagsError {
    /// Build a [`DoctagsError::MalformedTags`] for `doctags`.
    pub fn malformed(detail: impl Into<String>, doctags: &str) -> Self {
        DoctagsError::MalformedTags {
            detail: detail.into(),
            doctags: doctags.to_string(),
        }
    }
}

/// Failure of one generation strategy.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// The provider rejected or failed the blocking call.
    #[error("model call failed: {0}")]
    Provider(String),

    /// The provider could not open a stream.
    #[error("stream request failed: {0}")]
    Request(String),

    /// The stream broke mid-way.
    #[error("stream interrupted: {0}")]
    Stream(String),
}

/// Failure of the Textract comparison path.
#[derive(Debug, Clone, Error)]
pub enum OcrError {
    /// Every credential strategy failed.
    #[error("AWS credentials not found (tried: {})", attempts.join(", "))]
    CredentialsUnavailable { attempts: Vec<String> },

    /// Credentials resolved but the service refused them.
    #[error("AWS credentials are expired or invalid: {0}")]
    ExpiredCredentials(String),

    /// The SDK could not find credentials at call time.
    #[error("AWS credentials not found: {0}")]
    MissingCredentials(String),

    /// Any other service or transport failure.
    #[error("Error with Textract: {0}")]
    Api(String),
}

impl OcrError {
    /// Classify a raw SDK error message.
    ///
    /// Matching is a plain case-insensitive substring test: anything mentioning
    /// a security token or invalidity is treated as expired credentials.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("security token") || lower.contains("invalid") {
            OcrError::ExpiredCredentials(message)
        } else if lower.contains("no credentials") || lower.contains("loading credentials") {
            OcrError::MissingCredentials(message)
        } else {
            OcrError::Api(message)
        }
    }

    /// Operator guidance printed alongside the error.
    pub fn guidance(&self) -> &'static str {
        match self {
            OcrError::CredentialsUnavailable { .. } | OcrError::MissingCredentials(_) => {
                "Please run 'aws sso login' to refresh your SSO session, or configure credentials:\n\
1. Run 'aws configure sso' for SSO setup\n\
2. Run 'aws configure' for access keys\n\
3. Set environment variables: AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY"
            }
            OcrError::ExpiredCredentials(_) => {
                "Please run 'aws sso login' to refresh your SSO session."
            }
            OcrError::Api(_) => "",
        }
    }
}
