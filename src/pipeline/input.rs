//! Input resolution: turn a user-supplied path or URL into a decoded page.
//!
//! A URL is fetched once with a bounded timeout; a path is read from disk.
//! Whether the bytes are a PDF is decided from the file extension, or for a
//! URL also from the `Content-Type` header. Magic bytes are not inspected:
//! the caller-supplied signals are trusted as-is.

use crate::error::DoctagsError;
use crate::pipeline::render;
use crate::progress::ProgressCallback;
use image::DynamicImage;
use reqwest::header::CONTENT_TYPE;
use std::path::PathBuf;
use tracing::{debug, info};

/// What kind of document the source bytes were treated as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum DocumentKind {
    Pdf,
    Image,
}

/// A loaded page, ready for OCR and generation.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// The decoded page image (first page for PDFs).
    pub image: DynamicImage,
    /// Bytes to send to the OCR service: the original file for images, the
    /// PNG rendering of page 1 for PDFs.
    pub bytes: Vec<u8>,
    /// How the source was interpreted.
    pub kind: DocumentKind,
}

/// Check if the input string is a URL (parses with a non-empty scheme).
pub fn is_url(input: &str) -> bool {
    reqwest::Url::parse(input)
        .map(|u| !u.scheme().is_empty())
        .unwrap_or(false)
}

/// Whether a file name or URL path names a PDF.
fn has_pdf_extension(name: &str) -> bool {
    name.to_lowercase().ends_with(".pdf")
}

/// Load `source` (URL or path) into a [`LoadedDocument`].
pub async fn load(source: &str, timeout_secs: u64) -> Result<LoadedDocument, DoctagsError> {
    load_with_progress(source, timeout_secs, None).await
}

/// [`load`], reporting a first-run pdfium download to `progress`, including
/// for URLs recognised as PDF only by their `Content-Type`.
pub async fn load_with_progress(
    source: &str,
    timeout_secs: u64,
    progress: Option<&ProgressCallback>,
) -> Result<LoadedDocument, DoctagsError> {
    let source = source.trim();
    if source.is_empty() {
        return Err(DoctagsError::InvalidInput {
            input: source.to_string(),
        });
    }

    let (raw, is_pdf) = if is_url(source) {
        fetch_url(source, timeout_secs).await?
    } else {
        (read_local(source).await?, has_pdf_extension(source))
    };

    if is_pdf {
        announce_pdf_engine(progress, pdfium_auto::is_pdfium_cached());
        info!("Rasterising first PDF page ({} bytes)", raw.len());
        let (image, png) = render::render_first_page(raw).await?;
        Ok(LoadedDocument {
            image,
            bytes: png,
            kind: DocumentKind::Pdf,
        })
    } else {
        let image = image::load_from_memory(&raw).map_err(|e| DoctagsError::ImageDecodeFailed {
            detail: e.to_string(),
        })?;
        debug!("Decoded image {}x{}", image.width(), image.height());
        Ok(LoadedDocument {
            image,
            bytes: raw,
            kind: DocumentKind::Image,
        })
    }
}

fn announce_pdf_engine(progress: Option<&ProgressCallback>, cached: bool) {
    if cached {
        return;
    }
    info!("Downloading PDF engine (first run only)");
    if let Some(cb) = progress {
        cb.on_pdf_engine_download();
    }
}

/// Read a local file, mapping I/O failures to the matching error.
async fn read_local(path_str: &str) -> Result<Vec<u8>, DoctagsError> {
    let path = PathBuf::from(path_str);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read local document: {} ({} bytes)", path.display(), bytes.len());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(DoctagsError::FileNotFound { path })
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(DoctagsError::PermissionDenied { path })
        }
        Err(source) => Err(DoctagsError::ReadFailed { path, source }),
    }
}

/// Fetch a URL once. Returns the body and whether it should be treated as a PDF.
async fn fetch_url(url: &str, timeout_secs: u64) -> Result<(Vec<u8>, bool), DoctagsError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DoctagsError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let timeout_or_failed = |e: reqwest::Error| {
        if e.is_timeout() {
            DoctagsError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            DoctagsError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(timeout_or_failed)?;

    if !response.status().is_success() {
        return Err(DoctagsError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type_is_pdf = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("application/pdf"))
        .unwrap_or(false);
    let is_pdf = has_pdf_extension(url) || content_type_is_pdf;

    let bytes = response.bytes().await.map_err(timeout_or_failed)?;
    info!("Downloaded {} bytes (pdf: {})", bytes.len(), is_pdf);

    Ok((bytes.to_vec(), is_pdf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/page.png"));
        assert!(is_url("file:///tmp/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url("./scans/page.png"));
        assert!(!is_url(""));
    }

    #[test]
    fn pdf_extension_is_case_insensitive() {
        assert!(has_pdf_extension("report.PDF"));
        assert!(has_pdf_extension("https://example.com/a/b.pdf"));
        assert!(!has_pdf_extension("https://example.com/a/b.pdf?download=1"));
        assert!(!has_pdf_extension("scan.png"));
    }

    #[tokio::test]
    async fn missing_local_file_is_not_found() {
        let err = load("/definitely/not/here.png", 5).await.unwrap_err();
        assert!(matches!(err, DoctagsError::FileNotFound { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn blank_source_is_invalid() {
        let err = load("   ", 5).await.unwrap_err();
        assert!(matches!(err, DoctagsError::InvalidInput { .. }));
    }

    #[derive(Default)]
    struct EngineNotices(std::sync::atomic::AtomicUsize);

    impl crate::progress::ConversionProgressCallback for EngineNotices {
        fn on_pdf_engine_download(&self) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn engine_download_is_announced_only_when_not_cached() {
        let notices = std::sync::Arc::new(EngineNotices::default());
        let cb: ProgressCallback = notices.clone();
        announce_pdf_engine(Some(&cb), true);
        assert_eq!(notices.0.load(std::sync::atomic::Ordering::SeqCst), 0);
        announce_pdf_engine(Some(&cb), false);
        assert_eq!(notices.0.load(std::sync::atomic::Ordering::SeqCst), 1);
        announce_pdf_engine(None, false);
    }

    #[tokio::test]
    async fn image_source_never_announces_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        image::DynamicImage::new_rgb8(4, 4).save(&path).unwrap();
        let notices = std::sync::Arc::new(EngineNotices::default());
        let cb: ProgressCallback = notices.clone();
        let loaded = load_with_progress(path.to_str().unwrap(), 5, Some(&cb)).await.unwrap();
        assert_eq!(loaded.kind, DocumentKind::Image);
        assert_eq!(notices.0.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
