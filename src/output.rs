//! Run results and the artifacts written to disk.

use crate::document::StructuredDocument;
use crate::error::DoctagsError;
use crate::pipeline::input::DocumentKind;
use crate::pipeline::llm::Generation;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Width of the banner lines in the comparison report.
const BANNER_WIDTH: usize = 80;

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// How the source was interpreted.
    pub kind: DocumentKind,
    /// The generated DocTags and how they were obtained.
    pub generation: Generation,
    /// The parsed document.
    pub document: StructuredDocument,
    /// Markdown export of `document`.
    pub markdown: String,
    /// Textract summary, when the comparison was enabled.
    pub ocr_summary: Option<String>,
    /// Where the HTML export was written, if it was.
    pub html_path: Option<PathBuf>,
    /// Where the comparison report was written, if it was.
    pub report_path: Option<PathBuf>,
    pub stats: ConversionStats,
}

/// Timings and counts for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    pub load_duration_ms: u64,
    pub ocr_duration_ms: u64,
    pub generation_duration_ms: u64,
    pub total_duration_ms: u64,
    /// Number of Textract blocks; 0 when OCR was skipped or degraded.
    pub ocr_blocks: usize,
    /// Number of top-level items in the parsed document.
    pub items: usize,
}

/// Lay out the Markdown export and the OCR summary side by side.
pub fn format_comparison(markdown: &str, ocr_summary: &str) -> String {
    let sep = "=".repeat(BANNER_WIDTH);
    format!(
        "\n{sep}\n                           DOCLING vs TEXTRACT COMPARISON\n{sep}\n\n\
         === DOCLING OUTPUT ===\n\n{markdown}\n\n{sep}\n\n{ocr_summary}\n\n{sep}\n"
    )
}

/// Write the comparison report, replacing any existing file.
pub async fn persist_report(report: &str, path: &Path) -> Result<(), DoctagsError> {
    write_atomic(path, report.as_bytes()).await?;
    info!("Comparison saved to {}", path.display());
    Ok(())
}

/// Write to a temp file next to `path`, then rename over it.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), DoctagsError> {
    let write_err = |e| DoctagsError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

/// Open `path` in the system browser. Best-effort: failures are logged.
pub fn open_in_browser(path: &Path) {
    let target = match std::fs::canonicalize(path) {
        Ok(p) => p,
        Err(e) => {
            warn!("Cannot resolve {}: {}", path.display(), e);
            return;
        }
    };

    let mut cmd = if cfg!(target_os = "macos") {
        std::process::Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    } else {
        std::process::Command::new("xdg-open")
    };

    match cmd.arg(&target).spawn() {
        Ok(_) => info!("Opened {} in browser", target.display()),
        Err(e) => warn!("Could not open browser for {}: {}", target.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_layout() {
        let report = format_comparison("Hello World", "Textract analysis failed - check AWS credentials");
        let sep = "=".repeat(80);
        let expected = format!(
            "\n{sep}\n                           DOCLING vs TEXTRACT COMPARISON\n{sep}\n\n\
             === DOCLING OUTPUT ===\n\nHello World\n\n{sep}\n\n\
             Textract analysis failed - check AWS credentials\n\n{sep}\n"
        );
        assert_eq!(report, expected);
    }

    #[tokio::test]
    async fn persist_report_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comparison_output.txt");
        std::fs::write(&path, "a much longer stale report that must disappear").unwrap();

        persist_report("fresh", &path).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fresh");
        assert!(!dir.path().join("comparison_output.txt.tmp").exists());
    }

    #[tokio::test]
    async fn persist_report_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.txt");
        let report = format_comparison("# T", "=== AMAZON TEXTRACT OUTPUT ===\n\nline");

        persist_report(&report, &path).await.unwrap();
        let first = std::fs::read(&path).unwrap();
        persist_report(&report, &path).await.unwrap();
        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, report.as_bytes());
    }

    #[tokio::test]
    async fn write_into_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let err = persist_report("r", &blocker.join("report.txt")).await.unwrap_err();
        assert!(matches!(err, DoctagsError::OutputWriteFailed { .. }));
    }
}
