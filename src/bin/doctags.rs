//! CLI binary for edgequake-doctags.
//!
//! A thin shim over the library crate that maps flags and environment
//! variables to `PipelineConfig`, runs one page and prints the results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_doctags::{
    convert, output, Collaborators, ConversionProgressCallback, DoctagsError, GenerationStrategy,
    PipelineConfig, ProgressCallback, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner on stderr for the current stage; DocTags fragments from the
/// streaming fallback are echoed to stdout as they arrive.
struct CliProgressCallback {
    bar: ProgressBar,
    streamed: AtomicBool,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            streamed: AtomicBool::new(false),
        })
    }

    /// Whether DocTags fragments were already echoed to stdout.
    fn streamed(&self) -> bool {
        self.streamed.load(Ordering::Relaxed)
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
        if self.streamed.load(Ordering::Relaxed) {
            println!("\n");
        }
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        let msg = match stage {
            Stage::Load => "Loading document…",
            Stage::Ocr => "Running Textract analysis…",
            Stage::Generate => "Generating DocTags…",
            Stage::Parse => "Parsing DocTags…",
            Stage::Export => "Exporting…",
            Stage::Compare => "Writing comparison…",
        };
        self.bar.set_prefix(stage.to_string());
        self.bar.set_message(msg);
    }

    fn on_fragment(&self, fragment: &str) {
        let first = !self.streamed.swap(true, Ordering::Relaxed);
        self.bar.suspend(|| {
            if first {
                print!("DocTags: \n\n");
            }
            print!("{fragment}");
            let _ = io::stdout().flush();
        });
    }

    fn on_pdf_engine_download(&self) {
        self.bar.set_message("Downloading PDF engine (first run only)…");
    }

    fn on_strategy_failed(&self, strategy: GenerationStrategy, error: &str) {
        self.bar.println(format!(
            "{} {} generation failed: {}",
            red("✗"),
            strategy,
            dim(error)
        ));
    }
}

/// Only the literal `true`, in any case, enables a toggle.
fn parse_toggle(s: &str) -> Result<bool, String> {
    Ok(s.trim().eq_ignore_ascii_case("true"))
}

const AFTER_HELP: &str = r#"ENVIRONMENT VARIABLES:
  SHOW_IN_BROWSER         Write and open the HTML export (true/false)
  COMPARE_WITH_TEXTRACT   Compare with AWS Textract (true/false)
  AWS_PROFILE             Named AWS profile tried before the default chain
  AWS_REGION              AWS region for Textract
  MODEL_PATH              DocTags model identifier
  IMAGE_URL               Image or PDF to convert (URL or path)
  EDGEQUAKE_LLM_PROVIDER  Model provider (openai, ollama, lmstudio, openrouter, …)
  OPENAI_API_KEY, OPENAI_API_BASE, OLLAMA_HOST, …
                          Read by the selected provider

  A .env file in the working directory is loaded first.

EXAMPLES:
  doctags page.png --compare-with-textract false
  doctags https://example.com/form.pdf --aws-profile work
"#;

/// Convert one document page to DocTags, Markdown and HTML.
#[derive(Parser, Debug)]
#[command(
    name = "doctags",
    version,
    about = "Convert a document page to DocTags, Markdown and HTML, and compare with AWS Textract",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image or PDF to convert: local path or URL.
    #[arg(env = "IMAGE_URL", default_value = edgequake_doctags::config::DEFAULT_SOURCE)]
    source: String,

    /// Write the HTML export and open it in the browser.
    #[arg(long, env = "SHOW_IN_BROWSER", default_value = "true",
          action = clap::ArgAction::Set, value_parser = parse_toggle)]
    show_in_browser: bool,

    /// Run AWS Textract and write the comparison report.
    #[arg(long, env = "COMPARE_WITH_TEXTRACT", default_value = "true",
          action = clap::ArgAction::Set, value_parser = parse_toggle)]
    compare_with_textract: bool,

    /// AWS profile tried before the default credential chain.
    #[arg(long, env = "AWS_PROFILE", default_value = edgequake_doctags::config::DEFAULT_AWS_PROFILE)]
    aws_profile: String,

    /// AWS region for Textract.
    #[arg(long, env = "AWS_REGION", default_value = edgequake_doctags::config::DEFAULT_AWS_REGION)]
    aws_region: String,

    /// DocTags model identifier.
    #[arg(long, env = "MODEL_PATH", default_value = edgequake_doctags::config::DEFAULT_MODEL)]
    model: String,

    /// edgequake-llm provider serving the model.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER", default_value = "openai")]
    provider: String,

    /// Where to write the HTML export.
    #[arg(long, env = "OUTPUT_HTML_PATH", default_value = "./output.html")]
    output_html: PathBuf,

    /// Where to write the comparison report.
    #[arg(long, env = "COMPARISON_OUTPUT_PATH", default_value = "./comparison_output.txt")]
    comparison_output: PathBuf,

    /// Maximum tokens the model may generate.
    #[arg(long, env = "DOCTAGS_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCTAGS_DOWNLOAD_TIMEOUT", default_value_t = 10)]
    download_timeout: u64,

    /// Write the HTML file but don't launch a browser.
    #[arg(long, env = "DOCTAGS_NO_OPEN")]
    no_open: bool,

    /// Output structured JSON (ConversionOutput) instead of text.
    #[arg(long)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCTAGS_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Ensure PDFium engine is available for PDF sources ────────────────
    if cli.source.to_lowercase().ends_with(".pdf") && !pdfium_auto::is_pdfium_cached() {
        eprintln!("{}", dim("Downloading PDF engine (first run only)…"));
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress = if cli.json { None } else { Some(CliProgressCallback::new()) };

    let mut builder = PipelineConfig::builder()
        .source(cli.source.clone())
        .show_in_browser(cli.show_in_browser)
        .compare_with_textract(cli.compare_with_textract)
        .aws_profile(cli.aws_profile.clone())
        .aws_region(cli.aws_region.clone())
        .model(cli.model.clone())
        .provider_name(cli.provider.clone())
        .max_tokens(cli.max_tokens)
        .download_timeout_secs(cli.download_timeout)
        .output_html_path(cli.output_html.clone())
        .comparison_output_path(cli.comparison_output.clone());
    if let Some(ref cb) = progress {
        builder = builder.progress_callback(Arc::clone(cb) as ProgressCallback);
    }
    let config = builder.build().context("Invalid configuration")?;

    let collaborators =
        Collaborators::from_config(&config).context("Failed to set up the vision model")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let result = convert(&config, &collaborators).await;
    if let Some(ref cb) = progress {
        cb.finish();
    }

    let out = match result {
        Ok(out) => out,
        Err(DoctagsError::MalformedTags { detail, doctags }) => {
            println!("DocTags: \n\n{doctags}\n");
            eprintln!("{} Error processing document: {}", red("✗"), detail);
            eprintln!("Make sure the model output contains valid DocTags format.");
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Conversion failed"),
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&out).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    if !progress.as_ref().is_some_and(|cb| cb.streamed()) {
        println!("DocTags: \n\n{}\n\n", out.generation.text);
    }
    println!("Markdown: \n\n{}", out.markdown);

    if let Some(ref path) = out.html_path {
        eprintln!("{} HTML written to {}", green("✓"), bold(&path.display().to_string()));
        if !cli.no_open {
            output::open_in_browser(path);
        }
    }

    if let (Some(summary), Some(path)) = (&out.ocr_summary, &out.report_path) {
        println!("{}", output::format_comparison(&out.markdown, summary));
        eprintln!(
            "{} Detailed comparison saved to: {}",
            green("✓"),
            bold(&path.display().to_string())
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_accept_only_literal_true() {
        assert_eq!(parse_toggle("TRUE"), Ok(true));
        assert_eq!(parse_toggle(" true "), Ok(true));
        assert_eq!(parse_toggle("1"), Ok(false));
        assert_eq!(parse_toggle("yes"), Ok(false));
    }

    #[test]
    fn echoed_fragments_mark_doctags_as_printed() {
        let cb = CliProgressCallback::new();
        assert!(!cb.streamed());
        cb.on_pdf_engine_download();
        cb.on_stage_start(Stage::Generate);
        assert!(!cb.streamed());
        cb.on_fragment("<doctag>");
        assert!(cb.streamed());
        cb.finish();
    }
}
