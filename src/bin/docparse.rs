//! CLI binary for edgequake-docparse.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, drives one document or a directory of documents, and
//! prints a per-document summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docparse::batch::directory_requests;
use edgequake_docparse::output::OutcomeView;
use edgequake_docparse::{
    BatchDriver, BatchProgressCallback, BatchReport, DocumentRequest, DropMode, PipelineConfig,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar over documents, with one log line per finished
/// document. Documents may finish out of order when `--workers > 1`.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Parsing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Parsing {total_documents} document(s)…"))
        ));
    }

    fn on_document_start(&self, name: &str, _index: usize, _total: usize) {
        self.bar.set_message(name.to_string());
    }

    fn on_document_complete(&self, name: &str, index: usize, total: usize) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            green("✓"),
            index + 1,
            total,
            name
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, name: &str, index: usize, total: usize, error: &str) {
        let first_line = error.lines().next().unwrap_or_default();
        let msg: String = if first_line.chars().count() > 80 {
            first_line.chars().take(79).chain(['\u{2026}']).collect()
        } else {
            first_line.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            name,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, succeeded: usize) {
        self.bar.finish_and_clear();
        let failed = total_documents.saturating_sub(succeeded);
        if failed == 0 {
            eprintln!(
                "{} {} document(s) parsed successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents parsed  ({} failed)",
                if failed == total_documents {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&succeeded.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Parse with precomputed model data, artifacts under /out/report/
  docparse report.pdf --method txt --model-json report_model.json -o /out

  # Let the classifier decide; run VLM inference since no model data is given
  docparse scan.pdf --method auto

  # Every PDF in a directory, 4 at a time, 10 minutes per document
  docparse ./inbox -o /out -j 4 --timeout 600

  # Dry run: run every stage but write nothing, print the summary as JSON
  docparse report.pdf --model-json report_model.json --no-publish --json

OUTPUT LAYOUT:
  {output}/{name}/
    images/                      figure and table crops
    {name}_model.json            model record
    {name}_middle.json           intermediate parse record
    {name}_content_list.json     content list
    {name}.md                    Markdown

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (in-process inference)
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium; otherwise the system library is used
"#;

/// Parse PDFs into model, middle, content-list and Markdown artifacts.
#[derive(Parser, Debug)]
#[command(
    name = "docparse",
    version,
    about = "Parse PDFs into model, middle, content-list and Markdown artifacts",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// A PDF file, or a directory whose *.pdf files are parsed as a batch.
    input: PathBuf,

    /// Parse method: auto, ocr or txt.
    #[arg(short, long, env = "DOCPARSE_METHOD", default_value = "ocr",
          value_parser = ["auto", "ocr", "txt"])]
    method: String,

    /// Precomputed model data (JSON array). Single-document mode only.
    #[arg(long, env = "DOCPARSE_MODEL_JSON")]
    model_json: Option<PathBuf>,

    /// Output root; each document gets `{output}/{name}/`. Default: the input's directory.
    #[arg(short, long, env = "DOCPARSE_OUTPUT")]
    output: Option<PathBuf>,

    /// Run every stage but write no files.
    #[arg(long, env = "DOCPARSE_NO_PUBLISH")]
    no_publish: bool,

    /// Fail documents without model data instead of running VLM inference.
    #[arg(long, env = "DOCPARSE_NO_INSIDE_MODEL")]
    no_inside_model: bool,

    /// Handling of pages flagged for dropping: none, single-page, whole-pdf.
    #[arg(long, env = "DOCPARSE_DROP_MODE", default_value = "none")]
    drop_mode: String,

    /// Documents processed concurrently.
    #[arg(short = 'j', long, env = "DOCPARSE_WORKERS", default_value_t = 1)]
    workers: usize,

    /// Per-document time budget in seconds.
    #[arg(long, env = "DOCPARSE_TIMEOUT")]
    timeout: Option<u64>,

    /// Rendering DPI for figure crops and inference (72–400).
    #[arg(long, env = "DOCPARSE_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Longest rendered page edge in pixels.
    #[arg(long, env = "DOCPARSE_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Mean characters per page at which `auto` treats a PDF as text-based.
    #[arg(long, env = "DOCPARSE_MIN_CHARS", default_value_t = 50)]
    min_chars_per_page: usize,

    /// VLM model ID used for in-process inference.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// VLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Concurrent VLM calls per document.
    #[arg(long, env = "DOCPARSE_INFERENCE_CONCURRENCY", default_value_t = 4)]
    inference_concurrency: usize,

    /// Sampling temperature for VLM calls (0.0–2.0).
    #[arg(long, env = "DOCPARSE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Maximum output tokens per page.
    #[arg(long, env = "DOCPARSE_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Retries per page on VLM failure.
    #[arg(long, env = "DOCPARSE_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call VLM timeout in seconds.
    #[arg(long, env = "DOCPARSE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Path to a text file containing a custom transcription prompt.
    #[arg(long, env = "DOCPARSE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOCPARSE_PASSWORD")]
    password: Option<String>,

    /// Print the batch outcome as JSON on stdout.
    #[arg(long, env = "DOCPARSE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCPARSE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCPARSE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCPARSE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Collect requests ─────────────────────────────────────────────────
    let requests = if cli.input.is_dir() {
        if cli.model_json.is_some() {
            anyhow::bail!("--model-json applies to a single document, not a directory");
        }
        let output = cli.output.as_deref().unwrap_or(&cli.input);
        directory_requests(&cli.input, &cli.method, Some(output))
            .await
            .with_context(|| format!("Failed to list {}", cli.input.display()))?
    } else {
        vec![single_request(&cli)]
    };
    if requests.is_empty() {
        anyhow::bail!("No PDF files found in {}", cli.input.display());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let report = BatchDriver::new(config).run(&requests).await;

    if cli.json {
        let views: Vec<OutcomeView<'_>> = report.documents.iter().map(OutcomeView::from).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&views).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        print_summary(&report, show_progress);
    }

    if report.failed() > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn single_request(cli: &Cli) -> DocumentRequest {
    let mut request = DocumentRequest::new(&cli.input).method(&cli.method);
    if let Some(ref path) = cli.model_json {
        request = request.model_json(path);
    }
    if let Some(ref dir) = cli.output {
        request = request.output_root(dir);
    }
    request
}

/// One line per document; failures always get their full error.
fn print_summary(report: &BatchReport, progress_shown: bool) {
    for outcome in &report.documents {
        match &outcome.result {
            Ok(summary) => {
                if progress_shown {
                    continue;
                }
                let missing = summary
                    .publish
                    .as_ref()
                    .map(|p| p.failures.len())
                    .unwrap_or(0);
                eprintln!(
                    "{}  {}  {} pages, {} blocks, {} images  {}ms  →  {}{}",
                    green("✔"),
                    bold(&summary.name),
                    summary.pages,
                    summary.content_blocks,
                    summary.images,
                    summary.duration_ms,
                    summary.output_dir.display(),
                    if missing > 0 {
                        red(&format!("  ({missing} artifacts not written)"))
                    } else {
                        String::new()
                    }
                );
            }
            Err(e) => eprintln!(
                "{}  {}\n{}",
                red("✘"),
                bold(&outcome.input.display().to_string()),
                dim(&e.to_string())
            ),
        }
    }
    if !progress_shown {
        eprintln!(
            "{}/{} documents succeeded in {}ms",
            report.succeeded(),
            report.total(),
            report.duration_ms
        );
    }
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let drop_mode: DropMode = cli.drop_mode.parse().context("Invalid --drop-mode")?;

    let mut builder = PipelineConfig::builder()
        .publish(!cli.no_publish)
        .use_inside_model(!cli.no_inside_model)
        .drop_mode(drop_mode)
        .workers(cli.workers)
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_pixels)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .min_chars_per_page(cli.min_chars_per_page)
        .inference_concurrency(cli.inference_concurrency)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout);

    if let Some(secs) = cli.timeout {
        builder = builder.document_timeout_secs(secs);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(ref path) = cli.system_prompt {
        builder = builder.system_prompt(read_prompt(path).await?);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read system prompt from {:?}", path))
}
