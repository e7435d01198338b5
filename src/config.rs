//! Configuration types for the parse pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The config is an explicit value threaded
//! into the selector, runner and batch driver; nothing in the pipeline reads
//! ambient global state, so two pipelines with different settings can run
//! side by side in one process.

use crate::error::DocParseError;
use crate::progress::BatchProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for a batch of document parses.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_docparse::{DropMode, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .publish(true)
///     .use_inside_model(false)
///     .drop_mode(DropMode::SinglePage)
///     .workers(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Persist the four artifacts and extracted images. Default: true.
    ///
    /// When false every stage still runs and the [`crate::output::RunResult`]
    /// is fully populated, but nothing is written under the output directory.
    pub publish: bool,

    /// Allow the in-process inference engine to produce model data when none
    /// was supplied. Default: true.
    pub use_inside_model: bool,

    /// How the formatters treat pages flagged `need_drop`. Default: [`DropMode::None`].
    pub drop_mode: DropMode,

    /// Name of the image sub-directory under each document's output
    /// directory. Its basename is the image-path prefix used in the content
    /// list and Markdown. Default: `images`.
    pub image_dir_name: String,

    /// Number of documents processed concurrently by the batch driver. Default: 1.
    pub workers: usize,

    /// Optional wall-clock budget per document in seconds. Default: None.
    pub document_timeout_secs: Option<u64>,

    /// Mean non-whitespace characters per page at or above which `auto`
    /// classifies a document as text-extractable. Default: 50.
    pub min_chars_per_page: usize,

    /// Rendering DPI for page rasters. Range: 72–400. Default: 200.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Concurrent VLM calls per document during in-process inference. Default: 4.
    pub inference_concurrency: usize,

    /// LLM model identifier. If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for VLM completions. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the VLM may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient VLM failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-VLM-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom VLM system prompt. If None, uses built-in default.
    pub system_prompt: Option<String>,

    /// Receives per-document batch events.
    pub progress_callback: Option<Arc<dyn BatchProgressCallback>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            publish: true,
            use_inside_model: true,
            drop_mode: DropMode::default(),
            image_dir_name: "images".to_string(),
            workers: 1,
            document_timeout_secs: None,
            min_chars_per_page: 50,
            dpi: 200,
            max_rendered_pixels: 2000,
            inference_concurrency: 4,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            password: None,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("publish", &self.publish)
            .field("use_inside_model", &self.use_inside_model)
            .field("drop_mode", &self.drop_mode)
            .field("image_dir_name", &self.image_dir_name)
            .field("workers", &self.workers)
            .field("document_timeout_secs", &self.document_timeout_secs)
            .field("min_chars_per_page", &self.min_chars_per_page)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_retries", &self.max_retries)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
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
    pub fn publish(mut self, v: bool) -> Self {
        self.config.publish = v;
        self
    }

    pub fn use_inside_model(mut self, v: bool) -> Self {
        self.config.use_inside_model = v;
        self
    }

    pub fn drop_mode(mut self, mode: DropMode) -> Self {
        self.config.drop_mode = mode;
        self
    }

    pub fn image_dir_name(mut self, name: impl Into<String>) -> Self {
        self.config.image_dir_name = name.into();
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn document_timeout_secs(mut self, secs: u64) -> Self {
        self.config.document_timeout_secs = Some(secs);
        self
    }

    pub fn min_chars_per_page(mut self, n: usize) -> Self {
        self.config.min_chars_per_page = n;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn inference_concurrency(mut self, n: usize) -> Self {
        self.config.inference_concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn BatchProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, DocParseError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(DocParseError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.workers == 0 {
            return Err(DocParseError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        let name = c.image_dir_name.as_str();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(DocParseError::InvalidConfig(format!(
                "Image directory name must be a single path segment, got '{name}'"
            )));
        }
        if c.document_timeout_secs == Some(0) {
            return Err(DocParseError::InvalidConfig(
                "Document timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The stage-strategy variant requested for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMethod {
    /// Classify the document, then parse as text or OCR accordingly.
    Auto,
    /// Always treat pages as images that need OCR. (default)
    #[default]
    Ocr,
    /// Always treat pages as carrying extractable embedded text.
    Txt,
}

impl ParseMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ParseMethod::Auto => "auto",
            ParseMethod::Ocr => "ocr",
            ParseMethod::Txt => "txt",
        }
    }
}

impl fmt::Display for ParseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParseMethod {
    type Err = DocParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ParseMethod::Auto),
            "ocr" => Ok(ParseMethod::Ocr),
            "txt" => Ok(ParseMethod::Txt),
            _ => Err(DocParseError::UnknownMethod {
                method: s.to_string(),
            }),
        }
    }
}

/// How the formatters treat pages flagged `need_drop` by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropMode {
    /// Keep every page. (default)
    #[default]
    None,
    /// Skip flagged pages and keep the rest.
    SinglePage,
    /// Refuse the whole document when any page is flagged.
    WholePdf,
}

impl FromStr for DropMode {
    type Err = DocParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(DropMode::None),
            "single_page" => Ok(DropMode::SinglePage),
            "whole_pdf" => Ok(DropMode::WholePdf),
            other => Err(DocParseError::InvalidConfig(format!(
                "Unknown drop mode '{other}': expected none, single_page or whole_pdf"
            ))),
        }
    }
}
