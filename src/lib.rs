//! # edgequake-docparse
//!
//! Turn PDF documents into four artifacts through a strategy-driven stage
//! pipeline:
//!
//! | Artifact | Content |
//! |----------|---------|
//! | `{name}_model.json`        | per-page layout/OCR model record |
//! | `{name}_middle.json`       | intermediate parse record |
//! | `{name}_content_list.json` | typed content blocks in reading order |
//! | `{name}.md`                | rendered Markdown |
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF (+ optional model JSON)
//!  │
//!  ├─ 1. Select    method auto | ocr | txt  → stage strategy
//!  ├─ 2. Classify  text layer or scan (auto only; ocr/txt are fixed)
//!  ├─ 3. Gate      no model data? run in-process inference, if enabled
//!  ├─ 4. Parse     layout blocks + text, figure/table crops → images/
//!  ├─ 5. Format    content list + Markdown, image refs as `images/…`
//!  └─ 6. Publish   the four artifacts under {output}/{name}/
//! ```
//!
//! Documents are isolated: in a batch, one failing input is reported and
//! the others carry on.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docparse::{parse_document, DocumentRequest, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder().use_inside_model(false).build()?;
//!     let request = DocumentRequest::new("report.pdf")
//!         .method("txt")
//!         .model_json("report_model.json")
//!         .output_root("/out");
//!     let summary = parse_document(&request, &config).await?;
//!     println!("{} pages → {}", summary.pages, summary.output_dir.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Pluggable engines
//!
//! Classification, inference and page parsing sit behind
//! [`DocumentClassifier`], [`InferenceEngine`] and [`PageParser`]. The
//! bundled implementations use pdfium (text layer, rendering) and a vision
//! LLM via `edgequake-llm` (in-process inference); pass your own through
//! [`Collaborators`] and [`BatchDriver::with_collaborators`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docparse` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docparse = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod publish;
pub mod runner;
pub mod strategy;
pub mod stream;
pub mod writer;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{BatchDriver, DocumentRequest};
pub use config::{DropMode, ParseMethod, PipelineConfig, PipelineConfigBuilder};
pub use convert::{parse_directory, parse_document, parse_document_sync};
pub use error::{ArtifactError, DocParseError, Stage};
pub use model::{LayoutCategory, LayoutDet, ModelRecord, PageInference, PageInfo};
pub use output::{
    BatchReport, ContentBlock, DocumentOutcome, MiddleJson, PublishReport, RunResult, RunSummary,
};
pub use pipeline::input::SourceDocument;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use publish::ArtifactPublisher;
pub use runner::PipelineRunner;
pub use strategy::{
    Collaborators, DocumentClassifier, InferenceEngine, PageParser, PdfType, StageStrategy,
    StrategySelector, StrategyState,
};
pub use stream::OutcomeStream;
pub use writer::{ArtifactWriter, DiskWriter, MemoryWriter};
