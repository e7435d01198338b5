//! Entry points: one document, or every PDF in a directory.
//!
//! These are thin wrappers over [`BatchDriver`] with the reference
//! collaborators. Use the driver directly to inject your own classifier,
//! inference engine or parser, or [`BatchDriver::stream`] to receive
//! outcomes as they finish.

use crate::batch::{directory_requests, BatchDriver, DocumentRequest};
use crate::config::PipelineConfig;
use crate::error::DocParseError;
use crate::output::{BatchReport, RunSummary};
use std::path::Path;
use tracing::info;

/// Parse a single document and publish its artifacts.
///
/// # Errors
/// Any [`DocParseError`] that stopped this document: bad input file,
/// unknown method, missing model data, a failed stage or a timeout. Artifact
/// write failures are not errors; see [`RunSummary::publish`].
///
/// # Example
/// ```rust,no_run
/// use edgequake_docparse::{parse_document, DocumentRequest, PipelineConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let request = DocumentRequest::new("report.pdf")
///     .method("txt")
///     .model_json("report_model.json")
///     .output_root("/out");
/// let summary = parse_document(&request, &PipelineConfig::default()).await?;
/// println!("{} → {}", summary.name, summary.output_dir.display());
/// # Ok(())
/// # }
/// ```
pub async fn parse_document(
    request: &DocumentRequest,
    config: &PipelineConfig,
) -> Result<RunSummary, DocParseError> {
    BatchDriver::new(config.clone()).process(request).await.result
}

/// Synchronous wrapper around [`parse_document`].
///
/// Creates a temporary tokio runtime internally.
pub fn parse_document_sync(
    request: &DocumentRequest,
    config: &PipelineConfig,
) -> Result<RunSummary, DocParseError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DocParseError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(parse_document(request, config))
}

/// Parse every `*.pdf` directly inside `dir` with one method.
///
/// `output_dir` is shared by all documents (each gets its own
/// `{output_dir}/{name}/`); it defaults to `dir`.
///
/// # Errors
/// Only when `dir` itself cannot be listed. Per-document failures are in
/// the returned [`BatchReport`].
pub async fn parse_directory(
    dir: &Path,
    output_dir: Option<&Path>,
    method: &str,
    config: &PipelineConfig,
) -> Result<BatchReport, DocParseError> {
    let requests = directory_requests(dir, method, output_dir).await?;
    info!("Found {} PDFs in {}", requests.len(), dir.display());
    Ok(BatchDriver::new(config.clone()).run(&requests).await)
}
