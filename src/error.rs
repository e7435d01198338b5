//! Error types for the edgequake-docparse library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DocParseError`] — **Fatal for one document**: the document cannot be
//!   carried through the pipeline (bad input file, unknown parse method,
//!   model data missing, a stage failed). Returned as `Err(DocParseError)`
//!   from [`crate::convert::parse_document`] and stored per document inside
//!   [`crate::output::BatchReport`]. It never crosses a document boundary.
//!
//! * [`ArtifactError`] — **Non-fatal**: a single artifact could not be
//!   written, but the other artifacts were still attempted. Stored inside
//!   [`crate::output::PublishReport`] so callers can see exactly which files
//!   are missing.

use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage names used in [`DocParseError::StageFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
    Analyze,
    Parse,
    Format,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Classify => "classify",
            Stage::Analyze => "analyze",
            Stage::Parse => "parse",
            Stage::Format => "format",
        };
        f.write_str(name)
    }
}

/// Errors that abort processing of one document.
#[derive(Debug, Error)]
pub enum DocParseError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// Reading the input (or an input directory) failed.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Configuration errors ──────────────────────────────────────────────
    /// Requested parse method is not one of `auto`, `ocr`, `txt`.
    #[error("Unknown parse method '{method}': only auto, ocr, txt are allowed")]
    UnknownMethod { method: String },

    /// No model data was supplied and in-process inference is disabled.
    #[error("Model data required but unavailable for '{document}': supply a model JSON file or enable in-process inference")]
    ModelRequired { document: String },

    /// Precomputed model data could not be decoded.
    #[error("Invalid model data in '{path}': {detail}")]
    ModelDataInvalid { path: PathBuf, detail: String },

    /// An earlier request in the same batch already owns this output directory.
    #[error("Output directory '{output_dir}' is already used by '{first}' in this batch")]
    DuplicateOutput { output_dir: PathBuf, first: PathBuf },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Stage errors ──────────────────────────────────────────────────────
    /// A stage of the pipeline raised an error.
    #[error("{stage} stage failed: {detail}")]
    StageFailed { stage: Stage, detail: String },

    /// Drop mode `whole_pdf` refused a document with droppable pages.
    #[error("Document dropped: page {page} flagged ({reason})")]
    DocumentDropped { page: usize, reason: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    /// The document exceeded its per-document time budget.
    #[error("Document '{document}' timed out after {secs}s")]
    Timeout { document: String, secs: u64 },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocParseError {
    /// Shorthand for [`DocParseError::StageFailed`].
    pub fn stage(stage: Stage, detail: impl Into<String>) -> Self {
        DocParseError::StageFailed {
            stage,
            detail: detail.into(),
        }
    }

    /// True for errors caused by configuration rather than document content.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            DocParseError::UnknownMethod { .. }
                | DocParseError::ModelRequired { .. }
                | DocParseError::DuplicateOutput { .. }
                | DocParseError::InvalidConfig(_)
                | DocParseError::ProviderNotConfigured { .. }
                | DocParseError::PdfiumBindingFailed(_)
        )
    }
}

/// A non-fatal error for a single artifact write.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ArtifactError {
    /// The relative path escaped the writer root or was absolute.
    #[error("Artifact path '{path}' is not a relative path inside the writer root")]
    InvalidPath { path: String },

    /// Storage refused the write.
    #[error("Failed to write artifact '{path}': {detail}")]
    WriteFailed { path: String, detail: String },

    /// The artifact could not be serialised.
    #[error("Failed to serialise artifact '{path}': {detail}")]
    Serialize { path: String, detail: String },
}

impl ArtifactError {
    /// Relative path of the artifact that failed.
    pub fn path(&self) -> &str {
        match self {
            ArtifactError::InvalidPath { path }
            | ArtifactError::WriteFailed { path, .. }
            | ArtifactError::Serialize { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_method_display() {
        let e = DocParseError::UnknownMethod {
            method: "fast".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("'fast'"), "got: {msg}");
        assert!(msg.contains("auto, ocr, txt"));
        assert!(e.is_config_error());
    }

    #[test]
    fn model_required_names_document() {
        let e = DocParseError::ModelRequired {
            document: "report".into(),
        };
        assert!(e.to_string().contains("'report'"));
        assert!(e.is_config_error());
    }

    #[test]
    fn stage_failed_display() {
        let e = DocParseError::stage(Stage::Parse, "bad xref");
        assert_eq!(e.to_string(), "parse stage failed: bad xref");
        assert!(!e.is_config_error());
    }

    #[test]
    fn stage_names() {
        let names: Vec<String> = [Stage::Classify, Stage::Analyze, Stage::Parse, Stage::Format]
            .iter()
            .map(Stage::to_string)
            .collect();
        assert_eq!(names, ["classify", "analyze", "parse", "format"]);
    }

    #[test]
    fn duplicate_output_names_both_paths() {
        let e = DocParseError::DuplicateOutput {
            output_dir: "/out/a".into(),
            first: "/in/a.PDF".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("/out/a") && msg.contains("a.PDF"), "got: {msg}");
        assert!(e.is_config_error());
    }

    #[test]
    fn artifact_error_path() {
        let e = ArtifactError::WriteFailed {
            path: "doc.md".into(),
            detail: "read-only file system".into(),
        };
        assert_eq!(e.path(), "doc.md");
        assert!(e.to_string().contains("read-only"));
    }
}
