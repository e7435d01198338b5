//! Output types: the intermediate parse record, content list, run bundle
//! and batch report.

use crate::config::ParseMethod;
use crate::error::{ArtifactError, DocParseError};
use crate::model::ModelRecord;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Version tag written into every `_middle.json`.
pub const MIDDLE_VERSION: &str = concat!("edgequake-docparse-", env!("CARGO_PKG_VERSION"));

// ── Intermediate parse state ─────────────────────────────────────────────

/// Intermediate parse record persisted as `{name}_middle.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiddleJson {
    pub pdf_info: Vec<PageLayout>,
    #[serde(rename = "_parse_type")]
    pub parse_type: String,
    #[serde(rename = "_version_name")]
    pub version_name: String,
}

impl MiddleJson {
    pub fn new(parse_type: impl Into<String>, pages: Vec<PageLayout>) -> Self {
        Self {
            pdf_info: pages,
            parse_type: parse_type.into(),
            version_name: MIDDLE_VERSION.to_string(),
        }
    }

    /// Number of image files referenced by the record.
    pub fn image_count(&self) -> usize {
        self.pdf_info
            .iter()
            .flat_map(|p| p.para_blocks.iter())
            .filter(|b| b.image_path.is_some())
            .count()
    }
}

/// Parsed layout of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_idx: usize,
    pub page_size: [f32; 2],
    pub para_blocks: Vec<ParaBlock>,
    #[serde(default)]
    pub discarded_blocks: Vec<ParaBlock>,
    #[serde(default)]
    pub need_drop: bool,
    #[serde(default)]
    pub drop_reason: Vec<String>,
}

impl PageLayout {
    pub fn new(page_idx: usize, page_size: [f32; 2]) -> Self {
        Self {
            page_idx,
            page_size,
            para_blocks: Vec::new(),
            discarded_blocks: Vec::new(),
            need_drop: false,
            drop_reason: Vec::new(),
        }
    }

    pub fn mark_drop(&mut self, reason: impl Into<String>) {
        self.need_drop = true;
        self.drop_reason.push(reason.into());
    }
}

/// Block types kept in `para_blocks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Title,
    Text,
    Image,
    Table,
    Equation,
    Discarded,
}

/// One paragraph-level block in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParaBlock {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub bbox: [f32; 4],
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    /// Image file name relative to the images directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub captions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub footnotes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl ParaBlock {
    pub fn new(kind: BlockKind, bbox: [f32; 4]) -> Self {
        Self {
            kind,
            bbox,
            text: String::new(),
            level: None,
            image_path: None,
            captions: Vec::new(),
            footnotes: Vec::new(),
            latex: None,
            html: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

// ── Content list ─────────────────────────────────────────────────────────

/// One entry of `{name}_content_list.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text_level: Option<u8>,
        page_idx: usize,
    },
    Image {
        img_path: String,
        img_caption: Vec<String>,
        page_idx: usize,
    },
    Table {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        img_path: Option<String>,
        table_caption: Vec<String>,
        table_footnote: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table_body: Option<String>,
        page_idx: usize,
    },
    Equation {
        text: String,
        text_format: String,
        page_idx: usize,
    },
}

impl ContentBlock {
    /// Image path referenced by this block, if any.
    pub fn image_path(&self) -> Option<&str> {
        match self {
            ContentBlock::Image { img_path, .. } => Some(img_path),
            ContentBlock::Table { img_path, .. } => img_path.as_deref(),
            _ => None,
        }
    }
}

// ── Run results ──────────────────────────────────────────────────────────

/// Everything one pipeline run produced, held in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Model record as of formatting time.
    pub model: ModelRecord,
    pub middle: MiddleJson,
    pub content_list: Vec<ContentBlock>,
    pub markdown: String,
    /// Image-path prefix used by both `content_list` and `markdown`.
    pub image_prefix: String,
}

/// Outcome of publishing one run's artifacts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishReport {
    /// Relative paths written successfully, in write order.
    pub written: Vec<String>,
    /// One entry per artifact that could not be written.
    pub failures: Vec<ArtifactError>,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Per-document summary returned to the batch driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub name: String,
    pub input: PathBuf,
    pub method: ParseMethod,
    pub output_dir: PathBuf,
    pub pages: usize,
    pub content_blocks: usize,
    pub images: usize,
    /// `None` when publishing was disabled.
    pub publish: Option<PublishReport>,
    pub duration_ms: u64,
}

/// Result for one input of a batch.
#[derive(Debug)]
pub struct DocumentOutcome {
    pub input: PathBuf,
    pub result: Result<RunSummary, DocParseError>,
}

impl DocumentOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Aggregate result of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One outcome per input, in input order.
    pub documents: Vec<DocumentOutcome>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.documents.len()
    }

    pub fn succeeded(&self) -> usize {
        self.documents.iter().filter(|d| d.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// Failed inputs with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, &DocParseError)> {
        self.documents
            .iter()
            .filter_map(|d| d.result.as_ref().err().map(|e| (&d.input, e)))
    }
}

/// JSON-friendly view of one outcome, used by the CLI's `--json` output.
#[derive(Debug, Serialize)]
pub struct OutcomeView<'a> {
    pub input: &'a PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<&'a RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<'a> From<&'a DocumentOutcome> for OutcomeView<'a> {
    fn from(o: &'a DocumentOutcome) -> Self {
        match &o.result {
            Ok(summary) => OutcomeView {
                input: &o.input,
                summary: Some(summary),
                error: None,
            },
            Err(e) => OutcomeView {
                input: &o.input,
                summary: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_block_tagging() {
        let block = ContentBlock::Text {
            text: "Intro".into(),
            text_level: Some(1),
            page_idx: 0,
        };
        let v = serde_json::to_value(&block).unwrap();
        assert_eq!(v["type"], "text");
        assert_eq!(v["text_level"], 1);

        let img = ContentBlock::Image {
            img_path: "images/0_0.jpg".into(),
            img_caption: vec![],
            page_idx: 2,
        };
        let v = serde_json::to_value(&img).unwrap();
        assert_eq!(v["type"], "image");
        assert_eq!(img.image_path(), Some("images/0_0.jpg"));
    }

    #[test]
    fn middle_json_uses_underscored_keys() {
        let middle = MiddleJson::new("txt", vec![PageLayout::new(0, [612.0, 792.0])]);
        let v = serde_json::to_value(&middle).unwrap();
        assert_eq!(v["_parse_type"], "txt");
        assert!(v["_version_name"].as_str().unwrap().starts_with("edgequake-docparse-"));
        assert_eq!(v["pdf_info"][0]["page_idx"], 0);
    }

    #[test]
    fn batch_report_tallies() {
        let report = BatchReport {
            documents: vec![
                DocumentOutcome {
                    input: "a.pdf".into(),
                    result: Err(DocParseError::Internal("x".into())),
                },
                DocumentOutcome {
                    input: "b.pdf".into(),
                    result: Err(DocParseError::UnknownMethod { method: "y".into() }),
                },
            ],
            duration_ms: 0,
        };
        assert_eq!(report.total(), 2);
        assert_eq!(report.succeeded(), 0);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.failures().count(), 2);
    }
}
