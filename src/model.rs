//! Model records: per-page layout/OCR inference output.
//!
//! A [`ModelRecord`] is either supplied by the caller (a JSON array loaded
//! from disk) or produced by an [`crate::strategy::InferenceEngine`]. Keys the
//! crate does not know about are carried through untouched, so a record
//! produced by an external layout model round-trips into `_model.json`
//! without losing fields.

use crate::error::DocParseError;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::path::Path;
use tracing::debug;

/// Ordered per-page inference results for one document.
pub type ModelRecord = Vec<PageInference>;

/// Inference output for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInference {
    pub page_info: PageInfo,
    #[serde(default)]
    pub layout_dets: Vec<LayoutDet>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

impl PageInference {
    pub fn new(page_no: usize, width: f32, height: f32) -> Self {
        Self {
            page_info: PageInfo {
                page_no,
                width,
                height,
            },
            layout_dets: Vec::new(),
            extra: JsonMap::new(),
        }
    }
}

/// Page number (0-indexed) and the size of the coordinate space used by
/// every `poly` on the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page_no: usize,
    pub width: f32,
    pub height: f32,
}

/// One detected region on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutDet {
    pub category_id: u32,
    /// Quadrilateral `[x0, y0, x1, y1, x2, y2, x3, y3]`, clockwise from top-left.
    pub poly: Vec<f32>,
    #[serde(default)]
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

impl LayoutDet {
    /// A detection covering the axis-aligned box `[x0, y0, x1, y1]`.
    pub fn from_bbox(category: LayoutCategory, bbox: [f32; 4], score: f32) -> Self {
        let [x0, y0, x1, y1] = bbox;
        Self {
            category_id: category.id(),
            poly: vec![x0, y0, x1, y0, x1, y1, x0, y1],
            score,
            text: None,
            latex: None,
            html: None,
            extra: JsonMap::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_latex(mut self, latex: impl Into<String>) -> Self {
        self.latex = Some(latex.into());
        self
    }

    pub fn category(&self) -> LayoutCategory {
        LayoutCategory::from_id(self.category_id)
    }

    /// Axis-aligned bounding box `[x0, y0, x1, y1]` of the polygon.
    ///
    /// Returns `None` for malformed polygons (fewer than two points).
    pub fn bbox(&self) -> Option<[f32; 4]> {
        if self.poly.len() < 4 {
            return None;
        }
        let xs = self.poly.iter().step_by(2);
        let ys = self.poly.iter().skip(1).step_by(2);
        let (x0, x1) = xs.fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let (y0, y1) = ys.fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Some([x0, y0, x1, y1])
    }
}

/// Layout-model category ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayoutCategory {
    Title,
    Text,
    Abandon,
    Figure,
    FigureCaption,
    Table,
    TableCaption,
    TableFootnote,
    IsolatedFormula,
    FormulaCaption,
    InlineFormula,
    FormulaLatex,
    OcrText,
    Other(u32),
}

impl LayoutCategory {
    pub fn from_id(id: u32) -> Self {
        match id {
            0 => LayoutCategory::Title,
            1 => LayoutCategory::Text,
            2 => LayoutCategory::Abandon,
            3 => LayoutCategory::Figure,
            4 => LayoutCategory::FigureCaption,
            5 => LayoutCategory::Table,
            6 => LayoutCategory::TableCaption,
            7 => LayoutCategory::TableFootnote,
            8 => LayoutCategory::IsolatedFormula,
            9 => LayoutCategory::FormulaCaption,
            13 => LayoutCategory::InlineFormula,
            14 => LayoutCategory::FormulaLatex,
            15 => LayoutCategory::OcrText,
            other => LayoutCategory::Other(other),
        }
    }

    pub fn id(self) -> u32 {
        match self {
            LayoutCategory::Title => 0,
            LayoutCategory::Text => 1,
            LayoutCategory::Abandon => 2,
            LayoutCategory::Figure => 3,
            LayoutCategory::FigureCaption => 4,
            LayoutCategory::Table => 5,
            LayoutCategory::TableCaption => 6,
            LayoutCategory::TableFootnote => 7,
            LayoutCategory::IsolatedFormula => 8,
            LayoutCategory::FormulaCaption => 9,
            LayoutCategory::InlineFormula => 13,
            LayoutCategory::FormulaLatex => 14,
            LayoutCategory::OcrText => 15,
            LayoutCategory::Other(id) => id,
        }
    }

    /// True for span-level categories that carry text for enclosing blocks
    /// rather than forming blocks themselves.
    pub fn is_span(self) -> bool {
        matches!(
            self,
            LayoutCategory::OcrText | LayoutCategory::InlineFormula | LayoutCategory::FormulaLatex
        )
    }
}

/// Load precomputed model data from a JSON array file.
///
/// An empty array is valid and means "compute internally".
pub async fn load_model_json(path: &Path) -> Result<ModelRecord, DocParseError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DocParseError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
    let record: ModelRecord =
        serde_json::from_str(&raw).map_err(|e| DocParseError::ModelDataInvalid {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    debug!("Loaded {} model pages from {}", record.len(), path.display());
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_survive_round_trip() {
        let raw = r#"[{
            "layout_dets": [
                {"category_id": 1, "poly": [0, 0, 10, 0, 10, 5, 0, 5], "score": 0.9, "source": "yolo"}
            ],
            "page_info": {"page_no": 0, "width": 100, "height": 200},
            "model_version": "1.2"
        }]"#;
        let record: ModelRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record[0].extra["model_version"], "1.2");
        assert_eq!(record[0].layout_dets[0].extra["source"], "yolo");

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back[0]["model_version"], "1.2");
        assert_eq!(back[0]["layout_dets"][0]["source"], "yolo");
        assert!(back[0]["layout_dets"][0].get("text").is_none());
    }

    #[test]
    fn bbox_from_rotated_poly() {
        let det = LayoutDet {
            category_id: 15,
            poly: vec![10.0, 2.0, 30.0, 4.0, 28.0, 14.0, 8.0, 12.0],
            score: 1.0,
            text: None,
            latex: None,
            html: None,
            extra: JsonMap::new(),
        };
        assert_eq!(det.bbox(), Some([8.0, 2.0, 30.0, 14.0]));
        assert_eq!(det.category(), LayoutCategory::OcrText);
        assert!(det.category().is_span());
    }

    #[test]
    fn category_ids_round_trip() {
        for id in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 13, 14, 15, 42] {
            assert_eq!(LayoutCategory::from_id(id).id(), id);
        }
    }

    #[tokio::test]
    async fn load_model_json_reports_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad_model.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_model_json(&path).await.unwrap_err();
        assert!(matches!(err, DocParseError::ModelDataInvalid { .. }));

        std::fs::write(&path, "[]").unwrap();
        assert!(load_model_json(&path).await.unwrap().is_empty());
    }
}
