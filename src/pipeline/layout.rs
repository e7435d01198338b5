//! Reference page parser: layout records + text source → paragraph blocks.
//!
//! The model record says *where* things are; the text comes from either
//! OCR spans inside the record (scanned documents) or the embedded text
//! layer (born-digital documents). Assembly per page:
//!
//! 1. scale model boxes into PDF points (model coordinates use the page
//!    size recorded in `page_info`);
//! 2. order block-level detections top-to-bottom, then left-to-right;
//! 3. fill each block's text from the spans whose centre lies inside it,
//!    unless the detection already carries text/LaTeX/HTML;
//! 4. attach captions and footnotes to the nearest figure, table or
//!    formula on the page;
//! 5. crop figures and tables from a page render and write them as
//!    `{page}_{n}.jpg` through the image writer.
//!
//! Steps 1–4 are pure ([`layout_page`]); only step 5 touches pdfium.

use crate::error::{DocParseError, Stage};
use crate::model::{LayoutCategory, LayoutDet, ModelRecord, PageInference};
use crate::output::{BlockKind, MiddleJson, PageLayout, ParaBlock};
use crate::pipeline::encode;
use crate::pipeline::input::SourceDocument;
use crate::pipeline::render::{self, PageText, TextSegment};
use crate::strategy::{PageParser, PdfType};
use crate::writer::ArtifactWriter;
use async_trait::async_trait;
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Drop reason recorded for pages the model record does not cover.
pub const MISSING_MODEL_RECORD: &str = "missing_model_record";

/// pdfium-backed [`PageParser`].
#[derive(Debug, Clone)]
pub struct LayoutParser {
    dpi: u32,
    max_pixels: u32,
    password: Option<String>,
}

impl LayoutParser {
    pub fn new(dpi: u32, max_pixels: u32, password: Option<String>) -> Self {
        Self {
            dpi,
            max_pixels,
            password,
        }
    }
}

#[async_trait]
impl PageParser for LayoutParser {
    async fn parse(
        &self,
        doc: &SourceDocument,
        model: &ModelRecord,
        pdf_type: PdfType,
        images: &dyn ArtifactWriter,
    ) -> Result<MiddleJson, DocParseError> {
        let bytes = doc.shared_bytes();
        let password = self.password.clone();
        let texts = tokio::task::spawn_blocking(move || {
            render::page_texts_blocking(&bytes, password.as_deref())
        })
        .await
        .map_err(|e| DocParseError::Internal(format!("text task panicked: {e}")))?
        .map_err(|detail| DocParseError::stage(Stage::Parse, detail))?;

        let mut pages: Vec<PageLayout> = texts
            .iter()
            .enumerate()
            .map(|(idx, text)| {
                let inference = model.iter().find(|p| p.page_info.page_no == idx);
                layout_page(idx, text, inference, pdf_type)
            })
            .collect();

        self.extract_images(doc, &mut pages, images).await?;
        Ok(MiddleJson::new(pdf_type.parse_type(), pages))
    }
}

impl LayoutParser {
    /// Crop every figure and table block and write it through `images`.
    async fn extract_images(
        &self,
        doc: &SourceDocument,
        pages: &mut [PageLayout],
        images: &dyn ArtifactWriter,
    ) -> Result<(), DocParseError> {
        let wanted: Vec<usize> = pages
            .iter()
            .filter(|p| p.para_blocks.iter().any(is_croppable))
            .map(|p| p.page_idx)
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }

        // (page, block, jpeg) triples, produced off the async runtime.
        let jobs: Vec<(usize, Vec<(usize, [f32; 4])>)> = pages
            .iter()
            .filter(|p| wanted.contains(&p.page_idx))
            .map(|p| {
                let boxes = p
                    .para_blocks
                    .iter()
                    .enumerate()
                    .filter(|(_, b)| is_croppable(b))
                    .map(|(i, b)| (i, b.bbox))
                    .collect();
                (p.page_idx, boxes)
            })
            .collect();
        let sizes: Vec<[f32; 2]> = pages.iter().map(|p| p.page_size).collect();

        let bytes = doc.shared_bytes();
        let password = self.password.clone();
        let (dpi, max_pixels) = (self.dpi, self.max_pixels);
        let crops = tokio::task::spawn_blocking(move || {
            let rendered =
                render::render_pages_blocking(&bytes, password.as_deref(), dpi, max_pixels, &wanted)?;
            let mut out = Vec::new();
            for (page_idx, image) in rendered {
                let Some((_, boxes)) = jobs.iter().find(|(p, _)| *p == page_idx) else {
                    continue;
                };
                let scale = image.width() as f32 / sizes[page_idx][0].max(1.0);
                for &(block_idx, bbox) in boxes {
                    let px = bbox.map(|v| v * scale);
                    match encode::crop_to_jpeg(&image, px) {
                        Ok(Some(jpeg)) => out.push((page_idx, block_idx, jpeg)),
                        Ok(None) => {}
                        Err(e) => warn!("Page {}: crop failed: {}", page_idx + 1, e),
                    }
                }
            }
            Ok::<_, String>(out)
        })
        .await
        .map_err(|e| DocParseError::Internal(format!("crop task panicked: {e}")))?
        .map_err(|detail| DocParseError::stage(Stage::Parse, detail))?;

        let mut counters = vec![0usize; pages.len()];
        for (page_idx, block_idx, jpeg) in crops {
            let file = format!("{}_{}.jpg", page_idx, counters[page_idx]);
            counters[page_idx] += 1;
            images.write(&jpeg, &file).await.map_err(|e| {
                DocParseError::stage(Stage::Parse, format!("image asset: {e}"))
            })?;
            pages[page_idx].para_blocks[block_idx].image_path = Some(file);
        }
        debug!("{}: wrote {} image assets", doc.name(), counters.iter().sum::<usize>());
        Ok(())
    }
}

fn is_croppable(block: &ParaBlock) -> bool {
    matches!(block.kind, BlockKind::Image | BlockKind::Table)
}

// ── Pure page assembly ───────────────────────────────────────────────────

/// A piece of text with its box in PDF points.
#[derive(Debug, Clone)]
struct Span {
    bbox: [f32; 4],
    text: String,
}

/// Assemble one page's blocks.
///
/// `text` supplies the page size and, for [`PdfType::Text`], the spans. A
/// page without a model record is flagged `need_drop`; under `Text` its
/// text segments are still kept as plain blocks.
pub fn layout_page(
    page_idx: usize,
    text: &PageText,
    inference: Option<&PageInference>,
    pdf_type: PdfType,
) -> PageLayout {
    let mut page = PageLayout::new(page_idx, [text.width, text.height]);

    let Some(inference) = inference else {
        page.mark_drop(MISSING_MODEL_RECORD);
        if pdf_type == PdfType::Text {
            page.para_blocks = text
                .segments
                .iter()
                .map(|s| ParaBlock::new(BlockKind::Text, s.bbox).with_text(s.text.trim()))
                .collect();
        }
        return page;
    };

    let sx = text.width / positive(inference.page_info.width, text.width);
    let sy = text.height / positive(inference.page_info.height, text.height);
    let scaled = |det: &LayoutDet| {
        det.bbox()
            .map(|[x0, y0, x1, y1]| [x0 * sx, y0 * sy, x1 * sx, y1 * sy])
    };

    let spans: Vec<Span> = match pdf_type {
        PdfType::Text => text.segments.iter().map(Span::from).collect(),
        PdfType::Ocr => inference
            .layout_dets
            .iter()
            .filter(|d| d.category() == LayoutCategory::OcrText)
            .filter_map(|d| {
                Some(Span {
                    bbox: scaled(d)?,
                    text: d.text.clone()?,
                })
            })
            .collect(),
    };

    let mut dets: Vec<(&LayoutDet, [f32; 4])> = inference
        .layout_dets
        .iter()
        .filter(|d| !d.category().is_span())
        .filter_map(|d| Some((d, scaled(d)?)))
        .collect();
    dets.sort_by(|a, b| reading_order(&a.1, &b.1));

    let mut captions = Vec::new();
    for (det, bbox) in dets {
        let category = det.category();
        let kind = match category {
            LayoutCategory::Title => BlockKind::Title,
            LayoutCategory::Text => BlockKind::Text,
            LayoutCategory::Abandon => BlockKind::Discarded,
            LayoutCategory::Figure => BlockKind::Image,
            LayoutCategory::Table => BlockKind::Table,
            LayoutCategory::IsolatedFormula => BlockKind::Equation,
            LayoutCategory::FigureCaption
            | LayoutCategory::TableCaption
            | LayoutCategory::TableFootnote
            | LayoutCategory::FormulaCaption => {
                captions.push((category, bbox, det_text(det, bbox, &spans)));
                continue;
            }
            _ => continue,
        };

        let mut block = ParaBlock::new(kind, bbox);
        match kind {
            BlockKind::Equation => {
                block.latex = det
                    .latex
                    .clone()
                    .or_else(|| det.text.clone())
                    .or_else(|| Some(gather(bbox, &spans)).filter(|s| !s.is_empty()));
            }
            BlockKind::Image => {}
            BlockKind::Table => {
                block.html = det.html.clone();
                block.text = det.text.clone().unwrap_or_default();
            }
            _ => block.text = det_text(det, bbox, &spans),
        }
        if kind == BlockKind::Title {
            block.level = Some(title_level(det));
        }

        if kind == BlockKind::Discarded {
            page.discarded_blocks.push(block);
        } else {
            page.para_blocks.push(block);
        }
    }

    for (category, bbox, text) in captions {
        if text.is_empty() {
            continue;
        }
        let target = match category {
            LayoutCategory::FigureCaption => BlockKind::Image,
            LayoutCategory::FormulaCaption => BlockKind::Equation,
            _ => BlockKind::Table,
        };
        match nearest(&mut page.para_blocks, target, bbox) {
            Some(owner) if category == LayoutCategory::TableFootnote => owner.footnotes.push(text),
            Some(owner) => owner.captions.push(text),
            None => page
                .para_blocks
                .push(ParaBlock::new(BlockKind::Text, bbox).with_text(text)),
        }
    }

    page
}

impl From<&TextSegment> for Span {
    fn from(s: &TextSegment) -> Self {
        Span {
            bbox: s.bbox,
            text: s.text.clone(),
        }
    }
}

fn positive(v: f32, fallback: f32) -> f32 {
    if v > 0.0 {
        v
    } else {
        fallback.max(1.0)
    }
}

fn reading_order(a: &[f32; 4], b: &[f32; 4]) -> Ordering {
    a[1].total_cmp(&b[1]).then(a[0].total_cmp(&b[0]))
}

fn centre(b: &[f32; 4]) -> (f32, f32) {
    ((b[0] + b[2]) / 2.0, (b[1] + b[3]) / 2.0)
}

fn contains(outer: &[f32; 4], (x, y): (f32, f32)) -> bool {
    x >= outer[0] && x <= outer[2] && y >= outer[1] && y <= outer[3]
}

/// Text of the spans centred inside `bbox`, in reading order.
fn gather(bbox: [f32; 4], spans: &[Span]) -> String {
    let mut inside: Vec<&Span> = spans
        .iter()
        .filter(|s| contains(&bbox, centre(&s.bbox)))
        .collect();
    inside.sort_by(|a, b| reading_order(&a.bbox, &b.bbox));
    inside
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn det_text(det: &LayoutDet, bbox: [f32; 4], spans: &[Span]) -> String {
    match det.text.as_deref() {
        Some(t) if !t.trim().is_empty() => t.trim().to_string(),
        _ => gather(bbox, spans),
    }
}

fn title_level(det: &LayoutDet) -> u8 {
    det.extra
        .get("level")
        .and_then(|v| v.as_u64())
        .map(|l| l.clamp(1, 6) as u8)
        .unwrap_or(1)
}

fn nearest(blocks: &mut [ParaBlock], kind: BlockKind, bbox: [f32; 4]) -> Option<&mut ParaBlock> {
    let (cx, cy) = centre(&bbox);
    blocks
        .iter_mut()
        .filter(|b| b.kind == kind)
        .min_by(|a, b| {
            let da = dist2(centre(&a.bbox), (cx, cy));
            let db = dist2(centre(&b.bbox), (cx, cy));
            da.total_cmp(&db)
        })
}

fn dist2(a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_text(segments: &[([f32; 4], &str)]) -> PageText {
        PageText {
            width: 100.0,
            height: 200.0,
            segments: segments
                .iter()
                .map(|(bbox, text)| TextSegment {
                    bbox: *bbox,
                    text: text.to_string(),
                })
                .collect(),
        }
    }

    fn det(category: LayoutCategory, bbox: [f32; 4]) -> LayoutDet {
        LayoutDet::from_bbox(category, bbox, 0.9)
    }

    #[test]
    fn missing_record_flags_page() {
        let text = page_text(&[([0.0, 0.0, 50.0, 10.0], "hello ")]);
        let page = layout_page(2, &text, None, PdfType::Text);
        assert!(page.need_drop);
        assert_eq!(page.drop_reason, vec![MISSING_MODEL_RECORD.to_string()]);
        assert_eq!(page.para_blocks[0].text, "hello");

        let page = layout_page(2, &text, None, PdfType::Ocr);
        assert!(page.para_blocks.is_empty());
    }

    #[test]
    fn text_layer_fills_blocks_in_reading_order() {
        let text = page_text(&[
            ([10.0, 110.0, 40.0, 120.0], "second"),
            ([10.0, 10.0, 40.0, 20.0], "Title"),
            ([10.0, 130.0, 40.0, 140.0], "block"),
        ]);
        // Model space is twice the page size.
        let mut inference = PageInference::new(0, 200.0, 400.0);
        inference.layout_dets = vec![
            det(LayoutCategory::Text, [0.0, 200.0, 200.0, 300.0]),
            det(LayoutCategory::Title, [0.0, 0.0, 200.0, 60.0]),
        ];

        let page = layout_page(0, &text, Some(&inference), PdfType::Text);
        assert!(!page.need_drop);
        assert_eq!(page.page_size, [100.0, 200.0]);
        assert_eq!(page.para_blocks.len(), 2);
        assert_eq!(page.para_blocks[0].kind, BlockKind::Title);
        assert_eq!(page.para_blocks[0].text, "Title");
        assert_eq!(page.para_blocks[0].level, Some(1));
        assert_eq!(page.para_blocks[1].text, "second block");
        assert_eq!(page.para_blocks[1].bbox, [0.0, 100.0, 100.0, 150.0]);
    }

    #[test]
    fn ocr_spans_come_from_the_record() {
        let text = page_text(&[([0.0, 0.0, 100.0, 200.0], "ignored text layer")]);
        let mut inference = PageInference::new(0, 100.0, 200.0);
        inference.layout_dets = vec![
            det(LayoutCategory::Text, [0.0, 0.0, 100.0, 50.0]),
            det(LayoutCategory::OcrText, [5.0, 5.0, 50.0, 15.0]).with_text("scanned"),
            det(LayoutCategory::Abandon, [0.0, 190.0, 100.0, 200.0]).with_text("7"),
        ];

        let page = layout_page(0, &text, Some(&inference), PdfType::Ocr);
        assert_eq!(page.para_blocks.len(), 1);
        assert_eq!(page.para_blocks[0].text, "scanned");
        assert_eq!(page.discarded_blocks.len(), 1);
        assert_eq!(page.discarded_blocks[0].text, "7");
    }

    #[test]
    fn captions_attach_to_nearest_owner() {
        let text = page_text(&[]);
        let mut inference = PageInference::new(0, 100.0, 200.0);
        inference.layout_dets = vec![
            det(LayoutCategory::Figure, [0.0, 0.0, 100.0, 50.0]),
            det(LayoutCategory::Table, [0.0, 100.0, 100.0, 150.0]).with_text("| a |"),
            det(LayoutCategory::FigureCaption, [0.0, 50.0, 100.0, 60.0]).with_text("Figure 1"),
            det(LayoutCategory::TableCaption, [0.0, 90.0, 100.0, 100.0]).with_text("Table 1"),
            det(LayoutCategory::TableFootnote, [0.0, 150.0, 100.0, 160.0]).with_text("n=3"),
            det(LayoutCategory::FormulaCaption, [0.0, 170.0, 100.0, 180.0]).with_text("(1)"),
        ];

        let page = layout_page(0, &text, Some(&inference), PdfType::Ocr);
        let figure = &page.para_blocks[0];
        assert_eq!(figure.kind, BlockKind::Image);
        assert_eq!(figure.captions, vec!["Figure 1".to_string()]);

        let table = &page.para_blocks[1];
        assert_eq!(table.text, "| a |");
        assert_eq!(table.captions, vec!["Table 1".to_string()]);
        assert_eq!(table.footnotes, vec!["n=3".to_string()]);

        // No formula on the page: the caption becomes plain text.
        let orphan = page.para_blocks.last().unwrap();
        assert_eq!(orphan.kind, BlockKind::Text);
        assert_eq!(orphan.text, "(1)");
    }

    #[test]
    fn formula_prefers_latex() {
        let text = page_text(&[]);
        let mut inference = PageInference::new(0, 100.0, 200.0);
        inference.layout_dets =
            vec![det(LayoutCategory::IsolatedFormula, [0.0, 0.0, 100.0, 20.0]).with_latex("a^2")];
        let page = layout_page(0, &text, Some(&inference), PdfType::Ocr);
        assert_eq!(page.para_blocks[0].kind, BlockKind::Equation);
        assert_eq!(page.para_blocks[0].latex.as_deref(), Some("a^2"));
    }
}
