//! Formatters: intermediate record → content list and Markdown.
//!
//! Both views walk the same pages in the same order and reference images
//! as `{prefix}/{file}`, so the prefix in `_content_list.json` and in the
//! `.md` is always the same string. Formatting never mutates the record and
//! can be repeated.

use crate::config::DropMode;
use crate::error::DocParseError;
use crate::output::{BlockKind, ContentBlock, MiddleJson, PageLayout, ParaBlock};

/// Pages that survive `drop_mode`.
fn kept_pages(middle: &MiddleJson, drop_mode: DropMode) -> Result<Vec<&PageLayout>, DocParseError> {
    match drop_mode {
        DropMode::None => Ok(middle.pdf_info.iter().collect()),
        DropMode::SinglePage => Ok(middle.pdf_info.iter().filter(|p| !p.need_drop).collect()),
        DropMode::WholePdf => match middle.pdf_info.iter().find(|p| p.need_drop) {
            Some(page) => Err(DocParseError::DocumentDropped {
                page: page.page_idx,
                reason: page.drop_reason.join(", "),
            }),
            None => Ok(middle.pdf_info.iter().collect()),
        },
    }
}

fn join_prefix(prefix: &str, file: &str) -> String {
    if prefix.is_empty() {
        file.to_string()
    } else {
        format!("{prefix}/{file}")
    }
}

fn display_math(latex: &str) -> String {
    format!("$$\n{}\n$$", latex.trim())
}

/// Table body for both views: HTML when the record has it, else the
/// Markdown/plain text.
fn table_body(block: &ParaBlock) -> Option<String> {
    block
        .html
        .clone()
        .or_else(|| Some(block.text.clone()).filter(|t| !t.trim().is_empty()))
}

/// Build the content list.
pub fn content_list(
    middle: &MiddleJson,
    image_prefix: &str,
    drop_mode: DropMode,
) -> Result<Vec<ContentBlock>, DocParseError> {
    let mut out = Vec::new();
    for page in kept_pages(middle, drop_mode)? {
        let page_idx = page.page_idx;
        for block in &page.para_blocks {
            let item = match block.kind {
                BlockKind::Title | BlockKind::Text => {
                    if block.text.trim().is_empty() {
                        continue;
                    }
                    ContentBlock::Text {
                        text: block.text.clone(),
                        text_level: (block.kind == BlockKind::Title)
                            .then(|| block.level.unwrap_or(1)),
                        page_idx,
                    }
                }
                BlockKind::Image => match block.image_path.as_deref() {
                    Some(file) => ContentBlock::Image {
                        img_path: join_prefix(image_prefix, file),
                        img_caption: block.captions.clone(),
                        page_idx,
                    },
                    None => continue,
                },
                BlockKind::Table => ContentBlock::Table {
                    img_path: block.image_path.as_deref().map(|f| join_prefix(image_prefix, f)),
                    table_caption: block.captions.clone(),
                    table_footnote: block.footnotes.clone(),
                    table_body: table_body(block),
                    page_idx,
                },
                BlockKind::Equation => match block.latex.as_deref() {
                    Some(latex) => ContentBlock::Equation {
                        text: display_math(latex),
                        text_format: "latex".to_string(),
                        page_idx,
                    },
                    None => continue,
                },
                BlockKind::Discarded => continue,
            };
            out.push(item);
        }
    }
    Ok(out)
}

/// Render the Markdown document.
pub fn markdown(
    middle: &MiddleJson,
    image_prefix: &str,
    drop_mode: DropMode,
) -> Result<String, DocParseError> {
    let mut parts: Vec<String> = Vec::new();
    for page in kept_pages(middle, drop_mode)? {
        for block in &page.para_blocks {
            match block.kind {
                BlockKind::Title if !block.text.trim().is_empty() => {
                    let level = block.level.unwrap_or(1).clamp(1, 6) as usize;
                    parts.push(format!("{} {}", "#".repeat(level), block.text.trim()));
                }
                BlockKind::Text if !block.text.trim().is_empty() => {
                    parts.push(block.text.trim().to_string());
                }
                BlockKind::Image => {
                    if let Some(file) = block.image_path.as_deref() {
                        parts.push(format!("![]({})", join_prefix(image_prefix, file)));
                        parts.extend(block.captions.iter().cloned());
                    }
                }
                BlockKind::Table => {
                    parts.extend(block.captions.iter().cloned());
                    match (table_body(block), block.image_path.as_deref()) {
                        (Some(body), _) => parts.push(body),
                        (None, Some(file)) => {
                            parts.push(format!("![]({})", join_prefix(image_prefix, file)))
                        }
                        (None, None) => {}
                    }
                    parts.extend(block.footnotes.iter().cloned());
                }
                BlockKind::Equation => {
                    if let Some(latex) = block.latex.as_deref() {
                        parts.push(display_math(latex));
                    }
                }
                _ => {}
            }
        }
    }

    let mut md = parts.join("\n\n");
    if !md.is_empty() {
        md.push('\n');
    }
    Ok(md)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MiddleJson {
        let mut first = PageLayout::new(0, [100.0, 200.0]);
        let mut title = ParaBlock::new(BlockKind::Title, [0.0; 4]).with_text("Report");
        title.level = Some(2);
        let mut figure = ParaBlock::new(BlockKind::Image, [0.0; 4]);
        figure.image_path = Some("0_0.jpg".into());
        figure.captions.push("Figure 1".into());
        let mut eq = ParaBlock::new(BlockKind::Equation, [0.0; 4]);
        eq.latex = Some("E=mc^2".into());
        first.para_blocks = vec![
            title,
            ParaBlock::new(BlockKind::Text, [0.0; 4]).with_text("Body text."),
            figure,
            eq,
        ];
        first
            .discarded_blocks
            .push(ParaBlock::new(BlockKind::Discarded, [0.0; 4]).with_text("1"));

        let mut second = PageLayout::new(1, [100.0, 200.0]);
        second.mark_drop("missing_model_record");
        second.para_blocks = vec![ParaBlock::new(BlockKind::Text, [0.0; 4]).with_text("Tail.")];

        MiddleJson::new("txt", vec![first, second])
    }

    #[test]
    fn content_list_types_and_prefix() {
        let list = content_list(&sample(), "images", DropMode::None).unwrap();
        assert_eq!(list.len(), 5);
        assert_eq!(
            list[0],
            ContentBlock::Text {
                text: "Report".into(),
                text_level: Some(2),
                page_idx: 0
            }
        );
        assert_eq!(list[2].image_path(), Some("images/0_0.jpg"));
        assert!(matches!(
            &list[3],
            ContentBlock::Equation { text, text_format, .. }
                if text == "$$\nE=mc^2\n$$" && text_format == "latex"
        ));
    }

    #[test]
    fn markdown_renders_blocks() {
        let md = markdown(&sample(), "images", DropMode::None).unwrap();
        assert_eq!(
            md,
            "## Report\n\nBody text.\n\n![](images/0_0.jpg)\n\nFigure 1\n\n$$\nE=mc^2\n$$\n\nTail.\n"
        );
        assert!(!md.contains("\n1\n"), "discarded blocks are not rendered");
    }

    #[test]
    fn single_page_drop_skips_flagged_pages() {
        let md = markdown(&sample(), "images", DropMode::SinglePage).unwrap();
        assert!(!md.contains("Tail."));
        let list = content_list(&sample(), "images", DropMode::SinglePage).unwrap();
        assert!(list.iter().all(|b| !matches!(b, ContentBlock::Text { page_idx: 1, .. })));
    }

    #[test]
    fn whole_pdf_drop_refuses_document() {
        let err = markdown(&sample(), "images", DropMode::WholePdf).unwrap_err();
        assert!(matches!(err, DocParseError::DocumentDropped { page: 1, .. }));
    }

    #[test]
    fn table_prefers_html_body() {
        let mut page = PageLayout::new(0, [1.0, 1.0]);
        let mut table = ParaBlock::new(BlockKind::Table, [0.0; 4]).with_text("| a |");
        table.html = Some("<table></table>".into());
        table.image_path = Some("0_0.jpg".into());
        table.footnotes.push("source: survey".into());
        page.para_blocks.push(table);
        let middle = MiddleJson::new("ocr", vec![page]);

        let list = content_list(&middle, "images", DropMode::None).unwrap();
        match &list[0] {
            ContentBlock::Table {
                img_path,
                table_body,
                table_footnote,
                ..
            } => {
                assert_eq!(img_path.as_deref(), Some("images/0_0.jpg"));
                assert_eq!(table_body.as_deref(), Some("<table></table>"));
                assert_eq!(table_footnote, &vec!["source: survey".to_string()]);
            }
            other => panic!("unexpected block {other:?}"),
        }
        let md = markdown(&middle, "images", DropMode::None).unwrap();
        assert_eq!(md, "<table></table>\n\nsource: survey\n");
    }
}
