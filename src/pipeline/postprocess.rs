//! Post-processing of VLM page transcriptions into layout records.
//!
//! The VLM returns one Markdown string per page. Two deterministic passes
//! turn it into the same shape an external layout model would produce:
//!
//! 1. [`clean_markdown`] fixes model quirks (outer fences, CRLF, invisible
//!    characters, invented image links, malformed GFM tables).
//! 2. [`markdown_to_dets`] splits the cleaned text into blocks and maps each
//!    block onto a layout category. The VLM gives no coordinates, so blocks
//!    are stacked top-to-bottom in equal bands; that keeps reading order
//!    stable through the box-sorting parser.

use crate::model::{LayoutCategory, LayoutDet, PageInference};
use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule, in order:
///
/// 1. Strip outer markdown fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Strip invisible Unicode
/// 5. Replace image links with their alt text (figures come from the layout
///    crops, never from the transcription)
/// 6. Insert missing GFM separator rows
/// 7. Remove spurious mid-table separator rows
pub fn clean_markdown(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = remove_invisible_chars(&s);
    let s = replace_image_links(&s);
    let s = fix_broken_tables(&s);
    remove_mid_table_separators(&s)
}

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\n(.*)\n```\s*$").unwrap());

fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

fn replace_image_links(input: &str) -> String {
    RE_IMAGE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let alt = caps[1].trim();
            if alt.is_empty() {
                String::new()
            } else {
                format!("*{alt}*")
            }
        })
        .to_string()
}

fn fix_broken_tables(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut result = Vec::with_capacity(lines.len() + 4);
    let mut prev_is_row = false;

    for (i, line) in lines.iter().enumerate() {
        result.push(line.to_string());
        let is_row = is_table_row(line);
        // Header row: first row of a table not followed by a separator.
        if is_row && !prev_is_row && !is_separator_row(line) {
            let next = lines.get(i + 1).copied().unwrap_or("");
            if is_table_row(next) && !is_separator_row(next) {
                let col_count = line.matches('|').count().saturating_sub(1).max(1);
                let sep: String = std::iter::once("|")
                    .chain(std::iter::repeat_n(" --- |", col_count))
                    .collect();
                result.push(sep);
            }
        }
        prev_is_row = is_row;
    }

    result.join("\n")
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}

fn remove_mid_table_separators(input: &str) -> String {
    let mut result: Vec<&str> = Vec::new();
    let mut table_line_count = 0usize;

    for line in input.lines() {
        if is_table_row(line) {
            table_line_count += 1;
            // GFM allows a separator only right after the header row.
            if is_separator_row(line) && table_line_count != 2 {
                continue;
            }
        } else {
            table_line_count = 0;
        }
        result.push(line);
    }

    result.join("\n")
}

// ── Block splitting ──────────────────────────────────────────────────────────

/// A top-level Markdown block of one page transcription.
#[derive(Debug, Clone, PartialEq)]
pub enum MdBlock {
    Heading { level: u8, text: String },
    Paragraph(String),
    Table(String),
    Formula(String),
}

/// Split cleaned Markdown into top-level blocks.
pub fn split_blocks(md: &str) -> Vec<MdBlock> {
    let mut blocks = Vec::new();
    let mut para: Vec<&str> = Vec::new();
    let mut table: Vec<&str> = Vec::new();
    let mut formula: Option<Vec<&str>> = None;

    let flush = |para: &mut Vec<&str>, table: &mut Vec<&str>, blocks: &mut Vec<MdBlock>| {
        if !para.is_empty() {
            blocks.push(MdBlock::Paragraph(para.join("\n")));
            para.clear();
        }
        if !table.is_empty() {
            blocks.push(MdBlock::Table(table.join("\n")));
            table.clear();
        }
    };

    for line in md.lines() {
        let trimmed = line.trim();

        if let Some(body) = formula.as_mut() {
            if trimmed.ends_with("$$") {
                body.push(trimmed.trim_end_matches("$$"));
                let latex = body.join("\n").trim().to_string();
                blocks.push(MdBlock::Formula(latex));
                formula = None;
            } else {
                body.push(line);
            }
            continue;
        }

        if trimmed.starts_with("$$") {
            flush(&mut para, &mut table, &mut blocks);
            let rest = &trimmed[2..];
            if rest.len() >= 2 && rest.ends_with("$$") {
                blocks.push(MdBlock::Formula(rest[..rest.len() - 2].trim().to_string()));
            } else {
                formula = Some(vec![rest]);
            }
            continue;
        }

        if trimmed.is_empty() {
            flush(&mut para, &mut table, &mut blocks);
            continue;
        }

        if let Some((level, text)) = heading(trimmed) {
            flush(&mut para, &mut table, &mut blocks);
            blocks.push(MdBlock::Heading {
                level,
                text: text.to_string(),
            });
            continue;
        }

        if is_table_row(trimmed) {
            if !para.is_empty() {
                blocks.push(MdBlock::Paragraph(para.join("\n")));
                para.clear();
            }
            table.push(trimmed);
        } else {
            if !table.is_empty() {
                blocks.push(MdBlock::Table(table.join("\n")));
                table.clear();
            }
            para.push(trimmed);
        }
    }

    // An unterminated formula is kept as text rather than lost.
    if let Some(body) = formula {
        para.push("$$");
        para.extend(body);
    }
    flush(&mut para, &mut table, &mut blocks);
    blocks
}

fn heading(line: &str) -> Option<(u8, &str)> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some((hashes as u8, rest.trim()))
}

/// Convert a page transcription into a layout record for page `page_no`.
///
/// `width`/`height` are the raster dimensions the page was sent at.
pub fn markdown_to_dets(page_no: usize, width: f32, height: f32, md: &str) -> PageInference {
    let blocks = split_blocks(&clean_markdown(md));
    let mut page = PageInference::new(page_no, width, height);
    if blocks.is_empty() {
        return page;
    }

    let band = height / blocks.len() as f32;
    for (i, block) in blocks.into_iter().enumerate() {
        let bbox = [0.0, band * i as f32, width, band * (i + 1) as f32];
        let det = match block {
            MdBlock::Heading { level, text } => {
                let mut det = LayoutDet::from_bbox(LayoutCategory::Title, bbox, 1.0).with_text(text);
                det.extra.insert("level".into(), level.into());
                det
            }
            MdBlock::Paragraph(text) => {
                LayoutDet::from_bbox(LayoutCategory::Text, bbox, 1.0).with_text(text)
            }
            MdBlock::Table(md) => LayoutDet::from_bbox(LayoutCategory::Table, bbox, 1.0).with_text(md),
            MdBlock::Formula(latex) => {
                LayoutDet::from_bbox(LayoutCategory::IsolatedFormula, bbox, 1.0).with_latex(latex)
            }
        };
        page.layout_dets.push(det);
    }
    page
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_and_crlf() {
        let input = "```markdown\n# Title\r\nBody   \n```";
        assert_eq!(clean_markdown(input), "# Title\nBody");
    }

    #[test]
    fn image_links_become_alt_text() {
        assert_eq!(replace_image_links("see ![Chart](chart.png) here"), "see *Chart* here");
        assert_eq!(replace_image_links("![](x.png)"), "");
    }

    #[test]
    fn remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn fixes_table_missing_separator() {
        let result = fix_broken_tables("| A | B |\n| 1 | 2 |\n| 3 | 4 |");
        let lines: Vec<&str> = result.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(is_separator_row(lines[1]));
        assert!(!is_separator_row(lines[3]));
    }

    #[test]
    fn drops_mid_table_separator() {
        let input = "| A | B |\n| --- | --- |\n| 1 | 2 |\n| --- | --- |\n| 3 | 4 |";
        let result = remove_mid_table_separators(input);
        assert_eq!(result.lines().filter(|l| is_separator_row(l)).count(), 1);
        assert!(result.contains("| 3 | 4 |"));
    }

    #[test]
    fn splits_mixed_page() {
        let md = "# Results\nIntro line one\nline two\n\n| a | b |\n| --- | --- |\n| 1 | 2 |\nAfter table\n\n$$\nE = mc^2\n$$\n\n$$x+y$$";
        let blocks = split_blocks(md);
        assert_eq!(
            blocks,
            vec![
                MdBlock::Heading {
                    level: 1,
                    text: "Results".into()
                },
                MdBlock::Paragraph("Intro line one\nline two".into()),
                MdBlock::Table("| a | b |\n| --- | --- |\n| 1 | 2 |".into()),
                MdBlock::Paragraph("After table".into()),
                MdBlock::Formula("E = mc^2".into()),
                MdBlock::Formula("x+y".into()),
            ]
        );
    }

    #[test]
    fn hashtag_without_space_is_text() {
        assert_eq!(split_blocks("#hashtag"), vec![MdBlock::Paragraph("#hashtag".into())]);
    }

    #[test]
    fn dets_stack_in_reading_order() {
        let page = markdown_to_dets(3, 100.0, 300.0, "## Heading\n\nBody\n\n$$a$$");
        assert_eq!(page.page_info.page_no, 3);
        assert_eq!(page.layout_dets.len(), 3);

        let title = &page.layout_dets[0];
        assert_eq!(title.category(), LayoutCategory::Title);
        assert_eq!(title.text.as_deref(), Some("Heading"));
        assert_eq!(title.extra["level"], 2);
        assert_eq!(title.bbox(), Some([0.0, 0.0, 100.0, 100.0]));

        let formula = &page.layout_dets[2];
        assert_eq!(formula.category(), LayoutCategory::IsolatedFormula);
        assert_eq!(formula.latex.as_deref(), Some("a"));
        assert_eq!(formula.bbox(), Some([0.0, 200.0, 100.0, 300.0]));
    }

    #[test]
    fn empty_transcription_yields_empty_page() {
        let page = markdown_to_dets(0, 10.0, 10.0, "   \n");
        assert!(page.layout_dets.is_empty());
    }
}
