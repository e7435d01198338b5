//! PDF access via pdfium: text-layer statistics, text segments and page
//! rasters.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! Every public async function here moves the work onto the blocking pool;
//! the `*_blocking` variants are for callers that already run there.
//!
//! ## Why cap pixels, not DPI?
//!
//! Page sizes vary wildly: an A0 poster at 200 DPI would produce a
//! 16,000 × 23,000 px image. `max_pixels` caps the longest edge regardless
//! of physical size, keeping memory bounded.

use crate::error::DocParseError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Text found on one page, in PDF points with a top-left origin.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub width: f32,
    pub height: f32,
    pub segments: Vec<TextSegment>,
}

/// A run of text sharing one baseline, with its box `[x0, y0, x1, y1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSegment {
    pub bbox: [f32; 4],
    pub text: String,
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` first, then the system library.
pub fn bind_pdfium() -> Result<Pdfium, DocParseError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| DocParseError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn load<'a>(
    pdfium: &'a Pdfium,
    bytes: &'a [u8],
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, String> {
    pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    "wrong password".to_string()
                } else {
                    "document is encrypted and requires a password".to_string()
                }
            } else {
                format!("corrupt PDF: {err_str}")
            }
        })
}

/// Count non-whitespace characters of the embedded text layer, per page.
///
/// Errors are returned as plain strings; callers wrap them in the
/// [`crate::error::Stage`] they run in.
pub fn text_char_counts_blocking(
    bytes: &[u8],
    password: Option<&str>,
) -> Result<Vec<usize>, String> {
    let pdfium = bind_pdfium().map_err(|e| e.to_string())?;
    let document = load(&pdfium, bytes, password)?;

    let mut counts = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let chars = match page.text() {
            Ok(text) => text.all().chars().filter(|c| !c.is_whitespace()).count(),
            Err(e) => {
                warn!("Page {}: no text layer ({:?})", idx + 1, e);
                0
            }
        };
        counts.push(chars);
    }
    debug!("Text layer: {:?} chars per page", counts);
    Ok(counts)
}

/// Extract text segments for every page.
pub fn page_texts_blocking(bytes: &[u8], password: Option<&str>) -> Result<Vec<PageText>, String> {
    let pdfium = bind_pdfium().map_err(|e| e.to_string())?;
    let document = load(&pdfium, bytes, password)?;

    let mut pages = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let width = page.width().value;
        let height = page.height().value;
        let text = page
            .text()
            .map_err(|e| format!("page {}: text layer unreadable: {:?}", idx + 1, e))?;

        let segments = text
            .segments()
            .iter()
            .filter_map(|segment| {
                let content = segment.text();
                if content.trim().is_empty() {
                    return None;
                }
                let r = segment.bounds();
                // PDF user space has a bottom-left origin; flip to top-left.
                Some(TextSegment {
                    bbox: [
                        r.left().value,
                        height - r.top().value,
                        r.right().value,
                        height - r.bottom().value,
                    ],
                    text: content,
                })
            })
            .collect();

        pages.push(PageText {
            width,
            height,
            segments,
        });
    }
    info!("Extracted text layer for {} pages", pages.len());
    Ok(pages)
}

/// Number of pages in the document.
pub fn page_count_blocking(bytes: &[u8], password: Option<&str>) -> Result<usize, String> {
    let pdfium = bind_pdfium().map_err(|e| e.to_string())?;
    let document = load(&pdfium, bytes, password)?;
    Ok(document.pages().len() as usize)
}

/// Rasterise selected pages (0-indexed) at `dpi`, with neither edge
/// exceeding `max_pixels`. Out-of-range indices are skipped.
pub fn render_pages_blocking(
    bytes: &[u8],
    password: Option<&str>,
    dpi: u32,
    max_pixels: u32,
    page_indices: &[usize],
) -> Result<Vec<(usize, DynamicImage)>, String> {
    let pdfium = bind_pdfium().map_err(|e| e.to_string())?;
    let document = load(&pdfium, bytes, password)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(page_indices.len());

    for &idx in page_indices {
        if idx >= total_pages {
            warn!(
                "Skipping page {} (out of range, total={})",
                idx + 1,
                total_pages
            );
            continue;
        }

        let page = pages
            .get(idx as u16)
            .map_err(|e| format!("page {}: {:?}", idx + 1, e))?;

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| format!("rasterisation failed for page {}: {:?}", idx + 1, e))?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        results.push((idx, image));
    }

    Ok(results)
}

/// Rasterise every page of the document.
pub async fn render_all_pages(
    bytes: Arc<[u8]>,
    password: Option<String>,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<(usize, DynamicImage)>, String> {
    tokio::task::spawn_blocking(move || {
        let total = page_count_blocking(&bytes, password.as_deref())?;
        let indices: Vec<usize> = (0..total).collect();
        render_pages_blocking(&bytes, password.as_deref(), dpi, max_pixels, &indices)
    })
    .await
    .map_err(|e| format!("render task panicked: {e}"))?
}
