//! Text-layer classification for the `auto` method.
//!
//! A born-digital PDF carries an embedded text layer on (nearly) every
//! page; a scan carries none, or only a few stray characters from an OCR
//! pass or page stamp. Averaging non-whitespace characters over all pages
//! keeps a single blank cover page from flipping the verdict.

use crate::error::{DocParseError, Stage};
use crate::pipeline::input::SourceDocument;
use crate::pipeline::render;
use crate::strategy::{DocumentClassifier, PdfType};
use async_trait::async_trait;
use tracing::debug;

/// Classifies by mean text-layer density.
#[derive(Debug, Clone)]
pub struct TextLayerClassifier {
    min_chars_per_page: usize,
    password: Option<String>,
}

impl TextLayerClassifier {
    pub fn new(min_chars_per_page: usize, password: Option<String>) -> Self {
        Self {
            min_chars_per_page,
            password,
        }
    }
}

/// `Text` when the mean per-page count reaches `min_chars_per_page`.
/// A document without pages is treated as a scan.
pub fn classify_counts(counts: &[usize], min_chars_per_page: usize) -> PdfType {
    if counts.is_empty() {
        return PdfType::Ocr;
    }
    let mean = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
    if mean >= min_chars_per_page as f64 {
        PdfType::Text
    } else {
        PdfType::Ocr
    }
}

#[async_trait]
impl DocumentClassifier for TextLayerClassifier {
    async fn classify(&self, doc: &SourceDocument) -> Result<PdfType, DocParseError> {
        let bytes = doc.shared_bytes();
        let password = self.password.clone();
        let counts = tokio::task::spawn_blocking(move || {
            render::text_char_counts_blocking(&bytes, password.as_deref())
        })
        .await
        .map_err(|e| DocParseError::Internal(format!("classify task panicked: {e}")))?
        .map_err(|detail| DocParseError::stage(Stage::Classify, detail))?;

        let pdf_type = classify_counts(&counts, self.min_chars_per_page);
        debug!(
            "{}: {} pages, verdict {:?}",
            doc.name(),
            counts.len(),
            pdf_type
        );
        Ok(pdf_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_text_layer_is_text() {
        assert_eq!(classify_counts(&[1200, 900, 0], 50), PdfType::Text);
    }

    #[test]
    fn sparse_text_layer_is_ocr() {
        assert_eq!(classify_counts(&[3, 0, 12], 50), PdfType::Ocr);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(classify_counts(&[50, 50], 50), PdfType::Text);
        assert_eq!(classify_counts(&[49, 50], 50), PdfType::Ocr);
    }

    #[test]
    fn no_pages_is_ocr() {
        assert_eq!(classify_counts(&[], 0), PdfType::Ocr);
    }
}
