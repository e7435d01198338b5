//! System prompt for in-process VLM page transcription.
//!
//! The transcription is not the final Markdown: it is split into layout
//! records (see [`crate::pipeline::postprocess::markdown_to_dets`]), so the
//! prompt asks for exactly the block shapes that splitter understands.
//! Callers can override it via [`crate::config::PipelineConfig::system_prompt`].

/// Default system prompt for transcribing one page image.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert document transcriber. Transcribe the PDF page image into Markdown blocks separated by blank lines.

Follow these rules precisely:

1. TEXT
   - Preserve ALL body text in human reading order
   - One paragraph per block; do not merge separate paragraphs

2. HEADINGS
   - Use # for the page title, ## and ### for section headings
   - A heading is always a single line

3. TABLES
   - Convert every table to a GFM pipe table with a separator row

4. FORMULAS
   - Put each display formula in its own block as $$ ... $$ using LaTeX
   - Keep inline math as $...$ inside the paragraph

5. WHAT TO IGNORE
   - Figures, photos and charts (they are extracted separately)
   - Page numbers, running headers and footers

6. OUTPUT FORMAT
   - Output ONLY the Markdown content
   - Do NOT wrap in ```markdown fences
   - Do NOT add commentary or explanations"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_requests_splittable_blocks() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("$$"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("pipe table"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("blank lines"));
    }
}
