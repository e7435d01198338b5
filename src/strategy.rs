//! Stage strategies: the per-method implementations of the pipeline stages.
//!
//! A strategy is bound to one document's model record when it is selected
//! and carries that document's state through the stages:
//!
//! ```text
//! classify ──▶ analyze (optional) ──▶ parse ──▶ make_content_list / make_markdown
//!  PdfType      ModelRecord            MiddleJson    read-only views
//! ```
//!
//! The three variants differ only in how they classify: [`AutoStrategy`]
//! asks the [`DocumentClassifier`], [`OcrStrategy`] and [`TxtStrategy`] fix
//! the type. The heavy lifting is delegated to three collaborator traits so
//! callers (and tests) can swap in their own engines:
//!
//! | Trait | Reference implementation |
//! |-------|--------------------------|
//! | [`DocumentClassifier`] | [`crate::pipeline::classify::TextLayerClassifier`] |
//! | [`InferenceEngine`]    | [`crate::pipeline::llm::VlmInference`] |
//! | [`PageParser`]         | [`crate::pipeline::layout::LayoutParser`] |

use crate::config::{DropMode, ParseMethod, PipelineConfig};
use crate::error::{DocParseError, Stage};
use crate::model::ModelRecord;
use crate::output::{ContentBlock, MiddleJson};
use crate::pipeline::classify::TextLayerClassifier;
use crate::pipeline::format;
use crate::pipeline::input::SourceDocument;
use crate::pipeline::layout::LayoutParser;
use crate::pipeline::llm::VlmInference;
use crate::writer::ArtifactWriter;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// How a document's pages are to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfType {
    /// Pages carry an extractable embedded text layer.
    Text,
    /// Pages are images; text comes from OCR spans.
    Ocr,
}

impl PdfType {
    /// Value recorded as `_parse_type` in the intermediate record.
    pub fn parse_type(self) -> &'static str {
        match self {
            PdfType::Text => "txt",
            PdfType::Ocr => "ocr",
        }
    }
}

// ── Collaborators ────────────────────────────────────────────────────────

/// Decides whether a document is text-based or needs OCR.
#[async_trait]
pub trait DocumentClassifier: Send + Sync {
    async fn classify(&self, doc: &SourceDocument) -> Result<PdfType, DocParseError>;
}

/// Produces model data for a document that arrived without any.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    async fn analyze(
        &self,
        doc: &SourceDocument,
        pdf_type: PdfType,
    ) -> Result<ModelRecord, DocParseError>;
}

/// Turns model data into the intermediate parse record.
///
/// Extracted image assets go to `images`, a writer rooted at the
/// document's image directory; the record refers to them by file name.
#[async_trait]
pub trait PageParser: Send + Sync {
    async fn parse(
        &self,
        doc: &SourceDocument,
        model: &ModelRecord,
        pdf_type: PdfType,
        images: &dyn ArtifactWriter,
    ) -> Result<MiddleJson, DocParseError>;
}

/// The engines a strategy delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn DocumentClassifier>,
    /// `None` when no in-process inference capability is available.
    pub inference: Option<Arc<dyn InferenceEngine>>,
    pub parser: Arc<dyn PageParser>,
}

impl Collaborators {
    /// The bundled pdfium + VLM implementations, configured from `config`.
    pub fn reference(config: &PipelineConfig) -> Self {
        Self {
            classifier: Arc::new(TextLayerClassifier::new(
                config.min_chars_per_page,
                config.password.clone(),
            )),
            inference: Some(Arc::new(VlmInference::new(config))),
            parser: Arc::new(LayoutParser::new(
                config.dpi,
                config.max_rendered_pixels,
                config.password.clone(),
            )),
        }
    }
}

// ── Strategy state ───────────────────────────────────────────────────────

/// Per-document state shared by every strategy variant.
///
/// Strategies defined outside this crate embed one of these and record
/// their classification verdict with [`set_pdf_type`](Self::set_pdf_type);
/// the default stages of [`StageStrategy`] do the rest.
pub struct StrategyState {
    collaborators: Collaborators,
    model: ModelRecord,
    pdf_type: Option<PdfType>,
    middle: Option<MiddleJson>,
}

impl StrategyState {
    /// State bound to one document's `model` record (empty means
    /// "compute internally").
    pub fn new(collaborators: Collaborators, model: ModelRecord) -> Self {
        Self {
            collaborators,
            model,
            pdf_type: None,
            middle: None,
        }
    }

    pub fn pdf_type(&self) -> Option<PdfType> {
        self.pdf_type
    }

    pub fn set_pdf_type(&mut self, pdf_type: PdfType) {
        self.pdf_type = Some(pdf_type);
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    fn classified(&self, stage: Stage) -> Result<PdfType, DocParseError> {
        self.pdf_type
            .ok_or_else(|| DocParseError::stage(stage, "document has not been classified"))
    }

    fn parsed(&self) -> Result<&MiddleJson, DocParseError> {
        self.middle
            .as_ref()
            .ok_or_else(|| DocParseError::stage(Stage::Format, "document has not been parsed"))
    }
}

// ── Strategy trait ───────────────────────────────────────────────────────

/// The four-stage capability surface every parse method implements.
///
/// Variants implement [`method`](Self::method), [`classify`](Self::classify)
/// and the two accessors to their embedded [`StrategyState`]; the
/// remaining stages are shared.
#[async_trait]
pub trait StageStrategy: Send + Sync {
    fn method(&self) -> ParseMethod;

    /// State backing the default stages.
    fn state(&self) -> &StrategyState;

    fn state_mut(&mut self) -> &mut StrategyState;

    /// Determine the [`PdfType`] of `doc`.
    async fn classify(&mut self, doc: &SourceDocument) -> Result<(), DocParseError>;

    /// The model record bound to this strategy.
    fn model_record(&self) -> &ModelRecord {
        &self.state().model
    }

    /// Run in-process inference and bind its output as the model record.
    async fn analyze(&mut self, doc: &SourceDocument) -> Result<(), DocParseError> {
        let state = self.state_mut();
        let pdf_type = state.classified(Stage::Analyze)?;
        let engine = state
            .collaborators
            .inference
            .clone()
            .ok_or_else(|| DocParseError::ModelRequired {
                document: doc.name().to_string(),
            })?;
        let model = engine.analyze(doc, pdf_type).await?;
        debug!("{}: inference produced {} pages", doc.name(), model.len());
        state.model = model;
        Ok(())
    }

    /// Build the intermediate record, writing image assets to `images`.
    async fn parse(
        &mut self,
        doc: &SourceDocument,
        images: &dyn ArtifactWriter,
    ) -> Result<(), DocParseError> {
        let state = self.state_mut();
        let pdf_type = state.classified(Stage::Parse)?;
        let parser = Arc::clone(&state.collaborators.parser);
        let middle = parser.parse(doc, &state.model, pdf_type, images).await?;
        debug!("{}: parsed {} pages", doc.name(), middle.pdf_info.len());
        state.middle = Some(middle);
        Ok(())
    }

    /// The intermediate record, once [`parse`](Self::parse) has run.
    fn middle(&self) -> Option<&MiddleJson> {
        self.state().middle.as_ref()
    }

    fn make_content_list(
        &self,
        image_prefix: &str,
        drop_mode: DropMode,
    ) -> Result<Vec<ContentBlock>, DocParseError> {
        format::content_list(self.state().parsed()?, image_prefix, drop_mode)
    }

    fn make_markdown(&self, image_prefix: &str, drop_mode: DropMode) -> Result<String, DocParseError> {
        format::markdown(self.state().parsed()?, image_prefix, drop_mode)
    }
}

// ── Variants ─────────────────────────────────────────────────────────────

/// Classifies each document before parsing it.
pub struct AutoStrategy {
    state: StrategyState,
}

#[async_trait]
impl StageStrategy for AutoStrategy {
    fn method(&self) -> ParseMethod {
        ParseMethod::Auto
    }

    fn state(&self) -> &StrategyState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StrategyState {
        &mut self.state
    }

    async fn classify(&mut self, doc: &SourceDocument) -> Result<(), DocParseError> {
        let classifier = Arc::clone(&self.state.collaborators.classifier);
        let pdf_type = classifier.classify(doc).await?;
        debug!("{}: classified as {:?}", doc.name(), pdf_type);
        self.state.set_pdf_type(pdf_type);
        Ok(())
    }
}

/// Treats every document as scanned.
pub struct OcrStrategy {
    state: StrategyState,
}

#[async_trait]
impl StageStrategy for OcrStrategy {
    fn method(&self) -> ParseMethod {
        ParseMethod::Ocr
    }

    fn state(&self) -> &StrategyState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StrategyState {
        &mut self.state
    }

    async fn classify(&mut self, _doc: &SourceDocument) -> Result<(), DocParseError> {
        self.state.set_pdf_type(PdfType::Ocr);
        Ok(())
    }
}

/// Treats every document as carrying a text layer.
pub struct TxtStrategy {
    state: StrategyState,
}

#[async_trait]
impl StageStrategy for TxtStrategy {
    fn method(&self) -> ParseMethod {
        ParseMethod::Txt
    }

    fn state(&self) -> &StrategyState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StrategyState {
        &mut self.state
    }

    async fn classify(&mut self, _doc: &SourceDocument) -> Result<(), DocParseError> {
        self.state.set_pdf_type(PdfType::Text);
        Ok(())
    }
}

// ── Selector ─────────────────────────────────────────────────────────────

/// Maps a method name onto a strategy bound to one document's model data.
#[derive(Clone)]
pub struct StrategySelector {
    collaborators: Collaborators,
}

impl StrategySelector {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    /// Selector wired to the reference collaborators.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(Collaborators::reference(config))
    }

    /// Select the strategy for `method` (`auto`, `ocr` or `txt`,
    /// case-insensitive). An empty `model` means "compute internally".
    pub fn select(
        &self,
        method: &str,
        model: ModelRecord,
    ) -> Result<Box<dyn StageStrategy>, DocParseError> {
        let method: ParseMethod = method.parse()?;
        let state = StrategyState::new(self.collaborators.clone(), model);
        Ok(match method {
            ParseMethod::Auto => Box::new(AutoStrategy { state }),
            ParseMethod::Ocr => Box::new(OcrStrategy { state }),
            ParseMethod::Txt => Box::new(TxtStrategy { state }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PageInference;
    use crate::output::PageLayout;
    use crate::writer::MemoryWriter;
    use std::path::Path;

    struct FixedClassifier(PdfType);

    #[async_trait]
    impl DocumentClassifier for FixedClassifier {
        async fn classify(&self, _doc: &SourceDocument) -> Result<PdfType, DocParseError> {
            Ok(self.0)
        }
    }

    struct EchoParser;

    #[async_trait]
    impl PageParser for EchoParser {
        async fn parse(
            &self,
            _doc: &SourceDocument,
            model: &ModelRecord,
            pdf_type: PdfType,
            _images: &dyn ArtifactWriter,
        ) -> Result<MiddleJson, DocParseError> {
            let pages = model
                .iter()
                .map(|p| PageLayout::new(p.page_info.page_no, [p.page_info.width, p.page_info.height]))
                .collect();
            Ok(MiddleJson::new(pdf_type.parse_type(), pages))
        }
    }

    fn selector(inference: Option<Arc<dyn InferenceEngine>>) -> StrategySelector {
        StrategySelector::new(Collaborators {
            classifier: Arc::new(FixedClassifier(PdfType::Text)),
            inference,
            parser: Arc::new(EchoParser),
        })
    }

    fn doc() -> SourceDocument {
        SourceDocument::from_bytes("/in/a.pdf", b"%PDF".to_vec(), Path::new("/out"), "images")
    }

    #[test]
    fn selects_each_method() {
        let s = selector(None);
        for (name, method) in [
            ("auto", ParseMethod::Auto),
            ("ocr", ParseMethod::Ocr),
            ("TXT", ParseMethod::Txt),
        ] {
            assert_eq!(s.select(name, Vec::new()).unwrap().method(), method);
        }
        assert!(matches!(
            s.select("html", Vec::new()).err(),
            Some(DocParseError::UnknownMethod { .. })
        ));
    }

    #[tokio::test]
    async fn classification_sets_parse_type() {
        let s = selector(None);
        let model = vec![PageInference::new(0, 100.0, 200.0)];
        let images = MemoryWriter::new();

        let mut auto = s.select("auto", model.clone()).unwrap();
        auto.classify(&doc()).await.unwrap();
        auto.parse(&doc(), &images).await.unwrap();
        assert_eq!(auto.middle().unwrap().parse_type, "txt");

        let mut ocr = s.select("ocr", model).unwrap();
        ocr.classify(&doc()).await.unwrap();
        ocr.parse(&doc(), &images).await.unwrap();
        assert_eq!(ocr.middle().unwrap().parse_type, "ocr");
    }

    #[tokio::test]
    async fn analyze_without_engine_requires_model() {
        let mut strategy = selector(None).select("ocr", Vec::new()).unwrap();
        strategy.classify(&doc()).await.unwrap();
        let err = strategy.analyze(&doc()).await.unwrap_err();
        assert!(matches!(err, DocParseError::ModelRequired { ref document } if document == "a"));
    }

    #[tokio::test]
    async fn stages_out_of_order_fail() {
        let mut strategy = selector(None).select("txt", Vec::new()).unwrap();
        let err = strategy.parse(&doc(), &MemoryWriter::new()).await.unwrap_err();
        assert!(matches!(err, DocParseError::StageFailed { stage: Stage::Parse, .. }));
        let err = strategy.make_markdown("images", DropMode::None).unwrap_err();
        assert!(matches!(err, DocParseError::StageFailed { stage: Stage::Format, .. }));
    }
}
