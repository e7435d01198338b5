//! Stage ordering for one document.
//!
//! ```text
//! classify ──▶ model gate ──▶ parse ──▶ format
//!                │
//!                ├─ model supplied        → skip
//!                ├─ empty + inside model  → analyze
//!                └─ empty, no inside model → ModelRequired (nothing written)
//! ```
//!
//! Stages run strictly in sequence and the first error aborts the rest.
//! The model record is cloned into the [`RunResult`] at formatting time, so
//! the published `_model.json` is the state the views were built from even
//! if a strategy keeps mutating its own copy afterwards.

use crate::config::PipelineConfig;
use crate::error::{DocParseError, Stage};
use crate::output::RunResult;
use crate::pipeline::input::SourceDocument;
use crate::strategy::StageStrategy;
use crate::writer::{ArtifactWriter, DiskWriter, MemoryWriter};
use tracing::{debug, info};

/// Drives a strategy through the stages for one document.
#[derive(Debug, Clone, Copy)]
pub struct PipelineRunner<'a> {
    config: &'a PipelineConfig,
}

impl<'a> PipelineRunner<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Run every stage, writing image assets under the document's image
    /// directory when publishing is enabled and into memory otherwise.
    pub async fn run(
        &self,
        strategy: &mut dyn StageStrategy,
        doc: &SourceDocument,
    ) -> Result<RunResult, DocParseError> {
        self.prepare(strategy, doc).await?;

        if self.config.publish {
            let images = DiskWriter::new(doc.image_dir());
            images
                .create_root()
                .await
                .map_err(|e| DocParseError::stage(Stage::Parse, e.to_string()))?;
            self.finish(strategy, doc, &images).await
        } else {
            let images = MemoryWriter::new();
            self.finish(strategy, doc, &images).await
        }
    }

    /// Like [`run`](Self::run), with image assets going to `images`.
    pub async fn run_with_writer(
        &self,
        strategy: &mut dyn StageStrategy,
        doc: &SourceDocument,
        images: &dyn ArtifactWriter,
    ) -> Result<RunResult, DocParseError> {
        self.prepare(strategy, doc).await?;
        self.finish(strategy, doc, images).await
    }

    /// Classify, then pass the model-data gate.
    async fn prepare(
        &self,
        strategy: &mut dyn StageStrategy,
        doc: &SourceDocument,
    ) -> Result<(), DocParseError> {
        debug!("{}: classify ({})", doc.name(), strategy.method());
        strategy.classify(doc).await?;

        if strategy.model_record().is_empty() {
            if !self.config.use_inside_model {
                return Err(DocParseError::ModelRequired {
                    document: doc.name().to_string(),
                });
            }
            info!("{}: no model data supplied, running inference", doc.name());
            strategy.analyze(doc).await?;
        } else {
            debug!(
                "{}: using {} supplied model pages",
                doc.name(),
                strategy.model_record().len()
            );
        }
        Ok(())
    }

    async fn finish(
        &self,
        strategy: &mut dyn StageStrategy,
        doc: &SourceDocument,
        images: &dyn ArtifactWriter,
    ) -> Result<RunResult, DocParseError> {
        debug!("{}: parse", doc.name());
        strategy.parse(doc, images).await?;

        debug!("{}: format", doc.name());
        let prefix = doc.image_prefix();
        let drop_mode = self.config.drop_mode;
        let content_list = strategy.make_content_list(&prefix, drop_mode)?;
        let markdown = strategy.make_markdown(&prefix, drop_mode)?;
        let middle = strategy
            .middle()
            .cloned()
            .ok_or_else(|| DocParseError::stage(Stage::Format, "no intermediate record"))?;

        Ok(RunResult {
            model: strategy.model_record().clone(),
            middle,
            content_list,
            markdown,
            image_prefix: prefix,
        })
    }
}
