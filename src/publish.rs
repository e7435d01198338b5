//! Artifact publishing: persist one run's four artifacts.
//!
//! | File | Content |
//! |------|---------|
//! | `{name}_model.json`        | model record as of formatting time |
//! | `{name}_middle.json`       | intermediate parse record |
//! | `{name}_content_list.json` | content list |
//! | `{name}.md`                | rendered Markdown |
//!
//! JSON is pretty-printed with a 4-space indent and non-ASCII text is
//! written as-is. Each artifact is attempted independently: a failed write
//! is recorded in the [`PublishReport`] and the remaining artifacts are
//! still written.

use crate::error::ArtifactError;
use crate::output::{PublishReport, RunResult};
use crate::pipeline::input::SourceDocument;
use crate::writer::{ArtifactWriter, DiskWriter};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Serialise `value` as pretty JSON with a 4-space indent.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// Writes a run's artifacts through an [`ArtifactWriter`] rooted at the
/// document's output directory.
#[derive(Clone)]
pub struct ArtifactPublisher {
    writer: Arc<dyn ArtifactWriter>,
}

impl ArtifactPublisher {
    pub fn new(writer: Arc<dyn ArtifactWriter>) -> Self {
        Self { writer }
    }

    /// Publisher writing under `doc.output_dir()` on disk.
    pub fn for_document(doc: &SourceDocument) -> Self {
        Self::new(Arc::new(DiskWriter::new(doc.output_dir())))
    }

    /// Write all four artifacts named after `name`.
    pub async fn publish(&self, name: &str, result: &RunResult) -> PublishReport {
        let mut report = PublishReport::default();

        let json_artifacts: [(String, Result<Vec<u8>, serde_json::Error>); 3] = [
            (format!("{name}_model.json"), to_pretty_json(&result.model)),
            (format!("{name}_middle.json"), to_pretty_json(&result.middle)),
            (
                format!("{name}_content_list.json"),
                to_pretty_json(&result.content_list),
            ),
        ];
        for (path, encoded) in json_artifacts {
            match encoded {
                Ok(bytes) => self.write_one(&mut report, &bytes, path).await,
                Err(e) => {
                    warn!("Could not serialise {}: {}", path, e);
                    report.failures.push(ArtifactError::Serialize {
                        path,
                        detail: e.to_string(),
                    });
                }
            }
        }

        self.write_one(&mut report, result.markdown.as_bytes(), format!("{name}.md"))
            .await;

        info!(
            "{}: published {} artifacts ({} failed)",
            name,
            report.written.len(),
            report.failures.len()
        );
        report
    }

    async fn write_one(&self, report: &mut PublishReport, content: &[u8], path: String) {
        match self.writer.write(content, &path).await {
            Ok(()) => report.written.push(path),
            Err(e) => {
                warn!("Artifact write failed: {}", e);
                report.failures.push(e);
            }
        }
    }
}
