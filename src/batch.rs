//! Batch driving: many documents, each fully isolated.
//!
//! Every document runs its own chain (resolve → load model data → select →
//! run → publish) and ends as a [`DocumentOutcome`]. Errors never cross a
//! document boundary: a failing input is logged, reported through the
//! progress callback, and the batch moves on.
//!
//! ## Concurrency
//!
//! Documents share nothing mutable and write to disjoint directories, so up
//! to `config.workers` of them run at once (`buffer_unordered`). Within a
//! document the stages stay strictly sequential. Two requests resolving to
//! the same `{root}/{name}` directory (e.g. `a.pdf` and `a.PDF`) would
//! overwrite each other, so every request after the first is failed with
//! [`DocParseError::DuplicateOutput`] before it runs. An optional
//! `document_timeout_secs` bounds each document on its own; a timeout fails
//! that document only.

use crate::config::{ParseMethod, PipelineConfig};
use crate::error::DocParseError;
use crate::model::{load_model_json, ModelRecord};
use crate::output::{BatchReport, DocumentOutcome, RunSummary};
use crate::pipeline::input::{discover_documents, document_name, output_dir_for, resolve_document};
use crate::publish::ArtifactPublisher;
use crate::runner::PipelineRunner;
use crate::strategy::{Collaborators, StrategySelector};
use futures::stream::{self, StreamExt};
use std::collections::hash_map::{Entry, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{error, info};

/// One document to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRequest {
    pub input: PathBuf,
    /// `auto`, `ocr` or `txt`; validated per document.
    pub method: String,
    /// Precomputed model data (JSON array). Absent or empty means
    /// "compute internally".
    pub model_json: Option<PathBuf>,
    /// Shared output root; defaults to the input's parent directory.
    pub output_root: Option<PathBuf>,
}

impl DocumentRequest {
    /// Request with the default `ocr` method.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            method: ParseMethod::default().to_string(),
            model_json: None,
            output_root: None,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn model_json(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_json = Some(path.into());
        self
    }

    pub fn output_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_root = Some(dir.into());
        self
    }
}

/// Runs documents through selector → runner → publisher.
#[derive(Clone)]
pub struct BatchDriver {
    config: PipelineConfig,
    selector: StrategySelector,
}

impl BatchDriver {
    /// Driver using the reference collaborators.
    pub fn new(config: PipelineConfig) -> Self {
        let selector = StrategySelector::from_config(&config);
        Self { config, selector }
    }

    /// Driver using caller-supplied collaborators.
    pub fn with_collaborators(config: PipelineConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            selector: StrategySelector::new(collaborators),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one document, honouring the per-document timeout.
    pub async fn process(&self, request: &DocumentRequest) -> DocumentOutcome {
        let result = match self.config.document_timeout_secs {
            Some(secs) => match timeout(Duration::from_secs(secs), self.process_inner(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(DocParseError::Timeout {
                    document: document_name(&request.input),
                    secs,
                }),
            },
            None => self.process_inner(request).await,
        };

        record_outcome(request, result)
    }

    async fn process_inner(&self, request: &DocumentRequest) -> Result<RunSummary, DocParseError> {
        let start = Instant::now();
        let doc = resolve_document(
            &request.input,
            request.output_root.as_deref(),
            &self.config.image_dir_name,
        )
        .await?;
        info!("{}: start ({})", doc.name(), request.method);

        let model: ModelRecord = match request.model_json {
            Some(ref path) => load_model_json(path).await?,
            None => Vec::new(),
        };

        let mut strategy = self.selector.select(&request.method, model)?;
        let method = strategy.method();
        let result = PipelineRunner::new(&self.config)
            .run(strategy.as_mut(), &doc)
            .await?;

        let publish = if self.config.publish {
            Some(
                ArtifactPublisher::for_document(&doc)
                    .publish(doc.name(), &result)
                    .await,
            )
        } else {
            None
        };

        let summary = RunSummary {
            name: doc.name().to_string(),
            input: doc.path().to_path_buf(),
            method,
            output_dir: doc.output_dir().to_path_buf(),
            pages: result.middle.pdf_info.len(),
            content_blocks: result.content_list.len(),
            images: result.middle.image_count(),
            publish,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "{}: done in {}ms ({} pages, {} blocks)",
            summary.name, summary.duration_ms, summary.pages, summary.content_blocks
        );
        Ok(summary)
    }

    /// Process `index` of `total`, firing the progress callbacks.
    ///
    /// `owner` is the earlier request holding the same output directory;
    /// when set, the document fails without running.
    pub(crate) async fn process_indexed(
        &self,
        index: usize,
        total: usize,
        request: &DocumentRequest,
        owner: Option<&Path>,
    ) -> DocumentOutcome {
        let name = document_name(&request.input);
        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_document_start(&name, index, total);
        }
        let outcome = match owner {
            Some(first) => record_outcome(
                request,
                Err(DocParseError::DuplicateOutput {
                    output_dir: output_dir_for(&request.input, request.output_root.as_deref()),
                    first: first.to_path_buf(),
                }),
            ),
            None => self.process(request).await,
        };
        if let Some(cb) = cb {
            match &outcome.result {
                Ok(_) => cb.on_document_complete(&name, index, total),
                Err(e) => cb.on_document_error(&name, index, total, &e.to_string()),
            }
        }
        outcome
    }

    /// Process every request and report outcomes in input order.
    pub async fn run(&self, requests: &[DocumentRequest]) -> BatchReport {
        let start = Instant::now();
        let total = requests.len();
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }
        info!("Batch of {} documents, {} workers", total, self.config.workers);

        let owners = output_owners(requests);
        let owners = &owners;
        let mut indexed: Vec<(usize, DocumentOutcome)> =
            stream::iter(requests.iter().enumerate().map(|(index, request)| async move {
                let owner = owners[index].as_deref();
                (index, self.process_indexed(index, total, request, owner).await)
            }))
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;
        indexed.sort_by_key(|(index, _)| *index);

        let report = BatchReport {
            documents: indexed.into_iter().map(|(_, outcome)| outcome).collect(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Batch complete: {}/{} succeeded in {}ms",
            report.succeeded(),
            report.total(),
            report.duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(report.total(), report.succeeded());
        }
        report
    }
}

fn record_outcome(
    request: &DocumentRequest,
    result: Result<RunSummary, DocParseError>,
) -> DocumentOutcome {
    if let Err(ref e) = result {
        error!(
            document = %document_name(&request.input),
            input = %request.input.display(),
            config_error = e.is_config_error(),
            "Document failed: {}",
            e
        );
    }
    DocumentOutcome {
        input: request.input.clone(),
        result,
    }
}

/// For each request, the input of an earlier request that resolves to the
/// same output directory.
pub(crate) fn output_owners(requests: &[DocumentRequest]) -> Vec<Option<PathBuf>> {
    let mut owners: HashMap<PathBuf, &Path> = HashMap::new();
    requests
        .iter()
        .map(
            |r| match owners.entry(output_dir_for(&r.input, r.output_root.as_deref())) {
                Entry::Occupied(first) => Some(first.get().to_path_buf()),
                Entry::Vacant(slot) => {
                    slot.insert(&r.input);
                    None
                }
            },
        )
        .collect()
}

/// Requests for every PDF directly inside `dir`, sharing one method and
/// output root.
pub async fn directory_requests(
    dir: &Path,
    method: &str,
    output_root: Option<&Path>,
) -> Result<Vec<DocumentRequest>, DocParseError> {
    let inputs = discover_documents(dir).await?;
    Ok(inputs
        .into_iter()
        .map(|input| {
            let request = DocumentRequest::new(input).method(method);
            match output_root {
                Some(root) => request.output_root(root),
                None => request,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_to_ocr() {
        let r = DocumentRequest::new("/in/a.pdf");
        assert_eq!(r.method, "ocr");
        assert!(r.model_json.is_none());
        assert!(r.output_root.is_none());

        let r = r.method("txt").output_root("/out").model_json("/in/a_model.json");
        assert_eq!(r.method, "txt");
        assert_eq!(r.output_root.as_deref(), Some(Path::new("/out")));
    }

    #[test]
    fn later_requests_sharing_an_output_dir_are_flagged() {
        let requests = [
            DocumentRequest::new("/in/a.PDF").output_root("/out"),
            DocumentRequest::new("/in/a.pdf").output_root("/out"),
            DocumentRequest::new("/other/a.pdf").output_root("/elsewhere"),
            DocumentRequest::new("/other/b.pdf").output_root("/out"),
        ];
        let owners = output_owners(&requests);
        assert_eq!(owners[0], None);
        assert_eq!(owners[1].as_deref(), Some(Path::new("/in/a.PDF")));
        assert_eq!(owners[2], None);
        assert_eq!(owners[3], None);
    }

    #[tokio::test]
    async fn directory_requests_share_root_and_method() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.pdf", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"%PDF-1.4").unwrap();
        }
        let requests = directory_requests(dir.path(), "auto", Some(Path::new("/out")))
            .await
            .unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].input.ends_with("a.pdf"));
        assert!(requests
            .iter()
            .all(|r| r.method == "auto" && r.output_root.as_deref() == Some(Path::new("/out"))));
    }
}
