//! Streaming batch API: emit document outcomes as they complete.
//!
//! ## Why stream?
//!
//! A directory of scanned reports can take a long time. Streaming lets
//! callers show each finished document immediately or stop early, instead
//! of waiting for the full [`crate::output::BatchReport`].
//!
//! Outcomes arrive in completion order when `workers > 1`; each item carries
//! the request's index so callers can restore input order.

use crate::batch::{output_owners, BatchDriver, DocumentRequest};
use crate::output::DocumentOutcome;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;

/// A boxed stream of `(input index, outcome)` pairs.
pub type OutcomeStream<'a> = Pin<Box<dyn Stream<Item = (usize, DocumentOutcome)> + Send + 'a>>;

impl BatchDriver {
    /// Process `requests` with up to `workers` documents in flight,
    /// yielding each outcome as soon as its document finishes.
    ///
    /// Duplicate output directories are rejected as in [`BatchDriver::run`].
    /// Per-document progress callbacks fire as in [`BatchDriver::run`];
    /// the batch-level start/complete callbacks do not.
    ///
    /// # Example
    /// ```rust,no_run
    /// use edgequake_docparse::{BatchDriver, DocumentRequest, PipelineConfig};
    /// use futures::StreamExt;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let driver = BatchDriver::new(PipelineConfig::default());
    /// let requests = vec![DocumentRequest::new("a.pdf"), DocumentRequest::new("b.pdf")];
    /// let mut outcomes = driver.stream(&requests);
    /// while let Some((index, outcome)) = outcomes.next().await {
    ///     println!("#{index} {}: ok={}", outcome.input.display(), outcome.is_success());
    /// }
    /// # }
    /// ```
    pub fn stream<'a>(&'a self, requests: &'a [DocumentRequest]) -> OutcomeStream<'a> {
        let total = requests.len();
        let workers = self.config().workers.max(1);
        let owners = Arc::new(output_owners(requests));
        let s = stream::iter(requests.iter().enumerate().map(move |(index, request)| {
            let owners = Arc::clone(&owners);
            async move {
                let owner = owners[index].as_deref();
                (index, self.process_indexed(index, total, request, owner).await)
            }
        }))
        .buffer_unordered(workers);
        Box::pin(s)
    }
}
