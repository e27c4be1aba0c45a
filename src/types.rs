//! Shared error and reporting types.

use thiserror::Error;

/// Crate-level error taxonomy.
///
/// The variants mirror the failure classes of the pipeline: classification
/// failures are terminal, acquisition failures are retried tier-by-tier
/// before surfacing here, extraction failures are usually absorbed into
/// empty output by the callers that can tolerate them.
#[derive(Debug, Error)]
pub enum FathomError {
    /// A document reference did not match any recognized link shape.
    #[error("unrecognized document reference: {0}")]
    Classification(String),

    /// Downloading a remote document failed across every available tier.
    #[error("acquisition failed: {0}")]
    Acquisition(String),

    /// A source document could not be parsed.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The embedding service rejected a batch or returned malformed output.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The search store rejected a request.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a multi-document ingestion run.
///
/// Partial success is the expected common case: `skipped` counts folder
/// members that failed every acquisition tier or final validation, while
/// `indexed` counts chunk records actually written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestReport {
    pub indexed: usize,
    pub skipped: usize,
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        self.indexed += other.indexed;
        self.skipped += other.skipped;
    }
}
