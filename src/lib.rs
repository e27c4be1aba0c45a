//! Hybrid document retrieval over a PDF corpus.
//!
//! ```text
//! Drive link ──► acquisition (public tier ─► authenticated tier)
//! Local folder ─┘                │
//!                                ▼
//!            assembler ──► segmenter windows + page labels
//!                │
//!                ├─► embeddings (batch per page/document)
//!                ▼
//!            stores::ElasticStore::bulk_index ──► enrichment pipeline
//!
//! Query ──► retrieval (lexical ∥ dense ∥ sparse) ──► reciprocal-rank fusion
//! ```
//!
//! The ingestion path and the query path share only the record schema in
//! [`stores`] and the store itself. Everything that talks to the outside
//! world (document host, embedding service, search store) takes its client
//! and base URL at construction, so every flow runs against mock hosts in
//! tests.

pub mod acquisition;
pub mod assembler;
pub mod config;
pub mod embeddings;
pub mod ingest;
pub mod pdf;
pub mod retrieval;
pub mod segmenter;
pub mod stores;
pub mod types;

pub use acquisition::{AcquiredFile, AcquisitionConfig, DriveAcquirer, classify_reference};
pub use assembler::ChunkAssembler;
pub use config::Settings;
pub use embeddings::{EmbeddingProvider, HttpEmbeddingClient, MockEmbeddingProvider};
pub use ingest::Ingestor;
pub use retrieval::{
    DenseSearch, FusedHit, LexicalSearch, RankedSearch, RetrievalMode, Retriever, SparseSearch,
    rrf_fuse,
};
pub use stores::{ChunkRecord, ElasticStore};
pub use types::{FathomError, IngestReport};
