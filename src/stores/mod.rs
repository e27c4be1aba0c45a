//! Search-store schema and client.
//!
//! The store is an external search service reached over HTTP. It owns the
//! three querying capabilities used by retrieval (keyword match, dense
//! nearest-neighbor over the embedding field, sparse-term expansion over
//! the enrichment-populated field) plus the bulk write path used by
//! ingestion. This module holds the record schema shared by both paths;
//! [`elastic`] holds the wire client.

pub mod elastic;

use serde::{Deserialize, Serialize};
use serde_json::json;

pub use elastic::ElasticStore;

use crate::embeddings::EMBEDDING_DIM;

/// Wire name of the field the enrichment pipeline fills with sparse terms.
pub const SPARSE_TERMS_FIELD: &str = "ml.tokens";

/// One indexed unit of text: the unit of both ingestion and retrieval.
///
/// `chunk_id` is unique within a document (`{filename}__{ordinal}` or
/// `{filename}__p{page}_{ordinal}`) and, together with `filename`, keys
/// deduplication during rank fusion. The sparse-term field is populated
/// server-side by the enrichment pipeline and never appears here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub text: String,
    pub filename: String,
    /// Origin reference: a `file://` URI or the remote link the document
    /// was acquired from.
    pub url: String,
    pub chunk_id: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// 1-based page within the source document, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_section: Option<String>,
}

/// A record returned by one ranking system, with the store's own score.
#[derive(Debug, Clone)]
pub struct StoreHit {
    /// Store-assigned document id.
    pub id: String,
    /// System-specific relevance score; not comparable across systems.
    pub score: f64,
    pub record: ChunkRecord,
}

/// Canonical mapping for a chunk collection: full-text body, keyword
/// metadata, a cosine dense vector sized to the embedding service, and the
/// sparse-term field the enrichment pipeline writes into.
pub fn default_mapping() -> serde_json::Value {
    json!({
        "mappings": {
            "properties": {
                "text": {"type": "text"},
                "filename": {"type": "keyword"},
                "url": {"type": "keyword"},
                "chunk_id": {"type": "keyword"},
                "embedding": {
                    "type": "dense_vector",
                    "dims": EMBEDDING_DIM,
                    "index": true,
                    "similarity": "cosine",
                },
                (SPARSE_TERMS_FIELD): {"type": "sparse_vector"},
                "page": {"type": "integer"},
                "heading": {"type": "keyword"},
                "section": {"type": "keyword"},
                "part_section": {"type": "keyword"},
            }
        }
    })
}
