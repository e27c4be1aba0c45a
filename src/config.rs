//! Process configuration.
//!
//! Settings are read from the environment exactly once (a `.env` file is
//! honored via `dotenvy`) and handed to component constructors explicitly,
//! so nothing reads ambient state at call sites and every component stays
//! independently testable.

use std::env;
use std::path::PathBuf;

use crate::retrieval::RetrievalMode;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the search store.
    pub store_url: String,
    /// Collection name chunks are written to and queried from.
    pub index: String,
    pub retrieval_mode: RetrievalMode,
    pub top_k: usize,
    /// Endpoint of the embedding service.
    pub embed_url: String,
    /// Inference endpoint id the store uses for sparse-term expansion.
    pub sparse_inference_id: String,
    /// Server-side pipeline that enriches records with sparse terms.
    pub enrichment_pipeline: String,
    /// Bearer token for the document host's authenticated tier, if any.
    pub drive_credential: Option<String>,
    /// Scratch directory for downloaded documents.
    pub download_dir: PathBuf,
    /// Concurrent per-file pipelines during folder ingestion.
    pub ingest_concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_url: "http://localhost:9200".into(),
            index: "docs".into(),
            retrieval_mode: RetrievalMode::Hybrid,
            top_k: 5,
            embed_url: "http://localhost:8080/embed".into(),
            sparse_inference_id: "my-elser-endpoint".into(),
            enrichment_pipeline: "elser-v2-mltokens".into(),
            drive_credential: None,
            download_dir: PathBuf::from("data/tmp"),
            ingest_concurrency: 4,
        }
    }
}

impl Settings {
    /// Loads settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Settings::default();
        Self {
            store_url: var_or("ELASTIC_URL", defaults.store_url),
            index: var_or("ELASTIC_INDEX", defaults.index),
            retrieval_mode: env::var("RETRIEVAL_MODE")
                .map(|mode| RetrievalMode::parse(&mode))
                .unwrap_or(defaults.retrieval_mode),
            top_k: parsed_var("TOP_K", defaults.top_k),
            embed_url: var_or("EMBED_URL", defaults.embed_url),
            sparse_inference_id: var_or("SPARSE_INFERENCE_ID", defaults.sparse_inference_id),
            enrichment_pipeline: var_or("ENRICHMENT_PIPELINE", defaults.enrichment_pipeline),
            drive_credential: env::var("DRIVE_ACCESS_TOKEN")
                .ok()
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty()),
            download_dir: env::var("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            ingest_concurrency: parsed_var("INGEST_CONCURRENCY", defaults.ingest_concurrency)
                .max(1),
        }
    }
}

fn var_or(key: &str, default: String) -> String {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
}

fn parsed_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
