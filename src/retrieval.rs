//! Multi-signal retrieval and reciprocal-rank fusion.
//!
//! A query fans out to up to three independent ranking systems (keyword
//! match, dense nearest-neighbor, sparse-term expansion) and the ranked
//! lists are merged by summing reciprocal-rank contributions per
//! `(filename, chunk_id)` key. Fusion never compares raw scores across
//! systems; only ranks matter.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::embeddings::EmbeddingProvider;
use crate::stores::{ChunkRecord, ElasticStore, StoreHit};
use crate::types::FathomError;

/// Smoothing constant `C` in the `1 / (C + rank)` contribution.
pub const RRF_CONSTANT: f64 = 60.0;

/// The ranking system that produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalSource {
    Lexical,
    Dense,
    Sparse,
}

impl SignalSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalSource::Lexical => "lexical",
            SignalSource::Dense => "dense",
            SignalSource::Sparse => "sparse",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which systems a query fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetrievalMode {
    /// Sparse, dense, and lexical, fused.
    #[default]
    Hybrid,
    /// Sparse expansion with lexical as the baseline.
    Sparse,
}

impl RetrievalMode {
    /// Parses a mode name the way the query surface does: `"sparse"` (or
    /// its legacy alias `"elser"`) selects the single-signal mode; anything
    /// else falls back to hybrid.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "sparse" | "elser" => RetrievalMode::Sparse,
            _ => RetrievalMode::Hybrid,
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalMode::Hybrid => f.write_str("hybrid"),
            RetrievalMode::Sparse => f.write_str("sparse"),
        }
    }
}

/// One entry of a single system's ranked list.
#[derive(Debug, Clone)]
pub struct RankedHit {
    pub id: String,
    pub score: f64,
    pub source: SignalSource,
    pub record: ChunkRecord,
}

/// One entry of the fused result list.
///
/// Record content, store id, and system score come verbatim from the first
/// system that produced the key; `rrf` is the fused score.
#[derive(Debug, Clone)]
pub struct FusedHit {
    pub id: String,
    pub score: f64,
    pub source: SignalSource,
    pub rrf: f64,
    pub record: ChunkRecord,
}

/// Merges ranked lists by reciprocal-rank fusion.
///
/// Each list contributes `1 / (constant + rank)` per key at its 1-based
/// rank; a key absent from a list contributes nothing. Output is ordered by
/// fused score descending, ties broken by first-seen insertion order across
/// the lists in the order given.
pub fn rrf_fuse(buckets: &[Vec<RankedHit>], constant: f64) -> Vec<FusedHit> {
    let mut scores: HashMap<(String, String), f64> = HashMap::new();
    let mut first_seen: HashMap<(String, String), RankedHit> = HashMap::new();
    let mut order: Vec<(String, String)> = Vec::new();

    for bucket in buckets {
        for (index, hit) in bucket.iter().enumerate() {
            let rank = index + 1;
            let key = (hit.record.filename.clone(), hit.record.chunk_id.clone());
            *scores.entry(key.clone()).or_default() += 1.0 / (constant + rank as f64);
            first_seen.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                hit.clone()
            });
        }
    }

    let mut fused: Vec<FusedHit> = order
        .into_iter()
        .filter_map(|key| {
            let rrf = scores.get(&key).copied()?;
            let hit = first_seen.remove(&key)?;
            Some(FusedHit {
                id: hit.id,
                score: hit.score,
                source: hit.source,
                rrf,
                record: hit.record,
            })
        })
        .collect();

    // Stable sort keeps insertion order for equal fused scores.
    fused.sort_by(|a, b| b.rrf.partial_cmp(&a.rrf).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

/// Ranked search over a query: the one capability all three scoring
/// systems share, so the fuser never special-cases a system beyond the
/// priority order it lists them in.
#[async_trait::async_trait]
pub trait RankedSearch: Send + Sync {
    fn source(&self) -> SignalSource;
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RankedHit>, FathomError>;
}

/// Keyword match over the text body.
pub struct LexicalSearch {
    store: ElasticStore,
    index: String,
}

impl LexicalSearch {
    pub fn new(store: ElasticStore, index: impl Into<String>) -> Self {
        Self {
            store,
            index: index.into(),
        }
    }
}

#[async_trait::async_trait]
impl RankedSearch for LexicalSearch {
    fn source(&self) -> SignalSource {
        SignalSource::Lexical
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<RankedHit>, FathomError> {
        let hits = self.store.search_lexical(&self.index, query, k).await?;
        Ok(tag(hits, SignalSource::Lexical))
    }
}

/// Dense nearest-neighbor over the embedding field; the query is embedded
/// through the same service used at ingest.
pub struct DenseSearch {
    store: ElasticStore,
    embedder: Arc<dyn EmbeddingProvider>,
    index: String,
}

impl DenseSearch {
    pub fn new(
        store: ElasticStore,
        embedder: Arc<dyn EmbeddingProvider>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            index: index.into(),
        }
    }
}

#[async_trait::async_trait]
impl RankedSearch for DenseSearch {
    fn source(&self) -> SignalSource {
        SignalSource::Dense
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<RankedHit>, FathomError> {
        let embedding = self.embedder.embed_one(query).await?;
        let hits = self.store.search_dense(&self.index, &embedding, k).await?;
        Ok(tag(hits, SignalSource::Dense))
    }
}

/// Sparse-term expansion through the store's inference endpoint.
pub struct SparseSearch {
    store: ElasticStore,
    index: String,
    inference_id: String,
}

impl SparseSearch {
    pub fn new(
        store: ElasticStore,
        index: impl Into<String>,
        inference_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            index: index.into(),
            inference_id: inference_id.into(),
        }
    }
}

#[async_trait::async_trait]
impl RankedSearch for SparseSearch {
    fn source(&self) -> SignalSource {
        SignalSource::Sparse
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<RankedHit>, FathomError> {
        let hits = self
            .store
            .search_sparse(&self.index, query, &self.inference_id, k)
            .await?;
        Ok(tag(hits, SignalSource::Sparse))
    }
}

/// Query-side fan-out and fusion over the store's ranking systems.
pub struct Retriever {
    lexical: LexicalSearch,
    dense: DenseSearch,
    sparse: SparseSearch,
}

impl Retriever {
    pub fn new(
        store: ElasticStore,
        embedder: Arc<dyn EmbeddingProvider>,
        index: impl Into<String>,
        sparse_inference_id: impl Into<String>,
    ) -> Self {
        let index = index.into();
        Self {
            lexical: LexicalSearch::new(store.clone(), index.clone()),
            dense: DenseSearch::new(store.clone(), embedder, index.clone()),
            sparse: SparseSearch::new(store, index, sparse_inference_id),
        }
    }

    /// Returns up to `k` fused records for `query`, ordered by fused score
    /// descending.
    ///
    /// The systems are queried concurrently, each capped at `k` results,
    /// and fusion waits for all of them. A system that fails contributes an
    /// empty list; an absent or empty index therefore yields an empty
    /// result, never an error.
    pub async fn retrieve(
        &self,
        query: &str,
        mode: RetrievalMode,
        k: usize,
    ) -> Result<Vec<FusedHit>, FathomError> {
        // Bucket order is the provenance priority: sparse leads in hybrid
        // so at least one fused item retains sparse provenance when lists
        // overlap.
        let systems: Vec<&dyn RankedSearch> = match mode {
            RetrievalMode::Sparse => vec![&self.lexical, &self.sparse],
            RetrievalMode::Hybrid => vec![&self.sparse, &self.dense, &self.lexical],
        };

        let buckets = futures_util::future::join_all(
            systems
                .into_iter()
                .map(|system| degraded_search(system, query, k)),
        )
        .await;

        let mut fused = rrf_fuse(&buckets, RRF_CONSTANT);
        fused.truncate(k);
        Ok(fused)
    }
}

/// Runs one system, degrading its failure to an empty ranked list.
async fn degraded_search(system: &dyn RankedSearch, query: &str, k: usize) -> Vec<RankedHit> {
    match system.search(query, k).await {
        Ok(hits) => hits,
        Err(err) => {
            tracing::warn!(
                system = %system.source(),
                error = %err,
                "ranking system unavailable, contributing empty list"
            );
            Vec::new()
        }
    }
}

fn tag(hits: Vec<StoreHit>, source: SignalSource) -> Vec<RankedHit> {
    hits.into_iter()
        .map(|hit| RankedHit {
            id: hit.id,
            score: hit.score,
            source,
            record: hit.record,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(filename: &str, chunk_id: &str, source: SignalSource) -> RankedHit {
        RankedHit {
            id: format!("{filename}-{chunk_id}"),
            score: 1.0,
            source,
            record: ChunkRecord {
                text: format!("text of {chunk_id}"),
                filename: filename.into(),
                url: format!("file:///{filename}"),
                chunk_id: chunk_id.into(),
                embedding: Vec::new(),
                page: None,
                heading: None,
                section: None,
                part_section: None,
            },
        }
    }

    #[test]
    fn fusion_merges_and_ranks_shared_keys_first() {
        let b1 = vec![hit("a", "x", SignalSource::Lexical), hit("b", "y", SignalSource::Lexical)];
        let b2 = vec![hit("b", "y", SignalSource::Sparse), hit("c", "z", SignalSource::Sparse)];

        let fused = rrf_fuse(&[b1, b2], 60.0);

        let keys: Vec<(String, String)> = fused
            .iter()
            .map(|f| (f.record.filename.clone(), f.record.chunk_id.clone()))
            .collect();
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&("a".into(), "x".into())));
        assert!(keys.contains(&("c".into(), "z".into())));
        // "b/y" appears in both lists and must rank first.
        assert_eq!(keys[0], ("b".into(), "y".into()));
    }

    #[test]
    fn fused_score_is_the_sum_of_reciprocal_ranks() {
        let b1 = vec![hit("a", "x", SignalSource::Sparse), hit("b", "y", SignalSource::Sparse)];
        let b2 = vec![hit("b", "y", SignalSource::Dense)];
        let b3 = vec![hit("b", "y", SignalSource::Lexical), hit("a", "x", SignalSource::Lexical)];

        let fused = rrf_fuse(&[b1, b2, b3], 60.0);

        let by_key: HashMap<String, f64> = fused
            .iter()
            .map(|f| (f.record.chunk_id.clone(), f.rrf))
            .collect();
        // "y": rank 2, rank 1, rank 1. "x": rank 1, rank 2.
        let expected_y = 1.0 / 62.0 + 1.0 / 61.0 + 1.0 / 61.0;
        let expected_x = 1.0 / 61.0 + 1.0 / 62.0;
        assert!((by_key["y"] - expected_y).abs() < 1e-12);
        assert!((by_key["x"] - expected_x).abs() < 1e-12);
    }

    #[test]
    fn fusion_is_commutative_over_system_order() {
        let b1 = vec![hit("a", "x", SignalSource::Lexical), hit("b", "y", SignalSource::Lexical)];
        let b2 = vec![hit("c", "z", SignalSource::Dense), hit("a", "x", SignalSource::Dense)];

        let forward = rrf_fuse(&[b1.clone(), b2.clone()], 60.0);
        let reversed = rrf_fuse(&[b2, b1], 60.0);

        let score_map = |fused: &[FusedHit]| -> HashMap<String, f64> {
            fused.iter().map(|f| (f.record.chunk_id.clone(), f.rrf)).collect()
        };
        assert_eq!(score_map(&forward), score_map(&reversed));
    }

    #[test]
    fn ties_keep_first_seen_insertion_order() {
        let b1 = vec![hit("a", "x", SignalSource::Sparse)];
        let b2 = vec![hit("b", "y", SignalSource::Dense)];

        let fused = rrf_fuse(&[b1, b2], 60.0);

        assert_eq!(fused.len(), 2);
        assert!((fused[0].rrf - fused[1].rrf).abs() < f64::EPSILON);
        assert_eq!(fused[0].record.chunk_id, "x");
        assert_eq!(fused[1].record.chunk_id, "y");
    }

    #[test]
    fn first_seen_system_provides_content_and_provenance() {
        let b1 = vec![hit("a", "x", SignalSource::Sparse)];
        let b2 = vec![hit("a", "x", SignalSource::Lexical)];

        let fused = rrf_fuse(&[b1, b2], 60.0);

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].source, SignalSource::Sparse);
    }

    #[test]
    fn empty_buckets_fuse_to_nothing() {
        assert!(rrf_fuse(&[Vec::new(), Vec::new()], 60.0).is_empty());
        assert!(rrf_fuse(&[], 60.0).is_empty());
    }

    #[test]
    fn mode_parsing_matches_the_query_surface() {
        assert_eq!(RetrievalMode::parse("hybrid"), RetrievalMode::Hybrid);
        assert_eq!(RetrievalMode::parse("SPARSE"), RetrievalMode::Sparse);
        assert_eq!(RetrievalMode::parse("elser"), RetrievalMode::Sparse);
        assert_eq!(RetrievalMode::parse("anything-else"), RetrievalMode::Hybrid);
    }
}
