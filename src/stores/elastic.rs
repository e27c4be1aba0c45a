//! HTTP client for the search store.
//!
//! Speaks the store's REST surface directly with `reqwest` + JSON: index
//! bootstrap, bulk writes (the Indexing Sink), the three ranked queries, and
//! the enrichment-pipeline bootstrap that fills the sparse-term field
//! server-side.

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use url::Url;

use super::{ChunkRecord, SPARSE_TERMS_FIELD, StoreHit, default_mapping};
use crate::types::FathomError;

#[derive(Clone)]
pub struct ElasticStore {
    client: Client,
    base: Url,
}

impl ElasticStore {
    pub fn new(client: Client, base: Url) -> Self {
        Self { client, base }
    }

    pub fn from_url(client: Client, base: &str) -> Result<Self, FathomError> {
        let base = Url::parse(base).map_err(|err| FathomError::Storage(err.to_string()))?;
        Ok(Self::new(client, base))
    }

    fn endpoint(&self, path: &str) -> Result<Url, FathomError> {
        self.base
            .join(path)
            .map_err(|err| FathomError::Storage(err.to_string()))
    }

    /// Liveness probe against the store root.
    pub async fn ping(&self) -> bool {
        match self.endpoint("") {
            Ok(url) => matches!(
                self.client.get(url).send().await,
                Ok(response) if response.status().is_success()
            ),
            Err(_) => false,
        }
    }

    /// Creates `index` with the canonical mapping unless it already exists.
    pub async fn ensure_index(&self, index: &str) -> Result<(), FathomError> {
        let url = self.endpoint(index)?;
        let head = self.client.head(url.clone()).send().await?;
        match head.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                self.client
                    .put(url)
                    .json(&default_mapping())
                    .send()
                    .await?
                    .error_for_status()?;
                Ok(())
            }
            status => Err(FathomError::Storage(format!(
                "index existence check for '{index}' returned {status}"
            ))),
        }
    }

    /// Bulk-writes `records` into `index`, optionally through a server-side
    /// enrichment pipeline, then refreshes the index. Returns the number of
    /// records written; an empty input is a no-op returning zero.
    pub async fn bulk_index(
        &self,
        index: &str,
        records: &[ChunkRecord],
        pipeline: Option<&str>,
    ) -> Result<usize, FathomError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut url = self.endpoint("_bulk")?;
        if let Some(pipeline) = pipeline {
            url.query_pairs_mut().append_pair("pipeline", pipeline);
        }

        let body = bulk_body(index, records)?;
        let response: Value = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response["errors"].as_bool().unwrap_or(false) {
            let failed = response["items"]
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter(|item| !item["index"]["error"].is_null())
                        .count()
                })
                .unwrap_or(0);
            return Err(FathomError::Storage(format!(
                "bulk write into '{index}' reported {failed} failed items"
            )));
        }

        self.refresh(index).await?;
        Ok(records.len())
    }

    pub async fn refresh(&self, index: &str) -> Result<(), FathomError> {
        let url = self.endpoint(&format!("{index}/_refresh"))?;
        self.client.post(url).send().await?.error_for_status()?;
        Ok(())
    }

    /// Exact lookup by `chunk_id`.
    pub async fn get_by_chunk_id(
        &self,
        index: &str,
        chunk_id: &str,
    ) -> Result<Option<ChunkRecord>, FathomError> {
        let body = json!({
            "query": {"term": {"chunk_id": {"value": chunk_id}}},
            "size": 1,
        });
        let hits = self.search(index, &body).await?;
        Ok(hits.into_iter().next().map(|hit| hit.record))
    }

    /// Keyword-match ranking over the text body.
    pub async fn search_lexical(
        &self,
        index: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<StoreHit>, FathomError> {
        let body = json!({
            "query": {"match": {"text": {"query": query}}},
            "size": k,
        });
        self.search(index, &body).await
    }

    /// Approximate nearest-neighbor ranking over the embedding field. The
    /// candidate pool is requested deliberately wider than `k`.
    pub async fn search_dense(
        &self,
        index: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<StoreHit>, FathomError> {
        let body = json!({
            "knn": {
                "field": "embedding",
                "query_vector": embedding,
                "k": k,
                "num_candidates": (k * 10).max(50),
            },
            "_source": true,
        });
        self.search(index, &body).await
    }

    /// Sparse-term-expansion ranking; the store routes `query` through the
    /// named inference endpoint itself.
    pub async fn search_sparse(
        &self,
        index: &str,
        query: &str,
        inference_id: &str,
        k: usize,
    ) -> Result<Vec<StoreHit>, FathomError> {
        let body = json!({
            "query": {
                "text_expansion": {
                    (SPARSE_TERMS_FIELD): {
                        "model_text": query,
                        "inference_id": inference_id,
                    }
                }
            },
            "size": k,
        });
        self.search(index, &body).await
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Vec<StoreHit>, FathomError> {
        let url = self.endpoint(&format!("{index}/_search"))?;
        let response: Value = self
            .client
            .post(url)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(parse_hits(&response))
    }

    /// Creates or overwrites the enrichment pipeline that writes sparse
    /// terms from `text` into the sparse-term field via `inference_id`.
    pub async fn put_enrichment_pipeline(
        &self,
        pipeline_id: &str,
        inference_id: &str,
    ) -> Result<(), FathomError> {
        let url = self.endpoint(&format!("_ingest/pipeline/{pipeline_id}"))?;
        let body = json!({
            "processors": [{
                "inference": {
                    "model_id": inference_id,
                    "input_output": [
                        {"input_field": "text", "output_field": SPARSE_TERMS_FIELD}
                    ],
                }
            }]
        });
        self.client
            .put(url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Runs the enrichment pipeline over every record already in `index`,
    /// filling the sparse-term field for documents written before the
    /// pipeline existed.
    pub async fn backfill_sparse_terms(
        &self,
        index: &str,
        pipeline_id: &str,
    ) -> Result<(), FathomError> {
        let mut url = self.endpoint(&format!("{index}/_update_by_query"))?;
        url.query_pairs_mut()
            .append_pair("pipeline", pipeline_id)
            .append_pair("conflicts", "proceed")
            .append_pair("refresh", "true");
        self.client
            .post(url)
            .json(&json!({"query": {"match_all": {}}}))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn bulk_body(index: &str, records: &[ChunkRecord]) -> Result<String, FathomError> {
    let mut body = String::new();
    for record in records {
        let action = json!({"index": {"_index": index}});
        let source = serde_json::to_string(record)
            .map_err(|err| FathomError::Storage(err.to_string()))?;
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&source);
        body.push('\n');
    }
    Ok(body)
}

fn parse_hits(response: &Value) -> Vec<StoreHit> {
    let Some(hits) = response["hits"]["hits"].as_array() else {
        return Vec::new();
    };
    hits.iter()
        .filter_map(|hit| {
            let record: ChunkRecord = match serde_json::from_value(hit["_source"].clone()) {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!(error = %err, "dropping malformed hit from store response");
                    return None;
                }
            };
            Some(StoreHit {
                id: hit["_id"].as_str().unwrap_or_default().to_string(),
                score: hit["_score"].as_f64().unwrap_or_default(),
                record,
            })
        })
        .collect()
}
