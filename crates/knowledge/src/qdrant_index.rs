//! Qdrant-backed vector index over the REST API.
//!
//! Each record becomes a point whose id is derived from the record id, with
//! `doc_name`, `text` and the serialized [`DocumentMeta`] in the payload.
//! Qdrant reports cosine similarity as `score`; hits carry `1 - score` as
//! distance so every backend speaks the same unit.

use crate::types::DocumentMeta;
use crate::vector_index::{IndexBackend, IndexHit, IndexRecord, VectorIndex};
use bocs_core::{AppError, AppResult};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Talks to one collection on a Qdrant server.
#[derive(Debug, Clone)]
pub struct QdrantBackend {
    client: Client,
    url: String,
    collection: String,
    api_key: Option<String>,
}

impl QdrantBackend {
    pub fn new(
        url: impl Into<String>,
        collection: impl Into<String>,
        api_key: Option<String>,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                AppError::Knowledge(format!("Failed to create HTTP client for Qdrant: {}", e))
            })?;

        let url = url.into();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "Qdrant location must be an http(s) URL, got '{}'",
                url
            )));
        }

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            collection: collection.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.url, self.collection)
    }

    fn request(&self, method: reqwest::Method, url: String) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn collection_exists(&self) -> AppResult<bool> {
        let response = send(self.request(reqwest::Method::GET, self.collection_url())).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(api_error(status, response).await),
        }
    }

    async fn create_collection(&self, dimensions: usize) -> AppResult<()> {
        let body = json!({ "vectors": { "size": dimensions, "distance": "Cosine" } });
        let response =
            send(self.request(reqwest::Method::PUT, self.collection_url()).json(&body)).await?;
        check(response).await?;
        tracing::info!(
            "Created Qdrant collection '{}' ({} dimensions)",
            self.collection,
            dimensions
        );
        Ok(())
    }

    async fn drop_collection(&self) -> AppResult<()> {
        let response = send(self.request(reqwest::Method::DELETE, self.collection_url())).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl IndexBackend for QdrantBackend {
    fn name(&self) -> &str {
        "qdrant"
    }

    fn location(&self) -> &str {
        &self.url
    }

    fn table(&self) -> &str {
        &self.collection
    }

    async fn open(&self, dimensions: usize) -> AppResult<Arc<dyn VectorIndex>> {
        if !self.collection_exists().await? {
            self.create_collection(dimensions).await?;
        }
        Ok(Arc::new(QdrantIndex {
            backend: self.clone(),
            dimensions,
        }))
    }

    async fn destroy(&self) -> AppResult<()> {
        self.drop_collection().await?;
        tracing::info!("Dropped Qdrant collection '{}'", self.collection);
        Ok(())
    }
}

pub struct QdrantIndex {
    backend: QdrantBackend,
    dimensions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct PointPayload {
    doc_name: String,
    text: String,
    meta: DocumentMeta,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: usize,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    result: CountResult,
}

/// Qdrant only accepts integers or UUIDs as point ids.
fn point_id(record_id: &str) -> Uuid {
    let digest = Sha256::digest(record_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

fn doc_filter(doc_name: &str) -> serde_json::Value {
    json!({ "must": [ { "key": "doc_name", "match": { "value": doc_name } } ] })
}

/// Points of `doc_name` other than `keep`.
fn stale_filter(doc_name: &str, keep: &[String]) -> serde_json::Value {
    let mut filter = doc_filter(doc_name);
    if !keep.is_empty() {
        filter["must_not"] = json!([{ "has_id": keep }]);
    }
    filter
}

fn hit_from_point(point: ScoredPoint) -> Option<IndexHit> {
    let payload: PointPayload = serde_json::from_value(point.payload?).ok()?;
    Some(IndexHit {
        distance: 1.0 - point.score,
        text: payload.text,
        meta: payload.meta,
    })
}

async fn send(builder: RequestBuilder) -> AppResult<reqwest::Response> {
    builder
        .send()
        .await
        .map_err(|e| AppError::Knowledge(format!("Failed to reach Qdrant: {}", e)))
}

async fn api_error(status: StatusCode, response: reqwest::Response) -> AppError {
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    AppError::Knowledge(format!("Qdrant API error ({}): {}", status, body))
}

async fn check(response: reqwest::Response) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(api_error(status, response).await)
    }
}

impl QdrantIndex {
    fn points_url(&self, suffix: &str) -> String {
        format!("{}/points{}", self.backend.collection_url(), suffix)
    }

    fn to_points(&self, records: Vec<IndexRecord>) -> AppResult<Vec<serde_json::Value>> {
        records
            .into_iter()
            .map(|record| {
                if record.vector.len() != self.dimensions {
                    return Err(AppError::Knowledge(format!(
                        "Embedding dimension mismatch: expected {}, got {}",
                        self.dimensions,
                        record.vector.len()
                    )));
                }
                let payload = PointPayload {
                    doc_name: record.meta.doc_name.clone(),
                    text: record.text,
                    meta: record.meta,
                };
                Ok(json!({
                    "id": point_id(&record.id).to_string(),
                    "vector": record.vector,
                    "payload": payload,
                }))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, doc_name: &str, records: Vec<IndexRecord>) -> AppResult<usize> {
        let points = self.to_points(records)?;
        let ids: Vec<String> = points
            .iter()
            .filter_map(|p| p["id"].as_str().map(str::to_string))
            .collect();

        // New points overwrite same-id ones before the leftovers are removed,
        // so a failed write keeps the previous version.
        if !points.is_empty() {
            check(
                send(
                    self.backend
                        .request(reqwest::Method::PUT, self.points_url("?wait=true"))
                        .json(&json!({ "points": points })),
                )
                .await?,
            )
            .await?;
        }

        let delete = json!({ "filter": stale_filter(doc_name, &ids) });
        check(
            send(
                self.backend
                    .request(reqwest::Method::POST, self.points_url("/delete?wait=true"))
                    .json(&delete),
            )
            .await?,
        )
        .await?;

        tracing::debug!("Upserted {} points for '{}' into Qdrant", ids.len(), doc_name);
        Ok(ids.len())
    }

    async fn delete_all(&self) -> AppResult<()> {
        self.backend.drop_collection().await?;
        self.backend.create_collection(self.dimensions).await
    }

    async fn search(&self, query: &[f32], limit: usize) -> AppResult<Vec<IndexHit>> {
        let body = json!({ "vector": query, "limit": limit, "with_payload": true });
        let response = check(
            send(
                self.backend
                    .request(reqwest::Method::POST, self.points_url("/search"))
                    .json(&body),
            )
            .await?,
        )
        .await?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to parse Qdrant response: {}", e)))?;

        let hits: Vec<IndexHit> = parsed.result.into_iter().filter_map(hit_from_point).collect();
        tracing::debug!("Retrieved {} points (requested top-{})", hits.len(), limit);
        Ok(hits)
    }

    async fn exists(&self) -> AppResult<bool> {
        self.backend.collection_exists().await
    }

    async fn count(&self) -> AppResult<usize> {
        let response = check(
            send(
                self.backend
                    .request(reqwest::Method::POST, self.points_url("/count"))
                    .json(&json!({ "exact": true })),
            )
            .await?,
        )
        .await?;

        let parsed: CountResponse = response
            .json()
            .await
            .map_err(|e| AppError::Knowledge(format!("Failed to parse Qdrant response: {}", e)))?;
        Ok(parsed.result.count)
    }
}
