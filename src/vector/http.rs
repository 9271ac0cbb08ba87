//! HTTP client for the vector worker sidecar.
//!
//! The worker is a separate process listening on `worker_port`; it owns the
//! embedding model and the ANN index. Request and response bodies are JSON.

use super::{DocType, VectorCacheStats, VectorClient, VectorFilter, VectorHealth, VectorHit, VectorMetadata};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Vector client backed by the HTTP sidecar worker.
pub struct HttpVectorClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    connected: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    hits: Vec<VectorHit>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

impl HttpVectorClient {
    /// Creates a client for a worker on the given port, probing `/health`
    /// once to establish initial connectivity.
    ///
    /// A failed probe is not an error: the client starts disconnected and
    /// search degrades to filter-only until the worker comes up.
    pub async fn connect(port: u16, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Fatal(format!("building vector http client: {e}")))?;
        let this = Self {
            client,
            base_url: format!("http://127.0.0.1:{port}"),
            model: model.into(),
            connected: AtomicBool::new(false),
        };
        match this.health_stats().await {
            Ok(health) => {
                debug!(total = health.total, "vector worker reachable");
            },
            Err(e) => {
                warn!("vector worker unreachable at startup: {e}");
            },
        }
        Ok(this)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Records the outcome of a call and maps transport errors.
    fn observe<T>(&self, operation: &str, result: reqwest::Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.connected.store(true, Ordering::Relaxed);
                Ok(value)
            },
            Err(e) => {
                self.connected.store(false, Ordering::Relaxed);
                Err(Error::transient(operation, e))
            },
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, operation: &str, path: &str) -> Result<T> {
        let response = self.observe(operation, self.client.get(self.url(path)).send().await)?;
        let response = self.observe(operation, response.error_for_status())?;
        self.observe(operation, response.json::<T>().await)
    }
}

#[async_trait]
impl VectorClient for HttpVectorClient {
    async fn upsert(
        &self,
        doc_id: &str,
        doc_type: DocType,
        text: &str,
        metadata: &VectorMetadata,
    ) -> Result<()> {
        let body = serde_json::json!({
            "id": doc_id,
            "doc_type": doc_type,
            "text": text,
            "metadata": metadata,
        });
        let response = self.observe(
            "vector_upsert",
            self.client.post(self.url("/upsert")).json(&body).send().await,
        )?;
        self.observe("vector_upsert", response.error_for_status())?;
        Ok(())
    }

    async fn delete_by_observation_id(&self, id: i64) -> Result<()> {
        let body = serde_json::json!({ "observation_id": id });
        let response = self.observe(
            "vector_delete",
            self.client.post(self.url("/delete")).json(&body).send().await,
        )?;
        self.observe("vector_delete", response.error_for_status())?;
        Ok(())
    }

    async fn query(&self, text: &str, k: usize, filter: &VectorFilter) -> Result<Vec<VectorHit>> {
        let body = serde_json::json!({
            "text": text,
            "k": k,
            "filter": filter,
        });
        let response = self.observe(
            "vector_query",
            self.client.post(self.url("/query")).json(&body).send().await,
        )?;
        let response = self.observe("vector_query", response.error_for_status())?;
        let parsed: QueryResponse = self.observe("vector_query", response.json().await)?;
        Ok(parsed.hits)
    }

    async fn count(&self) -> Result<u64> {
        let parsed: CountResponse = self.get_json("vector_count", "/count").await?;
        Ok(parsed.count)
    }

    async fn health_stats(&self) -> Result<VectorHealth> {
        self.get_json("vector_health", "/health").await
    }

    async fn cache_stats(&self) -> Result<VectorCacheStats> {
        self.get_json("vector_cache_stats", "/cache-stats").await
    }

    fn model_version(&self) -> String {
        self.model.clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
