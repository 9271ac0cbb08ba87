//! Embedded vector backend.
//!
//! A hashed bag-of-words index with cosine similarity. Not a substitute for
//! a learned embedding model, but deterministic, dependency-free, and good
//! enough for offline use and tests. Selected by `vector_storage = "memory"`.

use super::{DocType, VectorCacheStats, VectorClient, VectorFilter, VectorHealth, VectorHit, VectorMetadata};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

const DIMENSIONS: usize = 256;
const MODEL_NAME: &str = "hashed-bow-256";

struct StoredVector {
    embedding: Vec<f32>,
    metadata: VectorMetadata,
}

/// In-process vector index.
pub struct InMemoryVectorClient {
    vectors: Mutex<HashMap<String, StoredVector>>,
    embedding_misses: AtomicU64,
}

impl InMemoryVectorClient {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vectors: Mutex::new(HashMap::new()),
            embedding_misses: AtomicU64::new(0),
        }
    }

    /// Token-hash embedding: each lowercase alphanumeric token increments
    /// one of [`DIMENSIONS`] buckets; the vector is L2-normalized.
    fn embed(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; DIMENSIONS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = fnv1a(&token.to_lowercase()) as usize % DIMENSIONS;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }
}

impl Default for InMemoryVectorClient {
    fn default() -> Self {
        Self::new()
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in s.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl VectorClient for InMemoryVectorClient {
    async fn upsert(
        &self,
        doc_id: &str,
        _doc_type: DocType,
        text: &str,
        metadata: &VectorMetadata,
    ) -> Result<()> {
        self.embedding_misses.fetch_add(1, Ordering::Relaxed);
        let stored = StoredVector {
            embedding: Self::embed(text),
            metadata: metadata.clone(),
        };
        if let Ok(mut vectors) = self.vectors.lock() {
            vectors.insert(doc_id.to_string(), stored);
        }
        Ok(())
    }

    async fn delete_by_observation_id(&self, id: i64) -> Result<()> {
        if let Ok(mut vectors) = self.vectors.lock() {
            vectors.retain(|_, v| {
                !(v.metadata.sqlite_id == id && v.metadata.doc_type == DocType::Observation)
            });
        }
        Ok(())
    }

    async fn query(&self, text: &str, k: usize, filter: &VectorFilter) -> Result<Vec<VectorHit>> {
        let query = Self::embed(text);
        let Ok(vectors) = self.vectors.lock() else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<VectorHit> = vectors
            .iter()
            .filter(|(_, v)| filter.matches(&v.metadata))
            .map(|(id, v)| VectorHit {
                id: id.clone(),
                // Cosine of normalized non-negative vectors is already in [0, 1].
                similarity: f64::from(Self::cosine(&query, &v.embedding).clamp(0.0, 1.0)),
                metadata: v.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.vectors.lock().map(|v| v.len() as u64).unwrap_or(0))
    }

    async fn health_stats(&self) -> Result<VectorHealth> {
        Ok(VectorHealth {
            total: self.count().await?,
            stale: 0,
            current_model: MODEL_NAME.to_string(),
            needs_rebuild: false,
            rebuild_reason: None,
        })
    }

    async fn cache_stats(&self) -> Result<VectorCacheStats> {
        Ok(VectorCacheStats {
            embedding_hits: 0,
            embedding_misses: self.embedding_misses.load(Ordering::Relaxed),
            result_hits: 0,
            result_misses: 0,
        })
    }

    fn model_version(&self) -> String {
        MODEL_NAME.to_string()
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: i64, project: &str) -> VectorMetadata {
        VectorMetadata {
            sqlite_id: id,
            doc_type: DocType::Observation,
            project: project.to_string(),
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn test_query_ranks_exact_text_first() {
        let client = InMemoryVectorClient::new();
        client
            .upsert("observation_1", DocType::Observation, "JWT auth bypass fix", &meta(1, "p"))
            .await
            .unwrap();
        client
            .upsert("observation_2", DocType::Observation, "cache eviction tuning", &meta(2, "p"))
            .await
            .unwrap();

        let hits = client
            .query("JWT auth bypass fix", 10, &VectorFilter::default())
            .await
            .unwrap();
        assert_eq!(hits[0].metadata.sqlite_id, 1);
        assert!(hits[0].similarity > hits[1].similarity);
        assert!(hits[0].similarity > 0.99);
    }

    #[tokio::test]
    async fn test_delete_by_observation_id() {
        let client = InMemoryVectorClient::new();
        client
            .upsert("observation_1", DocType::Observation, "text", &meta(1, "p"))
            .await
            .unwrap();
        client.delete_by_observation_id(1).await.unwrap();
        assert_eq!(client.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_respects_project_filter() {
        let client = InMemoryVectorClient::new();
        client
            .upsert("observation_1", DocType::Observation, "shared words", &meta(1, "alpha"))
            .await
            .unwrap();
        client
            .upsert("observation_2", DocType::Observation, "shared words", &meta(2, "beta"))
            .await
            .unwrap();

        let filter = VectorFilter {
            doc_type: None,
            project: Some("alpha".into()),
        };
        let hits = client.query("shared words", 10, &filter).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.project, "alpha");
    }
}
