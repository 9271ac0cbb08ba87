//! Vector-index client.
//!
//! The vector index lives outside the core: either an HTTP sidecar worker
//! ([`HttpVectorClient`]) or an embedded index ([`InMemoryVectorClient`])
//! selected by the `vector_storage` setting. The core only depends on the
//! [`VectorClient`] trait.

mod http;
mod memory;

pub use http::HttpVectorClient;
pub use memory::InMemoryVectorClient;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Document kinds stored in the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    /// A distilled observation.
    Observation,
    /// A per-prompt session summary.
    SessionSummary,
    /// A raw user prompt.
    UserPrompt,
}

impl DocType {
    /// Returns the snake_case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Observation => "observation",
            Self::SessionSummary => "session_summary",
            Self::UserPrompt => "user_prompt",
        }
    }

    /// Parses a doc type string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "observation" => Some(Self::Observation),
            "session_summary" => Some(Self::SessionSummary),
            "user_prompt" => Some(Self::UserPrompt),
            _ => None,
        }
    }

    /// Vector-index document id for a SQL row of this type.
    #[must_use]
    pub fn doc_id(self, sqlite_id: i64) -> String {
        format!("{}_{sqlite_id}", self.as_str())
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to every vector, sufficient to recover the SQL row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMetadata {
    /// Row id in the relational store.
    pub sqlite_id: i64,
    /// Document kind.
    pub doc_type: DocType,
    /// Project the document belongs to.
    pub project: String,
    /// Row creation time (epoch ms); recency tie-breaks during fusion.
    #[serde(default)]
    pub created_at: i64,
}

/// Filter composed into nearest-neighbor queries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VectorFilter {
    /// Restrict to one document kind.
    pub doc_type: Option<DocType>,
    /// Restrict to one project.
    pub project: Option<String>,
}

impl VectorFilter {
    /// Returns true if the metadata passes the filter.
    #[must_use]
    pub fn matches(&self, meta: &VectorMetadata) -> bool {
        if let Some(doc_type) = self.doc_type {
            if meta.doc_type != doc_type {
                return false;
            }
        }
        if let Some(project) = &self.project {
            if &meta.project != project {
                return false;
            }
        }
        true
    }
}

/// One nearest-neighbor hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    /// Vector-index document id.
    pub id: String,
    /// Similarity normalized to `[0, 1]`, 1 = identical.
    pub similarity: f64,
    /// Metadata recovering the SQL row.
    pub metadata: VectorMetadata,
}

/// Health report for the vector index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorHealth {
    /// Total vectors stored.
    pub total: u64,
    /// Vectors embedded with an older model version.
    pub stale: u64,
    /// Embedding model currently in use.
    pub current_model: String,
    /// Whether a rebuild is recommended.
    pub needs_rebuild: bool,
    /// Why a rebuild is recommended, when it is.
    pub rebuild_reason: Option<String>,
}

/// Cache statistics for the vector backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VectorCacheStats {
    /// Embedding-cache hits.
    pub embedding_hits: u64,
    /// Embedding-cache misses.
    pub embedding_misses: u64,
    /// Query-result-cache hits.
    pub result_hits: u64,
    /// Query-result-cache misses.
    pub result_misses: u64,
}

impl VectorCacheStats {
    /// Overall hit rate across both caches, in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.embedding_hits + self.result_hits;
        let total = hits + self.embedding_misses + self.result_misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Client interface to the vector index.
///
/// Implementations must return similarities already normalized to `[0, 1]`
/// with 1 meaning identical. Upserts are idempotent per `doc_id`.
#[async_trait]
pub trait VectorClient: Send + Sync {
    /// Inserts or replaces the vector for a document.
    async fn upsert(
        &self,
        doc_id: &str,
        doc_type: DocType,
        text: &str,
        metadata: &VectorMetadata,
    ) -> Result<()>;

    /// Drops every vector derived from the given observation row.
    async fn delete_by_observation_id(&self, id: i64) -> Result<()>;

    /// Nearest-neighbor query with a metadata filter.
    async fn query(&self, text: &str, k: usize, filter: &VectorFilter) -> Result<Vec<VectorHit>>;

    /// Total vectors stored.
    async fn count(&self) -> Result<u64>;

    /// Health report.
    async fn health_stats(&self) -> Result<VectorHealth>;

    /// Cache statistics.
    async fn cache_stats(&self) -> Result<VectorCacheStats>;

    /// Embedding model identifier. Opaque; never parsed for behavior.
    fn model_version(&self) -> String;

    /// Whether the backend is reachable. Hybrid search degrades to
    /// filter-only retrieval when this is false.
    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_id_format() {
        assert_eq!(DocType::Observation.doc_id(42), "observation_42");
        assert_eq!(DocType::SessionSummary.doc_id(7), "session_summary_7");
    }

    #[test]
    fn test_filter_matches() {
        let meta = VectorMetadata {
            sqlite_id: 1,
            doc_type: DocType::Observation,
            project: "demo".into(),
            created_at: 0,
        };
        assert!(VectorFilter::default().matches(&meta));
        assert!(
            VectorFilter {
                doc_type: Some(DocType::Observation),
                project: Some("demo".into()),
            }
            .matches(&meta)
        );
        assert!(
            !VectorFilter {
                doc_type: Some(DocType::UserPrompt),
                project: None,
            }
            .matches(&meta)
        );
        assert!(
            !VectorFilter {
                doc_type: None,
                project: Some("other".into()),
            }
            .matches(&meta)
        );
    }

    #[test]
    fn test_cache_hit_rate() {
        let stats = VectorCacheStats {
            embedding_hits: 3,
            embedding_misses: 1,
            result_hits: 1,
            result_misses: 3,
        };
        let rate = stats.hit_rate();
        assert!((rate - 0.5).abs() < f64::EPSILON);
        assert!((VectorCacheStats::default().hit_rate()).abs() < f64::EPSILON);
    }
}
