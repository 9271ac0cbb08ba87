//! Store traits.
//!
//! All traits are `Send + Sync` and dyn-safe so components can share
//! `Arc<dyn …>` handles. Implementations use interior mutability; callers
//! never hold a lock across a suspension point.
//!
//! Failure contract: operations return the crate [`crate::Error`], with
//! `NotFound` for absent ids (callers never panic on it), `Transient` for
//! database errors, and `Fatal` reserved for open/corruption failures.

use crate::Result;
use crate::models::{
    NewObservation, NewSessionSummary, NewUserPrompt, Observation, ObservationType, Pattern,
    PatternStatus, Relation, RelationGraph, RelationType, Scope, SessionSummary, UserPrompt,
};
use std::collections::BTreeMap;

/// Partial update for an observation. Omitted fields are unchanged.
#[derive(Debug, Clone, Default)]
pub struct ObservationUpdate {
    /// New title.
    pub title: Option<String>,
    /// New subtitle.
    pub subtitle: Option<String>,
    /// New narrative.
    pub narrative: Option<String>,
    /// Replacement fact list.
    pub facts: Option<Vec<String>>,
    /// Replacement concept list (already normalized).
    pub concepts: Option<Vec<String>>,
    /// Replacement read-file list.
    pub files_read: Option<Vec<String>>,
    /// Replacement modified-file list.
    pub files_modified: Option<Vec<String>>,
    /// New scope.
    pub scope: Option<Scope>,
}

impl ObservationUpdate {
    /// Returns true if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.subtitle.is_none()
            && self.narrative.is_none()
            && self.facts.is_none()
            && self.concepts.is_none()
            && self.files_read.is_none()
            && self.files_modified.is_none()
            && self.scope.is_none()
    }
}

/// Outcome of a batched delete: per-row failures do not abort the batch.
#[derive(Debug, Clone, Default)]
pub struct BatchDeleteOutcome {
    /// Rows successfully deleted.
    pub deleted: usize,
    /// Per-id error strings, formatted `"id N: <msg>"`.
    pub errors: Vec<String>,
}

/// Aggregate feedback numbers for a project.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct FeedbackStats {
    /// Observations in the project.
    pub total: i64,
    /// Observations with positive feedback.
    pub positive: i64,
    /// Observations with negative feedback.
    pub negative: i64,
    /// Mean feedback across all observations.
    pub average: f64,
}

/// Typed operations over observation rows and their FTS index.
pub trait ObservationStore: Send + Sync {
    /// Inserts a new observation, clamping the importance score to `[0, 1]`.
    fn insert(&self, new: &NewObservation) -> Result<Observation>;

    /// Fetches one observation.
    fn get_by_id(&self, id: i64) -> Result<Option<Observation>>;

    /// Fetches many observations, preserving input order. Missing ids are
    /// silently dropped.
    fn get_by_ids_preserve_order(&self, ids: &[i64]) -> Result<Vec<Observation>>;

    /// Most recent observations for a project, newest first.
    fn get_recent(&self, project: &str, n: usize) -> Result<Vec<Observation>>;

    /// Most recent non-superseded observations, newest first.
    fn get_active(&self, project: &str, n: usize) -> Result<Vec<Observation>>;

    /// Full-text search ranked by the underlying BM25 implementation.
    ///
    /// The raw score is positive and monotone in relevance; the caller
    /// normalizes.
    fn fts_scored(&self, query: &str, project: &str, n: usize)
    -> Result<Vec<(Observation, f64)>>;

    /// Writes one importance score, clamped to `[0, 1]`.
    fn update_importance_score(&self, id: i64, score: f64) -> Result<()>;

    /// Writes many importance scores in a single statement, stamping
    /// `score_updated_at`. Returns rows affected.
    fn update_importance_scores(&self, scores: &BTreeMap<i64, f64>) -> Result<usize>;

    /// Bumps `retrieval_count` for each id.
    fn increment_retrieval_counts(&self, ids: &[i64]) -> Result<()>;

    /// Marks one observation superseded.
    fn mark_superseded(&self, id: i64) -> Result<()>;

    /// Marks many observations superseded. Returns rows affected.
    fn mark_superseded_batch(&self, ids: &[i64]) -> Result<usize>;

    /// Deletes one observation.
    fn delete(&self, id: i64) -> Result<()>;

    /// Deletes in batches of 100, continuing past per-row errors.
    fn delete_batch(&self, ids: &[i64]) -> BatchDeleteOutcome;

    /// Applies a partial update and returns the new row.
    fn update_observation(&self, id: i64, update: &ObservationUpdate) -> Result<Observation>;

    /// Rows whose score is stale: `score_updated_at` null or older than
    /// `now − threshold_ms`.
    fn needing_score_update(&self, threshold_ms: i64, limit: usize) -> Result<Vec<Observation>>;

    /// Ids of observations created before the cutoff.
    fn ids_created_before(&self, cutoff_ms: i64) -> Result<Vec<i64>>;

    /// Ids of superseded observations.
    fn superseded_ids(&self) -> Result<Vec<i64>>;

    /// Aggregate feedback numbers for a project.
    fn feedback_stats(&self, project: &str) -> Result<FeedbackStats>;

    /// Highest-scoring active observations.
    fn top_scoring(&self, project: &str, n: usize) -> Result<Vec<Observation>>;

    /// Most-retrieved active observations.
    fn most_retrieved(&self, project: &str, n: usize) -> Result<Vec<Observation>>;

    /// Concept weight overrides persisted alongside the rows.
    fn concept_weights(&self) -> Result<BTreeMap<String, f64>>;

    /// Active observations tagged with a concept, newest first.
    fn get_by_concept(&self, project: &str, concept: &str, n: usize) -> Result<Vec<Observation>>;

    /// Active observations that read or modified a path, newest first.
    fn get_by_file(&self, project: &str, file: &str, n: usize) -> Result<Vec<Observation>>;

    /// Active observations of one type, newest first.
    fn get_by_type(
        &self,
        project: &str,
        obs_type: ObservationType,
        n: usize,
    ) -> Result<Vec<Observation>>;

    /// Row count, optionally scoped to a project.
    fn count(&self, project: Option<&str>) -> Result<i64>;

    /// The anchor row plus up to `before` older and `after` newer rows in
    /// the anchor's project, oldest first.
    fn timeline_around(&self, anchor_id: i64, before: usize, after: usize)
    -> Result<Vec<Observation>>;
}

/// Typed operations over session summaries.
pub trait SummaryStore: Send + Sync {
    /// Inserts a new summary.
    fn insert(&self, new: &NewSessionSummary) -> Result<SessionSummary>;

    /// Fetches one summary.
    fn get_by_id(&self, id: i64) -> Result<Option<SessionSummary>>;

    /// Fetches many summaries, preserving input order.
    fn get_by_ids_preserve_order(&self, ids: &[i64]) -> Result<Vec<SessionSummary>>;

    /// Most recent summaries for a project, newest first.
    fn get_recent(&self, project: &str, n: usize) -> Result<Vec<SessionSummary>>;

    /// Deletes one summary.
    fn delete(&self, id: i64) -> Result<()>;

    /// Row count, optionally scoped to a project.
    fn count(&self, project: Option<&str>) -> Result<i64>;
}

/// Typed operations over raw user prompts.
pub trait PromptStore: Send + Sync {
    /// Inserts a new prompt.
    fn insert(&self, new: &NewUserPrompt) -> Result<UserPrompt>;

    /// Fetches many prompts, preserving input order.
    fn get_by_ids_preserve_order(&self, ids: &[i64]) -> Result<Vec<UserPrompt>>;

    /// Most recent prompts for a project, newest first.
    fn get_recent(&self, project: &str, n: usize) -> Result<Vec<UserPrompt>>;

    /// Deletes prompts created before the cutoff. Returns rows removed.
    fn delete_older_than(&self, cutoff_ms: i64) -> Result<usize>;

    /// Row count, optionally scoped to a project.
    fn count(&self, project: Option<&str>) -> Result<i64>;
}

/// Typed operations over observation relations.
pub trait RelationStore: Send + Sync {
    /// Inserts a directed edge.
    fn insert(
        &self,
        from_id: i64,
        to_id: i64,
        relation_type: RelationType,
        confidence: f64,
    ) -> Result<Relation>;

    /// All edges touching an observation, either direction.
    fn relations_for(&self, id: i64) -> Result<Vec<Relation>>;

    /// Neighbor ids reachable over one hop with at least the given
    /// confidence.
    fn related_ids(&self, id: i64, min_confidence: f64) -> Result<Vec<i64>>;

    /// Bounded-depth neighborhood around an observation.
    fn graph(&self, id: i64, max_depth: u32) -> Result<RelationGraph>;

    /// Drops every edge touching an observation. Returns rows removed.
    fn delete_for_observation(&self, id: i64) -> Result<usize>;
}

/// Read-only access to detector-produced patterns.
pub trait PatternStore: Send + Sync {
    /// Patterns for a project, optionally filtered by status.
    fn list(&self, project: &str, status: Option<PatternStatus>, n: usize) -> Result<Vec<Pattern>>;

    /// Row count, optionally scoped to a project.
    fn count(&self, project: Option<&str>) -> Result<i64>;
}

/// Database-wide administration.
pub trait DatabaseAdmin: Send + Sync {
    /// Runs the backend's optimize pass (`PRAGMA optimize` on SQLite).
    fn optimize(&self) -> Result<()>;
}
