//! # Engram
//!
//! Project-aware long-term memory service for AI coding assistants.
//!
//! Engram ingests tool-execution traces and session turns, distills them
//! into structured observations and session summaries with a cheap language
//! model, stores them in SQLite (rows + FTS5) alongside a vector index, and
//! serves them back over a JSON-RPC tool protocol with ranked, filterable
//! hybrid retrieval.
//!
//! ## Architecture
//!
//! - [`storage`] — typed stores over observations, summaries, prompts,
//!   relations, and patterns (SQLite + FTS5).
//! - [`vector`] — the vector-index client (HTTP sidecar or embedded).
//! - [`scoring`] — deterministic importance scoring plus a background
//!   recalculator.
//! - [`worker`] — the distillation pipeline: filters, dedup, circuit
//!   breaker, subprocess invocation, parsing, and vector-index sync.
//! - [`search`] — hybrid FTS + vector retrieval fused with RRF, behind a
//!   coalescing result cache and a frequency-driven warmer.
//! - [`maintenance`] — scheduled cleanup and DB optimization.
//! - [`server`] — the JSON-RPC tool surface over stdio, SSE, and HTTP.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod llm;
pub mod maintenance;
pub mod models;
pub mod observability;
pub mod scoring;
pub mod search;
pub mod server;
pub mod storage;
pub mod vector;
pub mod worker;

// Re-exports for convenience
pub use config::{EngramConfig, Settings};
pub use llm::{Distiller, SubprocessDistiller};
pub use models::{
    EventBus, MemoryEvent, Observation, ObservationType, Pattern, Relation, RelationType, Scope,
    SessionSummary, UserPrompt,
};
pub use scoring::{ScoreRecalculator, Scorer, ScoringConfig};
pub use search::{SearchManager, SearchParams, SearchResponse};
pub use storage::{ObservationStore, PromptStore, RelationStore, SqliteStore, SummaryStore};
pub use vector::{DocType, VectorClient};
pub use worker::DistillationWorker;

/// Error type for engram operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait
/// implementations. Variants map onto the error kinds surfaced in tool
/// responses and logs; errors never cross core boundaries as panics.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `BadRequest` | Validation failure: missing id, out-of-range boost, unknown mode, invalid JSON |
/// | `NotFound` | A referenced observation, summary, or session is absent |
/// | `Transient` | Store, vector, or subprocess failure expected to succeed on retry |
/// | `Fatal` | Unrecoverable setup failure (missing distiller binary, corrupt DB) |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Validation failure on caller-supplied input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A dependency failed in a way that is expected to recover.
    #[error("operation '{operation}' failed: {cause}")]
    Transient {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Unrecoverable failure, surfaced at startup only.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl Error {
    /// Builds a [`Error::Transient`] from an operation name and any cause.
    pub fn transient(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Transient {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    /// Returns true for errors that callers may retry later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Result type alias for engram operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in milliseconds.
///
/// Centralized so every component agrees on the epoch and the unit.
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn epoch_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_millis()).ok())
        .unwrap_or(0)
}

/// Milliseconds in one day.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;
