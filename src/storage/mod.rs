//! Storage layer.
//!
//! Typed store traits over observations, summaries, prompts, relations,
//! and patterns, plus the SQLite implementation (rows + FTS5 index). The
//! rest of the core only depends on the traits; tests and the CLI construct
//! [`SqliteStore`].

// Allow cast precision loss for score calculations where exact precision is not critical.
#![allow(clippy::cast_precision_loss)]
// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    BatchDeleteOutcome, DatabaseAdmin, FeedbackStats, ObservationStore, ObservationUpdate,
    PatternStore, PromptStore, RelationStore, SummaryStore,
};
