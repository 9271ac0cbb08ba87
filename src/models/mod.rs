//! Data models for engram.
//!
//! This module contains the core data structures used throughout the system.

mod events;
mod observation;
mod pattern;
mod relation;
mod summary;

pub use events::{EventAction, EventBus, MemoryEvent};
pub use observation::{
    CONCEPT_VOCABULARY, CRITICAL_CONCEPTS, NewObservation, Observation, ObservationType, Scope,
    normalize_concepts,
};
pub use pattern::{Pattern, PatternStatus, PatternType};
pub use relation::{Relation, RelationGraph, RelationType};
pub use summary::{NewSessionSummary, NewUserPrompt, SessionSummary, UserPrompt};
