//! Aggregated recurring findings.
//!
//! Patterns are created by an upstream detector and are read-only for the
//! core: the stores expose them for reporting tools only.

use serde::{Deserialize, Serialize};

/// Category of a recurring finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// A repeated sequence of steps.
    Workflow,
    /// A stated or inferred user preference.
    Preference,
    /// A practice worth repeating.
    BestPractice,
    /// A practice worth avoiding.
    AntiPattern,
    /// Tooling behavior or configuration.
    Tooling,
}

impl PatternType {
    /// Returns the snake_case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Workflow => "workflow",
            Self::Preference => "preference",
            Self::BestPractice => "best_practice",
            Self::AntiPattern => "anti_pattern",
            Self::Tooling => "tooling",
        }
    }

    /// Parses a pattern type string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "workflow" => Some(Self::Workflow),
            "preference" => Some(Self::Preference),
            "best_practice" => Some(Self::BestPractice),
            "anti_pattern" => Some(Self::AntiPattern),
            "tooling" => Some(Self::Tooling),
            _ => None,
        }
    }
}

/// Lifecycle status of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStatus {
    /// In force.
    Active,
    /// No longer recommended.
    Deprecated,
    /// Folded into another pattern.
    Merged,
}

impl PatternStatus {
    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Merged => "merged",
        }
    }

    /// Parses a status string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "deprecated" => Some(Self::Deprecated),
            "merged" => Some(Self::Merged),
            _ => None,
        }
    }
}

/// An aggregated recurring finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// Monotonic 64-bit row id.
    pub id: i64,
    /// Project the pattern was observed in.
    pub project: String,
    /// Category of the finding.
    pub pattern_type: PatternType,
    /// Lifecycle status.
    pub status: PatternStatus,
    /// Short description of the pattern.
    pub title: String,
    /// Longer explanation.
    pub description: String,
    /// How many times the pattern has been observed.
    pub occurrence_count: i64,
    /// Mean confidence across occurrences, in `[0, 1]`.
    pub avg_confidence: f64,
    /// Creation timestamp (epoch ms).
    pub created_at: i64,
}
