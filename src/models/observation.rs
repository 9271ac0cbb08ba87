//! Observation types and the concept-tag vocabulary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of work an observation records.
///
/// The parser normalizes unknown type strings to [`ObservationType::Change`],
/// so a stored observation always carries one of these six values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationType {
    /// A defect was diagnosed and corrected.
    Bugfix,
    /// New behavior was added.
    Feature,
    /// Structure changed without behavior change.
    Refactor,
    /// Catch-all for other modifications.
    Change,
    /// Something about the codebase or environment was learned.
    Discovery,
    /// A choice between alternatives was made.
    Decision,
}

impl ObservationType {
    /// All observation types, in display order.
    pub const ALL: [Self; 6] = [
        Self::Bugfix,
        Self::Feature,
        Self::Refactor,
        Self::Change,
        Self::Discovery,
        Self::Decision,
    ];

    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bugfix => "bugfix",
            Self::Feature => "feature",
            Self::Refactor => "refactor",
            Self::Change => "change",
            Self::Discovery => "discovery",
            Self::Decision => "decision",
        }
    }

    /// Parses a type string, normalizing unknown values to `Change`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "bugfix" => Self::Bugfix,
            "feature" => Self::Feature,
            "refactor" => Self::Refactor,
            "discovery" => Self::Discovery,
            "decision" => Self::Decision,
            _ => Self::Change,
        }
    }

    /// Parses strictly, returning `None` for unknown values.
    ///
    /// Used by tool-parameter validation, where an unknown type is a
    /// caller error rather than something to silently normalize.
    #[must_use]
    pub fn parse_strict(s: &str) -> Option<Self> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered.as_str())
    }
}

impl fmt::Display for ObservationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility scope of a memory row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Tied to a single project string.
    Project,
    /// Returned alongside every project when `include_global` is set.
    Global,
}

impl Scope {
    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Global => "global",
        }
    }

    /// Parses a scope string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "project" => Some(Self::Project),
            "global" => Some(Self::Global),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed vocabulary of concept tags.
///
/// Tags outside this list are dropped at parse time.
pub const CONCEPT_VOCABULARY: &[&str] = &[
    "how-it-works",
    "why-it-exists",
    "what-changed",
    "problem-solution",
    "gotcha",
    "pattern",
    "trade-off",
    "best-practice",
    "anti-pattern",
    "architecture",
    "security",
    "performance",
    "testing",
    "debugging",
    "workflow",
    "tooling",
    "refactoring",
    "api",
    "database",
    "configuration",
    "error-handling",
    "caching",
    "logging",
    "auth",
    "validation",
];

/// Concepts prioritized during context injection.
pub const CRITICAL_CONCEPTS: &[&str] = &["gotcha", "pattern", "problem-solution", "trade-off"];

/// Normalizes raw concept tags against the closed vocabulary.
///
/// Tags are lowercased and trimmed; tags not in [`CONCEPT_VOCABULARY`] are
/// dropped, as are tags that collide with an observation type name (the
/// type/concept ambiguity would poison type-filtered retrieval). Order is
/// preserved and duplicates removed, so parsing the same input twice yields
/// an identical sequence.
#[must_use]
pub fn normalize_concepts<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = Vec::new();
    for tag in raw {
        let tag = tag.as_ref().trim().to_lowercase();
        if tag.is_empty() || seen.contains(&tag) {
            continue;
        }
        if !CONCEPT_VOCABULARY.contains(&tag.as_str()) {
            continue;
        }
        if ObservationType::parse_strict(&tag).is_some() {
            continue;
        }
        seen.push(tag);
    }
    seen
}

/// A durable unit of memory distilled from one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Monotonic 64-bit row id.
    pub id: i64,
    /// Project the observation belongs to.
    pub project: String,
    /// Project-local or global visibility.
    pub scope: Scope,
    /// Kind of work recorded.
    #[serde(rename = "type")]
    pub obs_type: ObservationType,
    /// Short headline.
    pub title: String,
    /// Optional one-line elaboration.
    pub subtitle: String,
    /// Prose account of what happened and why it matters.
    pub narrative: String,
    /// Ordered list of discrete facts.
    pub facts: Vec<String>,
    /// Normalized concept tags from the closed vocabulary.
    pub concepts: Vec<String>,
    /// Paths read during the execution.
    pub files_read: Vec<String>,
    /// Paths modified during the execution.
    pub files_modified: Vec<String>,
    /// Path → mtime (epoch ms) captured at ingest time.
    pub file_mtimes: BTreeMap<String, i64>,
    /// SDK session the observation came from.
    pub sdk_session_id: String,
    /// 1-based prompt index within the session.
    pub prompt_number: i64,
    /// Creation timestamp (epoch ms).
    pub created_at: i64,
    /// Importance score in `[0, 1]`, clamped on every write.
    pub importance_score: f64,
    /// Small signed feedback counter.
    pub user_feedback: i64,
    /// How many times retrieval returned this row.
    pub retrieval_count: i64,
    /// Logical tombstone: excluded from active retrieval, deleted later
    /// by the maintenance pass.
    pub is_superseded: bool,
    /// When the importance score was last recomputed (epoch ms).
    pub score_updated_at: Option<i64>,
}

impl Observation {
    /// Text used for vector-index sync: title, narrative, and facts.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        let mut text = String::with_capacity(
            self.title.len() + self.narrative.len() + self.facts.iter().map(String::len).sum::<usize>(),
        );
        text.push_str(&self.title);
        if !self.subtitle.is_empty() {
            text.push('\n');
            text.push_str(&self.subtitle);
        }
        text.push('\n');
        text.push_str(&self.narrative);
        for fact in &self.facts {
            text.push('\n');
            text.push_str(fact);
        }
        text
    }
}

/// Fields of an observation supplied at insert time.
///
/// The store assigns `id`, `created_at` defaults to now, and the mutable
/// counters (`user_feedback`, `retrieval_count`) start at zero.
#[derive(Debug, Clone, Default)]
pub struct NewObservation {
    /// Project the observation belongs to.
    pub project: String,
    /// Project-local or global visibility.
    pub scope: Option<Scope>,
    /// Kind of work recorded.
    pub obs_type: ObservationType,
    /// Short headline.
    pub title: String,
    /// Optional one-line elaboration.
    pub subtitle: String,
    /// Prose account of what happened.
    pub narrative: String,
    /// Ordered list of discrete facts.
    pub facts: Vec<String>,
    /// Normalized concept tags.
    pub concepts: Vec<String>,
    /// Paths read during the execution.
    pub files_read: Vec<String>,
    /// Paths modified during the execution.
    pub files_modified: Vec<String>,
    /// Path → mtime (epoch ms).
    pub file_mtimes: BTreeMap<String, i64>,
    /// SDK session the observation came from.
    pub sdk_session_id: String,
    /// 1-based prompt index within the session.
    pub prompt_number: i64,
    /// Initial importance score; clamped to `[0, 1]` on write.
    pub importance_score: f64,
}

impl Default for ObservationType {
    fn default() -> Self {
        Self::Change
    }
}
