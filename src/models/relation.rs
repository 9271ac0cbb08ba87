//! Directed relations between observations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of edge between two observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// Source cannot exist without the target.
    DependsOn,
    /// Source builds on the target.
    Extends,
    /// Source contradicts the target.
    ConflictsWith,
    /// Source replaces the target.
    Supersedes,
    /// Loose topical association.
    RelatedTo,
}

impl RelationType {
    /// Returns the snake_case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DependsOn => "depends_on",
            Self::Extends => "extends",
            Self::ConflictsWith => "conflicts_with",
            Self::Supersedes => "supersedes",
            Self::RelatedTo => "related_to",
        }
    }

    /// Parses a relation type string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "depends_on" => Some(Self::DependsOn),
            "extends" => Some(Self::Extends),
            "conflicts_with" => Some(Self::ConflictsWith),
            "supersedes" => Some(Self::Supersedes),
            "related_to" => Some(Self::RelatedTo),
            _ => None,
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed edge between two observation ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    /// Row id of the edge itself.
    pub id: i64,
    /// Source observation id.
    pub from_id: i64,
    /// Target observation id.
    pub to_id: i64,
    /// Kind of edge.
    pub relation_type: RelationType,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Creation timestamp (epoch ms).
    pub created_at: i64,
}

/// A neighborhood of relations around one observation, up to a bounded
/// depth.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RelationGraph {
    /// The observation the graph is centered on.
    pub root_id: i64,
    /// Observation ids reachable within the depth bound, nearest first.
    pub node_ids: Vec<i64>,
    /// Edges among the returned nodes.
    pub edges: Vec<Relation>,
    /// Depth actually traversed.
    pub depth: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_type_roundtrip() {
        for rt in [
            RelationType::DependsOn,
            RelationType::Extends,
            RelationType::ConflictsWith,
            RelationType::Supersedes,
            RelationType::RelatedTo,
        ] {
            assert_eq!(RelationType::parse(rt.as_str()), Some(rt));
        }
        assert_eq!(RelationType::parse("friends_with"), None);
    }
}
