//! Static tool registry.
//!
//! The versioned list of every tool the server exposes, with JSON Schema
//! input definitions. Dispatch validates against the ranges declared here;
//! the registry itself is data only.

use serde::Serialize;
use serde_json::{Value, json};

/// One tool's wire definition.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    /// Tool name, unique in the registry.
    pub name: String,
    /// One-line description shown to the model.
    pub description: String,
    /// JSON Schema for the arguments object.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn tool(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// Shared properties of the search family.
fn search_properties() -> Value {
    json!({
        "query": { "type": "string", "description": "Free-text query" },
        "type": {
            "type": "string",
            "description": "Document family: observations, sessions, prompts (empty = all)",
            "enum": ["", "observations", "sessions", "prompts"]
        },
        "project": { "type": "string", "description": "Project scope" },
        "obs_type": {
            "type": "string",
            "description": "Restrict observations to one type",
            "enum": ["bugfix", "feature", "refactor", "change", "discovery", "decision"]
        },
        "concepts": {
            "type": "array",
            "items": { "type": "string" },
            "description": "Require all of these concept tags"
        },
        "files": {
            "type": "array",
            "items": { "type": "string" },
            "description": "Require a touch on one of these paths"
        },
        "dateStart": { "type": "string", "description": "Inclusive lower bound (RFC 3339 or epoch ms)" },
        "dateEnd": { "type": "string", "description": "Inclusive upper bound (RFC 3339 or epoch ms)" },
        "orderBy": {
            "type": "string",
            "enum": ["relevance", "date_desc", "date_asc"],
            "description": "Result ordering (default date_desc)"
        },
        "limit": { "type": "integer", "minimum": 1, "maximum": 100, "description": "Result count (default 20)" },
        "offset": { "type": "integer", "minimum": 0, "description": "Rows skipped before the first result" },
        "format": {
            "type": "string",
            "enum": ["index", "full"],
            "description": "index = titles only, full = body content"
        },
        "scope": { "type": "string", "enum": ["project", "global"] },
        "include_global": { "type": "boolean", "description": "Include global-scoped rows from other projects" },
        "exclude_superseded": { "type": "boolean", "description": "Drop superseded rows (default true)" }
    })
}

fn ids_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "ids": {
                "type": "array",
                "items": { "type": "integer" },
                "maxItems": 1000,
                "description": description
            }
        },
        "required": ["ids"]
    })
}

fn project_limit_schema(extra: &[(&str, Value)]) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(
        "project".to_string(),
        json!({ "type": "string", "description": "Project scope" }),
    );
    properties.insert(
        "limit".to_string(),
        json!({ "type": "integer", "minimum": 1, "maximum": 100 }),
    );
    for (key, schema) in extra {
        properties.insert((*key).to_string(), schema.clone());
    }
    json!({ "type": "object", "properties": properties })
}

/// Every tool the server exposes, in registry order.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn all_tools() -> Vec<ToolDefinition> {
    vec![
        // --- Search family -------------------------------------------------
        tool(
            "search",
            "Unified memory search: hybrid lexical + semantic retrieval with filters",
            json!({ "type": "object", "properties": search_properties() }),
        ),
        tool(
            "timeline",
            "Observations around an anchor id or the best match for a query",
            json!({
                "type": "object",
                "properties": {
                    "anchor_id": { "type": "integer", "description": "Center the timeline on this observation" },
                    "query": { "type": "string", "description": "Find the anchor by search instead" },
                    "before": { "type": "integer", "minimum": 0, "maximum": 100, "description": "Rows before the anchor (default 10)" },
                    "after": { "type": "integer", "minimum": 0, "maximum": 100, "description": "Rows after the anchor (default 10)" },
                    "project": { "type": "string" },
                    "concepts": { "type": "array", "items": { "type": "string" } },
                    "files": { "type": "array", "items": { "type": "string" } },
                    "obs_type": { "type": "string" },
                    "format": { "type": "string", "enum": ["index", "full"] }
                }
            }),
        ),
        tool(
            "decisions",
            "Search past decisions (keyword-boosted observation search)",
            json!({ "type": "object", "properties": search_properties() }),
        ),
        tool(
            "changes",
            "Search past code changes (keyword-boosted observation search)",
            json!({ "type": "object", "properties": search_properties() }),
        ),
        tool(
            "how_it_works",
            "Search architectural explanations (keyword-boosted observation search)",
            json!({ "type": "object", "properties": search_properties() }),
        ),
        tool(
            "find_by_concept",
            "Observations carrying a concept tag",
            project_limit_schema(&[(
                "concept",
                json!({ "type": "string", "description": "Concept tag from the closed vocabulary" }),
            )]),
        ),
        tool(
            "find_by_file",
            "Observations that read or modified a path",
            project_limit_schema(&[(
                "file",
                json!({ "type": "string", "description": "Path as recorded at ingest" }),
            )]),
        ),
        tool(
            "find_by_type",
            "Observations of one type",
            project_limit_schema(&[(
                "obs_type",
                json!({
                    "type": "string",
                    "enum": ["bugfix", "feature", "refactor", "change", "discovery", "decision"]
                }),
            )]),
        ),
        tool(
            "get_recent_context",
            "Recent observations and session summaries for session startup",
            project_limit_schema(&[]),
        ),
        tool(
            "get_context_timeline",
            "Recent activity in chronological order",
            project_limit_schema(&[]),
        ),
        tool(
            "get_timeline_by_query",
            "Timeline centered on the best search match",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "before": { "type": "integer", "minimum": 0, "maximum": 100 },
                    "after": { "type": "integer", "minimum": 0, "maximum": 100 },
                    "project": { "type": "string" }
                },
                "required": ["query"]
            }),
        ),
        // --- Relations and similarity --------------------------------------
        tool(
            "find_related_observations",
            "Observations linked to one observation through the relation graph",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "integer" },
                    "min_confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 }
                },
                "required": ["id"]
            }),
        ),
        tool(
            "find_similar_observations",
            "Semantically similar observations for a query string",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "project": { "type": "string" },
                    "min_similarity": { "type": "number", "minimum": 0.0, "maximum": 1.0, "description": "Default 0.7" },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 50, "description": "Default 10" }
                },
                "required": ["query"]
            }),
        ),
        tool(
            "get_observation_relationships",
            "Relation neighborhood around an observation, up to a bounded depth",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "integer" },
                    "max_depth": { "type": "integer", "minimum": 1, "maximum": 10 }
                },
                "required": ["id"]
            }),
        ),
        // --- Store CRUD ----------------------------------------------------
        tool(
            "get_observation",
            "Fetch one observation by id",
            json!({
                "type": "object",
                "properties": { "id": { "type": "integer" } },
                "required": ["id"]
            }),
        ),
        tool(
            "edit_observation",
            "Partially update an observation (omitted fields unchanged)",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "integer" },
                    "title": { "type": "string" },
                    "subtitle": { "type": "string" },
                    "narrative": { "type": "string" },
                    "facts": { "type": "array", "items": { "type": "string" } },
                    "concepts": { "type": "array", "items": { "type": "string" } },
                    "files_read": { "type": "array", "items": { "type": "string" } },
                    "files_modified": { "type": "array", "items": { "type": "string" } },
                    "scope": { "type": "string", "enum": ["project", "global"] }
                },
                "required": ["id"]
            }),
        ),
        tool(
            "tag_observation",
            "Add, remove, or replace an observation's concept tags",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "integer" },
                    "concepts": { "type": "array", "items": { "type": "string" } },
                    "mode": { "type": "string", "enum": ["add", "remove", "set"], "description": "Default add" }
                },
                "required": ["id", "concepts"]
            }),
        ),
        tool(
            "get_observations_by_tag",
            "Observations carrying a concept tag (alias of find_by_concept)",
            project_limit_schema(&[("tag", json!({ "type": "string" }))]),
        ),
        tool(
            "merge_observations",
            "Supersede source observations under a target, optionally boosting it",
            json!({
                "type": "object",
                "properties": {
                    "target_id": { "type": "integer" },
                    "source_ids": { "type": "array", "items": { "type": "integer" }, "maxItems": 1000 },
                    "boost": { "type": "number", "minimum": 0.0, "maximum": 0.5, "description": "Score boost applied to the target" }
                },
                "required": ["target_id", "source_ids"]
            }),
        ),
        tool(
            "bulk_delete_observations",
            "Delete observations by id (vector index fan-out included)",
            ids_schema("Observation ids to delete"),
        ),
        tool(
            "bulk_mark_superseded",
            "Tombstone observations without deleting them",
            ids_schema("Observation ids to mark superseded"),
        ),
        tool(
            "bulk_boost_observations",
            "Shift importance scores by a bounded delta",
            json!({
                "type": "object",
                "properties": {
                    "ids": { "type": "array", "items": { "type": "integer" }, "maxItems": 1000 },
                    "boost": { "type": "number", "minimum": -1.0, "maximum": 1.0 }
                },
                "required": ["ids", "boost"]
            }),
        ),
        // --- Analytics -----------------------------------------------------
        tool(
            "get_memory_stats",
            "Row counts, cache size, and vector index totals",
            project_limit_schema(&[]),
        ),
        tool(
            "get_observation_quality",
            "Quality report for one observation",
            json!({
                "type": "object",
                "properties": { "id": { "type": "integer" } },
                "required": ["id"]
            }),
        ),
        tool(
            "suggest_consolidations",
            "Clusters of near-duplicate observations worth merging",
            project_limit_schema(&[]),
        ),
        tool(
            "get_temporal_trends",
            "Daily observation counts by type over a window",
            project_limit_schema(&[(
                "days",
                json!({ "type": "integer", "minimum": 1, "maximum": 365, "description": "Default 30" }),
            )]),
        ),
        tool(
            "get_data_quality_report",
            "Missing-field and tombstone ratios for a project",
            project_limit_schema(&[]),
        ),
        tool(
            "explain_search_ranking",
            "Per-arm ranks and fused RRF scores for a query",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "project": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 50 }
                },
                "required": ["query"]
            }),
        ),
        tool(
            "check_system_health",
            "Store, vector backend, breaker, and cache health",
            json!({ "type": "object", "properties": {} }),
        ),
        tool(
            "analyze_search_patterns",
            "Search metrics and the hottest tracked queries",
            json!({ "type": "object", "properties": {} }),
        ),
        tool(
            "get_observation_scoring_breakdown",
            "Importance-score components for one observation",
            json!({
                "type": "object",
                "properties": { "id": { "type": "integer" } },
                "required": ["id"]
            }),
        ),
        tool(
            "analyze_observation_importance",
            "Top-scoring and most-retrieved observations with feedback stats",
            project_limit_schema(&[]),
        ),
        // --- Admin ---------------------------------------------------------
        tool(
            "trigger_maintenance",
            "Run a maintenance tick in the background",
            json!({ "type": "object", "properties": {} }),
        ),
        tool(
            "get_maintenance_stats",
            "Counters from maintenance runs",
            json!({ "type": "object", "properties": {} }),
        ),
        tool(
            "export_observations",
            "Export observations as a JSON document (capped at 1000 rows)",
            json!({
                "type": "object",
                "properties": {
                    "project": { "type": "string" },
                    "dateStart": { "type": "string" },
                    "dateEnd": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 1000 }
                }
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_size_and_uniqueness() {
        let tools = all_tools();
        assert_eq!(tools.len(), 35);
        let names: HashSet<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), tools.len());
    }

    #[test]
    fn test_every_schema_is_an_object() {
        for tool in all_tools() {
            assert_eq!(
                tool.input_schema.get("type").and_then(|v| v.as_str()),
                Some("object"),
                "schema for {} must be an object",
                tool.name
            );
            assert!(!tool.description.is_empty());
        }
    }

    #[test]
    fn test_bulk_tools_cap_ids() {
        for tool in all_tools() {
            if tool.name.starts_with("bulk_") {
                let max_items = tool.input_schema["properties"]["ids"]["maxItems"]
                    .as_u64()
                    .expect("bulk tools declare maxItems");
                assert_eq!(max_items, 1000);
            }
        }
    }
}
