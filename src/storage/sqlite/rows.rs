//! Row ↔ model conversion for the `SQLite` store.
//!
//! List- and map-valued observation attributes are stored as JSON text.
//! Deserialization is forgiving: malformed JSON in one column yields an
//! empty collection rather than poisoning the whole row.

use crate::models::{Observation, ObservationType, Scope, SessionSummary, UserPrompt};
use rusqlite::Row;
use std::collections::BTreeMap;

/// Column list matching [`observation_from_row`], for SELECT statements.
pub(crate) const OBSERVATION_COLUMNS: &str = "id, project, scope, obs_type, title, subtitle, \
     narrative, facts, concepts, files_read, files_modified, file_mtimes, sdk_session_id, \
     prompt_number, created_at, importance_score, user_feedback, retrieval_count, \
     is_superseded, score_updated_at";

/// [`OBSERVATION_COLUMNS`] qualified with the table name, for joins where
/// the FTS shadow table carries columns of the same name.
pub(crate) fn qualified_observation_columns() -> String {
    OBSERVATION_COLUMNS
        .split(", ")
        .map(|column| format!("observations.{column}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn json_list(value: &str) -> Vec<String> {
    serde_json::from_str(value).unwrap_or_default()
}

pub(crate) fn json_map(value: &str) -> BTreeMap<String, i64> {
    serde_json::from_str(value).unwrap_or_default()
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn observation_from_row(row: &Row<'_>) -> rusqlite::Result<Observation> {
    let scope: String = row.get("scope")?;
    let obs_type: String = row.get("obs_type")?;
    let facts: String = row.get("facts")?;
    let concepts: String = row.get("concepts")?;
    let files_read: String = row.get("files_read")?;
    let files_modified: String = row.get("files_modified")?;
    let file_mtimes: String = row.get("file_mtimes")?;
    Ok(Observation {
        id: row.get("id")?,
        project: row.get("project")?,
        scope: Scope::parse(&scope).unwrap_or(Scope::Project),
        obs_type: ObservationType::parse(&obs_type),
        title: row.get("title")?,
        subtitle: row.get("subtitle")?,
        narrative: row.get("narrative")?,
        facts: json_list(&facts),
        concepts: json_list(&concepts),
        files_read: json_list(&files_read),
        files_modified: json_list(&files_modified),
        file_mtimes: json_map(&file_mtimes),
        sdk_session_id: row.get("sdk_session_id")?,
        prompt_number: row.get("prompt_number")?,
        created_at: row.get("created_at")?,
        importance_score: row.get("importance_score")?,
        user_feedback: row.get("user_feedback")?,
        retrieval_count: row.get("retrieval_count")?,
        is_superseded: row.get::<_, i64>("is_superseded")? != 0,
        score_updated_at: row.get("score_updated_at")?,
    })
}

pub(crate) const SUMMARY_COLUMNS: &str = "id, project, sdk_session_id, prompt_number, request, \
     investigated, learned, completed, next_steps, notes, created_at";

pub(crate) fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<SessionSummary> {
    Ok(SessionSummary {
        id: row.get("id")?,
        project: row.get("project")?,
        sdk_session_id: row.get("sdk_session_id")?,
        prompt_number: row.get("prompt_number")?,
        request: row.get("request")?,
        investigated: row.get("investigated")?,
        learned: row.get("learned")?,
        completed: row.get("completed")?,
        next_steps: row.get("next_steps")?,
        notes: row.get("notes")?,
        created_at: row.get("created_at")?,
    })
}

pub(crate) fn prompt_from_row(row: &Row<'_>) -> rusqlite::Result<UserPrompt> {
    Ok(UserPrompt {
        id: row.get("id")?,
        project: row.get("project")?,
        sdk_session_id: row.get("sdk_session_id")?,
        prompt_number: row.get("prompt_number")?,
        text: row.get("text")?,
        created_at: row.get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_list_tolerates_garbage() {
        assert_eq!(json_list("[\"a\",\"b\"]"), vec!["a", "b"]);
        assert!(json_list("not json").is_empty());
        assert!(json_map("{broken").is_empty());
    }
}
