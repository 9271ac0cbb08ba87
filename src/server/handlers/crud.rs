//! Store CRUD handlers.

use super::{opt_f64, opt_str, req_i64, req_ids, str_list};
use crate::models::{RelationType, Scope, normalize_concepts};
use crate::storage::ObservationUpdate;
use crate::server::ToolServer;
use crate::{Error, Result};
use serde_json::{Map, Value, json};

/// Boost range for `bulk_boost_observations`.
const BOOST_RANGE: std::ops::RangeInclusive<f64> = -1.0..=1.0;

/// Boost range for `merge_observations`.
const MERGE_BOOST_RANGE: std::ops::RangeInclusive<f64> = 0.0..=0.5;

pub(crate) fn get_observation(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let id = req_i64(args, "id")?;
    let obs = server
        .observations
        .get_by_id(id)?
        .ok_or_else(|| Error::NotFound(format!("observation {id}")))?;
    serde_json::to_value(&obs).map_err(|e| Error::transient("serialize", e))
}

pub(crate) fn edit_observation(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let id = req_i64(args, "id")?;
    let scope = match opt_str(args, "scope") {
        Some(raw) if !raw.trim().is_empty() => Some(
            Scope::parse(&raw).ok_or_else(|| Error::BadRequest(format!("unknown scope: {raw}")))?,
        ),
        _ => None,
    };
    let list_field = |key: &str| -> Option<Vec<String>> {
        args.contains_key(key).then(|| str_list(args, key))
    };
    let update = ObservationUpdate {
        title: opt_str(args, "title"),
        subtitle: opt_str(args, "subtitle"),
        narrative: opt_str(args, "narrative"),
        facts: list_field("facts"),
        concepts: list_field("concepts").map(normalize_concepts),
        files_read: list_field("files_read"),
        files_modified: list_field("files_modified"),
        scope,
    };
    if update.is_empty() {
        return Err(Error::BadRequest("no editable fields supplied".to_string()));
    }
    let updated = server.observations.update_observation(id, &update)?;
    serde_json::to_value(&updated).map_err(|e| Error::transient("serialize", e))
}

pub(crate) fn tag_observation(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let id = req_i64(args, "id")?;
    let incoming = normalize_concepts(str_list(args, "concepts"));
    let mode = opt_str(args, "mode").unwrap_or_else(|| "add".to_string());

    let current = server
        .observations
        .get_by_id(id)?
        .ok_or_else(|| Error::NotFound(format!("observation {id}")))?;

    let concepts = match mode.as_str() {
        "add" => {
            let mut merged = current.concepts.clone();
            for tag in incoming {
                if !merged.contains(&tag) {
                    merged.push(tag);
                }
            }
            merged
        },
        "remove" => current
            .concepts
            .iter()
            .filter(|tag| !incoming.contains(tag))
            .cloned()
            .collect(),
        "set" => incoming,
        other => {
            return Err(Error::BadRequest(format!(
                "unknown tag mode: {other} (expected add, remove, or set)"
            )));
        },
    };

    let updated = server.observations.update_observation(
        id,
        &ObservationUpdate {
            concepts: Some(concepts),
            ..ObservationUpdate::default()
        },
    )?;
    Ok(json!({ "id": id, "mode": mode, "concepts": updated.concepts }))
}

pub(crate) fn merge_observations(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let target_id = req_i64(args, "target_id")?;
    let source_ids = req_ids(args, "source_ids")?;
    let boost = opt_f64(args, "boost").unwrap_or(0.0);
    if !MERGE_BOOST_RANGE.contains(&boost) {
        return Err(Error::BadRequest(format!(
            "merge boost must be within [0, 0.5], got {boost}"
        )));
    }
    if source_ids.contains(&target_id) {
        return Err(Error::BadRequest(
            "target_id cannot appear in source_ids".to_string(),
        ));
    }
    let target = server
        .observations
        .get_by_id(target_id)?
        .ok_or_else(|| Error::NotFound(format!("observation {target_id}")))?;

    let superseded = server.observations.mark_superseded_batch(&source_ids)?;
    for source_id in &source_ids {
        if let Err(e) =
            server
                .relations
                .insert(target_id, *source_id, RelationType::Supersedes, 1.0)
        {
            tracing::warn!(source_id, "supersedes edge insert failed: {e}");
        }
    }
    if boost > 0.0 {
        let new_score = (target.importance_score + boost).clamp(0.0, 1.0);
        server.observations.update_importance_score(target_id, new_score)?;
    }
    Ok(json!({
        "target_id": target_id,
        "merged": superseded,
        "boost_applied": boost,
    }))
}

pub(crate) async fn bulk_delete(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let ids = req_ids(args, "ids")?;
    let outcome = server.observations.delete_batch(&ids);
    // A batch with zero successes is a failure, not a report.
    if outcome.deleted == 0 && !outcome.errors.is_empty() {
        return Err(Error::transient(
            "bulk_delete",
            format!("all {} deletions failed", outcome.errors.len()),
        ));
    }
    for id in &ids {
        if let Err(e) = server.vector.delete_by_observation_id(*id).await {
            tracing::debug!(id, "vector delete failed (rebuild will reconcile): {e}");
        }
    }
    Ok(json!({
        "deleted": outcome.deleted,
        "total": ids.len(),
        "errors": outcome.errors,
    }))
}

pub(crate) fn bulk_mark_superseded(
    server: &ToolServer,
    args: &Map<String, Value>,
) -> Result<Value> {
    let ids = req_ids(args, "ids")?;
    let affected = server.observations.mark_superseded_batch(&ids)?;
    Ok(json!({ "superseded": affected, "total": ids.len() }))
}

pub(crate) fn bulk_boost(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let ids = req_ids(args, "ids")?;
    let boost = opt_f64(args, "boost")
        .ok_or_else(|| Error::BadRequest("missing required field: boost".to_string()))?;
    if !BOOST_RANGE.contains(&boost) {
        return Err(Error::BadRequest(format!(
            "boost must be within [-1, 1], got {boost}"
        )));
    }

    let mut boosted = 0_usize;
    let mut errors = Vec::new();
    for id in &ids {
        match server.observations.get_by_id(*id) {
            Ok(Some(obs)) => {
                let new_score = (obs.importance_score + boost).clamp(0.0, 1.0);
                match server.observations.update_importance_score(*id, new_score) {
                    Ok(()) => boosted += 1,
                    Err(e) => errors.push(format!("id {id}: {e}")),
                }
            },
            Ok(None) => errors.push(format!("id {id}: not found")),
            Err(e) => errors.push(format!("id {id}: {e}")),
        }
    }
    if boosted == 0 && !errors.is_empty() {
        return Err(Error::transient(
            "bulk_boost",
            format!("all {} boosts failed", errors.len()),
        ));
    }
    Ok(json!({
        "boosted": boosted,
        "total": ids.len(),
        "boost_used": boost,
        "errors": errors,
    }))
}
