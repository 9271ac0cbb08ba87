//! Search-family handlers.

use super::{observation_index_json, opt_i64, opt_str, opt_usize, req_str, search_params_from, str_list};
use crate::models::{Observation, ObservationType};
use crate::search::{ResultFormat, SearchKind, SearchParams};
use crate::server::ToolServer;
use crate::{Error, Result};
use serde_json::{Map, Value, json};

/// Default rows on each side of a timeline anchor.
const TIMELINE_DEFAULT: usize = 10;

/// Ceiling on each side of a timeline anchor.
const TIMELINE_MAX: usize = 100;

pub(crate) async fn search(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let params = search_params_from(args)?;
    let response = server.search.unified_search(&params).await?;
    serde_json::to_value(response.as_ref()).map_err(|e| Error::transient("serialize", e))
}

pub(crate) async fn decisions(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let params = search_params_from(args)?;
    let response = server.search.decisions(&params).await?;
    serde_json::to_value(response.as_ref()).map_err(|e| Error::transient("serialize", e))
}

pub(crate) async fn changes(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let params = search_params_from(args)?;
    let response = server.search.changes(&params).await?;
    serde_json::to_value(response.as_ref()).map_err(|e| Error::transient("serialize", e))
}

pub(crate) async fn how_it_works(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let params = search_params_from(args)?;
    let response = server.search.how_it_works(&params).await?;
    serde_json::to_value(response.as_ref()).map_err(|e| Error::transient("serialize", e))
}

fn clamp_side(value: Option<usize>) -> usize {
    value.unwrap_or(TIMELINE_DEFAULT).min(TIMELINE_MAX)
}

fn timeline_row_passes(obs: &Observation, args: &Map<String, Value>) -> bool {
    if let Some(raw) = opt_str(args, "obs_type") {
        if !raw.trim().is_empty() {
            match ObservationType::parse_strict(&raw) {
                Some(obs_type) if obs.obs_type == obs_type => {},
                _ => return false,
            }
        }
    }
    let concepts = str_list(args, "concepts");
    if !concepts.is_empty() {
        let wanted: Vec<String> = concepts.iter().map(|c| c.to_lowercase()).collect();
        if !wanted.iter().all(|c| obs.concepts.contains(c)) {
            return false;
        }
    }
    let files = str_list(args, "files");
    if !files.is_empty()
        && !files
            .iter()
            .any(|f| obs.files_read.contains(f) || obs.files_modified.contains(f))
    {
        return false;
    }
    true
}

fn timeline_json(rows: &[Observation], anchor_id: i64, args: &Map<String, Value>) -> Value {
    let format = ResultFormat::parse(&opt_str(args, "format").unwrap_or_default());
    let results: Vec<Value> = rows
        .iter()
        .filter(|obs| obs.id == anchor_id || timeline_row_passes(obs, args))
        .map(|obs| match format {
            ResultFormat::Index => {
                let mut item = observation_index_json(obs);
                if obs.id == anchor_id {
                    item["is_anchor"] = json!(true);
                }
                item
            },
            ResultFormat::Full => {
                let mut item = serde_json::to_value(obs).unwrap_or_default();
                if obs.id == anchor_id {
                    item["is_anchor"] = json!(true);
                }
                item
            },
        })
        .collect();
    json!({ "anchor_id": anchor_id, "results": results })
}

pub(crate) async fn timeline(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let before = clamp_side(opt_usize(args, "before"));
    let after = clamp_side(opt_usize(args, "after"));

    if let Some(anchor_id) = opt_i64(args, "anchor_id") {
        let rows = server.observations.timeline_around(anchor_id, before, after)?;
        return Ok(timeline_json(&rows, anchor_id, args));
    }
    if args.get("query").and_then(Value::as_str).is_some() {
        return timeline_by_query(server, args).await;
    }
    Err(Error::BadRequest(
        "timeline requires anchor_id or query".to_string(),
    ))
}

pub(crate) async fn timeline_by_query(
    server: &ToolServer,
    args: &Map<String, Value>,
) -> Result<Value> {
    let query = req_str(args, "query")?;
    let before = clamp_side(opt_usize(args, "before"));
    let after = clamp_side(opt_usize(args, "after"));

    // An anchor search first; no match is an empty timeline, not an error.
    let anchor_params = SearchParams {
        query,
        kind: SearchKind::Observations,
        project: opt_str(args, "project").unwrap_or_default(),
        limit: 1,
        ..SearchParams::default()
    };
    let anchor = server.search.unified_search(&anchor_params).await?;
    let Some(first) = anchor.results.first() else {
        return Ok(json!({ "anchor_id": null, "results": [] }));
    };

    let rows = server.observations.timeline_around(first.id, before, after)?;
    Ok(timeline_json(&rows, first.id, args))
}

fn hydrated_list(rows: &[Observation]) -> Value {
    Value::Array(rows.iter().map(observation_index_json).collect())
}

pub(crate) fn find_by_concept(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    // `concept` normally, `tag` through the alias tool.
    let concept = req_str(args, "concept").or_else(|_| req_str(args, "tag"))?;
    let project = opt_str(args, "project").unwrap_or_default();
    let limit = opt_usize(args, "limit").unwrap_or(20).clamp(1, 100);
    let rows = server.observations.get_by_concept(&project, &concept, limit)?;
    Ok(json!({ "concept": concept.to_lowercase(), "results": hydrated_list(&rows) }))
}

pub(crate) fn find_by_file(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let file = req_str(args, "file")?;
    let project = opt_str(args, "project").unwrap_or_default();
    let limit = opt_usize(args, "limit").unwrap_or(20).clamp(1, 100);
    let rows = server.observations.get_by_file(&project, &file, limit)?;
    Ok(json!({ "file": file, "results": hydrated_list(&rows) }))
}

pub(crate) fn find_by_type(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let raw = req_str(args, "obs_type")?;
    let obs_type = ObservationType::parse_strict(&raw)
        .ok_or_else(|| Error::BadRequest(format!("unknown obs_type: {raw}")))?;
    let project = opt_str(args, "project").unwrap_or_default();
    let limit = opt_usize(args, "limit").unwrap_or(20).clamp(1, 100);
    let rows = server.observations.get_by_type(&project, obs_type, limit)?;
    Ok(json!({ "obs_type": obs_type, "results": hydrated_list(&rows) }))
}

pub(crate) fn get_recent_context(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let project = opt_str(args, "project").unwrap_or_default();
    let limit = opt_usize(args, "limit")
        .unwrap_or(server.settings.recent_context_count)
        .clamp(1, 100);
    let observations = server.observations.get_active(&project, limit)?;
    let summaries = server
        .summaries
        .get_recent(&project, server.settings.summary_context_count.min(limit))?;
    Ok(json!({
        "observations": hydrated_list(&observations),
        "summaries": summaries,
    }))
}

pub(crate) fn get_context_timeline(
    server: &ToolServer,
    args: &Map<String, Value>,
) -> Result<Value> {
    let project = opt_str(args, "project").unwrap_or_default();
    let limit = opt_usize(args, "limit").unwrap_or(20).clamp(1, 100);
    let mut rows = server.observations.get_active(&project, limit)?;
    rows.reverse(); // oldest first reads as a timeline
    Ok(json!({ "results": hydrated_list(&rows) }))
}
