//! Tool handlers.
//!
//! Each handler validates its arguments, clamps numeric ranges to the
//! registry's declared bounds, calls into the core, and returns a JSON
//! value that dispatch wraps into a text content block.

pub mod admin;
pub mod analytics;
pub mod crud;
pub mod relations;
pub mod search;

use crate::models::{Observation, ObservationType, Scope};
use crate::search::{OrderBy, ResultFormat, SearchKind, SearchParams};
use crate::{Error, Result};
use serde_json::{Map, Value};

/// Maximum ids accepted by any bulk operation.
pub const MAX_BULK_IDS: usize = 1000;

pub(crate) fn req_i64(args: &Map<String, Value>, key: &str) -> Result<i64> {
    args.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::BadRequest(format!("missing required field: {key}")))
}

pub(crate) fn opt_i64(args: &Map<String, Value>, key: &str) -> Option<i64> {
    args.get(key).and_then(Value::as_i64)
}

pub(crate) fn opt_usize(args: &Map<String, Value>, key: &str) -> Option<usize> {
    args.get(key)
        .and_then(Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
}

pub(crate) fn opt_f64(args: &Map<String, Value>, key: &str) -> Option<f64> {
    args.get(key).and_then(Value::as_f64)
}

pub(crate) fn opt_bool(args: &Map<String, Value>, key: &str) -> Option<bool> {
    args.get(key).and_then(Value::as_bool)
}

pub(crate) fn req_str(args: &Map<String, Value>, key: &str) -> Result<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| Error::BadRequest(format!("missing required field: {key}")))
}

pub(crate) fn opt_str(args: &Map<String, Value>, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

pub(crate) fn str_list(args: &Map<String, Value>, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Required id array, capped at [`MAX_BULK_IDS`].
pub(crate) fn req_ids(args: &Map<String, Value>, key: &str) -> Result<Vec<i64>> {
    let ids: Vec<i64> = args
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| Error::BadRequest(format!("missing required field: {key}")))?
        .iter()
        .filter_map(Value::as_i64)
        .collect();
    if ids.is_empty() {
        return Err(Error::BadRequest(format!("{key} must not be empty")));
    }
    if ids.len() > MAX_BULK_IDS {
        return Err(Error::BadRequest(format!(
            "{key} exceeds the {MAX_BULK_IDS}-id limit"
        )));
    }
    Ok(ids)
}

/// Accepts epoch milliseconds (number or numeric string) or RFC 3339.
pub(crate) fn parse_date(value: &Value) -> Option<i64> {
    if let Some(ms) = value.as_i64() {
        return Some(ms);
    }
    let text = value.as_str()?.trim();
    if let Ok(ms) = text.parse::<i64>() {
        return Some(ms);
    }
    chrono::DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

pub(crate) fn opt_date(args: &Map<String, Value>, key: &str) -> Option<i64> {
    args.get(key).and_then(parse_date)
}

/// Builds [`SearchParams`] from the shared search-family argument shape.
pub(crate) fn search_params_from(args: &Map<String, Value>) -> Result<SearchParams> {
    let obs_type = match opt_str(args, "obs_type") {
        Some(raw) if !raw.trim().is_empty() => Some(
            ObservationType::parse_strict(&raw)
                .ok_or_else(|| Error::BadRequest(format!("unknown obs_type: {raw}")))?,
        ),
        _ => None,
    };
    let scope = match opt_str(args, "scope") {
        Some(raw) if !raw.trim().is_empty() => Some(
            Scope::parse(&raw).ok_or_else(|| Error::BadRequest(format!("unknown scope: {raw}")))?,
        ),
        _ => None,
    };
    let defaults = SearchParams::default();
    Ok(SearchParams {
        query: opt_str(args, "query").unwrap_or_default(),
        kind: SearchKind::parse(&opt_str(args, "type").unwrap_or_default()),
        project: opt_str(args, "project").unwrap_or_default(),
        obs_type,
        concepts: str_list(args, "concepts"),
        files: str_list(args, "files"),
        date_start: opt_date(args, "dateStart"),
        date_end: opt_date(args, "dateEnd"),
        order_by: OrderBy::parse(&opt_str(args, "orderBy").unwrap_or_default()),
        limit: opt_usize(args, "limit").unwrap_or(defaults.limit),
        offset: opt_usize(args, "offset").unwrap_or(0),
        format: ResultFormat::parse(&opt_str(args, "format").unwrap_or_default()),
        scope,
        include_global: opt_bool(args, "include_global").unwrap_or(defaults.include_global),
        exclude_superseded: opt_bool(args, "exclude_superseded")
            .unwrap_or(defaults.exclude_superseded),
    })
}

/// Index-format JSON for an observation, shared by the find-by tools.
pub(crate) fn observation_index_json(obs: &Observation) -> Value {
    serde_json::json!({
        "id": obs.id,
        "type": obs.obs_type,
        "title": obs.title,
        "subtitle": obs.subtitle,
        "concepts": obs.concepts,
        "importance_score": obs.importance_score,
        "created_at": obs.created_at,
        "is_superseded": obs.is_superseded,
    })
}
