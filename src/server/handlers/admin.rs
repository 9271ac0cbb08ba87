//! Admin handlers.

use super::{opt_date, opt_str, opt_usize};
use crate::server::ToolServer;
use crate::{Error, Result};
use serde_json::{Map, Value, json};

/// Export row ceiling.
const EXPORT_MAX_ROWS: usize = 1000;

pub(crate) fn trigger_maintenance(server: &ToolServer, _args: &Map<String, Value>) -> Result<Value> {
    let Some(maintenance) = &server.maintenance else {
        return Err(Error::BadRequest(
            "maintenance is disabled on this server".to_string(),
        ));
    };
    maintenance.trigger_now();
    Ok(json!({ "triggered": true }))
}

pub(crate) fn maintenance_stats(server: &ToolServer, _args: &Map<String, Value>) -> Result<Value> {
    let Some(maintenance) = &server.maintenance else {
        return Err(Error::BadRequest(
            "maintenance is disabled on this server".to_string(),
        ));
    };
    serde_json::to_value(maintenance.stats()).map_err(|e| Error::transient("serialize", e))
}

pub(crate) fn export_observations(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let project = opt_str(args, "project").unwrap_or_default();
    let limit = opt_usize(args, "limit")
        .unwrap_or(EXPORT_MAX_ROWS)
        .clamp(1, EXPORT_MAX_ROWS);
    let date_start = opt_date(args, "dateStart");
    let date_end = opt_date(args, "dateEnd");

    let rows = server.observations.get_recent(&project, EXPORT_MAX_ROWS)?;
    let exported: Vec<Value> = rows
        .iter()
        .filter(|obs| date_start.is_none_or(|start| obs.created_at >= start))
        .filter(|obs| date_end.is_none_or(|end| obs.created_at <= end))
        .take(limit)
        .filter_map(|obs| serde_json::to_value(obs).ok())
        .collect();

    Ok(json!({
        "project": project,
        "count": exported.len(),
        "observations": exported,
    }))
}
