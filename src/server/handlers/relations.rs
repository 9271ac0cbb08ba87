//! Relation and similarity handlers.

use super::{observation_index_json, opt_f64, opt_str, opt_usize, req_i64, req_str};
use crate::server::ToolServer;
use crate::vector::{DocType, VectorFilter};
use crate::{Error, Result};
use serde_json::{Map, Value, json};

/// Default similarity floor for `find_similar_observations`.
const DEFAULT_MIN_SIMILARITY: f64 = 0.7;

/// Result ceiling for `find_similar_observations`.
const SIMILAR_MAX_LIMIT: usize = 50;

pub(crate) fn find_related(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let id = req_i64(args, "id")?;
    if server.observations.get_by_id(id)?.is_none() {
        return Err(Error::NotFound(format!("observation {id}")));
    }
    let min_confidence = opt_f64(args, "min_confidence")
        .unwrap_or(server.settings.graph.min_confidence)
        .clamp(0.0, 1.0);
    let related = server.relations.related_ids(id, min_confidence)?;
    let rows = server.observations.get_by_ids_preserve_order(&related)?;
    Ok(json!({
        "id": id,
        "min_confidence": min_confidence,
        "results": rows.iter().map(observation_index_json).collect::<Vec<_>>(),
    }))
}

pub(crate) async fn find_similar(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let query = req_str(args, "query")?;
    let min_similarity = opt_f64(args, "min_similarity").unwrap_or(DEFAULT_MIN_SIMILARITY);
    if !(0.0..=1.0).contains(&min_similarity) {
        return Err(Error::BadRequest(format!(
            "min_similarity must be within [0, 1], got {min_similarity}"
        )));
    }
    let limit = opt_usize(args, "limit").unwrap_or(10).clamp(1, SIMILAR_MAX_LIMIT);

    let filter = VectorFilter {
        doc_type: Some(DocType::Observation),
        project: opt_str(args, "project").filter(|p| !p.is_empty()),
    };
    let hits = server.vector.query(&query, limit * 2, &filter).await?;
    let ids: Vec<i64> = hits
        .iter()
        .filter(|hit| hit.similarity >= min_similarity)
        .map(|hit| hit.metadata.sqlite_id)
        .take(limit)
        .collect();
    let similarity_by_id: std::collections::HashMap<i64, f64> = hits
        .iter()
        .map(|hit| (hit.metadata.sqlite_id, hit.similarity))
        .collect();

    let rows = server.observations.get_by_ids_preserve_order(&ids)?;
    let results: Vec<Value> = rows
        .iter()
        .map(|obs| {
            let mut item = observation_index_json(obs);
            item["similarity"] = json!(similarity_by_id.get(&obs.id).copied().unwrap_or(0.0));
            item
        })
        .collect();
    Ok(json!({ "query": query, "min_similarity": min_similarity, "results": results }))
}

pub(crate) fn relationships(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let id = req_i64(args, "id")?;
    if server.observations.get_by_id(id)?.is_none() {
        return Err(Error::NotFound(format!("observation {id}")));
    }
    let max_depth = opt_usize(args, "max_depth")
        .map_or(server.settings.graph.max_depth, |d| {
            u32::try_from(d).unwrap_or(u32::MAX)
        })
        .clamp(1, 10);
    let graph = server.relations.graph(id, max_depth)?;
    serde_json::to_value(&graph).map_err(|e| Error::transient("serialize", e))
}
