//! Read-only analytics handlers.

use super::{opt_str, opt_usize, req_i64, req_str};
use crate::models::{CRITICAL_CONCEPTS, Observation, ObservationType};
use crate::search::{RankedDoc, bm25_normalize, fuse};
use crate::server::ToolServer;
use crate::vector::{DocType, VectorFilter};
use crate::worker::stored_similarity;
use crate::{DAY_MS, Error, Result, epoch_ms};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Rows examined by the project-wide report tools.
const REPORT_WINDOW: usize = 1000;

pub(crate) async fn memory_stats(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let project = opt_str(args, "project");
    let project = project.as_deref().filter(|p| !p.is_empty());
    let vector_count = server.vector.count().await.unwrap_or(0);
    Ok(json!({
        "observations": server.observations.count(project)?,
        "session_summaries": server.summaries.count(project)?,
        "user_prompts": server.prompts.count(project)?,
        "patterns": server.patterns.count(project)?,
        "vectors": vector_count,
        "search_cache_entries": server.search.cache_len(),
    }))
}

fn quality_notes(obs: &Observation) -> Vec<&'static str> {
    let mut notes = Vec::new();
    if obs.narrative.len() < 40 {
        notes.push("narrative is thin");
    }
    if obs.facts.is_empty() {
        notes.push("no facts recorded");
    }
    if obs.concepts.is_empty() {
        notes.push("no concept tags");
    }
    if obs.files_read.is_empty() && obs.files_modified.is_empty() {
        notes.push("no file references");
    }
    if obs.is_superseded {
        notes.push("superseded");
    }
    notes
}

pub(crate) fn observation_quality(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let id = req_i64(args, "id")?;
    let obs = server
        .observations
        .get_by_id(id)?
        .ok_or_else(|| Error::NotFound(format!("observation {id}")))?;
    let notes = quality_notes(&obs);
    let critical = obs
        .concepts
        .iter()
        .filter(|c| CRITICAL_CONCEPTS.contains(&c.as_str()))
        .count();
    #[allow(clippy::cast_precision_loss)]
    let completeness = 1.0 - notes.len() as f64 * 0.2;
    Ok(json!({
        "id": id,
        "completeness": completeness.max(0.0),
        "critical_concepts": critical,
        "retrieval_count": obs.retrieval_count,
        "notes": notes,
    }))
}

pub(crate) fn suggest_consolidations(
    server: &ToolServer,
    args: &Map<String, Value>,
) -> Result<Value> {
    let project = opt_str(args, "project").unwrap_or_default();
    let limit = opt_usize(args, "limit").unwrap_or(10).clamp(1, 100);
    let rows = server.observations.get_active(&project, 50)?;

    let mut suggestions = Vec::new();
    for (index, a) in rows.iter().enumerate() {
        for b in rows.iter().skip(index + 1) {
            let similarity = stored_similarity(a, b);
            if similarity >= 0.4 {
                suggestions.push(json!({
                    "target_id": a.id.max(b.id),
                    "source_id": a.id.min(b.id),
                    "similarity": (similarity * 1000.0).round() / 1000.0,
                    "titles": [a.title.clone(), b.title.clone()],
                }));
            }
        }
    }
    suggestions.sort_by(|a, b| {
        b["similarity"]
            .as_f64()
            .partial_cmp(&a["similarity"].as_f64())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    suggestions.truncate(limit);
    Ok(json!({ "suggestions": suggestions }))
}

pub(crate) fn temporal_trends(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let project = opt_str(args, "project").unwrap_or_default();
    let days = opt_i64_clamped(args, "days", 30, 1, 365);
    let cutoff = epoch_ms() - days * DAY_MS;
    let rows = server.observations.get_recent(&project, REPORT_WINDOW)?;

    let mut buckets: BTreeMap<String, BTreeMap<&'static str, i64>> = BTreeMap::new();
    for obs in rows.iter().filter(|obs| obs.created_at >= cutoff) {
        let day = chrono::DateTime::from_timestamp_millis(obs.created_at)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        *buckets
            .entry(day)
            .or_default()
            .entry(obs.obs_type.as_str())
            .or_default() += 1;
    }
    Ok(json!({ "days": days, "buckets": buckets }))
}

fn opt_i64_clamped(args: &Map<String, Value>, key: &str, default: i64, min: i64, max: i64) -> i64 {
    args.get(key)
        .and_then(Value::as_i64)
        .unwrap_or(default)
        .clamp(min, max)
}

pub(crate) fn data_quality_report(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let project = opt_str(args, "project").unwrap_or_default();
    let rows = server.observations.get_recent(&project, REPORT_WINDOW)?;
    let total = rows.len();
    let missing_narrative = rows.iter().filter(|o| o.narrative.is_empty()).count();
    let missing_concepts = rows.iter().filter(|o| o.concepts.is_empty()).count();
    let missing_facts = rows.iter().filter(|o| o.facts.is_empty()).count();
    let superseded = rows.iter().filter(|o| o.is_superseded).count();
    let untyped = rows
        .iter()
        .filter(|o| o.obs_type == ObservationType::Change)
        .count();
    Ok(json!({
        "sampled": total,
        "missing_narrative": missing_narrative,
        "missing_concepts": missing_concepts,
        "missing_facts": missing_facts,
        "superseded": superseded,
        "generic_type": untyped,
    }))
}

pub(crate) async fn explain_search_ranking(
    server: &ToolServer,
    args: &Map<String, Value>,
) -> Result<Value> {
    let query = req_str(args, "query")?;
    let project = opt_str(args, "project").unwrap_or_default();
    let limit = opt_usize(args, "limit").unwrap_or(10).clamp(1, 50);

    let fts = server.observations.fts_scored(&query, &project, limit)?;
    let lexical: Vec<RankedDoc> = fts
        .iter()
        .map(|(obs, raw)| RankedDoc {
            doc_type: DocType::Observation,
            id: obs.id,
            score: bm25_normalize(*raw),
            created_at: obs.created_at,
        })
        .collect();

    let filter = VectorFilter {
        doc_type: Some(DocType::Observation),
        project: (!project.is_empty()).then(|| project.clone()),
    };
    let dense: Vec<RankedDoc> = server
        .vector
        .query(&query, limit, &filter)
        .await
        .unwrap_or_default()
        .iter()
        .map(|hit| RankedDoc {
            doc_type: hit.metadata.doc_type,
            id: hit.metadata.sqlite_id,
            score: hit.similarity,
            created_at: hit.metadata.created_at,
        })
        .collect();

    let fused = fuse(&lexical, &dense, server.settings.rerank.rrf_k, limit);
    let rank_of = |docs: &[RankedDoc], id: i64| {
        docs.iter()
            .position(|d| d.id == id)
            .map(|p| p + 1)
    };
    let explained: Vec<Value> = fused
        .iter()
        .map(|doc| {
            json!({
                "id": doc.id,
                "rrf_score": doc.rrf_score,
                "lexical_rank": rank_of(&lexical, doc.id),
                "dense_rank": rank_of(&dense, doc.id),
            })
        })
        .collect();
    Ok(json!({ "query": query, "ranking": explained }))
}

pub(crate) async fn system_health(server: &ToolServer, _args: &Map<String, Value>) -> Result<Value> {
    let store_ok = server.observations.count(None).is_ok();
    let vector_health = server.vector.health_stats().await.ok();
    let cache_stats = server.vector.cache_stats().await.ok();
    let breaker = server.worker.as_ref().map(|w| w.breaker_state());
    Ok(json!({
        "store_reachable": store_ok,
        "vector_connected": server.vector.is_connected(),
        "vector_health": vector_health,
        "vector_cache": cache_stats,
        "breaker_state": breaker,
        "uptime_secs": server.started_at.elapsed().as_secs(),
    }))
}

pub(crate) fn search_patterns(server: &ToolServer, _args: &Map<String, Value>) -> Result<Value> {
    let snapshot = server.search.metrics().snapshot();
    let top = server.search.frequency().top_queries(10);
    Ok(json!({
        "metrics": snapshot,
        "top_queries": top.iter().map(|(query, count)| {
            json!({ "query": query, "count": count })
        }).collect::<Vec<_>>(),
    }))
}

pub(crate) fn scoring_breakdown(server: &ToolServer, args: &Map<String, Value>) -> Result<Value> {
    let id = req_i64(args, "id")?;
    let obs = server
        .observations
        .get_by_id(id)?
        .ok_or_else(|| Error::NotFound(format!("observation {id}")))?;
    let breakdown = server.scorer.breakdown(&obs, epoch_ms());
    Ok(json!({
        "id": id,
        "stored_score": obs.importance_score,
        "breakdown": breakdown,
    }))
}

pub(crate) fn observation_importance(
    server: &ToolServer,
    args: &Map<String, Value>,
) -> Result<Value> {
    let project = opt_str(args, "project").unwrap_or_default();
    let limit = opt_usize(args, "limit").unwrap_or(10).clamp(1, 100);
    let top = server.observations.top_scoring(&project, limit)?;
    let retrieved = server.observations.most_retrieved(&project, limit)?;
    let feedback = server.observations.feedback_stats(&project)?;
    Ok(json!({
        "top_scoring": top.iter().map(super::observation_index_json).collect::<Vec<_>>(),
        "most_retrieved": retrieved.iter().map(super::observation_index_json).collect::<Vec<_>>(),
        "feedback": feedback,
    }))
}
