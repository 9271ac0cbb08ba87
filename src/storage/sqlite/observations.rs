//! [`ObservationStore`] implementation for [`SqliteStore`].

use super::rows::{OBSERVATION_COLUMNS, observation_from_row, to_json};
use super::{SqliteStore, db_err, fts_match_expr};
use crate::models::{NewObservation, Observation, ObservationType, Scope};
use crate::storage::traits::{
    BatchDeleteOutcome, FeedbackStats, ObservationStore, ObservationUpdate,
};
use crate::{Error, Result, epoch_ms};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params, params_from_iter};
use std::collections::{BTreeMap, HashMap};

/// Delete batches proceed 100 rows at a time.
const DELETE_BATCH_SIZE: usize = 100;

/// Chunk size for `IN (…)` parameter lists, comfortably under SQLite's
/// host-parameter limit.
const IN_CHUNK_SIZE: usize = 500;

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }
}

impl SqliteStore {
    fn select_observations(
        &self,
        operation: &'static str,
        where_clause: &str,
        order_limit: &str,
        sql_params: &[Value],
    ) -> Result<Vec<Observation>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {OBSERVATION_COLUMNS} FROM observations WHERE {where_clause} {order_limit}"
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| db_err(operation, e))?;
        let rows = stmt
            .query_map(params_from_iter(sql_params.iter()), observation_from_row)
            .map_err(|e| db_err(operation, e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err(operation, e))
    }
}

impl ObservationStore for SqliteStore {
    fn insert(&self, new: &NewObservation) -> Result<Observation> {
        let conn = self.lock();
        let created_at = epoch_ms();
        let scope = new.scope.unwrap_or(Scope::Project);
        conn.execute(
            "INSERT INTO observations (project, scope, obs_type, title, subtitle, narrative, \
             facts, concepts, files_read, files_modified, file_mtimes, sdk_session_id, \
             prompt_number, created_at, importance_score) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                new.project,
                scope.as_str(),
                new.obs_type.as_str(),
                new.title,
                new.subtitle,
                new.narrative,
                to_json(&new.facts),
                to_json(&new.concepts),
                to_json(&new.files_read),
                to_json(&new.files_modified),
                to_json(&new.file_mtimes),
                new.sdk_session_id,
                new.prompt_number,
                created_at,
                clamp_score(new.importance_score),
            ],
        )
        .map_err(|e| db_err("observation_insert", e))?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_by_id(id)?
            .ok_or_else(|| Error::transient("observation_insert", "row vanished after insert"))
    }

    fn get_by_id(&self, id: i64) -> Result<Option<Observation>> {
        let conn = self.lock();
        let sql = format!("SELECT {OBSERVATION_COLUMNS} FROM observations WHERE id = ?1");
        conn.query_row(&sql, params![id], observation_from_row)
            .optional()
            .map_err(|e| db_err("observation_get", e))
    }

    fn get_by_ids_preserve_order(&self, ids: &[i64]) -> Result<Vec<Observation>> {
        let mut by_id: HashMap<i64, Observation> = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(IN_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let fetched = self.select_observations(
                "observation_get_many",
                &format!("id IN ({placeholders})"),
                "",
                &chunk.iter().map(|id| Value::Integer(*id)).collect::<Vec<_>>(),
            )?;
            for obs in fetched {
                by_id.insert(obs.id, obs);
            }
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    fn get_recent(&self, project: &str, n: usize) -> Result<Vec<Observation>> {
        // Global-scoped rows ride along with every project; callers that
        // do not want them filter on scope afterwards.
        self.select_observations(
            "observation_recent",
            "(project = ?1 OR scope = 'global')",
            "ORDER BY created_at DESC, id DESC LIMIT ?2",
            &[Value::from(project.to_string()), Value::from(n as i64)],
        )
    }

    fn get_active(&self, project: &str, n: usize) -> Result<Vec<Observation>> {
        self.select_observations(
            "observation_active",
            "(project = ?1 OR scope = 'global') AND is_superseded = 0",
            "ORDER BY created_at DESC, id DESC LIMIT ?2",
            &[Value::from(project.to_string()), Value::from(n as i64)],
        )
    }

    fn fts_scored(
        &self,
        query: &str,
        project: &str,
        n: usize,
    ) -> Result<Vec<(Observation, f64)>> {
        let Some(match_expr) = fts_match_expr(query) else {
            return Ok(Vec::new());
        };
        let conn = self.lock();
        // bm25() is negative with better matches more negative, so the
        // negation is positive and monotone in relevance. Columns must be
        // qualified: the FTS shadow table carries title/narrative too.
        let columns = super::rows::qualified_observation_columns();
        let sql = format!(
            "SELECT {columns}, -bm25(observations_fts) AS raw_score \
             FROM observations_fts \
             JOIN observations ON observations.id = observations_fts.rowid \
             WHERE observations_fts MATCH ?1 \
               AND observations.project = ?2 AND observations.is_superseded = 0 \
             ORDER BY bm25(observations_fts) LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| db_err("observation_fts", e))?;
        let rows = stmt
            .query_map(params![match_expr, project, n as i64], |row| {
                let obs = observation_from_row(row)?;
                let raw: f64 = row.get("raw_score")?;
                Ok((obs, raw.max(0.0)))
            })
            .map_err(|e| db_err("observation_fts", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("observation_fts", e))
    }

    fn update_importance_score(&self, id: i64, score: f64) -> Result<()> {
        let conn = self.lock();
        let affected = conn
            .execute(
                "UPDATE observations SET importance_score = ?1, score_updated_at = ?2 \
                 WHERE id = ?3",
                params![clamp_score(score), epoch_ms(), id],
            )
            .map_err(|e| db_err("observation_score", e))?;
        if affected == 0 {
            return Err(Error::NotFound(format!("observation {id}")));
        }
        Ok(())
    }

    fn update_importance_scores(&self, scores: &BTreeMap<i64, f64>) -> Result<usize> {
        if scores.is_empty() {
            return Ok(0);
        }
        // One statement: atomic with respect to concurrent readers.
        let mut sql = String::from("UPDATE observations SET importance_score = CASE id ");
        let mut sql_params: Vec<Value> = Vec::with_capacity(scores.len() * 3 + 1);
        for (id, score) in scores {
            sql.push_str("WHEN ? THEN ? ");
            sql_params.push(Value::Integer(*id));
            sql_params.push(Value::Real(clamp_score(*score)));
        }
        sql.push_str("ELSE importance_score END, score_updated_at = ? WHERE id IN (");
        sql_params.push(Value::Integer(epoch_ms()));
        sql.push_str(&vec!["?"; scores.len()].join(", "));
        sql.push(')');
        for id in scores.keys() {
            sql_params.push(Value::Integer(*id));
        }

        let conn = self.lock();
        conn.execute(&sql, params_from_iter(sql_params.iter()))
            .map_err(|e| db_err("observation_score_batch", e))
    }

    fn increment_retrieval_counts(&self, ids: &[i64]) -> Result<()> {
        let conn = self.lock();
        for chunk in ids.chunks(IN_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "UPDATE observations SET retrieval_count = retrieval_count + 1 \
                 WHERE id IN ({placeholders})"
            );
            conn.execute(
                &sql,
                params_from_iter(chunk.iter().map(|id| Value::Integer(*id))),
            )
            .map_err(|e| db_err("observation_retrieved", e))?;
        }
        Ok(())
    }

    fn mark_superseded(&self, id: i64) -> Result<()> {
        let conn = self.lock();
        let affected = conn
            .execute(
                "UPDATE observations SET is_superseded = 1 WHERE id = ?1",
                params![id],
            )
            .map_err(|e| db_err("observation_supersede", e))?;
        if affected == 0 {
            return Err(Error::NotFound(format!("observation {id}")));
        }
        Ok(())
    }

    fn mark_superseded_batch(&self, ids: &[i64]) -> Result<usize> {
        let conn = self.lock();
        let mut affected = 0;
        for chunk in ids.chunks(IN_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql =
                format!("UPDATE observations SET is_superseded = 1 WHERE id IN ({placeholders})");
            affected += conn
                .execute(
                    &sql,
                    params_from_iter(chunk.iter().map(|id| Value::Integer(*id))),
                )
                .map_err(|e| db_err("observation_supersede_batch", e))?;
        }
        Ok(affected)
    }

    fn delete(&self, id: i64) -> Result<()> {
        let conn = self.lock();
        let affected = conn
            .execute("DELETE FROM observations WHERE id = ?1", params![id])
            .map_err(|e| db_err("observation_delete", e))?;
        if affected == 0 {
            return Err(Error::NotFound(format!("observation {id}")));
        }
        Ok(())
    }

    fn delete_batch(&self, ids: &[i64]) -> BatchDeleteOutcome {
        let mut outcome = BatchDeleteOutcome::default();
        for chunk in ids.chunks(DELETE_BATCH_SIZE) {
            for id in chunk {
                match self.delete(*id) {
                    Ok(()) => outcome.deleted += 1,
                    Err(e) => outcome.errors.push(format!("id {id}: {e}")),
                }
            }
        }
        outcome
    }

    fn update_observation(&self, id: i64, update: &ObservationUpdate) -> Result<Observation> {
        let current = self
            .get_by_id(id)?
            .ok_or_else(|| Error::NotFound(format!("observation {id}")))?;
        let conn = self.lock();
        conn.execute(
            "UPDATE observations SET title = ?1, subtitle = ?2, narrative = ?3, facts = ?4, \
             concepts = ?5, files_read = ?6, files_modified = ?7, scope = ?8 WHERE id = ?9",
            params![
                update.title.as_ref().unwrap_or(&current.title),
                update.subtitle.as_ref().unwrap_or(&current.subtitle),
                update.narrative.as_ref().unwrap_or(&current.narrative),
                to_json(update.facts.as_ref().unwrap_or(&current.facts)),
                to_json(update.concepts.as_ref().unwrap_or(&current.concepts)),
                to_json(update.files_read.as_ref().unwrap_or(&current.files_read)),
                to_json(update.files_modified.as_ref().unwrap_or(&current.files_modified)),
                update.scope.unwrap_or(current.scope).as_str(),
                id,
            ],
        )
        .map_err(|e| db_err("observation_update", e))?;
        drop(conn);
        self.get_by_id(id)?
            .ok_or_else(|| Error::NotFound(format!("observation {id}")))
    }

    fn needing_score_update(&self, threshold_ms: i64, limit: usize) -> Result<Vec<Observation>> {
        let cutoff = epoch_ms() - threshold_ms;
        self.select_observations(
            "observation_stale_scores",
            "score_updated_at IS NULL OR score_updated_at < ?1",
            "ORDER BY score_updated_at ASC NULLS FIRST LIMIT ?2",
            &[Value::Integer(cutoff), Value::from(limit as i64)],
        )
    }

    fn ids_created_before(&self, cutoff_ms: i64) -> Result<Vec<i64>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT id FROM observations WHERE created_at < ?1 ORDER BY id")
            .map_err(|e| db_err("observation_aged", e))?;
        let rows = stmt
            .query_map(params![cutoff_ms], |row| row.get(0))
            .map_err(|e| db_err("observation_aged", e))?;
        rows.collect::<rusqlite::Result<Vec<i64>>>()
            .map_err(|e| db_err("observation_aged", e))
    }

    fn superseded_ids(&self) -> Result<Vec<i64>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT id FROM observations WHERE is_superseded = 1 ORDER BY id")
            .map_err(|e| db_err("observation_superseded_ids", e))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| db_err("observation_superseded_ids", e))?;
        rows.collect::<rusqlite::Result<Vec<i64>>>()
            .map_err(|e| db_err("observation_superseded_ids", e))
    }

    fn feedback_stats(&self, project: &str) -> Result<FeedbackStats> {
        let conn = self.lock();
        conn.query_row(
            "SELECT COUNT(*), \
                    COALESCE(SUM(user_feedback > 0), 0), \
                    COALESCE(SUM(user_feedback < 0), 0), \
                    COALESCE(AVG(user_feedback), 0.0) \
             FROM observations WHERE project = ?1",
            params![project],
            |row| {
                Ok(FeedbackStats {
                    total: row.get(0)?,
                    positive: row.get(1)?,
                    negative: row.get(2)?,
                    average: row.get(3)?,
                })
            },
        )
        .map_err(|e| db_err("observation_feedback_stats", e))
    }

    fn top_scoring(&self, project: &str, n: usize) -> Result<Vec<Observation>> {
        self.select_observations(
            "observation_top_scoring",
            "project = ?1 AND is_superseded = 0",
            "ORDER BY importance_score DESC, created_at DESC LIMIT ?2",
            &[Value::from(project.to_string()), Value::from(n as i64)],
        )
    }

    fn most_retrieved(&self, project: &str, n: usize) -> Result<Vec<Observation>> {
        self.select_observations(
            "observation_most_retrieved",
            "project = ?1 AND is_superseded = 0",
            "ORDER BY retrieval_count DESC, created_at DESC LIMIT ?2",
            &[Value::from(project.to_string()), Value::from(n as i64)],
        )
    }

    fn concept_weights(&self) -> Result<BTreeMap<String, f64>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT tag, weight FROM concept_weights")
            .map_err(|e| db_err("concept_weights", e))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))
            .map_err(|e| db_err("concept_weights", e))?;
        rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()
            .map_err(|e| db_err("concept_weights", e))
    }

    fn get_by_concept(&self, project: &str, concept: &str, n: usize) -> Result<Vec<Observation>> {
        self.select_observations(
            "observation_by_concept",
            "project = ?1 AND is_superseded = 0 AND EXISTS \
             (SELECT 1 FROM json_each(observations.concepts) WHERE json_each.value = ?2)",
            "ORDER BY created_at DESC LIMIT ?3",
            &[
                Value::from(project.to_string()),
                Value::from(concept.to_lowercase()),
                Value::from(n as i64),
            ],
        )
    }

    fn get_by_file(&self, project: &str, file: &str, n: usize) -> Result<Vec<Observation>> {
        self.select_observations(
            "observation_by_file",
            "project = ?1 AND is_superseded = 0 AND (EXISTS \
             (SELECT 1 FROM json_each(observations.files_read) WHERE json_each.value = ?2) \
             OR EXISTS \
             (SELECT 1 FROM json_each(observations.files_modified) WHERE json_each.value = ?2))",
            "ORDER BY created_at DESC LIMIT ?3",
            &[
                Value::from(project.to_string()),
                Value::from(file.to_string()),
                Value::from(n as i64),
            ],
        )
    }

    fn get_by_type(
        &self,
        project: &str,
        obs_type: ObservationType,
        n: usize,
    ) -> Result<Vec<Observation>> {
        self.select_observations(
            "observation_by_type",
            "project = ?1 AND is_superseded = 0 AND obs_type = ?2",
            "ORDER BY created_at DESC LIMIT ?3",
            &[
                Value::from(project.to_string()),
                Value::from(obs_type.as_str().to_string()),
                Value::from(n as i64),
            ],
        )
    }

    fn count(&self, project: Option<&str>) -> Result<i64> {
        let conn = self.lock();
        match project {
            Some(project) => conn.query_row(
                "SELECT COUNT(*) FROM observations WHERE project = ?1",
                params![project],
                |row| row.get(0),
            ),
            None => conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0)),
        }
        .map_err(|e| db_err("observation_count", e))
    }

    fn timeline_around(
        &self,
        anchor_id: i64,
        before: usize,
        after: usize,
    ) -> Result<Vec<Observation>> {
        let anchor = self
            .get_by_id(anchor_id)?
            .ok_or_else(|| Error::NotFound(format!("observation {anchor_id}")))?;

        let mut older = self.select_observations(
            "observation_timeline",
            "project = ?1 AND (created_at < ?2 OR (created_at = ?2 AND id < ?3))",
            "ORDER BY created_at DESC, id DESC LIMIT ?4",
            &[
                Value::from(anchor.project.clone()),
                Value::Integer(anchor.created_at),
                Value::Integer(anchor.id),
                Value::from(before as i64),
            ],
        )?;
        let newer = self.select_observations(
            "observation_timeline",
            "project = ?1 AND (created_at > ?2 OR (created_at = ?2 AND id > ?3))",
            "ORDER BY created_at ASC, id ASC LIMIT ?4",
            &[
                Value::from(anchor.project.clone()),
                Value::Integer(anchor.created_at),
                Value::Integer(anchor.id),
                Value::from(after as i64),
            ],
        )?;

        older.reverse();
        older.push(anchor);
        older.extend(newer);
        Ok(older)
    }
}
