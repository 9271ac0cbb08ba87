//! Summary and prompt store implementations for [`SqliteStore`].

use super::rows::{SUMMARY_COLUMNS, prompt_from_row, summary_from_row};
use super::{SqliteStore, db_err};
use crate::models::{NewSessionSummary, NewUserPrompt, SessionSummary, UserPrompt};
use crate::storage::traits::{PromptStore, SummaryStore};
use crate::{Error, Result, epoch_ms};
use rusqlite::{OptionalExtension, params};
use std::collections::HashMap;

impl SummaryStore for SqliteStore {
    fn insert(&self, new: &NewSessionSummary) -> Result<SessionSummary> {
        let conn = self.lock();
        let created_at = epoch_ms();
        conn.execute(
            "INSERT INTO session_summaries (project, sdk_session_id, prompt_number, request, \
             investigated, learned, completed, next_steps, notes, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                new.project,
                new.sdk_session_id,
                new.prompt_number,
                new.request,
                new.investigated,
                new.learned,
                new.completed,
                new.next_steps,
                new.notes,
                created_at,
            ],
        )
        .map_err(|e| db_err("summary_insert", e))?;
        let id = conn.last_insert_rowid();
        let sql = format!("SELECT {SUMMARY_COLUMNS} FROM session_summaries WHERE id = ?1");
        conn.query_row(&sql, params![id], summary_from_row)
            .map_err(|e| db_err("summary_insert", e))
    }

    fn get_by_id(&self, id: i64) -> Result<Option<SessionSummary>> {
        let conn = self.lock();
        let sql = format!("SELECT {SUMMARY_COLUMNS} FROM session_summaries WHERE id = ?1");
        conn.query_row(&sql, params![id], summary_from_row)
            .optional()
            .map_err(|e| db_err("summary_get", e))
    }

    fn get_by_ids_preserve_order(&self, ids: &[i64]) -> Result<Vec<SessionSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM session_summaries WHERE id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| db_err("summary_get_many", e))?;
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(ids.iter()),
                summary_from_row,
            )
            .map_err(|e| db_err("summary_get_many", e))?;
        let mut by_id: HashMap<i64, SessionSummary> = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("summary_get_many", e))?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    fn get_recent(&self, project: &str, n: usize) -> Result<Vec<SessionSummary>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM session_summaries WHERE project = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| db_err("summary_recent", e))?;
        let rows = stmt
            .query_map(params![project, n as i64], summary_from_row)
            .map_err(|e| db_err("summary_recent", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("summary_recent", e))
    }

    fn delete(&self, id: i64) -> Result<()> {
        let conn = self.lock();
        let affected = conn
            .execute("DELETE FROM session_summaries WHERE id = ?1", params![id])
            .map_err(|e| db_err("summary_delete", e))?;
        if affected == 0 {
            return Err(Error::NotFound(format!("session summary {id}")));
        }
        Ok(())
    }

    fn count(&self, project: Option<&str>) -> Result<i64> {
        let conn = self.lock();
        match project {
            Some(project) => conn.query_row(
                "SELECT COUNT(*) FROM session_summaries WHERE project = ?1",
                params![project],
                |row| row.get(0),
            ),
            None => conn.query_row("SELECT COUNT(*) FROM session_summaries", [], |row| row.get(0)),
        }
        .map_err(|e| db_err("summary_count", e))
    }
}

impl PromptStore for SqliteStore {
    fn insert(&self, new: &NewUserPrompt) -> Result<UserPrompt> {
        let conn = self.lock();
        let created_at = epoch_ms();
        conn.execute(
            "INSERT INTO user_prompts (project, sdk_session_id, prompt_number, text, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new.project,
                new.sdk_session_id,
                new.prompt_number,
                new.text,
                created_at,
            ],
        )
        .map_err(|e| db_err("prompt_insert", e))?;
        let id = conn.last_insert_rowid();
        conn.query_row(
            "SELECT id, project, sdk_session_id, prompt_number, text, created_at \
             FROM user_prompts WHERE id = ?1",
            params![id],
            prompt_from_row,
        )
        .map_err(|e| db_err("prompt_insert", e))
    }

    fn get_by_ids_preserve_order(&self, ids: &[i64]) -> Result<Vec<UserPrompt>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, project, sdk_session_id, prompt_number, text, created_at \
             FROM user_prompts WHERE id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| db_err("prompt_get_many", e))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), prompt_from_row)
            .map_err(|e| db_err("prompt_get_many", e))?;
        let mut by_id: HashMap<i64, UserPrompt> = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("prompt_get_many", e))?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    fn get_recent(&self, project: &str, n: usize) -> Result<Vec<UserPrompt>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, project, sdk_session_id, prompt_number, text, created_at \
                 FROM user_prompts WHERE project = ?1 \
                 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )
            .map_err(|e| db_err("prompt_recent", e))?;
        let rows = stmt
            .query_map(params![project, n as i64], prompt_from_row)
            .map_err(|e| db_err("prompt_recent", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("prompt_recent", e))
    }

    fn delete_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM user_prompts WHERE created_at < ?1",
            params![cutoff_ms],
        )
        .map_err(|e| db_err("prompt_prune", e))
    }

    fn count(&self, project: Option<&str>) -> Result<i64> {
        let conn = self.lock();
        match project {
            Some(project) => conn.query_row(
                "SELECT COUNT(*) FROM user_prompts WHERE project = ?1",
                params![project],
                |row| row.get(0),
            ),
            None => conn.query_row("SELECT COUNT(*) FROM user_prompts", [], |row| row.get(0)),
        }
        .map_err(|e| db_err("prompt_count", e))
    }
}
