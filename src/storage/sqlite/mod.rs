//! `SQLite` implementation of the store traits.
//!
//! One connection behind a mutex, WAL mode, schema created on open. The
//! FTS5 index over `title | narrative | facts` is an external-content table
//! kept in sync by triggers, so writers never touch it directly.
//!
//! ## Module Structure
//!
//! - [`rows`]: row ↔ model conversion and JSON-column helpers
//! - `observations`: [`ObservationStore`](crate::storage::ObservationStore) impl
//! - `summaries`: summary and prompt store impls
//! - `relations`: relation and pattern store impls

mod observations;
mod relations;
mod rows;
mod summaries;

use crate::models::CRITICAL_CONCEPTS;
use crate::storage::traits::DatabaseAdmin;
use crate::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Store backed by a single `SQLite` database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and ensures the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Fatal(format!("creating {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::Fatal(format!("opening {}: {e}", path.display())))?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory database. Used by tests and ephemeral sessions.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Fatal(format!("opening in-memory db: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON").ok();
        create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquires the connection lock with poison recovery.
    ///
    /// If a previous critical section panicked, the connection itself is
    /// still valid; recover it and log rather than cascade the failure.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("sqlite mutex was poisoned, recovering");
                poisoned.into_inner()
            },
        }
    }
}

impl DatabaseAdmin for SqliteStore {
    fn optimize(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch("PRAGMA optimize; PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(|e| Error::transient("optimize", e))
    }
}

/// Maps a database error into the crate error type.
pub(crate) fn db_err(operation: &str, e: rusqlite::Error) -> Error {
    Error::transient(operation, e)
}

/// Escapes a user string into an FTS5 match expression.
///
/// Each alphanumeric token becomes a quoted phrase; tokens are OR-joined so
/// partial matches still rank. Returns `None` when nothing tokenizable
/// remains.
pub(crate) fn fts_match_expr(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .map_err(|e| Error::Fatal(format!("creating schema: {e}")))?;
    seed_concept_weights(conn)
}

/// Default concept weights, written once on first open. Critical concepts
/// carry four times the weight of the rest of the vocabulary.
fn seed_concept_weights(conn: &Connection) -> Result<()> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM concept_weights", [], |row| row.get(0))
        .map_err(|e| Error::Fatal(format!("reading concept weights: {e}")))?;
    if count > 0 {
        return Ok(());
    }
    for tag in crate::models::CONCEPT_VOCABULARY {
        let weight = if CRITICAL_CONCEPTS.contains(tag) { 0.2 } else { 0.05 };
        conn.execute(
            "INSERT OR IGNORE INTO concept_weights (tag, weight) VALUES (?1, ?2)",
            rusqlite::params![tag, weight],
        )
        .map_err(|e| Error::Fatal(format!("seeding concept weights: {e}")))?;
    }
    Ok(())
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS observations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project TEXT NOT NULL,
    scope TEXT NOT NULL DEFAULT 'project',
    obs_type TEXT NOT NULL DEFAULT 'change',
    title TEXT NOT NULL,
    subtitle TEXT NOT NULL DEFAULT '',
    narrative TEXT NOT NULL DEFAULT '',
    facts TEXT NOT NULL DEFAULT '[]',
    concepts TEXT NOT NULL DEFAULT '[]',
    files_read TEXT NOT NULL DEFAULT '[]',
    files_modified TEXT NOT NULL DEFAULT '[]',
    file_mtimes TEXT NOT NULL DEFAULT '{}',
    sdk_session_id TEXT NOT NULL DEFAULT '',
    prompt_number INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    importance_score REAL NOT NULL DEFAULT 0.5,
    user_feedback INTEGER NOT NULL DEFAULT 0,
    retrieval_count INTEGER NOT NULL DEFAULT 0,
    is_superseded INTEGER NOT NULL DEFAULT 0,
    score_updated_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_observations_project_created
    ON observations (project, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_observations_superseded
    ON observations (is_superseded);
CREATE INDEX IF NOT EXISTS idx_observations_score_updated
    ON observations (score_updated_at);

CREATE VIRTUAL TABLE IF NOT EXISTS observations_fts USING fts5(
    title,
    narrative,
    facts,
    content='observations',
    content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS observations_ai AFTER INSERT ON observations BEGIN
    INSERT INTO observations_fts (rowid, title, narrative, facts)
    VALUES (new.id, new.title, new.narrative, new.facts);
END;
CREATE TRIGGER IF NOT EXISTS observations_ad AFTER DELETE ON observations BEGIN
    INSERT INTO observations_fts (observations_fts, rowid, title, narrative, facts)
    VALUES ('delete', old.id, old.title, old.narrative, old.facts);
END;
CREATE TRIGGER IF NOT EXISTS observations_au AFTER UPDATE ON observations BEGIN
    INSERT INTO observations_fts (observations_fts, rowid, title, narrative, facts)
    VALUES ('delete', old.id, old.title, old.narrative, old.facts);
    INSERT INTO observations_fts (rowid, title, narrative, facts)
    VALUES (new.id, new.title, new.narrative, new.facts);
END;

CREATE TABLE IF NOT EXISTS session_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project TEXT NOT NULL,
    sdk_session_id TEXT NOT NULL DEFAULT '',
    prompt_number INTEGER NOT NULL DEFAULT 0,
    request TEXT NOT NULL DEFAULT '',
    investigated TEXT NOT NULL DEFAULT '',
    learned TEXT NOT NULL DEFAULT '',
    completed TEXT NOT NULL DEFAULT '',
    next_steps TEXT NOT NULL DEFAULT '',
    notes TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_summaries_project_created
    ON session_summaries (project, created_at DESC);

CREATE TABLE IF NOT EXISTS user_prompts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project TEXT NOT NULL,
    sdk_session_id TEXT NOT NULL DEFAULT '',
    prompt_number INTEGER NOT NULL DEFAULT 0,
    text TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_prompts_project_created
    ON user_prompts (project, created_at DESC);

CREATE TABLE IF NOT EXISTS relations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_id INTEGER NOT NULL,
    to_id INTEGER NOT NULL,
    relation_type TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.5,
    created_at INTEGER NOT NULL,
    UNIQUE (from_id, to_id, relation_type)
);
CREATE INDEX IF NOT EXISTS idx_relations_from ON relations (from_id);
CREATE INDEX IF NOT EXISTS idx_relations_to ON relations (to_id);

CREATE TABLE IF NOT EXISTS patterns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project TEXT NOT NULL,
    pattern_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    occurrence_count INTEGER NOT NULL DEFAULT 1,
    avg_confidence REAL NOT NULL DEFAULT 0.5,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_patterns_project ON patterns (project, status);

CREATE TABLE IF NOT EXISTS concept_weights (
    tag TEXT PRIMARY KEY,
    weight REAL NOT NULL
);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_creates_schema() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM concept_weights", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, crate::models::CONCEPT_VOCABULARY.len() as i64);
    }

    #[test]
    fn test_fts_match_expr_quotes_tokens() {
        assert_eq!(
            fts_match_expr("jwt alg:none bypass"),
            Some("\"jwt\" OR \"alg\" OR \"none\" OR \"bypass\"".to_string())
        );
        assert_eq!(fts_match_expr("  ~~ !! "), None);
        // Embedded quotes cannot escape the phrase.
        assert_eq!(fts_match_expr("a\"b"), Some("\"a\" OR \"b\"".to_string()));
    }
}
