//! Relation and pattern store implementations for [`SqliteStore`].

use super::{SqliteStore, db_err};
use crate::models::{Pattern, PatternStatus, PatternType, Relation, RelationGraph, RelationType};
use crate::storage::traits::{PatternStore, RelationStore};
use crate::{Error, Result, epoch_ms};
use rusqlite::{Row, params};
use std::collections::HashSet;

fn relation_from_row(row: &Row<'_>) -> rusqlite::Result<Relation> {
    let relation_type: String = row.get("relation_type")?;
    Ok(Relation {
        id: row.get("id")?,
        from_id: row.get("from_id")?,
        to_id: row.get("to_id")?,
        relation_type: RelationType::parse(&relation_type).unwrap_or(RelationType::RelatedTo),
        confidence: row.get("confidence")?,
        created_at: row.get("created_at")?,
    })
}

const RELATION_COLUMNS: &str = "id, from_id, to_id, relation_type, confidence, created_at";

impl RelationStore for SqliteStore {
    fn insert(
        &self,
        from_id: i64,
        to_id: i64,
        relation_type: RelationType,
        confidence: f64,
    ) -> Result<Relation> {
        if from_id == to_id {
            return Err(Error::BadRequest("relation cannot be self-referential".into()));
        }
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO relations (from_id, to_id, relation_type, confidence, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                from_id,
                to_id,
                relation_type.as_str(),
                confidence.clamp(0.0, 1.0),
                epoch_ms(),
            ],
        )
        .map_err(|e| db_err("relation_insert", e))?;
        let id = conn.last_insert_rowid();
        let sql = format!("SELECT {RELATION_COLUMNS} FROM relations WHERE id = ?1");
        conn.query_row(&sql, params![id], relation_from_row)
            .map_err(|e| db_err("relation_insert", e))
    }

    fn relations_for(&self, id: i64) -> Result<Vec<Relation>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {RELATION_COLUMNS} FROM relations WHERE from_id = ?1 OR to_id = ?1 \
             ORDER BY confidence DESC, id"
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| db_err("relation_list", e))?;
        let rows = stmt
            .query_map(params![id], relation_from_row)
            .map_err(|e| db_err("relation_list", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("relation_list", e))
    }

    fn related_ids(&self, id: i64, min_confidence: f64) -> Result<Vec<i64>> {
        let relations = self.relations_for(id)?;
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for relation in relations {
            if relation.confidence < min_confidence {
                continue;
            }
            let other = if relation.from_id == id { relation.to_id } else { relation.from_id };
            if seen.insert(other) {
                ids.push(other);
            }
        }
        Ok(ids)
    }

    fn graph(&self, id: i64, max_depth: u32) -> Result<RelationGraph> {
        let mut graph = RelationGraph {
            root_id: id,
            ..RelationGraph::default()
        };
        let mut visited: HashSet<i64> = HashSet::from([id]);
        let mut edge_ids: HashSet<i64> = HashSet::new();
        let mut frontier = vec![id];

        for depth in 0..max_depth {
            if frontier.is_empty() {
                break;
            }
            graph.depth = depth + 1;
            let mut next = Vec::new();
            for node in frontier {
                for relation in self.relations_for(node)? {
                    if edge_ids.insert(relation.id) {
                        graph.edges.push(relation.clone());
                    }
                    let other = if relation.from_id == node {
                        relation.to_id
                    } else {
                        relation.from_id
                    };
                    if visited.insert(other) {
                        graph.node_ids.push(other);
                        next.push(other);
                    }
                }
            }
            frontier = next;
        }
        Ok(graph)
    }

    fn delete_for_observation(&self, id: i64) -> Result<usize> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM relations WHERE from_id = ?1 OR to_id = ?1",
            params![id],
        )
        .map_err(|e| db_err("relation_delete", e))
    }
}

fn pattern_from_row(row: &Row<'_>) -> rusqlite::Result<Pattern> {
    let pattern_type: String = row.get("pattern_type")?;
    let status: String = row.get("status")?;
    Ok(Pattern {
        id: row.get("id")?,
        project: row.get("project")?,
        pattern_type: PatternType::parse(&pattern_type).unwrap_or(PatternType::Workflow),
        status: PatternStatus::parse(&status).unwrap_or(PatternStatus::Active),
        title: row.get("title")?,
        description: row.get("description")?,
        occurrence_count: row.get("occurrence_count")?,
        avg_confidence: row.get("avg_confidence")?,
        created_at: row.get("created_at")?,
    })
}

impl PatternStore for SqliteStore {
    fn list(&self, project: &str, status: Option<PatternStatus>, n: usize) -> Result<Vec<Pattern>> {
        let conn = self.lock();
        let base = "SELECT id, project, pattern_type, status, title, description, \
                    occurrence_count, avg_confidence, created_at FROM patterns WHERE project = ?1";
        let mut stmt;
        let rows = if let Some(status) = status {
            stmt = conn
                .prepare(&format!(
                    "{base} AND status = ?2 ORDER BY occurrence_count DESC LIMIT ?3"
                ))
                .map_err(|e| db_err("pattern_list", e))?;
            stmt.query_map(params![project, status.as_str(), n as i64], pattern_from_row)
        } else {
            stmt = conn
                .prepare(&format!("{base} ORDER BY occurrence_count DESC LIMIT ?2"))
                .map_err(|e| db_err("pattern_list", e))?;
            stmt.query_map(params![project, n as i64], pattern_from_row)
        }
        .map_err(|e| db_err("pattern_list", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| db_err("pattern_list", e))
    }

    fn count(&self, project: Option<&str>) -> Result<i64> {
        let conn = self.lock();
        match project {
            Some(project) => conn.query_row(
                "SELECT COUNT(*) FROM patterns WHERE project = ?1",
                params![project],
                |row| row.get(0),
            ),
            None => conn.query_row("SELECT COUNT(*) FROM patterns", [], |row| row.get(0)),
        }
        .map_err(|e| db_err("pattern_count", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewObservation, ObservationType};
    use crate::storage::traits::ObservationStore;

    fn seed(store: &SqliteStore, n: usize) -> Vec<i64> {
        (0..n)
            .map(|i| {
                ObservationStore::insert(
                    store,
                    &NewObservation {
                        project: "demo".into(),
                        obs_type: ObservationType::Change,
                        title: format!("obs {i}"),
                        ..NewObservation::default()
                    },
                )
                .unwrap()
                .id
            })
            .collect()
    }

    #[test]
    fn test_related_ids_filters_by_confidence() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ids = seed(&store, 3);
        RelationStore::insert(&store, ids[0], ids[1], RelationType::Extends, 0.9).unwrap();
        RelationStore::insert(&store, ids[0], ids[2], RelationType::RelatedTo, 0.2).unwrap();

        let related = store.related_ids(ids[0], 0.5).unwrap();
        assert_eq!(related, vec![ids[1]]);
        let all = store.related_ids(ids[0], 0.0).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_graph_bounded_depth() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ids = seed(&store, 4);
        // Chain: 0 -> 1 -> 2 -> 3
        for window in ids.windows(2) {
            RelationStore::insert(&store, window[0], window[1], RelationType::DependsOn, 0.8)
                .unwrap();
        }

        let graph = store.graph(ids[0], 2).unwrap();
        assert_eq!(graph.root_id, ids[0]);
        assert!(graph.node_ids.contains(&ids[1]));
        assert!(graph.node_ids.contains(&ids[2]));
        assert!(!graph.node_ids.contains(&ids[3]));
        assert_eq!(graph.depth, 2);
    }

    #[test]
    fn test_self_relation_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ids = seed(&store, 1);
        let err = RelationStore::insert(&store, ids[0], ids[0], RelationType::Extends, 0.5)
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }
}
