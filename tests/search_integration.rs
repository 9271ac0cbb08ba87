//! Hybrid retrieval scenarios.

mod common;

use common::DisconnectedVector;
use engram::models::{NewObservation, ObservationType};
use engram::search::{OrderBy, SearchConfig, SearchKind, SearchManager, SearchMode, SearchParams};
use engram::storage::{ObservationStore, SqliteStore};
use engram::vector::{DocType, InMemoryVectorClient, VectorClient, VectorMetadata};
use std::sync::Arc;
use std::sync::atomic::Ordering;

fn insert(store: &SqliteStore, title: &str, narrative: &str) -> i64 {
    ObservationStore::insert(
        store,
        &NewObservation {
            project: "demo".to_string(),
            obs_type: ObservationType::Bugfix,
            title: title.to_string(),
            narrative: narrative.to_string(),
            importance_score: 0.5,
            ..NewObservation::default()
        },
    )
    .unwrap()
    .id
}

async fn upsert_vector(vector: &InMemoryVectorClient, id: i64, text: &str, created_at: i64) {
    vector
        .upsert(
            &DocType::Observation.doc_id(id),
            DocType::Observation,
            text,
            &VectorMetadata {
                sqlite_id: id,
                doc_type: DocType::Observation,
                project: "demo".to_string(),
                created_at,
            },
        )
        .await
        .unwrap();
}

fn manager(store: Arc<SqliteStore>, vector: Arc<dyn VectorClient>) -> SearchManager {
    SearchManager::new(
        store.clone(),
        store.clone(),
        store,
        vector,
        SearchConfig::default(),
    )
}

#[tokio::test]
async fn hybrid_fuses_lexical_and_dense_arms() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let vector = Arc::new(InMemoryVectorClient::new());

    // O1: lexical hit only. O2: dense hit only. O3: present in both arms.
    let o1 = insert(&store, "Fix jwt validation bypass", "unsigned tokens accepted");
    let o2 = insert(&store, "Session cache rework", "eviction policy changed");
    let o3 = insert(&store, "jwt refresh handling", "refresh path hardened");

    let o2_row = store.get_by_id(o2).unwrap().unwrap();
    let o3_row = store.get_by_id(o3).unwrap().unwrap();
    upsert_vector(&vector, o2, "jwt validation", o2_row.created_at).await;
    upsert_vector(&vector, o3, "jwt refresh flow", o3_row.created_at).await;

    let search = manager(store.clone(), vector);
    let params = SearchParams {
        query: "jwt validation".to_string(),
        kind: SearchKind::Observations,
        project: "demo".to_string(),
        order_by: OrderBy::Relevance,
        ..SearchParams::default()
    };
    let response = search.unified_search(&params).await.unwrap();

    assert_eq!(response.mode, SearchMode::Hybrid);
    let ids: Vec<i64> = response.results.iter().map(|r| r.id).collect();
    assert!(ids.contains(&o1));
    assert!(ids.contains(&o2));
    // Agreement between both retrievers outranks a single first place.
    assert_eq!(ids[0], o3);

    // Returned observations count as retrieved.
    let refreshed = store.get_by_id(o3).unwrap().unwrap();
    assert_eq!(refreshed.retrieval_count, 1);
}

#[tokio::test]
async fn superseded_rows_are_dropped_from_hybrid_results() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let vector = Arc::new(InMemoryVectorClient::new());
    let id = insert(&store, "jwt validation notes", "kept for history");
    store.mark_superseded(id).unwrap();

    let search = manager(store.clone(), vector);
    let params = SearchParams {
        query: "jwt validation".to_string(),
        kind: SearchKind::Observations,
        project: "demo".to_string(),
        ..SearchParams::default()
    };
    let response = search.unified_search(&params).await.unwrap();
    assert!(response.results.is_empty());
}

#[tokio::test]
async fn disconnected_vector_degrades_to_filter_only() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    insert(&store, "recent work", "plain recency retrieval");

    let search = manager(store, Arc::new(DisconnectedVector));
    let params = SearchParams {
        query: "anything at all".to_string(),
        project: "demo".to_string(),
        ..SearchParams::default()
    };
    let response = search.unified_search(&params).await.unwrap();
    assert_eq!(response.mode, SearchMode::FilterOnly);
    assert_eq!(response.results.len(), 1);
}

#[tokio::test]
async fn empty_query_uses_filter_mode_and_respects_limit() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    for index in 0..30 {
        insert(&store, &format!("observation {index}"), "body");
    }
    let search = manager(store, Arc::new(InMemoryVectorClient::new()));
    let params = SearchParams {
        project: "demo".to_string(),
        limit: 5,
        ..SearchParams::default()
    };
    let response = search.unified_search(&params).await.unwrap();
    assert_eq!(response.mode, SearchMode::FilterOnly);
    assert_eq!(response.results.len(), 5);
    // Newest first by default.
    assert!(response.results[0].created_at >= response.results[4].created_at);
}

#[tokio::test]
async fn identical_concurrent_searches_execute_once() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    insert(&store, "coalesced target", "single execution expected");
    let search = Arc::new(manager(store, Arc::new(InMemoryVectorClient::new())));

    let params = SearchParams {
        query: "coalesced target".to_string(),
        project: "demo".to_string(),
        ..SearchParams::default()
    };
    let mut handles = Vec::new();
    for _ in 0..6 {
        let search = Arc::clone(&search);
        let params = params.clone();
        handles.push(tokio::spawn(async move {
            search.unified_search(&params).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let executed = search.metrics().vector_searches.load(Ordering::SeqCst)
        + search.metrics().filter_searches.load(Ordering::SeqCst);
    assert_eq!(executed, 1, "one backend execution for six identical calls");
    let followers = search.metrics().coalesced_requests.load(Ordering::SeqCst)
        + search.metrics().cache_hits.load(Ordering::SeqCst);
    assert_eq!(followers, 5);
}

#[tokio::test]
async fn second_search_is_served_from_cache() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    insert(&store, "cached row", "served twice");
    let search = manager(store, Arc::new(InMemoryVectorClient::new()));

    let params = SearchParams {
        query: "cached row".to_string(),
        project: "demo".to_string(),
        ..SearchParams::default()
    };
    search.unified_search(&params).await.unwrap();

    // Same parameters with different query spacing and case: same key.
    let sloppy = SearchParams {
        query: "  Cached   ROW ".to_string(),
        ..params
    };
    search.unified_search(&sloppy).await.unwrap();
    assert_eq!(search.metrics().cache_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shortcut_forces_observation_scope() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    insert(
        &store,
        "Chose sqlite over postgres",
        "decision recorded for storage engine",
    );
    let search = manager(store, Arc::new(InMemoryVectorClient::new()));

    let params = SearchParams {
        query: "storage engine".to_string(),
        project: "demo".to_string(),
        ..SearchParams::default()
    };
    let response = search.decisions(&params).await.unwrap();
    // The boosted query is what executed (and is reported back).
    assert!(response.query.contains("decision chose architecture"));
}
