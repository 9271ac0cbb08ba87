//! Tool-server scenarios over the JSON-RPC surface.

use engram::config::Settings;
use engram::models::{NewObservation, ObservationType};
use engram::scoring::Scorer;
use engram::search::{SearchConfig, SearchManager};
use engram::server::{JsonRpcRequest, ToolServer, ToolServerDeps};
use engram::storage::{ObservationStore, SqliteStore};
use engram::vector::{InMemoryVectorClient, VectorClient};
use serde_json::{Value, json};
use std::sync::Arc;

struct Fixture {
    store: Arc<SqliteStore>,
    server: ToolServer,
}

fn fixture() -> Fixture {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let vector: Arc<dyn VectorClient> = Arc::new(InMemoryVectorClient::new());
    let search = Arc::new(SearchManager::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::clone(&vector),
        SearchConfig::default(),
    ));
    let server = ToolServer::new(ToolServerDeps {
        observations: store.clone(),
        summaries: store.clone(),
        prompts: store.clone(),
        relations: store.clone(),
        patterns: store.clone(),
        search,
        scorer: Arc::new(Scorer::default()),
        vector,
        maintenance: None,
        worker: None,
        settings: Settings::default(),
    });
    Fixture { store, server }
}

fn insert_scored(store: &SqliteStore, title: &str, score: f64) -> i64 {
    let obs = ObservationStore::insert(
        store,
        &NewObservation {
            project: "demo".to_string(),
            obs_type: ObservationType::Bugfix,
            title: title.to_string(),
            narrative: "narrative".to_string(),
            importance_score: score,
            ..NewObservation::default()
        },
    )
    .unwrap();
    obs.id
}

async fn call_tool(server: &ToolServer, name: &str, arguments: Value) -> Result<Value, i32> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        id: Some(json!(1)),
        method: "tools/call".to_string(),
        params: Some(json!({ "name": name, "arguments": arguments })),
    };
    let response = server.handle_request(request).await.expect("response");
    if let Some(error) = response.error {
        return Err(error.code);
    }
    let result = response.result.expect("result");
    let text = result["content"][0]["text"].as_str().expect("text block");
    Ok(serde_json::from_str(text).expect("valid tool JSON"))
}

#[tokio::test]
async fn timeline_by_query_with_no_match_returns_empty_not_error() {
    let Fixture { server, .. } = fixture();
    let result = call_tool(
        &server,
        "get_timeline_by_query",
        json!({ "query": "zzzz-no-match", "project": "demo" }),
    )
    .await
    .expect("no error for an empty anchor search");
    assert!(result["results"].as_array().unwrap().is_empty());
    assert!(result["anchor_id"].is_null());
}

#[tokio::test]
async fn bulk_boost_clamps_scores_to_one() {
    let Fixture { store, server } = fixture();
    let high = insert_scored(&store, "already high", 0.8);
    let low = insert_scored(&store, "lower", 0.3);

    let result = call_tool(
        &server,
        "bulk_boost_observations",
        json!({ "ids": [high, low], "boost": 0.9 }),
    )
    .await
    .expect("boost succeeds");

    assert_eq!(result["boosted"], 2);
    assert_eq!(result["total"], 2);
    assert!((result["boost_used"].as_f64().unwrap() - 0.9).abs() < 1e-9);

    let high = store.get_by_id(high).unwrap().unwrap();
    let low = store.get_by_id(low).unwrap().unwrap();
    assert!((high.importance_score - 1.0).abs() < 1e-9);
    assert!((low.importance_score - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn bulk_boost_out_of_range_is_invalid_params() {
    let Fixture { store, server } = fixture();
    let id = insert_scored(&store, "row", 0.5);
    let code = call_tool(
        &server,
        "bulk_boost_observations",
        json!({ "ids": [id], "boost": 1.5 }),
    )
    .await
    .expect_err("out-of-range boost must fail");
    assert_eq!(code, -32602);
}

#[tokio::test]
async fn timeline_around_anchor_orders_rows() {
    let Fixture { store, server } = fixture();
    let ids: Vec<i64> = (0..5)
        .map(|i| insert_scored(&store, &format!("obs {i}"), 0.5))
        .collect();

    let result = call_tool(
        &server,
        "timeline",
        json!({ "anchor_id": ids[2], "before": 1, "after": 1 }),
    )
    .await
    .expect("timeline");
    let rows = result["results"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    let got: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(got, vec![ids[1], ids[2], ids[3]]);
    let anchor = rows.iter().find(|r| r["id"] == ids[2]).unwrap();
    assert_eq!(anchor["is_anchor"], json!(true));
}

#[tokio::test]
async fn edit_tag_and_merge_flow() {
    let Fixture { store, server } = fixture();
    let target = insert_scored(&store, "canonical", 0.6);
    let source = insert_scored(&store, "duplicate", 0.4);

    let edited = call_tool(
        &server,
        "edit_observation",
        json!({ "id": target, "subtitle": "authoritative version", "scope": "global" }),
    )
    .await
    .expect("edit succeeds");
    assert_eq!(edited["subtitle"], "authoritative version");
    assert_eq!(edited["scope"], "global");

    let tagged = call_tool(
        &server,
        "tag_observation",
        json!({ "id": target, "concepts": ["gotcha", "not-in-vocabulary"], "mode": "add" }),
    )
    .await
    .expect("tag succeeds");
    assert_eq!(tagged["concepts"], json!(["gotcha"]));

    let merged = call_tool(
        &server,
        "merge_observations",
        json!({ "target_id": target, "source_ids": [source], "boost": 0.3 }),
    )
    .await
    .expect("merge succeeds");
    assert_eq!(merged["merged"], 1);

    let source_row = store.get_by_id(source).unwrap().unwrap();
    assert!(source_row.is_superseded);
    let target_row = store.get_by_id(target).unwrap().unwrap();
    assert!((target_row.importance_score - 0.9).abs() < 1e-9);

    let relationships = call_tool(
        &server,
        "get_observation_relationships",
        json!({ "id": target }),
    )
    .await
    .expect("graph succeeds");
    assert_eq!(relationships["edges"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_observation_is_a_tool_error() {
    let Fixture { server, .. } = fixture();
    let code = call_tool(&server, "get_observation", json!({ "id": 4242 }))
        .await
        .expect_err("absent row");
    assert_eq!(code, -32000);
}

#[tokio::test]
async fn maintenance_tools_report_disabled_state() {
    let Fixture { server, .. } = fixture();
    let code = call_tool(&server, "trigger_maintenance", json!({}))
        .await
        .expect_err("maintenance disabled");
    assert_eq!(code, -32602);
}

#[tokio::test]
async fn scoring_breakdown_reports_components() {
    let Fixture { store, server } = fixture();
    let id = insert_scored(&store, "decision row", 0.5);
    let result = call_tool(
        &server,
        "get_observation_scoring_breakdown",
        json!({ "id": id }),
    )
    .await
    .expect("breakdown");
    let breakdown = &result["breakdown"];
    assert!(breakdown["final_score"].as_f64().unwrap() > 0.0);
    assert!(breakdown["recency"].as_f64().unwrap() > 0.99);
}

#[tokio::test]
async fn export_respects_row_cap_and_dates() {
    let Fixture { store, server } = fixture();
    for index in 0..5 {
        insert_scored(&store, &format!("obs {index}"), 0.5);
    }
    let result = call_tool(
        &server,
        "export_observations",
        json!({ "project": "demo", "limit": 3 }),
    )
    .await
    .expect("export");
    assert_eq!(result["count"], 3);
    assert_eq!(result["observations"].as_array().unwrap().len(), 3);

    let result = call_tool(
        &server,
        "export_observations",
        json!({ "project": "demo", "dateStart": "2999-01-01T00:00:00Z" }),
    )
    .await
    .expect("export with future cutoff");
    assert_eq!(result["count"], 0);
}

#[tokio::test]
async fn memory_stats_counts_rows() {
    let Fixture { store, server } = fixture();
    insert_scored(&store, "row", 0.5);
    let result = call_tool(&server, "get_memory_stats", json!({ "project": "demo" }))
        .await
        .expect("stats");
    assert_eq!(result["observations"], 1);
    assert_eq!(result["session_summaries"], 0);
}
