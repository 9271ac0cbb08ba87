//! JSON-RPC tool server.
//!
//! A static registry of 35 tools served over three transports: a stdio
//! line protocol, SSE, and plain HTTP. All three feed the same
//! [`ToolServer::handle_request`].

pub mod handlers;
pub mod http;
pub mod protocol;
pub mod registry;
pub mod stdio;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
pub use registry::{ToolDefinition, all_tools};

use crate::config::Settings;
use crate::maintenance::MaintenanceService;
use crate::scoring::Scorer;
use crate::search::SearchManager;
use crate::storage::{
    ObservationStore, PatternStore, PromptStore, RelationStore, SummaryStore,
};
use crate::vector::VectorClient;
use crate::worker::DistillationWorker;
use crate::{Error, Result};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Instant;

/// Server name reported by `initialize`.
const SERVER_NAME: &str = "engram";

/// Guidance handed to clients in the `initialize` response.
const INSTRUCTIONS: &str = "Engram is a long-term memory service. Use `search` for ranked \
     retrieval, `timeline` for chronology around a moment, and the find_* \
     tools for precise lookups. Mutating tools are explicit: nothing you \
     read will change stored memories.";

/// The tool server. Holds every collaborator it dispatches into;
/// construction is explicit and there is no global state.
pub struct ToolServer {
    pub(crate) observations: Arc<dyn ObservationStore>,
    pub(crate) summaries: Arc<dyn SummaryStore>,
    pub(crate) prompts: Arc<dyn PromptStore>,
    pub(crate) relations: Arc<dyn RelationStore>,
    pub(crate) patterns: Arc<dyn PatternStore>,
    pub(crate) search: Arc<SearchManager>,
    pub(crate) scorer: Arc<Scorer>,
    pub(crate) vector: Arc<dyn VectorClient>,
    pub(crate) maintenance: Option<Arc<MaintenanceService>>,
    pub(crate) worker: Option<Arc<DistillationWorker>>,
    pub(crate) settings: Settings,
    pub(crate) started_at: Instant,
}

/// Collaborators for [`ToolServer::new`], named to keep construction
/// readable at the call site.
pub struct ToolServerDeps {
    /// Observation store.
    pub observations: Arc<dyn ObservationStore>,
    /// Summary store.
    pub summaries: Arc<dyn SummaryStore>,
    /// Prompt store.
    pub prompts: Arc<dyn PromptStore>,
    /// Relation store.
    pub relations: Arc<dyn RelationStore>,
    /// Pattern store.
    pub patterns: Arc<dyn PatternStore>,
    /// Search manager.
    pub search: Arc<SearchManager>,
    /// Scoring handle.
    pub scorer: Arc<Scorer>,
    /// Vector client.
    pub vector: Arc<dyn VectorClient>,
    /// Maintenance service, when enabled.
    pub maintenance: Option<Arc<MaintenanceService>>,
    /// Distillation worker, when ingestion runs in this process.
    pub worker: Option<Arc<DistillationWorker>>,
    /// Loaded settings.
    pub settings: Settings,
}

impl ToolServer {
    /// Wires a server from its collaborators.
    #[must_use]
    pub fn new(deps: ToolServerDeps) -> Self {
        Self {
            observations: deps.observations,
            summaries: deps.summaries,
            prompts: deps.prompts,
            relations: deps.relations,
            patterns: deps.patterns,
            search: deps.search,
            scorer: deps.scorer,
            vector: deps.vector,
            maintenance: deps.maintenance,
            worker: deps.worker,
            settings: deps.settings,
            started_at: Instant::now(),
        }
    }

    /// Handles one JSON-RPC request. Notifications return `None`.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            return None;
        }
        let id = request.id.clone();
        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.initialize_result()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": all_tools() })),
            "tools/call" => {
                let params = request.params.unwrap_or(Value::Null);
                match self.tools_call(params).await {
                    Ok(result) => JsonRpcResponse::success(id, result),
                    Err(error) => JsonRpcResponse::error(id, error.into()),
                }
            },
            method => JsonRpcResponse::error(id, JsonRpcError::method_not_found(method)),
        };
        Some(response)
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
            "instructions": INSTRUCTIONS,
        })
    }

    async fn tools_call(&self, params: Value) -> Result<Value> {
        let params = params
            .as_object()
            .ok_or_else(|| Error::BadRequest("tools/call params must be an object".to_string()))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::BadRequest("missing tool name".to_string()))?;
        let empty = Map::new();
        let arguments = params
            .get("arguments")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let result = self.dispatch(name, arguments).await?;
        let text = serde_json::to_string(&result)
            .map_err(|e| Error::transient("serialize", e))?;
        Ok(json!({
            "content": [{ "type": "text", "text": text }]
        }))
    }

    /// Dispatches one tool by name.
    async fn dispatch(&self, name: &str, args: &Map<String, Value>) -> Result<Value> {
        match name {
            // Search family
            "search" => handlers::search::search(self, args).await,
            "timeline" => handlers::search::timeline(self, args).await,
            "decisions" => handlers::search::decisions(self, args).await,
            "changes" => handlers::search::changes(self, args).await,
            "how_it_works" => handlers::search::how_it_works(self, args).await,
            "find_by_concept" | "get_observations_by_tag" => {
                handlers::search::find_by_concept(self, args)
            },
            "find_by_file" => handlers::search::find_by_file(self, args),
            "find_by_type" => handlers::search::find_by_type(self, args),
            "get_recent_context" => handlers::search::get_recent_context(self, args),
            "get_context_timeline" => handlers::search::get_context_timeline(self, args),
            "get_timeline_by_query" => handlers::search::timeline_by_query(self, args).await,
            // Relations and similarity
            "find_related_observations" => handlers::relations::find_related(self, args),
            "find_similar_observations" => handlers::relations::find_similar(self, args).await,
            "get_observation_relationships" => handlers::relations::relationships(self, args),
            // Store CRUD
            "get_observation" => handlers::crud::get_observation(self, args),
            "edit_observation" => handlers::crud::edit_observation(self, args),
            "tag_observation" => handlers::crud::tag_observation(self, args),
            "merge_observations" => handlers::crud::merge_observations(self, args),
            "bulk_delete_observations" => handlers::crud::bulk_delete(self, args).await,
            "bulk_mark_superseded" => handlers::crud::bulk_mark_superseded(self, args),
            "bulk_boost_observations" => handlers::crud::bulk_boost(self, args),
            // Analytics
            "get_memory_stats" => handlers::analytics::memory_stats(self, args).await,
            "get_observation_quality" => handlers::analytics::observation_quality(self, args),
            "suggest_consolidations" => handlers::analytics::suggest_consolidations(self, args),
            "get_temporal_trends" => handlers::analytics::temporal_trends(self, args),
            "get_data_quality_report" => handlers::analytics::data_quality_report(self, args),
            "explain_search_ranking" => {
                handlers::analytics::explain_search_ranking(self, args).await
            },
            "check_system_health" => handlers::analytics::system_health(self, args).await,
            "analyze_search_patterns" => handlers::analytics::search_patterns(self, args),
            "get_observation_scoring_breakdown" => {
                handlers::analytics::scoring_breakdown(self, args)
            },
            "analyze_observation_importance" => {
                handlers::analytics::observation_importance(self, args)
            },
            // Admin
            "trigger_maintenance" => handlers::admin::trigger_maintenance(self, args),
            "get_maintenance_stats" => handlers::admin::maintenance_stats(self, args),
            "export_observations" => handlers::admin::export_observations(self, args),
            other => Err(Error::transient("tools_call", format!("unknown tool: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::search::SearchConfig;
    use crate::storage::SqliteStore;
    use crate::vector::InMemoryVectorClient;

    fn test_server() -> ToolServer {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let vector: Arc<dyn VectorClient> = Arc::new(InMemoryVectorClient::new());
        let search = Arc::new(SearchManager::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::clone(&vector),
            SearchConfig::default(),
        ));
        ToolServer::new(ToolServerDeps {
            observations: store.clone(),
            summaries: store.clone(),
            prompts: store.clone(),
            relations: store.clone(),
            patterns: store,
            search,
            scorer: Arc::new(Scorer::default()),
            vector,
            maintenance: None,
            worker: None,
            settings: Settings::default(),
        })
    }

    fn request(method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: method.to_string(),
            params: Some(params),
        }
    }

    #[tokio::test]
    async fn test_initialize_shape() {
        let server = test_server();
        let response = server
            .handle_request(request("initialize", json!({})))
            .await
            .expect("response");
        let result = response.result.expect("result");
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "engram");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_tools_list_matches_registry() {
        let server = test_server();
        let response = server
            .handle_request(request("tools/list", json!({})))
            .await
            .expect("response");
        let tools = response.result.expect("result")["tools"]
            .as_array()
            .expect("array")
            .len();
        assert_eq!(tools, 35);
    }

    #[tokio::test]
    async fn test_unknown_method_and_tool_codes() {
        let server = test_server();
        let response = server
            .handle_request(request("tools/exec", json!({})))
            .await
            .expect("response");
        assert_eq!(response.error.expect("error").code, -32601);

        let response = server
            .handle_request(request(
                "tools/call",
                json!({ "name": "definitely_not_a_tool", "arguments": {} }),
            ))
            .await
            .expect("response");
        assert_eq!(response.error.expect("error").code, -32000);
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let server = test_server();
        let notification = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: "notifications/initialized".to_string(),
            params: None,
        };
        assert!(server.handle_request(notification).await.is_none());
    }

    #[tokio::test]
    async fn test_every_registered_tool_dispatches() {
        let server = test_server();
        for tool in all_tools() {
            let result = server.dispatch(&tool.name, &Map::new()).await;
            // Tools with required fields reject empty args; what none may
            // say is "unknown tool".
            if let Err(e) = result {
                assert!(
                    !e.to_string().contains("unknown tool"),
                    "{} fell through dispatch",
                    tool.name
                );
            }
        }
    }

    #[tokio::test]
    async fn test_bad_params_code() {
        let server = test_server();
        let response = server
            .handle_request(request(
                "tools/call",
                json!({ "name": "bulk_boost_observations", "arguments": { "ids": [1], "boost": 5.0 } }),
            ))
            .await
            .expect("response");
        assert_eq!(response.error.expect("error").code, -32602);
    }
}
