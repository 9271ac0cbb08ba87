//! HTTP transports: SSE and streamable POST.
//!
//! - `POST /` — one JSON-RPC message per body, synchronous reply.
//!   Notifications return `204 No Content`; a parse failure returns a
//!   JSON-RPC error payload.
//! - `GET /sse` — opens an event stream. The first event names the
//!   message endpoint (`/message?sessionId=…`); each dispatched response
//!   then arrives as a `message` event.
//! - `POST /message?sessionId=…` — decodes one request, dispatches, and
//!   enqueues the response for SSE delivery. Returns `202 Accepted`.
//!
//! Session channels are bounded (32); when a channel is full the response
//! is dropped with a warning, which is acceptable because the POST caller
//! already got its `202`.

use super::ToolServer;
use super::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures::StreamExt;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

/// Per-session response buffer.
const SESSION_CHANNEL_CAPACITY: usize = 32;

struct AppState {
    server: Arc<ToolServer>,
    sessions: Mutex<HashMap<String, mpsc::Sender<JsonRpcResponse>>>,
}

impl AppState {
    fn insert_session(&self, id: String, tx: mpsc::Sender<JsonRpcResponse>) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(id, tx);
        }
    }

    fn session(&self, id: &str) -> Option<mpsc::Sender<JsonRpcResponse>> {
        self.sessions.lock().ok()?.get(id).cloned()
    }

    fn clear_sessions(&self) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.clear();
        }
    }
}

/// Serves both HTTP transports until the token fires.
pub async fn run(
    server: Arc<ToolServer>,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let state = Arc::new(AppState {
        server,
        sessions: Mutex::new(HashMap::new()),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let app = Router::new()
        .route("/", post(handle_streamable))
        .route("/sse", get(handle_sse))
        .route("/message", post(handle_message))
        .layer(cors)
        .with_state(Arc::clone(&state));

    info!("http transport listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    // Dropping the senders ends every open SSE stream.
    state.clear_sessions();
    info!("http transport stopped");
    Ok(())
}

/// `POST /` — streamable transport.
async fn handle_streamable(State(state): State<Arc<AppState>>, body: String) -> Response {
    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!("unparseable streamable request: {e}");
            let error = JsonRpcResponse::error(None, JsonRpcError::parse_error());
            return json_response(StatusCode::OK, &error);
        },
    };
    match state.server.handle_request(request).await {
        Some(response) => json_response(StatusCode::OK, &response),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

fn json_response(status: StatusCode, response: &JsonRpcResponse) -> Response {
    match serde_json::to_string(response) {
        Ok(body) => (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!("response serialization failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}

/// `GET /sse` — open an event stream for a fresh session.
async fn handle_sse(State(state): State<Arc<AppState>>) -> Response {
    let session_id = uuid::Uuid::new_v4().simple().to_string();
    let (tx, rx) = mpsc::channel::<JsonRpcResponse>(SESSION_CHANNEL_CAPACITY);
    state.insert_session(session_id.clone(), tx);
    info!(session_id, "sse session opened");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/message?sessionId={session_id}"));
    let responses = futures::stream::unfold(rx, |mut rx| async move {
        let response = rx.recv().await?;
        let event = match serde_json::to_string(&response) {
            Ok(json) => Event::default().event("message").data(json),
            Err(e) => {
                warn!("sse serialization failed: {e}");
                Event::default().event("message").data("{}")
            },
        };
        Some((event, rx))
    });
    let stream = futures::stream::once(async move { endpoint })
        .chain(responses)
        .map(Ok::<Event, std::convert::Infallible>);

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[derive(serde::Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// `POST /message?sessionId=…` — dispatch and enqueue for SSE delivery.
async fn handle_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    let Some(session_id) = query.session_id.filter(|id| !id.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing sessionId").into_response();
    };
    let Some(tx) = state.session(&session_id) else {
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    };

    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!("unparseable message request: {e}");
            let error = JsonRpcResponse::error(None, JsonRpcError::parse_error());
            let _ = tx.try_send(error);
            return StatusCode::ACCEPTED.into_response();
        },
    };

    match state.server.handle_request(request).await {
        Some(response) => {
            if tx.try_send(response).is_err() {
                warn!(session_id, "sse channel full, dropping response");
            }
            StatusCode::ACCEPTED.into_response()
        },
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
