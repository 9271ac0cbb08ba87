//! Stdio line transport.
//!
//! One JSON-RPC message per line on stdin, one response per line on
//! stdout. Empty lines are ignored; malformed lines get a parse-error
//! response. The scanner loop is cancel-aware and exits on EOF.

use super::ToolServer;
use super::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Minimal response emitted when even error serialization fails, so the
/// client never hangs waiting on a line.
const FALLBACK_ERROR: &str =
    r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#;

/// Serves the line protocol until stdin closes or the token fires.
pub async fn run(server: Arc<ToolServer>, shutdown: CancellationToken) -> std::io::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => {
                debug!("stdio transport stopping");
                break;
            },
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break }; // EOF
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => server.handle_request(request).await,
            Err(e) => {
                debug!("unparseable request line: {e}");
                Some(JsonRpcResponse::error(None, JsonRpcError::parse_error()))
            },
        };

        if let Some(response) = response {
            let wire = serde_json::to_string(&response).unwrap_or_else(|e| {
                error!("response serialization failed: {e}");
                FALLBACK_ERROR.to_string()
            });
            stdout.write_all(wire.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
