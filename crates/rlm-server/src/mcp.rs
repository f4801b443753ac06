// crates/rlm-server/src/mcp.rs
//! MCP stdio JSON-RPC loop sharing the same [`ToolDispatcher`] the HTTP
//! transport uses, so tool behaviour cannot drift between the two.

use crate::state::AppState;
use crate::tools::ToolDispatcher;
use std::io::{self, BufRead, Write as IoWrite};
use std::sync::Arc;

const PROTOCOL_VERSION: &str = "2025-06-18";

fn tool_definitions() -> serde_json::Value {
    let ro = serde_json::json!({
        "readOnlyHint": true,
        "destructiveHint": false,
        "idempotentHint": true,
        "openWorldHint": false
    });

    serde_json::json!([
        {
            "name": "memory_search",
            "annotations": ro,
            "description": "Search indexed session transcripts and memory files, returning matched snippets.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "maxResults": { "type": "integer" },
                    "minScore": { "type": "number" }
                },
                "required": ["query"]
            }
        },
        {
            "name": "memory_search_refs",
            "annotations": ro,
            "description": "Search and return references (path + line ranges) instead of expanded text. Supports an optional bounded recursive hop.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "maxResults": { "type": "integer" },
                    "minScore": { "type": "number" },
                    "previewChars": { "type": "integer" },
                    "recursive": { "type": "object" }
                },
                "required": ["query"]
            }
        },
        {
            "name": "memory_get",
            "annotations": ro,
            "description": "Read a single file window by path and line range.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "from": { "type": "integer" },
                    "lines": { "type": "integer" }
                },
                "required": ["path"]
            }
        },
        {
            "name": "memory_expand",
            "annotations": ro,
            "description": "Expand a batch of refs into bounded text windows.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "refs": { "type": "array" },
                    "defaultLines": { "type": "integer" },
                    "maxRefs": { "type": "integer" },
                    "maxChars": { "type": "integer" }
                },
                "required": ["refs"]
            }
        },
        {
            "name": "rlm_search",
            "annotations": ro,
            "description": "Search via the recursive retrieval engine, returning matched snippets plus timing metadata.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "maxResults": { "type": "integer" }
                },
                "required": ["query"]
            }
        },
        {
            "name": "rlm_search_refs",
            "annotations": ro,
            "description": "Search via the recursive retrieval engine, always running the bounded multi-hop loop, returning refs plus timing metadata.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "maxResults": { "type": "integer" },
                    "previewChars": { "type": "integer" }
                },
                "required": ["query"]
            }
        },
        {
            "name": "rlm_expand",
            "annotations": ro,
            "description": "Expand a batch of refs into bounded text windows via the recursive engine's defaults.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "refs": { "type": "array" },
                    "defaultLines": { "type": "integer" },
                    "maxRefs": { "type": "integer" },
                    "maxChars": { "type": "integer" }
                },
                "required": ["refs"]
            }
        }
    ])
}

/// Process a single JSON-RPC request and return the response. Returns `None`
/// for notifications (no `id` field) — the caller must not write a response.
async fn dispatch_jsonrpc(dispatcher: &ToolDispatcher, msg: &serde_json::Value) -> Option<serde_json::Value> {
    let method = msg["method"].as_str().unwrap_or("");
    let id = msg.get("id").cloned();

    if id.is_none() || method.starts_with("notifications/") {
        return None;
    }

    let response = match method {
        "initialize" => {
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": {
                        "name": "rlm-server",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }
            })
        }
        "tools/list" => {
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "tools": tool_definitions() }
            })
        }
        "tools/call" => {
            let tool_name = msg["params"]["name"].as_str().unwrap_or("");
            let arguments = msg["params"].get("arguments").cloned().unwrap_or(serde_json::json!({}));

            match dispatcher.dispatch(tool_name, arguments).await {
                Ok(result) => serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "content": [{ "type": "text", "text": result.to_string() }],
                        "isError": false
                    }
                }),
                Err(e) => serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "content": [{ "type": "text", "text": format!("\u{26a0} Error: {e}") }],
                        "isError": true
                    }
                }),
            }
        }
        "ping" => serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": {} }),
        _ => serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": "Method not found" }
        }),
    };

    Some(response)
}

/// Run the MCP stdio server loop, reading JSON-RPC from stdin and writing
/// responses to stdout, one line per message.
pub async fn run_mcp(state: Arc<AppState>) {
    let dispatcher = ToolDispatcher::new(state);
    let stdin = io::stdin();
    let stdout = io::stdout();
    let reader = stdin.lock();
    let mut initialized = false;

    tracing::info!("MCP stdio server ready");

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let msg: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(_) => {
                let err = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": { "code": -32700, "message": "Parse error" }
                });
                let mut out = stdout.lock();
                let _ = writeln!(out, "{}", err);
                let _ = out.flush();
                continue;
            }
        };

        let method = msg["method"].as_str().unwrap_or("");

        if method == "notifications/initialized" || method == "notifications/cancelled" {
            continue;
        }

        if !initialized && method != "initialize" && method != "ping" {
            if let Some(id) = msg.get("id").cloned() {
                let err = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {
                        "code": -32002,
                        "message": "Server not initialized. Send 'initialize' first."
                    }
                });
                let mut out = stdout.lock();
                let _ = writeln!(out, "{}", serde_json::to_string(&err).unwrap());
                let _ = out.flush();
            }
            continue;
        }

        if let Some(response) = dispatch_jsonrpc(&dispatcher, &msg).await {
            if method == "initialize" {
                initialized = true;
            }
            let mut out = stdout.lock();
            let _ = writeln!(out, "{}", serde_json::to_string(&response).unwrap());
            let _ = out.flush();
        }
    }
}
