// crates/rlm-server/src/tools.rs
//! The shared tool surface: seven operations dispatched identically whether
//! they arrive over the stdio JSON-RPC loop ([`crate::mcp`]) or the HTTP
//! route (`POST /api/tools/:op`). `memory_*` operations run the plain
//! refs-first path (optionally recursive, hook-augmentable); `rlm_*`
//! operations always run the bounded recursive loop and report `meta`
//! instead of firing hooks.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use rlm_core::types::{Ref, RecursiveConfig};
use rlm_expand::ExpandOptions;
use rlm_index::query::{search, SearchOptions};
use rlm_orchestrator::SearchRefsOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Instant;

const DEFAULT_PREVIEW_CHARS: usize = 140;
const DEFAULT_EXPAND_LINES: usize = 60;
const DEFAULT_MAX_REFS: usize = 2;
const DEFAULT_MAX_CHARS: usize = 8000;

type HookFuture = Pin<Box<dyn Future<Output = Value> + Send>>;
/// A registered post-hook: receives the tool's JSON result, returns a
/// (possibly augmented) JSON result. Hooks run as a sequenced async fold,
/// never in parallel, per the cooperative hook-chain design.
pub type HookFn = Arc<dyn Fn(Value) -> HookFuture + Send + Sync>;

/// Dispatches the seven tool-surface operations against one [`AppState`].
pub struct ToolDispatcher {
    state: Arc<AppState>,
    post_hooks: StdRwLock<HashMap<&'static str, Vec<HookFn>>>,
}

impl ToolDispatcher {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state, post_hooks: StdRwLock::new(HashMap::new()) }
    }

    /// Register a handler for `tool:memory_search_refs:post` or
    /// `tool:memory_expand:post`. Handlers fire in registration order.
    pub fn register_hook(&self, event: &'static str, hook: HookFn) {
        self.post_hooks.write().unwrap().entry(event).or_default().push(hook);
    }

    async fn run_post_hooks(&self, event: &'static str, mut value: Value) -> Value {
        let hooks: Vec<HookFn> = self.post_hooks.read().unwrap().get(event).cloned().unwrap_or_default();
        for hook in hooks {
            value = hook(value).await;
        }
        value
    }

    pub async fn dispatch(&self, op: &str, params: Value) -> ApiResult<Value> {
        match op {
            "memory_search" => self.memory_search(params).await,
            "memory_search_refs" => self.memory_search_refs(params).await,
            "memory_get" => self.memory_get(params).await,
            "memory_expand" => self.memory_expand(params).await,
            "rlm_search" => self.rlm_search(params).await,
            "rlm_search_refs" => self.rlm_search_refs(params).await,
            "rlm_expand" => self.rlm_expand(params).await,
            other => Err(ApiError::BadRequest(format!("unknown tool operation: {other}"))),
        }
    }

    async fn memory_search(&self, params: Value) -> ApiResult<Value> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Params {
            query: String,
            #[serde(default = "default_max_results")]
            max_results: usize,
        }
        let params: Params = parse_params(params)?;

        let guard = self.state.index.read().await;
        let opts = SearchOptions { max_results: params.max_results, ..Default::default() };
        let response = search(&guard.doc, &self.state.workspace_root, &params.query, &opts).await;

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct ResultItem {
            path: String,
            start_line: usize,
            end_line: usize,
            score: f64,
            snippet: String,
            source: &'static str,
            session_id: String,
        }

        let results: Vec<ResultItem> = response
            .results
            .iter()
            .flat_map(|session| {
                session.matches.iter().map(move |m| ResultItem {
                    path: session.path.clone(),
                    start_line: m.line_number,
                    end_line: m.line_number,
                    score: m.match_score,
                    snippet: m.snippet.clone(),
                    source: "sessions",
                    session_id: session.session_id.clone(),
                })
            })
            .collect();

        let fallback = matches!(response.search_path, rlm_index::types::SearchPath::Fallback);

        Ok(serde_json::json!({
            "results": results,
            "provider": "memory",
            "model": Option::<String>::None,
            "fallback": fallback,
        }))
    }

    async fn memory_search_refs(&self, params: Value) -> ApiResult<Value> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Params {
            query: String,
            #[serde(default = "default_max_results")]
            max_results: usize,
            min_score: Option<f64>,
            #[serde(default = "default_preview_chars")]
            preview_chars: usize,
            recursive: Option<RecursiveConfig>,
        }
        let params: Params = parse_params(params)?;

        let guard = self.state.index.read().await;
        let opts = SearchRefsOptions {
            max_results: params.max_results,
            min_score: params.min_score,
            preview_chars: params.preview_chars,
            recursive: params.recursive,
        };
        let result = self.state.orchestrator.search_refs(&guard.doc, &params.query, &opts).await;
        drop(guard);

        let value = serde_json::to_value(&result).map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(self.run_post_hooks("tool:memory_search_refs:post", value).await)
    }

    async fn memory_get(&self, params: Value) -> ApiResult<Value> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Params {
            path: String,
            from: Option<usize>,
            lines: Option<usize>,
        }
        let params: Params = parse_params(params)?;
        let from = params.from.unwrap_or(1);
        let end_line = params.lines.map(|n| from + n.saturating_sub(1)).unwrap_or(from.saturating_sub(1));

        let r = Ref {
            path: params.path,
            start_line: from,
            end_line,
            score: 1.0,
            source: "memory".to_string(),
            preview: String::new(),
            session_id: None,
            hop: None,
        };
        let expand_opts = ExpandOptions {
            default_lines: params.lines.unwrap_or(self.state.config.expand.default_lines),
            max_refs: 1,
            max_chars: self.state.config.expand.max_chars_per_ref,
            max_total_chars: None,
        };
        let outcome = rlm_expand::expand(&self.state.workspace_root, std::slice::from_ref(&r), &expand_opts).await;

        match outcome.results.into_iter().next() {
            Some(window) => Ok(serde_json::json!({
                "path": window.path,
                "from": window.from,
                "lines": window.lines,
                "text": window.text,
            })),
            None => {
                let message = outcome.errors.first().map(|e| e.error.clone()).unwrap_or_else(|| "nothing expanded".to_string());
                Err(ApiError::BadRequest(message))
            }
        }
    }

    async fn memory_expand(&self, params: Value) -> ApiResult<Value> {
        let (refs, opts) = parse_expand_params(&params, self.state.config.expand.default_lines, DEFAULT_MAX_REFS, self.state.config.expand.max_chars_per_ref)?;
        let outcome = rlm_expand::expand(&self.state.workspace_root, &refs, &opts).await;

        Ok(serde_json::json!({
            "results": outcome.results,
            "budget": outcome.budget,
        }))
    }

    async fn rlm_search(&self, params: Value) -> ApiResult<Value> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Params {
            query: String,
            #[serde(default = "default_max_results")]
            max_results: usize,
        }
        let params: Params = parse_params(params)?;

        let guard = self.state.index.read().await;
        let opts = SearchOptions { max_results: params.max_results, ..Default::default() };
        let timer = Instant::now();
        let response = search(&guard.doc, &self.state.workspace_root, &params.query, &opts).await;
        let _ = timer;

        Ok(serde_json::json!({
            "results": response.results,
            "provider": "rlm",
            "model": Option::<String>::None,
            "meta": {
                "timings": { "queryTimeMs": response.query_time_ms, "totalTimeMs": response.total_time_ms },
                "searchPath": response.search_path,
            },
        }))
    }

    async fn rlm_search_refs(&self, params: Value) -> ApiResult<Value> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Params {
            query: String,
            #[serde(default = "default_max_results")]
            max_results: usize,
            #[serde(default = "default_preview_chars")]
            preview_chars: usize,
        }
        let params: Params = parse_params(params)?;

        let guard = self.state.index.read().await;
        let recursive = RecursiveConfig { enabled: true, ..self.state.config.recursive.clone() };
        let opts = SearchRefsOptions {
            max_results: params.max_results,
            min_score: None,
            preview_chars: params.preview_chars,
            recursive: Some(recursive),
        };
        let timer = Instant::now();
        let result = self.state.orchestrator.search_refs(&guard.doc, &params.query, &opts).await;
        let elapsed_ms = timer.elapsed().as_secs_f64() * 1000.0;

        Ok(serde_json::json!({
            "query": result.query,
            "refs": result.refs,
            "provider": "rlm",
            "model": result.model,
            "meta": {
                "timings": { "totalTimeMs": elapsed_ms },
                "searchPath": if result.provider == "disabled" { "fallback" } else { "index" },
            },
        }))
    }

    async fn rlm_expand(&self, params: Value) -> ApiResult<Value> {
        let (refs, opts) = parse_expand_params(&params, DEFAULT_EXPAND_LINES, DEFAULT_MAX_REFS, DEFAULT_MAX_CHARS)?;
        let outcome = rlm_expand::expand(&self.state.workspace_root, &refs, &opts).await;
        Ok(serde_json::json!({ "results": outcome.results }))
    }
}

fn default_max_results() -> usize {
    20
}

fn default_preview_chars() -> usize {
    DEFAULT_PREVIEW_CHARS
}

fn parse_params<T: for<'de> Deserialize<'de>>(value: Value) -> ApiResult<T> {
    serde_json::from_value(value).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Shared parsing for `memory_expand`/`rlm_expand`: each input ref entry may
/// carry either `{startLine, endLine}` or the `{from, lines}` compatibility
/// alias.
fn parse_expand_params(
    params: &Value,
    default_default_lines: usize,
    default_max_refs: usize,
    default_max_chars: usize,
) -> ApiResult<(Vec<Ref>, ExpandOptions)> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RefEntry {
        path: String,
        start_line: Option<usize>,
        end_line: Option<usize>,
        from: Option<usize>,
        lines: Option<usize>,
    }
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Params {
        refs: Vec<RefEntry>,
        default_lines: Option<usize>,
        max_refs: Option<usize>,
        max_chars: Option<usize>,
    }
    let params: Params = parse_params(params.clone())?;
    if params.refs.is_empty() {
        return Err(ApiError::BadRequest("refs must not be empty".to_string()));
    }

    let refs = params
        .refs
        .into_iter()
        .map(|entry| {
            let start_line = entry.start_line.or(entry.from).unwrap_or(1);
            let end_line = entry
                .end_line
                .or_else(|| entry.lines.map(|n| start_line + n.saturating_sub(1)))
                .unwrap_or(start_line.saturating_sub(1));
            Ref {
                path: entry.path,
                start_line,
                end_line,
                score: 1.0,
                source: "memory".to_string(),
                preview: String::new(),
                session_id: None,
                hop: None,
            }
        })
        .collect();

    let opts = ExpandOptions {
        default_lines: params.default_lines.unwrap_or(default_default_lines),
        max_refs: params.max_refs.unwrap_or(default_max_refs),
        max_chars: params.max_chars.unwrap_or(default_max_chars),
        max_total_chars: None,
    };
    Ok((refs, opts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing_state::IndexingState;
    use rlm_index::indexer::apply_messages;
    use rlm_index::types::IndexDocument;
    use rlm_core::types::{Role, TranscriptMessage};
    use rlm_maintainer::{IndexMaintainer, MaintainerSettings};

    fn msg(line: usize, text: &str) -> TranscriptMessage {
        TranscriptMessage { role: Role::User, text: text.to_string(), timestamp: None, line_number: line }
    }

    async fn test_dispatcher() -> (tempfile::TempDir, ToolDispatcher) {
        let dir = tempfile::tempdir().unwrap();
        let sessions_dir = dir.path().join("sessions");
        tokio::fs::create_dir_all(&sessions_dir).await.unwrap();
        tokio::fs::write(sessions_dir.join("s1.jsonl"), "{}\n").await.unwrap();

        let mut doc = IndexDocument::new();
        apply_messages(&mut doc, "s1", "sessions/s1.jsonl", None, &[msg(1, "cache invalidation bug")]);

        let index_path = dir.path().join("index.json");
        let mut index = rlm_index::SearchIndex::open(&index_path).await.unwrap();
        index.doc = doc;
        let maintainer = IndexMaintainer::new(index_path, MaintainerSettings::default());

        let state = crate::state::AppState::new_with_indexing(
            dir.path().to_path_buf(),
            rlm_core::Config::default(),
            index,
            maintainer,
            Arc::new(IndexingState::new()),
        );
        (dir, ToolDispatcher::new(state))
    }

    #[tokio::test]
    async fn memory_search_finds_indexed_term() {
        let (_dir, dispatcher) = test_dispatcher().await;
        let result = dispatcher
            .dispatch("memory_search", serde_json::json!({"query": "cache invalidation"}))
            .await
            .unwrap();
        assert!(result["results"].as_array().unwrap().len() > 0);
    }

    #[tokio::test]
    async fn memory_search_reports_source_kind_not_session_id() {
        let (_dir, dispatcher) = test_dispatcher().await;
        let result = dispatcher
            .dispatch("memory_search", serde_json::json!({"query": "cache invalidation"}))
            .await
            .unwrap();
        let first = &result["results"][0];
        assert_eq!(first["source"], "sessions");
        assert_eq!(first["sessionId"], "s1");
    }

    #[tokio::test]
    async fn memory_search_refs_returns_refs_with_provider() {
        let (_dir, dispatcher) = test_dispatcher().await;
        let result = dispatcher
            .dispatch("memory_search_refs", serde_json::json!({"query": "cache invalidation"}))
            .await
            .unwrap();
        assert!(result["refs"].as_array().unwrap().len() > 0);
        assert_eq!(result["provider"], "index");
    }

    #[tokio::test]
    async fn memory_get_reads_a_file_window() {
        let (dir, dispatcher) = test_dispatcher().await;
        tokio::fs::write(dir.path().join("notes.md"), "a\nb\nc\nd\n").await.unwrap();
        let result = dispatcher
            .dispatch("memory_get", serde_json::json!({"path": "notes.md", "from": 2, "lines": 2}))
            .await
            .unwrap();
        assert_eq!(result["text"], "b\nc");
    }

    #[tokio::test]
    async fn memory_expand_rejects_empty_refs() {
        let (_dir, dispatcher) = test_dispatcher().await;
        let err = dispatcher.dispatch("memory_expand", serde_json::json!({"refs": []})).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn rlm_expand_accepts_from_lines_alias() {
        let (dir, dispatcher) = test_dispatcher().await;
        tokio::fs::write(dir.path().join("notes.md"), "a\nb\nc\n").await.unwrap();
        let result = dispatcher
            .dispatch("rlm_expand", serde_json::json!({"refs": [{"path": "notes.md", "from": 1, "lines": 2}]}))
            .await
            .unwrap();
        assert_eq!(result["results"][0]["text"], "a\nb");
    }

    #[tokio::test]
    async fn unknown_operation_is_bad_request() {
        let (_dir, dispatcher) = test_dispatcher().await;
        let err = dispatcher.dispatch("not_a_real_op", serde_json::json!({})).await;
        assert!(matches!(err, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn registered_hook_can_augment_refs() {
        let (_dir, dispatcher) = test_dispatcher().await;
        dispatcher.register_hook(
            "tool:memory_search_refs:post",
            Arc::new(|mut value: Value| {
                Box::pin(async move {
                    value["augmentedRefs"] = serde_json::json!([]);
                    value
                })
            }),
        );
        let result = dispatcher
            .dispatch("memory_search_refs", serde_json::json!({"query": "cache invalidation"}))
            .await
            .unwrap();
        assert!(result.get("augmentedRefs").is_some());
    }
}
