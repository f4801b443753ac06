// crates/rlm-server/src/main.rs
//! rlm server binary.
//!
//! Starts an Axum HTTP server on the configured port, or — with `--mcp` —
//! runs the same tool surface over an stdio JSON-RPC transport instead. In
//! either mode it discovers sessions under the workspace root, brings the
//! inverted index up to date before accepting queries, then self-watches
//! the sessions directory for further changes.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;

use rlm_core::{list_sessions, Config};
use rlm_index::SearchIndex;
use rlm_maintainer::{IndexMaintainer, MaintainerSettings};
use rlm_server::indexing_state::{IndexingState, IndexingStatus};
use rlm_server::{create_app, run_mcp, start_watcher, AppState};

/// Recursive Language Model server — shared memory/session search over
/// Claude session transcripts, exposed over HTTP and MCP stdio.
#[derive(Parser, Debug)]
#[command(name = "rlm-server", version, about, long_about = None)]
struct Cli {
    /// Workspace root containing a `sessions/` directory and memory files.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Path to `rlm.toml`. Defaults to `<workspace>/rlm.toml`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run as an MCP stdio server instead of serving HTTP.
    #[arg(long)]
    mcp: bool,

    /// Override the HTTP port from configuration.
    #[arg(long)]
    port: Option<u16>,
}

/// Bring `maintainer`'s on-disk index up to date with every discovered
/// session, updating `indexing`'s counters as it goes. A single session's
/// update failing is logged and skipped — a corrupt transcript must not
/// block every other session from getting indexed (§7's corruption policy).
async fn build_index(
    maintainer: &IndexMaintainer,
    workspace_root: &std::path::Path,
    indexing: &IndexingState,
) -> Result<()> {
    indexing.set_status(IndexingStatus::Building);

    let sessions = list_sessions(workspace_root)
        .await
        .context("discovering sessions")?;
    indexing.set_sessions_total(sessions.len());

    for session in &sessions {
        let path = PathBuf::from(&session.path);
        match maintainer.update_index(&session.session_id, &path).await {
            Ok(result) => {
                tracing::debug!(
                    session_id = %session.session_id,
                    messages_added = result.messages_added,
                    "indexed session"
                );
                indexing.increment_indexed();
            }
            Err(e) => {
                tracing::warn!(session_id = %session.session_id, error = %e, "failed to index session, skipping");
                indexing.set_error(format!("{}: {e}", session.session_id));
            }
        }
    }

    indexing.set_status(IndexingStatus::Ready);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    rlm_core::init_tracing();

    let cli = Cli::parse();

    let workspace_root = match &cli.workspace {
        Some(p) => p.clone(),
        None => std::env::current_dir().context("resolving current directory")?,
    };
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| workspace_root.join("rlm.toml"));

    let mut config = Config::load(&config_path).context("loading configuration")?;
    config.workspace_root = workspace_root.clone();
    if let Some(port) = cli.port {
        config.server_port = port;
    }

    let index_path = config
        .index_path
        .clone()
        .or_else(rlm_core::paths::default_index_path)
        .unwrap_or_else(|| workspace_root.join(".rlm-index.json"));

    let index = SearchIndex::open_recovering(&index_path)
        .await
        .context("opening index")?;

    let maintainer_settings = MaintainerSettings {
        debounce: std::time::Duration::from_secs(config.maintainer.debounce_secs),
        cooldown: std::time::Duration::from_secs(config.maintainer.cooldown_secs),
        lock_timeout: std::time::Duration::from_secs(config.maintainer.lock_timeout_secs),
        queue_capacity: config.maintainer.queue_capacity,
    };
    let maintainer = IndexMaintainer::new(index_path.clone(), maintainer_settings);

    let indexing = Arc::new(IndexingState::new());
    let state = AppState::new_with_indexing(
        workspace_root.clone(),
        config.clone(),
        index,
        Arc::clone(&maintainer),
        Arc::clone(&indexing),
    );

    // Bring the index current before accepting queries. A cold workspace
    // (no sessions yet) finishes instantly and leaves status "ready".
    build_index(&maintainer, &workspace_root, &indexing).await?;
    *state.index.write().await = SearchIndex::open_recovering(&index_path)
        .await
        .context("reopening index after initial build")?;

    let _watcher = start_watcher(Arc::clone(&state));

    if cli.mcp {
        tracing::info!("starting MCP stdio transport");
        run_mcp(state).await;
        return Ok(());
    }

    let app = create_app(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    let startup = Instant::now();
    tracing::info!(addr = %addr, workspace = %workspace_root.display(), "rlm-server listening");
    eprintln!("rlm-server listening on http://{addr} (startup {:.0?})", startup.elapsed());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler, Ctrl-C only");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("received Ctrl-C, shutting down");
    }
}
