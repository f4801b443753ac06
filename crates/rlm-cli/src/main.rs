// crates/rlm-cli/src/main.rs
//! `rlm` — evaluation harness and index maintenance driven from outside the
//! server process.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use rlm_core::types::RecursiveConfig;
use rlm_core::Config;
use rlm_eval::{
    modes::Mode, sweep::select_best, sweep::SweepGrid, sweep::SweepSummary, Defaults, GroundTruth, Report,
    SuiteOptions,
};
use rlm_index::SearchIndex;
use rlm_maintainer::{IndexMaintainer, MaintainerSettings};
use rlm_orchestrator::Orchestrator;

/// Recursive Language Model command-line tool: evaluation harness and index
/// maintenance for the `rlm-server` workspace.
#[derive(Parser, Debug)]
#[command(name = "rlm", version, about, long_about = None, propagate_version = true)]
struct Cli {
    /// Workspace root containing `sessions/` and memory files.
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Path to `rlm.toml`. Defaults to `<workspace>/rlm.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format for machine-readable commands.
    #[arg(long, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the ground-truth evaluation harness.
    Eval {
        #[command(subcommand)]
        action: EvalAction,
    },
    /// Index maintenance commands.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
    /// Start the HTTP server (equivalent to running `rlm-server`).
    Serve {
        /// Override the configured HTTP port.
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand, Debug)]
enum EvalAction {
    /// Run ground-truth cases across every evaluation mode, or sweep the
    /// recursive config grid with `--sweep`.
    #[command(after_help = r#"Examples:
  rlm eval run --cases cases.json --out report.json
  rlm eval run --cases cases.json --out report.json --resume report.json
  rlm eval run --cases cases.json --out report.json --sweep --max-configs 8
"#)]
    Run {
        /// Path to the ground-truth cases JSON file.
        #[arg(long)]
        cases: PathBuf,

        /// Path to write the report JSON.
        #[arg(long)]
        out: PathBuf,

        /// Resume from an existing report, skipping suites already present.
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Sweep the recursive config grid instead of a single suite run.
        #[arg(long)]
        sweep: bool,

        /// Cap the number of sweep cells actually run (deterministic order).
        #[arg(long, default_value = "8")]
        max_configs: usize,
    },
}

#[derive(Subcommand, Debug)]
enum IndexAction {
    /// Rebuild the index from every discovered session, from scratch.
    Rebuild,
    /// Print the index lifecycle status and session counts.
    Status,
}

fn init_logging(verbose: bool) {
    if verbose {
        std::env::set_var("RUST_LOG", std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()));
    }
    rlm_core::init_tracing();
}

fn resolve_config(workspace_root: &std::path::Path, config_path: &Option<PathBuf>) -> Result<Config> {
    let path = config_path
        .clone()
        .unwrap_or_else(|| workspace_root.join("rlm.toml"));
    let mut cfg = Config::load(&path).context("loading configuration")?;
    cfg.workspace_root = workspace_root.to_path_buf();
    Ok(cfg)
}

fn resolve_index_path(config: &Config, workspace_root: &std::path::Path) -> PathBuf {
    config
        .index_path
        .clone()
        .or_else(rlm_core::paths::default_index_path)
        .unwrap_or_else(|| workspace_root.join(".rlm-index.json"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let workspace_root = match &cli.workspace {
        Some(p) => p.clone(),
        None => std::env::current_dir().context("resolving current directory")?,
    };
    let config = resolve_config(&workspace_root, &cli.config)?;
    let index_path = resolve_index_path(&config, &workspace_root);

    match cli.command {
        Commands::Eval { action } => run_eval(action, &workspace_root, &index_path).await,
        Commands::Index { action } => run_index(action, &config, &workspace_root, &index_path, cli.format).await,
        Commands::Serve { port } => run_serve(config, workspace_root, index_path, port).await,
    }
}

async fn run_eval(action: EvalAction, workspace_root: &std::path::Path, index_path: &std::path::Path) -> Result<()> {
    match action {
        EvalAction::Run { cases, out, resume, sweep, max_configs } => {
            let ground_truth_bytes = tokio::fs::read(&cases)
                .await
                .with_context(|| format!("reading ground truth cases from {}", cases.display()))?;
            let ground_truth: GroundTruth =
                serde_json::from_slice(&ground_truth_bytes).context("parsing ground truth cases")?;

            let index = SearchIndex::open(index_path).await.context("opening index")?;
            let orchestrator = Orchestrator::new(workspace_root.to_path_buf());

            let resume_path = resume.unwrap_or_else(|| out.clone());
            let mut report = Report::load_for_resume(&resume_path)
                .await
                .context("loading report for resume")?
                .unwrap_or_else(|| {
                    Report::new(
                        &ground_truth,
                        Defaults { max_results: 20, preview_chars: 200 },
                        chrono::Utc::now().to_rfc3339(),
                    )
                });

            if sweep {
                run_sweep(&orchestrator, &index, workspace_root, &ground_truth, &mut report, max_configs).await;
            } else {
                let label = "default";
                if report.has_suite(label) {
                    tracing::info!(label, "suite already in report, skipping (resume)");
                } else {
                    let opts = SuiteOptions {
                        label: label.to_string(),
                        max_results: 20,
                        preview_chars: 200,
                        recursive: RecursiveConfig { enabled: true, ..RecursiveConfig::default() },
                    };
                    let suite = rlm_eval::run_suite(
                        &orchestrator,
                        &index.doc,
                        workspace_root,
                        &ground_truth,
                        &[Mode::Baseline, Mode::Refs, Mode::Expand, Mode::Recursive],
                        &opts,
                    )
                    .await;
                    println!("suite {label}: pass_rate={:.2}", suite.pass_rate);
                    report.push_suite(suite);
                }
            }

            report.persist(&out).await.context("persisting report")?;
            println!("report written to {}", out.display());
            Ok(())
        }
    }
}

async fn run_sweep(
    orchestrator: &Orchestrator<rlm_orchestrator::semantic::DisabledSearcher>,
    index: &SearchIndex,
    workspace_root: &std::path::Path,
    ground_truth: &GroundTruth,
    report: &mut Report,
    max_configs: usize,
) {
    let grid = SweepGrid {
        max_hops: vec![1, 2, 3],
        expand_top_k: vec![2, 4],
        default_lines: vec![20, 40],
        max_total_expanded_chars: vec![8000, 12_000],
    };
    let base = RecursiveConfig { enabled: true, ..RecursiveConfig::default() };
    let mut cells = grid.cells(&base);
    if cells.len() > max_configs {
        tracing::warn!(total = cells.len(), kept = max_configs, "sweep grid truncated to --max-configs");
        cells.truncate(max_configs);
    }

    let mut run_cells = Vec::with_capacity(cells.len());
    for (i, cfg) in cells.into_iter().enumerate() {
        let label = format!("sweep-{i}");
        if report.has_suite(&label) {
            tracing::info!(label = %label, "sweep cell already in report, skipping (resume)");
            continue;
        }
        let opts = SuiteOptions {
            label: label.clone(),
            max_results: 20,
            preview_chars: 200,
            recursive: cfg.clone(),
        };
        let suite =
            rlm_eval::run_suite(orchestrator, &index.doc, workspace_root, ground_truth, &[Mode::Recursive], &opts)
                .await;
        println!("{label}: pass_rate={:.2} maxHops={}", suite.pass_rate, cfg.max_hops);
        run_cells.push((cfg, suite));
    }

    let best = select_best(&run_cells);
    for (_, suite) in run_cells {
        report.push_suite(suite);
    }
    report.sweep = Some(SweepSummary {
        grid,
        objective: "passRate desc, sizes.tokens.recursive.mean asc, latencyMs.recursive.p95 asc".to_string(),
        best,
    });
}

async fn run_index(
    action: IndexAction,
    config: &Config,
    workspace_root: &std::path::Path,
    index_path: &std::path::Path,
    format: OutputFormat,
) -> Result<()> {
    match action {
        IndexAction::Rebuild => {
            let maintainer_settings = MaintainerSettings {
                debounce: std::time::Duration::from_secs(config.maintainer.debounce_secs),
                cooldown: std::time::Duration::from_secs(config.maintainer.cooldown_secs),
                lock_timeout: std::time::Duration::from_secs(config.maintainer.lock_timeout_secs),
                queue_capacity: config.maintainer.queue_capacity,
            };
            let maintainer = IndexMaintainer::new(index_path.to_path_buf(), maintainer_settings);

            let sessions = rlm_core::list_sessions(workspace_root).await.context("discovering sessions")?;
            println!("rebuilding index: {} sessions discovered", sessions.len());

            let mut failed = 0usize;
            for session in &sessions {
                let path = PathBuf::from(&session.path);
                match maintainer.update_index(&session.session_id, &path).await {
                    Ok(result) => {
                        tracing::debug!(session_id = %session.session_id, added = result.messages_added, "indexed");
                    }
                    Err(e) => {
                        failed += 1;
                        tracing::warn!(session_id = %session.session_id, error = %e, "failed to index, skipping");
                    }
                }
            }

            println!("done: {} indexed, {} failed", sessions.len() - failed, failed);
            Ok(())
        }
        IndexAction::Status => {
            let index = SearchIndex::open(index_path).await.context("opening index")?;
            match format {
                OutputFormat::Json => {
                    let summary = serde_json::json!({
                        "path": index_path,
                        "schemaVersion": index.doc.schema_version,
                        "lastUpdated": index.doc.last_updated,
                        "sessionsIndexed": index.doc.sessions.len(),
                        "termsIndexed": index.doc.tokens.len(),
                    });
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                OutputFormat::Text => {
                    println!("index: {}", index_path.display());
                    println!("schema version: {}", index.doc.schema_version);
                    println!("last updated (unix): {}", index.doc.last_updated);
                    println!("sessions indexed: {}", index.doc.sessions.len());
                    println!("terms indexed: {}", index.doc.tokens.len());
                }
            }
            Ok(())
        }
    }
}

async fn run_serve(config: Config, workspace_root: PathBuf, index_path: PathBuf, port: Option<u16>) -> Result<()> {
    let mut config = config;
    if let Some(port) = port {
        config.server_port = port;
    }

    let index = SearchIndex::open_recovering(&index_path).await.context("opening index")?;
    let maintainer_settings = MaintainerSettings {
        debounce: std::time::Duration::from_secs(config.maintainer.debounce_secs),
        cooldown: std::time::Duration::from_secs(config.maintainer.cooldown_secs),
        lock_timeout: std::time::Duration::from_secs(config.maintainer.lock_timeout_secs),
        queue_capacity: config.maintainer.queue_capacity,
    };
    let maintainer = IndexMaintainer::new(index_path, maintainer_settings);

    let indexing = Arc::new(rlm_server::indexing_state::IndexingState::new());
    let state = rlm_server::AppState::new_with_indexing(
        workspace_root,
        config.clone(),
        index,
        maintainer,
        indexing,
    );

    let _watcher = rlm_server::start_watcher(Arc::clone(&state));

    let app = rlm_server::create_app(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;

    println!("rlm serving on http://{addr}");
    axum::serve(listener, app).await.context("serving HTTP")?;
    Ok(())
}
