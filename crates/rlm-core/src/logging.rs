//! Tracing setup shared by the server, CLI, and eval harness binaries.
//!
//! Text output by default (human-readable during local development), JSON
//! when `RLM_LOG_FORMAT=json` (for ingestion by a log collector). Level is
//! controlled by `RUST_LOG`, falling back to `info` for this crate's targets
//! and `warn` for dependencies.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var("RLM_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

const DEFAULT_FILTER: &str = "info,rlm_core=debug,rlm_index=debug,rlm_maintainer=debug,rlm_orchestrator=debug,rlm_expand=debug,rlm_server=debug";

/// Install a global tracing subscriber. Safe to call once per process; a
/// second call is a no-op (the underlying `try_init` fails silently since a
/// subscriber is already installed, which matters for tests that call this
/// from multiple `#[tokio::test]` functions).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(filter);

    let result = match LogFormat::from_env() {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).try_init(),
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_defaults_to_text() {
        std::env::remove_var("RLM_LOG_FORMAT");
        assert_eq!(LogFormat::from_env(), LogFormat::Text);
    }

    #[test]
    fn log_format_json_from_env() {
        std::env::set_var("RLM_LOG_FORMAT", "json");
        assert_eq!(LogFormat::from_env(), LogFormat::Json);
        std::env::remove_var("RLM_LOG_FORMAT");
    }

    #[test]
    fn init_tracing_does_not_panic_when_called_twice() {
        init_tracing();
        init_tracing();
    }
}
