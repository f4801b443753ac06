//! The ground-truth evaluation harness: `runSuite(groundTruth, modes, options)
//! -> report`, aggregated metrics, parameter sweep, and resumable
//! checkpointing.

pub mod aggregate;
pub mod error;
pub mod modes;
pub mod report;
pub mod sweep;

pub use aggregate::Aggregate;
pub use error::ReportError;
pub use modes::Mode;
pub use report::{CaseResult, Defaults, Report, SuiteReport};
pub use sweep::{BestCell, SweepGrid, SweepSummary};

use rlm_core::types::RecursiveConfig;
use rlm_index::types::IndexDocument;
use rlm_orchestrator::semantic::SemanticSearcher;
use rlm_orchestrator::Orchestrator;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedEvidence {
    pub any_contains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths_like: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthCase {
    pub id: String,
    pub query: String,
    pub expect: ExpectedEvidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruth {
    pub description: String,
    pub version: String,
    pub cases: Vec<GroundTruthCase>,
}

/// Options shared by every case in a suite run.
#[derive(Debug, Clone)]
pub struct SuiteOptions {
    pub label: String,
    pub max_results: usize,
    pub preview_chars: usize,
    pub recursive: RecursiveConfig,
}

impl Default for SuiteOptions {
    fn default() -> Self {
        Self {
            label: "default".to_string(),
            max_results: 20,
            preview_chars: 200,
            recursive: RecursiveConfig::default(),
        }
    }
}

/// Run `ground_truth` across `modes`, returning one [`SuiteReport`]. Any
/// single-case failure is caught as a case-level `ok: false`, never a
/// suite-level failure.
pub async fn run_suite<S: SemanticSearcher>(
    orchestrator: &Orchestrator<S>,
    index: &IndexDocument,
    workspace_root: &Path,
    ground_truth: &GroundTruth,
    modes: &[Mode],
    opts: &SuiteOptions,
) -> SuiteReport {
    let mut cases = Vec::with_capacity(ground_truth.cases.len());
    for case in &ground_truth.cases {
        let result = modes::run_case(orchestrator, index, workspace_root, case, modes, opts).await;
        cases.push(result);
    }
    SuiteReport::from_cases(opts.label.clone(), cases)
}
