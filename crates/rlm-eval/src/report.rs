//! Report shapes and atomic, resumable persistence — the same temp-file +
//! fsync + rename discipline `rlm-index` uses for the inverted index.

use crate::aggregate::Aggregate;
use crate::error::ReportError;
use crate::sweep::SweepSummary;
use crate::GroundTruth;
use rlm_core::types::{RecursiveMeta, Ref};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Sizes {
    pub chars: usize,
    pub tokens: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counts {
    pub refs_returned: usize,
    pub expanded_requested: usize,
}

/// One ground-truth case's result for one suite run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    pub label: String,
    pub sizes: Sizes,
    /// Per-mode breakdown of `sizes` (e.g. the `recursive` mode's own
    /// chars/tokens, distinct from the combined total every mode adds to).
    pub sizes_by_mode: HashMap<String, Sizes>,
    pub latency_ms: HashMap<String, f64>,
    pub counts: Counts,
    pub ok: bool,
    pub ok_by_mode: HashMap<String, bool>,
    pub top_refs: Vec<Ref>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recursive_meta: Option<RecursiveMeta>,
}

/// All cases for one suite, plus the pass rate and per-series aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteReport {
    pub label: String,
    pub cases: Vec<CaseResult>,
    pub pass_rate: f64,
    pub aggregates: HashMap<String, Aggregate>,
}

impl SuiteReport {
    pub fn from_cases(label: String, cases: Vec<CaseResult>) -> Self {
        let n = cases.len().max(1);
        let pass_rate = cases.iter().filter(|c| c.ok).count() as f64 / n as f64;

        let mut series: HashMap<String, Vec<f64>> = HashMap::new();
        for case in &cases {
            for (mode, ms) in &case.latency_ms {
                series.entry(format!("latencyMs.{mode}")).or_default().push(*ms);
            }
            series.entry("sizes.chars".to_string()).or_default().push(case.sizes.chars as f64);
            series.entry("sizes.tokens".to_string()).or_default().push(case.sizes.tokens as f64);
            for (mode, sizes) in &case.sizes_by_mode {
                series.entry(format!("sizes.chars.{mode}")).or_default().push(sizes.chars as f64);
                series.entry(format!("sizes.tokens.{mode}")).or_default().push(sizes.tokens as f64);
            }
            series
                .entry("counts.refsReturned".to_string())
                .or_default()
                .push(case.counts.refs_returned as f64);
            series
                .entry("counts.expandedRequested".to_string())
                .or_default()
                .push(case.counts.expanded_requested as f64);
        }

        let aggregates = series
            .into_iter()
            .map(|(k, values)| (k, Aggregate::from_values(&values)))
            .collect();

        Self { label, cases, pass_rate, aggregates }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Defaults {
    pub max_results: usize,
    pub preview_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundTruthSummary {
    pub description: String,
    pub version: String,
}

/// The top-level report document, checkpointed atomically after each suite.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub generated_at: String,
    pub ground_truth: GroundTruthSummary,
    pub defaults: Defaults,
    pub suites: Vec<SuiteReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep: Option<SweepSummary>,
}

impl Report {
    pub fn new(ground_truth: &GroundTruth, defaults: Defaults, generated_at: String) -> Self {
        Self {
            generated_at,
            ground_truth: GroundTruthSummary {
                description: ground_truth.description.clone(),
                version: ground_truth.version.clone(),
            },
            defaults,
            suites: Vec::new(),
            sweep: None,
        }
    }

    pub fn has_suite(&self, label: &str) -> bool {
        self.suites.iter().any(|s| s.label == label)
    }

    pub fn push_suite(&mut self, suite: SuiteReport) {
        self.suites.push(suite);
    }

    /// Re-read an existing report for `--resume`. Absence is not an error —
    /// the caller starts a fresh report.
    pub async fn load_for_resume(path: &Path) -> Result<Option<Report>, ReportError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ReportError::Io { path: path.display().to_string(), source }),
        }
    }

    /// Rewrite the full report to `path`: temp file, `fsync`, atomic rename.
    pub async fn persist(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_vec_pretty(self)?;
        let tmp_path = path.with_extension("tmp");

        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|source| ReportError::Io { path: tmp_path.display().to_string(), source })?;
        file.write_all(&json)
            .await
            .map_err(|source| ReportError::Io { path: tmp_path.display().to_string(), source })?;
        file.sync_all()
            .await
            .map_err(|source| ReportError::Io { path: tmp_path.display().to_string(), source })?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|source| ReportError::Io { path: path.display().to_string(), source })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GroundTruthCase;

    fn sample_ground_truth() -> GroundTruth {
        GroundTruth {
            description: "sample".to_string(),
            version: "1".to_string(),
            cases: vec![GroundTruthCase {
                id: "case-1".to_string(),
                query: "cache invalidation".to_string(),
                expect: crate::ExpectedEvidence { any_contains: vec!["cache".to_string()], paths_like: None },
            }],
        }
    }

    fn sample_case(label: &str, ok: bool) -> CaseResult {
        let mut latency_ms = HashMap::new();
        latency_ms.insert("refs".to_string(), 12.0);
        let mut ok_by_mode = HashMap::new();
        ok_by_mode.insert("refs".to_string(), ok);
        CaseResult {
            label: label.to_string(),
            sizes: Sizes { chars: 100, tokens: 25 },
            sizes_by_mode: HashMap::new(),
            latency_ms,
            counts: Counts { refs_returned: 3, expanded_requested: 0 },
            ok,
            ok_by_mode,
            top_refs: Vec::new(),
            recursive_meta: None,
        }
    }

    #[test]
    fn suite_report_computes_pass_rate_and_aggregates() {
        let suite = SuiteReport::from_cases(
            "s1".to_string(),
            vec![sample_case("a", true), sample_case("b", false)],
        );
        assert_eq!(suite.pass_rate, 0.5);
        assert!(suite.aggregates.contains_key("latencyMs.refs"));
        assert_eq!(suite.aggregates["sizes.chars"].n, 2);
    }

    #[tokio::test]
    async fn persist_then_resume_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut report = Report::new(&sample_ground_truth(), Defaults::default(), "2026-01-01T00:00:00Z".to_string());
        report.push_suite(SuiteReport::from_cases("s1".to_string(), vec![sample_case("a", true)]));
        report.persist(&path).await.unwrap();

        let resumed = Report::load_for_resume(&path).await.unwrap().unwrap();
        assert!(resumed.has_suite("s1"));
        assert!(!resumed.has_suite("s2"));
    }

    #[tokio::test]
    async fn resume_on_missing_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(Report::load_for_resume(&path).await.unwrap().is_none());
    }
}
