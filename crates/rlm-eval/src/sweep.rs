//! Parameter sweep: enumerate a `RecursiveConfig` grid, run one suite per
//! cell, and select the best cell by the ordered objective (pass rate,
//! then mean recursive token cost, then p95 recursive latency).

use crate::report::SuiteReport;
use rlm_core::types::RecursiveConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepGrid {
    pub max_hops: Vec<u32>,
    pub expand_top_k: Vec<usize>,
    pub default_lines: Vec<usize>,
    pub max_total_expanded_chars: Vec<usize>,
}

impl SweepGrid {
    /// The Cartesian product of the grid, in a fixed deterministic order,
    /// as fully-specified `RecursiveConfig`s layered over `base`.
    pub fn cells(&self, base: &RecursiveConfig) -> Vec<RecursiveConfig> {
        let mut cells = Vec::new();
        for &max_hops in &self.max_hops {
            for &expand_top_k in &self.expand_top_k {
                for &default_lines in &self.default_lines {
                    for &max_total_expanded_chars in &self.max_total_expanded_chars {
                        cells.push(RecursiveConfig {
                            enabled: true,
                            max_hops,
                            expand_top_k,
                            default_lines,
                            max_total_expanded_chars,
                            ..base.clone()
                        });
                    }
                }
            }
        }
        cells
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub grid: SweepGrid,
    pub objective: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best: Option<BestCell>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestCell {
    pub cfg: RecursiveConfig,
    pub pass_rate: f64,
    pub rec_tokens_mean: f64,
    pub rec_latency_p95: f64,
}

/// `1. maximise passRate; 2. minimise tokens.recursiveRefs.mean; 3. minimise
/// latencyMs.recursive.p95`. Assumes every suite ran the `recursive` mode.
pub fn select_best(cells: &[(RecursiveConfig, SuiteReport)]) -> Option<BestCell> {
    cells
        .iter()
        .max_by(|(_, a), (_, b)| {
            let a_tokens =
                a.aggregates.get("sizes.tokens.recursive").map(|agg| agg.mean).unwrap_or(f64::INFINITY);
            let b_tokens =
                b.aggregates.get("sizes.tokens.recursive").map(|agg| agg.mean).unwrap_or(f64::INFINITY);
            let a_latency = a
                .aggregates
                .get("latencyMs.recursive")
                .map(|agg| agg.p95)
                .unwrap_or(f64::INFINITY);
            let b_latency = b
                .aggregates
                .get("latencyMs.recursive")
                .map(|agg| agg.p95)
                .unwrap_or(f64::INFINITY);

            a.pass_rate
                .partial_cmp(&b.pass_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b_tokens.partial_cmp(&a_tokens).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| b_latency.partial_cmp(&a_latency).unwrap_or(std::cmp::Ordering::Equal))
        })
        .map(|(cfg, suite)| BestCell {
            cfg: cfg.clone(),
            pass_rate: suite.pass_rate,
            rec_tokens_mean: suite.aggregates.get("sizes.tokens.recursive").map(|agg| agg.mean).unwrap_or(0.0),
            rec_latency_p95: suite.aggregates.get("latencyMs.recursive").map(|agg| agg.p95).unwrap_or(0.0),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CaseResult;
    use std::collections::HashMap;

    fn suite_with(label: &str, pass_rate_ok_count: usize, total: usize, tokens_mean: f64) -> SuiteReport {
        let mut cases = Vec::new();
        for i in 0..total {
            let ok = i < pass_rate_ok_count;
            let mut latency_ms = HashMap::new();
            latency_ms.insert("recursive".to_string(), 10.0);
            let mut ok_by_mode = HashMap::new();
            ok_by_mode.insert("recursive".to_string(), ok);
            let mut sizes_by_mode = HashMap::new();
            sizes_by_mode.insert(
                "recursive".to_string(),
                crate::report::Sizes { chars: (tokens_mean * 4.0) as usize, tokens: tokens_mean as usize },
            );
            cases.push(CaseResult {
                label: format!("case-{i}"),
                sizes: crate::report::Sizes { chars: (tokens_mean * 4.0) as usize, tokens: tokens_mean as usize },
                sizes_by_mode,
                latency_ms,
                counts: crate::report::Counts { refs_returned: 1, expanded_requested: 1 },
                ok,
                ok_by_mode,
                top_refs: Vec::new(),
                recursive_meta: None,
            });
        }
        SuiteReport::from_cases(label.to_string(), cases)
    }

    #[test]
    fn grid_enumerates_cartesian_product() {
        let grid = SweepGrid {
            max_hops: vec![1, 2],
            expand_top_k: vec![2, 4],
            default_lines: vec![20],
            max_total_expanded_chars: vec![12000],
        };
        let cells = grid.cells(&RecursiveConfig::default());
        assert_eq!(cells.len(), 4);
    }

    #[test]
    fn select_best_prefers_higher_pass_rate_over_lower_tokens() {
        let cfg = RecursiveConfig::default();
        let worse = suite_with("low-pass", 1, 4, 10.0);
        let better = suite_with("high-pass-high-tokens", 4, 4, 1000.0);
        let cells = vec![(cfg.clone(), worse), (cfg, better)];

        let best = select_best(&cells).unwrap();
        assert_eq!(best.pass_rate, 1.0);
    }

    #[test]
    fn select_best_ignores_combined_across_mode_total_and_keys_on_recursive_series() {
        let cfg = RecursiveConfig::default();
        // Cheap recursive mode, but a huge `baseline` mode inflates the
        // combined `sizes.tokens` total well past `costly`'s. The objective
        // must still pick this cell, since it optimizes recursiveRefs tokens.
        let mut cheap_recursive_case = {
            let mut latency_ms = HashMap::new();
            latency_ms.insert("recursive".to_string(), 10.0);
            let mut ok_by_mode = HashMap::new();
            ok_by_mode.insert("recursive".to_string(), true);
            let mut sizes_by_mode = HashMap::new();
            sizes_by_mode.insert("recursive".to_string(), crate::report::Sizes { chars: 40, tokens: 10 });
            sizes_by_mode.insert("baseline".to_string(), crate::report::Sizes { chars: 40_000, tokens: 10_000 });
            CaseResult {
                label: "case-0".to_string(),
                sizes: crate::report::Sizes { chars: 40_040, tokens: 10_010 },
                sizes_by_mode,
                latency_ms,
                counts: crate::report::Counts { refs_returned: 1, expanded_requested: 1 },
                ok: true,
                ok_by_mode,
                top_refs: Vec::new(),
                recursive_meta: None,
            }
        };
        cheap_recursive_case.label = "cheap-recursive-expensive-baseline".to_string();
        let cheap = SuiteReport::from_cases("cheap".to_string(), vec![cheap_recursive_case]);
        let costly = suite_with("costly", 1, 1, 500.0);

        let cells = vec![(cfg.clone(), costly), (cfg, cheap)];
        let best = select_best(&cells).unwrap();
        assert_eq!(best.rec_tokens_mean, 10.0);
    }

    #[test]
    fn select_best_breaks_ties_on_token_cost() {
        let cfg = RecursiveConfig::default();
        let cheap = suite_with("cheap", 4, 4, 10.0);
        let expensive = suite_with("expensive", 4, 4, 500.0);
        let cells = vec![(cfg.clone(), expensive), (cfg, cheap)];

        let best = select_best(&cells).unwrap();
        assert_eq!(best.rec_tokens_mean, 10.0);
    }
}
