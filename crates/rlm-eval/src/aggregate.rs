//! Numeric series aggregation: `{n, mean, median, p95}` over a suite's
//! per-case measurements.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
}

impl Aggregate {
    /// Computes `{n, mean, median, p95}` over `values`. Non-finite entries
    /// are discarded before sorting; `p95 = x[min(n-1, ceil(0.95*n)-1)]`.
    pub fn from_values(values: &[f64]) -> Self {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let n = sorted.len();
        if n == 0 {
            return Self { n: 0, mean: 0.0, median: 0.0, p95: 0.0 };
        }

        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };
        let p95_idx = (n - 1).min(((0.95 * n as f64).ceil() as usize).saturating_sub(1));

        Self { n, mean, median, p95: sorted[p95_idx] }
    }
}
