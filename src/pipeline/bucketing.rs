//! Value tiers by quantile bucketing

use tracing::debug;

use super::binning::quantile_bins;
use super::error::{Result, ValuationError};

/// Column name used in binning errors
const VALUE_COLUMN: &str = "clv";

/// Assigns ordered tier labels (lowest tier first) by equal-population buckets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueBucketer {
    labels: Vec<String>,
    split_top_tier: bool,
}

impl ValueBucketer {
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(ValuationError::invalid_config("at least one bucket label is required"));
        }
        Ok(Self {
            labels,
            split_top_tier: false,
        })
    }

    /// Split the highest tier by its own median into `<label>2` (lower half)
    /// and `<label>1` (upper half).
    pub fn with_top_tier_split(mut self, split: bool) -> Self {
        self.split_top_tier = split;
        self
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Tier label per value
    pub fn assign(&self, values: &[f64]) -> Result<Vec<String>> {
        let k = self.labels.len();
        let bins = quantile_bins(VALUE_COLUMN, values, k)?;
        let mut tiers: Vec<String> = bins.iter().map(|&b| self.labels[b].clone()).collect();

        if self.split_top_tier {
            let top: Vec<usize> = (0..values.len()).filter(|&i| bins[i] == k - 1).collect();
            let top_values: Vec<f64> = top.iter().map(|&i| values[i]).collect();
            let halves = quantile_bins(VALUE_COLUMN, &top_values, 2)?;

            let top_label = &self.labels[k - 1];
            for (&index, &half) in top.iter().zip(&halves) {
                tiers[index] = if half == 0 {
                    format!("{}2", top_label)
                } else {
                    format!("{}1", top_label)
                };
            }
        }

        debug!(customers = values.len(), tiers = k, split = self.split_top_tier, "Assigned value tiers");
        Ok(tiers)
    }
}
