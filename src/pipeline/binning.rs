//! Quantile binning and ordinal scoring
//!
//! Scores are produced in two independent steps: an optional stable-rank
//! transform (ties broken by first occurrence) followed by an
//! equal-population partition using edges taken from the empirical
//! distribution. A column that cannot support the requested number of bins
//! is an error; it is never coarsened into fewer bins.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{Result, ValuationError};

/// How raw values map onto scores
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreDirection {
    /// Higher raw value -> higher score
    #[default]
    Ascending,
    /// Higher raw value -> lower score (used for recency)
    Descending,
}

impl fmt::Display for ScoreDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreDirection::Ascending => write!(f, "ascending"),
            ScoreDirection::Descending => write!(f, "descending"),
        }
    }
}

impl FromStr for ScoreDirection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ascending" | "asc" => Ok(ScoreDirection::Ascending),
            "descending" | "desc" => Ok(ScoreDirection::Descending),
            _ => Err(format!(
                "Unknown score direction: '{}'. Use 'ascending' or 'descending'.",
                s
            )),
        }
    }
}

/// Tie handling before the quantile split
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    /// Bin raw values; duplicate edges are an error
    #[default]
    None,
    /// Replace values by their stable rank first, so heavy ties still split evenly
    Rank,
}

/// Maps a metric column onto ordinal scores `1..=cardinality`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantileScorer {
    pub cardinality: usize,
    pub direction: ScoreDirection,
    pub tie_break: TieBreak,
}

impl QuantileScorer {
    pub fn new(cardinality: usize, direction: ScoreDirection, tie_break: TieBreak) -> Self {
        Self {
            cardinality,
            direction,
            tie_break,
        }
    }

    /// Score every value of `values`; `column` names the metric in errors.
    pub fn score(&self, column: &str, values: &[f64]) -> Result<Vec<u8>> {
        let bins = match self.tie_break {
            TieBreak::None => quantile_bins(column, values, self.cardinality)?,
            TieBreak::Rank => quantile_bins(column, &stable_rank(values), self.cardinality)?,
        };

        let k = self.cardinality;
        Ok(bins
            .into_iter()
            .map(|bin| match self.direction {
                ScoreDirection::Ascending => (bin + 1) as u8,
                ScoreDirection::Descending => (k - bin) as u8,
            })
            .collect())
    }
}

/// 1-based ordinal ranks; equal values are ranked in order of appearance.
pub fn stable_rank(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    // sort_by is stable, so ties keep input order
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    for (position, &index) in order.iter().enumerate() {
        ranks[index] = (position + 1) as f64;
    }
    ranks
}

/// Quantile of an ascending-sorted slice using linear interpolation between
/// order statistics. `q` is clamped to [0, 1].
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// `bins + 1` strictly increasing quantile edges for `values`.
///
/// Edge positions are computed in integer arithmetic so an edge that falls
/// exactly on an order statistic equals that value.
pub fn quantile_edges(column: &str, values: &[f64], bins: usize) -> Result<Vec<f64>> {
    if bins == 0 {
        return Err(ValuationError::invalid_config("number of quantile bins must be at least 1"));
    }
    if let Some(row) = values.iter().position(|v| !v.is_finite()) {
        return Err(ValuationError::InvalidField {
            column: column.to_string(),
            row,
            value: values[row].to_string(),
        });
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let distinct = count_distinct_sorted(&sorted);
    if distinct < bins {
        return Err(ValuationError::DegenerateBinning {
            column: column.to_string(),
            distinct,
            requested: bins,
            customers: values.len(),
        });
    }

    let n = sorted.len();
    let edges: Vec<f64> = (0..=bins)
        .map(|i| {
            let numerator = (n - 1) * i;
            let lo = numerator / bins;
            let remainder = numerator % bins;
            if remainder == 0 {
                sorted[lo]
            } else {
                let frac = remainder as f64 / bins as f64;
                sorted[lo] + frac * (sorted[lo + 1] - sorted[lo])
            }
        })
        .collect();

    if edges.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ValuationError::DegenerateBinning {
            column: column.to_string(),
            distinct: count_distinct_sorted(&edges),
            requested: bins,
            customers: n,
        });
    }

    Ok(edges)
}

/// 0-based bin index per value given edges from [`quantile_edges`].
///
/// Bins are right-closed `(e[i], e[i+1]]`, with the lowest edge included in
/// the first bin.
pub fn assign_bins(values: &[f64], edges: &[f64]) -> Vec<usize> {
    let interior = if edges.len() > 2 { &edges[1..edges.len() - 1] } else { &[][..] };
    values
        .iter()
        .map(|&v| interior.partition_point(|&e| e < v))
        .collect()
}

/// Equal-population bin index per value; fails rather than leaving a bin empty.
pub fn quantile_bins(column: &str, values: &[f64], bins: usize) -> Result<Vec<usize>> {
    let edges = quantile_edges(column, values, bins)?;
    let assigned = assign_bins(values, &edges);

    let counts = bin_counts(&assigned, bins);
    if counts.iter().any(|&c| c == 0) {
        return Err(ValuationError::DegenerateBinning {
            column: column.to_string(),
            distinct: counts.iter().filter(|&&c| c > 0).count(),
            requested: bins,
            customers: values.len(),
        });
    }

    Ok(assigned)
}

/// Population of each bin
pub fn bin_counts(assigned: &[usize], bins: usize) -> Vec<usize> {
    let mut counts = vec![0usize; bins];
    for &bin in assigned {
        if bin < bins {
            counts[bin] += 1;
        }
    }
    counts
}

fn count_distinct_sorted(sorted: &[f64]) -> usize {
    if sorted.is_empty() {
        return 0;
    }
    1 + sorted.windows(2).filter(|w| w[0] != w[1]).count()
}
