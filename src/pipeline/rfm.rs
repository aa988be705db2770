//! RFM scoring and segmentation

use serde::Serialize;
use tracing::debug;

use super::binning::{QuantileScorer, ScoreDirection, TieBreak};
use super::error::Result;
use super::metrics::CustomerMetrics;
use super::segments::{ScoreCode, SegmentRuleTable};

/// Metrics with their ordinal scores and segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCustomer {
    #[serde(flatten)]
    pub metrics: CustomerMetrics,
    pub recency_score: u8,
    pub frequency_score: u8,
    pub monetary_score: u8,
    /// Recency score followed by frequency score
    pub rfm_score: String,
    pub segment: String,
}

/// Score every customer and assign its segment.
///
/// Recency is scored descending (recent customers score high); frequency is
/// rank-transformed first so repeated counts still split evenly; monetary is
/// scored on raw totals. The segment depends on the recency/frequency code
/// only.
///
/// Equal bin populations are guaranteed for frequency only. Tied recency or
/// monetary values share a bin, so those bins can differ in size.
pub fn score_customers(
    metrics: &[CustomerMetrics],
    cardinality: usize,
    rules: &SegmentRuleTable,
) -> Result<Vec<ScoredCustomer>> {
    let recency: Vec<f64> = metrics.iter().map(|m| m.recency as f64).collect();
    let frequency: Vec<f64> = metrics.iter().map(|m| f64::from(m.frequency)).collect();
    let monetary: Vec<f64> = metrics.iter().map(|m| m.monetary).collect();

    let recency_scores = QuantileScorer::new(cardinality, ScoreDirection::Descending, TieBreak::None)
        .score("recency", &recency)?;
    let frequency_scores = QuantileScorer::new(cardinality, ScoreDirection::Ascending, TieBreak::Rank)
        .score("frequency", &frequency)?;
    let monetary_scores = QuantileScorer::new(cardinality, ScoreDirection::Ascending, TieBreak::None)
        .score("monetary", &monetary)?;

    let scored = metrics
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let code = ScoreCode::new(recency_scores[i], frequency_scores[i]);
            let segment = rules.classify_code(code)?.to_string();
            Ok(ScoredCustomer {
                metrics: m.clone(),
                recency_score: recency_scores[i],
                frequency_score: frequency_scores[i],
                monetary_score: monetary_scores[i],
                rfm_score: code.to_string(),
                segment,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(customers = scored.len(), cardinality, "Scored and segmented customers");
    Ok(scored)
}
