//! End-to-end valuation run
//!
//! Stages run strictly in order: metrics, then RFM scoring and/or model
//! fitting and value estimation, then value tiers. Every run re-derives all
//! parameters from the input; nothing is carried between runs.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::bucketing::ValueBucketer;
use super::config::ValuationConfig;
use super::error::{Result, ValuationError};
use super::metrics::{CustomerHistory, CustomerMetrics, MetricCalculator};
use super::models::{BetaGeoModel, BetaGeoParams, FitSummary, GammaGammaModel, GammaGammaParams};
use super::outliers::{cap_outliers, OutlierReport};
use super::rfm::{score_customers, ScoredCustomer};
use super::transactions::TransactionTable;
use super::value::{heuristic_values, ClvEstimate, ValueEstimator};

/// Which sub-pipelines to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// Scores and segments only
    Rfm,
    /// Lifetime value and tiers only
    Clv,
    #[default]
    Combined,
}

impl PipelineMode {
    pub fn includes_rfm(self) -> bool {
        matches!(self, PipelineMode::Rfm | PipelineMode::Combined)
    }

    pub fn includes_clv(self) -> bool {
        matches!(self, PipelineMode::Clv | PipelineMode::Combined)
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineMode::Rfm => write!(f, "rfm"),
            PipelineMode::Clv => write!(f, "clv"),
            PipelineMode::Combined => write!(f, "combined"),
        }
    }
}

impl FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rfm" => Ok(PipelineMode::Rfm),
            "clv" => Ok(PipelineMode::Clv),
            "combined" | "all" => Ok(PipelineMode::Combined),
            _ => Err(format!(
                "Unknown pipeline mode: '{}'. Use 'rfm', 'clv' or 'combined'.",
                s
            )),
        }
    }
}

/// How lifetime value is computed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClvMethod {
    /// Fitted transaction and monetary models
    #[default]
    Probabilistic,
    /// Aggregate averages, no fitting
    Heuristic,
}

impl fmt::Display for ClvMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClvMethod::Probabilistic => write!(f, "probabilistic"),
            ClvMethod::Heuristic => write!(f, "heuristic"),
        }
    }
}

impl FromStr for ClvMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "probabilistic" | "model" => Ok(ClvMethod::Probabilistic),
            "heuristic" => Ok(ClvMethod::Heuristic),
            _ => Err(format!(
                "Unknown CLV method: '{}'. Use 'probabilistic' or 'heuristic'.",
                s
            )),
        }
    }
}

/// Per-run choices that are not part of the persisted configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub mode: PipelineMode,
    pub method: ClvMethod,
    /// Switch to the heuristic path when a model fails to converge
    pub fallback_to_heuristic: bool,
}

/// One output row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerValuation {
    #[serde(flatten)]
    pub metrics: CustomerMetrics,
    pub recency_score: Option<u8>,
    pub frequency_score: Option<u8>,
    pub monetary_score: Option<u8>,
    pub rfm_score: Option<String>,
    pub segment: Option<String>,
    pub expected_transactions: Option<f64>,
    pub expected_average_value: Option<f64>,
    pub probability_alive: Option<f64>,
    pub clv: Option<f64>,
    pub clv_segment: Option<String>,
}

impl CustomerValuation {
    fn from_metrics(metrics: CustomerMetrics) -> Self {
        Self {
            metrics,
            recency_score: None,
            frequency_score: None,
            monetary_score: None,
            rfm_score: None,
            segment: None,
            expected_transactions: None,
            expected_average_value: None,
            probability_alive: None,
            clv: None,
            clv_segment: None,
        }
    }

    pub fn customer_id(&self) -> &str {
        &self.metrics.customer_id
    }
}

/// Count and means of one group of customers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub group: String,
    pub customers: usize,
    pub mean_recency: f64,
    pub mean_frequency: f64,
    pub mean_monetary: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_clv: Option<f64>,
}

/// Customer-indexed valuation output, ordered by customer id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationTable {
    mode: PipelineMode,
    model_columns: bool,
    rows: Vec<CustomerValuation>,
}

impl ValuationTable {
    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    pub fn rows(&self) -> &[CustomerValuation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, customer_id: &str) -> Option<&CustomerValuation> {
        self.rows
            .binary_search_by(|row| row.customer_id().cmp(customer_id))
            .ok()
            .map(|i| &self.rows[i])
    }

    /// Output column names for this table's mode
    pub fn column_names(&self) -> Vec<&'static str> {
        let mut names = vec!["customer_id", "recency", "frequency", "monetary"];
        if self.mode.includes_rfm() {
            names.extend(["recency_score", "frequency_score", "monetary_score", "rfm_score", "segment"]);
        }
        if self.mode.includes_clv() {
            if self.model_columns {
                names.extend(["expected_transactions", "expected_average_value", "probability_alive"]);
            }
            names.extend(["clv", "clv_segment"]);
        }
        names
    }

    /// The table as a dataframe; columns follow [`Self::column_names`].
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let rows = &self.rows;

        let mut columns: Vec<Column> = vec![
            Column::new(
                "customer_id".into(),
                rows.iter().map(|r| r.customer_id()).collect::<Vec<&str>>(),
            ),
            Column::new(
                "recency".into(),
                rows.iter().map(|r| r.metrics.recency).collect::<Vec<i64>>(),
            ),
            Column::new(
                "frequency".into(),
                rows.iter().map(|r| i64::from(r.metrics.frequency)).collect::<Vec<i64>>(),
            ),
            Column::new(
                "monetary".into(),
                rows.iter().map(|r| r.metrics.monetary).collect::<Vec<f64>>(),
            ),
        ];

        if self.mode.includes_rfm() {
            columns.push(Column::new("recency_score".into(), score_column(rows, |r| r.recency_score)));
            columns.push(Column::new(
                "frequency_score".into(),
                score_column(rows, |r| r.frequency_score),
            ));
            columns.push(Column::new(
                "monetary_score".into(),
                score_column(rows, |r| r.monetary_score),
            ));
            columns.push(Column::new("rfm_score".into(), text_column(rows, |r| r.rfm_score.as_deref())));
            columns.push(Column::new("segment".into(), text_column(rows, |r| r.segment.as_deref())));
        }
        if self.mode.includes_clv() {
            if self.model_columns {
                columns.push(Column::new(
                    "expected_transactions".into(),
                    real_column(rows, |r| r.expected_transactions),
                ));
                columns.push(Column::new(
                    "expected_average_value".into(),
                    real_column(rows, |r| r.expected_average_value),
                ));
                columns.push(Column::new(
                    "probability_alive".into(),
                    real_column(rows, |r| r.probability_alive),
                ));
            }
            columns.push(Column::new("clv".into(), real_column(rows, |r| r.clv)));
            columns.push(Column::new(
                "clv_segment".into(),
                text_column(rows, |r| r.clv_segment.as_deref()),
            ));
        }

        Ok(DataFrame::new(columns)?)
    }

    /// Count and means per RFM segment, by segment name
    pub fn segment_summary(&self) -> Vec<GroupSummary> {
        summarize(&self.rows, |row| row.segment.as_deref())
    }

    /// Count and means per value tier, by tier label
    pub fn tier_summary(&self) -> Vec<GroupSummary> {
        summarize(&self.rows, |row| row.clv_segment.as_deref())
    }
}

fn text_column<'a>(
    rows: &'a [CustomerValuation],
    f: impl Fn(&'a CustomerValuation) -> Option<&'a str>,
) -> Vec<Option<&'a str>> {
    rows.iter().map(f).collect()
}

fn real_column(rows: &[CustomerValuation], f: impl Fn(&CustomerValuation) -> Option<f64>) -> Vec<Option<f64>> {
    rows.iter().map(f).collect()
}

fn score_column(rows: &[CustomerValuation], f: impl Fn(&CustomerValuation) -> Option<u8>) -> Vec<Option<i32>> {
    rows.iter().map(|r| f(r).map(i32::from)).collect()
}

fn summarize<F>(rows: &[CustomerValuation], key: F) -> Vec<GroupSummary>
where
    F: Fn(&CustomerValuation) -> Option<&str>,
{
    let mut groups: BTreeMap<&str, Vec<&CustomerValuation>> = BTreeMap::new();
    for row in rows {
        if let Some(group) = key(row) {
            groups.entry(group).or_default().push(row);
        }
    }

    groups
        .into_iter()
        .map(|(group, members)| {
            let n = members.len() as f64;
            let mean = |f: &dyn Fn(&CustomerValuation) -> f64| {
                members.iter().map(|m| f(*m)).sum::<f64>() / n
            };
            let clv_values: Vec<f64> = members.iter().filter_map(|m| m.clv).collect();
            GroupSummary {
                group: group.to_string(),
                customers: members.len(),
                mean_recency: mean(&|m| m.metrics.recency as f64),
                mean_frequency: mean(&|m| f64::from(m.metrics.frequency)),
                mean_monetary: mean(&|m| m.metrics.monetary),
                mean_clv: if clv_values.is_empty() {
                    None
                } else {
                    Some(clv_values.iter().sum::<f64>() / clv_values.len() as f64)
                },
            }
        })
        .collect()
}

/// Parameters and fit diagnostics of the models used in a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FittedModels {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<BetaGeoParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_fit: Option<FitSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monetary: Option<GammaGammaParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monetary_fit: Option<FitSummary>,
}

/// What happened during a run besides the output rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunDiagnostics {
    pub analysis_date: NaiveDate,
    pub transactions: usize,
    /// Input rows dropped for a missing required field
    pub skipped_rows: usize,
    pub customers: usize,
    /// Customers left out of the output, in id order
    pub excluded_customers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outliers: Option<OutlierReport>,
    /// Value path actually used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clv_method: Option<ClvMethod>,
    /// Why the run switched to the heuristic path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub churn_rate: Option<f64>,
}

/// Everything produced by [`run_valuation`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationOutcome {
    pub table: ValuationTable,
    pub models: FittedModels,
    pub diagnostics: RunDiagnostics,
}

struct ClvResult {
    estimates: Vec<ClvEstimate>,
    method: ClvMethod,
    models: FittedModels,
    fallback_reason: Option<String>,
    churn_rate: Option<f64>,
}

/// Run the valuation pipeline over a transaction snapshot.
///
/// The same input, configuration and options always produce the same
/// outcome.
pub fn run_valuation(
    transactions: &TransactionTable,
    config: &ValuationConfig,
    options: &RunOptions,
) -> Result<ValuationOutcome> {
    config.validate()?;
    if options.mode.includes_rfm() {
        config
            .segment_rules
            .ensure_exhaustive(config.score_cardinality as u8)?;
    }

    let mut outliers = None;
    let table: Cow<'_, TransactionTable> = if config.cap_outliers {
        let mut capped = transactions.clone();
        outliers = Some(cap_outliers(&mut capped));
        Cow::Owned(capped)
    } else {
        Cow::Borrowed(transactions)
    };

    let calculator = MetricCalculator::for_table(&table, config.analysis_date, config.period_unit)?;
    info!(
        analysis_date = %calculator.analysis_date(),
        mode = %options.mode,
        transactions = table.len(),
        "Starting valuation run"
    );

    let rfm_rows = calculator.rfm_metrics(&table);
    let mut excluded: BTreeSet<String> = rfm_rows.excluded.into_iter().collect();

    // The model path can only value customers with a positive average value,
    // so every output column is computed over that population.
    let uses_models = options.mode.includes_clv() && options.method == ClvMethod::Probabilistic;
    let (metrics, histories) = if uses_models {
        let history_rows = calculator.customer_histories(&table);
        excluded.extend(history_rows.excluded);
        let valued: HashSet<&str> = history_rows
            .customers
            .iter()
            .map(|h| h.customer_id.as_str())
            .collect();
        let metrics: Vec<CustomerMetrics> = rfm_rows
            .customers
            .into_iter()
            .filter(|m| valued.contains(m.customer_id.as_str()))
            .collect();
        (metrics, history_rows.customers)
    } else {
        (rfm_rows.customers, Vec::new())
    };

    if metrics.is_empty() {
        return Err(ValuationError::InsufficientData {
            stage: "valuation",
            customers: 0,
            reason: "no customer remains after exclusions".to_string(),
        });
    }

    let mut rows: Vec<CustomerValuation> = metrics
        .iter()
        .cloned()
        .map(CustomerValuation::from_metrics)
        .collect();

    if options.mode.includes_rfm() {
        let scored = score_customers(&metrics, config.score_cardinality, &config.segment_rules)?;
        for (row, s) in rows.iter_mut().zip(scored) {
            apply_scores(row, s);
        }
    }

    let mut models = FittedModels::default();
    let mut clv_method = None;
    let mut fallback_reason = None;
    let mut churn_rate = None;
    let mut model_columns = false;

    if options.mode.includes_clv() {
        let result = estimate_values(&metrics, &histories, config, options)?;
        let values: Vec<f64> = result.estimates.iter().map(|e| e.clv).collect();
        let tiers = ValueBucketer::new(config.bucket_labels.clone())?
            .with_top_tier_split(config.split_top_tier)
            .assign(&values)?;

        for ((row, estimate), tier) in rows.iter_mut().zip(result.estimates).zip(tiers) {
            row.expected_transactions = estimate.expected_transactions;
            row.expected_average_value = estimate.expected_average_value;
            row.probability_alive = estimate.probability_alive;
            row.clv = Some(estimate.clv);
            row.clv_segment = Some(tier);
        }

        model_columns = result.method == ClvMethod::Probabilistic;
        models = result.models;
        clv_method = Some(result.method);
        fallback_reason = result.fallback_reason;
        churn_rate = result.churn_rate;
    }

    let excluded_customers: Vec<String> = excluded.into_iter().collect();
    info!(
        customers = rows.len(),
        excluded = excluded_customers.len(),
        "Valuation run complete"
    );

    let diagnostics = RunDiagnostics {
        analysis_date: calculator.analysis_date(),
        transactions: table.len(),
        skipped_rows: table.skipped_rows(),
        customers: rows.len(),
        excluded_customers,
        outliers,
        clv_method,
        fallback_reason,
        churn_rate,
    };

    Ok(ValuationOutcome {
        table: ValuationTable {
            mode: options.mode,
            model_columns,
            rows,
        },
        models,
        diagnostics,
    })
}

fn apply_scores(row: &mut CustomerValuation, scored: ScoredCustomer) {
    row.recency_score = Some(scored.recency_score);
    row.frequency_score = Some(scored.frequency_score);
    row.monetary_score = Some(scored.monetary_score);
    row.rfm_score = Some(scored.rfm_score);
    row.segment = Some(scored.segment);
}

fn estimate_values(
    metrics: &[CustomerMetrics],
    histories: &[CustomerHistory],
    config: &ValuationConfig,
    options: &RunOptions,
) -> Result<ClvResult> {
    if options.method == ClvMethod::Probabilistic {
        match estimate_with_models(histories, config) {
            Ok(result) => return Ok(result),
            Err(err) if err.is_convergence() && options.fallback_to_heuristic => {
                warn!(error = %err, "Model fit failed, falling back to heuristic values");
                let mut result = estimate_heuristic(metrics, config)?;
                result.fallback_reason = Some(err.to_string());
                return Ok(result);
            }
            Err(err) => return Err(err),
        }
    }
    estimate_heuristic(metrics, config)
}

fn estimate_with_models(histories: &[CustomerHistory], config: &ValuationConfig) -> Result<ClvResult> {
    let transaction_model = BetaGeoModel::fit(histories, config.penalizer_frequency, &config.solver)?;
    let monetary_model = GammaGammaModel::fit(histories, config.penalizer_monetary, &config.solver)?;

    let estimator = ValueEstimator::from_config(config)?;
    let estimates = estimator.estimate(&transaction_model, &monetary_model, histories)?;

    Ok(ClvResult {
        estimates,
        method: ClvMethod::Probabilistic,
        models: FittedModels {
            transaction: Some(transaction_model.params()),
            transaction_fit: transaction_model.fit_summary().cloned(),
            monetary: Some(monetary_model.params()),
            monetary_fit: monetary_model.fit_summary().cloned(),
        },
        fallback_reason: None,
        churn_rate: None,
    })
}

fn estimate_heuristic(metrics: &[CustomerMetrics], config: &ValuationConfig) -> Result<ClvResult> {
    let valuation = heuristic_values(metrics, config.profit_margin)?;
    Ok(ClvResult {
        estimates: valuation.estimates,
        method: ClvMethod::Heuristic,
        models: FittedModels::default(),
        fallback_reason: None,
        churn_rate: Some(valuation.churn_rate),
    })
}
