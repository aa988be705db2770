//! Valuation run configuration
//!
//! One explicit structure is passed into every stage. It deserializes from
//! JSON with every field defaulted, and the CLI overrides individual fields.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::{Result, ValuationError};
use super::segments::SegmentRuleTable;
use super::solver::SolverConfig;

/// Time unit used for the model covariates (recency, tenure) and the
/// frequency model's rate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Day,
    #[default]
    Week,
    Month,
}

impl PeriodUnit {
    /// Calendar days per period
    pub fn unit_days(self) -> i64 {
        match self {
            PeriodUnit::Day => 1,
            PeriodUnit::Week => 7,
            PeriodUnit::Month => 30,
        }
    }

    /// Periods in one month of the value horizon
    pub fn periods_per_month(self) -> f64 {
        match self {
            PeriodUnit::Day => 30.0,
            PeriodUnit::Week => 4.345,
            PeriodUnit::Month => 1.0,
        }
    }
}

impl fmt::Display for PeriodUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodUnit::Day => write!(f, "day"),
            PeriodUnit::Week => write!(f, "week"),
            PeriodUnit::Month => write!(f, "month"),
        }
    }
}

impl FromStr for PeriodUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" | "d" => Ok(PeriodUnit::Day),
            "week" | "w" => Ok(PeriodUnit::Week),
            "month" | "m" => Ok(PeriodUnit::Month),
            _ => Err(format!(
                "Unknown period unit: '{}'. Use 'day', 'week' or 'month'.",
                s
            )),
        }
    }
}

/// Input column names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub customer_id: String,
    pub invoice_id: String,
    pub timestamp: String,
    pub quantity: String,
    pub unit_price: String,
    /// Optional; when the column is absent every row is a completed purchase
    pub is_cancellation: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            customer_id: "customer_id".to_string(),
            invoice_id: "invoice_id".to_string(),
            timestamp: "timestamp".to_string(),
            quantity: "quantity".to_string(),
            unit_price: "unit_price".to_string(),
            is_cancellation: "is_cancellation".to_string(),
        }
    }
}

impl ColumnNames {
    /// Columns that must be present in the input
    pub fn required(&self) -> [&str; 5] {
        [
            &self.customer_id,
            &self.invoice_id,
            &self.timestamp,
            &self.quantity,
            &self.unit_price,
        ]
    }
}

/// Configuration for a valuation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationConfig {
    /// Reference date for recency and tenure (default: last purchase + 2 days)
    pub analysis_date: Option<NaiveDate>,
    /// Number of ordinal score levels
    pub score_cardinality: usize,
    /// Ordered segment rules over the recency/frequency code
    pub segment_rules: SegmentRuleTable,
    /// Value horizon in months
    pub horizon_months: u32,
    pub period_unit: PeriodUnit,
    /// Monthly discount rate in [0, 1)
    pub discount_rate: f64,
    pub penalizer_frequency: f64,
    pub penalizer_monetary: f64,
    pub value_bucket_count: usize,
    /// Tier labels, lowest to highest
    pub bucket_labels: Vec<String>,
    /// Margin applied to total spend on the heuristic value path
    pub profit_margin: f64,
    /// Cap quantity and unit price at the upper outlier threshold
    pub cap_outliers: bool,
    /// Split the top value tier by its median
    pub split_top_tier: bool,
    pub solver: SolverConfig,
    pub columns: ColumnNames,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            analysis_date: None,
            score_cardinality: 5,
            segment_rules: SegmentRuleTable::default(),
            horizon_months: 3,
            period_unit: PeriodUnit::Week,
            discount_rate: 0.01,
            penalizer_frequency: 0.001,
            penalizer_monetary: 0.01,
            value_bucket_count: 4,
            bucket_labels: ["D", "C", "B", "A"].iter().map(|s| s.to_string()).collect(),
            profit_margin: 0.10,
            cap_outliers: false,
            split_top_tier: false,
            solver: SolverConfig::default(),
            columns: ColumnNames::default(),
        }
    }
}

impl ValuationConfig {
    /// Load a configuration from a JSON file; absent fields keep their defaults.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Reject inconsistent values before any data is touched
    pub fn validate(&self) -> Result<()> {
        if !(2..=9).contains(&self.score_cardinality) {
            return Err(ValuationError::invalid_config(format!(
                "score_cardinality must be between 2 and 9, got {}",
                self.score_cardinality
            )));
        }
        if !(0.0..1.0).contains(&self.discount_rate) {
            return Err(ValuationError::invalid_config(format!(
                "discount_rate must be in [0, 1), got {}",
                self.discount_rate
            )));
        }
        for (name, value) in [
            ("penalizer_frequency", self.penalizer_frequency),
            ("penalizer_monetary", self.penalizer_monetary),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ValuationError::invalid_config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.horizon_months == 0 {
            return Err(ValuationError::invalid_config("horizon_months must be positive"));
        }
        if self.value_bucket_count == 0 {
            return Err(ValuationError::invalid_config("value_bucket_count must be positive"));
        }
        if self.bucket_labels.len() != self.value_bucket_count {
            return Err(ValuationError::invalid_config(format!(
                "{} bucket label(s) given for {} bucket(s)",
                self.bucket_labels.len(),
                self.value_bucket_count
            )));
        }
        for (i, label) in self.bucket_labels.iter().enumerate() {
            if self.bucket_labels[..i].contains(label) {
                return Err(ValuationError::invalid_config(format!(
                    "bucket label '{}' is used more than once",
                    label
                )));
            }
        }
        if !self.profit_margin.is_finite() || self.profit_margin <= 0.0 {
            return Err(ValuationError::invalid_config(format!(
                "profit_margin must be positive, got {}",
                self.profit_margin
            )));
        }
        if self.segment_rules.is_empty() {
            return Err(ValuationError::invalid_config("segment rule table is empty"));
        }
        if let Some(rule) = self.segment_rules.rules().iter().find(|r| r.pattern.width() != 2) {
            return Err(ValuationError::invalid_config(format!(
                "segment pattern '{}' must match a two-digit code",
                rule.pattern
            )));
        }
        if self.solver.tolerance.is_nan()
            || self.solver.tolerance <= 0.0
            || self.solver.max_iterations == 0
        {
            return Err(ValuationError::invalid_config(
                "solver tolerance and iteration limit must be positive",
            ));
        }
        Ok(())
    }
}
