//! Command-line argument definitions using clap

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::pipeline::{ClvMethod, PeriodUnit, PipelineMode, RunOptions, ValuationConfig};

/// custval - RFM segmentation and customer lifetime value from transaction logs
#[derive(Parser, Debug)]
#[command(name = "custval")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Input transaction file (CSV or Parquet)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output file path (CSV or Parquet, determined by extension).
    /// Defaults to input directory with '_valuation' suffix (e.g., orders.csv → orders_valuation.csv).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON configuration file. Flags given on the command line override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Which results to compute: "rfm", "clv" or "combined"
    #[arg(long, default_value = "combined")]
    pub mode: PipelineMode,

    /// Lifetime value method: "probabilistic" (BG/NBD + Gamma-Gamma) or "heuristic"
    #[arg(long, default_value = "probabilistic")]
    pub method: ClvMethod,

    /// Reference date for recency and tenure (YYYY-MM-DD).
    /// Defaults to two days after the latest completed transaction.
    #[arg(long)]
    pub analysis_date: Option<NaiveDate>,

    /// Prediction horizon in months
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub horizon_months: Option<u32>,

    /// Time unit for recency and tenure in the models: "day", "week" or "month"
    #[arg(long)]
    pub period_unit: Option<PeriodUnit>,

    /// Monthly discount rate applied to future value (0.0 to <1.0)
    #[arg(long, value_parser = validate_discount_rate)]
    pub discount_rate: Option<f64>,

    /// L2 penalizer for the purchase frequency model
    #[arg(long, value_parser = validate_penalizer)]
    pub penalizer_frequency: Option<f64>,

    /// L2 penalizer for the monetary value model
    #[arg(long, value_parser = validate_penalizer)]
    pub penalizer_monetary: Option<f64>,

    /// Number of value tiers. Tier labels become letters with 'A' as the highest tier.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=26))]
    pub buckets: Option<u8>,

    /// Profit margin used by the heuristic method
    #[arg(long, value_parser = validate_profit_margin)]
    pub profit_margin: Option<f64>,

    /// Cap extreme quantity and unit price values before computing metrics
    #[arg(long, default_value = "false")]
    pub cap_outliers: bool,

    /// Split the highest value tier at its median into two sub-tiers
    #[arg(long, default_value = "false")]
    pub split_top_tier: bool,

    /// Use the heuristic method when a probabilistic model fails to converge
    #[arg(long, default_value = "false")]
    pub fallback_heuristic: bool,

    /// Solver timeout in seconds per model fit
    #[arg(long)]
    pub solver_timeout: Option<u64>,

    /// Write run metadata, fitted parameters and group summaries to this JSON file
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Number of rows to use for schema inference (CSV only).
    /// Use 0 for full table scan (very slow for large files).
    #[arg(long, default_value = "10000")]
    pub infer_schema_length: usize,

    /// Emit debug logs on stderr (RUST_LOG takes precedence)
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the recency x frequency segment map and report unmapped codes
    Rules {
        /// JSON configuration file with custom segment rules
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    pub fn input(&self) -> Option<&PathBuf> {
        self.input.as_ref()
    }

    /// Get the output path, deriving from input if not explicitly provided.
    /// The derived path sits next to the input with a '_valuation' suffix.
    pub fn output_path(&self) -> Option<PathBuf> {
        let input = self.input.as_ref()?;
        Some(self.output.clone().unwrap_or_else(|| {
            let parent = input.parent().unwrap_or_else(|| Path::new("."));
            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output");
            let extension = input
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("parquet");
            parent.join(format!("{}_valuation.{}", stem, extension))
        }))
    }

    /// Load the configuration file (or defaults) and apply command-line overrides
    pub fn valuation_config(&self) -> Result<ValuationConfig> {
        let mut config = match &self.config {
            Some(path) => ValuationConfig::from_json_file(path)?,
            None => ValuationConfig::default(),
        };
        self.apply_overrides(&mut config);
        Ok(config)
    }

    /// Overwrite config values with the flags given on the command line
    pub fn apply_overrides(&self, config: &mut ValuationConfig) {
        if let Some(date) = self.analysis_date {
            config.analysis_date = Some(date);
        }
        if let Some(horizon) = self.horizon_months {
            config.horizon_months = horizon;
        }
        if let Some(unit) = self.period_unit {
            config.period_unit = unit;
        }
        if let Some(rate) = self.discount_rate {
            config.discount_rate = rate;
        }
        if let Some(penalizer) = self.penalizer_frequency {
            config.penalizer_frequency = penalizer;
        }
        if let Some(penalizer) = self.penalizer_monetary {
            config.penalizer_monetary = penalizer;
        }
        if let Some(count) = self.buckets {
            config.value_bucket_count = usize::from(count);
            config.bucket_labels = letter_labels(count);
        }
        if let Some(margin) = self.profit_margin {
            config.profit_margin = margin;
        }
        if let Some(timeout) = self.solver_timeout {
            config.solver.timeout_seconds = timeout;
        }
        config.cap_outliers |= self.cap_outliers;
        config.split_top_tier |= self.split_top_tier;
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            mode: self.mode,
            method: self.method,
            fallback_to_heuristic: self.fallback_heuristic,
        }
    }
}

/// Tier labels lowest to highest, ending in "A"
pub fn letter_labels(count: u8) -> Vec<String> {
    (0..count.min(26))
        .rev()
        .map(|offset| char::from(b'A' + offset).to_string())
        .collect()
}

fn parse_number(s: &str) -> Result<f64, String> {
    s.parse()
        .map_err(|_| format!("'{}' is not a valid number", s))
}

/// Validator for discount_rate parameter
fn validate_discount_rate(s: &str) -> Result<f64, String> {
    let value = parse_number(s)?;
    if (0.0..1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("discount_rate must be in [0.0, 1.0), got {}", value))
    }
}

/// Validator for penalizer parameters
fn validate_penalizer(s: &str) -> Result<f64, String> {
    let value = parse_number(s)?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(format!("penalizer must be a non-negative number, got {}", value))
    }
}

/// Validator for profit_margin parameter
fn validate_profit_margin(s: &str) -> Result<f64, String> {
    let value = parse_number(s)?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("profit_margin must be greater than 0, got {}", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_labels_end_with_highest_tier() {
        assert_eq!(letter_labels(4), vec!["D", "C", "B", "A"]);
        assert_eq!(letter_labels(1), vec!["A"]);
        assert_eq!(letter_labels(26).first().map(String::as_str), Some("Z"));
    }

    #[test]
    fn test_validators_reject_out_of_range() {
        assert!(validate_discount_rate("1.0").is_err());
        assert!(validate_discount_rate("0.05").is_ok());
        assert!(validate_penalizer("-0.1").is_err());
        assert!(validate_profit_margin("0").is_err());
        assert!(validate_profit_margin("abc").is_err());
    }
}
