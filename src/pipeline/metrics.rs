//! Per-customer metric aggregation
//!
//! Two variants are derived from the same completed purchases:
//! calendar RFM metrics relative to the analysis date, and the model
//! covariates (repeat span, tenure, average value) relative to each
//! customer's own first purchase.

use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, warn};

use super::config::PeriodUnit;
use super::error::{Result, ValuationError};
use super::transactions::TransactionTable;

/// Days added to the last purchase date when no analysis date is configured
pub const DEFAULT_ANALYSIS_OFFSET_DAYS: i64 = 2;

/// Calendar RFM metrics of one customer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerMetrics {
    pub customer_id: String,
    /// Whole days from the last purchase to the analysis date
    pub recency: i64,
    /// Distinct purchase events (invoices)
    pub frequency: u32,
    /// Total spend
    pub monetary: f64,
}

/// Model covariates of one customer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerHistory {
    pub customer_id: String,
    /// Distinct purchase events, at least 1
    pub frequency: u32,
    /// Periods between first and last purchase (0 for a single purchase)
    pub recency: f64,
    /// Periods between first purchase and the analysis date
    pub tenure: f64,
    /// Total spend divided by frequency
    pub average_value: f64,
    pub total_value: f64,
}

impl CustomerHistory {
    /// Repeat purchases after the first one
    pub fn repeat_purchases(&self) -> f64 {
        f64::from(self.frequency.saturating_sub(1))
    }
}

/// Aggregated rows plus the customers that could not be represented
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRows<T> {
    pub customers: Vec<T>,
    /// Customer ids left out, in id order
    pub excluded: Vec<String>,
}

/// Aggregates transactions into per-customer metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricCalculator {
    analysis_date: NaiveDate,
    unit: PeriodUnit,
}

struct Accumulator<'a> {
    invoices: HashSet<&'a str>,
    first: NaiveDateTime,
    last: NaiveDateTime,
    total: f64,
}

impl MetricCalculator {
    pub fn new(analysis_date: NaiveDate, unit: PeriodUnit) -> Self {
        Self {
            analysis_date,
            unit,
        }
    }

    /// Build a calculator for `table`, defaulting the analysis date to the
    /// last completed purchase plus two days.
    pub fn for_table(
        table: &TransactionTable,
        analysis_date: Option<NaiveDate>,
        unit: PeriodUnit,
    ) -> Result<Self> {
        Ok(Self::new(resolve_analysis_date(table, analysis_date)?, unit))
    }

    pub fn analysis_date(&self) -> NaiveDate {
        self.analysis_date
    }

    pub fn unit(&self) -> PeriodUnit {
        self.unit
    }

    /// RFM metrics for every customer with a completed purchase, ordered by
    /// customer id. Customers with a negative total spend are excluded.
    pub fn rfm_metrics(&self, table: &TransactionTable) -> MetricRows<CustomerMetrics> {
        let reference = self.reference_time();
        let mut customers = Vec::new();
        let mut excluded = Vec::new();

        for (customer_id, acc) in aggregate(table) {
            if acc.total < 0.0 {
                excluded.push(customer_id.to_string());
                continue;
            }
            customers.push(CustomerMetrics {
                customer_id: customer_id.to_string(),
                recency: (reference - acc.last).num_days().max(0),
                frequency: acc.invoices.len() as u32,
                monetary: acc.total,
            });
        }

        if !excluded.is_empty() {
            warn!(
                excluded = excluded.len(),
                "Excluded customers with negative total spend from RFM metrics"
            );
        }
        debug!(customers = customers.len(), "Computed RFM metrics");

        MetricRows {
            customers,
            excluded,
        }
    }

    /// Model covariates for every customer, ordered by customer id.
    ///
    /// Single-purchase customers are kept with `recency = 0`. Customers whose
    /// average value is not positive cannot enter the monetary model and are
    /// excluded.
    pub fn customer_histories(&self, table: &TransactionTable) -> MetricRows<CustomerHistory> {
        let reference = self.reference_time();
        let unit_days = self.unit.unit_days() as f64;
        let mut customers = Vec::new();
        let mut excluded = Vec::new();

        for (customer_id, acc) in aggregate(table) {
            let frequency = acc.invoices.len() as u32;
            let average_value = acc.total / f64::from(frequency);
            if average_value.is_nan() || average_value <= 0.0 {
                excluded.push(customer_id.to_string());
                continue;
            }
            customers.push(CustomerHistory {
                customer_id: customer_id.to_string(),
                frequency,
                recency: (acc.last - acc.first).num_days() as f64 / unit_days,
                tenure: (reference - acc.first).num_days().max(0) as f64 / unit_days,
                average_value,
                total_value: acc.total,
            });
        }

        if !excluded.is_empty() {
            warn!(
                excluded = excluded.len(),
                "Excluded customers with non-positive average value from the model inputs"
            );
        }
        debug!(customers = customers.len(), unit = %self.unit, "Computed customer histories");

        MetricRows {
            customers,
            excluded,
        }
    }

    fn reference_time(&self) -> NaiveDateTime {
        self.analysis_date.and_time(chrono::NaiveTime::MIN)
    }
}

/// Analysis date for `table`: the configured date, or the last completed
/// purchase date plus two days.
pub fn resolve_analysis_date(
    table: &TransactionTable,
    configured: Option<NaiveDate>,
) -> Result<NaiveDate> {
    let latest = table
        .latest_timestamp()
        .ok_or_else(|| ValuationError::InsufficientData {
            stage: "metric calculation",
            customers: 0,
            reason: "no completed transactions".to_string(),
        })?
        .date();

    match configured {
        Some(date) if date < latest => Err(ValuationError::invalid_config(format!(
            "analysis date {} precedes the last purchase on {}",
            date, latest
        ))),
        Some(date) => Ok(date),
        None => Ok(latest + Duration::days(DEFAULT_ANALYSIS_OFFSET_DAYS)),
    }
}

fn aggregate(table: &TransactionTable) -> BTreeMap<&str, Accumulator<'_>> {
    let mut customers: BTreeMap<&str, Accumulator<'_>> = BTreeMap::new();

    for record in table.completed() {
        let acc = customers
            .entry(record.customer_id.as_str())
            .or_insert_with(|| Accumulator {
                invoices: HashSet::new(),
                first: record.timestamp,
                last: record.timestamp,
                total: 0.0,
            });
        acc.invoices.insert(record.invoice_id.as_str());
        acc.first = acc.first.min(record.timestamp);
        acc.last = acc.last.max(record.timestamp);
        acc.total += record.amount();
    }

    customers
}
