//! Transaction records and their extraction from a dataframe

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, warn};

use super::config::ColumnNames;
use super::error::{Result, ValuationError};

/// One line of a cleaned transaction table
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub customer_id: String,
    pub invoice_id: String,
    pub timestamp: NaiveDateTime,
    pub quantity: f64,
    pub unit_price: f64,
    pub is_cancellation: bool,
}

impl TransactionRecord {
    /// Line amount (`quantity * unit_price`)
    pub fn amount(&self) -> f64 {
        self.quantity * self.unit_price
    }
}

/// An immutable snapshot of transactions for one valuation run
#[derive(Debug, Clone, Default)]
pub struct TransactionTable {
    records: Vec<TransactionRecord>,
    skipped_rows: usize,
}

impl TransactionTable {
    pub fn new(records: Vec<TransactionRecord>) -> Self {
        Self {
            records,
            skipped_rows: 0,
        }
    }

    /// Extract records from `df` using the configured column names.
    ///
    /// Fails with `MissingField` before reading any value if a required
    /// column is absent. Rows with a null in a required field are skipped and
    /// counted; a present but uninterpretable timestamp fails with
    /// `InvalidField`.
    pub fn from_dataframe(df: &DataFrame, columns: &ColumnNames) -> Result<Self> {
        let available: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        for required in columns.required() {
            if !available.iter().any(|c| c == required) {
                return Err(ValuationError::MissingField {
                    column: required.to_string(),
                    available,
                });
            }
        }

        let customer_ids = id_values(df, &columns.customer_id)?;
        let invoice_ids = id_values(df, &columns.invoice_id)?;
        let timestamps = timestamp_values(df, &columns.timestamp)?;
        let quantities = numeric_values(df, &columns.quantity)?;
        let unit_prices = numeric_values(df, &columns.unit_price)?;
        let cancellations = if available.iter().any(|c| c == &columns.is_cancellation) {
            Some(flag_values(df, &columns.is_cancellation)?)
        } else {
            debug!(
                column = %columns.is_cancellation,
                "Cancellation column absent, treating every row as a completed purchase"
            );
            None
        };

        let mut records = Vec::with_capacity(df.height());
        let mut skipped_rows = 0usize;

        for row in 0..df.height() {
            let fields = (
                customer_ids[row].as_ref(),
                invoice_ids[row].as_ref(),
                timestamps[row],
                quantities[row],
                unit_prices[row],
            );
            let (Some(customer_id), Some(invoice_id), Some(timestamp), Some(quantity), Some(unit_price)) =
                fields
            else {
                skipped_rows += 1;
                continue;
            };

            records.push(TransactionRecord {
                customer_id: customer_id.clone(),
                invoice_id: invoice_id.clone(),
                timestamp,
                quantity,
                unit_price,
                is_cancellation: cancellations
                    .as_ref()
                    .and_then(|flags| flags[row])
                    .unwrap_or(false),
            });
        }

        if skipped_rows > 0 {
            warn!(
                skipped_rows,
                total_rows = df.height(),
                "Skipped rows with missing required fields"
            );
        }

        Ok(Self {
            records,
            skipped_rows,
        })
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut [TransactionRecord] {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows dropped during extraction because a required field was null
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// Non-cancelled records
    pub fn completed(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.records.iter().filter(|r| !r.is_cancellation)
    }

    /// Timestamp of the latest completed purchase
    pub fn latest_timestamp(&self) -> Option<NaiveDateTime> {
        self.completed().map(|r| r.timestamp).max()
    }
}

/// Identifier column as strings; float ids are rendered as integers.
fn id_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = df.column(name)?.as_materialized_series();
    let series = if series.dtype().is_float() {
        series.cast(&DataType::Int64)?.cast(&DataType::String)?
    } else {
        series.cast(&DataType::String)?
    };
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
        .collect())
}

fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .strict_cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

fn flag_values(df: &DataFrame, name: &str) -> Result<Vec<Option<bool>>> {
    let series = df.column(name)?.as_materialized_series();
    if series.dtype() == &DataType::Boolean {
        return Ok(series.bool()?.into_iter().collect());
    }

    let as_text = series.cast(&DataType::String)?;
    as_text
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            None => Ok(None),
            Some(text) => parse_flag(text).map(Some).ok_or_else(|| ValuationError::InvalidField {
                column: name.to_string(),
                row,
                value: text.to_string(),
            }),
        })
        .collect()
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" | "" => Some(false),
        _ => None,
    }
}

fn timestamp_values(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDateTime>>> {
    let series = df.column(name)?.as_materialized_series();

    match series.dtype() {
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let raw = series.cast(&DataType::Int64)?;
            raw.i64()?
                .into_iter()
                .enumerate()
                .map(|(row, value)| match value {
                    None => Ok(None),
                    Some(v) => from_epoch(v, unit).map(Some).ok_or_else(|| {
                        ValuationError::InvalidField {
                            column: name.to_string(),
                            row,
                            value: v.to_string(),
                        }
                    }),
                })
                .collect()
        }
        DataType::Date => {
            let raw = series.cast(&DataType::Int32)?;
            raw.i32()?
                .into_iter()
                .enumerate()
                .map(|(row, value)| match value {
                    None => Ok(None),
                    Some(days) => from_epoch_days(days).map(Some).ok_or_else(|| {
                        ValuationError::InvalidField {
                            column: name.to_string(),
                            row,
                            value: days.to_string(),
                        }
                    }),
                })
                .collect()
        }
        _ => {
            let text = series.cast(&DataType::String)?;
            text.str()?
                .into_iter()
                .enumerate()
                .map(|(row, value)| match value.map(str::trim) {
                    None | Some("") => Ok(None),
                    Some(v) => parse_timestamp(v).map(Some).ok_or_else(|| {
                        ValuationError::InvalidField {
                            column: name.to_string(),
                            row,
                            value: v.to_string(),
                        }
                    }),
                })
                .collect()
        }
    }
}

fn from_epoch(value: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let datetime = match unit {
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value)?,
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value)?,
        TimeUnit::Nanoseconds => DateTime::from_timestamp_nanos(value),
    };
    Some(datetime.naive_utc())
}

fn from_epoch_days(days: i32) -> Option<NaiveDateTime> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    epoch
        .checked_add_signed(chrono::Duration::days(days as i64))?
        .and_hms_opt(0, 0, 0)
}

const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d.%m.%Y %H:%M",
];

/// Parse a timestamp in any of the accepted textual forms
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc());
    }
    for format in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}
