//! Shared test utilities and fixture generators

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use custval::pipeline::{TransactionRecord, TransactionTable};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use tempfile::TempDir;

/// Timestamp format used when fixtures are written as text
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A small retail log with known characteristics:
/// - 10 customers, every last-purchase date and every total spend distinct
/// - `c03` has three invoices totalling 125.0
/// - `c05` has a cancelled return that must be ignored (total 10.0)
/// - `c08` has one invoice with two lines (frequency 1, total 22.0)
/// - `c06` purchased last, on 2023-06-10, so the default analysis date is 2023-06-12
pub fn create_retail_dataframe() -> DataFrame {
    df! {
        "customer_id" => [
            "c01", "c01", "c02", "c03", "c03", "c03", "c04", "c05", "c05",
            "c06", "c06", "c07", "c08", "c08", "c09", "c09", "c10",
        ],
        "invoice_id" => [
            "I001", "I002", "I003", "I004", "I005", "I006", "I007", "I008", "C009",
            "I010", "I011", "I012", "I013", "I013", "I014", "I015", "I016",
        ],
        "timestamp" => [
            "2023-03-01 10:00:00", "2023-05-20 11:30:00", "2023-04-02 09:15:00",
            "2023-01-15 14:00:00", "2023-02-10 16:45:00", "2023-06-01 08:00:00",
            "2023-02-28 12:00:00", "2023-05-05 13:00:00", "2023-05-06 10:00:00",
            "2023-03-18 15:20:00", "2023-06-10 18:00:00", "2023-01-05 09:00:00",
            "2023-04-25 17:10:00", "2023-04-25 17:10:00", "2023-05-29 12:00:00",
            "2023-05-30 12:30:00", "2023-02-14 19:45:00",
        ],
        "quantity" => [
            2.0f64, 1.0, 10.0, 3.0, 1.0, 2.0, 1.0, 4.0, -4.0,
            6.0, 2.0, 1.0, 5.0, 1.0, 2.0, 1.0, 3.0,
        ],
        "unit_price" => [
            5.0f64, 12.5, 1.2, 20.0, 35.0, 15.0, 99.99, 2.5, 2.5,
            4.0, 4.0, 250.0, 3.0, 7.0, 30.0, 45.0, 9.0,
        ],
        "is_cancellation" => [
            false, false, false, false, false, false, false, false, true,
            false, false, false, false, false, false, false, false,
        ],
    }
    .unwrap()
}

/// Parameters of the generative purchase and spend processes.
///
/// Shapes are integers so gamma draws can be built from exponential sums.
#[derive(Debug, Clone, Copy)]
pub struct PopulationParams {
    /// Purchase rate ~ Gamma(r, alpha), per week
    pub r: u32,
    pub alpha: f64,
    /// Dropout probability after each repeat purchase ~ Beta(a, b)
    pub a: u32,
    pub b: u32,
    /// Spend per purchase ~ Gamma(p, nu) with nu ~ Gamma(q, v)
    pub p: u32,
    pub q: u32,
    pub v: f64,
}

impl Default for PopulationParams {
    fn default() -> Self {
        Self {
            r: 2,
            alpha: 4.0,
            a: 2,
            b: 6,
            p: 6,
            q: 4,
            v: 15.0,
        }
    }
}

/// Length of the simulated observation window in weeks
pub const OBSERVATION_WEEKS: f64 = 52.0;

pub fn population_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Analysis date two days after the end of the observation window
pub fn population_analysis_date() -> NaiveDate {
    population_start().date() + Duration::days(366)
}

fn exponential(rng: &mut StdRng, rate: f64) -> f64 {
    let u: f64 = rng.gen();
    -(1.0 - u).ln() / rate
}

fn erlang(rng: &mut StdRng, shape: u32, rate: f64) -> f64 {
    (0..shape).map(|_| exponential(rng, rate)).sum()
}

fn beta(rng: &mut StdRng, a: u32, b: u32) -> f64 {
    let x = erlang(rng, a, 1.0);
    let y = erlang(rng, b, 1.0);
    x / (x + y)
}

/// Simulate purchase histories for `customers` customers.
///
/// Customers arrive uniformly over the first 40 weeks, purchase at a
/// Poisson rate, and may drop out after each repeat purchase. Every 25th
/// customer also has a cancellation line that must not count.
pub fn synthetic_records(customers: usize, seed: u64, params: PopulationParams) -> Vec<TransactionRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = population_start();
    let mut records = Vec::new();

    for i in 0..customers {
        let customer_id = format!("C{:05}", i);
        let birth: f64 = rng.gen_range(0.0..40.0);
        let rate = erlang(&mut rng, params.r, params.alpha);
        let dropout = beta(&mut rng, params.a, params.b);
        let nu = erlang(&mut rng, params.q, params.v);

        let mut times = vec![birth];
        let mut t = birth;
        loop {
            t += exponential(&mut rng, rate);
            if t > OBSERVATION_WEEKS {
                break;
            }
            times.push(t);
            if rng.gen::<f64>() < dropout {
                break;
            }
        }

        for (k, week) in times.iter().enumerate() {
            let spend = erlang(&mut rng, params.p, nu);
            let quantity = f64::from(rng.gen_range(1u32..=4));
            records.push(TransactionRecord {
                customer_id: customer_id.clone(),
                invoice_id: format!("{}-{:03}", customer_id, k),
                timestamp: start + Duration::seconds((week * 7.0 * 86_400.0) as i64),
                quantity,
                unit_price: spend / quantity,
                is_cancellation: false,
            });
        }

        if i % 25 == 0 {
            let first = records[records.len() - times.len()].clone();
            records.push(TransactionRecord {
                invoice_id: format!("{}-RET", customer_id),
                timestamp: first.timestamp + Duration::days(1),
                quantity: -first.quantity,
                is_cancellation: true,
                ..first
            });
        }
    }

    records
}

pub fn synthetic_table(customers: usize, seed: u64) -> TransactionTable {
    TransactionTable::new(synthetic_records(customers, seed, PopulationParams::default()))
}

/// One purchase per customer, three days apart, each spending more than the last
pub fn single_purchase_records(customers: usize) -> Vec<TransactionRecord> {
    let start = population_start();
    (0..customers)
        .map(|i| TransactionRecord {
            customer_id: format!("S{:03}", i),
            invoice_id: format!("INV{:03}", i),
            timestamp: start + Duration::days(3 * i as i64),
            quantity: 1.0,
            unit_price: 10.0 + 5.0 * i as f64,
            is_cancellation: false,
        })
        .collect()
}

/// A population with no repeat purchases at all
pub fn single_purchase_table(customers: usize) -> TransactionTable {
    TransactionTable::new(single_purchase_records(customers))
}

/// Records as a dataframe with the default column names and text timestamps
pub fn records_to_dataframe(records: &[TransactionRecord]) -> DataFrame {
    df! {
        "customer_id" => records.iter().map(|r| r.customer_id.clone()).collect::<Vec<String>>(),
        "invoice_id" => records.iter().map(|r| r.invoice_id.clone()).collect::<Vec<String>>(),
        "timestamp" => records
            .iter()
            .map(|r| r.timestamp.format(TIMESTAMP_FORMAT).to_string())
            .collect::<Vec<String>>(),
        "quantity" => records.iter().map(|r| r.quantity).collect::<Vec<f64>>(),
        "unit_price" => records.iter().map(|r| r.unit_price).collect::<Vec<f64>>(),
        "is_cancellation" => records.iter().map(|r| r.is_cancellation).collect::<Vec<bool>>(),
    }
    .unwrap()
}

/// Create a temporary directory with a test CSV file
pub fn create_temp_csv(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("transactions.csv");

    let mut file = std::fs::File::create(&csv_path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();

    (temp_dir, csv_path)
}

/// Create a temporary directory with a test Parquet file
pub fn create_temp_parquet(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let parquet_path = temp_dir.path().join("transactions.parquet");

    let file = std::fs::File::create(&parquet_path).unwrap();
    ParquetWriter::new(file).finish(df).unwrap();

    (temp_dir, parquet_path)
}

/// Assert that a DataFrame has expected shape
pub fn assert_shape(df: &DataFrame, expected_rows: usize, expected_cols: usize) {
    let (rows, cols) = df.shape();
    assert_eq!(rows, expected_rows, "Row count mismatch: expected {}, got {}", expected_rows, rows);
    assert_eq!(cols, expected_cols, "Column count mismatch: expected {}, got {}", expected_cols, cols);
}

/// Assert that a DataFrame has exactly these columns, in order
pub fn assert_columns(df: &DataFrame, expected_cols: &[&str]) {
    let actual: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    assert_eq!(actual, expected_cols, "Column mismatch");
}

pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {} within {} of {}",
        actual,
        tolerance,
        expected
    );
}
