//! Upper-tail capping of quantity and unit price

use serde::Serialize;
use tracing::info;

use super::binning::quantile;
use super::transactions::TransactionTable;

const LOWER_QUANTILE: f64 = 0.01;
const UPPER_QUANTILE: f64 = 0.99;
const IQR_MULTIPLIER: f64 = 1.5;

/// Result of capping one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CappedColumn {
    pub threshold: f64,
    pub capped: usize,
}

/// Capping applied to a transaction table
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutlierReport {
    pub quantity: CappedColumn,
    pub unit_price: CappedColumn,
}

impl OutlierReport {
    pub fn total_capped(&self) -> usize {
        self.quantity.capped + self.unit_price.capped
    }
}

/// Upper threshold `q99 + 1.5 * (q99 - q01)` of `values`
pub fn upper_threshold(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    let low = quantile(&sorted, LOWER_QUANTILE);
    let high = quantile(&sorted, UPPER_QUANTILE);
    high + IQR_MULTIPLIER * (high - low)
}

/// Cap quantity and unit price of completed purchases at their upper threshold.
///
/// Thresholds are computed over completed purchases only; cancellations are
/// left untouched since they never enter the metrics.
pub fn cap_outliers(table: &mut TransactionTable) -> OutlierReport {
    let quantities: Vec<f64> = table.completed().map(|r| r.quantity).collect();
    let prices: Vec<f64> = table.completed().map(|r| r.unit_price).collect();

    let quantity_limit = upper_threshold(&quantities);
    let price_limit = upper_threshold(&prices);

    let mut report = OutlierReport {
        quantity: CappedColumn {
            threshold: quantity_limit,
            capped: 0,
        },
        unit_price: CappedColumn {
            threshold: price_limit,
            capped: 0,
        },
    };

    for record in table.records_mut().iter_mut().filter(|r| !r.is_cancellation) {
        if record.quantity > quantity_limit {
            record.quantity = quantity_limit;
            report.quantity.capped += 1;
        }
        if record.unit_price > price_limit {
            record.unit_price = price_limit;
            report.unit_price.capped += 1;
        }
    }

    info!(
        quantity_threshold = quantity_limit,
        quantity_capped = report.quantity.capped,
        unit_price_threshold = price_limit,
        unit_price_capped = report.unit_price.capped,
        "Capped transaction outliers"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::transactions::{parse_timestamp, TransactionRecord};

    #[test]
    fn test_upper_threshold() {
        let values: Vec<f64> = (0..=100).map(|v| v as f64).collect();
        // q01 = 1, q99 = 99, limit = 99 + 1.5 * 98
        assert!((upper_threshold(&values) - 246.0).abs() < 1e-9);
    }

    #[test]
    fn test_caps_only_extreme_completed_rows() {
        let timestamp = parse_timestamp("2011-01-01").unwrap();
        let mut records: Vec<TransactionRecord> = (0..200)
            .map(|i| TransactionRecord {
                customer_id: format!("c{}", i % 20),
                invoice_id: i.to_string(),
                timestamp,
                quantity: (i % 10 + 1) as f64,
                unit_price: 2.0,
                is_cancellation: false,
            })
            .collect();
        records[5].quantity = 80_000.0;
        records[6].quantity = 90_000.0;
        records[6].is_cancellation = true;

        let mut table = TransactionTable::new(records);
        let report = cap_outliers(&mut table);

        assert_eq!(report.quantity.capped, 1);
        assert_eq!(report.unit_price.capped, 0);
        assert_eq!(report.total_capped(), 1);
        assert!(table.records()[5].quantity <= report.quantity.threshold);
        assert_eq!(table.records()[6].quantity, 90_000.0);
    }
}
