//! Customer lifetime value estimation
//!
//! The probabilistic path combines a transaction model and a monetary model
//! over a horizon of whole months, discounting each month's expected cash
//! flow. The heuristic path needs no fitting and works from aggregate
//! averages. Both produce one [`ClvEstimate`] per customer.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use super::config::{PeriodUnit, ValuationConfig};
use super::error::{Result, ValuationError};
use super::metrics::{CustomerHistory, CustomerMetrics};
use super::models::{MonetaryModel, TransactionModel};

/// Forward-looking value of one customer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClvEstimate {
    pub customer_id: String,
    /// Expected purchases over the whole horizon (probabilistic path only)
    pub expected_transactions: Option<f64>,
    /// Expected average transaction value (probabilistic path only)
    pub expected_average_value: Option<f64>,
    /// Probability of still being active (probabilistic path only)
    pub probability_alive: Option<f64>,
    pub clv: f64,
}

/// Discounted value over a horizon of whole months
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueEstimator {
    horizon_months: u32,
    unit: PeriodUnit,
    discount_rate: f64,
}

impl ValueEstimator {
    pub fn new(horizon_months: u32, unit: PeriodUnit, discount_rate: f64) -> Result<Self> {
        if horizon_months == 0 {
            return Err(ValuationError::invalid_config("horizon_months must be positive"));
        }
        if !(0.0..1.0).contains(&discount_rate) {
            return Err(ValuationError::invalid_config(format!(
                "discount_rate must be in [0, 1), got {}",
                discount_rate
            )));
        }
        Ok(Self {
            horizon_months,
            unit,
            discount_rate,
        })
    }

    pub fn from_config(config: &ValuationConfig) -> Result<Self> {
        Self::new(config.horizon_months, config.period_unit, config.discount_rate)
    }

    /// Value of a single customer.
    ///
    /// Month `i` contributes the purchases expected between `i - 1` and `i`
    /// months out, times the expected average value, divided by
    /// `(1 + discount_rate)^i`.
    pub fn customer_value(
        &self,
        transactions: &dyn TransactionModel,
        monetary: &dyn MonetaryModel,
        customer: &CustomerHistory,
    ) -> Result<ClvEstimate> {
        let per_month = self.unit.periods_per_month();
        let average_value = monetary.conditional_expected_value(customer)?;

        let mut clv = 0.0;
        let mut cumulative = 0.0;
        for month in 1..=self.horizon_months {
            let expected = transactions.expected_purchases(f64::from(month) * per_month, customer)?;
            // Guard against rounding making an increment negative
            let increment = (expected - cumulative).max(0.0);
            cumulative = cumulative.max(expected);
            clv += increment * average_value / (1.0 + self.discount_rate).powi(month as i32);
        }

        Ok(ClvEstimate {
            customer_id: customer.customer_id.clone(),
            expected_transactions: Some(cumulative),
            expected_average_value: Some(average_value),
            probability_alive: Some(transactions.probability_alive(customer)),
            clv,
        })
    }

    /// Values for every customer, in input order
    pub fn estimate(
        &self,
        transactions: &dyn TransactionModel,
        monetary: &dyn MonetaryModel,
        histories: &[CustomerHistory],
    ) -> Result<Vec<ClvEstimate>> {
        let estimates = histories
            .par_iter()
            .map(|customer| self.customer_value(transactions, monetary, customer))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            customers = estimates.len(),
            horizon_months = self.horizon_months,
            discount_rate = self.discount_rate,
            transaction_model = transactions.name(),
            monetary_model = monetary.name(),
            "Estimated probabilistic lifetime values"
        );
        Ok(estimates)
    }
}

/// Output of the heuristic value path
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicValuation {
    pub estimates: Vec<ClvEstimate>,
    /// Share of customers with more than one purchase
    pub repeat_rate: f64,
    pub churn_rate: f64,
}

/// Lifetime value from aggregate statistics:
/// `(average_order_value * purchase_frequency / churn_rate) * (total * profit_margin)`.
///
/// Fails with `InsufficientData` when there are no customers or every
/// customer purchased more than once (churn rate of zero).
pub fn heuristic_values(metrics: &[CustomerMetrics], profit_margin: f64) -> Result<HeuristicValuation> {
    if metrics.is_empty() {
        return Err(ValuationError::InsufficientData {
            stage: "heuristic value",
            customers: 0,
            reason: "no customers".to_string(),
        });
    }

    let customers = metrics.len() as f64;
    let repeaters = metrics.iter().filter(|m| m.frequency > 1).count();
    let repeat_rate = repeaters as f64 / customers;
    let churn_rate = 1.0 - repeat_rate;
    if churn_rate <= 0.0 {
        return Err(ValuationError::InsufficientData {
            stage: "heuristic value",
            customers: metrics.len(),
            reason: "churn rate is zero because every customer purchased more than once".to_string(),
        });
    }

    let estimates = metrics
        .iter()
        .map(|m| {
            let frequency = f64::from(m.frequency);
            let average_order_value = m.monetary / frequency;
            let purchase_frequency = frequency / customers;
            let profit = m.monetary * profit_margin;
            ClvEstimate {
                customer_id: m.customer_id.clone(),
                expected_transactions: None,
                expected_average_value: None,
                probability_alive: None,
                clv: (average_order_value * purchase_frequency / churn_rate) * profit,
            }
        })
        .collect();

    info!(repeat_rate, churn_rate, "Computed heuristic lifetime values");

    Ok(HeuristicValuation {
        estimates,
        repeat_rate,
        churn_rate,
    })
}
