//! Probabilistic customer models
//!
//! A transaction model predicts how many purchases a customer will make over
//! a horizon; a monetary model predicts the customer's expected average
//! transaction value. Both are fit by penalised maximum likelihood and can
//! also be built from known parameters.

pub mod bgnbd;
pub mod gamma_gamma;

use serde::Serialize;
use tracing::debug;

use super::error::Result;
use super::metrics::CustomerHistory;
use super::solver::{minimize, SolverConfig, SolverResult};

pub use bgnbd::{BetaGeoModel, BetaGeoParams};
pub use gamma_gamma::{GammaGammaModel, GammaGammaParams};

/// Smallest accepted parameter value
pub const PARAM_LOWER_BOUND: f64 = 1e-8;
/// Largest accepted parameter value
pub const PARAM_UPPER_BOUND: f64 = 1e8;

/// Purchase-count model
pub trait TransactionModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Expected number of purchases in the next `horizon` periods.
    /// Non-negative and non-decreasing in `horizon`.
    fn expected_purchases(&self, horizon: f64, customer: &CustomerHistory) -> Result<f64>;

    /// Probability that the customer is still active at the end of the
    /// observation window
    fn probability_alive(&self, customer: &CustomerHistory) -> f64;
}

/// Conditional per-transaction value model
pub trait MonetaryModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Expected average transaction value given the customer's history
    fn conditional_expected_value(&self, customer: &CustomerHistory) -> Result<f64>;
}

/// Diagnostics of a completed fit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitSummary {
    pub customers: usize,
    /// Unpenalised log-likelihood at the fitted parameters
    pub log_likelihood: f64,
    pub iterations: usize,
    pub solve_time_ms: u64,
}

/// Minimise `mean_negative_ll(params) + penalizer * sum(params^2)` over
/// log-parameters, starting from all parameters equal to 1.
pub(crate) fn fit_penalized<F>(
    model: &'static str,
    dimension: usize,
    penalizer: f64,
    solver: &SolverConfig,
    mean_negative_ll: F,
) -> Result<(Vec<f64>, SolverResult)>
where
    F: Fn(&[f64]) -> f64,
{
    let objective = |log_params: &[f64]| {
        let params: Vec<f64> = log_params.iter().map(|v| v.exp()).collect();
        let penalty: f64 = params.iter().map(|p| p * p).sum();
        mean_negative_ll(&params) + penalizer * penalty
    };

    let result = minimize(model, objective, &vec![0.0; dimension], solver)?;
    let params: Vec<f64> = result.point.iter().map(|v| v.exp()).collect();
    debug!(model, ?params, objective = result.value, "Penalised fit finished");
    Ok((params, result))
}

/// First parameter outside `[PARAM_LOWER_BOUND, PARAM_UPPER_BOUND]`, as a reason
pub(crate) fn out_of_bounds(names: &[&str], params: &[f64]) -> Option<String> {
    names.iter().zip(params).find_map(|(name, &value)| {
        if value.is_finite() && (PARAM_LOWER_BOUND..=PARAM_UPPER_BOUND).contains(&value) {
            None
        } else {
            Some(format!(
                "parameter {} = {:e} is outside [{:e}, {:e}]",
                name, value, PARAM_LOWER_BOUND, PARAM_UPPER_BOUND
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_bounds() {
        assert!(out_of_bounds(&["r", "alpha"], &[1.0, 2.0]).is_none());
        let reason = out_of_bounds(&["r", "alpha"], &[1.0, 1e-12]).unwrap();
        assert!(reason.contains("alpha"));
        assert!(out_of_bounds(&["r"], &[f64::NAN]).is_some());
    }

    #[test]
    fn test_fit_penalized_recovers_scale() {
        // Exponential likelihood with rate 2 observed at mean 0.5
        let mean_nll = |p: &[f64]| -(p[0].ln() - p[0] * 0.5);
        let (params, _) = fit_penalized("test", 1, 0.0, &SolverConfig::default(), mean_nll).unwrap();
        assert!((params[0] - 2.0).abs() < 1e-3);
    }
}
