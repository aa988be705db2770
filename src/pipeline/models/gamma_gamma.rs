//! Gamma-Gamma conditional monetary value model
//!
//! Transaction values of a customer are Gamma(p, nu) with the scale `nu`
//! itself drawn from Gamma(q, v) across customers. The conditional expectation
//! shrinks each customer's observed average towards the population mean, with
//! less shrinkage the more transactions were observed.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{fit_penalized, out_of_bounds, FitSummary, MonetaryModel};
use crate::pipeline::error::{Result, ValuationError};
use crate::pipeline::metrics::CustomerHistory;
use crate::pipeline::solver::special::ln_gamma;
use crate::pipeline::solver::SolverConfig;

pub const MODEL_NAME: &str = "Gamma-Gamma";

const PARAM_NAMES: [&str; 3] = ["p", "q", "v"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GammaGammaParams {
    pub p: f64,
    pub q: f64,
    pub v: f64,
}

impl GammaGammaParams {
    fn from_slice(values: &[f64]) -> Self {
        Self {
            p: values[0],
            q: values[1],
            v: values[2],
        }
    }

    fn instability(&self) -> Option<String> {
        if let Some(reason) = out_of_bounds(&PARAM_NAMES, &[self.p, self.q, self.v]) {
            return Some(reason);
        }
        if self.q <= 1.0 {
            return Some(format!(
                "parameter q = {} must exceed 1 for a finite population mean",
                self.q
            ));
        }
        None
    }

    /// Mean transaction value across the population, `v p / (q - 1)`
    pub fn population_mean(&self) -> f64 {
        self.v * self.p / (self.q - 1.0)
    }
}

fn customer_log_likelihood(params: &GammaGammaParams, x: f64, m: f64) -> f64 {
    let GammaGammaParams { p, q, v } = *params;
    let px = p * x;
    ln_gamma(px + q) - ln_gamma(px) - ln_gamma(q) + q * v.ln() + (px - 1.0) * m.ln()
        + px * x.ln()
        - (px + q) * (x * m + v).ln()
}

fn total_log_likelihood(params: &GammaGammaParams, histories: &[CustomerHistory]) -> f64 {
    histories
        .iter()
        .map(|c| customer_log_likelihood(params, f64::from(c.frequency), c.average_value))
        .sum()
}

/// Fitted or given Gamma-Gamma model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GammaGammaModel {
    params: GammaGammaParams,
    fit: Option<FitSummary>,
}

impl GammaGammaModel {
    /// Fit over (frequency, average value) pairs. Every history must have a
    /// positive average value; single-purchase customers are accepted.
    pub fn fit(
        histories: &[CustomerHistory],
        penalizer: f64,
        solver: &SolverConfig,
    ) -> Result<Self> {
        if histories.is_empty() {
            return Err(ValuationError::InsufficientData {
                stage: "monetary model fit",
                customers: 0,
                reason: "no customer histories".to_string(),
            });
        }
        let non_positive = histories
            .iter()
            .find(|c| c.average_value.is_nan() || c.average_value <= 0.0);
        if let Some(bad) = non_positive {
            return Err(ValuationError::InsufficientData {
                stage: "monetary model fit",
                customers: histories.len(),
                reason: format!(
                    "customer '{}' has non-positive average value {}",
                    bad.customer_id, bad.average_value
                ),
            });
        }

        let n = histories.len() as f64;
        let (values, result) = fit_penalized(MODEL_NAME, 3, penalizer, solver, |values| {
            -total_log_likelihood(&GammaGammaParams::from_slice(values), histories) / n
        })?;

        let params = GammaGammaParams::from_slice(&values);
        if let Some(reason) = params.instability() {
            return Err(ValuationError::convergence(MODEL_NAME, result.iterations, reason));
        }

        let log_likelihood = total_log_likelihood(&params, histories);
        if !log_likelihood.is_finite() {
            return Err(ValuationError::convergence(
                MODEL_NAME,
                result.iterations,
                "log-likelihood is not finite at the optimum",
            ));
        }

        info!(
            p = params.p,
            q = params.q,
            v = params.v,
            log_likelihood,
            iterations = result.iterations,
            "Fitted Gamma-Gamma model"
        );

        Ok(Self {
            params,
            fit: Some(FitSummary {
                customers: histories.len(),
                log_likelihood,
                iterations: result.iterations,
                solve_time_ms: result.solve_time_ms,
            }),
        })
    }

    pub fn from_params(params: GammaGammaParams) -> Result<Self> {
        if let Some(reason) = params.instability() {
            return Err(ValuationError::invalid_config(format!(
                "{} parameters: {}",
                MODEL_NAME, reason
            )));
        }
        Ok(Self { params, fit: None })
    }

    pub fn params(&self) -> GammaGammaParams {
        self.params
    }

    pub fn fit_summary(&self) -> Option<&FitSummary> {
        self.fit.as_ref()
    }

    pub fn log_likelihood(&self, histories: &[CustomerHistory]) -> f64 {
        total_log_likelihood(&self.params, histories)
    }
}

impl MonetaryModel for GammaGammaModel {
    fn name(&self) -> &'static str {
        MODEL_NAME
    }

    fn conditional_expected_value(&self, customer: &CustomerHistory) -> Result<f64> {
        let GammaGammaParams { p, q, .. } = self.params;
        let px = p * f64::from(customer.frequency);
        let weight = px / (px + q - 1.0);
        let value =
            (1.0 - weight) * self.params.population_mean() + weight * customer.average_value;

        if !value.is_finite() || value < 0.0 {
            return Err(ValuationError::InsufficientData {
                stage: "monetary model prediction",
                customers: 1,
                reason: format!(
                    "expected average value {} for customer '{}' is not a finite non-negative number",
                    value, customer.customer_id
                ),
            });
        }
        Ok(value)
    }
}
