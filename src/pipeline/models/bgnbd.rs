//! BG/NBD purchase-count model
//!
//! While active, a customer purchases at a Poisson rate drawn from
//! Gamma(r, alpha); after each repeat purchase they become inactive with a
//! probability drawn from Beta(a, b). Covariates per customer are the repeat
//! purchase count `x = frequency - 1`, the span between first and last
//! purchase `t_x`, and the observation length `T`, all in model periods.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{fit_penalized, out_of_bounds, FitSummary, TransactionModel};
use crate::pipeline::error::{Result, ValuationError};
use crate::pipeline::metrics::CustomerHistory;
use crate::pipeline::solver::special::{ln_gamma, log_add_exp, scaled_hyp2f1};
use crate::pipeline::solver::SolverConfig;

pub const MODEL_NAME: &str = "BG/NBD";

const PARAM_NAMES: [&str; 4] = ["r", "alpha", "a", "b"];

/// Minimum distance of `a` from 1, where the expectation has a pole
const A_POLE_MARGIN: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaGeoParams {
    pub r: f64,
    pub alpha: f64,
    pub a: f64,
    pub b: f64,
}

impl BetaGeoParams {
    fn from_slice(values: &[f64]) -> Self {
        Self {
            r: values[0],
            alpha: values[1],
            a: values[2],
            b: values[3],
        }
    }

    fn to_vec(self) -> Vec<f64> {
        vec![self.r, self.alpha, self.a, self.b]
    }

    fn instability(&self) -> Option<String> {
        if let Some(reason) = out_of_bounds(&PARAM_NAMES, &self.to_vec()) {
            return Some(reason);
        }
        if (self.a - 1.0).abs() < A_POLE_MARGIN {
            return Some(format!("parameter a = {} is too close to 1", self.a));
        }
        None
    }
}

/// Per-customer log-likelihood
fn customer_log_likelihood(p: &BetaGeoParams, x: f64, t_x: f64, t: f64) -> f64 {
    let BetaGeoParams { r, alpha, a, b } = *p;

    let a1 = ln_gamma(r + x) - ln_gamma(r) + r * alpha.ln();
    let a2 = ln_gamma(a + b) + ln_gamma(b + x) - ln_gamma(b) - ln_gamma(a + b + x);
    let a3 = -(r + x) * (alpha + t).ln();
    let a4 = if x > 0.0 {
        a.ln() - (b + x - 1.0).ln() - (r + x) * (alpha + t_x).ln()
    } else {
        f64::NEG_INFINITY
    };

    a1 + a2 + log_add_exp(a3, a4)
}

fn total_log_likelihood(params: &BetaGeoParams, histories: &[CustomerHistory]) -> f64 {
    histories
        .iter()
        .map(|c| customer_log_likelihood(params, c.repeat_purchases(), c.recency, c.tenure))
        .sum()
}

/// Fitted or given BG/NBD model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetaGeoModel {
    params: BetaGeoParams,
    fit: Option<FitSummary>,
}

impl BetaGeoModel {
    /// Fit by penalised maximum likelihood.
    ///
    /// Fails with `Convergence` when no customer has a repeat purchase, when
    /// the solver does not settle, or when the optimum lies outside the
    /// stability bounds.
    pub fn fit(
        histories: &[CustomerHistory],
        penalizer: f64,
        solver: &SolverConfig,
    ) -> Result<Self> {
        if histories.is_empty() {
            return Err(ValuationError::InsufficientData {
                stage: "transaction model fit",
                customers: 0,
                reason: "no customer histories".to_string(),
            });
        }
        if histories.iter().all(|c| c.frequency <= 1) {
            return Err(ValuationError::convergence(
                MODEL_NAME,
                0,
                format!(
                    "no repeat purchases among {} customer(s); purchase rate is not identifiable",
                    histories.len()
                ),
            ));
        }

        let n = histories.len() as f64;
        let (values, result) = fit_penalized(MODEL_NAME, 4, penalizer, solver, |values| {
            -total_log_likelihood(&BetaGeoParams::from_slice(values), histories) / n
        })?;

        let params = BetaGeoParams::from_slice(&values);
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
            r = params.r,
            alpha = params.alpha,
            a = params.a,
            b = params.b,
            log_likelihood,
            iterations = result.iterations,
            "Fitted BG/NBD model"
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

    /// Model with known parameters; rejects values outside the stability bounds.
    pub fn from_params(params: BetaGeoParams) -> Result<Self> {
        if let Some(reason) = params.instability() {
            return Err(ValuationError::invalid_config(format!(
                "{} parameters: {}",
                MODEL_NAME, reason
            )));
        }
        Ok(Self { params, fit: None })
    }

    pub fn params(&self) -> BetaGeoParams {
        self.params
    }

    pub fn fit_summary(&self) -> Option<&FitSummary> {
        self.fit.as_ref()
    }

    /// Total log-likelihood of `histories` under this model
    pub fn log_likelihood(&self, histories: &[CustomerHistory]) -> f64 {
        total_log_likelihood(&self.params, histories)
    }
}

impl TransactionModel for BetaGeoModel {
    fn name(&self) -> &'static str {
        MODEL_NAME
    }

    fn expected_purchases(&self, horizon: f64, customer: &CustomerHistory) -> Result<f64> {
        if horizon <= 0.0 {
            return Ok(0.0);
        }
        let BetaGeoParams { r, alpha, a, b } = self.params;
        let x = customer.repeat_purchases();
        let t_x = customer.recency;
        let t = customer.tenure;

        // Euler's transformation turns c * 2F1(r+x, b+x; c; z) * s^(r+x) into
        // s^(a-1) * c * 2F1(a+b-1-r, a-1; c; z), where s = 1 - z. The
        // parameters stay small for large x, and c may be zero or negative
        // when a + b < 1 and x = 0.
        let c = a + b + x - 1.0;
        let z = horizon / (alpha + t + horizon);
        let survival = (alpha + t) / (alpha + t + horizon);
        let scaled = scaled_hyp2f1(a + b - 1.0 - r, a - 1.0, c, z);
        let numerator = (c - survival.powf(a - 1.0) * scaled) / (a - 1.0);

        let denominator = if x > 0.0 {
            1.0 + (a / (b + x - 1.0)) * ((alpha + t) / (alpha + t_x)).powf(r + x)
        } else {
            1.0
        };

        let expected = numerator / denominator;
        if !expected.is_finite() {
            return Err(ValuationError::convergence(
                MODEL_NAME,
                0,
                format!(
                    "expected purchases are not finite for customer '{}'",
                    customer.customer_id
                ),
            ));
        }
        Ok(expected.max(0.0))
    }

    fn probability_alive(&self, customer: &CustomerHistory) -> f64 {
        let x = customer.repeat_purchases();
        if x == 0.0 {
            return 1.0;
        }
        let BetaGeoParams { r, alpha, a, b } = self.params;
        let log_div = (r + x) * ((alpha + customer.tenure) / (alpha + customer.recency)).ln()
            + (a / (b + x - 1.0)).ln();
        1.0 / (1.0 + log_div.exp())
    }
}
