//! Numerical optimisation for model fitting
//!
//! Both probabilistic models are fit by minimising a penalised negative
//! log-likelihood over log-parameters. The minimiser is a Nelder-Mead simplex
//! search bounded by an iteration limit and a wall-clock deadline, so a
//! pathological fit surfaces as a convergence error instead of hanging.

mod nelder_mead;
pub mod special;

use serde::{Deserialize, Serialize};

pub use nelder_mead::minimize;

/// Configuration for the model-fitting solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum time allowed for fitting a single model (seconds)
    pub timeout_seconds: u64,
    /// Convergence tolerance on the objective spread across the simplex.
    /// The parameter-space tolerance is its square root.
    pub tolerance: f64,
    /// Maximum simplex iterations before giving up
    pub max_iterations: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            tolerance: 1e-8,
            max_iterations: 5000,
        }
    }
}

/// Result from a successful minimisation
#[derive(Debug, Clone)]
pub struct SolverResult {
    /// Location of the minimum
    pub point: Vec<f64>,
    /// Objective value at the minimum
    pub value: f64,
    /// Iterations performed
    pub iterations: usize,
    /// Time taken to solve (milliseconds)
    pub solve_time_ms: u64,
}
