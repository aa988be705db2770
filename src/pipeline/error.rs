//! Error types for the valuation pipeline.
//!
//! Every failure carries enough context (offending column, code, model or
//! customer count) for the caller to decide how to remediate. Nothing in the
//! pipeline retries on its own.

use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors that can occur while scoring, segmenting or valuing customers.
#[derive(Debug, Error)]
pub enum ValuationError {
    /// A quantile split was requested that the column cannot support.
    ///
    /// Raised when the column has fewer distinct values than bins, when two
    /// quantile edges coincide, or when a bin would end up empty. The split is
    /// never silently coarsened.
    #[error(
        "Cannot split column '{column}' into {requested} quantile bins: \
         only {distinct} distinct value(s) across {customers} customer(s)"
    )]
    DegenerateBinning {
        /// Column being binned
        column: String,
        /// Distinct values (or distinct edges) found
        distinct: usize,
        /// Requested number of bins
        requested: usize,
        /// Number of customers in the column
        customers: usize,
    },

    /// No rule in the segment table matches a score code.
    #[error("No segment rule matches score code '{code}' (segment rule table is incomplete)")]
    UnmappedSegment {
        /// The unmatched two-digit code
        code: String,
    },

    /// Model fitting did not reach a numerically stable optimum.
    #[error("{model} model failed to converge after {iterations} iteration(s): {reason}")]
    Convergence {
        /// Name of the model being fit
        model: &'static str,
        /// Why the fit was rejected
        reason: String,
        /// Solver iterations performed
        iterations: usize,
    },

    /// A required input column is absent.
    #[error("Required column '{column}' not found. Available columns: {available:?}")]
    MissingField {
        /// Name of the missing column
        column: String,
        /// Columns present in the input
        available: Vec<String>,
    },

    /// A required value could not be interpreted.
    #[error("Invalid value '{value}' in column '{column}' at row {row}")]
    InvalidField {
        column: String,
        row: usize,
        value: String,
    },

    /// Configuration values are inconsistent.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A stage has too few (or too uniform) customers to produce a result.
    #[error("Insufficient data for {stage}: {reason} ({customers} customer(s))")]
    InsufficientData {
        stage: &'static str,
        customers: usize,
        reason: String,
    },

    /// Dataframe access failed.
    #[error(transparent)]
    Polars(#[from] PolarsError),
}

impl ValuationError {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        ValuationError::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub(crate) fn convergence(model: &'static str, iterations: usize, reason: impl Into<String>) -> Self {
        ValuationError::Convergence {
            model,
            reason: reason.into(),
            iterations,
        }
    }

    /// Whether the caller may recover by switching to the heuristic value path.
    pub fn is_convergence(&self) -> bool {
        matches!(self, ValuationError::Convergence { .. })
    }
}

/// Result alias used throughout the pipeline.
pub type Result<T> = std::result::Result<T, ValuationError>;
