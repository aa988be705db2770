//! Pipeline module - customer metrics, scoring, models and valuation

pub mod binning;
pub mod bucketing;
pub mod config;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod models;
pub mod outliers;
pub mod rfm;
pub mod segments;
pub mod solver;
pub mod transactions;
pub mod valuation;
pub mod value;

pub use binning::{QuantileScorer, ScoreDirection, TieBreak};
pub use bucketing::ValueBucketer;
pub use config::{ColumnNames, PeriodUnit, ValuationConfig};
pub use error::{Result, ValuationError};
pub use loader::*;
pub use metrics::{CustomerHistory, CustomerMetrics, MetricCalculator, MetricRows};
pub use models::{
    BetaGeoModel, BetaGeoParams, FitSummary, GammaGammaModel, GammaGammaParams, MonetaryModel,
    TransactionModel,
};
pub use outliers::{cap_outliers, OutlierReport};
pub use rfm::{score_customers, ScoredCustomer};
pub use segments::{DigitPattern, ScoreCode, SegmentRule, SegmentRuleTable};
pub use solver::SolverConfig;
pub use transactions::{TransactionRecord, TransactionTable};
pub use valuation::{
    run_valuation, ClvMethod, CustomerValuation, FittedModels, GroupSummary, PipelineMode,
    RunDiagnostics, RunOptions, ValuationOutcome, ValuationTable,
};
pub use value::{heuristic_values, ClvEstimate, HeuristicValuation, ValueEstimator};
