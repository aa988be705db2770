//! custval: Customer Valuation Library
//!
//! Turns a transaction log into recency/frequency/monetary scores,
//! behavioural segments, probabilistic lifetime value estimates and
//! value tiers.

pub mod cli;
pub mod pipeline;
pub mod report;
pub mod utils;
