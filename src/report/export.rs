//! JSON export of a valuation run

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::pipeline::{
    FittedModels, GroupSummary, RunDiagnostics, RunOptions, ValuationConfig, ValuationOutcome,
};

/// Metadata about the valuation run
#[derive(Debug, Serialize)]
pub struct RunMetadata {
    /// Timestamp of the export (ISO 8601 format)
    pub timestamp: String,
    /// custval version
    pub custval_version: String,
    /// Input file path
    pub input_file: String,
    pub mode: String,
    /// Requested CLV method (the one used is in the diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clv_method: Option<String>,
    pub fallback_to_heuristic: bool,
}

/// Complete run export
#[derive(Debug, Serialize)]
pub struct ValuationExport<'a> {
    pub metadata: RunMetadata,
    pub config: &'a ValuationConfig,
    pub models: &'a FittedModels,
    pub diagnostics: &'a RunDiagnostics,
    pub segments: Vec<GroupSummary>,
    pub tiers: Vec<GroupSummary>,
}

impl<'a> ValuationExport<'a> {
    pub fn new(
        outcome: &'a ValuationOutcome,
        config: &'a ValuationConfig,
        options: &RunOptions,
        input_file: &str,
    ) -> Self {
        let clv_method = options
            .mode
            .includes_clv()
            .then(|| options.method.to_string());

        Self {
            metadata: RunMetadata {
                timestamp: Utc::now().to_rfc3339(),
                custval_version: env!("CARGO_PKG_VERSION").to_string(),
                input_file: input_file.to_string(),
                mode: options.mode.to_string(),
                clv_method,
                fallback_to_heuristic: options.fallback_to_heuristic,
            },
            config,
            models: &outcome.models,
            diagnostics: &outcome.diagnostics,
            segments: outcome.table.segment_summary(),
            tiers: outcome.table.tier_summary(),
        }
    }
}

/// Write the run metadata, configuration, fitted parameters and group
/// summaries to a JSON file
pub fn export_valuation(
    outcome: &ValuationOutcome,
    config: &ValuationConfig,
    options: &RunOptions,
    input_file: &str,
    output_path: &Path,
) -> Result<()> {
    let export = ValuationExport::new(outcome, config, options, input_file);

    let json = serde_json::to_string_pretty(&export)
        .context("Failed to serialize valuation export to JSON")?;

    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write valuation export to {}", output_path.display()))?;

    Ok(())
}
