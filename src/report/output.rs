//! Writing the valuation table to disk

use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::pipeline::ValuationTable;

/// Save a dataframe (CSV or Parquet based on extension)
pub fn save_dataset(df: &mut DataFrame, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            CsvWriter::new(&mut file)
                .finish(df)
                .with_context(|| format!("Failed to write CSV file: {}", path.display()))?;
        }
        "parquet" => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            ParquetWriter::new(file)
                .finish(df)
                .with_context(|| format!("Failed to write Parquet file: {}", path.display()))?;
        }
        _ => anyhow::bail!(
            "Unsupported output format: {}. Supported formats: csv, parquet",
            extension
        ),
    }

    Ok(())
}

/// Save the customer-indexed valuation table
pub fn save_valuation_table(table: &ValuationTable, path: &Path) -> Result<()> {
    let mut df = table
        .to_dataframe()
        .context("Failed to build the valuation dataframe")?;
    save_dataset(&mut df, path)
}
