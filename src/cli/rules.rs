//! `rules` subcommand: show the segment map of a rule table

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use crate::pipeline::ValuationConfig;
use crate::report::segment_grid_table;
use crate::utils::{print_info, print_success};

/// Print the recency x frequency segment map of the configured rules.
///
/// Fails when some score code has no segment, after listing those codes.
pub fn run_rules(config_path: Option<&Path>) -> Result<()> {
    let config = match config_path {
        Some(path) => ValuationConfig::from_json_file(path)?,
        None => ValuationConfig::default(),
    };
    config.validate().context("Invalid valuation configuration")?;
    let rules = &config.segment_rules;
    let cardinality = u8::try_from(config.score_cardinality)
        .map_err(|_| anyhow::anyhow!("score_cardinality {} is out of range", config.score_cardinality))?;

    println!(
        "\n {} Segment map ({} rules, scores 1..{})",
        style("◆").cyan().bold(),
        rules.rules().len(),
        cardinality
    );
    println!("   Rows: recency score, columns: frequency score");
    println!();
    for line in segment_grid_table(rules, cardinality).to_string().lines() {
        println!("   {}", line);
    }
    println!();
    print_info(&format!("Segments: {}", rules.segment_names().join(", ")));

    let unmapped = rules.unmapped_codes(cardinality);
    if !unmapped.is_empty() {
        anyhow::bail!(
            "{} score code(s) match no segment rule: {}",
            unmapped.len(),
            unmapped.join(", ")
        );
    }
    print_success("Every score code maps to a segment");
    Ok(())
}
