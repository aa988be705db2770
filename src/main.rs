//! custval: Customer Valuation CLI Tool
//!
//! A command-line tool that turns a transaction log into RFM scores,
//! behavioural segments, lifetime value estimates and value tiers.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use tracing_subscriber::EnvFilter;

use custval::cli::{rules::run_rules, Cli, Commands};
use custval::pipeline::{dataset_stats, load_dataset, run_valuation, TransactionTable};
use custval::report::{export_valuation, save_valuation_table, ValuationSummary};
use custval::utils::{
    create_spinner, finish_with_error, finish_with_success, finish_with_warning, print_banner,
    print_completion, print_config, print_count, print_info, print_step_header, print_step_time,
    print_success, print_warning,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(command) = &cli.command {
        return match command {
            Commands::Rules { config } => run_rules(config.as_deref().or(cli.config.as_deref())),
        };
    }

    let input = cli.input().ok_or_else(|| {
        anyhow::anyhow!("Input file is required. Use -i/--input to specify a file.")
    })?;
    let output_path = cli
        .output_path()
        .ok_or_else(|| anyhow::anyhow!("Could not derive an output path from {}", input.display()))?;

    let config = cli.valuation_config()?;
    config.validate().context("Invalid valuation configuration")?;
    let options = cli.run_options();

    print_banner(env!("CARGO_PKG_VERSION"));
    print_config(input, &output_path, options.mode, options.method, &config);

    // Step 1: Load transactions
    print_step_header(1, "Load Transactions");

    let step_start = Instant::now();
    let spinner = create_spinner("Reading transaction file...");
    let df = load_dataset(input, cli.infer_schema_length)?;
    let (rows, cols, memory_mb) = dataset_stats(&df);
    let transactions = TransactionTable::from_dataframe(&df, &config.columns)
        .with_context(|| format!("Failed to read transactions from {}", input.display()))?;
    drop(df);
    finish_with_success(&spinner, "Transactions loaded");

    println!("\n    {} Dataset Statistics:", style("✧").cyan());
    println!("      Rows: {}", rows);
    println!("      Columns: {}", cols);
    println!("      Estimated memory: {:.2} MB", memory_mb);
    if transactions.skipped_rows() > 0 {
        print_count(
            "row(s) with a missing required field",
            transactions.skipped_rows(),
            Some("(skipped)"),
        );
    }
    let load_elapsed = step_start.elapsed();
    print_step_time(load_elapsed);

    // Step 2: Valuation
    print_step_header(2, "Customer Valuation");

    let step_start = Instant::now();
    let spinner = create_spinner("Computing metrics, scores and values...");
    let outcome = match run_valuation(&transactions, &config, &options) {
        Ok(outcome) => outcome,
        Err(err) => {
            finish_with_error(&spinner, "Valuation failed");
            return Err(err).context("Customer valuation failed");
        }
    };
    if outcome.diagnostics.fallback_reason.is_some() {
        finish_with_warning(&spinner, "Valuation complete using the heuristic fallback");
    } else {
        finish_with_success(&spinner, "Valuation complete");
    }

    print_info(&format!("Analysis date: {}", outcome.diagnostics.analysis_date));
    if let Some(report) = &outcome.diagnostics.outliers {
        print_count("value(s) capped as outliers", report.total_capped(), None);
    }
    if !outcome.diagnostics.excluded_customers.is_empty() {
        print_count(
            "customer(s) excluded",
            outcome.diagnostics.excluded_customers.len(),
            Some("(non-positive spend)"),
        );
    }
    if let Some(reason) = &outcome.diagnostics.fallback_reason {
        print_warning(&format!("Model fit failed: {}", reason));
    }
    print_success(&format!("Valued {} customers", outcome.table.len()));

    let mut summary = ValuationSummary::from_outcome(&outcome);
    summary.set_load_time(load_elapsed);
    let valuation_elapsed = step_start.elapsed();
    summary.set_valuation_time(valuation_elapsed);
    print_step_time(valuation_elapsed);

    // Step 3: Save output
    print_step_header(3, "Save Results");

    let step_start = Instant::now();
    let spinner = create_spinner("Writing output file...");
    if let Err(err) = save_valuation_table(&outcome.table, &output_path) {
        finish_with_error(&spinner, "Could not write output file");
        return Err(err);
    }
    finish_with_success(&spinner, &format!("Saved to {}", output_path.display()));

    if let Some(export_path) = &cli.export_json {
        export_valuation(
            &outcome,
            &config,
            &options,
            &input.display().to_string(),
            export_path,
        )?;
        print_success(&format!("Run export written to {}", export_path.display()));
    }
    let save_elapsed = step_start.elapsed();
    summary.set_save_time(save_elapsed);
    print_step_time(save_elapsed);

    summary.display();
    print_completion();

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "custval=debug" } else { "custval=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
