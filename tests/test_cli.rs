//! Tests for CLI argument parsing and the binary

use assert_cmd::Command;
use chrono::{Duration, NaiveDate};
use clap::Parser;
use custval::cli::{Cli, Commands};
use custval::pipeline::{ClvMethod, PeriodUnit, PipelineMode, TransactionRecord};
use predicates::prelude::*;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

#[path = "common/mod.rs"]
mod common;

#[test]
fn test_cli_default_values() {
    let cli = Cli::parse_from(["custval", "-i", "orders.csv"]);

    assert_eq!(cli.mode, PipelineMode::Combined);
    assert_eq!(cli.method, ClvMethod::Probabilistic);
    assert_eq!(cli.infer_schema_length, 10000);
    assert!(!cli.cap_outliers);
    assert!(!cli.split_top_tier);
    assert!(!cli.fallback_heuristic);
    assert!(!cli.verbose);
    assert!(cli.export_json.is_none());

    let options = cli.run_options();
    assert_eq!(options.mode, PipelineMode::Combined);
    assert!(!options.fallback_to_heuristic);

    // Without flags or a config file the defaults are used unchanged
    let config = cli.valuation_config().unwrap();
    assert_eq!(config, custval::pipeline::ValuationConfig::default());
}

#[test]
fn test_cli_output_path_derivation() {
    let cli = Cli::parse_from(["custval", "-i", "/path/to/orders.csv"]);
    assert_eq!(
        cli.output_path().unwrap(),
        PathBuf::from("/path/to/orders_valuation.csv")
    );

    let cli = Cli::parse_from(["custval", "-i", "/data/orders.parquet"]);
    assert_eq!(
        cli.output_path().unwrap(),
        PathBuf::from("/data/orders_valuation.parquet")
    );

    let cli = Cli::parse_from(["custval", "-i", "orders.csv", "-o", "out/result.parquet"]);
    assert_eq!(cli.output_path().unwrap(), PathBuf::from("out/result.parquet"));

    let cli = Cli::parse_from(["custval"]);
    assert!(cli.output_path().is_none());
}

#[test]
fn test_cli_overrides_apply_to_config() {
    let cli = Cli::parse_from([
        "custval",
        "-i",
        "orders.csv",
        "--mode",
        "clv",
        "--method",
        "heuristic",
        "--analysis-date",
        "2024-01-31",
        "--horizon-months",
        "6",
        "--period-unit",
        "day",
        "--discount-rate",
        "0.02",
        "--penalizer-frequency",
        "0.1",
        "--penalizer-monetary",
        "0",
        "--buckets",
        "5",
        "--profit-margin",
        "0.25",
        "--cap-outliers",
        "--split-top-tier",
        "--fallback-heuristic",
        "--solver-timeout",
        "90",
    ]);

    assert_eq!(cli.mode, PipelineMode::Clv);
    assert_eq!(cli.method, ClvMethod::Heuristic);
    assert!(cli.run_options().fallback_to_heuristic);

    let config = cli.valuation_config().unwrap();
    assert_eq!(config.analysis_date, NaiveDate::from_ymd_opt(2024, 1, 31));
    assert_eq!(config.horizon_months, 6);
    assert_eq!(config.period_unit, PeriodUnit::Day);
    assert_eq!(config.discount_rate, 0.02);
    assert_eq!(config.penalizer_frequency, 0.1);
    assert_eq!(config.penalizer_monetary, 0.0);
    assert_eq!(config.value_bucket_count, 5);
    assert_eq!(config.bucket_labels, vec!["E", "D", "C", "B", "A"]);
    assert_eq!(config.profit_margin, 0.25);
    assert!(config.cap_outliers);
    assert!(config.split_top_tier);
    assert_eq!(config.solver.timeout_seconds, 90);
    config.validate().unwrap();
}

#[test]
fn test_cli_flags_override_config_file() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.json");
    let mut file = std::fs::File::create(&config_path).unwrap();
    writeln!(
        file,
        r#"{{"horizon_months": 12, "profit_margin": 0.2, "period_unit": "month"}}"#
    )
    .unwrap();
    drop(file);

    let cli = Cli::parse_from([
        "custval",
        "-i",
        "orders.csv",
        "--config",
        config_path.to_str().unwrap(),
        "--horizon-months",
        "6",
    ]);
    let config = cli.valuation_config().unwrap();

    assert_eq!(config.horizon_months, 6, "Flag wins over the file");
    assert_eq!(config.profit_margin, 0.2, "File wins over the default");
    assert_eq!(config.period_unit, PeriodUnit::Month);
    assert_eq!(config.score_cardinality, 5);
}

#[test]
fn test_cli_rejects_invalid_values() {
    for args in [
        vec!["custval", "-i", "a.csv", "--discount-rate", "1.5"],
        vec!["custval", "-i", "a.csv", "--profit-margin", "0"],
        vec!["custval", "-i", "a.csv", "--penalizer-frequency", "-1"],
        vec!["custval", "-i", "a.csv", "--horizon-months", "0"],
        vec!["custval", "-i", "a.csv", "--buckets", "0"],
        vec!["custval", "-i", "a.csv", "--mode", "everything"],
        vec!["custval", "-i", "a.csv", "--period-unit", "year"],
        vec!["custval", "-i", "a.csv", "--analysis-date", "31/01/2024"],
    ] {
        assert!(Cli::try_parse_from(args.iter().copied()).is_err(), "{:?} should be rejected", args);
    }
}

#[test]
fn test_rules_subcommand_parsing() {
    let cli = Cli::parse_from(["custval", "rules"]);
    assert!(matches!(cli.command, Some(Commands::Rules { config: None })));

    let cli = Cli::parse_from(["custval", "rules", "--config", "rules.json"]);
    match cli.command {
        Some(Commands::Rules { config }) => assert_eq!(config, Some(PathBuf::from("rules.json"))),
        other => panic!("unexpected command {:?}", other),
    }
}

#[test]
fn test_binary_prints_default_segment_map() {
    Command::cargo_bin("custval")
        .unwrap()
        .arg("rules")
        .assert()
        .success()
        .stdout(predicate::str::contains("champions"))
        .stdout(predicate::str::contains("hibernating"));
}

#[test]
fn test_binary_rules_reports_unmapped_codes() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("rules.json");
    std::fs::write(
        &config_path,
        r#"{"segment_rules": [{"pattern": "5[4-5]", "segment": "champions"}]}"#,
    )
    .unwrap();

    Command::cargo_bin("custval")
        .unwrap()
        .args(["rules", "--config", config_path.to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("UNMAPPED"))
        .stderr(predicate::str::contains("match no segment rule"));
}

#[test]
fn test_binary_rules_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("rules.json");
    std::fs::write(&config_path, r#"{"score_cardinality": 10}"#).unwrap();

    Command::cargo_bin("custval")
        .unwrap()
        .args(["rules", "--config", config_path.to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Segment map").not())
        .stderr(predicate::str::contains("score_cardinality must be between 2 and 9"));
}

#[test]
fn test_binary_reports_failed_valuation() {
    // Every customer buys twice, so the heuristic churn rate is zero
    let records: Vec<TransactionRecord> = common::single_purchase_records(6)
        .into_iter()
        .flat_map(|first| {
            let repeat = TransactionRecord {
                invoice_id: format!("{}-R", first.invoice_id),
                timestamp: first.timestamp + Duration::days(1),
                ..first.clone()
            };
            [first, repeat]
        })
        .collect();
    let mut df = common::records_to_dataframe(&records);
    let (_dir, csv_path) = common::create_temp_csv(&mut df);

    Command::cargo_bin("custval")
        .unwrap()
        .args([
            "-i",
            csv_path.to_str().unwrap(),
            "--mode",
            "clv",
            "--method",
            "heuristic",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Customer valuation failed"))
        .stderr(predicate::str::contains("Insufficient data"));
}

#[test]
fn test_binary_values_a_csv_file() {
    let mut df = common::create_retail_dataframe();
    let (dir, csv_path) = common::create_temp_csv(&mut df);
    let export_path = dir.path().join("run.json");

    Command::cargo_bin("custval")
        .unwrap()
        .args([
            "-i",
            csv_path.to_str().unwrap(),
            "--method",
            "heuristic",
            "--export-json",
            export_path.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Valuation complete"));

    let output = dir.path().join("transactions_valuation.csv");
    assert!(output.exists(), "Default output path should be next to the input");
    assert!(export_path.exists());

    let written = custval::pipeline::load_dataset(&output, 0).unwrap();
    assert_eq!(written.height(), 10);
}

#[test]
fn test_binary_requires_input() {
    Command::cargo_bin("custval")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file is required"));
}

#[test]
fn test_binary_reports_missing_columns() {
    let mut df = common::create_retail_dataframe().drop("unit_price").unwrap();
    let (_dir, csv_path) = common::create_temp_csv(&mut df);

    Command::cargo_bin("custval")
        .unwrap()
        .args(["-i", csv_path.to_str().unwrap(), "--mode", "rfm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unit_price"));
}
