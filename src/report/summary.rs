//! Valuation summary report for the terminal

use std::time::Duration;

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, CellAlignment, Color, Table};
use console::style;

use crate::pipeline::{GroupSummary, SegmentRuleTable, ValuationOutcome};

/// Summary of a valuation run
#[derive(Debug, Default)]
pub struct ValuationSummary {
    pub mode: String,
    pub analysis_date: String,
    pub transactions: usize,
    pub skipped_rows: usize,
    pub customers: usize,
    pub excluded_customers: usize,
    pub capped_outliers: Option<usize>,
    pub clv_method: Option<String>,
    pub fallback_reason: Option<String>,
    pub segments: Vec<GroupSummary>,
    pub tiers: Vec<GroupSummary>,
    pub load_time: Option<Duration>,
    pub valuation_time: Option<Duration>,
    pub save_time: Option<Duration>,
}

impl ValuationSummary {
    pub fn from_outcome(outcome: &ValuationOutcome) -> Self {
        let diagnostics = &outcome.diagnostics;
        Self {
            mode: outcome.table.mode().to_string(),
            analysis_date: diagnostics.analysis_date.to_string(),
            transactions: diagnostics.transactions,
            skipped_rows: diagnostics.skipped_rows,
            customers: diagnostics.customers,
            excluded_customers: diagnostics.excluded_customers.len(),
            capped_outliers: diagnostics.outliers.map(|o| o.total_capped()),
            clv_method: diagnostics.clv_method.map(|m| m.to_string()),
            fallback_reason: diagnostics.fallback_reason.clone(),
            segments: outcome.table.segment_summary(),
            tiers: outcome.table.tier_summary(),
            ..Default::default()
        }
    }

    pub fn set_load_time(&mut self, elapsed: Duration) {
        self.load_time = Some(elapsed);
    }

    pub fn set_valuation_time(&mut self, elapsed: Duration) {
        self.valuation_time = Some(elapsed);
    }

    pub fn set_save_time(&mut self, elapsed: Duration) {
        self.save_time = Some(elapsed);
    }

    pub fn display(&self) {
        print_section_title("📋", "VALUATION SUMMARY");

        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Metric").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ]);

        table.add_row(vec![Cell::new("🧭 Mode"), Cell::new(&self.mode)]);
        table.add_row(vec![Cell::new("📅 Analysis date"), Cell::new(&self.analysis_date)]);
        table.add_row(vec![Cell::new("🧾 Transactions"), Cell::new(self.transactions)]);
        table.add_row(vec![
            Cell::new("🗑️  Skipped rows"),
            Cell::new(self.skipped_rows).fg(warn_color(self.skipped_rows)),
        ]);
        table.add_row(vec![
            Cell::new("🚫 Excluded customers"),
            Cell::new(self.excluded_customers).fg(warn_color(self.excluded_customers)),
        ]);
        if let Some(capped) = self.capped_outliers {
            table.add_row(vec![
                Cell::new("✂️  Capped outliers"),
                Cell::new(capped).fg(warn_color(capped)),
            ]);
        }
        if let Some(method) = &self.clv_method {
            let cell = if self.fallback_reason.is_some() {
                Cell::new(format!("{} (fallback)", method)).fg(Color::Yellow)
            } else {
                Cell::new(method)
            };
            table.add_row(vec![Cell::new("💰 CLV method"), cell]);
        }
        table.add_row(vec![
            Cell::new("✅ Customers valued"),
            Cell::new(self.customers)
                .fg(Color::Green)
                .add_attribute(Attribute::Bold),
        ]);

        let timings = [
            ("Load", self.load_time),
            ("Valuation", self.valuation_time),
            ("Save", self.save_time),
        ];
        for (label, elapsed) in timings {
            if let Some(elapsed) = elapsed {
                table.add_row(vec![
                    Cell::new(format!("⏱️  {}", label)),
                    Cell::new(format!("{:.2}s", elapsed.as_secs_f64())).fg(Color::Cyan),
                ]);
            }
        }

        print_indented(&table);

        if let Some(reason) = &self.fallback_reason {
            println!();
            println!(
                "      {} {}",
                style("Fallback:").yellow().bold(),
                style(reason).dim()
            );
        }

        if !self.segments.is_empty() {
            print_section_title("🧩", "SEGMENTS");
            print_indented(&group_table("Segment", &self.segments));
        }
        if !self.tiers.is_empty() {
            print_section_title("🏆", "VALUE TIERS");
            print_indented(&group_table("Tier", &self.tiers));
        }
    }
}

/// Table of count and means per group
pub fn group_table(title: &str, groups: &[GroupSummary]) -> Table {
    let with_clv = groups.iter().any(|g| g.mean_clv.is_some());

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    let mut header = vec![
        Cell::new(title).add_attribute(Attribute::Bold),
        Cell::new("Customers").add_attribute(Attribute::Bold),
        Cell::new("Recency").add_attribute(Attribute::Bold),
        Cell::new("Frequency").add_attribute(Attribute::Bold),
        Cell::new("Monetary").add_attribute(Attribute::Bold),
    ];
    if with_clv {
        header.push(Cell::new("CLV").add_attribute(Attribute::Bold));
    }
    table.set_header(header);

    for group in groups {
        let mut row = vec![
            Cell::new(&group.group).fg(Color::Cyan),
            Cell::new(group.customers).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.1}", group.mean_recency)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", group.mean_frequency)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", group.mean_monetary)).set_alignment(CellAlignment::Right),
        ];
        if with_clv {
            let clv = group
                .mean_clv
                .map(|v| format!("{:.2}", v))
                .unwrap_or_else(|| "-".to_string());
            row.push(Cell::new(clv).set_alignment(CellAlignment::Right));
        }
        table.add_row(row);
    }

    table
}

/// Recency (rows, highest first) by frequency (columns) segment map
pub fn segment_grid_table(rules: &SegmentRuleTable, cardinality: u8) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);

    let mut header = vec![Cell::new("R \\ F").add_attribute(Attribute::Bold)];
    header.extend((1..=cardinality).map(|f| Cell::new(f).add_attribute(Attribute::Bold)));
    table.set_header(header);

    for (row_index, row) in rules.segment_grid(cardinality).into_iter().enumerate() {
        let recency = cardinality - row_index as u8;
        let mut cells = vec![Cell::new(recency).add_attribute(Attribute::Bold)];
        cells.extend(row.into_iter().map(|segment| match segment {
            Some(name) => Cell::new(name),
            None => Cell::new("UNMAPPED").fg(Color::Red),
        }));
        table.add_row(cells);
    }

    table
}

fn warn_color(count: usize) -> Color {
    if count == 0 {
        Color::White
    } else {
        Color::Yellow
    }
}

fn print_section_title(icon: &str, title: &str) {
    println!();
    println!("    {} {}", style(icon).cyan(), style(title).white().bold());
    println!("    {}", style("─".repeat(50)).dim());
    println!();
}

fn print_indented(table: &Table) {
    for line in table.to_string().lines() {
        println!("    {}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_grid_table_marks_unmapped_cells() {
        let rules = SegmentRuleTable::new(vec![
            crate::pipeline::SegmentRule::new("5[4-5]", "champions").unwrap(),
        ]);
        let rendered = segment_grid_table(&rules, 5).to_string();
        assert!(rendered.contains("champions"));
        assert!(rendered.contains("UNMAPPED"));
    }

    #[test]
    fn test_group_table_includes_clv_column_only_when_present() {
        let group = GroupSummary {
            group: "A".to_string(),
            customers: 3,
            mean_recency: 10.0,
            mean_frequency: 2.0,
            mean_monetary: 55.5,
            mean_clv: None,
        };
        assert!(!group_table("Tier", &[group.clone()]).to_string().contains("CLV"));

        let with_clv = GroupSummary {
            mean_clv: Some(12.0),
            ..group
        };
        assert!(group_table("Tier", &[with_clv]).to_string().contains("CLV"));
    }
}
