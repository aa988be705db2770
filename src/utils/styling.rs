//! Terminal styling for the valuation CLI

use std::path::Path;
use std::time::Duration;

use console::{style, Emoji};

use crate::pipeline::{ClvMethod, PipelineMode, ValuationConfig};

// Emoji icons with fallbacks for terminals that don't support them
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[*] ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!] ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", ">> ");
pub static FOLDER: Emoji<'_, '_> = Emoji("📂 ", "");
pub static SAVE: Emoji<'_, '_> = Emoji("💾 ", "");
pub static COMPASS: Emoji<'_, '_> = Emoji("🧭 ", "");
pub static MONEY: Emoji<'_, '_> = Emoji("💰 ", "");
pub static CALENDAR: Emoji<'_, '_> = Emoji("📅 ", "");
pub static CHART: Emoji<'_, '_> = Emoji("📊 ", "");

const CARD_WIDTH: usize = 56;

/// Print the application banner
pub fn print_banner(version: &str) {
    let banner = r#"
     ██████╗██╗   ██╗███████╗████████╗██╗   ██╗ █████╗ ██╗
    ██╔════╝██║   ██║██╔════╝╚══██╔══╝██║   ██║██╔══██╗██║
    ██║     ██║   ██║███████╗   ██║   ██║   ██║███████║██║
    ██║     ██║   ██║╚════██║   ██║   ╚██╗ ██╔╝██╔══██║██║
    ╚██████╗╚██████╔╝███████║   ██║    ╚████╔╝ ██║  ██║███████╗
     ╚═════╝ ╚═════╝ ╚══════╝   ╚═╝     ╚═══╝  ╚═╝  ╚═╝╚══════╝
    "#;

    println!();
    println!("{}", style(banner).cyan().bold());
    println!(
        "    {} {}",
        style("$").magenta().bold(),
        style("Customer segmentation and lifetime value").dim()
    );
    println!("    {}", style(format!("v{}", version)).dim());
    println!("    {}", style("━".repeat(50)).dim());
    println!();
}

/// Print configuration card
pub fn print_config(
    input: &Path,
    output: &Path,
    mode: PipelineMode,
    method: ClvMethod,
    config: &ValuationConfig,
) {
    let line = "─".repeat(CARD_WIDTH - 2);

    println!("    ┌{}┐", line);
    println!(
        "    │ {}{}│",
        style("⚙️  Configuration").cyan().bold(),
        " ".repeat(CARD_WIDTH - 20)
    );
    println!("    ├{}┤", line);
    card_row(FOLDER, "Input: ", &truncate_path(input, 38));
    card_row(SAVE, "Output:", &truncate_path(output, 38));
    println!("    ├{}┤", line);
    card_row(COMPASS, "Mode:  ", &mode.to_string());
    if mode.includes_rfm() {
        card_row(CHART, "Scores:", &format!("1..{}", config.score_cardinality));
    }
    if mode.includes_clv() {
        card_row(MONEY, "Method:", &method.to_string());
        card_row(
            CALENDAR,
            "Horizon:",
            &format!(
                "{} months ({}s), discount {:.2}%",
                config.horizon_months,
                config.period_unit,
                config.discount_rate * 100.0
            ),
        );
    }
    println!("    └{}┘", line);
    println!();
}

fn card_row(icon: Emoji<'_, '_>, label: &str, value: &str) {
    let text = format!("{} {} {}", icon, label, style(value).yellow());
    let visible = console::measure_text_width(&text);
    let padding = (CARD_WIDTH - 4).saturating_sub(visible);
    println!("    │  {}{}│", text, " ".repeat(padding));
}

/// Print a step header with styling
pub fn print_step_header(step_num: u8, title: &str) {
    println!();
    println!(
        "    {} {} {}",
        style(format!("STEP {}", step_num)).cyan().bold(),
        style("│").dim(),
        style(title).white().bold()
    );
    println!("    {}", style("─".repeat(50)).dim());
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("    {} {}", style("✓").green().bold(), style(message).green());
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("    {} {}", INFO, message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("    {} {}", WARN, style(message).yellow());
}

/// Print a styled count message
pub fn print_count(description: &str, count: usize, detail: Option<&str>) {
    if let Some(detail) = detail {
        println!(
            "      Found {} {} {}",
            style(count).yellow().bold(),
            description,
            style(detail).dim()
        );
    } else {
        println!("      Found {} {}", style(count).yellow().bold(), description);
    }
}

/// Print how long a step took
pub fn print_step_time(elapsed: Duration) {
    println!(
        "      {}",
        style(format!("completed in {:.2}s", elapsed.as_secs_f64())).dim()
    );
}

/// Print the final completion message
pub fn print_completion() {
    println!();
    println!("    {} {}", ROCKET, style("Valuation complete!").green().bold());
    println!();
}

fn truncate_path(path: &Path, max_len: usize) -> String {
    truncate_string(&path.display().to_string(), max_len)
}

fn truncate_string(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_string()
    } else {
        let tail: String = chars[chars.len() - (max_len - 3)..].iter().collect();
        format!("...{}", tail)
    }
}
