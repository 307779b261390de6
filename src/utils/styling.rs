//! Terminal styling for the run report

use console::{style, Emoji};
use std::time::Duration;

// Emoji icons with fallbacks for terminals that don't support them
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[*] ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!] ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", ">> ");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "");

const BOX_WIDTH: usize = 64;

/// Print the application banner
pub fn print_banner(version: &str) {
    println!();
    println!(
        "    {} {}",
        style("mortality").cyan().bold(),
        style("· cause-of-death regression analysis").dim()
    );
    println!("    {}", style(format!("v{}", version)).dim());
    println!("    {}", style("━".repeat(50)).dim());
    println!();
}

/// Print the configuration card, one labelled row per setting
pub fn print_config(rows: &[(&str, String)]) {
    let line = "─".repeat(BOX_WIDTH - 2);
    let label_width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let value_width = BOX_WIDTH - label_width - 7;

    println!("    ┌{}┐", line);
    println!(
        "    │ {}{}│",
        style("Configuration").cyan().bold(),
        " ".repeat(BOX_WIDTH - 16)
    );
    println!("    ├{}┤", line);
    for (label, value) in rows {
        println!(
            "    │  {:<lw$}  {:<vw$}│",
            label,
            style(truncate_string(value, value_width)).yellow(),
            lw = label_width,
            vw = value_width,
        );
    }
    println!("    └{}┘", line);
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

pub fn print_success(message: &str) {
    println!("    {} {}", style("✓").green().bold(), style(message).green());
}

pub fn print_info(message: &str) {
    println!("    {} {}", INFO, message);
}

pub fn print_warning(message: &str) {
    println!("    {} {}", WARN, style(message).yellow());
}

/// Print how long a step took
pub fn print_step_time(elapsed: Duration) {
    println!(
        "    {} {}",
        CLOCK,
        style(format!("{:.2}s", elapsed.as_secs_f64())).dim()
    );
}

/// Print a styled count message
pub fn print_count(description: &str, count: usize, detail: Option<&str>) {
    match detail {
        Some(info) => println!(
            "      Found {} {} {}",
            style(count).yellow().bold(),
            description,
            style(info).dim()
        ),
        None => println!("      Found {} {}", style(count).yellow().bold(), description),
    }
}

/// Print an indented block of preformatted text, such as a rendered tree
pub fn print_block(text: &str) {
    for line in text.lines() {
        println!("      {}", style(line).dim());
    }
}

pub fn print_completion() {
    println!();
    println!("    {} {}", ROCKET, style("Analysis complete!").green().bold());
    println!();
}

/// Keep the tail of `s` so file names stay visible
pub fn truncate_string(s: &str, max_len: usize) -> String {
    let count = s.chars().count();
    if count <= max_len {
        s.to_string()
    } else {
        let tail: String = s.chars().skip(count + 3 - max_len).collect();
        format!("...{}", tail)
    }
}
