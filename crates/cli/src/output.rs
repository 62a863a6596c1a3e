//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any response as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render rows as a rounded table
pub fn render_table<T: Tabled>(rows: Vec<T>) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print a section heading with an underline
pub fn print_heading(title: &str, width: usize) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(width));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format GiB, dropping a trailing ".0"
pub fn format_gib(gib: f64) -> String {
    if gib.fract() == 0.0 {
        format!("{:.0}Gi", gib)
    } else {
        format!("{:.2}Gi", gib)
    }
}

/// Format an hourly price
pub fn format_hourly(price: f64) -> String {
    format!("${:.4}/h", price)
}

/// Color node state
pub fn color_state(state: &str) -> String {
    match state.to_lowercase().as_str() {
        "ready" | "running" => state.green().to_string(),
        "pending" | "unknown" => state.yellow().to_string(),
        "notready" | "failed" => state.red().to_string(),
        _ => state.to_string(),
    }
}

/// Color capacity type
pub fn color_capacity(is_spot: bool) -> String {
    if is_spot {
        "spot".cyan().to_string()
    } else {
        "on-demand".to_string()
    }
}

/// Color an on/off flag
pub fn color_flag(enabled: bool) -> String {
    if enabled {
        "on".green().to_string()
    } else {
        "off".dimmed().to_string()
    }
}

/// Color savings percentage based on size
pub fn color_percentage(percentage: f64) -> String {
    let formatted = format!("{:.1}%", percentage);
    if percentage >= 30.0 {
        formatted.green().to_string()
    } else if percentage > 0.0 {
        formatted.yellow().to_string()
    } else {
        formatted.dimmed().to_string()
    }
}
