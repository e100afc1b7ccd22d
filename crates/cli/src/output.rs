//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Pretty-print any response as JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format confidence as percentage
pub fn format_confidence(confidence: f32) -> String {
    format!("{:.1}%", confidence * 100.0)
}

/// Format epoch milliseconds as local time
pub fn format_epoch_ms(ms: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(ms) {
        Some(dt) => dt
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => ms.to_string(),
    }
}

/// Color session state
pub fn color_state(state: &str) -> String {
    match state.to_lowercase().as_str() {
        "completed" => state.green().to_string(),
        "awaiting_frames" | "evaluating" => state.blue().to_string(),
        "cancelled" => state.yellow().to_string(),
        "error" | "failed" => state.red().to_string(),
        _ => state.to_string(),
    }
}

/// Color confidence against the acceptance threshold
pub fn color_confidence(confidence: f32, threshold: f32) -> String {
    let formatted = format_confidence(confidence);
    if confidence >= threshold {
        formatted.green().to_string()
    } else if confidence >= threshold * 0.75 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}
