//! Colored CLI display utilities.
//!
//! This module provides functions for printing colored, formatted output
//! to the terminal for the application list and batch results.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::registry::{EntryStatus, SupervisedEntry};
use crate::supervisor::BatchReport;

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length for failure reasons.
const MAX_REASON_LEN: usize = 200;

/// Truncate a string to a maximum length, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}

fn status_label(status: EntryStatus) -> String {
    match status {
        EntryStatus::Running => format!("{:<7}", "Running").green().bold().to_string(),
        EntryStatus::Stopped => format!("{:<7}", "Stopped").dimmed().to_string(),
    }
}

fn enabled_label(enabled: bool) -> String {
    if enabled {
        "enabled ".cyan().to_string()
    } else {
        "disabled".dimmed().to_string()
    }
}

/// Format one entry as a table row.
#[must_use]
pub fn format_entry(index: usize, entry: &SupervisedEntry) -> String {
    format!(
        "{:>3}  {}  {}  {}",
        index,
        status_label(entry.status()),
        enabled_label(entry.enabled()),
        entry.path().display()
    )
}

/// Print the application list.
pub fn print_entries(entries: &[SupervisedEntry]) {
    if entries.is_empty() {
        println!("{}", "No applications registered".dimmed());
    }
    for (index, entry) in entries.iter().enumerate() {
        println!("{}", format_entry(index, entry));
    }
    let _ = io::stdout().flush();
}

/// Print a status transition seen while watching.
pub fn print_status_change(index: usize, entry: &SupervisedEntry) {
    let tag = match entry.status() {
        EntryStatus::Running => "[STARTED]".green().bold().to_string(),
        EntryStatus::Stopped => "[STOPPED]".red().bold().to_string(),
    };
    println!(
        "{} {} #{} {}",
        timestamp().dimmed(),
        tag,
        index,
        entry.path().display()
    );
    let _ = io::stdout().flush();
}

/// Print the outcome of a batch and any per-application failures.
pub fn print_batch_report(report: &BatchReport) {
    let ts = timestamp();
    if report.is_success() {
        println!(
            "{} {} {}",
            ts.dimmed(),
            "[DONE]".green().bold(),
            report.summary()
        );
    } else {
        println!(
            "{} {} {}",
            ts.dimmed(),
            "[PARTIAL]".yellow().bold(),
            report.summary().yellow()
        );
        for failure in &report.failures {
            println!(
                "{} {} {}: {}",
                ts.dimmed(),
                "[FAILED]".red().bold(),
                failure.path.display(),
                truncate(&failure.reason, MAX_REASON_LEN).red()
            );
        }
    }
    let _ = io::stdout().flush();
}

/// Print an informational line.
pub fn print_info(message: &str) {
    println!("{} {} {}", timestamp().dimmed(), "[INFO]".blue().bold(), message);
    let _ = io::stdout().flush();
}

/// Print an error line to stderr.
pub fn print_error(message: &str) {
    eprintln!(
        "{} {} {}",
        timestamp().dimmed(),
        "[ERROR]".red().bold(),
        message.red()
    );
}
