//! Progress reporting for the loader
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::ingest::{IngestProgress, IngestSummary};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// How many failed entries the summary lists by name
const MAX_LISTED_FAILURES: usize = 10;

/// Spinner showing ingestion status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        // The template is a literal; fall back to the default style if it ever fails to parse
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(style);

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Handle that can be moved into a progress callback
    pub fn bar(&self) -> ProgressBar {
        self.bar.clone()
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a progress snapshot onto a bar
pub fn update_bar(bar: &ProgressBar, progress: &IngestProgress) {
    bar.set_message(progress_message(progress));
}

fn progress_message(progress: &IngestProgress) -> String {
    let mut msg = format!(
        "Entries: {} | Records: {} | Batches: {} | Read: {} | Rate: {:.0}/s",
        format_number(progress.entries),
        format_number(progress.records),
        format_number(progress.batches),
        format_size(progress.bytes, BINARY),
        progress.records_per_second(),
    );
    let failed = progress.failed_entries + progress.skipped_entries;
    if failed > 0 {
        msg.push_str(&format!(" | Failed: {}", format_number(failed)));
    }
    msg
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the run
pub fn print_summary(summary: &IngestSummary, database: &str, db_size: Option<u64>) {
    let duration_secs = summary.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        summary.records as f64 / duration_secs
    } else {
        0.0
    };

    let title = if summary.completed {
        style("Load Complete").green().bold()
    } else {
        style("Load Interrupted").yellow().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Entries:").bold(), format_number(summary.entries));
    println!("  {} {}", style("Records:").bold(), format_number(summary.records));
    println!("  {} {}", style("Batches:").bold(), format_number(summary.batches));
    println!(
        "  {} {}",
        style("Read:").bold(),
        format_size(summary.bytes, BINARY)
    );
    println!(
        "  {} {:.1}s ({:.0} records/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if summary.rolled_back > 0 {
        println!(
            "  {} {}",
            style("Rolled back:").yellow().bold(),
            format_number(summary.rolled_back)
        );
    }
    if !summary.failures.is_empty() {
        println!(
            "  {} {} failed, {} skipped",
            style("Errors:").yellow().bold(),
            format_number(summary.failed_entries),
            format_number(summary.skipped_entries)
        );
        for failure in summary.failures.iter().take(MAX_LISTED_FAILURES) {
            println!("    {} {}", style(&failure.name).dim(), failure.reason);
        }
        if summary.failures.len() > MAX_LISTED_FAILURES {
            println!(
                "    ... and {} more",
                summary.failures.len() - MAX_LISTED_FAILURES
            );
        }
    }
    if let Some(size) = db_size {
        println!(
            "  {} {} ({})",
            style("Database:").bold(),
            database,
            format_size(size, BINARY)
        );
    } else {
        println!("  {} {}", style("Database:").bold(), database);
    }
    println!();
}

/// Print a header at the start of the run
pub fn print_header(source: &str, kind: &str, backend: &str, database: &str, batch_size: usize) {
    println!();
    println!(
        "{} {}",
        style("leak-loader").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {} ({})", style("Source:").bold(), source, kind);
    println!("  {} {} ({})", style("Database:").bold(), database, backend);
    println!(
        "  {} {} records",
        style("Batch:").bold(),
        format_number(batch_size as u64)
    );
    println!();
}
