//! Progress reporting for the dump
//!
//! Provides a live spinner using indicatif plus the console header and
//! summary.

use crate::dump::{DumpProgress, DumpStats};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays dump status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &DumpProgress) {
        let msg = format!(
            "{} | {} | Classes: {} | Instances: {} | Errors: {} | Rate: {:.0}/s",
            progress.namespace,
            progress.class_name.as_deref().unwrap_or("-"),
            format_number(progress.classes),
            format_number(progress.instances),
            format_number(progress.errors),
            progress.instances_per_second(),
        );

        self.bar.set_message(msg);
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

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the dump
pub fn print_summary(namespaces: usize, stats: &DumpStats, output: &str) {
    let title = if stats.completed {
        style("Dump Complete").green().bold()
    } else {
        style("Dump Interrupted").yellow().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Namespaces:").bold(), namespaces);
    println!(
        "  {} {} ({} definitions)",
        style("Classes:").bold(),
        format_number(stats.classes),
        format_number(stats.class_definitions)
    );
    println!(
        "  {} {} ({} duplicates skipped)",
        style("Instances:").bold(),
        format_number(stats.instances),
        format_number(stats.duplicate_instances)
    );
    println!(
        "  {} {}",
        style("Written:").bold(),
        format_size(stats.bytes_written, BINARY)
    );
    println!(
        "  {} {:.1}s",
        style("Duration:").bold(),
        stats.duration.as_secs_f64()
    );
    if stats.errors() > 0 {
        println!(
            "  {} {} (classes: {}, enumerations: {}, instances: {})",
            style("Errors:").yellow().bold(),
            format_number(stats.errors()),
            stats.failed_classes,
            stats.failed_enumerations,
            stats.failed_instances
        );
    }
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}

/// Print a header at the start of the dump
pub fn print_header(service: &str, namespace: Option<&str>, output: &str) {
    println!();
    println!(
        "{} {}",
        style("wbem-dump").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Service:").bold(), service);
    println!(
        "  {} {}",
        style("Namespace:").bold(),
        namespace.unwrap_or("(discover)")
    );
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}
