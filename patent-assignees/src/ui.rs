//! Console display logic for the patent-assignees CLI.
//!
//! Progress lines, the run header, the summary and the abandoned list.
//! Uses only the `console` crate. Log output goes to stderr through
//! `tracing`; everything here goes to stdout.

use console::{pad_str, style, Alignment};
use patent_assignees_lib::{FetchConfig, FetchError, OutputMode, ProgressObserver, RunReport};
use std::path::Path;
use std::time::Duration;

/// Maximum abandoned identifiers listed individually before truncating.
const MAX_ABANDONED_SHOWN: usize = 20;

// ── Progress observer ────────────────────────────────────────────────────────

/// Prints one line per finished identifier, prefixed `[processed/total] (xx.x%)`.
///
/// Throttle and abandon events are always shown; completions only when
/// not in quiet mode.
pub struct ConsoleObserver {
    quiet: bool,
}

impl ConsoleObserver {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressObserver for ConsoleObserver {
    fn on_start(&self, total: u64) {
        if total == 0 {
            println!("  {}", style("No patent identifiers to fetch").yellow());
        }
    }

    fn on_completed(&self, identifier: &str, rows: usize, processed: u64, total: u64) {
        if self.quiet {
            return;
        }

        let padded = pad_str(identifier, 16, Alignment::Left, Some(".."));
        println!(
            "  {} {}  {}",
            style(progress_prefix(processed, total)).dim(),
            style(&padded).white(),
            style(format!("{} row{}", rows, plural(rows as u64))).green(),
        );
    }

    fn on_throttled(&self, identifier: &str, attempt: u32) {
        if self.quiet {
            return;
        }
        println!(
            "  {} {}  {}",
            style("[429]").yellow().bold(),
            identifier,
            style(format!("rate limited (attempt {}), backing off", attempt)).dim(),
        );
    }

    fn on_abandoned(&self, identifier: &str, error: &FetchError) {
        println!(
            "  {} {}  {}",
            style("[skip]").red().bold(),
            identifier,
            style(error).dim(),
        );
    }

    fn on_milestone(&self, completed: u64, elapsed: Duration) {
        if self.quiet {
            return;
        }
        println!(
            "  {}",
            style(format!(
                "── {} completed, last batch took {:.1}s",
                completed,
                elapsed.as_secs_f64()
            ))
            .cyan(),
        );
    }
}

/// `[processed/total] (xx.x%)`
pub fn progress_prefix(processed: u64, total: u64) -> String {
    let percent = if total == 0 {
        100.0
    } else {
        processed as f64 * 100.0 / total as f64
    };
    format!("[{}/{}] ({:.1}%)", processed, total, percent)
}

fn plural(count: u64) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

// ── Header ───────────────────────────────────────────────────────────────────

/// Print a styled header at the start of a run.
pub fn print_header(input: &Path, output: &Path, mode: OutputMode, config: &FetchConfig) {
    println!(
        "{} {} {}",
        style("patent-assignees").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!("{} -> {} ({})", input.display(), output.display(), mode)).dim(),
    );

    let mut meta_parts = vec![
        format!("Concurrency: {}", config.concurrency),
        format!(
            "Budget: {} (+{} on success)",
            config.initial_budget, config.replenish_budget
        ),
        format!("Throttle wait: {:?}", config.throttle_wait),
    ];
    if let Some(cap) = config.max_throttle_retries {
        meta_parts.push(format!("Max throttle retries: {}", cap));
    }

    println!("{}", style(meta_parts.join(" | ")).dim());
    println!();
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Print the final summary bar with colored counts.
pub fn print_summary(report: &RunReport, output: &Path) {
    println!();
    println!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    );
    println!(
        "  {} patent{} in {:.1}s  {}  {}  {}  {}  {}  {}",
        style(report.total).bold(),
        plural(report.total),
        report.elapsed.as_secs_f64(),
        style("|").dim(),
        style(format!("{} fetched", report.processed)).green(),
        style("|").dim(),
        style(format!("{} abandoned", report.abandoned.len())).red(),
        style("|").dim(),
        style(format!("{} throttled", report.throttle_events)).yellow(),
    );
    println!(
        "  {} row{} written to {}",
        style(report.rows_written).bold(),
        plural(report.rows_written),
        output.display(),
    );
}

/// Print identifiers that produced no output, grouped by error kind.
pub fn print_abandoned(report: &RunReport) {
    if report.abandoned.is_empty() {
        return;
    }

    println!();
    println!(
        "  {}",
        style("Some patents could not be fetched:").yellow()
    );
    for line in abandoned_lines(report) {
        println!("  {} {}", style("•").dim(), line);
    }
}

/// One line per error kind: `N <kind> errors: id1, id2, ... and K more`.
fn abandoned_lines(report: &RunReport) -> Vec<String> {
    let mut kinds: Vec<&'static str> = Vec::new();
    for entry in &report.abandoned {
        if !kinds.contains(&entry.kind) {
            kinds.push(entry.kind);
        }
    }

    kinds
        .into_iter()
        .map(|kind| {
            let ids: Vec<&str> = report
                .abandoned
                .iter()
                .filter(|a| a.kind == kind)
                .map(|a| a.identifier.as_str())
                .collect();
            format!("{} {} errors: {}", ids.len(), kind, format_id_list(&ids))
        })
        .collect()
}

fn format_id_list(ids: &[&str]) -> String {
    if ids.len() <= MAX_ABANDONED_SHOWN {
        ids.join(", ")
    } else {
        format!(
            "{}, ... and {} more",
            ids[..MAX_ABANDONED_SHOWN].join(", "),
            ids.len() - MAX_ABANDONED_SHOWN
        )
    }
}
