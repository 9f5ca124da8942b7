//! Terminal output: progress bars and coloured outcome lines.
//!
//! Progress bars draw on stderr and are hidden when output is silenced or
//! stderr is not a terminal, so piping the tool never produces bar noise.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use owo_colors::OwoColorize;
use std::io::IsTerminal;

use crate::harvest::{DownloadReport, DownloadSummary};
use crate::models::AssetKind;

/// Status types for coloured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    Warning,
    Info,
    Download,
    Search,
}

/// Status icons for different operations.
pub fn status_icon(status: Status) -> &'static str {
    match status {
        Status::Success => "✓",
        Status::Error => "✗",
        Status::Warning => "⚠",
        Status::Info => "ℹ",
        Status::Download => "↓",
        Status::Search => "🔍",
    }
}

/// Print a styled status line to stdout.
pub fn print_status(status: Status, msg: &str) {
    let icon = status_icon(status);
    match status {
        Status::Success => println!("{} {}", icon.green().bold(), msg),
        Status::Error => println!("{} {}", icon.red().bold(), msg),
        Status::Warning => println!("{} {}", icon.yellow().bold(), msg),
        Status::Info => println!("{} {}", icon.cyan().bold(), msg),
        Status::Download => println!("{} {}", icon.magenta(), msg),
        Status::Search => println!("{} {}", icon.yellow(), msg),
    }
}

/// Format a number with commas.
pub fn format_number(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Whether progress bars should be drawn
pub fn progress_visible(quiet: bool) -> bool {
    !quiet && std::io::stderr().is_terminal()
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap()
        .progress_chars("█▓▒░ ")
}

fn new_bar(len: u64, msg: String, visible: bool) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if !visible {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }
    pb.set_message(msg);
    pb
}

/// Bar for metadata collection; its length is set once the hit count is known
pub fn search_progress(source_name: &str, visible: bool) -> ProgressBar {
    let pb = new_bar(0, format!("Retrieving results from {}", source_name), visible);
    pb.set_style(bar_style(
        "{msg} {bar:30.green/white} {percent}% (eta {eta})",
    ));
    pb
}

/// Bar for one download task
pub fn download_progress(kind: AssetKind, visible: bool) -> ProgressBar {
    let pb = new_bar(0, format!("Downloading {}", kind), visible);
    pb.set_style(bar_style(
        "{msg}: {bar:40.cyan/blue} {pos}/{len} ({percent}%)",
    ));
    pb
}

/// Summary line for a finished download task
pub fn download_summary_line(kind: AssetKind, report: &DownloadReport) -> (Status, String) {
    match report.summary() {
        DownloadSummary::AllSucceeded => (
            Status::Success,
            format!(
                "All {} {} downloads succeeded",
                format_number(report.attempted()),
                kind
            ),
        ),
        DownloadSummary::MissingAssets { succeeded, missing } => (
            Status::Warning,
            format!(
                "{} {} downloads succeeded, {} not available",
                format_number(succeeded),
                kind,
                format_number(missing)
            ),
        ),
        DownloadSummary::Failures { succeeded, failed } => (
            Status::Error,
            format!(
                "{} {} downloads succeeded, {} failed after retrying",
                format_number(succeeded),
                kind,
                format_number(failed)
            ),
        ),
    }
}

/// Print the summary line for a finished download task
pub fn print_download_summary(kind: AssetKind, report: &DownloadReport) {
    let (status, line) = download_summary_line(kind, report);
    print_status(status, &line);
}
