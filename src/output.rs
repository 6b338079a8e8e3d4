//! CLI output formatting for all pipeline stages.
//!
//! Every stage reports one line per leaf (or per branch, for root merges),
//! addressed the same way the stage was selected:
//!
//! ```text
//! [trips][2019_japan] unit: created
//! [trips][2020_italy] unit: already exists
//! [trips][2021_empty] unit: skipped (source file does not exist)
//! [trips][2022_broken] unit: FAILED (Variable $g1 is referenced but never declared)
//! [trips] root: created
//! unite: 1 created, 1 already existed, 1 skipped, 1 failed
//! ```
//!
//! # Architecture
//!
//! Each stage has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! they do no I/O.

use crate::freeze::FreezeSummary;
use crate::types::{LeafReport, StageReport, Status};

fn address(report: &LeafReport) -> String {
    if report.leaf.is_empty() {
        format!("[{}]", report.branch)
    } else {
        format!("[{}][{}]", report.branch, report.leaf)
    }
}

fn status_text(status: &Status) -> String {
    match status {
        Status::Created => "created".to_string(),
        Status::AlreadyExists => "already exists".to_string(),
        Status::Skipped(reason) => format!("skipped ({reason})"),
        Status::Failed(message) => format!("FAILED ({message})"),
    }
}

/// One line per leaf plus a totals line.
pub fn format_stage_report(stage: &str, report: &StageReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .leaves
        .iter()
        .map(|r| format!("{} {}: {}", address(r), r.what, status_text(&r.status)))
        .collect();

    if report.leaves.is_empty() {
        lines.push(format!("{stage}: nothing selected"));
        return lines;
    }

    let existing = report
        .leaves
        .iter()
        .filter(|r| r.status == Status::AlreadyExists)
        .count();
    let skipped = report
        .leaves
        .iter()
        .filter(|r| matches!(r.status, Status::Skipped(_)))
        .count();
    lines.push(format!(
        "{stage}: {} created, {existing} already existed, {skipped} skipped, {} failed",
        report.created(),
        report.failed()
    ));
    lines
}

pub fn print_stage_report(stage: &str, report: &StageReport) {
    for line in format_stage_report(stage, report) {
        println!("{}", line);
    }
}

pub fn format_freeze_summary(summary: &FreezeSummary) -> Vec<String> {
    vec![
        format!("Frozen {}", summary.path.display()),
        format!("    rows copied: {}", summary.rows),
        format!("    tag index: {}", summary.tags),
        format!("    permission index: {}", summary.permissions),
        format!("    thumbnails: {}", summary.thumbnails),
        format!("    helpers: {}", summary.helpers),
    ]
}

pub fn print_freeze_summary(summary: &FreezeSummary) {
    for line in format_freeze_summary(summary) {
        println!("{}", line);
    }
}
