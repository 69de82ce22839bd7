//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - parsing/evaluation code stays clean and testable
//! - output changes are localized (important for snapshot tests)

use std::path::Path;

use crate::data::jobs::YearPlan;
use crate::domain::{BoundKind, CorrectionBounds, CorrectionRecord, OutOfBoundsWarning, PlotConfig, TagEntry, TagMetadata};
use crate::eval::WindowSummary;
use crate::io::correction::{CorrectionFile, RowError};
use crate::io::{ObjectStore, StoreNode, walk};
use crate::plot::{render_ascii_grid, render_ascii_histogram};

/// Greedy word wrap; words longer than `width` are split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        loop {
            let used = current.chars().count();
            let sep = usize::from(used > 0);
            if used + sep + word.len() <= width {
                if sep == 1 {
                    current.push(' ');
                }
                current.extend(word.iter());
                break;
            }
            if used > 0 {
                lines.push(std::mem::take(&mut current));
                continue;
            }
            let rest = word.split_off(width);
            lines.push(word.into_iter().collect());
            word = rest;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// `[i] = value` for each parameter.
pub fn parameter_lines(params: &[f64]) -> Vec<String> {
    params
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[{i}] = {p}"))
        .collect()
}

/// Header of a `plot` run: input, formula, row counts.
pub fn format_plot_summary(file: &CorrectionFile, config: &PlotConfig) -> String {
    let mut out = String::new();

    out.push_str("=== jec - Correction Function Report ===\n");
    out.push_str(&format!("Input: {}\n", config.input.display()));
    out.push_str(&format!("Output: {}\n", config.output.display()));
    out.push_str("Function expression extracted from header:\n");
    out.push_str(&format!("  {}\n", file.template));
    out.push_str(&format!(
        "Rows: read={} usable={} skipped={}\n",
        file.rows_read,
        file.records.len(),
        file.row_errors.len()
    ));
    out.push_str(&format!(
        "Profile: {:?} | x=[{}, {}] ({} points) | bounds=[{}, {}]\n",
        config.profile,
        config.grid.start,
        config.grid.stop,
        config.grid.count,
        config.bounds.low,
        config.bounds.high
    ));

    out
}

/// Table of skipped rows.
pub fn format_row_errors(errors: &[RowError]) -> String {
    let mut out = String::new();
    if errors.is_empty() {
        return out;
    }
    out.push_str("Skipped rows:\n");
    out.push_str(&format!("{:>6}  {}\n", "line", "reason"));
    out.push_str(&format!("{:-<6}  {:-<40}\n", "", ""));
    for e in errors {
        out.push_str(&format!("{:>6}  {}\n", e.line, e.issue));
    }
    out
}

/// Out-of-bounds report for one record; empty when nothing was flagged.
///
/// At most `max_listed` samples are listed per bound.
pub fn format_bound_warnings(
    record: &CorrectionRecord,
    summary: &WindowSummary,
    warnings: &[OutOfBoundsWarning],
    bounds: CorrectionBounds,
    max_listed: usize,
) -> String {
    let mut out = String::new();
    if warnings.is_empty() {
        return out;
    }
    out.push_str(&format!(
        "Warning: For eta bin [{}, {}], corrections within pT range {} -- {} have out-of-bound values:\n",
        record.eta.low, record.eta.high, record.validity.min, record.validity.max
    ));
    out.push_str(&format!("   min correction: {}\n", summary.min));
    out.push_str(&format!("   max correction: {}\n", summary.max));

    for (kind, word, limit, count) in [
        (BoundKind::Low, "below", bounds.low, summary.below),
        (BoundKind::High, "above", bounds.high, summary.above),
    ] {
        if count == 0 {
            continue;
        }
        out.push_str(&format!("   Corrections {word} {limit} found at:\n"));
        for w in warnings.iter().filter(|w| w.bound == kind).take(max_listed) {
            out.push_str(&format!(
                "      pT = {:.3} GeV  -->  correction = {:.3e}\n",
                w.x, w.value
            ));
        }
        if count > max_listed {
            out.push_str(&format!("      ... and {} more\n", count - max_listed));
        }
    }
    out
}

/// Footer of a `plot` run.
pub fn format_plot_footer(pages: usize, skipped: usize, flagged: usize, output: &Path) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Pages: {pages} | records skipped: {skipped} | records with out-of-bound values: {flagged}\n"
    ));
    out.push_str(&format!("Plots saved to {}\n", output.display()));
    out
}

/// One-record description used by `inspect`.
pub fn format_record(record: &CorrectionRecord, template: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Line {} ({:?} layout): {}\n",
        record.line,
        record.layout,
        record.eta.label()
    ));
    out.push_str(&format!(
        "Validity: {} -- {}\n",
        record.validity.min, record.validity.max
    ));
    for line in wrap_text(template, 60) {
        out.push_str(&format!("f(x) = {line}\n"));
    }
    for line in parameter_lines(&record.parameters) {
        out.push_str(&format!("  {line}\n"));
    }
    out
}

/// Base-key table of a metadata mapping.
pub fn format_metadata(metadata: &TagMetadata) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<40} {:<5} {:<5}\n", "base key", "V1", "V2"));
    out.push_str(&format!("{:-<40} {:-<5} {:-<5}\n", "", "", ""));
    for (key, entries) in metadata {
        let side = |i: usize| match entries.get(i) {
            Some(TagEntry(_, Some(_))) => "yes",
            _ => "-",
        };
        out.push_str(
            format!("{:<40} {:<5} {:<5}", truncate(key, 40), side(0), side(1))
                .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Per-sample job table of one channel/year.
pub fn format_year_plan(plan: &YearPlan) -> String {
    let mut out = String::new();
    out.push_str(&format!("========> {} {}\n", plan.channel, plan.year));
    out.push_str(&format!("{:>6} {:>6} {:>8}  {}\n", "files", "jobs", "events", "sample"));
    for (key, job) in &plan.jobs {
        out.push_str(&format!("{:>6} {:>6} {:>8}  {}\n", job.3, job.0, job.1, key));
    }
    for dataset in &plan.missing {
        out.push_str(&format!("PROBLEM: No files found for dataset '{dataset}'.\n"));
    }
    out.push_str(&format!("AllJobs for {} = {}\n", plan.year, plan.total_jobs()));
    out
}

/// Recursive listing of a store: entries, mean and RMS per object.
///
/// With `deep`, each object is followed by its bars (1D) or cell table (2D).
pub fn format_scan<S: ObjectStore + ?Sized>(store: &S, root: &str, deep: bool) -> String {
    let mut out = String::new();
    out.push_str("\n-----------: Scan all directories and print Entries, Mean, RMS :------------\n");
    out.push_str(&format!("\nDirectory: {root}/\n"));

    for node in walk(store, "") {
        let path = match node {
            StoreNode::Folder(path) => {
                out.push_str(&format!("\nDirectory: {root}/{path}/\n"));
                continue;
            }
            StoreNode::Object(path) => path,
        };
        let Some(hist) = store.get(&path) else {
            continue;
        };
        if deep {
            out.push('\n');
        }
        let kind = match (hist.kind.as_str(), hist.dimension()) {
            ("", 1) => "TH1",
            ("", _) => "TH2",
            (kind, _) => kind,
        };
        out.push_str(&format!(
            "{:>15}: {:>35}{:>15}{:>15.4}{:>15.4}\n",
            kind,
            hist.name,
            hist.entries,
            hist.mean(),
            hist.rms()
        ));
        if deep {
            if hist.dimension() == 1 {
                out.push_str(&render_ascii_histogram(hist, 50));
            } else {
                out.push_str(&render_ascii_grid(hist, 10, 10));
            }
        }
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
