//! Command workflows shared by the CLI handlers.
//!
//! Each `run_*` function does the work of one subcommand and returns what was
//! produced; printing stays in `app`.
//!
//! correction file -> formula -> per-record evaluation -> report pages

use std::path::Path;

use tracing::{info, warn};

use crate::compare::{PROFILE_FOLDERS, collect_comparisons, collect_diff_pairs, collect_profile_grid};
use crate::data::{DasCatalog, JobsConfig, YearPlan};
use crate::domain::{OutOfBoundsWarning, PlotConfig, TagMetadata};
use crate::error::AppError;
use crate::eval::{WindowSummary, evaluate_record, summarize_window};
use crate::expr::{ExprError, Formula};
use crate::io::{CorrectionFile, JsonObjectStore, load_correction_file, read_json};
use crate::plot::{
    CorrectionPage, RenderError, comparison_pages_svg, correction_page_svg, diff_pair_svg, profile_grid_svg,
};
use crate::report::ReportDocument;

/// Out-of-bounds findings of one record.
#[derive(Debug, Clone)]
pub struct FlaggedRecord {
    /// Index into `CorrectionFile::records`.
    pub index: usize,
    pub summary: WindowSummary,
    pub warnings: Vec<OutOfBoundsWarning>,
}

/// Outputs of a `plot` run.
#[derive(Debug)]
pub struct PlotOutcome {
    pub pages: usize,
    /// Records dropped at evaluation time, as `(line, error)`.
    pub skipped: Vec<(usize, ExprError)>,
    pub flagged: Vec<FlaggedRecord>,
}

/// Load a correction file; its formula is parsed by `run_plot`.
pub fn load_plot_input(config: &PlotConfig) -> Result<CorrectionFile, AppError> {
    let file = load_correction_file(&config.input, config.layout)?;
    info!(rows = file.rows_read, usable = file.records.len(), "loaded correction file");
    Ok(file)
}

/// Evaluate every record and write one report page per evaluated record.
///
/// The document is created before anything is evaluated and is always
/// closed. Records whose evaluation fails are skipped, and a malformed
/// formula skips every record. Fails with exit code 3 when no page could be
/// produced.
pub fn run_plot(config: &PlotConfig, file: &CorrectionFile) -> Result<PlotOutcome, AppError> {
    let domain = config.grid.points();
    let source_name = crate::app::file_label(&config.input);

    let mut doc = ReportDocument::create(&config.output, &source_name)?;
    let mut outcome = PlotOutcome {
        pages: 0,
        skipped: Vec::new(),
        flagged: Vec::new(),
    };

    let formula = Formula::parse(&file.template);
    match &formula {
        Ok(formula) => info!(slots = formula.slot_count(), "parsed correction formula"),
        Err(err) => warn!(template = %file.template, error = %err, "malformed correction formula"),
    }

    for (index, record) in file.records.iter().enumerate() {
        let evaluated = formula
            .as_ref()
            .map_err(|err| err.clone())
            .and_then(|formula| evaluate_record(formula, record, &domain, config.bounds));
        let series = match evaluated {
            Ok(series) => series,
            Err(err) => {
                warn!(line = record.line, error = %err, "skipping record");
                outcome.skipped.push((record.line, err));
                continue;
            }
        };

        if let Some(summary) = summarize_window(&series, record.validity) {
            if !series.warnings.is_empty() {
                warn!(
                    line = record.line,
                    eta = %record.eta.label(),
                    min = summary.min,
                    max = summary.max,
                    below = summary.below,
                    above = summary.above,
                    "corrections out of bounds inside validity window"
                );
                outcome.flagged.push(FlaggedRecord {
                    index,
                    summary,
                    warnings: series.warnings.clone(),
                });
            }
        }

        let page = CorrectionPage {
            template: &file.template,
            source_name: &source_name,
            record,
            series: &series,
            profile: config.profile,
            reference_x: config.reference_x,
        };
        let svg = correction_page_svg(&page, (config.page_width, config.page_height)).map_err(render_error)?;
        doc.add_page(&record.eta.label(), &svg)?;
    }

    outcome.pages = doc.finish()?;
    if let Err(err) = formula {
        return Err(AppError::new(
            3,
            format!("Malformed correction formula in '{}': {err}", config.input.display()),
        ));
    }
    if file.records.is_empty() {
        return Err(AppError::new(
            3,
            format!("No usable correction rows in '{}'.", config.input.display()),
        ));
    }
    if outcome.pages == 0 {
        return Err(AppError::new(
            3,
            format!(
                "No record of '{}' could be evaluated; see the diagnostics above.",
                config.input.display()
            ),
        ));
    }
    Ok(outcome)
}

/// Build the metadata of two tag files and write it to `output`.
pub fn run_metadata(v1: &Path, v2: &Path, prefix: Option<&str>, output: &Path) -> Result<TagMetadata, AppError> {
    let metadata = crate::metadata::build_from_files(v1, v2, prefix)?;
    for (key, side) in crate::metadata::unmatched_keys(&metadata) {
        info!(key, "no V{side} tag for base key");
    }
    crate::io::write_json_pretty(output, "metadata", &metadata)?;
    info!(keys = metadata.len(), path = %output.display(), "metadata written");
    Ok(metadata)
}

/// Counts of a `compare`, `profiles` or `diff` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportOutcome {
    pub pages: usize,
    pub keys: usize,
    pub skipped: usize,
}

/// V1/V2 overlay, ratio and percent-difference pages for every metadata key.
pub fn run_compare(store: &Path, metadata: &Path, output: &Path, size: (u32, u32)) -> Result<ReportOutcome, AppError> {
    let store = JsonObjectStore::open(store)?;
    let metadata: TagMetadata = read_json(metadata, "metadata file")?;
    info!(objects = store.len(), keys = metadata.len(), "comparing corrections");

    let (comparisons, skipped) = collect_comparisons(&store, &metadata);

    let mut doc = ReportDocument::create(output, "Corrections comparison")?;
    for cmp in &comparisons {
        let pages = comparison_pages_svg(cmp, size).map_err(render_error)?;
        for (i, svg) in pages.iter().enumerate() {
            let caption = if i == 0 {
                cmp.key.clone()
            } else {
                format!("{}: percent difference", cmp.key)
            };
            doc.add_page(&caption, svg)?;
        }
    }
    let pages = doc.finish()?;

    if comparisons.is_empty() {
        return Err(AppError::new(
            3,
            "No base key had both V1 and V2 histograms; nothing to compare.",
        ));
    }
    Ok(ReportOutcome {
        pages,
        keys: comparisons.len(),
        skipped: skipped.len(),
    })
}

/// One grid page per profile folder and metadata key.
///
/// A missing profile folder aborts the run with exit code 3.
pub fn run_profiles(store: &Path, metadata: &Path, output: &Path, panel_size: (u32, u32)) -> Result<ReportOutcome, AppError> {
    let store = JsonObjectStore::open(store)?;
    let metadata: TagMetadata = read_json(metadata, "metadata file")?;

    let mut doc = ReportDocument::create(output, "Correction profiles")?;
    let mut outcome = ReportOutcome::default();
    for folder in PROFILE_FOLDERS {
        for (key, entries) in &metadata {
            if entries.len() < 2 {
                warn!(key = %key, entries = entries.len(), "expected at least two metadata entries, skipping");
                outcome.skipped += 1;
                continue;
            }
            let grid = collect_profile_grid(&store, folder, key, entries)
                .map_err(|err| AppError::new(3, err.to_string()))?;
            let filled = grid.panels.iter().flatten().count();
            info!(folder, key = %key, panels = filled, cells = grid.panels.len(), "profile grid");

            let svg = profile_grid_svg(&grid, panel_size).map_err(render_error)?;
            doc.add_page(&format!("{folder}: {key}"), &svg)?;
            outcome.keys += 1;
        }
    }
    outcome.pages = doc.finish()?;
    Ok(outcome)
}

/// One overlay page with a ratio pad for every 1D histogram found in both
/// stores. Objects missing from `b` are counted as skipped.
pub fn run_diff(a: &Path, b: &Path, output: &Path, size: (u32, u32)) -> Result<ReportOutcome, AppError> {
    let first = JsonObjectStore::open(a)?;
    let second = JsonObjectStore::open(b)?;
    let labels = (crate::app::file_label(a), crate::app::file_label(b));
    info!(first = first.len(), second = second.len(), "comparing files");

    let (pairs, missing) = collect_diff_pairs(&first, &second);

    let mut doc = ReportDocument::create(output, "Histogram comparison")?;
    for pair in &pairs {
        let svg = diff_pair_svg(pair, (labels.0.as_str(), labels.1.as_str()), size).map_err(render_error)?;
        doc.add_page(&pair.path, &svg)?;
    }
    let pages = doc.finish()?;

    if pairs.is_empty() {
        return Err(AppError::new(
            3,
            format!("No 1D histogram of '{}' was found in '{}'.", a.display(), b.display()),
        ));
    }
    Ok(ReportOutcome {
        pages,
        keys: pairs.len(),
        skipped: missing.len(),
    })
}

/// Plan every configured channel; plan files are written unless `dry_run`.
pub fn run_jobs(config: &JobsConfig, dry_run: bool) -> Result<Vec<YearPlan>, AppError> {
    let catalog = DasCatalog::new(config.das_client.clone()).with_proxy(config.voms_proxy.clone());

    let mut plans = Vec::new();
    for channel in &config.channels {
        info!(channel = %channel, "planning channel");
        for plan in crate::data::jobs::plan_channel(config, &catalog, channel)? {
            if !dry_run {
                let written = crate::data::jobs::write_year_plan(&config.json_dir, &plan)?;
                for path in written {
                    info!(path = %path.display(), "written");
                }
            }
            plans.push(plan);
        }
    }
    Ok(plans)
}

fn render_error(err: RenderError) -> AppError {
    AppError::new(4, format!("Failed to render report page: {err}"))
}
