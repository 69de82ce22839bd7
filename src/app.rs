//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - installs the log subscriber
//! - turns arguments into run configurations
//! - prints reports and summaries

use std::io::IsTerminal;
use std::path::Path;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{
    Cli, Command, CompareArgs, DiffArgs, InspectArgs, JobsArgs, MetadataArgs, PlotArgs, ProfilesArgs, SamplingArgs,
    ScanArgs,
};
use crate::domain::{CorrectionBounds, PlotConfig, SamplingGrid};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `jec` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    match cli.command {
        Command::Plot(args) => handle_plot(args),
        Command::Inspect(args) => handle_inspect(args),
        Command::Metadata(args) => handle_metadata(args),
        Command::Compare(args) => handle_compare(args),
        Command::Profiles(args) => handle_profiles(args),
        Command::Jobs(args) => handle_jobs(args),
        Command::Diff(args) => handle_diff(args),
        Command::Scan(args) => handle_scan(args),
    }
}

/// Diagnostics go to stderr; `--log` wins over `RUST_LOG`, default `info`.
fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let config = plot_config_from_args(&args)?;
    let file = pipeline::load_plot_input(&config)?;

    println!("{}", crate::report::format_plot_summary(&file, &config));
    print!("{}", crate::report::format_row_errors(&file.row_errors));

    let outcome = pipeline::run_plot(&config, &file)?;

    for flagged in &outcome.flagged {
        let record = &file.records[flagged.index];
        print!(
            "{}",
            crate::report::format_bound_warnings(
                record,
                &flagged.summary,
                &flagged.warnings,
                config.bounds,
                args.max_listed,
            )
        );
    }
    print!(
        "{}",
        crate::report::format_plot_footer(
            outcome.pages,
            file.row_errors.len() + outcome.skipped.len(),
            outcome.flagged.len(),
            &config.output,
        )
    );
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<(), AppError> {
    let layout = args.sampling.layout;
    let file = crate::io::load_correction_file(&args.input, layout)?;
    let formula = crate::expr::Formula::parse(&file.template)?;

    let count = file.records.len();
    let record = args
        .record
        .checked_sub(1)
        .and_then(|i| file.records.get(i))
        .ok_or_else(|| {
            AppError::new(
                2,
                format!("Record {} out of range: '{}' has {count} usable rows.", args.record, args.input.display()),
            )
        })?;

    let grid = sampling_grid(&args.sampling)?;
    let bounds = correction_bounds(&args.sampling)?;
    let series = crate::eval::evaluate_record(&formula, record, &grid.points(), bounds)?;

    print!("{}", crate::report::format_record(record, &file.template));
    println!("Substituted: {}", formula.bind(&record.parameters)?.substituted());
    if let Some(summary) = crate::eval::summarize_window(&series, record.validity) {
        print!(
            "{}",
            crate::report::format_bound_warnings(record, &summary, &series.warnings, bounds, 10)
        );
    }

    let page = crate::plot::CorrectionPage {
        template: &file.template,
        source_name: "",
        record,
        series: &series,
        profile: args.sampling.profile,
        reference_x: args.sampling.reference_pt,
    };
    let markers: Vec<f64> = page.markers().into_iter().map(|(x, _)| x).collect();
    let plot = crate::plot::render_ascii_plot(
        &series,
        &markers,
        crate::plot::AsciiOptions {
            width: args.width,
            height: args.height,
            log_x: args.sampling.profile.log_x(),
        },
    );
    println!("{plot}");
    Ok(())
}

fn handle_metadata(args: MetadataArgs) -> Result<(), AppError> {
    let metadata = pipeline::run_metadata(&args.v1, &args.v2, args.prefix.as_deref(), &args.output)?;
    print!("{}", crate::report::format_metadata(&metadata));
    println!("Metadata saved to {}", args.output.display());
    Ok(())
}

fn handle_compare(args: CompareArgs) -> Result<(), AppError> {
    let outcome = pipeline::run_compare(&args.store, &args.metadata, &args.output, (args.width, args.height))?;
    println!(
        "Compared {} base keys ({} skipped), {} pages saved to {}",
        outcome.keys,
        outcome.skipped,
        outcome.pages,
        args.output.display()
    );
    Ok(())
}

fn handle_profiles(args: ProfilesArgs) -> Result<(), AppError> {
    let outcome = pipeline::run_profiles(
        &args.store,
        &args.metadata,
        &args.output,
        (args.panel_width, args.panel_height),
    )?;
    println!(
        "{} profile grids ({} keys skipped) saved to {}",
        outcome.pages,
        outcome.skipped,
        args.output.display()
    );
    Ok(())
}

fn handle_diff(args: DiffArgs) -> Result<(), AppError> {
    let outcome = pipeline::run_diff(&args.a, &args.b, &args.output, (args.width, args.height))?;
    println!(
        "Compared {} histograms ({} not found in second file), {} pages saved to {}",
        outcome.keys,
        outcome.skipped,
        outcome.pages,
        args.output.display()
    );
    Ok(())
}

fn handle_scan(args: ScanArgs) -> Result<(), AppError> {
    let store = crate::io::JsonObjectStore::open(&args.store)?;
    print!("{}", crate::report::format_scan(&store, &file_label(&args.store), args.deep));
    Ok(())
}

fn handle_jobs(args: JobsArgs) -> Result<(), AppError> {
    let config = jobs_config_from_args(&args)?;
    let plans = pipeline::run_jobs(&config, args.dry_run)?;
    for plan in &plans {
        print!("{}", crate::report::format_year_plan(plan));
    }
    if args.dry_run {
        info!("dry run, no plan files written");
    } else {
        println!("Plan files saved to {}", config.json_dir.display());
    }
    Ok(())
}

/// File name of `path`, or the whole path when it has none.
pub(crate) fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Build the `plot` configuration from CLI flags.
pub fn plot_config_from_args(args: &PlotArgs) -> Result<PlotConfig, AppError> {
    if args.width == 0 || args.height == 0 {
        return Err(AppError::new(2, "Page width and height must be > 0."));
    }
    Ok(PlotConfig {
        input: args.input.clone(),
        output: args.output.clone(),
        profile: args.sampling.profile,
        layout: args.sampling.layout,
        grid: sampling_grid(&args.sampling)?,
        bounds: correction_bounds(&args.sampling)?,
        reference_x: args.sampling.reference_pt,
        page_width: args.width,
        page_height: args.height,
    })
}

/// Profile default grid with any `--x-min/--x-max/--points` overrides.
pub fn sampling_grid(args: &SamplingArgs) -> Result<SamplingGrid, AppError> {
    let defaults = args.profile.default_grid();
    let grid = SamplingGrid {
        start: args.x_min.unwrap_or(defaults.start),
        stop: args.x_max.unwrap_or(defaults.stop),
        count: args.points.unwrap_or(defaults.count),
    };
    if !(grid.start.is_finite() && grid.stop.is_finite() && grid.start < grid.stop) {
        return Err(AppError::new(
            2,
            format!("Invalid x range [{}, {}].", grid.start, grid.stop),
        ));
    }
    if args.profile.log_x() && grid.start <= 0.0 {
        return Err(AppError::new(2, "A log x axis needs --x-min > 0."));
    }
    if grid.count < 2 {
        return Err(AppError::new(2, "--points must be at least 2."));
    }
    Ok(grid)
}

fn correction_bounds(args: &SamplingArgs) -> Result<CorrectionBounds, AppError> {
    if !(args.low_bound.is_finite() && args.high_bound.is_finite() && args.low_bound < args.high_bound) {
        return Err(AppError::new(
            2,
            format!("Invalid correction bounds [{}, {}].", args.low_bound, args.high_bound),
        ));
    }
    Ok(CorrectionBounds {
        low: args.low_bound,
        high: args.high_bound,
    })
}

fn jobs_config_from_args(args: &JobsArgs) -> Result<crate::data::JobsConfig, AppError> {
    let mut config = crate::data::JobsConfig::load(args.config.as_deref())?;
    if !args.channels.is_empty() {
        config.channels = args.channels.clone();
    }
    if !args.years.is_empty() {
        config.years = args.years.clone();
    }
    if let Some(dir) = &args.samples_dir {
        config.samples_dir = dir.clone();
    }
    if let Some(dir) = &args.json_dir {
        config.json_dir = dir.clone();
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LayoutMode, PlotProfile};

    fn plot_args(extra: &[&str]) -> PlotArgs {
        let mut argv = vec!["jec", "plot", "in.txt", "out.html"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Plot(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn plot_config_uses_profile_defaults() {
        let config = plot_config_from_args(&plot_args(&[])).unwrap();
        assert_eq!(config.grid, PlotProfile::Validity.default_grid());
        assert_eq!(config.bounds, CorrectionBounds::default());
        assert_eq!(config.layout, LayoutMode::Auto);

        let config = plot_config_from_args(&plot_args(&["--profile", "reference"])).unwrap();
        assert_eq!(config.grid.start, 10.0);
        assert_eq!(config.grid.stop, 200.0);
        assert_eq!(config.grid.count, 500);
    }

    #[test]
    fn grid_overrides_are_validated() {
        let config = plot_config_from_args(&plot_args(&["--x-min", "20", "--points", "11"])).unwrap();
        assert_eq!(config.grid.start, 20.0);
        assert_eq!(config.grid.count, 11);

        let err = plot_config_from_args(&plot_args(&["--x-min", "0"])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let err = plot_config_from_args(&plot_args(&["--x-min", "300", "--x-max", "100"])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let err = plot_config_from_args(&plot_args(&["--points", "1"])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn bounds_must_be_ordered() {
        let err = plot_config_from_args(&plot_args(&["--low-bound", "6"])).unwrap_err();
        assert!(err.message().contains("Invalid correction bounds"));
    }
}
