//! Command-line parsing for the JEC comparison toolkit.
//!
//! The goal of this module is to keep **argument parsing** separate from
//! **command dispatch** (`app`) and from the parsing/evaluation code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{DEFAULT_REFERENCE_PT, LayoutMode, PlotProfile};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "jec", version, about = "Jet energy correction comparison toolkit")]
pub struct Cli {
    /// Log filter (overrides RUST_LOG), e.g. `debug` or `jec_compare=trace`.
    #[arg(long, global = true, value_name = "FILTER")]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Evaluate every record of a correction text file and write one page per record.
    Plot(PlotArgs),
    /// Print one record of a correction text file with an ASCII plot.
    Inspect(InspectArgs),
    /// Pair the corrections of two tag files by base key.
    Metadata(MetadataArgs),
    /// Compare V1/V2 correction histograms for every metadata key.
    Compare(CompareArgs),
    /// Grid pages of V1/V2 correction profiles per pT/eta bin.
    Profiles(ProfilesArgs),
    /// Plan histogram-production jobs from the dataset catalog.
    Jobs(JobsArgs),
    /// Overlay every 1D histogram present in two analysis files.
    Diff(DiffArgs),
    /// List every object of an analysis file with entries, mean and RMS.
    Scan(ScanArgs),
}

/// Options shared by the correction-file commands.
#[derive(Debug, Parser, Clone)]
pub struct SamplingArgs {
    /// Plot flavour: log pT axis with validity markers, or linear with a reference marker.
    #[arg(long, value_enum, default_value_t = PlotProfile::Validity)]
    pub profile: PlotProfile,

    /// Row layout; `auto` treats rows with more than 16 tokens as extended.
    #[arg(long, value_enum, default_value_t = LayoutMode::Auto)]
    pub layout: LayoutMode,

    /// Start of the sampled x range (profile default when omitted).
    #[arg(long)]
    pub x_min: Option<f64>,

    /// End of the sampled x range (profile default when omitted).
    #[arg(long)]
    pub x_max: Option<f64>,

    /// Number of sampled points (profile default when omitted).
    #[arg(long)]
    pub points: Option<usize>,

    /// Lowest expected correction value inside the validity window.
    #[arg(long, default_value_t = 0.0002)]
    pub low_bound: f64,

    /// Highest expected correction value inside the validity window.
    #[arg(long, default_value_t = 5.0)]
    pub high_bound: f64,

    /// Marker position for the reference profile.
    #[arg(long, default_value_t = DEFAULT_REFERENCE_PT)]
    pub reference_pt: f64,
}

/// Options for `jec plot`.
#[derive(Debug, Parser, Clone)]
pub struct PlotArgs {
    /// Correction text file.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Report document (.html or .svg).
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    #[command(flatten)]
    pub sampling: SamplingArgs,

    /// Page width (pixels).
    #[arg(long, default_value_t = 1000)]
    pub width: u32,

    /// Page height (pixels).
    #[arg(long, default_value_t = 600)]
    pub height: u32,

    /// Out-of-bound samples listed per record and bound.
    #[arg(long, default_value_t = 10)]
    pub max_listed: usize,
}

/// Options for `jec inspect`.
#[derive(Debug, Parser, Clone)]
pub struct InspectArgs {
    /// Correction text file.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// 1-based index among usable records.
    #[arg(long, default_value_t = 1)]
    pub record: usize,

    #[command(flatten)]
    pub sampling: SamplingArgs,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

/// Options for `jec metadata`.
#[derive(Debug, Parser, Clone)]
pub struct MetadataArgs {
    /// V1 tag file.
    #[arg(long, value_name = "JSON")]
    pub v1: PathBuf,

    /// V2 tag file.
    #[arg(long, value_name = "JSON")]
    pub v2: PathBuf,

    /// Output metadata file.
    #[arg(long, default_value = "metadata.json")]
    pub output: PathBuf,

    /// Directory prefix recorded in front of each tag-file path.
    #[arg(long)]
    pub prefix: Option<String>,
}

/// Options for `jec compare`.
#[derive(Debug, Parser, Clone)]
pub struct CompareArgs {
    /// JSON export of the analysis file.
    #[arg(long, value_name = "JSON")]
    pub store: PathBuf,

    /// Metadata file produced by `jec metadata`.
    #[arg(long, value_name = "JSON")]
    pub metadata: PathBuf,

    /// Report document (.html or .svg).
    #[arg(long, default_value = "corrections_comparison.html")]
    pub output: PathBuf,

    /// Page width (pixels).
    #[arg(long, default_value_t = 800)]
    pub width: u32,

    /// Page height (pixels).
    #[arg(long, default_value_t = 800)]
    pub height: u32,
}

/// Options for `jec profiles`.
#[derive(Debug, Parser, Clone)]
pub struct ProfilesArgs {
    /// JSON export of the analysis file.
    #[arg(long, value_name = "JSON")]
    pub store: PathBuf,

    /// Metadata file produced by `jec metadata`.
    #[arg(long, value_name = "JSON")]
    pub metadata: PathBuf,

    /// Report document (.html or .svg).
    #[arg(long, default_value = "profiles.html")]
    pub output: PathBuf,

    /// Width of one grid panel (pixels).
    #[arg(long, default_value_t = 600)]
    pub panel_width: u32,

    /// Height of one grid panel (pixels).
    #[arg(long, default_value_t = 600)]
    pub panel_height: u32,
}

/// Options for `jec diff`.
#[derive(Debug, Parser, Clone)]
pub struct DiffArgs {
    /// JSON export of the first analysis file.
    #[arg(long, value_name = "JSON")]
    pub a: PathBuf,

    /// JSON export of the second analysis file.
    #[arg(long, value_name = "JSON")]
    pub b: PathBuf,

    /// Report document (.html or .svg).
    #[arg(long, default_value = "comparison.html")]
    pub output: PathBuf,

    /// Page width (pixels).
    #[arg(long, default_value_t = 800)]
    pub width: u32,

    /// Page height (pixels).
    #[arg(long, default_value_t = 800)]
    pub height: u32,
}

/// Options for `jec scan`.
#[derive(Debug, Parser, Clone)]
pub struct ScanArgs {
    /// JSON export of the analysis file.
    #[arg(long, value_name = "JSON")]
    pub store: PathBuf,

    /// Also print each histogram's bins.
    #[arg(long)]
    pub deep: bool,
}

/// Options for `jec jobs`.
#[derive(Debug, Parser, Clone)]
pub struct JobsArgs {
    /// JSON configuration (defaults are used for missing fields).
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Channels to plan (replaces the configured list).
    #[arg(long = "channel")]
    pub channels: Vec<String>,

    /// Years to plan (replaces the configured list).
    #[arg(long = "year")]
    pub years: Vec<String>,

    /// Directory holding `SamplesNano_{channel}.json`.
    #[arg(long)]
    pub samples_dir: Option<PathBuf>,

    /// Directory receiving the plan files.
    #[arg(long)]
    pub json_dir: Option<PathBuf>,

    /// Print the plan without writing files.
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plot_defaults() {
        let cli = Cli::parse_from(["jec", "plot", "in.txt", "out.html"]);
        let Command::Plot(args) = cli.command else {
            panic!("expected plot");
        };
        assert_eq!(args.sampling.profile, PlotProfile::Validity);
        assert_eq!(args.sampling.layout, LayoutMode::Auto);
        assert_eq!(args.sampling.low_bound, 0.0002);
        assert_eq!(args.sampling.reference_pt, DEFAULT_REFERENCE_PT);
        assert!(args.sampling.points.is_none());
    }

    #[test]
    fn global_log_flag_and_repeated_options() {
        let cli = Cli::parse_from([
            "jec", "jobs", "--channel", "ZeeJet", "--channel", "GamJet", "--year", "2024", "--log", "debug",
        ]);
        assert_eq!(cli.log.as_deref(), Some("debug"));
        let Command::Jobs(args) = cli.command else {
            panic!("expected jobs");
        };
        assert_eq!(args.channels, vec!["ZeeJet", "GamJet"]);
        assert_eq!(args.years, vec!["2024"]);
    }

    #[test]
    fn diff_and_scan_options() {
        let cli = Cli::parse_from(["jec", "diff", "--a", "one.json", "--b", "two.json"]);
        let Command::Diff(args) = cli.command else {
            panic!("expected diff");
        };
        assert_eq!(args.output, PathBuf::from("comparison.html"));
        assert_eq!(args.b, PathBuf::from("two.json"));

        let cli = Cli::parse_from(["jec", "scan", "--store", "one.json", "--deep"]);
        let Command::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert!(args.deep);
    }

    #[test]
    fn layout_and_profile_values() {
        let cli = Cli::parse_from([
            "jec", "inspect", "in.txt", "--layout", "extended", "--profile", "reference", "--record", "3",
        ]);
        let Command::Inspect(args) = cli.command else {
            panic!("expected inspect");
        };
        assert_eq!(args.sampling.layout, LayoutMode::Extended);
        assert_eq!(args.sampling.profile, PlotProfile::Reference);
        assert_eq!(args.record, 3);
    }
}
