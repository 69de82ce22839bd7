//! Shared domain types.
//!
//! Correction records and evaluated series are created and consumed within a
//! single pass over one input file. Tag metadata and histograms are
//! serializable so they can be read from and written to JSON.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How data rows of a correction text file are laid out.
///
/// `Auto` applies the token-count rule: more than 16 tokens means the
/// extended layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    Auto,
    Minimal,
    Extended,
}

/// Concrete row layout after resolving `LayoutMode::Auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowLayout {
    /// `eta_lo eta_hi n pt_min pt_max p0..p10`
    Minimal,
    /// Two extra leading fields before the validity range:
    /// `eta_lo eta_hi a b n pt_min pt_max p0..p10`
    Extended,
}

impl RowLayout {
    /// Rows with more tokens than this use the extended layout.
    pub const EXTENDED_THRESHOLD: usize = 16;

    /// Parameters per row in both layouts.
    pub const PARAMETER_COUNT: usize = 11;

    pub fn detect(token_count: usize) -> Self {
        if token_count > Self::EXTENDED_THRESHOLD {
            RowLayout::Extended
        } else {
            RowLayout::Minimal
        }
    }

    /// Field offset added to every column after the eta bounds.
    pub fn shift(self) -> usize {
        match self {
            RowLayout::Minimal => 0,
            RowLayout::Extended => 2,
        }
    }

    /// Index of the validity minimum (the maximum follows it).
    pub fn validity_index(self) -> usize {
        3 + self.shift()
    }

    /// Index of the first parameter.
    pub fn parameter_index(self) -> usize {
        5 + self.shift()
    }

    /// Tokens needed for a complete row.
    pub fn min_tokens(self) -> usize {
        self.parameter_index() + Self::PARAMETER_COUNT
    }
}

impl LayoutMode {
    pub fn resolve(self, token_count: usize) -> RowLayout {
        match self {
            LayoutMode::Auto => RowLayout::detect(token_count),
            LayoutMode::Minimal => RowLayout::Minimal,
            LayoutMode::Extended => RowLayout::Extended,
        }
    }
}

/// Pseudorapidity bin boundaries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtaBin {
    pub low: f64,
    pub high: f64,
}

impl EtaBin {
    pub fn label(&self) -> String {
        format!("Jet Eta [{}, {}]", self.low, self.high)
    }
}

/// Range of the independent variable over which a correction is meaningful.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidityWindow {
    pub min: f64,
    pub max: f64,
}

impl ValidityWindow {
    pub fn contains(&self, x: f64) -> bool {
        x >= self.min && x <= self.max
    }
}

/// One data row of a correction text file.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionRecord {
    /// 1-based line number in the source file.
    pub line: usize,
    pub layout: RowLayout,
    pub eta: EtaBin,
    pub validity: ValidityWindow,
    pub parameters: Vec<f64>,
}

/// Physical range a correction value is expected to stay within.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionBounds {
    pub low: f64,
    pub high: f64,
}

impl Default for CorrectionBounds {
    fn default() -> Self {
        Self {
            low: 0.0002,
            high: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundKind {
    Low,
    High,
}

/// A sampled value inside the validity window that violates a bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutOfBoundsWarning {
    pub x: f64,
    pub value: f64,
    pub bound: BoundKind,
}

/// `(x, correction)` samples plus the bound violations found among them.
#[derive(Debug, Clone, Default)]
pub struct EvaluatedSeries {
    pub points: Vec<(f64, f64)>,
    pub warnings: Vec<OutOfBoundsWarning>,
}

/// Dense linear sampling of the x axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingGrid {
    pub start: f64,
    pub stop: f64,
    pub count: usize,
}

impl SamplingGrid {
    /// Evenly spaced points including both endpoints.
    pub fn points(&self) -> Vec<f64> {
        match self.count {
            0 => Vec::new(),
            1 => vec![self.start],
            n => {
                let step = (self.stop - self.start) / (n as f64 - 1.0);
                let mut out: Vec<f64> = (0..n).map(|i| self.start + step * i as f64).collect();
                out[n - 1] = self.stop;
                out
            }
        }
    }
}

/// Plot flavour for correction reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PlotProfile {
    /// Log-scaled pT axis over 5..2000 GeV with validity-window markers.
    Validity,
    /// Linear pT axis over 10..200 GeV with a single reference marker.
    Reference,
}

impl PlotProfile {
    pub fn default_grid(self) -> SamplingGrid {
        match self {
            PlotProfile::Validity => SamplingGrid {
                start: 5.0,
                stop: 2000.0,
                count: 50_000,
            },
            PlotProfile::Reference => SamplingGrid {
                start: 10.0,
                stop: 200.0,
                count: 500,
            },
        }
    }

    pub fn log_x(self) -> bool {
        matches!(self, PlotProfile::Validity)
    }
}

/// Raw jet pT used as the reference marker in the `Reference` profile.
pub const DEFAULT_REFERENCE_PT: f64 = 56.7143;

/// Configuration of a correction-report run, derived from CLI flags.
#[derive(Debug, Clone)]
pub struct PlotConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub profile: PlotProfile,
    pub layout: LayoutMode,
    pub grid: SamplingGrid,
    pub bounds: CorrectionBounds,
    pub reference_x: f64,
    pub page_width: u32,
    pub page_height: u32,
}

/// A histogram or profile exported from an analysis file.
///
/// 2D objects carry `y_edges`; their contents are stored row by row
/// (`contents[ybin * nx + xbin]`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    /// Class of the exported object, e.g. `TH1D`, `TProfile`, `TH2F`.
    #[serde(default)]
    pub kind: String,
    /// Bin edges (length = number of bins + 1).
    pub edges: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub y_edges: Vec<f64>,
    /// Bin contents (profile means for profiles).
    pub contents: Vec<f64>,
    /// Per-bin errors; zero when absent.
    #[serde(default)]
    pub errors: Vec<f64>,
    /// Per-bin entries of a profile.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bin_entries: Vec<f64>,
    #[serde(default)]
    pub entries: f64,
    /// Mean along x as computed by the exporter.
    #[serde(default, rename = "mean", skip_serializing_if = "Option::is_none")]
    pub stored_mean: Option<f64>,
    /// RMS along x as computed by the exporter.
    #[serde(default, rename = "rms", skip_serializing_if = "Option::is_none")]
    pub stored_rms: Option<f64>,
}

impl Histogram {
    /// Number of x bins.
    pub fn n_bins(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }

    pub fn dimension(&self) -> usize {
        if self.y_edges.is_empty() && !self.kind.starts_with("TH2") && self.kind != "TProfile2D" {
            1
        } else {
            2
        }
    }

    pub fn center(&self, bin: usize) -> f64 {
        0.5 * (self.edges[bin] + self.edges[bin + 1])
    }

    pub fn y_center(&self, bin: usize) -> f64 {
        0.5 * (self.y_edges[bin] + self.y_edges[bin + 1])
    }

    pub fn width(&self, bin: usize) -> f64 {
        self.edges[bin + 1] - self.edges[bin]
    }

    pub fn error(&self, bin: usize) -> f64 {
        self.errors.get(bin).copied().unwrap_or(0.0)
    }

    /// Content of a 2D cell; zero outside the grid.
    pub fn cell(&self, xbin: usize, ybin: usize) -> f64 {
        self.contents
            .get(ybin * self.n_bins() + xbin)
            .copied()
            .unwrap_or(0.0)
    }

    /// Mean along x: the exported value when present, otherwise weighted
    /// by per-bin entries (profiles) or by contents projected on x.
    pub fn mean(&self) -> f64 {
        if let Some(mean) = self.stored_mean {
            return mean;
        }
        let (sum_w, sum_wx, _) = self.moments();
        if sum_w == 0.0 { 0.0 } else { sum_wx / sum_w }
    }

    /// RMS along x, with the same weights as `mean`.
    pub fn rms(&self) -> f64 {
        if let Some(rms) = self.stored_rms {
            return rms;
        }
        let (sum_w, sum_wx, sum_wxx) = self.moments();
        if sum_w == 0.0 {
            return 0.0;
        }
        let mean = sum_wx / sum_w;
        (sum_wxx / sum_w - mean * mean).max(0.0).sqrt()
    }

    fn x_weights(&self) -> Vec<f64> {
        let nx = self.n_bins();
        if nx == 0 {
            return Vec::new();
        }
        if self.bin_entries.len() == nx {
            return self.bin_entries.clone();
        }
        let mut weights = vec![0.0; nx];
        for (i, c) in self.contents.iter().enumerate() {
            weights[i % nx] += c;
        }
        weights
    }

    fn moments(&self) -> (f64, f64, f64) {
        let mut sums = (0.0, 0.0, 0.0);
        for (bin, w) in self.x_weights().into_iter().enumerate() {
            let x = self.center(bin);
            sums.0 += w;
            sums.1 += w * x;
            sums.2 += w * x * x;
        }
        sums
    }

    /// Edges must bracket every content bin and increase strictly.
    pub fn is_well_formed(&self) -> bool {
        let increasing = |edges: &[f64]| edges.len() >= 2 && edges.windows(2).all(|w| w[1] > w[0]);
        if !increasing(&self.edges) {
            return false;
        }
        if self.y_edges.is_empty() {
            self.contents.len() == self.n_bins()
        } else {
            increasing(&self.y_edges) && self.contents.len() == self.n_bins() * (self.y_edges.len() - 1)
        }
    }
}

/// One side of a tag comparison: `[source_path, tag_name | null]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry(pub String, pub Option<String>);

/// Base key → `[V1 entry, V2 entry]`.
pub type TagMetadata = BTreeMap<String, Vec<TagEntry>>;

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> Histogram {
        Histogram {
            kind: "TProfile".into(),
            edges: vec![0.0, 2.0, 4.0],
            contents: vec![1.2, 0.8],
            ..Histogram::default()
        }
    }

    #[test]
    fn mean_prefers_exported_statistics() {
        let hist: Histogram =
            serde_json::from_str(r#"{"edges": [0, 2, 4], "contents": [1.2, 0.8], "mean": 3.1, "rms": 0.4}"#).unwrap();
        assert_eq!(hist.mean(), 3.1);
        assert_eq!(hist.rms(), 0.4);
    }

    #[test]
    fn profile_mean_uses_bin_entries() {
        let mut hist = profile();
        // Contents are per-bin averages: 1.2 and 0.8 weigh centers 1 and 3.
        assert!((hist.mean() - 1.8).abs() < 1e-12);

        hist.bin_entries = vec![1.0, 3.0];
        assert_eq!(hist.mean(), 2.5);
        assert!((hist.rms() - 0.75f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn two_dimensional_means_project_on_x() {
        let hist = Histogram {
            kind: "TH2D".into(),
            edges: vec![0.0, 2.0, 4.0],
            y_edges: vec![0.0, 1.0, 2.0],
            contents: vec![1.0, 0.0, 1.0, 2.0],
            ..Histogram::default()
        };
        assert_eq!(hist.dimension(), 2);
        assert!(hist.is_well_formed());
        assert_eq!(hist.mean(), 2.0);
    }
}
