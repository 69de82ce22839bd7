//! Histogram comparison of two correction versions.
//!
//! This module does the numeric work and the object lookups; drawing lives in
//! `plot::pages`.
//!
//! - `compare`: per base key, `hCorrV1_{key}` vs `hCorrV2_{key}` plus the
//!   `pDiff_{key}` percent-difference profile, computed from V1/V2 when the
//!   store has none.
//! - `profiles`: per folder (`HistGivenPt`, `HistGivenEta`) and base key, a
//!   grid of `pCorrOld_{key}` vs `pCorrNew_{key}` panels, one per sub-folder.
//! - `diff` (submodule): every 1D histogram present in two stores.

use std::borrow::Cow;

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{Histogram, TagEntry, TagMetadata};
use crate::io::ObjectStore;

pub mod diff;

pub use diff::{DiffPair, collect_diff_pairs};

/// Folders scanned by the profile report, in page order.
pub const PROFILE_FOLDERS: [&str; 2] = ["HistGivenPt", "HistGivenEta"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompareError {
    #[error("histogram '{0}' not found in the object store")]
    MissingHistogram(String),
    #[error("'{0}' directory not found in the object store")]
    MissingFolder(String),
    #[error("'{a}' and '{b}' have different binning")]
    BinningMismatch { a: String, b: String },
    #[error("object '{0}' not found in second file")]
    NotInSecond(String),
}

/// One point of a ratio graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioPoint {
    pub x: f64,
    pub half_width: f64,
    pub y: f64,
    pub error: f64,
}

/// Per-bin `num / den` with uncorrelated error propagation.
///
/// Bins where the denominator is zero get ratio and error zero.
pub fn ratio_graph(num: &Histogram, den: &Histogram) -> Vec<RatioPoint> {
    let n = num.n_bins().min(den.n_bins());
    (0..n)
        .map(|bin| {
            let y1 = num.contents[bin];
            let e1 = num.error(bin);
            let y2 = den.contents[bin];
            let e2 = den.error(bin);
            let (y, error) = if y2 == 0.0 {
                (0.0, 0.0)
            } else {
                (y1 / y2, ((e1 / y2).powi(2) + (y1 * e2 / (y2 * y2)).powi(2)).sqrt())
            };
            RatioPoint {
                x: num.center(bin),
                half_width: num.width(bin) / 2.0,
                y,
                error,
            }
        })
        .collect()
}

/// Per-bin `100·(v1 − v2)/v1`, zero where `v1 == 0`.
pub fn percent_difference(v1: &Histogram, v2: &Histogram) -> Result<Histogram, CompareError> {
    if v1.edges != v2.edges {
        return Err(CompareError::BinningMismatch {
            a: v1.name.clone(),
            b: v2.name.clone(),
        });
    }
    let contents = v1
        .contents
        .iter()
        .zip(&v2.contents)
        .map(|(&a, &b)| if a == 0.0 { 0.0 } else { 100.0 * (a - b) / a })
        .collect();
    Ok(Histogram {
        name: format!("pDiff_{}", v1.name),
        title: "100 x (V1 - V2)/V1".to_string(),
        edges: v1.edges.clone(),
        contents,
        entries: v1.entries,
        ..Histogram::default()
    })
}

/// Grid layout `(cols, rows)` for `n` panels.
pub fn grid_dimensions(n: usize) -> (usize, usize) {
    if n == 0 {
        return (1, 1);
    }
    let mut cols = ((n as f64).sqrt().floor() as usize).max(1);
    let mut rows = n.div_ceil(cols);
    while cols * rows < n {
        cols += 1;
        rows = n.div_ceil(cols);
    }
    (cols, rows)
}

/// Entries and mean of one histogram, as shown in panel captions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistStats {
    pub entries: f64,
    pub mean: f64,
}

impl HistStats {
    pub fn of(hist: &Histogram) -> Self {
        Self {
            entries: hist.entries,
            mean: hist.mean(),
        }
    }
}

/// Histograms of one base key for the `compare` report.
#[derive(Debug, Clone)]
pub struct Comparison<'a> {
    pub key: String,
    pub v1: &'a Histogram,
    pub v2: &'a Histogram,
    /// Exported `pDiff_{key}`, or the difference computed from V1/V2.
    pub diff: Option<Cow<'a, Histogram>>,
}

impl Comparison<'_> {
    /// V2/V1 ratio pad.
    pub fn ratio(&self) -> Vec<RatioPoint> {
        ratio_graph(self.v2, self.v1)
    }
}

/// Look up the comparison histograms for every metadata key.
///
/// Keys missing either version are skipped with a diagnostic.
pub fn collect_comparisons<'a, S: ObjectStore>(
    store: &'a S,
    metadata: &TagMetadata,
) -> (Vec<Comparison<'a>>, Vec<CompareError>) {
    let mut found = Vec::new();
    let mut skipped = Vec::new();

    for key in metadata.keys() {
        debug!(key = %key, "processing base key");
        let v1_name = format!("hCorrV1_{key}");
        let v2_name = format!("hCorrV2_{key}");
        let diff_name = format!("pDiff_{key}");

        let v1 = store.get(&v1_name);
        let v2 = store.get(&v2_name);

        match (v1, v2) {
            (Some(v1), Some(v2)) => {
                let diff = match store.get(&diff_name) {
                    Some(diff) => Some(Cow::Borrowed(diff)),
                    None => {
                        debug!(name = %diff_name, "no percent-difference profile, computing from V1/V2");
                        match percent_difference(v1, v2) {
                            Ok(diff) => Some(Cow::Owned(diff)),
                            Err(err) => {
                                warn!(key = %key, error = %err, "no percent-difference page");
                                None
                            }
                        }
                    }
                };
                found.push(Comparison {
                    key: key.clone(),
                    v1,
                    v2,
                    diff,
                });
            }
            (v1, _) => {
                let missing = if v1.is_none() { v1_name } else { v2_name };
                warn!(key = %key, histogram = %missing, "skipping base key due to missing histograms");
                skipped.push(CompareError::MissingHistogram(missing));
            }
        }
    }
    (found, skipped)
}

/// One panel of a profile grid.
#[derive(Debug, Clone)]
pub struct ProfilePanel<'a> {
    pub bin: String,
    pub old: &'a Histogram,
    pub new: &'a Histogram,
}

impl ProfilePanel<'_> {
    /// Old/New ratio pad.
    pub fn ratio(&self) -> Vec<RatioPoint> {
        ratio_graph(self.old, self.new)
    }
}

/// A page of profile panels for one folder and base key.
#[derive(Debug, Clone)]
pub struct ProfileGrid<'a> {
    pub folder: String,
    pub key: String,
    pub label_v1: String,
    pub label_v2: String,
    /// Grid cells in folder order; `None` marks a skipped sub-folder.
    pub panels: Vec<Option<ProfilePanel<'a>>>,
}

impl ProfileGrid<'_> {
    pub fn dimensions(&self) -> (usize, usize) {
        grid_dimensions(self.panels.len())
    }

    /// `HistGivenEta` panels are drawn against pT on a log axis.
    pub fn log_x(&self) -> bool {
        self.folder.contains("Eta")
    }
}

/// Collect the panels of `folder` for `key`.
///
/// A missing folder is fatal; a sub-folder without both profiles becomes an
/// empty cell.
pub fn collect_profile_grid<'a, S: ObjectStore>(
    store: &'a S,
    folder: &str,
    key: &str,
    entries: &[TagEntry],
) -> Result<ProfileGrid<'a>, CompareError> {
    let children = store
        .list(folder)
        .ok_or_else(|| CompareError::MissingFolder(folder.to_string()))?;
    debug!(folder, count = children.len(), "scanning sub-folders");

    let label = |i: usize| {
        entries
            .get(i)
            .and_then(|TagEntry(_, tag)| tag.clone())
            .unwrap_or_else(|| "None".to_string())
    };

    let mut panels = Vec::with_capacity(children.len());
    for bin in children {
        let dir = format!("{folder}/{bin}");
        if !store.is_folder(&dir) {
            warn!(entry = %bin, "not a directory, skipping");
            panels.push(None);
            continue;
        }
        let old = store.get(&format!("{dir}/pCorrOld_{key}"));
        let new = store.get(&format!("{dir}/pCorrNew_{key}"));
        match (old, new) {
            (Some(old), Some(new)) => panels.push(Some(ProfilePanel { bin, old, new })),
            (old, _) => {
                let which = if old.is_none() { "pCorrOld" } else { "pCorrNew" };
                warn!(dir = %dir, "'{which}' not found, skipping");
                panels.push(None);
            }
        }
    }

    Ok(ProfileGrid {
        folder: folder.to_string(),
        key: key.to_string(),
        label_v1: label(0),
        label_v2: label(1),
        panels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::JsonObjectStore;
    use std::collections::BTreeMap;

    fn hist(name: &str, contents: &[f64], errors: &[f64]) -> Histogram {
        Histogram {
            name: name.to_string(),
            edges: (0..=contents.len()).map(|i| 10.0 * i as f64).collect(),
            contents: contents.to_vec(),
            errors: errors.to_vec(),
            entries: 100.0,
            ..Histogram::default()
        }
    }

    #[test]
    fn grid_dimensions_cover_all_panels() {
        assert_eq!(grid_dimensions(0), (1, 1));
        assert_eq!(grid_dimensions(1), (1, 1));
        assert_eq!(grid_dimensions(3), (1, 3));
        assert_eq!(grid_dimensions(4), (2, 2));
        assert_eq!(grid_dimensions(7), (2, 4));
        assert_eq!(grid_dimensions(10), (3, 4));
        for n in 1..200 {
            let (c, r) = grid_dimensions(n);
            assert!(c * r >= n, "n={n}");
        }
    }

    #[test]
    fn ratio_propagates_errors_and_guards_zero() {
        let old = hist("old", &[2.0, 1.0, 3.0], &[0.2, 0.1, 0.0]);
        let new = hist("new", &[1.0, 0.0, 3.0], &[0.1, 0.1, 0.3]);
        let r = ratio_graph(&old, &new);

        assert_eq!(r.len(), 3);
        assert_eq!(r[0].x, 5.0);
        assert_eq!(r[0].half_width, 5.0);
        assert!((r[0].y - 2.0).abs() < 1e-12);
        let expected = ((0.2f64 / 1.0).powi(2) + (2.0f64 * 0.1 / 1.0).powi(2)).sqrt();
        assert!((r[0].error - expected).abs() < 1e-12);
        assert_eq!((r[1].y, r[1].error), (0.0, 0.0));
        assert!((r[2].y - 1.0).abs() < 1e-12);
        assert!((r[2].error - 0.1).abs() < 1e-12);
    }

    #[test]
    fn percent_difference_is_zero_for_empty_reference_bins() {
        let v1 = hist("v1", &[2.0, 0.0, 4.0], &[]);
        let v2 = hist("v2", &[1.0, 5.0, 4.0], &[]);
        let d = percent_difference(&v1, &v2).unwrap();
        assert_eq!(d.contents, vec![50.0, 0.0, 0.0]);

        let shorter = hist("v3", &[1.0], &[]);
        assert!(matches!(
            percent_difference(&v1, &shorter),
            Err(CompareError::BinningMismatch { .. })
        ));
    }

    fn metadata(keys: &[&str]) -> TagMetadata {
        keys.iter()
            .map(|k| {
                (
                    k.to_string(),
                    vec![
                        TagEntry("v1.json".into(), Some(format!("A_V1_{k}"))),
                        TagEntry("v2.json".into(), Some(format!("A_V2_{k}"))),
                    ],
                )
            })
            .collect()
    }

    #[test]
    fn comparisons_skip_keys_missing_a_version() {
        let mut objects = BTreeMap::new();
        objects.insert("hCorrV1_MC_L2".to_string(), hist("", &[1.0], &[]));
        objects.insert("hCorrV2_MC_L2".to_string(), hist("", &[1.1], &[]));
        objects.insert("pDiff_MC_L2".to_string(), hist("", &[-10.0], &[]));
        objects.insert("hCorrV1_MC_L3".to_string(), hist("", &[1.0], &[]));
        let store = JsonObjectStore::from_objects(objects).unwrap();

        let (found, skipped) = collect_comparisons(&store, &metadata(&["MC_L2", "MC_L3"]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, "MC_L2");
        assert!(found[0].diff.is_some());
        assert!((found[0].ratio()[0].y - 1.1).abs() < 1e-12);
        assert_eq!(skipped, vec![CompareError::MissingHistogram("hCorrV2_MC_L3".into())]);
    }

    #[test]
    fn missing_difference_profile_is_computed_from_versions() {
        let mut objects = BTreeMap::new();
        objects.insert("hCorrV1_MC_L2".to_string(), hist("", &[2.0, 0.0, 4.0], &[]));
        objects.insert("hCorrV2_MC_L2".to_string(), hist("", &[1.0, 3.0, 5.0], &[]));
        objects.insert("hCorrV1_MC_L3".to_string(), hist("", &[1.0, 1.0], &[]));
        objects.insert("hCorrV2_MC_L3".to_string(), hist("", &[1.0], &[]));
        let store = JsonObjectStore::from_objects(objects).unwrap();

        let (found, skipped) = collect_comparisons(&store, &metadata(&["MC_L2", "MC_L3"]));
        assert!(skipped.is_empty());
        assert_eq!(found.len(), 2);

        let diff = found[0].diff.as_ref().unwrap();
        assert!(matches!(diff, Cow::Owned(_)));
        assert_eq!(diff.contents, vec![50.0, 0.0, -25.0]);
        // Different binning: the comparison stays, without a difference page.
        assert!(found[1].diff.is_none());
    }

    #[test]
    fn profile_grid_keeps_cells_for_skipped_panels() {
        let mut objects = BTreeMap::new();
        for bin in ["Pt10to30", "Pt30to50", "Pt50to100"] {
            objects.insert(format!("HistGivenPt/{bin}/pCorrOld_MC_L2"), hist("", &[1.0, 1.0], &[]));
            if bin != "Pt30to50" {
                objects.insert(format!("HistGivenPt/{bin}/pCorrNew_MC_L2"), hist("", &[1.0, 2.0], &[]));
            }
        }
        let store = JsonObjectStore::from_objects(objects).unwrap();
        let meta = metadata(&["MC_L2"]);

        let grid = collect_profile_grid(&store, "HistGivenPt", "MC_L2", &meta["MC_L2"]).unwrap();
        assert_eq!(grid.panels.len(), 3);
        assert!(grid.panels[1].is_none());
        assert_eq!(grid.panels[0].as_ref().unwrap().bin, "Pt10to30");
        assert_eq!(grid.label_v1, "A_V1_MC_L2");
        assert_eq!(grid.dimensions(), (1, 3));
        assert!(!grid.log_x());

        let err = collect_profile_grid(&store, "HistGivenEta", "MC_L2", &meta["MC_L2"]).unwrap_err();
        assert_eq!(err, CompareError::MissingFolder("HistGivenEta".into()));
    }
}
