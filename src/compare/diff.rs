//! Object-by-object comparison of two analysis files.
//!
//! Every 1D histogram of the first store that also exists in the second one
//! becomes a pair. Folders are followed only when the second store has them
//! too; 2D objects are skipped.

use tracing::{debug, warn};

use super::{CompareError, RatioPoint, ratio_graph};
use crate::domain::Histogram;
use crate::io::{ObjectStore, join_path};

/// The same object path in both stores.
#[derive(Debug, Clone)]
pub struct DiffPair<'a> {
    pub path: String,
    pub a: &'a Histogram,
    pub b: &'a Histogram,
}

impl DiffPair<'_> {
    /// First/second ratio pad.
    pub fn ratio(&self) -> Vec<RatioPoint> {
        ratio_graph(self.a, self.b)
    }
}

/// Pairs in walk order of `a`, plus the paths missing from `b`.
pub fn collect_diff_pairs<'a, A, B>(a: &'a A, b: &'a B) -> (Vec<DiffPair<'a>>, Vec<CompareError>)
where
    A: ObjectStore + ?Sized,
    B: ObjectStore + ?Sized,
{
    let mut pairs = Vec::new();
    let mut missing = Vec::new();
    collect_folder(a, b, "", &mut pairs, &mut missing);
    (pairs, missing)
}

fn collect_folder<'a, A, B>(
    a: &'a A,
    b: &'a B,
    folder: &str,
    pairs: &mut Vec<DiffPair<'a>>,
    missing: &mut Vec<CompareError>,
) where
    A: ObjectStore + ?Sized,
    B: ObjectStore + ?Sized,
{
    let Some(children) = a.list(folder) else {
        return;
    };
    for child in children {
        let path = join_path(folder, &child);
        match a.get(&path) {
            Some(first) => {
                let Some(second) = b.get(&path) else {
                    warn!(path = %path, "not found in second file");
                    missing.push(CompareError::NotInSecond(path));
                    continue;
                };
                if first.dimension() != 1 || second.dimension() != 1 {
                    debug!(path = %path, "skipping 2D object");
                    continue;
                }
                pairs.push(DiffPair {
                    path,
                    a: first,
                    b: second,
                });
            }
            None => {
                if !b.is_folder(&path) {
                    warn!(path = %path, "not found in second file");
                    missing.push(CompareError::NotInSecond(path));
                    continue;
                }
                collect_folder(a, b, &path, pairs, missing);
            }
        }
    }
}
