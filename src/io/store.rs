//! Analysis-object stores.
//!
//! Histograms are addressed by slash-separated paths
//! (`hCorrV1_DATA_L1FastJet_AK4PFPuppi`, `HistGivenPt/Pt30to50/pCorrOld_...`).
//! Reading the binary analysis file itself is left to external tooling; the
//! JSON store reads an export of it:
//!
//! ```json
//! { "objects": { "HistGivenPt/Pt30to50/pCorrOld_X": { "edges": [...], "contents": [...] } } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::domain::Histogram;
use crate::error::AppError;
use crate::io::json::read_json;

/// Read access to named histograms and folders.
pub trait ObjectStore {
    fn get(&self, path: &str) -> Option<&Histogram>;

    /// Immediate children of `folder`, or `None` when the folder does not exist.
    fn list(&self, folder: &str) -> Option<Vec<String>>;

    fn is_folder(&self, path: &str) -> bool {
        self.list(path).is_some()
    }
}

/// One step of a depth-first store walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreNode {
    Folder(String),
    Object(String),
}

impl StoreNode {
    pub fn path(&self) -> &str {
        match self {
            StoreNode::Folder(path) | StoreNode::Object(path) => path,
        }
    }
}

/// Join a folder path and a child name (`""` is the root).
pub fn join_path(folder: &str, child: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        child.to_string()
    } else {
        format!("{folder}/{child}")
    }
}

/// Walk `folder` depth-first; each folder is listed before its contents.
pub fn walk<S: ObjectStore + ?Sized>(store: &S, folder: &str) -> Vec<StoreNode> {
    let mut out = Vec::new();
    walk_into(store, folder, &mut out);
    out
}

fn walk_into<S: ObjectStore + ?Sized>(store: &S, folder: &str, out: &mut Vec<StoreNode>) {
    let Some(children) = store.list(folder) else {
        return;
    };
    for child in children {
        let path = join_path(folder, &child);
        if store.get(&path).is_some() {
            out.push(StoreNode::Object(path));
        } else if store.is_folder(&path) {
            out.push(StoreNode::Folder(path.clone()));
            walk_into(store, &path, out);
        }
    }
}

/// Object store backed by a JSON export.
#[derive(Debug, Clone, Default)]
pub struct JsonObjectStore {
    objects: BTreeMap<String, Histogram>,
}

#[derive(Debug, Deserialize)]
struct StoreFile {
    objects: BTreeMap<String, Histogram>,
}

impl JsonObjectStore {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let file: StoreFile = read_json(path, "object store")?;
        Self::from_objects(file.objects)
    }

    /// Build a store from in-memory objects, rejecting malformed histograms.
    pub fn from_objects(objects: BTreeMap<String, Histogram>) -> Result<Self, AppError> {
        let mut out = BTreeMap::new();
        for (path, mut hist) in objects {
            let path = path.trim_matches('/').to_string();
            if !hist.is_well_formed() {
                return Err(AppError::new(
                    2,
                    format!(
                        "Histogram '{path}' is malformed: {} edges for {} bins.",
                        hist.edges.len(),
                        hist.contents.len()
                    ),
                ));
            }
            if hist.name.is_empty() {
                hist.name = path.rsplit('/').next().unwrap_or(&path).to_string();
            }
            out.insert(path, hist);
        }
        Ok(Self { objects: out })
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectStore for JsonObjectStore {
    fn get(&self, path: &str) -> Option<&Histogram> {
        self.objects.get(path.trim_matches('/'))
    }

    fn list(&self, folder: &str) -> Option<Vec<String>> {
        let folder = folder.trim_matches('/');
        let prefix = if folder.is_empty() { String::new() } else { format!("{folder}/") };
        let mut children: Vec<String> = Vec::new();
        for key in self.objects.keys().filter(|k| k.starts_with(&prefix)) {
            let rest = &key[prefix.len()..];
            let child = rest.split('/').next().unwrap_or(rest);
            if children.last().map(String::as_str) != Some(child) {
                children.push(child.to_string());
            }
        }
        if children.is_empty() { None } else { Some(children) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist(contents: &[f64]) -> Histogram {
        Histogram {
            edges: (0..=contents.len()).map(|i| i as f64).collect(),
            contents: contents.to_vec(),
            ..Histogram::default()
        }
    }

    fn store() -> JsonObjectStore {
        let mut objects = BTreeMap::new();
        objects.insert("hCorrV1_X".to_string(), hist(&[1.0]));
        objects.insert("HistGivenPt/Pt10to30/pCorrOld_X".to_string(), hist(&[1.0, 2.0]));
        objects.insert("HistGivenPt/Pt10to30/pCorrNew_X".to_string(), hist(&[1.0, 2.0]));
        objects.insert("HistGivenPt/Pt30to50/pCorrOld_X".to_string(), hist(&[1.0, 2.0]));
        objects.insert("HistGivenPt/summary".to_string(), hist(&[3.0]));
        JsonObjectStore::from_objects(objects).unwrap()
    }

    #[test]
    fn lists_immediate_children_once() {
        let store = store();
        assert_eq!(
            store.list("HistGivenPt").unwrap(),
            vec!["Pt10to30", "Pt30to50", "summary"]
        );
        assert!(store.is_folder("HistGivenPt/Pt10to30"));
        assert!(!store.is_folder("HistGivenPt/summary"));
        assert!(store.list("HistGivenEta").is_none());
    }

    #[test]
    fn walk_visits_folders_before_their_objects() {
        let store = store();
        let nodes = walk(&store, "");
        let paths: Vec<&str> = nodes.iter().map(StoreNode::path).collect();
        assert_eq!(
            paths,
            vec![
                "HistGivenPt",
                "HistGivenPt/Pt10to30",
                "HistGivenPt/Pt10to30/pCorrNew_X",
                "HistGivenPt/Pt10to30/pCorrOld_X",
                "HistGivenPt/Pt30to50",
                "HistGivenPt/Pt30to50/pCorrOld_X",
                "HistGivenPt/summary",
                "hCorrV1_X",
            ]
        );
        assert!(matches!(nodes[0], StoreNode::Folder(_)));
        assert!(matches!(nodes[2], StoreNode::Object(_)));
        assert_eq!(store.list("").unwrap(), vec!["HistGivenPt", "hCorrV1_X"]);
        assert!(walk(&JsonObjectStore::default(), "").is_empty());
    }

    #[test]
    fn names_default_to_last_path_component() {
        let store = store();
        let h = store.get("HistGivenPt/Pt10to30/pCorrOld_X").unwrap();
        assert_eq!(h.name, "pCorrOld_X");
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn malformed_histograms_are_rejected() {
        let mut bad = hist(&[1.0, 2.0]);
        bad.edges.pop();
        let mut objects = BTreeMap::new();
        objects.insert("bad".to_string(), bad);
        let err = JsonObjectStore::from_objects(objects).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
