//! Correction-tag JSON files (`{ "corrections": [ { "name": ... }, ... ] }`).

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::AppError;
use crate::io::json::read_json;

#[derive(Debug, Deserialize)]
struct TagFile {
    #[serde(default)]
    corrections: Vec<serde_json::Value>,
}

/// Load the set of correction names from a tag file.
///
/// A missing `corrections` array yields an empty set; entries without a
/// non-empty string `name` are ignored.
pub fn load_tags(path: &Path) -> Result<BTreeSet<String>, AppError> {
    let file: TagFile = read_json(path, "tag file")?;
    Ok(tag_names(&file.corrections))
}

fn tag_names(corrections: &[serde_json::Value]) -> BTreeSet<String> {
    corrections
        .iter()
        .filter_map(|c| c.get("name").and_then(|n| n.as_str()))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn collects_named_corrections_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v1.json");
        fs::write(
            &path,
            r#"{
                "schema_version": 2,
                "corrections": [
                    {"name": "Foo_V1_DATA_L1FastJet_AK4PFPuppi", "version": 1},
                    {"name": "Foo_V1_MC_L2Relative_AK4PFPuppi"},
                    {"version": 3},
                    {"name": 7},
                    {"name": ""}
                ]
            }"#,
        )
        .unwrap();

        let tags = load_tags(&path).unwrap();
        assert_eq!(tags.len(), 2);
        assert!(tags.contains("Foo_V1_DATA_L1FastJet_AK4PFPuppi"));
    }

    #[test]
    fn missing_corrections_array_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        fs::write(&path, r#"{"schema_version": 2}"#).unwrap();
        assert!(load_tags(&path).unwrap().is_empty());
    }
}
