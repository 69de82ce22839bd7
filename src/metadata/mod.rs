//! Tag metadata: pair up the corrections of two tag files by base key.
//!
//! `Winter24Prompt24_RunBCD_V1_DATA_L1FastJet_AK4PFPuppi` and
//! `Winter24Prompt24_RunBCD_V2_DATA_L1FastJet_AK4PFPuppi` share the base key
//! `DATA_L1FastJet_AK4PFPuppi`; the metadata maps that key to
//! `[[v1_source, v1_tag], [v2_source, v2_tag]]`, with `null` for a side that
//! has no such tag.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::{debug, info};

use crate::domain::{TagEntry, TagMetadata};
use crate::error::AppError;

const KEY_MARKERS: [&str; 2] = ["DATA_", "MC_"];

/// Substring starting at the leftmost `DATA_` or `MC_` marker that is
/// followed by at least one character; the full tag otherwise.
pub fn extract_base_key(tag: &str) -> &str {
    let mut best: Option<usize> = None;
    for marker in KEY_MARKERS {
        let mut from = 0;
        while let Some(pos) = tag[from..].find(marker).map(|p| p + from) {
            if pos + marker.len() < tag.len() {
                best = Some(best.map_or(pos, |b| b.min(pos)));
                break;
            }
            from = pos + 1;
        }
    }
    match best {
        Some(pos) => &tag[pos..],
        None => tag,
    }
}

/// Map base key → tag for one file. On a base-key collision the
/// lexicographically last tag wins.
pub fn base_key_map(tags: &BTreeSet<String>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for tag in tags {
        if let Some(prev) = out.insert(extract_base_key(tag).to_string(), tag.clone()) {
            debug!(tag = %tag, replaced = %prev, "base key collision");
        }
    }
    out
}

/// Build the metadata mapping for two tag sets.
///
/// `v1_source`/`v2_source` are recorded verbatim as the first element of each
/// entry. Every base key of either side is present.
pub fn create_metadata(
    v1_source: &str,
    v1_tags: &BTreeSet<String>,
    v2_source: &str,
    v2_tags: &BTreeSet<String>,
) -> TagMetadata {
    let v1 = base_key_map(v1_tags);
    let v2 = base_key_map(v2_tags);

    let keys: BTreeSet<&String> = v1.keys().chain(v2.keys()).collect();
    keys.into_iter()
        .map(|key| {
            let entries = vec![
                TagEntry(v1_source.to_string(), v1.get(key).cloned()),
                TagEntry(v2_source.to_string(), v2.get(key).cloned()),
            ];
            (key.clone(), entries)
        })
        .collect()
}

/// Source label recorded for a tag file: `prefix/path`, or the path itself.
pub fn source_label(prefix: Option<&str>, path: &Path) -> String {
    match prefix.map(|p| p.trim_end_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}/{}", path.display()),
        None => path.display().to_string(),
    }
}

/// Load both tag files and build their metadata.
pub fn build_from_files(v1: &Path, v2: &Path, prefix: Option<&str>) -> Result<TagMetadata, AppError> {
    let v1_tags = crate::io::load_tags(v1)?;
    let v2_tags = crate::io::load_tags(v2)?;
    info!(v1 = v1_tags.len(), v2 = v2_tags.len(), "loaded correction tags");

    Ok(create_metadata(
        &source_label(prefix, v1),
        &v1_tags,
        &source_label(prefix, v2),
        &v2_tags,
    ))
}

/// Keys present on only one side, as `(key, missing_side)` with side 1 or 2.
pub fn unmatched_keys(metadata: &TagMetadata) -> Vec<(&str, usize)> {
    metadata
        .iter()
        .filter_map(|(key, entries)| {
            entries
                .iter()
                .position(|TagEntry(_, tag)| tag.is_none())
                .map(|side| (key.as_str(), side + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn base_key_starts_at_leftmost_marker() {
        assert_eq!(
            extract_base_key("Winter24Prompt24_RunBCD_V1_DATA_L1FastJet_AK4PFPuppi"),
            "DATA_L1FastJet_AK4PFPuppi"
        );
        assert_eq!(extract_base_key("Summer24_V1_MC_L2Relative_AK4PFPuppi"), "MC_L2Relative_AK4PFPuppi");
        assert_eq!(extract_base_key("X_MC_DATA_L1"), "MC_DATA_L1");
        assert_eq!(extract_base_key("NoMarkerHere"), "NoMarkerHere");
        // A trailing marker without content does not count.
        assert_eq!(extract_base_key("Foo_DATA_"), "Foo_DATA_");
    }

    #[test]
    fn one_sided_key_gets_null_partner() {
        let meta = create_metadata(
            "pathA",
            &set(&["Foo_V1_DATA_L1FastJet_AK4PFPuppi"]),
            "pathB",
            &BTreeSet::new(),
        );
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "DATA_L1FastJet_AK4PFPuppi": [
                    ["pathA", "Foo_V1_DATA_L1FastJet_AK4PFPuppi"],
                    ["pathB", null]
                ]
            })
        );
        assert_eq!(unmatched_keys(&meta), vec![("DATA_L1FastJet_AK4PFPuppi", 2)]);
    }

    #[test]
    fn keys_cover_the_union_of_both_sides() {
        let v1 = set(&["A_V1_DATA_L1", "A_V1_MC_L2", "A_V1_MC_L3"]);
        let v2 = set(&["A_V2_MC_L2", "A_V2_MC_L3", "A_V2_DATA_L2L3Residual"]);
        let meta = create_metadata("v1.json", &v1, "v2.json", &v2);

        let keys: Vec<&str> = meta.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["DATA_L1", "DATA_L2L3Residual", "MC_L2", "MC_L3"]);
        assert!(meta.values().all(|entries| entries.len() == 2));
        assert_eq!(
            meta["MC_L2"],
            vec![
                TagEntry("v1.json".into(), Some("A_V1_MC_L2".into())),
                TagEntry("v2.json".into(), Some("A_V2_MC_L2".into())),
            ]
        );
        assert_eq!(unmatched_keys(&meta).len(), 2);
    }

    #[test]
    fn source_label_joins_prefix() {
        let path = Path::new("Winter24_V1.json");
        assert_eq!(source_label(Some("input/jerc/"), path), "input/jerc/Winter24_V1.json");
        assert_eq!(source_label(None, path), "Winter24_V1.json");
        assert_eq!(source_label(Some(""), path), "Winter24_V1.json");
    }
}
