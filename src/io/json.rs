//! Read/write JSON documents.
//!
//! Every JSON input of the toolkit (tag files, metadata, object-store exports,
//! job configuration, sample lists) and every JSON output (metadata, job
//! plans) goes through these two helpers so error messages stay uniform.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Read and deserialize a JSON file; `what` names the file in errors.
pub fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, AppError> {
    if !path.is_file() {
        return Err(AppError::missing_file(what, path));
    }
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open {what} '{}': {e}", path.display())))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Invalid {what} '{}': {e}", path.display())))
}

/// Serialize `value` as pretty-printed JSON (4-space indent) to `path`.
///
/// Missing parent directories are created.
pub fn write_json_pretty<T: Serialize>(path: &Path, what: &str, value: &T) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::new(4, format!("Failed to create directory '{}': {e}", parent.display()))
        })?;
    }
    let file = File::create(path)
        .map_err(|e| AppError::new(4, format!("Failed to create {what} '{}': {e}", path.display())))?;
    let mut writer = BufWriter::new(file);

    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| AppError::new(4, format!("Failed to write {what}: {e}")))?;
    writeln!(writer).map_err(|e| AppError::new(4, format!("Failed to write {what}: {e}")))?;
    writer
        .flush()
        .map_err(|e| AppError::new(4, format!("Failed to write {what}: {e}")))?;
    Ok(())
}
