//! Dataset catalog access.
//!
//! Job planning needs two facts per dataset: its file list and its event
//! count. `DasCatalog` asks the CMS data-aggregation service through the
//! `dasgoclient` command-line client; tests use in-memory catalogs.

use std::process::Command;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::data::jobs::ENV_PROXY;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog query '{query}' failed: {stderr}")]
    Query { query: String, stderr: String },
    #[error("unexpected catalog summary for '{dataset}': {reason}")]
    Summary { dataset: String, reason: String },
}

/// Source of dataset file lists and event counts.
pub trait Catalog {
    fn files(&self, dataset: &str) -> Result<Vec<String>, CatalogError>;
    fn events(&self, dataset: &str) -> Result<u64, CatalogError>;
}

/// Catalog backed by the `dasgoclient` binary.
#[derive(Debug, Clone)]
pub struct DasCatalog {
    client: String,
    proxy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryRow {
    #[serde(default)]
    nevents: u64,
}

impl DasCatalog {
    pub fn new(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            proxy: None,
        }
    }

    /// Export `proxy` as the grid proxy for every query.
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    fn query(&self, query: &str) -> Result<String, CatalogError> {
        debug!(client = %self.client, query, "catalog query");
        let mut command = Command::new(&self.client);
        command.arg(format!("-query={query}"));
        if let Some(proxy) = &self.proxy {
            command.env(ENV_PROXY, proxy);
        }
        let output = command
            .output()
            .map_err(|source| CatalogError::Spawn {
                command: self.client.clone(),
                source,
            })?;
        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                stderr = String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
            return Err(CatalogError::Query {
                query: query.to_string(),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Catalog for DasCatalog {
    fn files(&self, dataset: &str) -> Result<Vec<String>, CatalogError> {
        let out = self.query(&format!("file dataset={dataset}"))?;
        Ok(parse_file_list(&out))
    }

    fn events(&self, dataset: &str) -> Result<u64, CatalogError> {
        let out = self.query(&format!("summary dataset={dataset}"))?;
        parse_event_summary(dataset, &out)
    }
}

/// One logical file name per non-blank line.
pub fn parse_file_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// `nevents` of the first row of a JSON summary array.
pub fn parse_event_summary(dataset: &str, output: &str) -> Result<u64, CatalogError> {
    let rows: Vec<SummaryRow> =
        serde_json::from_str(output.trim()).map_err(|e| CatalogError::Summary {
            dataset: dataset.to_string(),
            reason: e.to_string(),
        })?;
    rows.first()
        .map(|row| row.nevents)
        .ok_or_else(|| CatalogError::Summary {
            dataset: dataset.to_string(),
            reason: "empty summary".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_list_skips_blank_lines() {
        let out = "/store/a.root\n\n  /store/b.root  \n";
        assert_eq!(parse_file_list(out), vec!["/store/a.root", "/store/b.root"]);
    }

    #[test]
    fn event_summary_reads_first_row() {
        let out = r#"[{"nevents": 1234567, "nfiles": 3}, {"nevents": 1}]"#;
        assert_eq!(parse_event_summary("/A/B/NANOAOD", out).unwrap(), 1_234_567);
        assert!(parse_event_summary("/A/B/NANOAOD", "[]").is_err());
        assert!(parse_event_summary("/A/B/NANOAOD", "not json").is_err());
    }

    #[test]
    fn missing_client_is_a_spawn_error() {
        let catalog = DasCatalog::new("/nonexistent/dasgoclient");
        assert!(matches!(
            catalog.files("/A/B/NANOAOD"),
            Err(CatalogError::Spawn { .. })
        ));
    }
}
