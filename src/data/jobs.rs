//! Job planning for histogram production.
//!
//! For every channel and year listed in the configuration, each sample of
//! `SamplesNano_{channel}.json` is looked up in the catalog and split into
//! jobs. Three JSON files are written per channel/year:
//!
//! - `FilesNano_{channel}_{year}.json`: sample → input files
//! - `JobsHist_{channel}_{year}.json`: sample → `[n_jobs, events_label, n_events, n_files]`
//! - `FilesHist_{channel}_{year}.json`: sample → output histogram paths

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::das::Catalog;
use crate::error::AppError;
use crate::io::json::{read_json, write_json_pretty};

/// Environment variable overriding the catalog client command.
pub const ENV_DAS_CLIENT: &str = "JEC_DAS_CLIENT";
/// Environment variable naming the grid proxy file.
pub const ENV_PROXY: &str = "X509_USER_PROXY";

/// Job-planning configuration.
///
/// Every field has a default, so a JSON config file only needs the fields it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Storage root for produced histogram files.
    pub output_root: String,
    pub years: Vec<String>,
    pub channels: Vec<String>,
    pub events_per_job_mc: f64,
    pub events_per_job_data: f64,
    /// Directory holding the `SamplesNano_{channel}.json` inputs.
    pub samples_dir: PathBuf,
    /// Directory receiving the plan JSON files.
    pub json_dir: PathBuf,
    pub voms_proxy: String,
    pub das_client: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            output_root: "root://hip-cms-se.csc.fi/store/user/rverma/diff-jerc-json/Hist".to_string(),
            years: vec!["2024".to_string()],
            channels: vec!["ZeeJet".to_string()],
            events_per_job_mc: 1e6,
            events_per_job_data: 5e6,
            samples_dir: PathBuf::from("."),
            json_dir: PathBuf::from("json"),
            voms_proxy: "x509up_u93032".to_string(),
            das_client: "dasgoclient".to_string(),
        }
    }
}

impl JobsConfig {
    /// Load from an optional JSON file, then apply `.env`/environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut config = match path {
            Some(path) => read_json(path, "jobs config")?,
            None => Self::default(),
        };
        dotenvy::dotenv().ok();
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in `load`).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(client) = lookup(ENV_DAS_CLIENT).filter(|v| !v.trim().is_empty()) {
            self.das_client = client;
        }
        if let Some(proxy) = lookup(ENV_PROXY).filter(|v| !v.trim().is_empty()) {
            self.voms_proxy = proxy;
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for (name, rate) in [
            ("events_per_job_mc", self.events_per_job_mc),
            ("events_per_job_data", self.events_per_job_data),
        ] {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(AppError::new(2, format!("Invalid {name}: {rate} (must be > 0).")));
            }
        }
        Ok(())
    }

    /// Events per job for a sample key (`Data` in the key selects the data rate).
    pub fn events_per_job(&self, sample_key: &str) -> f64 {
        if sample_key.contains("Data") {
            self.events_per_job_data
        } else {
            self.events_per_job_mc
        }
    }

    pub fn samples_path(&self, channel: &str) -> PathBuf {
        self.samples_dir.join(format!("SamplesNano_{channel}.json"))
    }
}

/// Datasets of one year, keyed by sample name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct YearSamples {
    #[serde(default, rename = "MC")]
    pub mc: BTreeMap<String, String>,
    #[serde(default, rename = "Data")]
    pub data: BTreeMap<String, String>,
}

impl YearSamples {
    /// MC then data samples; a data entry replaces an MC entry of the same key.
    pub fn all(&self) -> BTreeMap<&str, &str> {
        self.mc
            .iter()
            .chain(self.data.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// Job summary of one sample, serialized as `[n_jobs, events_label, n_events, n_files]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEntry(pub usize, pub String, pub u64, pub usize);

/// Plan for one channel and year.
#[derive(Debug, Clone, Default)]
pub struct YearPlan {
    pub channel: String,
    pub year: String,
    pub nano: BTreeMap<String, Vec<String>>,
    pub jobs: BTreeMap<String, JobEntry>,
    pub hist: BTreeMap<String, Vec<String>>,
    /// Datasets skipped because the catalog returned no files.
    pub missing: Vec<String>,
}

impl YearPlan {
    pub fn total_jobs(&self) -> usize {
        self.jobs.values().map(|j| j.0).sum()
    }
}

/// `min(ceil(events / per_job), n_files)`.
pub fn job_count(events: u64, per_job: f64, n_files: usize) -> usize {
    let wanted = (events as f64 / per_job).ceil();
    if wanted <= 0.0 {
        0
    } else {
        (wanted as usize).min(n_files)
    }
}

/// `{root}/{channel}/{year}/{key}_Hist_{i}of{n}.root` for `i` in `1..=n`.
pub fn output_paths(root: &str, channel: &str, year: &str, key: &str, n_jobs: usize) -> Vec<String> {
    (1..=n_jobs)
        .map(|i| format!("{root}/{channel}/{year}/{key}_Hist_{i}of{n_jobs}.root"))
        .collect()
}

/// Human-readable count with a K/M/B/T suffix and one decimal.
pub fn format_num(num: f64) -> String {
    const SUFFIXES: [&str; 5] = ["", "K", "M", "B", "T"];
    let mut value = num;
    let mut magnitude = 0;
    while value.abs() >= 1000.0 && magnitude < SUFFIXES.len() - 1 {
        magnitude += 1;
        value /= 1000.0;
    }
    if magnitude == 0 && value.fract() == 0.0 {
        format!("{value}")
    } else {
        format!("{:.1}{}", value, SUFFIXES[magnitude])
    }
}

/// Plan the jobs of one channel/year.
pub fn plan_year<C: Catalog>(
    config: &JobsConfig,
    catalog: &C,
    channel: &str,
    year: &str,
    samples: &YearSamples,
) -> YearPlan {
    let mut plan = YearPlan {
        channel: channel.to_string(),
        year: year.to_string(),
        ..YearPlan::default()
    };

    for (key, dataset) in samples.all() {
        let files = match catalog.files(dataset) {
            Ok(files) => files,
            Err(err) => {
                warn!(dataset, error = %err, "file query failed");
                Vec::new()
            }
        };
        if files.is_empty() {
            warn!(sample = key, dataset, "no files found for dataset");
            plan.missing.push(dataset.to_string());
            continue;
        }

        let n_files = files.len();
        let n_events = catalog.events(dataset).unwrap_or_else(|err| {
            warn!(dataset, error = %err, "event count query failed");
            0
        });
        let n_jobs = job_count(n_events, config.events_per_job(key), n_files);
        let label = format_num(n_events as f64);

        info!("{n_files}\t {n_jobs}\t {label}\t {key}");
        plan.hist.insert(
            key.to_string(),
            output_paths(&config.output_root, channel, year, key, n_jobs),
        );
        plan.jobs.insert(key.to_string(), JobEntry(n_jobs, label, n_events, n_files));
        plan.nano.insert(key.to_string(), files);
    }
    plan
}

/// Plan every configured year of `channel` from its sample list.
///
/// Years absent from the sample list are skipped with a diagnostic.
pub fn plan_channel<C: Catalog>(
    config: &JobsConfig,
    catalog: &C,
    channel: &str,
) -> Result<Vec<YearPlan>, AppError> {
    let path = config.samples_path(channel);
    let samples: BTreeMap<String, YearSamples> = read_json(&path, "sample list")?;

    let mut plans = Vec::new();
    for year in &config.years {
        match samples.get(year) {
            Some(year_samples) => {
                let plan = plan_year(config, catalog, channel, year, year_samples);
                info!(channel, year = %year, jobs = plan.total_jobs(), "planned year");
                plans.push(plan);
            }
            None => warn!(year = %year, path = %path.display(), "year not found in sample list, skipping"),
        }
    }
    Ok(plans)
}

/// Write the three plan files of `plan` into `json_dir`.
pub fn write_year_plan(json_dir: &Path, plan: &YearPlan) -> Result<Vec<PathBuf>, AppError> {
    let stem = format!("{}_{}", plan.channel, plan.year);
    let nano = json_dir.join(format!("FilesNano_{stem}.json"));
    let jobs = json_dir.join(format!("JobsHist_{stem}.json"));
    let hist = json_dir.join(format!("FilesHist_{stem}.json"));

    write_json_pretty(&nano, "file list", &plan.nano)?;
    write_json_pretty(&jobs, "job list", &plan.jobs)?;
    write_json_pretty(&hist, "output list", &plan.hist)?;
    Ok(vec![nano, jobs, hist])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::das::CatalogError;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeCatalog {
        files: HashMap<String, Vec<String>>,
        events: HashMap<String, u64>,
    }

    impl FakeCatalog {
        fn with(mut self, dataset: &str, n_files: usize, events: u64) -> Self {
            let files = (0..n_files).map(|i| format!("{dataset}/f{i}.root")).collect();
            self.files.insert(dataset.to_string(), files);
            self.events.insert(dataset.to_string(), events);
            self
        }
    }

    impl Catalog for FakeCatalog {
        fn files(&self, dataset: &str) -> Result<Vec<String>, CatalogError> {
            Ok(self.files.get(dataset).cloned().unwrap_or_default())
        }

        fn events(&self, dataset: &str) -> Result<u64, CatalogError> {
            Ok(self.events.get(dataset).copied().unwrap_or(0))
        }
    }

    fn samples() -> YearSamples {
        let mut s = YearSamples::default();
        s.mc.insert("MC_DY".into(), "/DY/Run3/NANOAODSIM".into());
        s.mc.insert("MC_TT".into(), "/TT/Run3/NANOAODSIM".into());
        s.data.insert("Data_2024C".into(), "/EGamma/2024C/NANOAOD".into());
        s.data.insert("Data_2024D".into(), "/EGamma/2024D/NANOAOD".into());
        s
    }

    #[test]
    fn format_num_uses_suffixes() {
        assert_eq!(format_num(0.0), "0");
        assert_eq!(format_num(999.0), "999");
        assert_eq!(format_num(1500.0), "1.5K");
        assert_eq!(format_num(2_000_000.0), "2.0M");
        assert_eq!(format_num(3.21e9), "3.2B");
        assert_eq!(format_num(4e15), "4000.0T");
    }

    #[test]
    fn job_count_is_capped_by_files() {
        assert_eq!(job_count(2_500_000, 1e6, 10), 3);
        assert_eq!(job_count(2_500_000, 1e6, 2), 2);
        assert_eq!(job_count(0, 1e6, 5), 0);
    }

    #[test]
    fn plans_mc_and_data_with_their_rates() {
        let catalog = FakeCatalog::default()
            .with("/DY/Run3/NANOAODSIM", 40, 12_300_000)
            .with("/TT/Run3/NANOAODSIM", 2, 9_000_000)
            .with("/EGamma/2024C/NANOAOD", 100, 26_000_000);
        let config = JobsConfig::default();
        let plan = plan_year(&config, &catalog, "ZeeJet", "2024", &samples());

        assert_eq!(plan.jobs["MC_DY"], JobEntry(13, "12.3M".into(), 12_300_000, 40));
        assert_eq!(plan.jobs["MC_TT"].0, 2);
        assert_eq!(plan.jobs["Data_2024C"].0, 6);
        assert_eq!(plan.total_jobs(), 21);

        assert_eq!(plan.missing, vec!["/EGamma/2024D/NANOAOD"]);
        assert!(!plan.jobs.contains_key("Data_2024D"));

        let paths = &plan.hist["Data_2024C"];
        assert_eq!(paths.len(), 6);
        assert_eq!(
            paths[0],
            "root://hip-cms-se.csc.fi/store/user/rverma/diff-jerc-json/Hist/ZeeJet/2024/Data_2024C_Hist_1of6.root"
        );
        assert!(paths[5].ends_with("Data_2024C_Hist_6of6.root"));
        assert_eq!(plan.nano["MC_TT"].len(), 2);
    }

    #[test]
    fn channel_plan_skips_unknown_years_and_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("SamplesNano_ZeeJet.json"),
            r#"{"2024": {"MC": {"MC_DY": "/DY/Run3/NANOAODSIM"}}}"#,
        )
        .unwrap();
        let config = JobsConfig {
            years: vec!["2023".into(), "2024".into()],
            samples_dir: dir.path().to_path_buf(),
            json_dir: dir.path().join("json"),
            ..JobsConfig::default()
        };
        let catalog = FakeCatalog::default().with("/DY/Run3/NANOAODSIM", 3, 1_000);

        let plans = plan_channel(&config, &catalog, "ZeeJet").unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].year, "2024");

        let written = write_year_plan(&config.json_dir, &plans[0]).unwrap();
        assert_eq!(written.len(), 3);
        let jobs: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&written[1]).unwrap()).unwrap();
        assert_eq!(jobs, serde_json::json!({"MC_DY": [1, "1.0K", 1000, 3]}));
    }

    #[test]
    fn config_defaults_and_env_overrides() {
        let partial: JobsConfig = serde_json::from_str(r#"{"years": ["2023", "2024"]}"#).unwrap();
        assert_eq!(partial.years, vec!["2023", "2024"]);
        assert_eq!(partial.channels, vec!["ZeeJet"]);
        assert_eq!(partial.events_per_job_data, 5e6);

        let mut config = JobsConfig::default();
        config.apply_env(|key| match key {
            ENV_DAS_CLIENT => Some("/opt/bin/dasgoclient".to_string()),
            ENV_PROXY => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.das_client, "/opt/bin/dasgoclient");
        assert_eq!(config.voms_proxy, "x509up_u93032");

        config.events_per_job_mc = 0.0;
        assert_eq!(config.validate().unwrap_err().exit_code(), 2);
    }
}
