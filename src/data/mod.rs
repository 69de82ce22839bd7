//! Dataset catalog access and job planning.

pub mod das;
pub mod jobs;

pub use das::{Catalog, CatalogError, DasCatalog};
pub use jobs::{JobEntry, JobsConfig, YearPlan, YearSamples};
