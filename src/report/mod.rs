//! Reporting: terminal summaries and multi-page report documents.

pub mod document;
pub mod format;

pub use document::{DocumentFormat, ReportDocument};
pub use format::*;
