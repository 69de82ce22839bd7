//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - parsed correction rows (`CorrectionRecord`) and their layout
//! - evaluation inputs/outputs (`SamplingGrid`, `EvaluatedSeries`)
//! - histogram-like objects and tag metadata used by comparison reports
//! - per-command configuration structs

pub mod types;

pub use types::*;
