//! `jec-compare` library crate.
//!
//! The binary (`jec`) is a thin wrapper around this library so that:
//!
//! - parsing and evaluation are testable without spawning processes
//! - the pieces (formula engine, record parser, comparison helpers) are
//!   reusable on their own
//!
//! Pipeline of the correction-function report:
//! correction file (`io`) -> formula (`expr`) -> sampled series (`eval`) ->
//! pages (`plot`) -> document (`report`).

pub mod app;
pub mod cli;
pub mod compare;
pub mod data;
pub mod domain;
pub mod error;
pub mod eval;
pub mod expr;
pub mod io;
pub mod metadata;
pub mod plot;
pub mod report;
