//! Input/output helpers.
//!
//! - correction text files (`correction`)
//! - JSON read/write (`json`)
//! - correction-tag files (`tags`)
//! - analysis-object stores (`store`)

pub mod correction;
pub mod json;
pub mod store;
pub mod tags;

pub use correction::*;
pub use json::*;
pub use store::*;
pub use tags::*;
