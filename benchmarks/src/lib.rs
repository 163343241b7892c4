//! Benchmark utilities for the powertrain crate.
//!
//! - Synthetic link-level driving data with a known energy model
//! - Timing helpers for the backend comparison binary

pub mod data;
pub mod utils;

pub use data::SyntheticLinks;
pub use utils::{time_fn, BenchmarkStats, Timer};
