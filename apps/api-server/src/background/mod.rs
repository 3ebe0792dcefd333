//! Background work: scan execution and periodic maintenance.

pub mod runner;

#[cfg(feature = "scheduler")]
pub mod scheduler;

pub use runner::{ScanConfig, ScanRunner};
