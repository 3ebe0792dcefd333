//! Job status store implementations.

mod file;

pub use file::{FileJobStatusStore, FileJobStoreConfig};
