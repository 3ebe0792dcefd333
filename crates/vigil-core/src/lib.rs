//! # Vigil Core
//!
//! The domain layer of the Vigil scan dashboard.
//! This crate holds the job model, the rate limiting contract and the window
//! arithmetic shared by every backend. It has no infrastructure dependencies.

pub mod domain;
pub mod error;
pub mod ports;
pub mod window;

pub use error::DomainError;
