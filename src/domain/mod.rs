//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the observation table (`Observations`)
//! - configuration enums and `FitConfig`
//! - fit outputs (`FitResult`, `Coefficient`, `ProbeOutcome`, etc.)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
