//! `sar-curves` library crate.
//!
//! Fits species-area relationship (SAR) curves to paired (area, richness)
//! observations, ranks the families by information criteria and averages
//! them with AICc weights.
//!
//! ```no_run
//! use sar_curves::{AverageOptions, AveragedFit, FitConfig, Observations, Registry, fit_collection};
//!
//! # fn main() -> sar_curves::Result<()> {
//! let data = Observations::new(vec![1.0, 10.0, 100.0, 1000.0], vec![4.0, 9.0, 18.0, 30.0])?;
//! let collection = fit_collection(&Registry::standard(), &data, &FitConfig::default())?;
//! let averaged = AveragedFit::average(&collection, &AverageOptions::default())?;
//! println!("{:?}", averaged.predict(&[500.0]));
//! # Ok(())
//! # }
//! ```

pub mod diagnostics;
pub mod domain;
pub mod error;
pub mod fit;
pub mod math;
pub mod models;

pub use diagnostics::{Diagnostics, HomogeneityProbe, NormalityProbe};
pub use domain::{FitConfig, FitResult, Observations, ObservedShape, OptimOptions, ProbeOutcome};
pub use error::{Result, SarError};
pub use fit::{AverageOptions, AveragedFit, ModelCollection, fit_collection, fit_model, fit_model_with};
pub use models::{ModelKind, ModelSpec, ParamBound, Registry};
