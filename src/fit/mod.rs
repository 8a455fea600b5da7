//! Curve fitting orchestration.
//!
//! Responsibilities:
//!
//! - minimise the RSS of one family from one start (`objective`)
//! - generate starting vectors and run them in parallel (`grid_start`)
//! - classify the fitted curve and compute criteria (`shape`, `criteria`)
//! - assemble a `FitResult` per family and average a collection (`fitter`, `selection`)

pub mod criteria;
pub mod fitter;
pub mod grid_start;
pub mod objective;
pub mod selection;
pub mod shape;

pub use fitter::*;
pub use grid_start::{MultiStartOutcome, multi_start};
pub use objective::FitAttempt;
pub use selection::*;
pub use shape::ShapeFlags;
