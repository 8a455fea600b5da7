//! Crate error type.
//!
//! Only input, configuration and setup problems are errors. A model that fails
//! to converge is reported through `FitResult::verge`, a diagnostic probe that
//! cannot run through `ProbeOutcome::Unavailable`, and an undefined criterion
//! through `None`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SarError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SarError {
    /// Malformed observation table (length mismatch, non-finite values, bad ranges).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown option value, out-of-range numeric option or unknown model name.
    #[error("Invalid configuration: {option} = {value:?} ({reason})")]
    Config {
        option: String,
        value: String,
        reason: String,
    },

    /// The optimizer could not be set up for a starting vector.
    #[error("Optimizer setup failed for model {model}: {reason}")]
    Optimizer { model: String, reason: String },

    /// A model was asked to fit fewer observations than it has curve parameters.
    #[error("Model {model} is underdetermined: n={n} < k={k}")]
    Underdetermined { model: String, n: usize, k: usize },

    #[error("No models are eligible for averaging: {0}")]
    NoModelsToAverage(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
}

impl SarError {
    pub(crate) fn config(
        option: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        SarError::Config {
            option: option.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
