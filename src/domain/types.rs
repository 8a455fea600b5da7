//! Shared domain types.
//!
//! This module defines:
//!
//! - the validated observation table (`Observations`)
//! - fit outputs (`FitResult`, `Coefficient`, `InformationCriteria`)
//! - advisory classifications (`ObservedShape`) and diagnostic outcomes (`ProbeOutcome`)
//!
//! Outputs are serializable so an external summary/plotting collaborator can
//! consume them without depending on the fitting code.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Result, SarError};
use crate::models::ModelSpec;

/// Paired (area, richness) observations sorted ascending by area.
///
/// Areas are strictly positive, richness values non-negative, all finite.
/// Duplicated areas are allowed and keep their input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observations {
    areas: Vec<f64>,
    richness: Vec<f64>,
}

impl Observations {
    pub fn new(areas: Vec<f64>, richness: Vec<f64>) -> Result<Self> {
        if areas.len() != richness.len() {
            return Err(SarError::InvalidInput(format!(
                "area and richness columns differ in length ({} vs {})",
                areas.len(),
                richness.len()
            )));
        }
        if areas.is_empty() {
            return Err(SarError::InvalidInput("no observations".to_string()));
        }
        for (i, (&a, &s)) in areas.iter().zip(richness.iter()).enumerate() {
            if !a.is_finite() || a <= 0.0 {
                return Err(SarError::InvalidInput(format!(
                    "row {i}: area must be finite and > 0, got {a}"
                )));
            }
            if !s.is_finite() || s < 0.0 {
                return Err(SarError::InvalidInput(format!(
                    "row {i}: richness must be finite and >= 0, got {s}"
                )));
            }
        }

        // Stable sort so duplicated areas keep their original order.
        let mut order: Vec<usize> = (0..areas.len()).collect();
        order.sort_by(|&i, &j| areas[i].total_cmp(&areas[j]));

        Ok(Self {
            areas: order.iter().map(|&i| areas[i]).collect(),
            richness: order.iter().map(|&i| richness[i]).collect(),
        })
    }

    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self> {
        let (areas, richness) = pairs.iter().copied().unzip();
        Self::new(areas, richness)
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn areas(&self) -> &[f64] {
        &self.areas
    }

    pub fn richness(&self) -> &[f64] {
        &self.richness
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.areas.iter().copied().zip(self.richness.iter().copied())
    }

    /// `(min, max)` of the areas.
    pub fn area_range(&self) -> (f64, f64) {
        (self.areas[0], self.areas[self.areas.len() - 1])
    }

    /// `(min, max)` of the richness values.
    pub fn richness_range(&self) -> (f64, f64) {
        self.richness
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
                (lo.min(s), hi.max(s))
            })
    }

    pub fn mean_richness(&self) -> f64 {
        self.richness.iter().sum::<f64>() / self.len() as f64
    }

    /// Σ (S - mean S)².
    pub fn total_sum_of_squares(&self) -> f64 {
        let mean = self.mean_richness();
        self.richness.iter().map(|s| (s - mean) * (s - mean)).sum()
    }

    pub fn richness_is_constant(&self) -> bool {
        let (lo, hi) = self.richness_range();
        hi - lo == 0.0
    }
}

/// Observed functional shape of a fitted curve over the sampled area range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservedShape {
    Linear,
    /// Curving upwards (positive curvature throughout).
    Convex,
    /// Curving downwards without reaching a fitted asymptote inside the data range.
    Concave,
    /// Convex then concave.
    Sigmoid,
    /// Curving downwards towards an asymptote that lies inside the observed richness range.
    Asymptotic,
    /// Degenerate (constant or non-finite) or mixed curvature.
    Unclassifiable,
}

impl fmt::Display for ObservedShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ObservedShape::Linear => "linear",
            ObservedShape::Convex => "convex",
            ObservedShape::Concave => "concave",
            ObservedShape::Sigmoid => "sigmoid",
            ObservedShape::Asymptotic => "asymptotic",
            ObservedShape::Unclassifiable => "unclassifiable",
        };
        f.write_str(label)
    }
}

/// A computed hypothesis test.
///
/// For correlation-based homogeneity probes `statistic` is the correlation estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestReport {
    pub test: String,
    pub statistic: f64,
    pub p_value: f64,
}

/// Outcome of an optional diagnostic probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProbeOutcome {
    /// The probe was disabled (`"none"`).
    NotRun,
    Computed(TestReport),
    /// The probe was requested but could not be computed on these residuals.
    Unavailable { test: String, reason: String },
}

impl ProbeOutcome {
    pub fn report(&self) -> Option<&TestReport> {
        match self {
            ProbeOutcome::Computed(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, ProbeOutcome::Unavailable { .. })
    }
}

/// Likelihood-based criteria. `None` marks a value that is undefined for this
/// fit (zero or non-finite RSS, or `n <= P + 1` for AICc).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InformationCriteria {
    pub log_likelihood: Option<f64>,
    pub aic: Option<f64>,
    pub aicc: Option<f64>,
    pub bic: Option<f64>,
}

/// One row of the coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: Option<f64>,
    pub t_value: Option<f64>,
    pub p_value: Option<f64>,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
}

/// How many starting vectors the multi-start driver ran and how many converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartSummary {
    pub tried: usize,
    pub converged: usize,
}

/// The fit of one model family to one observation set.
///
/// Built once by [`crate::fit::fit_model`] after every sub-computation has
/// finished; nothing hands out a partially filled value. Fields are read
/// through accessors.
#[derive(Debug, Clone, Serialize)]
pub struct FitResult {
    pub(crate) model_name: String,
    pub(crate) display_name: String,
    pub(crate) formula: String,

    #[serde(skip)]
    pub(crate) model: Arc<dyn ModelSpec>,

    pub(crate) param_names: Vec<String>,
    pub(crate) params: Vec<f64>,
    pub(crate) rss: f64,
    pub(crate) verge: bool,

    pub(crate) n: usize,
    pub(crate) param_count: usize,

    pub(crate) fitted: Vec<f64>,
    pub(crate) residuals: Vec<f64>,

    pub(crate) criteria: InformationCriteria,
    pub(crate) r_squared: Option<f64>,
    pub(crate) adj_r_squared: Option<f64>,
    pub(crate) sigma2: Option<f64>,

    pub(crate) coefficients: Vec<Coefficient>,
    /// k×k, row-major.
    pub(crate) covariance: Option<Vec<f64>>,

    pub(crate) observed_shape: ObservedShape,
    pub(crate) asymptote: bool,
    pub(crate) neg_check: bool,

    pub(crate) normality: ProbeOutcome,
    pub(crate) homogeneity: ProbeOutcome,

    pub(crate) starts: StartSummary,
    pub(crate) warnings: Vec<String>,
}

impl FitResult {
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn formula(&self) -> &str {
        &self.formula
    }

    pub fn model(&self) -> &Arc<dyn ModelSpec> {
        &self.model
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    pub fn rss(&self) -> f64 {
        self.rss
    }

    /// Whether the optimizer converged to a valid, identified optimum.
    ///
    /// When `false`, parameters and RSS are reported but unreliable.
    pub fn verge(&self) -> bool {
        self.verge
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// Parameter count for information criteria, including the error variance.
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub fn fitted(&self) -> &[f64] {
        &self.fitted
    }

    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    pub fn criteria(&self) -> InformationCriteria {
        self.criteria
    }

    pub fn aic(&self) -> Option<f64> {
        self.criteria.aic
    }

    pub fn aicc(&self) -> Option<f64> {
        self.criteria.aicc
    }

    pub fn bic(&self) -> Option<f64> {
        self.criteria.bic
    }

    pub fn r_squared(&self) -> Option<f64> {
        self.r_squared
    }

    pub fn adj_r_squared(&self) -> Option<f64> {
        self.adj_r_squared
    }

    /// Residual variance estimate `RSS / (n - k)`.
    pub fn sigma2(&self) -> Option<f64> {
        self.sigma2
    }

    pub fn coefficients(&self) -> &[Coefficient] {
        &self.coefficients
    }

    /// Asymptotic parameter covariance, k×k, row-major.
    pub fn covariance(&self) -> Option<&[f64]> {
        self.covariance.as_deref()
    }

    pub fn observed_shape(&self) -> ObservedShape {
        self.observed_shape
    }

    /// The family's asymptote lies within the observed richness range.
    pub fn asymptote(&self) -> bool {
        self.asymptote
    }

    /// Some fitted richness value is negative.
    pub fn neg_check(&self) -> bool {
        self.neg_check
    }

    pub fn normality(&self) -> &ProbeOutcome {
        &self.normality
    }

    pub fn homogeneity(&self) -> &ProbeOutcome {
        &self.homogeneity
    }

    pub fn starts(&self) -> StartSummary {
        self.starts
    }

    /// Advisory warnings, recorded when `verbose` is enabled.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Number of curve parameters (excludes the variance term).
    pub fn k(&self) -> usize {
        self.params.len()
    }

    /// Predicted richness at `area` from the fitted parameters.
    pub fn predict(&self, area: f64) -> f64 {
        self.model.evaluate(&self.params, area)
    }

    pub fn param(&self, name: &str) -> Option<f64> {
        self.param_names
            .iter()
            .position(|p| p == name)
            .map(|i| self.params[i])
    }

    /// Entry `(row, col)` of the covariance; `None` outside `k×k` or when undefined.
    pub fn covariance_entry(&self, row: usize, col: usize) -> Option<f64> {
        let k = self.k();
        if row >= k || col >= k {
            return None;
        }
        self.covariance.as_ref().and_then(|c| c.get(row * k + col).copied())
    }
}
