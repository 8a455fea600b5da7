//! The model abstraction shared by every curve family.
//!
//! The fitting pipeline only ever talks to `dyn ModelSpec`; adding a family
//! means implementing this trait and registering it.

use std::fmt::Debug;

use crate::domain::Observations;

/// Admissible range of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamBound {
    /// Any finite value.
    Free,
    /// `θ >= 0`.
    NonNegative,
    /// `0 < θ < 1`.
    UnitInterval,
}

/// Smallest magnitude used when projecting onto the open side of a bound.
const MIN_MAGNITUDE: f64 = 1e-10;

/// Clamp for the unconstrained coordinate so `exp` stays finite.
const MAX_INTERNAL: f64 = 700.0;

impl ParamBound {
    pub fn contains(self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self {
            ParamBound::Free => true,
            ParamBound::NonNegative => value >= 0.0,
            ParamBound::UnitInterval => value > 0.0 && value < 1.0,
        }
    }

    /// True when the value is admissible and not within `tol` of a boundary.
    pub fn is_interior(self, value: f64, tol: f64) -> bool {
        if !self.contains(value) {
            return false;
        }
        match self {
            ParamBound::Free => true,
            ParamBound::NonNegative => value > tol,
            ParamBound::UnitInterval => value > tol && value < 1.0 - tol,
        }
    }

    /// Nearest admissible value (open bounds are approached, not reached).
    pub fn project(self, value: f64) -> f64 {
        let value = if value.is_finite() { value } else { 1.0 };
        match self {
            ParamBound::Free => value,
            ParamBound::NonNegative => value.max(MIN_MAGNITUDE),
            ParamBound::UnitInterval => value.clamp(MIN_MAGNITUDE, 1.0 - MIN_MAGNITUDE),
        }
    }

    /// Map a parameter value to the unconstrained optimizer coordinate.
    pub fn to_internal(self, value: f64) -> f64 {
        let value = self.project(value);
        match self {
            ParamBound::Free => value,
            ParamBound::NonNegative => value.ln(),
            ParamBound::UnitInterval => (value / (1.0 - value)).ln(),
        }
    }

    /// Map an unconstrained coordinate back to an admissible parameter value.
    pub fn to_external(self, internal: f64) -> f64 {
        match self {
            ParamBound::Free => internal,
            ParamBound::NonNegative => internal.clamp(-MAX_INTERNAL, MAX_INTERNAL).exp(),
            ParamBound::UnitInterval => {
                let u = internal.clamp(-MAX_INTERNAL, MAX_INTERNAL);
                (1.0 / (1.0 + (-u).exp())).clamp(MIN_MAGNITUDE, 1.0 - MIN_MAGNITUDE)
            }
        }
    }
}

/// A candidate species–area curve family.
///
/// Implementations are stateless and shared read-only across threads.
pub trait ModelSpec: Send + Sync + Debug {
    /// Unique identifier used for lookup (e.g. `"power"`).
    fn name(&self) -> &str;

    fn display_name(&self) -> &str {
        self.name()
    }

    /// Formula in terms of `A` (area) and the parameter names.
    fn formula(&self) -> &str;

    fn param_names(&self) -> &[&str];

    /// One bound per parameter, in `param_names` order.
    fn bounds(&self) -> &[ParamBound];

    /// Predicted richness at `area`.
    fn evaluate(&self, params: &[f64], area: f64) -> f64;

    /// Heuristic starting vectors derived from the data. Never empty.
    fn initial_guesses(&self, data: &Observations) -> Vec<Vec<f64>>;

    /// Exact least-squares optimum when one exists in closed form.
    fn closed_form(&self, _data: &Observations) -> Option<Vec<f64>> {
        None
    }

    /// Whether the family has a horizontal asymptote.
    fn has_asymptote(&self) -> bool {
        false
    }

    /// Value of the horizontal asymptote for the given parameters.
    fn asymptote(&self, _params: &[f64]) -> Option<f64> {
        None
    }

    /// Number of curve parameters.
    fn k(&self) -> usize {
        self.param_names().len()
    }

    /// Parameter count for information criteria (`k + 1`, the extra one
    /// being the residual variance).
    fn param_count(&self) -> usize {
        self.k() + 1
    }

    fn fitted_values(&self, params: &[f64], data: &Observations) -> Vec<f64> {
        data.areas().iter().map(|&a| self.evaluate(params, a)).collect()
    }

    fn residual_sum_of_squares(&self, params: &[f64], data: &Observations) -> f64 {
        data.iter()
            .map(|(a, s)| {
                let r = s - self.evaluate(params, a);
                r * r
            })
            .sum()
    }

    fn constraint_satisfied(&self, params: &[f64]) -> bool {
        params.len() == self.k()
            && params
                .iter()
                .zip(self.bounds().iter())
                .all(|(&p, b)| b.contains(p))
    }

    /// Admissible and at least `tol` away from every boundary.
    fn strictly_interior(&self, params: &[f64], tol: f64) -> bool {
        params.len() == self.k()
            && params
                .iter()
                .zip(self.bounds().iter())
                .all(|(&p, b)| b.is_interior(p, tol))
    }

    /// Project every parameter into its bound.
    fn project(&self, params: &[f64]) -> Vec<f64> {
        params
            .iter()
            .zip(self.bounds().iter())
            .map(|(&p, b)| b.project(p))
            .collect()
    }
}
