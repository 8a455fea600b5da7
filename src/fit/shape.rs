//! Advisory validity flags and observed-shape classification.

use crate::domain::{ObservedShape, Observations};
use crate::models::ModelSpec;

/// Number of evaluation points over the sampled area range.
const SHAPE_GRID_POINTS: usize = 101;

/// Fitted range below this (relative to the curve scale) is a flat curve.
const FLAT_RTOL: f64 = 1e-9;

/// Second differences below this (relative to the curve scale) count as zero.
const CURVATURE_RTOL: f64 = 1e-7;

/// Flags derived from the best attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeFlags {
    pub observed_shape: ObservedShape,
    pub asymptote: bool,
    pub neg_check: bool,
}

pub fn has_negative_fit(fitted: &[f64]) -> bool {
    fitted.iter().any(|&f| f < 0.0)
}

/// The family's asymptote exists and lies within the observed richness range.
pub fn asymptote_in_range(model: &dyn ModelSpec, params: &[f64], data: &Observations) -> bool {
    if !model.has_asymptote() {
        return false;
    }
    let (lo, hi) = data.richness_range();
    model
        .asymptote(params)
        .is_some_and(|a| a.is_finite() && a >= lo && a <= hi)
}

/// Classify the curve from the signs of its second differences on a linear
/// grid over `[min A, max A]`.
pub fn classify_shape(model: &dyn ModelSpec, params: &[f64], data: &Observations, asymptote: bool) -> ObservedShape {
    let (lo, hi) = data.area_range();
    let values: Vec<f64> = (0..SHAPE_GRID_POINTS)
        .map(|i| {
            let a = lo + (hi - lo) * i as f64 / (SHAPE_GRID_POINTS - 1) as f64;
            model.evaluate(params, a)
        })
        .collect();
    classify_values(&values, asymptote)
}

pub(crate) fn classify_values(values: &[f64], asymptote: bool) -> ObservedShape {
    if values.len() < 3 || values.iter().any(|v| !v.is_finite()) {
        return ObservedShape::Unclassifiable;
    }

    let max_abs = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let scale = if max_abs > 0.0 { max_abs } else { 1.0 };
    let (min_v, max_v) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if max_v - min_v <= FLAT_RTOL * scale {
        return ObservedShape::Unclassifiable;
    }

    let second: Vec<f64> = values.windows(3).map(|w| w[2] - 2.0 * w[1] + w[0]).collect();
    let zero = CURVATURE_RTOL * scale;
    if second.iter().all(|d| d.abs() <= zero) {
        return ObservedShape::Linear;
    }

    // Signs of the curvature that is clearly nonzero, with runs collapsed.
    let mut signs: Vec<bool> = Vec::new();
    for &d in second.iter().filter(|d| d.abs() > zero) {
        let positive = d > 0.0;
        if signs.last() != Some(&positive) {
            signs.push(positive);
        }
    }

    match signs.as_slice() {
        [true] => ObservedShape::Convex,
        [false] if asymptote => ObservedShape::Asymptotic,
        [false] => ObservedShape::Concave,
        [true, false] => ObservedShape::Sigmoid,
        _ => ObservedShape::Unclassifiable,
    }
}

pub fn shape_flags(model: &dyn ModelSpec, params: &[f64], data: &Observations, fitted: &[f64]) -> ShapeFlags {
    let asymptote = asymptote_in_range(model, params, data);
    ShapeFlags {
        observed_shape: classify_shape(model, params, data, asymptote),
        asymptote,
        neg_check: has_negative_fit(fitted),
    }
}
