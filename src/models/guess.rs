//! Initial-guess heuristics.
//!
//! Each family is linearised around a saturation level or by taking logs and
//! solved by ordinary least squares. Points that fall outside the domain of a
//! transform (zero richness under a log, richness above the saturation level)
//! are dropped. When too few points remain, a fixed fallback is used; the
//! multi-start grid explores around whatever comes out of here.

use crate::domain::Observations;
use crate::math::{median, multiple_regression, regression_through_origin, simple_regression};

/// Saturation level used to linearise asymptotic families.
pub(crate) fn saturation_level(data: &Observations) -> f64 {
    let (_, max_s) = data.richness_range();
    if max_s > 0.0 { 1.1 * max_s } else { 1.0 }
}

pub(crate) fn median_area(data: &Observations) -> f64 {
    median(data.areas()).unwrap_or(1.0)
}

/// `(ln A, ln S)` for points with positive richness.
fn log_log(data: &Observations) -> (Vec<f64>, Vec<f64>) {
    data.iter()
        .filter(|&(_, s)| s > 0.0)
        .map(|(a, s)| (a.ln(), s.ln()))
        .unzip()
}

/// `(x(A), ln(d/S - 1))` for points with `0 < S < d`.
fn logit_points(data: &Observations, d: f64, x: impl Fn(f64) -> f64) -> (Vec<f64>, Vec<f64>) {
    data.iter()
        .filter(|&(_, s)| s > 0.0 && s < d)
        .map(|(a, s)| (x(a), (d / s - 1.0).ln()))
        .unzip()
}

/// `(c, z)` of `S = c A^z` from a log-log regression.
pub(crate) fn power(data: &Observations) -> (f64, f64) {
    let (x, y) = log_log(data);
    match simple_regression(&x, &y) {
        Some((b0, b1)) => (b0.exp(), b1),
        None => (data.mean_richness().max(1.0), 0.25),
    }
}

/// `(c, z)` of `S = c + z ln A`.
pub(crate) fn logarithmic(data: &Observations) -> (f64, f64) {
    let x: Vec<f64> = data.areas().iter().map(|a| a.ln()).collect();
    simple_regression(&x, data.richness()).unwrap_or((data.mean_richness(), 0.0))
}

/// `(c, m)` of `S = c + m A`.
pub(crate) fn linear(data: &Observations) -> (f64, f64) {
    simple_regression(data.areas(), data.richness()).unwrap_or((data.mean_richness(), 0.0))
}

/// `(c, z)` of `S = c ln(1 + A/z)` with `z` at the median area.
pub(crate) fn kobayashi(data: &Observations) -> (f64, f64) {
    let z = median_area(data);
    let g: Vec<f64> = data.areas().iter().map(|a| (1.0 + a / z).ln()).collect();
    let c = regression_through_origin(&g, data.richness()).unwrap_or(1.0);
    (c, z)
}

/// `c` of `S = d / (1 + c/A)` for a given `d`.
pub(crate) fn monod(data: &Observations, d: f64) -> f64 {
    let values: Vec<f64> = data
        .iter()
        .filter(|&(_, s)| s > 0.0 && s < d)
        .map(|(a, s)| (d / s - 1.0) * a)
        .collect();
    median(&values).unwrap_or_else(|| median_area(data))
}

/// `z` of `S = d (1 - exp(-z A))` for a given `d`.
pub(crate) fn negative_exponential(data: &Observations, d: f64) -> f64 {
    let (x, y): (Vec<f64>, Vec<f64>) = data
        .iter()
        .filter(|&(_, s)| s < d)
        .map(|(a, s)| (a, -(1.0 - s / d).ln()))
        .unzip();
    regression_through_origin(&x, &y).unwrap_or(1.0 / median_area(data))
}

/// `(c, z)` of `S = d (1 - exp(-c A^z))` for a given `d`.
pub(crate) fn weibull(data: &Observations, d: f64) -> (f64, f64) {
    let (x, y): (Vec<f64>, Vec<f64>) = data
        .iter()
        .filter(|&(_, s)| s > 0.0 && s < d)
        .map(|(a, s)| (a.ln(), (-(1.0 - s / d).ln()).ln()))
        .unzip();
    match simple_regression(&x, &y) {
        Some((b0, b1)) => (b0.exp(), b1),
        None => (negative_exponential(data, d), 1.0),
    }
}

/// `(c, z)` of `S = d - c z^A` for a given `d`.
pub(crate) fn asymptotic_regression(data: &Observations, d: f64) -> (f64, f64) {
    let (x, y): (Vec<f64>, Vec<f64>) = data
        .iter()
        .filter(|&(_, s)| s < d)
        .map(|(a, s)| (a, (d - s).ln()))
        .unzip();
    match simple_regression(&x, &y) {
        Some((b0, b1)) if b1 < 0.0 => (b0.exp(), b1.exp()),
        _ => (d, 0.5),
    }
}

/// `(c, z, d)` of `S = (c + z A) / (1 + d A)`, linearised as
/// `S = c + z A - d A S`.
pub(crate) fn rational(data: &Observations) -> (f64, f64, f64) {
    let rows: Vec<Vec<f64>> = data.iter().map(|(a, s)| vec![1.0, a, -a * s]).collect();
    match multiple_regression(&rows, data.richness()) {
        Some(b) => (b[0], b[1], b[2]),
        None => {
            let (c, m) = linear(data);
            (c, m, 0.0)
        }
    }
}

/// `(z, c)` of `S = d exp(-exp(-z (A - c)))` for a given `d`.
pub(crate) fn gompertz(data: &Observations, d: f64) -> (f64, f64) {
    let (x, y): (Vec<f64>, Vec<f64>) = data
        .iter()
        .filter(|&(_, s)| s > 0.0 && s < d)
        .map(|(a, s)| (a, -(-(s / d).ln()).ln()))
        .unzip();
    match simple_regression(&x, &y) {
        Some((b0, b1)) if b1 > 0.0 => (b1, -b0 / b1),
        _ => {
            let m = median_area(data);
            (1.0 / m, m)
        }
    }
}

/// `(c, z)` of `S = d (1 - (1 + (A/c)^z)^-1)`, the Beta-P curve with `f = 1`.
pub(crate) fn beta_p(data: &Observations, d: f64) -> (f64, f64) {
    let (x, y) = logit_points(data, d, f64::ln);
    match simple_regression(&x, &y) {
        Some((b0, b1)) if b1 < 0.0 => {
            let z = -b1;
            ((b0 / z).exp(), z)
        }
        _ => (median_area(data), 1.0),
    }
}

/// `(c, z)` of `S = d / (1 + c A^-z)`.
pub(crate) fn mmf(data: &Observations, d: f64) -> (f64, f64) {
    let (x, y) = logit_points(data, d, f64::ln);
    match simple_regression(&x, &y) {
        Some((b0, b1)) => (b0.exp(), -b1),
        None => (median_area(data), 1.0),
    }
}

/// `(c, f, z)` of `S = c / (f + A^-z)`, using the asymptote `c/f = d`.
pub(crate) fn heleg(data: &Observations, d: f64) -> (f64, f64, f64) {
    let (c_mmf, z) = mmf(data, d);
    // d / (1 + c A^-z) = (d/c) / (1/c + A^-z)
    let f = 1.0 / c_mmf;
    (d * f, f, z)
}

/// `(z, f)` of `S = d / (1 + exp(-z A + f))`.
pub(crate) fn logistic(data: &Observations, d: f64) -> (f64, f64) {
    let (x, y) = logit_points(data, d, |a| a);
    match simple_regression(&x, &y) {
        Some((b0, b1)) => (-b1, b0),
        None => (1.0 / median_area(data), 1.0),
    }
}
