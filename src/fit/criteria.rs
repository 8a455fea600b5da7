//! Information criteria, R² and the coefficient table.
//!
//! With `n` observations, `k` curve parameters and `P = k + 1`:
//!
//! ```text
//! val  = -n (ln 2π + 1 - ln n + ln RSS) / 2
//! AIC  = 2P - 2 val
//! AICc = -2 val + 2P n / (n - P - 1)
//! BIC  = -2 val + P ln n
//! ```
//!
//! Standard errors come from the asymptotic covariance `σ² (JᵀJ)⁻¹` with
//! `σ² = RSS / (n - k)` and `J` a finite-difference Jacobian of the model
//! with respect to its parameters.

use nalgebra::DMatrix;

use crate::domain::{Coefficient, InformationCriteria, Observations};
use crate::math::{student_t_two_sided_p, student_t_two_sided_quantile};
use crate::models::ModelSpec;

/// Relative finite-difference step.
const FD_STEP: f64 = 1e-6;

/// `JᵀJ` is treated as singular below this reciprocal condition number.
const MIN_RCOND: f64 = 1e-14;

pub fn log_likelihood(rss: f64, n: usize) -> Option<f64> {
    if !(rss.is_finite() && rss > 0.0) || n == 0 {
        return None;
    }
    let n = n as f64;
    let val = -n * ((2.0 * std::f64::consts::PI).ln() + 1.0 - n.ln() + rss.ln()) / 2.0;
    val.is_finite().then_some(val)
}

pub fn information_criteria(rss: f64, n: usize, param_count: usize) -> InformationCriteria {
    let Some(val) = log_likelihood(rss, n) else {
        return InformationCriteria {
            log_likelihood: None,
            aic: None,
            aicc: None,
            bic: None,
        };
    };
    let nf = n as f64;
    let p = param_count as f64;
    let aicc = (n > param_count + 1).then(|| -2.0 * val + 2.0 * p * nf / (nf - p - 1.0));
    InformationCriteria {
        log_likelihood: Some(val),
        aic: Some(2.0 * p - 2.0 * val),
        aicc,
        bic: Some(-2.0 * val + p * nf.ln()),
    }
}

pub fn r_squared(rss: f64, tss: f64) -> Option<f64> {
    (rss.is_finite() && tss > 0.0).then(|| 1.0 - rss / tss)
}

/// `1 - ((n - 1) RSS) / ((n - P) TSS)`.
pub fn adjusted_r_squared(rss: f64, tss: f64, n: usize, param_count: usize) -> Option<f64> {
    if !(rss.is_finite() && tss > 0.0) || n <= param_count {
        return None;
    }
    let nf = n as f64;
    Some(1.0 - ((nf - 1.0) * rss) / ((nf - param_count as f64) * tss))
}

/// Residual variance `RSS / (n - k)`.
pub fn residual_variance(rss: f64, n: usize, k: usize) -> Option<f64> {
    (n > k && rss.is_finite()).then(|| rss / (n - k) as f64)
}

/// Partial derivative of the fitted value at `area` with respect to parameter `j`.
///
/// Central differences where both neighbours are admissible, one-sided next to a bound.
fn partial(model: &dyn ModelSpec, params: &[f64], j: usize, area: f64) -> f64 {
    let theta = params[j];
    let h = FD_STEP * theta.abs().max(1.0);
    let bound = model.bounds()[j];
    let at = |v: f64| {
        let mut p = params.to_vec();
        p[j] = v;
        model.evaluate(&p, area)
    };
    match (bound.contains(theta + h), bound.contains(theta - h)) {
        (true, true) => (at(theta + h) - at(theta - h)) / (2.0 * h),
        (true, false) => (at(theta + h) - at(theta)) / h,
        (false, true) => (at(theta) - at(theta - h)) / h,
        (false, false) => f64::NAN,
    }
}

/// Gradient of `evaluate(params, area)` with respect to the parameters.
pub fn gradient(model: &dyn ModelSpec, params: &[f64], area: f64) -> Vec<f64> {
    (0..params.len()).map(|j| partial(model, params, j, area)).collect()
}

pub fn jacobian(model: &dyn ModelSpec, params: &[f64], areas: &[f64]) -> DMatrix<f64> {
    DMatrix::from_fn(areas.len(), params.len(), |i, j| partial(model, params, j, areas[i]))
}

/// Parameters larger than this in magnitude are treated as a fit escaping to
/// infinity along an unidentified direction.
pub const MAX_PARAM_MAGNITUDE: f64 = 1e10;

/// `(JᵀJ)⁻¹` at `params`, or `None` when `JᵀJ` is singular or the Jacobian is
/// not finite.
fn information_inverse(model: &dyn ModelSpec, params: &[f64], areas: &[f64]) -> Option<DMatrix<f64>> {
    let k = params.len();
    let j = jacobian(model, params, areas);
    if j.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let jtj = j.transpose() * &j;

    let singular = jtj.clone().singular_values();
    let s_max = singular.max();
    let s_min = singular.min();
    if !(s_max > 0.0) || s_min <= MIN_RCOND * s_max {
        return None;
    }

    let inv = jtj.try_inverse()?;
    let diag_ok = (0..k).all(|i| inv[(i, i)] >= 0.0);
    (diag_ok && inv.iter().all(|v| v.is_finite())).then_some(inv)
}

/// Whether `params` is a locally identified optimum: every parameter is
/// finite and bounded by [`MAX_PARAM_MAGNITUDE`], and `JᵀJ` is invertible.
///
/// Runs that drift along a ridge (for example `d → ∞` with `z → 0` in a
/// saturating family) fail this check.
pub fn is_identified(model: &dyn ModelSpec, params: &[f64], areas: &[f64]) -> bool {
    params.iter().all(|p| p.is_finite() && p.abs() <= MAX_PARAM_MAGNITUDE)
        && information_inverse(model, params, areas).is_some()
}

/// Asymptotic covariance of the parameter estimates, or `None` when it is
/// undefined (`n <= k`, singular `JᵀJ`, non-finite entries).
pub fn covariance(model: &dyn ModelSpec, params: &[f64], data: &Observations, rss: f64) -> Option<DMatrix<f64>> {
    let sigma2 = residual_variance(rss, data.len(), params.len())?;
    Some(information_inverse(model, params, data.areas())? * sigma2)
}

/// Row-major copy of a square matrix.
pub fn to_row_major(m: &DMatrix<f64>) -> Vec<f64> {
    let mut out = Vec::with_capacity(m.nrows() * m.ncols());
    for r in 0..m.nrows() {
        for c in 0..m.ncols() {
            out.push(m[(r, c)]);
        }
    }
    out
}

/// Estimate, standard error, t, p and confidence interval per parameter.
pub fn coefficient_table(
    names: &[String],
    params: &[f64],
    cov: Option<&DMatrix<f64>>,
    df: usize,
    level: f64,
) -> Vec<Coefficient> {
    let df = df as f64;
    let quantile = cov.and_then(|_| student_t_two_sided_quantile(level, df));
    names
        .iter()
        .zip(params.iter())
        .enumerate()
        .map(|(i, (name, &estimate))| {
            let std_error = cov.map(|c| c[(i, i)].sqrt()).filter(|s| s.is_finite());
            let t_value = std_error.filter(|&s| s > 0.0).map(|s| estimate / s);
            let p_value = t_value.and_then(|t| student_t_two_sided_p(t, df));
            let half = std_error.zip(quantile).map(|(s, q)| q * s);
            Coefficient {
                name: name.clone(),
                estimate,
                std_error,
                t_value,
                p_value,
                ci_lower: half.map(|h| estimate - h),
                ci_upper: half.map(|h| estimate + h),
            }
        })
        .collect()
}

/// Delta-method variance `gᵀ Σ g` of the fitted value at `area`.
///
/// `cov` is row-major `k × k`.
pub fn prediction_variance(model: &dyn ModelSpec, params: &[f64], cov: &[f64], area: f64) -> Option<f64> {
    let k = params.len();
    if cov.len() != k * k {
        return None;
    }
    let g = gradient(model, params, area);
    let mut var = 0.0;
    for r in 0..k {
        for c in 0..k {
            var += g[r] * cov[r * k + c] * g[c];
        }
    }
    // Rounding can leave a tiny negative value for a positive semi-definite `cov`.
    var.is_finite().then(|| var.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::solve_least_squares;
    use crate::models::ModelKind;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    #[test]
    fn criteria_match_closed_forms() {
        let ic = information_criteria(12.5, 10, 3);
        let val = -10.0 * ((2.0 * std::f64::consts::PI).ln() + 1.0 - 10f64.ln() + 12.5f64.ln()) / 2.0;
        assert_relative_eq!(ic.log_likelihood.unwrap(), val, epsilon = 1e-12);
        assert_relative_eq!(ic.aic.unwrap(), 6.0 - 2.0 * val, epsilon = 1e-12);
        assert_relative_eq!(ic.aicc.unwrap(), -2.0 * val + 60.0 / 6.0, epsilon = 1e-12);
        assert_relative_eq!(ic.bic.unwrap(), -2.0 * val + 3.0 * 10f64.ln(), epsilon = 1e-12);
        assert!(ic.aicc.unwrap() >= ic.aic.unwrap());
    }

    #[test]
    fn criteria_undefined_cases() {
        let zero = information_criteria(0.0, 10, 3);
        assert!(zero.aic.is_none() && zero.aicc.is_none() && zero.bic.is_none());
        assert!(information_criteria(f64::NAN, 10, 3).aic.is_none());
        let small = information_criteria(1.0, 4, 3);
        assert!(small.aic.is_some());
        assert!(small.aicc.is_none());
    }

    #[test]
    fn r_squared_variants() {
        assert_relative_eq!(r_squared(2.0, 10.0).unwrap(), 0.8, epsilon = 1e-12);
        assert_relative_eq!(
            adjusted_r_squared(2.0, 10.0, 10, 3).unwrap(),
            1.0 - 18.0 / 70.0,
            epsilon = 1e-12
        );
        assert!(r_squared(1.0, 0.0).is_none());
        assert!(adjusted_r_squared(1.0, 5.0, 3, 3).is_none());
    }

    #[test]
    fn linear_covariance_matches_ols_formula() {
        let areas = vec![1.0, 2.0, 3.0, 5.0, 8.0, 13.0];
        let richness = vec![2.1, 2.9, 4.2, 5.8, 9.1, 13.8];
        let data = Observations::new(areas.clone(), richness.clone()).unwrap();
        let x = DMatrix::from_fn(areas.len(), 2, |i, j| if j == 0 { 1.0 } else { areas[i] });
        let beta = solve_least_squares(&x, &DVector::from_vec(richness)).unwrap();
        let params = vec![beta[0], beta[1]];
        let rss = ModelKind::Linear.residual_sum_of_squares(&params, &data);

        let cov = covariance(&ModelKind::Linear, &params, &data, rss).unwrap();
        let expected = (x.transpose() * &x).try_inverse().unwrap() * (rss / 4.0);
        for (a, b) in cov.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-6);
        }

        let names = vec!["c".to_string(), "m".to_string()];
        let table = coefficient_table(&names, &params, Some(&cov), 4, 0.95);
        let se = expected[(1, 1)].sqrt();
        assert_relative_eq!(table[1].std_error.unwrap(), se, max_relative = 1e-6);
        let q = student_t_two_sided_quantile(0.95, 4.0).unwrap();
        assert_relative_eq!(table[1].ci_upper.unwrap(), params[1] + q * se, max_relative = 1e-6);
        assert!(table[1].p_value.unwrap() < 0.01);
    }

    #[test]
    fn covariance_undefined_without_residual_degrees_of_freedom() {
        let data = Observations::new(vec![1.0, 2.0], vec![1.0, 3.0]).unwrap();
        assert!(covariance(&ModelKind::Linear, &[-1.0, 2.0], &data, 0.0).is_none());
        let table = coefficient_table(&["c".to_string()], &[1.0], None, 0, 0.95);
        assert!(table[0].std_error.is_none() && table[0].ci_lower.is_none());
    }

    #[test]
    fn delta_method_for_linear_prediction() {
        // Var(c + m A) = Var c + 2A Cov(c, m) + A² Var m
        let cov = [0.5, -0.1, -0.1, 0.04];
        let var = prediction_variance(&ModelKind::Linear, &[1.0, 2.0], &cov, 3.0).unwrap();
        assert_relative_eq!(var, 0.5 - 0.6 + 9.0 * 0.04, max_relative = 1e-6);
    }

    #[test]
    fn runaway_parameters_are_not_identified() {
        let areas = [1.0, 3.5, 8.0, 15.0, 27.0, 44.0, 90.0, 150.0, 310.0, 520.0, 800.0, 1200.0];
        // d -> infinity with z -> 0 leaves only the product d·z^c determined.
        assert!(!is_identified(&ModelKind::Chapman, &[5.5e7, 8.0e-17, 0.469], &areas));
        assert!(!is_identified(&ModelKind::Power, &[2.0e11, 0.3], &areas));
        assert!(is_identified(&ModelKind::Chapman, &[60.0, 0.01, 0.8], &areas));
        assert!(is_identified(&ModelKind::Negexpo, &[40.0, 0.02], &areas));
    }

    #[test]
    fn gradient_is_one_sided_at_a_bound() {
        let g = gradient(&ModelKind::Power, &[1e-10, 0.5], 4.0);
        assert_relative_eq!(g[0], 2.0, max_relative = 1e-4);
    }
}
