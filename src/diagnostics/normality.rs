//! Normality probes on residuals.
//!
//! - `shapiro`: Shapiro–Wilk W with Royston's (1992, 1995) coefficient and
//!   p-value approximations, valid for 3 ≤ n ≤ 5000.
//! - `kolmo`: one-sample Kolmogorov–Smirnov against N(mean, sd) with the
//!   asymptotic Kolmogorov distribution (Stephens' small-sample correction).
//! - `lillie`: the same D statistic with the Dallal–Wilkinson (1986)
//!   Lilliefors p-value, n ≥ 5.

use std::cmp::Ordering;
use std::f64::consts::PI;

use crate::diagnostics::{NormalityProbe, ProbeError, ProbeResult, outcome, validate_series};
use crate::domain::{ProbeOutcome, TestReport};
use crate::math::{mean, normal_cdf, normal_quantile, sample_sd};

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut x = values.to_vec();
    x.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    x
}

/// Evaluate `c[0] + c[1] x + c[2] x² + ...`.
fn poly(c: &[f64], x: f64) -> f64 {
    c.iter().rev().fold(0.0, |acc, &ci| acc * x + ci)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShapiroWilk;

const SW_MIN_N: usize = 3;
const SW_MAX_N: usize = 5000;

/// Antisymmetric Shapiro–Wilk coefficients for a sample of size `n`
/// (Σ a = 0, Σ a² = 1).
fn shapiro_coefficients(n: usize) -> Vec<f64> {
    const C1: [f64; 6] = [0.0, 0.221157, -0.147981, -2.071190, 4.434685, -2.706056];
    const C2: [f64; 6] = [0.0, 0.042981, -0.293762, -1.752461, 5.682633, -3.582633];

    let half = n / 2;
    let mut a = vec![0.0; n];
    if n == 3 {
        let v = 0.5f64.sqrt();
        a[0] = -v;
        a[2] = v;
        return a;
    }

    let nf = n as f64;
    // Expected normal order statistics for the lower half (negative).
    let m: Vec<f64> = (1..=half)
        .map(|i| normal_quantile((i as f64 - 0.375) / (nf + 0.25)))
        .collect();
    let summ2 = 2.0 * m.iter().map(|v| v * v).sum::<f64>();
    let ssumm2 = summ2.sqrt();
    let rsn = 1.0 / nf.sqrt();

    let mut upper = vec![0.0; half];
    let a1 = poly(&C1, rsn) - m[0] / ssumm2;
    let first_scaled;
    let fac;
    if n > 5 {
        let a2 = poly(&C2, rsn) - m[1] / ssumm2;
        fac = ((summ2 - 2.0 * m[0] * m[0] - 2.0 * m[1] * m[1])
            / (1.0 - 2.0 * a1 * a1 - 2.0 * a2 * a2))
            .sqrt();
        upper[1] = a2;
        first_scaled = 2;
    } else {
        fac = ((summ2 - 2.0 * m[0] * m[0]) / (1.0 - 2.0 * a1 * a1)).sqrt();
        first_scaled = 1;
    }
    upper[0] = a1;
    for i in first_scaled..half {
        upper[i] = -m[i] / fac;
    }

    // upper[i] belongs to the i-th largest order statistic.
    for (i, &coef) in upper.iter().enumerate() {
        a[n - 1 - i] = coef;
        a[i] = -coef;
    }
    a
}

/// Upper-tail p-value of W (small W rejects normality).
fn shapiro_p_value(w: f64, n: usize) -> f64 {
    if n == 3 {
        let p = 6.0 / PI * (w.sqrt().asin() - 0.75f64.sqrt().asin());
        return p.clamp(0.0, 1.0);
    }

    let nf = n as f64;
    let y = (1.0 - w).ln();
    let z = if n <= 11 {
        let gamma = poly(&[-2.273, 0.459], nf);
        if y >= gamma {
            return 1e-99;
        }
        let mu = poly(&[0.5440, -0.39978, 0.025054, -6.714e-4], nf);
        let sigma = poly(&[1.3822, -0.77857, 0.062767, -0.0020322], nf).exp();
        (-(gamma - y).ln() - mu) / sigma
    } else {
        let l = nf.ln();
        let mu = poly(&[-1.5861, -0.31082, -0.083751, 0.0038915], l);
        let sigma = poly(&[-0.4803, -0.082676, 0.0030302], l).exp();
        (y - mu) / sigma
    };
    1.0 - normal_cdf(z)
}

pub fn shapiro_wilk(residuals: &[f64]) -> ProbeResult<TestReport> {
    validate_series(residuals, SW_MIN_N)?;
    let n = residuals.len();
    if n > SW_MAX_N {
        return Err(ProbeError::TooManyValues { limit: SW_MAX_N, got: n });
    }
    let x = sorted(residuals);
    let xbar = mean(&x);
    let ss: f64 = x.iter().map(|v| (v - xbar) * (v - xbar)).sum();
    let range = x[n - 1] - x[0];
    if !(ss > 0.0) || range <= 1e-19 * xbar.abs().max(1.0) {
        return Err(ProbeError::ZeroVariance);
    }

    let a = shapiro_coefficients(n);
    let num: f64 = a.iter().zip(x.iter()).map(|(ai, xi)| ai * xi).sum();
    let w = (num * num / ss).min(1.0);
    Ok(TestReport {
        test: "shapiro".to_string(),
        statistic: w,
        p_value: shapiro_p_value(w, n).clamp(0.0, 1.0),
    })
}

impl NormalityProbe for ShapiroWilk {
    fn name(&self) -> &str {
        "shapiro"
    }

    fn test(&self, residuals: &[f64]) -> ProbeOutcome {
        outcome(self.name(), shapiro_wilk(residuals))
    }
}

/// `D = sup |F_n(x) - Φ((x - mean)/sd)|`.
fn ks_statistic(residuals: &[f64]) -> ProbeResult<f64> {
    let x = sorted(residuals);
    let n = x.len() as f64;
    let m = mean(&x);
    let sd = sample_sd(&x).ok_or(ProbeError::TooFewValues { needed: 2, got: x.len() })?;
    if !(sd > 0.0) {
        return Err(ProbeError::ZeroVariance);
    }
    let mut d = 0.0_f64;
    for (i, &xi) in x.iter().enumerate() {
        let p = normal_cdf((xi - m) / sd);
        let above = (i as f64 + 1.0) / n - p;
        let below = p - i as f64 / n;
        d = d.max(above).max(below);
    }
    if d.is_finite() { Ok(d) } else { Err(ProbeError::NonFiniteStatistic) }
}

/// `P(K > λ) = 2 Σ (-1)^(k-1) exp(-2 k² λ²)`.
fn kolmogorov_upper_tail(lambda: f64) -> f64 {
    if lambda < 0.2 {
        return 1.0;
    }
    let mut sum = 0.0;
    for k in 1..=100 {
        let kf = k as f64;
        let term = (-2.0 * kf * kf * lambda * lambda).exp();
        sum += if k % 2 == 1 { term } else { -term };
        if term < 1e-16 {
            break;
        }
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KolmogorovSmirnov;

pub fn kolmogorov_smirnov(residuals: &[f64]) -> ProbeResult<TestReport> {
    validate_series(residuals, 3)?;
    let d = ks_statistic(residuals)?;
    let sqrt_n = (residuals.len() as f64).sqrt();
    let lambda = (sqrt_n + 0.12 + 0.11 / sqrt_n) * d;
    Ok(TestReport {
        test: "kolmo".to_string(),
        statistic: d,
        p_value: kolmogorov_upper_tail(lambda),
    })
}

impl NormalityProbe for KolmogorovSmirnov {
    fn name(&self) -> &str {
        "kolmo"
    }

    fn test(&self, residuals: &[f64]) -> ProbeOutcome {
        outcome(self.name(), kolmogorov_smirnov(residuals))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Lilliefors;

fn lilliefors_p_value(d: f64, n: usize) -> f64 {
    let nf = n as f64;
    let (kd, nd) = if n <= 100 {
        (d, nf)
    } else {
        (d * (nf / 100.0).powf(0.49), 100.0)
    };
    let p = (-7.01256 * kd * kd * (nd + 2.78019) + 2.99587 * kd * (nd + 2.78019).sqrt() - 0.122119
        + 0.974598 / nd.sqrt()
        + 1.67997 / nd)
        .exp();
    if p <= 0.1 {
        return p;
    }

    let kk = (nf.sqrt() - 0.01 + 0.85 / nf.sqrt()) * d;
    if kk <= 0.302 {
        1.0
    } else if kk <= 0.5 {
        poly(&[2.76773, -19.828315, 80.709644, -138.55152, 81.218052], kk)
    } else if kk <= 0.9 {
        poly(&[-4.901232, 40.662806, -97.490286, 94.029866, -32.355711], kk)
    } else if kk <= 1.31 {
        poly(&[6.198765, -19.558097, 23.186922, -12.234627, 2.423045], kk)
    } else {
        0.0
    }
}

pub fn lilliefors(residuals: &[f64]) -> ProbeResult<TestReport> {
    validate_series(residuals, 5)?;
    let d = ks_statistic(residuals)?;
    Ok(TestReport {
        test: "lillie".to_string(),
        statistic: d,
        p_value: lilliefors_p_value(d, residuals.len()).clamp(0.0, 1.0),
    })
}

impl NormalityProbe for Lilliefors {
    fn name(&self) -> &str {
        "lillie"
    }

    fn test(&self, residuals: &[f64]) -> ProbeOutcome {
        outcome(self.name(), lilliefors(residuals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Normal scores: close to a perfect normal sample.
    fn normal_scores(n: usize) -> Vec<f64> {
        (1..=n)
            .map(|i| normal_quantile((i as f64 - 0.375) / (n as f64 + 0.25)))
            .collect()
    }

    fn skewed(n: usize) -> Vec<f64> {
        (1..=n).map(|i| (i as f64 / 3.0).exp()).collect()
    }

    #[test]
    fn coefficients_are_normalised() {
        for n in [3, 4, 5, 6, 11, 12, 50, 501] {
            let a = shapiro_coefficients(n);
            assert_relative_eq!(a.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
            assert_relative_eq!(a.iter().map(|v| v * v).sum::<f64>(), 1.0, epsilon = 1e-9);
            assert!(a[n - 1] > 0.0);
        }
    }

    #[test]
    fn shapiro_small_sample_reference() {
        // Classic n = 3 case: W and p are exact.
        let report = shapiro_wilk(&[1.0, 2.0, 4.0]).unwrap();
        assert_relative_eq!(report.statistic, 0.9642857, epsilon = 1e-6);
        assert_relative_eq!(report.p_value, 0.6368868, epsilon = 1e-5);
    }

    const HEIGHTS: [f64; 11] = [
        148.0, 154.0, 158.0, 160.0, 161.0, 162.0, 166.0, 170.0, 182.0, 195.0, 236.0,
    ];

    #[test]
    fn shapiro_matches_reference_heights() {
        let report = shapiro_wilk(&HEIGHTS).unwrap();
        assert_relative_eq!(report.statistic, 0.78881, epsilon = 1e-5);
        assert_relative_eq!(report.p_value, 0.006704, epsilon = 1e-5);
    }

    #[test]
    fn lilliefors_matches_reference_heights() {
        let report = lilliefors(&HEIGHTS).unwrap();
        assert_relative_eq!(report.statistic, 0.259215, epsilon = 1e-5);
        assert_relative_eq!(report.p_value, 0.037408, epsilon = 1e-5);
    }

    #[test]
    fn shapiro_separates_normal_from_skewed() {
        let normal = shapiro_wilk(&normal_scores(30)).unwrap();
        let skew = shapiro_wilk(&skewed(30)).unwrap();
        assert!(normal.statistic > 0.98);
        assert!(normal.p_value > 0.5);
        assert!(skew.p_value < 0.01);
        for n in [4, 8, 11] {
            let r = shapiro_wilk(&normal_scores(n)).unwrap();
            assert!(r.p_value > 0.2 && r.p_value <= 1.0, "n={n}: {}", r.p_value);
        }
    }

    #[test]
    fn shapiro_rejects_degenerate_input() {
        assert_eq!(shapiro_wilk(&[1.0, 2.0]), Err(ProbeError::TooFewValues { needed: 3, got: 2 }));
        assert_eq!(shapiro_wilk(&[2.0, 2.0, 2.0]), Err(ProbeError::ZeroVariance));
        assert_eq!(shapiro_wilk(&[1.0, f64::NAN, 2.0]), Err(ProbeError::NonFinite));
    }

    #[test]
    fn kolmogorov_tail_is_a_probability() {
        assert_eq!(kolmogorov_upper_tail(0.1), 1.0);
        assert_relative_eq!(kolmogorov_upper_tail(1.358), 0.05, epsilon = 1e-3);
        assert!(kolmogorov_upper_tail(3.0) < 1e-6);
    }

    #[test]
    fn lilliefors_and_ks_agree_on_direction() {
        let normal = normal_scores(40);
        let skew = skewed(40);
        let l_norm = lilliefors(&normal).unwrap();
        let l_skew = lilliefors(&skew).unwrap();
        assert!(l_norm.p_value > l_skew.p_value);
        assert!(l_skew.p_value < 0.05);
        assert!(kolmogorov_smirnov(&normal).unwrap().p_value > 0.5);
        assert_eq!(lilliefors(&normal[..4]), Err(ProbeError::TooFewValues { needed: 5, got: 4 }));
    }
}
