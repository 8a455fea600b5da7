//! Correlation-based homogeneity probe.
//!
//! Squared residuals are correlated with a comparison series (area or fitted
//! values). A significant association suggests the residual variance changes
//! along the curve.

use crate::diagnostics::{HomogeneityProbe, ProbeError, ProbeResult, outcome, validate_series};
use crate::domain::{CorrelationMethod, ProbeOutcome, TestReport};
use crate::math::{kendall_tau_b, kendall_z, normal_cdf, pearson, spearman, student_t_two_sided_p};

#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationProbe;

/// Two-sided p-value of a correlation coefficient via `t = r √((n-2)/(1-r²))`.
fn t_test_p(r: f64, n: usize) -> Option<f64> {
    let df = n as f64 - 2.0;
    let denom = 1.0 - r * r;
    if denom <= 0.0 {
        return Some(0.0);
    }
    student_t_two_sided_p(r * (df / denom).sqrt(), df)
}

/// Two-sided p-value of Kendall's tau under the tie-corrected normal approximation.
fn kendall_p(x: &[f64], y: &[f64]) -> Option<f64> {
    let z = kendall_z(x, y)?;
    Some((2.0 * (1.0 - normal_cdf(z.abs()))).clamp(0.0, 1.0))
}

pub fn correlation_test(x: &[f64], y: &[f64], method: CorrelationMethod) -> ProbeResult<TestReport> {
    validate_series(x, 3)?;
    validate_series(y, 3)?;
    if x.len() != y.len() {
        return Err(ProbeError::LengthMismatch {
            left: x.len(),
            right: y.len(),
        });
    }
    let n = x.len();
    let (estimate, p_value) = match method {
        CorrelationMethod::Pearson => {
            let r = pearson(x, y).ok_or(ProbeError::ZeroVariance)?;
            (r, t_test_p(r, n).ok_or(ProbeError::NonFiniteStatistic)?)
        }
        CorrelationMethod::Spearman => {
            let rho = spearman(x, y).ok_or(ProbeError::ZeroVariance)?;
            (rho, t_test_p(rho, n).ok_or(ProbeError::NonFiniteStatistic)?)
        }
        CorrelationMethod::Kendall => {
            let tau = kendall_tau_b(x, y).ok_or(ProbeError::ZeroVariance)?;
            (tau, kendall_p(x, y).ok_or(ProbeError::ZeroVariance)?)
        }
    };
    Ok(TestReport {
        test: format!("correlation ({method})"),
        statistic: estimate,
        p_value,
    })
}

impl HomogeneityProbe for CorrelationProbe {
    fn name(&self) -> &str {
        "correlation"
    }

    fn test(&self, squared_residuals: &[f64], comparison: &[f64], method: CorrelationMethod) -> ProbeOutcome {
        outcome(self.name(), correlation_test(squared_residuals, comparison, method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pearson_p_value_matches_t_distribution() {
        // r = 0.5 with n = 12 gives t = 0.5 √(10/0.75) and df = 10.
        let p = t_test_p(0.5, 12).unwrap();
        let t = 0.5 * (10.0f64 / 0.75).sqrt();
        assert_relative_eq!(p, student_t_two_sided_p(t, 10.0).unwrap(), epsilon = 1e-12);
        assert!(p > 0.05 && p < 0.2);
    }

    #[test]
    fn heteroscedastic_residuals_are_detected() {
        let x: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        let sq: Vec<f64> = x.iter().map(|v| v * v * 0.1 + (v * 1.7).sin().abs()).collect();
        for method in CorrelationMethod::ALL {
            let report = correlation_test(&sq, &x, *method).unwrap();
            assert!(report.statistic > 0.9, "{method}: {}", report.statistic);
            assert!(report.p_value < 1e-3, "{method}: {}", report.p_value);
        }
    }

    #[test]
    fn kendall_p_value_accounts_for_ties() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let y = [1.0, 1.0, 2.0, 3.0, 3.0, 3.0, 5.0, 4.0];
        let report = correlation_test(&y, &x, CorrelationMethod::Kendall).unwrap();
        let z = 22.0 / (1092.0_f64 / 18.0).sqrt();
        assert_relative_eq!(report.p_value, 2.0 * (1.0 - normal_cdf(z)), epsilon = 1e-12);

        let untied = 22.0 / (1176.0_f64 / 18.0).sqrt();
        assert!(report.p_value < 2.0 * (1.0 - normal_cdf(untied)));
    }

    #[test]
    fn constant_comparison_is_unavailable() {
        let probe = CorrelationProbe;
        let out = probe.test(&[1.0, 2.0, 3.0, 4.0], &[5.0; 4], CorrelationMethod::Pearson);
        assert!(out.is_unavailable());
        let out = probe.test(&[1.0, 2.0], &[1.0, 2.0], CorrelationMethod::Spearman);
        assert!(out.is_unavailable());
    }
}
