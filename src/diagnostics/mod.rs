//! Residual diagnostics.
//!
//! Two optional probes run after a model is fitted:
//!
//! - a normality probe on the residuals (`normaTest`)
//! - a homogeneity probe correlating squared residuals with area or fitted
//!   values (`homoTest`, `homoCor`)
//!
//! Probes never fail a fit. Anything that prevents a statistic from being
//! computed is reported as [`ProbeOutcome::Unavailable`].

pub mod homogeneity;
pub mod normality;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::domain::{CorrelationMethod, FitConfig, HomogeneityTest, NormalityTest, ProbeOutcome, TestReport};

pub use homogeneity::CorrelationProbe;
pub use normality::{KolmogorovSmirnov, Lilliefors, ShapiroWilk};

/// Why a probe could not produce a statistic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbeError {
    #[error("needs at least {needed} values, got {got}")]
    TooFewValues { needed: usize, got: usize },
    #[error("needs at most {limit} values, got {got}")]
    TooManyValues { limit: usize, got: usize },
    #[error("series lengths differ ({left} vs {right})")]
    LengthMismatch { left: usize, right: usize },
    #[error("input contains non-finite values")]
    NonFinite,
    #[error("input has zero variance")]
    ZeroVariance,
    #[error("statistic is not finite")]
    NonFiniteStatistic,
}

pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

/// Shared input guard for probe series.
pub(crate) fn validate_series(values: &[f64], needed: usize) -> ProbeResult<()> {
    if values.len() < needed {
        return Err(ProbeError::TooFewValues {
            needed,
            got: values.len(),
        });
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ProbeError::NonFinite);
    }
    Ok(())
}

pub(crate) fn outcome(test: &str, result: ProbeResult<TestReport>) -> ProbeOutcome {
    match result {
        Ok(report) if report.statistic.is_finite() && report.p_value.is_finite() => {
            ProbeOutcome::Computed(report)
        }
        Ok(_) => ProbeOutcome::Unavailable {
            test: test.to_string(),
            reason: ProbeError::NonFiniteStatistic.to_string(),
        },
        Err(e) => ProbeOutcome::Unavailable {
            test: test.to_string(),
            reason: e.to_string(),
        },
    }
}

/// Test of residual normality.
pub trait NormalityProbe: Send + Sync {
    fn name(&self) -> &str;
    fn test(&self, residuals: &[f64]) -> ProbeOutcome;
}

/// Test of residual homogeneity: association between squared residuals and a
/// comparison series.
pub trait HomogeneityProbe: Send + Sync {
    fn name(&self) -> &str;
    fn test(&self, squared_residuals: &[f64], comparison: &[f64], method: CorrelationMethod) -> ProbeOutcome;
}

/// Routes residuals of a fit to the configured probes.
#[derive(Clone, Default)]
pub struct Diagnostics {
    normality: Option<Arc<dyn NormalityProbe>>,
    homogeneity: Option<(HomogeneityTest, Arc<dyn HomogeneityProbe>)>,
    method: CorrelationMethod,
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("normality", &self.normality.as_ref().map(|p| p.name().to_string()))
            .field(
                "homogeneity",
                &self
                    .homogeneity
                    .as_ref()
                    .map(|(against, p)| format!("{} ({against})", p.name())),
            )
            .field("method", &self.method)
            .finish()
    }
}

impl Diagnostics {
    /// No probes.
    pub fn none() -> Self {
        Self::default()
    }

    /// Built-in probes selected by `normaTest`, `homoTest` and `homoCor`.
    pub fn from_config(config: &FitConfig) -> Self {
        let normality: Option<Arc<dyn NormalityProbe>> = match config.normality {
            NormalityTest::None => None,
            NormalityTest::Shapiro => Some(Arc::new(ShapiroWilk)),
            NormalityTest::Kolmo => Some(Arc::new(KolmogorovSmirnov)),
            NormalityTest::Lillie => Some(Arc::new(Lilliefors)),
        };
        let homogeneity = match config.homogeneity {
            HomogeneityTest::None => None,
            against => Some((against, Arc::new(CorrelationProbe) as Arc<dyn HomogeneityProbe>)),
        };
        Self {
            normality,
            homogeneity,
            method: config.homogeneity_cor,
        }
    }

    pub fn with_normality(mut self, probe: Arc<dyn NormalityProbe>) -> Self {
        self.normality = Some(probe);
        self
    }

    /// `against` selects the comparison series; `HomogeneityTest::None` disables the probe.
    pub fn with_homogeneity(mut self, against: HomogeneityTest, probe: Arc<dyn HomogeneityProbe>) -> Self {
        self.homogeneity = match against {
            HomogeneityTest::None => None,
            _ => Some((against, probe)),
        };
        self
    }

    pub fn with_method(mut self, method: CorrelationMethod) -> Self {
        self.method = method;
        self
    }

    /// `(normality, homogeneity)` outcomes for one fit.
    pub fn run(&self, residuals: &[f64], areas: &[f64], fitted: &[f64]) -> (ProbeOutcome, ProbeOutcome) {
        let normality = match &self.normality {
            Some(probe) => probe.test(residuals),
            None => ProbeOutcome::NotRun,
        };

        let homogeneity = match &self.homogeneity {
            Some((against, probe)) => {
                let squared: Vec<f64> = residuals.iter().map(|r| r * r).collect();
                let comparison = match against {
                    HomogeneityTest::CorFitted => fitted,
                    _ => areas,
                };
                probe.test(&squared, comparison, self.method)
            }
            None => ProbeOutcome::NotRun,
        };

        (normality, homogeneity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysNormal;

    impl NormalityProbe for AlwaysNormal {
        fn name(&self) -> &str {
            "always"
        }
        fn test(&self, residuals: &[f64]) -> ProbeOutcome {
            ProbeOutcome::Computed(TestReport {
                test: self.name().to_string(),
                statistic: residuals.len() as f64,
                p_value: 1.0,
            })
        }
    }

    fn residuals() -> Vec<f64> {
        vec![0.3, -0.6, 1.2, -0.1, 0.05, -0.9, 0.4, 0.7, -1.1, 0.2, -0.25, 0.6]
    }

    #[test]
    fn disabled_probes_are_not_run() {
        let r = residuals();
        let (norm, homo) = Diagnostics::none().run(&r, &r, &r);
        assert_eq!(norm, ProbeOutcome::NotRun);
        assert_eq!(homo, ProbeOutcome::NotRun);
    }

    #[test]
    fn config_selects_built_in_probes() {
        let config = FitConfig {
            normality: NormalityTest::Shapiro,
            homogeneity: HomogeneityTest::CorArea,
            homogeneity_cor: CorrelationMethod::Kendall,
            ..FitConfig::default()
        };
        let r = residuals();
        let areas: Vec<f64> = (1..=r.len()).map(|i| i as f64).collect();
        let (norm, homo) = Diagnostics::from_config(&config).run(&r, &areas, &areas);
        let norm = norm.report().unwrap();
        assert_eq!(norm.test, "shapiro");
        assert!(norm.p_value > 0.0 && norm.p_value <= 1.0);
        assert!(homo.report().unwrap().test.contains("kendall"));
    }

    #[test]
    fn custom_probe_is_used() {
        let r = residuals();
        let diagnostics = Diagnostics::none().with_normality(Arc::new(AlwaysNormal));
        let (norm, _) = diagnostics.run(&r, &r, &r);
        assert_eq!(norm.report().unwrap().statistic, r.len() as f64);
    }

    #[test]
    fn failures_degrade_to_unavailable() {
        let config = FitConfig {
            normality: NormalityTest::Lillie,
            homogeneity: HomogeneityTest::CorFitted,
            ..FitConfig::default()
        };
        let r = [0.1, -0.1];
        let (norm, homo) = Diagnostics::from_config(&config).run(&r, &[1.0, 2.0], &[3.0, 3.0]);
        assert!(norm.is_unavailable());
        assert!(homo.is_unavailable());
    }
}
