//! Fitting configuration.
//!
//! Every enum option has a string form (`FromStr` / `as_str`) matching the
//! recognised option values; anything else is a configuration error raised at
//! call time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SarError};

/// Residual normality probe (`normaTest`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalityTest {
    #[default]
    None,
    /// Shapiro–Wilk.
    Shapiro,
    /// One-sample Kolmogorov–Smirnov against a fitted normal.
    Kolmo,
    /// Lilliefors-corrected Kolmogorov–Smirnov.
    Lillie,
}

/// Residual homogeneity probe (`homoTest`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HomogeneityTest {
    #[default]
    #[serde(rename = "none")]
    None,
    /// Correlate squared residuals with area.
    #[serde(rename = "cor.area")]
    CorArea,
    /// Correlate squared residuals with fitted values.
    #[serde(rename = "cor.fitted")]
    CorFitted,
}

/// Correlation method used by the homogeneity probe (`homoCor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    #[default]
    Spearman,
    Pearson,
    Kendall,
}

/// Starting-point strategy (`gridStart`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridStart {
    /// Heuristic starting vector(s) only.
    None,
    #[default]
    Grid,
}

macro_rules! string_enum {
    ($ty:ident, $option:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = SarError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(SarError::config(
                        $option,
                        other,
                        format!("expected one of {}", [$($text),+].join(", ")),
                    )),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(NormalityTest, "normaTest", {
    None => "none",
    Shapiro => "shapiro",
    Kolmo => "kolmo",
    Lillie => "lillie",
});

string_enum!(HomogeneityTest, "homoTest", {
    None => "none",
    CorArea => "cor.area",
    CorFitted => "cor.fitted",
});

string_enum!(CorrelationMethod, "homoCor", {
    Spearman => "spearman",
    Pearson => "pearson",
    Kendall => "kendall",
});

string_enum!(GridStart, "gridStart", {
    None => "none",
    Grid => "grid",
});

/// Budget and tolerances for a single optimizer run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimOptions {
    /// Iteration cap per run. A run that hits it has not converged.
    pub max_iters: u64,
    /// Simplex cost standard deviation at which a run counts as converged,
    /// relative to `max(TSS, 1)`.
    pub sd_tolerance: f64,
    /// Initial simplex edge in the unconstrained parameterisation,
    /// relative to `max(|u|, 1)`.
    pub initial_step: f64,
    /// Restart once from the optimum of a converged run.
    pub polish: bool,
}

impl Default for OptimOptions {
    fn default() -> Self {
        Self {
            max_iters: 2_000,
            sd_tolerance: 1e-12,
            initial_step: 0.1,
            polish: true,
        }
    }
}

/// Full configuration of a fit, shared by every model in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    pub normality: NormalityTest,
    pub homogeneity: HomogeneityTest,
    /// Only consulted when `homogeneity != None`.
    pub homogeneity_cor: CorrelationMethod,
    pub grid_start: GridStart,
    /// Spread values per parameter in grid mode (the heuristic value and a
    /// tiny-magnitude candidate are always added).
    pub grid_n: usize,
    /// Optional cap on grid starts; excess starts are subsampled with `seed`.
    pub max_starts: Option<usize>,
    pub seed: u64,
    /// Emit and record advisory warnings.
    pub verbose: bool,
    pub optim: OptimOptions,
    /// Level of coefficient confidence intervals.
    pub confidence_level: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            normality: NormalityTest::None,
            homogeneity: HomogeneityTest::None,
            homogeneity_cor: CorrelationMethod::Spearman,
            grid_start: GridStart::Grid,
            grid_n: 4,
            max_starts: None,
            seed: 0,
            verbose: true,
            optim: OptimOptions::default(),
            confidence_level: 0.95,
        }
    }
}

impl FitConfig {
    /// Set an option from its string surface (`normaTest`, `homoTest`, `homoCor`,
    /// `gridStart`, `gridN`, `verbose`).
    ///
    /// On error `self` is left unchanged.
    pub fn apply_option(&mut self, key: &str, value: &str) -> Result<()> {
        let mut next = self.clone();
        next.set_option(key, value)?;
        next.validate()?;
        *self = next;
        Ok(())
    }

    fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "normaTest" => self.normality = value.parse()?,
            "homoTest" => self.homogeneity = value.parse()?,
            "homoCor" => self.homogeneity_cor = value.parse()?,
            "gridStart" => self.grid_start = value.parse()?,
            "gridN" => {
                self.grid_n = value
                    .parse()
                    .map_err(|_| SarError::config("gridN", value, "expected a positive integer"))?;
            }
            "verbose" => {
                self.verbose = match value {
                    "true" | "TRUE" => true,
                    "false" | "FALSE" => false,
                    other => {
                        return Err(SarError::config("verbose", other, "expected true or false"));
                    }
                };
            }
            other => {
                return Err(SarError::config(
                    other,
                    value,
                    "unrecognised option (expected normaTest, homoTest, homoCor, gridStart, gridN or verbose)",
                ));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid_n == 0 {
            return Err(SarError::config("gridN", "0", "must be a positive integer"));
        }
        if self.max_starts == Some(0) {
            return Err(SarError::config("max_starts", "0", "must be positive when set"));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(SarError::config(
                "confidence_level",
                self.confidence_level.to_string(),
                "must lie in (0, 1)",
            ));
        }
        let o = &self.optim;
        if o.max_iters == 0 {
            return Err(SarError::config("optim.max_iters", "0", "must be positive"));
        }
        if !(o.sd_tolerance.is_finite() && o.sd_tolerance > 0.0) {
            return Err(SarError::config(
                "optim.sd_tolerance",
                o.sd_tolerance.to_string(),
                "must be finite and > 0",
            ));
        }
        if !(o.initial_step.is_finite() && o.initial_step > 0.0) {
            return Err(SarError::config(
                "optim.initial_step",
                o.initial_step.to_string(),
                "must be finite and > 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognised_values_round_trip_through_strings() {
        for t in NormalityTest::ALL {
            assert_eq!(t.as_str().parse::<NormalityTest>().unwrap(), *t);
        }
        for t in HomogeneityTest::ALL {
            assert_eq!(t.as_str().parse::<HomogeneityTest>().unwrap(), *t);
        }
        assert_eq!("kendall".parse::<CorrelationMethod>().unwrap(), CorrelationMethod::Kendall);
        assert_eq!("none".parse::<GridStart>().unwrap(), GridStart::None);
    }

    #[test]
    fn unknown_values_are_config_errors() {
        let err = "anderson".parse::<NormalityTest>().unwrap_err();
        assert!(matches!(err, SarError::Config { ref option, .. } if option == "normaTest"));
        assert!("cor.resid".parse::<HomogeneityTest>().is_err());
        assert!("Spearman".parse::<CorrelationMethod>().is_err());
        assert!("partial".parse::<GridStart>().is_err());
    }

    #[test]
    fn apply_option_sets_and_validates() {
        let mut config = FitConfig::default();
        config.apply_option("normaTest", "lillie").unwrap();
        config.apply_option("homoTest", "cor.fitted").unwrap();
        config.apply_option("gridN", "7").unwrap();
        config.apply_option("verbose", "false").unwrap();
        assert_eq!(config.normality, NormalityTest::Lillie);
        assert_eq!(config.homogeneity, HomogeneityTest::CorFitted);
        assert_eq!(config.grid_n, 7);
        assert!(!config.verbose);

        assert!(config.apply_option("gridN", "0").is_err());
        assert!(config.apply_option("gridN", "many").is_err());
        assert!(config.apply_option("normTest", "shapiro").is_err());
    }

    #[test]
    fn rejected_option_leaves_config_unchanged() {
        let mut config = FitConfig::default();
        config.apply_option("gridN", "4").unwrap();
        let before = config.clone();

        assert!(config.apply_option("gridN", "0").is_err());
        assert!(config.apply_option("verbose", "maybe").is_err());
        assert!(config.apply_option("homoCor", "partial").is_err());
        assert_eq!(config, before);

        config.apply_option("verbose", "true").unwrap();
        assert_eq!(config.grid_n, 4);
        assert!(config.verbose);
    }

    #[test]
    fn serde_uses_option_spelling() {
        let json = serde_json::to_string(&HomogeneityTest::CorArea).unwrap();
        assert_eq!(json, "\"cor.area\"");
    }
}
