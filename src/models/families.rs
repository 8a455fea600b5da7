//! Built-in SAR curve families.
//!
//! Each variant of [`ModelKind`] is one family. Evaluation is a single match so
//! the formulas can be read side by side.

use serde::Serialize;

use crate::domain::Observations;
use crate::math::simple_regression;
use crate::models::guess;
use crate::models::{ModelSpec, ParamBound};

use ParamBound::{Free as R, NonNegative as P, UnitInterval as U};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Linear,
    Power,
    #[serde(rename = "powerR")]
    PowerR,
    Epm1,
    Epm2,
    P1,
    P2,
    Loga,
    Koba,
    Monod,
    Negexpo,
    Chapman,
    Weibull3,
    Asymp,
    Ratio,
    Gompertz,
    Weibull4,
    Betap,
    Heleg,
    Mmf,
    Logistic,
}

impl ModelKind {
    /// Every built-in family in registry order.
    pub const ALL: [ModelKind; 21] = [
        ModelKind::Linear,
        ModelKind::Power,
        ModelKind::PowerR,
        ModelKind::Epm1,
        ModelKind::Epm2,
        ModelKind::P1,
        ModelKind::P2,
        ModelKind::Loga,
        ModelKind::Koba,
        ModelKind::Monod,
        ModelKind::Negexpo,
        ModelKind::Chapman,
        ModelKind::Weibull3,
        ModelKind::Asymp,
        ModelKind::Ratio,
        ModelKind::Gompertz,
        ModelKind::Weibull4,
        ModelKind::Betap,
        ModelKind::Heleg,
        ModelKind::Mmf,
        ModelKind::Logistic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Linear => "linear",
            ModelKind::Power => "power",
            ModelKind::PowerR => "powerR",
            ModelKind::Epm1 => "epm1",
            ModelKind::Epm2 => "epm2",
            ModelKind::P1 => "p1",
            ModelKind::P2 => "p2",
            ModelKind::Loga => "loga",
            ModelKind::Koba => "koba",
            ModelKind::Monod => "monod",
            ModelKind::Negexpo => "negexpo",
            ModelKind::Chapman => "chapman",
            ModelKind::Weibull3 => "weibull3",
            ModelKind::Asymp => "asymp",
            ModelKind::Ratio => "ratio",
            ModelKind::Gompertz => "gompertz",
            ModelKind::Weibull4 => "weibull4",
            ModelKind::Betap => "betap",
            ModelKind::Heleg => "heleg",
            ModelKind::Mmf => "mmf",
            ModelKind::Logistic => "logistic",
        }
    }

    /// Human-readable label for summaries.
    pub fn label(self) -> &'static str {
        match self {
            ModelKind::Linear => "Linear model",
            ModelKind::Power => "Power",
            ModelKind::PowerR => "PowerR",
            ModelKind::Epm1 => "Extended Power model 1",
            ModelKind::Epm2 => "Extended Power model 2",
            ModelKind::P1 => "Persistence function 1",
            ModelKind::P2 => "Persistence function 2",
            ModelKind::Loga => "Logarithmic",
            ModelKind::Koba => "Kobayashi",
            ModelKind::Monod => "Monod",
            ModelKind::Negexpo => "Negative exponential",
            ModelKind::Chapman => "Chapman Richards",
            ModelKind::Weibull3 => "Cumulative Weibull 3 par.",
            ModelKind::Asymp => "Asymptotic regression",
            ModelKind::Ratio => "Rational function",
            ModelKind::Gompertz => "Gompertz",
            ModelKind::Weibull4 => "Cumulative Weibull 4 par.",
            ModelKind::Betap => "Beta-P cumulative",
            ModelKind::Heleg => "Heleg(Logistic)",
            ModelKind::Mmf => "MMF",
            ModelKind::Logistic => "Logistic(Standard)",
        }
    }
}

impl ModelSpec for ModelKind {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn display_name(&self) -> &str {
        self.label()
    }

    fn formula(&self) -> &str {
        match self {
            ModelKind::Linear => "S = c + m*A",
            ModelKind::Power => "S = c*A^z",
            ModelKind::PowerR => "S = f + c*A^z",
            ModelKind::Epm1 => "S = c*A^(z*A^-d)",
            ModelKind::Epm2 => "S = c*A^(z-(d/A))",
            ModelKind::P1 => "S = c*A^z*exp(-d*A)",
            ModelKind::P2 => "S = c*A^z*exp(-d/A)",
            ModelKind::Loga => "S = c + z*log(A)",
            ModelKind::Koba => "S = c*log(1 + A/z)",
            ModelKind::Monod => "S = d/(1 + c*A^(-1))",
            ModelKind::Negexpo => "S = d*(1 - exp(-z*A))",
            ModelKind::Chapman => "S = d*(1 - exp(-z*A))^c",
            ModelKind::Weibull3 => "S = d*(1 - exp(-c*A^z))",
            ModelKind::Asymp => "S = d - c*z^A",
            ModelKind::Ratio => "S = (c + z*A)/(1 + d*A)",
            ModelKind::Gompertz => "S = d*exp(-exp(-z*(A - c)))",
            ModelKind::Weibull4 => "S = d*(1 - exp(-c*A^z))^f",
            ModelKind::Betap => "S = d*(1 - (1 + (A/c)^z)^-f)",
            ModelKind::Heleg => "S = c/(f + A^(-z))",
            ModelKind::Mmf => "S = d/(1 + c*A^(-z))",
            ModelKind::Logistic => "S = d/(1 + exp(-z*A + f))",
        }
    }

    fn param_names(&self) -> &[&str] {
        match self {
            ModelKind::Linear => &["c", "m"],
            ModelKind::Power | ModelKind::Koba => &["c", "z"],
            ModelKind::Loga => &["c", "z"],
            ModelKind::PowerR => &["f", "c", "z"],
            ModelKind::Epm1 | ModelKind::Epm2 | ModelKind::P1 | ModelKind::P2 => &["c", "z", "d"],
            ModelKind::Monod => &["d", "c"],
            ModelKind::Negexpo => &["d", "z"],
            ModelKind::Chapman => &["d", "z", "c"],
            ModelKind::Weibull3 | ModelKind::Mmf => &["d", "c", "z"],
            ModelKind::Asymp => &["d", "c", "z"],
            ModelKind::Ratio => &["c", "z", "d"],
            ModelKind::Gompertz => &["d", "z", "c"],
            ModelKind::Weibull4 | ModelKind::Betap => &["d", "c", "z", "f"],
            ModelKind::Heleg => &["c", "f", "z"],
            ModelKind::Logistic => &["d", "z", "f"],
        }
    }

    fn bounds(&self) -> &[ParamBound] {
        match self {
            ModelKind::Linear | ModelKind::Loga => &[R, R],
            ModelKind::Power | ModelKind::Koba | ModelKind::Monod | ModelKind::Negexpo => &[P, P],
            ModelKind::PowerR => &[R, P, P],
            ModelKind::Epm1 | ModelKind::Epm2 | ModelKind::P1 | ModelKind::P2 => &[P, P, R],
            ModelKind::Chapman | ModelKind::Weibull3 | ModelKind::Heleg | ModelKind::Mmf => {
                &[P, P, P]
            }
            ModelKind::Asymp => &[P, R, U],
            ModelKind::Ratio => &[R, P, P],
            ModelKind::Gompertz => &[P, P, R],
            ModelKind::Weibull4 | ModelKind::Betap => &[P, P, P, P],
            ModelKind::Logistic => &[P, P, R],
        }
    }

    fn evaluate(&self, p: &[f64], a: f64) -> f64 {
        match self {
            ModelKind::Linear => p[0] + p[1] * a,
            ModelKind::Power => p[0] * a.powf(p[1]),
            ModelKind::PowerR => p[0] + p[1] * a.powf(p[2]),
            ModelKind::Epm1 => p[0] * a.powf(p[1] * a.powf(-p[2])),
            ModelKind::Epm2 => p[0] * a.powf(p[1] - p[2] / a),
            ModelKind::P1 => p[0] * a.powf(p[1]) * (-p[2] * a).exp(),
            ModelKind::P2 => p[0] * a.powf(p[1]) * (-p[2] / a).exp(),
            ModelKind::Loga => p[0] + p[1] * a.ln(),
            ModelKind::Koba => p[0] * (1.0 + a / p[1]).ln(),
            ModelKind::Monod => p[0] / (1.0 + p[1] / a),
            ModelKind::Negexpo => p[0] * (1.0 - (-p[1] * a).exp()),
            ModelKind::Chapman => p[0] * (1.0 - (-p[1] * a).exp()).powf(p[2]),
            ModelKind::Weibull3 => p[0] * (1.0 - (-p[1] * a.powf(p[2])).exp()),
            ModelKind::Asymp => p[0] - p[1] * p[2].powf(a),
            ModelKind::Ratio => (p[0] + p[1] * a) / (1.0 + p[2] * a),
            ModelKind::Gompertz => p[0] * (-(-p[1] * (a - p[2])).exp()).exp(),
            ModelKind::Weibull4 => p[0] * (1.0 - (-p[1] * a.powf(p[2])).exp()).powf(p[3]),
            ModelKind::Betap => p[0] * (1.0 - (1.0 + (a / p[1]).powf(p[2])).powf(-p[3])),
            ModelKind::Heleg => p[0] / (p[1] + a.powf(-p[2])),
            ModelKind::Mmf => p[0] / (1.0 + p[1] * a.powf(-p[2])),
            ModelKind::Logistic => p[0] / (1.0 + (-p[1] * a + p[2]).exp()),
        }
    }

    fn initial_guesses(&self, data: &Observations) -> Vec<Vec<f64>> {
        let d = guess::saturation_level(data);
        let raw = match self {
            ModelKind::Linear => {
                let (c, m) = guess::linear(data);
                vec![c, m]
            }
            ModelKind::Power => {
                let (c, z) = guess::power(data);
                vec![c, z]
            }
            ModelKind::PowerR => {
                let (c, z) = guess::power(data);
                vec![0.0, c, z]
            }
            ModelKind::Epm1 | ModelKind::Epm2 | ModelKind::P1 | ModelKind::P2 => {
                let (c, z) = guess::power(data);
                vec![c, z, 0.0]
            }
            ModelKind::Loga => {
                let (c, z) = guess::logarithmic(data);
                vec![c, z]
            }
            ModelKind::Koba => {
                let (c, z) = guess::kobayashi(data);
                vec![c, z]
            }
            ModelKind::Monod => vec![d, guess::monod(data, d)],
            ModelKind::Negexpo => vec![d, guess::negative_exponential(data, d)],
            ModelKind::Chapman => vec![d, guess::negative_exponential(data, d), 1.0],
            ModelKind::Weibull3 => {
                let (c, z) = guess::weibull(data, d);
                vec![d, c, z]
            }
            ModelKind::Asymp => {
                let (c, z) = guess::asymptotic_regression(data, d);
                vec![d, c, z]
            }
            ModelKind::Ratio => {
                let (c, z, dd) = guess::rational(data);
                vec![c, z, dd]
            }
            ModelKind::Gompertz => {
                let (z, c) = guess::gompertz(data, d);
                vec![d, z, c]
            }
            ModelKind::Weibull4 => {
                let (c, z) = guess::weibull(data, d);
                vec![d, c, z, 1.0]
            }
            ModelKind::Betap => {
                let (c, z) = guess::beta_p(data, d);
                vec![d, c, z, 1.0]
            }
            ModelKind::Heleg => {
                let (c, f, z) = guess::heleg(data, d);
                vec![c, f, z]
            }
            ModelKind::Mmf => {
                let (c, z) = guess::mmf(data, d);
                vec![d, c, z]
            }
            ModelKind::Logistic => {
                let (z, f) = guess::logistic(data, d);
                vec![d, z, f]
            }
        };
        vec![self.project(&raw)]
    }

    fn closed_form(&self, data: &Observations) -> Option<Vec<f64>> {
        match self {
            ModelKind::Linear => {
                let (c, m) = simple_regression(data.areas(), data.richness())?;
                Some(vec![c, m])
            }
            _ => None,
        }
    }

    fn has_asymptote(&self) -> bool {
        !matches!(
            self,
            ModelKind::Linear
                | ModelKind::Power
                | ModelKind::PowerR
                | ModelKind::Epm1
                | ModelKind::Epm2
                | ModelKind::P1
                | ModelKind::P2
                | ModelKind::Loga
                | ModelKind::Koba
        )
    }

    fn asymptote(&self, p: &[f64]) -> Option<f64> {
        if !self.has_asymptote() {
            return None;
        }
        let value = match self {
            ModelKind::Ratio if p[2] > 0.0 => p[1] / p[2],
            ModelKind::Heleg if p[1] > 0.0 => p[0] / p[1],
            ModelKind::Ratio | ModelKind::Heleg => return None,
            _ => p[0],
        };
        value.is_finite().then_some(value)
    }
}
