//! Model collections and AICc-weighted multi-model averaging.
//!
//! Every registered family is fitted to the same observations. Included models
//! (converged, defined AICc) are weighted by
//!
//! ```text
//! Δᵢ = AICcᵢ - min AICc
//! wᵢ = exp(-Δᵢ / 2) / Σ exp(-Δⱼ / 2)
//! ```
//!
//! and the averaged curve is `f̄(A) = Σ wᵢ fᵢ(A)`. Its variance mixes the
//! per-model delta-method variances with the spread between models:
//! `Σ wᵢ (varᵢ + (fᵢ - f̄)²)`. Prediction intervals add each model's σ².
//!
//! A member without a covariance still enters the spread term. The variance
//! and σ² terms are averaged over the members that have one, with their
//! weights renormalised.

use rayon::prelude::*;
use serde::Serialize;

use crate::diagnostics::Diagnostics;
use crate::domain::{FitConfig, FitResult, Observations};
use crate::error::{Result, SarError};
use crate::fit::criteria::prediction_variance;
use crate::fit::fitter::fit_model_with;
use crate::math::normal_two_sided_quantile;
use crate::models::Registry;

/// Fits of several families to one observation set, in registry order.
///
/// Non-converged fits are kept (flagged through `verge`). Families that could
/// not be attempted at all are listed in `skipped` with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct ModelCollection {
    data: Observations,
    fits: Vec<FitResult>,
    skipped: Vec<(String, String)>,
}

impl ModelCollection {
    pub fn new(data: Observations) -> Self {
        Self {
            data,
            fits: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Add a fit made on this collection's observations.
    pub fn push(&mut self, fit: FitResult) -> Result<()> {
        if fit.n != self.data.len() || fit.fitted.len() != self.data.len() {
            return Err(SarError::DimensionMismatch(format!(
                "model {} was fitted to {} observations, collection has {}",
                fit.model_name,
                fit.n,
                self.data.len()
            )));
        }
        if self.get(&fit.model_name).is_some() {
            return Err(SarError::config(
                "model",
                fit.model_name.as_str(),
                "already present in the collection",
            ));
        }
        self.fits.push(fit);
        Ok(())
    }

    pub fn skip(&mut self, model: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push((model.into(), reason.into()));
    }

    pub fn data(&self) -> &Observations {
        &self.data
    }

    pub fn fits(&self) -> &[FitResult] {
        &self.fits
    }

    pub fn skipped(&self) -> &[(String, String)] {
        &self.skipped
    }

    pub fn get(&self, name: &str) -> Option<&FitResult> {
        self.fits.iter().find(|f| f.model_name == name)
    }

    pub fn converged(&self) -> impl Iterator<Item = &FitResult> + '_ {
        self.fits.iter().filter(|f| f.verge)
    }

    pub fn len(&self) -> usize {
        self.fits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fits.is_empty()
    }
}

/// Fit every family of `registry` to `data`.
///
/// Families run in parallel; the collection keeps registry order. A family
/// with more parameters than observations, or whose optimizer cannot be set
/// up, is skipped rather than failing the whole collection.
pub fn fit_collection(registry: &Registry, data: &Observations, config: &FitConfig) -> Result<ModelCollection> {
    config.validate()?;
    let diagnostics = Diagnostics::from_config(config);

    let outcomes: Vec<(String, Result<FitResult>)> = registry
        .all()
        .par_iter()
        .map(|model| {
            let name = model.name().to_string();
            (name, fit_model_with(model, data, config, &diagnostics))
        })
        .collect();

    let mut collection = ModelCollection::new(data.clone());
    for (name, outcome) in outcomes {
        match outcome {
            Ok(fit) => collection.push(fit)?,
            Err(e @ (SarError::Underdetermined { .. } | SarError::Optimizer { .. })) => {
                tracing::debug!(model = %name, reason = %e, "model skipped");
                collection.skip(name, e.to_string());
            }
            Err(e) => return Err(e),
        }
    }

    tracing::debug!(
        fitted = collection.len(),
        converged = collection.converged().count(),
        skipped = collection.skipped().len(),
        "collection fitted"
    );
    Ok(collection)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AverageOptions {
    /// Exclude models whose optimizer did not converge.
    pub converged_only: bool,
    pub confidence_level: f64,
}

impl Default for AverageOptions {
    fn default() -> Self {
        Self {
            converged_only: true,
            confidence_level: 0.95,
        }
    }
}

/// Weight of one model in the average.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelWeight {
    pub model: String,
    pub aicc: Option<f64>,
    /// `AICc - min AICc` over the included models.
    pub delta: Option<f64>,
    /// Zero for excluded models.
    pub weight: f64,
    pub included: bool,
    /// Included and contributes its own variance to the intervals.
    pub interval: bool,
    /// Why the model was excluded.
    pub reason: Option<String>,
}

/// Averaged prediction at one area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AveragedPoint {
    pub area: f64,
    pub fitted: f64,
    /// `√` of the mixture variance; `None` if no member has a variance here.
    pub std_error: Option<f64>,
    pub conf_lower: Option<f64>,
    pub conf_upper: Option<f64>,
    pub pred_lower: Option<f64>,
    pub pred_upper: Option<f64>,
}

/// AICc-weighted consensus of a [`ModelCollection`].
#[derive(Debug, Clone, Serialize)]
pub struct AveragedFit {
    pub confidence_level: f64,
    /// One entry per fit of the collection, in collection order.
    pub weights: Vec<ModelWeight>,
    /// The averaged curve at the observed areas.
    pub curve: Vec<AveragedPoint>,
    #[serde(skip)]
    members: Vec<(f64, FitResult)>,
}

impl AveragedFit {
    pub fn average(collection: &ModelCollection, options: &AverageOptions) -> Result<Self> {
        let level = options.confidence_level;
        if !(level > 0.0 && level < 1.0) {
            return Err(SarError::config("confidence_level", level.to_string(), "must lie in (0, 1)"));
        }

        let exclusion = |fit: &FitResult| -> Option<String> {
            if options.converged_only && !fit.verge {
                Some("did not converge".to_string())
            } else if fit.aicc().is_none_or(|a| !a.is_finite()) {
                Some("AICc is undefined".to_string())
            } else {
                None
            }
        };
        let reasons: Vec<Option<String>> = collection.fits().iter().map(exclusion).collect();

        let min_aicc = collection
            .fits()
            .iter()
            .zip(reasons.iter())
            .filter(|(_, r)| r.is_none())
            .filter_map(|(f, _)| f.aicc())
            .fold(f64::INFINITY, f64::min);
        if !min_aicc.is_finite() {
            return Err(SarError::NoModelsToAverage(format!(
                "none of {} fitted models is converged with a defined AICc",
                collection.len()
            )));
        }

        let raw: Vec<f64> = collection
            .fits()
            .iter()
            .zip(reasons.iter())
            .map(|(f, r)| match (r, f.aicc()) {
                (None, Some(a)) => (-(a - min_aicc) / 2.0).exp(),
                _ => 0.0,
            })
            .collect();
        let total: f64 = raw.iter().sum();

        let weights: Vec<ModelWeight> = collection
            .fits()
            .iter()
            .zip(reasons)
            .zip(raw.iter())
            .map(|((fit, reason), &w)| ModelWeight {
                model: fit.model_name.clone(),
                aicc: fit.aicc(),
                delta: fit.aicc().map(|a| a - min_aicc),
                weight: w / total,
                included: reason.is_none(),
                interval: reason.is_none() && fit.covariance.is_some() && fit.sigma2.is_some(),
                reason,
            })
            .collect();

        let members: Vec<(f64, FitResult)> = collection
            .fits()
            .iter()
            .zip(weights.iter())
            .filter(|(_, w)| w.included)
            .map(|(fit, w)| (w.weight, fit.clone()))
            .collect();

        tracing::debug!(included = members.len(), excluded = weights.len() - members.len(), "averaging");

        let mut averaged = Self {
            confidence_level: level,
            weights,
            curve: Vec::new(),
            members,
        };
        averaged.curve = averaged.predict(collection.data().areas());
        Ok(averaged)
    }

    /// Averaged prediction with intervals at each of `areas`.
    pub fn predict(&self, areas: &[f64]) -> Vec<AveragedPoint> {
        let z = normal_two_sided_quantile(self.confidence_level);
        areas.iter().map(|&a| self.point(a, z)).collect()
    }

    fn point(&self, area: f64, z: f64) -> AveragedPoint {
        let values: Vec<f64> = self.members.iter().map(|(_, f)| f.predict(area)).collect();
        let fitted: f64 = self.members.iter().zip(values.iter()).map(|((w, _), v)| w * v).sum();

        let mut point = AveragedPoint {
            area,
            fitted,
            std_error: None,
            conf_lower: None,
            conf_upper: None,
            pred_lower: None,
            pred_upper: None,
        };

        let mut spread = 0.0;
        let mut own_weight = 0.0;
        let mut own_var = 0.0;
        let mut own_sigma2 = 0.0;
        for ((w, fit), v) in self.members.iter().zip(values.iter()) {
            spread += w * (v - fitted) * (v - fitted);
            if let Some((var, sigma2)) = member_variance(fit, area) {
                own_weight += w;
                own_var += w * var;
                own_sigma2 += w * sigma2;
            }
        }
        if !(own_weight > 0.0) {
            return point;
        }

        let conf_var = spread + own_var / own_weight;
        let pred_var = conf_var + own_sigma2 / own_weight;
        if !(conf_var.is_finite() && pred_var.is_finite()) {
            return point;
        }

        let se = conf_var.sqrt();
        let pe = pred_var.sqrt();
        point.std_error = Some(se);
        point.conf_lower = Some(fitted - z * se);
        point.conf_upper = Some(fitted + z * se);
        point.pred_lower = Some(fitted - z * pe);
        point.pred_upper = Some(fitted + z * pe);
        point
    }

    /// Included model with the lowest AICc (first in collection order on ties).
    pub fn best(&self) -> Option<&FitResult> {
        self.members
            .iter()
            .map(|(_, f)| f)
            .filter(|f| f.aicc().is_some())
            .min_by(|a, b| a.aicc().unwrap_or(f64::INFINITY).total_cmp(&b.aicc().unwrap_or(f64::INFINITY)))
    }

    /// Included models by ascending AICc.
    pub fn ranking(&self) -> Vec<&ModelWeight> {
        let mut ranked: Vec<&ModelWeight> = self.weights.iter().filter(|w| w.included).collect();
        ranked.sort_by(|a, b| a.delta.unwrap_or(f64::INFINITY).total_cmp(&b.delta.unwrap_or(f64::INFINITY)));
        ranked
    }

    pub fn weight(&self, model: &str) -> Option<f64> {
        self.weights.iter().find(|w| w.model == model).map(|w| w.weight)
    }

    pub fn members(&self) -> impl Iterator<Item = (f64, &FitResult)> + '_ {
        self.members.iter().map(|(w, f)| (*w, f))
    }
}

/// `(delta-method variance, σ²)` of one member at `area`.
fn member_variance(fit: &FitResult, area: f64) -> Option<(f64, f64)> {
    let cov = fit.covariance.as_ref()?;
    let var = prediction_variance(fit.model.as_ref(), &fit.params, cov, area)?;
    Some((var, fit.sigma2?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GridStart;
    use crate::models::ModelKind;
    use approx::assert_relative_eq;

    fn data() -> Observations {
        let areas = vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0];
        let richness = vec![3.0, 6.0, 5.0, 9.0, 8.0, 14.0, 13.0, 18.0];
        Observations::new(areas, richness).unwrap()
    }

    fn config() -> FitConfig {
        FitConfig {
            grid_start: GridStart::None,
            verbose: false,
            ..FitConfig::default()
        }
    }

    fn collection(names: &[&str]) -> ModelCollection {
        let registry = Registry::standard().subset(names).unwrap();
        fit_collection(&registry, &data(), &config()).unwrap()
    }

    #[test]
    fn collection_keeps_registry_order() {
        let c = collection(&["loga", "linear", "power"]);
        let names: Vec<&str> = c.fits().iter().map(|f| f.model_name.as_str()).collect();
        assert_eq!(names, vec!["loga", "linear", "power"]);
        assert!(c.skipped().is_empty());
    }

    #[test]
    fn underdetermined_families_are_skipped() {
        let small = Observations::new(vec![1.0, 2.0, 3.0], vec![2.0, 3.0, 4.5]).unwrap();
        let registry = Registry::standard().subset(&["linear", "weibull4"]).unwrap();
        let c = fit_collection(&registry, &small, &config()).unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(c.skipped().len(), 1);
        assert_eq!(c.skipped()[0].0, "weibull4");
    }

    #[test]
    fn push_rejects_fits_of_other_data() {
        let mut c = collection(&["linear"]);
        let other = Observations::new(vec![1.0, 2.0, 3.0], vec![1.0, 2.0, 4.0]).unwrap();
        let registry = Registry::standard().subset(&["power"]).unwrap();
        let foreign = fit_collection(&registry, &other, &config()).unwrap();
        let err = c.push(foreign.fits()[0].clone()).unwrap_err();
        assert!(matches!(err, SarError::DimensionMismatch(_)));

        let dup = c.fits()[0].clone();
        assert!(c.push(dup).is_err());
    }

    #[test]
    fn weights_follow_aicc_differences() {
        let c = collection(&["linear", "power", "loga"]);
        let avg = AveragedFit::average(&c, &AverageOptions::default()).unwrap();
        let total: f64 = avg.weights.iter().map(|w| w.weight).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);

        let a = &avg.weights[0];
        let b = &avg.weights[1];
        let expected = (-(a.delta.unwrap() - b.delta.unwrap()) / 2.0).exp();
        assert_relative_eq!(a.weight / b.weight, expected, max_relative = 1e-9);

        let ranked = avg.ranking();
        assert_eq!(ranked[0].delta, Some(0.0));
        assert_eq!(avg.best().unwrap().model_name, ranked[0].model);
    }

    #[test]
    fn intervals_bracket_the_averaged_curve() {
        let c = collection(&["linear", "power", "loga"]);
        let avg = AveragedFit::average(&c, &AverageOptions::default()).unwrap();
        assert_eq!(avg.curve.len(), c.data().len());
        for p in &avg.curve {
            let (lo, hi) = (p.conf_lower.unwrap(), p.conf_upper.unwrap());
            let (plo, phi) = (p.pred_lower.unwrap(), p.pred_upper.unwrap());
            assert!(plo <= lo && lo < p.fitted && p.fitted < hi && hi <= phi);
        }
    }

    #[test]
    fn single_model_average_is_that_model() {
        let c = collection(&["linear"]);
        let avg = AveragedFit::average(&c, &AverageOptions::default()).unwrap();
        let fit = &c.fits()[0];
        assert_eq!(avg.weights[0].weight, 1.0);
        for (p, f) in avg.curve.iter().zip(fit.fitted.iter()) {
            assert_relative_eq!(p.fitted, *f, max_relative = 1e-12);
        }
        let cov = fit.covariance.as_ref().unwrap();
        let var = prediction_variance(fit.model.as_ref(), &fit.params, cov, 7.0).unwrap();
        let p = avg.predict(&[7.0])[0];
        assert_relative_eq!(p.std_error.unwrap(), var.sqrt(), max_relative = 1e-9);
    }

    #[test]
    fn members_without_covariance_keep_the_intervals() {
        let mut c = collection(&["linear", "power", "loga"]);
        let full = AveragedFit::average(&c, &AverageOptions::default()).unwrap();
        c.fits[1].covariance = None;
        let avg = AveragedFit::average(&c, &AverageOptions::default()).unwrap();
        assert!(avg.weights[0].interval && !avg.weights[1].interval && avg.weights[2].interval);

        for (p, q) in avg.curve.iter().zip(full.curve.iter()) {
            assert_eq!(p.fitted, q.fitted);
            assert!(p.std_error.is_some() && p.pred_lower.is_some());
            // The between-model spread still counts the member without a covariance.
            let values: Vec<f64> = avg.members().map(|(_, f)| f.predict(p.area)).collect();
            let spread: f64 = avg
                .members()
                .zip(values.iter())
                .map(|((w, _), v)| w * (v - p.fitted) * (v - p.fitted))
                .sum();
            assert!(p.std_error.unwrap().powi(2) >= spread * (1.0 - 1e-12));
        }

        for fit in &mut c.fits {
            fit.covariance = None;
        }
        let avg = AveragedFit::average(&c, &AverageOptions::default()).unwrap();
        assert!(avg.curve.iter().all(|p| p.std_error.is_none() && p.conf_lower.is_none()));
    }

    #[test]
    fn non_converged_fits_are_excluded_with_a_reason() {
        let mut c = collection(&["linear", "power"]);
        c.fits[1].verge = false;
        let avg = AveragedFit::average(&c, &AverageOptions::default()).unwrap();
        assert!(!avg.weights[1].included);
        assert_eq!(avg.weights[1].weight, 0.0);
        assert_eq!(avg.weights[1].reason.as_deref(), Some("did not converge"));
        assert_eq!(avg.weights[0].weight, 1.0);

        let lenient = AverageOptions {
            converged_only: false,
            ..AverageOptions::default()
        };
        let avg = AveragedFit::average(&c, &lenient).unwrap();
        assert!(avg.weights[1].included);
    }

    #[test]
    fn empty_inclusion_set_is_an_error() {
        let mut c = collection(&["linear"]);
        c.fits[0].verge = false;
        assert!(matches!(
            AveragedFit::average(&c, &AverageOptions::default()),
            Err(SarError::NoModelsToAverage(_))
        ));
        let empty = ModelCollection::new(data());
        assert!(AveragedFit::average(&empty, &AverageOptions::default()).is_err());
    }
}
