//! Fitting of a single model family.
//!
//! Given:
//! - a model family (`ModelSpec`)
//! - validated observations
//! - a fit configuration
//!
//! we:
//! - run the multi-start driver to find the least-squares parameters
//! - compute fitted values, residuals and the fit-quality metrics
//! - classify the curve and run the residual diagnostics
//!
//! and return one fully built [`FitResult`].

use std::sync::Arc;

use crate::diagnostics::Diagnostics;
use crate::domain::{FitConfig, FitResult, Observations, StartSummary};
use crate::error::{Result, SarError};
use crate::fit::criteria::{
    adjusted_r_squared, coefficient_table, covariance, information_criteria, r_squared, residual_variance,
    to_row_major,
};
use crate::fit::grid_start::multi_start;
use crate::fit::shape::{ShapeFlags, shape_flags};
use crate::models::ModelSpec;

/// Fit `model` with the probes selected by `config`.
pub fn fit_model(model: &Arc<dyn ModelSpec>, data: &Observations, config: &FitConfig) -> Result<FitResult> {
    fit_model_with(model, data, config, &Diagnostics::from_config(config))
}

/// Fit `model` and run `diagnostics` on its residuals.
///
/// A model that fails to converge still yields a result, with `verge = false`.
/// Only invalid configuration, `n < k` and optimizer setup problems are errors.
pub fn fit_model_with(
    model: &Arc<dyn ModelSpec>,
    data: &Observations,
    config: &FitConfig,
    diagnostics: &Diagnostics,
) -> Result<FitResult> {
    config.validate()?;

    let n = data.len();
    let k = model.k();
    if n < k {
        return Err(SarError::Underdetermined {
            model: model.name().to_string(),
            n,
            k,
        });
    }

    let outcome = multi_start(model.as_ref(), data, config)?;
    let best = outcome.best;
    let params = best.params;
    let rss = best.rss;

    let fitted = model.fitted_values(&params, data);
    let residuals: Vec<f64> = data
        .richness()
        .iter()
        .zip(fitted.iter())
        .map(|(s, f)| s - f)
        .collect();

    let param_count = model.param_count();
    let tss = data.total_sum_of_squares();
    let cov = covariance(model.as_ref(), &params, data, rss);
    let param_names: Vec<String> = model.param_names().iter().map(|p| p.to_string()).collect();
    let coefficients = coefficient_table(&param_names, &params, cov.as_ref(), n - k, config.confidence_level);
    let flags = shape_flags(model.as_ref(), &params, data, &fitted);
    let (normality, homogeneity) = diagnostics.run(&residuals, data.areas(), &fitted);

    let warnings = if config.verbose {
        let warnings = advisories(data, best.converged, &outcome.starts, &flags);
        for w in &warnings {
            tracing::warn!(model = model.name(), "{w}");
        }
        warnings
    } else {
        Vec::new()
    };

    tracing::debug!(
        model = model.name(),
        rss,
        verge = best.converged,
        start = best.start_index,
        iterations = best.iterations,
        "model fitted"
    );

    Ok(FitResult {
        model_name: model.name().to_string(),
        display_name: model.display_name().to_string(),
        formula: model.formula().to_string(),
        model: Arc::clone(model),
        param_names,
        params,
        rss,
        verge: best.converged,
        n,
        param_count,
        criteria: information_criteria(rss, n, param_count),
        r_squared: r_squared(rss, tss),
        adj_r_squared: adjusted_r_squared(rss, tss, n, param_count),
        sigma2: residual_variance(rss, n, k),
        coefficients,
        covariance: cov.as_ref().map(to_row_major),
        observed_shape: flags.observed_shape,
        asymptote: flags.asymptote,
        neg_check: flags.neg_check,
        fitted,
        residuals,
        normality,
        homogeneity,
        starts: outcome.starts,
        warnings,
    })
}

fn advisories(data: &Observations, converged: bool, starts: &StartSummary, flags: &ShapeFlags) -> Vec<String> {
    let mut out = Vec::new();
    if data.richness_is_constant() {
        out.push("all richness values are identical".to_string());
    }
    if !converged {
        out.push(format!(
            "optimizer did not converge ({} of {} starts converged); parameters are unreliable",
            starts.converged, starts.tried
        ));
    }
    if flags.neg_check {
        out.push("negative fitted richness values".to_string());
    }
    out
}
