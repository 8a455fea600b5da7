//! Multi-start driver.
//!
//! One model is fitted from many starting vectors and the best run is kept.
//!
//! In grid mode each parameter gets a nested value set built around its
//! heuristic value `h`:
//!
//! ```text
//! [h, tiny, spread(t_0), spread(t_1), ..., spread(t_{grid_n-2})]
//! ```
//!
//! where `t_j` walks [-1, 1] as a van der Corput sequence (-1, 1, 0, -0.5, 0.5, ...).
//! The sets for `grid_n` extend the sets for `grid_n - 1`, so raising `grid_n`
//! only ever adds starts.

use std::collections::HashSet;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rayon::prelude::*;

use crate::domain::{FitConfig, GridStart, Observations, StartSummary};
use crate::error::{Result, SarError};
use crate::fit::objective::{FitAttempt, closed_form_attempt, run_attempt};
use crate::models::{ModelSpec, ParamBound};

/// Small-magnitude candidate added to every parameter's value set.
const TINY_START: f64 = 1e-5;

/// Largest grid we enumerate without an explicit `max_starts` cap.
pub const MAX_GRID_STARTS: usize = 200_000;

/// Relative RSS tolerance under which two attempts count as tied.
const RSS_TIE_RTOL: f64 = 1e-9;

/// Distance from a bound under which a parameter is "on" the boundary.
const INTERIOR_TOL: f64 = 1e-8;

/// Best attempt for a model plus how the starts fared.
#[derive(Debug, Clone)]
pub struct MultiStartOutcome {
    pub best: FitAttempt,
    pub starts: StartSummary,
}

/// Base-2 radical inverse of `j`.
fn van_der_corput(mut j: usize) -> f64 {
    let mut value = 0.0;
    let mut denom = 1.0;
    while j > 0 {
        denom *= 2.0;
        value += (j & 1) as f64 / denom;
        j >>= 1;
    }
    value
}

/// `j`-th spread offset in [-1, 1].
fn spread_term(j: usize) -> f64 {
    match j {
        0 => -1.0,
        1 => 1.0,
        _ => 2.0 * van_der_corput(j) - 1.0,
    }
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn spread_value(bound: ParamBound, h: f64, t: f64) -> f64 {
    let value = match bound {
        ParamBound::Free => h + 5.0 * t * h.abs().max(1.0),
        ParamBound::NonNegative => {
            // A heuristic stuck on the boundary gives a degenerate multiplicative spread.
            let base = if h > INTERIOR_TOL { h } else { 1.0 };
            base * 10f64.powf(t)
        }
        ParamBound::UnitInterval => logistic((h / (1.0 - h)).ln() + 3.0 * t),
    };
    bound.project(value)
}

/// Value set of one parameter: `grid_n + 1` candidates.
pub fn parameter_values(bound: ParamBound, heuristic: f64, grid_n: usize) -> Vec<f64> {
    let h = bound.project(heuristic);
    let mut values = Vec::with_capacity(grid_n + 1);
    values.push(h);
    values.push(bound.project(TINY_START));
    for j in 0..grid_n.saturating_sub(1) {
        values.push(spread_value(bound, h, spread_term(j)));
    }
    values
}

/// Decode a mixed-radix index into one start of the Cartesian product.
fn product_entry(sets: &[Vec<f64>], mut index: usize) -> Vec<f64> {
    let mut point = vec![0.0; sets.len()];
    // Last parameter varies fastest.
    for (slot, set) in point.iter_mut().zip(sets.iter()).rev() {
        *slot = set[index % set.len()];
        index /= set.len();
    }
    point
}

/// Keep the first occurrence of each exactly repeated vector.
fn dedupe(starts: Vec<Vec<f64>>) -> Vec<Vec<f64>> {
    let mut seen = HashSet::new();
    starts
        .into_iter()
        .filter(|s| seen.insert(s.iter().map(|v| v.to_bits()).collect::<Vec<u64>>()))
        .collect()
}

/// Starting vectors for `model`, heuristic vectors first.
pub fn build_starts(model: &dyn ModelSpec, data: &Observations, config: &FitConfig) -> Result<Vec<Vec<f64>>> {
    let heuristics: Vec<Vec<f64>> = model
        .initial_guesses(data)
        .into_iter()
        .filter(|g| g.len() == model.k())
        .map(|g| model.project(&g))
        .collect();
    let Some(center) = heuristics.first().cloned() else {
        return Err(SarError::DimensionMismatch(format!(
            "model {} produced no starting vector of length {}",
            model.name(),
            model.k()
        )));
    };

    if config.grid_start == GridStart::None {
        return Ok(dedupe(heuristics));
    }

    let sets: Vec<Vec<f64>> = model
        .bounds()
        .iter()
        .zip(center.iter())
        .map(|(&b, &h)| parameter_values(b, h, config.grid_n))
        .collect();
    let total = sets
        .iter()
        .try_fold(1usize, |acc, s| acc.checked_mul(s.len()));

    let indices: Vec<usize> = match (total, config.max_starts) {
        (Some(total), None) if total <= MAX_GRID_STARTS => (0..total).collect(),
        (Some(total), Some(cap)) if total <= cap => (0..total).collect(),
        (Some(total), Some(cap)) => {
            let mut rng = StdRng::seed_from_u64(config.seed);
            let mut picked = sample(&mut rng, total, cap).into_vec();
            picked.sort_unstable();
            picked
        }
        (total, _) => {
            let size = total.map_or_else(|| "overflow".to_string(), |t| t.to_string());
            return Err(SarError::config(
                "gridN",
                config.grid_n.to_string(),
                format!(
                    "grid for model {} has {size} starts (limit {MAX_GRID_STARTS}); set max_starts",
                    model.name()
                ),
            ));
        }
    };

    let mut starts = heuristics;
    starts.extend(indices.into_iter().map(|i| product_entry(&sets, i)));
    Ok(dedupe(starts))
}

/// Deterministic selection over a set of attempts.
///
/// Lowest RSS among converged attempts; near-ties prefer parameters strictly
/// inside their bounds, then the lowest start index. Without any converged
/// attempt the lowest finite RSS is returned.
pub fn select_best<'a>(model: &dyn ModelSpec, attempts: &'a [FitAttempt]) -> Option<&'a FitAttempt> {
    let converged: Vec<&FitAttempt> = attempts.iter().filter(|a| a.converged).collect();
    if converged.is_empty() {
        return attempts
            .iter()
            .filter(|a| a.rss.is_finite())
            .min_by(|a, b| a.rss.total_cmp(&b.rss).then(a.start_index.cmp(&b.start_index)))
            .or_else(|| attempts.iter().min_by_key(|a| a.start_index));
    }

    let min_rss = converged
        .iter()
        .map(|a| a.rss)
        .fold(f64::INFINITY, f64::min);
    let tol = RSS_TIE_RTOL * min_rss.abs().max(1.0);

    converged
        .into_iter()
        .filter(|a| a.rss <= min_rss + tol)
        .min_by(|a, b| {
            let a_edge = !model.strictly_interior(&a.params, INTERIOR_TOL);
            let b_edge = !model.strictly_interior(&b.params, INTERIOR_TOL);
            a_edge.cmp(&b_edge).then(a.start_index.cmp(&b.start_index))
        })
}

/// Fit `model` from every configured start and keep the best attempt.
pub fn multi_start(model: &dyn ModelSpec, data: &Observations, config: &FitConfig) -> Result<MultiStartOutcome> {
    if let Some(params) = model.closed_form(data) {
        let best = closed_form_attempt(model, data, params);
        let converged = usize::from(best.converged);
        return Ok(MultiStartOutcome {
            best,
            starts: StartSummary { tried: 1, converged },
        });
    }

    let starts = build_starts(model, data, config)?;
    tracing::debug!(model = model.name(), starts = starts.len(), "running multi-start");

    let attempts: Vec<FitAttempt> = starts
        .par_iter()
        .enumerate()
        .map(|(idx, start)| run_attempt(model, data, idx, start, &config.optim))
        .collect::<Result<Vec<_>>>()?;

    let converged = attempts.iter().filter(|a| a.converged).count();
    let summary = StartSummary {
        tried: attempts.len(),
        converged,
    };
    tracing::debug!(model = model.name(), tried = summary.tried, converged, "multi-start finished");

    let best = select_best(model, &attempts).cloned().ok_or_else(|| {
        SarError::Optimizer {
            model: model.name().to_string(),
            reason: "no starting vectors".to_string(),
        }
    })?;

    Ok(MultiStartOutcome { best, starts: summary })
}
