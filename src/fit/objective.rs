//! Least-squares objective and a single optimizer run.
//!
//! The optimizer searches an unconstrained coordinate `u`; every trial point is
//! mapped back through the parameter bounds before the model is evaluated, so
//! only admissible parameter vectors are ever scored.

use argmin::core::{CostFunction, Error, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;
use serde::Serialize;

use crate::domain::{Observations, OptimOptions};
use crate::error::{Result, SarError};
use crate::fit::criteria::is_identified;
use crate::models::ModelSpec;

/// Cost reported for trial points where the model is not finite.
///
/// Nelder–Mead orders vertices by cost, so the objective must stay finite.
const PENALTY: f64 = 1e100;

/// One optimizer run from one starting vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitAttempt {
    /// Position of the starting vector in the start list.
    pub start_index: usize,
    pub start: Vec<f64>,
    pub params: Vec<f64>,
    /// RSS recomputed at `params`.
    pub rss: f64,
    pub converged: bool,
    pub iterations: u64,
    pub status: String,
}

/// RSS of a model as a function of the unconstrained coordinates.
pub struct RssProblem<'a> {
    model: &'a dyn ModelSpec,
    data: &'a Observations,
}

impl<'a> RssProblem<'a> {
    pub fn new(model: &'a dyn ModelSpec, data: &'a Observations) -> Self {
        Self { model, data }
    }

    pub fn to_params(&self, internal: &[f64]) -> Vec<f64> {
        internal
            .iter()
            .zip(self.model.bounds())
            .map(|(&u, b)| b.to_external(u))
            .collect()
    }

    pub fn to_internal(&self, params: &[f64]) -> Vec<f64> {
        params
            .iter()
            .zip(self.model.bounds())
            .map(|(&p, b)| b.to_internal(p))
            .collect()
    }

    pub fn rss(&self, params: &[f64]) -> f64 {
        self.model.residual_sum_of_squares(params, self.data)
    }
}

impl CostFunction for RssProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, internal: &Self::Param) -> std::result::Result<Self::Output, Error> {
        let rss = self.rss(&self.to_params(internal));
        Ok(if rss.is_finite() { rss.min(PENALTY) } else { PENALTY })
    }
}

/// Vertex `u0` plus one vertex per coordinate, stepped by `step·max(|u_i|, 1)`.
fn initial_simplex(u0: &[f64], step: f64) -> Vec<Vec<f64>> {
    let mut vertices = Vec::with_capacity(u0.len() + 1);
    vertices.push(u0.to_vec());
    for i in 0..u0.len() {
        let mut vertex = u0.to_vec();
        vertex[i] += step * u0[i].abs().max(1.0);
        vertices.push(vertex);
    }
    vertices
}

struct RunOutcome {
    internal: Vec<f64>,
    terminated_converged: bool,
    iterations: u64,
    status: String,
}

fn nelder_mead(
    problem: RssProblem<'_>,
    u0: &[f64],
    options: &OptimOptions,
    sd_tolerance: f64,
) -> Result<RunOutcome> {
    let model = problem.model.name().to_string();
    let solver: NelderMead<Vec<f64>, f64> = NelderMead::new(initial_simplex(u0, options.initial_step))
        .with_sd_tolerance(sd_tolerance)
        .map_err(|e| SarError::Optimizer {
            model: model.clone(),
            reason: e.to_string(),
        })?;

    let run = Executor::new(problem, solver)
        .configure(|state| state.max_iters(options.max_iters))
        .run();

    // A failure while iterating is a non-converged run, not an error.
    let outcome = match run {
        Ok(res) => {
            let mut state = res.state().clone();
            let iterations = state.get_iter();
            let status = state.get_termination_status().clone();
            let terminated_converged = matches!(
                status,
                TerminationStatus::Terminated(TerminationReason::SolverConverged)
            );
            RunOutcome {
                internal: state.take_best_param().unwrap_or_else(|| u0.to_vec()),
                terminated_converged,
                iterations,
                status: format!("{status:?}"),
            }
        }
        Err(e) => {
            tracing::debug!(model = %model, error = %e, "optimizer run failed");
            RunOutcome {
                internal: u0.to_vec(),
                terminated_converged: false,
                iterations: 0,
                status: format!("failed: {e}"),
            }
        }
    };
    Ok(outcome)
}

/// Run Nelder–Mead from `start` (in parameter space).
///
/// Returns an error only if the solver cannot be constructed; failing to
/// converge is reported through [`FitAttempt::converged`].
pub fn run_attempt(
    model: &dyn ModelSpec,
    data: &Observations,
    start_index: usize,
    start: &[f64],
    options: &OptimOptions,
) -> Result<FitAttempt> {
    if start.len() != model.k() {
        return Err(SarError::DimensionMismatch(format!(
            "model {} expects {} parameters, start {start_index} has {}",
            model.name(),
            model.k(),
            start.len()
        )));
    }

    let sd_tolerance = options.sd_tolerance * data.total_sum_of_squares().max(1.0);
    let problem = RssProblem::new(model, data);
    let u0 = problem.to_internal(start);

    let mut outcome = nelder_mead(RssProblem::new(model, data), &u0, options, sd_tolerance)?;
    if options.polish && outcome.terminated_converged {
        let polished = nelder_mead(
            RssProblem::new(model, data),
            &outcome.internal,
            options,
            sd_tolerance,
        )?;
        let before = problem.rss(&problem.to_params(&outcome.internal));
        let after = problem.rss(&problem.to_params(&polished.internal));
        outcome.iterations += polished.iterations;
        if after.is_finite() && (!before.is_finite() || after < before) {
            outcome.internal = polished.internal;
        }
    }

    let params = problem.to_params(&outcome.internal);
    let rss = problem.rss(&params);
    let valid = rss.is_finite() && model.constraint_satisfied(&params);
    let identified = valid && is_identified(model, &params, data.areas());
    let status = if outcome.terminated_converged && valid && !identified {
        format!("{}; optimum not identified", outcome.status)
    } else {
        outcome.status
    };

    Ok(FitAttempt {
        start_index,
        start: start.to_vec(),
        params,
        rss,
        converged: outcome.terminated_converged && identified,
        iterations: outcome.iterations,
        status,
    })
}

/// Wrap a closed-form optimum as a single attempt.
pub fn closed_form_attempt(model: &dyn ModelSpec, data: &Observations, params: Vec<f64>) -> FitAttempt {
    let rss = model.residual_sum_of_squares(&params, data);
    let converged =
        rss.is_finite() && model.constraint_satisfied(&params) && is_identified(model, &params, data.areas());
    FitAttempt {
        start_index: 0,
        start: params.clone(),
        params,
        rss,
        converged,
        iterations: 0,
        status: "closed form".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelKind;

    fn power_data() -> Observations {
        let areas: Vec<f64> = vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0];
        let richness: Vec<f64> = areas.iter().map(|a: &f64| 3.0 * a.powf(0.4)).collect();
        Observations::new(areas, richness).unwrap()
    }

    #[test]
    fn cost_is_finite_for_wild_coordinates() {
        let data = power_data();
        let problem = RssProblem::new(&ModelKind::Power, &data);
        let cost = problem.cost(&vec![1e6, 1e6]).unwrap();
        assert!(cost.is_finite());
        assert!(cost <= PENALTY);
    }

    #[test]
    fn power_fit_recovers_exact_parameters() {
        let data = power_data();
        let attempt = run_attempt(&ModelKind::Power, &data, 0, &[1.0, 0.2], &OptimOptions::default())
            .unwrap();
        assert!(attempt.converged, "{}", attempt.status);
        assert!((attempt.params[0] - 3.0).abs() < 1e-3, "{:?}", attempt.params);
        assert!((attempt.params[1] - 0.4).abs() < 1e-3, "{:?}", attempt.params);
        assert!(attempt.rss < 1e-6);
    }

    #[test]
    fn iteration_cap_means_not_converged() {
        let data = power_data();
        let options = OptimOptions {
            max_iters: 2,
            ..OptimOptions::default()
        };
        let attempt = run_attempt(&ModelKind::Power, &data, 3, &[1.0, 0.2], &options).unwrap();
        assert!(!attempt.converged);
        assert_eq!(attempt.start_index, 3);
        assert!(attempt.rss.is_finite());
    }

    #[test]
    fn start_length_is_checked() {
        let data = power_data();
        let err = run_attempt(&ModelKind::Power, &data, 0, &[1.0], &OptimOptions::default());
        assert!(matches!(err, Err(SarError::DimensionMismatch(_))));
    }

    #[test]
    fn drifting_to_an_unidentified_point_is_not_convergence() {
        // Nearly linear richness: negexpo can only approach it with d -> inf, z -> 0.
        let areas: Vec<f64> = vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0];
        let richness: Vec<f64> = areas.iter().map(|a| 2.0 + 0.5 * a).collect();
        let data = Observations::new(areas, richness).unwrap();
        let attempt = run_attempt(&ModelKind::Negexpo, &data, 0, &[1e9, 1e-9], &OptimOptions::default()).unwrap();
        if attempt.converged {
            assert!(is_identified(&ModelKind::Negexpo, &attempt.params, data.areas()));
            assert!(attempt.params.iter().all(|p| p.abs() <= 1e10));
        }
        let runaway = closed_form_attempt(&ModelKind::Negexpo, &data, vec![2.0e11, 1e-12]);
        assert!(!runaway.converged);
    }

    #[test]
    fn runs_are_deterministic() {
        let data = power_data();
        let opts = OptimOptions::default();
        let a = run_attempt(&ModelKind::Monod, &data, 0, &[20.0, 3.0], &opts).unwrap();
        let b = run_attempt(&ModelKind::Monod, &data, 0, &[20.0, 3.0], &opts).unwrap();
        assert_eq!(a, b);
    }
}
