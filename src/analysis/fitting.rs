//! Least-squares fitting of [`Model`]s to sampled data.
//!
//! Two fitters are available, selected by name:
//! * `Levenberg-Marquardt` – the MINPACK trust-region algorithm from the
//!   `levenberg-marquardt` crate, fed a forward-difference Jacobian. The
//!   default.
//! * `Simplex` – `argmin`'s Nelder–Mead on the sum of squared residuals.
//!   Slower, but needs no derivatives.
//!
//! A fit that fails to converge is an error ([`FitError::NotConverged`]);
//! the caller's model is never touched, only the returned copy.

use std::fmt;
use std::str::FromStr;

use argmin::core::{CostFunction, Executor, State, TerminationReason as SimplexTermination};
use argmin::solver::neldermead::NelderMead;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use super::models::{Model, ModelKind, ParametricModel};
use crate::error::FitError;

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

/// Convergence settings shared by both fitters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Simplex iteration cap. Levenberg–Marquardt gets
    /// `max_iterations × (parameters + 1)` residual evaluations.
    pub max_iterations: usize,
    /// Relative reduction of the sum of squares below which a fit is done.
    /// For the simplex, the spread of vertex costs.
    pub ftol: f64,
    /// Relative parameter step below which a fit is done.
    pub xtol: f64,
    /// Initial trust-region bound for Levenberg–Marquardt, as a factor of
    /// the scaled parameter norm.
    pub stepbound: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            stepbound: 100.0,
        }
    }
}

/// A converged fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult<M> {
    /// Copy of the input model carrying the fitted parameters.
    pub model: M,
    /// Residual evaluations (Levenberg–Marquardt) or simplex iterations.
    pub iterations: usize,
    /// Sum of squared residuals at the solution.
    pub sum_of_squares: f64,
}

// ---------------------------------------------------------------------------
// Fitter selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Fitter {
    #[default]
    LevenbergMarquardt,
    Simplex,
}

impl Fitter {
    pub const ALL: [Fitter; 2] = [Fitter::LevenbergMarquardt, Fitter::Simplex];

    pub fn name(self) -> &'static str {
        match self {
            Fitter::LevenbergMarquardt => "Levenberg-Marquardt",
            Fitter::Simplex => "Simplex",
        }
    }

    /// Fit `model` to the samples `(x, y)`.
    pub fn fit<M: Model + Clone>(
        self,
        model: &M,
        x: &[f64],
        y: &[f64],
        opts: &FitOptions,
    ) -> Result<FitResult<M>, FitError> {
        if x.len() != y.len() {
            return Err(FitError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        let needed = model.n_parameters();
        if x.len() < needed || needed == 0 {
            return Err(FitError::TooFewPoints {
                needed,
                got: x.len(),
            });
        }
        let (x, y) = (ArrayView1::from(x), ArrayView1::from(y));

        let result = if !sum_of_squares(model, x, y).is_finite() {
            Err(FitError::NonFinite)
        } else {
            match self {
                Fitter::LevenbergMarquardt => levenberg_marquardt(model, x, y, opts),
                Fitter::Simplex => nelder_mead(model, x, y, opts),
            }
        };
        match &result {
            Ok(fit) => log::info!(
                "{} converged after {} iterations, sum of squares {:.6e}",
                self.name(),
                fit.iterations,
                fit.sum_of_squares
            ),
            Err(e) => log::warn!("{} failed: {e}", self.name()),
        }
        result
    }
}

impl fmt::Display for Fitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Fitter {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "levenberg-marquardt" | "levmarlsqfitter" | "levmar" | "lm" => {
                Ok(Fitter::LevenbergMarquardt)
            }
            "simplex" | "simplexlsqfitter" | "nelder-mead" => Ok(Fitter::Simplex),
            _ => Err(FitError::UnknownFitter(s.trim().to_string())),
        }
    }
}

/// Names of every fitter, for selectors.
pub fn all_fitters() -> Vec<&'static str> {
    Fitter::ALL.iter().map(|f| f.name()).collect()
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn sum_of_squares<M: Model>(model: &M, x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
    let r = &y - &model.eval(x);
    r.dot(&r)
}

fn with_parameters<M: Model + Clone>(model: &M, values: &[f64]) -> Result<M, FitError> {
    let mut fitted = model.clone();
    fitted.set_parameters(values)?;
    Ok(fitted)
}

// ---------------------------------------------------------------------------
// Levenberg–Marquardt
// ---------------------------------------------------------------------------

/// A model and its samples, seen as `r(p) = model(x; p) − y`.
struct CurveFit<M> {
    model: M,
    params: DVector<f64>,
    x: Array1<f64>,
    y: Array1<f64>,
}

impl<M: Model> CurveFit<M> {
    fn new(model: M, x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> Self {
        let params = DVector::from_vec(model.parameters());
        Self {
            model,
            params,
            x: x.to_owned(),
            y: y.to_owned(),
        }
    }
}

impl<M: Model + Clone> LeastSquaresProblem<f64, Dyn, Dyn> for CurveFit<M> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, p: &DVector<f64>) {
        self.params.copy_from(p);
        // same length as `params()`, so this cannot fail
        let _ = self.model.set_parameters(p.as_slice());
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let r = &self.model.eval(self.x.view()) - &self.y;
        r.iter()
            .all(|v| v.is_finite())
            .then(|| DVector::from_iterator(r.len(), r.iter().copied()))
    }

    /// Forward differences, one column per parameter.
    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let f0 = self.model.eval(self.x.view());
        let mut jac = DMatrix::<f64>::zeros(self.x.len(), self.params.len());
        let mut work = self.model.clone();
        let mut shifted = self.params.clone();
        for j in 0..self.params.len() {
            let h = f64::EPSILON.sqrt() * self.params[j].abs().max(1.0);
            shifted[j] = self.params[j] + h;
            work.set_parameters(shifted.as_slice()).ok()?;
            for (i, (fj, f)) in work.eval(self.x.view()).iter().zip(&f0).enumerate() {
                jac[(i, j)] = (fj - f) / h;
            }
            shifted[j] = self.params[j];
        }
        jac.iter().all(|v| v.is_finite()).then_some(jac)
    }
}

fn levenberg_marquardt<M: Model + Clone>(
    model: &M,
    x: ArrayView1<'_, f64>,
    y: ArrayView1<'_, f64>,
    opts: &FitOptions,
) -> Result<FitResult<M>, FitError> {
    let (problem, report) = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.xtol)
        .with_stepbound(opts.stepbound)
        .with_patience(opts.max_iterations.max(1))
        .minimize(CurveFit::new(model.clone(), x, y));

    let iterations = report.number_of_evaluations;
    // the crate reports ½‖r‖²
    let ssr = 2.0 * report.objective_function;
    log::debug!("LM stopped after {iterations} evaluations: {:?}", report.termination);

    match report.termination {
        reason if reason.was_successful() => Ok(FitResult {
            model: with_parameters(model, problem.params.as_slice())?,
            iterations,
            sum_of_squares: ssr,
        }),
        TerminationReason::LostPatience => Err(FitError::NotConverged { iterations, ssr }),
        TerminationReason::User(_) | TerminationReason::Numerical(_) => Err(FitError::NonFinite),
        other => Err(FitError::Solver(format!("{other:?}"))),
    }
}

// ---------------------------------------------------------------------------
// Nelder–Mead simplex
// ---------------------------------------------------------------------------

/// Sum of squared residuals as an `argmin` cost. Non-finite sums become
/// `+inf` so the simplex steps away from them.
struct SumOfSquares<M> {
    model: M,
    x: Array1<f64>,
    y: Array1<f64>,
}

impl<M: Model + Clone> CostFunction for SumOfSquares<M> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, p: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let mut model = self.model.clone();
        model.set_parameters(p)?;
        let s = sum_of_squares(&model, self.x.view(), self.y.view());
        Ok(if s.is_finite() { s } else { f64::INFINITY })
    }
}

fn nelder_mead<M: Model + Clone>(
    model: &M,
    x: ArrayView1<'_, f64>,
    y: ArrayView1<'_, f64>,
    opts: &FitOptions,
) -> Result<FitResult<M>, FitError> {
    let start = model.parameters();
    let mut simplex = vec![start.clone()];
    for i in 0..start.len() {
        let mut vertex = start.clone();
        vertex[i] = if vertex[i] != 0.0 { vertex[i] * 1.05 } else { 0.00025 };
        simplex.push(vertex);
    }

    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(opts.ftol)
        .map_err(|e| FitError::Solver(e.to_string()))?;
    let problem = SumOfSquares {
        model: model.clone(),
        x: x.to_owned(),
        y: y.to_owned(),
    };
    let result = Executor::new(problem, solver)
        .configure(|state| state.max_iters(opts.max_iterations as u64))
        .run()
        .map_err(|e| FitError::Solver(e.to_string()))?;

    let state = result.state();
    let iterations = state.get_iter() as usize;
    let ssr = state.get_best_cost();
    log::debug!(
        "Simplex stopped after {iterations} iterations: {:?}",
        state.get_termination_reason()
    );

    match state.get_termination_reason() {
        Some(SimplexTermination::SolverConverged) => {
            let best = state
                .get_best_param()
                .ok_or_else(|| FitError::Solver("no best parameters".to_string()))?;
            Ok(FitResult {
                model: with_parameters(model, best)?,
                iterations,
                sum_of_squares: ssr,
            })
        }
        _ if !ssr.is_finite() => Err(FitError::NonFinite),
        _ => Err(FitError::NotConverged { iterations, ssr }),
    }
}

// ---------------------------------------------------------------------------
// Gaussian helpers
// ---------------------------------------------------------------------------

/// Best-effort starting values `(amplitude, mean, stddev)` for a Gaussian.
///
/// Amplitude is the 95th percentile of `y`. Mean and stddev are the first
/// and second moments of `x` weighted by `y / Σy`; that normalisation is
/// not applied to the amplitude. Only meant to seed the optimiser.
pub fn gaussian_parameter_estimates(x: &[f64], y: &[f64]) -> (f64, f64, f64) {
    let amplitude = percentile(y, 95.0);
    let total: f64 = y.iter().sum();
    let weights: Vec<f64> = y.iter().map(|v| v / total).collect();
    let mean: f64 = x.iter().zip(&weights).map(|(x, w)| x * w).sum();
    let variance: f64 = x
        .iter()
        .zip(&weights)
        .map(|(x, w)| w * (x - mean).powi(2))
        .sum();
    (amplitude, mean, variance.sqrt())
}

/// Percentile with linear interpolation between closest ranks.
fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Seed a Gaussian from the data and fit it with Levenberg–Marquardt.
/// Returns the fitted model and its evaluation at `x`.
pub fn gaussian_fit(
    x: &[f64],
    y: &[f64],
    opts: &FitOptions,
) -> Result<(ParametricModel, Vec<f64>), FitError> {
    let (amplitude, mean, stddev) = gaussian_parameter_estimates(x, y);
    let init = ParametricModel::with_values(ModelKind::Gaussian1D, &[amplitude, mean, stddev])?;
    let fit = Fitter::LevenbergMarquardt.fit(&init, x, y, opts)?;
    let curve = fit.model.eval(ArrayView1::from(x)).to_vec();
    Ok((fit.model, curve))
}
