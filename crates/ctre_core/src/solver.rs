//! Saddle-path solver.
//!
//! The deviation from the particular solution is expanded in eigenmodes.
//! Stable modes carry the initial-state information forward. Unstable modes
//! are pinned from the far end: by boundedness on an infinite horizon, or by
//! the terminal jump values on a finite one.

use crate::eigen::{determinate_decomposition, ComplexNumber, ModalDecomposition, C64};
use crate::error::{SolverError, SolverResult};
use crate::forcing::ModalForcing;
use crate::model::{BoundaryConditions, LinearModel, TerminalCondition, TimeGrid};
use crate::settings::SolverSettings;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const STEADY_STATE_RESIDUAL_TOL: f64 = 1e-8;
const HORIZON_SLACK: f64 = 1e-9;
const CONDITION_WARNING: f64 = 1e6;

/// Sampled solution. Each point holds the states followed by the jumps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trajectory {
    pub n_states: usize,
    pub times: Vec<f64>,
    pub points: Vec<Vec<f64>>,
    /// Present for infinite-horizon solves.
    pub steady_state: Option<Vec<f64>>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// States at grid point `index`, or `None` past the end of the grid.
    pub fn state(&self, index: usize) -> Option<&[f64]> {
        self.points.get(index).map(|p| &p[..self.n_states])
    }

    pub fn jumps(&self, index: usize) -> Option<&[f64]> {
        self.points.get(index).map(|p| &p[self.n_states..])
    }

    /// Time series of a single variable, or `None` if `variable` is out of range.
    pub fn series(&self, variable: usize) -> Option<Vec<f64>> {
        self.points.iter().map(|p| p.get(variable).copied()).collect()
    }

    pub fn last(&self) -> Option<&[f64]> {
        self.points.last().map(|p| p.as_slice())
    }
}

#[derive(Debug, Clone)]
enum Horizon {
    Infinite,
    Finite {
        horizon: f64,
        /// Unstable-mode values at the terminal time.
        terminal_coeffs: DVector<C64>,
    },
}

/// Continuous representation of the unique bounded solution.
#[derive(Debug, Clone)]
pub struct SaddlePathSolution {
    n_states: usize,
    modal: ModalDecomposition,
    forcing: ModalForcing,
    steady_state: DVector<f64>,
    stable_coeffs: DVector<C64>,
    horizon: Horizon,
    imaginary_tolerance: f64,
}

impl SaddlePathSolution {
    pub fn n_states(&self) -> usize {
        self.n_states
    }

    pub fn dimension(&self) -> usize {
        self.modal.dimension()
    }

    pub fn horizon(&self) -> Option<f64> {
        match &self.horizon {
            Horizon::Infinite => None,
            Horizon::Finite { horizon, .. } => Some(*horizon),
        }
    }

    pub fn steady_state(&self) -> Option<Vec<f64>> {
        match self.horizon {
            Horizon::Infinite => Some(self.steady_state.iter().cloned().collect()),
            Horizon::Finite { .. } => None,
        }
    }

    pub fn eigenvalues(&self) -> Vec<ComplexNumber> {
        self.modal.eigenvalues.iter().map(|&v| v.into()).collect()
    }

    /// Jump values at `t = 0` selected by the rational-expectations condition.
    pub fn initial_jumps(&self) -> SolverResult<Vec<f64>> {
        let point = self.evaluate(0.0)?;
        Ok(point[self.n_states..].to_vec())
    }

    /// Full variable vector at time `t`.
    pub fn evaluate(&self, t: f64) -> SolverResult<Vec<f64>> {
        if !t.is_finite() || t < 0.0 {
            return Err(SolverError::validation(format!(
                "evaluation time must be finite and non-negative, got {t}"
            )));
        }
        if let Horizon::Finite { horizon, .. } = &self.horizon {
            if t > horizon + HORIZON_SLACK * horizon.max(1.0) {
                return Err(SolverError::validation(format!(
                    "evaluation time {t} lies beyond the terminal horizon {horizon}"
                )));
            }
        }

        let modes = self.modal_state(t)?;
        let deviation = &self.modal.vectors * modes;
        let mut point = real_part(&deviation, self.imaginary_tolerance)?;
        for (value, base) in point.iter_mut().zip(self.steady_state.iter()) {
            *value += base;
        }
        Ok(point)
    }

    pub fn sample(&self, grid: &TimeGrid) -> SolverResult<Trajectory> {
        let times = grid.times()?;
        let points = times
            .iter()
            .map(|&t| self.evaluate(t))
            .collect::<SolverResult<Vec<_>>>()?;
        Ok(Trajectory {
            n_states: self.n_states,
            times,
            points,
            steady_state: self.steady_state(),
        })
    }

    fn modal_state(&self, t: f64) -> SolverResult<DVector<C64>> {
        let n_stable = self.modal.n_stable;
        let mut modes = DVector::<C64>::zeros(self.dimension());
        for (k, &lambda) in self.modal.eigenvalues.iter().enumerate() {
            modes[k] = if k < n_stable {
                (lambda * t).exp() * self.stable_coeffs[k] + self.forcing.forward(k, lambda, t)?
            } else {
                match &self.horizon {
                    Horizon::Infinite => -self.forcing.backward(k, lambda, t, f64::INFINITY)?,
                    Horizon::Finite {
                        horizon,
                        terminal_coeffs,
                    } => {
                        (lambda * (t - horizon)).exp() * terminal_coeffs[k - n_stable]
                            - self.forcing.backward(k, lambda, t, *horizon)?
                    }
                }
            };
        }
        Ok(modes)
    }
}

/// Solves the model and samples the saddle path on `grid`.
pub fn solve(
    model: &LinearModel,
    boundary: &BoundaryConditions,
    grid: &TimeGrid,
    settings: &SolverSettings,
) -> SolverResult<Trajectory> {
    let times = grid.times()?;
    if let Some(horizon) = boundary.horizon() {
        if let Some(&t) = times
            .iter()
            .find(|&&t| t > horizon + HORIZON_SLACK * horizon.max(1.0))
        {
            return Err(SolverError::validation(format!(
                "grid time {t} lies beyond the terminal horizon {horizon}"
            )));
        }
    }
    let solution = solve_saddle_path(model, boundary, settings)?;
    solution.sample(&TimeGrid::Points { times })
}

/// Builds the continuous saddle-path solution.
pub fn solve_saddle_path(
    model: &LinearModel,
    boundary: &BoundaryConditions,
    settings: &SolverSettings,
) -> SolverResult<SaddlePathSolution> {
    settings.validate()?;
    model.validate()?;
    boundary.validate(model)?;

    debug!(
        n_states = model.n_states,
        n_jumps = model.n_jumps,
        finite = boundary.horizon().is_some(),
        "solving saddle path"
    );

    let modal = determinate_decomposition(model, settings)?;

    match &boundary.terminal {
        TerminalCondition::SteadyState => build_infinite(model, boundary, modal, settings),
        TerminalCondition::Fixed { horizon, jumps } => {
            build_finite(model, boundary, modal, *horizon, jumps, settings)
        }
    }
}

fn build_infinite(
    model: &LinearModel,
    boundary: &BoundaryConditions,
    modal: ModalDecomposition,
    settings: &SolverSettings,
) -> SolverResult<SaddlePathSolution> {
    let dim = model.dimension();
    let nx = model.n_states;
    let ns = modal.n_stable;

    let steady_state = steady_state(model)?;
    let forcing = ModalForcing::project(&model.forcing.pieces(dim, true), &modal.inverse);

    let mut unstable_at_zero = DVector::<C64>::zeros(dim - ns);
    for k in ns..dim {
        unstable_at_zero[k - ns] =
            -forcing.backward(k, modal.eigenvalues[k], 0.0, f64::INFINITY)?;
    }

    let stable_coeffs = if nx == 0 {
        DVector::zeros(0)
    } else {
        let v_xs = modal.vectors.view((0, 0), (nx, ns)).into_owned();
        let v_xu = modal.vectors.view((0, ns), (nx, dim - ns)).into_owned();
        let gap = DVector::from_iterator(
            nx,
            (0..nx).map(|i| Complex::new(boundary.initial_state[i] - steady_state[i], 0.0)),
        );
        let rhs = gap - v_xu * &unstable_at_zero;
        solve_checked(
            v_xs,
            &rhs,
            "stable eigenvectors do not span the state space",
            settings,
        )?
    };

    debug!(
        steady_state = ?steady_state.as_slice(),
        forced = !forcing.is_empty(),
        "built infinite-horizon saddle path"
    );

    Ok(SaddlePathSolution {
        n_states: nx,
        modal,
        forcing,
        steady_state,
        stable_coeffs,
        horizon: Horizon::Infinite,
        imaginary_tolerance: settings.imaginary_tolerance,
    })
}

fn build_finite(
    model: &LinearModel,
    boundary: &BoundaryConditions,
    modal: ModalDecomposition,
    horizon: f64,
    terminal_jumps: &[f64],
    settings: &SolverSettings,
) -> SolverResult<SaddlePathSolution> {
    let dim = model.dimension();
    let nx = model.n_states;
    let ns = modal.n_stable;
    let forcing = ModalForcing::project(&model.forcing.pieces(dim, false), &modal.inverse);

    // Unknowns: stable values at t = 0, then unstable values at t = T.
    let mut system = DMatrix::<C64>::zeros(dim, dim);
    let mut rhs = DVector::<C64>::zeros(dim);
    let mut carried = DVector::<C64>::zeros(dim);
    for (k, &lambda) in modal.eigenvalues.iter().enumerate() {
        carried[k] = if k < ns {
            forcing.forward(k, lambda, horizon)?
        } else {
            forcing.backward(k, lambda, 0.0, horizon)?
        };
    }

    for i in 0..dim {
        let is_state_row = i < nx;
        rhs[i] = if is_state_row {
            Complex::new(boundary.initial_state[i], 0.0)
        } else {
            Complex::new(terminal_jumps[i - nx], 0.0)
        };
        for (k, &lambda) in modal.eigenvalues.iter().enumerate() {
            let v = modal.vectors[(i, k)];
            let stable = k < ns;
            system[(i, k)] = match (is_state_row, stable) {
                (true, true) | (false, false) => v,
                (true, false) => v * (-lambda * horizon).exp(),
                (false, true) => v * (lambda * horizon).exp(),
            };
            if is_state_row && !stable {
                rhs[i] += v * carried[k];
            } else if !is_state_row && stable {
                rhs[i] -= v * carried[k];
            }
        }
    }

    let solution = solve_checked(
        system,
        &rhs,
        "boundary conditions do not pin down a unique path",
        settings,
    )?;
    let stable_coeffs = solution.rows(0, ns).into_owned();
    let terminal_coeffs = solution.rows(ns, dim - ns).into_owned();

    debug!(horizon, "built finite-horizon saddle path");

    Ok(SaddlePathSolution {
        n_states: nx,
        modal,
        forcing,
        steady_state: DVector::zeros(dim),
        stable_coeffs,
        horizon: Horizon::Finite {
            horizon,
            terminal_coeffs,
        },
        imaginary_tolerance: settings.imaginary_tolerance,
    })
}

/// Steady state `-A⁻¹ f̄` for the long-run forcing level.
pub(crate) fn steady_state(model: &LinearModel) -> SolverResult<DVector<f64>> {
    let dim = model.dimension();
    let level = DVector::from_vec(model.forcing.long_run(dim));
    if level.iter().all(|v| *v == 0.0) {
        return Ok(DVector::zeros(dim));
    }
    let matrix = model.matrix();
    let singular = || {
        SolverError::numerical(
            "dynamics matrix is singular; steady state is undefined for non-zero long-run forcing",
            f64::INFINITY,
            STEADY_STATE_RESIDUAL_TOL,
        )
    };
    let state = matrix.clone().lu().solve(&(-&level)).ok_or_else(singular)?;
    if state.iter().any(|v| !v.is_finite()) {
        return Err(singular());
    }
    let residual = (&matrix * &state + &level).norm();
    let tolerance = STEADY_STATE_RESIDUAL_TOL * matrix.norm().max(1.0) * (1.0 + state.norm());
    if residual > tolerance {
        return Err(SolverError::numerical(
            "steady-state solve is inaccurate; dynamics matrix is near-singular",
            residual,
            tolerance,
        ));
    }
    Ok(state)
}

/// Solves a square complex system after checking its conditioning.
pub(crate) fn solve_checked(
    matrix: DMatrix<C64>,
    rhs: &DVector<C64>,
    what: &str,
    settings: &SolverSettings,
) -> SolverResult<DVector<C64>> {
    let condition = condition_number(&matrix);
    if !condition.is_finite() || condition > settings.max_condition {
        return Err(SolverError::numerical(what, condition, settings.max_condition));
    }
    if condition > CONDITION_WARNING {
        warn!(condition, "{what}: system is poorly conditioned");
    }
    matrix
        .lu()
        .solve(rhs)
        .ok_or_else(|| SolverError::numerical(what, f64::INFINITY, settings.max_condition))
}

pub(crate) fn condition_number(matrix: &DMatrix<C64>) -> f64 {
    if matrix.is_empty() {
        return 1.0;
    }
    let singular = matrix.clone().singular_values();
    let s_max = singular.iter().cloned().fold(0.0, f64::max);
    let s_min = singular.iter().cloned().fold(f64::INFINITY, f64::min);
    if s_min > 0.0 {
        s_max / s_min
    } else {
        f64::INFINITY
    }
}

/// Real part of `values`, after checking that the imaginary residue cancelled.
pub(crate) fn real_part<'a, I>(values: I, tolerance: f64) -> SolverResult<Vec<f64>>
where
    I: IntoIterator<Item = &'a C64>,
{
    let values: Vec<C64> = values.into_iter().cloned().collect();
    let max_re = values.iter().map(|v| v.re.abs()).fold(0.0, f64::max);
    let max_im = values.iter().map(|v| v.im.abs()).fold(0.0, f64::max);
    let allowed = tolerance * max_re.max(1.0);
    if !(max_im <= allowed) {
        return Err(SolverError::numerical(
            "complex modes failed to cancel in the real output",
            max_im,
            allowed,
        ));
    }
    Ok(values.into_iter().map(|v| v.re).collect())
}
