//! Forward integration of the forced linear system.
//!
//! This does not impose any rational-expectations condition: it integrates
//! `A z + f(t)` from a fully specified initial vector. It is mainly useful for
//! cross-checking a saddle path over a short horizon, where the unstable modes
//! have not yet amplified the integration error.

use crate::error::{SolverError, SolverResult};
use crate::model::{Forcing, LinearModel, TimeGrid};
use crate::solver::Trajectory;
use crate::traits::{DynamicalSystem, Steppable};
use nalgebra::{DMatrix, DVector};

/// `LinearModel` viewed as a vector field.
pub struct ForcedLinearSystem<'a> {
    matrix: DMatrix<f64>,
    forcing: &'a Forcing,
}

impl<'a> ForcedLinearSystem<'a> {
    pub fn new(model: &'a LinearModel) -> Self {
        Self {
            matrix: model.matrix(),
            forcing: &model.forcing,
        }
    }
}

impl DynamicalSystem for ForcedLinearSystem<'_> {
    fn dimension(&self) -> usize {
        self.matrix.nrows()
    }

    fn apply(&self, t: f64, z: &[f64], out: &mut [f64]) {
        let dim = self.dimension();
        let drift = &self.matrix * DVector::from_column_slice(z);
        let forcing = self.forcing.value_at(t, dim);
        for i in 0..dim {
            out[i] = drift[i] + forcing[i];
        }
    }
}

/// Classic Runge-Kutta 4th order stepper.
pub struct Rk4 {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    tmp: Vec<f64>,
}

impl Rk4 {
    pub fn new(dim: usize) -> Self {
        Self {
            k1: vec![0.0; dim],
            k2: vec![0.0; dim],
            k3: vec![0.0; dim],
            k4: vec![0.0; dim],
            tmp: vec![0.0; dim],
        }
    }
}

impl Steppable for Rk4 {
    fn step(&mut self, system: &impl DynamicalSystem, t: &mut f64, state: &mut [f64], dt: f64) {
        let t0 = *t;
        let half = 0.5 * dt;

        system.apply(t0, state, &mut self.k1);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + half * self.k1[i];
        }
        system.apply(t0 + half, &self.tmp, &mut self.k2);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + half * self.k2[i];
        }
        system.apply(t0 + half, &self.tmp, &mut self.k3);

        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        for i in 0..state.len() {
            let slope = self.k1[i] + 2.0 * self.k2[i] + 2.0 * self.k3[i] + self.k4[i];
            state[i] += dt / 6.0 * slope;
        }

        *t = t0 + dt;
    }
}

/// Integrates `model` from the full vector `initial` at `t = 0`, taking
/// `substeps` RK4 steps between consecutive grid points.
pub fn simulate(
    model: &LinearModel,
    initial: &[f64],
    grid: &TimeGrid,
    substeps: usize,
) -> SolverResult<Trajectory> {
    model.validate()?;
    let dim = model.dimension();
    if initial.len() != dim {
        return Err(SolverError::validation(format!(
            "initial vector has length {}, expected {dim}",
            initial.len()
        )));
    }
    if initial.iter().any(|v| !v.is_finite()) {
        return Err(SolverError::validation(
            "initial vector contains non-finite values",
        ));
    }
    if substeps == 0 {
        return Err(SolverError::validation("substeps must be at least 1"));
    }
    let times = grid.times()?;

    let system = ForcedLinearSystem::new(model);
    let mut stepper = Rk4::new(dim);
    let mut state = initial.to_vec();
    let mut t = 0.0;
    let mut points = Vec::with_capacity(times.len());

    for &target in &times {
        let span = target - t;
        if span > 0.0 {
            let dt = span / substeps as f64;
            for _ in 0..substeps {
                stepper.step(&system, &mut t, &mut state, dt);
            }
            t = target;
        }
        if state.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::numerical(
                format!("integration diverged before t = {target}"),
                f64::INFINITY,
                f64::MAX,
            ));
        }
        points.push(state.clone());
    }

    Ok(Trajectory {
        n_states: model.n_states,
        times,
        points,
        steady_state: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundaryConditions, DecayingShock};
    use crate::settings::SolverSettings;
    use crate::solver::solve_saddle_path;

    #[test]
    fn rk4_step_solves_linear_growth() {
        let model = LinearModel::new(vec![0.0], 1, 0).with_forcing(Forcing::Constant {
            level: vec![1.0],
        });
        let system = ForcedLinearSystem::new(&model);
        let mut stepper = Rk4::new(1);
        let mut t = 0.0;
        let mut state = vec![0.0];
        stepper.step(&system, &mut t, &mut state, 0.5);
        assert!((t - 0.5).abs() < 1e-12);
        assert!((state[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn simulate_tracks_exponential_decay() {
        let model = LinearModel::new(vec![-1.0], 1, 0);
        let trajectory =
            simulate(&model, &[1.0], &TimeGrid::uniform(2.0, 4), 50).expect("simulate");
        for (idx, &t) in trajectory.times.iter().enumerate() {
            assert!((trajectory.points[idx][0] - (-t).exp()).abs() < 1e-9);
        }
    }

    #[test]
    fn simulate_rejects_bad_inputs() {
        let model = LinearModel::new(vec![-1.0], 1, 0);
        assert!(simulate(&model, &[1.0, 2.0], &TimeGrid::uniform(1.0, 1), 10).is_err());
        assert!(simulate(&model, &[1.0], &TimeGrid::uniform(1.0, 1), 0).is_err());
    }

    #[test]
    fn saddle_path_agrees_with_forward_integration() {
        let model = LinearModel::new(
            vec![-0.5, 0.0, 0.1, 0.0, -2.0, 0.3, 0.2, 0.1, 1.0],
            2,
            1,
        )
        .with_forcing(Forcing::Decaying {
            level: vec![0.2, 0.0, 0.1],
            shocks: vec![DecayingShock {
                impulse: vec![1.0, -0.5, 0.3],
                decay: 0.6,
            }],
        });
        let boundary = BoundaryConditions::steady_state(vec![0.5, -0.5]);
        let solution =
            solve_saddle_path(&model, &boundary, &SolverSettings::default()).expect("solve");
        let grid = TimeGrid::uniform(2.0, 8);
        let analytic = solution.sample(&grid).expect("sample");
        let numeric = simulate(&model, &analytic.points[0], &grid, 200).expect("simulate");

        for (a, b) in analytic.points.iter().zip(&numeric.points) {
            for (u, v) in a.iter().zip(b) {
                assert!((u - v).abs() < 1e-8, "analytic {u} vs integrated {v}");
            }
        }
    }
}
