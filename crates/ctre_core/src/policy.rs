//! Reduced-form law of motion on the stable manifold.
//!
//! With `N` states, the saddle path satisfies
//!
//! ```text
//! xdot = B (x - x*)
//! y    = y* + F (x - x*)
//! ```
//!
//! where `B = V_xs Λ_s V_xs⁻¹` and `F = V_ys V_xs⁻¹` are built from the stable
//! eigenvectors. Both are real even when the stable roots come in complex
//! pairs. The rule describes the dynamics once transitory forcing has died out.

use crate::eigen::{determinate_decomposition, ComplexNumber, C64};
use crate::error::{SolverError, SolverResult};
use crate::model::LinearModel;
use crate::settings::SolverSettings;
use crate::solver::{condition_number, real_part, steady_state};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyRule {
    pub n_states: usize,
    pub n_jumps: usize,
    /// Row-major `n_states×n_states` matrix `B`.
    pub transition: Vec<f64>,
    /// Row-major `n_jumps×n_states` matrix `F`.
    pub jump_response: Vec<f64>,
    pub steady_state: Vec<f64>,
    pub stable_eigenvalues: Vec<ComplexNumber>,
}

impl PolicyRule {
    pub fn transition_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.n_states, self.n_states, &self.transition)
    }

    pub fn jump_response_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.n_jumps, self.n_states, &self.jump_response)
    }

    /// Jump values implied by the state vector `x`.
    pub fn jumps_for(&self, state: &[f64]) -> SolverResult<Vec<f64>> {
        let gap = self.state_gap(state)?;
        let jumps = self.jump_response_matrix() * gap;
        Ok(jumps
            .iter()
            .zip(&self.steady_state[self.n_states..])
            .map(|(j, base)| j + base)
            .collect())
    }

    /// Time derivative of the state vector `x` on the saddle path.
    pub fn state_drift(&self, state: &[f64]) -> SolverResult<Vec<f64>> {
        let gap = self.state_gap(state)?;
        Ok((self.transition_matrix() * gap).iter().cloned().collect())
    }

    fn state_gap(&self, state: &[f64]) -> SolverResult<DVector<f64>> {
        if state.len() != self.n_states {
            return Err(SolverError::validation(format!(
                "state has length {}, expected {}",
                state.len(),
                self.n_states
            )));
        }
        Ok(DVector::from_iterator(
            self.n_states,
            state.iter().zip(&self.steady_state).map(|(x, s)| x - s),
        ))
    }
}

/// Computes the policy rule `(B, F)` for `model`.
pub fn policy_rule(model: &LinearModel, settings: &SolverSettings) -> SolverResult<PolicyRule> {
    settings.validate()?;
    model.validate()?;

    let modal = determinate_decomposition(model, settings)?;

    let nx = model.n_states;
    let ny = model.n_jumps;
    let steady = steady_state(model)?;

    let (transition, jump_response) = if nx == 0 {
        (Vec::new(), Vec::new())
    } else {
        let v_xs = modal.vectors.view((0, 0), (nx, nx)).into_owned();
        let v_ys = modal.vectors.view((nx, 0), (ny, nx)).into_owned();
        let condition = condition_number(&v_xs);
        if !condition.is_finite() || condition > settings.max_condition {
            return Err(SolverError::numerical(
                "stable eigenvectors do not span the state space",
                condition,
                settings.max_condition,
            ));
        }
        let v_xs_inv = v_xs.clone().try_inverse().ok_or_else(|| {
            SolverError::numerical(
                "stable eigenvector block is singular",
                condition,
                settings.max_condition,
            )
        })?;
        let lambda = DMatrix::from_diagonal(&DVector::<C64>::from_iterator(
            nx,
            modal.eigenvalues.iter().take(nx).cloned(),
        ));
        let b = &v_xs * lambda * &v_xs_inv;
        let f = &v_ys * &v_xs_inv;
        (
            row_major(&b, settings.imaginary_tolerance)?,
            row_major(&f, settings.imaginary_tolerance)?,
        )
    };

    debug!(n_states = nx, n_jumps = ny, "computed policy rule");

    Ok(PolicyRule {
        n_states: nx,
        n_jumps: ny,
        transition,
        jump_response,
        steady_state: steady.iter().cloned().collect(),
        stable_eigenvalues: modal
            .eigenvalues
            .iter()
            .take(nx)
            .map(|&v| v.into())
            .collect(),
    })
}

fn row_major(matrix: &DMatrix<C64>, tolerance: f64) -> SolverResult<Vec<f64>> {
    // nalgebra stores column-major; transpose to read rows in order.
    real_part(&matrix.transpose(), tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundaryConditions, Forcing, TimeGrid};
    use crate::solver::solve;

    #[test]
    fn scalar_policy_matches_closed_form() {
        let model = LinearModel::new(vec![1.0, -2.0, -1.0, 1.0], 1, 1);
        let rule = policy_rule(&model, &SolverSettings::default()).expect("policy");
        let lambda = 1.0 - 2f64.sqrt();
        assert!((rule.transition[0] - lambda).abs() < 1e-12);
        assert!((rule.jump_response[0] - (1.0 - lambda) / 2.0).abs() < 1e-12);
        assert_eq!(rule.stable_eigenvalues.len(), 1);
    }

    #[test]
    fn policy_agrees_with_trajectory() {
        let model = LinearModel::new(
            vec![-0.2, 1.5, 0.1, -1.5, -0.2, 0.0, 0.3, 0.0, 0.7],
            2,
            1,
        )
        .with_forcing(Forcing::Constant {
            level: vec![0.1, 0.0, -0.2],
        });
        let settings = SolverSettings::default();
        let rule = policy_rule(&model, &settings).expect("policy");
        let boundary = BoundaryConditions::steady_state(vec![1.0, -0.5]);
        let trajectory =
            solve(&model, &boundary, &TimeGrid::uniform(4.0, 8), &settings).expect("solve");

        for idx in 0..trajectory.len() {
            let state = trajectory.state(idx).expect("state");
            let jumps = rule.jumps_for(state).expect("jumps");
            assert!((jumps[0] - trajectory.jumps(idx).expect("jumps")[0]).abs() < 1e-10);
        }

        // xdot from the rule matches the full dynamics on the path.
        let point = &trajectory.points[3];
        let drift = rule.state_drift(trajectory.state(3).expect("state")).expect("drift");
        let full = model.matrix() * DVector::from_vec(point.clone());
        for i in 0..2 {
            let expected = full[i] + model.forcing.value_at(0.0, 3)[i];
            assert!((drift[i] - expected).abs() < 1e-10);
        }
    }

    #[test]
    fn policy_requires_determinacy() {
        let model = LinearModel::new(vec![1.0, 0.0, 0.0, 2.0], 1, 1);
        let err = policy_rule(&model, &SolverSettings::default()).expect_err("indeterminate");
        assert!(err.is_determinacy());
    }

    #[test]
    fn jumps_for_rejects_wrong_length() {
        let model = LinearModel::new(vec![1.0, -2.0, -1.0, 1.0], 1, 1);
        let rule = policy_rule(&model, &SolverSettings::default()).expect("policy");
        assert!(rule.jumps_for(&[1.0, 2.0]).is_err());
    }
}
