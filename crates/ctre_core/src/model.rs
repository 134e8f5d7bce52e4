//! Model, forcing, boundary and grid types.
//!
//! A model is the linear ODE `d/dt [x; y] = A [x; y] + f(t)` where the first
//! `n_states` variables are predetermined and the remaining `n_jumps` are
//! forward-looking. Matrices are stored row-major as flat `Vec<f64>` so they
//! serialize cleanly across the bindings layer.

use crate::error::{SolverError, SolverResult};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinearModel {
    /// Row-major `n×n` dynamics matrix.
    pub dynamics: Vec<f64>,
    pub n_states: usize,
    pub n_jumps: usize,
    #[serde(default)]
    pub forcing: Forcing,
}

impl LinearModel {
    pub fn new(dynamics: Vec<f64>, n_states: usize, n_jumps: usize) -> Self {
        Self {
            dynamics,
            n_states,
            n_jumps,
            forcing: Forcing::Zero,
        }
    }

    pub fn with_forcing(mut self, forcing: Forcing) -> Self {
        self.forcing = forcing;
        self
    }

    pub fn dimension(&self) -> usize {
        self.n_states + self.n_jumps
    }

    pub fn matrix(&self) -> DMatrix<f64> {
        let dim = self.dimension();
        DMatrix::from_row_slice(dim, dim, &self.dynamics)
    }

    pub fn validate(&self) -> SolverResult<()> {
        let dim = self.dimension();
        if dim == 0 {
            return Err(SolverError::validation(
                "model must have at least one variable",
            ));
        }
        if self.dynamics.len() != dim * dim {
            return Err(SolverError::validation(format!(
                "dynamics matrix has {} entries, expected {}x{} = {} for {} states and {} jumps",
                self.dynamics.len(),
                dim,
                dim,
                dim * dim,
                self.n_states,
                self.n_jumps
            )));
        }
        if let Some(idx) = self.dynamics.iter().position(|v| !v.is_finite()) {
            return Err(SolverError::validation(format!(
                "dynamics entry ({}, {}) is not finite",
                idx / dim,
                idx % dim
            )));
        }
        self.forcing.validate(dim)
    }
}

/// One exponentially decaying shock `impulse · e^{-decay·t}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecayingShock {
    pub impulse: Vec<f64>,
    pub decay: f64,
}

/// Exogenous forcing term `f(t)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type")]
pub enum Forcing {
    #[default]
    Zero,
    Constant {
        level: Vec<f64>,
    },
    Decaying {
        level: Vec<f64>,
        shocks: Vec<DecayingShock>,
    },
    /// Zero-order hold: `values[i]` applies on `[times[i], times[i+1])` and the
    /// last value holds forever.
    Sampled {
        times: Vec<f64>,
        values: Vec<Vec<f64>>,
    },
}

/// A forcing segment `vector · e^{-decay·(s - start)}` supported on `[start, end)`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ForcingPiece {
    pub start: f64,
    pub end: f64,
    pub decay: f64,
    pub vector: Vec<f64>,
}

impl Forcing {
    pub fn validate(&self, dim: usize) -> SolverResult<()> {
        match self {
            Forcing::Zero => Ok(()),
            Forcing::Constant { level } => check_vector("forcing level", level, dim),
            Forcing::Decaying { level, shocks } => {
                check_vector("forcing level", level, dim)?;
                for (idx, shock) in shocks.iter().enumerate() {
                    check_vector(&format!("shock {idx} impulse"), &shock.impulse, dim)?;
                    if !shock.decay.is_finite() || shock.decay <= 0.0 {
                        return Err(SolverError::validation(format!(
                            "shock {idx} decay must be positive and finite, got {}",
                            shock.decay
                        )));
                    }
                }
                Ok(())
            }
            Forcing::Sampled { times, values } => {
                if times.is_empty() {
                    return Err(SolverError::validation(
                        "sampled forcing needs at least one sample",
                    ));
                }
                if times.len() != values.len() {
                    return Err(SolverError::validation(format!(
                        "sampled forcing has {} times but {} values",
                        times.len(),
                        values.len()
                    )));
                }
                if times[0] != 0.0 {
                    return Err(SolverError::validation(format!(
                        "sampled forcing must start at t = 0, got {}",
                        times[0]
                    )));
                }
                for window in times.windows(2) {
                    if !window[1].is_finite() || window[1] <= window[0] {
                        return Err(SolverError::validation(
                            "sampled forcing times must be finite and strictly increasing",
                        ));
                    }
                }
                for (idx, value) in values.iter().enumerate() {
                    check_vector(&format!("forcing sample {idx}"), value, dim)?;
                }
                Ok(())
            }
        }
    }

    /// Constant value the forcing settles to as `t → ∞`.
    pub fn long_run(&self, dim: usize) -> Vec<f64> {
        match self {
            Forcing::Zero => vec![0.0; dim],
            Forcing::Constant { level } | Forcing::Decaying { level, .. } => level.clone(),
            Forcing::Sampled { values, .. } => {
                values.last().cloned().unwrap_or_else(|| vec![0.0; dim])
            }
        }
    }

    pub fn value_at(&self, t: f64, dim: usize) -> Vec<f64> {
        match self {
            Forcing::Zero => vec![0.0; dim],
            Forcing::Constant { level } => level.clone(),
            Forcing::Decaying { level, shocks } => {
                let mut out = level.clone();
                for shock in shocks {
                    let weight = (-shock.decay * t).exp();
                    for (o, v) in out.iter_mut().zip(&shock.impulse) {
                        *o += weight * v;
                    }
                }
                out
            }
            Forcing::Sampled { times, values } => {
                let idx = times.partition_point(|&s| s <= t).saturating_sub(1);
                values
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; dim])
            }
        }
    }

    /// Returns the same forcing multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Forcing {
        let scale = |v: &Vec<f64>| v.iter().map(|x| x * factor).collect::<Vec<_>>();
        match self {
            Forcing::Zero => Forcing::Zero,
            Forcing::Constant { level } => Forcing::Constant {
                level: scale(level),
            },
            Forcing::Decaying { level, shocks } => Forcing::Decaying {
                level: scale(level),
                shocks: shocks
                    .iter()
                    .map(|shock| DecayingShock {
                        impulse: scale(&shock.impulse),
                        decay: shock.decay,
                    })
                    .collect(),
            },
            Forcing::Sampled { times, values } => Forcing::Sampled {
                times: times.clone(),
                values: values.iter().map(scale).collect(),
            },
        }
    }

    /// Splits the forcing into exponential pieces. With `deviation` set, the
    /// long-run level is subtracted so every returned piece decays to zero.
    pub(crate) fn pieces(&self, dim: usize, deviation: bool) -> Vec<ForcingPiece> {
        let mut pieces = Vec::new();
        let mut push = |start: f64, end: f64, decay: f64, vector: Vec<f64>| {
            if vector.iter().any(|v| *v != 0.0) {
                pieces.push(ForcingPiece {
                    start,
                    end,
                    decay,
                    vector,
                });
            }
        };
        match self {
            Forcing::Zero => {}
            Forcing::Constant { level } => {
                if !deviation {
                    push(0.0, f64::INFINITY, 0.0, level.clone());
                }
            }
            Forcing::Decaying { level, shocks } => {
                if !deviation {
                    push(0.0, f64::INFINITY, 0.0, level.clone());
                }
                for shock in shocks {
                    push(0.0, f64::INFINITY, shock.decay, shock.impulse.clone());
                }
            }
            Forcing::Sampled { times, values } => {
                let last = self.long_run(dim);
                for i in 0..times.len().saturating_sub(1) {
                    let vector = if deviation {
                        values[i].iter().zip(&last).map(|(v, l)| v - l).collect()
                    } else {
                        values[i].clone()
                    };
                    push(times[i], times[i + 1], 0.0, vector);
                }
                if !deviation {
                    if let Some(&start) = times.last() {
                        push(start, f64::INFINITY, 0.0, last);
                    }
                }
            }
        }
        pieces
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type")]
pub enum TerminalCondition {
    /// Infinite horizon: jumps are pinned by convergence to the steady state.
    #[default]
    SteadyState,
    /// Finite horizon `T` with explicit jump values at `T`.
    Fixed { horizon: f64, jumps: Vec<f64> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoundaryConditions {
    pub initial_state: Vec<f64>,
    #[serde(default)]
    pub terminal: TerminalCondition,
}

impl BoundaryConditions {
    pub fn steady_state(initial_state: Vec<f64>) -> Self {
        Self {
            initial_state,
            terminal: TerminalCondition::SteadyState,
        }
    }

    pub fn fixed(initial_state: Vec<f64>, horizon: f64, jumps: Vec<f64>) -> Self {
        Self {
            initial_state,
            terminal: TerminalCondition::Fixed { horizon, jumps },
        }
    }

    pub fn horizon(&self) -> Option<f64> {
        match &self.terminal {
            TerminalCondition::SteadyState => None,
            TerminalCondition::Fixed { horizon, .. } => Some(*horizon),
        }
    }

    pub fn validate(&self, model: &LinearModel) -> SolverResult<()> {
        check_vector("initial state", &self.initial_state, model.n_states)?;
        if let TerminalCondition::Fixed { horizon, jumps } = &self.terminal {
            if !horizon.is_finite() || *horizon <= 0.0 {
                return Err(SolverError::validation(format!(
                    "terminal horizon must be positive and finite, got {horizon}"
                )));
            }
            if jumps.len() != model.n_jumps {
                return Err(SolverError::validation(format!(
                    "{} terminal conditions supplied for {} jump variables",
                    jumps.len(),
                    model.n_jumps
                )));
            }
            check_vector("terminal jumps", jumps, model.n_jumps)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TimeGrid {
    /// `steps + 1` equally spaced points on `[0, horizon]`.
    Uniform { horizon: f64, steps: usize },
    Points { times: Vec<f64> },
}

impl TimeGrid {
    pub fn uniform(horizon: f64, steps: usize) -> Self {
        TimeGrid::Uniform { horizon, steps }
    }

    pub fn times(&self) -> SolverResult<Vec<f64>> {
        match self {
            TimeGrid::Uniform { horizon, steps } => {
                if !horizon.is_finite() || *horizon <= 0.0 {
                    return Err(SolverError::validation(format!(
                        "grid horizon must be positive and finite, got {horizon}"
                    )));
                }
                if *steps == 0 {
                    return Err(SolverError::validation("grid needs at least one step"));
                }
                let dt = horizon / *steps as f64;
                let mut times: Vec<f64> = (0..*steps).map(|i| i as f64 * dt).collect();
                times.push(*horizon);
                Ok(times)
            }
            TimeGrid::Points { times } => {
                if times.is_empty() {
                    return Err(SolverError::validation("grid has no time points"));
                }
                if times.iter().any(|t| !t.is_finite() || *t < 0.0) {
                    return Err(SolverError::validation(
                        "grid times must be finite and non-negative",
                    ));
                }
                if times.windows(2).any(|w| w[1] < w[0]) {
                    return Err(SolverError::validation("grid times must be non-decreasing"));
                }
                Ok(times.clone())
            }
        }
    }
}

fn check_vector(what: &str, values: &[f64], expected: usize) -> SolverResult<()> {
    if values.len() != expected {
        return Err(SolverError::validation(format!(
            "{what} has length {}, expected {expected}",
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(SolverError::validation(format!(
            "{what} contains non-finite values"
        )));
    }
    Ok(())
}
