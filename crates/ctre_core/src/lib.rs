//! The `ctre_core` crate solves linear rational-expectations models in
//! continuous time. A model `d/dt [x; y] = A [x; y] + f(t)` splits its
//! variables into predetermined states `x` and forward-looking jumps `y`; the
//! solver returns the unique bounded (saddle-path) trajectory.
//!
//! Key components:
//! - **Model**: `LinearModel`, `Forcing`, `BoundaryConditions`, `TimeGrid`.
//! - **Eigen**: mode decomposition with Blanchard-Kahn and diagonalizability checks.
//! - **Solver**: `solve` / `solve_saddle_path` for infinite or finite horizons.
//! - **Policy**: the reduced-form rule `xdot = B (x - x*)`, `y = y* + F (x - x*)`.
//! - **Simulate**: RK4 forward integration for cross-checks.

pub mod eigen;
pub mod error;
mod forcing;
pub mod model;
pub mod policy;
pub mod settings;
pub mod simulate;
pub mod solver;
pub mod traits;

pub use eigen::{analyze_spectrum, ComplexNumber, EigenPair, SpectrumReport};
pub use error::{SolverError, SolverResult};
pub use model::{
    BoundaryConditions, DecayingShock, Forcing, LinearModel, TerminalCondition, TimeGrid,
};
pub use policy::{policy_rule, PolicyRule};
pub use settings::SolverSettings;
pub use simulate::simulate;
pub use solver::{solve, solve_saddle_path, SaddlePathSolution, Trajectory};
