use thiserror::Error;

pub type SolverResult<T> = Result<T, SolverError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// Inputs are malformed or inconsistent. Raised before any numerical work.
    #[error("Invalid input: {what}")]
    Validation { what: String },

    /// The stable/unstable eigenvalue split does not match the number of states.
    #[error(
        "Fails Blanchard-Kahn condition: {n_states} states but {stable} stable \
         and {unstable} unstable eigenvalues"
    )]
    Determinacy {
        n_states: usize,
        stable: usize,
        unstable: usize,
    },

    #[error("Numerical failure: {what} (residual={residual:e}, tolerance={tolerance:e})")]
    Numerical {
        what: String,
        residual: f64,
        tolerance: f64,
    },
}

impl SolverError {
    pub fn validation(what: impl Into<String>) -> Self {
        SolverError::Validation { what: what.into() }
    }

    pub fn numerical(what: impl Into<String>, residual: f64, tolerance: f64) -> Self {
        SolverError::Numerical {
            what: what.into(),
            residual,
            tolerance,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SolverError::Validation { .. })
    }

    pub fn is_determinacy(&self) -> bool {
        matches!(self, SolverError::Determinacy { .. })
    }

    pub fn is_numerical(&self) -> bool {
        matches!(self, SolverError::Numerical { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinacy_message_reports_counts() {
        let err = SolverError::Determinacy {
            n_states: 1,
            stable: 0,
            unstable: 2,
        };
        let message = format!("{err}");
        assert!(message.contains("1 states"));
        assert!(message.contains("0 stable"));
        assert!(message.contains("2 unstable"));
        assert!(err.is_determinacy());
    }

    #[test]
    fn numerical_message_includes_residual_and_tolerance() {
        let err = SolverError::numerical("complex modes failed to cancel", 1e-3, 1e-8);
        let message = format!("{err}");
        assert!(message.contains("complex modes failed to cancel"));
        assert!(message.contains("1e-3"));
        assert!(message.contains("1e-8"));
        assert!(err.is_numerical());
        assert!(!err.is_validation());
    }
}
