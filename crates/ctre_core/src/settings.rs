use crate::error::{SolverError, SolverResult};
use serde::{Deserialize, Serialize};

/// Tolerances used by the eigen-decomposition and the real-output check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverSettings {
    /// An eigenvalue is stable when `Re λ < -stability_tolerance`.
    pub stability_tolerance: f64,
    /// Relative distance below which eigenvalues are treated as repeated.
    pub eigen_cluster_tolerance: f64,
    /// Relative singular value above which a repeated eigenvalue is defective.
    pub defect_tolerance: f64,
    /// Largest accepted condition number of the eigenvector basis.
    pub max_condition: f64,
    /// Relative imaginary residue allowed in the real output.
    pub imaginary_tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            stability_tolerance: 1e-10,
            eigen_cluster_tolerance: 1e-7,
            defect_tolerance: 1e-8,
            max_condition: 1e10,
            imaginary_tolerance: 1e-8,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> SolverResult<()> {
        let checks = [
            ("stability_tolerance", self.stability_tolerance),
            ("eigen_cluster_tolerance", self.eigen_cluster_tolerance),
            ("defect_tolerance", self.defect_tolerance),
            ("max_condition", self.max_condition),
            ("imaginary_tolerance", self.imaginary_tolerance),
        ];
        for (name, value) in checks {
            if !value.is_finite() || value < 0.0 {
                return Err(SolverError::validation(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if self.max_condition < 1.0 {
            return Err(SolverError::validation(format!(
                "max_condition must be at least 1, got {}",
                self.max_condition
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        SolverSettings::default()
            .validate()
            .expect("defaults should be valid");
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let settings = SolverSettings {
            imaginary_tolerance: -1.0,
            ..SolverSettings::default()
        };
        let err = settings.validate().expect_err("expected validation error");
        assert!(err.is_validation());
        assert!(format!("{err}").contains("imaginary_tolerance"));
    }

    #[test]
    fn condition_limit_below_one_is_rejected() {
        let settings = SolverSettings {
            max_condition: 0.5,
            ..SolverSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
