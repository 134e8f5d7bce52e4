//! Eigen-decomposition of the dynamics matrix.
//!
//! Eigenvalues come from the real Schur form. Eigenvectors are recovered as
//! right-singular vectors of `A - λI` for the smallest singular values, which
//! also exposes defective (non-diagonalizable) repeated eigenvalues. Modes are
//! reordered so that all stable eigenvalues come first.

use crate::error::{SolverError, SolverResult};
use crate::model::LinearModel;
use crate::settings::SolverSettings;
use nalgebra::linalg::SVD;
use nalgebra::DMatrix;
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, trace, warn};

pub(crate) type C64 = Complex<f64>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ComplexNumber {
    pub re: f64,
    pub im: f64,
}

impl From<Complex<f64>> for ComplexNumber {
    fn from(value: Complex<f64>) -> Self {
        Self {
            re: value.re,
            im: value.im,
        }
    }
}

impl From<ComplexNumber> for Complex<f64> {
    fn from(value: ComplexNumber) -> Self {
        Complex::new(value.re, value.im)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EigenPair {
    pub value: ComplexNumber,
    pub vector: Vec<ComplexNumber>,
}

/// Summary of the spectrum of a model, without enforcing determinacy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumReport {
    pub n_states: usize,
    pub stable_count: usize,
    pub unstable_count: usize,
    pub determinate: bool,
    pub diagonalizable: bool,
    /// Condition number of the eigenvector basis, when one exists.
    pub condition_number: Option<f64>,
    /// Stable modes first, then unstable ones.
    pub eigenpairs: Vec<EigenPair>,
}

/// Ordered eigenvalues and the stable count, before any eigenvector work.
#[derive(Debug, Clone)]
pub(crate) struct Spectrum {
    pub eigenvalues: Vec<C64>,
    pub n_stable: usize,
}

impl Spectrum {
    pub fn dimension(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn n_unstable(&self) -> usize {
        self.dimension() - self.n_stable
    }

    pub fn check_determinacy(&self, n_states: usize) -> SolverResult<()> {
        if self.n_stable != n_states {
            return Err(SolverError::Determinacy {
                n_states,
                stable: self.n_stable,
                unstable: self.n_unstable(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ModalDecomposition {
    pub eigenvalues: Vec<C64>,
    /// Unit eigenvectors as columns, in the same order as `eigenvalues`.
    pub vectors: DMatrix<C64>,
    pub inverse: DMatrix<C64>,
    pub n_stable: usize,
    pub condition: f64,
}

impl ModalDecomposition {
    pub fn dimension(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn eigenpairs(&self) -> Vec<EigenPair> {
        self.eigenvalues
            .iter()
            .enumerate()
            .map(|(k, &value)| EigenPair {
                value: value.into(),
                vector: self.vectors.column(k).iter().map(|&c| c.into()).collect(),
            })
            .collect()
    }
}

/// Eigenvalues of `matrix`, stable modes first.
pub(crate) fn spectrum(
    matrix: &DMatrix<f64>,
    settings: &SolverSettings,
) -> SolverResult<Spectrum> {
    let dim = matrix.nrows();
    if dim == 0 || matrix.ncols() != dim {
        return Err(SolverError::validation(format!(
            "dynamics matrix must be square and non-empty, got {}x{}",
            matrix.nrows(),
            matrix.ncols()
        )));
    }

    let mut eigenvalues: Vec<C64> = matrix.complex_eigenvalues().iter().cloned().collect();
    if let Some(bad) = eigenvalues
        .iter()
        .find(|v| !v.re.is_finite() || !v.im.is_finite())
    {
        return Err(SolverError::numerical(
            format!("eigenvalue computation produced a non-finite value {bad}"),
            f64::INFINITY,
            0.0,
        ));
    }

    let is_stable = |v: &C64| v.re < -settings.stability_tolerance;
    eigenvalues.sort_by(|a, b| {
        is_stable(b)
            .cmp(&is_stable(a))
            .then(a.re.partial_cmp(&b.re).unwrap_or(Ordering::Equal))
            .then(a.im.partial_cmp(&b.im).unwrap_or(Ordering::Equal))
    });
    let n_stable = eigenvalues.iter().filter(|v| is_stable(v)).count();

    debug!(dim, n_stable, n_unstable = dim - n_stable, "computed spectrum");
    Ok(Spectrum {
        eigenvalues,
        n_stable,
    })
}

/// Completes `spectrum` with an eigenvector basis, giving `V Λ V⁻¹`.
pub(crate) fn eigenvectors(
    matrix: &DMatrix<f64>,
    spectrum: Spectrum,
    settings: &SolverSettings,
) -> SolverResult<ModalDecomposition> {
    let Spectrum {
        eigenvalues,
        n_stable,
    } = spectrum;
    let dim = eigenvalues.len();
    let tolerance = settings.defect_tolerance * matrix.norm().max(1.0);
    // Candidates closer than this to the span of earlier cluster members are
    // treated as duplicates of them.
    let independence = settings.max_condition.sqrt().recip();
    let complex_matrix = matrix.map(|v| Complex::new(v, 0.0));
    let mut vectors = DMatrix::<C64>::zeros(dim, dim);

    for cluster in cluster_eigenvalues(&eigenvalues, n_stable, settings.eigen_cluster_tolerance) {
        // Orthonormal basis of the vectors already picked for this cluster.
        let mut picked: Vec<Vec<C64>> = Vec::with_capacity(cluster.len());
        for &k in &cluster {
            let lambda = eigenvalues[k];
            let candidates = smallest_singular_vectors(&complex_matrix, lambda, picked.len() + 1)?;
            let best = candidates
                .into_iter()
                .map(|(sigma, vector)| {
                    let rest = remove_span(&vector, &picked);
                    (sigma, vector, rest)
                })
                .filter(|(_, _, rest)| vector_norm(rest) >= independence)
                .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

            let residual = best.as_ref().map_or(f64::INFINITY, |(sigma, _, _)| *sigma);
            let Some((_, vector, mut rest)) = best.filter(|(sigma, _, _)| *sigma <= tolerance)
            else {
                let what = if cluster.len() > 1 {
                    format!(
                        "dynamics matrix is not diagonalizable: eigenvalue {lambda} repeated {} \
                         times lacks independent eigenvectors",
                        cluster.len()
                    )
                } else {
                    format!("eigenvector residual for eigenvalue {lambda} exceeds tolerance")
                };
                return Err(SolverError::numerical(what, residual, tolerance));
            };

            normalize_complex_vector(&mut rest);
            picked.push(rest);
            for (i, entry) in vector.into_iter().enumerate() {
                vectors[(i, k)] = entry;
            }
            trace!(eigenvalue = %lambda, residual, "extracted eigenvector");
        }
    }

    let singular = vectors.clone().singular_values();
    let s_max = singular.iter().cloned().fold(0.0, f64::max);
    let s_min = singular.iter().cloned().fold(f64::INFINITY, f64::min);
    let condition = if s_min > 0.0 { s_max / s_min } else { f64::INFINITY };
    if !condition.is_finite() || condition > settings.max_condition {
        return Err(SolverError::numerical(
            "eigenvector basis is ill-conditioned; dynamics matrix is near-defective",
            condition,
            settings.max_condition,
        ));
    }

    let inverse = vectors.clone().try_inverse().ok_or_else(|| {
        SolverError::numerical(
            "eigenvector basis is singular",
            condition,
            settings.max_condition,
        )
    })?;

    debug!(dim, condition, "built eigenvector basis");

    Ok(ModalDecomposition {
        eigenvalues,
        vectors,
        inverse,
        n_stable,
        condition,
    })
}

/// Decomposes `matrix` as `V Λ V⁻¹` with stable modes ordered first.
#[cfg(test)]
pub(crate) fn decompose(
    matrix: &DMatrix<f64>,
    settings: &SolverSettings,
) -> SolverResult<ModalDecomposition> {
    let spectrum = spectrum(matrix, settings)?;
    eigenvectors(matrix, spectrum, settings)
}

/// Enforces the Blanchard-Kahn count before extracting eigenvectors, so an
/// indeterminate model is reported as such even when it is also defective.
pub(crate) fn determinate_decomposition(
    model: &LinearModel,
    settings: &SolverSettings,
) -> SolverResult<ModalDecomposition> {
    let matrix = model.matrix();
    let spectrum = spectrum(&matrix, settings)?;
    spectrum.check_determinacy(model.n_states)?;
    eigenvectors(&matrix, spectrum, settings)
}

/// Reports the spectrum of `model` without requiring the saddle-path condition.
///
/// A non-diagonalizable model still gets its eigenvalue counts; its
/// eigenpairs then carry empty vectors and `condition_number` is `None`.
pub fn analyze_spectrum(
    model: &LinearModel,
    settings: &SolverSettings,
) -> SolverResult<SpectrumReport> {
    settings.validate()?;
    model.validate()?;
    let matrix = model.matrix();
    let spectrum = spectrum(&matrix, settings)?;
    let stable_count = spectrum.n_stable;
    let unstable_count = spectrum.n_unstable();
    let values = spectrum.eigenvalues.clone();

    let (diagonalizable, condition_number, eigenpairs) =
        match eigenvectors(&matrix, spectrum, settings) {
            Ok(modal) => (true, Some(modal.condition), modal.eigenpairs()),
            Err(err) if err.is_numerical() => {
                warn!(error = %err, "no eigenvector basis for spectrum report");
                let pairs = values
                    .into_iter()
                    .map(|value| EigenPair {
                        value: value.into(),
                        vector: Vec::new(),
                    })
                    .collect();
                (false, None, pairs)
            }
            Err(err) => return Err(err),
        };

    Ok(SpectrumReport {
        n_states: model.n_states,
        stable_count,
        unstable_count,
        determinate: stable_count == model.n_states,
        diagonalizable,
        condition_number,
        eigenpairs,
    })
}

/// Groups indices of numerically repeated eigenvalues. Stable and unstable
/// modes are never grouped together.
fn cluster_eigenvalues(
    eigenvalues: &[C64],
    n_stable: usize,
    tolerance: f64,
) -> Vec<Vec<usize>> {
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for (k, value) in eigenvalues.iter().enumerate() {
        let found = clusters.iter_mut().find(|cluster| {
            let head = cluster[0];
            (head < n_stable) == (k < n_stable)
                && (eigenvalues[head] - value).norm() <= tolerance * (1.0 + value.norm())
        });
        match found {
            Some(cluster) => cluster.push(k),
            None => clusters.push(vec![k]),
        }
    }
    clusters
}

/// The `count` right-singular vectors of `A - shift·I` with the smallest
/// singular values, paired with those values in ascending order.
fn smallest_singular_vectors(
    complex_matrix: &DMatrix<C64>,
    shift: C64,
    count: usize,
) -> SolverResult<Vec<(f64, Vec<C64>)>> {
    let dim = complex_matrix.nrows();
    let mut shifted = complex_matrix.clone();
    for i in 0..dim {
        shifted[(i, i)] -= shift;
    }

    let svd = SVD::new(shifted, false, true);
    let v_t = svd.v_t.ok_or_else(|| {
        SolverError::numerical(
            format!("failed to compute eigenvectors for eigenvalue {shift}"),
            f64::INFINITY,
            0.0,
        )
    })?;

    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| {
        svd.singular_values[a]
            .partial_cmp(&svd.singular_values[b])
            .unwrap_or(Ordering::Equal)
    });

    Ok(order
        .into_iter()
        .take(count)
        .map(|row_index| {
            // Rows of V^H are conjugated right-singular vectors.
            let mut vector: Vec<C64> = v_t.row(row_index).iter().map(|c| c.conj()).collect();
            normalize_complex_vector(&mut vector);
            (svd.singular_values[row_index], vector)
        })
        .collect())
}

/// Component of `vector` orthogonal to the orthonormal `basis`.
fn remove_span(vector: &[C64], basis: &[Vec<C64>]) -> Vec<C64> {
    let mut rest = vector.to_vec();
    for b in basis {
        let overlap: C64 = b.iter().zip(vector).map(|(u, v)| u.conj() * v).sum();
        for (r, u) in rest.iter_mut().zip(b) {
            *r -= overlap * u;
        }
    }
    rest
}

fn vector_norm(vec: &[C64]) -> f64 {
    vec.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt()
}

fn normalize_complex_vector(vec: &mut [C64]) {
    let norm = vector_norm(vec);
    if norm > 0.0 {
        for entry in vec {
            *entry /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn residual(matrix: &DMatrix<f64>, modal: &ModalDecomposition) -> f64 {
        let complex_matrix = matrix.map(|v| Complex::new(v, 0.0));
        let lambda = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(
            modal.eigenvalues.clone(),
        ));
        let lhs = &complex_matrix * &modal.vectors;
        let rhs = &modal.vectors * lambda;
        (lhs - rhs).iter().map(|c| c.norm()).fold(0.0, f64::max)
    }

    #[test]
    fn decompose_orders_stable_modes_first() {
        let matrix =
            DMatrix::from_row_slice(3, 3, &[2.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, -3.0]);
        let modal = decompose(&matrix, &SolverSettings::default()).expect("decomposition");
        assert_eq!(modal.n_stable, 2);
        assert!((modal.eigenvalues[0].re + 3.0).abs() < 1e-12);
        assert!((modal.eigenvalues[1].re + 1.0).abs() < 1e-12);
        assert!((modal.eigenvalues[2].re - 2.0).abs() < 1e-12);
        assert!(residual(&matrix, &modal) < 1e-10);
        for k in 0..3 {
            assert!((modal.vectors.column(k).norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn decompose_handles_complex_pair() {
        let matrix = DMatrix::from_row_slice(2, 2, &[-1.0, 2.0, -2.0, -1.0]);
        let modal = decompose(&matrix, &SolverSettings::default()).expect("decomposition");
        assert_eq!(modal.n_stable, 2);
        assert!(modal.eigenvalues.iter().all(|v| (v.re + 1.0).abs() < 1e-12));
        assert!(modal.eigenvalues.iter().all(|v| (v.im.abs() - 2.0).abs() < 1e-12));
        assert!(residual(&matrix, &modal) < 1e-10);
        let identity = &modal.vectors * &modal.inverse;
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((identity[(i, j)] - Complex::new(expected, 0.0)).norm() < 1e-10);
            }
        }
    }

    #[test]
    fn decompose_rejects_defective_matrix() {
        let matrix = DMatrix::from_row_slice(2, 2, &[-1.0, 1.0, 0.0, -1.0]);
        let err = decompose(&matrix, &SolverSettings::default()).expect_err("defective");
        assert!(err.is_numerical());
        assert!(format!("{err}").contains("not diagonalizable"));
    }

    #[test]
    fn decompose_accepts_repeated_diagonalizable_eigenvalue() {
        let matrix =
            DMatrix::from_row_slice(3, 3, &[-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 2.0]);
        let modal = decompose(&matrix, &SolverSettings::default()).expect("decomposition");
        assert_eq!(modal.n_stable, 2);
        assert!(residual(&matrix, &modal) < 1e-10);
        assert!(modal.condition < 10.0);
    }

    #[test]
    fn zero_real_part_counts_as_unstable() {
        let matrix = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, -1.0, 0.0]);
        let spectrum = spectrum(&matrix, &SolverSettings::default()).expect("spectrum");
        assert_eq!(spectrum.n_stable, 0);
        let err = spectrum.check_determinacy(1).expect_err("indeterminate");
        assert_eq!(
            err,
            SolverError::Determinacy {
                n_states: 1,
                stable: 0,
                unstable: 2
            }
        );
    }

    #[test]
    fn analyze_spectrum_reports_without_failing() {
        let model = LinearModel::new(vec![1.0, 0.0, 0.0, 2.0], 1, 1);
        let report = analyze_spectrum(&model, &SolverSettings::default()).expect("report");
        assert_eq!(report.stable_count, 0);
        assert_eq!(report.unstable_count, 2);
        assert!(!report.determinate);
        assert!(report.diagonalizable);
        assert_eq!(report.eigenpairs.len(), 2);
    }

    #[test]
    fn analyze_spectrum_counts_defective_model() {
        let model = LinearModel::new(vec![1.0, 1.0, 0.0, 1.0], 1, 1);
        let report = analyze_spectrum(&model, &SolverSettings::default()).expect("report");
        assert_eq!(report.stable_count, 0);
        assert_eq!(report.unstable_count, 2);
        assert!(!report.diagonalizable);
        assert_eq!(report.condition_number, None);
        assert!(report.eigenpairs.iter().all(|pair| pair.vector.is_empty()));
    }

    #[test]
    fn determinacy_is_checked_before_eigenvectors() {
        let model = LinearModel::new(vec![1.0, 1.0, 0.0, 1.0], 1, 1);
        let err = determinate_decomposition(&model, &SolverSettings::default())
            .expect_err("indeterminate");
        assert_eq!(
            err,
            SolverError::Determinacy {
                n_states: 1,
                stable: 0,
                unstable: 2
            }
        );
    }

    #[test]
    fn decompose_separates_nearly_equal_distinct_eigenvalues() {
        let matrix = DMatrix::from_row_slice(
            3,
            3,
            &[-1.0, 0.0, 0.0, 0.0, -1.0 - 5e-8, 0.0, 0.0, 0.0, 0.5],
        );
        let modal = decompose(&matrix, &SolverSettings::default()).expect("decomposition");
        assert_eq!(modal.n_stable, 2);
        assert!(residual(&matrix, &modal) < 1e-12);
        assert!(modal.condition < 1.0 + 1e-6);
    }

    #[test]
    fn cluster_groups_close_values_only() {
        let values = vec![
            Complex::new(-1.0, 0.0),
            Complex::new(-1.0 + 1e-10, 0.0),
            Complex::new(-2.0, 0.0),
        ];
        let clusters = cluster_eigenvalues(&values, 3, 1e-7);
        assert_eq!(clusters, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn cluster_keeps_stable_and_unstable_apart() {
        let values = vec![Complex::new(-2e-10, 0.0), Complex::new(0.0, 0.0)];
        let clusters = cluster_eigenvalues(&values, 1, 1e-7);
        assert_eq!(clusters, vec![vec![0], vec![1]]);
    }
}
