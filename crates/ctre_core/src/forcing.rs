//! Forcing terms projected onto the eigenmodes.
//!
//! Every forcing is a sum of pieces `g(s) = w·e^{-ρ(s-a)}` on `[a, b)`. After
//! projection with `V⁻¹` each mode sees scalar weights, and convolutions of the
//! form `∫ e^{λ(τ-s)} g(s) ds` have closed forms. The substitution is picked so
//! that no exponential with positive real part is ever formed.

use crate::eigen::C64;
use crate::error::{SolverError, SolverResult};
use crate::model::ForcingPiece;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex;

const SERIES_THRESHOLD: f64 = 1e-5;

#[derive(Debug, Clone)]
struct ModalPiece {
    start: f64,
    end: f64,
    decay: f64,
    weights: DVector<C64>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ModalForcing {
    pieces: Vec<ModalPiece>,
}

impl ModalForcing {
    pub fn project(pieces: &[ForcingPiece], inverse: &DMatrix<C64>) -> Self {
        let pieces = pieces
            .iter()
            .map(|piece| {
                let raw = DVector::from_iterator(
                    piece.vector.len(),
                    piece.vector.iter().map(|&v| Complex::new(v, 0.0)),
                );
                ModalPiece {
                    start: piece.start,
                    end: piece.end,
                    decay: piece.decay,
                    weights: inverse * raw,
                }
            })
            .collect();
        Self { pieces }
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// `∫_{from}^{to} e^{λ(anchor - s)} g_k(s) ds`, where `to` may be infinite.
    pub fn convolve(
        &self,
        mode: usize,
        lambda: C64,
        anchor: f64,
        from: f64,
        to: f64,
    ) -> SolverResult<C64> {
        let mut total = Complex::new(0.0, 0.0);
        for piece in &self.pieces {
            let weight = piece.weights[mode];
            if weight.norm() == 0.0 {
                continue;
            }
            let lo = from.max(piece.start);
            let hi = to.min(piece.end);
            if hi <= lo {
                continue;
            }
            let mu = lambda + piece.decay;
            let length = hi - lo;
            let value = if mu.re >= 0.0 {
                // s = lo + u
                let prefactor =
                    (lambda * (anchor - lo)).exp() * (-piece.decay * (lo - piece.start)).exp();
                prefactor * exp_integral(-mu, length)?
            } else {
                if !hi.is_finite() {
                    return Err(SolverError::numerical(
                        format!("forcing does not decay fast enough for eigenvalue {lambda}"),
                        mu.re,
                        0.0,
                    ));
                }
                // s = hi - u
                let prefactor =
                    (lambda * (anchor - hi)).exp() * (-piece.decay * (hi - piece.start)).exp();
                prefactor * exp_integral(mu, length)?
            };
            total += weight * value;
        }
        Ok(total)
    }

    /// Variation-of-constants term `∫_0^t e^{λ(t-s)} g_k(s) ds`.
    pub fn forward(&self, mode: usize, lambda: C64, t: f64) -> SolverResult<C64> {
        self.convolve(mode, lambda, t, 0.0, t)
    }

    /// Forward-looking term `∫_t^{end} e^{λ(t-s)} g_k(s) ds`.
    pub fn backward(&self, mode: usize, lambda: C64, t: f64, end: f64) -> SolverResult<C64> {
        self.convolve(mode, lambda, t, t, end)
    }
}

/// `∫_0^length e^{μu} du`, with `length = ∞` allowed when `Re μ < 0`.
pub(crate) fn exp_integral(mu: C64, length: f64) -> SolverResult<C64> {
    if !length.is_finite() {
        if mu.re < 0.0 {
            return Ok(-mu.inv());
        }
        return Err(SolverError::numerical(
            format!("integral of e^({mu}·u) over an infinite horizon diverges"),
            mu.re,
            0.0,
        ));
    }
    let z = mu * length;
    if z.norm() < SERIES_THRESHOLD {
        let one = Complex::new(1.0, 0.0);
        return Ok(length * (one + z / 2.0 + z * z / 6.0 + z * z * z / 24.0));
    }
    Ok((z.exp() - 1.0) / mu)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn piece(start: f64, end: f64, decay: f64, value: f64) -> ForcingPiece {
        ForcingPiece {
            start,
            end,
            decay,
            vector: vec![value],
        }
    }

    fn identity() -> DMatrix<C64> {
        DMatrix::identity(1, 1)
    }

    #[test]
    fn exp_integral_matches_closed_form() {
        let value = exp_integral(Complex::new(-2.0, 0.0), 1.5).expect("integral");
        let expected = (1.0 - (-3.0f64).exp()) / 2.0;
        assert!((value.re - expected).abs() < 1e-14);
        assert!(value.im.abs() < 1e-14);

        let tiny = exp_integral(Complex::new(1e-9, 0.0), 2.0).expect("integral");
        assert!((tiny.re - 2.0).abs() < 1e-8);

        let infinite = exp_integral(Complex::new(-0.5, 1.0), f64::INFINITY).expect("integral");
        let expected = Complex::new(0.5, -1.0).inv();
        assert!((infinite - expected).norm() < 1e-14);
    }

    #[test]
    fn exp_integral_rejects_divergent_tail() {
        let err = exp_integral(Complex::new(0.0, 1.0), f64::INFINITY).expect_err("diverges");
        assert!(err.is_numerical());
    }

    #[test]
    fn forward_constant_forcing_on_stable_mode() {
        let forcing = ModalForcing::project(&[piece(0.0, f64::INFINITY, 0.0, 3.0)], &identity());
        let lambda = Complex::new(-0.5, 0.0);
        let value = forcing.forward(0, lambda, 2.0).expect("forward");
        let expected = 3.0 * (1.0 - (-1.0f64).exp()) / 0.5;
        assert!((value.re - expected).abs() < 1e-12);
    }

    #[test]
    fn backward_decaying_forcing_on_unstable_mode() {
        let forcing = ModalForcing::project(&[piece(0.0, f64::INFINITY, 0.7, 2.0)], &identity());
        let lambda = Complex::new(0.3, 0.0);
        let t = 1.2;
        let value = forcing
            .backward(0, lambda, t, f64::INFINITY)
            .expect("backward");
        let expected = 2.0 * (-0.7 * t).exp() / (0.3 + 0.7);
        assert!((value.re - expected).abs() < 1e-12);
    }

    #[test]
    fn forward_decaying_forcing_with_resonant_decay() {
        let forcing = ModalForcing::project(&[piece(0.0, f64::INFINITY, 0.4, 1.0)], &identity());
        let lambda = Complex::new(-0.4, 0.0);
        let t = 3.0;
        let value = forcing.forward(0, lambda, t).expect("forward");
        let expected = t * (-0.4 * t).exp();
        assert!((value.re - expected).abs() < 1e-12);
    }

    #[test]
    fn sampled_piece_only_counts_overlap() {
        let forcing = ModalForcing::project(&[piece(1.0, 2.0, 0.0, 1.0)], &identity());
        let lambda = Complex::new(-1.0, 0.0);
        assert_eq!(forcing.forward(0, lambda, 0.5).expect("forward"), Complex::new(0.0, 0.0));
        let value = forcing.forward(0, lambda, 3.0).expect("forward");
        let expected = (-1.0f64).exp() - (-2.0f64).exp();
        assert!((value.re - expected).abs() < 1e-12);
    }

    #[test]
    fn persistent_forcing_on_unit_root_is_rejected() {
        let forcing = ModalForcing::project(&[piece(0.0, f64::INFINITY, 0.0, 1.0)], &identity());
        let err = forcing
            .backward(0, Complex::new(0.0, 0.0), 0.0, f64::INFINITY)
            .expect_err("diverges");
        assert!(err.is_numerical());
    }
}
