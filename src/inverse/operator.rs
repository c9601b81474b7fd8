//! Minimum-norm imaging kernel with loose orientation and depth priors.
//!
//! ```text
//! W  = Λ^{-1/2} Uᵀ                          noise whitener, rank r
//! G' = G · blockdiag(F_j)                   F_j = [normal, t1, t2]
//! R  = blockdiag(w_j · diag(1, loose, loose))
//! G̃  = W G' R^{1/2}                         rescaled so trace(G̃G̃ᵀ) = r
//! G̃G̃ᵀ = U S² Uᵀ
//! K  = R^{1/2} G̃ᵀ U diag(1 / (s² + λ²)) Uᵀ W      [3 · n_sources, C]
//! ```
//!
//! Applying `K` to an epoch yields three components per source in the
//! rotated frame; [`InverseOperator::apply`] reports their Euclidean norm,
//! which does not depend on the frame.
use nalgebra::{DMatrix, DVector, Matrix3, SymmetricEigen, Vector3};
use ndarray::{Array2, ArrayView2};

use super::covariance::NoiseCovariance;
use crate::error::SolverError;

/// Prior variance of the tangential components relative to the normal one.
pub const LOOSE: f64 = 0.2;

/// Depth-weighting exponent.
pub const DEPTH: f64 = 0.8;

/// Largest allowed ratio between depth weights.
pub const DEPTH_LIMIT: f64 = 10.0;

/// Eigenvalues below this fraction of the largest are dropped.
const EIGEN_TOLERANCE: f64 = 1e-10;

/// Imaging kernel plus the parameters it was built with.
#[derive(Debug, Clone)]
pub struct InverseOperator {
    /// `[3 · n_sources, n_channels]`.
    pub kernel: DMatrix<f64>,
    pub lambda2: f64,
    /// Rank of the noise whitener.
    pub rank: usize,
    pub loose: f64,
    pub depth: f64,
}

impl InverseOperator {
    /// Build the kernel from a leadfield (`[C, 3 · n_sources]`), per-source
    /// outward normals and the noise covariance of the same `C` channels.
    pub fn make(
        leadfield: &Array2<f64>,
        normals: &[[f64; 3]],
        noise_cov: &NoiseCovariance,
        lambda2: f64,
    ) -> Result<Self, SolverError> {
        let (n_ch, n_cols) = leadfield.dim();
        let n_src = normals.len();
        if n_cols != 3 * n_src {
            return Err(SolverError::ShapeMismatch(format!(
                "leadfield has {n_cols} columns for {n_src} sources"
            )));
        }
        if noise_cov.dim() != n_ch {
            return Err(SolverError::ShapeMismatch(format!(
                "noise covariance is {0}×{0}, leadfield has {n_ch} channels",
                noise_cov.dim()
            )));
        }

        let (whitener, rank) = whitener(&noise_cov.matrix)?;

        // Rotate each source's columns into (normal, t1, t2).
        let gain = DMatrix::from_fn(n_ch, n_cols, |i, j| leadfield[[i, j]]);
        let mut rotated = DMatrix::<f64>::zeros(n_ch, n_cols);
        for (j, n) in normals.iter().enumerate() {
            let block = gain.fixed_columns::<3>(3 * j) * orientation_frame(*n);
            rotated.fixed_columns_mut::<3>(3 * j).copy_from(&block);
        }
        let whitened = &whitener * &rotated;

        let weights = depth_weights(&whitened, DEPTH, DEPTH_LIMIT)?;
        let mut prior = DVector::<f64>::zeros(n_cols);
        for (j, w) in weights.iter().enumerate() {
            prior[3 * j] = *w;
            prior[3 * j + 1] = w * LOOSE;
            prior[3 * j + 2] = w * LOOSE;
        }

        let mut g_tilde = whitened;
        for (c, mut col) in g_tilde.column_iter_mut().enumerate() {
            col *= prior[c].sqrt();
        }
        let trace = g_tilde.norm_squared();
        if !(trace > 0.0 && trace.is_finite()) {
            return Err(SolverError::DegenerateGain);
        }
        let scale = rank as f64 / trace;
        prior *= scale;
        g_tilde *= scale.sqrt();

        let eigen = SymmetricEigen::new(&g_tilde * g_tilde.transpose());
        let u = eigen.eigenvectors;
        let mut u_scaled = u.clone();
        for (k, mut col) in u_scaled.column_iter_mut().enumerate() {
            col /= eigen.eigenvalues[k].max(0.0) + lambda2;
        }
        let middle = u_scaled * u.transpose();

        let mut kernel = g_tilde.transpose() * middle * whitener;
        for (r, mut row) in kernel.row_iter_mut().enumerate() {
            row *= prior[r].sqrt();
        }
        if kernel.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::NonFinite("imaging kernel"));
        }

        Ok(Self { kernel, lambda2, rank, loose: LOOSE, depth: DEPTH })
    }

    pub fn n_sources(&self) -> usize {
        self.kernel.nrows() / 3
    }

    /// Source magnitudes `[n_sources, T]` for one epoch `[C, T]`.
    pub fn apply(&self, epoch: ArrayView2<'_, f64>) -> Array2<f64> {
        let (n_ch, n_t) = epoch.dim();
        let x = DMatrix::from_fn(n_ch, n_t, |i, j| epoch[[i, j]]);
        let j = &self.kernel * x;
        Array2::from_shape_fn((self.n_sources(), n_t), |(s, t)| {
            let (a, b, c) = (j[(3 * s, t)], j[(3 * s + 1, t)], j[(3 * s + 2, t)]);
            (a * a + b * b + c * c).sqrt()
        })
    }
}

/// `(W, rank)` with `W = Λ^{-1/2} Uᵀ` over the eigenpairs above tolerance.
pub fn whitener(cov: &DMatrix<f64>) -> Result<(DMatrix<f64>, usize), SolverError> {
    let eigen = SymmetricEigen::new(cov.clone());
    let max = eigen.eigenvalues.max();
    if !(max > 0.0 && max.is_finite()) {
        return Err(SolverError::SingularCovariance);
    }
    let keep: Vec<usize> = (0..eigen.eigenvalues.len())
        .filter(|&k| eigen.eigenvalues[k] > EIGEN_TOLERANCE * max)
        .collect();
    let w = DMatrix::from_fn(keep.len(), cov.ncols(), |r, c| {
        let k = keep[r];
        eigen.eigenvectors[(c, k)] / eigen.eigenvalues[k].sqrt()
    });
    Ok((w, keep.len()))
}

/// Orthonormal frame with `normal` in the first column.
pub fn orientation_frame(normal: [f64; 3]) -> Matrix3<f64> {
    let n = Vector3::from(normal).normalize();
    let helper = if n.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
    let t1 = n.cross(&helper).normalize();
    let t2 = n.cross(&t1);
    Matrix3::from_columns(&[n, t1, t2])
}

/// `w_j = λ_max(G_jᵀ G_j)^{-exponent}`, limited to `limit`× the smallest
/// weight and normalised to a maximum of 1.
pub fn depth_weights(gain: &DMatrix<f64>, exponent: f64, limit: f64) -> Result<Vec<f64>, SolverError> {
    let n_src = gain.ncols() / 3;
    let mut w = Vec::with_capacity(n_src);
    for j in 0..n_src {
        let block = gain.fixed_columns::<3>(3 * j);
        let gram: Matrix3<f64> = block.transpose() * block;
        let lambda_max = SymmetricEigen::new(gram).eigenvalues.max();
        if !(lambda_max > 0.0) {
            return Err(SolverError::DegenerateGain);
        }
        w.push(lambda_max.powf(-exponent));
    }
    let floor = w.iter().copied().fold(f64::INFINITY, f64::min);
    for v in w.iter_mut() {
        *v = v.min(floor * limit);
    }
    let top = w.iter().copied().fold(0.0, f64::max);
    for v in w.iter_mut() {
        *v /= top;
    }
    Ok(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn frame_is_orthonormal() {
        for n in [[0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.3, -0.4, 0.866]] {
            let f = orientation_frame(n);
            let id = f.transpose() * f;
            assert_abs_diff_eq!(id, Matrix3::identity(), epsilon = 1e-12);
            assert_abs_diff_eq!(f.column(0).into_owned(), Vector3::from(n).normalize(), epsilon = 1e-12);
        }
    }

    #[test]
    fn whitener_drops_null_space() {
        // Average-referenced covariance of 3 channels has rank 2.
        let c = DMatrix::from_row_slice(3, 3, &[2.0, -1.0, -1.0, -1.0, 2.0, -1.0, -1.0, -1.0, 2.0]);
        let (w, rank) = whitener(&c).unwrap();
        assert_eq!(rank, 2);
        let white = &w * &c * w.transpose();
        assert_abs_diff_eq!(white, DMatrix::identity(2, 2), epsilon = 1e-10);
    }

    #[test]
    fn zero_covariance_is_singular() {
        assert_eq!(whitener(&DMatrix::zeros(4, 4)).unwrap_err(), SolverError::SingularCovariance);
    }

    #[test]
    fn depth_weights_are_limited_and_normalised() {
        // Source 0 is 100× stronger than source 1 in power.
        let mut g = DMatrix::zeros(3, 6);
        g[(0, 0)] = 10.0;
        g[(1, 4)] = 1.0;
        let w = depth_weights(&g, 1.0, DEPTH_LIMIT).unwrap();
        assert_abs_diff_eq!(w[1], 1.0);
        assert_abs_diff_eq!(w[0], 0.1, epsilon = 1e-12);
    }
}
