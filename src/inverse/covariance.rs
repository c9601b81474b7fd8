//! Empirical noise covariance.
use nalgebra::DMatrix;
use ndarray::Array3;

use crate::baseline::{span_window, BaselineWindow};
use crate::error::SolverError;

/// `[C, C]` noise covariance of the channels it was computed on.
#[derive(Debug, Clone)]
pub struct NoiseCovariance {
    pub matrix: DMatrix<f64>,
    /// Samples pooled across epochs.
    pub n_samples: usize,
    /// Time window, in seconds.
    pub window: (f64, f64),
}

impl NoiseCovariance {
    pub fn dim(&self) -> usize {
        self.matrix.nrows()
    }
}

/// Which part of the epoch the noise was estimated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseWindowSource {
    /// Every sample at `t ≤ 0`.
    PreStimulus,
    /// The baseline window, used when the pre-stimulus part has < 2 samples.
    Baseline,
}

/// Pick the noise window: pre-stimulus samples when there are at least two,
/// the `baseline` span otherwise.
pub fn noise_window(
    tmin: f64,
    n_times: usize,
    sfreq: f64,
    baseline: (f64, f64),
) -> (BaselineWindow, NoiseWindowSource) {
    let pre = span_window(tmin, n_times, sfreq, (tmin, 0.0));
    if pre.n_samples() >= 2 {
        (pre, NoiseWindowSource::PreStimulus)
    } else {
        (span_window(tmin, n_times, sfreq, baseline), NoiseWindowSource::Baseline)
    }
}

/// `Σ x xᵀ / (n − 1)` over the window samples of every epoch, restricted to
/// `rows` of `epochs` (`[E, C, T]`).
pub fn empirical_covariance(
    epochs: &Array3<f64>,
    rows: &[usize],
    window: &BaselineWindow,
) -> Result<NoiseCovariance, SolverError> {
    let n_epochs = epochs.dim().0;
    let n = n_epochs * window.n_samples();
    if n < 2 {
        return Err(SolverError::InsufficientNoiseSamples(n));
    }

    let c = rows.len();
    let mut acc = DMatrix::<f64>::zeros(c, c);
    let mut x = vec![0.0; c];
    for e in 0..n_epochs {
        for t in window.start..window.stop {
            for (k, &row) in rows.iter().enumerate() {
                x[k] = epochs[[e, row, t]];
            }
            for i in 0..c {
                for j in i..c {
                    acc[(i, j)] += x[i] * x[j];
                }
            }
        }
    }
    let denom = (n - 1) as f64;
    for i in 0..c {
        for j in i..c {
            let v = acc[(i, j)] / denom;
            acc[(i, j)] = v;
            acc[(j, i)] = v;
        }
    }
    if acc.iter().any(|v| !v.is_finite()) {
        return Err(SolverError::NonFinite("noise covariance"));
    }
    Ok(NoiseCovariance { matrix: acc, n_samples: n, window: window.span })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn prestimulus_window_when_available() {
        let (w, src) = noise_window(-0.2, 100, 250.0, (-0.2, 0.0));
        assert_eq!(src, NoiseWindowSource::PreStimulus);
        // t = −0.200 … 0.000 → 51 samples.
        assert_eq!(w.n_samples(), 51);
    }

    #[test]
    fn baseline_window_when_tmin_is_zero() {
        let (w, src) = noise_window(0.0, 500, 250.0, (0.0, 0.1));
        assert_eq!(src, NoiseWindowSource::Baseline);
        assert_eq!((w.start, w.stop), (0, 26));
    }

    #[test]
    fn covariance_of_known_signal() {
        // Channel 0 = ±1, channel 1 = −channel 0.
        let epochs = Array3::from_shape_fn((2, 2, 4), |(_, c, t)| {
            let v = if t % 2 == 0 { 1.0 } else { -1.0 };
            if c == 0 { v } else { -v }
        });
        let w = BaselineWindow { start: 0, stop: 4, span: (0.0, 0.0) };
        let cov = empirical_covariance(&epochs, &[0, 1], &w).unwrap();
        assert_eq!(cov.n_samples, 8);
        assert_abs_diff_eq!(cov.matrix[(0, 0)], 8.0 / 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cov.matrix[(0, 1)], -8.0 / 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cov.matrix[(1, 0)], cov.matrix[(0, 1)]);
    }

    #[test]
    fn single_sample_is_rejected() {
        let epochs = Array3::zeros((1, 3, 10));
        let w = BaselineWindow { start: 0, stop: 1, span: (0.0, 0.0) };
        assert_eq!(
            empirical_covariance(&epochs, &[0, 1, 2], &w).unwrap_err(),
            SolverError::InsufficientNoiseSamples(1)
        );
    }
}
