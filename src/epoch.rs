//! Fixed-length windowing of continuous data.
//!
//! Used only when a recording carries no trial structure of its own. Windows
//! of `window` samples start every `stride` samples; a trailing partial
//! window is dropped. No baseline is applied here.
use ndarray::{s, Array2, Array3};

/// Window length in seconds.
pub const WINDOW_S: f64 = 2.0;

/// Fractional overlap between consecutive windows.
pub const OVERLAP: f64 = 0.5;

/// `(window, stride)` in samples for a window of `window_s` seconds with
/// fractional `overlap`: `stride = window × (1 − overlap)`, at least 1.
pub fn window_params(sfreq: f64, window_s: f64, overlap: f64) -> (usize, usize) {
    let window = (window_s * sfreq).round() as usize;
    let stride = ((window_s * (1.0 - overlap)) * sfreq).round() as usize;
    (window, stride.max(1))
}

/// Number of complete windows that fit in `n_times` samples.
pub fn n_windows(n_times: usize, window: usize, stride: usize) -> usize {
    if window == 0 || n_times < window {
        0
    } else {
        (n_times - window) / stride + 1
    }
}

/// Cut `data` (`[C, T]`) into `[E, C, window]`.
pub fn fixed_length_epochs(data: &Array2<f64>, window: usize, stride: usize) -> Array3<f64> {
    let (n_ch, n_t) = data.dim();
    let n_epochs = n_windows(n_t, window, stride);

    let mut out = Array3::<f64>::zeros((n_epochs, n_ch, window));
    for e in 0..n_epochs {
        let start = e * stride;
        out.slice_mut(s![e, .., ..])
            .assign(&data.slice(s![.., start..start + window]));
    }
    out
}

/// Sample times of one epoch, `tmin + i / sfreq`.
pub fn epoch_times(n_times: usize, sfreq: f64, tmin: f64) -> Vec<f64> {
    (0..n_times).map(|i| tmin + i as f64 / sfreq).collect()
}
