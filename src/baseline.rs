//! Epoch baseline correction.
//!
//! Matches `epochs.apply_baseline((tmin, tmax))`: for every epoch and
//! channel, the mean over the baseline samples is subtracted from the whole
//! epoch.
use ndarray::{s, Array3, Axis};

/// Length of the default baseline window in seconds.
pub const BASELINE_S: f64 = 0.1;

/// A resolved baseline window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineWindow {
    /// First sample index (inclusive).
    pub start: usize,
    /// Last sample index (exclusive).
    pub stop: usize,
    /// Window in seconds, `(tmin, tmax)`.
    pub span: (f64, f64),
}

impl BaselineWindow {
    pub fn n_samples(&self) -> usize {
        self.stop - self.start
    }
}

/// Window covering the first `length_s` seconds of an epoch, clipped to the
/// epoch. `tmax = min(tmin + length_s, last sample time)`.
pub fn leading_window(tmin: f64, n_times: usize, sfreq: f64, length_s: f64) -> BaselineWindow {
    let t_last = tmin + n_times.saturating_sub(1) as f64 / sfreq;
    let tmax = (tmin + length_s).min(t_last);
    span_window(tmin, n_times, sfreq, (tmin, tmax))
}

/// Sample range of every time point within `span` (inclusive on both ends).
pub fn span_window(tmin: f64, n_times: usize, sfreq: f64, span: (f64, f64)) -> BaselineWindow {
    // Half-sample slack so that a bound landing on a sample keeps it.
    let eps = 0.5 / sfreq;
    let mut start = n_times;
    let mut stop = 0;
    for i in 0..n_times {
        let t = tmin + i as f64 / sfreq;
        if t >= span.0 - eps && t <= span.1 + eps {
            start = start.min(i);
            stop = i + 1;
        }
    }
    if start > stop {
        start = stop;
    }
    BaselineWindow { start, stop, span }
}

/// Subtract, per epoch and channel, the mean over `window` from the epoch.
/// `epochs`: [E, C, T]. An empty window leaves the data untouched.
pub fn baseline_correct_inplace(epochs: &mut Array3<f64>, window: &BaselineWindow) {
    if window.n_samples() == 0 {
        return;
    }
    for mut epoch in epochs.axis_iter_mut(Axis(0)) {
        for mut channel in epoch.axis_iter_mut(Axis(0)) {
            let m = channel
                .slice(s![window.start..window.stop])
                .mean()
                .unwrap_or(0.0);
            channel.mapv_inplace(|v| v - m);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_window_first_100ms() {
        let w = leading_window(0.0, 500, 250.0, BASELINE_S);
        // t = 0.000 … 0.100 inclusive → 26 samples.
        assert_eq!((w.start, w.stop), (0, 26));
        approx::assert_abs_diff_eq!(w.span.1, 0.1);
    }

    #[test]
    fn leading_window_clipped_to_epoch() {
        let w = leading_window(-0.02, 10, 250.0, BASELINE_S);
        assert_eq!((w.start, w.stop), (0, 10));
        approx::assert_abs_diff_eq!(w.span.1, -0.02 + 9.0 / 250.0, epsilon = 1e-12);
    }

    #[test]
    fn baseline_removes_window_mean() {
        let mut epochs = Array3::from_shape_fn((3, 4, 100), |(e, c, t)| {
            e as f64 * 10.0 + c as f64 * 5.0 + if t < 20 { 1.0 } else { 3.0 }
        });
        let w = BaselineWindow { start: 0, stop: 20, span: (0.0, 0.0) };
        baseline_correct_inplace(&mut epochs, &w);
        for e in 0..3 {
            for c in 0..4 {
                let m = epochs.slice(s![e, c, 0..20]).mean().unwrap();
                approx::assert_abs_diff_eq!(m, 0.0, epsilon = 1e-12);
                approx::assert_abs_diff_eq!(epochs[[e, c, 50]], 2.0, epsilon = 1e-12);
            }
        }
    }
}
