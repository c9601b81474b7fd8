//! Overlap-add zero-phase FIR convolution.
//!
//! Matches MNE's `_overlap_add_filter` + `_1d_overlap_filter`.
//!
//! Zero-phase is achieved by shifting the output left by `(N-1)/2` samples,
//! not by running filtfilt. The edge transient is suppressed by
//! reflect-limited padding of `N-1` samples on each side.
use anyhow::{bail, Result};
use ndarray::{Array2, ArrayView1};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Planned FFTs and the kernel spectrum for one `(h, signal length)` pair.
///
/// Building this once per channel matrix instead of once per channel is what
/// keeps long highpass kernels affordable on many short epochs.
struct OverlapAdd {
    n_h: usize,
    n_fft: usize,
    h_fft: Vec<Complex<f64>>,
    fwd: Arc<dyn Fft<f64>>,
    inv: Arc<dyn Fft<f64>>,
}

impl OverlapAdd {
    fn new(h: &[f64], n_x: usize) -> Self {
        let n_h = h.len();
        let n_ext = n_x + 2 * (n_h - 1);
        let n_fft = choose_fft_len(n_h, n_ext);
        let mut planner: FftPlanner<f64> = FftPlanner::new();
        let fwd = planner.plan_fft_forward(n_fft);
        let inv = planner.plan_fft_inverse(n_fft);

        let mut h_fft: Vec<Complex<f64>> = h
            .iter()
            .map(|&v| Complex { re: v, im: 0.0 })
            .chain(std::iter::repeat(Complex::default()))
            .take(n_fft)
            .collect();
        fwd.process(&mut h_fft);

        Self { n_h, n_fft, h_fft, fwd, inv }
    }

    fn run(&self, x: &[f64]) -> Vec<f64> {
        let n_x = x.len();
        let shift = (self.n_h - 1) / 2;
        let n_edge = self.n_h - 1;

        let x_ext = reflect_limited_pad(x, n_edge, n_edge);
        let n_ext = x_ext.len();
        let n_seg = self.n_fft - self.n_h + 1;
        let n_segments = n_ext.div_ceil(n_seg);
        let mut x_filtered = vec![0.0_f64; n_ext];
        let inv_scale = 1.0 / self.n_fft as f64;

        for seg_idx in 0..n_segments {
            let start = seg_idx * n_seg;
            let stop = (start + n_seg).min(n_ext);

            let mut buf: Vec<Complex<f64>> = x_ext[start..stop]
                .iter()
                .map(|&v| Complex { re: v, im: 0.0 })
                .chain(std::iter::repeat(Complex::default()))
                .take(self.n_fft)
                .collect();

            self.fwd.process(&mut buf);
            for (b, &hf) in buf.iter_mut().zip(self.h_fft.iter()) {
                *b *= hf;
            }
            self.inv.process(&mut buf);

            // Overlap-add, shifted left by the group delay.
            let out_start = start.saturating_sub(shift);
            let out_end = (out_start + self.n_fft).min(n_ext);
            let prod_start = shift.saturating_sub(start);
            for (o, p) in (out_start..out_end).zip(prod_start..) {
                if p < buf.len() {
                    x_filtered[o] += buf[p].re * inv_scale;
                }
            }
        }

        x_filtered[n_edge..n_edge + n_x].to_vec()
    }
}

/// Apply a zero-phase FIR filter to every row of `data` (`[C, T]`) in-place.
///
/// # Errors
///
/// If `h` is empty or has even length, or `data` has no samples.
pub fn apply_fir_zero_phase(data: &mut Array2<f64>, h: &[f64]) -> Result<()> {
    check_kernel(h)?;
    if data.ncols() == 0 {
        bail!("cannot filter an empty signal");
    }
    let engine = OverlapAdd::new(h, data.ncols());
    for mut row in data.rows_mut() {
        let filtered = engine.run(&row.to_vec());
        row.assign(&ArrayView1::from(&filtered));
    }
    Ok(())
}

/// Filter a single 1-D signal. Returns a vector of the same length as `x`.
pub fn filter_1d(x: &[f64], h: &[f64]) -> Result<Vec<f64>> {
    check_kernel(h)?;
    if x.is_empty() {
        return Ok(vec![]);
    }
    Ok(OverlapAdd::new(h, x.len()).run(x))
}

fn check_kernel(h: &[f64]) -> Result<()> {
    if h.is_empty() || h.len() % 2 == 0 {
        bail!("zero-phase FIR needs an odd, non-empty kernel (got {} taps)", h.len());
    }
    if h.iter().any(|v| !v.is_finite()) {
        bail!("FIR kernel contains non-finite taps");
    }
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Reflect-limited padding (MNE's `_smart_pad`).
///
/// Left:  `pad[i] = 2*x[0] - x[n_l-i]`  for i in 1..=n_l
/// Right: `pad[i] = 2*x[-1] - x[-(i+1)]` for i in 1..=n_r
///
/// Requests longer than the signal are completed with zeros.
fn reflect_limited_pad(x: &[f64], n_l: usize, n_r: usize) -> Vec<f64> {
    let n = x.len();
    let actual_l = n_l.min(n - 1);
    let actual_r = n_r.min(n - 1);

    let mut out = Vec::with_capacity(n_l + n + n_r);
    out.extend(std::iter::repeat(0.0).take(n_l - actual_l));
    for i in (1..=actual_l).rev() {
        out.push(2.0 * x[0] - x[i]);
    }

    out.extend_from_slice(x);

    let last = x[n - 1];
    for i in 1..=actual_r {
        out.push(2.0 * last - x[n - 1 - i]);
    }
    out.extend(std::iter::repeat(0.0).take(n_r - actual_r));

    out
}

/// Power-of-two FFT length minimising MNE's cost function:
///   `cost = ceil(n_x / (N - n_h + 1)) * N * (log2(N) + 1) + 4e-5 * N * n_x`
fn choose_fft_len(n_h: usize, n_x: usize) -> usize {
    let min_fft = 2 * n_h - 1;
    let max_pow = (n_x as f64).log2().ceil() as u32 + 1;
    let min_pow = (min_fft as f64).log2().ceil() as u32;

    let mut best_n = 1_usize << max_pow.max(min_pow);
    let mut best_cost = f64::INFINITY;
    for pow in min_pow..=max_pow {
        let n = 1_usize << pow;
        if n < min_fft {
            continue;
        }
        let n_seg = (n - n_h + 1) as f64;
        let cost = (n_x as f64 / n_seg).ceil() * n as f64 * (pow as f64 + 1.0)
            + 4e-5 * n as f64 * n_x as f64;
        if cost < best_cost {
            best_cost = cost;
            best_n = n;
        }
    }
    best_n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::design::{design_highpass, design_lowpass};

    #[test]
    fn filter_preserves_length() {
        let x: Vec<f64> = (0..1024).map(|i| (i as f64 / 1024.0).sin()).collect();
        let h = design_highpass(0.5, 256.0).unwrap();
        assert_eq!(filter_1d(&x, &h).unwrap().len(), x.len());
    }

    #[test]
    fn highpass_removes_dc() {
        let x = vec![1.0_f64; 4096];
        let h = design_highpass(0.5, 256.0).unwrap();
        let y = filter_1d(&x, &h).unwrap();
        let n_h = h.len();
        let interior = &y[n_h..y.len() - n_h];
        let max_val = interior.iter().map(|v| v.abs()).fold(0.0_f64, f64::max);
        assert!(max_val < 1e-3, "DC not removed: max={max_val}");
    }

    #[test]
    fn lowpass_attenuates_high_tone() {
        let sfreq = 500.0;
        let x: Vec<f64> = (0..5000)
            .map(|i| (2.0 * std::f64::consts::PI * 100.0 * i as f64 / sfreq).sin())
            .collect();
        let h = design_lowpass(40.0, sfreq).unwrap();
        let y = filter_1d(&x, &h).unwrap();
        let interior = &y[500..4500];
        let rms = (interior.iter().map(|v| v * v).sum::<f64>() / interior.len() as f64).sqrt();
        assert!(rms < 0.01, "100 Hz tone leaked through 40 Hz lowpass: rms={rms}");
    }

    #[test]
    fn kernel_longer_than_signal_is_handled() {
        let x: Vec<f64> = (0..200).map(|i| (i as f64 * 0.05).sin()).collect();
        let h = design_highpass(0.1, 250.0).unwrap();
        assert!(h.len() > x.len());
        let y = filter_1d(&x, &h).unwrap();
        assert_eq!(y.len(), x.len());
        assert!(y.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn even_kernel_is_rejected() {
        assert!(filter_1d(&[1.0, 2.0], &[0.5, 0.5]).is_err());
    }

    #[test]
    fn reflect_limited_left_pad() {
        let x = [1.0_f64, 2.0, 3.0, 4.0, 5.0];
        let padded = reflect_limited_pad(&x, 3, 0);
        assert_eq!(&padded[..3], &[-2.0, -1.0, 0.0]);
        assert_eq!(&padded[3..], &x[..]);
    }

    #[test]
    fn oversized_pad_is_zero_filled() {
        let x = [1.0_f64, 2.0, 3.0];
        let padded = reflect_limited_pad(&x, 4, 4);
        assert_eq!(padded.len(), 11);
        assert_eq!(&padded[..2], &[0.0, 0.0]);
        assert_eq!(&padded[9..], &[0.0, 0.0]);
    }
}
