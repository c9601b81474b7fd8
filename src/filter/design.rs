//! FIR filter design matching MNE / `scipy.signal.firwin`.
//!
//! For a highpass at `l_freq` Hz:
//!   • transition bandwidth = min(max(0.25 * l_freq, 2.0), l_freq)
//!   • cutoff               = l_freq − tb / 2
//!
//! For a lowpass at `h_freq` Hz:
//!   • transition bandwidth = min(max(0.25 * h_freq, 2.0), nyquist − h_freq)
//!   • cutoff               = h_freq + tb / 2
//!
//! Filter length N = ceil(3.3 / tb * sfreq), rounded up to odd, Hamming
//! window. The highpass is built by spectral inversion of a lowpass.
use anyhow::{bail, Result};
use std::f64::consts::PI;

/// MNE transition bandwidth for a highpass edge.
pub fn highpass_trans_bandwidth(l_freq: f64) -> f64 {
    (0.25 * l_freq).max(2.0).min(l_freq)
}

/// MNE transition bandwidth for a lowpass edge.
pub fn lowpass_trans_bandwidth(h_freq: f64, sfreq: f64) -> f64 {
    (0.25 * h_freq).max(2.0).min(sfreq / 2.0 - h_freq)
}

/// Number of FIR taps for a transition bandwidth; always odd.
pub fn auto_filter_length(trans_bw: f64, sfreq: f64) -> usize {
    let n_raw = (3.3 / trans_bw * sfreq).ceil() as usize;
    if n_raw % 2 == 0 { n_raw + 1 } else { n_raw }
}

/// Zero-phase highpass FIR.
///
/// Matches `mne.filter.create_filter(l_freq=l_freq, h_freq=None,
/// fir_window='hamming', fir_design='firwin', phase='zero')`.
///
/// # Errors
///
/// If `l_freq` is not inside `(0, sfreq / 2)`.
pub fn design_highpass(l_freq: f64, sfreq: f64) -> Result<Vec<f64>> {
    check_edge("highpass", l_freq, sfreq)?;
    let trans_bw = highpass_trans_bandwidth(l_freq);
    let n = auto_filter_length(trans_bw, sfreq);
    let cutoff_hz = l_freq - trans_bw / 2.0;
    firwin(n, cutoff_hz, sfreq, false)
}

/// Zero-phase lowpass FIR.
///
/// Matches `mne.filter.create_filter(l_freq=None, h_freq=h_freq,
/// fir_window='hamming', fir_design='firwin', phase='zero')`.
///
/// # Errors
///
/// If `h_freq` is not inside `(0, sfreq / 2)`.
pub fn design_lowpass(h_freq: f64, sfreq: f64) -> Result<Vec<f64>> {
    check_edge("lowpass", h_freq, sfreq)?;
    let trans_bw = lowpass_trans_bandwidth(h_freq, sfreq);
    let n = auto_filter_length(trans_bw, sfreq);
    let cutoff_hz = h_freq + trans_bw / 2.0;
    firwin(n, cutoff_hz, sfreq, true)
}

fn check_edge(kind: &str, freq: f64, sfreq: f64) -> Result<()> {
    let nyq = sfreq / 2.0;
    if !(freq > 0.0 && freq < nyq) {
        bail!("{kind} cutoff {freq} Hz must lie in (0, {nyq}) Hz");
    }
    Ok(())
}

/// Hamming-windowed sinc of odd length `n`.
///
/// `pass_zero = true` gives a lowpass with unit DC gain; `false` gives the
/// spectrally inverted highpass. `cutoff_hz` is the −6 dB point.
pub fn firwin(n: usize, cutoff_hz: f64, sfreq: f64, pass_zero: bool) -> Result<Vec<f64>> {
    if n % 2 == 0 {
        bail!("firwin requires odd N for a linear-phase filter, got {n}");
    }
    let alpha = (n - 1) as f64 / 2.0;
    let fc = cutoff_hz / (sfreq / 2.0);

    let win = hamming(n);
    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64 - alpha;
            // sin(π·fc·x) / (π·x) → fc at x = 0
            let sinc = if x == 0.0 { fc } else { (PI * fc * x).sin() / (PI * x) };
            sinc * win[i]
        })
        .collect();

    let s: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= s);

    if !pass_zero {
        h.iter_mut().for_each(|v| *v = -*v);
        h[n / 2] += 1.0;
    }
    Ok(h)
}

/// Hamming window of length `n`.
pub fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}
