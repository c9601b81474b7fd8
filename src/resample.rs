//! FFT-based rational resampler matching MNE's `resample(..., method='fft')`.
//!
//! Algorithm (from `mne/cuda.py _fft_resample`):
//!   1. Pad with auto npad reflect-limited samples on each side.
//!   2. rfft(padded)  →  complex half-spectrum.
//!   3. If downsampling: double the Nyquist bin (use_len = new_len).
//!      If upsampling:   halve  the Nyquist bin (use_len = old_len).
//!   4. Scale all bins by `new_len_padded / old_len_padded`.
//!   5. irfft(spectrum, n=new_len_padded).
//!   6. Strip the resampled padding edges.
use anyhow::{bail, Result};
use ndarray::{s, Array2, Array3, ArrayView1};
use rustfft::{num_complex::Complex, FftPlanner};

/// Rates closer than this (Hz) are considered equal and left untouched.
pub const RESAMPLE_TOLERANCE_HZ: f64 = 0.1;

/// `true` when `src` differs from `dst` by more than [`RESAMPLE_TOLERANCE_HZ`].
pub fn needs_resampling(src: f64, dst: f64) -> bool {
    (src - dst).abs() > RESAMPLE_TOLERANCE_HZ
}

/// MNE's auto npad: pad to the next power of 2.
///
/// ```text
/// min_add = min(n // 8, 100) * 2
/// total   = 2^ceil(log2(n + min_add)) - n
/// npads   = [total // 2, total - total // 2]
/// ```
pub fn auto_npad(n: usize) -> (usize, usize) {
    let min_add = (n / 8).min(100) * 2;
    let sum = n + min_add;
    let next_pow2 = 1usize << ((sum as f64).log2().ceil() as u32);
    let total = next_pow2 - n;
    (total / 2, total - total / 2)
}

/// Output length for `n` samples resampled from `src` to `dst` Hz.
pub fn final_length(n: usize, src: f64, dst: f64) -> usize {
    (n as f64 * dst / src).round() as usize
}

/// Resample `data` (`[C, T]`) from `src_sfreq` to `dst_sfreq`.
pub fn resample(data: &Array2<f64>, src_sfreq: f64, dst_sfreq: f64) -> Result<Array2<f64>> {
    if !(src_sfreq > 0.0 && dst_sfreq > 0.0) {
        bail!("sample rates must be positive ({src_sfreq} → {dst_sfreq})");
    }
    let ratio = dst_sfreq / src_sfreq;
    let n_in = data.ncols();
    let n_out = final_length(n_in, src_sfreq, dst_sfreq);
    if n_out == 0 {
        bail!("resampling {n_in} samples from {src_sfreq} Hz to {dst_sfreq} Hz leaves nothing");
    }

    let (npad_l, npad_r) = auto_npad(n_in);
    let mut out = Array2::<f64>::zeros((data.nrows(), n_out));
    for (ch, row) in data.rows().into_iter().enumerate() {
        let resampled = resample_1d(&row.to_vec(), ratio, npad_l, npad_r)?;
        out.row_mut(ch).assign(&ArrayView1::from(&resampled));
    }
    Ok(out)
}

/// Resample every epoch of `[E, C, T]` independently.
pub fn resample_epochs(data: &Array3<f64>, src_sfreq: f64, dst_sfreq: f64) -> Result<Array3<f64>> {
    let (n_e, n_ch, n_t) = data.dim();
    let n_out = final_length(n_t, src_sfreq, dst_sfreq);
    let mut out = Array3::<f64>::zeros((n_e, n_ch, n_out));
    for e in 0..n_e {
        let epoch = data.slice(s![e, .., ..]).to_owned();
        out.slice_mut(s![e, .., ..]).assign(&resample(&epoch, src_sfreq, dst_sfreq)?);
    }
    Ok(out)
}

/// Resample a single 1-D signal with explicit (possibly asymmetric) padding.
pub fn resample_1d(x: &[f64], ratio: f64, npad_l: usize, npad_r: usize) -> Result<Vec<f64>> {
    let n_in = x.len();
    if n_in == 0 {
        return Ok(vec![]);
    }
    let final_len = (ratio * n_in as f64).round() as usize;

    // --- 1. Reflect-limited padding ---------------------------------------
    let pad_l = npad_l.min(n_in - 1);
    let pad_r = npad_r.min(n_in - 1);
    let old_len = n_in + pad_l + pad_r;

    let mut x_ext = Vec::with_capacity(old_len);
    for i in (1..=pad_l).rev() {
        x_ext.push(2.0 * x[0] - x[i]);
    }
    x_ext.extend_from_slice(x);
    let last = x[n_in - 1];
    for i in 1..=pad_r {
        x_ext.push(2.0 * last - x[n_in - 1 - i]);
    }

    // --- 2. Padded output length ------------------------------------------
    let new_len_padded = (ratio * old_len as f64).round() as usize;
    if new_len_padded == 0 {
        bail!("resampling ratio {ratio} too small for {n_in} samples");
    }
    let shorter = new_len_padded < old_len;
    let use_len = if shorter { new_len_padded } else { old_len };

    // --- 3. rfft via a full complex FFT -----------------------------------
    let mut planner: FftPlanner<f64> = FftPlanner::new();
    let mut buf: Vec<Complex<f64>> = x_ext.iter().map(|&v| Complex { re: v, im: 0.0 }).collect();
    planner.plan_fft_forward(old_len).process(&mut buf);

    let rfft_len = old_len / 2 + 1;
    let mut x_fft: Vec<Complex<f64>> = buf[..rfft_len].to_vec();

    // --- 4. Nyquist bin ----------------------------------------------------
    if use_len % 2 == 0 {
        let nyq = use_len / 2;
        if nyq < x_fft.len() {
            x_fft[nyq] *= if shorter { 2.0 } else { 0.5 };
        }
    }

    // --- 5. Boxcar scale ---------------------------------------------------
    let scale = new_len_padded as f64 / old_len as f64;
    for v in &mut x_fft {
        *v *= scale;
    }

    // --- 6. irfft(x_fft, n=new_len_padded) --------------------------------
    let new_rfft_len = new_len_padded / 2 + 1;
    let mut irfft_in = vec![Complex::<f64>::default(); new_len_padded];
    let n_copy = x_fft.len().min(new_rfft_len);
    irfft_in[..n_copy].copy_from_slice(&x_fft[..n_copy]);
    // Hermitian completion.
    for i in 1..new_rfft_len {
        let idx = new_len_padded - i;
        if idx >= new_rfft_len {
            irfft_in[idx] = irfft_in[i].conj();
        }
    }
    planner.plan_fft_inverse(new_len_padded).process(&mut irfft_in);
    let inv_scale = 1.0 / new_len_padded as f64;

    // --- 7. Strip padding --------------------------------------------------
    let to_remove_l = (ratio * pad_l as f64).round() as usize;
    let strip_end = (to_remove_l + final_len).min(new_len_padded);
    let mut result: Vec<f64> = irfft_in[to_remove_l.min(strip_end)..strip_end]
        .iter()
        .map(|c| c.re * inv_scale)
        .collect();
    result.resize(final_len, 0.0);
    Ok(result)
}
