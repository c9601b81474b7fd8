//! Average reference over EEG channels only.
//!
//! Matches `epochs.set_eeg_reference('average')` after ocular channels have
//! been retyped: the per-timepoint mean is taken over the rows flagged in
//! `eeg_mask` and subtracted from those rows only. Other rows pass through.
//!
//! `data`: [C, T]  →  `data[c, t] -= mean(data[eeg, t])` for every EEG row `c`
use ndarray::{s, Array1, Array2, Array3, ArrayViewMut2, Axis};

/// Minimum number of EEG channels for an average reference to be meaningful.
pub const MIN_REFERENCE_CHANNELS: usize = 2;

/// Re-reference the EEG rows of a `[C, T]` view. Returns the number of rows
/// that formed the reference; `0` means nothing was changed.
pub fn average_reference_inplace(mut data: ArrayViewMut2<'_, f64>, eeg_mask: &[bool]) -> usize {
    let n_eeg = eeg_mask.iter().filter(|&&m| m).count();
    if n_eeg < MIN_REFERENCE_CHANNELS {
        return 0;
    }
    let mut means = Array1::<f64>::zeros(data.ncols());
    for (row, _) in data.rows().into_iter().zip(eeg_mask).filter(|(_, m)| **m) {
        means += &row;
    }
    means /= n_eeg as f64;
    for (mut row, _) in data.rows_mut().into_iter().zip(eeg_mask).filter(|(_, m)| **m) {
        row -= &means;
    }
    n_eeg
}

/// Re-reference every epoch of an `[E, C, T]` tensor.
pub fn average_reference_epochs(epochs: &mut Array3<f64>, eeg_mask: &[bool]) -> usize {
    let mut n_ref = 0;
    for e in 0..epochs.len_of(Axis(0)) {
        n_ref = average_reference_inplace(epochs.slice_mut(s![e, .., ..]), eeg_mask);
    }
    n_ref
}

/// Convenience for the all-EEG case.
pub fn average_reference_all(data: &mut Array2<f64>) -> usize {
    let mask = vec![true; data.nrows()];
    average_reference_inplace(data.view_mut(), &mask)
}
