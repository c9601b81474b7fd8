//! FIR filter design and application.
//!
//! - [`design`]: Hamming-windowed sinc highpass / lowpass FIR design, matching
//!   `mne.filter.create_filter(fir_window='hamming', phase='zero')`.
//! - [`apply`]: Overlap-add zero-phase convolution, matching MNE's
//!   `_overlap_add_filter` / `_1d_overlap_filter`.

pub mod apply;
pub mod design;

pub use apply::{apply_fir_zero_phase, filter_1d};
pub use design::{
    auto_filter_length, design_highpass, design_lowpass, firwin, hamming,
    highpass_trans_bandwidth, lowpass_trans_bandwidth,
};
