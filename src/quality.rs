//! Recording quality gate.
//!
//! [`validate_recording`] fails hard only on non-finite samples. Everything
//! else that looks suspicious (few channels, short recording, low sample
//! rate, implausible amplitude range) is a [`QualityWarning`]: logged, returned
//! to the caller, and otherwise ignored.
use serde::Serialize;
use serde_json::json;
use std::fmt;

use crate::error::{PipelineError, Result};
use crate::provenance::ProcessingLog;
use crate::recording::Recording;

pub const MIN_CHANNELS: usize = 32;
pub const MIN_DURATION_S: f64 = 60.0;
pub const MIN_SFREQ_HZ: f64 = 250.0;
/// Peak-to-peak above this (volts) suggests the data is not in volts.
pub const MAX_PEAK_TO_PEAK: f64 = 1e-3;
/// Peak-to-peak below this (volts) suggests a scaling error.
pub const MIN_PEAK_TO_PEAK: f64 = 1e-8;

/// Suspect-but-usable conditions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityWarning {
    LowChannelCount { n_channels: usize },
    ShortRecording { duration_s: f64 },
    LowSampleRate { sfreq: f64 },
    LargeAmplitude { peak_to_peak: f64 },
    SmallAmplitude { peak_to_peak: f64 },
}

impl fmt::Display for QualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowChannelCount { n_channels } => {
                write!(f, "Low channel count ({n_channels}). Results may be unreliable.")
            }
            Self::ShortRecording { duration_s } => {
                write!(f, "Short recording ({duration_s:.1}s). Consider longer recordings.")
            }
            Self::LowSampleRate { sfreq } => {
                write!(f, "Low sampling rate ({sfreq}Hz). Consider higher sampling rates.")
            }
            Self::LargeAmplitude { peak_to_peak } => {
                write!(f, "Unusually large voltage range ({peak_to_peak:.3e}). Check data units.")
            }
            Self::SmallAmplitude { peak_to_peak } => {
                write!(f, "Unusually small voltage range ({peak_to_peak:.3e}). Check data scaling.")
            }
        }
    }
}

/// Descriptive numbers gathered during validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingMetrics {
    pub n_channels: usize,
    pub n_epochs: usize,
    pub n_times: usize,
    pub duration_s: f64,
    pub sampling_rate: f64,
    pub peak_to_peak: f64,
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub metrics: RecordingMetrics,
    pub warnings: Vec<QualityWarning>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Check a recording for structural and statistical sanity.
///
/// Never mutates `recording`; calling it twice yields identical reports.
///
/// # Errors
///
/// [`PipelineError::DataCorrupt`] if any sample is NaN or infinite.
pub fn validate_recording(recording: &Recording, log: &mut ProcessingLog) -> Result<ValidationReport> {
    let mut n_bad = 0usize;
    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for v in recording.values() {
        if v.is_finite() {
            lo = lo.min(v);
            hi = hi.max(v);
        } else {
            n_bad += 1;
        }
    }
    if n_bad > 0 {
        log.warn("Data validation failed", json!({ "non_finite_samples": n_bad }));
        return Err(PipelineError::DataCorrupt { count: n_bad });
    }
    let peak_to_peak = hi - lo;

    let metrics = RecordingMetrics {
        n_channels: recording.n_channels(),
        n_epochs: recording.n_epochs(),
        n_times: recording.n_times(),
        duration_s: recording.duration(),
        sampling_rate: recording.sfreq(),
        peak_to_peak,
    };

    let mut warnings = Vec::new();
    if metrics.n_channels < MIN_CHANNELS {
        warnings.push(QualityWarning::LowChannelCount { n_channels: metrics.n_channels });
    }
    if metrics.duration_s < MIN_DURATION_S {
        warnings.push(QualityWarning::ShortRecording { duration_s: metrics.duration_s });
    }
    if metrics.sampling_rate < MIN_SFREQ_HZ {
        warnings.push(QualityWarning::LowSampleRate { sfreq: metrics.sampling_rate });
    }
    if peak_to_peak > MAX_PEAK_TO_PEAK {
        warnings.push(QualityWarning::LargeAmplitude { peak_to_peak });
    } else if peak_to_peak < MIN_PEAK_TO_PEAK {
        warnings.push(QualityWarning::SmallAmplitude { peak_to_peak });
    }

    for w in &warnings {
        log.warn(w.to_string(), serde_json::to_value(w).unwrap_or_default());
    }
    log.record("Data validated", serde_json::to_value(&metrics).unwrap_or_default());

    Ok(ValidationReport { metrics, warnings })
}
