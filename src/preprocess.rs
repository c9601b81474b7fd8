//! Recording → analysis-ready epochs.
//!
//! ```text
//! Recording
//!   │
//!   ├─ retype HEOG / VEOG         → Eog (excluded from reference + forward)
//!   ├─ high-pass  (hp > 0)        zero-phase FIR, skipped for epochs < 2 s
//!   ├─ low-pass   (lp < nyquist)  zero-phase FIR, skipped for epochs < 2 s
//!   ├─ resample   (|Δsfreq| > 0.1 Hz)
//!   ├─ epoch      continuous only: 2 s windows, 50 % overlap
//!   └─ average reference over EEG channels (≥ 2)
//!        │
//!        └─→ PreprocessedEpochs  [E, C, T]
//! ```
//!
//! A failing filter never fails the file: the unfiltered data is passed on
//! and a warning is logged.
use ndarray::{s, Array2, Array3};
use serde_json::json;

use crate::config::Configuration;
use crate::epoch::{self, OVERLAP, WINDOW_S};
use crate::error::{PipelineError, Result};
use crate::filter::{apply_fir_zero_phase, design_highpass, design_lowpass};
use crate::provenance::ProcessingLog;
use crate::recording::{ChannelInfo, ChannelKind, Recording, Samples};
use crate::reference::average_reference_epochs;
use crate::resample::{needs_resampling, resample, resample_epochs};

/// Channel names treated as ocular, matched case-sensitively.
pub const OCULAR_CHANNELS: [&str; 2] = ["HEOG", "VEOG"];

/// Epochs shorter than this (seconds, first to last sample) are not filtered.
pub const SHORT_EPOCH_S: f64 = 2.0;

/// Output of [`preprocess`].
#[derive(Debug, Clone)]
pub struct PreprocessedEpochs {
    /// `[E, C, T]`.
    pub data: Array3<f64>,
    pub sfreq: f64,
    /// Time of the first sample of every epoch.
    pub tmin: f64,
    /// Channel infos with ocular channels retyped.
    pub channels: Vec<ChannelInfo>,
    /// Baseline window already applied, if any.
    pub baseline: Option<(f64, f64)>,
    /// Whether the average reference was applied.
    pub average_reference: bool,
}

impl PreprocessedEpochs {
    pub fn n_epochs(&self) -> usize {
        self.data.dim().0
    }

    pub fn n_channels(&self) -> usize {
        self.data.dim().1
    }

    pub fn n_times(&self) -> usize {
        self.data.dim().2
    }

    /// `times[-1] − times[0]` of one epoch.
    pub fn epoch_duration(&self) -> f64 {
        self.n_times().saturating_sub(1) as f64 / self.sfreq
    }

    /// Sample times of one epoch.
    pub fn times(&self) -> Vec<f64> {
        epoch::epoch_times(self.n_times(), self.sfreq, self.tmin)
    }

    /// `true` for every EEG channel.
    pub fn eeg_mask(&self) -> Vec<bool> {
        self.channels.iter().map(|c| c.kind == ChannelKind::Eeg).collect()
    }

    /// Indices of the EEG channels.
    pub fn eeg_indices(&self) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == ChannelKind::Eeg)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Band-limit, resample, window and re-reference `recording`.
///
/// `recording` is only read; every transform works on a copy.
///
/// # Errors
///
/// [`PipelineError::Preprocessing`] if resampling fails or a continuous
/// recording is shorter than one window.
pub fn preprocess(
    recording: &Recording,
    config: &Configuration,
    log: &mut ProcessingLog,
) -> Result<PreprocessedEpochs> {
    let params = &config.scientific_parameters.preprocessing;
    let target = params.target_srate;
    let src = recording.sfreq();

    let channels = retype_ocular(recording.channels(), log);

    let (data, sfreq, tmin, baseline) = match recording.samples() {
        Samples::Continuous(raw) => {
            let mut data = raw.clone();
            band_limit_continuous(&mut data, src, params.highpass_freq, params.lowpass_freq, log);

            let mut sfreq = src;
            if needs_resampling(src, target) {
                data = resample(&data, src, target)
                    .map_err(|e| PipelineError::Preprocessing(format!("resampling: {e:#}")))?;
                sfreq = target;
                log.record("Resampled data", json!({ "from": src, "to": target }));
            }

            let (window, stride) = epoch::window_params(sfreq, WINDOW_S, OVERLAP);
            let epochs = epoch::fixed_length_epochs(&data, window, stride);
            if epochs.dim().0 == 0 {
                return Err(PipelineError::Preprocessing(format!(
                    "recording of {} samples is shorter than one {WINDOW_S} s window ({window} samples)",
                    data.ncols()
                )));
            }
            log.record(
                "Created fixed-length epochs",
                json!({
                    "duration": WINDOW_S,
                    "overlap": OVERLAP,
                    "window_samples": window,
                    "n_epochs": epochs.dim().0,
                }),
            );
            (epochs, sfreq, 0.0, None)
        }
        Samples::Epoched { data: raw, tmin, baseline } => {
            let mut data = raw.clone();
            if recording.epoch_duration() < SHORT_EPOCH_S {
                log.record(
                    "Skipping filtering for short epochs",
                    json!({ "epoch_duration": recording.epoch_duration(), "minimum": SHORT_EPOCH_S }),
                );
            } else {
                band_limit_epochs(&mut data, src, params.highpass_freq, params.lowpass_freq, log);
            }

            let mut sfreq = src;
            if needs_resampling(src, target) {
                data = resample_epochs(&data, src, target)
                    .map_err(|e| PipelineError::Preprocessing(format!("resampling: {e:#}")))?;
                sfreq = target;
                log.record("Resampled epochs", json!({ "from": src, "to": target }));
            }
            (data, sfreq, *tmin, *baseline)
        }
    };

    let mut out = PreprocessedEpochs {
        data,
        sfreq,
        tmin,
        channels,
        baseline,
        average_reference: false,
    };

    let mask = out.eeg_mask();
    let n_ref = average_reference_epochs(&mut out.data, &mask);
    if n_ref > 0 {
        out.average_reference = true;
        log.record("Applied average reference", json!({ "n_channels": n_ref }));
    } else {
        log.warn(
            "Skipped average reference",
            json!({ "eeg_channels": mask.iter().filter(|m| **m).count() }),
        );
    }

    tracing::info!(
        n_epochs = out.n_epochs(),
        n_channels = out.n_channels(),
        n_times = out.n_times(),
        sfreq = out.sfreq,
        "preprocessing complete"
    );
    log.record(
        "Preprocessing completed",
        json!({
            "n_epochs": out.n_epochs(),
            "n_channels": out.n_channels(),
            "n_times": out.n_times(),
            "sfreq": out.sfreq,
        }),
    );
    Ok(out)
}

/// Copy `channels`, retyping the ocular ones to [`ChannelKind::Eog`].
fn retype_ocular(channels: &[ChannelInfo], log: &mut ProcessingLog) -> Vec<ChannelInfo> {
    let mut out = channels.to_vec();
    let mut retyped = Vec::new();
    for ch in out.iter_mut() {
        if OCULAR_CHANNELS.contains(&ch.name.as_str()) && ch.kind != ChannelKind::Eog {
            ch.kind = ChannelKind::Eog;
            retyped.push(ch.name.clone());
        }
    }
    if !retyped.is_empty() {
        log.record("Set ocular channel types", json!({ "channels": retyped }));
    }
    out
}

// ── Filtering ───────────────────────────────────────────────────────────────

/// High-pass and low-pass kernels for one sample rate.
struct BandPlan {
    highpass: Option<Vec<f64>>,
    lowpass: Option<Vec<f64>>,
}

impl BandPlan {
    fn design(sfreq: f64, hp: f64, lp: f64) -> anyhow::Result<Self> {
        let highpass = if hp > 0.0 { Some(design_highpass(hp, sfreq)?) } else { None };
        let lowpass = if lp < sfreq / 2.0 { Some(design_lowpass(lp, sfreq)?) } else { None };
        Ok(Self { highpass, lowpass })
    }

    fn is_empty(&self) -> bool {
        self.highpass.is_none() && self.lowpass.is_none()
    }

    fn apply(&self, data: &mut Array2<f64>) -> anyhow::Result<()> {
        if let Some(h) = &self.highpass {
            apply_fir_zero_phase(data, h)?;
        }
        if let Some(h) = &self.lowpass {
            apply_fir_zero_phase(data, h)?;
        }
        Ok(())
    }

    fn details(&self, hp: f64, lp: f64) -> serde_json::Value {
        json!({
            "highpass": self.highpass.as_ref().map(|_| hp),
            "lowpass": self.lowpass.as_ref().map(|_| lp),
            "highpass_taps": self.highpass.as_ref().map(Vec::len),
            "lowpass_taps": self.lowpass.as_ref().map(Vec::len),
        })
    }
}

fn band_limit_continuous(data: &mut Array2<f64>, sfreq: f64, hp: f64, lp: f64, log: &mut ProcessingLog) {
    let result = BandPlan::design(sfreq, hp, lp).and_then(|plan| {
        let mut filtered = data.clone();
        plan.apply(&mut filtered)?;
        Ok((plan, filtered))
    });
    match result {
        Ok((plan, _)) if plan.is_empty() => {}
        Ok((plan, filtered)) => {
            *data = filtered;
            log.record("Applied filtering", plan.details(hp, lp));
        }
        Err(e) => filter_failed(e, log),
    }
}

fn band_limit_epochs(data: &mut Array3<f64>, sfreq: f64, hp: f64, lp: f64, log: &mut ProcessingLog) {
    let result = BandPlan::design(sfreq, hp, lp).and_then(|plan| {
        let mut filtered = data.clone();
        if !plan.is_empty() {
            for e in 0..filtered.dim().0 {
                let mut epoch = filtered.slice(s![e, .., ..]).to_owned();
                plan.apply(&mut epoch)?;
                filtered.slice_mut(s![e, .., ..]).assign(&epoch);
            }
        }
        Ok((plan, filtered))
    });
    match result {
        Ok((plan, _)) if plan.is_empty() => {}
        Ok((plan, filtered)) => {
            *data = filtered;
            log.record("Applied filtering", plan.details(hp, lp));
        }
        Err(e) => filter_failed(e, log),
    }
}

fn filter_failed(e: anyhow::Error, log: &mut ProcessingLog) {
    log.warn(
        "Filtering failed, continuing with unfiltered data",
        json!({ "error": format!("{e:#}") }),
    );
}
