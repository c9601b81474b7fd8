//! In-memory recordings handed over by a [`RecordingLoader`](crate::io::RecordingLoader).
//!
//! A [`Recording`] is either continuous (`[C, T]`) or already epoched
//! (`[E, C, T]`). Construction checks the structural invariants (positive
//! sample rate, non-empty unique channel names, shapes that agree with the
//! channel list). Sample values are *not* checked here: NaN / Inf detection
//! belongs to [`quality`](crate::quality) so that it is reported as a data
//! quality failure.
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{PipelineError, Result};

/// Channel type as far as the pipeline cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Eeg,
    /// Ocular channel; excluded from the average reference and the forward
    /// model.
    Eog,
    Misc,
}

impl ChannelKind {
    /// Parse a loader-side type label (`eeg`, `eog`, anything else → `Misc`).
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "eeg" => Self::Eeg,
            "eog" => Self::Eog,
            _ => Self::Misc,
        }
    }
}

/// Name + type of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    pub kind: ChannelKind,
}

impl ChannelInfo {
    pub fn eeg(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ChannelKind::Eeg }
    }
}

/// Sample storage.
#[derive(Debug, Clone)]
pub enum Samples {
    /// `[C, T]` continuous signal.
    Continuous(Array2<f64>),
    /// `[E, C, T]` trials.
    Epoched {
        data: Array3<f64>,
        /// Time of the first sample of every epoch, in seconds.
        tmin: f64,
        /// Baseline window already applied by the producer, if any.
        baseline: Option<(f64, f64)>,
    },
}

/// A validated multichannel recording.
#[derive(Debug, Clone)]
pub struct Recording {
    channels: Vec<ChannelInfo>,
    sfreq: f64,
    samples: Samples,
}

impl Recording {
    /// Build a continuous recording from `[C, T]` data.
    pub fn continuous(channels: Vec<ChannelInfo>, sfreq: f64, data: Array2<f64>) -> Result<Self> {
        check_header(&channels, sfreq)?;
        let (n_ch, n_t) = data.dim();
        check_dims(&channels, n_ch, n_t)?;
        Ok(Self { channels, sfreq, samples: Samples::Continuous(data) })
    }

    /// Build an epoched recording from `[E, C, T]` data.
    pub fn epoched(
        channels: Vec<ChannelInfo>,
        sfreq: f64,
        data: Array3<f64>,
        tmin: f64,
        baseline: Option<(f64, f64)>,
    ) -> Result<Self> {
        check_header(&channels, sfreq)?;
        let (n_e, n_ch, n_t) = data.dim();
        if n_e == 0 {
            return Err(PipelineError::InvalidRecording("no epochs".into()));
        }
        check_dims(&channels, n_ch, n_t)?;
        if !tmin.is_finite() {
            return Err(PipelineError::InvalidRecording(format!("tmin must be finite, got {tmin}")));
        }
        Ok(Self {
            channels,
            sfreq,
            samples: Samples::Epoched { data, tmin, baseline },
        })
    }

    pub fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    pub fn ch_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn sfreq(&self) -> f64 {
        self.sfreq
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn is_epoched(&self) -> bool {
        matches!(self.samples, Samples::Epoched { .. })
    }

    /// Number of epochs (1 for continuous data).
    pub fn n_epochs(&self) -> usize {
        match &self.samples {
            Samples::Continuous(_) => 1,
            Samples::Epoched { data, .. } => data.dim().0,
        }
    }

    /// Samples per channel (per epoch for epoched data).
    pub fn n_times(&self) -> usize {
        match &self.samples {
            Samples::Continuous(d) => d.ncols(),
            Samples::Epoched { data, .. } => data.dim().2,
        }
    }

    /// Span from first to last sample of one epoch (or of the whole
    /// continuous signal), in seconds: `(n_times − 1) / sfreq`.
    pub fn epoch_duration(&self) -> f64 {
        self.n_times().saturating_sub(1) as f64 / self.sfreq
    }

    /// Total recorded time in seconds, summed over epochs.
    pub fn duration(&self) -> f64 {
        match &self.samples {
            Samples::Continuous(_) => self.epoch_duration(),
            Samples::Epoched { .. } => (self.n_epochs() * self.n_times()) as f64 / self.sfreq,
        }
    }

    /// Iterator over every sample value.
    pub fn values(&self) -> Box<dyn Iterator<Item = f64> + '_> {
        match &self.samples {
            Samples::Continuous(d) => Box::new(d.iter().copied()),
            Samples::Epoched { data, .. } => Box::new(data.iter().copied()),
        }
    }
}

fn check_header(channels: &[ChannelInfo], sfreq: f64) -> Result<()> {
    if !(sfreq.is_finite() && sfreq > 0.0) {
        return Err(PipelineError::InvalidRecording(format!("sample rate must be > 0, got {sfreq}")));
    }
    if channels.is_empty() {
        return Err(PipelineError::InvalidRecording("no channels".into()));
    }
    let mut seen = HashSet::with_capacity(channels.len());
    for ch in channels {
        if ch.name.is_empty() {
            return Err(PipelineError::InvalidRecording("empty channel name".into()));
        }
        if !seen.insert(ch.name.as_str()) {
            return Err(PipelineError::InvalidRecording(format!("duplicate channel name '{}'", ch.name)));
        }
    }
    Ok(())
}

fn check_dims(channels: &[ChannelInfo], n_ch: usize, n_t: usize) -> Result<()> {
    if n_ch != channels.len() {
        return Err(PipelineError::InvalidRecording(format!(
            "data has {n_ch} channels but {} channel names were given",
            channels.len()
        )));
    }
    if n_t == 0 {
        return Err(PipelineError::InvalidRecording("no samples".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<ChannelInfo> {
        (0..n).map(|i| ChannelInfo::eeg(format!("E{i}"))).collect()
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut ch = names(3);
        ch[2].name = "E0".into();
        let r = Recording::continuous(ch, 250.0, Array2::zeros((3, 10)));
        assert!(matches!(r, Err(PipelineError::InvalidRecording(_))));
    }

    #[test]
    fn rejects_non_positive_rate() {
        assert!(Recording::continuous(names(2), 0.0, Array2::zeros((2, 10))).is_err());
        assert!(Recording::continuous(names(2), f64::NAN, Array2::zeros((2, 10))).is_err());
    }

    #[test]
    fn rejects_shape_mismatch() {
        assert!(Recording::continuous(names(2), 250.0, Array2::zeros((3, 10))).is_err());
        assert!(Recording::epoched(names(2), 250.0, Array3::zeros((0, 2, 10)), 0.0, None).is_err());
    }

    #[test]
    fn accepts_non_finite_samples() {
        let mut data = Array2::zeros((2, 10));
        data[[0, 3]] = f64::NAN;
        assert!(Recording::continuous(names(2), 250.0, data).is_ok());
    }

    #[test]
    fn durations() {
        let r = Recording::epoched(names(2), 250.0, Array3::zeros((4, 2, 376)), -0.5, None).unwrap();
        approx::assert_abs_diff_eq!(r.epoch_duration(), 1.5, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(r.duration(), 4.0 * 376.0 / 250.0, epsilon = 1e-12);
        assert_eq!(r.n_epochs(), 4);
    }

    #[test]
    fn kind_labels() {
        assert_eq!(ChannelKind::from_label("EEG"), ChannelKind::Eeg);
        assert_eq!(ChannelKind::from_label("eog"), ChannelKind::Eog);
        assert_eq!(ChannelKind::from_label("ecg"), ChannelKind::Misc);
    }
}
