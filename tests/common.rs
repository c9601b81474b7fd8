/// Shared helpers: synthetic recordings and configuration files.
use eeg2source::{ChannelInfo, ChannelKind, Recording};
use ndarray::{Array2, Array3};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

/// The 19 channels of the classic 10-20 layout.
pub const CHANNELS_1020: [&str; 19] = [
    "Fp1", "Fp2", "F7", "F3", "Fz", "F4", "F8", "T7", "C3", "Cz",
    "C4", "T8", "P7", "P3", "Pz", "P4", "P8", "O1", "O2",
];

#[allow(unused)]
pub fn eeg_channels(names: &[&str]) -> Vec<ChannelInfo> {
    names.iter().map(|n| ChannelInfo::eeg(*n)).collect()
}

/// Alpha-band sines plus white noise, about 20 µV peak, one frequency per row.
pub fn synthetic_signal(n_ch: usize, n_t: usize, sfreq: f64, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((n_ch, n_t), |(c, t)| {
        let x = t as f64 / sfreq;
        let noise: f64 = StandardNormal.sample(&mut rng);
        1e-5 * (2.0 * PI * (8.0 + 0.5 * c as f64) * x).sin() + 2e-6 * noise
    })
}

#[allow(unused)]
pub fn continuous(names: &[&str], sfreq: f64, seconds: f64) -> Recording {
    let n_t = (seconds * sfreq).round() as usize;
    let data = synthetic_signal(names.len(), n_t, sfreq, 7);
    Recording::continuous(eeg_channels(names), sfreq, data).unwrap()
}

#[allow(unused)]
pub fn epoched(names: &[&str], sfreq: f64, n_epochs: usize, n_times: usize, tmin: f64) -> Recording {
    let mut data = Array3::zeros((n_epochs, names.len(), n_times));
    for e in 0..n_epochs {
        let trial = synthetic_signal(names.len(), n_times, sfreq, 100 + e as u64);
        data.index_axis_mut(ndarray::Axis(0), e).assign(&trial);
    }
    Recording::epoched(eeg_channels(names), sfreq, data, tmin, None).unwrap()
}

/// Mark `names` as ocular channels.
#[allow(unused)]
pub fn with_ocular(names: &[&str], ocular: &[&str]) -> Vec<ChannelInfo> {
    names
        .iter()
        .map(|n| ChannelInfo {
            name: n.to_string(),
            kind: if ocular.contains(n) { ChannelKind::Eog } else { ChannelKind::Eeg },
        })
        .collect()
}

/// A complete configuration document using the wrapped `{"default": v}` form.
#[allow(unused)]
pub fn full_config_json() -> serde_json::Value {
    serde_json::json!({
        "scientific_parameters": {
            "montage": { "default": "standard_1020" },
            "inverse_solution": {
                "method": { "default": "MNE" },
                "lambda2": { "default": 0.1111111111111111, "description": "1 / SNR²" },
                "regularization": { "default": "assumed_snr" }
            },
            "preprocessing": {
                "target_srate": { "default": 250.0 },
                "highpass_freq": { "default": 0.1 },
                "lowpass_freq": { "default": 45.0 }
            }
        },
        "processing_parameters": {
            "memory_threshold_gb": { "default": 4.0 },
            "validation_level": { "default": "strict" }
        },
        "metadata": { "version": "1.0.0", "author": "lab" }
    })
}

#[allow(unused)]
pub fn write_config(dir: &Path, doc: &serde_json::Value) -> PathBuf {
    let path = dir.join("autoclean_config.json");
    std::fs::write(&path, serde_json::to_string_pretty(doc).unwrap()).unwrap();
    path
}
