//! Inverse solution: sensor epochs → source time courses.
//!
//! [`solve`] never fails. Without a forward model, or when the numerical
//! pipeline breaks down, it returns a deterministic simulated estimate
//! tagged [`EstimateOrigin::Simulated`] and logs why.
//!
//! - [`covariance`]: noise window selection and empirical covariance.
//! - [`operator`]: minimum-norm kernel (loose 0.2, depth 0.8).
//! - [`simulate`]: the seeded fallback stream.

pub mod covariance;
pub mod operator;
pub mod simulate;

use ndarray::{s, Array3, Axis};
use serde_json::json;

use crate::baseline::{baseline_correct_inplace, leading_window, BASELINE_S};
use crate::config::{Configuration, RegularizationPolicy};
use crate::error::{ForwardFailure, SolverError};
use crate::forward::ForwardModel;
use crate::preprocess::PreprocessedEpochs;
use crate::provenance::ProcessingLog;

use covariance::{empirical_covariance, noise_window, NoiseWindowSource};
use operator::{InverseOperator, DEPTH, LOOSE};
use simulate::{simulated_region_activity, SIMULATION_SEED};

/// Signal-to-noise ratio assumed when applying the inverse.
pub const ASSUMED_SNR: f64 = 3.0;

/// Provenance of a [`SourceEstimate`].
#[derive(Debug, Clone, PartialEq)]
pub enum EstimateOrigin {
    /// Computed from data; `labels[i]` is the atlas region of source `i`.
    Genuine { labels: Vec<usize> },
    /// Seeded synthetic activity, one row per atlas region.
    Simulated { reason: String },
}

/// Source activity `[n_sources, T, E]`.
#[derive(Debug, Clone)]
pub struct SourceEstimate {
    pub data: Array3<f64>,
    pub origin: EstimateOrigin,
    pub sfreq: f64,
    pub tmin: f64,
}

impl SourceEstimate {
    pub fn n_sources(&self) -> usize {
        self.data.dim().0
    }

    pub fn n_times(&self) -> usize {
        self.data.dim().1
    }

    pub fn n_epochs(&self) -> usize {
        self.data.dim().2
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self.origin, EstimateOrigin::Simulated { .. })
    }
}

/// λ² actually applied under the configured policy.
pub fn applied_lambda2(config: &Configuration) -> f64 {
    let inv = &config.scientific_parameters.inverse_solution;
    match inv.regularization {
        RegularizationPolicy::AssumedSnr => 1.0 / (ASSUMED_SNR * ASSUMED_SNR),
        RegularizationPolicy::Configured => inv.lambda2,
    }
}

/// Estimate source activity for `epochs`.
pub fn solve(
    epochs: &PreprocessedEpochs,
    forward: Result<ForwardModel, ForwardFailure>,
    config: &Configuration,
    log: &mut ProcessingLog,
) -> SourceEstimate {
    let inv = &config.scientific_parameters.inverse_solution;
    log.record("Computing inverse solution", json!({ "lambda2": inv.lambda2 }));

    let fwd = match forward {
        Ok(fwd) => fwd,
        Err(failure) => {
            return simulated(epochs, format!("forward model unavailable: {failure}"), log);
        }
    };

    if !inv.method.eq_ignore_ascii_case("MNE") {
        log.warn(
            "Unsupported inverse method, using MNE",
            json!({ "configured": inv.method }),
        );
    }

    let lambda2 = applied_lambda2(config);
    let details = json!({
        "configured_lambda2": inv.lambda2,
        "applied_lambda2": lambda2,
        "policy": inv.regularization,
        "snr": ASSUMED_SNR,
    });
    if (lambda2 - inv.lambda2).abs() > 1e-12 {
        log.warn("Configured lambda2 overridden by assumed SNR", details);
    } else {
        log.record("Regularization parameter", details);
    }

    match solve_genuine(epochs, &fwd, lambda2, log) {
        Ok(est) => est,
        Err(e) => {
            log.warn("Inverse solution failed", json!({ "error": e.to_string() }));
            simulated(epochs, format!("inverse solution failed: {e}"), log)
        }
    }
}

fn solve_genuine(
    epochs: &PreprocessedEpochs,
    fwd: &ForwardModel,
    lambda2: f64,
    log: &mut ProcessingLog,
) -> Result<SourceEstimate, SolverError> {
    let (n_e, n_ch, n_t) = epochs.data.dim();
    if fwd.channel_indices.len() != fwd.n_channels() || fwd.channel_indices.iter().any(|&i| i >= n_ch) {
        return Err(SolverError::ShapeMismatch(format!(
            "forward model covers {} channels, epochs have {n_ch}",
            fwd.n_channels()
        )));
    }

    let mut data = epochs.data.clone();
    let baseline = match epochs.baseline {
        Some(span) => span,
        None => {
            let w = leading_window(epochs.tmin, n_t, epochs.sfreq, BASELINE_S);
            baseline_correct_inplace(&mut data, &w);
            log.record(
                "Applied baseline correction",
                json!({ "tmin": w.span.0, "tmax": w.span.1 }),
            );
            w.span
        }
    };

    let (window, source) = noise_window(epochs.tmin, n_t, epochs.sfreq, baseline);
    if source == NoiseWindowSource::Baseline {
        log.record(
            "Noise covariance from baseline window",
            json!({
                "reason": "fewer than 2 samples at t <= 0",
                "tmin": window.span.0,
                "tmax": window.span.1,
            }),
        );
    }
    let noise_cov = empirical_covariance(&data, &fwd.channel_indices, &window)?;
    log.record(
        "Computed noise covariance",
        json!({
            "method": "empirical",
            "n_samples": noise_cov.n_samples,
            "n_channels": noise_cov.dim(),
        }),
    );

    let op = InverseOperator::make(&fwd.leadfield, &fwd.source_space.normals, &noise_cov, lambda2)?;
    log.record(
        "Created inverse operator",
        json!({ "loose": LOOSE, "depth": DEPTH, "rank": op.rank }),
    );

    let mut out = Array3::<f64>::zeros((fwd.n_sources(), n_t, n_e));
    for e in 0..n_e {
        let epoch = data.slice(s![e, .., ..]).select(Axis(0), &fwd.channel_indices);
        out.slice_mut(s![.., .., e]).assign(&op.apply(epoch.view()));
    }
    if out.iter().any(|v| !v.is_finite()) {
        return Err(SolverError::NonFinite("source estimate"));
    }

    tracing::info!(n_sources = fwd.n_sources(), n_epochs = n_e, lambda2, "inverse solution applied");
    log.record(
        "Inverse solution computed successfully",
        json!({
            "n_sources": fwd.n_sources(),
            "n_times": n_t,
            "n_epochs": n_e,
            "method": "MNE",
            "lambda2": lambda2,
        }),
    );
    Ok(SourceEstimate {
        data: out,
        origin: EstimateOrigin::Genuine { labels: fwd.labels.clone() },
        sfreq: epochs.sfreq,
        tmin: epochs.tmin,
    })
}

fn simulated(epochs: &PreprocessedEpochs, reason: String, log: &mut ProcessingLog) -> SourceEstimate {
    log.warn(
        "Using simulated inverse solution",
        json!({ "reason": reason, "seed": SIMULATION_SEED }),
    );
    SourceEstimate {
        data: simulated_region_activity(epochs.n_times(), epochs.n_epochs()),
        origin: EstimateOrigin::Simulated { reason },
        sfreq: epochs.sfreq,
        tmin: epochs.tmin,
    }
}
