//! Forward model: electrode alignment, coverage gate, leadfield.
//!
//! ```text
//! PreprocessedEpochs ─┬─ reconcile channel-name case with the montage
//!                     ├─ attach positions, project onto the head sphere
//!                     ├─ require ≥ 8 located EEG channels
//!                     └─ leadfield  [n_located, 3 · n_sources]
//! ```
//!
//! Nothing here fails a file. Every problem comes back as a
//! [`ForwardFailure`], is logged as a warning, and makes the inverse stage
//! take the simulation path.
use ndarray::Array2;
use serde_json::{json, Map, Value};

use crate::anatomy::{AnatomyProvider, HeadModel, SourceSpace};
use crate::config::Configuration;
use crate::error::ForwardFailure;
use crate::montage::Montage;
use crate::preprocess::PreprocessedEpochs;
use crate::provenance::ProcessingLog;
use crate::recording::{ChannelInfo, ChannelKind};

/// Minimum number of EEG channels with a known position.
pub const MIN_LOCATED_CHANNELS: usize = 8;

/// Gain from template sources to the located EEG channels.
#[derive(Debug, Clone)]
pub struct ForwardModel {
    /// `[n_channels, 3 · n_sources]`; columns `3j..3j+3` are the x, y, z
    /// dipoles of source `j`.
    pub leadfield: Array2<f64>,
    pub source_space: SourceSpace,
    /// Atlas region of every source.
    pub labels: Vec<usize>,
    pub head_model: HeadModel,
    /// Rows of the epoch tensor covered by the leadfield, in leadfield order.
    pub channel_indices: Vec<usize>,
    /// Montage spelling of those channels.
    pub ch_names: Vec<String>,
    /// Electrode positions on the head sphere, in metres.
    pub electrodes: Vec<[f64; 3]>,
}

impl ForwardModel {
    pub fn n_channels(&self) -> usize {
        self.leadfield.nrows()
    }

    pub fn n_sources(&self) -> usize {
        self.source_space.len()
    }
}

/// Renames needed to match `montage` spelling, as `(recording, montage)`
/// pairs. Ocular channels are left alone.
pub fn reconcile_channel_names(channels: &[ChannelInfo], montage: &Montage) -> Vec<(String, String)> {
    channels
        .iter()
        .filter(|c| c.kind != ChannelKind::Eog)
        .filter_map(|c| {
            let canonical = montage.canonical_name(&c.name)?;
            (canonical != c.name).then(|| (c.name.clone(), canonical.to_string()))
        })
        .collect()
}

/// Build the forward model for `epochs`.
///
/// On failure the reason is logged as a warning and returned; the caller
/// hands it to [`inverse::solve`](crate::inverse::solve) unchanged.
pub fn build(
    epochs: &PreprocessedEpochs,
    config: &Configuration,
    anatomy: &dyn AnatomyProvider,
    log: &mut ProcessingLog,
) -> Result<ForwardModel, ForwardFailure> {
    match build_inner(epochs, config, anatomy, log) {
        Ok(fwd) => {
            log.record(
                "Forward solution computed",
                json!({
                    "subject": anatomy.subject(),
                    "n_channels": fwd.n_channels(),
                    "n_sources": fwd.n_sources(),
                    "conductivity": fwd.head_model.conductivity,
                    "radius": fwd.head_model.radius,
                }),
            );
            Ok(fwd)
        }
        Err(failure) => {
            log.warn(
                "Forward model failed, using simulation fallback",
                json!({ "reason": failure.to_string() }),
            );
            Err(failure)
        }
    }
}

fn build_inner(
    epochs: &PreprocessedEpochs,
    config: &Configuration,
    anatomy: &dyn AnatomyProvider,
    log: &mut ProcessingLog,
) -> Result<ForwardModel, ForwardFailure> {
    let template = anatomy
        .load()
        .map_err(|e| ForwardFailure::Anatomy(format!("{e:#}")))?;
    let montage = Montage::standard(&config.scientific_parameters.montage)?;

    let renames = reconcile_channel_names(&epochs.channels, &montage);
    if !renames.is_empty() {
        let mapping: Map<String, Value> = renames
            .iter()
            .map(|(from, to)| (from.clone(), Value::String(to.clone())))
            .collect();
        log.record("Renamed channels for montage compatibility", Value::Object(mapping));
    }

    let radius = template.head_model.radius;
    let mut channel_indices = Vec::new();
    let mut ch_names = Vec::new();
    let mut electrodes = Vec::new();
    for (idx, ch) in epochs.channels.iter().enumerate() {
        if ch.kind != ChannelKind::Eeg {
            continue;
        }
        let name = renames
            .iter()
            .find(|(from, _)| *from == ch.name)
            .map_or(ch.name.as_str(), |(_, to)| to.as_str());
        let Some(pos) = montage.position(name) else {
            continue;
        };
        let norm = norm3(pos);
        if norm == 0.0 {
            continue;
        }
        channel_indices.push(idx);
        ch_names.push(name.to_string());
        electrodes.push(pos.map(|v| v * radius / norm));
    }
    log.record(
        "Set montage",
        json!({
            "montage": montage.name(),
            "located_channels": channel_indices.len(),
            "total_channels": epochs.channels.len(),
        }),
    );

    if channel_indices.len() < MIN_LOCATED_CHANNELS {
        return Err(ForwardFailure::InsufficientElectrodeCoverage {
            found: channel_indices.len(),
            required: MIN_LOCATED_CHANNELS,
        });
    }

    for (index, p) in template.source_space.positions.iter().enumerate() {
        let distance = norm3(*p);
        if !(distance < radius) {
            return Err(ForwardFailure::SourceOutsideHead { index, distance, radius });
        }
    }

    let leadfield = compute_leadfield(&electrodes, &template.source_space, &template.head_model);
    if leadfield.iter().any(|v| !v.is_finite()) {
        return Err(ForwardFailure::DegenerateLeadfield("non-finite gain".into()));
    }
    if leadfield.iter().all(|&v| v == 0.0) {
        return Err(ForwardFailure::DegenerateLeadfield("all-zero gain".into()));
    }

    Ok(ForwardModel {
        leadfield,
        source_space: template.source_space,
        labels: template.labels,
        head_model: template.head_model,
        channel_indices,
        ch_names,
        electrodes,
    })
}

/// Leadfield `[n_electrodes, 3 · n_sources]` of unit x, y, z dipoles.
pub fn compute_leadfield(electrodes: &[[f64; 3]], sources: &SourceSpace, head: &HeadModel) -> Array2<f64> {
    let mut gain = Array2::<f64>::zeros((electrodes.len(), 3 * sources.len()));
    const AXES: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
    for (i, r) in electrodes.iter().enumerate() {
        for (j, r0) in sources.positions.iter().enumerate() {
            for (k, q) in AXES.iter().enumerate() {
                gain[[i, 3 * j + k]] = dipole_potential(*r, *r0, *q, head.conductivity);
            }
        }
    }
    gain
}

/// Potential at surface point `r` of a homogeneous sphere (radius `|r|`)
/// due to a current dipole `q` (A⋅m) at `r0`:
///
/// ```text
/// V = 1/(4πσ) · q · [ 2d/|d|³ + (|r|·d + |d|·r) / (|r|·|d|·(|r|·|d| + |r|² − r·r0)) ]
/// d = r − r0
/// ```
pub fn dipole_potential(r: [f64; 3], r0: [f64; 3], q: [f64; 3], conductivity: f64) -> f64 {
    let d = [r[0] - r0[0], r[1] - r0[1], r[2] - r0[2]];
    let dn = norm3(d);
    let rn = norm3(r);
    let r_dot_r0 = dot3(r, r0);
    let q_dot_d = dot3(q, d);
    let q_dot_r = dot3(q, r);

    let near = 2.0 * q_dot_d / (dn * dn * dn);
    let f = rn * dn * (rn * dn + rn * rn - r_dot_r0);
    let far = (rn * q_dot_d + dn * q_dot_r) / f;
    (near + far) / (4.0 * std::f64::consts::PI * conductivity)
}

fn dot3(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn norm3(a: [f64; 3]) -> f64 {
    dot3(a, a).sqrt()
}
