//! Pipeline configuration.
//!
//! [`Configuration`] holds every scientific and processing parameter of a
//! run. It is loaded once from a JSON document with three required sections
//! (`scientific_parameters`, `processing_parameters`, `metadata`), range
//! checked by [`Configuration::validate`], and treated as immutable from then
//! on.
//!
//! Any parameter missing from the document falls back to the default listed
//! on its field, and the substitution is written to the [`ProcessingLog`].
//! Parameters may be written either as a bare value or wrapped as
//! `{"default": value, "description": ..., "citation": ...}`; the wrapper is
//! resolved at load time and never reaches the typed struct.
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::provenance::ProcessingLog;

/// Accepted range for `inverse_solution.lambda2`.
pub const LAMBDA2_RANGE: (f64, f64) = (0.001, 1.0);

/// Accepted range for `preprocessing.target_srate` in Hz.
pub const TARGET_SRATE_RANGE: (f64, f64) = (50.0, 2000.0);

/// Sections that must be present in every configuration document.
pub const REQUIRED_SECTIONS: [&str; 3] =
    ["scientific_parameters", "processing_parameters", "metadata"];

/// Complete, validated run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub scientific_parameters: ScientificParameters,
    pub processing_parameters: ProcessingParameters,
    pub metadata: Metadata,
}

/// Parameters that change the scientific result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScientificParameters {
    /// Name of the standard electrode montage used to place channels.
    ///
    /// Default: `"standard_1020"`.
    pub montage: String,

    pub inverse_solution: InverseSolutionParams,

    pub preprocessing: PreprocessingParams,
}

/// Minimum-norm inverse settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InverseSolutionParams {
    /// Inverse method label. Only minimum-norm (`"MNE"`) is computed.
    ///
    /// Default: `"MNE"`.
    pub method: String,

    /// Regularization strength λ². Must lie in `[0.001, 1.0]`.
    ///
    /// Only applied when [`regularization`](Self::regularization) is
    /// [`RegularizationPolicy::Configured`].
    ///
    /// Default: `1/9`.
    pub lambda2: f64,

    /// Which λ² the solver actually applies.
    ///
    /// Default: [`RegularizationPolicy::AssumedSnr`].
    pub regularization: RegularizationPolicy,
}

/// Source of the λ² applied by the inverse solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegularizationPolicy {
    /// λ² = 1 / SNR² with the fixed assumed SNR of 3.0.
    #[default]
    AssumedSnr,
    /// The validated `lambda2` from the configuration.
    Configured,
}

/// Band-limiting and resampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingParams {
    /// Sampling rate after resampling, in Hz. Must lie in `[50, 2000]`.
    ///
    /// Resampling is skipped when the source rate is within 0.1 Hz.
    ///
    /// Default: `250.0` Hz.
    pub target_srate: f64,

    /// High-pass cutoff in Hz. `0` disables the high-pass filter.
    ///
    /// Default: `0.1` Hz.
    pub highpass_freq: f64,

    /// Low-pass cutoff in Hz. Values at or above Nyquist disable the
    /// low-pass filter. Must exceed `highpass_freq`.
    ///
    /// Default: `45.0` Hz.
    pub lowpass_freq: f64,
}

/// Resource settings that do not change the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingParameters {
    /// Resident-memory ceiling in GB. Exceeding it only produces a warning.
    ///
    /// Default: `4.0`.
    pub memory_threshold_gb: f64,

    /// Free-form validation level label, carried into provenance.
    ///
    /// Default: `"strict"`.
    pub validation_level: String,
}

/// Free-form metadata. `version` is required; every other key round-trips
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub version: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Configuration {
    /// Every parameter at its documented default.
    fn default() -> Self {
        Self {
            scientific_parameters: ScientificParameters {
                montage: "standard_1020".into(),
                inverse_solution: InverseSolutionParams {
                    method: "MNE".into(),
                    lambda2: 1.0 / 9.0,
                    regularization: RegularizationPolicy::AssumedSnr,
                },
                preprocessing: PreprocessingParams {
                    target_srate: 250.0,
                    highpass_freq: 0.1,
                    lowpass_freq: 45.0,
                },
            },
            processing_parameters: ProcessingParameters {
                memory_threshold_gb: 4.0,
                validation_level: "strict".into(),
            },
            metadata: Metadata {
                version: env!("CARGO_PKG_VERSION").into(),
                extra: Map::new(),
            },
        }
    }
}

// ── Document schema ─────────────────────────────────────────────────────────
//
// Everything below is optional so that missing parameters can be told apart
// from present ones and logged when defaulted.

/// A parameter written either bare or as `{"default": value, ...}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Param<T> {
    Wrapped { default: T },
    Bare(T),
}

impl<T> Param<T> {
    fn into_inner(self) -> T {
        match self {
            Param::Wrapped { default } | Param::Bare(default) => default,
        }
    }
}

#[derive(Deserialize)]
struct Document {
    scientific_parameters: Option<ScientificDoc>,
    processing_parameters: Option<ProcessingDoc>,
    metadata: Option<Map<String, Value>>,
}

#[derive(Deserialize, Default)]
struct ScientificDoc {
    montage: Option<Param<String>>,
    inverse_solution: Option<InverseDoc>,
    preprocessing: Option<PreprocessingDoc>,
}

#[derive(Deserialize, Default)]
struct InverseDoc {
    method: Option<Param<String>>,
    lambda2: Option<Param<f64>>,
    regularization: Option<Param<RegularizationPolicy>>,
}

#[derive(Deserialize, Default)]
struct PreprocessingDoc {
    target_srate: Option<Param<f64>>,
    highpass_freq: Option<Param<f64>>,
    lowpass_freq: Option<Param<f64>>,
}

#[derive(Deserialize, Default)]
struct ProcessingDoc {
    memory_threshold_gb: Option<Param<f64>>,
    validation_level: Option<Param<String>>,
}

/// Take `value` if present, otherwise log and return `default`.
fn resolve<T: Serialize>(
    value: Option<Param<T>>,
    key: &str,
    default: T,
    log: &mut ProcessingLog,
) -> T {
    match value {
        Some(p) => p.into_inner(),
        None => {
            log.record(format!("Using default for {key}"), json!({ "default": &default }));
            default
        }
    }
}

impl Configuration {
    /// Load a configuration document from `path`.
    ///
    /// # Errors
    ///
    /// * [`PipelineError::ConfigNotFound`] if `path` does not exist.
    /// * [`PipelineError::ConfigMalformed`] if it is not valid JSON or a
    ///   parameter has the wrong type.
    /// * [`PipelineError::ConfigIncomplete`] if a required section or
    ///   `metadata.version` is missing.
    pub fn load(path: impl AsRef<Path>, log: &mut ProcessingLog) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::ConfigNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, path, log)
    }

    /// Parse a configuration document held in memory. `origin` is only used
    /// in error messages.
    pub fn parse(text: &str, origin: &Path, log: &mut ProcessingLog) -> Result<Self> {
        let malformed = |e: serde_json::Error| PipelineError::ConfigMalformed {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        };
        let raw: Value = serde_json::from_str(text).map_err(malformed)?;
        let obj = raw.as_object().ok_or_else(|| PipelineError::ConfigMalformed {
            path: origin.to_path_buf(),
            reason: "top level is not an object".into(),
        })?;
        for section in REQUIRED_SECTIONS {
            if !obj.contains_key(section) {
                return Err(PipelineError::ConfigIncomplete(section.into()));
            }
        }
        let doc: Document = serde_json::from_value(raw).map_err(malformed)?;

        let mut metadata = doc
            .metadata
            .ok_or_else(|| PipelineError::ConfigIncomplete("metadata".into()))?;
        let version = match metadata.remove("version") {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => return Err(PipelineError::ConfigIncomplete("metadata.version".into())),
        };
        let metadata = Metadata { version, extra: metadata };
        log.record("Configuration loaded successfully", serde_json::to_value(&metadata)?);

        let d = Configuration::default();
        let sci = doc.scientific_parameters.unwrap_or_default();
        let inv = sci.inverse_solution.unwrap_or_default();
        let pre = sci.preprocessing.unwrap_or_default();
        let proc_ = doc.processing_parameters.unwrap_or_default();
        let (dsci, dproc) = (d.scientific_parameters, d.processing_parameters);

        Ok(Self {
            scientific_parameters: ScientificParameters {
                montage: resolve(sci.montage, "scientific_parameters.montage", dsci.montage, log),
                inverse_solution: InverseSolutionParams {
                    method: resolve(
                        inv.method,
                        "scientific_parameters.inverse_solution.method",
                        dsci.inverse_solution.method,
                        log,
                    ),
                    lambda2: resolve(
                        inv.lambda2,
                        "scientific_parameters.inverse_solution.lambda2",
                        dsci.inverse_solution.lambda2,
                        log,
                    ),
                    regularization: resolve(
                        inv.regularization,
                        "scientific_parameters.inverse_solution.regularization",
                        dsci.inverse_solution.regularization,
                        log,
                    ),
                },
                preprocessing: PreprocessingParams {
                    target_srate: resolve(
                        pre.target_srate,
                        "scientific_parameters.preprocessing.target_srate",
                        dsci.preprocessing.target_srate,
                        log,
                    ),
                    highpass_freq: resolve(
                        pre.highpass_freq,
                        "scientific_parameters.preprocessing.highpass_freq",
                        dsci.preprocessing.highpass_freq,
                        log,
                    ),
                    lowpass_freq: resolve(
                        pre.lowpass_freq,
                        "scientific_parameters.preprocessing.lowpass_freq",
                        dsci.preprocessing.lowpass_freq,
                        log,
                    ),
                },
            },
            processing_parameters: ProcessingParameters {
                memory_threshold_gb: resolve(
                    proc_.memory_threshold_gb,
                    "processing_parameters.memory_threshold_gb",
                    dproc.memory_threshold_gb,
                    log,
                ),
                validation_level: resolve(
                    proc_.validation_level,
                    "processing_parameters.validation_level",
                    dproc.validation_level,
                    log,
                ),
            },
            metadata,
        })
    }

    /// Check every numeric parameter against its scientific range.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ConfigOutOfRange`] naming the first offending
    /// parameter and its bound.
    pub fn validate(&self, log: &mut ProcessingLog) -> Result<()> {
        let sci = &self.scientific_parameters;

        let lambda2 = sci.inverse_solution.lambda2;
        check_range("inverse_solution.lambda2", lambda2, LAMBDA2_RANGE)?;

        let srate = sci.preprocessing.target_srate;
        check_range("preprocessing.target_srate", srate, TARGET_SRATE_RANGE)?;

        let hp = sci.preprocessing.highpass_freq;
        let lp = sci.preprocessing.lowpass_freq;
        if !(hp >= 0.0) {
            return Err(PipelineError::ConfigOutOfRange {
                parameter: "preprocessing.highpass_freq",
                value: hp,
                bound: ">= 0".into(),
            });
        }
        if !(hp < lp) {
            return Err(PipelineError::ConfigOutOfRange {
                parameter: "preprocessing.highpass_freq",
                value: hp,
                bound: format!("< lowpass_freq ({lp})"),
            });
        }

        let mem = self.processing_parameters.memory_threshold_gb;
        if !(mem > 0.0) {
            return Err(PipelineError::ConfigOutOfRange {
                parameter: "processing_parameters.memory_threshold_gb",
                value: mem,
                bound: "> 0".into(),
            });
        }

        log.record(
            "Scientific parameters validated successfully",
            json!({
                "lambda2": lambda2,
                "target_srate": srate,
                "highpass_freq": hp,
                "lowpass_freq": lp,
            }),
        );
        Ok(())
    }

    /// Memory ceiling in bytes.
    pub fn memory_threshold_bytes(&self) -> u64 {
        (self.processing_parameters.memory_threshold_gb * 1e9) as u64
    }
}

fn check_range(parameter: &'static str, value: f64, (lo, hi): (f64, f64)) -> Result<()> {
    // Written so that NaN fails too.
    if !(lo..=hi).contains(&value) {
        return Err(PipelineError::ConfigOutOfRange {
            parameter,
            value,
            bound: format!("[{lo}, {hi}]"),
        });
    }
    Ok(())
}
