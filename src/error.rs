//! Error types for the source-localization pipeline.
//!
//! Three families, matching how far each one is allowed to propagate:
//!
//! - [`PipelineError`]: configuration and per-file failures. Configuration
//!   variants abort a run before any file is touched; the rest mark a single
//!   file as failed.
//! - [`ForwardFailure`]: geometry / head-model problems. Never fails a file;
//!   selects the simulation path instead.
//! - [`SolverError`]: numerical problems inside the inverse computation. Same
//!   policy as [`ForwardFailure`].
use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a run (configuration) or fail a single file.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The configuration path does not exist.
    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration document is not valid JSON or has a mistyped field.
    #[error("configuration file {} is malformed: {reason}", path.display())]
    ConfigMalformed {
        /// Offending file.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// A required section or field is missing.
    #[error("missing required configuration section: {0}")]
    ConfigIncomplete(String),

    /// A parameter lies outside its documented scientific range.
    #[error("{parameter} ({value}) outside scientific range {bound}")]
    ConfigOutOfRange {
        /// Dotted parameter path, e.g. `inverse_solution.lambda2`.
        parameter: &'static str,
        /// Value found in the configuration.
        value: f64,
        /// Human-readable bound, e.g. `[0.001, 1.0]`.
        bound: String,
    },

    /// The recording contains NaN or infinite samples.
    #[error("data contains {count} NaN or infinite values")]
    DataCorrupt {
        /// Number of non-finite samples.
        count: usize,
    },

    /// The recording file does not exist.
    #[error("recording not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The recording file cannot be decoded by the loader.
    #[error("unsupported recording format {}: {reason}", path.display())]
    UnsupportedFormat {
        /// Offending file.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// The recording violates a structural invariant.
    #[error("invalid recording: {0}")]
    InvalidRecording(String),

    /// Preprocessing could not produce epochs.
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),

    /// Atlas aggregation received an estimate it cannot reduce.
    #[error("atlas aggregation failed: {0}")]
    Atlas(String),

    /// Batch input path does not exist.
    #[error("input path does not exist: {}", .0.display())]
    InputNotFound(PathBuf),

    /// Batch input directory holds no recordings.
    #[error("no recording files found in {}", .0.display())]
    NoInputFiles(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Why the forward model could not be built.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForwardFailure {
    /// The configured montage name is not a known standard montage.
    #[error("unknown montage '{0}'")]
    UnknownMontage(String),

    /// Too few channels received a 3-D position from the montage.
    #[error("only {found} channels have electrode locations, need at least {required}")]
    InsufficientElectrodeCoverage {
        /// Channels with a non-zero position.
        found: usize,
        /// Minimum required.
        required: usize,
    },

    /// A template source lies on or outside the head-model boundary.
    #[error("source {index} lies outside the head model (|r| = {distance:.4} m, radius {radius:.4} m)")]
    SourceOutsideHead {
        /// Source index in the source space.
        index: usize,
        /// Distance of the source from the sphere centre.
        distance: f64,
        /// Head-model radius.
        radius: f64,
    },

    /// The anatomical model provider failed.
    #[error("anatomical model unavailable: {0}")]
    Anatomy(String),

    /// The computed leadfield is unusable.
    #[error("degenerate leadfield: {0}")]
    DegenerateLeadfield(String),
}

/// Numerical failures inside the inverse computation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// Not enough samples to estimate a covariance.
    #[error("noise covariance needs at least 2 samples, window holds {0}")]
    InsufficientNoiseSamples(usize),

    /// The noise covariance has no usable eigenvalues.
    #[error("noise covariance is singular (rank 0)")]
    SingularCovariance,

    /// The whitened gain carries no energy.
    #[error("whitened leadfield has zero trace")]
    DegenerateGain,

    /// Forward model and epochs disagree.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A NaN or infinity appeared in an intermediate result.
    #[error("non-finite values in {0}")]
    NonFinite(&'static str),
}

/// Result alias for fallible pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
