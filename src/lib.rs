//! # eeg2source — EEG source localization onto the Desikan-Killiany atlas
//!
//! `eeg2source` turns multichannel scalp EEG into 68 brain-region time
//! courses. The DSP front end (FIR filters, FFT resampler) follows
//! [MNE-Python](https://mne.tools); the forward model is an analytic
//! spherical head and the inverse is an MNE-style minimum-norm estimate.
//!
//! ## Pipeline overview
//!
//! ```text
//! recording.safetensors
//!   │
//!   ├─ io::SafetensorsLoader      [C, T] or [E, C, T] + channel infos
//!   ├─ quality::validate_recording  NaN/Inf → DataCorrupt, soft warnings
//!   ├─ preprocess::preprocess     FIR HP/LP → resample → 2 s windows → avg ref
//!   ├─ forward::build             montage + coverage gate + sphere leadfield
//!   ├─ inverse::solve             noise cov → MNE kernel (loose 0.2, depth 0.8)
//!   │                             └─ simulation fallback (seed 42) on any failure
//!   └─ atlas::aggregate           mean per region → [68, T, E]
//!        │
//!        └─→ <stem>_atlas_timecourses.safetensors + <stem>_metadata.json
//! ```
//!
//! Every stage appends to an explicit [`ProcessingLog`], which is persisted
//! next to the results.
//!
//! ## Quick start
//!
//! ```no_run
//! use eeg2source::Pipeline;
//! use std::path::Path;
//!
//! let pipeline = Pipeline::from_config_file("autoclean_config.json", "output").unwrap();
//! let inputs = pipeline.discover(Path::new("data/"), true).unwrap();
//! let summary = pipeline.process_many(&inputs);
//! println!("{}/{} files succeeded", summary.successful, summary.total);
//! ```
//!
//! ## Running individual stages
//!
//! ```no_run
//! use eeg2source::{
//!     aggregate, build_forward, preprocess, solve, validate_recording,
//!     ChannelInfo, Configuration, ProcessingLog, Recording, SphericalTemplate,
//! };
//! use ndarray::Array2;
//!
//! let names = ["Fp1", "Fp2", "F3", "F4", "C3", "C4", "P3", "P4", "O1", "O2"];
//! let channels = names.iter().map(|n| ChannelInfo::eeg(*n)).collect();
//! let recording = Recording::continuous(channels, 250.0, Array2::zeros((10, 2500))).unwrap();
//!
//! let config = Configuration::default();
//! let mut log = ProcessingLog::new();
//! validate_recording(&recording, &mut log).unwrap();
//! let epochs = preprocess(&recording, &config, &mut log).unwrap();
//! let fwd = build_forward(&epochs, &config, &SphericalTemplate::default(), &mut log);
//! let estimate = solve(&epochs, fwd, &config, &mut log);
//! let atlas = aggregate(estimate, &mut log).unwrap();
//! assert_eq!(atlas.n_regions(), 68);
//! ```

pub mod anatomy;
pub mod atlas;
pub mod baseline;
pub mod config;
pub mod epoch;
pub mod error;
pub mod filter;
pub mod forward;
pub mod inverse;
pub mod io;
pub mod memory;
pub mod montage;
pub mod pipeline;
pub mod preprocess;
pub mod provenance;
pub mod quality;
pub mod recording;
pub mod reference;
pub mod resample;

// ── Crate-root re-exports ─────────────────────────────────────────────────
//
// Everything a downstream user is likely to need is available directly as
// `eeg2source::Foo` without having to know the internal module layout.

// anatomy
pub use anatomy::{AnatomyProvider, HeadModel, SourceSpace, SphericalTemplate, TemplateAnatomy};

// atlas
pub use atlas::{aggregate, region_names, AtlasOrigin, AtlasTimeSeries, N_REGIONS};

// config
pub use config::{Configuration, RegularizationPolicy};

// errors
pub use error::{ForwardFailure, PipelineError, SolverError};

// forward
pub use forward::{build as build_forward, ForwardModel};

// inverse
pub use inverse::{solve, EstimateOrigin, SourceEstimate};

// io — recording loader + safetensors helpers
pub use io::{read_atlas, write_atlas, write_recording, RecordingLoader, SafetensorsLoader, StWriter};

// montage
pub use montage::Montage;

// orchestration
pub use pipeline::{
    discover_inputs, BatchSummary, FileOutcome, FileStatus, OutputFiles, Pipeline, RunMetadata,
};

// preprocessing
pub use preprocess::{preprocess, PreprocessedEpochs};

// provenance
pub use provenance::{LogEntry, ProcessingLog};

// recording + validation
pub use quality::{validate_recording, QualityWarning, ValidationReport};
pub use recording::{ChannelInfo, ChannelKind, Recording, Samples};
