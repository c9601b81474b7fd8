//! Batch orchestration.
//!
//! ```text
//! for each input file (sequentially):
//!   memory check → load → validate → preprocess → forward → inverse
//!     → aggregate → <stem>_atlas_timecourses.safetensors + <stem>_metadata.json
//! ```
//!
//! Every file gets its own [`ProcessingLog`], seeded with the entries written
//! while loading the configuration. Any error, or panic, inside one file
//! marks that file `failed` and the batch moves on; the failed file's log is
//! kept in its [`FileOutcome`].
//!
//! In a batch, outputs mirror each input's subdirectory below the common
//! parent of all inputs, so `a/rec.safetensors` and `b/rec.safetensors`
//! land in `<out>/a/` and `<out>/b/`. Names that would still collide get a
//! numeric suffix.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::anatomy::{AnatomyProvider, SphericalTemplate};
use crate::atlas::{self, AtlasOrigin, AtlasTimeSeries};
use crate::config::Configuration;
use crate::error::{PipelineError, Result};
use crate::forward;
use crate::inverse;
use crate::io::{write_atlas, RecordingLoader, SafetensorsLoader};
use crate::memory;
use crate::preprocess::preprocess;
use crate::provenance::ProcessingLog;
use crate::quality::validate_recording;
use crate::recording::Recording;

/// Configuration file used when none is given.
pub const DEFAULT_CONFIG_PATH: &str = "autoclean_config.json";

/// Output directory used when none is given.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Version string written into every metadata file.
pub const SOFTWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runs the full chain on one or many recordings.
pub struct Pipeline {
    config: Configuration,
    config_log: ProcessingLog,
    loader: Box<dyn RecordingLoader>,
    anatomy: Box<dyn AnatomyProvider>,
    output_dir: PathBuf,
}

impl Pipeline {
    /// Validate `config` and build a pipeline writing to `output_dir`.
    ///
    /// `config_log` holds the entries produced while loading the
    /// configuration; it seeds every per-file log.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ConfigOutOfRange`] if a parameter fails validation.
    pub fn new(
        config: Configuration,
        mut config_log: ProcessingLog,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        config.validate(&mut config_log)?;
        Ok(Self {
            config,
            config_log,
            loader: Box::new(SafetensorsLoader),
            anatomy: Box::new(SphericalTemplate::default()),
            output_dir: output_dir.into(),
        })
    }

    /// Load and validate the configuration at `path`.
    pub fn from_config_file(path: impl AsRef<Path>, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut log = ProcessingLog::new();
        let config = Configuration::load(path, &mut log)?;
        Self::new(config, log, output_dir)
    }

    pub fn with_loader(mut self, loader: Box<dyn RecordingLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_anatomy(mut self, anatomy: Box<dyn AnatomyProvider>) -> Self {
        self.anatomy = anatomy;
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn config_log(&self) -> &ProcessingLog {
        &self.config_log
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Inputs under `path` that the configured loader understands.
    pub fn discover(&self, path: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
        discover_inputs(path, recursive, self.loader.extensions())
    }

    /// Validate → preprocess → forward → inverse → aggregate, in memory.
    pub fn process_recording(&self, recording: &Recording, log: &mut ProcessingLog) -> Result<AtlasTimeSeries> {
        validate_recording(recording, log)?;
        let epochs = preprocess(recording, &self.config, log)?;
        let fwd = forward::build(&epochs, &self.config, self.anatomy.as_ref(), log);
        let estimate = inverse::solve(&epochs, fwd, &self.config, log);
        atlas::aggregate(estimate, log)
    }

    /// Process one file end to end, writing its outputs directly under the
    /// output directory. Never panics and never returns an error: failures
    /// are reported in the outcome.
    pub fn process_one(&self, path: &Path) -> FileOutcome {
        let target = OutputTarget { dir: self.output_dir.clone(), stem: output_stem(path) };
        self.process_to(path, &target)
    }

    fn process_to(&self, path: &Path, target: &OutputTarget) -> FileOutcome {
        let mut log = self.config_log.clone();
        log.record("Processing file", json!({ "input_file": path.display().to_string() }));
        tracing::info!(file = %path.display(), "processing");

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_file(path, target, &mut log)));
        let error = match result {
            Ok(Ok((outputs, origin))) => {
                tracing::info!(file = %path.display(), origin = origin.as_str(), "done");
                return FileOutcome {
                    input: path.to_path_buf(),
                    status: FileStatus::Success,
                    origin: Some(origin),
                    outputs: Some(outputs),
                    error: None,
                    log: None,
                };
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("internal error: {}", panic_message(&*payload)),
        };
        log.warn("Processing failed", json!({ "error": error }));
        FileOutcome::failed(path, error, log)
    }

    /// Process `paths` one after another.
    pub fn process_many(&self, paths: &[PathBuf]) -> BatchSummary {
        let mut summary = BatchSummary::new();
        summary.log.record(
            "Starting batch processing",
            json!({
                "n_files": paths.len(),
                "output_dir": self.output_dir.display().to_string(),
            }),
        );
        let targets = output_targets(&self.output_dir, paths);
        for (i, (path, target)) in paths.iter().zip(&targets).enumerate() {
            tracing::info!("file {}/{}: {}", i + 1, paths.len(), path.display());
            summary.push(self.process_to(path, target));
        }
        summary.log.record(
            "Batch processing completed",
            json!({
                "total": summary.total,
                "successful": summary.successful,
                "failed": summary.failed,
            }),
        );
        tracing::info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            "batch complete"
        );
        summary
    }

    fn run_file(
        &self,
        path: &Path,
        target: &OutputTarget,
        log: &mut ProcessingLog,
    ) -> Result<(OutputFiles, AtlasOrigin)> {
        memory::check(self.config.memory_threshold_bytes(), log);

        let recording = self.loader.load(path)?;
        log.record(
            "Loaded recording",
            json!({
                "n_channels": recording.n_channels(),
                "sfreq": recording.sfreq(),
                "n_times": recording.n_times(),
                "n_epochs": recording.n_epochs(),
                "epoched": recording.is_epoched(),
            }),
        );

        let atlas = self.process_recording(&recording, log)?;
        let outputs = self.save(path, target, &atlas, log)?;
        Ok((outputs, atlas.origin))
    }

    fn save(
        &self,
        input: &Path,
        target: &OutputTarget,
        atlas: &AtlasTimeSeries,
        log: &mut ProcessingLog,
    ) -> Result<OutputFiles> {
        std::fs::create_dir_all(&target.dir)?;
        let stem = &target.stem;
        let outputs = OutputFiles {
            atlas_timecourses: target.dir.join(format!("{stem}_atlas_timecourses.safetensors")),
            metadata: target.dir.join(format!("{stem}_metadata.json")),
        };
        write_atlas(&outputs.atlas_timecourses, atlas)
            .map_err(|e| std::io::Error::other(format!("{e:#}")))?;
        log.record(
            "Results saved",
            json!({ "output_dir": target.dir.display().to_string() }),
        );

        let metadata = RunMetadata {
            input_file: input.to_path_buf(),
            processing_timestamp: Utc::now(),
            software_version: SOFTWARE_VERSION.to_string(),
            configuration: self.config.clone(),
            processing_log: log.clone(),
            atlas_info: AtlasInfo {
                region_names: atlas.region_names.clone(),
                units: atlas.units.to_string(),
                atlas_version: atlas.atlas_version.to_string(),
                origin: atlas.origin,
            },
            data_files: DataFiles { atlas_timecourses: outputs.atlas_timecourses.clone() },
        };
        std::fs::write(&outputs.metadata, serde_json::to_string_pretty(&metadata)?)?;
        Ok(outputs)
    }
}

// ── Output naming ───────────────────────────────────────────────────────────

/// Directory and file stem for one input's outputs.
#[derive(Debug, Clone, PartialEq)]
struct OutputTarget {
    dir: PathBuf,
    stem: String,
}

fn output_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".into())
}

/// Deepest directory containing every input.
fn common_parent(paths: &[PathBuf]) -> PathBuf {
    let mut parents = paths.iter().map(|p| p.parent().unwrap_or(Path::new("")));
    let Some(first) = parents.next() else {
        return PathBuf::new();
    };
    let mut common: Vec<Component<'_>> = first.components().collect();
    for parent in parents {
        let shared = common
            .iter()
            .zip(parent.components())
            .take_while(|(a, b)| *a == b)
            .count();
        common.truncate(shared);
    }
    common.iter().collect()
}

/// One target per input: the input's subdirectory below the common parent
/// is mirrored under `output_dir`, and repeated `(dir, stem)` pairs get a
/// `_<n>` suffix in input order.
fn output_targets(output_dir: &Path, paths: &[PathBuf]) -> Vec<OutputTarget> {
    let root = common_parent(paths);
    let mut taken = HashSet::new();
    paths
        .iter()
        .map(|path| {
            let parent = path.parent().unwrap_or(Path::new(""));
            let dir = match parent.strip_prefix(&root) {
                Ok(rel) if rel.components().all(|c| matches!(c, Component::Normal(_))) => output_dir.join(rel),
                _ => output_dir.to_path_buf(),
            };
            let base = output_stem(path);
            let mut stem = base.clone();
            let mut n = 1;
            while !taken.insert((dir.clone(), stem.clone())) {
                n += 1;
                stem = format!("{base}_{n}");
            }
            OutputTarget { dir, stem }
        })
        .collect()
}

// ── Outcomes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Success,
    Failed,
}

/// Paths written for one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFiles {
    pub atlas_timecourses: PathBuf,
    pub metadata: PathBuf,
}

/// Result of [`Pipeline::process_one`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<AtlasOrigin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<OutputFiles>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Processing log of a failed file. Successful files persist theirs in
    /// the metadata file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<ProcessingLog>,
}

impl FileOutcome {
    fn failed(path: &Path, error: String, log: ProcessingLog) -> Self {
        tracing::error!(file = %path.display(), %error, "file failed");
        Self {
            input: path.to_path_buf(),
            status: FileStatus::Failed,
            origin: None,
            outputs: None,
            error: Some(error),
            log: Some(log),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FileStatus::Success
    }
}

/// Per-batch counts and outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub parameters: Value,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<FileOutcome>,
    /// Batch-level entries: start and completion.
    #[serde(default)]
    pub log: ProcessingLog,
}

impl Default for BatchSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchSummary {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            parameters: Value::Null,
            total: 0,
            successful: 0,
            failed: 0,
            results: Vec::new(),
            log: ProcessingLog::new(),
        }
    }

    /// Attach the invocation parameters written by [`write`](Self::write).
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn push(&mut self, outcome: FileOutcome) {
        self.total += 1;
        if outcome.is_success() {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(outcome);
    }

    /// `(file, error)` of every failure.
    pub fn failures(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.results
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| (o.input.as_path(), o.error.as_deref().unwrap_or("")))
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Write the summary as pretty JSON.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

// ── Metadata file ───────────────────────────────────────────────────────────

/// Contents of `<stem>_metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub input_file: PathBuf,
    pub processing_timestamp: DateTime<Utc>,
    pub software_version: String,
    pub configuration: Configuration,
    pub processing_log: ProcessingLog,
    pub atlas_info: AtlasInfo,
    pub data_files: DataFiles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtlasInfo {
    pub region_names: Vec<String>,
    pub units: String,
    pub atlas_version: String,
    pub origin: AtlasOrigin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFiles {
    pub atlas_timecourses: PathBuf,
}

impl RunMetadata {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

// ── Discovery ───────────────────────────────────────────────────────────────

/// The file at `path`, or every file under the directory `path` whose
/// extension is in `extensions` (case-insensitive), sorted. Subdirectories
/// are searched only when `recursive`.
///
/// # Errors
///
/// [`PipelineError::InputNotFound`] if `path` does not exist,
/// [`PipelineError::NoInputFiles`] if a directory holds no matching file.
pub fn discover_inputs(path: &Path, recursive: bool, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(PipelineError::InputNotFound(path.to_path_buf()));
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| extensions.iter().any(|want| want.eq_ignore_ascii_case(x)))
        })
        .map(|e| e.into_path())
        .collect();
    if files.is_empty() {
        return Err(PipelineError::NoInputFiles(path.to_path_buf()));
    }
    files.sort();
    Ok(files)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
