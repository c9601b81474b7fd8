//! Safetensors I/O: recordings in, atlas time courses out.
//!
//! Recording layout read by [`SafetensorsLoader`]:
//!
//! ```text
//! data       F32|F64  [C, T] continuous   or   [E, C, T] epoched
//! sfreq      F32|F64  [1]
//! ch_names   U8       newline-separated        (optional → EEG001, EEG002, …)
//! ch_types   U8       newline-separated eeg|eog|misc   (optional → eeg)
//! tmin       F32|F64  [1]   epoched only       (optional → 0)
//! baseline   F32|F64  [2]   epoched only       (optional)
//! ```
use anyhow::{bail, ensure, Context};
use ndarray::{Array2, Array3};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::atlas::AtlasTimeSeries;
use crate::error::{PipelineError, Result};
use crate::recording::{ChannelInfo, ChannelKind, Recording, Samples};

/// Tensor name of the region time courses in an output file.
pub const ATLAS_TENSOR: &str = "atlas_timecourses";

/// Source of [`Recording`]s.
pub trait RecordingLoader {
    /// Load one recording.
    ///
    /// # Errors
    ///
    /// [`PipelineError::FileNotFound`] if `path` does not exist,
    /// [`PipelineError::UnsupportedFormat`] if it cannot be decoded.
    fn load(&self, path: &Path) -> Result<Recording>;

    /// File extensions (without dot) this loader understands.
    fn extensions(&self) -> &[&str];
}

/// Built-in loader for the layout documented at module level.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetensorsLoader;

impl RecordingLoader for SafetensorsLoader {
    fn load(&self, path: &Path) -> Result<Recording> {
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.to_path_buf()));
        }
        let unsupported = |e: anyhow::Error| PipelineError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        };
        let file = TensorFile::open(path).map_err(unsupported)?;
        let raw = RawRecording::from_file(&file).map_err(unsupported)?;
        raw.into_recording()
    }

    fn extensions(&self) -> &[&str] {
        &["safetensors"]
    }
}

/// Decoded tensors before structural validation.
struct RawRecording {
    data: Vec<f64>,
    shape: Vec<usize>,
    sfreq: f64,
    names: Option<Vec<String>>,
    kinds: Option<Vec<ChannelKind>>,
    tmin: f64,
    baseline: Option<(f64, f64)>,
}

impl RawRecording {
    fn from_file(file: &TensorFile) -> anyhow::Result<Self> {
        let (data, shape) = file.f64_tensor("data")?;
        ensure!(
            shape.len() == 2 || shape.len() == 3,
            "'data' must be [C, T] or [E, C, T], got shape {shape:?}"
        );
        let sfreq = file.scalar("sfreq")?;
        let names = file.has("ch_names").then(|| file.lines("ch_names")).transpose()?;
        let kinds = file
            .has("ch_types")
            .then(|| file.lines("ch_types"))
            .transpose()?
            .map(|v| v.iter().map(|s| ChannelKind::from_label(s)).collect());
        let tmin = if file.has("tmin") { file.scalar("tmin")? } else { 0.0 };
        let baseline = if file.has("baseline") {
            let (b, _) = file.f64_tensor("baseline")?;
            ensure!(b.len() == 2, "'baseline' must hold 2 values, got {}", b.len());
            Some((b[0], b[1]))
        } else {
            None
        };
        Ok(Self { data, shape, sfreq, names, kinds, tmin, baseline })
    }

    fn into_recording(self) -> Result<Recording> {
        let n_ch = self.shape[self.shape.len() - 2];
        let names = self
            .names
            .unwrap_or_else(|| (1..=n_ch).map(|i| format!("EEG{i:03}")).collect());
        let kinds = self.kinds.unwrap_or_else(|| vec![ChannelKind::Eeg; names.len()]);
        if kinds.len() != names.len() {
            return Err(PipelineError::InvalidRecording(format!(
                "{} channel types for {} channel names",
                kinds.len(),
                names.len()
            )));
        }
        let channels: Vec<ChannelInfo> = names
            .into_iter()
            .zip(kinds)
            .map(|(name, kind)| ChannelInfo { name, kind })
            .collect();

        let bad_shape = |e: ndarray::ShapeError| PipelineError::InvalidRecording(e.to_string());
        match self.shape.as_slice() {
            &[c, t] => {
                let data = Array2::from_shape_vec((c, t), self.data).map_err(bad_shape)?;
                Recording::continuous(channels, self.sfreq, data)
            }
            &[e, c, t] => {
                let data = Array3::from_shape_vec((e, c, t), self.data).map_err(bad_shape)?;
                Recording::epoched(channels, self.sfreq, data, self.tmin, self.baseline)
            }
            other => Err(PipelineError::InvalidRecording(format!("unsupported shape {other:?}"))),
        }
    }
}

// ── Low-level safetensors parser ────────────────────────────────────────────

/// A safetensors file held in memory.
pub struct TensorFile {
    header: Map<String, Value>,
    bytes: Vec<u8>,
    data_start: usize,
}

impl TensorFile {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> anyhow::Result<Self> {
        ensure!(bytes.len() >= 8, "safetensors file too small");
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[..8]);
        let n = u64::from_le_bytes(len);
        let data_start = usize::try_from(n)
            .ok()
            .and_then(|n| n.checked_add(8))
            .filter(|&end| end <= bytes.len());
        let Some(data_start) = data_start else {
            bail!("safetensors header length {n} exceeds file size");
        };
        let header: Map<String, Value> =
            serde_json::from_slice(&bytes[8..data_start]).context("failed to parse safetensors header")?;
        Ok(Self { header, bytes, data_start })
    }

    pub fn has(&self, name: &str) -> bool {
        self.header.contains_key(name)
    }

    /// String metadata stored under `__metadata__`.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        self.header
            .get("__metadata__")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn entry(&self, name: &str) -> anyhow::Result<(&str, Vec<usize>, &[u8])> {
        let entry = self.header.get(name).with_context(|| format!("missing '{name}' key"))?;
        let dtype = entry["dtype"].as_str().with_context(|| format!("'{name}' has no dtype"))?;
        let shape = entry["shape"]
            .as_array()
            .with_context(|| format!("'{name}' has no shape"))?
            .iter()
            .map(|v| v.as_u64().map(|d| d as usize))
            .collect::<Option<Vec<_>>>()
            .with_context(|| format!("'{name}' has a malformed shape"))?;
        let offsets = entry["data_offsets"]
            .as_array()
            .filter(|o| o.len() == 2)
            .with_context(|| format!("'{name}' has no data_offsets"))?;
        let (s, e) = match (offsets[0].as_u64(), offsets[1].as_u64()) {
            (Some(s), Some(e)) => (s, e),
            _ => bail!("'{name}' has malformed data_offsets"),
        };
        let range = usize::try_from(s)
            .ok()
            .zip(usize::try_from(e).ok())
            .filter(|(s, e)| s <= e)
            .and_then(|(s, e)| Some((self.data_start.checked_add(s)?, self.data_start.checked_add(e)?)))
            .filter(|&(_, end)| end <= self.bytes.len());
        let Some((start, end)) = range else {
            bail!("'{name}' data_offsets [{s}, {e}] out of bounds");
        };
        Ok((dtype, shape, &self.bytes[start..end]))
    }

    /// Numeric tensor widened to `f64`, with its shape.
    pub fn f64_tensor(&self, name: &str) -> anyhow::Result<(Vec<f64>, Vec<usize>)> {
        let (dtype, shape, raw) = self.entry(name)?;
        let values: Vec<f64> = match dtype {
            "F64" => raw
                .chunks_exact(8)
                .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
            "F32" => raw
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
            other => bail!("'{name}' has unsupported dtype {other}"),
        };
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .with_context(|| format!("'{name}' shape {shape:?} overflows"))?;
        ensure!(
            values.len() == expected,
            "'{name}' holds {} values, shape {shape:?} needs {expected}",
            values.len()
        );
        Ok((values, shape))
    }

    /// First value of a numeric tensor.
    pub fn scalar(&self, name: &str) -> anyhow::Result<f64> {
        let (v, _) = self.f64_tensor(name)?;
        v.first().copied().with_context(|| format!("'{name}' is empty"))
    }

    /// Non-empty lines of a U8 text tensor.
    pub fn lines(&self, name: &str) -> anyhow::Result<Vec<String>> {
        let (dtype, _, raw) = self.entry(name)?;
        ensure!(dtype == "U8", "'{name}' must be U8 text, got {dtype}");
        let text = std::str::from_utf8(raw).with_context(|| format!("'{name}' is not UTF-8"))?;
        Ok(text.split('\n').filter(|s| !s.is_empty()).map(String::from).collect())
    }
}

// ── Generic safetensors builder ─────────────────────────────────────────────

/// Safetensors writer for F64 and U8 tensors plus string metadata.
///
/// ```rust,no_run
/// use eeg2source::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("signal", &[1.0, 2.0, 3.0], &[1, 3]);
/// w.add_text("labels", "a\nb\nc");
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
    metadata: Map<String, Value>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F32", shape.to_vec()));
    }

    pub fn add_text(&mut self, name: &str, text: &str) {
        let bytes = text.as_bytes().to_vec();
        let len = bytes.len();
        self.entries.push((name.to_string(), bytes, "U8", vec![len]));
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.insert(key.to_string(), Value::String(value.into()));
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        use std::io::Write;
        let mut header_map = Map::new();
        if !self.metadata.is_empty() {
            header_map.insert("__metadata__".into(), Value::Object(self.metadata.clone()));
        }
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(name.clone(), json!({
                "dtype": dtype,
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let padded: Vec<u8> = hdr_bytes.into_iter()
            .chain(std::iter::repeat(b' ').take(pad))
            .collect();
        let mut f = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        f.write_all(&(padded.len() as u64).to_le_bytes())?;
        f.write_all(&padded)?;
        for (_, data, _, _) in &self.entries {
            f.write_all(data)?;
        }
        Ok(())
    }
}

/// Write `recording` in the layout [`SafetensorsLoader`] reads.
pub fn write_recording(path: &Path, recording: &Recording) -> anyhow::Result<()> {
    let mut w = StWriter::new();
    match recording.samples() {
        Samples::Continuous(d) => {
            let v: Vec<f64> = d.iter().copied().collect();
            w.add_f64("data", &v, &[d.nrows(), d.ncols()]);
        }
        Samples::Epoched { data, tmin, baseline } => {
            let (e, c, t) = data.dim();
            let v: Vec<f64> = data.iter().copied().collect();
            w.add_f64("data", &v, &[e, c, t]);
            w.add_f64("tmin", &[*tmin], &[1]);
            if let Some((b0, b1)) = baseline {
                w.add_f64("baseline", &[*b0, *b1], &[2]);
            }
        }
    }
    w.add_f64("sfreq", &[recording.sfreq()], &[1]);
    w.add_text("ch_names", &recording.ch_names().join("\n"));
    let kinds: Vec<&str> = recording
        .channels()
        .iter()
        .map(|c| match c.kind {
            ChannelKind::Eeg => "eeg",
            ChannelKind::Eog => "eog",
            ChannelKind::Misc => "misc",
        })
        .collect();
    w.add_text("ch_types", &kinds.join("\n"));
    w.write(path)
}

/// Write region time courses as F64 `[68, T, E]` under [`ATLAS_TENSOR`].
pub fn write_atlas(path: &Path, atlas: &AtlasTimeSeries) -> anyhow::Result<()> {
    let mut w = StWriter::new();
    let (r, t, e) = atlas.data.dim();
    let v: Vec<f64> = atlas.data.iter().copied().collect();
    w.add_f64(ATLAS_TENSOR, &v, &[r, t, e]);
    w.set_metadata("n_regions", r.to_string());
    w.set_metadata("origin", atlas.origin.as_str());
    w.set_metadata("atlas_version", atlas.atlas_version);
    w.set_metadata("units", atlas.units);
    w.set_metadata("sfreq", atlas.sfreq.to_string());
    w.write(path)
}

/// Read back a file written by [`write_atlas`].
pub fn read_atlas(path: &Path) -> anyhow::Result<(Array3<f64>, BTreeMap<String, String>)> {
    let file = TensorFile::open(path)?;
    let (values, shape) = file.f64_tensor(ATLAS_TENSOR)?;
    ensure!(shape.len() == 3, "'{ATLAS_TENSOR}' must be 3-D, got {shape:?}");
    let data = Array3::from_shape_vec((shape[0], shape[1], shape[2]), values)?;
    Ok((data, file.metadata()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuous_round_trip_with_default_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.safetensors");
        let mut w = StWriter::new();
        w.add_f32("data", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        w.add_f32("sfreq", &[500.0], &[1]);
        w.write(&path).unwrap();

        let rec = SafetensorsLoader.load(&path).unwrap();
        assert_eq!(rec.ch_names(), vec!["EEG001", "EEG002"]);
        assert_eq!(rec.sfreq(), 500.0);
        assert!(!rec.is_epoched());
        assert_eq!(rec.n_times(), 3);
    }

    #[test]
    fn epoched_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epo.safetensors");
        let chans = vec![ChannelInfo::eeg("Fz"), ChannelInfo { name: "HEOG".into(), kind: ChannelKind::Eog }];
        let data = Array3::from_shape_fn((3, 2, 10), |(e, c, t)| (e * 100 + c * 10 + t) as f64);
        let rec = Recording::epoched(chans, 250.0, data.clone(), -0.1, Some((-0.1, 0.0))).unwrap();
        write_recording(&path, &rec).unwrap();

        let back = SafetensorsLoader.load(&path).unwrap();
        assert_eq!(back.channels(), rec.channels());
        match back.samples() {
            Samples::Epoched { data: d, tmin, baseline } => {
                assert_eq!(d, &data);
                assert_eq!(*tmin, -0.1);
                assert_eq!(*baseline, Some((-0.1, 0.0)));
            }
            Samples::Continuous(_) => panic!("expected epoched"),
        }
    }

    #[test]
    fn missing_and_garbage_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.safetensors");
        assert!(matches!(SafetensorsLoader.load(&missing), Err(PipelineError::FileNotFound(_))));

        let garbage = dir.path().join("bad.safetensors");
        std::fs::write(&garbage, b"not a tensor file at all").unwrap();
        assert!(matches!(
            SafetensorsLoader.load(&garbage),
            Err(PipelineError::UnsupportedFormat { .. })
        ));
    }

    fn with_header(header_len: u64, body: &[u8]) -> Vec<u8> {
        let mut bytes = header_len.to_le_bytes().to_vec();
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn oversized_header_length_is_rejected() {
        for n in [u64::MAX, u64::MAX - 7, 1 << 40] {
            let err = TensorFile::from_bytes(with_header(n, b"{}")).err().unwrap();
            assert!(err.to_string().contains("exceeds file size"), "{err}");
        }
    }

    #[test]
    fn out_of_range_offsets_are_rejected() {
        let header = format!(
            r#"{{"data":{{"dtype":"F64","shape":[1],"data_offsets":[{},{}]}}}}"#,
            u64::MAX - 4,
            u64::MAX
        );
        let mut body = header.into_bytes();
        let n = body.len() as u64;
        body.extend_from_slice(&[0u8; 8]);
        let file = TensorFile::from_bytes(with_header(n, &body)).unwrap();
        let err = file.f64_tensor("data").err().unwrap();
        assert!(err.to_string().contains("out of bounds"), "{err}");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crafted.safetensors");
        std::fs::write(&path, with_header(u64::MAX, b"{}")).unwrap();
        assert!(matches!(
            SafetensorsLoader.load(&path),
            Err(PipelineError::UnsupportedFormat { .. })
        ));
    }
}
