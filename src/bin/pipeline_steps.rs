/// pipeline_steps: read one recording, run each stage separately, and write
/// every intermediate array to a safetensors file for inspection.
///
/// Output keys:
///   epochs        [E, C, T]     f64  after preprocessing
///   leadfield     [C', 3·S]     f64  forward model (absent on fallback)
///   sources       [S, T, E]     f64  source magnitudes (or simulated rows)
///   atlas         [68, T, E]    f64  region time courses
///   region_names  U8            newline-separated
///   log           U8            processing log as JSON
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use eeg2source::{
    aggregate, build_forward, config::Configuration, preprocess, provenance::ProcessingLog,
    solve, validate_recording, io::StWriter, RecordingLoader, SafetensorsLoader, SphericalTemplate,
};

#[derive(Parser, Debug)]
#[command(name = "pipeline_steps")]
struct Args {
    /// Input recording (.safetensors).
    #[arg(long)]
    input: PathBuf,

    /// Output safetensors path.
    #[arg(long)]
    output: PathBuf,

    /// Configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut log = ProcessingLog::new();
    let config = match &args.config {
        Some(path) => Configuration::load(path, &mut log)?,
        None => Configuration::default(),
    };
    config.validate(&mut log)?;

    // ── 1. Load ────────────────────────────────────────────────────────────
    let t_load = now();
    let recording = SafetensorsLoader.load(&args.input)?;
    let ms_load = t_load.elapsed().as_secs_f64() * 1000.0;
    validate_recording(&recording, &mut log)?;

    // ── 2. Preprocess ──────────────────────────────────────────────────────
    let t_pre = now();
    let epochs = preprocess(&recording, &config, &mut log)?;
    let ms_pre = t_pre.elapsed().as_secs_f64() * 1000.0;

    // ── 3. Forward ─────────────────────────────────────────────────────────
    let t_fwd = now();
    let fwd = build_forward(&epochs, &config, &SphericalTemplate::default(), &mut log);
    let ms_fwd = t_fwd.elapsed().as_secs_f64() * 1000.0;
    let leadfield = fwd.as_ref().ok().map(|f| f.leadfield.clone());

    // ── 4. Inverse ─────────────────────────────────────────────────────────
    let t_inv = now();
    let estimate = solve(&epochs, fwd, &config, &mut log);
    let ms_inv = t_inv.elapsed().as_secs_f64() * 1000.0;
    let sources = estimate.data.clone();

    // ── 5. Atlas ───────────────────────────────────────────────────────────
    let t_atl = now();
    let atlas = aggregate(estimate, &mut log)?;
    let ms_atl = t_atl.elapsed().as_secs_f64() * 1000.0;

    eprintln!(
        "TIMING load={ms_load:.4}ms preprocess={ms_pre:.4}ms forward={ms_fwd:.4}ms \
         inverse={ms_inv:.4}ms atlas={ms_atl:.4}ms",
    );
    eprintln!(
        "  {} ch  sfreq={} Hz  {} epochs  origin={}",
        epochs.n_channels(),
        epochs.sfreq,
        epochs.n_epochs(),
        atlas.origin.as_str()
    );

    // ── 6. Write output ────────────────────────────────────────────────────
    eprintln!("Writing → {}", args.output.display());
    let mut w = StWriter::new();
    let (e, c, t) = epochs.data.dim();
    w.add_f64("epochs", &epochs.data.iter().copied().collect::<Vec<_>>(), &[e, c, t]);
    if let Some(g) = &leadfield {
        w.add_f64("leadfield", &g.iter().copied().collect::<Vec<_>>(), &[g.nrows(), g.ncols()]);
    }
    let (s, st, se) = sources.dim();
    w.add_f64("sources", &sources.iter().copied().collect::<Vec<_>>(), &[s, st, se]);
    let (r, at, ae) = atlas.data.dim();
    w.add_f64("atlas", &atlas.data.iter().copied().collect::<Vec<_>>(), &[r, at, ae]);
    w.add_text("region_names", &atlas.region_names.join("\n"));
    w.add_text("log", &serde_json::to_string(&log).context("serializing log")?);
    w.set_metadata("origin", atlas.origin.as_str());
    w.write(&args.output)?;

    eprintln!("Done.");
    Ok(())
}

/// Return `std::time::Instant::now()` (used for internal timing).
#[inline(always)]
fn now() -> std::time::Instant { std::time::Instant::now() }
