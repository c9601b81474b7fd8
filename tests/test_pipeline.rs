mod common;
use common::{continuous, eeg_channels, epoched, full_config_json, write_config, CHANNELS_1020};
use eeg2source::{
    read_atlas, write_recording, AtlasOrigin, BatchSummary, Configuration, FileStatus,
    PipelineError, Pipeline, ProcessingLog, Recording, RunMetadata,
};
use ndarray::Array2;
use std::path::{Path, PathBuf};

fn pipeline(out: &Path) -> Pipeline {
    Pipeline::new(Configuration::default(), ProcessingLog::new(), out).unwrap()
}

fn write(dir: &Path, name: &str, rec: &Recording) -> PathBuf {
    let path = dir.join(name);
    write_recording(&path, rec).unwrap();
    path
}

#[test]
fn single_file_produces_atlas_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let input = write(dir.path(), "sub-01.safetensors", &continuous(&CHANNELS_1020, 250.0, 20.0));

    let outcome = pipeline(&out).process_one(&input);
    assert_eq!(outcome.status, FileStatus::Success, "error: {:?}", outcome.error);
    assert_eq!(outcome.origin, Some(AtlasOrigin::Genuine));

    let files = outcome.outputs.unwrap();
    assert_eq!(files.atlas_timecourses, out.join("sub-01_atlas_timecourses.safetensors"));
    assert_eq!(files.metadata, out.join("sub-01_metadata.json"));

    let (data, meta) = read_atlas(&files.atlas_timecourses).unwrap();
    // 5000 samples → 19 windows of 500.
    assert_eq!(data.dim(), (68, 500, 19));
    assert_eq!(meta["origin"], "genuine");
    assert_eq!(meta["n_regions"], "68");

    let run = RunMetadata::load(&files.metadata).unwrap();
    assert_eq!(run.input_file, input);
    assert_eq!(run.atlas_info.region_names.len(), 68);
    assert_eq!(run.atlas_info.region_names[0], "bankssts-lh");
    assert_eq!(run.atlas_info.origin, AtlasOrigin::Genuine);
    assert_eq!(run.configuration, Configuration::default());
    assert_eq!(run.data_files.atlas_timecourses, files.atlas_timecourses);
    assert!(run.processing_log.contains("Processing file"));
    assert!(run.processing_log.contains("Loaded recording"));
    assert!(run.processing_log.contains("Extracted atlas time courses"));
    assert!(run.processing_log.contains("Results saved"));
}

#[test]
fn batch_continues_past_corrupt_and_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let good = write(dir.path(), "a_good.safetensors", &continuous(&CHANNELS_1020, 250.0, 10.0));

    let mut bad = Array2::from_elem((CHANNELS_1020.len(), 2500), 1e-6);
    bad[[2, 100]] = f64::NAN;
    let bad_rec = Recording::continuous(eeg_channels(&CHANNELS_1020), 250.0, bad).unwrap();
    let corrupt = write(dir.path(), "b_corrupt.safetensors", &bad_rec);

    let missing = dir.path().join("c_missing.safetensors");
    let sparse = write(
        dir.path(),
        "d_sparse.safetensors",
        &continuous(&["Fp1", "Fp2", "Cz", "O1", "O2"], 250.0, 10.0),
    );

    let inputs = vec![good, corrupt.clone(), missing.clone(), sparse];
    let summary = pipeline(&dir.path().join("out")).process_many(&inputs);

    assert_eq!(summary.total, 4);
    assert_eq!(summary.successful + summary.failed, summary.total);
    assert_eq!(summary.successful, 2);
    assert!(!summary.all_succeeded());

    let failed: Vec<&Path> = summary.failures().map(|(p, _)| p).collect();
    assert_eq!(failed, vec![corrupt.as_path(), missing.as_path()]);
    assert!(summary.results[1].error.as_deref().unwrap().contains("NaN or infinite"));

    // Too few located electrodes still succeeds, on simulated activity.
    assert_eq!(summary.results[3].status, FileStatus::Success);
    assert_eq!(summary.results[3].origin, Some(AtlasOrigin::Simulated));
}

#[test]
fn same_stem_in_different_folders_keeps_separate_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    for sub in ["sub1", "sub2"] {
        std::fs::create_dir_all(data.join(sub)).unwrap();
    }
    let first = write(&data.join("sub1"), "rec.safetensors", &continuous(&CHANNELS_1020, 250.0, 8.0));
    let second = write(&data.join("sub2"), "rec.safetensors", &epoched(&CHANNELS_1020, 250.0, 3, 301, -0.2));

    let out = dir.path().join("out");
    let p = pipeline(&out);
    let inputs = p.discover(&data, true).unwrap();
    assert_eq!(inputs, vec![first.clone(), second.clone()]);
    let summary = p.process_many(&inputs);
    assert_eq!(summary.successful, 2);

    let a = summary.results[0].outputs.clone().unwrap();
    let b = summary.results[1].outputs.clone().unwrap();
    assert_eq!(a.atlas_timecourses, out.join("sub1").join("rec_atlas_timecourses.safetensors"));
    assert_eq!(b.atlas_timecourses, out.join("sub2").join("rec_atlas_timecourses.safetensors"));
    assert_ne!(a.metadata, b.metadata);

    assert_eq!(RunMetadata::load(&a.metadata).unwrap().input_file, first);
    assert_eq!(RunMetadata::load(&b.metadata).unwrap().input_file, second);
    assert_eq!(read_atlas(&a.atlas_timecourses).unwrap().0.dim(), (68, 500, 7));
    assert_eq!(read_atlas(&b.atlas_timecourses).unwrap().0.dim(), (68, 301, 3));
}

#[test]
fn failed_file_keeps_its_log() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = Array2::from_elem((CHANNELS_1020.len(), 2500), 1e-6);
    data[[0, 10]] = f64::INFINITY;
    let rec = Recording::continuous(eeg_channels(&CHANNELS_1020), 250.0, data).unwrap();
    let input = write(dir.path(), "broken.safetensors", &rec);

    let summary = pipeline(&dir.path().join("out")).process_many(&[input]);
    assert_eq!(summary.failed, 1);
    let log = summary.results[0].log.as_ref().unwrap();
    assert!(log.contains("Processing file"));
    let entry = log.find("Processing failed").unwrap();
    assert!(entry.details["error"].as_str().unwrap().contains("NaN or infinite"));
    assert!(log.warnings().any(|w| w.action == "Processing failed"));

    assert!(summary.log.contains("Starting batch processing"));
    let done = summary.log.find("Batch processing completed").unwrap();
    assert_eq!(done.details["failed"], 1);

    // The failure log survives in the written summary.
    let path = dir.path().join("batch.json");
    summary.write(&path).unwrap();
    let back: BatchSummary = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(back.results[0].log.as_ref().unwrap().contains("Processing failed"));
    assert!(back.log.contains("Batch processing completed"));
}

#[test]
fn epoched_input_keeps_its_epochs() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "erp.safetensors", &epoched(&CHANNELS_1020, 250.0, 5, 301, -0.2));
    let outcome = pipeline(&dir.path().join("out")).process_one(&input);
    assert!(outcome.is_success(), "error: {:?}", outcome.error);

    let (data, meta) = read_atlas(&outcome.outputs.unwrap().atlas_timecourses).unwrap();
    assert_eq!(data.dim(), (68, 301, 5));
    assert_eq!(meta["sfreq"], "250");
}

#[test]
fn summary_file_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "one.safetensors", &continuous(&CHANNELS_1020, 250.0, 8.0));
    let summary = pipeline(&dir.path().join("out"))
        .process_many(&[input])
        .with_parameters(serde_json::json!({ "recursive": false }));

    let path = dir.path().join("reports").join("batch.json");
    summary.write(&path).unwrap();
    let back: BatchSummary = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(back.total, 1);
    assert_eq!(back.successful, 1);
    assert_eq!(back.parameters["recursive"], false);
    assert_eq!(back.results[0].status, FileStatus::Success);
    assert!(back.results[0].log.is_none());
}

#[test]
fn discovery_honours_recursion_and_extension() {
    let dir = tempfile::tempdir().unwrap();
    let rec = continuous(&CHANNELS_1020, 250.0, 4.0);
    write(dir.path(), "top.safetensors", &rec);
    write(dir.path(), "UPPER.SAFETENSORS", &rec);
    std::fs::write(dir.path().join("notes.txt"), "not a recording").unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    write(&dir.path().join("nested"), "deep.safetensors", &rec);

    let p = pipeline(&dir.path().join("out"));
    assert_eq!(p.discover(dir.path(), false).unwrap().len(), 2);
    let all = p.discover(dir.path(), true).unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().any(|f| f.ends_with("nested/deep.safetensors")));

    let empty = tempfile::tempdir().unwrap();
    assert!(matches!(p.discover(empty.path(), true), Err(PipelineError::NoInputFiles(_))));
    assert!(matches!(
        p.discover(&dir.path().join("absent"), false),
        Err(PipelineError::InputNotFound(_))
    ));
}

#[test]
fn pipeline_from_config_file_seeds_every_file_log() {
    let dir = tempfile::tempdir().unwrap();
    let cfg_path = write_config(dir.path(), &full_config_json());
    let p = Pipeline::from_config_file(&cfg_path, dir.path().join("out")).unwrap();
    assert!(p.config_log().contains("Configuration loaded successfully"));
    assert!(p.config_log().contains("Scientific parameters validated successfully"));

    let input = write(dir.path(), "x.safetensors", &continuous(&CHANNELS_1020, 250.0, 8.0));
    let outcome = p.process_one(&input);
    let run = RunMetadata::load(&outcome.outputs.unwrap().metadata).unwrap();
    assert_eq!(run.configuration.metadata.version, "1.0.0");
    assert!(run.processing_log.entries()[0].action.starts_with("Configuration loaded"));
}

#[test]
fn invalid_configuration_stops_before_any_file() {
    let mut cfg = Configuration::default();
    cfg.scientific_parameters.preprocessing.target_srate = 10_000.0;
    let err = Pipeline::new(cfg, ProcessingLog::new(), "out").err().unwrap();
    assert!(matches!(err, PipelineError::ConfigOutOfRange { .. }));
}
