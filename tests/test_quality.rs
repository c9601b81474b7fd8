mod common;
use common::{continuous, eeg_channels, epoched, CHANNELS_1020};
use eeg2source::{validate_recording, PipelineError, ProcessingLog, QualityWarning, Recording};
use ndarray::Array2;

fn montage_64() -> Vec<String> {
    (0..64).map(|i| format!("E{i}")).collect()
}

#[test]
fn clean_recording_has_no_warnings() {
    let names = montage_64();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let rec = continuous(&names, 500.0, 90.0);
    let mut log = ProcessingLog::new();
    let report = validate_recording(&rec, &mut log).unwrap();

    assert!(report.is_clean(), "warnings: {:?}", report.warnings);
    assert_eq!(report.metrics.n_channels, 64);
    approx::assert_abs_diff_eq!(report.metrics.sampling_rate, 500.0);
    assert!(log.contains("Data validated"));
    assert_eq!(log.warnings().count(), 0);
}

#[test]
fn nan_sample_is_data_corrupt() {
    let mut data = Array2::from_elem((CHANNELS_1020.len(), 1000), 1e-6);
    data[[3, 17]] = f64::NAN;
    data[[5, 900]] = f64::INFINITY;
    let rec = Recording::continuous(eeg_channels(&CHANNELS_1020), 250.0, data).unwrap();
    let mut log = ProcessingLog::new();
    match validate_recording(&rec, &mut log) {
        Err(PipelineError::DataCorrupt { count }) => assert_eq!(count, 2),
        other => panic!("expected DataCorrupt, got {other:?}"),
    }
    assert!(log.contains("Data validation failed"));
}

#[test]
fn small_short_slow_recording_collects_every_warning() {
    let rec = continuous(&CHANNELS_1020, 128.0, 10.0);
    let mut log = ProcessingLog::new();
    let report = validate_recording(&rec, &mut log).unwrap();

    assert!(report.warnings.contains(&QualityWarning::LowChannelCount { n_channels: 19 }));
    assert!(report.warnings.iter().any(|w| matches!(w, QualityWarning::ShortRecording { .. })));
    assert!(report.warnings.contains(&QualityWarning::LowSampleRate { sfreq: 128.0 }));
    assert_eq!(log.warnings().count(), report.warnings.len());
}

#[test]
fn amplitude_warnings_flag_unit_mistakes() {
    // Microvolts stored as volts.
    let mut data = Array2::zeros((CHANNELS_1020.len(), 500));
    data[[0, 0]] = -40.0;
    data[[0, 1]] = 40.0;
    let rec = Recording::continuous(eeg_channels(&CHANNELS_1020), 250.0, data).unwrap();
    let report = validate_recording(&rec, &mut ProcessingLog::new()).unwrap();
    assert!(report.warnings.iter().any(|w| matches!(w, QualityWarning::LargeAmplitude { .. })));

    let flat = Array2::from_elem((CHANNELS_1020.len(), 500), 1e-3);
    let rec = Recording::continuous(eeg_channels(&CHANNELS_1020), 250.0, flat).unwrap();
    let report = validate_recording(&rec, &mut ProcessingLog::new()).unwrap();
    assert!(report.warnings.iter().any(|w| matches!(w, QualityWarning::SmallAmplitude { .. })));
}

#[test]
fn validation_does_not_modify_the_recording() {
    let rec = epoched(&CHANNELS_1020, 250.0, 4, 300, -0.2);
    let before: Vec<f64> = rec.values().collect();
    validate_recording(&rec, &mut ProcessingLog::new()).unwrap();
    let after: Vec<f64> = rec.values().collect();
    assert_eq!(before, after);
}
