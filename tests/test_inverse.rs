mod common;
use common::{continuous, epoched, CHANNELS_1020};
use eeg2source::{
    aggregate, build_forward, preprocess, solve, AtlasOrigin, Configuration, EstimateOrigin,
    ForwardFailure, ProcessingLog, RegularizationPolicy, SphericalTemplate,
};

#[test]
fn genuine_estimate_reaches_all_regions() {
    let rec = continuous(&CHANNELS_1020, 250.0, 30.0);
    let cfg = Configuration::default();
    let mut log = ProcessingLog::new();
    let epochs = preprocess(&rec, &cfg, &mut log).unwrap();
    let fwd = build_forward(&epochs, &cfg, &SphericalTemplate::default(), &mut log);
    let estimate = solve(&epochs, fwd, &cfg, &mut log);

    assert!(!estimate.is_simulated(), "log: {:?}", log.warnings().collect::<Vec<_>>());
    assert_eq!(estimate.n_sources(), 68 * 12);
    assert_eq!(estimate.n_times(), epochs.n_times());
    assert_eq!(estimate.n_epochs(), epochs.n_epochs());
    assert!(estimate.data.iter().all(|v| v.is_finite() && *v >= 0.0));
    assert!(estimate.data.iter().any(|v| *v > 0.0));
    assert!(log.contains("Noise covariance from baseline window"));
    assert!(log.contains("Created inverse operator"));
    assert!(log.contains("Inverse solution computed successfully"));

    let atlas = aggregate(estimate, &mut log).unwrap();
    assert_eq!(atlas.origin, AtlasOrigin::Genuine);
    assert_eq!(atlas.n_regions(), 68);
    assert_eq!(atlas.hemisphere_counts(), (34, 34));
    assert!(!log.contains("Region has no sources"));
}

#[test]
fn prestimulus_epochs_use_the_prestimulus_window() {
    // 0.3 s before the event, 3 s epochs.
    let rec = epoched(&CHANNELS_1020, 250.0, 8, 751, -0.3);
    let cfg = Configuration::default();
    let mut log = ProcessingLog::new();
    let epochs = preprocess(&rec, &cfg, &mut log).unwrap();
    let fwd = build_forward(&epochs, &cfg, &SphericalTemplate::default(), &mut log);
    let estimate = solve(&epochs, fwd, &cfg, &mut log);

    assert!(!estimate.is_simulated());
    assert!(!log.contains("Noise covariance from baseline window"));
    let cov = log.find("Computed noise covariance").unwrap();
    // 76 samples at t <= 0 in each of 8 epochs.
    assert_eq!(cov.details["n_samples"], 8 * 76);
}

#[test]
fn forward_failure_yields_seeded_simulation() {
    let rec = continuous(&["Fp1", "Fp2", "Cz", "O1", "O2"], 250.0, 10.0);
    let cfg = Configuration::default();

    let run = || {
        let mut log = ProcessingLog::new();
        let epochs = preprocess(&rec, &cfg, &mut log).unwrap();
        let fwd = build_forward(&epochs, &cfg, &SphericalTemplate::default(), &mut log);
        assert!(matches!(fwd, Err(ForwardFailure::InsufficientElectrodeCoverage { .. })));
        (solve(&epochs, fwd, &cfg, &mut log), log)
    };
    let (a, log) = run();
    let (b, _) = run();

    assert!(a.is_simulated());
    assert!(matches!(&a.origin, EstimateOrigin::Simulated { reason } if reason.contains("only 5 channels")));
    assert_eq!(a.n_sources(), 68);
    assert!(a.data.iter().zip(b.data.iter()).all(|(x, y)| x.to_bits() == y.to_bits()));
    assert!(log.contains("Using simulated inverse solution"));

    let atlas = aggregate(a, &mut ProcessingLog::new()).unwrap();
    assert_eq!(atlas.origin, AtlasOrigin::Simulated);
    assert_eq!(atlas.n_regions(), 68);
}

#[test]
fn configured_lambda2_is_overridden_under_assumed_snr() {
    let rec = continuous(&CHANNELS_1020, 250.0, 10.0);
    let mut cfg = Configuration::default();
    cfg.scientific_parameters.inverse_solution.lambda2 = 0.05;

    let mut log = ProcessingLog::new();
    let epochs = preprocess(&rec, &cfg, &mut log).unwrap();
    let fwd = build_forward(&epochs, &cfg, &SphericalTemplate::default(), &mut log);
    solve(&epochs, fwd, &cfg, &mut log);

    let entry = log.find("Configured lambda2 overridden by assumed SNR").unwrap();
    assert_eq!(entry.details["configured_lambda2"], 0.05);
    approx::assert_abs_diff_eq!(entry.details["applied_lambda2"].as_f64().unwrap(), 1.0 / 9.0, epsilon = 1e-12);
}

#[test]
fn configured_policy_applies_configured_lambda2() {
    let rec = continuous(&CHANNELS_1020, 250.0, 10.0);
    let mut cfg = Configuration::default();
    cfg.scientific_parameters.inverse_solution.lambda2 = 0.05;
    cfg.scientific_parameters.inverse_solution.regularization = RegularizationPolicy::Configured;

    let mut log = ProcessingLog::new();
    let epochs = preprocess(&rec, &cfg, &mut log).unwrap();
    let fwd = build_forward(&epochs, &cfg, &SphericalTemplate::default(), &mut log);
    solve(&epochs, fwd, &cfg, &mut log);

    assert!(!log.contains("Configured lambda2 overridden"));
    let entry = log.find("Regularization parameter").unwrap();
    assert_eq!(entry.details["applied_lambda2"], 0.05);
}

#[test]
fn stronger_regularization_shrinks_the_estimate() {
    let rec = continuous(&CHANNELS_1020, 250.0, 10.0);
    let energy = |lambda2: f64| {
        let mut cfg = Configuration::default();
        cfg.scientific_parameters.inverse_solution.lambda2 = lambda2;
        cfg.scientific_parameters.inverse_solution.regularization = RegularizationPolicy::Configured;
        let mut log = ProcessingLog::new();
        let epochs = preprocess(&rec, &cfg, &mut log).unwrap();
        let fwd = build_forward(&epochs, &cfg, &SphericalTemplate::default(), &mut log);
        let est = solve(&epochs, fwd, &cfg, &mut log);
        assert!(!est.is_simulated());
        est.data.iter().map(|v| v * v).sum::<f64>()
    };
    assert!(energy(1.0) < energy(0.01));
}
