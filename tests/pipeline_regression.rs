//! Pipeline Regression Tests
//!
//! End-to-end runs of parse -> register -> window -> spectrum -> features ->
//! score -> aggregate on synthetic rig logs with known content. Asserts on
//! window counts, verdicts, the explaining feature and concurrent retraining.

use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use rigscan::config::{PipelineConfig, WindowingConfig};
use rigscan::{BaselineModel, Pipeline, PipelineError, ScoringError, Verdict};
use std::f64::consts::PI;
use std::sync::Arc;

/// Tab-separated log, 100 Hz, one column per `(header, generator)` pair.
fn log_text(seconds: f64, columns: &[(&str, &dyn Fn(f64) -> f64)]) -> String {
    let mut text = String::from("Time [s]");
    for (header, _) in columns {
        text.push('\t');
        text.push_str(header);
    }
    text.push('\n');

    let rows = (seconds * 100.0).round() as usize;
    for i in 0..rows {
        let t = i as f64 / 100.0;
        text.push_str(&format!("{t:.2}"));
        for (_, value) in columns {
            text.push_str(&format!("\t{:.6}", value(t)));
        }
        text.push('\n');
    }
    text
}

fn sine(amplitude: f64, freq: f64) -> impl Fn(f64) -> f64 {
    move |t| amplitude * (2.0 * PI * freq * t).sin()
}

fn config(length: usize, overlap: f64) -> PipelineConfig {
    PipelineConfig {
        windowing: WindowingConfig {
            length,
            overlap,
            ..WindowingConfig::default()
        },
        ..PipelineConfig::default()
    }
}

/// Noisy pressure trace: offset plus 2.5 Hz oscillation plus Gaussian noise.
fn noisy_pressure(seconds: f64, amplitude: f64, seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.2).unwrap();
    let samples: Vec<f64> = (0..(seconds * 100.0) as usize)
        .map(|i| {
            let t = i as f64 / 100.0;
            200.0 + amplitude * (2.0 * PI * 2.5 * t).sin() + noise.sample(&mut rng)
        })
        .collect();
    let lookup = move |t: f64| samples[((t * 100.0).round() as usize).min(samples.len() - 1)];
    log_text(seconds, &[("Pressure [bar]", &lookup)])
}

// ============================================================================
// Reference Scenario
// ============================================================================

#[test]
fn amplified_sine_flags_its_frequency_band() {
    let model = Arc::new(BaselineModel::new());

    // Train on 200 s of a 5 Hz, amplitude 1 sine with half-overlapping windows
    let trainer = Pipeline::new(config(1024, 0.5), Arc::clone(&model)).unwrap();
    let training = trainer
        .frame_from_str(&log_text(200.0, &[("Pressure [bar]", &sine(1.0, 5.0))]), None)
        .unwrap();
    let profile = trainer.train_from_frames(&[training], Some("sine".into())).unwrap();
    assert_eq!(profile.channels["pressure"].sample_count, 38);

    // 20 s at 100 Hz with 1024-sample windows and no overlap: one window
    let scorer = Pipeline::new(config(1024, 0.0), Arc::clone(&model)).unwrap();
    let report = scorer
        .score_str(&log_text(20.0, &[("Pressure [bar]", &sine(10.0, 5.0))]), Some("amplified"))
        .unwrap();

    assert_eq!(report.windows_scored, 1);
    assert_eq!(report.verdict, Verdict::Anomalous);
    let worst = &report.worst[0];
    assert!(worst.is_anomaly);
    assert_eq!(worst.top_feature(), Some("band_3_8hz"));
    assert_eq!(report.profile.label.as_deref(), Some("sine"));
    assert_eq!(report.source.as_deref(), Some("amplified"));
}

#[test]
fn short_channel_yields_no_verdict() {
    let model = Arc::new(BaselineModel::new());
    let pipeline = Pipeline::new(config(1024, 0.5), Arc::clone(&model)).unwrap();
    let training = pipeline
        .frame_from_str(&log_text(200.0, &[("Pressure [bar]", &sine(1.0, 5.0))]), None)
        .unwrap();
    pipeline.train_from_frames(&[training], None).unwrap();

    // 500 samples < one 1024-sample window
    let report = pipeline
        .score_str(&log_text(5.0, &[("Pressure [bar]", &sine(1.0, 5.0))]), None)
        .unwrap();
    assert_eq!(report.verdict, Verdict::NoVerdict);
    assert_eq!(report.windows_scored, 0);
    let summary = report.channel_summary("Pressure").unwrap();
    assert_eq!(summary.windows_total, 0);
    assert_eq!(summary.verdict, None);
}

// ============================================================================
// Noisy Signals
// ============================================================================

#[test]
fn pressure_oscillation_fault_stands_out_from_clean_run() {
    let model = Arc::new(BaselineModel::new());
    let pipeline = Pipeline::new(config(256, 0.0), Arc::clone(&model)).unwrap();

    let frames: Vec<_> = (0..2)
        .map(|seed| pipeline.frame_from_str(&noisy_pressure(120.0, 3.0, seed), None).unwrap())
        .collect();
    let profile = pipeline.train_from_frames(&frames, None).unwrap();
    assert_eq!(profile.channels["pressure"].sample_count, 2 * 46);

    let clean = pipeline.score_str(&noisy_pressure(60.0, 3.0, 100), None).unwrap();
    let faulty = pipeline.score_str(&noisy_pressure(60.0, 15.0, 101), None).unwrap();

    let clean_summary = clean.channel_summary("pressure").unwrap();
    let faulty_summary = faulty.channel_summary("pressure").unwrap();
    assert_eq!(faulty.verdict, Verdict::Anomalous);
    assert_eq!(faulty_summary.anomaly_rate, Some(1.0));
    assert!(clean_summary.anomaly_rate.unwrap() < 0.5);
    assert!(faulty_summary.max_score.unwrap() > 5.0 * clean_summary.max_score.unwrap());

    let top = faulty.worst[0].top_feature().unwrap();
    assert!(top.starts_with("band_"), "unexpected top feature {top}");
}

#[test]
fn constant_channel_is_flagged_degenerate_not_anomalous() {
    let model = Arc::new(BaselineModel::new());
    let pipeline = Pipeline::new(config(256, 0.0), Arc::clone(&model)).unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    let noise = Normal::new(0.0, 0.05).unwrap();
    let leak: Vec<f64> = (0..12_000).map(|_| 0.5 + noise.sample(&mut rng)).collect();
    let leak_at = move |t: f64| leak[((t * 100.0).round() as usize).min(11_999)];
    let training = log_text(
        120.0,
        &[("Pressure [bar]", &sine(1.0, 5.0)), ("Leak [L/min]", &leak_at)],
    );
    pipeline
        .train_from_frames(&[pipeline.frame_from_str(&training, None).unwrap()], None)
        .unwrap();

    let flat = |_: f64| 0.5;
    let report = pipeline
        .score_str(&log_text(30.0, &[("Pressure [bar]", &sine(1.0, 5.0)), ("Leak [L/min]", &flat)]), None)
        .unwrap();

    let leak = report.channel_summary("leak").unwrap();
    assert_eq!(leak.windows_total, 11);
    assert_eq!(leak.windows_degenerate, 11);
    assert_eq!(leak.verdict, None);
    assert!(report.worst.iter().all(|r| !r.degenerate && r.score.is_finite()));
    assert_ne!(report.verdict, Verdict::NoVerdict);
}

#[test]
fn unknown_channel_is_rejected() {
    let model = Arc::new(BaselineModel::new());
    let pipeline = Pipeline::new(config(256, 0.0), Arc::clone(&model)).unwrap();
    let training = pipeline
        .frame_from_str(&log_text(120.0, &[("Pressure [bar]", &sine(1.0, 5.0))]), None)
        .unwrap();
    pipeline.train_from_frames(&[training], None).unwrap();

    let err = pipeline
        .score_str(&log_text(30.0, &[("Torque [Nm]", &sine(1.0, 5.0))]), None)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Scoring(ScoringError::ChannelMismatch(_))));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn retraining_during_scoring_never_mixes_profiles() {
    let small_log = log_text(120.0, &[("Pressure [bar]", &sine(1.0, 5.0))]);
    let large_log = log_text(120.0, &[("Pressure [bar]", &sine(4.0, 5.0))]);
    let scored = log_text(30.0, &[("Pressure [bar]", &sine(1.0, 5.0))]);

    // Reference scores for each profile, computed in isolation
    let reference = |training: &str| -> Vec<f64> {
        let pipeline = Pipeline::new(config(256, 0.0), Arc::new(BaselineModel::new())).unwrap();
        let frame = pipeline.frame_from_str(training, None).unwrap();
        pipeline.train_from_frames(&[frame], None).unwrap();
        let report = pipeline.score_str(&scored, None).unwrap();
        report.worst.iter().map(|r| r.score).collect()
    };
    let small_scores = reference(&small_log);
    let large_scores = reference(&large_log);
    assert_ne!(small_scores, large_scores);

    let model = Arc::new(BaselineModel::new());
    let pipeline = Pipeline::new(config(256, 0.0), Arc::clone(&model)).unwrap();
    let small = pipeline.frame_from_str(&small_log, None).unwrap();
    let large = pipeline.frame_from_str(&large_log, None).unwrap();
    pipeline.train_from_frames(&[small.clone()], Some("small".into())).unwrap();

    std::thread::scope(|s| {
        let scorers: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    (0..5)
                        .map(|_| pipeline.score_str(&scored, None).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for i in 0..6 {
            let (frame, label) = if i % 2 == 0 { (&large, "large") } else { (&small, "small") };
            pipeline.train_from_frames(&[frame.clone()], Some(label.into())).unwrap();
        }

        for handle in scorers {
            for report in handle.join().unwrap() {
                let scores: Vec<f64> = report.worst.iter().map(|r| r.score).collect();
                match report.profile.label.as_deref() {
                    Some("small") => assert_eq!(scores, small_scores),
                    Some("large") => assert_eq!(scores, large_scores),
                    other => panic!("unexpected profile label {other:?}"),
                }
            }
        }
    });

    assert_eq!(model.snapshot().unwrap().label.as_deref(), Some("small"));
}

#[test]
fn batch_scoring_keeps_input_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let model = Arc::new(BaselineModel::new());
    let pipeline = Pipeline::new(config(256, 0.0), Arc::clone(&model)).unwrap();
    let training = pipeline
        .frame_from_str(&log_text(120.0, &[("Pressure [bar]", &sine(1.0, 5.0))]), None)
        .unwrap();
    pipeline.train_from_frames(&[training], None).unwrap();

    let normal = dir.path().join("normal.txt");
    let faulty = dir.path().join("faulty.txt");
    let missing = dir.path().join("missing.txt");
    std::fs::write(&normal, log_text(30.0, &[("Pressure [bar]", &sine(1.0, 5.0))])).unwrap();
    std::fs::write(&faulty, log_text(30.0, &[("Pressure [bar]", &sine(10.0, 5.0))])).unwrap();

    let results = pipeline.score_batch(&[faulty.clone(), missing, normal.clone()]);
    assert_eq!(results.len(), 3);

    let first = results[0].as_ref().unwrap();
    assert_eq!(first.source.as_deref(), Some(faulty.display().to_string().as_str()));
    assert_eq!(first.verdict, Verdict::Anomalous);
    assert!(matches!(results[1], Err(PipelineError::Parse(_))));
    let third = results[2].as_ref().unwrap();
    assert_eq!(third.source.as_deref(), Some(normal.display().to_string().as_str()));
}
