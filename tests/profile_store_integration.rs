//! Profile Store Integration Tests
//!
//! Trains through the pipeline, persists the profile as a store version and
//! verifies that a model rebuilt from disk scores exactly like the original.
//! Also covers schema refusal and the stale-profile annotations.

use chrono::{Duration, Utc};
use rigscan::config::PipelineConfig;
use rigscan::{
    BaselineError, BaselineModel, BaselineProfile, ModelState, Pipeline, ProfileStore, Verdict,
};
use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Two-channel log at 100 Hz, comma decimals and a DASYLab-style preamble.
fn rig_log(seconds: usize, pressure_amplitude: f64) -> String {
    let mut text = String::from(
        "DASYLab - V 13.0.0\nWorksheet name: store-test\nNumber of channels: 2\n\n\
         Messzeit [s]\tPressure [bar]\tFlow [L/min]\n",
    );
    for i in 0..seconds * 100 {
        let t = i as f64 / 100.0;
        let pressure = 200.0 + pressure_amplitude * (2.0 * PI * 2.5 * t).sin();
        let flow = 40.0 + 1.5 * (2.0 * PI * 5.0 * t).sin() + 0.2 * (2.0 * PI * 0.7 * t).cos();
        let row = format!("{t:.2}\t{pressure:.4}\t{flow:.4}\n");
        text.push_str(&row.replace('.', ","));
    }
    text
}

fn small_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.windowing.length = 256;
    config.baseline.min_training_samples = 10;
    config
}

fn write_logs(dir: &Path) -> Vec<PathBuf> {
    [3.0, 3.2, 2.9]
        .iter()
        .enumerate()
        .map(|(i, amplitude)| {
            let path = dir.join(format!("good_{i}.txt"));
            std::fs::write(&path, rig_log(60, *amplitude)).expect("write log");
            path
        })
        .collect()
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn stored_profile_scores_identically_after_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let logs = write_logs(dir.path());
    let store = ProfileStore::new(dir.path().join("profiles"));

    let model = Arc::new(BaselineModel::new());
    let pipeline = Pipeline::new(small_config(), Arc::clone(&model)).unwrap();
    let trained = pipeline
        .train_from_files(&logs, Some("commissioning".into()))
        .unwrap();
    assert_eq!(trained.channels.len(), 2);
    assert_eq!(trained.channels["pressure"].sample_count, 3 * 23);

    let metadata = store.save(&trained).unwrap();
    assert!(metadata.version.starts_with("model_"));
    assert_eq!(metadata.channels["Pressure [bar]"], 69);
    assert_eq!(metadata.label.as_deref(), Some("commissioning"));

    let (version, loaded) = store.latest().unwrap();
    assert_eq!(version, metadata.version);
    assert_eq!(&loaded, trained.as_ref());

    let reloaded = Pipeline::new(
        small_config(),
        Arc::new(BaselineModel::from_profile(loaded)),
    )
    .unwrap();

    let suspect = rig_log(30, 9.0);
    let before = pipeline.score_str(&suspect, Some("suspect")).unwrap();
    let after = reloaded.score_str(&suspect, Some("suspect")).unwrap();
    assert_eq!(before.verdict, Verdict::Anomalous);
    assert_eq!(before.worst, after.worst);
    assert_eq!(before.channels, after.channels);
}

#[test]
fn retraining_chains_versions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let logs = write_logs(dir.path());
    let store = ProfileStore::new(dir.path().join("profiles"));
    let pipeline = Pipeline::new(small_config(), Arc::new(BaselineModel::new())).unwrap();

    let first = store
        .save(&pipeline.train_from_files(&logs[..2], Some("first".into())).unwrap())
        .unwrap();
    let second = store
        .save(&pipeline.train_from_files(&logs, Some("second".into())).unwrap())
        .unwrap();

    assert_eq!(first.based_on, None);
    assert_eq!(second.based_on.as_deref(), Some(first.version.as_str()));
    assert_eq!(store.list_versions().unwrap(), vec![first.version.clone(), second.version.clone()]);

    // Older versions stay loadable
    let old = store.load(&first.version).unwrap();
    assert_eq!(old.label.as_deref(), Some("first"));
    assert_eq!(old.channels["flow"].sample_count, 2 * 23);
    assert_eq!(store.metadata(&second.version).unwrap().label.as_deref(), Some("second"));
}

#[test]
fn empty_store_reports_no_profiles() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ProfileStore::new(dir.path().join("never-written"));
    assert!(matches!(store.latest(), Err(BaselineError::NoProfiles(_))));
}

#[test]
fn future_schema_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let logs = write_logs(dir.path());
    let pipeline = Pipeline::new(small_config(), Arc::new(BaselineModel::new())).unwrap();
    let mut profile = (*pipeline.train_from_files(&logs, None).unwrap()).clone();
    profile.schema_version = 99;

    let path = dir.path().join("future.json");
    profile.save_to_file(&path).unwrap();
    assert!(matches!(
        BaselineProfile::load_from_file(&path),
        Err(BaselineError::SchemaMismatch(99, 1))
    ));
    assert!(BaselineModel::load_from_file(&path).is_err());
}

// ============================================================================
// Staleness
// ============================================================================

#[test]
fn invalidated_profile_still_scores_with_annotation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let logs = write_logs(dir.path());
    let model = Arc::new(BaselineModel::new());
    let pipeline = Pipeline::new(small_config(), Arc::clone(&model)).unwrap();
    pipeline.train_from_files(&logs, None).unwrap();

    let fresh = pipeline.score(&logs[0]).unwrap();
    assert!(!fresh.profile.stale);

    model.invalidate().unwrap();
    assert_eq!(model.state(Utc::now(), Duration::hours(720)), ModelState::Stale);

    let stale = pipeline.score(&logs[0]).unwrap();
    assert!(stale.profile.stale);
    assert!(stale.worst.iter().all(|r| r.stale_profile));
    assert_eq!(fresh.worst.len(), stale.worst.len());
    for (a, b) in fresh.worst.iter().zip(&stale.worst) {
        assert_eq!(a.score, b.score);
    }
}

#[test]
fn old_profile_is_stale_past_the_horizon() {
    let dir = tempfile::tempdir().expect("tempdir");
    let logs = write_logs(dir.path());
    let trainer = Pipeline::new(small_config(), Arc::new(BaselineModel::new())).unwrap();
    let mut profile = (*trainer.train_from_files(&logs, None).unwrap()).clone();
    profile.trained_at = Utc::now() - Duration::days(45);

    let model = Arc::new(BaselineModel::from_profile(profile));
    let pipeline = Pipeline::new(small_config(), Arc::clone(&model)).unwrap();

    // Log text carries no recording time, so "now" is the reference
    let report = pipeline.score_str(&rig_log(10, 3.0), None).unwrap();
    assert!(report.profile.stale);

    let mut long_horizon = small_config();
    long_horizon.baseline.staleness_horizon_hours = 24 * 60;
    let pipeline = Pipeline::new(long_horizon, model).unwrap();
    let report = pipeline.score_str(&rig_log(10, 3.0), None).unwrap();
    assert!(!report.profile.stale);
}
