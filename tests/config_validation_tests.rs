//! Config Validation Tests
//!
//! Typo detection with suggestions, range validation and file round trips for
//! the pipeline configuration, exercised independently from the pipeline.

use rigscan::config::validation::{
    known_config_keys, suggest_correction, validate_ranges, validate_unknown_keys,
};
use rigscan::config::{
    CombinationPolicy, ConfigError, DegeneratePolicy, PartialWindowPolicy, PipelineConfig,
};
use rigscan::{BaselineModel, Pipeline, PipelineError};
use std::sync::Arc;

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_training_samples_warns_with_suggestion() {
    let toml_str = r#"
[baseline]
min_trainng_samples = 50
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert_eq!(warnings[0].field, "baseline.min_trainng_samples");
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("baseline.min_training_samples")
    );
    assert!(warnings[0].to_string().contains("did you mean"));
}

#[test]
fn misspelled_section_is_reported() {
    let toml_str = r#"
[scorng]
threshold = 4.0
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert!(warnings.iter().any(|w| w.field == "scorng"));
    assert!(warnings
        .iter()
        .any(|w| w.suggestion.as_deref() == Some("scoring")));
}

#[test]
fn unknown_keys_never_fail_loading() {
    let toml_str = r#"
[scoring]
treshold = 4.0
"#;
    let config = PipelineConfig::from_toml_str(toml_str).unwrap();
    // The misspelt key is ignored, the default survives
    assert_eq!(config.scoring.threshold, 6.0);
}

#[test]
fn every_known_key_is_accepted_silently() {
    let full = PipelineConfig::default().to_toml().unwrap();
    assert!(validate_unknown_keys(&full).is_empty());
    assert!(known_config_keys().contains("report.min_anomalous_fraction"));
    assert_eq!(
        suggest_correction("baseline.min_std_flor", &known_config_keys()).as_deref(),
        Some("baseline.min_std_floor")
    );
}

// ============================================================================
// Range Validation
// ============================================================================

#[test]
fn full_config_parses_every_section() {
    let toml_str = r#"
[parser]
malformed_row_threshold = 0.02

[registry]
channels = ["Pressure", "Flow"]

[windowing]
length = 512
overlap = 0.25
partial_policy = "zero_pad"

[spectral]
band_edges_hz = [0.0, 2.0, 10.0, 50.0]
include_dc = true

[features]
degenerate_policy = "propagate"

[baseline]
min_training_samples = 50
staleness_horizon_hours = 168

[scoring]
combination = "max_abs"
threshold = 4.5
top_k = 5

[report]
top_n = 3
min_anomalous_fraction = 0.2
"#;
    let config = PipelineConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(config.registry.channels, vec!["Pressure", "Flow"]);
    assert_eq!(config.windowing.partial_policy, PartialWindowPolicy::ZeroPad);
    assert_eq!(config.features.degenerate_policy, DegeneratePolicy::Propagate);
    assert_eq!(config.scoring.combination, CombinationPolicy::MaxAbs);
    assert_eq!(config.spectral.band_edges_hz.len(), 4);
    assert_eq!(config.baseline.staleness_horizon().num_hours(), 168);
    assert_eq!(config.report.min_anomalous_fraction, Some(0.2));
}

#[test]
fn non_increasing_band_edges_rejected() {
    let toml_str = r#"
[spectral]
band_edges_hz = [0.0, 5.0, 5.0, 20.0]
"#;
    match PipelineConfig::from_toml_str(toml_str) {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.iter().any(|e| e.contains("strictly increasing")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn overlap_of_one_rejected() {
    let toml_str = r#"
[windowing]
overlap = 1.0
"#;
    assert!(matches!(
        PipelineConfig::from_toml_str(toml_str),
        Err(ConfigError::Validation(_))
    ));
}

#[test]
fn unknown_enum_value_is_a_parse_error() {
    let toml_str = r#"
[scoring]
combination = "mahalanobis"
"#;
    assert!(matches!(
        PipelineConfig::from_toml_str(toml_str),
        Err(ConfigError::Parse(_, _))
    ));
}

#[test]
fn suspicious_values_only_warn() {
    let mut config = PipelineConfig::default();
    config.windowing.length = 1000;
    config.scoring.threshold = 2.0;
    let (errors, warnings) = validate_ranges(&config);
    assert!(errors.is_empty());
    assert!(warnings.iter().any(|w| w.field == "windowing.length"));
    assert!(warnings.iter().any(|w| w.field == "scoring.threshold"));
    assert!(config.validate().is_ok());
}

#[test]
fn typo_and_odd_length_each_reported_once() {
    let toml_str = r#"
[windowing]
length = 1000

[baseline]
min_trainng_samples = 50
"#;
    let (config, warnings) = PipelineConfig::from_toml_str_with_warnings(toml_str).unwrap();
    assert_eq!(config.windowing.length, 1000);
    let fields: Vec<&str> = warnings.iter().map(|w| w.field.as_str()).collect();
    assert_eq!(fields, vec!["baseline.min_trainng_samples", "windowing.length"]);
}

#[test]
fn warnings_path_still_rejects_bad_ranges() {
    let result = PipelineConfig::from_toml_str_with_warnings("[windowing]
overlap = 1.0
");
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}

#[test]
fn pipeline_refuses_invalid_config() {
    let mut config = PipelineConfig::default();
    config.scoring.top_k = 0;
    let result = Pipeline::new(config, Arc::new(BaselineModel::new()));
    assert!(matches!(result, Err(PipelineError::Config(ConfigError::Validation(_)))));
}

// ============================================================================
// Files
// ============================================================================

#[test]
fn saved_config_loads_back_identically() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("nested/rigscan.toml");

    let mut config = PipelineConfig::default();
    config.windowing.overlap = 0.5;
    config.report.min_anomalous_fraction = Some(0.1);
    config.save_to_file(&path).expect("save");

    let loaded = PipelineConfig::load_from_file(&path).expect("load");
    assert_eq!(loaded, config);
}

#[test]
fn missing_file_is_io_error() {
    let result = PipelineConfig::load_from_file(std::path::Path::new("/nonexistent/rigscan.toml"));
    assert!(matches!(result, Err(ConfigError::Io(_, _))));
}

#[test]
fn example_config_in_repo_is_valid() {
    let path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("rigscan.example.toml");
    let config = PipelineConfig::load_from_file(&path).expect("example config");
    assert_eq!(config, PipelineConfig::default());
}
