//! Config validation: unknown-key detection with Levenshtein suggestions
//! and range checks that go beyond simple sign tests.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for PipelineConfig.
///
/// Maintained by hand to match the struct hierarchy in pipeline_config.rs.
/// Any new field added to PipelineConfig must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [parser]
        "parser",
        "parser.malformed_row_threshold",
        "parser.decimal_sample_size",
        // [registry]
        "registry",
        "registry.irregular_cv_threshold",
        "registry.channels",
        // [windowing]
        "windowing",
        "windowing.length",
        "windowing.overlap",
        "windowing.partial_policy",
        // [spectral]
        "spectral",
        "spectral.band_edges_hz",
        "spectral.include_dc",
        // [features]
        "features",
        "features.degenerate_policy",
        // [baseline]
        "baseline",
        "baseline.min_training_samples",
        "baseline.min_std_floor",
        "baseline.staleness_horizon_hours",
        // [scoring]
        "scoring",
        "scoring.combination",
        "scoring.threshold",
        "scoring.top_k",
        // [report]
        "report",
        "report.top_n",
        "report.min_anomalous_fraction",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties resolve to the alphabetically first key so suggestions are stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by(|(ka, da), (kb, db)| da.cmp(db).then_with(|| ka.cmp(kb)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys, it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    let mut found = walk_toml_keys(&value, "");
    found.sort();

    found
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Largest window the spectral stage accepts (4 Mi samples).
pub const MAX_WINDOW_LENGTH: usize = 1 << 22;

/// Validate ranges on a parsed PipelineConfig.
///
/// Returns (errors, warnings). Errors are values the pipeline cannot run
/// with; warnings are legal but likely to produce misleading scores.
pub fn validate_ranges(
    config: &super::PipelineConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let length = config.windowing.length;
    if length > MAX_WINDOW_LENGTH {
        errors.push(format!(
            "windowing.length = {length} exceeds the maximum of {MAX_WINDOW_LENGTH} samples"
        ));
    } else if length >= 2 && !length.is_power_of_two() {
        warnings.push(ValidationWarning {
            field: "windowing.length".to_string(),
            message: format!("windowing.length = {length} is not a power of two; FFTs will be slower"),
            suggestion: None,
        });
    }

    if config.windowing.overlap > 0.9 && config.windowing.overlap < 1.0 {
        warnings.push(ValidationWarning {
            field: "windowing.overlap".to_string(),
            message: format!(
                "windowing.overlap = {:.2} makes consecutive windows nearly identical",
                config.windowing.overlap
            ),
            suggestion: None,
        });
    }

    if config.scoring.threshold.is_finite()
        && config.scoring.threshold > 0.0
        && config.scoring.threshold < 3.0
    {
        warnings.push(ValidationWarning {
            field: "scoring.threshold".to_string(),
            message: format!(
                "scoring.threshold = {:.2} will flag ordinary run-to-run variation",
                config.scoring.threshold
            ),
            suggestion: None,
        });
    }

    if config.baseline.min_std_floor > 0.1 {
        warnings.push(ValidationWarning {
            field: "baseline.min_std_floor".to_string(),
            message: format!(
                "baseline.min_std_floor = {} hides deviations smaller than {:.0}% of the mean",
                config.baseline.min_std_floor,
                config.baseline.min_std_floor * 100.0
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("overlap", "overlap"), 0);
        assert_eq!(levenshtein("overlab", "overlap"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("°C", "C"), 1);
    }

    #[test]
    fn test_typo_gets_suggestion() {
        let warnings = validate_unknown_keys("[windowing]\noverlapp = 0.5\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "windowing.overlapp");
        assert_eq!(warnings[0].suggestion.as_deref(), Some("windowing.overlap"));
    }

    #[test]
    fn test_unrelated_key_has_no_suggestion() {
        let warnings = validate_unknown_keys("[dashboard]\ntheme = \"dark\"\n");
        assert!(warnings.iter().all(|w| w.suggestion.is_none()));
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_known_keys_produce_no_warnings() {
        let raw = "[scoring]\nthreshold = 5.0\ntop_k = 2\n[report]\ntop_n = 4\n";
        assert!(validate_unknown_keys(raw).is_empty());
    }
}
