//! Versioned on-disk history of baseline profiles
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/
//!   model_20261016_081502_113/
//!     profile.json     BaselineProfile
//!     metadata.json    ProfileMetadata
//!   model_20261017_093000_004/
//!     ...
//! ```
//!
//! Version names sort lexically in training order, so the latest version is
//! the greatest directory name.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{BaselineError, BaselineProfile};

const VERSION_PREFIX: &str = "model_";
const PROFILE_FILE: &str = "profile.json";
const METADATA_FILE: &str = "metadata.json";

/// Summary written next to each stored profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    /// Version that was latest when this one was saved
    #[serde(default)]
    pub based_on: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    /// Training windows per channel, keyed by display name
    pub channels: BTreeMap<String, usize>,
}

/// Directory of versioned baseline profiles.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a specific version
    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.root.join(version)
    }

    /// Profile file of a specific version
    pub fn profile_path(&self, version: &str) -> PathBuf {
        self.version_dir(version).join(PROFILE_FILE)
    }

    /// Store `profile` as a new version and return its metadata.
    pub fn save(&self, profile: &BaselineProfile) -> Result<ProfileMetadata, BaselineError> {
        std::fs::create_dir_all(&self.root)?;
        let based_on = self.list_versions()?.pop();

        // Two saves inside the same millisecond get consecutive stamps
        let mut stamp = profile.trained_at;
        let mut version = version_name(stamp);
        while self.version_dir(&version).exists() {
            stamp += Duration::milliseconds(1);
            version = version_name(stamp);
        }

        let metadata = ProfileMetadata {
            version: version.clone(),
            trained_at: profile.trained_at,
            based_on,
            label: profile.label.clone(),
            channels: profile
                .channels
                .values()
                .map(|c| (c.channel.to_string(), c.sample_count))
                .collect(),
        };

        profile.save_to_file(&self.profile_path(&version))?;
        let json = serde_json::to_string_pretty(&metadata)?;
        std::fs::write(self.version_dir(&version).join(METADATA_FILE), json)?;

        info!(
            version = %version,
            based_on = metadata.based_on.as_deref().unwrap_or("-"),
            "Baseline profile version stored"
        );
        Ok(metadata)
    }

    /// All stored versions, oldest first.
    pub fn list_versions(&self) -> Result<Vec<String>, BaselineError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(VERSION_PREFIX) && entry.path().join(PROFILE_FILE).exists() {
                    versions.push(name.to_string());
                }
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Metadata of a specific version
    pub fn metadata(&self, version: &str) -> Result<ProfileMetadata, BaselineError> {
        let json = std::fs::read_to_string(self.version_dir(version).join(METADATA_FILE))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Load a specific version
    pub fn load(&self, version: &str) -> Result<BaselineProfile, BaselineError> {
        BaselineProfile::load_from_file(&self.profile_path(version))
    }

    /// Load the most recent version
    pub fn latest(&self) -> Result<(String, BaselineProfile), BaselineError> {
        let version = self
            .list_versions()?
            .pop()
            .ok_or_else(|| BaselineError::NoProfiles(self.root.display().to_string()))?;
        let profile = self.load(&version)?;
        Ok((version, profile))
    }
}

fn version_name(stamp: DateTime<Utc>) -> String {
    format!("{VERSION_PREFIX}{}", stamp.format("%Y%m%d_%H%M%S_%3f"))
}
