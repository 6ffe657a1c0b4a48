use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::ErrorRecord;

pub const DEFAULT_PROFILE: &str = "average";

#[derive(Debug, Error, PartialEq)]
pub enum ProfileError {
    #[error("profile {name:?}: delay bounds must be finite and >= 0 (got {min}..{max})")]
    InvalidBounds { name: String, min: f64, max: f64 },

    #[error("profile {name:?}: min delay {min} is greater than max delay {max}")]
    InvertedRange { name: String, min: f64, max: f64 },

    #[error("profile {name:?}: typo probability {p} is outside [0, 1]")]
    InvalidTypoProbability { name: String, p: f64 },

    #[error("profile name must not be empty")]
    EmptyName,
}

/// Named timing/typo configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayProfile {
    pub name: String,
    /// Inter-character delay bounds in seconds.
    pub delay_range: (f64, f64),
    pub typo_probability: f64,
}

impl DelayProfile {
    pub fn new(
        name: impl Into<String>,
        min: f64,
        max: f64,
        typo_probability: f64,
    ) -> Result<Self, ProfileError> {
        let profile = Self {
            name: name.into(),
            delay_range: (min, max),
            typo_probability,
        };
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        let (min, max) = self.delay_range;
        if self.name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        if !min.is_finite() || !max.is_finite() || min < 0.0 {
            return Err(ProfileError::InvalidBounds {
                name: self.name.clone(),
                min,
                max,
            });
        }
        if min > max {
            return Err(ProfileError::InvertedRange {
                name: self.name.clone(),
                min,
                max,
            });
        }
        if !(0.0..=1.0).contains(&self.typo_probability) {
            return Err(ProfileError::InvalidTypoProbability {
                name: self.name.clone(),
                p: self.typo_probability,
            });
        }
        Ok(())
    }

    pub fn min_delay(&self) -> f64 {
        self.delay_range.0
    }

    pub fn max_delay(&self) -> f64 {
        self.delay_range.1
    }

    pub fn mean_delay(&self) -> f64 {
        (self.delay_range.0 + self.delay_range.1) / 2.0
    }
}

pub type ProfileMap = BTreeMap<String, DelayProfile>;

/// Built-in `slow`, `average` and `fast` profiles.
pub fn default_profiles() -> ProfileMap {
    [
        ("slow", 0.15, 0.4, 0.15),
        ("average", 0.05, 0.2, 0.05),
        ("fast", 0.01, 0.1, 0.02),
    ]
    .into_iter()
    .map(|(name, min, max, p)| {
        (
            name.to_string(),
            DelayProfile {
                name: name.to_string(),
                delay_range: (min, max),
                typo_probability: p,
            },
        )
    })
    .collect()
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileEntry {
    delay_range: (f64, f64),
    typo_probability: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileFile {
    typing_profiles: BTreeMap<String, ProfileEntry>,
    #[serde(default)]
    error_history: Vec<ErrorRecord>,
}

/// JSON-backed store for profiles and the accumulated error history.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    /// Store under the platform config dir, or the working directory when
    /// no home directory can be resolved.
    pub fn default_location() -> Self {
        let path = ProjectDirs::from("", "", "typist")
            .map(|pd| pd.config_dir().join("typing_profiles.json"))
            .unwrap_or_else(|| PathBuf::from("typing_profiles.json"));
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing storage is not an error: defaults and an empty history are returned.
    pub fn load(&self) -> Result<(ProfileMap, Vec<ErrorRecord>)> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no saved typing profiles, using defaults");
                return Ok((default_profiles(), Vec::new()));
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };

        let file: ProfileFile = serde_json::from_str(&json)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;

        let mut profiles = ProfileMap::new();
        for (name, entry) in file.typing_profiles {
            let profile = DelayProfile {
                name: name.clone(),
                delay_range: entry.delay_range,
                typo_probability: entry.typo_probability,
            };
            profile
                .validate()
                .with_context(|| format!("invalid profile in {}", self.path.display()))?;
            profiles.insert(name, profile);
        }

        debug!(
            profiles = profiles.len(),
            errors = file.error_history.len(),
            "loaded typing profiles"
        );
        Ok((profiles, file.error_history))
    }

    pub fn save(&self, profiles: &ProfileMap, error_history: &[ErrorRecord]) -> Result<()> {
        for profile in profiles.values() {
            profile.validate()?;
        }

        let file = ProfileFile {
            typing_profiles: profiles
                .iter()
                .map(|(name, p)| {
                    (
                        name.clone(),
                        ProfileEntry {
                            delay_range: p.delay_range,
                            typo_probability: p.typo_probability,
                        },
                    )
                })
                .collect(),
            error_history: error_history.to_vec(),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(&file).context("failed to serialize profiles")?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        info!(path = %self.path.display(), "typing profiles and error history saved");
        Ok(())
    }
}

/// Look up `name`, falling back to [`DEFAULT_PROFILE`] when it is unknown.
pub fn select_profile<'a>(profiles: &'a ProfileMap, name: &str) -> Option<&'a DelayProfile> {
    profiles
        .get(name)
        .or_else(|| profiles.get(DEFAULT_PROFILE))
        .or_else(|| profiles.values().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let profiles = default_profiles();
        assert_eq!(profiles.len(), 3);
        for p in profiles.values() {
            p.validate().unwrap();
        }
        assert_eq!(profiles["average"].delay_range, (0.05, 0.2));
    }

    #[test]
    fn rejects_inverted_range() {
        let err = DelayProfile::new("odd", 0.3, 0.1, 0.0).unwrap_err();
        assert!(matches!(err, ProfileError::InvertedRange { .. }));
    }

    #[test]
    fn rejects_probability_out_of_range() {
        let err = DelayProfile::new("odd", 0.1, 0.2, 1.5).unwrap_err();
        assert!(matches!(err, ProfileError::InvalidTypoProbability { .. }));
        let err = DelayProfile::new("odd", -0.1, 0.2, 0.5).unwrap_err();
        assert!(matches!(err, ProfileError::InvalidBounds { .. }));
    }

    #[test]
    fn unknown_style_falls_back_to_average() {
        let profiles = default_profiles();
        assert_eq!(select_profile(&profiles, "turbo").unwrap().name, "average");
        assert_eq!(select_profile(&profiles, "fast").unwrap().name, "fast");
    }
}
