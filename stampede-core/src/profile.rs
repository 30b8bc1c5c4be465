use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{LoadProfile, LoadShape, Stage};
use crate::error::{Error, Result};

/// Key used when the requested profile does not exist.
pub const DEFAULT_PROFILE: &str = "basic";

/// Named, immutable load profiles.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, LoadProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `basic`, `stages` and `stress`.
    pub fn builtin() -> Self {
        let secs = Duration::from_secs;
        let mut registry = Self::new();

        registry.insert(
            LoadProfile::new(
                "basic",
                LoadShape::Constant {
                    vus: 10,
                    duration: secs(30),
                },
            )
            .with_threshold("success_rate", ["rate>0.95"])
            .with_threshold("response_time", ["p(95)<800"]),
        );

        registry.insert(
            LoadProfile::new(
                "stages",
                LoadShape::Staged {
                    stages: vec![
                        Stage::new(secs(10), 10),
                        Stage::new(secs(10), 20),
                        Stage::new(secs(10), 5),
                    ],
                },
            )
            .with_threshold("success_rate", ["rate>0.95"])
            .with_threshold("response_time", ["p(95)<800"]),
        );

        registry.insert(
            LoadProfile::new(
                "stress",
                LoadShape::Staged {
                    stages: vec![
                        Stage::new(secs(5), 50),
                        Stage::new(secs(20), 100),
                        Stage::new(secs(5), 0),
                    ],
                },
            )
            .with_threshold("success_rate", ["rate>0.90"])
            .with_threshold("response_time", ["p(95)<1500"]),
        );

        registry
    }

    /// Adds or replaces the profile under its key.
    pub fn insert(&mut self, profile: LoadProfile) -> Option<LoadProfile> {
        self.profiles.insert(profile.key.clone(), profile)
    }

    pub fn get(&self, key: &str) -> Option<&LoadProfile> {
        self.profiles.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadProfile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Profiles from `other` win on key collisions.
    pub fn merge(&mut self, other: ProfileRegistry) {
        self.profiles.extend(other.profiles);
    }
}

/// Looks up `key`, falling back to [`DEFAULT_PROFILE`] when it is unknown.
pub fn select(key: &str, registry: &ProfileRegistry) -> Result<LoadProfile> {
    if let Some(profile) = registry.get(key) {
        return Ok(profile.clone());
    }

    match registry.get(DEFAULT_PROFILE) {
        Some(profile) => {
            tracing::warn!(
                requested = key,
                fallback = DEFAULT_PROFILE,
                "unknown load profile; using the default"
            );
            Ok(profile.clone())
        }
        None => Err(Error::MissingDefaultProfile {
            requested: key.to_string(),
        }),
    }
}
