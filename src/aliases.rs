//! Alias -> gateway profile mapping

use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};

use crate::errors::{ApiError, Result};

/// Static mapping from alias name to the opaque profile identifier used to
/// address the remote gateway. Iteration follows document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliasConfig {
    entries: Vec<(String, String)>,
}

impl AliasConfig {
    pub fn new<I, A, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (A, P)>,
        A: Into<String>,
        P: Into<String>,
    {
        let mut config = Self::default();
        for (alias, profile) in entries {
            config.insert(alias.into(), profile.into());
        }
        config
    }

    /// The two-entry map written when no document exists yet
    pub fn default_profiles() -> Self {
        Self::new([("dev", "dev-profile"), ("prod", "prod-profile")])
    }

    /// Parse a JSON object of `alias: profile` pairs
    pub fn parse(document: &str) -> Result<Self> {
        let object: Map<String, Value> = serde_json::from_str(document)?;
        let mut config = Self::default();

        for (alias, profile) in object {
            match profile {
                Value::String(profile) => config.insert(alias, profile),
                other => {
                    return Err(ApiError::Config(format!(
                        "profile for alias '{}' must be a string, got {}",
                        alias, other
                    )));
                }
            }
        }

        Ok(config)
    }

    /// Load the document at `path`, writing the default map first when it does not exist.
    /// An unreadable or malformed document falls back to the defaults.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let defaults = Self::default_profiles();
            std::fs::write(path, defaults.to_json()?)?;
            info!("Created default alias configuration at {}", path.display());
            return Ok(defaults);
        }

        let loaded = std::fs::read_to_string(path)
            .map_err(ApiError::from)
            .and_then(|document| Self::parse(&document));

        match loaded {
            Ok(config) => {
                info!("Loaded {} aliases from {}", config.len(), path.display());
                Ok(config)
            }
            Err(e) => {
                warn!(
                    "Failed to load alias configuration from {}, using defaults: {}",
                    path.display(),
                    e
                );
                Ok(Self::default_profiles())
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let object: Map<String, Value> = self
            .entries
            .iter()
            .map(|(alias, profile)| (alias.clone(), Value::String(profile.clone())))
            .collect();
        Ok(serde_json::to_string_pretty(&object)?)
    }

    pub fn profile(&self, alias: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == alias)
            .map(|(_, profile)| profile.as_str())
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.profile(alias).is_some()
    }

    /// Alias names in document order
    pub fn aliases(&self) -> Vec<String> {
        self.entries.iter().map(|(alias, _)| alias.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(alias, profile)| (alias.as_str(), profile.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, alias: String, profile: String) {
        match self.entries.iter_mut().find(|(name, _)| *name == alias) {
            Some(entry) => entry.1 = profile,
            None => self.entries.push((alias, profile)),
        }
    }
}
