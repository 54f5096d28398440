//! Collector registry.
//!
//! A typed map from platform id to [`CollectorDescriptor`], filled once at
//! startup. Registration validates each descriptor so that configuration
//! mistakes stop the process before any harvest runs.

use crate::config::ConfigurationError;
use crate::traits::Collector;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Registry entry: platform metadata plus the collector capability.
#[derive(Clone, Serialize)]
pub struct CollectorDescriptor {
    pub platform_id: String,
    pub display_name: String,
    pub homepage_url: String,
    pub description: String,
    pub requires_authentication: bool,
    pub rate_limit_per_minute: u32,
    #[serde(skip)]
    pub collector: Arc<dyn Collector>,
}

impl fmt::Debug for CollectorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorDescriptor")
            .field("platform_id", &self.platform_id)
            .field("display_name", &self.display_name)
            .field("homepage_url", &self.homepage_url)
            .field("requires_authentication", &self.requires_authentication)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .finish_non_exhaustive()
    }
}

impl CollectorDescriptor {
    fn validate(&self) -> Result<(), ConfigurationError> {
        let missing = |field| ConfigurationError::MissingField {
            platform: self.platform_id.clone(),
            field,
        };
        if self.platform_id.trim().is_empty() {
            return Err(missing("platform_id"));
        }
        if self.display_name.trim().is_empty() {
            return Err(missing("display_name"));
        }
        if self.homepage_url.trim().is_empty() {
            return Err(missing("homepage_url"));
        }
        if self.rate_limit_per_minute == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: format!("{}.rate_limit_per_minute", self.platform_id),
                reason: "must be positive".to_string(),
            });
        }
        if self.collector.platform_id() != self.platform_id {
            return Err(ConfigurationError::InvalidValue {
                field: format!("{}.collector", self.platform_id),
                reason: format!("collector harvests '{}'", self.collector.platform_id()),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct CollectorRegistry {
    entries: BTreeMap<String, CollectorDescriptor>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicatePlatform`] if the id is already
    /// registered, or a field error if the descriptor is incomplete.
    pub fn register(&mut self, descriptor: CollectorDescriptor) -> Result<(), ConfigurationError> {
        descriptor.validate()?;
        if self.entries.contains_key(&descriptor.platform_id) {
            return Err(ConfigurationError::DuplicatePlatform(descriptor.platform_id));
        }
        self.entries.insert(descriptor.platform_id.clone(), descriptor);
        Ok(())
    }

    pub fn get(&self, platform_id: &str) -> Option<&CollectorDescriptor> {
        self.entries.get(platform_id)
    }

    /// Descriptors ordered by platform id.
    pub fn list(&self) -> Vec<&CollectorDescriptor> {
        self.entries.values().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
