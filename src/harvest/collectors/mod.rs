//! Built-in platform collectors.
//!
//! Each platform module exposes its registry defaults and a
//! [`ChartSource`](crate::harvest::traits::ChartSource) implementation; this
//! module wires them into a [`CollectorRegistry`] using the loaded
//! [`Settings`].

pub mod apple_music;
pub mod audiomack;
pub mod boomplay;
pub mod deezer;
pub mod extract;
pub mod http;
pub mod turntable;

use crate::config::{ConfigurationError, Settings, StreamEstimate};
use crate::harvest::registry::{CollectorDescriptor, CollectorRegistry};
use crate::traits::Collector;
use http::{HttpFetcher, PageFetcher};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ids of every built-in platform.
pub const PLATFORM_IDS: &[&str] = &[
    apple_music::PLATFORM_ID,
    audiomack::PLATFORM_ID,
    boomplay::PLATFORM_ID,
    deezer::PLATFORM_ID,
    turntable::PLATFORM_ID,
];

/// Everything a platform source needs at construction time.
pub struct SourceContext {
    pub fetcher: Arc<dyn PageFetcher>,
    pub api_key: Option<String>,
    pub requires_authentication: bool,
    pub streams: StreamEstimate,
}

/// Registry metadata and constructor of one built-in platform.
#[derive(Clone, Copy)]
pub struct PlatformDefaults {
    pub platform_id: &'static str,
    pub display_name: &'static str,
    pub homepage_url: &'static str,
    pub description: &'static str,
    pub requires_authentication: bool,
    pub rate_limit_per_minute: u32,
    pub build: fn(SourceContext) -> Arc<dyn Collector>,
}

pub const BUILT_IN: &[PlatformDefaults] = &[
    apple_music::DEFAULTS,
    audiomack::DEFAULTS,
    boomplay::DEFAULTS,
    deezer::DEFAULTS,
    turntable::DEFAULTS,
];

/// Registry of every enabled built-in platform, fetching over HTTP.
pub fn default_registry(settings: &Settings) -> Result<CollectorRegistry, ConfigurationError> {
    registry_with_fetchers(settings, |platform, rate| {
        let fetcher = HttpFetcher::new(platform, &settings.harvest, rate)?;
        Ok(Arc::new(fetcher) as Arc<dyn PageFetcher>)
    })
}

/// Builds the registry with fetchers produced by `make_fetcher`, which is
/// called with each platform id and its effective rate limit.
///
/// # Errors
///
/// Returns [`ConfigurationError::EmptyRegistry`] when every platform is
/// disabled, or whatever registration or fetcher construction reports.
pub fn registry_with_fetchers<F>(
    settings: &Settings,
    mut make_fetcher: F,
) -> Result<CollectorRegistry, ConfigurationError>
where
    F: FnMut(&str, u32) -> Result<Arc<dyn PageFetcher>, ConfigurationError>,
{
    for configured in settings.platforms.keys() {
        if !PLATFORM_IDS.contains(&configured.as_str()) {
            warn!(platform = %configured, "Settings name an unknown platform, ignoring");
        }
    }

    let credentials = settings.credentials();
    let mut registry = CollectorRegistry::new();

    for defaults in BUILT_IN {
        let id = defaults.platform_id;
        if !settings.is_enabled(id) {
            info!(platform = id, "Platform disabled");
            continue;
        }

        let overrides = settings.platform(id);
        let rate = overrides
            .and_then(|p| p.rate_limit_per_minute)
            .unwrap_or(defaults.rate_limit_per_minute);
        let requires_authentication = overrides
            .and_then(|p| p.requires_authentication)
            .unwrap_or(defaults.requires_authentication);

        let context = SourceContext {
            fetcher: make_fetcher(id, rate)?,
            api_key: credentials.api_key(id).map(str::to_string),
            requires_authentication,
            streams: settings.streams.clone(),
        };

        registry.register(CollectorDescriptor {
            platform_id: id.to_string(),
            display_name: defaults.display_name.to_string(),
            homepage_url: defaults.homepage_url.to_string(),
            description: defaults.description.to_string(),
            requires_authentication,
            rate_limit_per_minute: rate,
            collector: (defaults.build)(context),
        })?;
        debug!(platform = id, rate_limit_per_minute = rate, "Registered collector");
    }

    if registry.is_empty() {
        return Err(ConfigurationError::EmptyRegistry);
    }
    Ok(registry)
}
