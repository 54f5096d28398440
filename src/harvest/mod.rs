//! Harvest module - tiered chart collection and harvest cycles.
//!
//! This module provides the core of the chart harvester:
//! - **Traits**: [`ChartSource`] per-platform tiers and the [`TieredCollector`] fallback chain
//! - **Registry**: Platform metadata and collectors via [`CollectorRegistry`]
//! - **Collectors**: The built-in platform adapters and HTTP plumbing
//! - **Pipeline**: Bounded, deadline-enforcing harvest cycles via [`HarvestOrchestrator`]

pub mod collectors;
pub mod pipeline;
pub mod registry;
pub mod traits;

// Re-export commonly used types
pub use traits::{normalise, ChartSource, SampleEntry, TieredCollector};

pub use registry::{CollectorDescriptor, CollectorRegistry};

pub use pipeline::{
    HarvestOrchestrator, HarvestOutcome, HarvestRequest, HarvestResult, HarvestSummary,
};

pub use collectors::{default_registry, PLATFORM_IDS};
