pub mod config;
pub mod economics;
pub mod executor;
pub mod export;
pub mod harvest;
pub mod logging;
pub mod model;
pub mod report;
pub mod store;
pub mod traits;

// Re-export common types for convenience
pub use config::{ConfigurationError, Credentials, Settings};
pub use economics::{compute, EconomicImpact, EconomicParameters};
pub use executor::*;
pub use harvest::{
    CollectorDescriptor, CollectorRegistry, HarvestOrchestrator, HarvestOutcome, HarvestRequest,
    HarvestResult, HarvestSummary,
};
pub use model::*;
pub use store::{SnapshotStore, SqliteSnapshotStore, StorageError};
pub use traits::*;
