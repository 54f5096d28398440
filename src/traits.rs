use crate::model::PlatformSnapshot;
use async_trait::async_trait;
use std::num::NonZeroUsize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },
    #[error("Failed to parse response: {0}")]
    Parse(String),
    #[error("Expected page marker not found: {0}")]
    MarkerNotFound(String),
    #[error("Authentication required for '{0}' but no credentials were configured")]
    MissingAuthentication(String),
    #[error("Tier unavailable: {0}")]
    TierUnavailable(String),
    #[error("Source returned no chart entries")]
    Empty,
    #[error("Mock tier misconfigured: {0}")]
    MockMisconfigured(String),
}

impl CollectionError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CollectionError::Network(_) => true,
            CollectionError::HttpStatus { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for CollectionError {
    fn from(e: serde_json::Error) -> Self {
        CollectionError::Parse(e.to_string())
    }
}

#[async_trait]
pub trait Collector: Send + Sync {
    /// Returns the registry id this collector harvests (e.g., "deezer").
    fn platform_id(&self) -> &str;

    /// Produces a snapshot of at most `limit` tracks.
    ///
    /// Implementations fall back internally; an `Err` here means even the
    /// last tier could not produce data, which is a defect rather than a
    /// runtime condition.
    async fn collect(&self, limit: NonZeroUsize) -> Result<PlatformSnapshot, CollectionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CollectionError::Network("reset".into()).is_transient());
        assert!(CollectionError::HttpStatus {
            status: 503,
            url: "u".into()
        }
        .is_transient());
        assert!(CollectionError::HttpStatus {
            status: 429,
            url: "u".into()
        }
        .is_transient());
        assert!(!CollectionError::HttpStatus {
            status: 404,
            url: "u".into()
        }
        .is_transient());
        assert!(!CollectionError::Parse("bad".into()).is_transient());
        assert!(!CollectionError::MissingAuthentication("audiomack".into()).is_transient());
    }
}
