use std::error::Error;
use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Installs the global fmt subscriber, writing to stderr so stdout stays
/// free for command output.
///
/// `RUST_LOG` takes precedence over `default_filter` (usually the
/// configured `log_level`).
pub fn init_tracing(default_filter: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_reported_not_panicking() {
        let _ = init_tracing("debug");
        assert!(init_tracing("info").is_err());
    }
}
