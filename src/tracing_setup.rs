//! Logging setup for hosts embedding the engine
//!
//! The library only emits `tracing` events; binaries and batch jobs that
//! have no subscriber of their own can call [`init_tracing`].
//!
//! Configuration via environment variables:
//! - RUST_LOG: Log level filter (default: info)
//! - EXPERIMENT_LOG_FORMAT: `compact` for single-line output (default: full)

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global fmt subscriber filtered by `RUST_LOG`
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let compact = std::env::var("EXPERIMENT_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("compact"))
        .unwrap_or(false);

    if compact {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact().with_target(false))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Experiment engine tracing initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_errors_instead_of_panicking() {
        let _ = init_tracing();
        assert!(init_tracing().is_err());
    }
}
