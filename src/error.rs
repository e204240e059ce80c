// Error types module

use thiserror::Error;

/// Centralized error type for the monitor
///
/// Configuration problems surface here once, at construction time.
/// Recording paths never return errors: instrumentation must not fail
/// the request it is observing, so internal failures degrade to logged
/// no-ops instead.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Malformed bucket list or other invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// A metric could not be built or registered with the backend
    #[error("Metric registration error: {0}")]
    Registration(#[from] prometheus::Error),

    /// Configuration file could not be read or parsed
    #[error("Configuration file error: {0}")]
    ConfigFile(String),
}
