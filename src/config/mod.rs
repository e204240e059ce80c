// Configuration module

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MonitorError;

/// Default histogram bucket boundaries, in seconds
fn default_buckets() -> String {
    "0.1, 0.3, 1.5, 10.5".to_string()
}

/// Default path where metrics are exposed by the host
fn default_path() -> String {
    "/metrics".to_string()
}

/// Default excluded paths (the metrics endpoint itself)
fn default_exclusions() -> String {
    "/metrics".to_string()
}

/// Default header/property key carrying an application error message
fn default_error_message_key() -> String {
    "error-info".to_string()
}

fn default_enable() -> bool {
    true
}

/// Monitor configuration
///
/// Buckets and exclusions are written by operators as comma-separated
/// strings and parsed exactly once via `bucket_values` / `exclusion_list`.
/// A malformed bucket list is a startup error, never a per-request one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Enable the instrumentation (default: true)
    #[serde(default = "default_enable")]
    pub enable: bool,

    /// Path where the host exposes the metrics (default: "/metrics")
    #[serde(default = "default_path")]
    pub path: String,

    /// Comma-separated histogram bucket boundaries in seconds
    /// (default: "0.1, 0.3, 1.5, 10.5")
    #[serde(default = "default_buckets")]
    pub buckets: String,

    /// Comma-separated paths excluded from metrics, matched
    /// case-insensitively against the normalized path (default: "/metrics")
    #[serde(default = "default_exclusions")]
    pub exclusions: String,

    /// Track cumulative response sizes from the content-length header
    /// (default: false)
    #[serde(default)]
    pub enable_http_response_size: bool,

    /// Header/property key used to propagate an application error message
    /// (default: "error-info")
    #[serde(default = "default_error_message_key")]
    pub error_message_key: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enable: default_enable(),
            path: default_path(),
            buckets: default_buckets(),
            exclusions: default_exclusions(),
            enable_http_response_size: false,
            error_message_key: default_error_message_key(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, MonitorError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MonitorError::ConfigFile(e.to_string()))?;
        let config: MonitorConfig =
            serde_yaml::from_str(&contents).map_err(|e| MonitorError::ConfigFile(e.to_string()))?;
        config.bucket_values()?;
        Ok(config)
    }

    /// Parse the configured bucket list into an ordered set of positive
    /// boundaries, in seconds.
    ///
    /// Fails fast on non-numeric entries, non-positive values, unordered
    /// boundaries, or an empty list.
    pub fn bucket_values(&self) -> Result<Vec<f64>, MonitorError> {
        let mut values = Vec::new();

        for entry in self.buckets.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let value: f64 = entry.parse().map_err(|_| {
                MonitorError::Config(format!("invalid bucket value '{}'", entry))
            })?;
            if value <= 0.0 {
                return Err(MonitorError::Config(format!(
                    "bucket value '{}' must be positive",
                    entry
                )));
            }
            if let Some(&last) = values.last() {
                if value <= last {
                    return Err(MonitorError::Config(format!(
                        "bucket values must be strictly increasing, '{}' follows '{}'",
                        value, last
                    )));
                }
            }
            values.push(value);
        }

        if values.is_empty() {
            return Err(MonitorError::Config(format!(
                "bucket list '{}' contains no values",
                self.buckets
            )));
        }

        Ok(values)
    }

    /// Parse the configured exclusion list into trimmed path entries
    pub fn exclusion_list(&self) -> Vec<String> {
        self.exclusions
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
