// Label extraction module
//
// Assembles the fixed-order label tuples for the two event kinds. Label
// keys are declared once per metric name; only the values travel with an
// event, positionally.

use crate::tags;

/// Protocol label value shared by every event
pub const PROTOCOL_HTTP: &str = "http";

/// Label keys for the request timer and response-size metrics, in order
pub const REQUEST_LABEL_KEYS: [&str; 6] =
    ["type", "status", "method", "addr", "isError", "errorMessage"];

/// Label keys for the dependency timer metric, in order
pub const DEPENDENCY_LABEL_KEYS: [&str; 7] =
    ["name", "type", "status", "method", "addr", "isError", "errorMessage"];

/// An inbound request observation
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub status: u16,
    pub method: String,
    pub addr: String,
    pub error_message: String,
}

impl RequestEvent {
    pub fn new(status: u16, method: &str, addr: &str) -> Self {
        Self {
            status,
            method: method.to_string(),
            addr: addr.to_string(),
            error_message: String::new(),
        }
    }

    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Label values in `REQUEST_LABEL_KEYS` order
    pub fn label_values(&self) -> [String; 6] {
        [
            PROTOCOL_HTTP.to_string(),
            self.status.to_string(),
            self.method.clone(),
            self.addr.clone(),
            tags::is_request_error(self.status).to_string(),
            self.error_message.clone(),
        ]
    }
}

/// An outbound dependency-call observation
#[derive(Debug, Clone)]
pub struct DependencyEvent {
    pub name: String,
    pub status: u16,
    pub method: String,
    pub addr: String,
    pub error_message: String,
}

impl DependencyEvent {
    pub fn new(name: &str, status: u16, method: &str, addr: &str) -> Self {
        Self {
            name: name.to_string(),
            status,
            method: method.to_string(),
            addr: addr.to_string(),
            error_message: String::new(),
        }
    }

    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Label values in `DEPENDENCY_LABEL_KEYS` order
    pub fn label_values(&self) -> [String; 7] {
        [
            self.name.clone(),
            PROTOCOL_HTTP.to_string(),
            self.status.to_string(),
            self.method.clone(),
            self.addr.clone(),
            tags::is_request_error(self.status).to_string(),
            self.error_message.clone(),
        ]
    }
}

/// Resolve the dependency name for an outbound call
///
/// Resolution order: the explicit per-call name, then the invoked client's
/// type name, then the normalized target path. Explicit and type names go
/// through `sanitize_label_key` so arbitrary identifiers stay stable; the
/// path fallback is used as-is, it is already a bounded template.
pub fn resolve_dependency_name(
    explicit_name: Option<&str>,
    client_name: Option<&str>,
    normalized_addr: &str,
) -> String {
    if let Some(name) = explicit_name.filter(|n| !n.trim().is_empty()) {
        return tags::sanitize_label_key(name);
    }

    if let Some(name) = client_name.filter(|n| !n.trim().is_empty()) {
        return tags::sanitize_label_key(name);
    }

    normalized_addr.to_string()
}

/// Pad a value slice to the declared key count with trailing empty strings
///
/// Label-value tuples must keep a constant length per metric name; a short
/// tuple is padded, never truncated to null.
pub fn padded_values(values: &[String], key_count: usize) -> Vec<String> {
    let mut padded: Vec<String> = values.iter().take(key_count).cloned().collect();
    padded.resize(key_count, String::new());
    padded
}
