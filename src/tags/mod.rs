// Tag canonicalization module
//
// Pure string transforms shared by the label extractor and the filter
// pipeline: label-key sanitization, application error-message extraction
// and the two status-code predicates.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Characters not allowed in a label key
fn invalid_key_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("[^a-zA-Z0-9_]").expect("valid tag key pattern"))
}

/// Sanitize an arbitrary string into a stable, valid label key
///
/// The input is snake-cased, every character outside `[A-Za-z0-9_]` is
/// replaced with `_`, and a `m_` marker is prepended when the result does
/// not start with a letter. Total over all inputs (including the empty
/// string) and idempotent.
pub fn sanitize_label_key(raw: &str) -> String {
    let snake = to_snake_case(raw);
    let sanitized = invalid_key_chars().replace_all(&snake, "_");

    match sanitized.chars().next() {
        Some(first) if first.is_ascii_alphabetic() => sanitized.into_owned(),
        _ => format!("m_{}", sanitized),
    }
}

/// Convert camelCase boundaries to snake_case
fn to_snake_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_lower_or_digit = false;

    for c in input.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower_or_digit {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower_or_digit = false;
        } else {
            prev_lower_or_digit = c.is_ascii_lowercase() || c.is_ascii_digit();
            out.push(c);
        }
    }

    out
}

/// Extract the application error message for a finished exchange
///
/// Precedence: the response header named by `key` if present, else the
/// request-scoped message, else the empty string. The same rule applies to
/// inbound requests and outbound dependency calls.
pub fn extract_error_message(
    response_headers: &HashMap<String, String>,
    request_message: Option<&str>,
    key: &str,
) -> String {
    if let Some(value) = header_value(response_headers, key) {
        return value.to_string();
    }

    request_message.unwrap_or("").to_string()
}

/// Case-insensitive header lookup
fn header_value<'a>(headers: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    if let Some(value) = headers.get(key) {
        return Some(value.as_str());
    }

    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Whether a response status classifies the request itself as an error
///
/// This is the label predicate only. Dependency health uses the wider
/// `is_dependency_up` threshold; the two intentionally disagree (404 is a
/// request error, but a dependency answering 404 is UP).
pub fn is_request_error(status: u16) -> bool {
    status < 200 || status >= 400
}

/// Whether a dependency response status counts as the dependency being UP
pub fn is_dependency_up(status: u16) -> bool {
    (200..500).contains(&status)
}
