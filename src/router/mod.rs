// Route normalization module
//
// Converts a concrete request URL into its route template so label
// cardinality stays bounded (no raw IDs in labels), and decides whether a
// path is excluded from instrumentation entirely.

/// Route metadata the host framework provides for a matched route
///
/// This is an explicit lookup surface: the host hands over the declared
/// templates for the matched resource instead of the engine inspecting
/// anything at runtime.
#[derive(Debug, Clone, Default)]
pub struct RouteMetadata {
    /// Path template already attached to the call context, when the
    /// framework resolved one (e.g. "/orders/{id}")
    pub attached_template: Option<String>,

    /// Declared path prefix of the matched resource (e.g. "/orders")
    pub base_template: Option<String>,

    /// Declared path suffix of the matched handler (e.g. "{id}")
    pub method_template: Option<String>,
}

impl RouteMetadata {
    /// Metadata carrying only a framework-attached template
    pub fn attached(template: &str) -> Self {
        Self {
            attached_template: Some(template.to_string()),
            ..Default::default()
        }
    }

    /// Metadata carrying declared resource/handler templates
    pub fn declared(base: &str, method: &str) -> Self {
        Self {
            attached_template: None,
            base_template: Some(base.to_string()),
            method_template: Some(method.to_string()),
        }
    }
}

/// Resolve the normalized path for a request
///
/// Resolution order:
/// 1. the framework-attached template, when present;
/// 2. the declared base + method templates, joined with exactly one slash
///    and with accidental double slashes collapsed;
/// 3. the raw request path (unmatched routes, errors before routing).
pub fn resolve_template(route: Option<&RouteMetadata>, raw_path: &str) -> String {
    let Some(route) = route else {
        return raw_path.to_string();
    };

    if let Some(template) = &route.attached_template {
        return template.clone();
    }

    let base = route.base_template.as_deref().unwrap_or("");
    let method = route.method_template.as_deref().unwrap_or("");

    if base.is_empty() && method.is_empty() {
        return raw_path.to_string();
    }

    // A lone "/" base would duplicate the method template's leading slash
    let mut joined = if base == "/" { String::new() } else { base.to_string() };

    if !method.is_empty() {
        if !method.starts_with('/') {
            joined.push('/');
        }
        joined.push_str(method);
    }

    let collapsed = joined.replace("//", "/");
    if collapsed.is_empty() {
        raw_path.to_string()
    } else {
        collapsed
    }
}

/// Whether a normalized path is excluded from metrics
///
/// Exclusion is an exact, case-insensitive match against the configured
/// list. Excluded requests must produce no observations at all.
pub fn is_excluded(path: &str, exclusions: &[String]) -> bool {
    exclusions.iter().any(|entry| entry.eq_ignore_ascii_case(path))
}
