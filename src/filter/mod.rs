// Filter pipeline module
//
// The four interception points that correlate a request's "before" and
// "after" stages. Correlation state travels in a typed per-request
// context instead of a stringly-keyed property bag; the context lives for
// exactly one request/response round trip and is never shared.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::MonitorConfig;
use crate::labels::{self, DependencyEvent, RequestEvent};
use crate::monitor::elapsed_seconds;
use crate::registry::{MetricRegistry, MetricUnit};
use crate::router::{self, RouteMetadata};
use crate::tags;

/// Per-request correlation state
///
/// Written by the "before" stage, read by the matching "after" stage of
/// the same request. `error_message` is the one application-writable
/// field: handlers store their error description here and it ends up in
/// the errorMessage label (unless the response carries the configured
/// error header, which wins).
#[derive(Debug, Default)]
pub struct MetricsContext {
    valid_for_metrics: bool,
    normalized_path: Option<String>,
    start: Option<Instant>,
    status_code: Option<u16>,
    pub error_message: Option<String>,
}

impl MetricsContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the "before" stage marked this request as measurable
    pub fn valid_for_metrics(&self) -> bool {
        self.valid_for_metrics
    }

    /// The route template resolved by the "before" stage
    pub fn normalized_path(&self) -> Option<&str> {
        self.normalized_path.as_deref()
    }

    /// Status code recorded by the "after" stage
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }
}

/// Inbound request data the host hands to the pipeline
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub method: String,
    pub path: String,
    pub route: Option<RouteMetadata>,
}

/// Inbound response data the host hands to the pipeline
#[derive(Debug, Clone, Default)]
pub struct InboundResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
}

/// Outbound dependency-call request data
#[derive(Debug, Clone, Default)]
pub struct OutboundRequest {
    pub method: String,
    pub path: String,
    pub route: Option<RouteMetadata>,
    /// Explicit per-call dependency name, when the call site declares one
    pub dependency_name: Option<String>,
    /// Explicit per-call dependency address, when the call site declares one
    pub dependency_address: Option<String>,
    /// Type name of the invoked client interface
    pub client_name: Option<String>,
}

/// Outbound dependency-call response data
#[derive(Debug, Clone, Default)]
pub struct OutboundResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
}

/// The four filter entry points
///
/// Every stage is best-effort: nothing here may fail or delay the request
/// it observes.
pub struct MetricsFilter {
    registry: Arc<MetricRegistry>,
    enabled: bool,
    exclusions: Vec<String>,
    error_message_key: String,
    track_response_size: bool,
}

impl MetricsFilter {
    pub fn new(registry: Arc<MetricRegistry>, config: &MonitorConfig) -> Self {
        Self {
            registry,
            enabled: config.enable,
            exclusions: config.exclusion_list(),
            error_message_key: config.error_message_key.clone(),
            track_response_size: config.enable_http_response_size,
        }
    }

    /// Inbound-before stage
    ///
    /// Resolves the route template and the exclusion flag. Excluded
    /// requests are marked invalid and no timer starts.
    pub fn on_request(&self, request: &InboundRequest, ctx: &mut MetricsContext) {
        if !self.enabled {
            return;
        }

        let normalized = router::resolve_template(request.route.as_ref(), &request.path);

        if router::is_excluded(&normalized, &self.exclusions) {
            ctx.valid_for_metrics = false;
            return;
        }

        ctx.valid_for_metrics = true;
        ctx.normalized_path = Some(normalized);
        ctx.start = Some(Instant::now());
    }

    /// Inbound-after stage
    ///
    /// A no-op unless the before stage validated the request.
    pub fn on_response(
        &self,
        request: &InboundRequest,
        response: &InboundResponse,
        ctx: &mut MetricsContext,
    ) {
        if !self.enabled || !ctx.valid_for_metrics {
            return;
        }

        let addr = ctx
            .normalized_path
            .clone()
            .unwrap_or_else(|| request.path.clone());
        let message = tags::extract_error_message(
            &response.headers,
            ctx.error_message.as_deref(),
            &self.error_message_key,
        );

        let event = RequestEvent::new(response.status, &request.method, &addr)
            .with_error_message(&message);
        ctx.status_code = Some(response.status);

        if let Some(start) = ctx.start {
            self.registry.record_request_duration(
                &event,
                elapsed_seconds(start),
                None,
                MetricUnit::default(),
            );
        }

        if self.track_response_size {
            self.registry
                .accumulate_response_size(&event, content_length(&response.headers));
        }
    }

    /// Outbound-before stage
    ///
    /// Unconditionally stamps the start instant; outbound calls have no
    /// exclusion concept.
    pub fn on_client_request(&self, ctx: &mut MetricsContext) {
        if !self.enabled {
            return;
        }

        ctx.start = Some(Instant::now());
    }

    /// Outbound-after stage
    ///
    /// Classifies dependency health first (even when no timer was
    /// started), then records the duration when a start instant exists.
    pub fn on_client_response(
        &self,
        request: &OutboundRequest,
        response: &OutboundResponse,
        ctx: &mut MetricsContext,
    ) {
        if !self.enabled {
            return;
        }

        let addr = match request.dependency_address.as_deref() {
            Some(address) if !address.trim().is_empty() => address.to_string(),
            _ => router::resolve_template(request.route.as_ref(), &request.path),
        };
        let name = labels::resolve_dependency_name(
            request.dependency_name.as_deref(),
            request.client_name.as_deref(),
            &addr,
        );

        if tags::is_dependency_up(response.status) {
            self.registry.set_dependency_up(&name);
        } else {
            self.registry.set_dependency_down(&name);
        }

        let message = tags::extract_error_message(
            &response.headers,
            ctx.error_message.as_deref(),
            &self.error_message_key,
        );
        let event = DependencyEvent::new(&name, response.status, &request.method, &addr)
            .with_error_message(&message);
        ctx.status_code = Some(response.status);

        if let Some(start) = ctx.start {
            self.registry.record_dependency_duration(
                &event,
                elapsed_seconds(start),
                None,
                MetricUnit::default(),
            );
        }
    }
}

/// Response size from the content-length header, zero when absent
fn content_length(headers: &HashMap<String, String>) -> u64 {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DEPENDENCY_REQUEST, REQUEST};

    fn setup(config: MonitorConfig) -> (Arc<MetricRegistry>, MetricsFilter) {
        let registry = Arc::new(MetricRegistry::new(config.bucket_values().unwrap()).unwrap());
        let filter = MetricsFilter::new(Arc::clone(&registry), &config);
        (registry, filter)
    }

    fn inbound(method: &str, path: &str, route: Option<RouteMetadata>) -> InboundRequest {
        InboundRequest {
            method: method.to_string(),
            path: path.to_string(),
            route,
        }
    }

    #[test]
    fn test_request_round_trip_records_one_observation() {
        let (registry, filter) = setup(MonitorConfig::default());
        let request = inbound("GET", "/orders/123", Some(RouteMetadata::attached("/orders/{id}")));
        let mut ctx = MetricsContext::new();

        filter.on_request(&request, &mut ctx);
        assert!(ctx.valid_for_metrics());
        assert_eq!(ctx.normalized_path(), Some("/orders/{id}"));

        let response = InboundResponse {
            status: 201,
            headers: HashMap::new(),
        };
        filter.on_response(&request, &response, &mut ctx);

        assert_eq!(ctx.status_code(), Some(201));
        assert_eq!(
            registry.timer_sample_count(
                REQUEST,
                &["http", "201", "GET", "/orders/{id}", "false", ""]
            ),
            1
        );
    }

    #[test]
    fn test_excluded_path_records_nothing() {
        let config = MonitorConfig {
            exclusions: "/health".to_string(),
            ..Default::default()
        };
        let (registry, filter) = setup(config);
        let request = inbound("GET", "/health", None);
        let mut ctx = MetricsContext::new();

        filter.on_request(&request, &mut ctx);
        assert!(!ctx.valid_for_metrics());
        assert!(ctx.start.is_none());

        let response = InboundResponse {
            status: 200,
            headers: HashMap::new(),
        };
        filter.on_response(&request, &response, &mut ctx);

        assert_eq!(ctx.status_code(), None);
        assert_eq!(
            registry.timer_sample_count(REQUEST, &["http", "200", "GET", "/health", "false", ""]),
            0
        );
    }

    #[test]
    fn test_disabled_filter_is_inert() {
        let config = MonitorConfig {
            enable: false,
            ..Default::default()
        };
        let (registry, filter) = setup(config);
        let request = inbound("GET", "/orders/1", None);
        let mut ctx = MetricsContext::new();

        filter.on_request(&request, &mut ctx);
        assert!(!ctx.valid_for_metrics());

        filter.on_client_request(&mut ctx);
        assert!(ctx.start.is_none());

        let response = OutboundResponse {
            status: 503,
            headers: HashMap::new(),
        };
        filter.on_client_response(&OutboundRequest::default(), &response, &mut ctx);
        assert_eq!(registry.dependency_state(""), None);
    }

    #[test]
    fn test_error_response_labels_and_header_message() {
        let (registry, filter) = setup(MonitorConfig::default());
        let request = inbound("POST", "/orders", Some(RouteMetadata::attached("/orders")));
        let mut ctx = MetricsContext::new();
        ctx.error_message = Some("handler message".to_string());

        filter.on_request(&request, &mut ctx);

        let mut headers = HashMap::new();
        headers.insert("error-info".to_string(), "quota exceeded".to_string());
        let response = InboundResponse {
            status: 429,
            headers,
        };
        filter.on_response(&request, &response, &mut ctx);

        // The response header wins over the context message
        assert_eq!(
            registry.timer_sample_count(
                REQUEST,
                &["http", "429", "POST", "/orders", "true", "quota exceeded"]
            ),
            1
        );
    }

    #[test]
    fn test_dependency_call_records_health_and_duration() {
        let (registry, filter) = setup(MonitorConfig::default());
        let mut ctx = MetricsContext::new();

        filter.on_client_request(&mut ctx);

        let request = OutboundRequest {
            method: "POST".to_string(),
            path: "/billing/charge/42".to_string(),
            route: Some(RouteMetadata::attached("/billing/charge/{id}")),
            dependency_name: Some("billing".to_string()),
            ..Default::default()
        };
        let response = OutboundResponse {
            status: 503,
            headers: HashMap::new(),
        };
        filter.on_client_response(&request, &response, &mut ctx);

        assert_eq!(registry.dependency_state("billing"), Some(0));
        assert_eq!(
            registry.timer_sample_count(
                DEPENDENCY_REQUEST,
                &["billing", "http", "503", "POST", "/billing/charge/{id}", "true", ""]
            ),
            1
        );
    }

    #[test]
    fn test_dependency_health_evaluated_without_start_instant() {
        let (registry, filter) = setup(MonitorConfig::default());
        // No on_client_request call: no timer, health still published
        let mut ctx = MetricsContext::new();

        let request = OutboundRequest {
            method: "GET".to_string(),
            path: "/billing".to_string(),
            dependency_name: Some("billing".to_string()),
            ..Default::default()
        };
        let response = OutboundResponse {
            status: 200,
            headers: HashMap::new(),
        };
        filter.on_client_response(&request, &response, &mut ctx);

        assert_eq!(registry.dependency_state("billing"), Some(1));
        assert_eq!(
            registry.timer_sample_count(
                DEPENDENCY_REQUEST,
                &["billing", "http", "200", "GET", "/billing", "false", ""]
            ),
            0
        );
    }

    #[test]
    fn test_sub_200_status_marks_dependency_down() {
        let (registry, filter) = setup(MonitorConfig::default());
        let mut ctx = MetricsContext::new();

        let request = OutboundRequest {
            method: "GET".to_string(),
            path: "/stream".to_string(),
            dependency_name: Some("streamer".to_string()),
            ..Default::default()
        };
        let response = OutboundResponse {
            status: 101,
            headers: HashMap::new(),
        };
        filter.on_client_response(&request, &response, &mut ctx);

        assert_eq!(registry.dependency_state("streamer"), Some(0));
    }

    #[test]
    fn test_explicit_dependency_address_wins_over_path() {
        let (registry, filter) = setup(MonitorConfig::default());
        let mut ctx = MetricsContext::new();
        filter.on_client_request(&mut ctx);

        let request = OutboundRequest {
            method: "GET".to_string(),
            path: "/internal/raw/9".to_string(),
            dependency_address: Some("billing.internal".to_string()),
            client_name: Some("BillingClient".to_string()),
            ..Default::default()
        };
        let response = OutboundResponse {
            status: 200,
            headers: HashMap::new(),
        };
        filter.on_client_response(&request, &response, &mut ctx);

        assert_eq!(
            registry.timer_sample_count(
                DEPENDENCY_REQUEST,
                &[
                    "billing_client",
                    "http",
                    "200",
                    "GET",
                    "billing.internal",
                    "false",
                    ""
                ]
            ),
            1
        );
    }

    #[test]
    fn test_response_size_tracking_accumulates_content_length() {
        let config = MonitorConfig {
            enable_http_response_size: true,
            ..Default::default()
        };
        let (registry, filter) = setup(config);
        let request = inbound("GET", "/orders/7", Some(RouteMetadata::attached("/orders/{id}")));

        for length in ["1024", "2048"] {
            let mut ctx = MetricsContext::new();
            filter.on_request(&request, &mut ctx);

            let mut headers = HashMap::new();
            headers.insert("Content-Length".to_string(), length.to_string());
            let response = InboundResponse {
                status: 200,
                headers,
            };
            filter.on_response(&request, &response, &mut ctx);
        }

        let event = RequestEvent::new(200, "GET", "/orders/{id}");
        assert_eq!(registry.response_size_value(&event), 3072);
    }

    #[test]
    fn test_missing_content_length_accumulates_zero() {
        let config = MonitorConfig {
            enable_http_response_size: true,
            ..Default::default()
        };
        let (registry, filter) = setup(config);
        let request = inbound("GET", "/orders/7", Some(RouteMetadata::attached("/orders/{id}")));
        let mut ctx = MetricsContext::new();

        filter.on_request(&request, &mut ctx);
        let response = InboundResponse {
            status: 200,
            headers: HashMap::new(),
        };
        filter.on_response(&request, &response, &mut ctx);

        let event = RequestEvent::new(200, "GET", "/orders/{id}");
        assert_eq!(registry.response_size_value(&event), 0);
    }
}
