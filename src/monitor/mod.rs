// Monitor facade module
//
// Explicitly constructed entry point owning the metric registry, the
// dependency checkers and the configuration. Hosts build one Monitor at
// startup, hand its filter to the request pipeline, and use the manual
// event API for instrumentation outside the pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::checker::{DependencyCheckers, DependencyState};
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::filter::MetricsFilter;
use crate::labels::{DependencyEvent, RequestEvent};
use crate::registry::{MetricRegistry, MetricUnit};

/// Version tag published when the host supplies none
const VERSION_NOT_SET: &str = "not-set";

/// Elapsed time since `start`, in fractional seconds
pub fn elapsed_seconds(start: Instant) -> f64 {
    start.elapsed().as_secs_f64()
}

/// Instrumentation entry point
pub struct Monitor {
    config: MonitorConfig,
    registry: Arc<MetricRegistry>,
    checkers: DependencyCheckers,
}

impl Monitor {
    /// Build a monitor from configuration
    ///
    /// Parses the bucket list exactly once; a malformed list fails here,
    /// never on a recording path.
    pub fn new(config: MonitorConfig) -> Result<Self, MonitorError> {
        let buckets = config.bucket_values()?;
        let registry = Arc::new(MetricRegistry::new(buckets)?);
        let checkers = DependencyCheckers::new(Arc::clone(&registry));

        Ok(Self {
            config,
            registry,
            checkers,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Shared handle to the metric registry
    pub fn metric_registry(&self) -> Arc<MetricRegistry> {
        Arc::clone(&self.registry)
    }

    /// The prometheus registry for the host's scrape endpoint
    pub fn prometheus_registry(&self) -> &prometheus::Registry {
        self.registry.prometheus_registry()
    }

    /// Build the filter pipeline entry points
    pub fn filter(&self) -> MetricsFilter {
        MetricsFilter::new(Arc::clone(&self.registry), &self.config)
    }

    /// Startup hook: publish the application-info gauge once
    pub fn publish_application_info(&self, version: Option<&str>) {
        self.registry
            .set_application_info(version.unwrap_or(VERSION_NOT_SET));
    }

    /// Record a request event outside the filter pipeline
    pub fn add_request_event(&self, event: &RequestEvent, elapsed_seconds: f64) {
        self.registry
            .record_request_duration(event, elapsed_seconds, None, MetricUnit::default());
    }

    /// Record a request event with an explicit bucket list and unit
    pub fn add_request_event_with_buckets(
        &self,
        event: &RequestEvent,
        elapsed_seconds: f64,
        buckets: &[f64],
        unit: MetricUnit,
    ) {
        self.registry
            .record_request_duration(event, elapsed_seconds, Some(buckets), unit);
    }

    /// Record a dependency event outside the filter pipeline
    pub fn add_dependency_event(&self, event: &DependencyEvent, elapsed_seconds: f64) {
        self.registry
            .record_dependency_duration(event, elapsed_seconds, None, MetricUnit::default());
    }

    /// Record a dependency event with an explicit bucket list and unit
    pub fn add_dependency_event_with_buckets(
        &self,
        event: &DependencyEvent,
        elapsed_seconds: f64,
        buckets: &[f64],
        unit: MetricUnit,
    ) {
        self.registry
            .record_dependency_duration(event, elapsed_seconds, Some(buckets), unit);
    }

    /// Schedule a periodic dependency probe
    ///
    /// Re-registering a name cancels the previous checker first.
    pub fn add_dependency_checker<F>(&self, name: &str, probe: F, period: Duration)
    where
        F: Fn() -> DependencyState + Send + 'static,
    {
        self.checkers.add(name, probe, period);
    }

    /// Cancel a scheduled checker; a no-op for unknown names
    pub fn cancel_dependency_checker(&self, name: &str) {
        self.checkers.cancel(name);
    }

    /// Cancel every scheduled checker
    pub fn cancel_all_dependency_checkers(&self) {
        self.checkers.cancel_all();
    }

    /// Read-only snapshot of the scheduled checker names
    pub fn list_of_checkers_scheduled(&self) -> Vec<String> {
        self.checkers.scheduled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{APPLICATION_INFO, DEPENDENCY_REQUEST, REQUEST};

    fn monitor() -> Monitor {
        Monitor::new(MonitorConfig::default()).unwrap()
    }

    #[test]
    fn test_malformed_buckets_fail_at_construction() {
        let config = MonitorConfig {
            buckets: "0.1, oops".to_string(),
            ..Default::default()
        };
        assert!(Monitor::new(config).is_err());
    }

    #[test]
    fn test_manual_request_event() {
        let monitor = monitor();
        let event = RequestEvent::new(200, "GET", "/manual");

        monitor.add_request_event(&event, 0.02);

        let registry = monitor.metric_registry();
        assert_eq!(
            registry.timer_sample_count(REQUEST, &["http", "200", "GET", "/manual", "false", ""]),
            1
        );
    }

    #[test]
    fn test_manual_dependency_event_with_buckets() {
        let monitor = monitor();
        let event = DependencyEvent::new("queue", 200, "POST", "/enqueue");

        monitor.add_dependency_event_with_buckets(&event, 0.5, &[0.1, 1.0], MetricUnit::Seconds);

        let registry = monitor.metric_registry();
        assert_eq!(
            registry.timer_sample_count(
                DEPENDENCY_REQUEST,
                &["queue", "http", "200", "POST", "/enqueue", "false", ""]
            ),
            1
        );

        // Buckets stayed in seconds for the Seconds unit
        let families = monitor.prometheus_registry().gather();
        let family = families
            .iter()
            .find(|f| f.get_name() == DEPENDENCY_REQUEST)
            .unwrap();
        let bounds: Vec<f64> = family.get_metric()[0]
            .get_histogram()
            .get_bucket()
            .iter()
            .map(|b| b.get_upper_bound())
            .collect();
        assert_eq!(bounds, vec![0.1, 1.0]);
    }

    #[test]
    fn test_publish_application_info_defaults_version() {
        let monitor = monitor();
        monitor.publish_application_info(None);

        let families = monitor.prometheus_registry().gather();
        let family = families
            .iter()
            .find(|f| f.get_name() == APPLICATION_INFO)
            .unwrap();
        let metric = &family.get_metric()[0];
        assert_eq!(metric.get_label()[0].get_value(), "not-set");
        assert_eq!(metric.get_gauge().get_value(), 1.0);
    }

    #[test]
    fn test_checker_api_round_trip() {
        let monitor = monitor();

        monitor.add_dependency_checker("db", || DependencyState::Up, Duration::from_millis(10));
        assert_eq!(monitor.list_of_checkers_scheduled(), vec!["db".to_string()]);

        monitor.cancel_dependency_checker("db");
        assert!(monitor.list_of_checkers_scheduled().is_empty());

        // Unknown names are safe
        monitor.cancel_dependency_checker("db");
        monitor.cancel_all_dependency_checkers();
    }

    #[test]
    fn test_elapsed_seconds_is_nonnegative_and_small_for_fresh_instant() {
        let start = Instant::now();
        let elapsed = elapsed_seconds(start);
        assert!(elapsed >= 0.0);
        assert!(elapsed < 1.0);
    }
}
