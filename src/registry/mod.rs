// Metric registry module
//
// Concurrency-safe, idempotent store mapping (metric name, label tuple) to
// a live prometheus instance. Timer vectors are created lazily on first
// record so a per-call bucket list can win the registration; every create
// is an atomic get-or-insert, and value updates are lock-free prometheus
// atomics. Recording never fails the caller: internal errors are logged
// and the observation is dropped.

use parking_lot::RwLock;
use prometheus::{HistogramOpts, HistogramVec, IntGaugeVec, Opts, Registry};
use std::collections::HashMap;

use crate::error::MonitorError;
use crate::labels::{
    self, DependencyEvent, RequestEvent, DEPENDENCY_LABEL_KEYS, REQUEST_LABEL_KEYS,
};

/// Metric name for the inbound request duration histogram
pub const REQUEST: &str = "request";
/// Metric name for the outbound dependency duration histogram
pub const DEPENDENCY_REQUEST: &str = "dependency_request";
/// Metric name for the dependency health gauge
pub const DEPENDENCY_UP: &str = "dependency_up";
/// Metric name for the cumulative response size gauge
pub const RESPONSE_SIZE: &str = "response_size";
/// Metric name for the static application info gauge
pub const APPLICATION_INFO: &str = "application_info";

const REQUEST_HELP: &str =
    "records in a histogram the number of http requests and their duration in seconds";
const DEPENDENCY_REQUEST_HELP: &str =
    "records in a histogram the number of requests of a dependency and their duration in seconds";
const DEPENDENCY_UP_HELP: &str =
    "registers whether a specific dependency is up (1) or down (0), with the dependency name in the name label";
const RESPONSE_SIZE_HELP: &str =
    "counts how much data is being sent back to the user for a given request type, from the content-length response header; zero when the header is absent";
const APPLICATION_INFO_HELP: &str =
    "holds static info of an application, such as its semantic version number";

/// Unit the bucket boundaries and recorded durations are expressed in
///
/// Bucket lists are configured in seconds and converted at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricUnit {
    #[default]
    Milliseconds,
    Seconds,
}

impl MetricUnit {
    /// Convert a duration in seconds into this unit, saturating at the
    /// numeric ceiling instead of overflowing
    pub fn from_seconds(&self, seconds: f64) -> f64 {
        const CEILING: f64 = u64::MAX as f64;

        let converted = match self {
            MetricUnit::Milliseconds => seconds * 1000.0,
            MetricUnit::Seconds => seconds,
        };

        if !converted.is_finite() || converted > CEILING {
            CEILING
        } else if converted < 0.0 {
            0.0
        } else {
            converted
        }
    }
}

/// A registered timer vector and the unit its buckets are expressed in
///
/// Both are fixed at first registration; later calls record against them
/// whatever bucket list or unit they carry.
#[derive(Clone)]
struct TimerEntry {
    vec: HistogramVec,
    unit: MetricUnit,
}

/// Owned metric store shared by the filter pipeline, the dependency
/// checkers and the manual event API
pub struct MetricRegistry {
    registry: Registry,
    default_buckets: Vec<f64>,
    timers: RwLock<HashMap<String, TimerEntry>>,
    dependency_up: IntGaugeVec,
    response_size: IntGaugeVec,
    application_info: IntGaugeVec,
}

impl MetricRegistry {
    /// Create a registry with the given default bucket boundaries (seconds)
    pub fn new(default_buckets: Vec<f64>) -> Result<Self, MonitorError> {
        let registry = Registry::new();

        let dependency_up =
            IntGaugeVec::new(Opts::new(DEPENDENCY_UP, DEPENDENCY_UP_HELP), &["name"])?;
        registry.register(Box::new(dependency_up.clone()))?;

        let response_size = IntGaugeVec::new(
            Opts::new(RESPONSE_SIZE, RESPONSE_SIZE_HELP),
            &REQUEST_LABEL_KEYS,
        )?;
        registry.register(Box::new(response_size.clone()))?;

        let application_info = IntGaugeVec::new(
            Opts::new(APPLICATION_INFO, APPLICATION_INFO_HELP),
            &["version"],
        )?;
        registry.register(Box::new(application_info.clone()))?;

        Ok(Self {
            registry,
            default_buckets,
            timers: RwLock::new(HashMap::new()),
            dependency_up,
            response_size,
            application_info,
        })
    }

    /// The underlying prometheus registry, for the host to scrape/export
    pub fn prometheus_registry(&self) -> &Registry {
        &self.registry
    }

    /// Record an inbound request duration
    pub fn record_request_duration(
        &self,
        event: &RequestEvent,
        elapsed_seconds: f64,
        buckets: Option<&[f64]>,
        unit: MetricUnit,
    ) {
        self.observe_timer(
            REQUEST,
            REQUEST_HELP,
            &REQUEST_LABEL_KEYS,
            &event.label_values(),
            elapsed_seconds,
            buckets,
            unit,
        );
    }

    /// Record an outbound dependency-call duration
    pub fn record_dependency_duration(
        &self,
        event: &DependencyEvent,
        elapsed_seconds: f64,
        buckets: Option<&[f64]>,
        unit: MetricUnit,
    ) {
        self.observe_timer(
            DEPENDENCY_REQUEST,
            DEPENDENCY_REQUEST_HELP,
            &DEPENDENCY_LABEL_KEYS,
            &event.label_values(),
            elapsed_seconds,
            buckets,
            unit,
        );
    }

    /// Mark a dependency as up
    pub fn set_dependency_up(&self, name: &str) {
        self.set_dependency(name, 1);
    }

    /// Mark a dependency as down
    pub fn set_dependency_down(&self, name: &str) {
        self.set_dependency(name, 0);
    }

    fn set_dependency(&self, name: &str, value: i64) {
        match self.dependency_up.get_metric_with_label_values(&[name]) {
            Ok(gauge) => gauge.set(value),
            Err(e) => {
                tracing::warn!(dependency = name, error = %e, "dropping dependency_up update");
            }
        }
    }

    /// Current dependency health value, if the gauge exists
    ///
    /// A pure read: unlike the recording paths it never creates a series.
    pub fn dependency_state(&self, name: &str) -> Option<i64> {
        let families = self.registry.gather();
        let family = families.iter().find(|f| f.get_name() == DEPENDENCY_UP)?;

        family
            .get_metric()
            .iter()
            .find(|metric| {
                metric
                    .get_label()
                    .iter()
                    .any(|label| label.get_name() == "name" && label.get_value() == name)
            })
            .map(|metric| metric.get_gauge().get_value() as i64)
    }

    /// Add response bytes to the running total for a label tuple
    ///
    /// The series is created on first sight; the total only ever grows.
    pub fn accumulate_response_size(&self, event: &RequestEvent, delta_bytes: u64) {
        let values = event.label_values();
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();

        match self.response_size.get_metric_with_label_values(&refs) {
            Ok(gauge) => gauge.add(delta_bytes.min(i64::MAX as u64) as i64),
            Err(e) => {
                tracing::warn!(error = %e, "dropping response_size update");
            }
        }
    }

    /// Cumulative response size for a label tuple
    pub fn response_size_value(&self, event: &RequestEvent) -> i64 {
        let values = event.label_values();
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        self.response_size
            .get_metric_with_label_values(&refs)
            .map(|gauge| gauge.get())
            .unwrap_or(0)
    }

    /// Publish the constant application-info gauge for a version tag
    ///
    /// One series per distinct version; repeating a version is a no-op.
    pub fn set_application_info(&self, version: &str) {
        match self.application_info.get_metric_with_label_values(&[version]) {
            Ok(gauge) => gauge.set(1),
            Err(e) => {
                tracing::warn!(version, error = %e, "dropping application_info update");
            }
        }
    }

    /// Number of observations recorded for a timer metric and label tuple
    pub fn timer_sample_count(&self, name: &str, values: &[&str]) -> u64 {
        let entry = match self.timers.read().get(name) {
            Some(entry) => entry.clone(),
            None => return 0,
        };

        entry
            .vec
            .get_metric_with_label_values(values)
            .map(|h| h.get_sample_count())
            .unwrap_or(0)
    }

    #[allow(clippy::too_many_arguments)]
    fn observe_timer(
        &self,
        name: &str,
        help: &str,
        keys: &[&str],
        values: &[String],
        elapsed_seconds: f64,
        buckets: Option<&[f64]>,
        unit: MetricUnit,
    ) {
        let entry = match self.timer_entry(name, help, keys, buckets, unit) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(metric = name, error = %e, "dropping timer observation");
                return;
            }
        };

        let padded = labels::padded_values(values, keys.len());
        let refs: Vec<&str> = padded.iter().map(String::as_str).collect();

        // The observation is converted with the unit the registered bucket
        // boundaries are expressed in, not the call's unit
        match entry.vec.get_metric_with_label_values(&refs) {
            Ok(histogram) => histogram.observe(entry.unit.from_seconds(elapsed_seconds)),
            Err(e) => {
                tracing::warn!(metric = name, error = %e, "dropping timer observation");
            }
        }
    }

    /// Get or create the histogram vector for a timer metric name
    ///
    /// First registration wins the bucket configuration and the unit;
    /// later calls reuse the existing vector regardless of their bucket
    /// or unit arguments.
    fn timer_entry(
        &self,
        name: &str,
        help: &str,
        keys: &[&str],
        buckets: Option<&[f64]>,
        unit: MetricUnit,
    ) -> Result<TimerEntry, MonitorError> {
        if let Some(entry) = self.timers.read().get(name) {
            return Ok(entry.clone());
        }

        let mut map = self.timers.write();
        // Double-checked: another thread may have created it between locks
        if let Some(entry) = map.get(name) {
            return Ok(entry.clone());
        }

        let bounds: Vec<f64> = buckets
            .unwrap_or(&self.default_buckets)
            .iter()
            .map(|b| unit.from_seconds(*b))
            .collect();

        let opts = HistogramOpts::new(name, help).buckets(bounds);
        let vec = HistogramVec::new(opts, keys)?;
        self.registry.register(Box::new(vec.clone()))?;

        let entry = TimerEntry { vec, unit };
        map.insert(name.to_string(), entry.clone());

        Ok(entry)
    }
}
