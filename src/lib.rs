// http-monitor instrumentation library
//
// Prometheus metrics for inbound requests, outbound dependency calls and
// periodic dependency health checks, behind a single Monitor entry point.

pub mod checker;
pub mod config;
pub mod error;
pub mod filter;
pub mod labels;
pub mod logging;
pub mod monitor;
pub mod registry;
pub mod router;
pub mod tags;

pub use checker::DependencyState;
pub use config::MonitorConfig;
pub use error::MonitorError;
pub use filter::{MetricsContext, MetricsFilter};
pub use labels::{DependencyEvent, RequestEvent};
pub use monitor::Monitor;
pub use registry::MetricUnit;
