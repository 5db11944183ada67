//! Monitoring and observability
//!
//! Prometheus metrics for the alerting engine and the HTTP server that
//! exposes them for scraping.

pub mod metrics;
pub mod server;

pub use metrics::{AlertingMetrics, EngineGauges, MetricsRegistry};
pub use server::{HealthProbe, MetricsServer, MetricsServerConfig};
