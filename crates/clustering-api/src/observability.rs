//! Tracing and Prometheus initialization.

use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};
use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Install the global tracing subscriber and build the Prometheus middleware.
/// The metrics endpoint is served at `/metrics`.
pub fn init_observability(namespace: &str, log_format: &LogFormat) -> Result<PrometheusMetrics> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .init(),
    }

    PrometheusMetricsBuilder::new(namespace)
        .endpoint("/metrics")
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build prometheus middleware: {e}"))
}
