//! Observability infrastructure: tracing and metrics.
//!
//! This module provides the foundational observability layer for BERTH.
//! The daemon must initialize it once at startup before any other operations.

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Port the Prometheus scrape endpoint listens on.
pub const METRICS_PORT: u16 = 9184;

/// Initialize the global observability infrastructure.
///
/// # Panics
/// Panics if called more than once.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
        .init();

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], METRICS_PORT))
        .install()?;

    tracing::info!("Observability initialized (metrics on :{})", METRICS_PORT);

    Ok(())
}
