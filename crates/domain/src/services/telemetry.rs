use std::{env, io, net::SocketAddr};

use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::hydrate_env_file;

static SUBSCRIBER_INSTALLED: OnceCell<()> = OnceCell::new();
static EXPORTER_INSTALLED: OnceCell<()> = OnceCell::new();

/// Log filter and optional Prometheus listen address for the scanner binary.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    log_filter: String,
    metrics_address: Option<String>,
}

impl TelemetryConfig {
    /// Reads `<PREFIX>_LOG_FILTER` (default `info`) and
    /// `<PREFIX>_METRICS_ADDRESS` (unset or blank disables the exporter).
    pub fn from_env(prefix: &str) -> Self {
        let _ = hydrate_env_file();
        let upper = prefix.trim().to_ascii_uppercase();

        let log_filter =
            env::var(format!("{upper}_LOG_FILTER")).unwrap_or_else(|_| "info".to_string());
        let metrics_address = env::var(format!("{upper}_METRICS_ADDRESS"))
            .ok()
            .filter(|value| !value.trim().is_empty());

        Self {
            log_filter,
            metrics_address,
        }
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn metrics_address(&self) -> Option<&str> {
        self.metrics_address.as_deref()
    }

    pub fn metrics_socket(&self) -> Result<Option<SocketAddr>, TelemetryError> {
        self.metrics_address()
            .map(|addr| {
                addr.trim().parse().map_err(|err: std::net::AddrParseError| {
                    TelemetryError::InvalidMetricsAddress(addr.to_string(), err.to_string())
                })
            })
            .transpose()
    }
}

/// Installs the stderr log subscriber and, when an address is configured,
/// the Prometheus scrape endpoint. Must run inside the tokio runtime, which
/// hosts the exporter's listener. Repeated calls are no-ops.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    install_tracing(config)?;
    install_exporter(config)
}

fn install_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_new(config.log_filter())
        .map_err(|err| TelemetryError::InvalidLogFilter(err.to_string()))?;

    if SUBSCRIBER_INSTALLED.set(()).is_ok() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(io::stderr),
            )
            .try_init()
            .map_err(|err| TelemetryError::Tracing(err.to_string()))?;
    }

    Ok(())
}

fn install_exporter(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let Some(socket) = config.metrics_socket()? else {
        return Ok(());
    };

    EXPORTER_INSTALLED
        .get_or_try_init(|| {
            PrometheusBuilder::new()
                .with_http_listener(socket)
                .install()
                .map_err(|err| TelemetryError::Metrics(err.to_string()))
        })
        .map(|_| ())
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("invalid metrics address `{0}`: {1}")]
    InvalidMetricsAddress(String, String),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
