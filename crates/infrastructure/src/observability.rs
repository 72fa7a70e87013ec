//! Logging and metrics setup for the scheduler daemon

use anyhow::{Context, Result};
use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use scheduler_config::LogFormat;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber. `RUST_LOG` overrides `log_level`.
pub fn init_logging(log_level: &str, log_format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        LogFormat::Pretty => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
    }

    Ok(())
}

/// Install the Prometheus exporter with an HTTP listener on `bind_address`
pub fn init_metrics(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("Invalid metrics bind address: {bind_address}"))?;

    let (recorder, exporter) = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create Prometheus exporter: {}", e))?;

    metrics::set_global_recorder(recorder)
        .map_err(|e| anyhow::anyhow!("Failed to install metrics recorder: {}", e))?;
    tokio::spawn(exporter);

    info!("Prometheus metrics exporter listening on {}", addr);
    Ok(())
}

/// Metric handles for the poll loop
///
/// Without an installed recorder every handle is a no-op, so tests and the
/// operator CLI can construct this freely.
#[derive(Clone)]
pub struct SchedulerMetrics {
    ticks_total: Counter,
    jobs_dispatched_total: Counter,
    jobs_failed_total: Counter,
    jobs_deferred_total: Counter,
    jobs_dropped_total: Counter,
    dispatch_duration: Histogram,
    batch_size: Gauge,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self {
            ticks_total: counter!("scheduler_ticks_total"),
            jobs_dispatched_total: counter!("scheduler_jobs_dispatched_total"),
            jobs_failed_total: counter!("scheduler_jobs_failed_total"),
            jobs_deferred_total: counter!("scheduler_jobs_deferred_total"),
            jobs_dropped_total: counter!("scheduler_jobs_dropped_total"),
            dispatch_duration: histogram!("scheduler_dispatch_duration_seconds"),
            batch_size: gauge!("scheduler_batch_size"),
        }
    }

    pub fn record_tick(&self) {
        self.ticks_total.increment(1);
    }

    pub fn record_dispatch(&self, duration_seconds: f64, batch_size: usize) {
        self.jobs_dispatched_total.increment(1);
        self.dispatch_duration.record(duration_seconds);
        self.batch_size.set(batch_size as f64);
    }

    pub fn record_failure(&self) {
        self.jobs_failed_total.increment(1);
    }

    pub fn record_deferral(&self) {
        self.jobs_deferred_total.increment(1);
    }

    pub fn record_drop(&self) {
        self.jobs_dropped_total.increment(1);
    }
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
