use std::{
    sync::{Mutex, OnceLock},
    time::Instant,
};

use axum::http::StatusCode;
use metrics::{counter, describe_counter, describe_gauge};
use metrics_exporter_prometheus::{
    BuildError as PrometheusBuildError, PrometheusBuilder, PrometheusHandle,
};
use staffdir_core::{EntityKind, Profile, ServiceError};
use thiserror::Error;
use tracing_subscriber::{
    fmt::{self as tracing_fmt, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use staffdir_util::{AppConfig, Environment};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] tracing_subscriber::util::TryInitError),
    #[error("failed to initialize prometheus recorder: {0}")]
    Metrics(#[from] PrometheusBuildError),
}

static TRACING_INIT: OnceLock<()> = OnceLock::new();
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static METRICS_INSTALL_GUARD: Mutex<()> = Mutex::new(());
static START_TIME: OnceLock<Instant> = OnceLock::new();

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

fn build_git_sha() -> &'static str {
    option_env!("GIT_SHA").unwrap_or("unknown")
}

/// Installs the global subscriber: pretty output outside production, JSON in production.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryError> {
    if TRACING_INIT.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let base = tracing_fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_timer(UtcTime::rfc_3339());
    let fmt_layer = match config.environment {
        Environment::Development | Environment::Test => base.pretty().boxed(),
        Environment::Production => base.json().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    TRACING_INIT.set(()).ok();
    tracing::info!(
        stage = "telemetry",
        env = %config.environment.as_str(),
        version = BUILD_VERSION,
        git_sha = build_git_sha(),
        "tracing initialized"
    );
    Ok(())
}

/// Installs the Prometheus recorder once per process and returns its handle.
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let _guard = METRICS_INSTALL_GUARD
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    METRICS_HANDLE.set(handle.clone()).ok();

    describe_gauge!("app_build_info", "Build metadata for the running binary");
    describe_gauge!("app_uptime_seconds", "Seconds since the process started");
    describe_counter!(
        "http_requests_total",
        "Count of directory API requests, labelled by route and status code"
    );
    describe_counter!(
        "profile_department_updates_total",
        "Count of profile department assignments, labelled by result"
    );
    START_TIME.get_or_init(Instant::now);

    Ok(handle)
}

pub fn record_request(route: &'static str, status: StatusCode) {
    counter!(
        "http_requests_total",
        "route" => route,
        "status" => status.as_u16().to_string()
    )
    .increment(1);
}

pub fn record_department_update(outcome: &Result<Profile, ServiceError>) {
    let result = match outcome {
        Ok(_) => "updated",
        Err(ServiceError::NotFound(miss)) => match miss.kind {
            EntityKind::Profile => "profile_not_found",
            EntityKind::Department => "department_not_found",
        },
        Err(ServiceError::Store(_)) => "store_error",
    };
    counter!("profile_department_updates_total", "result" => result).increment(1);
}

pub fn render_metrics(handle: &PrometheusHandle) -> String {
    let mut body = handle.render();
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }

    body.push_str("# TYPE app_build_info gauge\n");
    body.push_str(&format!(
        "app_build_info{{version=\"{}\",git=\"{}\"}} 1\n",
        BUILD_VERSION,
        build_git_sha()
    ));

    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs_f64())
        .unwrap_or_default();
    body.push_str("# TYPE app_uptime_seconds gauge\n");
    body.push_str(&format!("app_uptime_seconds {}\n", uptime));

    body
}
