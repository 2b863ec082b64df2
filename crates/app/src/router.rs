use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use staffdir_core::{system_clock, Clock};
use staffdir_storage::Database;

use crate::{directory, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    clock: Clock,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, storage: Database) -> Self {
        Self {
            metrics,
            storage,
            clock: system_clock(),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn clock(&self) -> Clock {
        self.clock.clone()
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route(
            "/departments",
            get(directory::list_departments).post(directory::create_department),
        )
        .route("/departments/:id", get(directory::get_department))
        .route(
            "/profiles",
            get(directory::list_profiles).post(directory::create_profile),
        )
        .route("/profiles/:id", get(directory::get_profile))
        .route(
            "/profiles/:id/department",
            put(directory::update_profile_department),
        )
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}
