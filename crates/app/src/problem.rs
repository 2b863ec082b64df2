use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use staffdir_core::ServiceError;
use staffdir_storage::StorageError;

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// JSON body extractor whose rejections are rendered as problem documents.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ProblemResponse))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for ProblemResponse {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), "invalid_body", rejection.body_text())
    }
}

impl From<ServiceError> for ProblemResponse {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(miss) => {
                Self::new(StatusCode::NOT_FOUND, "object_not_found", miss.to_string())
            }
            ServiceError::Store(err) => {
                error!(stage = "http", error = %err, "store failure");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "storage failure",
                )
            }
        }
    }
}

impl From<StorageError> for ProblemResponse {
    fn from(err: StorageError) -> Self {
        error!(stage = "http", error = %err, "transaction failure");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            "storage failure",
        )
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
