//! HTTP handlers for departments and profiles.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::warn;

use staffdir_core::{Department, DepartmentLookup, DepartmentService, Profile, ProfileService};
use staffdir_storage::{DepartmentRepository, ProfileRepository};

use crate::problem::{ApiJson, ProblemResponse};
use crate::router::AppState;
use crate::telemetry;

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignDepartmentRequest {
    department_id: IdValue,
}

/// Identifier accepted either as a JSON number or a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Number(i64),
    Text(String),
}

impl IdValue {
    fn into_string(self) -> String {
        match self {
            Self::Number(value) => value.to_string(),
            Self::Text(value) => value,
        }
    }
}

fn validated_name(route: &'static str, raw: &str) -> Result<String, ProblemResponse> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(finish_err(
            route,
            ProblemResponse::new(
                StatusCode::BAD_REQUEST,
                "invalid_name",
                "name must not be blank",
            ),
        ));
    }
    Ok(name.to_string())
}

fn finish_err(route: &'static str, problem: ProblemResponse) -> ProblemResponse {
    telemetry::record_request(route, problem.status());
    problem
}

fn finish<T>(route: &'static str, status: StatusCode, value: T) -> (StatusCode, Json<T>) {
    telemetry::record_request(route, status);
    (status, Json(value))
}

pub async fn create_department(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateRequest>,
) -> Result<(StatusCode, Json<Department>), ProblemResponse> {
    const ROUTE: &str = "departments.create";
    let name = validated_name(ROUTE, &body.name)?;
    let service = DepartmentService::new(state.storage().departments(), state.clock());
    let department = service
        .create(&name)
        .await
        .map_err(|err| finish_err(ROUTE, err.into()))?;
    Ok(finish(ROUTE, StatusCode::CREATED, department))
}

pub async fn list_departments(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Vec<Department>>), ProblemResponse> {
    const ROUTE: &str = "departments.list";
    let service = DepartmentService::new(state.storage().departments(), state.clock());
    let departments = service
        .list()
        .await
        .map_err(|err| finish_err(ROUTE, err.into()))?;
    Ok(finish(ROUTE, StatusCode::OK, departments))
}

pub async fn get_department(
    State(state): State<AppState>,
    Path(department_id): Path<String>,
) -> Result<(StatusCode, Json<Department>), ProblemResponse> {
    const ROUTE: &str = "departments.get";
    let service = DepartmentService::new(state.storage().departments(), state.clock());
    let department = service
        .find(&department_id)
        .await
        .map_err(|err| finish_err(ROUTE, err.into()))?;
    Ok(finish(ROUTE, StatusCode::OK, department))
}

pub async fn create_profile(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateRequest>,
) -> Result<(StatusCode, Json<Profile>), ProblemResponse> {
    const ROUTE: &str = "profiles.create";
    let name = validated_name(ROUTE, &body.name)?;
    let profile = profile_service(&state)
        .create(&name)
        .await
        .map_err(|err| finish_err(ROUTE, err.into()))?;
    Ok(finish(ROUTE, StatusCode::CREATED, profile))
}

pub async fn list_profiles(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Vec<Profile>>), ProblemResponse> {
    const ROUTE: &str = "profiles.list";
    let profiles = profile_service(&state)
        .list()
        .await
        .map_err(|err| finish_err(ROUTE, err.into()))?;
    Ok(finish(ROUTE, StatusCode::OK, profiles))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
) -> Result<(StatusCode, Json<Profile>), ProblemResponse> {
    const ROUTE: &str = "profiles.get";
    let profile = profile_service(&state)
        .find(&profile_id)
        .await
        .map_err(|err| finish_err(ROUTE, err.into()))?;
    Ok(finish(ROUTE, StatusCode::OK, profile))
}

/// Assigns the department inside one transaction, committed only on success.
pub async fn update_profile_department(
    State(state): State<AppState>,
    Path(profile_id): Path<String>,
    ApiJson(body): ApiJson<AssignDepartmentRequest>,
) -> Result<(StatusCode, Json<Profile>), ProblemResponse> {
    const ROUTE: &str = "profiles.update_department";
    let department_id = body.department_id.into_string();
    let uow = state
        .storage()
        .unit_of_work()
        .await
        .map_err(|err| finish_err(ROUTE, err.into()))?;

    let outcome = {
        let departments = DepartmentService::new(&uow, state.clock());
        ProfileService::new(&uow, departments, state.clock())
            .update_department(&profile_id, &department_id)
            .await
    };
    telemetry::record_department_update(&outcome);

    match outcome {
        Ok(profile) => {
            uow.commit()
                .await
                .map_err(|err| finish_err(ROUTE, err.into()))?;
            Ok(finish(ROUTE, StatusCode::OK, profile))
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                warn!(stage = "http", error = %rollback_err, "rollback failed");
            }
            Err(finish_err(ROUTE, err.into()))
        }
    }
}

fn profile_service(
    state: &AppState,
) -> ProfileService<ProfileRepository, DepartmentService<DepartmentRepository>> {
    let departments = DepartmentService::new(state.storage().departments(), state.clock());
    ProfileService::new(state.storage().profiles(), departments, state.clock())
}
