//! JSON API for the employee roster and service request lookup.
//!
//! - `GET    /api/v1/employees?search=&role=` list employees, name ordered
//! - `POST   /api/v1/employees`               create an employee
//! - `GET    /api/v1/employees/{id}`          fetch one employee
//! - `PUT    /api/v1/employees/{id}`          replace an employee's editable fields
//! - `DELETE /api/v1/employees/{id}`          remove an employee
//! - `GET    /api/v1/requests/{id}`           fetch a persisted service request

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use roadside_core::domain::employee::{Employee, EmployeeDraft, EmployeeFilter, EmployeeId};
use roadside_core::domain::service_request::{
    DisplayStatus, ServiceRequestId, ServiceRequestState,
};
use roadside_core::errors::ApplicationError;
use roadside_db::repositories::{
    EmployeeRepository, RepositoryError, ServiceRequestRepository, SqlEmployeeRepository,
    SqlServiceRequestRepository,
};
use roadside_db::DbPool;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ApiState {
    employees: Arc<dyn EmployeeRepository>,
    requests: Arc<dyn ServiceRequestRepository>,
}

impl ApiState {
    pub fn new(
        employees: Arc<dyn EmployeeRepository>,
        requests: Arc<dyn ServiceRequestRepository>,
    ) -> Self {
        Self { employees, requests }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EmployeeQuery {
    pub search: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: ServiceRequestState,
    pub display_status: DisplayStatus,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

pub type ApiFailure = (StatusCode, Json<ApiErrorBody>);

pub fn router(db_pool: DbPool) -> Router {
    routes(ApiState::new(
        Arc::new(SqlEmployeeRepository::new(db_pool.clone())),
        Arc::new(SqlServiceRequestRepository::new(db_pool)),
    ))
}

pub fn routes(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/employees", get(list_employees).post(create_employee))
        .route(
            "/api/v1/employees/{id}",
            get(get_employee).put(update_employee).delete(delete_employee),
        )
        .route("/api/v1/requests/{id}", get(get_request))
        .with_state(state)
}

async fn list_employees(
    State(state): State<ApiState>,
    Query(query): Query<EmployeeQuery>,
) -> Result<Json<Vec<Employee>>, ApiFailure> {
    let correlation_id = new_correlation_id();
    let filter = EmployeeFilter::from_query(query.search.as_deref(), query.role.as_deref())
        .map_err(|error| failure(ApplicationError::from(error), &correlation_id))?;

    let employees = state
        .employees
        .list(&filter)
        .await
        .map_err(|error| failure(persistence(error), &correlation_id))?;
    Ok(Json(employees))
}

async fn create_employee(
    State(state): State<ApiState>,
    Json(draft): Json<EmployeeDraft>,
) -> Result<(StatusCode, Json<Employee>), ApiFailure> {
    let correlation_id = new_correlation_id();
    let employee = draft
        .into_employee()
        .map_err(|error| failure(ApplicationError::from(error), &correlation_id))?;

    state
        .employees
        .save(employee.clone())
        .await
        .map_err(|error| failure(persistence(error), &correlation_id))?;

    info!(
        event_name = "api.employee.created",
        correlation_id = %correlation_id,
        employee_id = %employee.id.0,
        role = employee.role.as_str(),
        "employee created"
    );
    Ok((StatusCode::CREATED, Json(employee)))
}

async fn get_employee(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Employee>, ApiFailure> {
    let correlation_id = new_correlation_id();
    let employee = load_employee(&state, &EmployeeId(id), &correlation_id).await?;
    Ok(Json(employee))
}

async fn update_employee(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(draft): Json<EmployeeDraft>,
) -> Result<Json<Employee>, ApiFailure> {
    let correlation_id = new_correlation_id();
    let mut employee = load_employee(&state, &EmployeeId(id), &correlation_id).await?;
    employee
        .update(draft)
        .map_err(|error| failure(ApplicationError::from(error), &correlation_id))?;

    state
        .employees
        .save(employee.clone())
        .await
        .map_err(|error| failure(persistence(error), &correlation_id))?;

    info!(
        event_name = "api.employee.updated",
        correlation_id = %correlation_id,
        employee_id = %employee.id.0,
        "employee updated"
    );
    Ok(Json(employee))
}

async fn delete_employee(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    let correlation_id = new_correlation_id();
    let id = EmployeeId(id);
    let removed = state
        .employees
        .delete(&id)
        .await
        .map_err(|error| failure(persistence(error), &correlation_id))?;

    if !removed {
        let missing = ApplicationError::NotFound(format!("employee {}", id.0));
        return Err(failure(missing, &correlation_id));
    }

    info!(
        event_name = "api.employee.deleted",
        correlation_id = %correlation_id,
        employee_id = %id.0,
        "employee deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn get_request(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<RequestView>, ApiFailure> {
    let correlation_id = new_correlation_id();
    let id = ServiceRequestId(id);
    let request = state
        .requests
        .find_by_id(&id)
        .await
        .map_err(|error| failure(persistence(error), &correlation_id))?
        .ok_or_else(|| {
            failure(ApplicationError::NotFound(format!("service request {id}")), &correlation_id)
        })?;

    let display_status = request.display_status();
    Ok(Json(RequestView { request, display_status }))
}

async fn load_employee(
    state: &ApiState,
    id: &EmployeeId,
    correlation_id: &str,
) -> Result<Employee, ApiFailure> {
    state
        .employees
        .find_by_id(id)
        .await
        .map_err(|error| failure(persistence(error), correlation_id))?
        .ok_or_else(|| {
            failure(ApplicationError::NotFound(format!("employee {}", id.0)), correlation_id)
        })
}

fn new_correlation_id() -> String {
    format!("api-{}", &Uuid::new_v4().simple().to_string()[..12])
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn failure(error: ApplicationError, correlation_id: &str) -> ApiFailure {
    let mapped = error.into_interface(correlation_id);
    let status =
        StatusCode::from_u16(mapped.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    // Dependency and internal failures keep their detail in the log only.
    let detail = if status.is_server_error() {
        warn!(
            event_name = "api.request.failed",
            correlation_id = %correlation_id,
            status = status.as_u16(),
            error = %mapped.detail(),
            "api request failed"
        );
        String::new()
    } else {
        mapped.detail().to_string()
    };

    (
        status,
        Json(ApiErrorBody {
            error: mapped.user_message(),
            detail,
            correlation_id: mapped.correlation_id().to_string(),
        }),
    )
}
