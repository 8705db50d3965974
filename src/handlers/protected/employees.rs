use axum::{extract::State, Extension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::PageParams;
use crate::auth::Identity;
use crate::database::models::Employee;
use crate::database::patch::{FieldPatch, EMPLOYEE_COLUMNS};
use crate::database::store::{EmployeeQuery, Listing};
use crate::middleware::{ApiPath, ApiQuery, ApiResponse, ApiResult, JsonBody};
use crate::state::AppState;
use crate::types::{EmployeeNumber, Pagination};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeListParams {
    pub employee_number: Option<EmployeeNumber>,
    pub office_code: Option<String>,
    pub role: Option<i32>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct EmployeePage {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub employees: Vec<Employee>,
}

impl EmployeePage {
    fn new(listing: Listing<Employee>, pagination: Pagination) -> Self {
        Self {
            total: listing.total,
            page: pagination.page,
            limit: pagination.limit,
            employees: listing.items,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EmployeeDeleted {
    pub message: String,
}

/// POST /employees (admin)
pub async fn employee_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    JsonBody(employee): JsonBody<Employee>,
) -> ApiResult<Employee> {
    let created = state.employees.create_employee(&identity, employee).await?;
    Ok(ApiResponse::created(created))
}

/// GET /employees/all (admin) - filter by employeeNumber, officeCode and role
pub async fn employee_list_all(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<EmployeeListParams>,
) -> ApiResult<EmployeePage> {
    let pagination = Pagination::resolve(params.page, params.limit, &state.config.api);
    let query = EmployeeQuery {
        employee_number: params.employee_number,
        office_code: params.office_code,
        role: params.role,
        pagination,
    };
    let listing = state.employees.list_employees(query).await?;
    Ok(ApiResponse::success(EmployeePage::new(listing, pagination)))
}

/// GET /employees (manager) - the caller's office
pub async fn employee_list_office(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> ApiResult<EmployeePage> {
    let pagination = params.resolve(&state.config.api);
    let listing = state.employees.list_office_employees(&identity, pagination).await?;
    Ok(ApiResponse::success(EmployeePage::new(listing, pagination)))
}

/// GET /employees/:employeeNumber (admin, manager)
pub async fn employee_get(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(employee_number): ApiPath<EmployeeNumber>,
) -> ApiResult<Employee> {
    let employee = state.employees.get_employee(&identity, employee_number).await?;
    Ok(ApiResponse::success(employee))
}

/// PATCH /employees/:employeeNumber (admin, manager)
pub async fn employee_patch(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(employee_number): ApiPath<EmployeeNumber>,
    JsonBody(body): JsonBody<Map<String, Value>>,
) -> ApiResult<Employee> {
    let patch = FieldPatch::from_json(&body, EMPLOYEE_COLUMNS)?;
    let updated = state.employees.update_employee(&identity, employee_number, patch).await?;
    Ok(ApiResponse::success(updated))
}

/// DELETE /employees/:employeeNumber (admin)
pub async fn employee_delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(employee_number): ApiPath<EmployeeNumber>,
) -> ApiResult<EmployeeDeleted> {
    state.employees.delete_employee(&identity, employee_number).await?;
    Ok(ApiResponse::success(EmployeeDeleted {
        message: format!("Employee {} has been deleted", employee_number),
    }))
}
