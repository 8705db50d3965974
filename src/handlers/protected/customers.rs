use axum::{extract::State, Extension};
use serde::Serialize;
use serde_json::{Map, Value};

use super::PageParams;
use crate::auth::Identity;
use crate::database::models::Customer;
use crate::database::patch::{FieldPatch, CUSTOMER_COLUMNS};
use crate::middleware::{ApiPath, ApiQuery, ApiResponse, ApiResult, JsonBody};
use crate::services::customer_service::DeletedCustomer;
use crate::state::AppState;
use crate::types::CustomerNumber;

#[derive(Debug, Serialize)]
pub struct CustomerPage {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub customers: Vec<Customer>,
}

#[derive(Debug, Serialize)]
pub struct CustomerDeleted {
    pub message: String,
    #[serde(flatten)]
    pub deleted: DeletedCustomer,
}

/// GET /customers - customers the caller may see, paginated
pub async fn customer_list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> ApiResult<CustomerPage> {
    let pagination = params.resolve(&state.config.api);
    let listing = state.customers.list_customers(&identity, pagination).await?;
    Ok(ApiResponse::success(CustomerPage {
        total: listing.total,
        page: pagination.page,
        limit: pagination.limit,
        customers: listing.items,
    }))
}

/// GET /customers/:customerNumber
pub async fn customer_get(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(customer_number): ApiPath<CustomerNumber>,
) -> ApiResult<Customer> {
    let customer = state.customers.get_customer(&identity, customer_number).await?;
    Ok(ApiResponse::success(customer))
}

/// POST /customers
pub async fn customer_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    JsonBody(customer): JsonBody<Customer>,
) -> ApiResult<Customer> {
    let created = state.customers.create_customer(&identity, customer).await?;
    Ok(ApiResponse::created(created))
}

/// PATCH /customers/:customerNumber - partial update of whitelisted columns
pub async fn customer_patch(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(customer_number): ApiPath<CustomerNumber>,
    JsonBody(body): JsonBody<Map<String, Value>>,
) -> ApiResult<Customer> {
    let patch = FieldPatch::from_json(&body, CUSTOMER_COLUMNS)?;
    let updated = state.customers.update_customer(&identity, customer_number, patch).await?;
    Ok(ApiResponse::success(updated))
}

/// DELETE /customers/:customerNumber - removes the customer with its payments and logins
pub async fn customer_delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(customer_number): ApiPath<CustomerNumber>,
) -> ApiResult<CustomerDeleted> {
    let deleted = state.customers.delete_customer(&identity, customer_number).await?;
    Ok(ApiResponse::success(CustomerDeleted {
        message: format!("Customer {} has been deleted", customer_number),
        deleted,
    }))
}
