use axum::{extract::State, Extension};
use serde::{Deserialize, Serialize};

use crate::auth::Identity;
use crate::database::models::{Order, OrderWithDetails};
use crate::database::store::{OrderDateColumn, OrderQuery};
use crate::error::ApiError;
use crate::filter::SortDirection;
use crate::middleware::{ApiPath, ApiQuery, ApiResponse, ApiResult, JsonBody};
use crate::services::order_service::{CreatedOrder, DeletedOrder, OrderCreateBody, OrderCreateRequest, OrderPatch};
use crate::state::AppState;
use crate::types::{CustomerNumber, OrderNumber, OrderStatus, Pagination};

/// Query string of `GET /orders`. Each date column takes `asc` or `desc`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListParams {
    pub customer_number: Option<CustomerNumber>,
    pub status: Option<String>,
    pub order_date: Option<String>,
    pub required_date: Option<String>,
    pub shipped_date: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl OrderListParams {
    fn into_query(self, pagination: Pagination) -> Result<OrderQuery, ApiError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<OrderStatus>)
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;

        let mut sort = Vec::new();
        for (column, raw) in [
            (OrderDateColumn::OrderDate, &self.order_date),
            (OrderDateColumn::RequiredDate, &self.required_date),
            (OrderDateColumn::ShippedDate, &self.shipped_date),
        ] {
            if let Some(raw) = raw {
                let direction = SortDirection::parse(raw)
                    .ok_or_else(|| ApiError::bad_request(format!("{} must be 'asc' or 'desc'", column.column())))?;
                sort.push((column, direction));
            }
        }

        Ok(OrderQuery {
            customer_number: self.customer_number,
            status,
            sort,
            pagination,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct OrderPage {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub orders: Vec<Order>,
}

#[derive(Debug, Serialize)]
pub struct OrderUpdated {
    pub message: &'static str,
    pub order: Order,
}

#[derive(Debug, Serialize)]
pub struct OrderDeleted {
    pub message: String,
    #[serde(flatten)]
    pub deleted: DeletedOrder,
}

/// GET /orders - one customer's orders; customers always get their own
pub async fn order_list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiQuery(params): ApiQuery<OrderListParams>,
) -> ApiResult<OrderPage> {
    let pagination = Pagination::resolve(params.page, params.limit, &state.config.api);
    let query = params.into_query(pagination)?;
    let listing = state.orders.list_orders(&identity, query).await?;
    Ok(ApiResponse::success(OrderPage {
        total: listing.total,
        page: pagination.page,
        limit: pagination.limit,
        orders: listing.items,
    }))
}

/// GET /orders/:orderNumber - order with its lines
pub async fn order_get(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(order_number): ApiPath<OrderNumber>,
) -> ApiResult<OrderWithDetails> {
    let order = state.orders.get_order(&identity, order_number).await?;
    Ok(ApiResponse::success(order))
}

/// POST /orders - place an order, optionally creating or patching its customer
///
/// ```json
/// {
///   "order": { "orderNumber": 10426, "requiredDate": "2021-12-30", "customerNumber": 103 },
///   "orderDetails": [{ "productCode": "S10_1678", "quantityOrdered": 50, "priceEach": 48.81 }],
///   "update": { "phone": "40.32.2555" }
/// }
/// ```
pub async fn order_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    JsonBody(body): JsonBody<OrderCreateBody>,
) -> ApiResult<CreatedOrder> {
    let request = OrderCreateRequest::try_from(body)?;
    let created = state.orders.create_order(&identity, request).await?;
    Ok(ApiResponse::created(created))
}

/// PATCH /orders/:orderNumber - status change and/or new required date
pub async fn order_patch(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(order_number): ApiPath<OrderNumber>,
    JsonBody(patch): JsonBody<OrderPatch>,
) -> ApiResult<OrderUpdated> {
    let order = state.orders.update_order(&identity, order_number, patch).await?;
    Ok(ApiResponse::success(OrderUpdated {
        message: "Order updated successfully",
        order,
    }))
}

/// DELETE /orders/:orderNumber - removes the order and its lines
pub async fn order_delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ApiPath(order_number): ApiPath<OrderNumber>,
) -> ApiResult<OrderDeleted> {
    let deleted = state.orders.delete_order(&identity, order_number).await?;
    Ok(ApiResponse::success(OrderDeleted {
        message: deleted.message(),
        deleted,
    }))
}
