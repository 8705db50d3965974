use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::auth::policy::{self, Rule, FORBIDDEN, ORDER_OUTSIDE_SALES_TEAM};
use crate::auth::Identity;
use crate::database::manager::DatabaseError;
use crate::database::models::{Customer, Order, OrderDetail, OrderWithDetails};
use crate::database::patch::{FieldPatch, CUSTOMER_COLUMNS};
use crate::database::store::{Listing, OrderChanges, OrderQuery, RecordStore, StoreTransaction};
use crate::services::error::{Rejection, ServiceError, ServiceResult};
use crate::services::{audited, conflict_as_duplicate, finish, hierarchy, patched_reference};
use crate::types::{parse_calendar_date, today, CustomerNumber, EmployeeNumber, OrderNumber, OrderStatus};

pub const SHIPPED_WITH_REQUIRED_DATE: &str = "To update status is 'Shipped', you cannot update required date";
pub const CANCELLED_WITH_REQUIRED_DATE: &str = "To cancel an order, you cannot update required date";
pub const REQUIRED_DATE_MISSING: &str = "Must update required date";
pub const STATUS_IN_PROCESS: &str = "Status 'In Process' is set when an order is created and cannot be requested";
pub const NO_ORDER_CREATED: &str = "No order has been created";
pub const NO_ORDER_DELETED: &str = "No order has been deleted";
pub const UPDATE_FAILED: &str = "Failed to update order";
pub const SALES_REP_NOT_FOUND: &str = "Could not find sales rep employee";
pub const DUPLICATE_CUSTOMER: &str = "Duplicate data of customer number";
const INVALID_REQUIRED_DATE: &str = "requiredDate must be a calendar date";
const MISSING_CUSTOMER_NUMBER: &str = "customerNumber is required";
const PRICE_TOO_LOW: &str = "priceEach must be at least 1";

pub fn order_not_found(order_number: OrderNumber) -> String {
    format!("Could not find order with order number {}", order_number)
}

pub fn customer_not_found(customer_number: CustomerNumber) -> String {
    format!("Could not find customer with customer number {}", customer_number)
}

fn duplicate_order(order_number: OrderNumber) -> String {
    format!("Duplicate data of order number {}", order_number)
}

/// `POST /orders` body as sent by clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreateBody {
    pub order: OrderFields,
    #[serde(default)]
    pub customer_number: Option<CustomerNumber>,
    pub order_details: Vec<OrderLineFields>,
    #[serde(default)]
    pub create: Option<Customer>,
    #[serde(default)]
    pub update: Option<Map<String, Value>>,
}

/// Client side order fields. Status and order date are always set by the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFields {
    pub order_number: OrderNumber,
    pub required_date: String,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub customer_number: Option<CustomerNumber>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineFields {
    pub product_code: String,
    pub quantity_ordered: i32,
    pub price_each: Decimal,
}

/// What happens to the customer record while an order is placed.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomerLinkage {
    NewCustomer(Customer),
    PatchCustomer {
        customer_number: CustomerNumber,
        patch: FieldPatch,
    },
    Existing(CustomerNumber),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderLine {
    pub product_code: String,
    pub quantity_ordered: i32,
    pub price_each: Decimal,
}

/// Validated order creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCreateRequest {
    pub order_number: OrderNumber,
    pub required_date: NaiveDate,
    pub comments: Option<String>,
    pub lines: Vec<NewOrderLine>,
    pub linkage: CustomerLinkage,
}

impl TryFrom<OrderCreateBody> for OrderCreateRequest {
    type Error = Rejection;

    fn try_from(body: OrderCreateBody) -> Result<Self, Self::Error> {
        let declared = body.customer_number.or(body.order.customer_number);
        let linkage = match (body.create, body.update) {
            (Some(_), Some(_)) => {
                return Err(Rejection::BadRequest(
                    "Provide either 'create' or 'update' for the customer, not both".into(),
                ))
            }
            (Some(customer), None) => CustomerLinkage::NewCustomer(customer),
            (None, Some(fields)) => CustomerLinkage::PatchCustomer {
                customer_number: declared.ok_or_else(|| Rejection::BadRequest(MISSING_CUSTOMER_NUMBER.into()))?,
                patch: FieldPatch::from_json(&fields, CUSTOMER_COLUMNS)
                    .map_err(|e| Rejection::BadRequest(e.to_string()))?,
            },
            (None, None) => CustomerLinkage::Existing(
                declared.ok_or_else(|| Rejection::BadRequest(MISSING_CUSTOMER_NUMBER.into()))?,
            ),
        };

        if body.order_details.is_empty() {
            return Err(Rejection::BadRequest("An order needs at least one order detail".into()));
        }
        let mut seen = HashSet::new();
        let mut lines = Vec::with_capacity(body.order_details.len());
        for line in body.order_details {
            if line.product_code.trim().is_empty() {
                return Err(Rejection::BadRequest("productCode is required".into()));
            }
            if line.quantity_ordered < 1 {
                return Err(Rejection::BadRequest("quantityOrdered must be at least 1".into()));
            }
            if line.price_each < Decimal::ONE {
                return Err(Rejection::BadRequest(PRICE_TOO_LOW.into()));
            }
            if !seen.insert(line.product_code.clone()) {
                return Err(Rejection::BadRequest(format!(
                    "Product {} appears more than once in the order",
                    line.product_code
                )));
            }
            lines.push(NewOrderLine {
                product_code: line.product_code,
                quantity_ordered: line.quantity_ordered,
                price_each: line.price_each,
            });
        }

        Ok(Self {
            order_number: body.order.order_number,
            required_date: parse_calendar_date(&body.order.required_date)
                .ok_or_else(|| Rejection::BadRequest(INVALID_REQUIRED_DATE.into()))?,
            comments: body.order.comments,
            lines,
            linkage,
        })
    }
}

/// `PATCH /orders/:n` body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrderPatch {
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub required_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub message: String,
    pub order: Order,
    pub order_details: Vec<OrderDetail>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedOrder {
    pub order: u64,
    pub order_details: u64,
}

impl DeletedOrder {
    pub fn message(&self) -> String {
        format!(
            "{} order and {} order details have been deleted.",
            self.order, self.order_details
        )
    }
}

/// Status transition field rules, independent of who asks.
pub fn order_changes(patch: &OrderPatch) -> Result<OrderChanges, Rejection> {
    let carries_required_date = patch.required_date.is_some();
    match patch.status {
        Some(OrderStatus::InProcess) => Err(Rejection::BadRequest(STATUS_IN_PROCESS.into())),
        Some(OrderStatus::Shipped) if carries_required_date => {
            Err(Rejection::BadRequest(SHIPPED_WITH_REQUIRED_DATE.into()))
        }
        Some(OrderStatus::Shipped) => Ok(OrderChanges {
            status: Some(OrderStatus::Shipped),
            required_date: None,
            shipped_date: Some(today()),
        }),
        Some(OrderStatus::Cancelled) if carries_required_date => {
            Err(Rejection::BadRequest(CANCELLED_WITH_REQUIRED_DATE.into()))
        }
        Some(OrderStatus::Cancelled) => Ok(OrderChanges {
            status: Some(OrderStatus::Cancelled),
            ..OrderChanges::default()
        }),
        status => {
            let raw = patch
                .required_date
                .as_deref()
                .ok_or_else(|| Rejection::BadRequest(REQUIRED_DATE_MISSING.into()))?;
            let required_date =
                parse_calendar_date(raw).ok_or_else(|| Rejection::BadRequest(INVALID_REQUIRED_DATE.into()))?;
            Ok(OrderChanges {
                status,
                required_date: Some(required_date),
                shipped_date: None,
            })
        }
    }
}

pub struct OrderService {
    store: Arc<dyn RecordStore>,
}

impl OrderService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Orders of one customer, filtered and sorted. `query.customer_number` is the
    /// requested customer; it is replaced by the one the caller is allowed to see.
    pub async fn list_orders(&self, identity: &Identity, query: OrderQuery) -> ServiceResult<Listing<Order>> {
        audited(identity, "list orders", self.scoped_orders(identity, query).await)
    }

    async fn scoped_orders(&self, identity: &Identity, mut query: OrderQuery) -> ServiceResult<Listing<Order>> {
        let customer_number = policy::order_query_rule(identity, query.customer_number)?;
        if self.store.find_customer(customer_number).await?.is_none() {
            return Err(ServiceError::not_found(customer_not_found(customer_number)));
        }
        query.customer_number = Some(customer_number);
        Ok(self.store.list_orders(&query).await?)
    }

    pub async fn get_order(&self, identity: &Identity, order_number: OrderNumber) -> ServiceResult<OrderWithDetails> {
        audited(identity, "read order", self.order_with_details(identity, order_number).await)
    }

    async fn order_with_details(
        &self,
        identity: &Identity,
        order_number: OrderNumber,
    ) -> ServiceResult<OrderWithDetails> {
        let order = self
            .store
            .find_order(order_number)
            .await?
            .ok_or_else(|| ServiceError::not_found(order_not_found(order_number)))?;
        policy::order_access(identity, &order)?;
        let order_details = self.store.order_details(order_number).await?;
        Ok(OrderWithDetails { order, order_details })
    }

    /// Place an order, creating or patching its customer in the same transaction.
    pub async fn create_order(&self, identity: &Identity, request: OrderCreateRequest) -> ServiceResult<CreatedOrder> {
        audited(identity, "create order", self.place_order(identity, request).await)
    }

    async fn place_order(&self, identity: &Identity, request: OrderCreateRequest) -> ServiceResult<CreatedOrder> {
        // Fast path only; the primary key decides under concurrency
        if self.store.find_order(request.order_number).await?.is_some() {
            return Err(ServiceError::duplicate(duplicate_order(request.order_number)));
        }
        match &request.linkage {
            CustomerLinkage::NewCustomer(_) => policy::inline_customer_create(identity)?,
            CustomerLinkage::PatchCustomer { customer_number, .. } | CustomerLinkage::Existing(customer_number) => {
                policy::order_customer(identity, *customer_number)?;
            }
        }

        let mut tx = self.store.begin().await?;
        let result = write_order(tx.as_mut(), request).await;
        let created = finish(tx, result).await?;

        info!(
            username = %identity.username,
            order_number = created.order.order_number,
            customer_number = created.order.customer_number,
            "{}",
            created.message
        );
        Ok(created)
    }

    pub async fn update_order(
        &self,
        identity: &Identity,
        order_number: OrderNumber,
        patch: OrderPatch,
    ) -> ServiceResult<Order> {
        audited(identity, "update order", self.apply_patch(identity, order_number, patch).await)
    }

    async fn apply_patch(&self, identity: &Identity, order_number: OrderNumber, patch: OrderPatch) -> ServiceResult<Order> {
        let order = self
            .store
            .find_order(order_number)
            .await?
            .ok_or_else(|| ServiceError::not_found(order_not_found(order_number)))?;

        match policy::order_update_rule(identity, &order, patch.status)? {
            Rule::Unrestricted | Rule::OwnRecord(_) => {}
            Rule::SalesTeam(employee_number) => {
                let sales_rep = self
                    .store
                    .find_customer(order.customer_number)
                    .await?
                    .and_then(|c| c.sales_rep_employee_number);
                let scope = hierarchy::resolve_scope(self.store.as_ref(), Rule::SalesTeam(employee_number)).await?;
                if !scope.permits_sales_rep(sales_rep) {
                    return Err(ServiceError::forbidden(ORDER_OUTSIDE_SALES_TEAM));
                }
            }
            Rule::Denied => return Err(ServiceError::forbidden(FORBIDDEN)),
        }

        let changes = order_changes(&patch)?;
        let updated = self
            .store
            .patch_order(order_number, &changes)
            .await?
            .ok_or_else(|| ServiceError::not_found(UPDATE_FAILED))?;

        info!(username = %identity.username, order_number, status = %updated.status, "Order updated");
        Ok(updated)
    }

    /// Remove an order and its lines. Callers are limited by role at the route.
    pub async fn delete_order(&self, identity: &Identity, order_number: OrderNumber) -> ServiceResult<DeletedOrder> {
        let mut tx = self.store.begin().await?;
        let result = remove_order(tx.as_mut(), order_number).await;
        let deleted = audited(identity, "delete order", finish(tx, result).await)?;

        info!(username = %identity.username, order_number, "{}", deleted.message());
        Ok(deleted)
    }
}

async fn check_sales_rep(tx: &mut dyn StoreTransaction, sales_rep: Option<EmployeeNumber>) -> ServiceResult<()> {
    if let Some(employee_number) = sales_rep {
        if tx.find_employee(employee_number).await?.is_none() {
            return Err(ServiceError::bad_request(SALES_REP_NOT_FOUND));
        }
    }
    Ok(())
}

async fn link_customer(tx: &mut dyn StoreTransaction, linkage: CustomerLinkage) -> ServiceResult<CustomerNumber> {
    match linkage {
        CustomerLinkage::NewCustomer(customer) => {
            if tx.find_customer(customer.customer_number).await?.is_some() {
                return Err(ServiceError::duplicate(DUPLICATE_CUSTOMER));
            }
            check_sales_rep(tx, customer.sales_rep_employee_number).await?;
            let inserted = tx
                .insert_customer(&customer)
                .await
                .map_err(|e| conflict_as_duplicate(e, DUPLICATE_CUSTOMER))?
                .ok_or_else(|| ServiceError::not_found("No customer has been created"))?;
            Ok(inserted.customer_number)
        }
        CustomerLinkage::PatchCustomer { customer_number, patch } => {
            let sales_rep = patched_reference(&patch, "salesRepEmployeeNumber", SALES_REP_NOT_FOUND)?;
            check_sales_rep(tx, sales_rep).await?;
            let patched = tx
                .patch_customer(customer_number, &patch)
                .await?
                .ok_or_else(|| ServiceError::not_found(customer_not_found(customer_number)))?;
            Ok(patched.customer_number)
        }
        CustomerLinkage::Existing(customer_number) => {
            if tx.find_customer(customer_number).await?.is_none() {
                return Err(ServiceError::not_found(customer_not_found(customer_number)));
            }
            Ok(customer_number)
        }
    }
}

async fn write_order(tx: &mut dyn StoreTransaction, request: OrderCreateRequest) -> ServiceResult<CreatedOrder> {
    let customer_number = link_customer(tx, request.linkage).await?;

    let order = Order {
        order_number: request.order_number,
        order_date: today(),
        required_date: request.required_date,
        shipped_date: None,
        status: OrderStatus::InProcess,
        comments: request.comments,
        customer_number,
    };
    let order = tx
        .insert_order(&order)
        .await
        .map_err(|e| conflict_as_duplicate(e, duplicate_order(request.order_number)))?
        .ok_or_else(|| ServiceError::not_found(NO_ORDER_CREATED))?;

    let mut order_details = Vec::with_capacity(request.lines.len());
    for (index, line) in request.lines.into_iter().enumerate() {
        let order_line_number =
            i16::try_from(index + 1).map_err(|_| ServiceError::bad_request("Too many order details"))?;
        let detail = OrderDetail {
            order_number: order.order_number,
            product_code: line.product_code,
            quantity_ordered: line.quantity_ordered,
            price_each: line.price_each,
            order_line_number,
        };
        let inserted = tx.insert_order_detail(&detail).await?.ok_or_else(|| {
            DatabaseError::QueryError(format!("insert of order line {} returned no row", order_line_number))
        })?;
        order_details.push(inserted);
    }

    Ok(CreatedOrder {
        message: format!("1 order and {} order details have been created.", order_details.len()),
        order,
        order_details,
    })
}

async fn remove_order(tx: &mut dyn StoreTransaction, order_number: OrderNumber) -> ServiceResult<DeletedOrder> {
    let order_details = tx.delete_order_details(order_number).await?;
    let order = tx.delete_order(order_number).await?;
    if order == 0 {
        return Err(ServiceError::not_found(NO_ORDER_DELETED));
    }
    Ok(DeletedOrder { order, order_details })
}
