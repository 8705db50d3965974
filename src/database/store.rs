use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::database::manager::DatabaseError;
use crate::database::models::{Customer, Employee, Order, OrderDetail, User};
use crate::database::patch::FieldPatch;
use crate::filter::SortDirection;
use crate::types::{CustomerNumber, EmployeeNumber, OrderNumber, OrderStatus, Pagination};

pub type StoreResult<T> = Result<T, DatabaseError>;

/// One page of a listing plus the number of rows matching the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing<T> {
    pub total: i64,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerQuery {
    /// `None` lists every customer; `Some` restricts to these sales reps.
    pub sales_reps: Option<Vec<EmployeeNumber>>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDateColumn {
    OrderDate,
    RequiredDate,
    ShippedDate,
}

impl OrderDateColumn {
    pub fn column(&self) -> &'static str {
        match self {
            OrderDateColumn::OrderDate => "orderDate",
            OrderDateColumn::RequiredDate => "requiredDate",
            OrderDateColumn::ShippedDate => "shippedDate",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderQuery {
    pub customer_number: Option<CustomerNumber>,
    pub status: Option<OrderStatus>,
    pub sort: Vec<(OrderDateColumn, SortDirection)>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmployeeQuery {
    pub employee_number: Option<EmployeeNumber>,
    pub office_code: Option<String>,
    pub role: Option<i32>,
    pub pagination: Pagination,
}

/// Changes applied by an order patch. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderChanges {
    pub status: Option<OrderStatus>,
    pub required_date: Option<NaiveDate>,
    pub shipped_date: Option<NaiveDate>,
}

/// Record store used by the services. Reads and single-statement writes run directly
/// against the store; multi-step writes go through [`StoreTransaction`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;
    async fn ping(&self) -> StoreResult<()>;

    async fn find_employee(&self, employee_number: EmployeeNumber) -> StoreResult<Option<Employee>>;
    /// Employees whose `reportsTo` is the given employee (one level only).
    async fn direct_reports(&self, employee_number: EmployeeNumber) -> StoreResult<Vec<EmployeeNumber>>;
    async fn list_employees(&self, query: &EmployeeQuery) -> StoreResult<Listing<Employee>>;
    async fn insert_employee(&self, employee: &Employee) -> StoreResult<Option<Employee>>;
    async fn patch_employee(&self, employee_number: EmployeeNumber, patch: &FieldPatch) -> StoreResult<Option<Employee>>;
    async fn delete_employee(&self, employee_number: EmployeeNumber) -> StoreResult<u64>;

    async fn find_customer(&self, customer_number: CustomerNumber) -> StoreResult<Option<Customer>>;
    async fn list_customers(&self, query: &CustomerQuery) -> StoreResult<Listing<Customer>>;
    async fn insert_customer(&self, customer: &Customer) -> StoreResult<Option<Customer>>;
    async fn patch_customer(&self, customer_number: CustomerNumber, patch: &FieldPatch) -> StoreResult<Option<Customer>>;

    async fn find_order(&self, order_number: OrderNumber) -> StoreResult<Option<Order>>;
    async fn order_details(&self, order_number: OrderNumber) -> StoreResult<Vec<OrderDetail>>;
    async fn list_orders(&self, query: &OrderQuery) -> StoreResult<Listing<Order>>;
    async fn patch_order(&self, order_number: OrderNumber, changes: &OrderChanges) -> StoreResult<Option<Order>>;

    async fn find_user(&self, username: &str) -> StoreResult<Option<User>>;
    async fn find_user_for_customer(&self, customer_number: CustomerNumber) -> StoreResult<Option<User>>;
    async fn find_user_for_employee(&self, employee_number: EmployeeNumber) -> StoreResult<Option<User>>;
    async fn insert_user(&self, user: &User) -> StoreResult<Option<User>>;
}

/// Write scope over the store. Consumed by exactly one of `commit` / `rollback`.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn find_customer(&mut self, customer_number: CustomerNumber) -> StoreResult<Option<Customer>>;
    async fn find_employee(&mut self, employee_number: EmployeeNumber) -> StoreResult<Option<Employee>>;
    async fn insert_customer(&mut self, customer: &Customer) -> StoreResult<Option<Customer>>;
    async fn patch_customer(&mut self, customer_number: CustomerNumber, patch: &FieldPatch) -> StoreResult<Option<Customer>>;
    async fn delete_customer(&mut self, customer_number: CustomerNumber) -> StoreResult<u64>;
    async fn delete_customer_payments(&mut self, customer_number: CustomerNumber) -> StoreResult<u64>;
    async fn delete_customer_users(&mut self, customer_number: CustomerNumber) -> StoreResult<u64>;

    async fn insert_order(&mut self, order: &Order) -> StoreResult<Option<Order>>;
    async fn insert_order_detail(&mut self, detail: &OrderDetail) -> StoreResult<Option<OrderDetail>>;
    async fn delete_order_details(&mut self, order_number: OrderNumber) -> StoreResult<u64>;
    async fn delete_order(&mut self, order_number: OrderNumber) -> StoreResult<u64>;

    async fn insert_user(&mut self, user: &User) -> StoreResult<Option<User>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
