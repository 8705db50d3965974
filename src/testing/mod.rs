//! In-memory record store for unit tests.
//!
//! A transaction works on a copy of the tables and publishes it on commit, so a
//! rollback (or a dropped transaction) leaves no trace. Faults can be armed to make
//! individual writes fail.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::database::manager::DatabaseError;
use crate::database::models::{Customer, Employee, Order, OrderDetail, User};
use crate::database::patch::FieldPatch;
use crate::database::store::{
    CustomerQuery, EmployeeQuery, Listing, OrderChanges, OrderQuery, RecordStore, StoreResult, StoreTransaction,
};
use crate::filter::SortDirection;
use crate::types::{CustomerNumber, EmployeeNumber, OrderNumber, Pagination};

#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub customer_number: CustomerNumber,
    pub check_number: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    pub employees: BTreeMap<EmployeeNumber, Employee>,
    pub customers: BTreeMap<CustomerNumber, Customer>,
    pub orders: BTreeMap<OrderNumber, Order>,
    pub order_details: Vec<OrderDetail>,
    pub payments: Vec<Payment>,
    pub users: BTreeMap<String, User>,
}

#[derive(Debug, Clone, Default)]
struct Faults {
    /// 1-based index of the detail insert (within one transaction) that fails
    fail_detail_insert: Option<usize>,
    fail_order_delete: bool,
    order_insert_returns_nothing: bool,
    /// Stops reporting existing orders from `find_order`, to simulate a racing insert
    hide_orders: bool,
}

#[derive(Debug, Default)]
struct Counters {
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Mutex<Faults>>,
    counters: Arc<Counters>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn injected(what: &str) -> DatabaseError {
    DatabaseError::QueryError(format!("injected failure: {}", what))
}

fn page<T: Clone>(rows: Vec<T>, pagination: &Pagination) -> Listing<T> {
    let total = rows.len() as i64;
    let items = rows
        .into_iter()
        .skip(pagination.offset().max(0) as usize)
        .take(pagination.limit.max(0) as usize)
        .collect();
    Listing { total, items }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a slice of the classic sales schema (see [`fixtures`]).
    pub fn classic() -> Self {
        let store = Self::new();
        *lock(&store.tables) = fixtures::classic_tables();
        store
    }

    pub fn snapshot(&self) -> Tables {
        lock(&self.tables).clone()
    }

    pub fn fail_detail_insert(&self, nth: usize) {
        lock(&self.faults).fail_detail_insert = Some(nth);
    }

    pub fn fail_order_delete(&self) {
        lock(&self.faults).fail_order_delete = true;
    }

    pub fn order_insert_returns_nothing(&self) {
        lock(&self.faults).order_insert_returns_nothing = true;
    }

    pub fn hide_orders(&self) {
        lock(&self.faults).hide_orders = true;
    }

    pub fn begins(&self) -> usize {
        self.counters.begins.load(AtomicOrdering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.counters.commits.load(AtomicOrdering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.counters.rollbacks.load(AtomicOrdering::SeqCst)
    }

    pub fn add_payment(&self, customer_number: CustomerNumber, check_number: &str, amount: Decimal) {
        lock(&self.tables).payments.push(Payment {
            customer_number,
            check_number: check_number.to_string(),
            amount,
        });
    }

    pub fn add_user(&self, user: User) {
        lock(&self.tables).users.insert(user.username.clone(), user);
    }
}

fn sort_orders(rows: &mut [Order], sort: &[(crate::database::store::OrderDateColumn, SortDirection)]) {
    use crate::database::store::OrderDateColumn;
    rows.sort_by(|a, b| {
        for (column, direction) in sort {
            let ordering = match column {
                OrderDateColumn::OrderDate => a.order_date.cmp(&b.order_date),
                OrderDateColumn::RequiredDate => a.required_date.cmp(&b.required_date),
                OrderDateColumn::ShippedDate => a.shipped_date.cmp(&b.shipped_date),
            };
            let ordering = if *direction == SortDirection::Desc { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.order_number.cmp(&b.order_number)
    });
}

fn apply_order_changes(order: &mut Order, changes: &OrderChanges) {
    if let Some(status) = changes.status {
        order.status = status;
    }
    if let Some(date) = changes.required_date {
        order.required_date = date;
    }
    if let Some(date) = changes.shipped_date {
        order.shipped_date = Some(date);
    }
}

fn patched<T>(record: &T, patch: &FieldPatch) -> StoreResult<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    patch.apply_to(record).map_err(|e| DatabaseError::QueryError(e.to_string()))
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        self.counters.begins.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(Box::new(MemoryTransaction {
            working: self.snapshot(),
            detail_inserts: 0,
            store: self.clone(),
        }))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_employee(&self, employee_number: EmployeeNumber) -> StoreResult<Option<Employee>> {
        Ok(lock(&self.tables).employees.get(&employee_number).cloned())
    }

    async fn direct_reports(&self, employee_number: EmployeeNumber) -> StoreResult<Vec<EmployeeNumber>> {
        Ok(lock(&self.tables)
            .employees
            .values()
            .filter(|e| e.reports_to == Some(employee_number))
            .map(|e| e.employee_number)
            .collect())
    }

    async fn list_employees(&self, query: &EmployeeQuery) -> StoreResult<Listing<Employee>> {
        let rows: Vec<Employee> = lock(&self.tables)
            .employees
            .values()
            .filter(|e| query.employee_number.map_or(true, |n| e.employee_number == n))
            .filter(|e| query.office_code.as_ref().map_or(true, |o| &e.office_code == o))
            .filter(|e| query.role.map_or(true, |r| e.role == r))
            .cloned()
            .collect();
        Ok(page(rows, &query.pagination))
    }

    async fn insert_employee(&self, employee: &Employee) -> StoreResult<Option<Employee>> {
        let mut tables = lock(&self.tables);
        if tables.employees.contains_key(&employee.employee_number) {
            return Err(DatabaseError::Conflict("employees_pkey".into()));
        }
        tables.employees.insert(employee.employee_number, employee.clone());
        Ok(Some(employee.clone()))
    }

    async fn patch_employee(&self, employee_number: EmployeeNumber, patch: &FieldPatch) -> StoreResult<Option<Employee>> {
        let mut tables = lock(&self.tables);
        let Some(existing) = tables.employees.get(&employee_number) else {
            return Ok(None);
        };
        let updated = patched(existing, patch)?;
        tables.employees.insert(employee_number, updated.clone());
        Ok(Some(updated))
    }

    async fn delete_employee(&self, employee_number: EmployeeNumber) -> StoreResult<u64> {
        Ok(lock(&self.tables).employees.remove(&employee_number).map_or(0, |_| 1))
    }

    async fn find_customer(&self, customer_number: CustomerNumber) -> StoreResult<Option<Customer>> {
        Ok(lock(&self.tables).customers.get(&customer_number).cloned())
    }

    async fn list_customers(&self, query: &CustomerQuery) -> StoreResult<Listing<Customer>> {
        let rows: Vec<Customer> = lock(&self.tables)
            .customers
            .values()
            .filter(|c| match &query.sales_reps {
                Some(reps) => c.sales_rep_employee_number.map_or(false, |rep| reps.contains(&rep)),
                None => true,
            })
            .cloned()
            .collect();
        Ok(page(rows, &query.pagination))
    }

    async fn insert_customer(&self, customer: &Customer) -> StoreResult<Option<Customer>> {
        let mut tables = lock(&self.tables);
        if tables.customers.contains_key(&customer.customer_number) {
            return Err(DatabaseError::Conflict("customers_pkey".into()));
        }
        tables.customers.insert(customer.customer_number, customer.clone());
        Ok(Some(customer.clone()))
    }

    async fn patch_customer(&self, customer_number: CustomerNumber, patch: &FieldPatch) -> StoreResult<Option<Customer>> {
        let mut tables = lock(&self.tables);
        let Some(existing) = tables.customers.get(&customer_number) else {
            return Ok(None);
        };
        let updated = patched(existing, patch)?;
        tables.customers.insert(customer_number, updated.clone());
        Ok(Some(updated))
    }

    async fn find_order(&self, order_number: OrderNumber) -> StoreResult<Option<Order>> {
        if lock(&self.faults).hide_orders {
            return Ok(None);
        }
        Ok(lock(&self.tables).orders.get(&order_number).cloned())
    }

    async fn order_details(&self, order_number: OrderNumber) -> StoreResult<Vec<OrderDetail>> {
        let mut details: Vec<OrderDetail> = lock(&self.tables)
            .order_details
            .iter()
            .filter(|d| d.order_number == order_number)
            .cloned()
            .collect();
        details.sort_by_key(|d| d.order_line_number);
        Ok(details)
    }

    async fn list_orders(&self, query: &OrderQuery) -> StoreResult<Listing<Order>> {
        let mut rows: Vec<Order> = lock(&self.tables)
            .orders
            .values()
            .filter(|o| query.customer_number.map_or(true, |n| o.customer_number == n))
            .filter(|o| query.status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        sort_orders(&mut rows, &query.sort);
        Ok(page(rows, &query.pagination))
    }

    async fn patch_order(&self, order_number: OrderNumber, changes: &OrderChanges) -> StoreResult<Option<Order>> {
        let mut tables = lock(&self.tables);
        Ok(tables.orders.get_mut(&order_number).map(|order| {
            apply_order_changes(order, changes);
            order.clone()
        }))
    }

    async fn find_user(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(lock(&self.tables).users.get(username).cloned())
    }

    async fn find_user_for_customer(&self, customer_number: CustomerNumber) -> StoreResult<Option<User>> {
        Ok(lock(&self.tables)
            .users
            .values()
            .find(|u| u.customer_number == Some(customer_number))
            .cloned())
    }

    async fn find_user_for_employee(&self, employee_number: EmployeeNumber) -> StoreResult<Option<User>> {
        Ok(lock(&self.tables)
            .users
            .values()
            .find(|u| u.employee_number == Some(employee_number))
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<Option<User>> {
        let mut tables = lock(&self.tables);
        if tables.users.contains_key(&user.username) {
            return Err(DatabaseError::Conflict("users_pkey".into()));
        }
        tables.users.insert(user.username.clone(), user.clone());
        Ok(Some(user.clone()))
    }
}

pub struct MemoryTransaction {
    working: Tables,
    detail_inserts: usize,
    store: MemoryStore,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_customer(&mut self, customer_number: CustomerNumber) -> StoreResult<Option<Customer>> {
        Ok(self.working.customers.get(&customer_number).cloned())
    }

    async fn find_employee(&mut self, employee_number: EmployeeNumber) -> StoreResult<Option<Employee>> {
        Ok(self.working.employees.get(&employee_number).cloned())
    }

    async fn insert_customer(&mut self, customer: &Customer) -> StoreResult<Option<Customer>> {
        if self.working.customers.contains_key(&customer.customer_number) {
            return Err(DatabaseError::Conflict("customers_pkey".into()));
        }
        self.working.customers.insert(customer.customer_number, customer.clone());
        Ok(Some(customer.clone()))
    }

    async fn patch_customer(&mut self, customer_number: CustomerNumber, patch: &FieldPatch) -> StoreResult<Option<Customer>> {
        let Some(existing) = self.working.customers.get(&customer_number) else {
            return Ok(None);
        };
        let updated = patched(existing, patch)?;
        self.working.customers.insert(customer_number, updated.clone());
        Ok(Some(updated))
    }

    async fn delete_customer(&mut self, customer_number: CustomerNumber) -> StoreResult<u64> {
        Ok(self.working.customers.remove(&customer_number).map_or(0, |_| 1))
    }

    async fn delete_customer_payments(&mut self, customer_number: CustomerNumber) -> StoreResult<u64> {
        let before = self.working.payments.len();
        self.working.payments.retain(|p| p.customer_number != customer_number);
        Ok((before - self.working.payments.len()) as u64)
    }

    async fn delete_customer_users(&mut self, customer_number: CustomerNumber) -> StoreResult<u64> {
        let before = self.working.users.len();
        self.working.users.retain(|_, u| u.customer_number != Some(customer_number));
        Ok((before - self.working.users.len()) as u64)
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<Option<Order>> {
        if lock(&self.store.faults).order_insert_returns_nothing {
            return Ok(None);
        }
        if self.working.orders.contains_key(&order.order_number) {
            return Err(DatabaseError::Conflict("orders_pkey".into()));
        }
        self.working.orders.insert(order.order_number, order.clone());
        Ok(Some(order.clone()))
    }

    async fn insert_order_detail(&mut self, detail: &OrderDetail) -> StoreResult<Option<OrderDetail>> {
        self.detail_inserts += 1;
        if lock(&self.store.faults).fail_detail_insert == Some(self.detail_inserts) {
            return Err(injected("orderdetails insert"));
        }
        let duplicate = self
            .working
            .order_details
            .iter()
            .any(|d| d.order_number == detail.order_number && d.product_code == detail.product_code);
        if duplicate {
            return Err(DatabaseError::Conflict("orderdetails_pkey".into()));
        }
        self.working.order_details.push(detail.clone());
        Ok(Some(detail.clone()))
    }

    async fn delete_order_details(&mut self, order_number: OrderNumber) -> StoreResult<u64> {
        let before = self.working.order_details.len();
        self.working.order_details.retain(|d| d.order_number != order_number);
        Ok((before - self.working.order_details.len()) as u64)
    }

    async fn delete_order(&mut self, order_number: OrderNumber) -> StoreResult<u64> {
        if lock(&self.store.faults).fail_order_delete {
            return Err(injected("orders delete"));
        }
        Ok(self.working.orders.remove(&order_number).map_or(0, |_| 1))
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<Option<User>> {
        if self.working.users.contains_key(&user.username) {
            return Err(DatabaseError::Conflict("users_pkey".into()));
        }
        self.working.users.insert(user.username.clone(), user.clone());
        Ok(Some(user.clone()))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.store.counters.commits.fetch_add(1, AtomicOrdering::SeqCst);
        *lock(&self.store.tables) = self.working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.store.counters.rollbacks.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }
}

/// Records from the classic sales sample data.
pub mod fixtures {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{Payment, Tables};
    use crate::auth::password::hash_password;
    use crate::auth::Identity;
    use crate::database::models::{Customer, Employee, Order, OrderDetail, User};
    use crate::types::{CustomerNumber, EmployeeNumber, OrderNumber, OrderStatus, Role};

    pub const PASSWORD: &str = "p4ssword!";

    pub fn admin() -> Identity {
        Identity::employee("dmurphy", Role::Admin, 1002, "1")
    }

    /// Manages 1337 and 1370 in office 4
    pub fn manager() -> Identity {
        Identity::employee("wpatterson", Role::Manager, 1102, "4")
    }

    /// Sales rep of customer 112, no reports
    pub fn staff() -> Identity {
        Identity::employee("lthompson", Role::Staff, 1166, "1")
    }

    /// Customer 103, served by 1370
    pub fn carine() -> Identity {
        Identity::customer("carine", 103, Some(1370))
    }

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn employee(number: EmployeeNumber, reports_to: Option<EmployeeNumber>, office: &str, role: i32) -> Employee {
        Employee {
            employee_number: number,
            last_name: format!("Last{}", number),
            first_name: format!("First{}", number),
            extension: format!("x{}", number % 10000),
            email: format!("e{}@classicmodelcars.com", number),
            office_code: office.to_string(),
            reports_to,
            job_title: if role == 3 { "Sales Rep".into() } else { "Sales Manager".into() },
            role,
        }
    }

    pub fn customer(number: CustomerNumber, sales_rep: Option<EmployeeNumber>) -> Customer {
        Customer {
            customer_number: number,
            customer_name: format!("Customer {}", number),
            contact_last_name: "Schmitt".into(),
            contact_first_name: "Carine".into(),
            phone: "40.32.2555".into(),
            address_line1: "54, rue Royale".into(),
            address_line2: None,
            city: "Nantes".into(),
            state: None,
            postal_code: Some("44000".into()),
            country: "France".into(),
            sales_rep_employee_number: sales_rep,
            credit_limit: Some(Decimal::new(2100000, 2)),
        }
    }

    pub fn order(number: OrderNumber, customer_number: CustomerNumber, status: OrderStatus) -> Order {
        Order {
            order_number: number,
            order_date: date(2003, 1, 6),
            required_date: date(2003, 1, 13),
            shipped_date: (status == OrderStatus::Shipped).then(|| date(2003, 1, 10)),
            status,
            comments: None,
            customer_number,
        }
    }

    pub fn detail(order_number: OrderNumber, product_code: &str, line: i16) -> OrderDetail {
        OrderDetail {
            order_number,
            product_code: product_code.to_string(),
            quantity_ordered: 30,
            price_each: Decimal::new(13666, 2),
            order_line_number: line,
        }
    }

    pub fn customer_user(username: &str, customer_number: CustomerNumber) -> User {
        User {
            username: username.to_string(),
            password: hash_password(PASSWORD).unwrap(),
            employee_number: None,
            customer_number: Some(customer_number),
        }
    }

    pub fn employee_user(username: &str, employee_number: EmployeeNumber) -> User {
        User {
            username: username.to_string(),
            password: hash_password(PASSWORD).unwrap(),
            employee_number: Some(employee_number),
            customer_number: None,
        }
    }

    /// Reporting line:
    ///
    /// ```text
    /// 1002 (admin, office 1)
    /// └─ 1056 (manager, office 1)
    ///    ├─ 1088 (manager, office 6) ── 1611, 1612
    ///    ├─ 1102 (manager, office 4) ── 1337, 1370
    ///    └─ 1143 (manager, office 1) ── 1165, 1166
    /// ```
    pub fn classic_tables() -> Tables {
        let mut tables = Tables::default();
        for e in [
            employee(1002, None, "1", 1),
            employee(1056, Some(1002), "1", 2),
            employee(1088, Some(1056), "6", 2),
            employee(1102, Some(1056), "4", 2),
            employee(1143, Some(1056), "1", 2),
            employee(1165, Some(1143), "1", 3),
            employee(1166, Some(1143), "1", 3),
            employee(1337, Some(1102), "4", 3),
            employee(1370, Some(1102), "4", 3),
            employee(1611, Some(1088), "6", 3),
            employee(1612, Some(1088), "6", 3),
        ] {
            tables.employees.insert(e.employee_number, e);
        }

        for c in [
            customer(103, Some(1370)),
            customer(112, Some(1166)),
            customer(114, Some(1611)),
            customer(119, Some(1370)),
            customer(121, Some(1102)),
            customer(125, None),
        ] {
            tables.customers.insert(c.customer_number, c);
        }

        for o in [
            order(10123, 103, OrderStatus::Shipped),
            order(10298, 103, OrderStatus::InProcess),
            order(10124, 112, OrderStatus::Shipped),
            order(10120, 114, OrderStatus::InProcess),
            order(10275, 119, OrderStatus::OnHold),
        ] {
            tables.orders.insert(o.order_number, o);
        }
        tables.order_details = vec![
            detail(10123, "S18_1589", 1),
            detail(10123, "S18_2870", 2),
            detail(10298, "S10_2016", 1),
            detail(10124, "S18_1749", 1),
            detail(10120, "S10_2016", 1),
        ];

        tables.payments = vec![
            Payment { customer_number: 103, check_number: "HQ336336".into(), amount: Decimal::new(626218, 2) },
            Payment { customer_number: 103, check_number: "JM555205".into(), amount: Decimal::new(1464423, 2) },
            Payment { customer_number: 112, check_number: "BO864823".into(), amount: Decimal::new(1456714, 2) },
        ];
        tables
    }
}
