use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sqlx::{postgres::PgArguments, query::QueryAs, PgConnection, PgPool, Postgres, Transaction};
use tracing::debug;

use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::{Customer, Employee, Order, OrderDetail, User};
use crate::database::patch::{FieldPatch, PatchValue};
use crate::database::repository::Repository;
use crate::database::store::{
    CustomerQuery, EmployeeQuery, Listing, OrderChanges, OrderQuery, RecordStore, StoreResult, StoreTransaction,
};
use crate::filter::FilterData;
use crate::types::{CustomerNumber, EmployeeNumber, OrderNumber, Pagination};

const CUSTOMER_INSERT: &str = r#"INSERT INTO "customers" ("customerNumber", "customerName", "contactLastName",
    "contactFirstName", "phone", "addressLine1", "addressLine2", "city", "state", "postalCode", "country",
    "salesRepEmployeeNumber", "creditLimit")
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING *"#;

const EMPLOYEE_INSERT: &str = r#"INSERT INTO "employees" ("employeeNumber", "lastName", "firstName", "extension",
    "email", "officeCode", "reportsTo", "jobTitle", "role")
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *"#;

const USER_INSERT: &str = r#"INSERT INTO "users" ("username", "password", "employeeNumber", "customerNumber")
    VALUES ($1, $2, $3, $4) RETURNING *"#;

/// PostgreSQL-backed record store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn paged(where_clause: Value, order: Value, pagination: &Pagination) -> FilterData {
        FilterData {
            where_clause: Some(where_clause),
            order: Some(order),
            limit: Some(pagination.limit),
            offset: Some(pagination.offset()),
        }
    }

    fn by_key(column: &str, value: i32) -> FilterData {
        FilterData {
            where_clause: Some(json!({ column: value })),
            ..Default::default()
        }
    }
}

fn bind_customer<'q>(
    q: QueryAs<'q, Postgres, Customer, PgArguments>,
    c: &'q Customer,
) -> QueryAs<'q, Postgres, Customer, PgArguments> {
    q.bind(c.customer_number)
        .bind(&c.customer_name)
        .bind(&c.contact_last_name)
        .bind(&c.contact_first_name)
        .bind(&c.phone)
        .bind(&c.address_line1)
        .bind(&c.address_line2)
        .bind(&c.city)
        .bind(&c.state)
        .bind(&c.postal_code)
        .bind(&c.country)
        .bind(c.sales_rep_employee_number)
        .bind(c.credit_limit)
}

/// Integer columns in this schema are INT4.
fn int4(column: &str, value: Option<i64>) -> StoreResult<Option<i32>> {
    value
        .map(i32::try_from)
        .transpose()
        .map_err(|_| DatabaseError::QueryError(format!("{} is out of range for an integer column", column)))
}

/// `UPDATE "table" SET "a" = $1, "b" = $2 WHERE "key" = $3 RETURNING *`, binding each
/// value with the type of its column so NULLs land on the right column type.
async fn patch_row<T>(
    conn: &mut PgConnection,
    table: &str,
    key_column: &str,
    key: i32,
    patch: &FieldPatch,
) -> StoreResult<Option<T>>
where
    T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
{
    if patch.is_empty() {
        return Err(DatabaseError::QueryError("empty patch".to_string()));
    }
    let assignments: Vec<String> = patch
        .iter()
        .enumerate()
        .map(|(i, (column, _))| format!("\"{}\" = ${}", column, i + 1))
        .collect();
    let sql = format!(
        "UPDATE \"{}\" SET {} WHERE \"{}\" = ${} RETURNING *",
        table,
        assignments.join(", "),
        key_column,
        assignments.len() + 1
    );
    debug!("patch: {}", sql);

    let mut q = sqlx::query_as::<_, T>(&sql);
    for (column, value) in patch.iter() {
        q = match value {
            PatchValue::Text(v) => q.bind(v.clone()),
            PatchValue::Integer(v) => q.bind(int4(column, *v)?),
            PatchValue::Decimal(v) => q.bind(*v),
        };
    }
    Ok(q.bind(key).fetch_optional(conn).await?)
}

#[async_trait]
impl RecordStore for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn ping(&self) -> StoreResult<()> {
        DatabaseManager::health_check(&self.pool).await
    }

    async fn find_employee(&self, employee_number: EmployeeNumber) -> StoreResult<Option<Employee>> {
        Repository::<Employee>::new("employees", self.pool.clone())
            .select_one(Self::by_key("employeeNumber", employee_number))
            .await
    }

    async fn direct_reports(&self, employee_number: EmployeeNumber) -> StoreResult<Vec<EmployeeNumber>> {
        let rows: Vec<(i32,)> = sqlx::query_as(r#"SELECT "employeeNumber" FROM "employees" WHERE "reportsTo" = $1"#)
            .bind(employee_number)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(n,)| n).collect())
    }

    async fn list_employees(&self, query: &EmployeeQuery) -> StoreResult<Listing<Employee>> {
        let mut conditions = Map::new();
        if let Some(n) = query.employee_number {
            conditions.insert("employeeNumber".into(), json!(n));
        }
        if let Some(office) = &query.office_code {
            conditions.insert("officeCode".into(), json!(office));
        }
        if let Some(role) = query.role {
            conditions.insert("role".into(), json!(role));
        }
        Repository::<Employee>::new("employees", self.pool.clone())
            .select_page(Self::paged(Value::Object(conditions), json!("employeeNumber"), &query.pagination))
            .await
    }

    async fn insert_employee(&self, e: &Employee) -> StoreResult<Option<Employee>> {
        Ok(sqlx::query_as::<_, Employee>(EMPLOYEE_INSERT)
            .bind(e.employee_number)
            .bind(&e.last_name)
            .bind(&e.first_name)
            .bind(&e.extension)
            .bind(&e.email)
            .bind(&e.office_code)
            .bind(e.reports_to)
            .bind(&e.job_title)
            .bind(e.role)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn patch_employee(&self, employee_number: EmployeeNumber, patch: &FieldPatch) -> StoreResult<Option<Employee>> {
        let mut conn = self.pool.acquire().await?;
        patch_row(&mut conn, "employees", "employeeNumber", employee_number, patch).await
    }

    async fn delete_employee(&self, employee_number: EmployeeNumber) -> StoreResult<u64> {
        let result = sqlx::query(r#"DELETE FROM "employees" WHERE "employeeNumber" = $1"#)
            .bind(employee_number)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_customer(&self, customer_number: CustomerNumber) -> StoreResult<Option<Customer>> {
        Repository::<Customer>::new("customers", self.pool.clone())
            .select_one(Self::by_key("customerNumber", customer_number))
            .await
    }

    async fn list_customers(&self, query: &CustomerQuery) -> StoreResult<Listing<Customer>> {
        let where_clause = match &query.sales_reps {
            Some(reps) => json!({ "salesRepEmployeeNumber": { "$in": reps } }),
            None => json!({}),
        };
        Repository::<Customer>::new("customers", self.pool.clone())
            .select_page(Self::paged(where_clause, json!("customerNumber"), &query.pagination))
            .await
    }

    async fn insert_customer(&self, customer: &Customer) -> StoreResult<Option<Customer>> {
        let q = bind_customer(sqlx::query_as::<_, Customer>(CUSTOMER_INSERT), customer);
        Ok(q.fetch_optional(&self.pool).await?)
    }

    async fn patch_customer(&self, customer_number: CustomerNumber, patch: &FieldPatch) -> StoreResult<Option<Customer>> {
        let mut conn = self.pool.acquire().await?;
        patch_row(&mut conn, "customers", "customerNumber", customer_number, patch).await
    }

    async fn find_order(&self, order_number: OrderNumber) -> StoreResult<Option<Order>> {
        Repository::<Order>::new("orders", self.pool.clone())
            .select_one(Self::by_key("orderNumber", order_number))
            .await
    }

    async fn order_details(&self, order_number: OrderNumber) -> StoreResult<Vec<OrderDetail>> {
        Repository::<OrderDetail>::new("orderdetails", self.pool.clone())
            .select_any(FilterData {
                where_clause: Some(json!({ "orderNumber": order_number })),
                order: Some(json!("orderLineNumber")),
                ..Default::default()
            })
            .await
    }

    async fn list_orders(&self, query: &OrderQuery) -> StoreResult<Listing<Order>> {
        let mut conditions = Map::new();
        if let Some(n) = query.customer_number {
            conditions.insert("customerNumber".into(), json!(n));
        }
        if let Some(status) = query.status {
            conditions.insert("status".into(), json!(status.as_str()));
        }
        let mut order: Vec<Value> = query
            .sort
            .iter()
            .map(|(column, direction)| json!(format!("{} {}", column.column(), direction.to_sql())))
            .collect();
        order.push(json!("orderNumber"));

        Repository::<Order>::new("orders", self.pool.clone())
            .select_page(Self::paged(Value::Object(conditions), Value::Array(order), &query.pagination))
            .await
    }

    async fn patch_order(&self, order_number: OrderNumber, changes: &OrderChanges) -> StoreResult<Option<Order>> {
        Ok(sqlx::query_as::<_, Order>(
            r#"UPDATE "orders" SET
                "status" = COALESCE($1, "status"),
                "requiredDate" = COALESCE($2, "requiredDate"),
                "shippedDate" = COALESCE($3, "shippedDate")
            WHERE "orderNumber" = $4 RETURNING *"#,
        )
        .bind(changes.status.map(|s| s.as_str()))
        .bind(changes.required_date)
        .bind(changes.shipped_date)
        .bind(order_number)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_user(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(r#"SELECT * FROM "users" WHERE "username" = $1"#)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_for_customer(&self, customer_number: CustomerNumber) -> StoreResult<Option<User>> {
        Repository::<User>::new("users", self.pool.clone())
            .select_one(Self::by_key("customerNumber", customer_number))
            .await
    }

    async fn find_user_for_employee(&self, employee_number: EmployeeNumber) -> StoreResult<Option<User>> {
        Repository::<User>::new("users", self.pool.clone())
            .select_one(Self::by_key("employeeNumber", employee_number))
            .await
    }

    async fn insert_user(&self, user: &User) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(USER_INSERT)
            .bind(&user.username)
            .bind(&user.password)
            .bind(user.employee_number)
            .bind(user.customer_number)
            .fetch_optional(&self.pool)
            .await?)
    }
}

/// Open database transaction. Dropping it without `commit` rolls back.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn find_customer(&mut self, customer_number: CustomerNumber) -> StoreResult<Option<Customer>> {
        Ok(sqlx::query_as::<_, Customer>(r#"SELECT * FROM "customers" WHERE "customerNumber" = $1"#)
            .bind(customer_number)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn find_employee(&mut self, employee_number: EmployeeNumber) -> StoreResult<Option<Employee>> {
        Ok(sqlx::query_as::<_, Employee>(r#"SELECT * FROM "employees" WHERE "employeeNumber" = $1"#)
            .bind(employee_number)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn insert_customer(&mut self, customer: &Customer) -> StoreResult<Option<Customer>> {
        let q = bind_customer(sqlx::query_as::<_, Customer>(CUSTOMER_INSERT), customer);
        Ok(q.fetch_optional(&mut *self.tx).await?)
    }

    async fn patch_customer(&mut self, customer_number: CustomerNumber, patch: &FieldPatch) -> StoreResult<Option<Customer>> {
        patch_row(&mut self.tx, "customers", "customerNumber", customer_number, patch).await
    }

    async fn delete_customer(&mut self, customer_number: CustomerNumber) -> StoreResult<u64> {
        let result = sqlx::query(r#"DELETE FROM "customers" WHERE "customerNumber" = $1"#)
            .bind(customer_number)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_customer_payments(&mut self, customer_number: CustomerNumber) -> StoreResult<u64> {
        let result = sqlx::query(r#"DELETE FROM "payments" WHERE "customerNumber" = $1"#)
            .bind(customer_number)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_customer_users(&mut self, customer_number: CustomerNumber) -> StoreResult<u64> {
        let result = sqlx::query(r#"DELETE FROM "users" WHERE "customerNumber" = $1"#)
            .bind(customer_number)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_order(&mut self, order: &Order) -> StoreResult<Option<Order>> {
        Ok(sqlx::query_as::<_, Order>(
            r#"INSERT INTO "orders" ("orderNumber", "orderDate", "requiredDate", "shippedDate", "status",
                "comments", "customerNumber")
            VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *"#,
        )
        .bind(order.order_number)
        .bind(order.order_date)
        .bind(order.required_date)
        .bind(order.shipped_date)
        .bind(order.status.as_str())
        .bind(&order.comments)
        .bind(order.customer_number)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn insert_order_detail(&mut self, detail: &OrderDetail) -> StoreResult<Option<OrderDetail>> {
        Ok(sqlx::query_as::<_, OrderDetail>(
            r#"INSERT INTO "orderdetails" ("orderNumber", "productCode", "quantityOrdered", "priceEach",
                "orderLineNumber")
            VALUES ($1, $2, $3, $4, $5) RETURNING *"#,
        )
        .bind(detail.order_number)
        .bind(&detail.product_code)
        .bind(detail.quantity_ordered)
        .bind(detail.price_each)
        .bind(detail.order_line_number)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn delete_order_details(&mut self, order_number: OrderNumber) -> StoreResult<u64> {
        let result = sqlx::query(r#"DELETE FROM "orderdetails" WHERE "orderNumber" = $1"#)
            .bind(order_number)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_order(&mut self, order_number: OrderNumber) -> StoreResult<u64> {
        let result = sqlx::query(r#"DELETE FROM "orders" WHERE "orderNumber" = $1"#)
            .bind(order_number)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(USER_INSERT)
            .bind(&user.username)
            .bind(&user.password)
            .bind(user.employee_number)
            .bind(user.customer_number)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
