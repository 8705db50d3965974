use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{CustomerNumber, EmployeeNumber};

/// Login account linked to exactly one employee or customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    /// Argon2 PHC string; never serialized back to clients
    #[serde(skip_serializing)]
    pub password: String,
    pub employee_number: Option<EmployeeNumber>,
    pub customer_number: Option<CustomerNumber>,
}
