use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{CustomerNumber, EmployeeNumber};

/// Row of the `customers` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub struct Customer {
    pub customer_number: CustomerNumber,
    pub customer_name: String,
    pub contact_last_name: String,
    pub contact_first_name: String,
    pub phone: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    pub country: String,
    #[serde(default)]
    pub sales_rep_employee_number: Option<EmployeeNumber>,
    #[serde(default)]
    pub credit_limit: Option<Decimal>,
}
