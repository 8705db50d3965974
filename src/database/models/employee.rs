use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::EmployeeNumber;

/// Row of the `employees` table. `role` holds the numeric role code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub struct Employee {
    pub employee_number: EmployeeNumber,
    pub last_name: String,
    pub first_name: String,
    pub extension: String,
    pub email: String,
    pub office_code: String,
    #[serde(default)]
    pub reports_to: Option<EmployeeNumber>,
    pub job_title: String,
    pub role: i32,
}
