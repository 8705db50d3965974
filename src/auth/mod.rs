pub mod identity;
pub mod password;
pub mod policy;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{RoleCodes, SecurityConfig};
use crate::database::models::{Customer, Employee};
use crate::types::{CustomerNumber, EmployeeNumber};

pub use identity::{Identity, IdentityError, Principal};

/// Token payload. Employees carry `employeeNumber` + `officeCode`, customers carry
/// `customerNumber` + `salesRepEmployeeNumber`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub username: String,
    pub role: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_number: Option<EmployeeNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub office_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_number: Option<CustomerNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales_rep_employee_number: Option<EmployeeNumber>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    fn stamped(username: &str, role: i32, security: &SecurityConfig) -> Self {
        let now = Utc::now();
        Self {
            username: username.to_string(),
            role,
            employee_number: None,
            office_code: None,
            customer_number: None,
            sales_rep_employee_number: None,
            exp: (now + Duration::minutes(security.jwt_expiry_minutes)).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn for_employee(username: &str, employee: &Employee, security: &SecurityConfig) -> Self {
        Self {
            employee_number: Some(employee.employee_number),
            office_code: Some(employee.office_code.clone()),
            ..Self::stamped(username, employee.role, security)
        }
    }

    pub fn for_customer(username: &str, customer: &Customer, roles: &RoleCodes, security: &SecurityConfig) -> Self {
        Self {
            customer_number: Some(customer.customer_number),
            sales_rep_employee_number: customer.sales_rep_employee_number,
            ..Self::stamped(username, roles.customer, security)
        }
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT secret not configured")]
    InvalidSecret,

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),
}

pub fn generate_jwt(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }
    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key).map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

/// Verify signature and expiry (HS256)
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Claims>(token, &decoding_key, &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| JwtError::InvalidToken(e.to_string()))
}
