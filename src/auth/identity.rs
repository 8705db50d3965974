use serde::Serialize;
use thiserror::Error;

use super::Claims;
use crate::config::RoleCodes;
use crate::types::{CustomerNumber, EmployeeNumber, Role};

/// Business identity behind a verified token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Principal {
    #[serde(rename_all = "camelCase")]
    Employee {
        employee_number: EmployeeNumber,
        office_code: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Customer {
        customer_number: CustomerNumber,
        sales_rep_employee_number: Option<EmployeeNumber>,
    },
}

/// Authenticated caller, passed into every service operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub username: String,
    pub role: Role,
    pub principal: Principal,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("unknown role code {0}")]
    UnknownRole(i32),

    #[error("employee token without employee number")]
    MissingEmployeeNumber,

    #[error("customer token without customer number")]
    MissingCustomerNumber,

    #[error("token carries both an employee and a customer number")]
    Ambiguous,
}

impl Identity {
    pub fn from_claims(claims: Claims, roles: &RoleCodes) -> Result<Self, IdentityError> {
        let role = roles.role(claims.role).ok_or(IdentityError::UnknownRole(claims.role))?;
        if claims.employee_number.is_some() && claims.customer_number.is_some() {
            return Err(IdentityError::Ambiguous);
        }

        let principal = if role.is_employee() {
            Principal::Employee {
                employee_number: claims.employee_number.ok_or(IdentityError::MissingEmployeeNumber)?,
                office_code: claims.office_code,
            }
        } else {
            Principal::Customer {
                customer_number: claims.customer_number.ok_or(IdentityError::MissingCustomerNumber)?,
                sales_rep_employee_number: claims.sales_rep_employee_number,
            }
        };

        Ok(Self { username: claims.username, role, principal })
    }

    pub fn employee(username: &str, role: Role, employee_number: EmployeeNumber, office_code: &str) -> Self {
        Self {
            username: username.to_string(),
            role,
            principal: Principal::Employee {
                employee_number,
                office_code: Some(office_code.to_string()),
            },
        }
    }

    pub fn customer(username: &str, customer_number: CustomerNumber, sales_rep: Option<EmployeeNumber>) -> Self {
        Self {
            username: username.to_string(),
            role: Role::Customer,
            principal: Principal::Customer {
                customer_number,
                sales_rep_employee_number: sales_rep,
            },
        }
    }

    pub fn employee_number(&self) -> Option<EmployeeNumber> {
        match self.principal {
            Principal::Employee { employee_number, .. } => Some(employee_number),
            Principal::Customer { .. } => None,
        }
    }

    pub fn customer_number(&self) -> Option<CustomerNumber> {
        match self.principal {
            Principal::Customer { customer_number, .. } => Some(customer_number),
            Principal::Employee { .. } => None,
        }
    }

    pub fn office_code(&self) -> Option<&str> {
        match &self.principal {
            Principal::Employee { office_code, .. } => office_code.as_deref(),
            Principal::Customer { .. } => None,
        }
    }

    pub fn has_role(&self, allowed: &[Role]) -> bool {
        allowed.contains(&self.role)
    }
}
