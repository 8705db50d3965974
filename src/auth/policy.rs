//! Role rules for customers and orders.
//!
//! Everything here is a pure function of the caller and the target record. Rules that
//! depend on the reporting line return [`Rule::SalesTeam`]; the caller expands it into a
//! [`Scope`] with the hierarchy resolver before checking the target.

use std::collections::BTreeSet;

use crate::auth::Identity;
use crate::database::models::Order;
use crate::services::error::Rejection;
use crate::types::{CustomerNumber, EmployeeNumber, OrderStatus, Role};

pub const FORBIDDEN: &str = "Forbidden.";
pub const ORDERS_OF_ANOTHER_CUSTOMER: &str = "Could not find orders of another customer";
pub const CUSTOMER_MAY_ONLY_CANCEL: &str = "Forbidden: customers can only cancel their own orders";
pub const ORDER_ALREADY_PROCESSED: &str = "Your order has been processed, you cannot cancel it. Please submit a return request when the order is shipped or contact the seller for assistance.";
pub const ORDER_OUTSIDE_SALES_TEAM: &str = "Forbidden: You could not update this order";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerOperation {
    List,
    Read,
    Create,
    Update,
    Delete,
}

/// Unexpanded decision for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Unrestricted,
    OwnRecord(CustomerNumber),
    /// Customers whose sales rep is this employee or one of their direct reports
    SalesTeam(EmployeeNumber),
    Denied,
}

/// A [`Rule`] with the sales team resolved to concrete employee numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Customer(CustomerNumber),
    SalesReps(BTreeSet<EmployeeNumber>),
    Nothing,
}

impl Scope {
    /// Whether a customer with this number and sales rep is visible.
    pub fn permits(&self, customer_number: CustomerNumber, sales_rep: Option<EmployeeNumber>) -> bool {
        match self {
            Scope::All => true,
            Scope::Customer(own) => *own == customer_number,
            Scope::SalesReps(reps) => sales_rep.map(|rep| reps.contains(&rep)).unwrap_or(false),
            Scope::Nothing => false,
        }
    }

    /// Whether a record assigned to this sales rep may be written.
    pub fn permits_sales_rep(&self, sales_rep: Option<EmployeeNumber>) -> bool {
        match self {
            Scope::All => true,
            Scope::SalesReps(reps) => sales_rep.map(|rep| reps.contains(&rep)).unwrap_or(false),
            Scope::Customer(_) | Scope::Nothing => false,
        }
    }
}

pub fn customer_rule(identity: &Identity, operation: CustomerOperation) -> Rule {
    match identity.role {
        Role::Admin => Rule::Unrestricted,
        Role::Manager | Role::Staff => match identity.employee_number() {
            Some(employee_number) => Rule::SalesTeam(employee_number),
            None => Rule::Denied,
        },
        Role::Customer => match (operation, identity.customer_number()) {
            (CustomerOperation::Read | CustomerOperation::Update, Some(own)) => Rule::OwnRecord(own),
            _ => Rule::Denied,
        },
    }
}

/// Customer filter for `GET /orders`.
///
/// Customers default to, and may only ask for, their own number. Employees must name one.
pub fn order_query_rule(identity: &Identity, requested: Option<CustomerNumber>) -> Result<CustomerNumber, Rejection> {
    match (identity.customer_number(), requested) {
        (Some(own), None) => Ok(own),
        (Some(own), Some(n)) if n == own => Ok(n),
        (Some(_), Some(_)) => Err(Rejection::Forbidden(ORDERS_OF_ANOTHER_CUSTOMER.to_string())),
        (None, Some(n)) => Ok(n),
        (None, None) => Err(Rejection::BadRequest("customerNumber is required".to_string())),
    }
}

/// Read or patch of one order: customers only reach their own orders.
pub fn order_access(identity: &Identity, order: &Order) -> Result<(), Rejection> {
    match identity.customer_number() {
        Some(own) if own != order.customer_number => Err(Rejection::Forbidden(FORBIDDEN.to_string())),
        _ => Ok(()),
    }
}

/// Only employees may vouch for a brand new customer while placing an order.
pub fn inline_customer_create(identity: &Identity) -> Result<(), Rejection> {
    if identity.role == Role::Customer {
        return Err(Rejection::Forbidden(FORBIDDEN.to_string()));
    }
    Ok(())
}

/// Customer an order is placed for (as-is or patched inline); customers may only use their own.
pub fn order_customer(identity: &Identity, target: CustomerNumber) -> Result<CustomerNumber, Rejection> {
    match identity.customer_number() {
        Some(own) if own != target => Err(Rejection::Forbidden(FORBIDDEN.to_string())),
        _ => Ok(target),
    }
}

/// Who may change an order's status. Does not look at the date fields.
pub fn order_update_rule(identity: &Identity, order: &Order, requested: Option<OrderStatus>) -> Result<Rule, Rejection> {
    match identity.role {
        Role::Admin => Ok(Rule::Unrestricted),
        Role::Customer => {
            order_access(identity, order)?;
            if requested != Some(OrderStatus::Cancelled) {
                return Err(Rejection::Forbidden(CUSTOMER_MAY_ONLY_CANCEL.to_string()));
            }
            if order.status != OrderStatus::InProcess {
                return Err(Rejection::Forbidden(ORDER_ALREADY_PROCESSED.to_string()));
            }
            Ok(Rule::OwnRecord(order.customer_number))
        }
        Role::Manager | Role::Staff => identity
            .employee_number()
            .map(Rule::SalesTeam)
            .ok_or_else(|| Rejection::Forbidden(ORDER_OUTSIDE_SALES_TEAM.to_string())),
    }
}
