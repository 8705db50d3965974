/// Shared types used across the codebase

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::ApiConfig;

pub type EmployeeNumber = i32;
pub type CustomerNumber = i32;
pub type OrderNumber = i32;

/// Caller role. Admin, Manager and Staff are employees; Customer is a customer login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Manager,
    Staff,
    Customer,
}

impl Role {
    pub fn is_employee(&self) -> bool {
        !matches!(self, Role::Customer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Staff => "staff",
            Role::Customer => "customer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "On Hold")]
    OnHold,
    #[serde(rename = "In Process")]
    InProcess,
    Shipped,
    Disputed,
    Resolved,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::OnHold => "On Hold",
            OrderStatus::InProcess => "In Process",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Disputed => "Disputed",
            OrderStatus::Resolved => "Resolved",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "On Hold" => Ok(OrderStatus::OnHold),
            "In Process" => Ok(OrderStatus::InProcess),
            "Shipped" => Ok(OrderStatus::Shipped),
            "Disputed" => Ok(OrderStatus::Disputed),
            "Resolved" => Ok(OrderStatus::Resolved),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

// Used by sqlx's `try_from` row mapping
impl TryFrom<String> for OrderStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Page/limit pair after defaults and caps are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    /// Missing or non-positive values fall back to page 1 and the configured default size.
    pub fn resolve(page: Option<i64>, limit: Option<i64>, api: &ApiConfig) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(api.default_page_size)
            .min(api.max_page_size);
        Self { page, limit }
    }

    /// Rows skipped before this page. Saturates, so an absurd page is simply empty.
    pub fn offset(&self) -> i64 {
        self.limit.saturating_mul(self.page - 1)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

/// Reduce a client supplied date or timestamp to its calendar date (UTC).
///
/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and naive `YYYY-MM-DDTHH:MM:SS` values.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|ts| ts.date())
}

/// Today's calendar date in UTC.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
