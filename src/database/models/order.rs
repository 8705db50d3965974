use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{CustomerNumber, OrderNumber, OrderStatus};

/// Row of the `orders` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub struct Order {
    pub order_number: OrderNumber,
    pub order_date: NaiveDate,
    pub required_date: NaiveDate,
    pub shipped_date: Option<NaiveDate>,
    #[sqlx(try_from = "String")]
    pub status: OrderStatus,
    pub comments: Option<String>,
    pub customer_number: CustomerNumber,
}

/// Row of the `orderdetails` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub struct OrderDetail {
    pub order_number: OrderNumber,
    pub product_code: String,
    pub quantity_ordered: i32,
    pub price_each: Decimal,
    pub order_line_number: i16,
}

/// An order together with its detail lines, as returned by `GET /orders/:n`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithDetails {
    #[serde(flatten)]
    pub order: Order,
    pub order_details: Vec<OrderDetail>,
}
