use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use thiserror::Error;

/// Storage kind of a patchable column; decides how values are checked and bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Decimal,
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

const fn col(name: &'static str, kind: ColumnKind, nullable: bool) -> ColumnSpec {
    ColumnSpec { name, kind, nullable }
}

/// Columns a customer update may touch (the key is never patchable).
pub const CUSTOMER_COLUMNS: &[ColumnSpec] = &[
    col("customerName", ColumnKind::Text, false),
    col("contactLastName", ColumnKind::Text, false),
    col("contactFirstName", ColumnKind::Text, false),
    col("phone", ColumnKind::Text, false),
    col("addressLine1", ColumnKind::Text, false),
    col("addressLine2", ColumnKind::Text, true),
    col("city", ColumnKind::Text, false),
    col("state", ColumnKind::Text, true),
    col("postalCode", ColumnKind::Text, true),
    col("country", ColumnKind::Text, false),
    col("salesRepEmployeeNumber", ColumnKind::Integer, true),
    col("creditLimit", ColumnKind::Decimal, true),
];

pub const EMPLOYEE_COLUMNS: &[ColumnSpec] = &[
    col("lastName", ColumnKind::Text, false),
    col("firstName", ColumnKind::Text, false),
    col("extension", ColumnKind::Text, false),
    col("email", ColumnKind::Text, false),
    col("officeCode", ColumnKind::Text, false),
    col("reportsTo", ColumnKind::Integer, true),
    col("jobTitle", ColumnKind::Text, false),
    col("role", ColumnKind::Integer, false),
];

#[derive(Debug, Error, PartialEq)]
pub enum PatchError {
    #[error("Field '{0}' cannot be updated")]
    UnknownField(String),

    #[error("Field '{field}' must be {expected}")]
    InvalidValue { field: String, expected: &'static str },

    #[error("No fields to update")]
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatchValue {
    Text(Option<String>),
    Integer(Option<i64>),
    Decimal(Option<Decimal>),
}

impl PatchValue {
    fn to_json(&self) -> Value {
        match self {
            PatchValue::Text(v) => v.clone().map(Value::String).unwrap_or(Value::Null),
            PatchValue::Integer(v) => v.map(Value::from).unwrap_or(Value::Null),
            PatchValue::Decimal(v) => v.map(|d| Value::String(d.to_string())).unwrap_or(Value::Null),
        }
    }
}

/// Validated partial update: column name plus a value typed by the column's kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldPatch {
    fields: Vec<(&'static str, PatchValue)>,
}

impl FieldPatch {
    /// Check a JSON object against a column whitelist.
    pub fn from_json(map: &Map<String, Value>, columns: &[ColumnSpec]) -> Result<Self, PatchError> {
        let mut fields = Vec::with_capacity(map.len());
        for (key, value) in map {
            let spec = columns
                .iter()
                .find(|c| c.name == key)
                .ok_or_else(|| PatchError::UnknownField(key.clone()))?;
            fields.push((spec.name, Self::coerce(spec, value)?));
        }
        if fields.is_empty() {
            return Err(PatchError::Empty);
        }
        Ok(Self { fields })
    }

    fn coerce(spec: &ColumnSpec, value: &Value) -> Result<PatchValue, PatchError> {
        let invalid = |expected| PatchError::InvalidValue { field: spec.name.to_string(), expected };

        if value.is_null() {
            if !spec.nullable {
                return Err(invalid("present"));
            }
            return Ok(match spec.kind {
                ColumnKind::Text => PatchValue::Text(None),
                ColumnKind::Integer => PatchValue::Integer(None),
                ColumnKind::Decimal => PatchValue::Decimal(None),
            });
        }

        match spec.kind {
            ColumnKind::Text => value
                .as_str()
                .map(|s| PatchValue::Text(Some(s.to_string())))
                .ok_or_else(|| invalid("a string")),
            ColumnKind::Integer => value
                .as_i64()
                .map(|i| PatchValue::Integer(Some(i)))
                .ok_or_else(|| invalid("an integer")),
            ColumnKind::Decimal => {
                let parsed = match value {
                    Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
                    Value::String(s) => Decimal::from_str(s).ok(),
                    _ => None,
                };
                parsed
                    .map(|d| PatchValue::Decimal(Some(d)))
                    .ok_or_else(|| invalid("a number"))
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, PatchValue)> {
        self.fields.iter()
    }

    pub fn get(&self, column: &str) -> Option<&PatchValue> {
        self.fields.iter().find(|(name, _)| *name == column).map(|(_, v)| v)
    }

    /// `Some(value)` when the patch sets an integer column (value may be null).
    pub fn integer(&self, column: &str) -> Option<Option<i64>> {
        match self.get(column) {
            Some(PatchValue::Integer(v)) => Some(*v),
            _ => None,
        }
    }

    /// Apply the patch to an in-memory record through its camelCase JSON form.
    pub fn apply_to<T>(&self, record: &T) -> Result<T, serde_json::Error>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut value = serde_json::to_value(record)?;
        if let Value::Object(map) = &mut value {
            for (name, patch) in &self.fields {
                map.insert(name.to_string(), patch.to_json());
            }
        }
        serde_json::from_value(value)
    }
}
