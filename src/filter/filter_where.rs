use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOp, FilterWhereInfo};

/// Renders a flat JSON where-object into a parameterised SQL condition.
///
/// `{ "field": value }` is equality and `{ "field": { "$in": [..] } }` a membership test.
/// Conditions are joined with AND.
pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
}

impl FilterWhere {
    /// Returns the condition and its parameters, numbered from `starting_param_index + 1`.
    pub fn generate(where_data: &Value, starting_param_index: usize) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self {
            param_values: vec![],
            param_index: starting_param_index,
        };
        let conditions = Self::parse(where_data)?;
        let sql: Vec<String> = conditions.iter().map(|c| filter_where.render(c)).collect();
        let clause = if sql.is_empty() { "1=1".to_string() } else { sql.join(" AND ") };
        Ok((clause, filter_where.param_values))
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn parse(where_data: &Value) -> Result<Vec<FilterWhereInfo>, FilterError> {
        let obj = match where_data {
            Value::Null => return Ok(vec![]),
            Value::Object(obj) => obj,
            _ => return Err(FilterError::InvalidWhereClause("Unsupported WHERE format".to_string())),
        };

        let mut conditions = Vec::with_capacity(obj.len());
        for (field, value) in obj {
            Self::validate_column(field)?;
            match value {
                Value::Object(ops) => {
                    for (op_key, op_val) in ops {
                        conditions.push(FilterWhereInfo {
                            column: field.clone(),
                            operator: Self::map_operator(op_key)?,
                            data: op_val.clone(),
                        });
                    }
                }
                _ => conditions.push(FilterWhereInfo {
                    column: field.clone(),
                    operator: FilterOp::Eq,
                    data: value.clone(),
                }),
            }
        }
        Ok(conditions)
    }

    fn map_operator(op_key: &str) -> Result<FilterOp, FilterError> {
        match op_key {
            "$eq" => Ok(FilterOp::Eq),
            "$in" => Ok(FilterOp::In),
            other => Err(FilterError::UnsupportedOperator(other.to_string())),
        }
    }

    fn validate_column(name: &str) -> Result<(), FilterError> {
        let mut chars = name.chars();
        let valid_start = chars.next().map(|c| c.is_ascii_alphabetic() || c == '_').unwrap_or(false);
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(FilterError::InvalidIdentifier(name.to_string()));
        }
        Ok(())
    }

    fn render(&mut self, condition: &FilterWhereInfo) -> String {
        let column = format!("\"{}\"", condition.column);
        match (&condition.operator, &condition.data) {
            (FilterOp::Eq, Value::Null) => format!("{} IS NULL", column),
            (FilterOp::In, Value::Array(values)) if values.is_empty() => "1=0".to_string(),
            (FilterOp::In, Value::Array(values)) => {
                let params: Vec<String> = values.iter().map(|v| self.param(v.clone())).collect();
                format!("{} IN ({})", column, params.join(", "))
            }
            // A scalar `$in` is plain equality
            (_, data) => format!("{} = {}", column, self.param(data.clone())),
        }
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}
