use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let infos = match order {
            Value::String(s) => Self::parse_order_string(s)?,
            Value::Array(arr) => {
                // Expect array of strings like ["orderDate desc", "orderNumber asc"]
                let mut out = Vec::new();
                for v in arr {
                    if let Value::String(s) = v { out.extend(Self::parse_order_string(s)?); }
                }
                out
            }
            _ => vec![],
        };
        for info in &infos {
            if !info.column.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') || info.column.is_empty() {
                return Err(FilterError::InvalidIdentifier(info.column.clone()));
            }
        }
        Ok(infos)
    }

    fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        // split on commas, then each token into column and direction
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() { continue; }
            let mut it = trimmed.split_whitespace();
            if let Some(col) = it.next() {
                let sort = it.next().and_then(SortDirection::parse).unwrap_or_default();
                out.push(FilterOrderInfo { column: col.to_string(), sort });
            }
        }
        Ok(out)
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> String {
        if infos.is_empty() { return String::new(); }
        let parts: Vec<String> = infos
            .iter()
            .map(|i| format!("\"{}\" {}", i.column, i.sort.to_sql()))
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_and_array_forms() {
        let infos = FilterOrder::validate_and_parse(&json!("orderDate desc, orderNumber")).unwrap();
        assert_eq!(FilterOrder::generate(&infos), "ORDER BY \"orderDate\" DESC, \"orderNumber\" ASC");

        let infos = FilterOrder::validate_and_parse(&json!(["requiredDate DESC"])).unwrap();
        assert_eq!(infos[0].sort, SortDirection::Desc);
    }

    #[test]
    fn rejects_quoted_column() {
        assert!(FilterOrder::validate_and_parse(&json!("x\" desc")).is_err());
    }
}
