use thiserror::Error;

/// Rejected filter input. These come from code, not clients, so they surface as query errors.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid WHERE clause: {0}")]
    InvalidWhereClause(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Invalid page window: {0}")]
    InvalidPage(String),
}
