// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Every route here runs behind `jwt_auth_middleware`, which puts the caller's
// `Identity` into the request extensions. Role guards are attached per route in
// `app.rs`; ownership and hierarchy rules are enforced by the services.
pub mod customers;
pub mod employees;
pub mod orders;

use serde::Deserialize;

use crate::config::ApiConfig;
use crate::types::Pagination;

/// `?page=&limit=` as sent by clients
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageParams {
    pub fn resolve(&self, api: &ApiConfig) -> Pagination {
        Pagination::resolve(self.page, self.limit, api)
    }
}
