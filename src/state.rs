use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::RecordStore;
use crate::services::{CustomerService, EmployeeService, OrderService, UserService};

/// Shared handler state, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn RecordStore>,
    pub customers: Arc<CustomerService>,
    pub orders: Arc<OrderService>,
    pub employees: Arc<EmployeeService>,
    pub users: Arc<UserService>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            customers: Arc::new(CustomerService::new(store.clone())),
            orders: Arc::new(OrderService::new(store.clone())),
            employees: Arc::new(EmployeeService::new(store.clone(), config.roles)),
            users: Arc::new(UserService::new(store.clone(), config.clone())),
            config,
            store,
        }
    }
}
