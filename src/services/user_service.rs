use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::password::{hash_password, verify_password};
use crate::auth::policy::FORBIDDEN;
use crate::auth::{generate_jwt, Claims, Identity};
use crate::config::AppConfig;
use crate::database::models::{Customer, User};
use crate::database::store::{RecordStore, StoreTransaction};
use crate::services::error::{Rejection, ServiceError, ServiceResult};
use crate::services::order_service::{customer_not_found, SALES_REP_NOT_FOUND};
use crate::services::{conflict_as_duplicate, finish};
use crate::types::{CustomerNumber, EmployeeNumber, Role};

pub const WRONG_CREDENTIALS: &str = "Wrong username or password!";
pub const USERNAME_TAKEN: &str = "Username is already registered";

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub message: String,
    pub token: String,
}

/// `POST /register` body as sent by clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub customer_number: Option<CustomerNumber>,
    #[serde(default)]
    pub employee_number: Option<EmployeeNumber>,
    #[serde(default)]
    pub customer: Option<Customer>,
}

/// Business identity a new login is attached to.
#[derive(Debug, Clone, PartialEq)]
pub enum UserLinkage {
    Customer(CustomerNumber),
    Employee(EmployeeNumber),
    NewCustomer(Customer),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub linkage: UserLinkage,
}

fn check_password_rules(password: &str) -> Result<(), Rejection> {
    let length = password.chars().count();
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace());
    if !(6..=100).contains(&length) || !has_digit || !has_symbol {
        return Err(Rejection::BadRequest(
            "password must be 6 to 100 characters with at least one digit and one symbol".into(),
        ));
    }
    Ok(())
}

impl TryFrom<RegisterBody> for Registration {
    type Error = Rejection;

    fn try_from(body: RegisterBody) -> Result<Self, Self::Error> {
        let linkage = match (body.customer_number, body.employee_number, body.customer) {
            (Some(n), None, None) => UserLinkage::Customer(n),
            (None, Some(n), None) => UserLinkage::Employee(n),
            (None, None, Some(customer)) => UserLinkage::NewCustomer(customer),
            _ => {
                return Err(Rejection::BadRequest(
                    "Provide exactly one of customerNumber, employeeNumber or customer".into(),
                ))
            }
        };
        if !(3..=50).contains(&body.username.chars().count()) {
            return Err(Rejection::BadRequest("username must be 3 to 50 characters".into()));
        }
        check_password_rules(&body.password)?;
        Ok(Self {
            username: body.username,
            password: body.password,
            linkage,
        })
    }
}

pub struct UserService {
    store: Arc<dyn RecordStore>,
    config: Arc<AppConfig>,
}

impl UserService {
    pub fn new(store: Arc<dyn RecordStore>, config: Arc<AppConfig>) -> Self {
        Self { store, config }
    }

    /// Check credentials and sign a token for the linked employee or customer.
    pub async fn login(&self, credentials: Credentials) -> ServiceResult<Session> {
        let stored = self.store.find_user(&credentials.username).await?;
        let verified = match &stored {
            Some(user) => verify(&credentials.password, &user.password).await?,
            None => false,
        };
        let Some(user) = stored.filter(|_| verified) else {
            warn!(username = %credentials.username, "Login failed");
            return Err(ServiceError::not_found(WRONG_CREDENTIALS));
        };

        let security = &self.config.security;
        let claims = match (user.employee_number, user.customer_number) {
            (Some(employee_number), None) => {
                let employee = self.store.find_employee(employee_number).await?.ok_or_else(|| {
                    ServiceError::Internal(format!("user {} links to missing employee {}", user.username, employee_number))
                })?;
                Claims::for_employee(&user.username, &employee, security)
            }
            (None, Some(customer_number)) => {
                let customer = self.store.find_customer(customer_number).await?.ok_or_else(|| {
                    ServiceError::Internal(format!("user {} links to missing customer {}", user.username, customer_number))
                })?;
                Claims::for_customer(&user.username, &customer, &self.config.roles, security)
            }
            _ => {
                return Err(ServiceError::Internal(format!(
                    "user {} must link to exactly one employee or customer",
                    user.username
                )))
            }
        };

        let token = generate_jwt(&claims, &security.jwt_secret).map_err(|e| ServiceError::Internal(e.to_string()))?;
        info!(username = %user.username, role = claims.role, "Login succeeded");
        Ok(Session {
            message: format!("Login with {}", user.username),
            token,
        })
    }

    /// Create a login. Attaching one to an employee needs an admin, or a manager of that
    /// employee (direct report or same office).
    pub async fn register(&self, caller: Option<&Identity>, registration: Registration) -> ServiceResult<User> {
        let result = self.create_user(caller, registration).await;
        if let Err(ServiceError::Rejected(rejection)) = &result {
            warn!(caller = ?caller.map(|c| c.username.as_str()), "Registration rejected: {}", rejection);
        }
        let user = result?;
        info!(username = %user.username, "User registered");
        Ok(user)
    }

    async fn create_user(&self, caller: Option<&Identity>, registration: Registration) -> ServiceResult<User> {
        if self.store.find_user(&registration.username).await?.is_some() {
            return Err(ServiceError::duplicate(USERNAME_TAKEN));
        }

        match registration.linkage {
            UserLinkage::Customer(customer_number) => {
                if self.store.find_customer(customer_number).await?.is_none() {
                    return Err(ServiceError::not_found(customer_not_found(customer_number)));
                }
                if self.store.find_user_for_customer(customer_number).await?.is_some() {
                    return Err(ServiceError::duplicate(format!(
                        "Duplicate data of customer number {}",
                        customer_number
                    )));
                }
                let user = User {
                    username: registration.username,
                    password: hash(&registration.password).await?,
                    employee_number: None,
                    customer_number: Some(customer_number),
                };
                self.insert_user(&user).await
            }
            UserLinkage::Employee(employee_number) => {
                let caller = caller.ok_or_else(|| ServiceError::forbidden(FORBIDDEN))?;
                let employee = self.store.find_employee(employee_number).await?.ok_or_else(|| {
                    ServiceError::not_found(format!("Could not find employee with employee number {}", employee_number))
                })?;
                let permitted = match caller.role {
                    Role::Admin => true,
                    Role::Manager => {
                        let reports_to_caller =
                            caller.employee_number().is_some() && employee.reports_to == caller.employee_number();
                        reports_to_caller || caller.office_code() == Some(employee.office_code.as_str())
                    }
                    Role::Staff | Role::Customer => false,
                };
                if !permitted {
                    return Err(ServiceError::forbidden(FORBIDDEN));
                }
                if self.store.find_user_for_employee(employee_number).await?.is_some() {
                    return Err(ServiceError::duplicate(format!(
                        "Duplicate data of employee number {}",
                        employee_number
                    )));
                }
                let user = User {
                    username: registration.username,
                    password: hash(&registration.password).await?,
                    employee_number: Some(employee_number),
                    customer_number: None,
                };
                self.insert_user(&user).await
            }
            UserLinkage::NewCustomer(customer) => {
                let user = User {
                    username: registration.username,
                    password: hash(&registration.password).await?,
                    employee_number: None,
                    customer_number: Some(customer.customer_number),
                };
                let mut tx = self.store.begin().await?;
                let result = insert_customer_login(tx.as_mut(), &customer, &user).await;
                finish(tx, result).await
            }
        }
    }

    async fn insert_user(&self, user: &User) -> ServiceResult<User> {
        self.store
            .insert_user(user)
            .await
            .map_err(|e| conflict_as_duplicate(e, USERNAME_TAKEN))?
            .ok_or_else(|| ServiceError::not_found("Registration failed"))
    }
}

// Argon2 is CPU bound; keep it off the async workers.
async fn hash(password: &str) -> ServiceResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServiceError::Internal(format!("password hashing task failed: {}", e)))?
        .map_err(|e| ServiceError::Internal(format!("password hashing failed: {}", e)))
}

async fn verify(password: &str, hash: &str) -> ServiceResult<bool> {
    let (password, hash) = (password.to_string(), hash.to_string());
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ServiceError::Internal(format!("password check task failed: {}", e)))
}

async fn insert_customer_login(tx: &mut dyn StoreTransaction, customer: &Customer, user: &User) -> ServiceResult<User> {
    if tx.find_customer(customer.customer_number).await?.is_some() {
        return Err(ServiceError::duplicate(format!(
            "Duplicate data of customer number {}",
            customer.customer_number
        )));
    }
    if let Some(sales_rep) = customer.sales_rep_employee_number {
        if tx.find_employee(sales_rep).await?.is_none() {
            return Err(ServiceError::bad_request(SALES_REP_NOT_FOUND));
        }
    }
    tx.insert_customer(customer)
        .await?
        .ok_or_else(|| ServiceError::not_found("Registration failed"))?;
    tx.insert_user(user)
        .await
        .map_err(|e| conflict_as_duplicate(e, USERNAME_TAKEN))?
        .ok_or_else(|| ServiceError::not_found("Registration failed"))
}
