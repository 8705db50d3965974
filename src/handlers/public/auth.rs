use axum::{extract::State, Extension};
use serde::Serialize;

use crate::auth::Identity;
use crate::database::models::User;
use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::services::user_service::{Credentials, RegisterBody, Registration, Session};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Registered {
    pub message: &'static str,
    pub user: User,
}

/// POST /login - exchange username and password for a bearer token
///
/// ```json
/// { "success": true, "data": { "message": "Login with carine", "token": "eyJhbGciOi..." } }
/// ```
pub async fn login_post(
    State(state): State<AppState>,
    JsonBody(credentials): JsonBody<Credentials>,
) -> ApiResult<Session> {
    let session = state.users.login(credentials).await?;
    Ok(ApiResponse::success(session))
}

/// POST /register - create a login for a customer (existing or new) or an employee
pub async fn register_post(
    State(state): State<AppState>,
    caller: Option<Extension<Identity>>,
    JsonBody(body): JsonBody<RegisterBody>,
) -> ApiResult<Registered> {
    let registration = Registration::try_from(body)?;
    let caller = caller.map(|Extension(identity)| identity);
    let user = state.users.register(caller.as_ref(), registration).await?;
    Ok(ApiResponse::created(Registered {
        message: "Register successfully!",
        user,
    }))
}
