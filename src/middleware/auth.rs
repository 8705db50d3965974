use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::auth::{self, Identity};
use crate::error::ApiError;
use crate::state::AppState;
use crate::types::Role;

const STAFF_ROLES: &[Role] = &[Role::Admin, Role::Manager, Role::Staff];
const ADMIN_AND_MANAGER: &[Role] = &[Role::Admin, Role::Manager];

/// JWT authentication middleware that validates tokens and injects the caller's [`Identity`]
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_jwt_from_headers(request.headers()).map_err(ApiError::unauthorized)?;
    let identity = identity_from_token(&state, &token)?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Like [`jwt_auth_middleware`], but lets anonymous requests through.
///
/// A request that does carry a token still has to present a valid one.
pub async fn optional_identity_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if request.headers().contains_key("authorization") {
        let token = extract_jwt_from_headers(request.headers()).map_err(ApiError::unauthorized)?;
        let identity = identity_from_token(&state, &token)?;
        request.extensions_mut().insert(identity);
    }
    Ok(next.run(request).await)
}

fn identity_from_token(state: &AppState, token: &str) -> Result<Identity, ApiError> {
    let claims = auth::validate_jwt(token, &state.config.security.jwt_secret)
        .map_err(|e| ApiError::unauthorized(e.to_string()))?;
    Identity::from_claims(claims, &state.config.roles).map_err(|e| {
        warn!("Rejected token with inconsistent claims: {}", e);
        ApiError::unauthorized("Unauthorized")
    })
}

/// Extract JWT token from Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get("authorization")
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(token.trim().to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}

/// Reject callers whose role is not in `allowed`. Runs behind [`jwt_auth_middleware`].
pub async fn require_roles(allowed: &[Role], request: Request, next: Next) -> Result<Response, ApiError> {
    let Some(identity) = request.extensions().get::<Identity>() else {
        return Err(ApiError::unauthorized("Unauthorized"));
    };
    if !identity.has_role(allowed) {
        warn!(
            username = %identity.username,
            role = %identity.role,
            "Forbidden {} {}",
            request.method(),
            request.uri().path()
        );
        return Err(ApiError::forbidden("Forbidden"));
    }
    Ok(next.run(request).await)
}

pub async fn require_staff(request: Request, next: Next) -> Result<Response, ApiError> {
    require_roles(STAFF_ROLES, request, next).await
}

pub async fn require_admin_or_manager(request: Request, next: Next) -> Result<Response, ApiError> {
    require_roles(ADMIN_AND_MANAGER, request, next).await
}

pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    require_roles(&[Role::Admin], request, next).await
}

pub async fn require_manager(request: Request, next: Next) -> Result<Response, ApiError> {
    require_roles(&[Role::Manager], request, next).await
}
