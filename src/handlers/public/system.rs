use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use tracing::warn;

use crate::state::AppState;

/// GET / - service name and version
pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Sales API",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "public": "/login, /register, /health",
                "customers": "/customers[/:customerNumber] (admin, manager, staff; customers may patch their own)",
                "orders": "/orders[/:orderNumber] (all roles)",
                "employees": "/employees[/all|/:employeeNumber] (admin, manager)"
            }
        }
    }))
}

/// GET /health - 200 when the store answers, 503 otherwise
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": {
                        "code": "SERVICE_UNAVAILABLE",
                        "message": "database unavailable"
                    },
                    "data": {
                        "status": "degraded",
                        "timestamp": now
                    }
                })),
            )
        }
    }
}
