use axum::{
    extract::DefaultBodyLimit,
    handler::Handler,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::handlers::{protected, public};
use crate::middleware::{
    jwt_auth_middleware, optional_identity_middleware, require_admin, require_admin_or_manager, require_manager,
    require_staff,
};
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.security.cors_origins);
    let body_limit = DefaultBodyLimit::max(state.config.api.max_request_size_bytes);

    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .merge(auth_public_routes(&state))
        // Protected
        .merge(protected_routes(&state))
        // Global middleware
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn auth_public_routes(state: &AppState) -> Router<AppState> {
    let optional_identity = from_fn_with_state(state.clone(), optional_identity_middleware);

    Router::new()
        .route("/login", post(public::login_post))
        .route("/register", post(public::register_post.layer(optional_identity)))
}

fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(customer_routes())
        .merge(order_routes())
        .merge(employee_routes())
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_middleware))
}

fn customer_routes() -> Router<AppState> {
    use protected::customers;
    let staff = from_fn(require_staff);

    Router::new()
        .route(
            "/customers",
            get(customers::customer_list.layer(staff.clone())).post(customers::customer_post.layer(staff.clone())),
        )
        .route(
            "/customers/:customer_number",
            // Customers may read and patch their own record
            get(customers::customer_get)
                .patch(customers::customer_patch)
                .delete(customers::customer_delete.layer(staff)),
        )
}

fn order_routes() -> Router<AppState> {
    use protected::orders;

    Router::new()
        .route("/orders", get(orders::order_list).post(orders::order_post))
        .route(
            "/orders/:order_number",
            get(orders::order_get)
                .patch(orders::order_patch)
                .delete(orders::order_delete.layer(from_fn(require_staff))),
        )
}

fn employee_routes() -> Router<AppState> {
    use protected::employees;
    let admin = from_fn(require_admin);
    let admin_or_manager = from_fn(require_admin_or_manager);

    Router::new()
        .route(
            "/employees",
            get(employees::employee_list_office.layer(from_fn(require_manager)))
                .post(employees::employee_post.layer(admin.clone())),
        )
        .route("/employees/all", get(employees::employee_list_all.layer(admin.clone())))
        .route(
            "/employees/:employee_number",
            get(employees::employee_get.layer(admin_or_manager.clone()))
                .patch(employees::employee_patch.layer(admin_or_manager))
                .delete(employees::employee_delete.layer(admin)),
        )
}

/// CORS for the configured origins; `*` allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}
