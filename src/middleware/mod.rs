pub mod auth;
pub mod extract;
pub mod response;

pub use auth::{
    jwt_auth_middleware, optional_identity_middleware, require_admin, require_admin_or_manager, require_manager,
    require_roles, require_staff,
};
pub use extract::{ApiPath, ApiQuery, JsonBody};
pub use response::{ApiResponse, ApiResult};
