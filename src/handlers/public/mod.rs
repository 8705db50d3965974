// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Token acquisition and service status. `/register` accepts an optional token: a
// caller is only needed when the new login belongs to an employee.
pub mod auth;
pub mod system;

pub use auth::{login_post, register_post};
pub use system::{health, root};
