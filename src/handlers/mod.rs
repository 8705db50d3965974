// handlers/mod.rs - Two-tier handler layout
//
// Public (no auth) → Protected (JWT auth, with per-route role guards)
pub mod protected; // Customers, orders and employees
pub mod public; // Root, health, login and register
