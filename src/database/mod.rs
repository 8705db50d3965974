pub mod manager;
pub mod models;
pub mod patch;
pub mod postgres;
pub mod repository;
pub mod store;

pub use manager::{DatabaseError, DatabaseManager};
pub use postgres::PgStore;
pub use store::{RecordStore, StoreTransaction};
