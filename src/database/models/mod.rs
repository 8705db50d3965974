pub mod customer;
pub mod employee;
pub mod order;
pub mod user;

pub use customer::Customer;
pub use employee::Employee;
pub use order::{Order, OrderDetail, OrderWithDetails};
pub use user::User;
