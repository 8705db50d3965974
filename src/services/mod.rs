pub mod customer_service;
pub mod employee_service;
pub mod error;
pub mod hierarchy;
pub mod order_service;
pub mod user_service;

pub use customer_service::CustomerService;
pub use employee_service::EmployeeService;
pub use error::{Rejection, ServiceError, ServiceResult};
pub use order_service::OrderService;
pub use user_service::UserService;

use tracing::{error, warn};

use crate::auth::Identity;
use crate::database::manager::DatabaseError;
use crate::database::patch::FieldPatch;
use crate::database::store::StoreTransaction;
use crate::types::EmployeeNumber;

/// Close a transaction according to the outcome of the work done inside it.
///
/// Commits on success; on failure rolls back and hands back the original error. A
/// failing rollback is logged and otherwise ignored.
pub(crate) async fn finish<T>(tx: Box<dyn StoreTransaction>, result: ServiceResult<T>) -> ServiceResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!("Rollback failed after '{}': {}", err, rollback_err);
            }
            Err(err)
        }
    }
}

/// Log soft denials with the acting user; hard failures are logged where they are rendered.
pub(crate) fn audited<T>(identity: &Identity, action: &str, result: ServiceResult<T>) -> ServiceResult<T> {
    if let Err(ServiceError::Rejected(rejection)) = &result {
        warn!(username = %identity.username, role = %identity.role, "{} rejected: {}", action, rejection);
    }
    result
}

/// Employee number a patch assigns to an integer reference column, if it sets one.
///
/// Clearing the column (`null`) yields `None`, as does leaving it out. Numbers outside
/// the key range are reported with `message`.
pub(crate) fn patched_reference(
    patch: &FieldPatch,
    column: &str,
    message: &str,
) -> ServiceResult<Option<EmployeeNumber>> {
    match patch.integer(column) {
        Some(Some(value)) => EmployeeNumber::try_from(value)
            .map(Some)
            .map_err(|_| ServiceError::bad_request(message)),
        _ => Ok(None),
    }
}

/// Unique-key violations become a `Duplicate` rejection; everything else stays hard.
pub(crate) fn conflict_as_duplicate(err: DatabaseError, message: impl Into<String>) -> ServiceError {
    match err {
        DatabaseError::Conflict(constraint) => {
            warn!("Unique constraint {} rejected insert", constraint);
            ServiceError::duplicate(message)
        }
        other => ServiceError::Store(other),
    }
}
