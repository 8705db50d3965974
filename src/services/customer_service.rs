use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::auth::policy::{customer_rule, CustomerOperation, Scope, FORBIDDEN};
use crate::auth::Identity;
use crate::database::models::Customer;
use crate::database::patch::FieldPatch;
use crate::database::store::{CustomerQuery, Listing, RecordStore, StoreTransaction};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::order_service::{customer_not_found, DUPLICATE_CUSTOMER, SALES_REP_NOT_FOUND};
use crate::services::{audited, conflict_as_duplicate, finish, hierarchy, patched_reference};
use crate::types::{CustomerNumber, Pagination};

pub const NO_CUSTOMER_DELETED: &str = "No customer has been deleted";

/// Rows removed by a customer delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedCustomer {
    pub customer: u64,
    pub payments: u64,
    pub users: u64,
}

pub struct CustomerService {
    store: Arc<dyn RecordStore>,
}

impl CustomerService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    async fn scope(&self, identity: &Identity, operation: CustomerOperation) -> ServiceResult<Scope> {
        Ok(hierarchy::resolve_scope(self.store.as_ref(), customer_rule(identity, operation)).await?)
    }

    /// Existing customer the caller may act on. Absence is reported before any ownership check.
    async fn visible_customer(
        &self,
        identity: &Identity,
        customer_number: CustomerNumber,
        operation: CustomerOperation,
    ) -> ServiceResult<Customer> {
        let customer = self
            .store
            .find_customer(customer_number)
            .await?
            .ok_or_else(|| ServiceError::not_found(customer_not_found(customer_number)))?;
        let scope = self.scope(identity, operation).await?;
        if !scope.permits(customer.customer_number, customer.sales_rep_employee_number) {
            return Err(ServiceError::forbidden(FORBIDDEN));
        }
        Ok(customer)
    }

    /// Page of customers visible to the caller; `total` counts every visible match.
    pub async fn list_customers(&self, identity: &Identity, pagination: Pagination) -> ServiceResult<Listing<Customer>> {
        let result: ServiceResult<Listing<Customer>> = async {
            let sales_reps = match self.scope(identity, CustomerOperation::List).await? {
                Scope::All => None,
                Scope::SalesReps(reps) => Some(reps.into_iter().collect()),
                Scope::Customer(_) | Scope::Nothing => return Err(ServiceError::forbidden(FORBIDDEN)),
            };
            Ok(self.store.list_customers(&CustomerQuery { sales_reps, pagination }).await?)
        }
        .await;
        audited(identity, "list customers", result)
    }

    pub async fn get_customer(&self, identity: &Identity, customer_number: CustomerNumber) -> ServiceResult<Customer> {
        audited(
            identity,
            "read customer",
            self.visible_customer(identity, customer_number, CustomerOperation::Read).await,
        )
    }

    pub async fn create_customer(&self, identity: &Identity, customer: Customer) -> ServiceResult<Customer> {
        audited(identity, "create customer", self.insert(identity, customer).await)
    }

    async fn insert(&self, identity: &Identity, customer: Customer) -> ServiceResult<Customer> {
        let scope = self.scope(identity, CustomerOperation::Create).await?;
        if !scope.permits_sales_rep(customer.sales_rep_employee_number) {
            return Err(ServiceError::forbidden(FORBIDDEN));
        }
        if self.store.find_customer(customer.customer_number).await?.is_some() {
            return Err(ServiceError::duplicate(DUPLICATE_CUSTOMER));
        }
        if let Some(sales_rep) = customer.sales_rep_employee_number {
            if self.store.find_employee(sales_rep).await?.is_none() {
                return Err(ServiceError::bad_request(SALES_REP_NOT_FOUND));
            }
        }

        let created = self
            .store
            .insert_customer(&customer)
            .await
            .map_err(|e| conflict_as_duplicate(e, DUPLICATE_CUSTOMER))?
            .ok_or_else(|| ServiceError::not_found("No customer has been created"))?;
        info!(username = %identity.username, customer_number = created.customer_number, "Customer created");
        Ok(created)
    }

    /// Partial update, authorized against the stored record rather than the patch.
    pub async fn update_customer(
        &self,
        identity: &Identity,
        customer_number: CustomerNumber,
        patch: FieldPatch,
    ) -> ServiceResult<Customer> {
        audited(identity, "update customer", self.patch(identity, customer_number, patch).await)
    }

    async fn patch(&self, identity: &Identity, customer_number: CustomerNumber, patch: FieldPatch) -> ServiceResult<Customer> {
        self.visible_customer(identity, customer_number, CustomerOperation::Update).await?;
        if let Some(sales_rep) = patched_reference(&patch, "salesRepEmployeeNumber", SALES_REP_NOT_FOUND)? {
            if self.store.find_employee(sales_rep).await?.is_none() {
                return Err(ServiceError::bad_request(SALES_REP_NOT_FOUND));
            }
        }

        let updated = self
            .store
            .patch_customer(customer_number, &patch)
            .await?
            .ok_or_else(|| ServiceError::not_found("Failed to update customer"))?;
        info!(username = %identity.username, customer_number, "Customer updated");
        Ok(updated)
    }

    /// Delete a customer with its payments and logins in one transaction.
    pub async fn delete_customer(
        &self,
        identity: &Identity,
        customer_number: CustomerNumber,
    ) -> ServiceResult<DeletedCustomer> {
        audited(identity, "delete customer", self.remove(identity, customer_number).await)
    }

    async fn remove(&self, identity: &Identity, customer_number: CustomerNumber) -> ServiceResult<DeletedCustomer> {
        self.visible_customer(identity, customer_number, CustomerOperation::Delete).await?;

        let mut tx = self.store.begin().await?;
        let result = remove_customer(tx.as_mut(), customer_number).await;
        let deleted = finish(tx, result).await?;

        info!(
            username = %identity.username,
            customer_number,
            payments = deleted.payments,
            users = deleted.users,
            "Customer deleted"
        );
        Ok(deleted)
    }
}

async fn remove_customer(tx: &mut dyn StoreTransaction, customer_number: CustomerNumber) -> ServiceResult<DeletedCustomer> {
    let payments = tx.delete_customer_payments(customer_number).await?;
    let users = tx.delete_customer_users(customer_number).await?;
    let customer = tx.delete_customer(customer_number).await?;
    if customer == 0 {
        return Err(ServiceError::not_found(NO_CUSTOMER_DELETED));
    }
    Ok(DeletedCustomer { customer, payments, users })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::patch::CUSTOMER_COLUMNS;
    use crate::services::error::Rejection;
    use crate::testing::fixtures::{self, admin, carine, manager, staff};
    use crate::testing::MemoryStore;
    use serde_json::json;

    fn service(store: &MemoryStore) -> CustomerService {
        CustomerService::new(Arc::new(store.clone()))
    }

    fn field_patch(value: serde_json::Value) -> FieldPatch {
        FieldPatch::from_json(value.as_object().unwrap(), CUSTOMER_COLUMNS).unwrap()
    }

    fn rejection(err: ServiceError) -> Rejection {
        match err {
            ServiceError::Rejected(r) => r,
            other => panic!("expected a rejection, got {:?}", other),
        }
    }

    fn numbers(listing: &Listing<Customer>) -> Vec<CustomerNumber> {
        listing.items.iter().map(|c| c.customer_number).collect()
    }

    #[tokio::test]
    async fn listing_follows_the_sales_team() {
        let store = MemoryStore::classic();
        let svc = service(&store);
        let pagination = Pagination { page: 1, limit: 10 };

        let all = svc.list_customers(&admin(), pagination).await.unwrap();
        assert_eq!(all.total, 6);

        // 1102 covers 1337 and 1370 but not 1611 two levels under 1056
        let team = svc.list_customers(&manager(), pagination).await.unwrap();
        assert_eq!(numbers(&team), vec![103, 119, 121]);
        assert_eq!(team.total, 3);

        let own = svc.list_customers(&staff(), pagination).await.unwrap();
        assert_eq!(numbers(&own), vec![112]);

        let err = svc.list_customers(&carine(), pagination).await.unwrap_err();
        assert!(matches!(rejection(err), Rejection::Forbidden(_)));
    }

    #[tokio::test]
    async fn total_counts_beyond_the_page() {
        let store = MemoryStore::classic();
        let page = service(&store)
            .list_customers(&manager(), Pagination { page: 2, limit: 2 })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(numbers(&page), vec![121]);
    }

    #[tokio::test]
    async fn reads_are_scoped_and_repeatable() {
        let store = MemoryStore::classic();
        let svc = service(&store);

        let first = svc.get_customer(&carine(), 103).await.unwrap();
        let second = svc.get_customer(&carine(), 103).await.unwrap();
        assert_eq!(first, second);

        assert!(matches!(rejection(svc.get_customer(&carine(), 112).await.unwrap_err()), Rejection::Forbidden(_)));
        assert!(svc.get_customer(&manager(), 119).await.is_ok());
        assert!(matches!(rejection(svc.get_customer(&manager(), 112).await.unwrap_err()), Rejection::Forbidden(_)));
        // 125 has no sales rep: only admins see it
        assert!(svc.get_customer(&admin(), 125).await.is_ok());
        assert!(svc.get_customer(&manager(), 125).await.is_err());
    }

    #[tokio::test]
    async fn missing_customer_is_not_found_for_every_role() {
        let store = MemoryStore::classic();
        let svc = service(&store);
        for identity in [admin(), manager(), staff(), carine()] {
            let err = svc.get_customer(&identity, 999).await.unwrap_err();
            assert_eq!(rejection(err), Rejection::NotFound(customer_not_found(999)));
            let err = svc.update_customer(&identity, 999, field_patch(json!({ "city": "Lyon" }))).await.unwrap_err();
            assert_eq!(rejection(err), Rejection::NotFound(customer_not_found(999)));
        }
    }

    #[tokio::test]
    async fn create_checks_team_duplicates_and_sales_rep() {
        let store = MemoryStore::classic();
        let svc = service(&store);

        let err = svc.create_customer(&manager(), fixtures::customer(500, Some(1166))).await.unwrap_err();
        assert!(matches!(rejection(err), Rejection::Forbidden(_)));

        let err = svc.create_customer(&manager(), fixtures::customer(103, Some(1370))).await.unwrap_err();
        assert_eq!(rejection(err), Rejection::Duplicate(DUPLICATE_CUSTOMER.into()));

        let err = svc.create_customer(&admin(), fixtures::customer(500, Some(9999))).await.unwrap_err();
        assert_eq!(rejection(err), Rejection::BadRequest(SALES_REP_NOT_FOUND.into()));

        let created = svc.create_customer(&manager(), fixtures::customer(500, Some(1337))).await.unwrap();
        assert_eq!(store.snapshot().customers[&500], created);
    }

    #[tokio::test]
    async fn update_is_authorized_against_the_stored_record() {
        let store = MemoryStore::classic();
        let svc = service(&store);

        // moving 112 into the manager's team does not make it theirs to edit
        let err = svc
            .update_customer(&manager(), 112, field_patch(json!({ "salesRepEmployeeNumber": 1370 })))
            .await
            .unwrap_err();
        assert!(matches!(rejection(err), Rejection::Forbidden(_)));

        let err = svc
            .update_customer(&admin(), 112, field_patch(json!({ "salesRepEmployeeNumber": 9999 })))
            .await
            .unwrap_err();
        assert_eq!(rejection(err), Rejection::BadRequest(SALES_REP_NOT_FOUND.into()));

        let updated = svc.update_customer(&carine(), 103, field_patch(json!({ "phone": "40.32.2556" }))).await.unwrap();
        assert_eq!(updated.phone, "40.32.2556");
        assert_eq!(store.snapshot().customers[&103].phone, "40.32.2556");
    }

    #[tokio::test]
    async fn delete_removes_payments_and_logins() {
        let store = MemoryStore::classic();
        store.add_user(fixtures::customer_user("atelier", 112));
        let deleted = service(&store).delete_customer(&staff(), 112).await.unwrap();

        assert_eq!(deleted, DeletedCustomer { customer: 1, payments: 1, users: 1 });
        let after = store.snapshot();
        assert!(!after.customers.contains_key(&112));
        assert!(after.payments.iter().all(|p| p.customer_number != 112));
        assert!(after.users.is_empty());
        assert_eq!(store.commits(), 1);
    }

    #[tokio::test]
    async fn delete_outside_the_team_is_forbidden() {
        let store = MemoryStore::classic();
        let err = service(&store).delete_customer(&manager(), 112).await.unwrap_err();
        assert!(matches!(rejection(err), Rejection::Forbidden(_)));
        assert_eq!(store.begins(), 0);
    }
}
