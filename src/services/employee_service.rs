use std::sync::Arc;
use tracing::info;

use crate::auth::policy::FORBIDDEN;
use crate::auth::Identity;
use crate::config::RoleCodes;
use crate::database::models::Employee;
use crate::database::patch::FieldPatch;
use crate::database::store::{EmployeeQuery, Listing, RecordStore};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::{audited, conflict_as_duplicate, patched_reference};
use crate::types::{EmployeeNumber, Pagination, Role};

pub const EMPLOYEE_NOT_FOUND: &str = "Employee not found";
pub const DUPLICATE_EMPLOYEE: &str = "Duplicate data of employee number";
pub const REPORTS_TO_NOT_FOUND: &str = "ReportsTo does not exist";
pub const REPORTS_TO_SELF: &str = "An employee cannot report to themselves";
const INVALID_ROLE: &str = "role must be an employee role (1, 2 or 3)";

pub struct EmployeeService {
    store: Arc<dyn RecordStore>,
    roles: RoleCodes,
}

impl EmployeeService {
    pub fn new(store: Arc<dyn RecordStore>, roles: RoleCodes) -> Self {
        Self { store, roles }
    }

    fn check_role_code(&self, code: i64) -> ServiceResult<()> {
        let role = i32::try_from(code).ok().and_then(|c| self.roles.role(c));
        match role {
            Some(role) if role.is_employee() => Ok(()),
            _ => Err(ServiceError::bad_request(INVALID_ROLE)),
        }
    }

    async fn check_reports_to(&self, reports_to: Option<EmployeeNumber>) -> ServiceResult<()> {
        if let Some(manager) = reports_to {
            if self.store.find_employee(manager).await?.is_none() {
                return Err(ServiceError::bad_request(REPORTS_TO_NOT_FOUND));
            }
        }
        Ok(())
    }

    /// Employee the caller may see: admins see everyone, managers their own office.
    async fn visible_employee(&self, identity: &Identity, employee_number: EmployeeNumber) -> ServiceResult<Employee> {
        let employee = self
            .store
            .find_employee(employee_number)
            .await?
            .ok_or_else(|| ServiceError::not_found(EMPLOYEE_NOT_FOUND))?;
        match identity.role {
            Role::Admin => Ok(employee),
            Role::Manager if identity.office_code() == Some(employee.office_code.as_str()) => Ok(employee),
            _ => Err(ServiceError::forbidden(FORBIDDEN)),
        }
    }

    pub async fn create_employee(&self, identity: &Identity, employee: Employee) -> ServiceResult<Employee> {
        let result: ServiceResult<Employee> = async {
            if self.store.find_employee(employee.employee_number).await?.is_some() {
                return Err(ServiceError::duplicate(DUPLICATE_EMPLOYEE));
            }
            self.check_role_code(employee.role.into())?;
            self.check_reports_to(employee.reports_to).await?;
            self.store
                .insert_employee(&employee)
                .await
                .map_err(|e| conflict_as_duplicate(e, DUPLICATE_EMPLOYEE))?
                .ok_or_else(|| ServiceError::not_found("No employee has been created"))
        }
        .await;

        let created = audited(identity, "create employee", result)?;
        info!(username = %identity.username, employee_number = created.employee_number, "Employee created");
        Ok(created)
    }

    pub async fn list_employees(&self, query: EmployeeQuery) -> ServiceResult<Listing<Employee>> {
        Ok(self.store.list_employees(&query).await?)
    }

    /// Everyone in the caller's office.
    pub async fn list_office_employees(
        &self,
        identity: &Identity,
        pagination: Pagination,
    ) -> ServiceResult<Listing<Employee>> {
        let Some(office_code) = identity.office_code() else {
            return audited(identity, "list office employees", Err(ServiceError::forbidden(FORBIDDEN)));
        };
        let query = EmployeeQuery {
            office_code: Some(office_code.to_string()),
            pagination,
            ..EmployeeQuery::default()
        };
        Ok(self.store.list_employees(&query).await?)
    }

    pub async fn get_employee(&self, identity: &Identity, employee_number: EmployeeNumber) -> ServiceResult<Employee> {
        audited(identity, "read employee", self.visible_employee(identity, employee_number).await)
    }

    pub async fn update_employee(
        &self,
        identity: &Identity,
        employee_number: EmployeeNumber,
        patch: FieldPatch,
    ) -> ServiceResult<Employee> {
        let result: ServiceResult<Employee> = async {
            self.visible_employee(identity, employee_number).await?;
            if let Some(code) = patch.integer("role") {
                self.check_role_code(code.unwrap_or_default())?;
            }
            let reports_to = patched_reference(&patch, "reportsTo", REPORTS_TO_NOT_FOUND)?;
            if reports_to == Some(employee_number) {
                return Err(ServiceError::bad_request(REPORTS_TO_SELF));
            }
            self.check_reports_to(reports_to).await?;
            self.store
                .patch_employee(employee_number, &patch)
                .await?
                .ok_or_else(|| ServiceError::not_found("Failed to update employee"))
        }
        .await;

        let updated = audited(identity, "update employee", result)?;
        info!(username = %identity.username, employee_number, "Employee updated");
        Ok(updated)
    }

    pub async fn delete_employee(&self, identity: &Identity, employee_number: EmployeeNumber) -> ServiceResult<u64> {
        let result: ServiceResult<u64> = async {
            if self.store.find_employee(employee_number).await?.is_none() {
                return Err(ServiceError::not_found(EMPLOYEE_NOT_FOUND));
            }
            Ok(self.store.delete_employee(employee_number).await?)
        }
        .await;

        let deleted = audited(identity, "delete employee", result)?;
        info!(username = %identity.username, employee_number, "Employee deleted");
        Ok(deleted)
    }
}
