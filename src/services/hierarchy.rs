use std::collections::BTreeSet;

use crate::auth::policy::{Rule, Scope};
use crate::database::store::{RecordStore, StoreResult};
use crate::types::EmployeeNumber;

/// The employee plus everyone reporting directly to them.
///
/// One level only: reports of reports are not included. An unknown employee number
/// yields just itself.
pub async fn subordinate_closure(
    store: &dyn RecordStore,
    employee_number: EmployeeNumber,
) -> StoreResult<BTreeSet<EmployeeNumber>> {
    let mut closure: BTreeSet<EmployeeNumber> = store.direct_reports(employee_number).await?.into_iter().collect();
    closure.insert(employee_number);
    Ok(closure)
}

/// Expand a policy rule into a concrete scope.
pub async fn resolve_scope(store: &dyn RecordStore, rule: Rule) -> StoreResult<Scope> {
    Ok(match rule {
        Rule::Unrestricted => Scope::All,
        Rule::OwnRecord(customer_number) => Scope::Customer(customer_number),
        Rule::SalesTeam(employee_number) => Scope::SalesReps(subordinate_closure(store, employee_number).await?),
        Rule::Denied => Scope::Nothing,
    })
}
