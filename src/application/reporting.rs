// Read side: balances, entry history, payroll export, compliance report.
//
// Responsibilities
// - Fold the entry log into the shapes payroll and manager tooling consume.
//   Everything here is a read; no flow in this module writes to the ledger.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::application::errors::ApplicationError;
use crate::application::policy::LocationPolicy;
use crate::core::compliance::{ComplianceWarning, EmployeePeriodFigures, evaluate};
use crate::core::entry::{LedgerEntry, SourceType};
use crate::core::ports::{EntryFilter, GroupStore, LedgerStore};

/// IRS-reportable classification for a payroll row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayrollClass {
    QualifiedTip,
    ServiceCharge,
    /// Payouts, transfers, chargebacks, adjustments: balance movements, not
    /// tip income.
    NonTip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollRow {
    pub employee_id: String,
    pub source_type: SourceType,
    pub class: PayrollClass,
    pub total_cents: i64,
    pub entry_count: usize,
}

fn classify(entry: &LedgerEntry) -> PayrollClass {
    let service_charge = entry
        .context
        .get("service_charge")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if !entry.source_type.is_qualified_tip() {
        PayrollClass::NonTip
    } else if service_charge {
        PayrollClass::ServiceCharge
    } else {
        PayrollClass::QualifiedTip
    }
}

pub struct ReportingService<L, G> {
    policy: LocationPolicy,
    ledger: Arc<L>,
    groups: Arc<G>,
}

impl<L, G> ReportingService<L, G>
where
    L: LedgerStore,
    G: GroupStore,
{
    pub fn new(policy: LocationPolicy, ledger: Arc<L>, groups: Arc<G>) -> Self {
        Self {
            policy,
            ledger,
            groups,
        }
    }

    pub async fn balance(&self, employee_id: &str) -> Result<i64, ApplicationError> {
        Ok(self.ledger.balance(employee_id).await?)
    }

    pub async fn entries(
        &self,
        employee_id: &str,
        filter: EntryFilter,
    ) -> Result<Vec<LedgerEntry>, ApplicationError> {
        Ok(self.ledger.entries(employee_id, filter).await?)
    }

    /// Rows grouped by employee and source type over [from, to), qualified
    /// tips separated from service charges. Ordered by employee id, then
    /// source order of first appearance.
    pub async fn payroll_export(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<PayrollRow>, ApplicationError> {
        let entries = self.ledger.entries_in_range(from, to).await?;
        let mut rows: BTreeMap<(String, String), PayrollRow> = BTreeMap::new();
        for entry in entries {
            let class = classify(&entry);
            let key = (
                entry.employee_id.clone(),
                format!("{:?}:{:?}", entry.source_type, class),
            );
            rows.entry(key)
                .and_modify(|row| {
                    row.total_cents += entry.amount_cents;
                    row.entry_count += 1;
                })
                .or_insert(PayrollRow {
                    employee_id: entry.employee_id,
                    source_type: entry.source_type,
                    class,
                    total_cents: entry.amount_cents,
                    entry_count: 1,
                });
        }
        Ok(rows.into_values().collect())
    }

    /// Advisory compliance report. Period figures (sales, shift windows)
    /// come from the scheduling collaborator; warnings never block writes.
    pub async fn compliance_report(
        &self,
        figures: Vec<EmployeePeriodFigures>,
    ) -> Result<Vec<ComplianceWarning>, ApplicationError> {
        let groups = self
            .groups
            .groups_for_location(&self.policy.location_id)
            .await?;
        Ok(evaluate(&self.policy.compliance, &figures, &groups))
    }

    /// Integrity sweep: verify the materialized balance of each employee
    /// against the entry-log sum, self-healing with `recalculate_balance`.
    pub async fn heal_balance(&self, employee_id: &str) -> Result<i64, ApplicationError> {
        Ok(self.ledger.recalculate_balance(employee_id).await?)
    }

    pub async fn verify_balance(&self, employee_id: &str) -> Result<i64, ApplicationError> {
        Ok(self.ledger.verify_integrity(employee_id).await?)
    }
}
