// Recalculation: corrected allocation minus net posted equals the delta.
//
// Purpose
// - When the inputs behind an earlier allocation turn out to be wrong, we
//   never edit the posted entries. We recompute what should have been
//   posted, diff it against what actually was, and post only the
//   difference.
//
// Boundaries
// - Pure diffing. The caller supplies both sides; ordering of the output is
//   employee id ascending so replays are stable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::entry::{LedgerEntry, SourceType};

/// A signed per-employee correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationDelta {
    pub employee_id: String,
    pub delta_cents: i64,
}

/// Diff a corrected allocation against the net already posted for the same
/// event. Employees present on either side participate; zero deltas are
/// dropped. The deltas always sum to `corrected total - posted total`.
pub fn diff_allocations(
    posted_net: &[(String, i64)],
    corrected: &[(String, i64)],
) -> Vec<AllocationDelta> {
    let mut by_employee: BTreeMap<&str, i64> = BTreeMap::new();
    for (employee_id, cents) in corrected {
        *by_employee.entry(employee_id).or_insert(0) += cents;
    }
    for (employee_id, cents) in posted_net {
        *by_employee.entry(employee_id).or_insert(0) -= cents;
    }
    by_employee
        .into_iter()
        .filter(|(_, delta)| *delta != 0)
        .map(|(employee_id, delta)| AllocationDelta {
            employee_id: employee_id.to_string(),
            delta_cents: delta,
        })
        .collect()
}

/// Fold a payment's entries into per-employee nets, employee id ascending.
///
/// Chargeback rows are excluded: void debits and debt reclaims are not part
/// of what the employee earned from the payment, so corrections and further
/// reversals are computed against the earned amount.
pub fn net_posted(entries: &[LedgerEntry]) -> Vec<(String, i64)> {
    let mut by_employee: BTreeMap<&str, i64> = BTreeMap::new();
    for entry in entries {
        if entry.source_type == SourceType::Chargeback {
            continue;
        }
        *by_employee.entry(&entry.employee_id).or_insert(0) += entry.amount_cents;
    }
    by_employee
        .into_iter()
        .map(|(id, cents)| (id.to_string(), cents))
        .collect()
}
