// Per-location policy, passed explicitly into every flow.
//
// Allocation and chargeback behavior is a pure function of its inputs;
// nothing reads ambient configuration, so recalculation can replay a flow
// under the exact policy that applied at the time.

use serde::{Deserialize, Serialize};

use crate::core::chargeback::ChargebackPolicy;
use crate::core::compliance::ComplianceRules;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationPolicy {
    pub location_id: String,
    pub chargeback_policy: ChargebackPolicy,
    /// Lowest balance a chargeback debit may leave behind. 0 means debits
    /// cap at zero and the shortfall becomes TipDebt.
    pub clawback_floor_cents: i64,
    pub compliance: ComplianceRules,
}

impl LocationPolicy {
    pub fn new(location_id: impl Into<String>) -> Self {
        Self {
            location_id: location_id.into(),
            chargeback_policy: ChargebackPolicy::EmployeeChargeback,
            clawback_floor_cents: 0,
            compliance: ComplianceRules::default(),
        }
    }
}
