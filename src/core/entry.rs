// Ledger entry and transaction types.
//
// Purpose
// - Model the append-only double-entry vocabulary: immutable signed line
//   items, grouped into transactions that commit all-or-none.
//
// Responsibilities
// - Carry identifiers and audit context; validate a draft before the store
//   ever sees it.
//
// Boundaries
// - No input or output. Ids and timestamps are minted by callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where an entry's money came from or went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    DirectTip,
    RoleTipout,
    GroupShare,
    Transfer,
    Payout,
    Chargeback,
    Adjustment,
}

impl SourceType {
    /// IRS-reportable tip income, as opposed to service charges, payouts
    /// and internal movements.
    pub fn is_qualified_tip(self) -> bool {
        matches!(
            self,
            SourceType::DirectTip | SourceType::RoleTipout | SourceType::GroupShare
        )
    }
}

/// How a transaction's entries must balance.
///
/// Transfers move money between employees inside the closed system and must
/// sum to zero. External kinds legitimately inject or remove money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    TipAllocation,
    Transfer,
    Payout,
    Chargeback,
    Adjustment,
}

impl TransactionKind {
    pub fn must_sum_to_zero(self) -> bool {
        matches!(self, TransactionKind::Transfer)
    }
}

/// One immutable, signed line item in an employee's ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub employee_id: String,
    pub location_id: String,
    pub amount_cents: i64,
    pub source_type: SourceType,
    pub transaction_id: String,
    pub idempotency_key: String,
    /// Business time of the triggering event; reporting ranges and
    /// pagination cursors use this.
    pub occurred_at: i64,
    /// Commit time at the store.
    pub created_at: i64,
    /// Free-form audit context: order/payment/group/segment identifiers,
    /// before/after inputs for corrections.
    pub context: serde_json::Value,
}

/// One not-yet-committed line of a transaction draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub employee_id: String,
    pub amount_cents: i64,
    pub source_type: SourceType,
    pub idempotency_key: String,
    pub context: serde_json::Value,
}

/// A set of entries that must become visible all-or-none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub kind: TransactionKind,
    pub location_id: String,
    pub occurred_at: i64,
    pub entries: Vec<EntryDraft>,
    /// Lowest balance any debited employee may be left with. Checked by the
    /// store inside its commit critical section, so concurrent writers
    /// cannot both pass a stale handler-side read. `None` skips the check
    /// (chargebacks cap their debits during planning instead).
    #[serde(default)]
    pub min_balance_cents: Option<i64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("transaction has no entries")]
    Empty,

    #[error("entry for {employee_id} has zero amount")]
    ZeroAmount { employee_id: String },

    #[error("entry has empty employee id")]
    MissingEmployee,

    #[error("entry for {employee_id} has empty idempotency key")]
    MissingIdempotencyKey { employee_id: String },

    #[error("idempotency key {key} appears twice in one draft")]
    DuplicateKeyInDraft { key: String },

    #[error("transfer entries must sum to zero, got {sum}")]
    Unbalanced { sum: i64 },
}

impl TransactionDraft {
    /// Validate the draft's internal consistency. The store runs this before
    /// any write; handlers may run it earlier for fail-fast behavior.
    pub fn validate(&self) -> Result<(), DraftError> {
        if self.entries.is_empty() {
            return Err(DraftError::Empty);
        }
        let mut keys: Vec<&str> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if entry.employee_id.is_empty() {
                return Err(DraftError::MissingEmployee);
            }
            if entry.amount_cents == 0 {
                return Err(DraftError::ZeroAmount {
                    employee_id: entry.employee_id.clone(),
                });
            }
            if entry.idempotency_key.is_empty() {
                return Err(DraftError::MissingIdempotencyKey {
                    employee_id: entry.employee_id.clone(),
                });
            }
            if keys.contains(&entry.idempotency_key.as_str()) {
                return Err(DraftError::DuplicateKeyInDraft {
                    key: entry.idempotency_key.clone(),
                });
            }
            keys.push(&entry.idempotency_key);
        }
        if self.kind.must_sum_to_zero() {
            let sum: i64 = self.entries.iter().map(|e| e.amount_cents).sum();
            if sum != 0 {
                return Err(DraftError::Unbalanced { sum });
            }
        }
        Ok(())
    }
}
