// Chargeback planning and tip debt.
//
// Purpose
// - Turn "this payment's tip was voided" into per-employee debits that
//   mirror the original allocation, capped by a balance floor. Shortfall
//   that cannot be debited becomes a TipDebt, reclaimed FIFO out of the
//   employee's future credits.
//
// Boundaries
// - Pure planning. Balances and open debts are passed in; the store applies
//   the plan atomically.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::money::{Party, SplitError, split_by_weights};

/// Per-location policy for voided or disputed payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargebackPolicy {
    /// The house eats the loss; the ledger records nothing.
    BusinessAbsorbs,
    /// Recipients of the original tip are debited proportionally.
    EmployeeChargeback,
}

/// Carried shortfall from a chargeback the employee's balance could not
/// absorb. Never deleted; `remaining_cents` counts down to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TipDebt {
    pub id: String,
    pub employee_id: String,
    pub location_id: String,
    pub payment_id: String,
    /// Transaction that recorded the debt; stamped by the ledger store at
    /// commit time.
    pub transaction_id: String,
    pub amount_cents: i64,
    pub remaining_cents: i64,
    pub created_at: i64,
}

impl TipDebt {
    pub fn is_open(&self) -> bool {
        self.remaining_cents > 0
    }
}

/// One employee's side of a chargeback plan. `debit_cents` is what the
/// ledger can take now; `shortfall_cents` becomes a TipDebt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargebackDebit {
    pub employee_id: String,
    pub debit_cents: i64,
    pub shortfall_cents: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChargebackError {
    #[error("chargeback amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("chargeback of {requested} exceeds the {available} originally allocated")]
    ExceedsOriginal { requested: i64, available: i64 },

    #[error("nothing was allocated for this payment")]
    NothingToReverse,

    #[error(transparent)]
    Split(#[from] SplitError),
}

/// Plan debits reversing `chargeback_cents` of a prior allocation.
///
/// `original_net` is each employee's net posted amount for the payment
/// (original allocation plus any recalculation deltas). The reversal uses
/// those amounts as weights with the same largest-remainder rounding as the
/// original split, so a full chargeback mirrors the allocation exactly.
/// Debits are capped so no balance drops below `floor_cents`.
pub fn plan_chargeback(
    original_net: &[(String, i64)],
    chargeback_cents: i64,
    balances: &HashMap<String, i64>,
    floor_cents: i64,
) -> Result<Vec<ChargebackDebit>, ChargebackError> {
    if chargeback_cents <= 0 {
        return Err(ChargebackError::NonPositiveAmount(chargeback_cents));
    }
    let recipients: Vec<&(String, i64)> =
        original_net.iter().filter(|(_, net)| *net > 0).collect();
    if recipients.is_empty() {
        return Err(ChargebackError::NothingToReverse);
    }
    let available: i64 = recipients.iter().map(|(_, net)| net).sum();
    if chargeback_cents > available {
        return Err(ChargebackError::ExceedsOriginal {
            requested: chargeback_cents,
            available,
        });
    }

    let parties: Vec<Party> = recipients
        .iter()
        .map(|(id, net)| Party::new(id.clone(), *net as u64))
        .collect();
    let pieces = split_by_weights(chargeback_cents, &parties)?;

    Ok(pieces
        .into_iter()
        .filter(|p| p.amount_cents > 0)
        .map(|piece| {
            let balance = balances.get(&piece.id).copied().unwrap_or(0);
            let absorbable = (balance - floor_cents).max(0);
            let debit = piece.amount_cents.min(absorbable);
            ChargebackDebit {
                employee_id: piece.id,
                debit_cents: debit,
                shortfall_cents: piece.amount_cents - debit,
            }
        })
        .collect())
}

/// One payment against an open debt, planned out of an incoming credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtReclaim {
    pub debt_id: String,
    pub amount_cents: i64,
}

/// Split an incoming credit against the employee's open debts, oldest
/// first. Returns the reclaims to apply; whatever is left of the credit
/// stays on the balance.
pub fn plan_debt_reclaims(credit_cents: i64, open_debts: &[TipDebt]) -> Vec<DebtReclaim> {
    let mut ordered: Vec<&TipDebt> = open_debts.iter().filter(|d| d.is_open()).collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut remaining = credit_cents.max(0);
    let mut reclaims = Vec::new();
    for debt in ordered {
        if remaining == 0 {
            break;
        }
        let take = debt.remaining_cents.min(remaining);
        reclaims.push(DebtReclaim {
            debt_id: debt.id.clone(),
            amount_cents: take,
        });
        remaining -= take;
    }
    reclaims
}
