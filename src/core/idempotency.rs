// Deterministic idempotency keys.
//
// Purpose
// - Every externally triggered posting derives its key from stable
//   identifiers only. Never wall-clock time, never randomness: a retried
//   webhook must produce the same key as the first delivery.
//
// Enforcement happens at the ledger store's uniqueness check inside its
// commit critical section, not here; these are just the naming rules.

pub fn payment_settled_key(payment_id: &str, employee_id: &str) -> String {
    format!("tip:{payment_id}:{employee_id}")
}

pub fn chargeback_key(payment_id: &str, employee_id: &str) -> String {
    format!("chargeback:{payment_id}:{employee_id}")
}

/// Reclaim entries ride on the credit that triggered them, so the key is
/// derived from the credit's own key plus the debt being paid down.
pub fn debt_reclaim_key(credit_key: &str, debt_id: &str) -> String {
    format!("{credit_key}:reclaim:{debt_id}")
}

/// `revision` is the caller's correction sequence number for the payment;
/// replaying the same correction is a no-op, the next correction bumps it.
pub fn recalculation_key(payment_id: &str, revision: u32, employee_id: &str) -> String {
    format!("recalc:{payment_id}:rev{revision}:{employee_id}")
}

/// Manager-initiated moves carry a client-supplied request id.
pub fn transfer_key(request_id: &str, employee_id: &str) -> String {
    format!("transfer:{request_id}:{employee_id}")
}

pub fn payout_key(request_id: &str, employee_id: &str) -> String {
    format!("payout:{request_id}:{employee_id}")
}
