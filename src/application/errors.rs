// Application error taxonomy.
//
// Responsibilities
// - One enum the shell can map onto status codes. Validation failures are
//   rejected before any write; idempotency conflicts never surface here
//   (the store reports them as AlreadyApplied, which is success).

use thiserror::Error;

use crate::core::allocation::AllocationError;
use crate::core::chargeback::ChargebackError;
use crate::core::ports::{GroupStoreError, LedgerStoreError};

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Chargeback(#[from] ChargebackError),

    #[error(transparent)]
    Store(LedgerStoreError),

    #[error(transparent)]
    Group(#[from] GroupStoreError),

    #[error("validation: {0}")]
    Validation(String),

    #[error(
        "insufficient balance: employee {employee_id} has {balance_cents}, needs {requested_cents}"
    )]
    InsufficientBalance {
        employee_id: String,
        balance_cents: i64,
        requested_cents: i64,
    },

    #[error("no ledger entries reference payment {0}")]
    UnknownPayment(String),

    #[error("unexpected: {0}")]
    Unexpected(String),
}

impl From<LedgerStoreError> for ApplicationError {
    fn from(err: LedgerStoreError) -> Self {
        match err {
            // The store raises this under its write lock; surface it as the
            // same rejection the handler's fail-fast check produces.
            LedgerStoreError::InsufficientBalance {
                employee_id,
                balance_cents,
                requested_cents,
            } => ApplicationError::InsufficientBalance {
                employee_id,
                balance_cents,
                requested_cents,
            },
            other => ApplicationError::Store(other),
        }
    }
}

impl ApplicationError {
    /// True for caller mistakes (bad input), as opposed to server-side
    /// failures. The shell maps these to 4xx.
    pub fn is_rejection(&self) -> bool {
        match self {
            ApplicationError::Allocation(_)
            | ApplicationError::Chargeback(_)
            | ApplicationError::Validation(_)
            | ApplicationError::InsufficientBalance { .. }
            | ApplicationError::UnknownPayment(_) => true,
            ApplicationError::Store(LedgerStoreError::Validation(_)) => true,
            ApplicationError::Group(err) => !matches!(err, GroupStoreError::Backend(_)),
            _ => false,
        }
    }
}
