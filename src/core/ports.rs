// Ports define what the core needs from the outside world, without
// implementing it.
//
// Purpose
// - Describe the storage capabilities as traits (LedgerStore, GroupStore,
//   OwnershipDirectory) so the domain stays independent of any database.
//
// Boundaries
// - No concrete input or output here. Adapters implement these traits.
//
// Testing guidance
// - In-memory implementations live under adapters/in_memory and back every
//   test and local run.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::allocation::OrderOwnership;
use crate::core::chargeback::TipDebt;
use crate::core::entry::{DraftError, LedgerEntry, TransactionDraft};
use crate::core::group::{GroupError, TipGroup};

#[derive(Debug, Error)]
pub enum LedgerStoreError {
    #[error("validation failed: {0}")]
    Validation(#[from] DraftError),

    #[error(
        "materialized balance {materialized} disagrees with entry sum {computed} for {employee_id}"
    )]
    Integrity {
        employee_id: String,
        materialized: i64,
        computed: i64,
    },

    /// A draft with a `min_balance_cents` constraint would have left an
    /// employee below the floor. Raised under the write lock, against the
    /// balance at commit time.
    #[error(
        "insufficient balance: {employee_id} has {balance_cents}, debit of {requested_cents} would breach the floor"
    )]
    InsufficientBalance {
        employee_id: String,
        balance_cents: i64,
        requested_cents: i64,
    },

    #[error("backend error: {0}")]
    Backend(String),
}

/// Result of a post. Idempotency-key reuse is not an error: the caller gets
/// the transaction that already committed and may treat the call as done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Applied { transaction_id: String },
    AlreadyApplied { transaction_id: String },
}

impl PostOutcome {
    pub fn transaction_id(&self) -> &str {
        match self {
            PostOutcome::Applied { transaction_id }
            | PostOutcome::AlreadyApplied { transaction_id } => transaction_id,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, PostOutcome::Applied { .. })
    }
}

/// Filter for entry reads. Results come back newest-first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub from: Option<i64>,
    pub to: Option<i64>,
    /// Page size; `None` returns everything matching.
    pub limit: Option<usize>,
    /// Id of the previous page's oldest entry; only entries committed
    /// before it are returned. An id cursor, not a timestamp: entries in
    /// one transaction share `occurred_at`, so a timestamp cursor would
    /// skip the rest of a transaction cut by a page boundary.
    pub before: Option<String>,
}

/// Append-only entry log plus materialized balances and open tip debts.
///
/// Implementations must commit a post atomically: entries, balance updates,
/// recorded debts and debt reclaims become visible all-or-none, and the
/// idempotency-key uniqueness check happens inside the same critical
/// section as the write.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Post a transaction. `new_debts` are recorded in the same atomic unit
    /// (used by chargebacks that could not debit in full). Positive entries
    /// are split against the employee's open debts FIFO; the reclaimed
    /// prefix posts as paired negative entries in the same transaction.
    async fn post(
        &self,
        draft: TransactionDraft,
        new_debts: Vec<TipDebt>,
    ) -> Result<PostOutcome, LedgerStoreError>;

    async fn balance(&self, employee_id: &str) -> Result<i64, LedgerStoreError>;

    async fn entries(
        &self,
        employee_id: &str,
        filter: EntryFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError>;

    /// Every entry whose context references the payment, oldest-first.
    /// Chargebacks and recalculations fold these into per-employee nets.
    async fn entries_for_payment(
        &self,
        payment_id: &str,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError>;

    /// All entries in [from, to), for payroll export.
    async fn entries_in_range(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError>;

    /// O(n) recompute of the balance from the entry log. Self-heals drift:
    /// the materialized balance is overwritten with the computed sum.
    async fn recalculate_balance(&self, employee_id: &str) -> Result<i64, LedgerStoreError>;

    /// Raise `Integrity` if the materialized balance disagrees with the
    /// entry-log sum. Recovery is `recalculate_balance`, never an edit.
    async fn verify_integrity(&self, employee_id: &str) -> Result<i64, LedgerStoreError>;

    async fn open_debts(&self, employee_id: &str) -> Result<Vec<TipDebt>, LedgerStoreError>;

    /// Every debt (open or settled) recorded for a payment's chargeback.
    /// Lets a re-delivered void detect that it already applied even when
    /// the first pass degraded entirely to debt.
    async fn debts_for_payment(&self, payment_id: &str) -> Result<Vec<TipDebt>, LedgerStoreError>;
}

#[derive(Debug, Error)]
pub enum GroupStoreError {
    #[error("group {0} not found")]
    NotFound(String),

    #[error("group {group_id} already exists")]
    AlreadyExists { group_id: String },

    #[error("employee {employee_id} is already pooled in group {group_id}")]
    AlreadyPooled {
        employee_id: String,
        group_id: String,
    },

    #[error(transparent)]
    Domain(#[from] GroupError),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Group lifecycle storage. Implementations serialize transitions per
/// group, which is what keeps segments contiguous under concurrent calls.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn create(&self, group: TipGroup) -> Result<(), GroupStoreError>;

    async fn join(
        &self,
        group_id: &str,
        employee_id: &str,
        tip_weight: u64,
        at: i64,
        segment_id: String,
    ) -> Result<TipGroup, GroupStoreError>;

    async fn leave(
        &self,
        group_id: &str,
        employee_id: &str,
        at: i64,
        segment_id: String,
    ) -> Result<TipGroup, GroupStoreError>;

    async fn close(&self, group_id: &str, at: i64) -> Result<TipGroup, GroupStoreError>;

    async fn get(&self, group_id: &str) -> Result<TipGroup, GroupStoreError>;

    /// Every group for the location, open and closed. Allocation filters by
    /// segment coverage itself.
    async fn groups_for_location(&self, location_id: &str)
    -> Result<Vec<TipGroup>, GroupStoreError>;
}

/// Order-ownership lookup, fed by the order/payment collaborator.
#[async_trait]
pub trait OwnershipDirectory: Send + Sync {
    async fn ownership_for(&self, order_id: &str) -> anyhow::Result<Option<OrderOwnership>>;

    /// Record or overwrite the split for an order (upstream corrections
    /// land here before a recalculation is requested).
    async fn record(&self, ownership: OrderOwnership) -> anyhow::Result<()>;
}
