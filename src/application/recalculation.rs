// Adjustment flow: replay an allocation under corrected inputs and post
// only the delta.
//
// Responsibilities
// - Record the corrected ownership, recompute the allocation with the same
//   deterministic engine, diff against the net already posted, and post
//   Adjustment entries carrying before/after context.
// - Never touch prior entries; replaying the same revision no-ops on its
//   idempotency keys.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::errors::ApplicationError;
use crate::application::policy::LocationPolicy;
use crate::core::allocation::{OrderOwnership, allocate};
use crate::core::entry::{EntryDraft, SourceType, TransactionDraft, TransactionKind};
use crate::core::idempotency::recalculation_key;
use crate::core::ports::{GroupStore, LedgerStore, OwnershipDirectory, PostOutcome};
use crate::core::recalculation::{diff_allocations, net_posted};

/// Manager-initiated correction of an earlier allocation's inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    pub payment_id: String,
    pub order_id: String,
    /// Timestamp of the original tip event; segment resolution replays at
    /// this instant, not at correction time.
    pub occurred_at: i64,
    /// Corrected tip amount (unchanged corrections pass the original).
    pub tip_amount_cents: i64,
    /// Corrected ownership split, if that is what was wrong. Recorded in
    /// the directory before recomputing.
    pub corrected_ownership: Option<OrderOwnership>,
    /// Correction sequence number for this payment; bump per correction.
    pub revision: u32,
    pub reason: String,
}

pub struct RecalculationHandler<L, G, O> {
    policy: LocationPolicy,
    ledger: Arc<L>,
    groups: Arc<G>,
    ownership: Arc<O>,
}

impl<L, G, O> RecalculationHandler<L, G, O>
where
    L: LedgerStore,
    G: GroupStore,
    O: OwnershipDirectory,
{
    pub fn new(policy: LocationPolicy, ledger: Arc<L>, groups: Arc<G>, ownership: Arc<O>) -> Self {
        Self {
            policy,
            ledger,
            groups,
            ownership,
        }
    }

    /// Returns `None` when the corrected allocation matches what is already
    /// posted.
    pub async fn adjust(
        &self,
        request: AdjustmentRequest,
    ) -> Result<Option<PostOutcome>, ApplicationError> {
        let posted = self.ledger.entries_for_payment(&request.payment_id).await?;
        if posted.is_empty() {
            return Err(ApplicationError::UnknownPayment(request.payment_id));
        }

        if let Some(corrected) = &request.corrected_ownership {
            corrected.validate()?;
            self.ownership
                .record(corrected.clone())
                .await
                .map_err(|e| ApplicationError::Unexpected(e.to_string()))?;
        }

        let ownership = match request.corrected_ownership.clone() {
            Some(ownership) => ownership,
            None => self
                .ownership
                .ownership_for(&request.order_id)
                .await
                .map_err(|e| ApplicationError::Unexpected(e.to_string()))?
                .ok_or_else(|| {
                    ApplicationError::Validation(format!(
                        "no ownership on record for order {}",
                        request.order_id
                    ))
                })?,
        };

        let groups = self
            .groups
            .groups_for_location(&self.policy.location_id)
            .await?;
        let corrected_shares = allocate(
            request.tip_amount_cents,
            request.occurred_at,
            &ownership,
            &groups,
        )?;
        let corrected: Vec<(String, i64)> = corrected_shares
            .iter()
            .map(|s| (s.employee_id.clone(), s.amount_cents))
            .collect();

        let before = net_posted(&posted);
        let deltas = diff_allocations(&before, &corrected);
        if deltas.is_empty() {
            info!(payment_id = %request.payment_id, "recalculation produced no delta");
            return Ok(None);
        }

        let context = serde_json::json!({
            "payment_id": request.payment_id,
            "order_id": request.order_id,
            "revision": request.revision,
            "reason": request.reason,
            "before": before
                .iter()
                .map(|(id, cents)| serde_json::json!({"employee_id": id, "net_cents": cents}))
                .collect::<Vec<_>>(),
            "after": corrected
                .iter()
                .map(|(id, cents)| serde_json::json!({"employee_id": id, "cents": cents}))
                .collect::<Vec<_>>(),
        });

        let entries = deltas
            .into_iter()
            .map(|delta| EntryDraft {
                idempotency_key: recalculation_key(
                    &request.payment_id,
                    request.revision,
                    &delta.employee_id,
                ),
                context: context.clone(),
                employee_id: delta.employee_id,
                amount_cents: delta.delta_cents,
                source_type: SourceType::Adjustment,
            })
            .collect();

        let outcome = self
            .ledger
            .post(
                TransactionDraft {
                    kind: TransactionKind::Adjustment,
                    location_id: self.policy.location_id.clone(),
                    occurred_at: request.occurred_at,
                    entries,
                    min_balance_cents: None,
                },
                Vec::new(),
            )
            .await?;

        info!(
            payment_id = %request.payment_id,
            revision = request.revision,
            transaction_id = %outcome.transaction_id(),
            applied = outcome.was_applied(),
            "recalculation delta posted"
        );
        Ok(Some(outcome))
    }
}
