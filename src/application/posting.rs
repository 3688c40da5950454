// Payment-settled flow: allocate the tip and commit it.
//
// Responsibilities
// - Resolve order ownership (falling back to the attributed server), ask
//   the group store which segments apply, run the allocation engine, and
//   post the resulting transaction under deterministic idempotency keys.
// - Tolerate duplicate deliveries: a retried event hits the same keys and
//   comes back AlreadyApplied.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::errors::ApplicationError;
use crate::application::policy::LocationPolicy;
use crate::core::allocation::{OrderOwnership, ShareBasis, allocate};
use crate::core::entry::{EntryDraft, SourceType, TransactionDraft, TransactionKind};
use crate::core::idempotency::payment_settled_key;
use crate::core::ports::{GroupStore, LedgerStore, OwnershipDirectory, PostOutcome};

/// Inbound event from the order/payment collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSettled {
    pub payment_id: String,
    pub order_id: String,
    /// Employee the order is attributed to when no explicit ownership split
    /// was recorded.
    pub server_id: String,
    pub tip_amount_cents: i64,
    pub occurred_at: i64,
    /// Auto-gratuity / service charge rather than a voluntary tip; kept on
    /// the entry context so payroll can separate the two.
    #[serde(default)]
    pub service_charge: bool,
}

pub struct TipPostingHandler<L, G, O> {
    policy: LocationPolicy,
    ledger: Arc<L>,
    groups: Arc<G>,
    ownership: Arc<O>,
}

impl<L, G, O> TipPostingHandler<L, G, O>
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

    /// Returns `None` for zero-tip settlements (nothing to allocate).
    pub async fn handle(
        &self,
        event: PaymentSettled,
    ) -> Result<Option<PostOutcome>, ApplicationError> {
        if event.tip_amount_cents == 0 {
            return Ok(None);
        }
        if event.tip_amount_cents < 0 {
            return Err(ApplicationError::Validation(format!(
                "tip amount must not be negative, got {}",
                event.tip_amount_cents
            )));
        }

        let ownership = self
            .ownership
            .ownership_for(&event.order_id)
            .await
            .map_err(|e| ApplicationError::Unexpected(e.to_string()))?
            .unwrap_or_else(|| OrderOwnership::sole(&event.order_id, &event.server_id));

        let groups = self
            .groups
            .groups_for_location(&self.policy.location_id)
            .await?;

        let shares = allocate(
            event.tip_amount_cents,
            event.occurred_at,
            &ownership,
            &groups,
        )?;

        let entries = shares
            .into_iter()
            .map(|share| EntryDraft {
                idempotency_key: payment_settled_key(&event.payment_id, &share.employee_id),
                context: serde_json::json!({
                    "payment_id": event.payment_id,
                    "order_id": event.order_id,
                    "group_id": share.group_id,
                    "segment_id": share.segment_id,
                    "service_charge": event.service_charge,
                }),
                employee_id: share.employee_id,
                amount_cents: share.amount_cents,
                source_type: match share.basis {
                    ShareBasis::DirectTip => SourceType::DirectTip,
                    ShareBasis::GroupShare => SourceType::GroupShare,
                },
            })
            .collect();

        let outcome = self
            .ledger
            .post(
                TransactionDraft {
                    kind: TransactionKind::TipAllocation,
                    location_id: self.policy.location_id.clone(),
                    occurred_at: event.occurred_at,
                    entries,
                    min_balance_cents: None,
                },
                Vec::new(),
            )
            .await?;

        info!(
            payment_id = %event.payment_id,
            transaction_id = %outcome.transaction_id(),
            applied = outcome.was_applied(),
            "tip allocation posted"
        );
        Ok(Some(outcome))
    }
}
