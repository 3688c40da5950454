// Payment-voided flow: reverse what the payment's tip paid out.
//
// Responsibilities
// - Fold the payment's posted entries into per-employee nets, plan the
//   reversal under the location policy, and post debits plus any TipDebt in
//   one atomic unit.
// - Re-delivered void events hit the same chargeback keys and no-op.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::errors::ApplicationError;
use crate::application::policy::LocationPolicy;
use crate::core::chargeback::{ChargebackPolicy, TipDebt, plan_chargeback};
use crate::core::entry::{EntryDraft, SourceType, TransactionDraft, TransactionKind};
use crate::core::idempotency::chargeback_key;
use crate::core::ports::{LedgerStore, PostOutcome};
use crate::core::recalculation::net_posted;

/// Inbound event from the order/payment collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVoided {
    pub payment_id: String,
    pub reason: String,
    pub occurred_at: i64,
}

pub struct ChargebackHandler<L> {
    policy: LocationPolicy,
    ledger: Arc<L>,
}

impl<L: LedgerStore> ChargebackHandler<L> {
    pub fn new(policy: LocationPolicy, ledger: Arc<L>) -> Self {
        Self { policy, ledger }
    }

    /// Returns `None` when the policy absorbs the loss or nothing remains
    /// to reverse.
    pub async fn handle(
        &self,
        event: PaymentVoided,
    ) -> Result<Option<PostOutcome>, ApplicationError> {
        let posted = self.ledger.entries_for_payment(&event.payment_id).await?;
        if posted.is_empty() {
            return Err(ApplicationError::UnknownPayment(event.payment_id));
        }

        if self.policy.chargeback_policy == ChargebackPolicy::BusinessAbsorbs {
            info!(
                payment_id = %event.payment_id,
                reason = %event.reason,
                "payment voided; business absorbs the tip loss"
            );
            return Ok(None);
        }

        // A re-delivered void must not plan debits from post-void balances.
        // Any prior chargeback entry or recorded debt for this payment means
        // the reversal already committed.
        if let Some(prior) = posted
            .iter()
            .find(|e| e.source_type == SourceType::Chargeback)
        {
            return Ok(Some(PostOutcome::AlreadyApplied {
                transaction_id: prior.transaction_id.clone(),
            }));
        }
        if let Some(prior) = self
            .ledger
            .debts_for_payment(&event.payment_id)
            .await?
            .first()
        {
            return Ok(Some(PostOutcome::AlreadyApplied {
                transaction_id: prior.transaction_id.clone(),
            }));
        }

        let net = net_posted(&posted);
        let total: i64 = net.iter().map(|(_, cents)| cents).filter(|c| **c > 0).sum();
        if total == 0 {
            info!(payment_id = %event.payment_id, "nothing left to reverse");
            return Ok(None);
        }

        let mut balances: HashMap<String, i64> = HashMap::new();
        for (employee_id, _) in &net {
            balances.insert(
                employee_id.clone(),
                self.ledger.balance(employee_id).await?,
            );
        }

        let debits = plan_chargeback(&net, total, &balances, self.policy.clawback_floor_cents)?;

        let mut entries = Vec::new();
        let mut debts = Vec::new();
        for debit in debits {
            if debit.debit_cents > 0 {
                entries.push(EntryDraft {
                    idempotency_key: chargeback_key(&event.payment_id, &debit.employee_id),
                    context: serde_json::json!({
                        "payment_id": event.payment_id,
                        "reason": event.reason,
                        "original_net_cents": net
                            .iter()
                            .find(|(id, _)| *id == debit.employee_id)
                            .map(|(_, cents)| *cents),
                    }),
                    employee_id: debit.employee_id.clone(),
                    amount_cents: -debit.debit_cents,
                    source_type: SourceType::Chargeback,
                });
            }
            if debit.shortfall_cents > 0 {
                debts.push(TipDebt {
                    // Deterministic id so a re-delivered void cannot record
                    // the same debt twice.
                    id: format!("debt:{}:{}", event.payment_id, debit.employee_id),
                    employee_id: debit.employee_id,
                    location_id: self.policy.location_id.clone(),
                    payment_id: event.payment_id.clone(),
                    transaction_id: String::new(),
                    amount_cents: debit.shortfall_cents,
                    remaining_cents: debit.shortfall_cents,
                    created_at: event.occurred_at,
                });
            }
        }

        let outcome = self
            .ledger
            .post(
                TransactionDraft {
                    kind: TransactionKind::Chargeback,
                    location_id: self.policy.location_id.clone(),
                    occurred_at: event.occurred_at,
                    entries,
                    min_balance_cents: None,
                },
                debts,
            )
            .await?;

        info!(
            payment_id = %event.payment_id,
            transaction_id = %outcome.transaction_id(),
            applied = outcome.was_applied(),
            "chargeback posted"
        );
        Ok(Some(outcome))
    }
}
