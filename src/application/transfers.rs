// Manager-initiated moves: transfers between employees and payouts.
//
// Responsibilities
// - Enforce the non-negative floor these flows require (chargebacks degrade
//   to TipDebt instead; manual moves fail with InsufficientBalance). The
//   handler-side balance read is fail-fast only; the binding check runs in
//   the store's commit critical section via the draft's floor.
// - Post paired entries in one transaction so both balances move together.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::errors::ApplicationError;
use crate::application::policy::LocationPolicy;
use crate::core::entry::{EntryDraft, SourceType, TransactionDraft, TransactionKind};
use crate::core::idempotency::{payout_key, transfer_key};
use crate::core::ports::{LedgerStore, PostOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Client-supplied id making retries of the same transfer idempotent.
    pub request_id: String,
    pub from_employee_id: String,
    pub to_employee_id: String,
    pub amount_cents: i64,
    pub memo: String,
    pub occurred_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub request_id: String,
    pub employee_id: String,
    pub amount_cents: i64,
    /// cash, payroll, card ... recorded on the entry context only.
    pub method: String,
    pub occurred_at: i64,
}

pub struct TransferHandler<L> {
    policy: LocationPolicy,
    ledger: Arc<L>,
}

impl<L: LedgerStore> TransferHandler<L> {
    pub fn new(policy: LocationPolicy, ledger: Arc<L>) -> Self {
        Self { policy, ledger }
    }

    pub async fn transfer(
        &self,
        request: TransferRequest,
    ) -> Result<PostOutcome, ApplicationError> {
        if request.amount_cents <= 0 {
            return Err(ApplicationError::Validation(format!(
                "transfer amount must be positive, got {}",
                request.amount_cents
            )));
        }
        if request.from_employee_id == request.to_employee_id {
            return Err(ApplicationError::Validation(
                "cannot transfer to the same employee".into(),
            ));
        }
        self.require_funds(&request.from_employee_id, request.amount_cents)
            .await?;

        let context = serde_json::json!({
            "request_id": request.request_id,
            "memo": request.memo,
            "from": request.from_employee_id,
            "to": request.to_employee_id,
        });
        let outcome = self
            .ledger
            .post(
                TransactionDraft {
                    kind: TransactionKind::Transfer,
                    location_id: self.policy.location_id.clone(),
                    occurred_at: request.occurred_at,
                    entries: vec![
                        EntryDraft {
                            employee_id: request.from_employee_id.clone(),
                            amount_cents: -request.amount_cents,
                            source_type: SourceType::Transfer,
                            idempotency_key: transfer_key(
                                &request.request_id,
                                &request.from_employee_id,
                            ),
                            context: context.clone(),
                        },
                        EntryDraft {
                            employee_id: request.to_employee_id.clone(),
                            amount_cents: request.amount_cents,
                            source_type: SourceType::Transfer,
                            idempotency_key: transfer_key(
                                &request.request_id,
                                &request.to_employee_id,
                            ),
                            context,
                        },
                    ],
                    min_balance_cents: Some(0),
                },
                Vec::new(),
            )
            .await?;

        info!(
            request_id = %request.request_id,
            transaction_id = %outcome.transaction_id(),
            applied = outcome.was_applied(),
            "transfer posted"
        );
        Ok(outcome)
    }

    pub async fn payout(&self, request: PayoutRequest) -> Result<PostOutcome, ApplicationError> {
        if request.amount_cents <= 0 {
            return Err(ApplicationError::Validation(format!(
                "payout amount must be positive, got {}",
                request.amount_cents
            )));
        }
        self.require_funds(&request.employee_id, request.amount_cents)
            .await?;

        let outcome = self
            .ledger
            .post(
                TransactionDraft {
                    kind: TransactionKind::Payout,
                    location_id: self.policy.location_id.clone(),
                    occurred_at: request.occurred_at,
                    entries: vec![EntryDraft {
                        idempotency_key: payout_key(&request.request_id, &request.employee_id),
                        context: serde_json::json!({
                            "request_id": request.request_id,
                            "method": request.method,
                        }),
                        employee_id: request.employee_id,
                        amount_cents: -request.amount_cents,
                        source_type: SourceType::Payout,
                    }],
                    min_balance_cents: Some(0),
                },
                Vec::new(),
            )
            .await?;

        info!(
            request_id = %request.request_id,
            transaction_id = %outcome.transaction_id(),
            applied = outcome.was_applied(),
            "payout posted"
        );
        Ok(outcome)
    }

    async fn require_funds(
        &self,
        employee_id: &str,
        requested_cents: i64,
    ) -> Result<(), ApplicationError> {
        let balance_cents = self.ledger.balance(employee_id).await?;
        if balance_cents < requested_cents {
            return Err(ApplicationError::InsufficientBalance {
                employee_id: employee_id.to_string(),
                balance_cents,
                requested_cents,
            });
        }
        Ok(())
    }
}
