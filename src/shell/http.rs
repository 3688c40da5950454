// HTTP inbound adapter.
//
// Responsibilities
// - Translate JSON bodies into application calls and the error taxonomy
//   into status codes.
// - Payment webhooks are best-effort: the ledger must never fail the
//   triggering payment, so /payments/* always answers 202 and failures are
//   logged for reconciliation.

use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::application::errors::ApplicationError;
use crate::application::groups::StartGroupRequest;
use crate::application::posting::PaymentSettled;
use crate::application::recalculation::AdjustmentRequest;
use crate::application::transfers::{PayoutRequest, TransferRequest};
use crate::core::allocation::OrderOwnership;
use crate::core::compliance::EmployeePeriodFigures;
use crate::core::ports::{EntryFilter, GroupStoreError, OwnershipDirectory, PostOutcome};
use crate::shell::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/payments/settled", post(payment_settled))
        .route("/payments/voided", post(payment_voided))
        .route("/orders/{order_id}/ownership", post(record_ownership))
        .route("/groups", post(start_group))
        .route("/groups/{group_id}/join", post(join_group))
        .route("/groups/{group_id}/leave", post(leave_group))
        .route("/groups/{group_id}/close", post(close_group))
        .route("/transfers", post(transfer))
        .route("/payouts", post(payout))
        .route("/adjustments", post(adjust))
        .route("/employees/{employee_id}/balance", get(balance))
        .route("/employees/{employee_id}/entries", get(entries))
        .route(
            "/employees/{employee_id}/verify-balance",
            get(verify_balance),
        )
        .route(
            "/employees/{employee_id}/recalculate-balance",
            post(recalculate_balance),
        )
        .route("/payroll-export", get(payroll_export))
        .route("/compliance/report", post(compliance_report))
        .with_state(state)
}

fn status_for(err: &ApplicationError) -> StatusCode {
    match err {
        ApplicationError::InsufficientBalance { .. } => StatusCode::CONFLICT,
        ApplicationError::UnknownPayment(_) => StatusCode::NOT_FOUND,
        ApplicationError::Group(GroupStoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        ApplicationError::Group(_) => StatusCode::CONFLICT,
        err if err.is_rejection() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(err: &ApplicationError) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": err.to_string() }))
}

#[derive(Serialize)]
struct PostingAck {
    accepted: bool,
    applied: bool,
    transaction_id: Option<String>,
}

impl PostingAck {
    fn from_outcome(outcome: Option<PostOutcome>) -> Self {
        Self {
            accepted: true,
            applied: outcome.as_ref().map(|o| o.was_applied()).unwrap_or(false),
            transaction_id: outcome.map(|o| o.transaction_id().to_string()),
        }
    }
}

#[derive(Deserialize)]
struct PaymentSettledBody {
    payment_id: String,
    order_id: String,
    server_id: String,
    tip_amount_cents: i64,
    occurred_at: Option<i64>,
    #[serde(default)]
    service_charge: bool,
}

async fn payment_settled(
    State(state): State<AppState>,
    body: Result<Json<PaymentSettledBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    };
    let event = PaymentSettled {
        payment_id: body.payment_id,
        order_id: body.order_id,
        server_id: body.server_id,
        tip_amount_cents: body.tip_amount_cents,
        occurred_at: body.occurred_at.unwrap_or_else(|| Utc::now().timestamp_millis()),
        service_charge: body.service_charge,
    };
    // Best-effort: the payment already settled; a posting failure is ours
    // to reconcile, not the caller's to retry into a 5xx.
    match state.posting.handle(event).await {
        Ok(outcome) => (
            StatusCode::ACCEPTED,
            Json(PostingAck::from_outcome(outcome)),
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "tip posting failed; logged for reconciliation");
            (
                StatusCode::ACCEPTED,
                Json(PostingAck {
                    accepted: false,
                    applied: false,
                    transaction_id: None,
                }),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
struct PaymentVoidedBody {
    payment_id: String,
    reason: String,
    occurred_at: Option<i64>,
}

async fn payment_voided(
    State(state): State<AppState>,
    body: Result<Json<PaymentVoidedBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    };
    let event = crate::application::chargeback::PaymentVoided {
        payment_id: body.payment_id,
        reason: body.reason,
        occurred_at: body.occurred_at.unwrap_or_else(|| Utc::now().timestamp_millis()),
    };
    match state.chargebacks.handle(event).await {
        Ok(outcome) => (
            StatusCode::ACCEPTED,
            Json(PostingAck::from_outcome(outcome)),
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "chargeback failed; logged for reconciliation");
            (
                StatusCode::ACCEPTED,
                Json(PostingAck {
                    accepted: false,
                    applied: false,
                    transaction_id: None,
                }),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
struct OwnershipBody {
    entries: Vec<OwnershipEntryBody>,
}

#[derive(Deserialize)]
struct OwnershipEntryBody {
    employee_id: String,
    basis_points: u64,
}

async fn record_ownership(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    body: Result<Json<OwnershipBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    };
    let ownership = OrderOwnership {
        order_id,
        entries: body
            .entries
            .into_iter()
            .map(|e| crate::core::allocation::OwnershipEntry {
                employee_id: e.employee_id,
                basis_points: e.basis_points,
            })
            .collect(),
    };
    match state.ownership.record(ownership).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct StartGroupBody {
    name: String,
    split_mode: crate::core::group::SplitMode,
    initial_members: Vec<(String, u64)>,
    started_at: Option<i64>,
}

async fn start_group(
    State(state): State<AppState>,
    body: Result<Json<StartGroupBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    };
    let request = StartGroupRequest {
        name: body.name,
        split_mode: body.split_mode,
        initial_members: body.initial_members,
        started_at: body.started_at.unwrap_or_else(|| Utc::now().timestamp_millis()),
    };
    match state.groups.start(request).await {
        Ok(group) => (StatusCode::CREATED, Json(group)).into_response(),
        Err(err) => (status_for(&err), error_body(&err)).into_response(),
    }
}

#[derive(Deserialize)]
struct JoinGroupBody {
    employee_id: String,
    tip_weight: Option<u64>,
    at: Option<i64>,
}

async fn join_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    body: Result<Json<JoinGroupBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    };
    let at = body.at.unwrap_or_else(|| Utc::now().timestamp_millis());
    match state
        .groups
        .join(&group_id, &body.employee_id, body.tip_weight.unwrap_or(100), at)
        .await
    {
        Ok(group) => Json(group).into_response(),
        Err(err) => (status_for(&err), error_body(&err)).into_response(),
    }
}

#[derive(Deserialize)]
struct LeaveGroupBody {
    employee_id: String,
    at: Option<i64>,
}

async fn leave_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    body: Result<Json<LeaveGroupBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    };
    let at = body.at.unwrap_or_else(|| Utc::now().timestamp_millis());
    match state.groups.leave(&group_id, &body.employee_id, at).await {
        Ok(group) => Json(group).into_response(),
        Err(err) => (status_for(&err), error_body(&err)).into_response(),
    }
}

#[derive(Deserialize)]
struct CloseGroupBody {
    at: Option<i64>,
}

async fn close_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    body: Result<Json<CloseGroupBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    };
    let at = body.at.unwrap_or_else(|| Utc::now().timestamp_millis());
    match state.groups.close(&group_id, at).await {
        Ok(group) => Json(group).into_response(),
        Err(err) => (status_for(&err), error_body(&err)).into_response(),
    }
}

#[derive(Deserialize)]
struct TransferBody {
    request_id: String,
    from_employee_id: String,
    to_employee_id: String,
    amount_cents: i64,
    #[serde(default)]
    memo: String,
    occurred_at: Option<i64>,
}

async fn transfer(
    State(state): State<AppState>,
    body: Result<Json<TransferBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    };
    let request = TransferRequest {
        request_id: body.request_id,
        from_employee_id: body.from_employee_id,
        to_employee_id: body.to_employee_id,
        amount_cents: body.amount_cents,
        memo: body.memo,
        occurred_at: body.occurred_at.unwrap_or_else(|| Utc::now().timestamp_millis()),
    };
    match state.transfers.transfer(request).await {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "transaction_id": outcome.transaction_id(),
                "applied": outcome.was_applied(),
            })),
        )
            .into_response(),
        Err(err) => (status_for(&err), error_body(&err)).into_response(),
    }
}

#[derive(Deserialize)]
struct PayoutBody {
    request_id: String,
    employee_id: String,
    amount_cents: i64,
    method: String,
    occurred_at: Option<i64>,
}

async fn payout(
    State(state): State<AppState>,
    body: Result<Json<PayoutBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(b) => b,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    };
    let request = PayoutRequest {
        request_id: body.request_id,
        employee_id: body.employee_id,
        amount_cents: body.amount_cents,
        method: body.method,
        occurred_at: body.occurred_at.unwrap_or_else(|| Utc::now().timestamp_millis()),
    };
    match state.transfers.payout(request).await {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "transaction_id": outcome.transaction_id(),
                "applied": outcome.was_applied(),
            })),
        )
            .into_response(),
        Err(err) => (status_for(&err), error_body(&err)).into_response(),
    }
}

async fn adjust(
    State(state): State<AppState>,
    body: Result<Json<AdjustmentRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match body {
        Ok(b) => b,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    };
    match state.recalculations.adjust(request).await {
        Ok(outcome) => Json(PostingAck::from_outcome(outcome)).into_response(),
        Err(err) => (status_for(&err), error_body(&err)).into_response(),
    }
}

async fn balance(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
) -> impl IntoResponse {
    match state.reporting.balance(&employee_id).await {
        Ok(balance_cents) => Json(serde_json::json!({
            "employee_id": employee_id,
            "balance_cents": balance_cents,
        }))
        .into_response(),
        Err(err) => (status_for(&err), error_body(&err)).into_response(),
    }
}

#[derive(Deserialize)]
struct EntriesQuery {
    from: Option<i64>,
    to: Option<i64>,
    limit: Option<usize>,
    /// Id of the previous page's oldest entry.
    before: Option<String>,
}

async fn entries(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
    Query(query): Query<EntriesQuery>,
) -> impl IntoResponse {
    let filter = EntryFilter {
        from: query.from,
        to: query.to,
        limit: query.limit,
        before: query.before,
    };
    match state.reporting.entries(&employee_id, filter).await {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => (status_for(&err), error_body(&err)).into_response(),
    }
}

async fn verify_balance(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
) -> impl IntoResponse {
    match state.reporting.verify_balance(&employee_id).await {
        Ok(balance_cents) => Json(serde_json::json!({
            "employee_id": employee_id,
            "balance_cents": balance_cents,
        }))
        .into_response(),
        Err(err) => (status_for(&err), error_body(&err)).into_response(),
    }
}

async fn recalculate_balance(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
) -> impl IntoResponse {
    match state.reporting.heal_balance(&employee_id).await {
        Ok(balance_cents) => Json(serde_json::json!({
            "employee_id": employee_id,
            "balance_cents": balance_cents,
        }))
        .into_response(),
        Err(err) => (status_for(&err), error_body(&err)).into_response(),
    }
}

#[derive(Deserialize)]
struct RangeQuery {
    from: i64,
    to: i64,
}

async fn payroll_export(
    State(state): State<AppState>,
    Query(range): Query<RangeQuery>,
) -> impl IntoResponse {
    match state.reporting.payroll_export(range.from, range.to).await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => (status_for(&err), error_body(&err)).into_response(),
    }
}

async fn compliance_report(
    State(state): State<AppState>,
    body: Result<Json<Vec<EmployeePeriodFigures>>, JsonRejection>,
) -> impl IntoResponse {
    let Json(figures) = match body {
        Ok(b) => b,
        Err(_) => return StatusCode::UNPROCESSABLE_ENTITY.into_response(),
    };
    match state.reporting.compliance_report(figures).await {
        Ok(warnings) => Json(warnings).into_response(),
        Err(err) => (status_for(&err), error_body(&err)).into_response(),
    }
}
