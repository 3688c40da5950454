// Chargeback flows: proportional reversal, policy switches, debt capping
// and FIFO reclaim out of future credits.

use std::sync::Arc;

use rstest::{fixture, rstest};

use tip_ledger::adapters::in_memory::group_store::InMemoryGroupStore;
use tip_ledger::adapters::in_memory::ledger_store::InMemoryLedgerStore;
use tip_ledger::adapters::in_memory::ownership_directory::InMemoryOwnershipDirectory;
use tip_ledger::application::chargeback::{ChargebackHandler, PaymentVoided};
use tip_ledger::application::errors::ApplicationError;
use tip_ledger::application::policy::LocationPolicy;
use tip_ledger::application::posting::{PaymentSettled, TipPostingHandler};
use tip_ledger::application::transfers::{PayoutRequest, TransferHandler};
use tip_ledger::core::allocation::{OrderOwnership, OwnershipEntry};
use tip_ledger::core::chargeback::ChargebackPolicy;
use tip_ledger::core::entry::SourceType;
use tip_ledger::core::ports::{EntryFilter, LedgerStore, OwnershipDirectory};

const T0: i64 = 1_700_000_000_000;
const HOUR: i64 = 3_600_000;

struct World {
    ledger: Arc<InMemoryLedgerStore>,
    ownership: Arc<InMemoryOwnershipDirectory>,
    posting: TipPostingHandler<InMemoryLedgerStore, InMemoryGroupStore, InMemoryOwnershipDirectory>,
    chargebacks: ChargebackHandler<InMemoryLedgerStore>,
    transfers: TransferHandler<InMemoryLedgerStore>,
}

fn build_world(policy: LocationPolicy) -> World {
    let ledger = Arc::new(InMemoryLedgerStore::new());
    let groups = Arc::new(InMemoryGroupStore::new());
    let ownership = Arc::new(InMemoryOwnershipDirectory::new());
    World {
        posting: TipPostingHandler::new(
            policy.clone(),
            ledger.clone(),
            groups,
            ownership.clone(),
        ),
        chargebacks: ChargebackHandler::new(policy.clone(), ledger.clone()),
        transfers: TransferHandler::new(policy, ledger.clone()),
        ledger,
        ownership,
    }
}

#[fixture]
fn world() -> World {
    build_world(LocationPolicy::new("loc-1"))
}

async fn settle_split_tip(world: &World) {
    // $10.00 tip split A:$6 / B:$4 via ownership.
    world
        .ownership
        .record(OrderOwnership {
            order_id: "ord-1".into(),
            entries: vec![
                OwnershipEntry { employee_id: "emp-a".into(), basis_points: 6000 },
                OwnershipEntry { employee_id: "emp-b".into(), basis_points: 4000 },
            ],
        })
        .await
        .unwrap();
    world
        .posting
        .handle(PaymentSettled {
            payment_id: "pay-1".into(),
            order_id: "ord-1".into(),
            server_id: "emp-a".into(),
            tip_amount_cents: 1000,
            occurred_at: T0,
            service_charge: false,
        })
        .await
        .unwrap();
}

fn voided(payment_id: &str, at: i64) -> PaymentVoided {
    PaymentVoided {
        payment_id: payment_id.into(),
        reason: "card dispute".into(),
        occurred_at: at,
    }
}

#[rstest]
#[tokio::test]
async fn it_should_mirror_the_original_allocation_with_opposite_sign(world: World) {
    settle_split_tip(&world).await;

    world
        .chargebacks
        .handle(voided("pay-1", T0 + HOUR))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(world.ledger.balance("emp-a").await.unwrap(), 0);
    assert_eq!(world.ledger.balance("emp-b").await.unwrap(), 0);

    let entries_a = world
        .ledger
        .entries("emp-a", EntryFilter::default())
        .await
        .unwrap();
    assert_eq!(entries_a[0].amount_cents, -600);
    assert_eq!(entries_a[0].source_type, SourceType::Chargeback);

    let entries_b = world
        .ledger
        .entries("emp-b", EntryFilter::default())
        .await
        .unwrap();
    assert_eq!(entries_b[0].amount_cents, -400);
}

#[rstest]
#[tokio::test]
async fn it_should_no_op_on_a_redelivered_void(world: World) {
    settle_split_tip(&world).await;

    let first = world
        .chargebacks
        .handle(voided("pay-1", T0 + HOUR))
        .await
        .unwrap()
        .unwrap();
    let second = world
        .chargebacks
        .handle(voided("pay-1", T0 + 2 * HOUR))
        .await
        .unwrap()
        .unwrap();

    assert!(first.was_applied());
    assert!(!second.was_applied());
    assert_eq!(world.ledger.balance("emp-a").await.unwrap(), 0);
}

#[rstest]
#[tokio::test]
async fn it_should_leave_the_ledger_alone_when_the_business_absorbs() {
    let mut policy = LocationPolicy::new("loc-1");
    policy.chargeback_policy = ChargebackPolicy::BusinessAbsorbs;
    let world = build_world(policy);
    settle_split_tip(&world).await;

    let outcome = world
        .chargebacks
        .handle(voided("pay-1", T0 + HOUR))
        .await
        .unwrap();

    assert!(outcome.is_none());
    assert_eq!(world.ledger.balance("emp-a").await.unwrap(), 600);
    assert_eq!(world.ledger.balance("emp-b").await.unwrap(), 400);
}

#[rstest]
#[tokio::test]
async fn it_should_cap_the_debit_and_carry_the_rest_as_debt(world: World) {
    settle_split_tip(&world).await;

    // B pays out $2.00, leaving a $2.00 balance against a $4.00 exposure.
    world
        .transfers
        .payout(PayoutRequest {
            request_id: "req-1".into(),
            employee_id: "emp-b".into(),
            amount_cents: 200,
            method: "cash".into(),
            occurred_at: T0 + HOUR,
        })
        .await
        .unwrap();
    assert_eq!(world.ledger.balance("emp-b").await.unwrap(), 200);

    world
        .chargebacks
        .handle(voided("pay-1", T0 + 2 * HOUR))
        .await
        .unwrap()
        .unwrap();

    // Debit capped at $2.00, the other $2.00 recorded as debt.
    assert_eq!(world.ledger.balance("emp-b").await.unwrap(), 0);
    let debts = world.ledger.open_debts("emp-b").await.unwrap();
    assert_eq!(debts.len(), 1);
    assert_eq!(debts[0].remaining_cents, 200);

    // A future $5.00 credit pays the debt first and keeps $3.00.
    world
        .posting
        .handle(PaymentSettled {
            payment_id: "pay-2".into(),
            order_id: "ord-2".into(),
            server_id: "emp-b".into(),
            tip_amount_cents: 500,
            occurred_at: T0 + 3 * HOUR,
            service_charge: false,
        })
        .await
        .unwrap();

    assert_eq!(world.ledger.balance("emp-b").await.unwrap(), 300);
    assert!(world.ledger.open_debts("emp-b").await.unwrap().is_empty());

    // The trail shows the full credit and the paired reclaim.
    let entries = world
        .ledger
        .entries("emp-b", EntryFilter::default())
        .await
        .unwrap();
    assert_eq!(entries[0].amount_cents, -200);
    assert_eq!(entries[0].source_type, SourceType::Chargeback);
    assert_eq!(entries[1].amount_cents, 500);
}

#[rstest]
#[tokio::test]
async fn it_should_detect_a_redelivered_void_that_fully_degraded_to_debt(world: World) {
    settle_split_tip(&world).await;
    // Both balances emptied before the void: the whole reversal becomes
    // debt, no debit entries at all.
    for (employee, cents) in [("emp-a", 600), ("emp-b", 400)] {
        world
            .transfers
            .payout(PayoutRequest {
                request_id: format!("req-{employee}"),
                employee_id: employee.into(),
                amount_cents: cents,
                method: "cash".into(),
                occurred_at: T0 + HOUR,
            })
            .await
            .unwrap();
    }

    let first = world
        .chargebacks
        .handle(voided("pay-1", T0 + 2 * HOUR))
        .await
        .unwrap()
        .unwrap();
    assert!(first.was_applied());
    assert_eq!(world.ledger.open_debts("emp-a").await.unwrap()[0].remaining_cents, 600);

    let second = world
        .chargebacks
        .handle(voided("pay-1", T0 + 3 * HOUR))
        .await
        .unwrap()
        .unwrap();
    assert!(!second.was_applied());
    assert_eq!(world.ledger.open_debts("emp-a").await.unwrap().len(), 1);
    assert_eq!(world.ledger.open_debts("emp-b").await.unwrap().len(), 1);
}

#[rstest]
#[tokio::test]
async fn it_should_reject_voiding_an_unknown_payment(world: World) {
    let err = world
        .chargebacks
        .handle(voided("pay-missing", T0))
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::UnknownPayment(_)));
}
