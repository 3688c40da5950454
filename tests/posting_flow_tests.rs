// End-to-end posting flows against the in-memory infrastructure: allocate,
// dedupe retries, resolve historical segments, keep balances consistent.

use std::sync::Arc;

use rstest::{fixture, rstest};

use tip_ledger::adapters::in_memory::group_store::InMemoryGroupStore;
use tip_ledger::adapters::in_memory::ledger_store::InMemoryLedgerStore;
use tip_ledger::adapters::in_memory::ownership_directory::InMemoryOwnershipDirectory;
use tip_ledger::application::policy::LocationPolicy;
use tip_ledger::application::posting::{PaymentSettled, TipPostingHandler};
use tip_ledger::core::allocation::{OrderOwnership, OwnershipEntry};
use tip_ledger::core::group::{SegmentMember, SplitMode, TipGroup};
use tip_ledger::core::ports::{EntryFilter, GroupStore, LedgerStore, OwnershipDirectory};

const T0: i64 = 1_700_000_000_000;
const HOUR: i64 = 3_600_000;

struct World {
    ledger: Arc<InMemoryLedgerStore>,
    groups: Arc<InMemoryGroupStore>,
    ownership: Arc<InMemoryOwnershipDirectory>,
    posting: TipPostingHandler<InMemoryLedgerStore, InMemoryGroupStore, InMemoryOwnershipDirectory>,
}

#[fixture]
fn world() -> World {
    let policy = LocationPolicy::new("loc-1");
    let ledger = Arc::new(InMemoryLedgerStore::new());
    let groups = Arc::new(InMemoryGroupStore::new());
    let ownership = Arc::new(InMemoryOwnershipDirectory::new());
    let posting = TipPostingHandler::new(
        policy,
        ledger.clone(),
        groups.clone(),
        ownership.clone(),
    );
    World {
        ledger,
        groups,
        ownership,
        posting,
    }
}

fn settled(payment_id: &str, order_id: &str, server_id: &str, tip: i64, at: i64) -> PaymentSettled {
    PaymentSettled {
        payment_id: payment_id.into(),
        order_id: order_id.into(),
        server_id: server_id.into(),
        tip_amount_cents: tip,
        occurred_at: at,
        service_charge: false,
    }
}

fn pool(id: &str, members: &[&str], started_at: i64) -> TipGroup {
    TipGroup::start(
        id,
        "loc-1",
        "pool",
        SplitMode::Equal,
        members
            .iter()
            .map(|m| SegmentMember {
                employee_id: (*m).to_string(),
                tip_weight: 100,
            })
            .collect(),
        started_at,
        format!("{id}-seg-1"),
    )
    .unwrap()
}

#[rstest]
#[tokio::test]
async fn it_should_credit_the_sole_server_without_ownership_or_groups(world: World) {
    let outcome = world
        .posting
        .handle(settled("pay-1", "ord-1", "emp-a", 1000, T0))
        .await
        .unwrap();
    assert!(outcome.unwrap().was_applied());
    assert_eq!(world.ledger.balance("emp-a").await.unwrap(), 1000);
}

#[rstest]
#[tokio::test]
async fn it_should_post_exactly_once_for_duplicate_deliveries(world: World) {
    let event = settled("pay-1", "ord-1", "emp-a", 1000, T0);
    let first = world.posting.handle(event.clone()).await.unwrap().unwrap();
    let second = world.posting.handle(event).await.unwrap().unwrap();

    assert!(first.was_applied());
    assert!(!second.was_applied());
    assert_eq!(first.transaction_id(), second.transaction_id());
    assert_eq!(world.ledger.balance("emp-a").await.unwrap(), 1000);
    assert_eq!(
        world
            .ledger
            .entries("emp-a", EntryFilter::default())
            .await
            .unwrap()
            .len(),
        1
    );
}

#[rstest]
#[tokio::test]
async fn it_should_split_by_recorded_ownership_before_pooling(world: World) {
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
        .handle(settled("pay-1", "ord-1", "emp-a", 1000, T0))
        .await
        .unwrap();

    assert_eq!(world.ledger.balance("emp-a").await.unwrap(), 600);
    assert_eq!(world.ledger.balance("emp-b").await.unwrap(), 400);
}

#[rstest]
#[tokio::test]
async fn it_should_allocate_against_the_segment_active_at_the_event_time(world: World) {
    // S1: {a, b}. C joins an hour later, opening S2.
    world.groups.create(pool("grp-1", &["emp-a", "emp-b"], T0)).await.unwrap();
    world
        .groups
        .join("grp-1", "emp-c", 100, T0 + HOUR, "grp-1-seg-2".into())
        .await
        .unwrap();

    // The tip happened inside S1, so it splits between a and b only, even
    // though c is a member by the time we compute it.
    world
        .posting
        .handle(settled("pay-1", "ord-1", "emp-a", 1000, T0 + HOUR / 2))
        .await
        .unwrap();

    assert_eq!(world.ledger.balance("emp-a").await.unwrap(), 500);
    assert_eq!(world.ledger.balance("emp-b").await.unwrap(), 500);
    assert_eq!(world.ledger.balance("emp-c").await.unwrap(), 0);

    // A tip inside S2 includes c.
    world
        .posting
        .handle(settled("pay-2", "ord-2", "emp-a", 900, T0 + 2 * HOUR))
        .await
        .unwrap();
    assert_eq!(world.ledger.balance("emp-c").await.unwrap(), 300);
}

#[rstest]
#[tokio::test]
async fn it_should_conserve_every_cent_across_a_busy_night(world: World) {
    let members = vec!["emp-a", "emp-b", "emp-c", "emp-d", "emp-e"];
    world.groups.create(pool("grp-1", &members, T0)).await.unwrap();

    let amounts = [137i64, 1999, 500, 12_345, 1, 777, 10_000_000];
    let mut expected_total = 0;
    for (i, amount) in amounts.iter().enumerate() {
        world
            .posting
            .handle(settled(
                &format!("pay-{i}"),
                &format!("ord-{i}"),
                "emp-a",
                *amount,
                T0 + i as i64 * 60_000,
            ))
            .await
            .unwrap();
        expected_total += amount;
    }

    let mut actual_total = 0;
    for member in &members {
        actual_total += world.ledger.balance(member).await.unwrap();
    }
    assert_eq!(actual_total, expected_total);
}

#[rstest]
#[tokio::test]
async fn it_should_skip_zero_tip_settlements(world: World) {
    let outcome = world
        .posting
        .handle(settled("pay-1", "ord-1", "emp-a", 0, T0))
        .await
        .unwrap();
    assert!(outcome.is_none());
    assert_eq!(world.ledger.balance("emp-a").await.unwrap(), 0);
}

#[rstest]
#[tokio::test]
async fn it_should_keep_the_materialized_balance_equal_to_the_entry_sum(world: World) {
    world.groups.create(pool("grp-1", &["emp-a", "emp-b"], T0)).await.unwrap();
    for i in 0..10 {
        world
            .posting
            .handle(settled(
                &format!("pay-{i}"),
                &format!("ord-{i}"),
                "emp-a",
                101 + i,
                T0 + i * 60_000,
            ))
            .await
            .unwrap();
    }
    for employee in ["emp-a", "emp-b"] {
        let materialized = world.ledger.balance(employee).await.unwrap();
        let recomputed = world.ledger.recalculate_balance(employee).await.unwrap();
        assert_eq!(materialized, recomputed, "{employee}");
        assert_eq!(
            world.ledger.verify_integrity(employee).await.unwrap(),
            materialized
        );
    }
}
