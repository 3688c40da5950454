// In-memory implementation of the LedgerStore port.
//
// Purpose
// - Back every test and local run without a database.
//
// Responsibilities
// - Commit a transaction atomically under one write lock: idempotency-key
//   uniqueness check, entry append, balance update, debt recording and
//   FIFO debt reclaim all happen inside the same critical section. Readers
//   racing a writer see either none or all of a transaction.
//
// A relational backend would get the same guarantees from a database
// transaction plus a unique index on idempotency_key.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::chargeback::{TipDebt, plan_debt_reclaims};
use crate::core::entry::{DraftError, LedgerEntry, SourceType, TransactionDraft};
use crate::core::idempotency::debt_reclaim_key;
use crate::core::ports::{EntryFilter, LedgerStore, LedgerStoreError, PostOutcome};

#[derive(Default)]
struct LedgerState {
    /// Append-only, in commit order.
    entries: Vec<LedgerEntry>,
    /// Materialized view of the entry log.
    balances: HashMap<String, i64>,
    /// idempotency key (or debt id) -> transaction that committed it.
    committed_keys: HashMap<String, String>,
    /// Per employee, in creation order.
    debts: HashMap<String, Vec<TipDebt>>,
}

#[derive(Default)]
pub struct InMemoryLedgerStore {
    inner: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: force the materialized balance out of sync with the
    /// entry log to exercise the integrity check.
    #[cfg(test)]
    pub async fn corrupt_balance(&self, employee_id: &str, bogus_cents: i64) {
        let mut state = self.inner.write().await;
        state.balances.insert(employee_id.to_string(), bogus_cents);
    }

    fn entry_sum(state: &LedgerState, employee_id: &str) -> i64 {
        state
            .entries
            .iter()
            .filter(|e| e.employee_id == employee_id)
            .map(|e| e.amount_cents)
            .sum()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn post(
        &self,
        draft: TransactionDraft,
        new_debts: Vec<TipDebt>,
    ) -> Result<PostOutcome, LedgerStoreError> {
        // A chargeback fully degraded to debt carries no entries; anything
        // else must pass draft validation.
        if draft.entries.is_empty() && new_debts.is_empty() {
            return Err(DraftError::Empty.into());
        }
        if !draft.entries.is_empty() {
            draft.validate()?;
        }

        let mut state = self.inner.write().await;

        // The write attempt itself is the deduplication point: any key seen
        // before means this logical event already committed.
        for key in draft
            .entries
            .iter()
            .map(|e| e.idempotency_key.as_str())
            .chain(new_debts.iter().map(|d| d.id.as_str()))
        {
            if let Some(transaction_id) = state.committed_keys.get(key) {
                return Ok(PostOutcome::AlreadyApplied {
                    transaction_id: transaction_id.clone(),
                });
            }
        }

        // The floor is checked against the balance as of this commit, not
        // whatever the handler read earlier; two racing debits cannot both
        // pass.
        if let Some(floor) = draft.min_balance_cents {
            let mut deltas: HashMap<&str, i64> = HashMap::new();
            for entry in &draft.entries {
                *deltas.entry(entry.employee_id.as_str()).or_insert(0) += entry.amount_cents;
            }
            for (employee_id, delta) in deltas {
                if delta >= 0 {
                    continue;
                }
                let balance = state.balances.get(employee_id).copied().unwrap_or(0);
                if balance + delta < floor {
                    return Err(LedgerStoreError::InsufficientBalance {
                        employee_id: employee_id.to_string(),
                        balance_cents: balance,
                        requested_cents: -delta,
                    });
                }
            }
        }

        let transaction_id = Uuid::now_v7().to_string();
        let created_at = Utc::now().timestamp_millis();

        let mut committed: Vec<LedgerEntry> = Vec::with_capacity(draft.entries.len());
        for entry in draft.entries {
            // Positive money reaching an indebted employee pays the oldest
            // debts first; the reclaim posts as its own paired entry.
            let mut reclaims = Vec::new();
            if entry.amount_cents > 0 && entry.source_type != SourceType::Chargeback {
                let open = state
                    .debts
                    .get(&entry.employee_id)
                    .cloned()
                    .unwrap_or_default();
                for reclaim in plan_debt_reclaims(entry.amount_cents, &open) {
                    if let Some(debt) = state
                        .debts
                        .get_mut(&entry.employee_id)
                        .and_then(|debts| debts.iter_mut().find(|d| d.id == reclaim.debt_id))
                    {
                        debt.remaining_cents -= reclaim.amount_cents;
                    }
                    reclaims.push(LedgerEntry {
                        id: Uuid::now_v7().to_string(),
                        employee_id: entry.employee_id.clone(),
                        location_id: draft.location_id.clone(),
                        amount_cents: -reclaim.amount_cents,
                        source_type: SourceType::Chargeback,
                        transaction_id: transaction_id.clone(),
                        idempotency_key: debt_reclaim_key(
                            &entry.idempotency_key,
                            &reclaim.debt_id,
                        ),
                        occurred_at: draft.occurred_at,
                        created_at,
                        context: serde_json::json!({
                            "debt_id": reclaim.debt_id,
                            "reclaimed_from": entry.idempotency_key,
                        }),
                    });
                }
            }
            committed.push(LedgerEntry {
                id: Uuid::now_v7().to_string(),
                employee_id: entry.employee_id,
                location_id: draft.location_id.clone(),
                amount_cents: entry.amount_cents,
                source_type: entry.source_type,
                transaction_id: transaction_id.clone(),
                idempotency_key: entry.idempotency_key,
                occurred_at: draft.occurred_at,
                created_at,
                context: entry.context,
            });
            committed.extend(reclaims);
        }

        for entry in &committed {
            *state
                .balances
                .entry(entry.employee_id.clone())
                .or_insert(0) += entry.amount_cents;
            state
                .committed_keys
                .insert(entry.idempotency_key.clone(), transaction_id.clone());
        }
        state.entries.extend(committed);

        for mut debt in new_debts {
            debt.transaction_id = transaction_id.clone();
            state
                .committed_keys
                .insert(debt.id.clone(), transaction_id.clone());
            state
                .debts
                .entry(debt.employee_id.clone())
                .or_default()
                .push(debt);
        }

        Ok(PostOutcome::Applied { transaction_id })
    }

    async fn balance(&self, employee_id: &str) -> Result<i64, LedgerStoreError> {
        let state = self.inner.read().await;
        Ok(state.balances.get(employee_id).copied().unwrap_or(0))
    }

    async fn entries(
        &self,
        employee_id: &str,
        filter: EntryFilter,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        let state = self.inner.read().await;
        let mut matching: Vec<LedgerEntry> = Vec::new();
        for entry in &state.entries {
            // The cursor is an entry id: everything committed at or after
            // the cursor entry is cut, including same-timestamp siblings
            // from the same transaction.
            if filter.before.as_deref() == Some(entry.id.as_str()) {
                break;
            }
            if entry.employee_id == employee_id
                && filter.from.is_none_or(|from| entry.occurred_at >= from)
                && filter.to.is_none_or(|to| entry.occurred_at < to)
            {
                matching.push(entry.clone());
            }
        }
        matching.reverse();
        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn entries_for_payment(
        &self,
        payment_id: &str,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        let state = self.inner.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| {
                e.context.get("payment_id").and_then(|v| v.as_str()) == Some(payment_id)
            })
            .cloned()
            .collect())
    }

    async fn entries_in_range(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        let state = self.inner.read().await;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.occurred_at >= from && e.occurred_at < to)
            .cloned()
            .collect())
    }

    async fn recalculate_balance(&self, employee_id: &str) -> Result<i64, LedgerStoreError> {
        let mut state = self.inner.write().await;
        let computed = Self::entry_sum(&state, employee_id);
        state.balances.insert(employee_id.to_string(), computed);
        Ok(computed)
    }

    async fn verify_integrity(&self, employee_id: &str) -> Result<i64, LedgerStoreError> {
        let state = self.inner.read().await;
        let computed = Self::entry_sum(&state, employee_id);
        let materialized = state.balances.get(employee_id).copied().unwrap_or(0);
        if materialized != computed {
            return Err(LedgerStoreError::Integrity {
                employee_id: employee_id.to_string(),
                materialized,
                computed,
            });
        }
        Ok(materialized)
    }

    async fn open_debts(&self, employee_id: &str) -> Result<Vec<TipDebt>, LedgerStoreError> {
        let state = self.inner.read().await;
        Ok(state
            .debts
            .get(employee_id)
            .map(|debts| debts.iter().filter(|d| d.is_open()).cloned().collect())
            .unwrap_or_default())
    }

    async fn debts_for_payment(&self, payment_id: &str) -> Result<Vec<TipDebt>, LedgerStoreError> {
        let state = self.inner.read().await;
        Ok(state
            .debts
            .values()
            .flatten()
            .filter(|d| d.payment_id == payment_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod in_memory_ledger_store_tests {
    use super::*;
    use crate::core::entry::{EntryDraft, TransactionKind};
    use rstest::rstest;

    const T0: i64 = 1_700_000_000_000;

    fn entry(employee_id: &str, amount: i64, source: SourceType, key: &str) -> EntryDraft {
        EntryDraft {
            employee_id: employee_id.into(),
            amount_cents: amount,
            source_type: source,
            idempotency_key: key.into(),
            context: serde_json::json!({"payment_id": "pay-1"}),
        }
    }

    fn tip_draft(entries: Vec<EntryDraft>) -> TransactionDraft {
        TransactionDraft {
            kind: TransactionKind::TipAllocation,
            location_id: "loc-1".into(),
            occurred_at: T0,
            entries,
            min_balance_cents: None,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_post_entries_and_update_balances_atomically() {
        let store = InMemoryLedgerStore::new();
        let outcome = store
            .post(
                tip_draft(vec![
                    entry("emp-a", 600, SourceType::DirectTip, "k1"),
                    entry("emp-b", 400, SourceType::GroupShare, "k2"),
                ]),
                Vec::new(),
            )
            .await
            .expect("expected post to commit");
        assert!(outcome.was_applied());
        assert_eq!(store.balance("emp-a").await.unwrap(), 600);
        assert_eq!(store.balance("emp-b").await.unwrap(), 400);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_no_op_on_a_reused_idempotency_key() {
        let store = InMemoryLedgerStore::new();
        let first = store
            .post(
                tip_draft(vec![entry("emp-a", 600, SourceType::DirectTip, "k1")]),
                Vec::new(),
            )
            .await
            .unwrap();
        let second = store
            .post(
                tip_draft(vec![entry("emp-a", 600, SourceType::DirectTip, "k1")]),
                Vec::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            second,
            PostOutcome::AlreadyApplied {
                transaction_id: first.transaction_id().to_string()
            }
        );
        assert_eq!(store.balance("emp-a").await.unwrap(), 600);
        assert_eq!(
            store
                .entries("emp-a", EntryFilter::default())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_reject_unbalanced_transfers_before_any_write() {
        let store = InMemoryLedgerStore::new();
        let draft = TransactionDraft {
            kind: TransactionKind::Transfer,
            location_id: "loc-1".into(),
            occurred_at: T0,
            entries: vec![
                entry("emp-a", -500, SourceType::Transfer, "k1"),
                entry("emp-b", 400, SourceType::Transfer, "k2"),
            ],
            min_balance_cents: None,
        };
        let err = store.post(draft, Vec::new()).await.unwrap_err();
        assert!(matches!(err, LedgerStoreError::Validation(_)));
        assert_eq!(store.balance("emp-a").await.unwrap(), 0);
        assert!(
            store
                .entries("emp-a", EntryFilter::default())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_reclaim_open_debt_from_a_future_credit() {
        let store = InMemoryLedgerStore::new();
        // $2.00 of recorded debt.
        store
            .post(
                TransactionDraft {
                    kind: TransactionKind::Chargeback,
                    location_id: "loc-1".into(),
                    occurred_at: T0,
                    entries: vec![],
                    min_balance_cents: None,
                },
                vec![TipDebt {
                    id: "debt:pay-0:emp-b".into(),
                    employee_id: "emp-b".into(),
                    location_id: "loc-1".into(),
                    payment_id: "pay-0".into(),
                    transaction_id: String::new(),
                    amount_cents: 200,
                    remaining_cents: 200,
                    created_at: T0,
                }],
            )
            .await
            .unwrap();

        // A $5.00 credit pays the debt down and keeps $3.00.
        store
            .post(
                tip_draft(vec![entry("emp-b", 500, SourceType::DirectTip, "k-credit")]),
                Vec::new(),
            )
            .await
            .unwrap();

        assert_eq!(store.balance("emp-b").await.unwrap(), 300);
        assert!(store.open_debts("emp-b").await.unwrap().is_empty());

        let entries = store.entries("emp-b", EntryFilter::default()).await.unwrap();
        assert_eq!(entries.len(), 2);
        // Newest-first: the reclaim pairs with the credit.
        assert_eq!(entries[0].amount_cents, -200);
        assert_eq!(entries[0].source_type, SourceType::Chargeback);
        assert_eq!(entries[1].amount_cents, 500);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_not_record_the_same_debt_twice() {
        let store = InMemoryLedgerStore::new();
        let debt = TipDebt {
            id: "debt:pay-0:emp-b".into(),
            employee_id: "emp-b".into(),
            location_id: "loc-1".into(),
            payment_id: "pay-0".into(),
            transaction_id: String::new(),
            amount_cents: 200,
            remaining_cents: 200,
            created_at: T0,
        };
        let draft = || TransactionDraft {
            kind: TransactionKind::Chargeback,
            location_id: "loc-1".into(),
            occurred_at: T0,
            entries: vec![],
            min_balance_cents: None,
        };
        let first = store.post(draft(), vec![debt.clone()]).await.unwrap();
        let second = store.post(draft(), vec![debt]).await.unwrap();
        assert!(first.was_applied());
        assert!(!second.was_applied());
        assert_eq!(store.open_debts("emp-b").await.unwrap().len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_filter_and_paginate_entries_newest_first() {
        let store = InMemoryLedgerStore::new();
        for i in 0..5 {
            store
                .post(
                    TransactionDraft {
                        kind: TransactionKind::TipAllocation,
                        location_id: "loc-1".into(),
                        occurred_at: T0 + i * 1000,
                        entries: vec![entry(
                            "emp-a",
                            100,
                            SourceType::DirectTip,
                            &format!("k{i}"),
                        )],
                        min_balance_cents: None,
                    },
                    Vec::new(),
                )
                .await
                .unwrap();
        }
        let page = store
            .entries(
                "emp-a",
                EntryFilter {
                    limit: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].occurred_at, T0 + 4000);

        let next = store
            .entries(
                "emp-a",
                EntryFilter {
                    limit: Some(2),
                    before: Some(page[1].id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(next[0].occurred_at, T0 + 2000);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_not_lose_same_timestamp_entries_across_pages() {
        let store = InMemoryLedgerStore::new();
        // One transaction, three entries, all sharing occurred_at.
        store
            .post(
                tip_draft(vec![
                    entry("emp-a", 100, SourceType::DirectTip, "k1"),
                    entry("emp-a", 200, SourceType::DirectTip, "k2"),
                    entry("emp-a", 300, SourceType::DirectTip, "k3"),
                ]),
                Vec::new(),
            )
            .await
            .unwrap();

        let page = store
            .entries(
                "emp-a",
                EntryFilter {
                    limit: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.len(), 2);

        let next = store
            .entries(
                "emp-a",
                EntryFilter {
                    limit: Some(2),
                    before: Some(page[1].id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(next.len(), 1);

        // The two pages cover all three entries exactly once.
        let mut seen: Vec<&str> = page.iter().chain(&next).map(|e| e.id.as_str()).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_enforce_the_balance_floor_inside_the_commit() {
        let store = InMemoryLedgerStore::new();
        store
            .post(
                tip_draft(vec![entry("emp-a", 1000, SourceType::DirectTip, "k1")]),
                Vec::new(),
            )
            .await
            .unwrap();

        let payout = |key: &str| TransactionDraft {
            kind: TransactionKind::Payout,
            location_id: "loc-1".into(),
            occurred_at: T0 + 1000,
            entries: vec![entry("emp-a", -700, SourceType::Payout, key)],
            min_balance_cents: Some(0),
        };

        // A second debit of 700 passes any balance check made before the
        // first one committed; the store must still refuse it.
        store.post(payout("p1"), Vec::new()).await.unwrap();
        let err = store.post(payout("p2"), Vec::new()).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerStoreError::InsufficientBalance {
                balance_cents: 300,
                requested_cents: 700,
                ..
            }
        ));
        assert_eq!(store.balance("emp-a").await.unwrap(), 300);
        assert_eq!(
            store
                .entries("emp-a", EntryFilter::default())
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_detect_and_heal_balance_drift() {
        let store = InMemoryLedgerStore::new();
        store
            .post(
                tip_draft(vec![entry("emp-a", 600, SourceType::DirectTip, "k1")]),
                Vec::new(),
            )
            .await
            .unwrap();
        assert_eq!(store.verify_integrity("emp-a").await.unwrap(), 600);

        store.corrupt_balance("emp-a", 999).await;
        let err = store.verify_integrity("emp-a").await.unwrap_err();
        assert!(matches!(
            err,
            LedgerStoreError::Integrity {
                materialized: 999,
                computed: 600,
                ..
            }
        ));

        assert_eq!(store.recalculate_balance("emp-a").await.unwrap(), 600);
        assert_eq!(store.verify_integrity("emp-a").await.unwrap(), 600);
    }
}
