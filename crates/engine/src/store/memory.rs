use std::{
    collections::{BTreeMap, BTreeSet},
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    Budget, Category, CategoryRef, EngineError, ObjectId, ResultEngine, Transaction,
    util::normalize_label,
};

use super::{
    AggregateRow, BulkWriteFailure, BulkWriteOutcome, CategoryUpdate, Grouping, NameMatch, Store,
    TransactionFilter, fold_rows,
};

/// Snapshot of the calls a [`MemoryStore`] has served.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreCounters {
    /// `categories_by_ids` calls.
    pub batch_lookups: u64,
    /// Ids requested across all `categories_by_ids` calls.
    pub ids_requested: u64,
    /// `category` calls.
    pub single_lookups: u64,
    /// Transaction documents written.
    pub writes: u64,
}

#[derive(Debug, Default)]
struct State {
    categories: BTreeMap<ObjectId, Category>,
    budgets: BTreeMap<ObjectId, Budget>,
    transactions: BTreeMap<ObjectId, Transaction>,
    failing_writes: BTreeSet<ObjectId>,
}

/// In-process document store.
///
/// Besides backing tests and dry experiments it counts lookups and can be told
/// to fail: [`MemoryStore::set_offline`] makes every call return
/// [`EngineError::Unavailable`], [`MemoryStore::fail_writes_for`] rejects
/// writes addressed to specific transactions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    offline: AtomicBool,
    batch_lookups: AtomicU64,
    ids_requested: AtomicU64,
    single_lookups: AtomicU64,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> StoreCounters {
        StoreCounters {
            batch_lookups: self.batch_lookups.load(Ordering::Relaxed),
            ids_requested: self.ids_requested.load(Ordering::Relaxed),
            single_lookups: self.single_lookups.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    pub fn reset_counters(&self) {
        self.batch_lookups.store(0, Ordering::Relaxed);
        self.ids_requested.store(0, Ordering::Relaxed);
        self.single_lookups.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Makes every later write to `id` fail.
    pub async fn fail_writes_for(&self, id: ObjectId) {
        self.state.write().await.failing_writes.insert(id);
    }

    /// Current state of a transaction, bypassing the counters.
    pub async fn transaction(&self, id: ObjectId) -> Option<Transaction> {
        self.state.read().await.transactions.get(&id).cloned()
    }

    fn ensure_online(&self) -> ResultEngine<()> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(EngineError::Unavailable(
                "memory store is offline".to_string(),
            ));
        }
        Ok(())
    }
}

fn rejected_write(id: ObjectId) -> String {
    format!("write rejected for transaction {id}")
}

fn set_category(tx: &mut Transaction, category: CategoryRef) -> bool {
    if tx.category == category {
        return false;
    }
    tx.category = category;
    tx.updated_at = Utc::now();
    true
}

#[async_trait]
impl Store for MemoryStore {
    async fn category(&self, id: ObjectId) -> ResultEngine<Option<Category>> {
        self.ensure_online()?;
        self.single_lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.state.read().await.categories.get(&id).cloned())
    }

    async fn categories_by_ids(&self, ids: &[ObjectId]) -> ResultEngine<Vec<Category>> {
        self.ensure_online()?;
        self.batch_lookups.fetch_add(1, Ordering::Relaxed);
        self.ids_requested
            .fetch_add(ids.len() as u64, Ordering::Relaxed);
        let state = self.state.read().await;
        let wanted: BTreeSet<&ObjectId> = ids.iter().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| state.categories.get(id).cloned())
            .collect())
    }

    async fn list_categories(&self) -> ResultEngine<Vec<Category>> {
        self.ensure_online()?;
        Ok(self.state.read().await.categories.values().cloned().collect())
    }

    async fn find_categories(&self, name: &str, mode: NameMatch) -> ResultEngine<Vec<Category>> {
        self.ensure_online()?;
        let wanted = normalize_label(name);
        let state = self.state.read().await;
        Ok(state
            .categories
            .values()
            .filter(|category| {
                let norm = category.name_norm();
                match mode {
                    NameMatch::Exact => norm == wanted,
                    NameMatch::Contains => norm.contains(&wanted),
                }
            })
            .cloned()
            .collect())
    }

    async fn insert_category(&self, category: Category) -> ResultEngine<Category> {
        self.ensure_online()?;
        let mut state = self.state.write().await;
        let norm = category.name_norm();
        if state
            .categories
            .values()
            .any(|existing| existing.kind == category.kind && existing.name_norm() == norm)
        {
            return Err(EngineError::ExistingKey(category.name));
        }
        if state.categories.contains_key(&category.id) {
            return Err(EngineError::ExistingKey(category.id.to_string()));
        }
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn delete_category(&self, id: ObjectId) -> ResultEngine<bool> {
        self.ensure_online()?;
        Ok(self.state.write().await.categories.remove(&id).is_some())
    }

    async fn budget(&self, id: ObjectId) -> ResultEngine<Option<Budget>> {
        self.ensure_online()?;
        Ok(self.state.read().await.budgets.get(&id).cloned())
    }

    async fn list_budgets(&self) -> ResultEngine<Vec<Budget>> {
        self.ensure_online()?;
        let mut budgets: Vec<Budget> = self.state.read().await.budgets.values().cloned().collect();
        budgets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(budgets)
    }

    async fn insert_budget(&self, budget: Budget) -> ResultEngine<Budget> {
        self.ensure_online()?;
        let mut state = self.state.write().await;
        if state.budgets.contains_key(&budget.id) {
            return Err(EngineError::ExistingKey(budget.id.to_string()));
        }
        state.budgets.insert(budget.id, budget.clone());
        Ok(budget)
    }

    async fn replace_budget(&self, budget: &Budget) -> ResultEngine<bool> {
        self.ensure_online()?;
        let mut state = self.state.write().await;
        let Some(stored) = state.budgets.get_mut(&budget.id) else {
            return Ok(false);
        };
        *stored = budget.clone();
        Ok(true)
    }

    async fn delete_budget(&self, id: ObjectId) -> ResultEngine<bool> {
        self.ensure_online()?;
        Ok(self.state.write().await.budgets.remove(&id).is_some())
    }

    async fn count_budgets_for(&self, category: ObjectId) -> ResultEngine<u64> {
        self.ensure_online()?;
        let state = self.state.read().await;
        Ok(state
            .budgets
            .values()
            .filter(|budget| budget.category == category)
            .count() as u64)
    }

    async fn insert_transaction(&self, tx: Transaction) -> ResultEngine<()> {
        self.ensure_online()?;
        let mut state = self.state.write().await;
        if state.transactions.contains_key(&tx.id) {
            return Err(EngineError::ExistingKey(tx.id.to_string()));
        }
        state.transactions.insert(tx.id, tx);
        Ok(())
    }

    async fn find_transactions(
        &self,
        filter: &TransactionFilter,
        limit: Option<u64>,
    ) -> ResultEngine<Vec<Transaction>> {
        self.ensure_online()?;
        let state = self.state.read().await;
        let mut found: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|tx| filter.matches(tx))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        if let Some(limit) = limit {
            found.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(found)
    }

    async fn count_transactions(&self, filter: &TransactionFilter) -> ResultEngine<u64> {
        self.ensure_online()?;
        let state = self.state.read().await;
        Ok(state
            .transactions
            .values()
            .filter(|tx| filter.matches(tx))
            .count() as u64)
    }

    async fn aggregate(
        &self,
        filter: &TransactionFilter,
        grouping: Grouping,
    ) -> ResultEngine<Vec<AggregateRow>> {
        self.ensure_online()?;
        let state = self.state.read().await;
        Ok(fold_rows(
            state.transactions.values().filter(|tx| filter.matches(tx)),
            grouping,
        ))
    }

    async fn update_category(&self, id: ObjectId, category: CategoryRef) -> ResultEngine<bool> {
        self.ensure_online()?;
        let mut state = self.state.write().await;
        if state.failing_writes.contains(&id) {
            return Err(EngineError::WriteFailed(rejected_write(id)));
        }
        let Some(tx) = state.transactions.get_mut(&id) else {
            return Ok(false);
        };
        set_category(tx, category);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    async fn update_category_many(
        &self,
        filter: &TransactionFilter,
        category: CategoryRef,
    ) -> ResultEngine<BulkWriteOutcome> {
        self.ensure_online()?;
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut outcome = BulkWriteOutcome::default();
        for tx in state.transactions.values_mut() {
            if !filter.matches(tx) {
                continue;
            }
            if state.failing_writes.contains(&tx.id) {
                outcome.failures.push(BulkWriteFailure {
                    transaction_id: tx.id,
                    message: rejected_write(tx.id),
                });
                continue;
            }
            outcome.matched += 1;
            if set_category(tx, category.clone()) {
                outcome.modified += 1;
            }
        }
        self.writes.fetch_add(outcome.modified, Ordering::Relaxed);
        Ok(outcome)
    }

    async fn bulk_update_category(
        &self,
        updates: Vec<CategoryUpdate>,
    ) -> ResultEngine<BulkWriteOutcome> {
        self.ensure_online()?;
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let mut outcome = BulkWriteOutcome::default();
        for update in updates {
            if state.failing_writes.contains(&update.transaction_id) {
                outcome.failures.push(BulkWriteFailure {
                    transaction_id: update.transaction_id,
                    message: rejected_write(update.transaction_id),
                });
                continue;
            }
            let Some(tx) = state.transactions.get_mut(&update.transaction_id) else {
                continue;
            };
            outcome.matched += 1;
            if set_category(tx, update.category) {
                outcome.modified += 1;
            }
        }
        self.writes.fetch_add(outcome.modified, Ordering::Relaxed);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{CategoryKind, MoneyCents, store::CategoryFilter};

    fn expense(name: &str) -> Category {
        Category::new(
            name.to_string(),
            CategoryKind::Expense,
            "💸".to_string(),
            "#FF8042".to_string(),
        )
    }

    #[tokio::test]
    async fn duplicate_name_and_kind_is_rejected() {
        let store = MemoryStore::new();
        store.insert_category(expense("Food")).await.unwrap();
        let err = store.insert_category(expense(" FOOD ")).await.unwrap_err();
        assert_eq!(err, EngineError::ExistingKey(" FOOD ".to_string()));

        let mut income = expense("Food");
        income.kind = CategoryKind::Income;
        assert!(store.insert_category(income).await.is_ok());
    }

    #[tokio::test]
    async fn offline_store_refuses_everything() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let err = store.list_categories().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn bulk_write_keeps_going_after_a_failure() {
        let store = MemoryStore::new();
        let date = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let first = Transaction::new(date, MoneyCents::new(-100), CategoryRef::Null);
        let second = Transaction::new(date, MoneyCents::new(-200), CategoryRef::Null);
        store.insert_transaction(first.clone()).await.unwrap();
        store.insert_transaction(second.clone()).await.unwrap();
        store.fail_writes_for(first.id).await;

        let target = CategoryRef::Id(ObjectId::new());
        let outcome = store
            .bulk_update_category(vec![
                CategoryUpdate {
                    transaction_id: first.id,
                    category: target.clone(),
                },
                CategoryUpdate {
                    transaction_id: second.id,
                    category: target.clone(),
                },
            ])
            .await
            .unwrap();
        assert_eq!(outcome.modified, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].transaction_id, first.id);

        let filter = TransactionFilter::default().category(CategoryFilter::Null);
        assert_eq!(store.count_transactions(&filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn filtered_update_rewrites_around_a_rejected_document() {
        let store = MemoryStore::new();
        let date = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let label = CategoryRef::Text("Travel".to_string());
        let stuck = Transaction::new(date, MoneyCents::new(-100), label.clone());
        let moved = Transaction::new(date, MoneyCents::new(-200), label.clone());
        store.insert_transaction(stuck.clone()).await.unwrap();
        store.insert_transaction(moved.clone()).await.unwrap();
        store.fail_writes_for(stuck.id).await;

        let target = CategoryRef::Id(ObjectId::new());
        let filter = TransactionFilter::default().category(CategoryFilter::Text);
        let outcome = store
            .update_category_many(&filter, target.clone())
            .await
            .unwrap();

        assert_eq!(outcome.modified, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].transaction_id, stuck.id);
        assert_eq!(store.counters().writes, 1);
        assert_eq!(store.transaction(moved.id).await.unwrap().category, target);
        assert_eq!(store.transaction(stuck.id).await.unwrap().category, label);
    }
}
