//! The data-access contract the engine runs against.
//!
//! The engine never talks to a database directly: it asks a [`Store`] for
//! documents, grouped sums and category-field rewrites. Two adapters ship with
//! the crate:
//!
//! - [`MemoryStore`], an in-process document store with call counters and
//!   fault injection,
//! - [`SqlStore`], backed by `sea-orm` and the `migration` crate's schema.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;

use crate::{Budget, Category, CategoryRef, MoneyCents, ObjectId, ResultEngine, Transaction};

mod memory;
mod sql;

pub use memory::{MemoryStore, StoreCounters};
pub use sql::SqlStore;

/// Direction of a transaction, derived from the sign of its amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    /// Zero or positive amount.
    Income,
    /// Negative amount.
    Expense,
}

impl Direction {
    pub fn of(amount: MoneyCents) -> Self {
        if amount.is_expense() {
            Self::Expense
        } else {
            Self::Income
        }
    }
}

/// Which category encodings a filter selects.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CategoryFilter {
    #[default]
    Any,
    Null,
    NotNull,
    Id(ObjectId),
    /// Any free-text label.
    Text,
    /// Free-text labels equal to one of the given strings, byte for byte.
    TextIn(Vec<String>),
    Serialized,
}

impl CategoryFilter {
    pub fn matches(&self, category: &CategoryRef) -> bool {
        match self {
            Self::Any => true,
            Self::Null => category.is_null(),
            Self::NotNull => !category.is_null(),
            Self::Id(id) => matches!(category, CategoryRef::Id(current) if current == id),
            Self::Text => matches!(category, CategoryRef::Text(_)),
            Self::TextIn(labels) => {
                matches!(category, CategoryRef::Text(label) if labels.contains(label))
            }
            Self::Serialized => matches!(category, CategoryRef::Serialized(_)),
        }
    }
}

/// Transaction selection shared by reads, counts, aggregations and
/// filter-addressed updates. Bounds are inclusive.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransactionFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub category: CategoryFilter,
    pub direction: Option<Direction>,
}

impl TransactionFilter {
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn category(mut self, category: CategoryFilter) -> Self {
        self.category = category;
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        self.since.is_none_or(|since| tx.occurred_at >= since)
            && self.until.is_none_or(|until| tx.occurred_at <= until)
            && self
                .direction
                .is_none_or(|direction| Direction::of(tx.amount) == direction)
            && self.category.matches(&tx.category)
    }
}

/// Case-insensitive category name lookup mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameMatch {
    /// Whole normalized name, anchored at both ends.
    Exact,
    /// Normalized substring.
    Contains,
}

/// How [`Store::aggregate`] groups the filtered transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grouping {
    /// One row for the whole set.
    Total,
    /// One row per [`Direction`].
    Direction,
    /// One row per calendar month (in `timezone`) and direction.
    MonthDirection { timezone: Tz },
    /// One row per distinct raw category value.
    Category,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GroupKey {
    Total,
    Direction(Direction),
    MonthDirection {
        year: i32,
        month: u32,
        direction: Direction,
    },
    Category(CategoryRef),
}

/// A grouped reduction: signed sum of amounts and number of documents.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateRow {
    pub key: GroupKey,
    pub sum: MoneyCents,
    pub count: u64,
}

/// One operation of an unordered bulk write.
#[derive(Clone, Debug, PartialEq)]
pub struct CategoryUpdate {
    pub transaction_id: ObjectId,
    pub category: CategoryRef,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BulkWriteFailure {
    pub transaction_id: ObjectId,
    pub message: String,
}

/// Tally of an unordered bulk write. A failed operation does not stop the
/// ones after it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BulkWriteOutcome {
    pub matched: u64,
    pub modified: u64,
    pub failures: Vec<BulkWriteFailure>,
}

/// Document store operations required by the engine.
///
/// Every method may fail with [`EngineError::Unavailable`] when the store
/// cannot be reached; callers treat that as fatal.
///
/// [`EngineError::Unavailable`]: crate::EngineError::Unavailable
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    async fn category(&self, id: ObjectId) -> ResultEngine<Option<Category>>;

    /// Multi-id lookup: `find where id in ids`. Unknown ids are skipped.
    async fn categories_by_ids(&self, ids: &[ObjectId]) -> ResultEngine<Vec<Category>>;

    async fn list_categories(&self) -> ResultEngine<Vec<Category>>;

    /// Case-insensitive lookup on the category name.
    async fn find_categories(&self, name: &str, mode: NameMatch) -> ResultEngine<Vec<Category>>;

    /// Fails with `ExistingKey` when a category with the same normalized name
    /// and kind exists.
    async fn insert_category(&self, category: Category) -> ResultEngine<Category>;

    async fn delete_category(&self, id: ObjectId) -> ResultEngine<bool>;

    async fn budget(&self, id: ObjectId) -> ResultEngine<Option<Budget>>;

    /// All budgets, oldest first.
    async fn list_budgets(&self) -> ResultEngine<Vec<Budget>>;

    async fn insert_budget(&self, budget: Budget) -> ResultEngine<Budget>;

    /// Overwrites the stored budget with the same id. `false` when there is
    /// none.
    async fn replace_budget(&self, budget: &Budget) -> ResultEngine<bool>;

    async fn delete_budget(&self, id: ObjectId) -> ResultEngine<bool>;

    /// Budgets attached to `category`.
    async fn count_budgets_for(&self, category: ObjectId) -> ResultEngine<u64>;

    async fn insert_transaction(&self, tx: Transaction) -> ResultEngine<()>;

    /// Matching transactions, newest first.
    async fn find_transactions(
        &self,
        filter: &TransactionFilter,
        limit: Option<u64>,
    ) -> ResultEngine<Vec<Transaction>>;

    async fn count_transactions(&self, filter: &TransactionFilter) -> ResultEngine<u64>;

    async fn aggregate(
        &self,
        filter: &TransactionFilter,
        grouping: Grouping,
    ) -> ResultEngine<Vec<AggregateRow>>;

    /// Single-document update by id. `false` when no such transaction exists.
    async fn update_category(&self, id: ObjectId, category: CategoryRef) -> ResultEngine<bool>;

    /// Multi-document update by filter. A document that rejects the write is
    /// listed in the outcome and the other matches are still rewritten.
    async fn update_category_many(
        &self,
        filter: &TransactionFilter,
        category: CategoryRef,
    ) -> ResultEngine<BulkWriteOutcome>;

    /// Unordered batch of single-document updates.
    async fn bulk_update_category(
        &self,
        updates: Vec<CategoryUpdate>,
    ) -> ResultEngine<BulkWriteOutcome>;
}

fn group_key(tx: &Transaction, grouping: Grouping) -> GroupKey {
    match grouping {
        Grouping::Total => GroupKey::Total,
        Grouping::Direction => GroupKey::Direction(Direction::of(tx.amount)),
        Grouping::MonthDirection { timezone } => {
            let local = tx.occurred_at.with_timezone(&timezone);
            GroupKey::MonthDirection {
                year: local.year(),
                month: local.month(),
                direction: Direction::of(tx.amount),
            }
        }
        Grouping::Category => GroupKey::Category(tx.category.clone()),
    }
}

/// Reduces already filtered transactions into grouped rows, in order of first
/// appearance.
pub(crate) fn fold_rows<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
    grouping: Grouping,
) -> Vec<AggregateRow> {
    let mut rows: Vec<AggregateRow> = Vec::new();
    for tx in transactions {
        let key = group_key(tx, grouping);
        match rows.iter_mut().find(|row| row.key == key) {
            Some(row) => {
                row.sum += tx.amount;
                row.count += 1;
            }
            None => rows.push(AggregateRow {
                key,
                sum: tx.amount,
                count: 1,
            }),
        }
    }
    rows
}
