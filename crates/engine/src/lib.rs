//! Category-reference resolution, migration and dashboard aggregation over a
//! document store of personal-finance transactions.
//!
//! Everything goes through [`Engine`], built with [`Engine::builder`] from a
//! [`Store`] handle and an [`EngineConfig`].

pub use budgets::{Budget, BudgetChanges, BudgetPeriod, NewBudget};
pub use categories::{Category, CategoryKind, NewCategory};
pub use category_ref::{CategoryRef, ResolvedCategory, id_from_json, normalize};
pub use config::{CategoryDefaults, DashboardConfig, EngineConfig, MigrationDefaults};
pub use error::EngineError;
pub use money::MoneyCents;
pub use object_id::ObjectId;
pub use ops::{
    BreakdownEntry, CreatedCategory, DEFAULT_LIST_LIMIT, Engine, EngineBuilder, ExpenseBreakdown,
    LegacyGroupReport, MAX_LIST_LIMIT, MigrationMode, MigrationReport, MonthlyTrend, Summary,
    TransactionQuery,
};
pub use store::{
    AggregateRow, BulkWriteFailure, BulkWriteOutcome, CategoryFilter, CategoryUpdate, Direction,
    GroupKey, Grouping, MemoryStore, NameMatch, SqlStore, Store, StoreCounters, TransactionFilter,
};
pub use transactions::{
    DEFAULT_ACCOUNT, DEFAULT_METHOD, ResolvedTransaction, Transaction, TransactionDocument,
};
pub use util::normalize_label;

mod budgets;
mod categories;
mod category_ref;
mod config;
mod error;
mod money;
mod object_id;
mod ops;
mod store;
mod transactions;
mod util;

pub type ResultEngine<T> = Result<T, EngineError>;
