use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    CategoryRef, EngineError, ObjectId, ResolvedTransaction, ResultEngine, Transaction,
    store::{NameMatch, TransactionFilter},
};

use super::Engine;

pub const DEFAULT_LIST_LIMIT: u64 = 1000;
pub const MAX_LIST_LIMIT: u64 = 5000;

/// Listing parameters. Bounds are inclusive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TransactionQuery {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl TransactionQuery {
    /// Requested limit clamped to `1..=MAX_LIST_LIMIT`; missing or
    /// non-positive values fall back to [`DEFAULT_LIST_LIMIT`].
    pub fn effective_limit(&self) -> u64 {
        match self.limit {
            Some(limit) if limit > 0 => (limit as u64).min(MAX_LIST_LIMIT),
            _ => DEFAULT_LIST_LIMIT,
        }
    }

    fn filter(&self) -> TransactionFilter {
        TransactionFilter {
            since: self.from,
            until: self.to,
            ..TransactionFilter::default()
        }
    }
}

impl Engine {
    /// Newest transactions first, categories resolved.
    pub async fn list_transactions(
        &self,
        query: &TransactionQuery,
    ) -> ResultEngine<Vec<ResolvedTransaction>> {
        let found = self
            .store
            .find_transactions(&query.filter(), Some(query.effective_limit()))
            .await?;
        self.resolve_batch(found).await
    }

    /// Stores a transaction as given, category encoding included.
    pub async fn insert_transaction(&self, tx: Transaction) -> ResultEngine<ObjectId> {
        let id = tx.id;
        self.store.insert_transaction(tx).await?;
        Ok(id)
    }

    /// Points a transaction at a category given either by id or by name.
    ///
    /// Names are matched case-insensitively against existing categories;
    /// nothing is created here. `None` clears the category.
    pub async fn assign_category(
        &self,
        transaction_id: ObjectId,
        category: Option<&str>,
    ) -> ResultEngine<()> {
        let category = match category.map(str::trim).filter(|value| !value.is_empty()) {
            None => CategoryRef::Null,
            Some(value) => CategoryRef::Id(self.category_id_for(value).await?),
        };
        if !self.store.update_category(transaction_id, category).await? {
            return Err(EngineError::KeyNotFound(transaction_id.to_string()));
        }
        Ok(())
    }

    async fn category_id_for(&self, value: &str) -> ResultEngine<ObjectId> {
        if let Some(id) = ObjectId::parse(value) {
            if let Some(category) = self.store.category(id).await? {
                return Ok(category.id);
            }
        }
        let matches = self.store.find_categories(value, NameMatch::Exact).await?;
        super::categories::preferred_match(matches)
            .map(|category| category.id)
            .ok_or_else(|| EngineError::KeyNotFound(value.to_string()))
    }
}
