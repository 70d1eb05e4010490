use std::collections::{BTreeSet, HashMap};

use crate::{
    Category, CategoryRef, ObjectId, ResolvedTransaction, ResultEngine, Transaction,
    category_ref::ResolvedCategory,
};

use super::Engine;

impl Engine {
    /// Replaces every transaction's category reference with the category it
    /// points to.
    ///
    /// All references are normalized first and the distinct ids are fetched
    /// with a single `categories_by_ids` call, skipped entirely when nothing
    /// normalizes. References that cannot be resolved pass through as they
    /// are, except serialized wrappers, which collapse to their id.
    pub async fn resolve_batch(
        &self,
        transactions: Vec<Transaction>,
    ) -> ResultEngine<Vec<ResolvedTransaction>> {
        let normalized: Vec<Option<ObjectId>> = transactions
            .iter()
            .map(|tx| tx.category.normalize())
            .collect();
        let ids: BTreeSet<ObjectId> = normalized.iter().flatten().copied().collect();
        let found = self.lookup_categories(&ids).await?;

        Ok(transactions
            .into_iter()
            .zip(normalized)
            .map(|(tx, id)| {
                let category = resolved(&tx.category, id, &found);
                ResolvedTransaction::from_parts(tx, category)
            })
            .collect())
    }

    /// One batched lookup for `ids`, no store call when `ids` is empty.
    pub(super) async fn lookup_categories(
        &self,
        ids: &BTreeSet<ObjectId>,
    ) -> ResultEngine<HashMap<ObjectId, Category>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<ObjectId> = ids.iter().copied().collect();
        let found = self.store.categories_by_ids(&ids).await?;
        Ok(found
            .into_iter()
            .map(|category| (category.id, category))
            .collect())
    }
}

fn resolved(
    raw: &CategoryRef,
    id: Option<ObjectId>,
    found: &HashMap<ObjectId, Category>,
) -> ResolvedCategory {
    match id {
        Some(id) => match found.get(&id) {
            Some(category) => ResolvedCategory::Category(category.clone()),
            None => match raw {
                // Dangling labels stay labels; only ids and wrappers collapse.
                CategoryRef::Text(text) => ResolvedCategory::Text(text.clone()),
                _ => ResolvedCategory::Id(id),
            },
        },
        None => match raw {
            CategoryRef::Id(id) => ResolvedCategory::Id(*id),
            CategoryRef::Text(text) => ResolvedCategory::Text(text.clone()),
            CategoryRef::Serialized(value) => ResolvedCategory::Raw(value.clone()),
            CategoryRef::Null => ResolvedCategory::Null,
        },
    }
}
