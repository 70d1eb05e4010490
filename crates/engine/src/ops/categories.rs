use crate::{
    Category, CategoryKind, EngineError, NewCategory, ObjectId, ResultEngine,
    store::{CategoryFilter, GroupKey, Grouping, NameMatch, TransactionFilter},
};

use super::{Engine, normalize_optional_text, normalize_required_name};

/// Among same-name categories of different kinds, expense wins.
pub(super) fn preferred_match(mut matches: Vec<Category>) -> Option<Category> {
    matches.sort_by_key(|category| match category.kind {
        CategoryKind::Expense => 0,
        CategoryKind::Income => 1,
    });
    matches.into_iter().next()
}

impl Engine {
    /// All categories, by kind then name.
    pub async fn list_categories(&self) -> ResultEngine<Vec<Category>> {
        let mut categories = self.store.list_categories().await?;
        categories.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then_with(|| a.name_norm().cmp(&b.name_norm()))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(categories)
    }

    /// Case-insensitive substring search on category names.
    pub async fn search_categories(&self, query: &str) -> ResultEngine<Vec<Category>> {
        self.store.find_categories(query, NameMatch::Contains).await
    }

    /// The category whose normalized name equals `name`, preferring expense.
    pub async fn match_category(&self, name: &str) -> ResultEngine<Option<Category>> {
        let matches = self.store.find_categories(name, NameMatch::Exact).await?;
        Ok(preferred_match(matches))
    }

    pub async fn create_category(&self, input: NewCategory) -> ResultEngine<Category> {
        let name = normalize_required_name(&input.name, "category")?;
        let defaults = &self.config.categories;
        let category = Category::new(
            name,
            input.kind,
            normalize_optional_text(input.icon.as_deref()).unwrap_or_else(|| defaults.icon.clone()),
            normalize_optional_text(input.color.as_deref())
                .unwrap_or_else(|| defaults.color.clone()),
        );
        self.store.insert_category(category).await
    }

    /// `true` while a budget or any transaction points at `id`, whatever
    /// shape the transaction's reference has.
    pub async fn category_in_use(&self, id: ObjectId) -> ResultEngine<bool> {
        if self.store.count_budgets_for(id).await? > 0 {
            return Ok(true);
        }
        let canonical = TransactionFilter::default().category(CategoryFilter::Id(id));
        if self.store.count_transactions(&canonical).await? > 0 {
            return Ok(true);
        }
        for shape in [CategoryFilter::Serialized, CategoryFilter::Text] {
            let filter = TransactionFilter::default().category(shape);
            let rows = self.store.aggregate(&filter, Grouping::Category).await?;
            let referenced = rows.iter().any(|row| match &row.key {
                GroupKey::Category(raw) => raw.normalize() == Some(id),
                _ => false,
            });
            if referenced {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn delete_category(&self, id: ObjectId) -> ResultEngine<()> {
        if self.category_in_use(id).await? {
            return Err(EngineError::InUse(id.to_string()));
        }
        if !self.store.delete_category(id).await? {
            return Err(EngineError::KeyNotFound(id.to_string()));
        }
        Ok(())
    }
}
