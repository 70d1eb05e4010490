use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectOptions, Database, DatabaseConnection,
    DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr,
    sea_query::Expr,
};

use crate::{
    Budget, Category, CategoryRef, EngineError, ObjectId, ResultEngine, Transaction, budgets,
    categories,
    transactions::{
        self, CATEGORY_KIND_ID, CATEGORY_KIND_SERIALIZED, CATEGORY_KIND_TEXT, category_columns,
    },
    util::normalize_label,
};

use super::{
    AggregateRow, BulkWriteFailure, BulkWriteOutcome, CategoryFilter, CategoryUpdate, Direction,
    Grouping, NameMatch, Store, TransactionFilter, fold_rows,
};

/// [`Store`] over a relational database through `sea-orm`.
///
/// The schema comes from the `migration` crate. A category reference is
/// stored as a `(category_kind, category_value)` column pair.
#[derive(Clone, Debug)]
pub struct SqlStore {
    database: DatabaseConnection,
}

impl SqlStore {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    pub async fn connect(options: impl Into<ConnectOptions>) -> ResultEngine<Self> {
        Ok(Self::new(Database::connect(options).await?))
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.database
    }

    pub async fn close(self) -> ResultEngine<()> {
        self.database.close().await?;
        Ok(())
    }
}

fn category_condition(filter: &CategoryFilter) -> Option<Condition> {
    use transactions::Column;

    let kind_is = |kind: &str| Condition::all().add(Column::CategoryKind.eq(kind));
    match filter {
        CategoryFilter::Any => None,
        CategoryFilter::Null => Some(Condition::all().add(Column::CategoryKind.is_null())),
        CategoryFilter::NotNull => Some(Condition::all().add(Column::CategoryKind.is_not_null())),
        CategoryFilter::Id(id) => {
            Some(kind_is(CATEGORY_KIND_ID).add(Column::CategoryValue.eq(id.to_string())))
        }
        CategoryFilter::Text => Some(kind_is(CATEGORY_KIND_TEXT)),
        CategoryFilter::TextIn(labels) => Some(
            kind_is(CATEGORY_KIND_TEXT).add(Column::CategoryValue.is_in(labels.iter().cloned())),
        ),
        CategoryFilter::Serialized => Some(kind_is(CATEGORY_KIND_SERIALIZED)),
    }
}

fn transaction_condition(filter: &TransactionFilter) -> Condition {
    use transactions::Column;

    let mut condition = Condition::all();
    if let Some(since) = filter.since {
        condition = condition.add(Column::OccurredAt.gte(since));
    }
    if let Some(until) = filter.until {
        condition = condition.add(Column::OccurredAt.lte(until));
    }
    match filter.direction {
        Some(Direction::Income) => condition = condition.add(Column::AmountMinor.gte(0)),
        Some(Direction::Expense) => condition = condition.add(Column::AmountMinor.lt(0)),
        None => {}
    }
    if let Some(category) = category_condition(&filter.category) {
        condition = condition.add(category);
    }
    condition
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn to_categories(models: Vec<categories::Model>) -> ResultEngine<Vec<Category>> {
    models.into_iter().map(Category::try_from).collect()
}

fn to_budgets(models: Vec<budgets::Model>) -> ResultEngine<Vec<Budget>> {
    models.into_iter().map(Budget::try_from).collect()
}

fn to_transactions(models: Vec<transactions::Model>) -> ResultEngine<Vec<Transaction>> {
    models.into_iter().map(Transaction::try_from).collect()
}

impl SqlStore {
    async fn rewrite_category(
        &self,
        condition: Condition,
        category: &CategoryRef,
    ) -> Result<u64, DbErr> {
        use transactions::Column;

        let (kind, value) = category_columns(category);
        let result = transactions::Entity::update_many()
            .col_expr(Column::CategoryKind, Expr::value(kind))
            .col_expr(Column::CategoryValue, Expr::value(value))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(condition)
            .exec(&self.database)
            .await?;
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl Store for SqlStore {
    async fn category(&self, id: ObjectId) -> ResultEngine<Option<Category>> {
        categories::Entity::find_by_id(id.to_string())
            .one(&self.database)
            .await?
            .map(Category::try_from)
            .transpose()
    }

    async fn categories_by_ids(&self, ids: &[ObjectId]) -> ResultEngine<Vec<Category>> {
        let models = categories::Entity::find()
            .filter(categories::Column::Id.is_in(ids.iter().map(ToString::to_string)))
            .all(&self.database)
            .await?;
        to_categories(models)
    }

    async fn list_categories(&self) -> ResultEngine<Vec<Category>> {
        let models = categories::Entity::find()
            .order_by_asc(categories::Column::Kind)
            .order_by_asc(categories::Column::NameNorm)
            .all(&self.database)
            .await?;
        to_categories(models)
    }

    async fn find_categories(&self, name: &str, mode: NameMatch) -> ResultEngine<Vec<Category>> {
        let wanted = normalize_label(name);
        let condition = match mode {
            NameMatch::Exact => categories::Column::NameNorm.eq(wanted),
            NameMatch::Contains => categories::Column::NameNorm.contains(&wanted),
        };
        let models = categories::Entity::find()
            .filter(condition)
            .all(&self.database)
            .await?;
        to_categories(models)
    }

    async fn insert_category(&self, category: Category) -> ResultEngine<Category> {
        let existing = categories::Entity::find()
            .filter(categories::Column::NameNorm.eq(category.name_norm()))
            .filter(categories::Column::Kind.eq(category.kind.as_str()))
            .one(&self.database)
            .await?;
        if existing.is_some() {
            return Err(EngineError::ExistingKey(category.name));
        }

        match categories::ActiveModel::from(&category)
            .insert(&self.database)
            .await
        {
            Ok(model) => Category::try_from(model),
            Err(err) if is_unique_violation(&err) => Err(EngineError::ExistingKey(category.name)),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_category(&self, id: ObjectId) -> ResultEngine<bool> {
        let result = categories::Entity::delete_by_id(id.to_string())
            .exec(&self.database)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn budget(&self, id: ObjectId) -> ResultEngine<Option<Budget>> {
        budgets::Entity::find_by_id(id.to_string())
            .one(&self.database)
            .await?
            .map(Budget::try_from)
            .transpose()
    }

    async fn list_budgets(&self) -> ResultEngine<Vec<Budget>> {
        let models = budgets::Entity::find()
            .order_by_asc(budgets::Column::CreatedAt)
            .order_by_asc(budgets::Column::Id)
            .all(&self.database)
            .await?;
        to_budgets(models)
    }

    async fn insert_budget(&self, budget: Budget) -> ResultEngine<Budget> {
        match budgets::ActiveModel::from(&budget)
            .insert(&self.database)
            .await
        {
            Ok(model) => Budget::try_from(model),
            Err(err) if is_unique_violation(&err) => {
                Err(EngineError::ExistingKey(budget.id.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn replace_budget(&self, budget: &Budget) -> ResultEngine<bool> {
        let result = budgets::Entity::update_many()
            .col_expr(
                budgets::Column::CategoryId,
                Expr::value(budget.category.to_string()),
            )
            .col_expr(budgets::Column::LimitMinor, Expr::value(budget.limit.cents()))
            .col_expr(budgets::Column::Period, Expr::value(budget.period.as_str()))
            .col_expr(budgets::Column::UpdatedAt, Expr::value(budget.updated_at))
            .filter(budgets::Column::Id.eq(budget.id.to_string()))
            .exec(&self.database)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn delete_budget(&self, id: ObjectId) -> ResultEngine<bool> {
        let result = budgets::Entity::delete_by_id(id.to_string())
            .exec(&self.database)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn count_budgets_for(&self, category: ObjectId) -> ResultEngine<u64> {
        Ok(budgets::Entity::find()
            .filter(budgets::Column::CategoryId.eq(category.to_string()))
            .count(&self.database)
            .await?)
    }

    async fn insert_transaction(&self, tx: Transaction) -> ResultEngine<()> {
        match transactions::ActiveModel::from(&tx)
            .insert(&self.database)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(EngineError::ExistingKey(tx.id.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_transactions(
        &self,
        filter: &TransactionFilter,
        limit: Option<u64>,
    ) -> ResultEngine<Vec<Transaction>> {
        let mut query = transactions::Entity::find()
            .filter(transaction_condition(filter))
            .order_by_desc(transactions::Column::OccurredAt)
            .order_by_desc(transactions::Column::Id);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        to_transactions(query.all(&self.database).await?)
    }

    async fn count_transactions(&self, filter: &TransactionFilter) -> ResultEngine<u64> {
        Ok(transactions::Entity::find()
            .filter(transaction_condition(filter))
            .count(&self.database)
            .await?)
    }

    async fn aggregate(
        &self,
        filter: &TransactionFilter,
        grouping: Grouping,
    ) -> ResultEngine<Vec<AggregateRow>> {
        let models = transactions::Entity::find()
            .filter(transaction_condition(filter))
            .order_by_asc(transactions::Column::OccurredAt)
            .all(&self.database)
            .await?;
        let found = to_transactions(models)?;
        Ok(fold_rows(&found, grouping))
    }

    async fn update_category(&self, id: ObjectId, category: CategoryRef) -> ResultEngine<bool> {
        let condition = Condition::all().add(transactions::Column::Id.eq(id.to_string()));
        Ok(self.rewrite_category(condition, &category).await? > 0)
    }

    async fn update_category_many(
        &self,
        filter: &TransactionFilter,
        category: CategoryRef,
    ) -> ResultEngine<BulkWriteOutcome> {
        // One statement: it either rewrites every match or fails as a whole.
        let rows = self
            .rewrite_category(transaction_condition(filter), &category)
            .await?;
        Ok(BulkWriteOutcome {
            matched: rows,
            modified: rows,
            failures: Vec::new(),
        })
    }

    async fn bulk_update_category(
        &self,
        updates: Vec<CategoryUpdate>,
    ) -> ResultEngine<BulkWriteOutcome> {
        let ids = updates
            .iter()
            .map(|update| update.transaction_id.to_string());
        let current: HashMap<String, CategoryRef> = to_transactions(
            transactions::Entity::find()
                .filter(transactions::Column::Id.is_in(ids))
                .all(&self.database)
                .await?,
        )?
        .into_iter()
        .map(|tx| (tx.id.to_string(), tx.category))
        .collect();

        let mut outcome = BulkWriteOutcome::default();
        for update in updates {
            let key = update.transaction_id.to_string();
            let Some(existing) = current.get(&key) else {
                continue;
            };
            outcome.matched += 1;
            if *existing == update.category {
                continue;
            }
            let condition = Condition::all().add(transactions::Column::Id.eq(key));
            match self.rewrite_category(condition, &update.category).await {
                Ok(rows) => outcome.modified += rows,
                Err(err) => {
                    let err = EngineError::from(err);
                    if err.is_fatal() {
                        return Err(err);
                    }
                    outcome.failures.push(BulkWriteFailure {
                        transaction_id: update.transaction_id,
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(outcome)
    }
}
