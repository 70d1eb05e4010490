use std::sync::Arc;

use chrono::{TimeZone, Utc};
use sea_orm::Database;
use serde_json::json;

use engine::{
    BudgetChanges, BudgetPeriod, Category, CategoryFilter, CategoryKind, CategoryRef, Engine,
    EngineError, MigrationMode, MoneyCents, NewBudget, ObjectId, SqlStore, Store, Transaction,
    TransactionFilter, TransactionQuery,
};
use migration::MigratorTrait;

async fn engine_with_db() -> (Engine, SqlStore) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let store = SqlStore::new(db);
    let engine = Engine::builder()
        .store(Arc::new(store.clone()))
        .build()
        .unwrap();
    (engine, store)
}

async fn insert(store: &SqlStore, category: CategoryRef) -> ObjectId {
    let tx = Transaction::new(
        Utc.with_ymd_and_hms(2025, 2, 3, 10, 0, 0).unwrap(),
        MoneyCents::new(-1250),
        category,
    )
    .with_description("imported");
    let id = tx.id;
    store.insert_transaction(tx).await.unwrap();
    id
}

#[tokio::test]
async fn category_encodings_round_trip_through_the_columns() {
    let (_engine, store) = engine_with_db().await;
    let id = ObjectId::new();
    let refs = [
        CategoryRef::Id(id),
        CategoryRef::Text("Groceries".to_string()),
        CategoryRef::Serialized(json!({ "$oid": id.to_string() })),
        CategoryRef::Null,
    ];
    for category in refs {
        let tx_id = insert(&store, category.clone()).await;
        let found = store
            .find_transactions(&TransactionFilter::default(), None)
            .await
            .unwrap();
        let stored = found.iter().find(|tx| tx.id == tx_id).unwrap();
        assert_eq!(stored.category, category);
        assert_eq!(stored.description, "imported");
    }

    let text = TransactionFilter::default().category(CategoryFilter::Text);
    assert_eq!(store.count_transactions(&text).await.unwrap(), 1);
    let null = TransactionFilter::default().category(CategoryFilter::Null);
    assert_eq!(store.count_transactions(&null).await.unwrap(), 1);
}

#[tokio::test]
async fn unique_index_rejects_duplicate_categories() {
    let (_engine, store) = engine_with_db().await;
    let category = |name: &str| {
        Category::new(
            name.to_string(),
            CategoryKind::Expense,
            "💸".to_string(),
            "#FF8042".to_string(),
        )
    };
    store.insert_category(category("Food")).await.unwrap();

    let err = store.insert_category(category("FOOD")).await.unwrap_err();

    assert!(matches!(err, EngineError::ExistingKey(_)));
}

#[tokio::test]
async fn migration_is_idempotent_on_sql() {
    let (engine, store) = engine_with_db().await;
    let target = ObjectId::new();
    insert(&store, CategoryRef::Serialized(json!({ "$oid": target.to_string() }))).await;
    insert(&store, CategoryRef::Text(target.to_string())).await;
    insert(&store, CategoryRef::Text("Groceries".to_string())).await;
    insert(&store, CategoryRef::Text("groceries ".to_string())).await;

    let first = engine.migrate_categories(MigrationMode::Apply).await.unwrap();
    assert_eq!(first.wrapper_objects_converted, 1);
    assert_eq!(first.id_strings_converted, 1);
    assert_eq!(first.categories_created.len(), 1);
    assert_eq!(first.transactions_updated, 2);
    assert!(first.errors.is_empty());

    let second = engine.migrate_categories(MigrationMode::Apply).await.unwrap();
    assert_eq!(second.wrapper_objects_found, 0);
    assert_eq!(second.id_strings_found, 0);
    assert_eq!(second.legacy_groups_found, 0);
    assert!(second.categories_created.is_empty());
    assert_eq!(second.transactions_updated, 0);

    let created = first.categories_created[0].id;
    let grouped = TransactionFilter::default().category(CategoryFilter::Id(created));
    assert_eq!(store.count_transactions(&grouped).await.unwrap(), 2);
}

#[tokio::test]
async fn listing_resolves_categories_from_sql() {
    let (engine, store) = engine_with_db().await;
    let food = store
        .insert_category(Category::new(
            "Food".to_string(),
            CategoryKind::Expense,
            "🍔".to_string(),
            "#FFBB28".to_string(),
        ))
        .await
        .unwrap();
    insert(&store, CategoryRef::Serialized(json!({ "_id": food.id.to_string() }))).await;

    let listed = engine
        .list_transactions(&TransactionQuery::default())
        .await
        .unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].category.category(), Some(&food));
}

#[tokio::test]
async fn dashboard_reads_from_sql() {
    let (engine, store) = engine_with_db().await;
    let now = Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap();
    insert(&store, CategoryRef::Null).await;
    store
        .insert_transaction(Transaction::new(
            Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
            MoneyCents::new(5_000),
            CategoryRef::Null,
        ))
        .await
        .unwrap();

    let summary = engine.summary(now).await.unwrap();
    assert_eq!(summary.balance, MoneyCents::new(3_750));
    assert_eq!(summary.expense_30d, MoneyCents::new(1_250));

    let trend = engine.monthly_trend(now).await.unwrap();
    assert_eq!(trend[11].income, MoneyCents::new(5_000));
    assert_eq!(trend[11].expense, MoneyCents::new(1_250));
}

#[tokio::test]
async fn budgets_persist_and_guard_their_category() {
    let (engine, store) = engine_with_db().await;
    let food = store
        .insert_category(Category::new(
            "Food".to_string(),
            CategoryKind::Expense,
            "🍔".to_string(),
            "#FFBB28".to_string(),
        ))
        .await
        .unwrap();
    let budget = engine
        .create_budget(NewBudget {
            category: food.id,
            limit: MoneyCents::new(400_00),
            period: Some(BudgetPeriod::Monthly),
        })
        .await
        .unwrap();
    assert_eq!(store.count_budgets_for(food.id).await.unwrap(), 1);

    let updated = engine
        .update_budget(
            budget.id,
            BudgetChanges {
                limit: Some(MoneyCents::new(450_00)),
                ..BudgetChanges::default()
            },
        )
        .await
        .unwrap();
    let stored = store.budget(budget.id).await.unwrap().unwrap();
    assert_eq!(stored.limit, updated.limit);

    let err = engine.delete_category(food.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InUse(_)));
    engine.delete_budget(budget.id).await.unwrap();
    assert!(engine.list_budgets().await.unwrap().is_empty());
    engine.delete_category(food.id).await.unwrap();
}

#[tokio::test]
async fn wrapped_reference_keeps_a_category_in_use() {
    let (engine, store) = engine_with_db().await;
    let rent = store
        .insert_category(Category::new(
            "Rent".to_string(),
            CategoryKind::Expense,
            "🏠".to_string(),
            "#0088FE".to_string(),
        ))
        .await
        .unwrap();
    insert(&store, CategoryRef::Serialized(json!({ "$oid": rent.id.to_string() }))).await;

    assert!(engine.category_in_use(rent.id).await.unwrap());
    assert!(matches!(
        engine.delete_category(rent.id).await,
        Err(EngineError::InUse(_))
    ));
}
