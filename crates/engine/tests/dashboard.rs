use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use engine::{
    Category, CategoryKind, CategoryRef, EngineConfig, Engine, MemoryStore, MoneyCents, ObjectId,
    Store, Transaction,
};

async fn engine_with_store(config: EngineConfig) -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::builder()
        .store(store.clone())
        .config(config)
        .build()
        .unwrap();
    (engine, store)
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
}

async fn insert(store: &MemoryStore, at: DateTime<Utc>, cents: i64, category: CategoryRef) {
    store
        .insert_transaction(Transaction::new(at, MoneyCents::new(cents), category))
        .await
        .unwrap();
}

async fn expense_category(store: &MemoryStore, name: &str) -> Category {
    store
        .insert_category(Category::new(
            name.to_string(),
            CategoryKind::Expense,
            "🏷".to_string(),
            "#123456".to_string(),
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn summary_splits_the_window_by_sign() {
    let (engine, store) = engine_with_store(EngineConfig::default()).await;
    insert(&store, now() - Duration::days(2), 10_000, CategoryRef::Null).await;
    insert(&store, now() - Duration::days(1), -4_000, CategoryRef::Null).await;

    let summary = engine.summary(now()).await.unwrap();

    assert_eq!(summary.income_30d, MoneyCents::new(10_000));
    assert_eq!(summary.expense_30d, MoneyCents::new(4_000));
    assert_eq!(summary.balance, MoneyCents::new(6_000));
}

#[tokio::test]
async fn summary_window_is_inclusive_and_balance_covers_history() {
    let (engine, store) = engine_with_store(EngineConfig::default()).await;
    insert(&store, now() - Duration::days(30), 500, CategoryRef::Null).await;
    insert(&store, now() - Duration::days(31), -700, CategoryRef::Null).await;
    insert(&store, now() - Duration::days(400), 1_000, CategoryRef::Null).await;

    let summary = engine.summary(now()).await.unwrap();

    assert_eq!(summary.income_30d, MoneyCents::new(500));
    assert_eq!(summary.expense_30d, MoneyCents::ZERO);
    assert_eq!(summary.balance, MoneyCents::new(800));

    let encoded = serde_json::to_value(summary).unwrap();
    assert_eq!(encoded, json!({ "balance": 800, "income30d": 500, "expense30d": 0 }));
}

#[tokio::test]
async fn empty_store_yields_twelve_zero_months() {
    let (engine, _store) = engine_with_store(EngineConfig::default()).await;

    let trend = engine.monthly_trend(now()).await.unwrap();

    assert_eq!(trend.len(), 12);
    assert_eq!((trend[0].year, trend[0].month), (2024, 7));
    assert_eq!((trend[11].year, trend[11].month), (2025, 6));
    assert!(
        trend
            .iter()
            .all(|month| month.income.is_zero() && month.expense.is_zero())
    );
}

#[tokio::test]
async fn trend_buckets_by_local_month() {
    let mut config = EngineConfig::default();
    config.dashboard.timezone = chrono_tz::Europe::Rome;
    let (engine, store) = engine_with_store(config).await;
    // 23:30 UTC on 31 May is already June in Rome.
    insert(
        &store,
        Utc.with_ymd_and_hms(2025, 5, 31, 23, 30, 0).unwrap(),
        -1_500,
        CategoryRef::Null,
    )
    .await;
    insert(
        &store,
        Utc.with_ymd_and_hms(2025, 5, 10, 8, 0, 0).unwrap(),
        2_000,
        CategoryRef::Null,
    )
    .await;
    // Older than the trend.
    insert(
        &store,
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        9_999,
        CategoryRef::Null,
    )
    .await;

    let trend = engine.monthly_trend(now()).await.unwrap();

    let june = &trend[11];
    assert_eq!(june.expense, MoneyCents::new(1_500));
    let may = &trend[10];
    assert_eq!(may.income, MoneyCents::new(2_000));
    assert!(may.expense.is_zero());
    let total_income: MoneyCents = trend.iter().map(|month| month.income).sum();
    assert_eq!(total_income, MoneyCents::new(2_000));
}

#[tokio::test]
async fn breakdown_merges_shapes_of_the_same_category() {
    let (engine, store) = engine_with_store(EngineConfig::default()).await;
    let food = expense_category(&store, "Food").await;
    let rent = expense_category(&store, "Rent").await;
    insert(&store, now(), -4_000, CategoryRef::Id(food.id)).await;
    insert(
        &store,
        now(),
        -2_000,
        CategoryRef::Serialized(json!({ "$oid": food.id.to_string() })),
    )
    .await;
    insert(&store, now(), -4_000, CategoryRef::Text(rent.id.to_string())).await;
    insert(&store, now(), 50_000, CategoryRef::Id(food.id)).await;
    insert(&store, now(), -9_000, CategoryRef::Null).await;
    store.reset_counters();

    let breakdown = engine.expense_breakdown().await.unwrap();

    assert_eq!(store.counters().batch_lookups, 1);
    assert_eq!(breakdown.total, MoneyCents::new(10_000));
    assert_eq!(breakdown.entries.len(), 2);
    assert_eq!(breakdown.entries[0].name, "Food");
    assert_eq!(breakdown.entries[0].value, MoneyCents::new(6_000));
    assert_eq!(breakdown.entries[0].percentage, 60.0);
    assert_eq!(breakdown.entries[1].name, "Rent");
    assert_eq!(breakdown.entries[1].percentage, 40.0);
}

#[tokio::test]
async fn unresolvable_categories_fall_back_to_other() {
    let (engine, store) = engine_with_store(EngineConfig::default()).await;
    let food = expense_category(&store, "Food").await;
    insert(&store, now(), -1_000, CategoryRef::Id(food.id)).await;
    insert(&store, now(), -1_000, CategoryRef::Text("Legacy".to_string())).await;
    insert(&store, now(), -500, CategoryRef::Id(ObjectId::new())).await;
    insert(
        &store,
        now(),
        -500,
        CategoryRef::Serialized(json!({ "$oid": "broken" })),
    )
    .await;

    let breakdown = engine.expense_breakdown().await.unwrap();

    assert_eq!(breakdown.entries.len(), 2);
    let other = &breakdown.entries[0];
    assert_eq!(other.name, "Other");
    assert_eq!(other.icon, "💰");
    assert_eq!(other.color, "#00C49F");
    assert_eq!(other.category_id, None);
    assert_eq!(other.value, MoneyCents::new(2_000));
    assert_eq!(other.percentage, 66.67);
    assert_eq!(breakdown.entries[1].percentage, 33.33);
}

#[tokio::test]
async fn breakdown_of_no_expenses_is_empty() {
    let (engine, store) = engine_with_store(EngineConfig::default()).await;
    insert(&store, now(), 1_000, CategoryRef::Null).await;

    let breakdown = engine.expense_breakdown().await.unwrap();

    assert!(breakdown.entries.is_empty());
    assert!(breakdown.total.is_zero());
    assert_eq!(store.counters().batch_lookups, 0);
}
