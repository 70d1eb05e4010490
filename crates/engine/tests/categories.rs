use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use engine::{
    CategoryKind, CategoryRef, Engine, EngineError, MemoryStore, MoneyCents, NewBudget,
    NewCategory, Store, Transaction,
};

async fn engine_with_store() -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::builder().store(store.clone()).build().unwrap();
    (engine, store)
}

fn new_category(name: &str, kind: CategoryKind) -> NewCategory {
    NewCategory {
        name: name.to_string(),
        kind,
        icon: None,
        color: None,
    }
}

#[tokio::test]
async fn create_fills_defaults_and_trims() {
    let (engine, _store) = engine_with_store().await;

    let created = engine
        .create_category(new_category("  Salary ", CategoryKind::Income))
        .await
        .unwrap();

    assert_eq!(created.name, "Salary");
    assert_eq!(created.icon, "💰");
    assert_eq!(created.color, "#00C49F");
}

#[tokio::test]
async fn create_rejects_blank_and_duplicate_names() {
    let (engine, _store) = engine_with_store().await;
    engine
        .create_category(new_category("Food", CategoryKind::Expense))
        .await
        .unwrap();

    let blank = engine
        .create_category(new_category("   ", CategoryKind::Expense))
        .await
        .unwrap_err();
    assert!(matches!(blank, EngineError::InvalidName(_)));

    let duplicate = engine
        .create_category(new_category("food", CategoryKind::Expense))
        .await
        .unwrap_err();
    assert!(matches!(duplicate, EngineError::ExistingKey(_)));

    // Same name, other kind.
    engine
        .create_category(new_category("Food", CategoryKind::Income))
        .await
        .unwrap();
}

#[tokio::test]
async fn list_orders_by_kind_then_name() {
    let (engine, _store) = engine_with_store().await;
    for (name, kind) in [
        ("Rent", CategoryKind::Expense),
        ("salary", CategoryKind::Income),
        ("Bonus", CategoryKind::Income),
        ("food", CategoryKind::Expense),
    ] {
        engine.create_category(new_category(name, kind)).await.unwrap();
    }

    let names: Vec<String> = engine
        .list_categories()
        .await
        .unwrap()
        .into_iter()
        .map(|category| category.name)
        .collect();

    assert_eq!(names, vec!["Bonus", "salary", "food", "Rent"]);
}

#[tokio::test]
async fn referenced_category_cannot_be_deleted() {
    let (engine, store) = engine_with_store().await;
    let food = engine
        .create_category(new_category("Food", CategoryKind::Expense))
        .await
        .unwrap();
    let tx = Transaction::new(Utc::now(), MoneyCents::new(-100), CategoryRef::Id(food.id));
    let tx_id = tx.id;
    store.insert_transaction(tx).await.unwrap();

    assert!(engine.category_in_use(food.id).await.unwrap());
    let err = engine.delete_category(food.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InUse(_)));

    engine.assign_category(tx_id, None).await.unwrap();
    engine.delete_category(food.id).await.unwrap();
    let again = engine.delete_category(food.id).await.unwrap_err();
    assert!(matches!(again, EngineError::KeyNotFound(_)));
}

#[tokio::test]
async fn legacy_reference_shapes_keep_a_category_in_use() {
    let (engine, store) = engine_with_store().await;
    let rent = engine
        .create_category(new_category("Rent", CategoryKind::Expense))
        .await
        .unwrap();
    let wrapped = Transaction::new(
        Utc::now(),
        MoneyCents::new(-90_000),
        CategoryRef::Serialized(json!({ "$oid": rent.id.to_string() })),
    );
    let wrapped_id = wrapped.id;
    store.insert_transaction(wrapped).await.unwrap();

    let resolved = engine
        .resolve_batch(vec![store.transaction(wrapped_id).await.unwrap()])
        .await
        .unwrap();
    assert_eq!(
        resolved[0].category.category().map(|c| c.name.as_str()),
        Some("Rent")
    );
    assert!(engine.category_in_use(rent.id).await.unwrap());
    let err = engine.delete_category(rent.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InUse(_)));

    engine.assign_category(wrapped_id, None).await.unwrap();
    let labelled = Transaction::new(
        Utc::now(),
        MoneyCents::new(-90_000),
        CategoryRef::Text(format!(" {} ", rent.id.to_string().to_uppercase())),
    );
    store.insert_transaction(labelled).await.unwrap();
    assert!(engine.category_in_use(rent.id).await.unwrap());
}

#[tokio::test]
async fn budgeted_category_cannot_be_deleted() {
    let (engine, _store) = engine_with_store().await;
    let food = engine
        .create_category(new_category("Food", CategoryKind::Expense))
        .await
        .unwrap();
    let budget = engine
        .create_budget(NewBudget {
            category: food.id,
            limit: MoneyCents::new(300_00),
            period: None,
        })
        .await
        .unwrap();

    let err = engine.delete_category(food.id).await.unwrap_err();
    assert!(matches!(err, EngineError::InUse(_)));

    engine.delete_budget(budget.id).await.unwrap();
    engine.delete_category(food.id).await.unwrap();
}

#[tokio::test]
async fn assign_accepts_ids_and_names() {
    let (engine, store) = engine_with_store().await;
    let gifts_income = engine
        .create_category(new_category("Gifts", CategoryKind::Income))
        .await
        .unwrap();
    let gifts_expense = engine
        .create_category(new_category("Gifts", CategoryKind::Expense))
        .await
        .unwrap();
    let tx = Transaction::new(Utc::now(), MoneyCents::new(-100), CategoryRef::Null);
    let tx_id = tx.id;
    store.insert_transaction(tx).await.unwrap();

    engine.assign_category(tx_id, Some(" gifts ")).await.unwrap();
    assert_eq!(
        store.transaction(tx_id).await.unwrap().category,
        CategoryRef::Id(gifts_expense.id)
    );

    let income_id = gifts_income.id.to_string();
    engine.assign_category(tx_id, Some(&income_id)).await.unwrap();
    assert_eq!(
        store.transaction(tx_id).await.unwrap().category,
        CategoryRef::Id(gifts_income.id)
    );

    let missing = engine
        .assign_category(tx_id, Some("Unknown"))
        .await
        .unwrap_err();
    assert!(matches!(missing, EngineError::KeyNotFound(_)));
}

#[tokio::test]
async fn search_matches_substrings() {
    let (engine, _store) = engine_with_store().await;
    engine
        .create_category(new_category("Eating out", CategoryKind::Expense))
        .await
        .unwrap();
    engine
        .create_category(new_category("Rent", CategoryKind::Expense))
        .await
        .unwrap();

    let found = engine.search_categories("EAT").await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Eating out");
}
