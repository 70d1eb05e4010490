use std::sync::Arc;

use engine::{
    BudgetChanges, BudgetPeriod, Category, CategoryKind, Engine, EngineError, MemoryStore,
    MoneyCents, NewBudget, ObjectId, Store,
};

async fn engine_with_category() -> (Engine, Category) {
    let store = Arc::new(MemoryStore::new());
    let food = store
        .insert_category(Category::new(
            "Food".to_string(),
            CategoryKind::Expense,
            "🍔".to_string(),
            "#FFBB28".to_string(),
        ))
        .await
        .unwrap();
    let engine = Engine::builder().store(store).build().unwrap();
    (engine, food)
}

fn new_budget(category: ObjectId, cents: i64) -> NewBudget {
    NewBudget {
        category,
        limit: MoneyCents::new(cents),
        period: None,
    }
}

#[tokio::test]
async fn create_defaults_to_monthly_and_lists_oldest_first() {
    let (engine, food) = engine_with_category().await;

    let first = engine.create_budget(new_budget(food.id, 200_00)).await.unwrap();
    let second = engine.create_budget(new_budget(food.id, 0)).await.unwrap();

    assert_eq!(first.period, BudgetPeriod::Monthly);
    let ids: Vec<ObjectId> = engine
        .list_budgets()
        .await
        .unwrap()
        .into_iter()
        .map(|budget| budget.id)
        .collect();
    assert_eq!(ids, vec![first.id, second.id]);
}

#[tokio::test]
async fn create_validates_limit_and_category() {
    let (engine, food) = engine_with_category().await;

    let negative = engine
        .create_budget(new_budget(food.id, -1))
        .await
        .unwrap_err();
    assert!(matches!(negative, EngineError::InvalidAmount(_)));

    let unknown = engine
        .create_budget(new_budget(ObjectId::new(), 100))
        .await
        .unwrap_err();
    assert!(matches!(unknown, EngineError::KeyNotFound(_)));
    assert!(engine.list_budgets().await.unwrap().is_empty());
}

#[tokio::test]
async fn update_changes_only_the_given_fields() {
    let (engine, food) = engine_with_category().await;
    let budget = engine.create_budget(new_budget(food.id, 200_00)).await.unwrap();

    let updated = engine
        .update_budget(
            budget.id,
            BudgetChanges {
                limit: Some(MoneyCents::new(250_00)),
                ..BudgetChanges::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.limit, MoneyCents::new(250_00));
    assert_eq!(updated.category, food.id);
    assert!(updated.updated_at >= budget.updated_at);
    assert_eq!(engine.list_budgets().await.unwrap(), vec![updated]);

    let negative = engine
        .update_budget(
            budget.id,
            BudgetChanges {
                limit: Some(MoneyCents::new(-5)),
                ..BudgetChanges::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(negative, EngineError::InvalidAmount(_)));
}

#[tokio::test]
async fn missing_budgets_are_reported() {
    let (engine, _food) = engine_with_category().await;
    let id = ObjectId::new();

    let update = engine
        .update_budget(id, BudgetChanges::default())
        .await
        .unwrap_err();
    assert_eq!(update, EngineError::KeyNotFound(id.to_string()));
    let delete = engine.delete_budget(id).await.unwrap_err();
    assert_eq!(delete, EngineError::KeyNotFound(id.to_string()));
}
