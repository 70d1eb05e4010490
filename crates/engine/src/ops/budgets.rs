use chrono::Utc;
use tracing::info;

use crate::{Budget, BudgetChanges, EngineError, MoneyCents, NewBudget, ObjectId, ResultEngine};

use super::Engine;

fn ensure_limit(limit: MoneyCents) -> ResultEngine<MoneyCents> {
    if limit < MoneyCents::ZERO {
        return Err(EngineError::InvalidAmount(format!(
            "budget limit must not be negative: {limit}"
        )));
    }
    Ok(limit)
}

impl Engine {
    /// Budgets, oldest first.
    pub async fn list_budgets(&self) -> ResultEngine<Vec<Budget>> {
        self.store.list_budgets().await
    }

    /// The referenced category must exist.
    pub async fn create_budget(&self, input: NewBudget) -> ResultEngine<Budget> {
        let limit = ensure_limit(input.limit)?;
        self.ensure_category(input.category).await?;
        let budget = Budget::new(input.category, limit, input.period.unwrap_or_default());
        let created = self.store.insert_budget(budget).await?;
        info!(id = %created.id, category = %created.category, "budget created");
        Ok(created)
    }

    pub async fn update_budget(&self, id: ObjectId, changes: BudgetChanges) -> ResultEngine<Budget> {
        let mut budget = self
            .store
            .budget(id)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(id.to_string()))?;
        if let Some(category) = changes.category {
            self.ensure_category(category).await?;
            budget.category = category;
        }
        if let Some(limit) = changes.limit {
            budget.limit = ensure_limit(limit)?;
        }
        if let Some(period) = changes.period {
            budget.period = period;
        }
        budget.updated_at = Utc::now();

        if !self.store.replace_budget(&budget).await? {
            return Err(EngineError::KeyNotFound(id.to_string()));
        }
        Ok(budget)
    }

    pub async fn delete_budget(&self, id: ObjectId) -> ResultEngine<()> {
        if !self.store.delete_budget(id).await? {
            return Err(EngineError::KeyNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn ensure_category(&self, id: ObjectId) -> ResultEngine<()> {
        match self.store.category(id).await? {
            Some(_) => Ok(()),
            None => Err(EngineError::KeyNotFound(id.to_string())),
        }
    }
}
