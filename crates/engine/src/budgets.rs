//! Spending limits attached to a category.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{EngineError, MoneyCents, ObjectId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    #[default]
    Monthly,
}

impl BudgetPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
        }
    }
}

impl TryFrom<&str> for BudgetPeriod {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            other => Err(EngineError::InvalidPeriod(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: ObjectId,
    /// Always a canonical category id.
    pub category: ObjectId,
    /// Never negative.
    pub limit: MoneyCents,
    pub period: BudgetPeriod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    pub fn new(category: ObjectId, limit: MoneyCents, period: BudgetPeriod) -> Self {
        let now = Utc::now();
        Self {
            id: ObjectId::new(),
            category,
            limit,
            period,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NewBudget {
    pub category: ObjectId,
    pub limit: MoneyCents,
    #[serde(default)]
    pub period: Option<BudgetPeriod>,
}

/// Partial update; `None` fields keep their current value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct BudgetChanges {
    #[serde(default)]
    pub category: Option<ObjectId>,
    #[serde(default)]
    pub limit: Option<MoneyCents>,
    #[serde(default)]
    pub period: Option<BudgetPeriod>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "budgets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub category_id: String,
    pub limit_minor: i64,
    pub period: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Budget> for ActiveModel {
    fn from(budget: &Budget) -> Self {
        Self {
            id: ActiveValue::Set(budget.id.to_string()),
            category_id: ActiveValue::Set(budget.category.to_string()),
            limit_minor: ActiveValue::Set(budget.limit.cents()),
            period: ActiveValue::Set(budget.period.as_str().to_string()),
            created_at: ActiveValue::Set(budget.created_at),
            updated_at: ActiveValue::Set(budget.updated_at),
        }
    }
}

impl TryFrom<Model> for Budget {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let parse = |raw: &str| {
            ObjectId::parse(raw).ok_or_else(|| EngineError::Malformed(format!("budget id {raw}")))
        };
        Ok(Self {
            id: parse(&model.id)?,
            category: parse(&model.category_id)?,
            limit: MoneyCents::new(model.limit_minor),
            period: BudgetPeriod::try_from(model.period.as_str())
                .map_err(|err| EngineError::Malformed(err.to_string()))?,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
