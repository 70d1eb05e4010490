//! Transaction documents.
//!
//! A `Transaction` is a signed amount on a date with free-form account and
//! payment method labels. Its category is a [`CategoryRef`] because stored
//! documents carry every historical encoding of it.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    CategoryRef, EngineError, MoneyCents, ObjectId, ResultEngine,
    category_ref::{ResolvedCategory, id_from_json},
};

pub const DEFAULT_ACCOUNT: &str = "Default";
pub const DEFAULT_METHOD: &str = "Card";

/// Values of the `category_kind` column.
pub(crate) const CATEGORY_KIND_ID: &str = "id";
pub(crate) const CATEGORY_KIND_TEXT: &str = "text";
pub(crate) const CATEGORY_KIND_SERIALIZED: &str = "serialized";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: ObjectId,
    #[serde(rename = "date")]
    pub occurred_at: DateTime<Utc>,
    pub description: String,
    pub amount: MoneyCents,
    pub account: String,
    pub method: String,
    pub category: CategoryRef,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(occurred_at: DateTime<Utc>, amount: MoneyCents, category: CategoryRef) -> Self {
        let now = Utc::now();
        Self {
            id: ObjectId::new(),
            occurred_at,
            description: String::new(),
            amount,
            account: DEFAULT_ACCOUNT.to_string(),
            method: DEFAULT_METHOD.to_string(),
            category,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }
}

/// A transaction whose category went through the read-path join.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTransaction {
    pub id: ObjectId,
    #[serde(rename = "date")]
    pub occurred_at: DateTime<Utc>,
    pub description: String,
    pub amount: MoneyCents,
    pub account: String,
    pub method: String,
    pub category: ResolvedCategory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResolvedTransaction {
    pub(crate) fn from_parts(tx: Transaction, category: ResolvedCategory) -> Self {
        Self {
            id: tx.id,
            occurred_at: tx.occurred_at,
            description: tx.description,
            amount: tx.amount,
            account: tx.account,
            method: tx.method,
            category,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

/// A transaction as found in an exported JSON dump.
///
/// Ids may be bare strings or `{"$oid": …}` wrappers, amounts are in major
/// units, and the category is kept raw for the migration to deal with.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDocument {
    #[serde(rename = "_id", default)]
    pub id: Option<Value>,
    #[serde(deserialize_with = "exported_date")]
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub category: Option<Value>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
}

/// Accepts RFC 3339 strings and `{"$date": "…"}` wrappers.
fn exported_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let raw = Value::deserialize(deserializer)?;
    let text = match &raw {
        Value::String(text) => Some(text.as_str()),
        Value::Object(fields) => fields.get("$date").and_then(Value::as_str),
        _ => None,
    };
    text.and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|date| date.with_timezone(&Utc))
        .ok_or_else(|| D::Error::custom(format!("invalid date: {raw}")))
}

impl TryFrom<TransactionDocument> for Transaction {
    type Error = EngineError;

    fn try_from(doc: TransactionDocument) -> Result<Self, Self::Error> {
        let id = match doc.id {
            None | Some(Value::Null) => ObjectId::new(),
            Some(raw) => id_from_json(&raw).ok_or_else(|| EngineError::InvalidId(raw.to_string()))?,
        };
        let mut tx = Transaction::new(
            doc.date,
            MoneyCents::from_major(doc.amount)?,
            doc.category.map(CategoryRef::from_json).unwrap_or_default(),
        );
        tx.id = id;
        tx.description = doc.description.unwrap_or_default();
        if let Some(account) = doc.account {
            tx.account = account;
        }
        if let Some(method) = doc.method {
            tx.method = method;
        }
        Ok(tx)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub occurred_at: DateTimeUtc,
    pub description: String,
    pub amount_minor: i64,
    pub account: String,
    pub method: String,
    pub category_kind: Option<String>,
    pub category_value: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Splits a category reference into its `(category_kind, category_value)`
/// columns.
pub(crate) fn category_columns(category: &CategoryRef) -> (Option<String>, Option<String>) {
    match category {
        CategoryRef::Id(id) => (Some(CATEGORY_KIND_ID.to_string()), Some(id.to_string())),
        CategoryRef::Text(text) => (Some(CATEGORY_KIND_TEXT.to_string()), Some(text.clone())),
        CategoryRef::Serialized(value) => (
            Some(CATEGORY_KIND_SERIALIZED.to_string()),
            Some(value.to_string()),
        ),
        CategoryRef::Null => (None, None),
    }
}

/// Rebuilds a category reference from its columns.
///
/// Rows that do not decode cleanly come back as [`CategoryRef::Serialized`]
/// so that reads never fail on them and the migration reports them.
pub(crate) fn category_from_columns(kind: Option<&str>, value: Option<&str>) -> CategoryRef {
    match (kind, value) {
        (None, None) => CategoryRef::Null,
        (Some(CATEGORY_KIND_ID), Some(value)) => match ObjectId::parse(value) {
            Some(id) => CategoryRef::Id(id),
            None => CategoryRef::Serialized(Value::String(value.to_string())),
        },
        (Some(CATEGORY_KIND_TEXT), Some(value)) => CategoryRef::Text(value.to_string()),
        (Some(CATEGORY_KIND_SERIALIZED), Some(value)) => CategoryRef::Serialized(
            serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string())),
        ),
        (kind, value) => CategoryRef::Serialized(serde_json::json!({
            "kind": kind,
            "value": value,
        })),
    }
}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        let (category_kind, category_value) = category_columns(&tx.category);
        Self {
            id: ActiveValue::Set(tx.id.to_string()),
            occurred_at: ActiveValue::Set(tx.occurred_at),
            description: ActiveValue::Set(tx.description.clone()),
            amount_minor: ActiveValue::Set(tx.amount.cents()),
            account: ActiveValue::Set(tx.account.clone()),
            method: ActiveValue::Set(tx.method.clone()),
            category_kind: ActiveValue::Set(category_kind),
            category_value: ActiveValue::Set(category_value),
            created_at: ActiveValue::Set(tx.created_at),
            updated_at: ActiveValue::Set(tx.updated_at),
        }
    }
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        let id = ObjectId::parse(&model.id)
            .ok_or_else(|| EngineError::Malformed(format!("transaction id {}", model.id)))?;
        Ok(Self {
            id,
            occurred_at: model.occurred_at,
            description: model.description,
            amount: MoneyCents::new(model.amount_minor),
            account: model.account,
            method: model.method,
            category: category_from_columns(
                model.category_kind.as_deref(),
                model.category_value.as_deref(),
            ),
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
