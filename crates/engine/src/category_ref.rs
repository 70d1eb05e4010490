//! The category reference carried by a transaction.
//!
//! Stored documents encode the category in one of four shapes, depending on
//! when and how they were written:
//!
//! - [`CategoryRef::Id`]: a canonical [`ObjectId`],
//! - [`CategoryRef::Text`]: a legacy free-text label,
//! - [`CategoryRef::Serialized`]: a wrapper left behind by an export/import
//!   round trip, e.g. `{"$oid": "65a1…"}` or `{"_id": "65a1…"}`,
//! - [`CategoryRef::Null`]: no category.
//!
//! [`CategoryRef::normalize`] is the single place that turns any of them into
//! a canonical id. It never fails: anything it cannot read yields `None`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{ObjectId, categories::Category};

/// Field holding the id inside an export wrapper.
pub const WRAPPER_ID_FIELD: &str = "$oid";
/// Field holding the id of an embedded entity.
pub const ENTITY_ID_FIELD: &str = "_id";

#[derive(Clone, Debug, Default, PartialEq)]
pub enum CategoryRef {
    Id(ObjectId),
    Text(String),
    /// Any non-string, non-null JSON value. Objects with a valid embedded id
    /// normalize; everything else is malformed and passes through untouched.
    Serialized(Value),
    #[default]
    Null,
}

impl CategoryRef {
    /// Classifies a raw JSON value.
    ///
    /// Strings stay [`CategoryRef::Text`] even when they look like an id: the
    /// distinction between an id and a label is the store's, not the JSON's.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::String(text) => Self::Text(text),
            other => Self::Serialized(other),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Id(id) => Value::String(id.to_string()),
            Self::Text(text) => Value::String(text.clone()),
            Self::Serialized(value) => value.clone(),
            Self::Null => Value::Null,
        }
    }

    /// Extracts the canonical id, first match wins:
    ///
    /// 1. an id is returned unchanged,
    /// 2. a wrapper whose `$oid` or `_id` field holds a valid id yields it,
    /// 3. a label that is itself a valid id (ignoring outer whitespace) yields it,
    /// 4. anything else yields `None`.
    pub fn normalize(&self) -> Option<ObjectId> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Serialized(value) => embedded_id(value),
            Self::Text(text) => ObjectId::parse(text.trim()),
            Self::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The legacy label, if this is free text.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Free function form of [`CategoryRef::normalize`].
pub fn normalize(raw: &CategoryRef) -> Option<ObjectId> {
    raw.normalize()
}

fn embedded_id(value: &Value) -> Option<ObjectId> {
    let Value::Object(fields) = value else {
        return None;
    };

    if let Some(id) = fields
        .get(WRAPPER_ID_FIELD)
        .and_then(Value::as_str)
        .and_then(ObjectId::parse)
    {
        return Some(id);
    }

    fields.get(ENTITY_ID_FIELD).and_then(id_from_json)
}

/// Reads an id written either as a bare string or as a wrapper object.
pub fn id_from_json(value: &Value) -> Option<ObjectId> {
    match value {
        Value::String(raw) => ObjectId::parse(raw),
        Value::Object(_) => embedded_id(value),
        _ => None,
    }
}

impl From<ObjectId> for CategoryRef {
    fn from(id: ObjectId) -> Self {
        Self::Id(id)
    }
}

impl Serialize for CategoryRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CategoryRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_json)
    }
}

/// Category field of a transaction after the read-path join.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResolvedCategory {
    /// The referenced category exists.
    Category(Category),
    /// A canonical id (possibly unwrapped from a serialized wrapper) whose
    /// category is missing.
    Id(ObjectId),
    /// Legacy free text, passed through.
    Text(String),
    /// Malformed encoding, passed through untouched.
    Raw(Value),
    Null,
}

impl ResolvedCategory {
    pub fn category(&self) -> Option<&Category> {
        match self {
            Self::Category(category) => Some(category),
            _ => None,
        }
    }
}
