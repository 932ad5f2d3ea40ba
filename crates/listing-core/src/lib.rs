use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

mod field;

pub use field::FieldType;

/// Fields fetched for every feature row.
pub const FEATURE_FIELDS: [&str; 5] = [
    "id",
    "parent_category",
    "category",
    "text_items",
    "display_text",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid entity id: {0}")]
    InvalidEntityId(String),
    #[error("invalid field type '{0}'")]
    InvalidFieldType(String),
}

/// Server-assigned identity of a persisted listing. Zero is never a valid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct EntityId(u64);

impl EntityId {
    pub fn new(value: u64) -> Option<Self> {
        (value != 0).then_some(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for EntityId {
    type Error = CoreError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| CoreError::InvalidEntityId(value.to_string()))
    }
}

impl From<EntityId> for u64 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl FromStr for EntityId {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        trimmed
            .parse::<u64>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| CoreError::InvalidEntityId(trimmed.to_owned()))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type RowId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-listing bus channel, e.g. `estate_property_42`.
pub fn channel_name_for(prefix: &str, id: EntityId) -> ChannelName {
    ChannelName(format!("{prefix}_{id}"))
}

/// One feature record as returned by the query service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRow {
    pub id: RowId,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub parent_category: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub category: Option<String>,
    #[serde(
        rename = "text_items",
        default,
        deserialize_with = "deserialize_optional_text"
    )]
    pub structured_items: Option<String>,
    #[serde(
        rename = "display_text",
        default,
        deserialize_with = "deserialize_optional_text"
    )]
    pub rendered_text: Option<String>,
}

impl AttributeRow {
    pub fn new(id: RowId) -> Self {
        Self {
            id,
            parent_category: None,
            category: None,
            structured_items: None,
            rendered_text: None,
        }
    }

    pub fn from_record(record: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(record)
    }

    pub fn with_categories(mut self, parent: &str, category: &str) -> Self {
        self.parent_category = Some(parent.to_owned());
        self.category = Some(category.to_owned());
        self
    }

    pub fn with_structured_items(mut self, raw: &str) -> Self {
        self.structured_items = Some(raw.to_owned());
        self
    }

    pub fn with_rendered_text(mut self, markup: &str) -> Self {
        self.rendered_text = Some(markup.to_owned());
        self
    }

    pub fn parent_category_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.parent_category.as_deref().unwrap_or(fallback)
    }

    pub fn category_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.category.as_deref().unwrap_or(fallback)
    }
}

/// Bus payload announcing that something about a listing changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub id: EntityId,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_model: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub model: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub event: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotificationPayload {
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    pub fn concerns(&self, entity: Option<EntityId>) -> bool {
        entity == Some(self.id)
    }

    /// Model that triggered the notification; older senders use `model`.
    pub fn origin(&self) -> Option<&str> {
        self.source_model.as_deref().or(self.model.as_deref())
    }
}

// The server encodes empty text fields as `false`; other non-text values are dropped too.
fn deserialize_optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) if !text.is_empty() => Some(text),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn entity_id_rejects_zero() {
        assert_eq!(EntityId::new(0), None);
        assert_eq!(EntityId::new(7).map(EntityId::get), Some(7));
        assert!("0".parse::<EntityId>().is_err());
        assert!("abc".parse::<EntityId>().is_err());
        assert_eq!(" 42 ".parse::<EntityId>().map(EntityId::get), Ok(42));
    }

    #[test]
    fn channel_name_joins_prefix_and_decimal_id() {
        let id = EntityId::new(42).expect("id");
        assert_eq!(
            channel_name_for("estate_property", id).as_str(),
            "estate_property_42"
        );
        assert_ne!(
            channel_name_for("estate_property", id),
            channel_name_for("estate_agent", id)
        );
    }

    #[test]
    fn attribute_row_decodes_false_as_absent() {
        let record = json!({
            "id": 3,
            "parent_category": false,
            "category": "",
            "text_items": "[\"Garage\"]",
            "display_text": false,
        });

        let row = AttributeRow::from_record(&record).expect("decode row");

        assert_eq!(row.id, 3);
        assert_eq!(row.parent_category, None);
        assert_eq!(row.category, None);
        assert_eq!(row.structured_items.as_deref(), Some("[\"Garage\"]"));
        assert_eq!(row.rendered_text, None);
        assert_eq!(row.parent_category_or("Other"), "Other");
        assert_eq!(row.category_or("Details"), "Details");
    }

    #[test]
    fn attribute_row_without_id_is_rejected() {
        assert!(AttributeRow::from_record(&json!({ "category": "Heating" })).is_err());
    }

    #[test]
    fn payload_keeps_unknown_fields_and_prefers_source_model() {
        let payload = NotificationPayload::from_value(&json!({
            "id": 9,
            "model": "real_estate.listing",
            "source_model": "real_estate.feature",
            "event": "write",
            "changed": ["price"],
        }))
        .expect("decode payload");

        assert_eq!(payload.id.get(), 9);
        assert_eq!(payload.origin(), Some("real_estate.feature"));
        assert_eq!(payload.event.as_deref(), Some("write"));
        assert!(payload.extra.contains_key("changed"));
        assert!(payload.concerns(EntityId::new(9)));
        assert!(!payload.concerns(EntityId::new(10)));
        assert!(!payload.concerns(None));
    }

    #[test]
    fn payload_tolerates_false_and_non_text_optional_fields() {
        let payload = NotificationPayload::from_value(&json!({
            "id": 4,
            "source_model": false,
            "model": null,
            "event": 3,
        }))
        .expect("decode payload");

        assert_eq!(payload.id.get(), 4);
        assert_eq!(payload.source_model, None);
        assert_eq!(payload.model, None);
        assert_eq!(payload.event, None);
        assert_eq!(payload.origin(), None);
        assert!(payload.concerns(EntityId::new(4)));
    }

    #[test]
    fn payload_without_usable_id_is_rejected() {
        assert!(NotificationPayload::from_value(&json!({ "event": "write" })).is_err());
        assert!(NotificationPayload::from_value(&json!({ "id": 0 })).is_err());
        assert!(NotificationPayload::from_value(&json!({ "id": "9" })).is_err());
        assert!(NotificationPayload::from_value(&json!(null)).is_err());
    }
}
