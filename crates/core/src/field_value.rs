use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::{AttachmentId, EntityId, TermId, UserId};

/// Sub-field values inside a composite, keyed by sub-field name.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// One entry of a multi-layout container: the layout discriminator plus the
/// sub-field values for that layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutValue {
    pub layout: String,
    pub fields: FieldMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    TextList(Vec<String>),
    Attachment(AttachmentId),
    Attachments(Vec<AttachmentId>),
    EntityRef(EntityId),
    EntityRefs(Vec<EntityId>),
    Terms(Vec<TermId>),
    Users(Vec<UserId>),
    Rows(Vec<FieldMap>),
    Group(FieldMap),
    Layouts(Vec<LayoutValue>),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b).is_eq(),
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::TextList(a), Self::TextList(b)) => a == b,
            (Self::Attachment(a), Self::Attachment(b)) => a == b,
            (Self::Attachments(a), Self::Attachments(b)) => a == b,
            (Self::EntityRef(a), Self::EntityRef(b)) => a == b,
            (Self::EntityRefs(a), Self::EntityRefs(b)) => a == b,
            (Self::Terms(a), Self::Terms(b)) => a == b,
            (Self::Users(a), Self::Users(b)) => a == b,
            (Self::Rows(a), Self::Rows(b)) => a == b,
            (Self::Group(a), Self::Group(b)) => a == b,
            (Self::Layouts(a), Self::Layouts(b)) => a == b,
            _ => false,
        }
    }
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Emptiness as seen by required-field validation: null, empty text,
    /// empty list, empty map, zero rows or layout entries.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::TextList(v) => v.is_empty(),
            FieldValue::Attachments(v) => v.is_empty(),
            FieldValue::EntityRefs(v) => v.is_empty(),
            FieldValue::Terms(v) => v.is_empty(),
            FieldValue::Users(v) => v.is_empty(),
            FieldValue::Rows(v) => v.is_empty(),
            FieldValue::Group(m) => m.is_empty(),
            FieldValue::Layouts(v) => v.is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}
