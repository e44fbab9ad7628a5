use serde::{Deserialize, Serialize};

/// An ordered group of field descriptors within a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldGroup {
    pub key: String,
    pub title: String,
    pub fields: Vec<FieldDescriptor>,
}

/// A single field definition. `key` is globally unique and is the value
/// store's row key; `name` keys sub-field maps inside composite values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub key: String,
    pub name: String,
    pub label: String,
    pub required: bool,
    pub field_type: FieldType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextFormat {
    Plain,
    Email,
    Url,
}

/// One layout variant of a multi-layout container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutDescriptor {
    pub name: String,
    pub label: String,
    pub fields: Vec<FieldDescriptor>,
}

/// Closed field-type enumeration. Composite variants carry their own
/// sub-descriptors so traversal is structural rather than key-driven.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldType {
    Text { format: TextFormat },
    Number { min: Option<f64>, max: Option<f64> },
    Boolean,
    Choice { options: Vec<String>, multiple: bool },
    Attachment { multiple: bool },
    Repeater { fields: Vec<FieldDescriptor> },
    Group { fields: Vec<FieldDescriptor> },
    LayoutContainer { layouts: Vec<LayoutDescriptor> },
    EntityRef { multiple: bool },
    TermRef { taxonomy: String },
    UserRef { multiple: bool },
    Presentation,
}

impl FieldType {
    /// Stable type tag used in backup snapshots and conflict reports.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Number { .. } => "number",
            Self::Boolean => "boolean",
            Self::Choice { .. } => "choice",
            Self::Attachment { .. } => "attachment",
            Self::Repeater { .. } => "repeater",
            Self::Group { .. } => "group",
            Self::LayoutContainer { .. } => "layout_container",
            Self::EntityRef { .. } => "entity_ref",
            Self::TermRef { .. } => "term_ref",
            Self::UserRef { .. } => "user_ref",
            Self::Presentation => "presentation",
        }
    }

    pub fn is_cloneable(&self) -> bool {
        !matches!(self, Self::Presentation)
    }

    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            Self::Repeater { .. } | Self::Group { .. } | Self::LayoutContainer { .. }
        )
    }
}

/// Find a sub-field descriptor by its name within a composite's field list.
pub fn find_field<'a>(fields: &'a [FieldDescriptor], name: &str) -> Option<&'a FieldDescriptor> {
    fields.iter().find(|f| f.name == name)
}

/// The field-group registry the engine reads from. Owned by the host; an
/// unknown schema yields no groups.
pub trait SchemaRegistry {
    fn field_groups(&self, schema: &str) -> Vec<FieldGroup>;
}
