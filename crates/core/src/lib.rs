pub mod error;
pub mod field_value;
pub mod ids;
pub mod schema;
pub mod time;

pub use error::CoreError;
pub use field_value::{FieldMap, FieldValue, LayoutValue};
pub use ids::*;
pub use schema::{
    FieldDescriptor, FieldGroup, FieldType, LayoutDescriptor, SchemaRegistry, TextFormat,
};
