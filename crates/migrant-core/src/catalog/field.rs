//! Field definitions for entities.

use super::types::{FieldType, ScalarType};
use serde::{Deserialize, Serialize};

/// A field definition within an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field data type.
    pub field_type: FieldType,
    /// Whether the field is required (non-nullable at the application level).
    pub required: bool,
    /// Default value if not provided.
    pub default: Option<DefaultValue>,
    /// Name this field had in the previous schema version, if it was renamed.
    pub renaming_id: Option<String>,
}

/// Default value for a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
}

impl DefaultValue {
    /// Convert the default into a stored record value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DefaultValue::Null => serde_json::Value::Null,
            DefaultValue::Bool(b) => serde_json::Value::Bool(*b),
            DefaultValue::Int(i) => serde_json::Value::from(*i),
            DefaultValue::Float(f) => serde_json::Value::from(*f),
            DefaultValue::String(s) => serde_json::Value::String(s.clone()),
            DefaultValue::Bytes(b) => serde_json::Value::String(hex::encode(b)),
        }
    }
}

impl FieldDef {
    /// Create a new required field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            default: None,
            renaming_id: None,
        }
    }

    /// Create an optional field (required = false).
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
            renaming_id: None,
        }
    }

    /// Create an optional scalar field.
    pub fn optional_scalar(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::optional(name, FieldType::OptionalScalar(scalar))
    }

    /// Set the default value.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Record the name this field had in the previous version.
    pub fn renamed_from(mut self, previous: impl Into<String>) -> Self {
        self.renaming_id = Some(previous.into());
        self
    }

    /// Check if this field has a default value.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Check if a record may omit this field.
    pub fn may_be_absent(&self) -> bool {
        !self.required || self.field_type.is_optional() || self.has_default()
    }

    /// The name to look for in the previous version of the schema.
    pub fn source_name(&self) -> &str {
        self.renaming_id.as_deref().unwrap_or(&self.name)
    }
}
