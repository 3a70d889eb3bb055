//! Core type definitions for the catalog.

use serde::{Deserialize, Serialize};

/// Scalar data types a field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
    /// Binary data.
    Bytes,
    /// Timestamp (microseconds since Unix epoch).
    Timestamp,
    /// UUID (128-bit identifier).
    Uuid,
}

/// Field types.
///
/// References point at another entity of the same schema and hold the
/// referenced record's identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// A scalar value.
    Scalar(ScalarType),
    /// An optional scalar value (nullable).
    OptionalScalar(ScalarType),
    /// A to-one reference to another entity.
    Reference {
        /// Name of the referenced entity.
        entity: String,
    },
    /// An optional to-one reference.
    OptionalReference {
        /// Name of the referenced entity.
        entity: String,
    },
}

impl ScalarType {
    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarType::Int32 | ScalarType::Int64 | ScalarType::Float32 | ScalarType::Float64
        )
    }

    /// Stable name used when fingerprinting a schema.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Float32 => "float32",
            ScalarType::Float64 => "float64",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
            ScalarType::Timestamp => "timestamp",
            ScalarType::Uuid => "uuid",
        }
    }
}

impl FieldType {
    /// Create a scalar field type.
    pub fn scalar(scalar: ScalarType) -> Self {
        FieldType::Scalar(scalar)
    }

    /// Create an optional scalar field type.
    pub fn optional_scalar(scalar: ScalarType) -> Self {
        FieldType::OptionalScalar(scalar)
    }

    /// Create a reference field type.
    pub fn reference(entity: impl Into<String>) -> Self {
        FieldType::Reference {
            entity: entity.into(),
        }
    }

    /// Create an optional reference field type.
    pub fn optional_reference(entity: impl Into<String>) -> Self {
        FieldType::OptionalReference {
            entity: entity.into(),
        }
    }

    /// Check if this type accepts a missing value.
    pub fn is_optional(&self) -> bool {
        matches!(
            self,
            FieldType::OptionalScalar(_) | FieldType::OptionalReference { .. }
        )
    }

    /// The scalar type, if this is a scalar field.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            FieldType::Scalar(s) | FieldType::OptionalScalar(s) => Some(*s),
            _ => None,
        }
    }

    /// Canonical textual form used when fingerprinting a schema.
    pub fn fingerprint(&self) -> String {
        match self {
            FieldType::Scalar(s) => s.as_str().to_string(),
            FieldType::OptionalScalar(s) => format!("{}?", s.as_str()),
            FieldType::Reference { entity } => format!("ref<{entity}>"),
            FieldType::OptionalReference { entity } => format!("ref<{entity}>?"),
        }
    }

    /// Check whether values of `self` can be carried into `to` without a
    /// custom mapping.
    ///
    /// Identical types, making a scalar optional and numeric widening are
    /// allowed. Everything else needs an explicit mapping.
    pub fn converts_losslessly_to(&self, to: &FieldType) -> bool {
        if self == to {
            return true;
        }

        match (self, to) {
            (FieldType::Scalar(s1), FieldType::OptionalScalar(s2)) if s1 == s2 => true,
            (FieldType::Reference { entity: e1 }, FieldType::OptionalReference { entity: e2 }) => {
                e1 == e2
            }
            (FieldType::Scalar(from), FieldType::Scalar(to))
            | (FieldType::OptionalScalar(from), FieldType::OptionalScalar(to))
            | (FieldType::Scalar(from), FieldType::OptionalScalar(to)) => {
                scalar_widens(*from, *to)
            }
            _ => false,
        }
    }
}

fn scalar_widens(from: ScalarType, to: ScalarType) -> bool {
    matches!(
        (from, to),
        (ScalarType::Int32, ScalarType::Int64)
            | (ScalarType::Float32, ScalarType::Float64)
            | (ScalarType::Int32, ScalarType::Float64)
            | (ScalarType::Int64, ScalarType::Float64)
    )
}
