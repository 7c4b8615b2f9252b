//! Core type definitions for the catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

/// Scalar data types supported by ormlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
    /// Timestamp (UTC). Numbers are read as seconds since the Unix epoch.
    Timestamp,
    /// UUID (128-bit identifier).
    Uuid,
}

/// Field types.
///
/// `Reference` and `Collection` are the relationship-bearing kinds; every other
/// kind is a plain column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// A scalar value.
    Scalar(ScalarType),
    /// An enumeration type, stored as the variant name.
    Enum {
        /// Name of the enum type.
        name: String,
        /// Allowed variant values.
        variants: Vec<String>,
    },
    /// A to-one reference to another entity.
    Reference {
        /// Name of the referenced entity type.
        entity: String,
    },
    /// A to-many collection of another entity.
    Collection {
        /// Name of the member entity type.
        entity: String,
    },
}

impl ScalarType {
    /// The zero value used when a required field is left unset.
    ///
    /// Only plain primitives have one; timestamps and UUIDs stay null.
    pub fn zero_value(&self) -> Value {
        match self {
            ScalarType::Bool => Value::Bool(false),
            ScalarType::Int64 => Value::Int(0),
            ScalarType::Float64 => Value::Float(0.0),
            ScalarType::String => Value::String(String::new()),
            ScalarType::Timestamp | ScalarType::Uuid => Value::Null,
        }
    }

    /// Convert a value into this type.
    ///
    /// Returns `None` when the value cannot be represented.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        if value.is_null() {
            return Some(Value::Null);
        }

        match (self, value) {
            (ScalarType::Bool, Value::Bool(b)) => Some(Value::Bool(b)),
            (ScalarType::Bool, Value::Int(i)) => Some(Value::Bool(i != 0)),
            (ScalarType::Bool, Value::String(s)) => match s.trim() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },

            (ScalarType::Int64, Value::Int(i)) => Some(Value::Int(i)),
            (ScalarType::Int64, Value::Float(f)) if f.is_finite() => {
                Some(Value::Int(f.trunc() as i64))
            }
            (ScalarType::Int64, Value::Bool(b)) => Some(Value::Int(b as i64)),
            (ScalarType::Int64, Value::String(s)) => s.trim().parse().ok().map(Value::Int),

            (ScalarType::Float64, Value::Float(f)) => Some(Value::Float(f)),
            (ScalarType::Float64, Value::Int(i)) => Some(Value::Float(i as f64)),
            (ScalarType::Float64, Value::Bool(b)) => Some(Value::Float(b as i64 as f64)),
            (ScalarType::Float64, Value::String(s)) => s.trim().parse().ok().map(Value::Float),

            (ScalarType::String, Value::String(s)) => Some(Value::String(s)),
            (ScalarType::String, Value::Ref(_)) => None,
            (ScalarType::String, other) => Some(Value::String(other.to_string())),

            (ScalarType::Timestamp, Value::Timestamp(t)) => Some(Value::Timestamp(t)),
            (ScalarType::Timestamp, Value::Int(secs)) => {
                DateTime::from_timestamp(secs, 0).map(Value::Timestamp)
            }
            (ScalarType::Timestamp, Value::Float(secs)) => {
                timestamp_from_secs(secs).map(Value::Timestamp)
            }
            (ScalarType::Timestamp, Value::String(s)) => DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|t| Value::Timestamp(t.with_timezone(&Utc))),

            (ScalarType::Uuid, Value::Uuid(u)) => Some(Value::Uuid(u)),
            (ScalarType::Uuid, Value::String(s)) => Uuid::parse_str(s.trim()).ok().map(Value::Uuid),

            _ => None,
        }
    }
}

/// Convert fractional seconds since the epoch into a timestamp.
fn timestamp_from_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

/// Interpret a value as an entity identity.
pub(crate) fn coerce_identity(value: &Value) -> Option<Uuid> {
    match value {
        Value::Uuid(u) => Some(*u),
        Value::String(s) => Uuid::parse_str(s.trim()).ok(),
        _ => None,
    }
}

impl FieldType {
    /// Create a scalar field type.
    pub fn scalar(scalar: ScalarType) -> Self {
        FieldType::Scalar(scalar)
    }

    /// Create an enum field type.
    pub fn enum_type(name: impl Into<String>, variants: Vec<String>) -> Self {
        FieldType::Enum {
            name: name.into(),
            variants,
        }
    }

    /// Create a to-one reference field type.
    pub fn reference(entity: impl Into<String>) -> Self {
        FieldType::Reference {
            entity: entity.into(),
        }
    }

    /// Create a to-many collection field type.
    pub fn collection(entity: impl Into<String>) -> Self {
        FieldType::Collection {
            entity: entity.into(),
        }
    }

    /// Check if this type relates to another entity.
    pub fn is_relation(&self) -> bool {
        matches!(
            self,
            FieldType::Reference { .. } | FieldType::Collection { .. }
        )
    }

    /// Check if this is a to-one reference.
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Reference { .. })
    }

    /// Check if this is a to-many collection.
    pub fn is_collection(&self) -> bool {
        matches!(self, FieldType::Collection { .. })
    }

    /// Whether the field has a column in storage. Collections do not.
    pub fn is_persistent(&self) -> bool {
        !self.is_collection()
    }

    /// The related entity name for relationship fields.
    pub fn related_entity(&self) -> Option<&str> {
        match self {
            FieldType::Reference { entity } | FieldType::Collection { entity } => Some(entity),
            _ => None,
        }
    }

    /// Get the inner scalar type if this is a scalar field.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            FieldType::Scalar(s) => Some(*s),
            _ => None,
        }
    }

    /// The zero value for a required field of this type.
    pub fn zero_value(&self) -> Value {
        match self {
            FieldType::Scalar(s) => s.zero_value(),
            _ => Value::Null,
        }
    }

    /// Convert a value into this type.
    ///
    /// Reference values are normalised to an identity (`Uuid`) unless they
    /// already are a live handle; the session checks the handle's entity type.
    /// Collections accept nothing.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match self {
            FieldType::Scalar(s) => s.coerce(value),
            FieldType::Enum { variants, .. } => match value {
                Value::Null => Some(Value::Null),
                Value::String(s) if variants.iter().any(|v| *v == s) => Some(Value::String(s)),
                _ => None,
            },
            FieldType::Reference { .. } => match value {
                Value::Null => Some(Value::Null),
                Value::Ref(r) => Some(Value::Ref(r)),
                other => coerce_identity(&other).map(Value::Uuid),
            },
            FieldType::Collection { .. } => None,
        }
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            FieldType::Scalar(s) => format!("{s:?}").to_lowercase(),
            FieldType::Enum { name, .. } => format!("enum {name}"),
            FieldType::Reference { entity } => format!("reference to {entity}"),
            FieldType::Collection { entity } => format!("collection of {entity}"),
        }
    }
}
