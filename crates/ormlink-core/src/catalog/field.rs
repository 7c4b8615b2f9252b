//! Field definitions for entities.

use std::fmt;
use std::sync::Arc;

use super::types::{FieldType, ScalarType};
use crate::value::Value;

/// A field definition within an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field data type.
    pub field_type: FieldType,
    /// Whether the field is required. Unset required scalars receive their
    /// type's zero value; optional ones stay null.
    pub required: bool,
    /// Default value if not provided.
    pub default: Option<DefaultValue>,
    /// Explicit back-reference name on the related entity, for relationship fields.
    pub backref: Option<String>,
}

/// Default value for a field.
///
/// Only `Value::Null` counts as "not provided"; an explicit empty string or
/// zero is a real value and suppresses the default.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
    /// Enum variant name.
    Enum(String),
    /// Auto-generated UUID (v4).
    AutoUuid,
    /// Current timestamp (evaluated at construction).
    CurrentTimestamp,
    /// Arbitrary value producer.
    Factory(DefaultFactory),
    /// A freshly constructed instance of the referenced entity.
    NewEntity,
}

/// A shared function producing default values.
#[derive(Clone)]
pub struct DefaultFactory(Arc<dyn Fn() -> Value + Send + Sync>);

impl DefaultFactory {
    /// Wrap a value-producing function.
    pub fn new(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Produce a value.
    pub fn produce(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for DefaultFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DefaultFactory(..)")
    }
}

impl PartialEq for DefaultFactory {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
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
            backref: None,
        }
    }

    /// Create an optional field (required = false).
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: false,
            ..Self::new(name, field_type)
        }
    }

    /// Create the conventional UUID identity field with an auto-generated default.
    pub fn identity(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::scalar(ScalarType::Uuid)).with_default(DefaultValue::AutoUuid)
    }

    /// Create a to-one reference field.
    ///
    /// References are nullable; an unset reference stays null.
    pub fn reference(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::optional(name, FieldType::reference(entity))
    }

    /// Create a to-many collection field.
    pub fn collection(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::new(name, FieldType::collection(entity))
    }

    /// Set the default value.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Set a default produced by a function.
    pub fn with_default_fn(self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.with_default(DefaultValue::Factory(DefaultFactory::new(f)))
    }

    /// Set the explicit back-reference name.
    pub fn with_backref(mut self, backref: impl Into<String>) -> Self {
        self.backref = Some(backref.into());
        self
    }

    /// Check if this field has a default value.
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Check if this field relates to another entity.
    pub fn is_relation(&self) -> bool {
        self.field_type.is_relation()
    }
}
