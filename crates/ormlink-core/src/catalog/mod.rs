//! Semantic catalog for ormlink.
//!
//! The catalog holds entity, field, and relation definitions. A
//! [`SchemaBundle`] is turned into a [`Registry`] once per session, which
//! resolves the back-reference of every relationship field.

mod entity;
mod field;
mod registry;
mod relation;
mod schema;
mod types;

pub use entity::EntityDef;
pub use field::{DefaultFactory, DefaultValue, FieldDef};
pub use registry::{EntityType, EntityTypeId, Registry};
pub use relation::{Cardinality, RelationDef};
pub use schema::SchemaBundle;
pub use types::{FieldType, ScalarType};

pub(crate) use registry::literal_default;
pub(crate) use types::coerce_identity;
