//! ormlink core - relationship resolution, identity cache, and cascading
//! persistence.
//!
//! A [`SchemaBundle`] declares entity types whose relationship fields are
//! declared from at least one side. [`Session::open`] resolves the inverse of
//! every relationship once, then keeps both sides consistent on every
//! mutation and persists whole graphs through a [`Backend`].

pub mod backend;
pub mod catalog;
pub mod config;
pub mod entity;
pub mod error;
pub mod query;
pub mod session;
pub mod value;

pub use backend::{Backend, MemoryBackend, MemoryError, Record, Row};
pub use catalog::{
    Cardinality, DefaultFactory, DefaultValue, EntityDef, EntityType, EntityTypeId, FieldDef,
    FieldType, RelationDef, Registry, ScalarType, SchemaBundle,
};
pub use config::{SessionConfig, DEFAULT_MAX_CASCADE_DEPTH};
pub use entity::{Collection, Entity, EntityRef, IdentityCache};
pub use error::{BackendError, BackendOperation, CascadeError, Error};
pub use query::{Filter, FilterEvaluator, FilterExpr};
pub use session::{CascadeResult, Session};
pub use value::Value;
