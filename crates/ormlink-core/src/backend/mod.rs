//! Persistence backend interface.
//!
//! The engine never talks to storage directly. It hands a [`Backend`] the
//! entity definition plus a flat [`Row`] of persistent field values, with
//! references already reduced to the related identity.

mod memory;

pub use memory::{MemoryBackend, MemoryError};

use uuid::Uuid;

use crate::catalog::EntityDef;
use crate::error::BackendError;
use crate::query::Filter;
use crate::value::Value;

/// Column values of one stored row, in field order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<(String, Value)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Row::set`].
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Set a column, replacing any previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = value.into();
        match self.values.iter_mut().find(|(name, _)| *name == field) {
            Some((_, slot)) => *slot = value,
            None => self.values.push((field, value)),
        }
    }

    /// Value of a column.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, v)| v)
    }

    /// Columns in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, v)| (name.as_str(), v))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (field, value) in iter {
            row.set(field, value);
        }
        row
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// A row about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Identity of the instance.
    pub id: Uuid,
    /// Whether the row already exists (update) or not (insert).
    pub in_storage: bool,
    /// Persistent field values, identity included.
    pub row: Row,
}

/// Storage adapter used by a [`Session`](crate::Session).
///
/// Methods take `&self`; adapters that hold mutable state use interior
/// mutability, as [`MemoryBackend`] does.
pub trait Backend {
    /// Ensure storage for the entity exists. Must be idempotent.
    fn create(&self, entity: &EntityDef) -> Result<(), BackendError>;

    /// First row matching the filter.
    fn get(&self, entity: &EntityDef, filter: &Filter) -> Result<Option<Row>, BackendError> {
        Ok(self.find(entity, filter)?.into_iter().next())
    }

    /// All rows matching the filter.
    fn find(&self, entity: &EntityDef, filter: &Filter) -> Result<Vec<Row>, BackendError>;

    /// Insert the record if it is not stored yet, otherwise update it by identity.
    fn save(&self, entity: &EntityDef, record: &Record) -> Result<(), BackendError>;
}
