//! In-memory backend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use super::{Backend, Record, Row};
use crate::catalog::EntityDef;
use crate::error::BackendError;
use crate::query::{Filter, FilterEvaluator};
use crate::value::Value;

/// Errors raised by [`MemoryBackend`].
#[derive(Debug, Error)]
pub enum MemoryError {
    /// No table was created for the entity.
    #[error("table `{0}` does not exist")]
    MissingTable(String),

    /// Insert of an identity already stored.
    #[error("row {id} already exists in `{table}`")]
    DuplicateRow {
        /// Table name.
        table: String,
        /// Row identity.
        id: Uuid,
    },

    /// Update of a row that does not exist.
    #[error("row {id} not found in `{table}`")]
    MissingRow {
        /// Table name.
        table: String,
        /// Row identity.
        id: Uuid,
    },
}

type Tables = HashMap<String, Vec<Row>>;

/// Backend keeping rows in shared in-memory tables.
///
/// Clones share the same tables, so a second session opened over a clone sees
/// everything the first one saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored for an entity.
    pub fn row_count(&self, entity: &str) -> usize {
        self.tables
            .read()
            .get(&entity.to_lowercase())
            .map_or(0, Vec::len)
    }

    /// Copy of every row stored for an entity.
    pub fn rows(&self, entity: &str) -> Vec<Row> {
        self.tables
            .read()
            .get(&entity.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}

fn row_id(row: &Row, identity: &str) -> Option<Uuid> {
    match row.get(identity) {
        Some(Value::Uuid(id)) => Some(*id),
        _ => None,
    }
}

impl Backend for MemoryBackend {
    fn create(&self, entity: &EntityDef) -> Result<(), BackendError> {
        self.tables.write().entry(entity.table_name()).or_default();
        Ok(())
    }

    fn find(&self, entity: &EntityDef, filter: &Filter) -> Result<Vec<Row>, BackendError> {
        let table = entity.table_name();
        let tables = self.tables.read();
        let rows = tables
            .get(&table)
            .ok_or_else(|| MemoryError::MissingTable(table.clone()))?;

        let mut matches = Vec::new();
        for row in rows {
            if FilterEvaluator::evaluate(filter, row)? {
                matches.push(row.clone());
            }
        }
        Ok(matches)
    }

    fn save(&self, entity: &EntityDef, record: &Record) -> Result<(), BackendError> {
        let table = entity.table_name();
        let mut tables = self.tables.write();
        let rows = tables
            .get_mut(&table)
            .ok_or_else(|| MemoryError::MissingTable(table.clone()))?;

        let existing = rows
            .iter()
            .position(|row| row_id(row, &entity.identity_field) == Some(record.id));

        match (record.in_storage, existing) {
            (false, None) => rows.push(record.row.clone()),
            (false, Some(_)) => {
                return Err(MemoryError::DuplicateRow {
                    table,
                    id: record.id,
                }
                .into())
            }
            (true, Some(pos)) => rows[pos] = record.row.clone(),
            (true, None) => {
                return Err(MemoryError::MissingRow {
                    table,
                    id: record.id,
                }
                .into())
            }
        }

        tracing::trace!(table = %table, id = %record.id, "Row written");
        Ok(())
    }
}
