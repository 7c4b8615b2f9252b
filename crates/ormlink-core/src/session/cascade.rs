//! Cascading save.
//!
//! A save walks the relationship graph depth-first from a root instance and
//! writes every dirty, savable instance it reaches. The set of visited
//! identities is shared by the whole walk, so cycles terminate and each
//! instance is written at most once.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument};
use uuid::Uuid;

use super::Session;
use crate::backend::{Backend, Record, Row};
use crate::entity::EntityRef;
use crate::error::{BackendOperation, CascadeError, Error};
use crate::value::Value;

/// Result of a cascading save.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CascadeResult {
    /// Instances written to the backend, in write order.
    pub saved: Vec<EntityRef>,
    /// Instances reached by the walk, written or not.
    pub visited: Vec<EntityRef>,
}

impl CascadeResult {
    /// Create an empty cascade result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instances written.
    pub fn saved_count(&self) -> usize {
        self.saved.len()
    }
}

impl<B: Backend> Session<B> {
    /// Persist `root` and everything reachable from it.
    #[instrument(skip(self))]
    pub fn save(&mut self, root: EntityRef) -> Result<CascadeResult, Error> {
        let mut excluded = HashSet::new();
        self.save_excluding(root, &mut excluded)
    }

    /// Persist `root` and everything reachable from it, skipping identities
    /// already in `excluded`. Every instance reached is added to `excluded`.
    ///
    /// A backend failure stops the walk. Instances written before it stay
    /// clean; the failed one and everything not reached stay dirty.
    pub fn save_excluding(
        &mut self,
        root: EntityRef,
        excluded: &mut HashSet<Uuid>,
    ) -> Result<CascadeResult, Error> {
        let mut result = CascadeResult::new();
        self.save_recursive(root, excluded, &mut result, 0)?;

        debug!(
            saved = result.saved.len(),
            visited = result.visited.len(),
            "Cascade save completed"
        );
        Ok(result)
    }

    fn save_recursive(
        &mut self,
        r: EntityRef,
        excluded: &mut HashSet<Uuid>,
        result: &mut CascadeResult,
        depth: usize,
    ) -> Result<(), Error> {
        if depth > self.config.max_cascade_depth {
            return Err(CascadeError::MaxDepthExceeded { depth }.into());
        }

        let instance = self.entity(r)?;
        if !instance.savable || excluded.contains(&instance.id) {
            return Ok(());
        }
        let id = instance.id;

        if instance.has_unsaved_changes {
            let record = self.record(r)?;
            let ty = self.registry.entity(r.entity);
            self.backend
                .save(ty.def(), &record)
                .map_err(|e| Error::backend(BackendOperation::Save, ty.name(), e))?;

            let instance = self.entity_mut(r)?;
            instance.has_unsaved_changes = false;
            instance.in_storage = true;
            result.saved.push(r);
        }

        excluded.insert(id);
        result.visited.push(r);

        for next in self.neighbours(r)? {
            self.save_recursive(next, excluded, result, depth + 1)?;
        }
        Ok(())
    }

    /// Instances one step away from `r`: live references, collection members,
    /// cached instances behind pending references, and partners `r` displaced
    /// since it was last walked.
    ///
    /// Pending references are only followed into the identity cache; an
    /// instance that was never loaded has nothing to save.
    fn neighbours(&mut self, r: EntityRef) -> Result<Vec<EntityRef>, Error> {
        let registry = Arc::clone(&self.registry);
        let ty = registry.entity(r.entity);
        let instance = self.entity(r)?;
        // Pending references on a clone name the originals, not copies.
        let registered = self.caches[r.entity.index()].is_registered(r);

        let mut next = Vec::new();
        for idx in 0..ty.field_count() {
            if let Some(members) = instance.collection_at(idx) {
                next.extend(members.iter());
                continue;
            }
            match instance.value_at(idx) {
                Value::Ref(x) => next.push(*x),
                Value::Uuid(id) if registered && ty.field(idx).field_type.is_reference() => {
                    if let Some(x) = ty.related(idx).and_then(|related| self.cached(related, id)) {
                        next.push(x);
                    }
                }
                _ => {}
            }
        }

        if let Some(displaced) = self.displaced.remove(&r) {
            next.extend(displaced.into_iter().filter(|x| self.entity(*x).is_ok()));
        }
        Ok(next)
    }

    /// Persistent field values of an instance, references reduced to identities.
    fn record(&self, r: EntityRef) -> Result<Record, Error> {
        let instance = self.entity(r)?;
        let ty = self.registry.entity(r.entity);

        let mut row = Row::new();
        for idx in 0..ty.field_count() {
            let field = ty.field(idx);
            if !field.field_type.is_persistent() {
                continue;
            }
            let value = match instance.value_at(idx) {
                Value::Ref(x) => Value::Uuid(self.entity(*x)?.id),
                other => other.clone(),
            };
            row.set(field.name.clone(), value);
        }

        Ok(Record {
            id: instance.id,
            in_storage: instance.in_storage,
            row,
        })
    }
}
