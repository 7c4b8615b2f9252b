//! Relationship maintenance and collection access.
//!
//! Every mutation of a relationship field updates the back-reference on the
//! other instance in the same call, so both sides always agree in memory.

use std::sync::Arc;

use super::Session;
use crate::backend::Backend;
use crate::catalog::{EntityType, EntityTypeId};
use crate::entity::{Collection, EntityRef};
use crate::error::Error;
use crate::query::Filter;
use crate::value::Value;

impl<B: Backend> Session<B> {
    /// Add `member` to a collection field of `owner`.
    ///
    /// Appending a current member is a no-op. Returns whether the member was
    /// added.
    pub fn append(&mut self, owner: EntityRef, field: &str, member: EntityRef) -> Result<bool, Error> {
        self.entity(owner)?;
        let registry = Arc::clone(&self.registry);
        let ty = registry.entity(owner.entity);
        let idx = collection_index(ty, field)?;
        self.check_member(ty, idx, member)?;
        self.ensure_loaded(owner, idx)?;

        let instance = self.entity_mut(owner)?;
        let added = instance
            .collection_at_mut(idx)
            .is_some_and(|c| c.insert(member));
        if !added {
            return Ok(false);
        }
        instance.mark_dirty();

        self.link(owner, idx, member)?;
        tracing::trace!(entity = ty.name(), field, member = %member, "Member appended");
        Ok(true)
    }

    /// Remove `member` from a collection field of `owner`.
    ///
    /// Removing a non-member is a no-op. Returns whether the member was
    /// removed.
    pub fn remove(&mut self, owner: EntityRef, field: &str, member: EntityRef) -> Result<bool, Error> {
        self.entity(owner)?;
        let registry = Arc::clone(&self.registry);
        let ty = registry.entity(owner.entity);
        let idx = collection_index(ty, field)?;
        self.check_member(ty, idx, member)?;
        self.ensure_loaded(owner, idx)?;

        let instance = self.entity_mut(owner)?;
        let removed = instance
            .collection_at_mut(idx)
            .is_some_and(|c| c.remove(member));
        if !removed {
            return Ok(false);
        }
        instance.mark_dirty();

        self.unlink(owner, idx, member)?;
        tracing::trace!(entity = ty.name(), field, member = %member, "Member removed");
        Ok(true)
    }

    /// A collection field, populated from storage on first access.
    pub fn collection(&mut self, owner: EntityRef, field: &str) -> Result<&Collection, Error> {
        self.entity(owner)?;
        let registry = Arc::clone(&self.registry);
        let ty = registry.entity(owner.entity);
        let idx = collection_index(ty, field)?;
        self.ensure_loaded(owner, idx)?;

        self.entity(owner)?
            .collection_at(idx)
            .ok_or_else(|| not_a_collection(ty, field))
    }

    /// Members of a collection field, in order.
    pub fn members(&mut self, owner: EntityRef, field: &str) -> Result<Vec<EntityRef>, Error> {
        Ok(self.collection(owner, field)?.as_slice().to_vec())
    }

    /// Whether `member` belongs to a collection field of `owner`.
    pub fn contains(&mut self, owner: EntityRef, field: &str, member: EntityRef) -> Result<bool, Error> {
        Ok(self.collection(owner, field)?.contains(member))
    }

    /// Point the back-reference of `target` at `owner`, whose field `idx` now
    /// holds or contains `target`.
    pub(crate) fn link(&mut self, owner: EntityRef, idx: usize, target: EntityRef) -> Result<(), Error> {
        let registry = Arc::clone(&self.registry);
        let (related, backref) = relation_of(registry.entity(owner.entity), idx)?;
        let owner_id = self.entity(owner)?.id;

        if registry.entity(related).field(backref).field_type.is_collection() {
            let instance = self.entity_mut(target)?;
            let inserted = instance
                .collection_at_mut(backref)
                .is_some_and(|c| c.insert(owner));
            if inserted {
                instance.mark_dirty();
            }
            return Ok(());
        }

        let one_to_one = registry
            .entity(owner.entity)
            .relation(idx)
            .is_some_and(|rel| rel.is_one_to_one());
        let (previous, changed) = match self.entity(target)?.value_at(backref).clone() {
            Value::Ref(x) if x == owner => return Ok(()),
            Value::Ref(x) => (Some(x), true),
            Value::Uuid(id) if id == owner_id => (None, false),
            // Both sides of a one-to-one store a column; the stored holder must be cleared too.
            Value::Uuid(id) if one_to_one => (self.lookup_identity(owner.entity, id)?, true),
            Value::Uuid(id) => (self.cached(owner.entity, &id), true),
            _ => (None, true),
        };

        if let Some(previous) = previous {
            if previous != owner {
                self.detach(previous, idx, target)?;
                self.note_displaced(owner, previous);
            }
        }

        let instance = self.entity_mut(target)?;
        instance.replace_value(backref, Value::Ref(owner));
        if changed {
            instance.mark_dirty();
        }
        Ok(())
    }

    /// Clear the back-reference of `target` that points at `owner`.
    pub(crate) fn unlink(&mut self, owner: EntityRef, idx: usize, target: EntityRef) -> Result<(), Error> {
        let (_, backref) = relation_of(self.registry.entity(owner.entity), idx)?;
        self.detach(target, backref, owner)?;
        self.note_displaced(owner, target);
        Ok(())
    }

    /// Drop `target` from field `idx` of `holder` without touching the other side.
    fn detach(&mut self, holder: EntityRef, idx: usize, target: EntityRef) -> Result<(), Error> {
        let target_id = self.entity(target)?.id;
        let instance = self.entity_mut(holder)?;

        let changed = match instance.collection_at_mut(idx) {
            Some(c) => c.remove(target),
            None => {
                let points_at_target = match instance.value_at(idx) {
                    Value::Ref(x) => *x == target,
                    Value::Uuid(id) => *id == target_id,
                    _ => false,
                };
                if points_at_target {
                    instance.replace_value(idx, Value::Null);
                }
                points_at_target
            }
        };

        if changed {
            instance.mark_dirty();
        }
        Ok(())
    }

    /// Record on `target` that `owner` refers to it, as loaded state: nothing
    /// is marked dirty.
    pub(crate) fn attach(&mut self, owner: EntityRef, idx: usize, target: EntityRef) -> Result<(), Error> {
        let (_, backref) = relation_of(self.registry.entity(owner.entity), idx)?;
        let owner_id = self.entity(owner)?.id;
        let instance = self.entity_mut(target)?;

        match instance.collection_at_mut(backref) {
            Some(c) => {
                c.insert(owner);
            }
            None => {
                let unset = match instance.value_at(backref) {
                    Value::Null => true,
                    Value::Uuid(id) => *id == owner_id,
                    _ => false,
                };
                if unset {
                    instance.replace_value(backref, Value::Ref(owner));
                }
            }
        }
        Ok(())
    }

    /// Pull the stored members of a collection the first time it is read.
    ///
    /// Only one-to-many collections of persisted owners are loaded; their
    /// members are the rows of the related type whose back-reference column
    /// holds the owner's identity.
    pub(crate) fn ensure_loaded(&mut self, owner: EntityRef, idx: usize) -> Result<(), Error> {
        let instance = self.entity(owner)?;
        let Some(collection) = instance.collection_at(idx) else {
            return Ok(());
        };
        if collection.is_loaded() {
            return Ok(());
        }
        let owner_id = instance.id;
        let in_storage = instance.in_storage;

        let registry = Arc::clone(&self.registry);
        let ty = registry.entity(owner.entity);
        let many_to_many = ty.relation(idx).is_some_and(|rel| rel.is_many_to_many());

        let members = if self.config.lazy_collections && in_storage && !many_to_many {
            let (related, backref) = relation_of(ty, idx)?;
            let column = &registry.entity(related).field(backref).name;
            let filter = Filter::new().eq(column.clone(), Value::Uuid(owner_id));
            self.find_in(related, &filter)?
        } else {
            Vec::new()
        };

        let instance = self.entity_mut(owner)?;
        if let Some(collection) = instance.collection_at_mut(idx) {
            for member in &members {
                collection.insert(*member);
            }
            collection.mark_loaded();
        }
        for &member in &members {
            self.attach(owner, idx, member)?;
        }

        if !members.is_empty() {
            tracing::debug!(
                entity = ty.name(),
                field = %ty.field(idx).name,
                loaded = members.len(),
                "Collection populated"
            );
        }
        Ok(())
    }

    fn check_member(&self, ty: &EntityType, idx: usize, member: EntityRef) -> Result<(), Error> {
        self.entity(member)?;
        if ty.related(idx) != Some(member.entity) {
            return Err(Error::EntityTypeMismatch {
                entity: ty.name().to_string(),
                field: ty.field(idx).name.clone(),
                expected: ty
                    .field(idx)
                    .field_type
                    .related_entity()
                    .unwrap_or_default()
                    .to_string(),
                found: self.registry.entity(member.entity).name().to_string(),
            });
        }
        Ok(())
    }
}

fn collection_index(ty: &EntityType, field: &str) -> Result<usize, Error> {
    let idx = ty.require_field(field)?;
    if ty.field(idx).field_type.is_collection() {
        Ok(idx)
    } else {
        Err(not_a_collection(ty, field))
    }
}

fn not_a_collection(ty: &EntityType, field: &str) -> Error {
    Error::FieldKind {
        entity: ty.name().to_string(),
        field: field.to_string(),
        expected: "collection",
    }
}

/// Related type and back-reference position of a relationship field.
fn relation_of(ty: &EntityType, idx: usize) -> Result<(EntityTypeId, usize), Error> {
    ty.related(idx)
        .zip(ty.backref_index(idx))
        .ok_or_else(|| Error::FieldKind {
            entity: ty.name().to_string(),
            field: ty.field(idx).name.clone(),
            expected: "relationship",
        })
}
