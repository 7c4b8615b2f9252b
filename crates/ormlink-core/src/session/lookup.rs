//! Finding and hydrating instances.
//!
//! Lookups consult the identity cache before the backend. Cached state wins:
//! a cached instance is matched on its in-memory values, and a stored row whose
//! identity is already cached is never hydrated a second time.

use std::sync::Arc;

use uuid::Uuid;

use super::Session;
use crate::backend::{Backend, Row};
use crate::catalog::{coerce_identity, EntityType, EntityTypeId};
use crate::entity::{Collection, Entity, EntityRef, Slot};
use crate::error::{BackendOperation, Error};
use crate::query::{Filter, FilterEvaluator};
use crate::value::Value;

impl<B: Backend> Session<B> {
    /// Every instance of `entity` matching an equality filter: cached matches
    /// first, then stored rows not yet cached.
    pub fn find(&mut self, entity: &str, filter: &Filter) -> Result<Vec<EntityRef>, Error> {
        let id = self.registry.lookup(entity)?.id();
        self.find_in(id, filter)
    }

    /// First instance matching an equality filter.
    pub fn get(&mut self, entity: &str, filter: &Filter) -> Result<Option<EntityRef>, Error> {
        Ok(self.find(entity, filter)?.into_iter().next())
    }

    /// Instance with the given identity.
    pub fn get_by_id(&mut self, entity: &str, id: Uuid) -> Result<Option<EntityRef>, Error> {
        let ty = self.registry.lookup(entity)?.id();
        self.lookup_identity(ty, id)
    }

    /// Every instance of `entity`.
    pub fn all(&mut self, entity: &str) -> Result<Vec<EntityRef>, Error> {
        self.find(entity, &Filter::new())
    }

    /// Build an instance from a stored row.
    ///
    /// Returns the cached instance if the row's identity is already cached.
    /// Hydrated instances are persisted and clean; their references hold raw
    /// identities until read and their collections load on first access.
    pub fn hydrate(&mut self, entity: &str, row: Row) -> Result<EntityRef, Error> {
        let registry = Arc::clone(&self.registry);
        let ty = registry.lookup(entity)?;
        self.materialize(ty, row)
    }

    pub(crate) fn find_in(&mut self, id: EntityTypeId, filter: &Filter) -> Result<Vec<EntityRef>, Error> {
        let registry = Arc::clone(&self.registry);
        let ty = registry.entity(id);
        let conditions = self.normalise(ty, filter)?;

        let mut matches: Vec<EntityRef> = self.caches[id.index()]
            .registered()
            .filter(|r| {
                self.entity(*r)
                    .is_ok_and(|instance| self.matches(instance, &conditions))
            })
            .collect();
        let cached = matches.len();

        let stored_filter = conditions.iter().fold(Filter::new(), |f, (idx, value)| {
            f.eq(ty.field(*idx).name.clone(), value.clone())
        });
        let rows = self
            .backend
            .find(ty.def(), &stored_filter)
            .map_err(|e| Error::backend(BackendOperation::Find, ty.name(), e))?;

        for row in rows {
            let row_id = identity_of(ty, &row)?;
            if self.cached(id, &row_id).is_some() {
                continue;
            }
            matches.push(self.materialize(ty, row)?);
        }

        tracing::trace!(
            entity = ty.name(),
            cached,
            stored = matches.len() - cached,
            "Find completed"
        );
        Ok(matches)
    }

    /// Cached instance with this identity, else the stored one.
    pub(crate) fn lookup_identity(&mut self, ty: EntityTypeId, id: Uuid) -> Result<Option<EntityRef>, Error> {
        if let Some(r) = self.cached(ty, &id) {
            return Ok(Some(r));
        }

        let registry = Arc::clone(&self.registry);
        let entity = registry.entity(ty);
        let filter = Filter::new().eq(entity.identity_field(), Value::Uuid(id));
        let row = self
            .backend
            .get(entity.def(), &filter)
            .map_err(|e| Error::backend(BackendOperation::Get, entity.name(), e))?;

        row.map(|row| self.materialize(entity, row)).transpose()
    }

    /// Replace a raw identity held by reference field `idx` of `owner` with a
    /// live handle.
    pub(crate) fn resolve_pending(&mut self, owner: EntityRef, idx: usize, id: Uuid) -> Result<Value, Error> {
        let registry = Arc::clone(&self.registry);
        let ty = registry.entity(owner.entity);
        let Some(related) = ty.related(idx) else {
            return Ok(Value::Uuid(id));
        };

        match self.lookup_identity(related, id)? {
            Some(target) => {
                self.entity_mut(owner)?.replace_value(idx, Value::Ref(target));
                if self.caches[owner.entity.index()].is_registered(owner) {
                    self.attach(owner, idx, target)?;
                }
                Ok(Value::Ref(target))
            }
            None => {
                tracing::warn!(
                    entity = ty.name(),
                    field = %ty.field(idx).name,
                    id = %id,
                    "Reference points at an unknown instance"
                );
                Ok(Value::Uuid(id))
            }
        }
    }

    pub(crate) fn materialize(&mut self, ty: &EntityType, row: Row) -> Result<EntityRef, Error> {
        let id = identity_of(ty, &row)?;
        if let Some(r) = self.cached(ty.id(), &id) {
            return Ok(r);
        }

        let mut slots = Vec::with_capacity(ty.field_count());
        for idx in 0..ty.field_count() {
            let field = ty.field(idx);
            if field.field_type.is_collection() {
                slots.push(Slot::Collection(Collection::new(false)));
                continue;
            }

            let raw = row.get(&field.name).cloned().unwrap_or(Value::Null);
            let value = match field.field_type.coerce(raw.clone()) {
                Some(Value::Ref(x)) => Value::Uuid(self.entity(x)?.id),
                Some(value) => value,
                None => {
                    return Err(Error::TypeCoercion {
                        entity: ty.name().to_string(),
                        field: field.name.clone(),
                        expected: field.field_type.describe(),
                        found: format!("{} {}", raw.kind(), raw),
                    })
                }
            };
            slots.push(Slot::Value(value));
        }

        let instance = Entity {
            entity: ty.id(),
            id,
            slots,
            in_storage: true,
            has_unsaved_changes: false,
            savable: true,
        };
        let cache = &mut self.caches[ty.id().index()];
        let r = cache.allocate(instance);
        cache.register(r);

        tracing::trace!(entity = ty.name(), id = %id, "Instance hydrated");
        Ok(r)
    }

    /// Turn filter conditions into field positions and stored representations.
    fn normalise(&self, ty: &EntityType, filter: &Filter) -> Result<Vec<(usize, Value)>, Error> {
        let mut conditions = Vec::new();
        for (name, value) in filter.equalities()? {
            let idx = ty.require_field(name)?;
            let field = ty.field(idx);
            if field.field_type.is_collection() {
                return Err(Error::UnsupportedQuery(format!(
                    "cannot filter on collection `{}.{}`",
                    ty.name(),
                    name
                )));
            }

            let coerced = field
                .field_type
                .coerce(value.clone())
                .ok_or_else(|| Error::TypeCoercion {
                    entity: ty.name().to_string(),
                    field: name.to_string(),
                    expected: field.field_type.describe(),
                    found: format!("{} {}", value.kind(), value),
                })?;

            let stored = match coerced {
                Value::Ref(x) => {
                    let target_id = self.entity(x)?.id;
                    if ty.related(idx) != Some(x.entity) {
                        return Err(Error::EntityTypeMismatch {
                            entity: ty.name().to_string(),
                            field: name.to_string(),
                            expected: field.field_type.related_entity().unwrap_or_default().to_string(),
                            found: self.registry.entity(x.entity).name().to_string(),
                        });
                    }
                    Value::Uuid(target_id)
                }
                other => other,
            };
            conditions.push((idx, stored));
        }
        Ok(conditions)
    }

    fn matches(&self, instance: &Entity, conditions: &[(usize, Value)]) -> bool {
        conditions.iter().all(|(idx, expected)| match instance.value_at(*idx) {
            Value::Ref(x) => self
                .entity(*x)
                .is_ok_and(|target| Value::Uuid(target.id) == *expected),
            actual => FilterEvaluator::values_equal(actual, expected),
        })
    }
}

fn identity_of(ty: &EntityType, row: &Row) -> Result<Uuid, Error> {
    row.get(ty.identity_field())
        .and_then(coerce_identity)
        .ok_or_else(|| Error::InvalidRow {
            entity: ty.name().to_string(),
            reason: format!("missing or invalid identity `{}`", ty.identity_field()),
        })
}
