//! The session: registry, identity caches, and backend in one place.
//!
//! Every operation on entity instances goes through a [`Session`]. It owns
//! one [`IdentityCache`] per registered type, so handles returned by one
//! session are only meaningful to that session.

mod accessor;
mod cascade;
mod clone;
mod json;
mod link;
mod lookup;

pub use cascade::CascadeResult;

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::backend::Backend;
use crate::catalog::{
    coerce_identity, DefaultValue, EntityType, EntityTypeId, Registry, SchemaBundle,
};
use crate::config::SessionConfig;
use crate::entity::{Collection, Entity, EntityRef, IdentityCache, Slot};
use crate::error::{BackendOperation, Error};
use crate::value::Value;

/// Handle on a schema, its live instances, and the storage behind them.
pub struct Session<B: Backend> {
    registry: Arc<Registry>,
    caches: Vec<IdentityCache>,
    /// Partners whose back-reference an instance cleared, saved with it.
    displaced: HashMap<EntityRef, Vec<EntityRef>>,
    backend: B,
    config: SessionConfig,
}

impl<B: Backend> Session<B> {
    /// Register a schema with default configuration.
    pub fn new(schema: SchemaBundle, backend: B) -> Result<Self, Error> {
        Self::open(schema, backend, SessionConfig::default())
    }

    /// Register a schema, resolve its relationships, and ensure storage
    /// exists for every entity type.
    pub fn open(schema: SchemaBundle, backend: B, config: SessionConfig) -> Result<Self, Error> {
        let registry = Registry::new(schema, &config)?;

        for ty in registry.iter() {
            backend
                .create(ty.def())
                .map_err(|e| Error::backend(BackendOperation::Create, ty.name(), e))?;
        }

        let caches = registry
            .iter()
            .map(|ty| IdentityCache::new(ty.id()))
            .collect();

        tracing::debug!(entities = registry.len(), "Session opened");

        Ok(Self {
            registry: Arc::new(registry),
            caches,
            displaced: HashMap::new(),
            backend,
            config,
        })
    }

    /// The resolved registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The persistence backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Entity type of a handle.
    pub fn entity_type(&self, r: EntityRef) -> Result<&EntityType, Error> {
        self.entity(r)?;
        Ok(self.registry.entity(r.entity))
    }

    /// Instance behind a handle.
    pub fn entity(&self, r: EntityRef) -> Result<&Entity, Error> {
        self.caches
            .get(r.entity.index())
            .and_then(|cache| cache.get(r))
            .ok_or(Error::StaleReference(r))
    }

    /// Identity of the instance behind a handle.
    pub fn id(&self, r: EntityRef) -> Result<Uuid, Error> {
        Ok(self.entity(r)?.id)
    }

    /// Identity cache of an entity type.
    pub fn cache(&self, entity: &str) -> Result<&IdentityCache, Error> {
        let ty = self.registry.lookup(entity)?;
        Ok(&self.caches[ty.id().index()])
    }

    /// Drop every cached instance of one type. Outstanding handles to them
    /// become stale.
    pub fn clear_cache(&mut self, entity: &str) -> Result<(), Error> {
        let id = self.registry.lookup(entity)?.id();
        self.caches[id.index()].clear();
        self.displaced.retain(|owner, _| owner.entity != id);
        tracing::debug!(entity, "Identity cache cleared");
        Ok(())
    }

    /// Drop every cached instance of every type.
    pub fn clear_caches(&mut self) {
        for cache in &mut self.caches {
            cache.clear();
        }
        self.displaced.clear();
        tracing::debug!("Identity caches cleared");
    }

    /// Construct a new instance.
    ///
    /// Fields not listed receive their default, or their zero value when
    /// required. Every value is resolved and validated before the instance is
    /// registered; references are then linked to their back-reference.
    pub fn create<I, K, V>(&mut self, entity: &str, values: I) -> Result<EntityRef, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let registry = Arc::clone(&self.registry);
        let ty = registry.lookup(entity)?;

        let mut provided = vec![Value::Null; ty.field_count()];
        for (name, value) in values {
            let idx = ty.require_field(name.as_ref())?;
            if ty.field(idx).field_type.is_collection() {
                return Err(Error::FieldKind {
                    entity: ty.name().to_string(),
                    field: name.as_ref().to_string(),
                    expected: "scalar or reference",
                });
            }
            provided[idx] = value.into();
        }

        self.construct(ty.id(), provided)
    }

    /// Construct a new instance with every field defaulted.
    pub fn create_default(&mut self, entity: &str) -> Result<EntityRef, Error> {
        self.create(entity, std::iter::empty::<(&str, Value)>())
    }

    fn construct(&mut self, id: EntityTypeId, provided: Vec<Value>) -> Result<EntityRef, Error> {
        let registry = Arc::clone(&self.registry);
        let ty = registry.entity(id);

        let mut slots = Vec::with_capacity(ty.field_count());
        let mut deferred = Vec::new();
        for (idx, value) in provided.into_iter().enumerate() {
            let field = ty.field(idx);
            if field.field_type.is_collection() {
                slots.push(Slot::Collection(Collection::new(true)));
                continue;
            }
            if value.is_null() && matches!(field.default, Some(DefaultValue::NewEntity)) {
                deferred.push(idx);
                slots.push(Slot::Value(Value::Null));
                continue;
            }
            slots.push(Slot::Value(self.resolve_value(ty, idx, value)?));
        }

        let identity = ty.identity_index();
        let entity_id = match &slots[identity] {
            Slot::Value(v) => coerce_identity(v),
            Slot::Collection(_) => None,
        }
        .ok_or_else(|| Error::TypeCoercion {
            entity: ty.name().to_string(),
            field: ty.identity_field().to_string(),
            expected: "uuid".to_string(),
            found: "null".to_string(),
        })?;

        if self.caches[id.index()].lookup(&entity_id).is_some() {
            return Err(Error::DuplicateIdentity {
                entity: ty.name().to_string(),
                id: entity_id,
            });
        }

        // Everything validated; related defaults can be built now.
        for idx in deferred {
            let related = ty.related(idx).ok_or_else(|| {
                Error::Schema(format!("`{}.{}` has no related type", ty.name(), ty.field(idx).name))
            })?;
            let child = self.construct(related, vec![Value::Null; registry.entity(related).field_count()])?;
            slots[idx] = Slot::Value(Value::Ref(child));
        }

        let instance = Entity {
            entity: id,
            id: entity_id,
            slots,
            in_storage: false,
            has_unsaved_changes: true,
            savable: true,
        };
        let cache = &mut self.caches[id.index()];
        let r = cache.allocate(instance);
        cache.register(r);

        for idx in 0..ty.field_count() {
            let target = match self.entity(r)?.value_at(idx) {
                Value::Ref(target) => *target,
                _ => continue,
            };
            self.link(r, idx, target)?;
        }

        tracing::trace!(entity = ty.name(), id = %entity_id, "Instance constructed");
        Ok(r)
    }

    pub(crate) fn entity_mut(&mut self, r: EntityRef) -> Result<&mut Entity, Error> {
        self.caches
            .get_mut(r.entity.index())
            .and_then(|cache| cache.get_mut(r))
            .ok_or(Error::StaleReference(r))
    }

    /// Remember that `owner` cleared the back-reference held by `partner`.
    pub(crate) fn note_displaced(&mut self, owner: EntityRef, partner: EntityRef) {
        let partners = self.displaced.entry(owner).or_default();
        if !partners.contains(&partner) {
            partners.push(partner);
        }
    }

    /// Cached handle for an identity of a type, without touching the backend.
    pub(crate) fn cached(&self, ty: EntityTypeId, id: &Uuid) -> Option<EntityRef> {
        self.caches[ty.index()].lookup(id)
    }
}

impl<B: Backend + std::fmt::Debug> std::fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("entities", &self.registry.len())
            .field(
                "cached",
                &self.caches.iter().map(IdentityCache::len).sum::<usize>(),
            )
            .field("backend", &self.backend)
            .field("config", &self.config)
            .finish()
    }
}
