//! Per-type identity cache.

use std::collections::HashMap;

use uuid::Uuid;

use super::{Entity, EntityRef};
use crate::catalog::EntityTypeId;

/// Arena of the instances of one entity type, indexed by identity.
///
/// Every constructed or hydrated instance is registered under its identity,
/// so two lookups of the same stored row yield the same handle. Clones are
/// allocated in the arena but never registered.
#[derive(Debug)]
pub struct IdentityCache {
    entity: EntityTypeId,
    generation: u32,
    instances: Vec<Entity>,
    by_id: HashMap<Uuid, u32>,
}

impl IdentityCache {
    /// Create an empty cache for one entity type.
    pub fn new(entity: EntityTypeId) -> Self {
        Self {
            entity,
            generation: 0,
            instances: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Store an instance in the arena without registering it.
    pub(crate) fn allocate(&mut self, instance: Entity) -> EntityRef {
        let index = self.instances.len() as u32;
        self.instances.push(instance);
        EntityRef {
            entity: self.entity,
            index,
            generation: self.generation,
        }
    }

    /// Register an allocated instance under its identity.
    pub(crate) fn register(&mut self, r: EntityRef) {
        if let Some(instance) = self.instances.get(r.index as usize) {
            self.by_id.insert(instance.id, r.index);
        }
    }

    /// Handle of the registered instance with this identity.
    pub fn lookup(&self, id: &Uuid) -> Option<EntityRef> {
        self.by_id.get(id).map(|&index| EntityRef {
            entity: self.entity,
            index,
            generation: self.generation,
        })
    }

    /// Instance behind a handle, if the handle is current.
    pub fn get(&self, r: EntityRef) -> Option<&Entity> {
        if r.entity != self.entity || r.generation != self.generation {
            return None;
        }
        self.instances.get(r.index as usize)
    }

    pub(crate) fn get_mut(&mut self, r: EntityRef) -> Option<&mut Entity> {
        if r.entity != self.entity || r.generation != self.generation {
            return None;
        }
        self.instances.get_mut(r.index as usize)
    }

    /// Registered instances in construction order.
    pub fn registered(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.instances
            .iter()
            .enumerate()
            .filter(|(index, e)| self.by_id.get(&e.id) == Some(&(*index as u32)))
            .map(|(index, _)| EntityRef {
                entity: self.entity,
                index: index as u32,
                generation: self.generation,
            })
    }

    /// Whether the handle addresses a registered (non-clone) instance.
    pub fn is_registered(&self, r: EntityRef) -> bool {
        self.get(r)
            .is_some_and(|e| self.by_id.get(&e.id) == Some(&r.index))
    }

    /// Number of registered instances.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether no instance is registered.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Drop every instance. Outstanding handles become stale.
    pub fn clear(&mut self) {
        self.instances.clear();
        self.by_id.clear();
        self.generation = self.generation.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: Uuid) -> Entity {
        Entity {
            entity: EntityTypeId(0),
            id,
            slots: Vec::new(),
            in_storage: false,
            has_unsaved_changes: true,
            savable: true,
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut cache = IdentityCache::new(EntityTypeId(0));
        let id = Uuid::new_v4();
        let r = cache.allocate(instance(id));
        assert!(cache.lookup(&id).is_none());

        cache.register(r);
        assert_eq!(cache.lookup(&id), Some(r));
        assert_eq!(cache.len(), 1);
        assert!(cache.is_registered(r));
    }

    #[test]
    fn test_clones_are_not_registered() {
        let mut cache = IdentityCache::new(EntityTypeId(0));
        let id = Uuid::new_v4();
        let original = cache.allocate(instance(id));
        cache.register(original);
        let copy = cache.allocate(instance(id));

        assert!(!cache.is_registered(copy));
        assert_eq!(cache.registered().collect::<Vec<_>>(), vec![original]);
        assert_eq!(cache.lookup(&id), Some(original));
    }

    #[test]
    fn test_clear_makes_handles_stale() {
        let mut cache = IdentityCache::new(EntityTypeId(0));
        let r = cache.allocate(instance(Uuid::new_v4()));
        cache.register(r);

        cache.clear();
        assert!(cache.get(r).is_none());
        assert!(cache.is_empty());

        let fresh = cache.allocate(instance(Uuid::new_v4()));
        assert_eq!(fresh.index, r.index);
        assert_ne!(fresh, r);
    }
}
