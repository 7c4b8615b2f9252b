//! Entity instances and their identity cache.
//!
//! Instances live in a per-type arena ([`IdentityCache`]) and are addressed by
//! copyable [`EntityRef`] handles. Relationships store handles, never owned
//! instances, so cyclic graphs do not form ownership cycles.

mod cache;
mod collection;

pub use cache::IdentityCache;
pub use collection::Collection;

use std::fmt;

use uuid::Uuid;

use crate::catalog::EntityTypeId;
use crate::value::Value;

static NULL: Value = Value::Null;

/// Handle to an entity instance held by a session.
///
/// Two handles are equal exactly when they address the same in-memory
/// instance. Handles outlive nothing: clearing the owning cache makes them
/// stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityRef {
    pub(crate) entity: EntityTypeId,
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl EntityRef {
    /// Entity type of the addressed instance.
    pub fn entity_type(&self) -> EntityTypeId {
        self.entity
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity, self.index)
    }
}

/// Storage of one field on an instance.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Value(Value),
    Collection(Collection),
}

/// One logical row.
#[derive(Debug, Clone)]
pub struct Entity {
    pub(crate) entity: EntityTypeId,
    pub(crate) id: Uuid,
    pub(crate) slots: Vec<Slot>,
    pub(crate) in_storage: bool,
    pub(crate) has_unsaved_changes: bool,
    pub(crate) savable: bool,
}

impl Entity {
    /// Identity.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Entity type.
    pub fn entity_type(&self) -> EntityTypeId {
        self.entity
    }

    /// Whether the instance has been persisted at least once.
    pub fn in_storage(&self) -> bool {
        self.in_storage
    }

    /// Whether the instance changed since it was last persisted.
    pub fn has_unsaved_changes(&self) -> bool {
        self.has_unsaved_changes
    }

    /// Whether `save` may write this instance.
    pub fn is_savable(&self) -> bool {
        self.savable
    }

    /// Raw value of a field by position. Unresolved references show as their
    /// identity; collections show as null.
    pub fn value_at(&self, index: usize) -> &Value {
        match self.slots.get(index) {
            Some(Slot::Value(v)) => v,
            _ => &NULL,
        }
    }

    /// Collection by field position.
    pub fn collection_at(&self, index: usize) -> Option<&Collection> {
        match self.slots.get(index) {
            Some(Slot::Collection(c)) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn collection_at_mut(&mut self, index: usize) -> Option<&mut Collection> {
        match self.slots.get_mut(index) {
            Some(Slot::Collection(c)) => Some(c),
            _ => None,
        }
    }

    /// Replace a field value and return the previous one.
    pub(crate) fn replace_value(&mut self, index: usize, value: Value) -> Value {
        match &mut self.slots[index] {
            Slot::Value(v) => std::mem::replace(v, value),
            slot @ Slot::Collection(_) => {
                *slot = Slot::Value(value);
                Value::Null
            }
        }
    }

    /// Handles held by this instance, through references and collections.
    pub(crate) fn related_refs(&self) -> Vec<EntityRef> {
        let mut out = Vec::new();
        for slot in &self.slots {
            match slot {
                Slot::Value(Value::Ref(r)) => out.push(*r),
                Slot::Value(_) => {}
                Slot::Collection(c) => out.extend(c.iter()),
            }
        }
        out
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.has_unsaved_changes = true;
    }
}
