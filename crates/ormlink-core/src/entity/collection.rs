//! Relationship collections.

use super::EntityRef;

/// Ordered, duplicate-free set of related instances.
///
/// A collection is owned by one instance and bound to one relationship
/// field. Mutation goes through the session so the inverse side stays in
/// step; this type only exposes read access publicly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    members: Vec<EntityRef>,
    /// Whether stored members have been pulled from the backend.
    loaded: bool,
}

impl Collection {
    pub(crate) fn new(loaded: bool) -> Self {
        Self {
            members: Vec::new(),
            loaded,
        }
    }

    /// Membership test.
    pub fn contains(&self, member: EntityRef) -> bool {
        self.members.contains(&member)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member at a position.
    pub fn get(&self, index: usize) -> Option<EntityRef> {
        self.members.get(index).copied()
    }

    /// Iterate members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.members.iter().copied()
    }

    /// Members as a slice.
    pub fn as_slice(&self) -> &[EntityRef] {
        &self.members
    }

    /// Whether stored members have been loaded.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Append unless present. Returns whether it was added.
    pub(crate) fn insert(&mut self, member: EntityRef) -> bool {
        if self.contains(member) {
            return false;
        }
        self.members.push(member);
        true
    }

    /// Remove if present. Returns whether it was removed.
    pub(crate) fn remove(&mut self, member: EntityRef) -> bool {
        match self.members.iter().position(|m| *m == member) {
            Some(pos) => {
                self.members.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn mark_loaded(&mut self) {
        self.loaded = true;
    }

    /// Rewrite every member through a mapping (used when cloning graphs).
    pub(crate) fn remap(&mut self, map: impl Fn(EntityRef) -> EntityRef) {
        for member in &mut self.members {
            *member = map(*member);
        }
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = EntityRef;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, EntityRef>>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntityTypeId;

    fn handle(index: u32) -> EntityRef {
        EntityRef {
            entity: EntityTypeId(0),
            index,
            generation: 0,
        }
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut c = Collection::new(true);
        assert!(c.insert(handle(1)));
        assert!(!c.insert(handle(1)));
        assert!(c.insert(handle(2)));

        assert_eq!(c.len(), 2);
        assert_eq!(c.as_slice(), &[handle(1), handle(2)]);
    }

    #[test]
    fn test_remove() {
        let mut c = Collection::new(false);
        c.insert(handle(1));
        c.insert(handle(2));

        assert!(c.remove(handle(1)));
        assert!(!c.remove(handle(1)));
        assert_eq!(c.get(0), Some(handle(2)));
        assert!(!c.is_loaded());
    }
}
