//! Deep copies of instance graphs.

use std::collections::{HashMap, HashSet};

use super::Session;
use crate::backend::Backend;
use crate::entity::{EntityRef, Slot};
use crate::error::Error;
use crate::value::Value;

impl<B: Backend> Session<B> {
    /// Deep-copy every instance reachable from `root`.
    ///
    /// Copies keep their identities and field values, and relationships
    /// between copied instances point at the copies. They are not registered
    /// in the identity cache, so lookups never return them. Unless `savable`
    /// is set, `save` skips them.
    pub fn clone_entity(&mut self, root: EntityRef, savable: bool) -> Result<EntityRef, Error> {
        let mut order = vec![root];
        let mut seen = HashSet::from([root]);
        let mut next = 0;
        while next < order.len() {
            for related in self.entity(order[next])?.related_refs() {
                if seen.insert(related) {
                    order.push(related);
                }
            }
            next += 1;
        }

        let mut copies = HashMap::with_capacity(order.len());
        for &original in &order {
            let mut copy = self.entity(original)?.clone();
            copy.savable = savable;
            let r = self.caches[original.entity.index()].allocate(copy);
            copies.insert(original, r);
        }

        let remap = |r: EntityRef| copies.get(&r).copied().unwrap_or(r);
        for &copy in copies.values() {
            let instance = self.entity_mut(copy)?;
            for slot in &mut instance.slots {
                match slot {
                    Slot::Value(Value::Ref(target)) => *target = remap(*target),
                    Slot::Value(_) => {}
                    Slot::Collection(members) => members.remap(remap),
                }
            }
        }

        tracing::debug!(root = %root, copies = order.len(), savable, "Graph cloned");
        copies.get(&root).copied().ok_or(Error::StaleReference(root))
    }
}
