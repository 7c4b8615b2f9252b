//! JSON import and export.

use std::sync::Arc;

use super::Session;
use crate::backend::{Backend, Row};
use crate::entity::EntityRef;
use crate::error::Error;
use crate::value::Value;

impl<B: Backend> Session<B> {
    /// Export an instance as a JSON object.
    ///
    /// References are written as the related identity, collections as arrays
    /// of identities. Members that have not been loaded yet are not included.
    pub fn to_json(&self, r: EntityRef) -> Result<serde_json::Value, Error> {
        let instance = self.entity(r)?;
        let ty = self.registry.entity(r.entity);

        let mut object = serde_json::Map::new();
        for idx in 0..ty.field_count() {
            let name = ty.field(idx).name.clone();
            let json = match instance.collection_at(idx) {
                Some(members) => {
                    let mut ids = Vec::with_capacity(members.len());
                    for member in members {
                        ids.push(serde_json::Value::String(self.entity(member)?.id.to_string()));
                    }
                    serde_json::Value::Array(ids)
                }
                None => match instance.value_at(idx) {
                    Value::Ref(x) => serde_json::Value::String(self.entity(*x)?.id.to_string()),
                    other => other.to_json(),
                },
            };
            object.insert(name, json);
        }
        Ok(serde_json::Value::Object(object))
    }

    /// Hydrate an instance from a JSON object, as if it were a stored row.
    ///
    /// Collection keys are ignored; membership is rebuilt from the member
    /// side when the collection is first read.
    pub fn hydrate_json(&mut self, entity: &str, json: &serde_json::Value) -> Result<EntityRef, Error> {
        let registry = Arc::clone(&self.registry);
        let ty = registry.lookup(entity)?;

        let object = json.as_object().ok_or_else(|| Error::InvalidRow {
            entity: entity.to_string(),
            reason: format!("expected a JSON object, got {json}"),
        })?;

        let mut row = Row::new();
        for (key, value) in object {
            let idx = ty.require_field(key)?;
            if ty.field(idx).field_type.is_collection() {
                continue;
            }
            let value = Value::from_json(value).ok_or_else(|| Error::InvalidRow {
                entity: entity.to_string(),
                reason: format!("`{key}` must be a JSON scalar"),
            })?;
            row.set(key.clone(), value);
        }

        self.materialize(ty, row)
    }
}
