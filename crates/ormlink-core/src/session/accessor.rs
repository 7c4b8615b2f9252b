//! Field reads and writes.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::Session;
use crate::backend::Backend;
use crate::catalog::{coerce_identity, literal_default, DefaultValue, EntityType};
use crate::entity::EntityRef;
use crate::error::Error;
use crate::value::Value;

impl<B: Backend> Session<B> {
    /// Assign a field.
    ///
    /// `Value::Null` applies the field's default. References accept a live
    /// handle or a raw identity; a handle is linked to its back-reference at
    /// once, after the previous partner (if any) has been detached.
    pub fn set_field(
        &mut self,
        r: EntityRef,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<(), Error> {
        let current_id = self.entity(r)?.id;
        let registry = Arc::clone(&self.registry);
        let ty = registry.entity(r.entity);
        let idx = ty.require_field(field)?;
        let def = ty.field(idx);

        if def.field_type.is_collection() {
            return Err(Error::FieldKind {
                entity: ty.name().to_string(),
                field: field.to_string(),
                expected: "scalar or reference",
            });
        }

        let value = self.resolve_value(ty, idx, value.into())?;

        if idx == ty.identity_index() {
            if coerce_identity(&value) == Some(current_id) {
                return Ok(());
            }
            return Err(Error::ImmutableIdentity {
                entity: ty.name().to_string(),
                field: field.to_string(),
            });
        }

        let old_target = match ty.related(idx) {
            Some(related) => {
                let one_to_one = ty.relation(idx).is_some_and(|rel| rel.is_one_to_one());
                match self.entity(r)?.value_at(idx).clone() {
                    Value::Ref(x) => Some(x),
                    // The stored partner still names this instance and has to be cleared.
                    Value::Uuid(id) if one_to_one => self.lookup_identity(related, id)?,
                    Value::Uuid(id) => self.cached(related, &id),
                    _ => None,
                }
            }
            None => None,
        };

        // A raw identity of a cached instance is linked like the handle itself.
        let value = match (ty.related(idx), value) {
            (Some(related), Value::Uuid(id)) => {
                self.cached(related, &id).map_or(Value::Uuid(id), Value::Ref)
            }
            (_, value) => value,
        };

        let instance = self.entity_mut(r)?;
        instance.replace_value(idx, value.clone());
        instance.mark_dirty();

        if ty.related(idx).is_some() {
            let new_target = value.as_entity();

            if let Some(old_target) = old_target {
                if Some(old_target) != new_target {
                    self.unlink(r, idx, old_target)?;
                }
            }
            if let Some(target) = new_target {
                self.link(r, idx, target)?;
            }
        }

        tracing::trace!(entity = ty.name(), field, value = %value, "Field set");
        Ok(())
    }

    /// Read a field.
    ///
    /// Unset fields read as null. A reference still holding a raw identity is
    /// resolved through the identity cache, then the backend; if neither knows
    /// it the raw identity is returned.
    pub fn get_field(&mut self, r: EntityRef, field: &str) -> Result<Value, Error> {
        self.entity(r)?;
        let registry = Arc::clone(&self.registry);
        let ty = registry.entity(r.entity);
        let idx = ty.require_field(field)?;

        if ty.field(idx).field_type.is_collection() {
            return Err(Error::FieldKind {
                entity: ty.name().to_string(),
                field: field.to_string(),
                expected: "scalar or reference",
            });
        }

        match self.entity(r)?.value_at(idx).clone() {
            Value::Uuid(id) if ty.field(idx).field_type.is_reference() => {
                self.resolve_pending(r, idx, id)
            }
            other => Ok(other),
        }
    }

    /// Read a reference field as a handle.
    pub fn get_ref(&mut self, r: EntityRef, field: &str) -> Result<Option<EntityRef>, Error> {
        Ok(self.get_field(r, field)?.as_entity())
    }

    /// Stored value of a field, without resolving references.
    pub fn raw_field(&self, r: EntityRef, field: &str) -> Result<&Value, Error> {
        let instance = self.entity(r)?;
        let idx = self.registry.entity(r.entity).require_field(field)?;
        Ok(instance.value_at(idx))
    }

    /// Apply defaults and coercion to a value headed for a field.
    pub(crate) fn resolve_value(
        &mut self,
        ty: &EntityType,
        idx: usize,
        value: Value,
    ) -> Result<Value, Error> {
        let field = ty.field(idx);
        let value = if value.is_null() {
            self.default_value(ty, idx)?
        } else {
            value
        };
        if value.is_null() {
            return Ok(Value::Null);
        }

        let coerced = field
            .field_type
            .coerce(value.clone())
            .ok_or_else(|| Error::TypeCoercion {
                entity: ty.name().to_string(),
                field: field.name.clone(),
                expected: field.field_type.describe(),
                found: format!("{} {}", value.kind(), value),
            })?;

        if let Value::Ref(target) = coerced {
            self.entity(target)?;
            if ty.related(idx) != Some(target.entity) {
                return Err(Error::EntityTypeMismatch {
                    entity: ty.name().to_string(),
                    field: field.name.clone(),
                    expected: field.field_type.related_entity().unwrap_or_default().to_string(),
                    found: self.registry.entity(target.entity).name().to_string(),
                });
            }
        }

        Ok(coerced)
    }

    fn default_value(&mut self, ty: &EntityType, idx: usize) -> Result<Value, Error> {
        let field = ty.field(idx);
        let value = match &field.default {
            Some(DefaultValue::AutoUuid) => Value::Uuid(Uuid::new_v4()),
            Some(DefaultValue::CurrentTimestamp) => Value::Timestamp(Utc::now()),
            Some(DefaultValue::Factory(factory)) => factory.produce(),
            Some(DefaultValue::NewEntity) => match ty.related(idx) {
                Some(related) => {
                    let count = self.registry.entity(related).field_count();
                    Value::Ref(self.construct(related, vec![Value::Null; count])?)
                }
                None => Value::Null,
            },
            Some(literal) => literal_default(literal).unwrap_or(Value::Null),
            None if field.required => field.field_type.zero_value(),
            None => Value::Null,
        };
        Ok(value)
    }
}
