//! Schema bundle - the set of entity types registered together.

use super::EntityDef;

/// The set of entity definitions registered with one session.
///
/// Relationship fields may name entities declared later in the bundle;
/// they are resolved together by [`Registry::new`](super::Registry::new).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaBundle {
    /// Entity definitions in registration order.
    pub entities: Vec<EntityDef>,
}

impl SchemaBundle {
    /// Create an empty schema bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity to the schema.
    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.entities.push(entity);
        self
    }

    /// Get an entity by name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// List all entity names.
    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldDef;

    #[test]
    fn test_schema_bundle() {
        let schema = SchemaBundle::new()
            .with_entity(EntityDef::new("User", "id").with_field(FieldDef::identity("id")))
            .with_entity(EntityDef::new("Class", "id").with_field(FieldDef::identity("id")));

        assert_eq!(schema.entity_names(), vec!["User", "Class"]);
        assert!(schema.get_entity("Class").is_some());
        assert!(schema.get_entity("Pet").is_none());
    }
}
