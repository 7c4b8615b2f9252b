//! Relation definitions between entities.

use serde::{Deserialize, Serialize};

/// Cardinality of a relation, seen from the declaring field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// Reference paired with a reference.
    OneToOne,
    /// Collection paired with a reference on the member type.
    OneToMany,
    /// Reference paired with a collection on the referenced type.
    ManyToOne,
    /// Collection paired with a collection.
    ManyToMany,
}

impl Cardinality {
    /// Derive cardinality from the shapes of the two sides.
    pub fn from_shapes(from_is_collection: bool, to_is_collection: bool) -> Self {
        match (from_is_collection, to_is_collection) {
            (false, false) => Cardinality::OneToOne,
            (true, false) => Cardinality::OneToMany,
            (false, true) => Cardinality::ManyToOne,
            (true, true) => Cardinality::ManyToMany,
        }
    }

    /// The same relation seen from the other side.
    pub fn inverse(self) -> Self {
        match self {
            Cardinality::OneToMany => Cardinality::ManyToOne,
            Cardinality::ManyToOne => Cardinality::OneToMany,
            other => other,
        }
    }

    /// Whether the declaring side holds a collection.
    pub fn from_is_collection(self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }

    /// Whether the back-reference side holds a collection.
    pub fn to_is_collection(self) -> bool {
        matches!(self, Cardinality::ManyToOne | Cardinality::ManyToMany)
    }
}

/// A resolved relation descriptor.
///
/// One descriptor exists per relationship field; the two fields of a pair have
/// mirrored descriptors (see [`RelationDef::inverse`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Relation name, `Entity.field`.
    pub name: String,
    /// Entity declaring the field.
    pub from_entity: String,
    /// Field on the declaring entity.
    pub from_field: String,
    /// Related entity.
    pub to_entity: String,
    /// Back-reference field on the related entity.
    pub to_field: String,
    /// Relation cardinality.
    pub cardinality: Cardinality,
}

impl RelationDef {
    /// Create a relation descriptor.
    pub fn new(
        from_entity: impl Into<String>,
        from_field: impl Into<String>,
        to_entity: impl Into<String>,
        to_field: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        let from_entity = from_entity.into();
        let from_field = from_field.into();
        Self {
            name: format!("{from_entity}.{from_field}"),
            from_entity,
            from_field,
            to_entity: to_entity.into(),
            to_field: to_field.into(),
            cardinality,
        }
    }

    /// Check if this is a one-to-one relation.
    pub fn is_one_to_one(&self) -> bool {
        self.cardinality == Cardinality::OneToOne
    }

    /// Check if this is a many-to-many relation.
    pub fn is_many_to_many(&self) -> bool {
        self.cardinality == Cardinality::ManyToMany
    }

    /// Get the inverse relation (swapping from/to).
    pub fn inverse(&self) -> Self {
        Self::new(
            self.to_entity.clone(),
            self.to_field.clone(),
            self.from_entity.clone(),
            self.from_field.clone(),
            self.cardinality.inverse(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinality_from_shapes() {
        assert_eq!(Cardinality::from_shapes(false, false), Cardinality::OneToOne);
        assert_eq!(Cardinality::from_shapes(true, false), Cardinality::OneToMany);
        assert_eq!(Cardinality::from_shapes(false, true), Cardinality::ManyToOne);
        assert_eq!(Cardinality::from_shapes(true, true), Cardinality::ManyToMany);
    }

    #[test]
    fn test_one_to_one_relation() {
        let rel = RelationDef::new("User", "profile", "Profile", "user", Cardinality::OneToOne);

        assert_eq!(rel.name, "User.profile");
        assert!(!rel.cardinality.from_is_collection());
        assert!(!rel.cardinality.to_is_collection());
        assert!(rel.is_one_to_one());
        assert!(!rel.is_many_to_many());
    }

    #[test]
    fn test_many_to_many_relation() {
        let rel = RelationDef::new("Human", "pets", "Pet", "humans", Cardinality::ManyToMany);

        assert!(rel.is_many_to_many());
        assert_eq!(rel.inverse().cardinality, Cardinality::ManyToMany);
    }

    #[test]
    fn test_inverse_relation() {
        let rel = RelationDef::new("Class", "users", "User", "class_", Cardinality::OneToMany);
        let inverse = rel.inverse();

        assert_eq!(inverse.name, "User.class_");
        assert_eq!(inverse.from_entity, "User");
        assert_eq!(inverse.to_field, "users");
        assert_eq!(inverse.cardinality, Cardinality::ManyToOne);
    }
}
