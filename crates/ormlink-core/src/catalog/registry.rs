//! Entity type registry.
//!
//! The registry is built once from a [`SchemaBundle`]. Building it validates
//! every entity, resolves the back-reference of every relationship field and
//! caches the result as a [`RelationDef`] next to the field, so that mutations
//! never have to inspect declared types again.

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::{
    Cardinality, DefaultValue, EntityDef, FieldDef, FieldType, RelationDef, ScalarType,
    SchemaBundle,
};
use crate::config::SessionConfig;
use crate::error::Error;
use crate::value::Value;

/// Index of an entity type within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityTypeId(pub(crate) u32);

impl EntityTypeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntityTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// A registered entity type with resolved relationships.
#[derive(Debug, Clone)]
pub struct EntityType {
    id: EntityTypeId,
    def: EntityDef,
    field_index: HashMap<String, usize>,
    identity: usize,
    /// Aligned with `def.fields`.
    relations: Vec<Option<RelationDef>>,
    /// Aligned with `def.fields`; the related type of relationship fields.
    related: Vec<Option<EntityTypeId>>,
    /// Aligned with `def.fields`; position of the back-reference on the related type.
    backrefs: Vec<Option<usize>>,
}

impl EntityType {
    /// Type id.
    pub fn id(&self) -> EntityTypeId {
        self.id
    }

    /// Entity name.
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Underlying definition.
    pub fn def(&self) -> &EntityDef {
        &self.def
    }

    /// Number of declared fields.
    pub fn field_count(&self) -> usize {
        self.def.fields.len()
    }

    /// Field definition by position.
    pub fn field(&self, index: usize) -> &FieldDef {
        &self.def.fields[index]
    }

    /// Position of a field by name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_index.get(name).copied()
    }

    /// Position of a field by name, or `UnknownField`.
    pub fn require_field(&self, name: &str) -> Result<usize, Error> {
        self.field_index(name).ok_or_else(|| Error::UnknownField {
            entity: self.def.name.clone(),
            field: name.to_string(),
        })
    }

    /// Position of the identity field.
    pub fn identity_index(&self) -> usize {
        self.identity
    }

    /// Name of the identity field.
    pub fn identity_field(&self) -> &str {
        &self.def.identity_field
    }

    /// Resolved relation for a relationship field.
    pub fn relation(&self, index: usize) -> Option<&RelationDef> {
        self.relations[index].as_ref()
    }

    /// Related type of a relationship field.
    pub fn related(&self, index: usize) -> Option<EntityTypeId> {
        self.related[index]
    }

    /// Position of the back-reference field on the related type.
    pub fn backref_index(&self, index: usize) -> Option<usize> {
        self.backrefs[index]
    }

    /// All resolved relations declared by this type.
    pub fn relations(&self) -> impl Iterator<Item = &RelationDef> {
        self.relations.iter().flatten()
    }
}

/// All entity types of one session.
#[derive(Debug, Clone)]
pub struct Registry {
    types: Vec<EntityType>,
    by_name: HashMap<String, EntityTypeId>,
}

impl Registry {
    /// Validate a schema and resolve its relationships.
    pub fn new(schema: SchemaBundle, config: &SessionConfig) -> Result<Self, Error> {
        let mut by_name = HashMap::new();
        for (i, entity) in schema.entities.iter().enumerate() {
            if by_name
                .insert(entity.name.clone(), EntityTypeId(i as u32))
                .is_some()
            {
                return Err(Error::Schema(format!(
                    "entity `{}` registered twice",
                    entity.name
                )));
            }
        }

        let mut defs = schema.entities;
        for def in &mut defs {
            validate_entity(def, &by_name)?;
        }

        // Resolve every relationship field independently, then require pairs to agree.
        let mut backrefs: HashMap<(String, String), String> = HashMap::new();
        for def in &defs {
            for field in def.relation_fields() {
                let backref = resolve_backref(&defs, &by_name, def, field, config)?;
                backrefs.insert((def.name.clone(), field.name.clone()), backref);
            }
        }

        let mut types = Vec::with_capacity(defs.len());
        for (i, def) in defs.iter().enumerate() {
            let mut relations = Vec::with_capacity(def.fields.len());
            let mut related = Vec::with_capacity(def.fields.len());
            let mut backref_positions = Vec::with_capacity(def.fields.len());

            for field in &def.fields {
                let Some(related_name) = field.field_type.related_entity() else {
                    relations.push(None);
                    related.push(None);
                    backref_positions.push(None);
                    continue;
                };
                let related_id = by_name[related_name];
                let related_def = &defs[related_id.index()];
                let backref = &backrefs[&(def.name.clone(), field.name.clone())];
                let backref_field = check_backref(def, field, related_def, backref)?;

                let mirrored = &backrefs[&(related_def.name.clone(), backref.clone())];
                if *mirrored != field.name {
                    return Err(Error::InvalidBackReference {
                        entity: def.name.clone(),
                        field: field.name.clone(),
                        related: related_def.name.clone(),
                        backref: backref.clone(),
                        reason: format!("it mirrors `{mirrored}` instead"),
                    });
                }

                relations.push(Some(RelationDef::new(
                    &def.name,
                    &field.name,
                    &related_def.name,
                    backref,
                    Cardinality::from_shapes(
                        field.field_type.is_collection(),
                        backref_field.field_type.is_collection(),
                    ),
                )));
                related.push(Some(related_id));
                backref_positions.push(related_def.fields.iter().position(|f| f.name == *backref));
            }

            let field_index = def
                .fields
                .iter()
                .enumerate()
                .map(|(idx, f)| (f.name.clone(), idx))
                .collect();
            let identity = def
                .fields
                .iter()
                .position(|f| f.name == def.identity_field)
                .unwrap_or_default();

            types.push(EntityType {
                id: EntityTypeId(i as u32),
                def: def.clone(),
                field_index,
                identity,
                relations,
                related,
                backrefs: backref_positions,
            });
        }

        check_construction_cycles(&defs, &by_name)?;

        tracing::debug!(
            entities = types.len(),
            relations = types.iter().map(|t| t.relations().count()).sum::<usize>(),
            "Registry built"
        );

        Ok(Self { types, by_name })
    }

    /// Look up an entity type by name.
    pub fn lookup(&self, name: &str) -> Result<&EntityType, Error> {
        self.by_name
            .get(name)
            .map(|id| &self.types[id.index()])
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Entity type by id.
    pub fn entity(&self, id: EntityTypeId) -> &EntityType {
        &self.types[id.index()]
    }

    /// Iterate over registered types in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityType> {
        self.types.iter()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no types are registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All resolved relations.
    pub fn relations(&self) -> impl Iterator<Item = &RelationDef> {
        self.types.iter().flat_map(|t| t.relations())
    }
}

fn validate_entity(def: &mut EntityDef, by_name: &HashMap<String, EntityTypeId>) -> Result<(), Error> {
    let mut seen = HashSet::new();
    for field in &def.fields {
        if !seen.insert(field.name.as_str()) {
            return Err(Error::Schema(format!(
                "field `{}.{}` declared twice",
                def.name, field.name
            )));
        }

        if let Some(related) = field.field_type.related_entity() {
            if !by_name.contains_key(related) {
                return Err(Error::UnknownEntity(related.to_string()));
            }
        } else if field.backref.is_some() {
            return Err(Error::Schema(format!(
                "`{}.{}` declares a back-reference but is not a relationship",
                def.name, field.name
            )));
        }

        match &field.default {
            Some(DefaultValue::NewEntity) if !field.field_type.is_reference() => {
                return Err(Error::Schema(format!(
                    "`{}.{}` can only default to a new entity if it is a reference",
                    def.name, field.name
                )));
            }
            Some(default) => {
                if let Some(literal) = literal_default(default) {
                    if field.field_type.coerce(literal).is_none() {
                        return Err(Error::Schema(format!(
                            "default of `{}.{}` does not fit {}",
                            def.name,
                            field.name,
                            field.field_type.describe()
                        )));
                    }
                }
            }
            None => {}
        }
    }

    let name = def.name.clone();
    let identity_field = def.identity_field.clone();
    let identity = def
        .fields
        .iter_mut()
        .find(|f| f.name == identity_field)
        .ok_or_else(|| Error::Schema(format!("`{name}` has no identity field `{identity_field}`")))?;

    if identity.field_type != FieldType::Scalar(ScalarType::Uuid) {
        return Err(Error::Schema(format!(
            "identity `{name}.{identity_field}` must be a UUID"
        )));
    }
    if identity.default.is_none() {
        identity.default = Some(DefaultValue::AutoUuid);
    }
    identity.required = true;

    Ok(())
}

/// The value of a literal default, if it has one.
pub(crate) fn literal_default(default: &DefaultValue) -> Option<Value> {
    match default {
        DefaultValue::Bool(b) => Some(Value::Bool(*b)),
        DefaultValue::Int(i) => Some(Value::Int(*i)),
        DefaultValue::Float(f) => Some(Value::Float(*f)),
        DefaultValue::String(s) | DefaultValue::Enum(s) => Some(Value::String(s.clone())),
        DefaultValue::AutoUuid
        | DefaultValue::CurrentTimestamp
        | DefaultValue::Factory(_)
        | DefaultValue::NewEntity => None,
    }
}

/// Find the back-reference name of a relationship field.
///
/// Order: explicit name, the other side's explicit declaration naming this
/// field, the lowercased owner name, then its plural.
fn resolve_backref(
    defs: &[EntityDef],
    by_name: &HashMap<String, EntityTypeId>,
    owner: &EntityDef,
    field: &FieldDef,
    config: &SessionConfig,
) -> Result<String, Error> {
    let related_name = field.field_type.related_entity().unwrap_or_default();
    let related = &defs[by_name[related_name].index()];

    let missing = |tried: Vec<String>| Error::MissingBackReference {
        entity: owner.name.clone(),
        field: field.name.clone(),
        related: related.name.clone(),
        tried,
    };

    if let Some(explicit) = &field.backref {
        return match related.get_field(explicit) {
            Some(_) => Ok(explicit.clone()),
            None => Err(missing(vec![explicit.clone()])),
        };
    }

    let claims: Vec<&FieldDef> = related
        .relation_fields()
        .filter(|f| {
            f.backref.as_deref() == Some(field.name.as_str())
                && f.field_type.related_entity() == Some(owner.name.as_str())
        })
        .collect();
    match claims.as_slice() {
        [only] => return Ok(only.name.clone()),
        [] => {}
        many => {
            return Err(Error::AmbiguousBackReference {
                entity: owner.name.clone(),
                field: field.name.clone(),
                candidates: many.iter().map(|f| f.name.clone()).collect(),
            })
        }
    }

    if !config.infer_backrefs {
        return Err(missing(Vec::new()));
    }

    let singular = owner.name.to_lowercase();
    let mut tried = vec![singular.clone()];
    if related.get_field(&singular).is_some() {
        return Ok(singular);
    }
    if config.pluralize_backrefs {
        let plural = format!("{singular}s");
        if related.get_field(&plural).is_some() {
            return Ok(plural);
        }
        tried.push(plural);
    }

    Err(missing(tried))
}

/// Check that a resolved back-reference points back at the owner.
fn check_backref<'a>(
    owner: &EntityDef,
    field: &FieldDef,
    related: &'a EntityDef,
    backref: &str,
) -> Result<&'a FieldDef, Error> {
    let invalid = |reason: String| Error::InvalidBackReference {
        entity: owner.name.clone(),
        field: field.name.clone(),
        related: related.name.clone(),
        backref: backref.to_string(),
        reason,
    };

    let target = related
        .get_field(backref)
        .ok_or_else(|| invalid("field does not exist".to_string()))?;

    match target.field_type.related_entity() {
        None => Err(invalid(format!(
            "it is a {} field, not a relationship",
            target.field_type.describe()
        ))),
        Some(points_to) if points_to != owner.name => {
            Err(invalid(format!("it points to `{points_to}`")))
        }
        Some(_) => Ok(target),
    }
}

/// Reject `NewEntity` defaults that would construct each other forever.
fn check_construction_cycles(
    defs: &[EntityDef],
    by_name: &HashMap<String, EntityTypeId>,
) -> Result<(), Error> {
    fn visit(
        node: usize,
        edges: &[Vec<usize>],
        state: &mut [u8],
        defs: &[EntityDef],
    ) -> Result<(), Error> {
        // 0 = unvisited, 1 = on stack, 2 = done
        match state[node] {
            1 => {
                return Err(Error::Schema(format!(
                    "default construction cycle through `{}`",
                    defs[node].name
                )))
            }
            2 => return Ok(()),
            _ => {}
        }
        state[node] = 1;
        for &next in &edges[node] {
            visit(next, edges, state, defs)?;
        }
        state[node] = 2;
        Ok(())
    }

    let edges: Vec<Vec<usize>> = defs
        .iter()
        .map(|def| {
            def.fields
                .iter()
                .filter(|f| matches!(f.default, Some(DefaultValue::NewEntity)))
                .filter_map(|f| f.field_type.related_entity())
                .map(|name| by_name[name].index())
                .collect()
        })
        .collect();

    let mut state = vec![0u8; defs.len()];
    for node in 0..defs.len() {
        visit(node, &edges, &mut state, defs)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(profile: FieldDef) -> EntityDef {
        EntityDef::new("User", "id")
            .with_field(FieldDef::identity("id"))
            .with_field(FieldDef::new("name", FieldType::scalar(ScalarType::String)))
            .with_field(profile)
    }

    fn profile() -> EntityDef {
        EntityDef::new("Profile", "id")
            .with_field(FieldDef::identity("id"))
            .with_field(FieldDef::reference("user", "User").with_backref("profile"))
    }

    fn build(schema: SchemaBundle) -> Result<Registry, Error> {
        Registry::new(schema, &SessionConfig::default())
    }

    #[test]
    fn test_one_to_one_resolution() {
        let registry = build(
            SchemaBundle::new()
                .with_entity(user(FieldDef::reference("profile", "Profile").with_backref("user")))
                .with_entity(profile()),
        )
        .unwrap();

        let user = registry.lookup("User").unwrap();
        let rel = user.relation(user.field_index("profile").unwrap()).unwrap();
        assert_eq!(rel.to_entity, "Profile");
        assert_eq!(rel.to_field, "user");
        assert_eq!(rel.cardinality, Cardinality::OneToOne);
        assert_eq!(registry.relations().count(), 2);

        let profile = registry.lookup("Profile").unwrap();
        let idx = user.field_index("profile").unwrap();
        assert_eq!(user.related(idx), Some(profile.id()));
        assert_eq!(user.backref_index(idx), profile.field_index("user"));
    }

    #[test]
    fn test_mirror_inference_from_other_side() {
        // User.profile declares nothing; Profile.user names it explicitly.
        let registry = build(
            SchemaBundle::new()
                .with_entity(user(FieldDef::reference("profile", "Profile")))
                .with_entity(profile()),
        )
        .unwrap();

        let user = registry.lookup("User").unwrap();
        let rel = user.relation(user.field_index("profile").unwrap()).unwrap();
        assert_eq!(rel.to_field, "user");
    }

    #[test]
    fn test_plural_inference() {
        let registry = build(
            SchemaBundle::new()
                .with_entity(
                    EntityDef::new("User", "id")
                        .with_field(FieldDef::identity("id"))
                        .with_field(FieldDef::reference("class_", "Class")),
                )
                .with_entity(
                    EntityDef::new("Class", "id")
                        .with_field(FieldDef::identity("id"))
                        .with_field(FieldDef::collection("users", "User").with_backref("class_")),
                ),
        )
        .unwrap();

        let user = registry.lookup("User").unwrap();
        let rel = user.relation(user.field_index("class_").unwrap()).unwrap();
        assert_eq!(rel.to_field, "users");
        assert_eq!(rel.cardinality, Cardinality::ManyToOne);

        let class = registry.lookup("Class").unwrap();
        let rel = class.relation(class.field_index("users").unwrap()).unwrap();
        assert_eq!(rel.cardinality, Cardinality::OneToMany);
    }

    #[test]
    fn test_pure_name_inference_without_explicit_side() {
        let registry = build(
            SchemaBundle::new()
                .with_entity(
                    EntityDef::new("Post", "id")
                        .with_field(FieldDef::identity("id"))
                        .with_field(FieldDef::reference("author", "Author")),
                )
                .with_entity(
                    EntityDef::new("Author", "id")
                        .with_field(FieldDef::identity("id"))
                        .with_field(FieldDef::collection("posts", "Post").with_backref("author")),
                ),
        );
        assert!(registry.is_ok());

        let err = Registry::new(
            SchemaBundle::new()
                .with_entity(
                    EntityDef::new("Post", "id")
                        .with_field(FieldDef::identity("id"))
                        .with_field(FieldDef::reference("writer", "Author")),
                )
                .with_entity(
                    EntityDef::new("Author", "id")
                        .with_field(FieldDef::identity("id"))
                        .with_field(FieldDef::collection("posts", "Post")),
                ),
            &SessionConfig::default(),
        )
        .unwrap_err();
        match err {
            Error::MissingBackReference { field, tried, .. } => {
                assert_eq!(field, "posts");
                assert_eq!(tried, vec!["author".to_string(), "authors".to_string()]);
            }
            other => panic!("Expected MissingBackReference, got {other:?}"),
        }
    }

    #[test]
    fn test_inference_disabled_requires_explicit_side() {
        let config = SessionConfig::default().infer_backrefs(false);
        let schema = SchemaBundle::new()
            .with_entity(
                EntityDef::new("User", "id")
                    .with_field(FieldDef::identity("id"))
                    .with_field(FieldDef::reference("class_", "Class")),
            )
            .with_entity(
                EntityDef::new("Class", "id")
                    .with_field(FieldDef::identity("id"))
                    .with_field(FieldDef::collection("users", "User")),
            );

        assert!(matches!(
            Registry::new(schema, &config),
            Err(Error::MissingBackReference { .. })
        ));
    }

    #[test]
    fn test_invalid_backref_to_scalar() {
        let err = build(
            SchemaBundle::new()
                .with_entity(user(FieldDef::reference("profile", "Profile").with_backref("bio")))
                .with_entity(
                    EntityDef::new("Profile", "id")
                        .with_field(FieldDef::identity("id"))
                        .with_field(FieldDef::new("bio", FieldType::scalar(ScalarType::String))),
                ),
        )
        .unwrap_err();

        assert!(matches!(err, Error::InvalidBackReference { ref backref, .. } if backref == "bio"));
    }

    #[test]
    fn test_asymmetric_pair_rejected() {
        let err = build(
            SchemaBundle::new()
                .with_entity(
                    user(FieldDef::reference("profile", "Profile").with_backref("owner"))
                        .with_field(FieldDef::reference("backup", "Profile").with_backref("owner")),
                )
                .with_entity(
                    EntityDef::new("Profile", "id")
                        .with_field(FieldDef::identity("id"))
                        .with_field(FieldDef::reference("owner", "User").with_backref("profile")),
                ),
        )
        .unwrap_err();

        assert!(matches!(err, Error::InvalidBackReference { ref field, .. } if field == "backup"));
    }

    #[test]
    fn test_ambiguous_claims() {
        let err = build(
            SchemaBundle::new()
                .with_entity(user(FieldDef::reference("profile", "Profile")))
                .with_entity(
                    EntityDef::new("Profile", "id")
                        .with_field(FieldDef::identity("id"))
                        .with_field(FieldDef::reference("user", "User").with_backref("profile"))
                        .with_field(FieldDef::reference("editor", "User").with_backref("profile")),
                ),
        )
        .unwrap_err();

        assert!(matches!(err, Error::AmbiguousBackReference { .. }));
    }

    #[test]
    fn test_identity_must_be_uuid() {
        let err = build(SchemaBundle::new().with_entity(
            EntityDef::new("Tag", "id")
                .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Int64))),
        ))
        .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));

        // Identity without a default gets an auto UUID.
        let registry = build(SchemaBundle::new().with_entity(
            EntityDef::new("Tag", "id")
                .with_field(FieldDef::new("id", FieldType::scalar(ScalarType::Uuid))),
        ))
        .unwrap();
        let tag = registry.lookup("Tag").unwrap();
        assert_eq!(
            tag.field(tag.identity_index()).default,
            Some(DefaultValue::AutoUuid)
        );
    }

    #[test]
    fn test_unknown_related_entity() {
        let err = build(SchemaBundle::new().with_entity(user(FieldDef::reference(
            "profile", "Profile",
        ))))
        .unwrap_err();
        assert!(matches!(err, Error::UnknownEntity(ref name) if name == "Profile"));
    }

    #[test]
    fn test_construction_cycle_rejected() {
        let err = build(
            SchemaBundle::new()
                .with_entity(user(
                    FieldDef::reference("profile", "Profile")
                        .with_backref("user")
                        .with_default(DefaultValue::NewEntity),
                ))
                .with_entity(
                    EntityDef::new("Profile", "id")
                        .with_field(FieldDef::identity("id"))
                        .with_field(
                            FieldDef::reference("user", "User")
                                .with_backref("profile")
                                .with_default(DefaultValue::NewEntity),
                        ),
                ),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Schema(ref msg) if msg.contains("cycle")));
    }

    #[test]
    fn test_bad_literal_default() {
        let err = build(SchemaBundle::new().with_entity(
            EntityDef::new("Counter", "id")
                .with_field(FieldDef::identity("id"))
                .with_field(
                    FieldDef::new("count", FieldType::scalar(ScalarType::Int64))
                        .with_default(DefaultValue::String("many".into())),
                ),
        ))
        .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }
}
