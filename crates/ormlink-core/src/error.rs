//! Core error types.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::entity::EntityRef;

/// Error type produced by persistence backends.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A value could not be converted to the field's declared type.
    #[error("cannot coerce {found} into {expected} for `{entity}.{field}`")]
    TypeCoercion {
        /// Entity owning the field.
        entity: String,
        /// Field name.
        field: String,
        /// Declared type.
        expected: String,
        /// Offending value.
        found: String,
    },

    /// No back-reference field could be resolved on the related entity.
    #[error("no back-reference for `{entity}.{field}` on `{related}` (tried {tried:?})")]
    MissingBackReference {
        /// Entity declaring the relationship.
        entity: String,
        /// Relationship field.
        field: String,
        /// Related entity.
        related: String,
        /// Candidate names that were tried.
        tried: Vec<String>,
    },

    /// The resolved back-reference is not a matching relationship field.
    #[error("invalid back-reference `{related}.{backref}` for `{entity}.{field}`: {reason}")]
    InvalidBackReference {
        /// Entity declaring the relationship.
        entity: String,
        /// Relationship field.
        field: String,
        /// Related entity.
        related: String,
        /// Resolved back-reference name.
        backref: String,
        /// Why it was rejected.
        reason: String,
    },

    /// More than one field on the related entity claims this relationship.
    #[error("ambiguous back-reference for `{entity}.{field}`: candidates {candidates:?}")]
    AmbiguousBackReference {
        /// Entity declaring the relationship.
        entity: String,
        /// Relationship field.
        field: String,
        /// Conflicting candidates.
        candidates: Vec<String>,
    },

    /// The query uses something other than equality filters.
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    /// Entity type is not registered.
    #[error("unknown entity `{0}`")]
    UnknownEntity(String),

    /// Field is not declared on the entity.
    #[error("unknown field `{entity}.{field}`")]
    UnknownField {
        /// Entity name.
        entity: String,
        /// Field name.
        field: String,
    },

    /// Operation does not apply to this kind of field.
    #[error("`{entity}.{field}` is not a {expected} field")]
    FieldKind {
        /// Entity name.
        entity: String,
        /// Field name.
        field: String,
        /// Kind of field the operation needs.
        expected: &'static str,
    },

    /// An instance of the wrong entity type was supplied.
    #[error("`{entity}.{field}` expects `{expected}`, got `{found}`")]
    EntityTypeMismatch {
        /// Entity name.
        entity: String,
        /// Field name.
        field: String,
        /// Declared related entity.
        expected: String,
        /// Entity type of the supplied instance.
        found: String,
    },

    /// The identity field cannot change after construction.
    #[error("identity `{entity}.{field}` is immutable")]
    ImmutableIdentity {
        /// Entity name.
        entity: String,
        /// Identity field name.
        field: String,
    },

    /// Another instance with this identity is already cached.
    #[error("`{entity}` with id {id} already exists")]
    DuplicateIdentity {
        /// Entity name.
        entity: String,
        /// Identity value.
        id: Uuid,
    },

    /// Handle refers to an instance from a cleared cache.
    #[error("stale entity reference {0}")]
    StaleReference(EntityRef),

    /// A storage row could not be turned into an instance.
    #[error("invalid row for `{entity}`: {reason}")]
    InvalidRow {
        /// Entity name.
        entity: String,
        /// What was wrong.
        reason: String,
    },

    /// Schema registration failed.
    #[error("schema error: {0}")]
    Schema(String),

    /// Cascade failure.
    #[error("cascade error: {0}")]
    Cascade(#[from] CascadeError),

    /// Persistence backend failure, with the operation that triggered it.
    #[error("backend {operation} on `{entity}` failed: {source}")]
    Backend {
        /// Backend operation.
        operation: BackendOperation,
        /// Entity name.
        entity: String,
        /// Underlying backend error.
        #[source]
        source: BackendError,
    },
}

/// Errors raised while cascading a save.
#[derive(Debug, Error)]
pub enum CascadeError {
    /// The relationship graph is deeper than the configured limit.
    #[error("maximum cascade depth exceeded at depth {depth}")]
    MaxDepthExceeded {
        /// Depth reached.
        depth: usize,
    },
}

/// Backend operations, used as error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOperation {
    /// Ensure storage exists.
    Create,
    /// Single-row lookup.
    Get,
    /// Multi-row lookup.
    Find,
    /// Insert or update.
    Save,
}

impl fmt::Display for BackendOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendOperation::Create => "create",
            BackendOperation::Get => "get",
            BackendOperation::Find => "find",
            BackendOperation::Save => "save",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Wrap a backend error with its operation context.
    pub(crate) fn backend(
        operation: BackendOperation,
        entity: impl Into<String>,
        source: BackendError,
    ) -> Self {
        Error::Backend {
            operation,
            entity: entity.into(),
            source,
        }
    }
}
