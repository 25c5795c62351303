//! Error taxonomy for schema building, translation, and authorization.

use std::fmt;

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by the public entry points.
#[derive(Debug, Error)]
pub enum Error {
    /// The SDL document or the incoming operation could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
    /// Schema validation failed; every structural problem is listed.
    #[error(transparent)]
    Schema(#[from] SchemaErrors),
    /// Building or compiling a single operation failed.
    #[error(transparent)]
    Translate(#[from] TranslateError),
    /// The request failed an authentication requirement before compilation.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Collection of every schema validation problem found during a build.
///
/// Schema builds never serve a partial model: if this error is returned the
/// caller got no model at all, and the list is exhaustive rather than
/// first-failure.
#[derive(Debug, Error)]
pub struct SchemaErrors(pub Vec<SchemaError>);

impl fmt::Display for SchemaErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema validation failed with {} error(s): ", self.0.len())?;
        for (idx, err) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Structural problems detected while building the schema model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// `@relationship` names a target type that was never declared.
    #[error("relationship '{type_name}.{field}' targets undeclared type '{target}'")]
    UnknownRelationshipTarget {
        /// Owning entity name.
        type_name: String,
        /// Relationship field name.
        field: String,
        /// The missing target type name.
        target: String,
    },
    /// Two types generate the same root operation or input type name.
    #[error("generated name '{name}' is produced by both '{first}' and '{second}'")]
    DuplicateGeneratedName {
        /// The colliding generated name.
        name: String,
        /// First type producing it.
        first: String,
        /// Second type producing it.
        second: String,
    },
    /// A directive argument was missing, mistyped, or malformed.
    #[error("@{directive} on '{location}': {reason}")]
    DirectiveShape {
        /// Directive name without the leading `@`.
        directive: String,
        /// `Type` or `Type.field` the directive is attached to.
        location: String,
        /// Human-readable description of the shape problem.
        reason: String,
    },
    /// Two directives (or directive options) that cannot coexist were both set.
    #[error("'{location}' sets mutually exclusive options: {first} and {second}")]
    MutuallyExclusive {
        /// `Type` or `Type.field` carrying the conflict.
        location: String,
        /// First option.
        first: &'static str,
        /// Second option.
        second: &'static str,
    },
    /// `[T]` — a nullable list of nullable elements — is not a supported shape.
    #[error("field '{type_name}.{field}' uses unsupported list shape; lists must be non-nullable with non-nullable elements")]
    UnsupportedListShape {
        /// Owning entity name.
        type_name: String,
        /// Offending field name.
        field: String,
    },
    /// A `$jwt.*` / `$context.*` template token could not be parsed.
    #[error("invalid template token '{token}' on '{location}'")]
    InvalidTemplate {
        /// The malformed token text.
        token: String,
        /// `Type` or `Type.field` carrying the token.
        location: String,
    },
    /// Duplicate field name within one entity.
    #[error("type '{type_name}' declares field '{field}' more than once")]
    DuplicateField {
        /// Owning entity name.
        type_name: String,
        /// Duplicated field name.
        field: String,
    },
}

impl SchemaError {
    /// Machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::UnknownRelationshipTarget { .. } => "UnknownRelationshipTarget",
            SchemaError::DuplicateGeneratedName { .. } => "DuplicateGeneratedName",
            SchemaError::DirectiveShape { .. } => "DirectiveShape",
            SchemaError::MutuallyExclusive { .. } => "MutuallyExclusive",
            SchemaError::UnsupportedListShape { .. } => "UnsupportedListShape",
            SchemaError::InvalidTemplate { .. } => "InvalidTemplate",
            SchemaError::DuplicateField { .. } => "DuplicateField",
        }
    }
}

/// Failures while building the query AST or compiling it to Cypher.
///
/// A translation error aborts the one operation; nothing is partially
/// compiled and no statement text is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslateError {
    /// The root field does not correspond to any generated operation.
    #[error("unknown operation field '{field}'")]
    UnknownOperation {
        /// The unrecognized root field name.
        field: String,
    },
    /// A query document invoked a mutation operation or vice versa.
    #[error("operation '{field}' is a {expected} field and cannot be used in a {found}")]
    OperationKindMismatch {
        /// Root field name.
        field: String,
        /// Expected operation type.
        expected: &'static str,
        /// Operation type actually used.
        found: &'static str,
    },
    /// The document contained no executable operation.
    #[error("document contains no executable operation")]
    NoOperation,
    /// More than one root field was selected; one statement per field.
    #[error("exactly one root field may be compiled per statement (got {count})")]
    MultipleRootFields {
        /// Number of root fields selected.
        count: usize,
    },
    /// Deprecated `options` argument mixed with direct sort/pagination args.
    #[error("field '{field}' mixes the deprecated 'options' argument with direct sort/pagination arguments")]
    AmbiguousPagination {
        /// The field carrying both argument styles.
        field: String,
    },
    /// Relay cursor failed to decode back to an offset.
    #[error("invalid cursor '{cursor}'")]
    InvalidCursor {
        /// The opaque cursor text supplied by the caller.
        cursor: String,
    },
    /// Selection or filter referenced a field the entity does not declare.
    #[error("type '{type_name}' has no field '{field}'")]
    UnknownField {
        /// Entity name.
        type_name: String,
        /// The unknown field name.
        field: String,
    },
    /// Boolean combinator held something other than the expected shape.
    #[error("malformed '{combinator}' combinator: {reason}")]
    MalformedCombinator {
        /// `AND`, `OR`, or `NOT`.
        combinator: &'static str,
        /// What was wrong with it.
        reason: &'static str,
    },
    /// A filter leaf received a value its operator cannot accept.
    #[error("invalid filter value for '{field}': {reason}")]
    InvalidFilterValue {
        /// Filter key as written in the document.
        field: String,
        /// Why the value is unacceptable.
        reason: &'static str,
    },
    /// Update tried to null out a non-nullable field.
    #[error("Cannot set non-nullable field `{type_name}.{field}` to null")]
    NonNullableNull {
        /// Entity name.
        type_name: String,
        /// Field name.
        field: String,
    },
    /// A nested mutation step is not in the relationship's whitelist.
    #[error("nested operation {operation} is not allowed on '{type_name}.{field}'")]
    NestedOperationNotAllowed {
        /// Entity name.
        type_name: String,
        /// Relationship field name.
        field: String,
        /// The disallowed nested operation.
        operation: &'static str,
    },
    /// Creating a node without its required singular relationship.
    #[error("{type_name}.{field} required exactly once")]
    RequiredRelationshipMissing {
        /// Entity name.
        type_name: String,
        /// Relationship field name.
        field: String,
    },
    /// A `$jwt.*` / `$context.*` label template had no value at request time.
    #[error("unresolved template token '{token}'")]
    UnresolvedTemplate {
        /// The token that failed to resolve.
        token: String,
    },
    /// A callback default had no resolved value in the request context.
    #[error("no resolved value for callback default '{name}'")]
    UnresolvedCallback {
        /// Callback name from `@default(callback:)`.
        name: String,
    },
    /// Attribute is not settable for the attempted mutation phase.
    #[error("field '{type_name}.{field}' is not settable on {phase}")]
    NotSettable {
        /// Entity name.
        type_name: String,
        /// Field name.
        field: String,
        /// `create` or `update`.
        phase: &'static str,
    },
    /// Sort referenced a field that is not a sortable attribute.
    #[error("cannot sort '{type_name}' by '{field}'")]
    UnknownSortField {
        /// Entity name.
        type_name: String,
        /// The unsortable key.
        field: String,
    },
    /// Fulltext/vector argument referenced an undeclared index.
    #[error("type '{type_name}' declares no index named '{index}'")]
    UnknownIndex {
        /// Entity name.
        type_name: String,
        /// The missing index name.
        index: String,
    },
}

impl TranslateError {
    /// Machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            TranslateError::UnknownOperation { .. } => "UnknownOperation",
            TranslateError::OperationKindMismatch { .. } => "OperationKindMismatch",
            TranslateError::NoOperation => "NoOperation",
            TranslateError::MultipleRootFields { .. } => "MultipleRootFields",
            TranslateError::AmbiguousPagination { .. } => "AmbiguousPagination",
            TranslateError::InvalidCursor { .. } => "InvalidCursor",
            TranslateError::UnknownField { .. } => "UnknownField",
            TranslateError::MalformedCombinator { .. } => "MalformedCombinator",
            TranslateError::InvalidFilterValue { .. } => "InvalidFilterValue",
            TranslateError::NonNullableNull { .. } => "NonNullableNull",
            TranslateError::NestedOperationNotAllowed { .. } => "NestedOperationNotAllowed",
            TranslateError::RequiredRelationshipMissing { .. } => "RequiredRelationshipMissing",
            TranslateError::UnresolvedTemplate { .. } => "UnresolvedTemplate",
            TranslateError::UnresolvedCallback { .. } => "UnresolvedCallback",
            TranslateError::NotSettable { .. } => "NotSettable",
            TranslateError::UnknownSortField { .. } => "UnknownSortField",
            TranslateError::UnknownIndex { .. } => "UnknownIndex",
        }
    }
}

/// Authentication failures detected before compilation.
///
/// Authorization `validate` failures are not represented here: they compile
/// into an in-statement guard and surface at execution time as an opaque
/// "Forbidden" raised by the database.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The operation requires a decoded JWT and none was present.
    #[error("Unauthenticated")]
    Unauthenticated,
}
