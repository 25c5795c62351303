//! Schema model: typed descriptors built once from the directive-annotated
//! SDL document and shared read-only by every request.

pub mod build;
pub mod directive;
pub mod model;
pub mod naming;

pub use build::build;
pub use directive::{
    AuthOperation, AuthorizationAnnotation, DefaultValue, FulltextIndex, LabelSpec,
    NestedOperation, RelDirection, VectorIndex,
};
pub use model::{
    Attribute, CompositeEntity, CompositeKind, Entity, OperationBinding, OperationKind,
    Relationship, RelationshipProperties, SchemaModel,
};
