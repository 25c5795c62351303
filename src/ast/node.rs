//! Typed query-AST operations: one tree per request, built by the factory
//! from the immutable schema model and the parsed document, consumed once by
//! the compiler and discarded.

use crate::ast::arg::ArgValue;
use crate::ast::filter::{AggFunc, Filter};
use crate::ast::mutation::{CreateInput, RelationshipInput, UpdateInput};
use crate::ast::pagination::Pagination;
use crate::ast::projection::Projection;
use crate::ast::sort::SortItem;

/// Fulltext phrase search attached to a read.
#[derive(Clone, Debug)]
pub struct FulltextSearch {
    /// Declared index name.
    pub index: String,
    /// Phrase argument, bound as a parameter.
    pub phrase: ArgValue,
}

/// Plural read (`movies`).
#[derive(Clone, Debug)]
pub struct ReadOperation {
    /// Entity name.
    pub entity: String,
    /// `where` filter.
    pub filter: Option<Filter>,
    /// Fulltext phrase search, replacing the plain label match.
    pub fulltext: Option<FulltextSearch>,
    /// Ordering keys.
    pub sort: Vec<SortItem>,
    /// SKIP/LIMIT bounds.
    pub pagination: Pagination,
    /// Selected output fields.
    pub projection: Projection,
}

/// Relay-style connection read (`moviesConnection`).
#[derive(Clone, Debug)]
pub struct ConnectionOperation {
    /// Entity name.
    pub entity: String,
    /// `where` filter.
    pub filter: Option<Filter>,
    /// Ordering keys.
    pub sort: Vec<SortItem>,
    /// `first` page size.
    pub first: Option<i64>,
    /// Offset decoded from the `after` cursor.
    pub offset: i64,
    /// Payload shape.
    pub selection: ConnectionSelection,
}

/// Which parts of the connection payload were selected.
#[derive(Clone, Debug, Default)]
pub struct ConnectionSelection {
    /// `totalCount` output key.
    pub total_count: Option<String>,
    /// `pageInfo` selection.
    pub page_info: Option<PageInfoSelection>,
    /// `edges` selection.
    pub edges: Option<EdgesSelection>,
}

/// `pageInfo { … }` selection.
#[derive(Clone, Debug)]
pub struct PageInfoSelection {
    /// Output key of `pageInfo` itself.
    pub alias: String,
    /// `hasNextPage` output key.
    pub has_next_page: Option<String>,
    /// `hasPreviousPage` output key.
    pub has_previous_page: Option<String>,
    /// `endCursor` output key.
    pub end_cursor: Option<String>,
}

/// `edges { … }` selection.
#[derive(Clone, Debug)]
pub struct EdgesSelection {
    /// Output key of `edges` itself.
    pub alias: String,
    /// `cursor` output key.
    pub cursor: Option<String>,
    /// `node { … }` output key and projection.
    pub node: Option<(String, Projection)>,
}

/// Aggregate read (`moviesAggregate`).
#[derive(Clone, Debug)]
pub struct AggregateOperation {
    /// Entity name.
    pub entity: String,
    /// `where` filter.
    pub filter: Option<Filter>,
    /// Selected aggregations in document order.
    pub selections: Vec<AggregateSelection>,
}

/// One selected aggregation.
#[derive(Clone, Debug)]
pub enum AggregateSelection {
    /// Node count.
    Count {
        /// Output key.
        alias: String,
    },
    /// Per-attribute aggregations (`title { shortest longest }`).
    Field {
        /// Output key of the attribute block.
        alias: String,
        /// Attribute name.
        field: String,
        /// Selected functions with their output keys.
        funcs: Vec<(String, AggFunc)>,
    },
}

/// Vector similarity read generated from `@vector(queryName:)`.
#[derive(Clone, Debug)]
pub struct VectorReadOperation {
    /// Entity name.
    pub entity: String,
    /// Declared vector index name.
    pub index: String,
    /// Query vector argument, bound as a parameter.
    pub vector: ArgValue,
    /// `where` filter applied after the index lookup.
    pub filter: Option<Filter>,
    /// SKIP/LIMIT bounds.
    pub pagination: Pagination,
    /// Projection applied to each matched node.
    pub projection: Projection,
    /// `score` output key, when selected.
    pub score: Option<String>,
}

/// `create<Plural>` mutation.
#[derive(Clone, Debug)]
pub struct CreateOperation {
    /// Entity name.
    pub entity: String,
    /// One input per node to create, in input order.
    pub inputs: Vec<CreateInput>,
    /// Payload projection: the plural field's output key and selection.
    pub projection: Option<(String, Projection)>,
}

/// `update<Plural>` mutation.
#[derive(Clone, Debug)]
pub struct UpdateOperation {
    /// Entity name.
    pub entity: String,
    /// `where` filter selecting the nodes to update.
    pub filter: Option<Filter>,
    /// Attribute operations plus relationship cascades.
    pub update: UpdateInput,
    /// Payload projection: the plural field's output key and selection.
    pub projection: Option<(String, Projection)>,
}

/// `delete<Plural>` mutation.
#[derive(Clone, Debug)]
pub struct DeleteOperation {
    /// Entity name.
    pub entity: String,
    /// `where` filter selecting the nodes to delete.
    pub filter: Option<Filter>,
    /// Nested delete cascades applied before the parent delete.
    pub cascades: Vec<RelationshipInput>,
}

/// The query-AST root: one per compiled statement.
#[derive(Clone, Debug)]
pub enum Operation {
    /// Plural read.
    Read(ReadOperation),
    /// Relay connection read.
    Connection(ConnectionOperation),
    /// Aggregate read.
    Aggregate(AggregateOperation),
    /// Vector similarity read.
    VectorRead(VectorReadOperation),
    /// Create mutation.
    Create(CreateOperation),
    /// Update mutation.
    Update(UpdateOperation),
    /// Delete mutation.
    Delete(DeleteOperation),
}

impl Operation {
    /// Entity the operation is rooted at.
    pub fn entity(&self) -> &str {
        match self {
            Operation::Read(op) => &op.entity,
            Operation::Connection(op) => &op.entity,
            Operation::Aggregate(op) => &op.entity,
            Operation::VectorRead(op) => &op.entity,
            Operation::Create(op) => &op.entity,
            Operation::Update(op) => &op.entity,
            Operation::Delete(op) => &op.entity,
        }
    }

    /// True for create/update/delete.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Operation::Create(_) | Operation::Update(_) | Operation::Delete(_)
        )
    }
}
