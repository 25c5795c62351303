//! Per-request query AST: argument resolution, filter/sort/pagination
//! parsing, projection trees, mutation inputs, and the factory that binds a
//! document's root field to a schema operation.

pub mod arg;
pub mod factory;
pub mod filter;
pub mod mutation;
pub mod node;
pub mod pagination;
pub mod projection;
pub mod sort;

pub use arg::ArgValue;
pub use factory::OperationFactory;
pub use filter::{AggFunc, Filter, FilterOp, FilterValue, Quantifier};
pub use node::Operation;
pub use pagination::{decode_cursor, encode_cursor, Pagination};
pub use projection::{Projection, ProjectionField};
pub use sort::SortItem;
