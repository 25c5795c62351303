//! Cypher builder: clause/expression trees that serialize to statement text
//! with positional parameters.
//!
//! The builder has no knowledge of GraphQL. Its injection-safety invariant:
//! no user-supplied value is ever concatenated into Cypher text — values go
//! through the [`env::Environment`] parameter bag, and identifiers that may
//! originate from user/context/JWT input go through [`escape`].

pub mod clause;
pub mod env;
pub mod escape;
pub mod expr;

pub use clause::{render_statement, Clause, ReturnClause, SetItem, SortDir, WithClause};
pub use env::{Environment, Param, Variable};
pub use expr::{
    BinaryOp, Direction, Expr, NodePattern, PathPattern, Pattern, ProjectionItem, RelPattern,
};
