//! GraphQL to Cypher translation engine.
//!
//! `umbra` turns a directive-annotated GraphQL schema into an executable
//! model and translates incoming GraphQL operations into single Cypher
//! statements with a typed parameter map. It does not talk to a database:
//! the output of [`compile`] is handed to whatever driver the host
//! application uses.
//!
//! The pipeline has three stages:
//!
//! 1. [`schema::build`] parses the SDL once and produces a frozen
//!    [`SchemaModel`] shared by every request.
//! 2. The query-AST factory resolves a request document's root field against
//!    the model and builds a typed operation tree.
//! 3. The compiler lowers that tree into a Cypher clause list and renders it,
//!    binding every user-supplied value as a parameter.
//!
//! ```
//! use umbra::{compile, schema, RequestContext};
//!
//! let model = schema::build(
//!     r#"
//!     type Movie @node {
//!         title: String!
//!     }
//!     "#,
//! )
//! .unwrap();
//! let compiled = compile(
//!     &model,
//!     "{ movies { title } }",
//!     &serde_json::Map::new(),
//!     &RequestContext::new(),
//! )
//! .unwrap();
//! assert_eq!(
//!     compiled.cypher,
//!     "MATCH (this:Movie)\nRETURN this { .title } AS this"
//! );
//! ```

pub mod ast;
pub mod context;
pub mod cypher;
pub mod error;
pub mod schema;
pub mod translate;
pub mod value;

pub use context::RequestContext;
pub use error::{AuthError, Error, Result, SchemaError, TranslateError};
pub use schema::SchemaModel;
pub use translate::{compile, CompiledStatement};
pub use value::CypherValue;
