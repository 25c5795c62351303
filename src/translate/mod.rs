//! Translation pipeline: parse the GraphQL document, build the query AST,
//! compile it to a clause tree, render the statement.
//!
//! Compilation is pure with respect to the model and the request: the same
//! document, variables, and context always produce byte-identical statement
//! text and the same parameter map.

mod auth;
mod compiler;

use std::collections::BTreeMap;

use tracing::debug;

use crate::ast::OperationFactory;
use crate::context::RequestContext;
use crate::cypher::render_statement;
use crate::error::{Error, Result};
use crate::schema::SchemaModel;
use crate::value::CypherValue;

use compiler::Compiler;

/// A translated statement: Cypher text plus its parameter map.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledStatement {
    /// Rendered statement text.
    pub cypher: String,
    /// Parameter values keyed by slot name (without the leading `$`).
    pub params: BTreeMap<String, CypherValue>,
}

/// Translates one GraphQL operation into a Cypher statement.
///
/// The document must select exactly one generated root field; variables are
/// the request's GraphQL variable values.
pub fn compile(
    schema: &SchemaModel,
    document: &str,
    variables: &serde_json::Map<String, serde_json::Value>,
    ctx: &RequestContext,
) -> Result<CompiledStatement> {
    let document = graphql_parser::parse_query::<String>(document)
        .map_err(|err| Error::Parse(err.to_string()))?
        .into_static();

    let factory = OperationFactory::new(schema, variables);
    let operation = factory.build(&document)?;
    debug!(entity = operation.entity(), "compiling operation");

    let mut compiler = Compiler::new(schema, ctx);
    let clauses = compiler.compile(&operation)?;
    let cypher = render_statement(&clauses);
    Ok(CompiledStatement {
        cypher,
        params: compiler.env.into_params(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Once;

    use tracing_subscriber::EnvFilter;

    use super::*;
    use crate::error::{AuthError, TranslateError};
    use crate::schema;

    fn init_tracing() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("umbra=debug"));
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .try_init();
        });
    }

    fn movie_schema() -> SchemaModel {
        schema::build(
            r#"
            type Movie @node {
                title: String!
                released: Int
                actors: [Person!]! @relationship(type: "ACTED_IN", direction: IN)
            }
            type Person @node {
                name: String!
                movies: [Movie!]! @relationship(type: "ACTED_IN", direction: OUT)
            }
            "#,
        )
        .unwrap()
    }

    fn run(document: &str) -> CompiledStatement {
        init_tracing();
        let model = movie_schema();
        compile(
            &model,
            document,
            &serde_json::Map::new(),
            &RequestContext::new(),
        )
        .unwrap()
    }

    #[test]
    fn minimal_read_is_the_fixed_point() {
        let compiled = run("{ movies { title } }");
        assert_eq!(
            compiled.cypher,
            "MATCH (this:Movie)\nRETURN this { .title } AS this"
        );
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn compilation_is_deterministic() {
        let document = r#"
            {
                movies(where: { title_CONTAINS: "Matrix", released_GTE: 1999 }) {
                    title
                    actors(options: { limit: 5 }) { name }
                }
            }
        "#;
        let first = run(document);
        let second = run(document);
        assert_eq!(first, second);
    }

    #[test]
    fn filters_bind_parameters_in_key_order() {
        // the parser keeps object keys in alphabetical order
        let compiled = run(r#"{ movies(where: { title: "Dune", released_GT: 2000 }) { title } }"#);
        assert!(compiled.cypher.contains("WHERE (this.released > $param0 AND this.title = $param1)"));
        assert_eq!(compiled.params.get("param0"), Some(&CypherValue::Int(2000)));
        assert_eq!(
            compiled.params.get("param1"),
            Some(&CypherValue::String("Dune".into()))
        );
    }

    #[test]
    fn relationship_projection_compiles_to_a_call_block() {
        let compiled = run("{ movies { title actors { name } } }");
        assert!(compiled.cypher.contains("CALL {\n    WITH this\n    MATCH (this)<-[:ACTED_IN]-(this0:Person)"));
        assert!(compiled.cypher.contains("RETURN collect(this0 { .name }) AS var0"));
        assert!(compiled.cypher.contains("actors: var0"));
    }

    #[test]
    fn parse_failures_surface_as_parse_errors() {
        let model = movie_schema();
        let err = compile(
            &model,
            "{ movies { ",
            &serde_json::Map::new(),
            &RequestContext::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn unknown_root_fields_are_rejected() {
        let model = movie_schema();
        let err = compile(
            &model,
            "{ spaceships { name } }",
            &serde_json::Map::new(),
            &RequestContext::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Translate(TranslateError::UnknownOperation { .. })
        ));
    }

    #[test]
    fn authentication_directive_blocks_anonymous_requests() {
        let model = schema::build(
            r#"
            type Secret @node @authentication {
                name: String!
            }
            "#,
        )
        .unwrap();
        let err = compile(
            &model,
            "{ secrets { name } }",
            &serde_json::Map::new(),
            &RequestContext::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::Unauthenticated)));
    }
}
