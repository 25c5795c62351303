//! Read-path translation: plural reads, filtering, sorting, pagination,
//! connections, aggregations, and index-backed lookups.

use umbra::ast::encode_cursor;
use umbra::error::TranslateError;
use umbra::{compile, schema, CypherValue, Error, RequestContext, SchemaModel};

fn movie_schema() -> SchemaModel {
    schema::build(
        r#"
        type Movie @node
            @fulltext(indexes: [{ name: "movieTitle", fields: ["title"] }])
            @vector(indexes: [{ indexName: "movieEmbedding", propertyName: "embedding", queryName: "moviesByEmbedding" }]) {
            title: String!
            released: Int
            tagline: String @alias(property: "strapline")
            similar: String @cypher(statement: "RETURN 'related' AS related", columnName: "related")
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

fn run(document: &str) -> umbra::CompiledStatement {
    run_with(document, serde_json::Map::new())
}

fn run_with(
    document: &str,
    variables: serde_json::Map<String, serde_json::Value>,
) -> umbra::CompiledStatement {
    compile(&movie_schema(), document, &variables, &RequestContext::new()).unwrap()
}

fn run_err(document: &str) -> Error {
    compile(
        &movie_schema(),
        document,
        &serde_json::Map::new(),
        &RequestContext::new(),
    )
    .unwrap_err()
}

#[test]
fn minimal_read() {
    let compiled = run("{ movies { title } }");
    assert_eq!(
        compiled.cypher,
        "MATCH (this:Movie)\nRETURN this { .title } AS this"
    );
    assert!(compiled.params.is_empty());
}

#[test]
fn aliased_output_keys_project_explicitly() {
    let compiled = run("{ movies { name: title } }");
    assert!(compiled.cypher.contains("this { name: this.title }"));
}

#[test]
fn aliased_attribute_reads_the_database_property() {
    let compiled = run("{ movies { tagline } }");
    assert!(compiled.cypher.contains("tagline: this.strapline"));
    assert!(!compiled.cypher.contains(".tagline"));
}

#[test]
fn filter_suffixes_compile_to_operators() {
    // object keys bind in the parser's alphabetical order
    let compiled = run(
        r#"{ movies(where: { title_STARTS_WITH: "The", released_GTE: 2000, title_NOT: "x" }) { title } }"#,
    );
    assert!(compiled.cypher.contains("this.released >= $param0"));
    assert!(compiled.cypher.contains("this.title <> $param1"));
    assert!(compiled.cypher.contains("this.title STARTS WITH $param2"));
}

#[test]
fn user_values_never_reach_the_statement_text() {
    let hostile = "\" OR 1=1 // `DETACH DELETE n";
    let mut variables = serde_json::Map::new();
    variables.insert("t".to_owned(), serde_json::json!(hostile));
    let compiled = run_with(
        "query($t: String) { movies(where: { title: $t }) { title } }",
        variables,
    );
    assert!(!compiled.cypher.contains("OR 1=1"));
    assert!(compiled.cypher.contains("this.title = $param0"));
    assert_eq!(
        compiled.params.get("param0"),
        Some(&CypherValue::String(hostile.to_owned()))
    );
}

#[test]
fn undefined_variable_drops_the_predicate() {
    let compiled = run_with(
        "query($t: String) { movies(where: { title: $t }) { title } }",
        serde_json::Map::new(),
    );
    assert!(!compiled.cypher.contains("WHERE"));
    assert!(compiled.params.is_empty());
}

#[test]
fn explicit_null_compiles_to_is_null() {
    let compiled = run("{ movies(where: { released: null }) { title } }");
    assert!(compiled.cypher.contains("WHERE this.released IS NULL"));
    let compiled = run("{ movies(where: { released_NOT: null }) { title } }");
    assert!(compiled.cypher.contains("WHERE this.released IS NOT NULL"));
}

#[test]
fn boolean_combinators_nest() {
    let compiled = run(
        r#"{ movies(where: { OR: [{ title: "A" }, { AND: [{ released_GT: 1990 }, { released_LT: 2000 }] }] }) { title } }"#,
    );
    assert!(compiled.cypher.contains(
        "WHERE (this.title = $param0 OR (this.released > $param1 AND this.released < $param2))"
    ));
}

#[test]
fn options_sort_and_pagination_render_in_order() {
    let compiled =
        run("{ movies(options: { sort: [{ title: DESC }], offset: 5, limit: 10 }) { title } }");
    assert!(compiled
        .cypher
        .contains("WITH *\nORDER BY this.title DESC\nSKIP 5\nLIMIT 10"));
}

#[test]
fn mixing_options_with_direct_arguments_is_rejected() {
    let err = run_err("{ movies(options: { limit: 10 }, limit: 5) { title } }");
    assert!(matches!(
        err,
        Error::Translate(TranslateError::AmbiguousPagination { .. })
    ));
}

#[test]
fn relationship_quantifiers_compile_to_exists_shapes() {
    let compiled = run(r#"{ movies(where: { actors_SOME: { name: "Keanu" } }) { title } }"#);
    assert!(compiled.cypher.contains(
        "EXISTS { MATCH (this)<-[:ACTED_IN]-(this0:Person) WHERE this0.name = $param0 }"
    ));

    let compiled = run(r#"{ movies(where: { actors_NONE: { name: "Keanu" } }) { title } }"#);
    assert!(compiled.cypher.contains("NOT (EXISTS {"));

    let compiled = run(r#"{ movies(where: { actors_SINGLE: { name: "Keanu" } }) { title } }"#);
    assert!(compiled.cypher.contains("COUNT { MATCH"));
    assert!(compiled.cypher.contains("} = 1"));

    let compiled = run(r#"{ movies(where: { actors_ALL: { name: "Keanu" } }) { title } }"#);
    // all = some match and none fail
    assert!(compiled.cypher.contains("WHERE this0.name = $param0 } AND NOT (EXISTS {"));
    assert!(compiled.cypher.contains("WHERE NOT (this0.name = $param0)"));
}

#[test]
fn bare_relationship_key_means_some() {
    let some = run(r#"{ movies(where: { actors_SOME: { name: "K" } }) { title } }"#);
    let bare = run(r#"{ movies(where: { actors: { name: "K" } }) { title } }"#);
    assert_eq!(some.cypher, bare.cypher);
}

#[test]
fn aggregate_filters_run_in_a_pre_clause() {
    let compiled = run("{ movies(where: { actorsAggregate: { count_GT: 2 } }) { title } }");
    assert!(compiled.cypher.contains("CALL {\n    WITH this\n    OPTIONAL MATCH (this)<-[:ACTED_IN]-(this0:Person)"));
    assert!(compiled.cypher.contains("RETURN count(this0) > $param0 AS var0"));
    assert!(compiled.cypher.contains("WITH *\nWHERE var0"));
    assert_eq!(compiled.params.get("param0"), Some(&CypherValue::Int(2)));
}

#[test]
fn relationship_projection_collects_in_a_call_block() {
    let compiled = run(
        r#"{ movies { title actors(where: { name_CONTAINS: "e" }, options: { limit: 2 }) { name } } }"#,
    );
    assert!(compiled.cypher.contains("CALL {\n    WITH this\n    MATCH (this)<-[:ACTED_IN]-(this0:Person)"));
    assert!(compiled.cypher.contains("WHERE this0.name CONTAINS $param0"));
    assert!(compiled.cypher.contains("LIMIT 2"));
    assert!(compiled.cypher.contains("RETURN collect(this0 { .name }) AS var0"));
    assert!(compiled.cypher.contains("actors: var0"));
}

#[test]
fn cypher_fields_run_their_fragment_in_a_call_block() {
    let compiled = run("{ movies { title similar } }");
    assert!(compiled.cypher.contains("RETURN 'related' AS related"));
    assert!(compiled.cypher.contains("WITH *, related AS var0"));
    assert!(compiled.cypher.contains("similar: var0"));
}

#[test]
fn fulltext_read_replaces_the_label_match() {
    let compiled =
        run(r#"{ movies(fulltext: { movieTitle: { phrase: "matrix" } }) { title } }"#);
    assert!(compiled
        .cypher
        .starts_with("CALL db.index.fulltext.queryNodes(\"movieTitle\", $param0) YIELD node AS this"));
    assert!(compiled.cypher.contains("WHERE this:Movie"));
    assert_eq!(
        compiled.params.get("param0"),
        Some(&CypherValue::String("matrix".into()))
    );
}

#[test]
fn unknown_fulltext_index_is_rejected() {
    let err = run_err(r#"{ movies(fulltext: { nope: { phrase: "x" } }) { title } }"#);
    assert!(matches!(
        err,
        Error::Translate(TranslateError::UnknownIndex { .. })
    ));
}

#[test]
fn vector_read_yields_node_and_score() {
    let compiled = run("{ moviesByEmbedding(vector: [0.1, 0.2]) { title score } }");
    assert!(compiled.cypher.starts_with(
        "CALL db.index.vector.queryNodes(\"movieEmbedding\", 10, $param0) YIELD node AS this, score AS var0"
    ));
    assert!(compiled.cypher.contains("WHERE this:Movie"));
    assert!(compiled.cypher.contains("score: var0"));
    assert_eq!(
        compiled.params.get("param0"),
        Some(&CypherValue::List(vec![
            CypherValue::Float(0.1),
            CypherValue::Float(0.2)
        ]))
    );
}

#[test]
fn connection_pages_over_the_collected_list() {
    let after = encode_cursor(1);
    let document = format!(
        r#"{{ moviesConnection(first: 2, after: "{after}") {{
            totalCount
            pageInfo {{ hasNextPage hasPreviousPage endCursor }}
            edges {{ cursor node {{ title }} }}
        }} }}"#
    );
    let compiled = run(&document);
    // after cursor "1" resumes at offset 2
    assert!(compiled.cypher.contains("WITH collect(this { .title }) AS var0"));
    assert!(compiled.cypher.contains("WITH size(var0) AS var1, var0[2..4] AS var2"));
    assert!(compiled.cypher.contains("edges: [var3 IN range(0, size(var2) - 1) | { cursor: var3 + 2, node: var2[var3] }]"));
    assert!(compiled.cypher.contains("totalCount: var1"));
    assert!(compiled.cypher.contains("hasNextPage: 2 + size(var2) < var1"));
    assert!(compiled.cypher.contains("hasPreviousPage: true"));
    assert!(compiled.cypher.contains("endCursor: 2 + size(var2) - 1"));
}

#[test]
fn garbage_cursors_fail_translation() {
    let err = run_err(r#"{ moviesConnection(after: "@@@not-a-cursor@@@") { totalCount } }"#);
    assert!(matches!(
        err,
        Error::Translate(TranslateError::InvalidCursor { .. })
    ));
}

#[test]
fn cursors_at_the_end_of_the_domain_fail_translation() {
    // well-formed per the cursor grammar, but there is no node after it
    let after = encode_cursor(i64::MAX);
    let err = run_err(&format!(
        r#"{{ moviesConnection(first: 2, after: "{after}") {{ totalCount }} }}"#
    ));
    assert!(matches!(
        err,
        Error::Translate(TranslateError::InvalidCursor { .. })
    ));
}

#[test]
fn aggregate_operation_runs_each_selection_in_its_own_subquery() {
    let compiled = run(
        r#"{ moviesAggregate(where: { released_GTE: 1990 }) {
            count
            released { min max average }
            title { shortest longest }
        } }"#,
    );
    assert!(compiled.cypher.contains("RETURN count(this0) AS var0"));
    assert!(compiled.cypher.contains("min(this1.released)"));
    assert!(compiled.cypher.contains("max(this1.released)"));
    assert!(compiled.cypher.contains("avg(this1.released)"));
    // string aggregates collect in length order and take the ends
    assert!(compiled.cypher.contains("ORDER BY size(this2.title) ASC"));
    assert!(compiled.cypher.contains("shortest: head("));
    assert!(compiled.cypher.contains("longest: last("));
    assert!(compiled.cypher.contains("count: var0"));
}

#[test]
fn union_relationships_compile_to_union_branches() {
    let model = schema::build(
        r#"
        type Person @node {
            name: String!
            productions: [Production!]! @relationship(type: "WORKED_ON", direction: OUT)
        }
        type Movie @node {
            title: String!
        }
        type Series @node {
            episodes: Int!
        }
        union Production = Movie | Series
        "#,
    )
    .unwrap();
    let compiled = compile(
        &model,
        r#"{ persons {
            name
            productions {
                ... on Movie { title }
                ... on Series { episodes }
            }
        } }"#,
        &serde_json::Map::new(),
        &RequestContext::new(),
    )
    .unwrap();
    assert!(compiled.cypher.contains("UNION"));
    assert!(compiled.cypher.contains(r#"__resolveType: "Movie""#));
    assert!(compiled.cypher.contains(r#"__resolveType: "Series""#));
    assert!(compiled.cypher.contains("(this)-[:WORKED_ON]->"));
}

#[test]
fn interface_relationships_compile_to_a_label_dispatched_case() {
    let model = schema::build(
        r#"
        interface Production {
            title: String!
        }
        type Movie implements Production @node {
            title: String!
            runtime: Int
        }
        type Series implements Production @node {
            title: String!
            episodes: Int!
        }
        type Person @node {
            name: String!
            credits: [Production!]! @relationship(type: "CREDITED", direction: OUT)
        }
        "#,
    )
    .unwrap();
    let compiled = compile(
        &model,
        r#"{ persons {
            credits {
                title
                ... on Movie { runtime }
            }
        } }"#,
        &serde_json::Map::new(),
        &RequestContext::new(),
    )
    .unwrap();
    // one unlabeled match, narrowed to the implementing labels
    assert!(compiled.cypher.contains("MATCH (this)-[:CREDITED]->(this0)"));
    assert!(compiled.cypher.contains("WHERE (this0:Movie OR this0:Series)"));
    // shared fields reach every member; refinements only theirs
    assert!(compiled.cypher.contains(
        r#"RETURN collect(CASE WHEN this0:Movie THEN this0 { __resolveType: "Movie", .title, .runtime } WHEN this0:Series THEN this0 { __resolveType: "Series", .title } END) AS var0"#
    ));
    assert!(compiled.cypher.contains("credits: var0"));
}

#[test]
fn mutation_documents_cannot_invoke_reads() {
    let err = run_err("mutation { movies { title } }");
    assert!(matches!(
        err,
        Error::Translate(TranslateError::OperationKindMismatch { .. })
    ));
}

#[test]
fn selecting_two_root_fields_is_rejected() {
    let err = run_err("{ movies { title } people: movies { title } }");
    assert!(matches!(
        err,
        Error::Translate(TranslateError::MultipleRootFields { count: 2 })
    ));
}
