//! Mutation translation: creates with defaults and cascades, update
//! operators, nested relationship steps, and deletes.

use umbra::error::TranslateError;
use umbra::{compile, schema, CypherValue, Error, RequestContext, SchemaModel};

fn movie_schema() -> SchemaModel {
    schema::build(
        r#"
        type Movie @node {
            title: String!
            released: Int
            genres: [String!]!
            actors: [Person!]! @relationship(type: "ACTED_IN", direction: IN, properties: "ActedIn")
        }
        type Person @node {
            name: String!
            movies: [Movie!]! @relationship(type: "ACTED_IN", direction: OUT)
        }
        type ActedIn @relationshipProperties {
            role: String!
        }
        "#,
    )
    .unwrap()
}

fn run(document: &str) -> umbra::CompiledStatement {
    compile(
        &movie_schema(),
        document,
        &serde_json::Map::new(),
        &RequestContext::new(),
    )
    .unwrap()
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
fn create_sets_properties_and_returns_the_payload() {
    let compiled =
        run(r#"mutation { createMovies(input: [{ title: "Dune" }]) { movies { title } } }"#);
    assert_eq!(
        compiled.cypher,
        "CREATE (this0:Movie)\nSET this0.title = $param0\nRETURN [this0 { .title }] AS movies"
    );
    assert_eq!(
        compiled.params.get("param0"),
        Some(&CypherValue::String("Dune".into()))
    );
}

#[test]
fn create_without_payload_counts_the_nodes() {
    let compiled = run(r#"mutation { createMovies(input: [{ title: "A" }, { title: "B" }]) }"#);
    assert!(compiled.cypher.contains("CREATE (this0:Movie)"));
    assert!(compiled.cypher.contains("CREATE (this1:Movie)"));
    assert!(compiled
        .cypher
        .ends_with("RETURN size([this0, this1]) AS nodesCreated"));
}

#[test]
fn create_applies_defaults_and_timestamps() {
    let model = schema::build(
        r#"
        type Article @node {
            title: String!
            status: String! @default(value: "DRAFT")
            slug: String! @default(callback: "slugify")
            createdAt: DateTime @timestamp(operations: [CREATE])
            updatedAt: DateTime @timestamp(operations: [UPDATE])
        }
        "#,
    )
    .unwrap();
    let ctx = RequestContext::new().with_callback("slugify", CypherValue::String("hi".into()));
    let compiled = compile(
        &model,
        r#"mutation { createArticles(input: { title: "Hi" }) }"#,
        &serde_json::Map::new(),
        &ctx,
    )
    .unwrap();
    assert!(compiled.cypher.contains("this0.status = $param1"));
    assert!(compiled.cypher.contains("this0.slug = $param2"));
    assert!(compiled.cypher.contains("this0.createdAt = datetime()"));
    assert!(!compiled.cypher.contains("updatedAt"));
    assert_eq!(
        compiled.params.get("param1"),
        Some(&CypherValue::String("DRAFT".into()))
    );
    assert_eq!(
        compiled.params.get("param2"),
        Some(&CypherValue::String("hi".into()))
    );
}

#[test]
fn unresolved_callback_defaults_fail_translation() {
    let model = schema::build(
        r#"
        type Article @node {
            title: String!
            slug: String! @default(callback: "slugify")
        }
        "#,
    )
    .unwrap();
    let err = compile(
        &model,
        r#"mutation { createArticles(input: { title: "Hi" }) }"#,
        &serde_json::Map::new(),
        &RequestContext::new(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        Error::Translate(TranslateError::UnresolvedCallback { .. })
    ));
}

#[test]
fn create_cascade_sets_edge_properties() {
    let compiled = run(
        r#"mutation { createMovies(input: {
            title: "The Matrix",
            actors: { create: [{ node: { name: "Keanu" }, edge: { role: "Neo" } }] }
        }) }"#,
    );
    assert!(compiled.cypher.contains("CREATE (this1:Person)"));
    assert!(compiled.cypher.contains("CREATE (this0)<-[this2:ACTED_IN]-(this1)"));
    assert!(compiled.cypher.contains("SET this2.role = $param2"));
    assert_eq!(
        compiled.params.get("param2"),
        Some(&CypherValue::String("Neo".into()))
    );
}

#[test]
fn update_operators_rewrite_in_place() {
    let compiled = run(
        r#"mutation { updateMovies(
            where: { title: "Dune" },
            update: { released_INCREMENT: 1, genres_PUSH: "epic" }
        ) { movies { title } } }"#,
    );
    assert!(compiled.cypher.contains("WHERE this.title = $param0"));
    // object keys bind alphabetically: genres before released
    assert!(compiled.cypher.contains("this.genres = this.genres + $param1"));
    assert!(compiled.cypher.contains("this.released = this.released + $param2"));
    assert!(compiled
        .cypher
        .ends_with("RETURN collect(this { .title }) AS movies"));
}

#[test]
fn pop_slices_off_the_tail() {
    let compiled = run(r#"mutation { updateMovies(update: { genres_POP: 2 }) }"#);
    assert!(compiled
        .cypher
        .contains("SET this.genres = this.genres[0..size(this.genres) - $param0]"));
}

#[test]
fn nulling_a_required_field_is_rejected() {
    let err = run_err(r#"mutation { updateMovies(update: { title: null }) }"#);
    let Error::Translate(inner) = err else {
        panic!("expected translate error");
    };
    assert_eq!(
        inner.to_string(),
        "Cannot set non-nullable field `Movie.title` to null"
    );
}

#[test]
fn update_connect_merges_the_relationship() {
    let compiled = run(
        r#"mutation { updateMovies(
            where: { title: "The Matrix" },
            update: { actors: { connect: [{ where: { node: { name: "Keanu" } } }] } }
        ) }"#,
    );
    assert!(compiled.cypher.contains("CALL {\n    WITH this\n    MATCH (this0:Person)"));
    assert!(compiled.cypher.contains("WHERE this0.name = $param1"));
    assert!(compiled.cypher.contains("MERGE (this)<-[this1:ACTED_IN]-(this0)"));
    assert!(compiled.cypher.contains("RETURN count(this0) AS var0"));
}

#[test]
fn connect_or_create_merges_on_the_filter() {
    let compiled = run(
        r#"mutation { updateMovies(update: { actors: { connectOrCreate: [{
            where: { node: { name: "Keanu" } },
            onCreate: { name: "Keanu" }
        }] } }) }"#,
    );
    assert!(compiled.cypher.contains("MERGE (this0:Person { name: $param0 })"));
    assert!(compiled.cypher.contains("ON CREATE SET this0.name = $param1"));
}

#[test]
fn disconnect_runs_before_nested_delete() {
    let compiled = run(
        r#"mutation { updateMovies(update: { actors: {
            disconnect: [{ where: { node: { name: "A" } } }],
            delete: [{ where: { node: { name: "B" } } }]
        } }) }"#,
    );
    let disconnect = compiled
        .cypher
        .find("DELETE this0")
        .expect("disconnect deletes the relationship");
    let delete = compiled
        .cypher
        .find("DETACH DELETE this3")
        .expect("nested delete detaches the target");
    assert!(disconnect < delete);
}

#[test]
fn delete_cascades_then_detaches_the_parent() {
    let compiled = run(
        r#"mutation { deleteMovies(
            where: { title: "Old" },
            delete: { actors: { where: { node: { name: "Retired" } } } }
        ) }"#,
    );
    assert!(compiled.cypher.contains("WHERE this.title = $param0"));
    assert!(compiled.cypher.contains("DETACH DELETE this1"));
    assert!(compiled.cypher.ends_with("DETACH DELETE this"));
}

#[test]
fn required_singular_relationships_must_be_supplied_at_create() {
    let model = schema::build(
        r#"
        type Review @node {
            text: String!
            movie: Movie! @relationship(type: "REVIEWS", direction: OUT)
        }
        type Movie @node {
            title: String!
        }
        "#,
    )
    .unwrap();
    let err = compile(
        &model,
        r#"mutation { createReviews(input: { text: "great" }) }"#,
        &serde_json::Map::new(),
        &RequestContext::new(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        Error::Translate(TranslateError::RequiredRelationshipMissing { .. })
    ));

    let compiled = compile(
        &model,
        r#"mutation { createReviews(input: {
            text: "great",
            movie: { connect: [{ where: { node: { title: "Dune" } } }] }
        }) }"#,
        &serde_json::Map::new(),
        &RequestContext::new(),
    )
    .unwrap();
    // cardinality is re-checked in-statement after the cascade runs
    assert!(compiled.cypher.contains("apoc.util.validatePredicate"));
    assert!(compiled
        .cypher
        .contains(r#""Review.movie required exactly once""#));
}

#[test]
fn query_documents_cannot_invoke_mutations() {
    let err = run_err(r#"{ createMovies(input: { title: "x" }) }"#);
    assert!(matches!(
        err,
        Error::Translate(TranslateError::OperationKindMismatch { .. })
    ));
}
