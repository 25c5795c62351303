//! Schema building: generated operation tables, directive validation, and
//! exhaustive error reporting.

use umbra::{schema, Error};

fn build_err(type_defs: &str) -> Vec<umbra::SchemaError> {
    match schema::build(type_defs).unwrap_err() {
        Error::Schema(errors) => errors.0,
        other => panic!("expected schema errors, got {other:?}"),
    }
}

#[test]
fn builds_the_generated_operation_table() {
    let model = schema::build(
        r#"
        type Movie @node {
            title: String!
            actors: [Person!]! @relationship(type: "ACTED_IN", direction: IN)
        }
        type Person @node {
            name: String!
        }
        "#,
    )
    .unwrap();
    assert_eq!(model.entity_count(), 2);
    for field in [
        "movies",
        "moviesConnection",
        "moviesAggregate",
        "createMovies",
        "updateMovies",
        "deleteMovies",
        "persons",
    ] {
        assert!(model.operation(field).is_some(), "missing operation {field}");
    }
    let movie = model.entity("Movie").unwrap();
    assert_eq!(movie.plural, "movies");
    assert!(movie.relationship("actors").is_some());
}

#[test]
fn sdl_syntax_errors_surface_as_parse_errors() {
    let err = schema::build("type Movie @node {").unwrap_err();
    assert!(matches!(err, Error::Parse(_)));
}

#[test]
fn unknown_relationship_targets_are_reported() {
    let errors = build_err(
        r#"
        type Movie @node {
            title: String!
            actors: [Ghost!]! @relationship(type: "ACTED_IN", direction: IN)
        }
        "#,
    );
    assert!(errors
        .iter()
        .any(|err| err.code() == "UnknownRelationshipTarget"));
}

#[test]
fn generated_name_collisions_name_both_types() {
    // Box and Boxe both pluralize to "boxes"
    let errors = build_err(
        r#"
        type Box @node {
            id: ID!
        }
        type Boxe @node {
            id: ID!
        }
        "#,
    );
    assert!(errors
        .iter()
        .any(|err| err.code() == "DuplicateGeneratedName"));
}

#[test]
fn nullable_list_shapes_are_rejected() {
    let errors = build_err(
        r#"
        type Movie @node {
            title: String!
            actors: [Person] @relationship(type: "ACTED_IN", direction: IN)
        }
        type Person @node {
            name: String!
        }
        "#,
    );
    assert!(errors
        .iter()
        .any(|err| err.code() == "UnsupportedListShape"));
}

#[test]
fn malformed_label_templates_are_rejected() {
    let errors = build_err(
        r#"
        type Tenant @node(labels: ["$jwt"]) {
            name: String!
        }
        "#,
    );
    assert!(errors.iter().any(|err| err.code() == "InvalidTemplate"));
}

#[test]
fn duplicate_fields_are_rejected() {
    let errors = build_err(
        r#"
        type Movie @node {
            title: String!
            title: String!
        }
        "#,
    );
    assert!(errors.iter().any(|err| err.code() == "DuplicateField"));
}

#[test]
fn every_problem_is_reported_in_one_pass() {
    let errors = build_err(
        r#"
        type Movie @node {
            title: String!
            title: String!
            actors: [Ghost!]! @relationship(type: "ACTED_IN", direction: IN)
        }
        "#,
    );
    assert!(errors.len() >= 2, "expected both problems, got {errors:?}");
}

#[test]
fn query_and_mutation_toggles_prune_the_table() {
    let model = schema::build(
        r#"
        type Log @node @query(read: true, aggregate: false) @mutation(operations: [CREATE]) {
            message: String!
        }
        "#,
    )
    .unwrap();
    assert!(model.operation("logs").is_some());
    assert!(model.operation("logsAggregate").is_none());
    assert!(model.operation("createLogs").is_some());
    assert!(model.operation("updateLogs").is_none());
    assert!(model.operation("deleteLogs").is_none());
}

#[test]
fn vector_indexes_register_their_query_name() {
    let model = schema::build(
        r#"
        type Movie @node
            @vector(indexes: [{ indexName: "embedding", propertyName: "embedding", queryName: "moviesByEmbedding" }]) {
            title: String!
        }
        "#,
    )
    .unwrap();
    let binding = model.operation("moviesByEmbedding").unwrap();
    assert_eq!(binding.entity, "Movie");
    assert_eq!(binding.vector_index.as_deref(), Some("embedding"));
}

#[test]
fn private_fields_are_invisible() {
    let model = schema::build(
        r#"
        type User @node {
            name: String!
            passwordHash: String! @private
        }
        "#,
    )
    .unwrap();
    let user = model.entity("User").unwrap();
    assert!(user.attribute("name").is_some());
    assert!(user.attribute("passwordHash").is_none());
}
