//! Authorization behavior: filter rules narrow, validate rules guard, and
//! `@authentication` rejects anonymous requests before compilation.

use umbra::error::AuthError;
use umbra::{compile, schema, CypherValue, Error, RequestContext, SchemaModel};

fn blog_schema() -> SchemaModel {
    schema::build(
        r#"
        type Post @node
            @authorization(
                filter: [{ where: { node: { authorId: "$jwt.sub" } } }]
                validate: [{ operations: [DELETE], where: { jwt: { roles_INCLUDES: "admin" } } }]
            ) {
            title: String!
            authorId: String!
        }
        type User @node {
            name: String!
            posts: [Post!]! @relationship(type: "WROTE", direction: OUT)
        }
        "#,
    )
    .unwrap()
}

fn author() -> RequestContext {
    RequestContext::new().with_jwt(serde_json::json!({ "sub": "user-1", "roles": ["author"] }))
}

fn admin() -> RequestContext {
    RequestContext::new().with_jwt(serde_json::json!({ "sub": "user-1", "roles": ["admin"] }))
}

#[test]
fn filter_rules_narrow_reads_with_claim_parameters() {
    let compiled = compile(
        &blog_schema(),
        "{ posts { title } }",
        &serde_json::Map::new(),
        &author(),
    )
    .unwrap();
    assert!(compiled.cypher.contains("WHERE this.authorId = $param0"));
    assert_eq!(
        compiled.params.get("param0"),
        Some(&CypherValue::String("user-1".into()))
    );
}

#[test]
fn anonymous_requests_match_nothing_under_a_filter_rule() {
    let compiled = compile(
        &blog_schema(),
        "{ posts { title } }",
        &serde_json::Map::new(),
        &RequestContext::new(),
    )
    .unwrap();
    assert!(compiled.cypher.contains("WHERE false"));
    assert!(compiled.params.is_empty());
}

#[test]
fn filter_rules_apply_inside_relationship_projections() {
    let compiled = compile(
        &blog_schema(),
        "{ users { posts { title } } }",
        &serde_json::Map::new(),
        &author(),
    )
    .unwrap();
    assert!(compiled.cypher.contains("MATCH (this)-[:WROTE]->(this0:Post)"));
    assert!(compiled.cypher.contains("WHERE this0.authorId = $param0"));
}

#[test]
fn validate_rules_compile_into_an_aborting_guard() {
    let compiled = compile(
        &blog_schema(),
        r#"mutation { deletePosts(where: { title: "old" }) }"#,
        &serde_json::Map::new(),
        &admin(),
    )
    .unwrap();
    // the jwt-only condition folds to a constant at compile time
    assert!(compiled
        .cypher
        .contains(r#"apoc.util.validatePredicate(NOT (true), "Forbidden", [0])"#));
    assert!(compiled.cypher.contains("this.authorId = $param1"));
}

#[test]
fn non_admins_compile_an_unsatisfiable_guard() {
    let compiled = compile(
        &blog_schema(),
        r#"mutation { deletePosts(where: { title: "old" }) }"#,
        &serde_json::Map::new(),
        &author(),
    )
    .unwrap();
    assert!(compiled
        .cypher
        .contains(r#"apoc.util.validatePredicate(NOT (false), "Forbidden", [0])"#));
}

#[test]
fn validate_rules_reject_anonymous_requests_outright() {
    let err = compile(
        &blog_schema(),
        r#"mutation { deletePosts(where: { title: "old" }) }"#,
        &serde_json::Map::new(),
        &RequestContext::new(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::Unauthenticated)));
}

#[test]
fn authentication_directive_gates_every_operation() {
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

    let compiled = compile(
        &model,
        "{ secrets { name } }",
        &serde_json::Map::new(),
        &RequestContext::new().with_jwt(serde_json::json!({ "sub": "u" })),
    )
    .unwrap();
    assert!(compiled.cypher.starts_with("MATCH (this:Secret)"));
}

#[test]
fn context_templates_resolve_like_jwt_claims() {
    let model = schema::build(
        r#"
        type Tenant @node(labels: ["$context.tenantLabel"]) {
            name: String!
        }
        "#,
    )
    .unwrap();
    let compiled = compile(
        &model,
        "{ tenants { name } }",
        &serde_json::Map::new(),
        &RequestContext::new().with_value("tenantLabel", serde_json::json!("AcmeTenant")),
    )
    .unwrap();
    assert!(compiled.cypher.starts_with("MATCH (this:AcmeTenant)"));

    let err = compile(
        &model,
        "{ tenants { name } }",
        &serde_json::Map::new(),
        &RequestContext::new(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        Error::Translate(umbra::error::TranslateError::UnresolvedTemplate { .. })
    ));
}

#[test]
fn hostile_context_labels_are_escaped() {
    let model = schema::build(
        r#"
        type Tenant @node(labels: ["$context.tenantLabel"]) {
            name: String!
        }
        "#,
    )
    .unwrap();
    let compiled = compile(
        &model,
        "{ tenants { name } }",
        &serde_json::Map::new(),
        &RequestContext::new().with_value("tenantLabel", serde_json::json!("Acme) DETACH DELETE n //")),
    )
    .unwrap();
    assert!(compiled.cypher.starts_with("MATCH (this:`Acme) DETACH DELETE n //`)"));
}
