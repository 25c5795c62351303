//! Typed descriptors for the schema directive vocabulary.
//!
//! Directive arguments are parsed exactly once, at schema build time, into
//! the value objects defined here. Parsing is total: a missing required
//! sub-field or a pair of mutually exclusive options fails the build with a
//! descriptive [`SchemaError`].

use graphql_parser::schema::Value as SdlValue;

use crate::context::TemplateRef;
use crate::error::SchemaError;
use crate::value::CypherValue;

/// A node label: either literal text or a `$jwt.*`/`$context.*` template
/// resolved (and escaped) per request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelSpec {
    /// Literal label text.
    Literal(String),
    /// Template reference resolved against the request context.
    Template(TemplateRef),
}

/// Relationship direction relative to the declaring entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelDirection {
    /// Incoming edge.
    In,
    /// Outgoing edge.
    Out,
    /// Direction-agnostic traversal.
    Undirected,
}

/// Nested mutation steps a relationship field may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NestedOperation {
    /// Create a new target node and relate it.
    Create,
    /// Relate an existing target node.
    Connect,
    /// Remove the relationship, keeping the target.
    Disconnect,
    /// Update related target nodes.
    Update,
    /// Delete related target nodes.
    Delete,
    /// Merge-by-unique-key then relate.
    ConnectOrCreate,
}

impl NestedOperation {
    /// All nested operations, the default whitelist.
    pub fn all() -> Vec<NestedOperation> {
        vec![
            NestedOperation::Create,
            NestedOperation::Connect,
            NestedOperation::Disconnect,
            NestedOperation::Update,
            NestedOperation::Delete,
            NestedOperation::ConnectOrCreate,
        ]
    }
}

/// Parsed `@relationship` arguments.
#[derive(Clone, Debug)]
pub struct RelationshipAnnotation {
    /// Relationship type label.
    pub rel_type: String,
    /// Direction relative to the declaring entity.
    pub direction: RelDirection,
    /// Name of the relationship-properties type, if any.
    pub properties: Option<String>,
    /// Whitelisted nested operations (defaults to all).
    pub nested_operations: Vec<NestedOperation>,
}

/// Parsed `@node` arguments.
#[derive(Clone, Debug, Default)]
pub struct NodeAnnotation {
    /// Replacement labels (defaults to the type name when empty).
    pub labels: Vec<LabelSpec>,
    /// Labels appended after the main ones.
    pub additional_labels: Vec<LabelSpec>,
}

/// Default value applied when a create omits the attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum DefaultValue {
    /// A literal baked into the schema.
    Literal(CypherValue),
    /// A named server-side callback resolved through the request context.
    Callback(String),
}

/// Parsed `@cypher` arguments: a raw statement plus the column to extract.
#[derive(Clone, Debug)]
pub struct CypherAnnotation {
    /// Developer-authored Cypher fragment ending in a RETURN.
    pub statement: String,
    /// Column of the fragment's RETURN to surface as the field value.
    pub column_name: String,
}

/// One `@fulltext` index declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FulltextIndex {
    /// Index name as registered in the database.
    pub name: String,
    /// Indexed attribute names.
    pub fields: Vec<String>,
}

/// One `@vector` index declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VectorIndex {
    /// Index name as registered in the database.
    pub index_name: String,
    /// Attribute holding the embedding.
    pub property_name: String,
    /// Generated top-level query field name.
    pub query_name: String,
    /// Optional embedding provider tag.
    pub provider: Option<String>,
}

/// Mutation phases a `@timestamp` attribute is stamped on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimestampOp {
    /// Stamped when the node is created.
    Create,
    /// Stamped when the node is updated.
    Update,
}

/// Parsed `@settable` arguments.
#[derive(Clone, Copy, Debug)]
pub struct SettableAnnotation {
    /// Whether the attribute may appear in create input.
    pub on_create: bool,
    /// Whether the attribute may appear in update input.
    pub on_update: bool,
}

impl Default for SettableAnnotation {
    fn default() -> Self {
        SettableAnnotation {
            on_create: true,
            on_update: true,
        }
    }
}

/// Parsed `@query` arguments: which read operations are generated.
#[derive(Clone, Copy, Debug)]
pub struct QueryAnnotation {
    /// Generate the plural read and connection fields.
    pub read: bool,
    /// Generate the aggregate field.
    pub aggregate: bool,
}

impl Default for QueryAnnotation {
    fn default() -> Self {
        QueryAnnotation {
            read: true,
            aggregate: true,
        }
    }
}

/// Root mutation kinds toggled by `@mutation`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationOp {
    /// `create<Plural>`.
    Create,
    /// `update<Plural>`.
    Update,
    /// `delete<Plural>`.
    Delete,
}

impl MutationOp {
    /// All mutation kinds, the default.
    pub fn all() -> Vec<MutationOp> {
        vec![MutationOp::Create, MutationOp::Update, MutationOp::Delete]
    }
}

/// Operations an authorization rule applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthOperation {
    /// Reading nodes.
    Read,
    /// Creating nodes.
    Create,
    /// Updating node properties.
    Update,
    /// Deleting nodes.
    Delete,
    /// Creating relationships to/from the node.
    CreateRelationship,
    /// Deleting relationships to/from the node.
    DeleteRelationship,
}

impl AuthOperation {
    /// All operations, the default applicability.
    pub fn all() -> Vec<AuthOperation> {
        vec![
            AuthOperation::Read,
            AuthOperation::Create,
            AuthOperation::Update,
            AuthOperation::Delete,
            AuthOperation::CreateRelationship,
            AuthOperation::DeleteRelationship,
        ]
    }
}

/// Right-hand side of an authorization comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthValue {
    /// Literal value.
    Literal(CypherValue),
    /// `$jwt.*` / `$context.*` reference resolved per request.
    Template(TemplateRef),
}

/// One `key_OPERATOR: value` comparison inside an authorization predicate.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthCondition {
    /// Raw key, operator suffix included.
    pub key: String,
    /// Compared value.
    pub value: AuthValue,
}

/// Boolean predicate tree of an authorization rule.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthPredicate {
    /// Every child must hold.
    And(Vec<AuthPredicate>),
    /// At least one child must hold.
    Or(Vec<AuthPredicate>),
    /// Negation.
    Not(Box<AuthPredicate>),
    /// Conditions on the node's attributes.
    Node(Vec<AuthCondition>),
    /// Conditions on JWT claims.
    Jwt(Vec<AuthCondition>),
}

/// One filter or validate rule.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthRule {
    /// Operations the rule applies to.
    pub operations: Vec<AuthOperation>,
    /// Whether the rule is only considered for authenticated requests.
    pub require_authentication: bool,
    /// The rule's predicate.
    pub predicate: AuthPredicate,
}

/// Parsed `@authorization` arguments.
#[derive(Clone, Debug, Default)]
pub struct AuthorizationAnnotation {
    /// Rules that silently narrow result sets.
    pub filter: Vec<AuthRule>,
    /// Rules that reject the whole operation when violated.
    pub validate: Vec<AuthRule>,
}

impl AuthorizationAnnotation {
    /// Filter rules applicable to `operation`.
    pub fn filter_rules(&self, operation: AuthOperation) -> Vec<&AuthRule> {
        self.filter
            .iter()
            .filter(|rule| rule.operations.contains(&operation))
            .collect()
    }

    /// Validate rules applicable to `operation`.
    pub fn validate_rules(&self, operation: AuthOperation) -> Vec<&AuthRule> {
        self.validate
            .iter()
            .filter(|rule| rule.operations.contains(&operation))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Argument extraction helpers
// ---------------------------------------------------------------------------

type Args<'a> = [(String, SdlValue<'a, String>)];

fn shape_error(directive: &str, location: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::DirectiveShape {
        directive: directive.to_owned(),
        location: location.to_owned(),
        reason: reason.into(),
    }
}

fn find_arg<'a, 'v>(args: &'v Args<'a>, name: &str) -> Option<&'v SdlValue<'a, String>> {
    args.iter()
        .find(|(arg_name, _)| arg_name == name)
        .map(|(_, value)| value)
}

fn as_string<'a>(value: &SdlValue<'a, String>) -> Option<String> {
    match value {
        SdlValue::String(s) => Some(s.clone()),
        SdlValue::Enum(s) => Some(s.clone()),
        _ => None,
    }
}

fn as_bool<'a>(value: &SdlValue<'a, String>) -> Option<bool> {
    match value {
        SdlValue::Boolean(b) => Some(*b),
        _ => None,
    }
}

fn as_string_list<'a>(value: &SdlValue<'a, String>) -> Option<Vec<String>> {
    match value {
        SdlValue::List(items) => items.iter().map(as_string).collect(),
        // A bare string is accepted as a one-element list.
        SdlValue::String(s) => Some(vec![s.clone()]),
        _ => None,
    }
}

fn required_string<'a>(
    args: &Args<'a>,
    name: &str,
    directive: &str,
    location: &str,
) -> Result<String, SchemaError> {
    find_arg(args, name)
        .and_then(as_string)
        .ok_or_else(|| shape_error(directive, location, format!("requires a string '{name}' argument")))
}

/// Converts an SDL literal to a typed value; variables are not allowed in
/// directive position.
pub fn sdl_literal<'a>(value: &SdlValue<'a, String>) -> Option<CypherValue> {
    match value {
        SdlValue::Variable(_) => None,
        SdlValue::Int(n) => n.as_i64().map(CypherValue::Int),
        SdlValue::Float(f) => Some(CypherValue::Float(*f)),
        SdlValue::String(s) => Some(CypherValue::String(s.clone())),
        SdlValue::Boolean(b) => Some(CypherValue::Bool(*b)),
        SdlValue::Null => Some(CypherValue::Null),
        SdlValue::Enum(s) => Some(CypherValue::String(s.clone())),
        SdlValue::List(items) => items
            .iter()
            .map(sdl_literal)
            .collect::<Option<Vec<_>>>()
            .map(CypherValue::List),
        SdlValue::Object(map) => map
            .iter()
            .map(|(k, v)| sdl_literal(v).map(|v| (k.clone(), v)))
            .collect::<Option<_>>()
            .map(CypherValue::Map),
    }
}

fn parse_label_specs(
    labels: Vec<String>,
    directive: &str,
    location: &str,
) -> Result<Vec<LabelSpec>, SchemaError> {
    labels
        .into_iter()
        .map(|label| match TemplateRef::parse(&label) {
            Ok(Some(template)) => Ok(LabelSpec::Template(template)),
            Ok(None) => Ok(LabelSpec::Literal(label)),
            Err(token) => Err(SchemaError::InvalidTemplate {
                token,
                location: format!("@{directive} on {location}"),
            }),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Directive parsers
// ---------------------------------------------------------------------------

/// Parses `@relationship(type:, direction:, properties:, nestedOperations:)`.
pub fn parse_relationship<'a>(
    args: &Args<'a>,
    location: &str,
) -> Result<RelationshipAnnotation, SchemaError> {
    let rel_type = required_string(args, "type", "relationship", location)?;
    let direction_text = required_string(args, "direction", "relationship", location)?;
    let direction = match direction_text.as_str() {
        "IN" => RelDirection::In,
        "OUT" => RelDirection::Out,
        "UNDIRECTED" => RelDirection::Undirected,
        other => {
            return Err(shape_error(
                "relationship",
                location,
                format!("direction must be IN, OUT, or UNDIRECTED (got '{other}')"),
            ))
        }
    };
    let properties = find_arg(args, "properties").and_then(as_string);
    let nested_operations = match find_arg(args, "nestedOperations") {
        None => NestedOperation::all(),
        Some(value) => {
            let names = as_string_list(value).ok_or_else(|| {
                shape_error("relationship", location, "nestedOperations must be a list of enum values")
            })?;
            names
                .into_iter()
                .map(|name| match name.as_str() {
                    "CREATE" => Ok(NestedOperation::Create),
                    "CONNECT" => Ok(NestedOperation::Connect),
                    "DISCONNECT" => Ok(NestedOperation::Disconnect),
                    "UPDATE" => Ok(NestedOperation::Update),
                    "DELETE" => Ok(NestedOperation::Delete),
                    "CONNECT_OR_CREATE" => Ok(NestedOperation::ConnectOrCreate),
                    other => Err(shape_error(
                        "relationship",
                        location,
                        format!("unknown nested operation '{other}'"),
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    Ok(RelationshipAnnotation {
        rel_type,
        direction,
        properties,
        nested_operations,
    })
}

/// Parses `@node(labels:, additionalLabels:)`.
pub fn parse_node<'a>(args: &Args<'a>, location: &str) -> Result<NodeAnnotation, SchemaError> {
    let mut annotation = NodeAnnotation::default();
    if let Some(value) = find_arg(args, "labels") {
        let labels = as_string_list(value)
            .ok_or_else(|| shape_error("node", location, "labels must be a list of strings"))?;
        annotation.labels = parse_label_specs(labels, "node", location)?;
    }
    if let Some(value) = find_arg(args, "additionalLabels") {
        let labels = as_string_list(value).ok_or_else(|| {
            shape_error("node", location, "additionalLabels must be a list of strings")
        })?;
        annotation.additional_labels = parse_label_specs(labels, "node", location)?;
    }
    Ok(annotation)
}

/// Parses `@alias(property:)`.
pub fn parse_alias<'a>(args: &Args<'a>, location: &str) -> Result<String, SchemaError> {
    required_string(args, "property", "alias", location)
}

/// Parses `@default(value:)` / `@default(callback:)`; the two are mutually
/// exclusive.
pub fn parse_default<'a>(args: &Args<'a>, location: &str) -> Result<DefaultValue, SchemaError> {
    let value = find_arg(args, "value");
    let callback = find_arg(args, "callback").and_then(as_string);
    match (value, callback) {
        (Some(_), Some(_)) => Err(SchemaError::MutuallyExclusive {
            location: location.to_owned(),
            first: "@default(value:)",
            second: "@default(callback:)",
        }),
        (Some(value), None) => sdl_literal(value)
            .map(DefaultValue::Literal)
            .ok_or_else(|| shape_error("default", location, "value must be a literal")),
        (None, Some(callback)) => Ok(DefaultValue::Callback(callback)),
        (None, None) => Err(shape_error(
            "default",
            location,
            "requires either 'value' or 'callback'",
        )),
    }
}

/// Parses `@computed(from:)`.
pub fn parse_computed<'a>(args: &Args<'a>, location: &str) -> Result<Vec<String>, SchemaError> {
    match find_arg(args, "from") {
        None => Ok(Vec::new()),
        Some(value) => as_string_list(value)
            .ok_or_else(|| shape_error("computed", location, "from must be a list of field names")),
    }
}

/// Parses `@cypher(statement:, columnName:)`.
pub fn parse_cypher<'a>(args: &Args<'a>, location: &str) -> Result<CypherAnnotation, SchemaError> {
    Ok(CypherAnnotation {
        statement: required_string(args, "statement", "cypher", location)?,
        column_name: required_string(args, "columnName", "cypher", location)?,
    })
}

/// Parses `@fulltext(indexes: [{name, fields}])`.
pub fn parse_fulltext<'a>(
    args: &Args<'a>,
    location: &str,
) -> Result<Vec<FulltextIndex>, SchemaError> {
    let indexes = find_arg(args, "indexes")
        .ok_or_else(|| shape_error("fulltext", location, "requires an 'indexes' argument"))?;
    let SdlValue::List(items) = indexes else {
        return Err(shape_error("fulltext", location, "indexes must be a list"));
    };
    items
        .iter()
        .map(|item| {
            let SdlValue::Object(map) = item else {
                return Err(shape_error("fulltext", location, "each index must be an object"));
            };
            let name = map
                .get("name")
                .and_then(as_string)
                .ok_or_else(|| shape_error("fulltext", location, "index requires 'name'"))?;
            let fields = map
                .get("fields")
                .and_then(as_string_list)
                .ok_or_else(|| shape_error("fulltext", location, "index requires 'fields'"))?;
            Ok(FulltextIndex { name, fields })
        })
        .collect()
}

/// Parses `@vector(indexes: [{indexName, propertyName, queryName, provider}])`.
pub fn parse_vector<'a>(args: &Args<'a>, location: &str) -> Result<Vec<VectorIndex>, SchemaError> {
    let indexes = find_arg(args, "indexes")
        .ok_or_else(|| shape_error("vector", location, "requires an 'indexes' argument"))?;
    let SdlValue::List(items) = indexes else {
        return Err(shape_error("vector", location, "indexes must be a list"));
    };
    items
        .iter()
        .map(|item| {
            let SdlValue::Object(map) = item else {
                return Err(shape_error("vector", location, "each index must be an object"));
            };
            let index_name = map
                .get("indexName")
                .and_then(as_string)
                .ok_or_else(|| shape_error("vector", location, "index requires 'indexName'"))?;
            let property_name = map
                .get("propertyName")
                .and_then(as_string)
                .ok_or_else(|| shape_error("vector", location, "index requires 'propertyName'"))?;
            let query_name = map
                .get("queryName")
                .and_then(as_string)
                .ok_or_else(|| shape_error("vector", location, "index requires 'queryName'"))?;
            let provider = map.get("provider").and_then(as_string);
            Ok(VectorIndex {
                index_name,
                property_name,
                query_name,
                provider,
            })
        })
        .collect()
}

/// Parses `@timestamp(operations:)`; defaults to both phases.
pub fn parse_timestamp<'a>(
    args: &Args<'a>,
    location: &str,
) -> Result<Vec<TimestampOp>, SchemaError> {
    match find_arg(args, "operations") {
        None => Ok(vec![TimestampOp::Create, TimestampOp::Update]),
        Some(value) => {
            let names = as_string_list(value).ok_or_else(|| {
                shape_error("timestamp", location, "operations must be a list of enum values")
            })?;
            names
                .into_iter()
                .map(|name| match name.as_str() {
                    "CREATE" => Ok(TimestampOp::Create),
                    "UPDATE" => Ok(TimestampOp::Update),
                    other => Err(shape_error(
                        "timestamp",
                        location,
                        format!("unknown operation '{other}'"),
                    )),
                })
                .collect()
        }
    }
}

/// Parses `@settable(onCreate:, onUpdate:)`.
pub fn parse_settable<'a>(
    args: &Args<'a>,
    _location: &str,
) -> Result<SettableAnnotation, SchemaError> {
    let mut annotation = SettableAnnotation::default();
    if let Some(value) = find_arg(args, "onCreate").and_then(as_bool) {
        annotation.on_create = value;
    }
    if let Some(value) = find_arg(args, "onUpdate").and_then(as_bool) {
        annotation.on_update = value;
    }
    Ok(annotation)
}

/// Parses `@query(read:, aggregate:)`.
pub fn parse_query<'a>(args: &Args<'a>, _location: &str) -> Result<QueryAnnotation, SchemaError> {
    let mut annotation = QueryAnnotation::default();
    if let Some(value) = find_arg(args, "read").and_then(as_bool) {
        annotation.read = value;
    }
    if let Some(value) = find_arg(args, "aggregate").and_then(as_bool) {
        annotation.aggregate = value;
    }
    Ok(annotation)
}

/// Parses `@mutation(operations:)`; defaults to all kinds.
pub fn parse_mutation<'a>(args: &Args<'a>, location: &str) -> Result<Vec<MutationOp>, SchemaError> {
    match find_arg(args, "operations") {
        None => Ok(MutationOp::all()),
        Some(value) => {
            let names = as_string_list(value).ok_or_else(|| {
                shape_error("mutation", location, "operations must be a list of enum values")
            })?;
            names
                .into_iter()
                .map(|name| match name.as_str() {
                    "CREATE" => Ok(MutationOp::Create),
                    "UPDATE" => Ok(MutationOp::Update),
                    "DELETE" => Ok(MutationOp::Delete),
                    other => Err(shape_error(
                        "mutation",
                        location,
                        format!("unknown operation '{other}'"),
                    )),
                })
                .collect()
        }
    }
}

/// Parses `@subscription(events:)`; the translator stores but never serves
/// subscriptions (the transport is an external collaborator).
pub fn parse_subscription<'a>(args: &Args<'a>, location: &str) -> Result<Vec<String>, SchemaError> {
    match find_arg(args, "events") {
        None => Ok(Vec::new()),
        Some(value) => as_string_list(value)
            .ok_or_else(|| shape_error("subscription", location, "events must be a list")),
    }
}

fn parse_auth_value<'a>(
    value: &SdlValue<'a, String>,
    location: &str,
) -> Result<AuthValue, SchemaError> {
    if let SdlValue::String(text) = value {
        match TemplateRef::parse(text) {
            Ok(Some(template)) => return Ok(AuthValue::Template(template)),
            Ok(None) => {}
            Err(token) => {
                return Err(SchemaError::InvalidTemplate {
                    token,
                    location: location.to_owned(),
                })
            }
        }
    }
    sdl_literal(value)
        .map(AuthValue::Literal)
        .ok_or_else(|| shape_error("authorization", location, "predicate value must be a literal"))
}

fn parse_auth_conditions<'a>(
    value: &SdlValue<'a, String>,
    location: &str,
) -> Result<Vec<AuthCondition>, SchemaError> {
    let SdlValue::Object(map) = value else {
        return Err(shape_error("authorization", location, "conditions must be an object"));
    };
    map.iter()
        .map(|(key, value)| {
            Ok(AuthCondition {
                key: key.clone(),
                value: parse_auth_value(value, location)?,
            })
        })
        .collect()
}

fn parse_auth_predicate<'a>(
    value: &SdlValue<'a, String>,
    location: &str,
) -> Result<AuthPredicate, SchemaError> {
    let SdlValue::Object(map) = value else {
        return Err(shape_error("authorization", location, "where must be an object"));
    };
    let mut children = Vec::new();
    for (key, value) in map {
        match key.as_str() {
            "AND" | "OR" => {
                let SdlValue::List(items) = value else {
                    return Err(shape_error(
                        "authorization",
                        location,
                        format!("{key} must hold a list of predicates"),
                    ));
                };
                let parsed = items
                    .iter()
                    .map(|item| parse_auth_predicate(item, location))
                    .collect::<Result<Vec<_>, _>>()?;
                children.push(if key == "AND" {
                    AuthPredicate::And(parsed)
                } else {
                    AuthPredicate::Or(parsed)
                });
            }
            "NOT" => {
                children.push(AuthPredicate::Not(Box::new(parse_auth_predicate(
                    value, location,
                )?)));
            }
            "node" => children.push(AuthPredicate::Node(parse_auth_conditions(value, location)?)),
            "jwt" => children.push(AuthPredicate::Jwt(parse_auth_conditions(value, location)?)),
            other => {
                return Err(shape_error(
                    "authorization",
                    location,
                    format!("unknown predicate key '{other}'"),
                ))
            }
        }
    }
    if children.is_empty() {
        return Err(shape_error("authorization", location, "where must not be empty"));
    }
    Ok(AuthPredicate::And(children))
}

fn parse_auth_rules<'a>(
    value: &SdlValue<'a, String>,
    location: &str,
) -> Result<Vec<AuthRule>, SchemaError> {
    let SdlValue::List(items) = value else {
        return Err(shape_error("authorization", location, "rules must be a list"));
    };
    items
        .iter()
        .map(|item| {
            let SdlValue::Object(map) = item else {
                return Err(shape_error("authorization", location, "each rule must be an object"));
            };
            let operations = match map.get("operations") {
                None => AuthOperation::all(),
                Some(value) => {
                    let names = as_string_list(value).ok_or_else(|| {
                        shape_error("authorization", location, "operations must be a list")
                    })?;
                    names
                        .into_iter()
                        .map(|name| match name.as_str() {
                            "READ" => Ok(AuthOperation::Read),
                            "CREATE" => Ok(AuthOperation::Create),
                            "UPDATE" => Ok(AuthOperation::Update),
                            "DELETE" => Ok(AuthOperation::Delete),
                            "CREATE_RELATIONSHIP" => Ok(AuthOperation::CreateRelationship),
                            "DELETE_RELATIONSHIP" => Ok(AuthOperation::DeleteRelationship),
                            other => Err(shape_error(
                                "authorization",
                                location,
                                format!("unknown operation '{other}'"),
                            )),
                        })
                        .collect::<Result<Vec<_>, _>>()?
                }
            };
            let require_authentication = map
                .get("requireAuthentication")
                .and_then(as_bool)
                .unwrap_or(true);
            let where_value = map
                .get("where")
                .ok_or_else(|| shape_error("authorization", location, "rule requires 'where'"))?;
            Ok(AuthRule {
                operations,
                require_authentication,
                predicate: parse_auth_predicate(where_value, location)?,
            })
        })
        .collect()
}

/// Parses `@authorization(filter:, validate:)`.
pub fn parse_authorization<'a>(
    args: &Args<'a>,
    location: &str,
) -> Result<AuthorizationAnnotation, SchemaError> {
    let mut annotation = AuthorizationAnnotation::default();
    if let Some(value) = find_arg(args, "filter") {
        annotation.filter = parse_auth_rules(value, location)?;
    }
    if let Some(value) = find_arg(args, "validate") {
        annotation.validate = parse_auth_rules(value, location)?;
    }
    if annotation.filter.is_empty() && annotation.validate.is_empty() {
        return Err(shape_error(
            "authorization",
            location,
            "requires at least one filter or validate rule",
        ));
    }
    Ok(annotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphql_parser::parse_schema;
    use graphql_parser::schema::{Definition, TypeDefinition};

    fn directive_args(sdl: &str, directive: &str) -> Vec<(String, SdlValue<'static, String>)> {
        let doc = parse_schema::<String>(sdl).expect("valid SDL").into_static();
        for def in doc.definitions {
            if let Definition::TypeDefinition(TypeDefinition::Object(obj)) = def {
                for d in &obj.directives {
                    if d.name == directive {
                        return d.arguments.clone();
                    }
                }
                for field in &obj.fields {
                    for d in &field.directives {
                        if d.name == directive {
                            return d.arguments.clone();
                        }
                    }
                }
            }
        }
        panic!("directive @{directive} not found");
    }

    #[test]
    fn parses_relationship_directive() {
        let args = directive_args(
            r#"type Movie { actors: [String!]! @relationship(type: "ACTED_IN", direction: IN, nestedOperations: [CONNECT, CREATE]) }"#,
            "relationship",
        );
        let parsed = parse_relationship(&args, "Movie.actors").unwrap();
        assert_eq!(parsed.rel_type, "ACTED_IN");
        assert_eq!(parsed.direction, RelDirection::In);
        assert_eq!(
            parsed.nested_operations,
            vec![NestedOperation::Connect, NestedOperation::Create]
        );
    }

    #[test]
    fn relationship_requires_direction() {
        let args = directive_args(
            r#"type Movie { actors: [String!]! @relationship(type: "ACTED_IN") }"#,
            "relationship",
        );
        let err = parse_relationship(&args, "Movie.actors").unwrap_err();
        assert_eq!(err.code(), "DirectiveShape");
    }

    #[test]
    fn node_labels_parse_templates() {
        let args = directive_args(
            r#"type Movie @node(labels: ["Film", "$context.tenant"]) { title: String }"#,
            "node",
        );
        let parsed = parse_node(&args, "Movie").unwrap();
        assert_eq!(parsed.labels.len(), 2);
        assert!(matches!(parsed.labels[0], LabelSpec::Literal(ref l) if l == "Film"));
        assert!(matches!(parsed.labels[1], LabelSpec::Template(_)));
    }

    #[test]
    fn default_value_and_callback_are_exclusive() {
        let args = directive_args(
            r#"type Movie { title: String @default(value: "x", callback: "cb") }"#,
            "default",
        );
        let err = parse_default(&args, "Movie.title").unwrap_err();
        assert_eq!(err.code(), "MutuallyExclusive");
    }

    #[test]
    fn authorization_rules_parse_operations_and_templates() {
        let args = directive_args(
            r#"type Post @authorization(filter: [{ operations: [READ], where: { node: { ownerId_EQ: "$jwt.sub" } } }]) { title: String }"#,
            "authorization",
        );
        let parsed = parse_authorization(&args, "Post").unwrap();
        assert_eq!(parsed.filter.len(), 1);
        let rule = &parsed.filter[0];
        assert_eq!(rule.operations, vec![AuthOperation::Read]);
        let AuthPredicate::And(children) = &rule.predicate else {
            panic!("expected AND root");
        };
        let AuthPredicate::Node(conditions) = &children[0] else {
            panic!("expected node conditions");
        };
        assert_eq!(conditions[0].key, "ownerId_EQ");
        assert!(matches!(conditions[0].value, AuthValue::Template(_)));
    }

    #[test]
    fn vector_index_requires_query_name() {
        let args = directive_args(
            r#"type Movie @vector(indexes: [{ indexName: "movie_embedding", propertyName: "embedding" }]) { title: String }"#,
            "vector",
        );
        let err = parse_vector(&args, "Movie").unwrap_err();
        assert_eq!(err.code(), "DirectiveShape");
    }
}
