//! Authorization rule compilation.
//!
//! Filter rules narrow the WHERE predicate of the operation they guard;
//! validate rules compile into an in-statement `apoc.util.validatePredicate`
//! guard that raises before any write in the branch lands. JWT-only
//! conditions are folded to boolean constants at compile time since both
//! sides are known from the request context.

use crate::ast::filter::FilterOp;
use crate::ast::filter::split_operator;
use crate::context::RequestContext;
use crate::cypher::{Environment, Expr, Variable};
use crate::error::AuthError;
use crate::schema::directive::{AuthCondition, AuthPredicate, AuthValue};
use crate::schema::{AuthOperation, Entity};
use crate::value::CypherValue;

use super::compiler::comparison;

/// OR of the entity's applicable filter rules, or `None` when the entity has
/// no filter rules for `operation`.
///
/// A rule that requires authentication contributes `false` for an
/// unauthenticated request: it cannot grant access, but other rules still
/// can.
pub(crate) fn filter_predicate(
    entity: &Entity,
    operation: AuthOperation,
    node: &Variable,
    ctx: &RequestContext,
    env: &mut Environment,
) -> Option<Expr> {
    let annotation = entity.authorization.as_ref()?;
    let rules = annotation.filter_rules(operation);
    if rules.is_empty() {
        return None;
    }
    let mut alternatives = Vec::with_capacity(rules.len());
    for rule in rules {
        if rule.require_authentication && !ctx.is_authenticated() {
            alternatives.push(Expr::Bool(false));
            continue;
        }
        alternatives.push(compile_predicate(&rule.predicate, entity, node, ctx, env));
    }
    Some(Expr::or(alternatives))
}

/// AND of the entity's applicable validate rules, or `None` when there are
/// no validate rules for `operation`.
///
/// An unauthenticated request against a rule that requires authentication is
/// rejected at compile time rather than compiled into a guard that can never
/// pass.
pub(crate) fn validate_predicate(
    entity: &Entity,
    operation: AuthOperation,
    node: &Variable,
    ctx: &RequestContext,
    env: &mut Environment,
) -> Result<Option<Expr>, AuthError> {
    let Some(annotation) = entity.authorization.as_ref() else {
        return Ok(None);
    };
    let rules = annotation.validate_rules(operation);
    if rules.is_empty() {
        return Ok(None);
    }
    let mut required = Vec::with_capacity(rules.len());
    for rule in rules {
        if rule.require_authentication && !ctx.is_authenticated() {
            return Err(AuthError::Unauthenticated);
        }
        required.push(compile_predicate(&rule.predicate, entity, node, ctx, env));
    }
    Ok(Some(Expr::and(required)))
}

/// Wraps a validate predicate in the statement-aborting guard.
pub(crate) fn validate_guard(predicate: Expr) -> Expr {
    Expr::Func {
        name: "apoc.util.validatePredicate",
        args: vec![
            Expr::Not(Box::new(predicate)),
            Expr::String("Forbidden".to_owned()),
            Expr::List(vec![Expr::Int(0)]),
        ],
    }
}

fn compile_predicate(
    predicate: &AuthPredicate,
    entity: &Entity,
    node: &Variable,
    ctx: &RequestContext,
    env: &mut Environment,
) -> Expr {
    match predicate {
        AuthPredicate::And(children) => Expr::and(
            children
                .iter()
                .map(|child| compile_predicate(child, entity, node, ctx, env))
                .collect(),
        ),
        AuthPredicate::Or(children) => Expr::or(
            children
                .iter()
                .map(|child| compile_predicate(child, entity, node, ctx, env))
                .collect(),
        ),
        AuthPredicate::Not(inner) => {
            Expr::Not(Box::new(compile_predicate(inner, entity, node, ctx, env)))
        }
        AuthPredicate::Node(conditions) => Expr::and(
            conditions
                .iter()
                .map(|condition| node_condition(condition, entity, node, ctx, env))
                .collect(),
        ),
        AuthPredicate::Jwt(conditions) => Expr::and(
            conditions
                .iter()
                .map(|condition| Expr::Bool(jwt_condition(condition, ctx)))
                .collect(),
        ),
    }
}

fn node_condition(
    condition: &AuthCondition,
    entity: &Entity,
    node: &Variable,
    ctx: &RequestContext,
    env: &mut Environment,
) -> Expr {
    let (field, op) = split_operator(&condition.key);
    // Aliased attributes compare against the database property.
    let property = entity
        .attribute(field)
        .map(|attr| attr.property.as_str())
        .unwrap_or(field);
    let lhs = Expr::prop(node, property);
    let value = match &condition.value {
        AuthValue::Literal(value) => Some(value.clone()),
        AuthValue::Template(template) => ctx.resolve(template),
    };
    match value {
        // An unresolvable template cannot grant access.
        None => Expr::Bool(false),
        Some(CypherValue::Null) => match op {
            FilterOp::Neq => Expr::IsNotNull(Box::new(lhs)),
            _ => Expr::IsNull(Box::new(lhs)),
        },
        Some(value) => comparison(lhs, op, Expr::Param(env.param(value))),
    }
}

fn jwt_condition(condition: &AuthCondition, ctx: &RequestContext) -> bool {
    let (claim, op) = split_operator(&condition.key);
    let actual = ctx.resolve(&crate::context::TemplateRef {
        source: crate::context::TemplateSource::Jwt,
        path: claim.split('.').map(str::to_owned).collect(),
    });
    let expected = match &condition.value {
        AuthValue::Literal(value) => Some(value.clone()),
        AuthValue::Template(template) => ctx.resolve(template),
    };
    eval(op, actual.as_ref(), expected.as_ref())
}

// Constant-folds a comparison between two request-time values. A missing
// side never satisfies the operator.
fn eval(op: FilterOp, lhs: Option<&CypherValue>, rhs: Option<&CypherValue>) -> bool {
    let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
        return false;
    };
    match op {
        FilterOp::Eq => lhs == rhs,
        FilterOp::Neq => lhs != rhs,
        FilterOp::In => match rhs {
            CypherValue::List(items) => items.contains(lhs),
            _ => false,
        },
        FilterOp::Includes => match lhs {
            CypherValue::List(items) => items.contains(rhs),
            _ => false,
        },
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            let ordering = match (lhs, rhs) {
                (CypherValue::Int(a), CypherValue::Int(b)) => a.partial_cmp(b),
                (CypherValue::Float(a), CypherValue::Float(b)) => a.partial_cmp(b),
                (CypherValue::Int(a), CypherValue::Float(b)) => (*a as f64).partial_cmp(b),
                (CypherValue::Float(a), CypherValue::Int(b)) => a.partial_cmp(&(*b as f64)),
                (CypherValue::String(a), CypherValue::String(b)) => a.partial_cmp(b),
                _ => None,
            };
            match ordering {
                Some(ordering) => match op {
                    FilterOp::Gt => ordering.is_gt(),
                    FilterOp::Gte => ordering.is_ge(),
                    FilterOp::Lt => ordering.is_lt(),
                    _ => ordering.is_le(),
                },
                None => false,
            }
        }
        FilterOp::Contains | FilterOp::StartsWith | FilterOp::EndsWith => {
            match (lhs, rhs) {
                (CypherValue::String(a), CypherValue::String(b)) => match op {
                    FilterOp::Contains => a.contains(b.as_str()),
                    FilterOp::StartsWith => a.starts_with(b.as_str()),
                    _ => a.ends_with(b.as_str()),
                },
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn secured_schema() -> crate::schema::SchemaModel {
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
            "#,
        )
        .unwrap()
    }

    fn render(expr: &Expr) -> String {
        let mut out = String::new();
        expr.render(&mut out);
        out
    }

    #[test]
    fn filter_rule_binds_the_claim_as_a_parameter() {
        let model = secured_schema();
        let entity = model.entity("Post").unwrap();
        let ctx = RequestContext::new().with_jwt(serde_json::json!({ "sub": "user-1" }));
        let mut env = Environment::new();
        let this = Variable::this();
        let predicate = filter_predicate(entity, AuthOperation::Read, &this, &ctx, &mut env)
            .expect("filter rule applies");
        assert_eq!(render(&predicate), "this.authorId = $param0");
        assert_eq!(
            env.into_params().get("param0"),
            Some(&CypherValue::String("user-1".into()))
        );
    }

    #[test]
    fn unauthenticated_filter_rule_grants_nothing() {
        let model = secured_schema();
        let entity = model.entity("Post").unwrap();
        let ctx = RequestContext::new();
        let mut env = Environment::new();
        let this = Variable::this();
        let predicate = filter_predicate(entity, AuthOperation::Read, &this, &ctx, &mut env)
            .expect("filter rule applies");
        assert_eq!(render(&predicate), "false");
    }

    #[test]
    fn unauthenticated_validate_rule_is_a_compile_error() {
        let model = secured_schema();
        let entity = model.entity("Post").unwrap();
        let ctx = RequestContext::new();
        let mut env = Environment::new();
        let this = Variable::this();
        let err = validate_predicate(entity, AuthOperation::Delete, &this, &ctx, &mut env)
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    #[test]
    fn jwt_conditions_fold_to_constants() {
        let model = secured_schema();
        let entity = model.entity("Post").unwrap();
        let ctx = RequestContext::new()
            .with_jwt(serde_json::json!({ "sub": "u", "roles": ["admin", "editor"] }));
        let mut env = Environment::new();
        let this = Variable::this();
        let predicate = validate_predicate(entity, AuthOperation::Delete, &this, &ctx, &mut env)
            .unwrap()
            .expect("validate rule applies");
        assert_eq!(render(&predicate), "true");
    }

    #[test]
    fn validate_guard_wraps_the_predicate() {
        let guard = validate_guard(Expr::Bool(true));
        assert_eq!(
            render(&guard),
            r#"apoc.util.validatePredicate(NOT (true), "Forbidden", [0])"#
        );
    }
}
