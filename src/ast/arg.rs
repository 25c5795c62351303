//! Resolved GraphQL argument values.
//!
//! Document values are resolved against the operation's variables before
//! any AST building happens, so the factory distinguishes three distinct
//! states a filter leaf can be in: a real value, an explicit `null`, and an
//! *undefined* variable (which drops the predicate entirely).

use graphql_parser::query::Value as GqlValue;

use crate::value::CypherValue;

/// A document argument value with variables substituted.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgValue {
    /// A variable that was never supplied: "no constraint".
    Undefined,
    /// Explicit `null`: a real constraint.
    Null,
    /// Scalar payload.
    Scalar(CypherValue),
    /// Enum token (e.g. sort directions).
    Enum(String),
    /// List of values.
    List(Vec<ArgValue>),
    /// Object; entries are in the parser's deterministic (alphabetical)
    /// order.
    Object(Vec<(String, ArgValue)>),
}

impl Default for ArgValue {
    fn default() -> Self {
        ArgValue::Undefined
    }
}

impl ArgValue {
    /// Resolves a parsed document value against the variables payload.
    pub fn resolve(
        value: &GqlValue<'_, String>,
        variables: &serde_json::Map<String, serde_json::Value>,
    ) -> ArgValue {
        match value {
            GqlValue::Variable(name) => match variables.get(name) {
                None => ArgValue::Undefined,
                Some(json) => ArgValue::from_json(json),
            },
            GqlValue::Int(n) => n
                .as_i64()
                .map(|i| ArgValue::Scalar(CypherValue::Int(i)))
                .unwrap_or(ArgValue::Null),
            GqlValue::Float(f) => ArgValue::Scalar(CypherValue::Float(*f)),
            GqlValue::String(s) => ArgValue::Scalar(CypherValue::String(s.clone())),
            GqlValue::Boolean(b) => ArgValue::Scalar(CypherValue::Bool(*b)),
            GqlValue::Null => ArgValue::Null,
            GqlValue::Enum(name) => ArgValue::Enum(name.clone()),
            GqlValue::List(items) => ArgValue::List(
                items
                    .iter()
                    .map(|item| ArgValue::resolve(item, variables))
                    .collect(),
            ),
            GqlValue::Object(map) => ArgValue::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), ArgValue::resolve(value, variables)))
                    .collect(),
            ),
        }
    }

    /// Converts a JSON variable payload into an argument value.
    pub fn from_json(json: &serde_json::Value) -> ArgValue {
        match json {
            serde_json::Value::Null => ArgValue::Null,
            serde_json::Value::Array(items) => {
                ArgValue::List(items.iter().map(ArgValue::from_json).collect())
            }
            serde_json::Value::Object(map) => ArgValue::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), ArgValue::from_json(value)))
                    .collect(),
            ),
            other => ArgValue::Scalar(CypherValue::from_json(other)),
        }
    }

    /// Collapses the value into a typed parameter payload.
    ///
    /// `Undefined` and `Null` both collapse to `Null`; the caller is
    /// expected to have branched on those states already.
    pub fn to_cypher_value(&self) -> CypherValue {
        match self {
            ArgValue::Undefined | ArgValue::Null => CypherValue::Null,
            ArgValue::Scalar(value) => value.clone(),
            ArgValue::Enum(name) => CypherValue::String(name.clone()),
            ArgValue::List(items) => {
                CypherValue::List(items.iter().map(ArgValue::to_cypher_value).collect())
            }
            ArgValue::Object(entries) => CypherValue::Map(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_cypher_value()))
                    .collect(),
            ),
        }
    }

    /// Object entries, if this is an object.
    pub fn as_object(&self) -> Option<&[(String, ArgValue)]> {
        match self {
            ArgValue::Object(entries) => Some(entries),
            _ => None,
        }
    }

    /// List items, if this is a list.
    pub fn as_list(&self) -> Option<&[ArgValue]> {
        match self {
            ArgValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Integer payload, if this is an integer scalar.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Scalar(CypherValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// String payload for strings and enum tokens.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Scalar(CypherValue::String(s)) => Some(s),
            ArgValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    /// True for the `Undefined` state.
    pub fn is_undefined(&self) -> bool {
        matches!(self, ArgValue::Undefined)
    }

    /// True for an explicit `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, ArgValue::Null)
    }
}
