//! Per-request context: decoded JWT claims, caller-supplied values, and the
//! `$jwt.*` / `$context.*` template micro-language that directive arguments
//! use to reference them.
//!
//! Template tokens are parsed once at schema-build time into typed
//! references and resolved against this context at translation time; they
//! are never string-substituted into Cypher text.

use rustc_hash::FxHashMap;

use crate::value::CypherValue;

/// Where a template token reads its value from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateSource {
    /// `$jwt.<path>` — the decoded JWT claim set.
    Jwt,
    /// `$context.<path>` — arbitrary caller-supplied context values.
    Context,
}

/// Parsed `$jwt.x.y` / `$context.x` reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateRef {
    /// Claim set or context values.
    pub source: TemplateSource,
    /// Dot-separated path segments after the source prefix.
    pub path: Vec<String>,
}

impl TemplateRef {
    /// Parses a directive argument string into a template reference.
    ///
    /// Returns `Ok(None)` for plain strings (no `$` prefix), `Ok(Some(..))`
    /// for well-formed tokens, and `Err(token)` for strings that start like
    /// a token but have an empty or malformed path.
    pub fn parse(text: &str) -> Result<Option<TemplateRef>, String> {
        let (source, rest) = if let Some(rest) = text.strip_prefix("$jwt") {
            (TemplateSource::Jwt, rest)
        } else if let Some(rest) = text.strip_prefix("$context") {
            (TemplateSource::Context, rest)
        } else {
            return Ok(None);
        };
        let Some(path_text) = rest.strip_prefix('.') else {
            return Err(text.to_owned());
        };
        if path_text.is_empty() {
            return Err(text.to_owned());
        }
        let path: Vec<String> = path_text.split('.').map(str::to_owned).collect();
        if path.iter().any(|segment| segment.is_empty()) {
            return Err(text.to_owned());
        }
        Ok(Some(TemplateRef { source, path }))
    }

    /// Renders the token back to its source text (for error messages).
    pub fn token(&self) -> String {
        let prefix = match self.source {
            TemplateSource::Jwt => "$jwt",
            TemplateSource::Context => "$context",
        };
        format!("{prefix}.{}", self.path.join("."))
    }
}

/// Read-only request context threaded through one compilation.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    jwt: Option<serde_json::Value>,
    values: serde_json::Map<String, serde_json::Value>,
    callbacks: FxHashMap<String, CypherValue>,
}

impl RequestContext {
    /// Context with no JWT and no caller values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a decoded JWT claim set.
    pub fn with_jwt(mut self, claims: serde_json::Value) -> Self {
        self.jwt = Some(claims);
        self
    }

    /// Adds a caller-supplied context value reachable via `$context.<key>`.
    pub fn with_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Supplies a server-resolved value for a `@default(callback:)` field.
    pub fn with_callback(mut self, name: impl Into<String>, value: CypherValue) -> Self {
        self.callbacks.insert(name.into(), value);
        self
    }

    /// True when a decoded JWT claim set is present.
    pub fn is_authenticated(&self) -> bool {
        self.jwt.is_some()
    }

    /// Resolves a template reference to a typed value, if present.
    pub fn resolve(&self, template: &TemplateRef) -> Option<CypherValue> {
        let mut current: &serde_json::Value = match template.source {
            TemplateSource::Jwt => self.jwt.as_ref()?,
            TemplateSource::Context => {
                let first = template.path.first()?;
                let mut current = self.values.get(first)?;
                for segment in &template.path[1..] {
                    current = current.get(segment)?;
                }
                return Some(CypherValue::from_json(current));
            }
        };
        for segment in &template.path {
            current = current.get(segment)?;
        }
        Some(CypherValue::from_json(current))
    }

    /// Resolves a callback default by name.
    pub fn callback(&self, name: &str) -> Option<&CypherValue> {
        self.callbacks.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_jwt_token() {
        let parsed = TemplateRef::parse("$jwt.sub").unwrap().unwrap();
        assert_eq!(parsed.source, TemplateSource::Jwt);
        assert_eq!(parsed.path, vec!["sub".to_owned()]);
    }

    #[test]
    fn parses_nested_context_token() {
        let parsed = TemplateRef::parse("$context.tenant.id").unwrap().unwrap();
        assert_eq!(parsed.source, TemplateSource::Context);
        assert_eq!(parsed.path, vec!["tenant".to_owned(), "id".to_owned()]);
    }

    #[test]
    fn plain_strings_are_not_tokens() {
        assert_eq!(TemplateRef::parse("Movie").unwrap(), None);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(TemplateRef::parse("$jwt").is_err());
        assert!(TemplateRef::parse("$jwt.").is_err());
        assert!(TemplateRef::parse("$context..x").is_err());
    }

    #[test]
    fn resolves_claims_and_values() {
        let ctx = RequestContext::new()
            .with_jwt(serde_json::json!({ "sub": "user-1", "roles": ["admin"] }))
            .with_value("tenant", serde_json::json!({ "id": "acme" }));
        let sub = TemplateRef::parse("$jwt.sub").unwrap().unwrap();
        assert_eq!(ctx.resolve(&sub), Some(CypherValue::String("user-1".into())));
        let tenant = TemplateRef::parse("$context.tenant.id").unwrap().unwrap();
        assert_eq!(ctx.resolve(&tenant), Some(CypherValue::String("acme".into())));
        let missing = TemplateRef::parse("$jwt.missing").unwrap().unwrap();
        assert_eq!(ctx.resolve(&missing), None);
    }
}
