//! Deterministic naming conventions for generated operations and input
//! types, plus cross-entity collision detection.

use rustc_hash::FxHashMap;

use crate::error::SchemaError;

/// Camel-cases the first character.
pub fn camel_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// English-heuristic pluralization used for generated field names.
pub fn pluralize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix('y') {
        let keeps_y = stem
            .chars()
            .last()
            .map(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
            .unwrap_or(false);
        if keeps_y {
            return format!("{name}s");
        }
        return format!("{stem}ies");
    }
    for suffix in ["s", "x", "z", "ch", "sh"] {
        if name.ends_with(suffix) {
            return format!("{name}es");
        }
    }
    format!("{name}s")
}

/// Camel-cased plural form, e.g. `Movie` → `movies`.
pub fn plural_field(type_name: &str) -> String {
    camel_case(&pluralize(type_name))
}

/// Upper-cased plural form used in mutation names, e.g. `Movie` → `Movies`.
pub fn plural_type(type_name: &str) -> String {
    pluralize(type_name)
}

/// All generated names one entity contributes to the global namespace.
pub fn generated_names(type_name: &str) -> Vec<String> {
    let plural = plural_field(type_name);
    let plural_upper = plural_type(type_name);
    vec![
        plural.clone(),
        format!("{plural}Connection"),
        format!("{plural}Aggregate"),
        format!("create{plural_upper}"),
        format!("update{plural_upper}"),
        format!("delete{plural_upper}"),
        format!("{type_name}CreateInput"),
        format!("{type_name}UpdateInput"),
        format!("{type_name}Where"),
        format!("{type_name}Sort"),
    ]
}

/// Records generated names and reports the first owner on collision.
#[derive(Debug, Default)]
pub struct NameRegistry {
    owners: FxHashMap<String, String>,
}

impl NameRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `name` for `owner`; a second claim is a validation error.
    pub fn claim(&mut self, name: &str, owner: &str) -> Result<(), SchemaError> {
        if let Some(first) = self.owners.get(name) {
            return Err(SchemaError::DuplicateGeneratedName {
                name: name.to_owned(),
                first: first.clone(),
                second: owner.to_owned(),
            });
        }
        self.owners.insert(name.to_owned(), owner.to_owned());
        Ok(())
    }
}
