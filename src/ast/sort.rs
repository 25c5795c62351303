//! `sort` option parsing.

use crate::ast::arg::ArgValue;
use crate::cypher::SortDir;
use crate::error::TranslateError;
use crate::schema::Entity;

/// One ordering key, in document order.
#[derive(Clone, Debug, PartialEq)]
pub struct SortItem {
    /// Attribute name on the entity.
    pub field: String,
    /// Direction enum token (`ASC`/`DESC`).
    pub direction: SortDir,
}

/// Parses a `sort` list. Each element is a single-key object; list order is
/// the ordering precedence.
pub fn parse_sort(entity: &Entity, value: &ArgValue) -> Result<Vec<SortItem>, TranslateError> {
    let mut items = Vec::new();
    let Some(list) = value.as_list() else {
        if value.is_undefined() || value.is_null() {
            return Ok(items);
        }
        return Err(TranslateError::UnknownSortField {
            type_name: entity.name.clone(),
            field: "sort must be a list".to_owned(),
        });
    };
    for element in list {
        let Some(entries) = element.as_object() else {
            continue;
        };
        for (field, dir) in entries {
            if dir.is_undefined() {
                continue;
            }
            if entity.attribute(field).is_none() {
                return Err(TranslateError::UnknownSortField {
                    type_name: entity.name.clone(),
                    field: field.clone(),
                });
            }
            let direction = match dir.as_str() {
                Some("DESC") => SortDir::Desc,
                _ => SortDir::Asc,
            };
            items.push(SortItem {
                field: field.clone(),
                direction,
            });
        }
    }
    Ok(items)
}
