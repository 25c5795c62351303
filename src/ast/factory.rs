//! Query-AST factory: resolves a parsed document's single root field against
//! the schema model's operation bindings and builds the typed operation
//! tree.

use graphql_parser::query::{
    Definition, Document, Field, OperationDefinition, Selection, SelectionSet,
};

use crate::ast::arg::ArgValue;
use crate::ast::filter::{parse_filter, AggFunc};
use crate::ast::mutation::{
    parse_create_input, parse_step_filter, parse_update_input, NestedWhere, RelationshipInput,
};
use crate::ast::node::{
    AggregateOperation, AggregateSelection, ConnectionOperation, ConnectionSelection,
    CreateOperation, DeleteOperation, EdgesSelection, FulltextSearch, Operation,
    PageInfoSelection, ReadOperation, UpdateOperation, VectorReadOperation,
};
use crate::ast::pagination::{decode_cursor, Pagination};
use crate::ast::projection::{parse_projection, read_arguments, Fragments, Projection};
use crate::error::TranslateError;
use crate::schema::{Entity, NestedOperation, OperationKind, SchemaModel};

/// Builds one `Operation` per compiled statement.
pub struct OperationFactory<'a> {
    schema: &'a SchemaModel,
    variables: &'a serde_json::Map<String, serde_json::Value>,
}

impl<'a> OperationFactory<'a> {
    /// Factory over a frozen schema model and the request's variables.
    pub fn new(
        schema: &'a SchemaModel,
        variables: &'a serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self { schema, variables }
    }

    /// Builds the operation tree for the document's single root field.
    ///
    /// The document is taken post-`into_static`: `graphql_parser` ASTs are
    /// invariant over their text lifetime, so fragment bodies can only be
    /// indexed once the document owns its text.
    pub fn build(&self, document: &Document<'static, String>) -> Result<Operation, TranslateError> {
        let mut fragments = Fragments::default();
        for definition in &document.definitions {
            if let Definition::Fragment(fragment) = definition {
                fragments.insert(fragment.name.clone(), &fragment.selection_set);
            }
        }

        let (selection_set, is_mutation) = executable(document)?;
        let mut root_fields = Vec::new();
        collect_root_fields(selection_set, &fragments, &mut root_fields)?;
        let field = match root_fields.as_slice() {
            [field] => *field,
            [] => return Err(TranslateError::NoOperation),
            many => {
                return Err(TranslateError::MultipleRootFields { count: many.len() });
            }
        };

        let binding =
            self.schema
                .operation(&field.name)
                .ok_or_else(|| TranslateError::UnknownOperation {
                    field: field.name.clone(),
                })?;
        if binding.kind.is_mutation() != is_mutation {
            return Err(TranslateError::OperationKindMismatch {
                field: field.name.clone(),
                expected: if binding.kind.is_mutation() {
                    "mutation"
                } else {
                    "query"
                },
                found: if is_mutation { "mutation" } else { "query" },
            });
        }
        let entity =
            self.schema
                .entity(&binding.entity)
                .ok_or_else(|| TranslateError::UnknownOperation {
                    field: field.name.clone(),
                })?;

        match binding.kind {
            OperationKind::Read => self.build_read(entity, field, &fragments),
            OperationKind::Connection => self.build_connection(entity, field, &fragments),
            OperationKind::Aggregate => self.build_aggregate(entity, field),
            OperationKind::VectorRead => {
                let index = binding.vector_index.clone().ok_or_else(|| {
                    TranslateError::UnknownIndex {
                        type_name: entity.name.clone(),
                        index: field.name.clone(),
                    }
                })?;
                self.build_vector_read(entity, field, &fragments, index)
            }
            OperationKind::Create => self.build_create(entity, field, &fragments),
            OperationKind::Update => self.build_update(entity, field, &fragments),
            OperationKind::Delete => self.build_delete(entity, field),
        }
    }

    fn arg(&self, field: &Field<'_, String>, name: &str) -> ArgValue {
        field
            .arguments
            .iter()
            .find(|(arg, _)| arg == name)
            .map(|(_, value)| ArgValue::resolve(value, self.variables))
            .unwrap_or(ArgValue::Undefined)
    }

    fn build_read(
        &self,
        entity: &Entity,
        field: &Field<'_, String>,
        fragments: &Fragments<'_>,
    ) -> Result<Operation, TranslateError> {
        let args = read_arguments(entity, field, self.variables)?;
        let filter = parse_filter(self.schema, entity, &args.filter_arg)?;
        let fulltext = self.fulltext_search(entity, field)?;
        let projection =
            parse_projection(self.schema, entity, &field.selection_set, fragments, self.variables)?;
        Ok(Operation::Read(ReadOperation {
            entity: entity.name.clone(),
            filter,
            fulltext,
            sort: args.sort,
            pagination: args.pagination,
            projection,
        }))
    }

    fn fulltext_search(
        &self,
        entity: &Entity,
        field: &Field<'_, String>,
    ) -> Result<Option<FulltextSearch>, TranslateError> {
        let arg = self.arg(field, "fulltext");
        let Some(entries) = arg.as_object() else {
            return Ok(None);
        };
        // `fulltext: { <indexName>: { phrase: … } }` — one index per read.
        let Some((index, spec)) = entries.first() else {
            return Ok(None);
        };
        if entity.fulltext_index(index).is_none() {
            return Err(TranslateError::UnknownIndex {
                type_name: entity.name.clone(),
                index: index.clone(),
            });
        }
        let phrase = spec
            .as_object()
            .and_then(|fields| fields.iter().find(|(k, _)| k == "phrase"))
            .map(|(_, v)| v.clone())
            .unwrap_or(ArgValue::Undefined);
        if phrase.is_undefined() {
            return Ok(None);
        }
        Ok(Some(FulltextSearch {
            index: index.clone(),
            phrase,
        }))
    }

    fn build_connection(
        &self,
        entity: &Entity,
        field: &Field<'_, String>,
        fragments: &Fragments<'_>,
    ) -> Result<Operation, TranslateError> {
        let args = read_arguments(entity, field, self.variables)?;
        let filter = parse_filter(self.schema, entity, &args.filter_arg)?;
        let first = self.arg(field, "first").as_int();
        let offset = match self.arg(field, "after") {
            ArgValue::Scalar(crate::value::CypherValue::String(cursor)) => decode_cursor(&cursor)?,
            _ => 0,
        };

        let mut selection = ConnectionSelection::default();
        for item in &field.selection_set.items {
            let Selection::Field(sub) = item else {
                continue;
            };
            let alias = sub.alias.clone().unwrap_or_else(|| sub.name.clone());
            match sub.name.as_str() {
                "totalCount" => selection.total_count = Some(alias),
                "pageInfo" => {
                    let mut info = PageInfoSelection {
                        alias,
                        has_next_page: None,
                        has_previous_page: None,
                        end_cursor: None,
                    };
                    for inner in &sub.selection_set.items {
                        let Selection::Field(leaf) = inner else {
                            continue;
                        };
                        let leaf_alias = leaf.alias.clone().unwrap_or_else(|| leaf.name.clone());
                        match leaf.name.as_str() {
                            "hasNextPage" => info.has_next_page = Some(leaf_alias),
                            "hasPreviousPage" => info.has_previous_page = Some(leaf_alias),
                            "endCursor" => info.end_cursor = Some(leaf_alias),
                            _ => {}
                        }
                    }
                    selection.page_info = Some(info);
                }
                "edges" => {
                    let mut edges = EdgesSelection {
                        alias,
                        cursor: None,
                        node: None,
                    };
                    for inner in &sub.selection_set.items {
                        let Selection::Field(leaf) = inner else {
                            continue;
                        };
                        let leaf_alias = leaf.alias.clone().unwrap_or_else(|| leaf.name.clone());
                        match leaf.name.as_str() {
                            "cursor" => edges.cursor = Some(leaf_alias),
                            "node" => {
                                let projection = parse_projection(
                                    self.schema,
                                    entity,
                                    &leaf.selection_set,
                                    fragments,
                                    self.variables,
                                )?;
                                edges.node = Some((leaf_alias, projection));
                            }
                            _ => {}
                        }
                    }
                    selection.edges = Some(edges);
                }
                other => {
                    return Err(TranslateError::UnknownField {
                        type_name: format!("{}Connection", entity.name),
                        field: other.to_owned(),
                    });
                }
            }
        }

        Ok(Operation::Connection(ConnectionOperation {
            entity: entity.name.clone(),
            filter,
            sort: args.sort,
            first,
            offset,
            selection,
        }))
    }

    fn build_aggregate(
        &self,
        entity: &Entity,
        field: &Field<'_, String>,
    ) -> Result<Operation, TranslateError> {
        let filter = parse_filter(self.schema, entity, &self.arg(field, "where"))?;
        let mut selections = Vec::new();
        for item in &field.selection_set.items {
            let Selection::Field(sub) = item else {
                continue;
            };
            let alias = sub.alias.clone().unwrap_or_else(|| sub.name.clone());
            if sub.name == "count" {
                selections.push(AggregateSelection::Count { alias });
                continue;
            }
            let attribute =
                entity
                    .attribute(&sub.name)
                    .ok_or_else(|| TranslateError::UnknownField {
                        type_name: format!("{}Aggregate", entity.name),
                        field: sub.name.clone(),
                    })?;
            let mut funcs = Vec::new();
            for inner in &sub.selection_set.items {
                let Selection::Field(leaf) = inner else {
                    continue;
                };
                let leaf_alias = leaf.alias.clone().unwrap_or_else(|| leaf.name.clone());
                let func = match leaf.name.as_str() {
                    "min" => AggFunc::Min,
                    "max" => AggFunc::Max,
                    "average" => AggFunc::Avg,
                    "sum" => AggFunc::Sum,
                    "shortest" => AggFunc::Shortest,
                    "longest" => AggFunc::Longest,
                    other => {
                        return Err(TranslateError::UnknownField {
                            type_name: format!("{}Aggregate", entity.name),
                            field: other.to_owned(),
                        });
                    }
                };
                funcs.push((leaf_alias, func));
            }
            selections.push(AggregateSelection::Field {
                alias,
                field: attribute.name.clone(),
                funcs,
            });
        }
        Ok(Operation::Aggregate(AggregateOperation {
            entity: entity.name.clone(),
            filter,
            selections,
        }))
    }

    fn build_vector_read(
        &self,
        entity: &Entity,
        field: &Field<'_, String>,
        fragments: &Fragments<'_>,
        index: String,
    ) -> Result<Operation, TranslateError> {
        let vector = self.arg(field, "vector");
        let filter = parse_filter(self.schema, entity, &self.arg(field, "where"))?;
        let pagination = Pagination {
            limit: self.arg(field, "limit").as_int(),
            offset: self.arg(field, "offset").as_int(),
        };

        // `score` sits beside the entity's own fields in the selection.
        let mut score = None;
        let mut node_set = SelectionSet {
            span: field.selection_set.span,
            items: Vec::new(),
        };
        for item in &field.selection_set.items {
            if let Selection::Field(sub) = item {
                if sub.name == "score" {
                    score = Some(sub.alias.clone().unwrap_or_else(|| sub.name.clone()));
                    continue;
                }
            }
            node_set.items.push(item.clone());
        }
        let projection =
            parse_projection(self.schema, entity, &node_set, fragments, self.variables)?;

        Ok(Operation::VectorRead(VectorReadOperation {
            entity: entity.name.clone(),
            index,
            vector,
            filter,
            pagination,
            projection,
            score,
        }))
    }

    fn payload_projection(
        &self,
        entity: &Entity,
        field: &Field<'_, String>,
        fragments: &Fragments<'_>,
    ) -> Result<Option<(String, Projection)>, TranslateError> {
        for item in &field.selection_set.items {
            let Selection::Field(sub) = item else {
                continue;
            };
            if sub.name == entity.plural {
                let alias = sub.alias.clone().unwrap_or_else(|| sub.name.clone());
                let projection = parse_projection(
                    self.schema,
                    entity,
                    &sub.selection_set,
                    fragments,
                    self.variables,
                )?;
                return Ok(Some((alias, projection)));
            }
        }
        Ok(None)
    }

    fn build_create(
        &self,
        entity: &Entity,
        field: &Field<'_, String>,
        fragments: &Fragments<'_>,
    ) -> Result<Operation, TranslateError> {
        let input = self.arg(field, "input");
        let elements = match &input {
            ArgValue::List(items) => items.as_slice(),
            single @ ArgValue::Object(_) => std::slice::from_ref(single),
            _ => &[],
        };
        let mut inputs = Vec::with_capacity(elements.len());
        for element in elements {
            inputs.push(parse_create_input(self.schema, entity, element)?);
        }
        // A required singular relationship must be supplied at create time.
        for relationship in &entity.relationships {
            if !relationship.required || relationship.list {
                continue;
            }
            for created in &inputs {
                let supplied = created.relationships.iter().any(|cascade| {
                    cascade.field == relationship.name && !cascade.is_empty()
                });
                if !supplied {
                    return Err(TranslateError::RequiredRelationshipMissing {
                        type_name: entity.name.clone(),
                        field: relationship.name.clone(),
                    });
                }
            }
        }
        let projection = self.payload_projection(entity, field, fragments)?;
        Ok(Operation::Create(CreateOperation {
            entity: entity.name.clone(),
            inputs,
            projection,
        }))
    }

    fn build_update(
        &self,
        entity: &Entity,
        field: &Field<'_, String>,
        fragments: &Fragments<'_>,
    ) -> Result<Operation, TranslateError> {
        let filter = parse_filter(self.schema, entity, &self.arg(field, "where"))?;
        let update = parse_update_input(self.schema, entity, &self.arg(field, "update"))?;
        let projection = self.payload_projection(entity, field, fragments)?;
        Ok(Operation::Update(UpdateOperation {
            entity: entity.name.clone(),
            filter,
            update,
            projection,
        }))
    }

    fn build_delete(
        &self,
        entity: &Entity,
        field: &Field<'_, String>,
    ) -> Result<Operation, TranslateError> {
        let filter = parse_filter(self.schema, entity, &self.arg(field, "where"))?;
        let mut cascades = Vec::new();
        if let Some(entries) = self.arg(field, "delete").as_object() {
            for (rel_name, steps) in entries {
                if steps.is_undefined() {
                    continue;
                }
                let relationship = entity.relationship(rel_name).ok_or_else(|| {
                    TranslateError::UnknownField {
                        type_name: entity.name.clone(),
                        field: rel_name.clone(),
                    }
                })?;
                if !relationship.allows(NestedOperation::Delete) {
                    return Err(TranslateError::NestedOperationNotAllowed {
                        type_name: entity.name.clone(),
                        field: rel_name.clone(),
                        operation: "delete",
                    });
                }
                let target = self.schema.entity(&relationship.target).ok_or_else(|| {
                    TranslateError::UnknownField {
                        type_name: entity.name.clone(),
                        field: rel_name.clone(),
                    }
                })?;
                let mut cascade = RelationshipInput {
                    field: rel_name.clone(),
                    ..RelationshipInput::default()
                };
                let elements = match steps {
                    ArgValue::List(items) => items.as_slice(),
                    single => std::slice::from_ref(single),
                };
                for element in elements {
                    let where_arg = element
                        .as_object()
                        .and_then(|fields| fields.iter().find(|(k, _)| k == "where"))
                        .map(|(_, v)| v.clone())
                        .unwrap_or(ArgValue::Undefined);
                    cascade.delete.push(NestedWhere {
                        filter: parse_step_filter(self.schema, target, &where_arg)?,
                    });
                }
                cascades.push(cascade);
            }
        }
        Ok(Operation::Delete(DeleteOperation {
            entity: entity.name.clone(),
            filter,
            cascades,
        }))
    }
}

/// Resolves the root selection set to its fields, expanding fragment spreads
/// and inline fragments so a document wrapped in a fragment still selects
/// exactly one root field.
fn collect_root_fields<'s>(
    set: &'s SelectionSet<'static, String>,
    fragments: &Fragments<'s>,
    out: &mut Vec<&'s Field<'static, String>>,
) -> Result<(), TranslateError> {
    for selection in &set.items {
        match selection {
            Selection::Field(field) => out.push(field),
            Selection::FragmentSpread(spread) => {
                let inner = fragments.get(&spread.fragment_name).copied().ok_or_else(|| {
                    TranslateError::UnknownOperation {
                        field: spread.fragment_name.clone(),
                    }
                })?;
                collect_root_fields(inner, fragments, out)?;
            }
            Selection::InlineFragment(fragment) => {
                collect_root_fields(&fragment.selection_set, fragments, out)?;
            }
        }
    }
    Ok(())
}

fn executable<'d>(
    document: &'d Document<'static, String>,
) -> Result<(&'d SelectionSet<'static, String>, bool), TranslateError> {
    for definition in &document.definitions {
        match definition {
            Definition::Operation(OperationDefinition::Query(query)) => {
                return Ok((&query.selection_set, false));
            }
            Definition::Operation(OperationDefinition::SelectionSet(set)) => {
                return Ok((set, false));
            }
            Definition::Operation(OperationDefinition::Mutation(mutation)) => {
                return Ok((&mutation.selection_set, true));
            }
            Definition::Operation(OperationDefinition::Subscription(_)) => {
                return Err(TranslateError::NoOperation);
            }
            Definition::Fragment(_) => {}
        }
    }
    Err(TranslateError::NoOperation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    fn movie_schema() -> SchemaModel {
        schema::build(
            r#"
            type Movie @node {
                title: String!
                viewers: Int
                actors: [Person!]! @relationship(type: "ACTED_IN", direction: IN)
            }
            type Person @node {
                name: String!
            }
            "#,
        )
        .unwrap()
    }

    fn build(model: &SchemaModel, doc: &str) -> Result<Operation, TranslateError> {
        let document = graphql_parser::parse_query::<String>(doc)
            .unwrap()
            .into_static();
        let variables = serde_json::Map::new();
        OperationFactory::new(model, &variables).build(&document)
    }

    #[test]
    fn read_binding_resolves_by_plural_name() {
        let model = movie_schema();
        let op = build(&model, "{ movies { title } }").unwrap();
        let Operation::Read(read) = op else {
            panic!("expected read");
        };
        assert_eq!(read.entity, "Movie");
        assert_eq!(read.projection.fields.len(), 1);
    }

    #[test]
    fn unknown_root_field_is_rejected() {
        let model = movie_schema();
        let err = build(&model, "{ shows { title } }").unwrap_err();
        assert_eq!(err.code(), "UnknownOperation");
    }

    #[test]
    fn mutation_field_in_query_is_a_kind_mismatch() {
        let model = movie_schema();
        let err = build(&model, r#"{ createMovies(input: []) { movies { title } } }"#).unwrap_err();
        assert_eq!(err.code(), "OperationKindMismatch");
    }

    #[test]
    fn two_root_fields_are_rejected() {
        let model = movie_schema();
        let err = build(&model, "{ movies { title } people { name } }").unwrap_err();
        assert_eq!(err.code(), "MultipleRootFields");
    }

    #[test]
    fn root_fragment_spreads_resolve_to_their_fields() {
        let model = movie_schema();
        let op = build(
            &model,
            "query { ...root } fragment root on Query { movies { title } }",
        )
        .unwrap();
        assert!(matches!(op, Operation::Read(_)));

        // the count reflects the resolved fields, not the spread itself
        let err = build(
            &model,
            "query { ...root } fragment root on Query { movies { title } more: movies { title } }",
        )
        .unwrap_err();
        assert_eq!(err.code(), "MultipleRootFields");
    }

    #[test]
    fn connection_decodes_the_after_cursor() {
        use crate::ast::pagination::encode_cursor;
        let model = movie_schema();
        let cursor = encode_cursor(1);
        let op = build(
            &model,
            &format!(
                r#"{{ moviesConnection(first: 2, after: "{cursor}") {{ totalCount edges {{ cursor node {{ title }} }} }} }}"#
            ),
        )
        .unwrap();
        let Operation::Connection(connection) = op else {
            panic!("expected connection");
        };
        assert_eq!(connection.first, Some(2));
        assert_eq!(connection.offset, 2);
        assert!(connection.selection.total_count.is_some());
        assert!(connection.selection.edges.is_some());
    }

    #[test]
    fn aggregate_selections_map_graphql_names() {
        let model = movie_schema();
        let op = build(
            &model,
            "{ moviesAggregate { count viewers { average sum } } }",
        )
        .unwrap();
        let Operation::Aggregate(aggregate) = op else {
            panic!("expected aggregate");
        };
        assert_eq!(aggregate.selections.len(), 2);
        let AggregateSelection::Field { funcs, .. } = &aggregate.selections[1] else {
            panic!("expected field aggregation");
        };
        assert_eq!(funcs[0].1, AggFunc::Avg);
    }

    #[test]
    fn update_parses_operator_suffixes() {
        let model = movie_schema();
        let op = build(
            &model,
            r#"mutation { updateMovies(where: { title_EQ: "Dune" }, update: { viewers_INCREMENT: 1 }) { movies { title } } }"#,
        )
        .unwrap();
        let Operation::Update(update) = op else {
            panic!("expected update");
        };
        assert!(update.filter.is_some());
        assert_eq!(update.update.items.len(), 1);
        assert!(update.projection.is_some());
    }
}
