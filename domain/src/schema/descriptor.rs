//! Field type resolution
//!
//! [`FieldTypeResolver`] maps each [`FieldSpec`] to a [`ResolvedField`]
//! carrying a concrete [`TypeDescriptor`]. Object and list-of-object fields
//! recurse into uniquely named [`RecordType`]s scoped as `{scope}_{field}`.
//! Descriptors render themselves as JSON Schema for prompting and validation.

use super::field_spec::{FieldSpec, FieldType};
use crate::core::error::SchemaDefinitionError;
use serde_json::{Map, Value, json};
use std::collections::HashSet;

/// Concrete runtime type of a resolved field
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    Text,
    WholeNumber,
    Decimal,
    Flag,
    /// Closed set of string values
    ClosedSet(Vec<String>),
    /// Homogeneous sequence
    Sequence(Box<TypeDescriptor>),
    Record(RecordType),
}

/// Whether a field must be present in a valid value
#[derive(Debug, Clone, PartialEq)]
pub enum Presence {
    Required,
    /// May be absent; absent values normalize to `default`
    Optional { default: Value },
}

/// Sibling-conditioned requirement compiled from `required_when`
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalRule {
    /// Field that becomes mandatory
    pub target: String,
    /// Sibling that is inspected
    pub when_field: String,
    pub equals: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub name: String,
    /// Description passed to the model, augmented with allowed values
    pub description: String,
    pub ty: TypeDescriptor,
    pub presence: Presence,
}

impl ResolvedField {
    pub fn is_required(&self) -> bool {
        self.presence == Presence::Required
    }
}

/// A named composite type
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<ResolvedField>,
    pub conditions: Vec<ConditionalRule>,
}

impl RecordType {
    pub fn field(&self, name: &str) -> Option<&ResolvedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Render this record as a JSON Schema object
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            let mut schema = field.ty.to_json_schema();
            if !field.description.is_empty()
                && let Value::Object(map) = &mut schema
            {
                map.insert("description".into(), Value::String(field.description.clone()));
            }
            match &field.presence {
                Presence::Required => required.push(Value::String(field.name.clone())),
                Presence::Optional { default } => {
                    schema = nullable(schema);
                    if let Value::Object(map) = &mut schema {
                        map.insert("default".into(), default.clone());
                    }
                }
            }
            properties.insert(field.name.clone(), schema);
        }

        let mut schema = Map::new();
        schema.insert("title".into(), Value::String(self.name.clone()));
        schema.insert("type".into(), Value::String("object".into()));
        schema.insert("properties".into(), Value::Object(properties));
        schema.insert("required".into(), Value::Array(required));

        if !self.conditions.is_empty() {
            let rules = self
                .conditions
                .iter()
                .map(|rule| {
                    json!({
                        "if": {
                            "properties": { rule.when_field.clone(): { "const": rule.equals } },
                            "required": [rule.when_field]
                        },
                        "then": {
                            "required": [rule.target],
                            "properties": { rule.target.clone(): { "not": { "type": "null" } } }
                        }
                    })
                })
                .collect();
            schema.insert("allOf".into(), Value::Array(rules));
        }

        Value::Object(schema)
    }
}

impl TypeDescriptor {
    /// Render this descriptor as a JSON Schema fragment
    pub fn to_json_schema(&self) -> Value {
        match self {
            TypeDescriptor::Text => json!({ "type": "string" }),
            TypeDescriptor::WholeNumber => json!({ "type": "integer" }),
            TypeDescriptor::Decimal => json!({ "type": "number" }),
            TypeDescriptor::Flag => json!({ "type": "boolean" }),
            TypeDescriptor::ClosedSet(values) => json!({ "type": "string", "enum": values }),
            TypeDescriptor::Sequence(item) => {
                json!({ "type": "array", "items": item.to_json_schema() })
            }
            TypeDescriptor::Record(record) => record.to_json_schema(),
        }
    }

    pub fn as_record(&self) -> Option<&RecordType> {
        match self {
            TypeDescriptor::Record(record) => Some(record),
            _ => None,
        }
    }
}

/// Widen a schema fragment so that `null` is accepted
fn nullable(mut schema: Value) -> Value {
    if let Value::Object(map) = &mut schema {
        if let Some(Value::String(ty)) = map.get("type").cloned() {
            map.insert("type".into(), json!([ty, "null"]));
        }
        if let Some(Value::Array(values)) = map.get_mut("enum") {
            values.push(Value::Null);
        }
    }
    schema
}

/// Resolves field specs into type descriptors for one stage
pub struct FieldTypeResolver<'a> {
    stage: &'a str,
}

impl<'a> FieldTypeResolver<'a> {
    pub fn new(stage: &'a str) -> Self {
        Self { stage }
    }

    /// Resolve a single top-level field spec
    pub fn resolve(&self, spec: &FieldSpec) -> Result<ResolvedField, SchemaDefinitionError> {
        self.resolve_in(spec, self.stage, self.stage)
    }

    /// Resolve a list of sibling specs into one record type
    pub fn resolve_record(
        &self,
        name: &str,
        fields: &[FieldSpec],
    ) -> Result<RecordType, SchemaDefinitionError> {
        self.record(name, fields, self.stage, self.stage)
    }

    fn record(
        &self,
        name: &str,
        fields: &[FieldSpec],
        scope: &str,
        path: &str,
    ) -> Result<RecordType, SchemaDefinitionError> {
        let mut seen = HashSet::new();
        for spec in fields {
            if !seen.insert(spec.name.as_str()) {
                return Err(SchemaDefinitionError::DuplicateField {
                    scope: path.to_string(),
                    name: spec.name.clone(),
                });
            }
        }

        let mut conditions = Vec::new();
        for spec in fields {
            if let Some(condition) = &spec.required_when {
                if !seen.contains(condition.field.as_str()) || condition.field == spec.name {
                    return Err(SchemaDefinitionError::UnknownConditionField {
                        path: format!("{}.{}", path, spec.name),
                        sibling: condition.field.clone(),
                    });
                }
                conditions.push(ConditionalRule {
                    target: spec.name.clone(),
                    when_field: condition.field.clone(),
                    equals: condition.equals.clone(),
                });
            }
        }

        let fields = fields
            .iter()
            .map(|spec| self.resolve_in(spec, scope, path))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RecordType {
            name: name.to_string(),
            fields,
            conditions,
        })
    }

    fn resolve_in(
        &self,
        spec: &FieldSpec,
        scope: &str,
        parent_path: &str,
    ) -> Result<ResolvedField, SchemaDefinitionError> {
        let path = format!("{}.{}", parent_path, spec.name);
        if spec.name.trim().is_empty() {
            return Err(SchemaDefinitionError::EmptyName { path });
        }

        let mut description = spec.description.clone();
        let ty = match spec.field_type {
            FieldType::String => TypeDescriptor::Text,
            FieldType::Integer => TypeDescriptor::WholeNumber,
            FieldType::Float => TypeDescriptor::Decimal,
            FieldType::Boolean => TypeDescriptor::Flag,
            FieldType::Enum => {
                let set = closed_set(spec, &path)?;
                description = describe_allowed(&description, &spec.allowed_values);
                set
            }
            FieldType::Object => {
                let type_name = format!("{}_{}", scope, spec.name);
                if spec.nested_fields.is_empty() {
                    return Err(SchemaDefinitionError::MissingNestedFields { path });
                }
                TypeDescriptor::Record(self.record(
                    &type_name,
                    &spec.nested_fields,
                    &type_name,
                    &path,
                )?)
            }
            FieldType::List => {
                let item_type = spec
                    .list_item_type
                    .ok_or_else(|| SchemaDefinitionError::MissingItemType { path: path.clone() })?;
                let item = match item_type {
                    FieldType::Object => {
                        if spec.nested_fields.is_empty() {
                            return Err(SchemaDefinitionError::MissingNestedFields { path });
                        }
                        let type_name = format!("{}_{}_item", scope, spec.name);
                        TypeDescriptor::Record(self.record(
                            &type_name,
                            &spec.nested_fields,
                            &type_name,
                            &path,
                        )?)
                    }
                    FieldType::List => {
                        return Err(SchemaDefinitionError::NestedListItem { path });
                    }
                    FieldType::Enum => {
                        let set = closed_set(spec, &path)?;
                        description = describe_allowed(&description, &spec.allowed_values);
                        set
                    }
                    FieldType::String => TypeDescriptor::Text,
                    FieldType::Integer => TypeDescriptor::WholeNumber,
                    FieldType::Float => TypeDescriptor::Decimal,
                    FieldType::Boolean => TypeDescriptor::Flag,
                };
                TypeDescriptor::Sequence(Box::new(item))
            }
        };

        let presence = if spec.required && spec.required_when.is_none() {
            Presence::Required
        } else {
            Presence::Optional {
                default: Value::Null,
            }
        };

        Ok(ResolvedField {
            name: spec.name.clone(),
            description,
            ty,
            presence,
        })
    }
}

fn closed_set(spec: &FieldSpec, path: &str) -> Result<TypeDescriptor, SchemaDefinitionError> {
    if spec.allowed_values.is_empty() {
        return Err(SchemaDefinitionError::MissingAllowedValues {
            path: path.to_string(),
        });
    }
    Ok(TypeDescriptor::ClosedSet(spec.allowed_values.clone()))
}

fn describe_allowed(description: &str, values: &[String]) -> String {
    let quoted = values
        .iter()
        .map(|v| format!("\"{}\"", v))
        .collect::<Vec<_>>()
        .join(", ");
    if description.is_empty() {
        format!("Must be exactly one of: {}.", quoted)
    } else {
        format!("{} Must be exactly one of: {}.", description.trim_end(), quoted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_map_directly() {
        let resolver = FieldTypeResolver::new("structure");
        let cases = [
            (FieldSpec::string("a"), TypeDescriptor::Text),
            (FieldSpec::integer("b"), TypeDescriptor::WholeNumber),
            (FieldSpec::float("c"), TypeDescriptor::Decimal),
            (FieldSpec::boolean("d"), TypeDescriptor::Flag),
        ];
        for (spec, expected) in cases {
            assert_eq!(resolver.resolve(&spec).unwrap().ty, expected);
        }
    }

    #[test]
    fn test_enum_description_lists_allowed_values() {
        let spec = FieldSpec::enumeration("facing", ["front", "side"]).with_description("Orientation");
        let field = FieldTypeResolver::new("details").resolve(&spec).unwrap();

        assert_eq!(
            field.ty,
            TypeDescriptor::ClosedSet(vec!["front".into(), "side".into()])
        );
        assert_eq!(
            field.description,
            "Orientation Must be exactly one of: \"front\", \"side\"."
        );
    }

    #[test]
    fn test_enum_without_values_fails() {
        let spec = FieldSpec::new("facing", FieldType::Enum);
        let err = FieldTypeResolver::new("details").resolve(&spec).unwrap_err();
        assert!(matches!(err, SchemaDefinitionError::MissingAllowedValues { .. }));
    }

    #[test]
    fn test_object_without_fields_fails() {
        let spec = FieldSpec::object("shelf", vec![]);
        let err = FieldTypeResolver::new("structure").resolve(&spec).unwrap_err();
        assert_eq!(
            err,
            SchemaDefinitionError::MissingNestedFields {
                path: "structure.shelf".to_string()
            }
        );
    }

    #[test]
    fn test_list_of_object_without_fields_fails() {
        let spec = FieldSpec::list_of("products", FieldType::Object);
        let err = FieldTypeResolver::new("products").resolve(&spec).unwrap_err();
        assert!(matches!(err, SchemaDefinitionError::MissingNestedFields { .. }));
    }

    #[test]
    fn test_list_requires_item_type() {
        let spec = FieldSpec::new("tags", FieldType::List);
        let err = FieldTypeResolver::new("details").resolve(&spec).unwrap_err();
        assert!(matches!(err, SchemaDefinitionError::MissingItemType { .. }));
    }

    #[test]
    fn test_nested_types_are_scoped_by_stage() {
        let spec = FieldSpec::list_of_objects(
            "items",
            vec![
                FieldSpec::string("brand"),
                FieldSpec::object("price", vec![FieldSpec::float("amount")]),
            ],
        );
        let field = FieldTypeResolver::new("products").resolve(&spec).unwrap();

        let TypeDescriptor::Sequence(item) = field.ty else {
            panic!("expected sequence");
        };
        let record = item.as_record().unwrap();
        assert_eq!(record.name, "products_items_item");
        let price = record.field("price").unwrap().ty.as_record().unwrap();
        assert_eq!(price.name, "products_items_item_price");
    }

    #[test]
    fn test_optional_field_has_null_default() {
        let field = FieldTypeResolver::new("details")
            .resolve(&FieldSpec::string("promo").optional())
            .unwrap();
        assert_eq!(
            field.presence,
            Presence::Optional {
                default: Value::Null
            }
        );
        assert!(!field.is_required());
    }

    #[test]
    fn test_duplicate_sibling_fails() {
        let err = FieldTypeResolver::new("details")
            .resolve_record("details", &[FieldSpec::string("a"), FieldSpec::integer("a")])
            .unwrap_err();
        assert!(matches!(err, SchemaDefinitionError::DuplicateField { .. }));
    }

    #[test]
    fn test_conditional_required_on_unknown_sibling_fails() {
        let fields = vec![FieldSpec::string("products").required_when("status", "has_products")];
        let err = FieldTypeResolver::new("products")
            .resolve_record("products", &fields)
            .unwrap_err();
        assert!(matches!(err, SchemaDefinitionError::UnknownConditionField { .. }));
    }

    #[test]
    fn test_json_schema_rendering() {
        let record = FieldTypeResolver::new("structure")
            .resolve_record(
                "structure",
                &[
                    FieldSpec::integer("total_shelves").with_description("Shelf count"),
                    FieldSpec::enumeration("lighting", ["good", "poor"]).optional(),
                ],
            )
            .unwrap();

        let schema = record.to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["total_shelves"]));
        assert_eq!(schema["properties"]["total_shelves"]["type"], "integer");
        assert_eq!(
            schema["properties"]["total_shelves"]["description"],
            "Shelf count"
        );
        assert_eq!(
            schema["properties"]["lighting"]["type"],
            json!(["string", "null"])
        );
        assert_eq!(
            schema["properties"]["lighting"]["enum"],
            json!(["good", "poor", null])
        );
    }
}
