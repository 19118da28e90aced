//! Compiled per-stage output schema.

use super::descriptor::{Presence, RecordType, TypeDescriptor};
use super::output::extract_json;
use crate::core::error::{ModelCallError, SchemaDefinitionError};
use serde_json::{Map, Value};
use std::sync::Arc;

/// The validation schema for one stage's model output
///
/// Built once per distinct field configuration by
/// [`SchemaBuilder`](super::SchemaBuilder) and shared read-only across
/// concurrent model calls.
#[derive(Clone)]
pub struct StageSchema {
    stage: String,
    root: RecordType,
    fingerprint: String,
    document: Value,
    validator: Arc<jsonschema::Validator>,
}

impl std::fmt::Debug for StageSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageSchema")
            .field("stage", &self.stage)
            .field("root", &self.root.name)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl StageSchema {
    pub(crate) fn compile(
        stage: &str,
        root: RecordType,
        fingerprint: String,
    ) -> Result<Self, SchemaDefinitionError> {
        let document = root.to_json_schema();
        let validator =
            jsonschema::Validator::new(&document).map_err(|e| SchemaDefinitionError::Compile {
                stage: stage.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            stage: stage.to_string(),
            root,
            fingerprint,
            document,
            validator: Arc::new(validator),
        })
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn root(&self) -> &RecordType {
        &self.root
    }

    /// Content hash of the field configuration this schema was built from
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn json_schema(&self) -> &Value {
        &self.document
    }

    /// Top-level field names in declaration order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.root.fields.iter().map(|f| f.name.as_str())
    }

    /// Collect every validation failure for `instance`
    pub fn validate(&self, instance: &Value) -> Vec<String> {
        self.validator
            .iter_errors(instance)
            .map(|error| {
                let path = error.instance_path.to_string();
                if path.is_empty() {
                    format!("At root: {}", error)
                } else {
                    format!("At path '{}': {}", path, error)
                }
            })
            .collect()
    }

    /// Turn raw model text into a validated value
    ///
    /// Absent optional fields are filled with their declared default (null)
    /// before validation, so the returned value always carries every key.
    pub fn parse(&self, raw_output: &str) -> Result<Value, ModelCallError> {
        let Some(mut value) = extract_json(raw_output) else {
            return Err(ModelCallError::malformed(
                raw_output,
                vec!["Response did not contain a JSON object".to_string()],
            ));
        };

        fill_defaults(&mut value, &self.root);

        let errors = self.validate(&value);
        if errors.is_empty() {
            Ok(value)
        } else {
            Err(ModelCallError::malformed(raw_output, errors))
        }
    }

    /// Schema section appended to a stage prompt
    pub fn prompt_block(&self) -> String {
        let pretty =
            serde_json::to_string_pretty(&self.document).unwrap_or_else(|_| self.document.to_string());
        format!(
            "Respond with a single JSON object that conforms to this JSON Schema. \
             Use null for optional values you cannot determine.\n\n```json\n{}\n```",
            pretty
        )
    }
}

fn fill_defaults(value: &mut Value, record: &RecordType) {
    let Value::Object(map) = value else {
        return;
    };
    fill_record(map, record);
}

fn fill_record(map: &mut Map<String, Value>, record: &RecordType) {
    for field in &record.fields {
        if let Presence::Optional { default } = &field.presence
            && !map.contains_key(&field.name)
        {
            map.insert(field.name.clone(), default.clone());
        }
        if let Some(child) = map.get_mut(&field.name) {
            fill_nested(child, &field.ty);
        }
    }
}

fn fill_nested(value: &mut Value, ty: &TypeDescriptor) {
    match (value, ty) {
        (Value::Object(map), TypeDescriptor::Record(record)) => fill_record(map, record),
        (Value::Array(items), TypeDescriptor::Sequence(item_ty)) => {
            for item in items {
                fill_nested(item, item_ty);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::descriptor::FieldTypeResolver;
    use crate::schema::field_spec::FieldSpec;
    use serde_json::json;

    fn products_schema() -> StageSchema {
        let fields = vec![
            FieldSpec::enumeration("extraction_status", ["has_products", "empty_shelf"]),
            FieldSpec::list_of_objects(
                "products",
                vec![
                    FieldSpec::string("brand"),
                    FieldSpec::integer("position"),
                    FieldSpec::string("variant").optional(),
                ],
            )
            .required_when("extraction_status", "has_products"),
        ];
        let root = FieldTypeResolver::new("products")
            .resolve_record("products", &fields)
            .unwrap();
        StageSchema::compile("products", root, "fp".to_string()).unwrap()
    }

    #[test]
    fn test_parse_fills_optional_nulls() {
        let schema = products_schema();
        let value = schema
            .parse(r#"{"extraction_status": "has_products", "products": [{"brand": "Acme", "position": 1}]}"#)
            .unwrap();
        assert_eq!(value["products"][0]["variant"], Value::Null);
    }

    #[test]
    fn test_parse_round_trips() {
        let schema = products_schema();
        let outputs = [
            r#"{"extraction_status": "has_products", "products": [
                {"brand": "Acme", "position": 1, "variant": "Light"},
                {"brand": "Zest", "position": 2}
            ]}"#,
            r#"{"extraction_status": "empty_shelf", "products": null}"#,
            r#"{"extraction_status": "empty_shelf"}"#,
        ];

        for raw in outputs {
            let value = schema.parse(raw).unwrap();
            let reparsed = schema.parse(&serde_json::to_string(&value).unwrap()).unwrap();
            assert_eq!(reparsed, value);
            assert!(schema.validate(&reparsed).is_empty());
        }
    }

    #[test]
    fn test_conditional_requirement_enforced() {
        let schema = products_schema();

        // Not required when the shelf is empty
        let value = schema.parse(r#"{"extraction_status": "empty_shelf"}"#).unwrap();
        assert_eq!(value["products"], Value::Null);

        // Required when products are present
        let err = schema
            .parse(r#"{"extraction_status": "has_products"}"#)
            .unwrap_err();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::MalformedOutput);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let schema = products_schema();
        let errors = schema.validate(&json!({
            "extraction_status": "unknown",
            "products": [{"brand": 7, "position": "first", "variant": null}]
        }));
        assert!(errors.len() >= 3, "got {:?}", errors);
        assert!(errors.iter().any(|e| e.contains("/products/0/brand")));
    }

    #[test]
    fn test_non_json_output_is_malformed() {
        let schema = products_schema();
        let err = schema.parse("Sorry, the image is too blurry.").unwrap_err();
        match err {
            ModelCallError::MalformedOutput {
                raw_output,
                validation_errors,
            } => {
                assert_eq!(raw_output, "Sorry, the image is too blurry.");
                assert_eq!(validation_errors.len(), 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_prompt_block_embeds_schema() {
        let block = products_schema().prompt_block();
        assert!(block.contains("\"extraction_status\""));
        assert!(block.starts_with("Respond with a single JSON object"));
    }
}
