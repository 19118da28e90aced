//! User-authored field specifications
//!
//! A [`FieldSpec`] tree is the tagged-variant AST that the schema builder
//! compiles into a [`StageSchema`](super::StageSchema). Specs are authored
//! once per stage configuration and are read-only during a run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Abstract field type token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    #[serde(alias = "literal")]
    Enum,
    List,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Enum => "enum",
            FieldType::List => "list",
            FieldType::Object => "object",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Requirement that holds only when a sibling field has a given value
///
/// Example: `products` is required only when
/// `extraction_status == "has_products"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredWhen {
    /// Sibling field whose value is inspected
    pub field: String,
    /// Value that makes this field mandatory
    pub equals: Value,
}

/// Description of one extracted value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Unique within its parent scope
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
    /// Closed set of values for `enum`/`literal` fields (and lists of enums)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
    /// Item type for `list` fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_item_type: Option<FieldType>,
    /// Children of `object` fields and of lists of objects
    #[serde(default, alias = "properties", skip_serializing_if = "Vec::is_empty")]
    pub nested_fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_when: Option<RequiredWhen>,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    /// Create a required field of the given type
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            description: String::new(),
            required: true,
            allowed_values: Vec::new(),
            list_item_type: None,
            nested_fields: Vec::new(),
            required_when: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn enumeration<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = Self::new(name, FieldType::Enum);
        spec.allowed_values = values.into_iter().map(Into::into).collect();
        spec
    }

    pub fn object(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        let mut spec = Self::new(name, FieldType::Object);
        spec.nested_fields = fields;
        spec
    }

    /// A homogeneous list of primitive items
    pub fn list_of(name: impl Into<String>, item_type: FieldType) -> Self {
        let mut spec = Self::new(name, FieldType::List);
        spec.list_item_type = Some(item_type);
        spec
    }

    /// A list whose items are objects with the given fields
    pub fn list_of_objects(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        let mut spec = Self::list_of(name, FieldType::Object);
        spec.nested_fields = fields;
        spec
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn required_when(mut self, field: impl Into<String>, equals: impl Into<Value>) -> Self {
        self.required_when = Some(RequiredWhen {
            field: field.into(),
            equals: equals.into(),
        });
        self
    }

    /// An `object` field that declares at least one property
    pub fn is_object_with_fields(&self) -> bool {
        self.field_type == FieldType::Object && !self.nested_fields.is_empty()
    }

    /// Number of `object` nodes in this subtree (list-of-object items included)
    pub fn object_count(&self) -> usize {
        let own = usize::from(
            self.field_type == FieldType::Object
                || self.list_item_type == Some(FieldType::Object),
        );
        own + self
            .nested_fields
            .iter()
            .map(FieldSpec::object_count)
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_nested_spec() {
        let json = r#"{
            "name": "structure_extraction",
            "type": "object",
            "properties": [
                {"name": "total_shelves", "type": "integer", "description": "Shelf count"},
                {"name": "status", "type": "literal", "allowed_values": ["ok", "blocked"], "required": false}
            ]
        }"#;

        let spec: FieldSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.field_type, FieldType::Object);
        assert_eq!(spec.nested_fields.len(), 2);
        assert!(spec.nested_fields[0].required);
        assert_eq!(spec.nested_fields[1].field_type, FieldType::Enum);
        assert!(!spec.nested_fields[1].required);
    }

    #[test]
    fn test_deserialize_required_when() {
        let json = r#"{
            "name": "products",
            "type": "list",
            "list_item_type": "object",
            "nested_fields": [{"name": "brand", "type": "string"}],
            "required_when": {"field": "extraction_status", "equals": "has_products"}
        }"#;

        let spec: FieldSpec = serde_json::from_str(json).unwrap();
        let condition = spec.required_when.unwrap();
        assert_eq!(condition.field, "extraction_status");
        assert_eq!(condition.equals, Value::from("has_products"));
    }

    #[test]
    fn test_builders() {
        let spec = FieldSpec::enumeration("facing", ["front", "side"])
            .with_description("Orientation")
            .optional();
        assert_eq!(spec.allowed_values, vec!["front", "side"]);
        assert!(!spec.required);
        assert_eq!(spec.description, "Orientation");
    }

    #[test]
    fn test_object_count() {
        let spec = FieldSpec::object(
            "root",
            vec![
                FieldSpec::integer("a"),
                FieldSpec::list_of_objects("items", vec![FieldSpec::string("name")]),
            ],
        );
        assert_eq!(spec.object_count(), 2);
    }
}
