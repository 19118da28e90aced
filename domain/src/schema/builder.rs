//! Dynamic schema construction with a fingerprint cache.

use super::descriptor::FieldTypeResolver;
use super::field_spec::FieldSpec;
use super::flatten::flatten;
use super::stage_schema::StageSchema;
use crate::core::error::SchemaDefinitionError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds [`StageSchema`]s from field specs, reusing identical configurations
///
/// The cache key is a content hash of the stage name and the field tree, so
/// two stages with the same fields still get distinct (stage-scoped) types.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    cache: HashMap<String, Arc<StageSchema>>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the schema for one stage
    ///
    /// Returns `Ok(None)` for a comparison-only stage without fields: such a
    /// stage compares earlier results and has no model output to validate.
    pub fn build(
        &mut self,
        stage_name: &str,
        fields: &[FieldSpec],
        comparison_only: bool,
    ) -> Result<Option<Arc<StageSchema>>, SchemaDefinitionError> {
        if fields.is_empty() {
            return if comparison_only {
                Ok(None)
            } else {
                Err(SchemaDefinitionError::NoFields {
                    stage: stage_name.to_string(),
                })
            };
        }

        let fingerprint = fingerprint(stage_name, fields);
        if let Some(schema) = self.cache.get(&fingerprint) {
            tracing::trace!(stage = stage_name, %fingerprint, "Schema cache hit");
            return Ok(Some(Arc::clone(schema)));
        }

        let flat = flatten(fields, stage_name);
        let root = FieldTypeResolver::new(stage_name).resolve_record(stage_name, &flat)?;
        let schema = Arc::new(StageSchema::compile(stage_name, root, fingerprint.clone())?);

        tracing::debug!(
            stage = stage_name,
            fields = schema.root().fields.len(),
            %fingerprint,
            "Built stage schema"
        );
        self.cache.insert(fingerprint, Arc::clone(&schema));
        Ok(Some(schema))
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

fn fingerprint(stage_name: &str, fields: &[FieldSpec]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stage_name.as_bytes());
    hasher.update([0u8]);
    // FieldSpec serialization is infallible (no maps with non-string keys)
    hasher.update(serde_json::to_vec(fields).unwrap_or_default());
    format!("{:x}", hasher.finalize())
}
