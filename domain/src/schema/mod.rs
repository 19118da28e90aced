//! Dynamic schema building
//!
//! Stage output schemas are not fixed at compile time: each stage's
//! configuration carries a tree of [`FieldSpec`]s which is
//!
//! 1. flattened ([`flatten`]) so redundant wrapper objects disappear,
//! 2. resolved ([`FieldTypeResolver`]) into concrete type descriptors,
//! 3. compiled into a [`StageSchema`] that validates model output.
//!
//! [`SchemaBuilder`] caches compiled schemas by configuration fingerprint.

pub mod builder;
pub mod descriptor;
pub mod field_spec;
pub mod flatten;
pub mod output;
pub mod stage_schema;

pub use builder::SchemaBuilder;
pub use descriptor::{
    ConditionalRule, FieldTypeResolver, Presence, RecordType, ResolvedField, TypeDescriptor,
};
pub use field_spec::{FieldSpec, FieldType, RequiredWhen};
pub use flatten::{flatten, is_stage_root_name};
pub use output::extract_json;
pub use stage_schema::StageSchema;
