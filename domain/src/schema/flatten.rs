//! Schema flattening
//!
//! Authors often wrap a stage's fields in one or more envelope objects
//! (`structure_extraction > shelf_structure > total_shelves`). Resolved
//! literally, every model response would have to repeat those envelopes.
//! [`flatten`] strips the outermost redundant wrappers and leaves nested
//! structure below the top level alone.
//!
//! Rules, applied as one pass and repeated until nothing changes:
//!
//! 1. A single top-level `object` with properties is replaced by its properties.
//! 2. A top-level `object` named after the stage (or `{stage}_extraction`)
//!    is replaced by its properties, merged with its siblings. A sibling
//!    sharing a name with one of those properties is kept, so the resolver
//!    reports the duplicate.
//! 3. Any other top-level `object` whose properties are all leaves is inlined
//!    one level, unless that would collide with an existing top-level name.
//!
//! Every change removes one object node, so the loop terminates, and the
//! result is a fixed point: `flatten(flatten(x)) == flatten(x)`.

use super::field_spec::{FieldSpec, FieldType};
use std::collections::HashSet;

/// Produce the canonical top-level field list for a stage
pub fn flatten(fields: &[FieldSpec], stage_name: &str) -> Vec<FieldSpec> {
    let mut current = fields.to_vec();
    loop {
        let next = flatten_pass(&current, stage_name);
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Whether `name` is one of the stage's canonical root names
pub fn is_stage_root_name(name: &str, stage_name: &str) -> bool {
    name == stage_name
        || name
            .strip_suffix("_extraction")
            .is_some_and(|base| base == stage_name)
}

fn flatten_pass(fields: &[FieldSpec], stage_name: &str) -> Vec<FieldSpec> {
    if let [only] = fields
        && only.is_object_with_fields()
    {
        return only.nested_fields.clone();
    }

    if let Some(pos) = fields
        .iter()
        .position(|f| is_stage_root_name(&f.name, stage_name) && f.is_object_with_fields())
    {
        let mut merged = fields[pos].nested_fields.clone();
        merged.extend(
            fields
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != pos)
                .map(|(_, sibling)| sibling.clone()),
        );
        return merged;
    }

    let mut taken: HashSet<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    let mut out = Vec::with_capacity(fields.len());
    for field in fields {
        if is_leaf_wrapper(field)
            && field
                .nested_fields
                .iter()
                .all(|child| child.name == field.name || !taken.contains(child.name.as_str()))
        {
            taken.remove(field.name.as_str());
            for child in &field.nested_fields {
                taken.insert(child.name.as_str());
            }
            out.extend(field.nested_fields.iter().cloned());
        } else {
            out.push(field.clone());
        }
    }
    out
}

fn is_leaf_wrapper(field: &FieldSpec) -> bool {
    field.is_object_with_fields()
        && field.nested_fields.iter().all(|child| {
            child.field_type != FieldType::Object && child.list_item_type != Some(FieldType::Object)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(fields: &[FieldSpec]) -> Vec<&str> {
        let mut names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    #[test]
    fn test_double_wrapper_collapses_to_leaves() {
        let fields = vec![FieldSpec::object(
            "structure_extraction",
            vec![FieldSpec::object(
                "shelf_structure",
                vec![FieldSpec::integer("total_shelves")],
            )],
        )];

        let flat = flatten(&fields, "structure");
        assert_eq!(flat, vec![FieldSpec::integer("total_shelves")]);
    }

    #[test]
    fn test_stage_named_wrapper_merges_siblings() {
        let fields = vec![
            FieldSpec::object(
                "products",
                vec![FieldSpec::list_of_objects(
                    "items",
                    vec![FieldSpec::string("brand"), FieldSpec::float("price")],
                )],
            ),
            FieldSpec::string("notes").optional(),
        ];

        let flat = flatten(&fields, "products");
        assert_eq!(names(&flat), vec!["items", "notes"]);
        // The list of objects below the top level is preserved intact
        let items = flat.iter().find(|f| f.name == "items").unwrap();
        assert_eq!(items.nested_fields.len(), 2);
    }

    #[test]
    fn test_stage_wrapper_sibling_collision_keeps_both() {
        let fields = vec![
            FieldSpec::object(
                "details_extraction",
                vec![FieldSpec::float("price"), FieldSpec::string("currency")],
            ),
            FieldSpec::float("price").optional(),
        ];

        let flat = flatten(&fields, "details");
        assert_eq!(names(&flat), vec!["currency", "price", "price"]);
    }

    #[test]
    fn test_leaf_wrapper_inlined_one_level() {
        let fields = vec![
            FieldSpec::integer("total_shelves"),
            FieldSpec::object(
                "dimensions",
                vec![FieldSpec::float("width_cm"), FieldSpec::float("height_cm").optional()],
            ),
        ];

        let flat = flatten(&fields, "structure");
        assert_eq!(names(&flat), vec!["height_cm", "total_shelves", "width_cm"]);
        let height = flat.iter().find(|f| f.name == "height_cm").unwrap();
        assert!(!height.required);
    }

    #[test]
    fn test_nested_structure_below_top_level_preserved() {
        let shelf = FieldSpec::object(
            "shelf",
            vec![
                FieldSpec::integer("number"),
                FieldSpec::object("label", vec![FieldSpec::string("text")]),
            ],
        );
        let fields = vec![FieldSpec::integer("total_shelves"), shelf.clone()];

        let flat = flatten(&fields, "structure");
        assert_eq!(flat, fields);
    }

    #[test]
    fn test_colliding_wrapper_is_kept() {
        let fields = vec![
            FieldSpec::string("brand"),
            FieldSpec::object("meta", vec![FieldSpec::string("brand")]),
        ];

        let flat = flatten(&fields, "details");
        assert_eq!(flat, fields);
    }

    #[test]
    fn test_flatten_is_idempotent() {
        let cases = vec![
            vec![FieldSpec::object(
                "structure",
                vec![
                    FieldSpec::object("a", vec![FieldSpec::integer("x")]),
                    FieldSpec::object(
                        "b",
                        vec![FieldSpec::object("c", vec![FieldSpec::boolean("y")])],
                    ),
                ],
            )],
            vec![
                FieldSpec::object("w", vec![FieldSpec::string("k")]),
                FieldSpec::object("v", vec![FieldSpec::string("k")]),
            ],
            vec![FieldSpec::object("empty", vec![])],
            vec![],
        ];

        for fields in cases {
            let once = flatten(&fields, "structure");
            let twice = flatten(&once, "structure");
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_empty_object_is_left_for_resolver() {
        let fields = vec![FieldSpec::object("structure_extraction", vec![])];
        assert_eq!(flatten(&fields, "structure"), fields);
    }

    #[test]
    fn test_stage_root_names() {
        assert!(is_stage_root_name("structure", "structure"));
        assert!(is_stage_root_name("structure_extraction", "structure"));
        assert!(!is_stage_root_name("shelf_structure", "structure"));
    }
}
