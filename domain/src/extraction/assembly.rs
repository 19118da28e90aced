//! Assembly of stage outputs into the final extraction result
//!
//! Later stages are parameterized by earlier ones: `products` needs the
//! shelf count from `structure`, `details` needs the product list, and
//! visual validation compares the whole assembled result to the image.

use super::stage::Stage;
use serde_json::{Map, Value};

const SHELF_COUNT_KEYS: [&str; 4] = ["total_shelves", "shelf_count", "num_shelves", "number_of_shelves"];

/// Latest accepted value of each extraction stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutputs {
    structure: Option<Value>,
    products: Option<Value>,
    details: Option<Value>,
}

impl StageOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stage: Stage) -> Option<&Value> {
        match stage {
            Stage::Structure => self.structure.as_ref(),
            Stage::Products => self.products.as_ref(),
            Stage::Details => self.details.as_ref(),
            Stage::VisualValidation => None,
        }
    }

    /// Record a stage's value; visual validation output is not part of the result
    pub fn set(&mut self, stage: Stage, value: Value) {
        match stage {
            Stage::Structure => self.structure = Some(value),
            Stage::Products => self.products = Some(value),
            Stage::Details => self.details = Some(value),
            Stage::VisualValidation => {}
        }
    }

    /// Shelf count reported by the structure stage
    pub fn shelf_count(&self) -> Option<u64> {
        let structure = self.structure.as_ref()?.as_object()?;
        SHELF_COUNT_KEYS
            .iter()
            .find_map(|key| structure.get(*key).and_then(Value::as_u64))
            .or_else(|| {
                structure
                    .get("shelves")
                    .and_then(Value::as_array)
                    .map(|shelves| shelves.len() as u64)
            })
    }

    pub fn is_empty(&self) -> bool {
        self.structure.is_none() && self.products.is_none() && self.details.is_none()
    }

    /// Single JSON object keyed by stage name
    pub fn assemble(&self) -> Value {
        let mut map = Map::new();
        for stage in Stage::EXTRACTION {
            if let Some(value) = self.get(stage) {
                map.insert(stage.as_str().to_string(), value.clone());
            }
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shelf_count_sources() {
        let mut outputs = StageOutputs::new();
        assert_eq!(outputs.shelf_count(), None);

        outputs.set(Stage::Structure, json!({"total_shelves": 5}));
        assert_eq!(outputs.shelf_count(), Some(5));

        outputs.set(Stage::Structure, json!({"shelves": [{}, {}, {}]}));
        assert_eq!(outputs.shelf_count(), Some(3));
    }

    #[test]
    fn test_assemble_skips_missing_stages() {
        let mut outputs = StageOutputs::new();
        outputs.set(Stage::Structure, json!({"total_shelves": 2}));
        outputs.set(Stage::Details, json!({"prices": []}));
        outputs.set(Stage::VisualValidation, json!({"accuracy": 1.0}));

        assert_eq!(
            outputs.assemble(),
            json!({
                "structure": {"total_shelves": 2},
                "details": {"prices": []}
            })
        );
    }
}
