//! Pipeline stages

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One phase of the extraction pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Shelf layout: number of shelves, fixture type
    Structure,
    /// Products per shelf, parameterized by the shelf count
    Products,
    /// Prices and attributes, parameterized by the product list
    Details,
    /// Compare the assembled result against the image
    VisualValidation,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Structure,
        Stage::Products,
        Stage::Details,
        Stage::VisualValidation,
    ];

    /// Stages whose output is part of the assembled result
    pub const EXTRACTION: [Stage; 3] = [Stage::Structure, Stage::Products, Stage::Details];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Structure => "structure",
            Stage::Products => "products",
            Stage::Details => "details",
            Stage::VisualValidation => "visual_validation",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Stage::Structure => "Structure",
            Stage::Products => "Products",
            Stage::Details => "Details",
            Stage::VisualValidation => "Visual Validation",
        }
    }

    /// The stage that follows this one, `None` after visual validation
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Structure => Some(Stage::Products),
            Stage::Products => Some(Stage::Details),
            Stage::Details => Some(Stage::VisualValidation),
            Stage::VisualValidation => None,
        }
    }

    pub fn is_extraction(&self) -> bool {
        !matches!(self, Stage::VisualValidation)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "structure" => Ok(Stage::Structure),
            "products" => Ok(Stage::Products),
            "details" => Ok(Stage::Details),
            "visual_validation" | "visual" | "comparison" => Ok(Stage::VisualValidation),
            other => Err(format!("Unknown stage: {}", other)),
        }
    }
}
