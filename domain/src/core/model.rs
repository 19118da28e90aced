//! Model identifier value object

use serde::{Deserialize, Serialize};

/// Identifier of a vision-capable model (Value Object)
///
/// Kept as an opaque provider model name (e.g. `"gpt-4o"`,
/// `"claude-sonnet-4"`). Family detection is used by the routing backend
/// when no explicit provider route is configured.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check if this is a Claude model
    pub fn is_claude(&self) -> bool {
        self.0.starts_with("claude")
    }

    /// Check if this is an OpenAI GPT / o-series model
    pub fn is_gpt(&self) -> bool {
        self.0.starts_with("gpt")
            || self.0.starts_with("o1")
            || self.0.starts_with("o3")
            || self.0.starts_with("o4")
    }

    /// Check if this is a Gemini model
    pub fn is_gemini(&self) -> bool {
        self.0.starts_with("gemini")
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ModelId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = ModelId::new(s);
        if id.is_empty() {
            return Err("Model identifier must not be empty".to_string());
        }
        Ok(id)
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        ModelId::new(s)
    }
}
