//! Built-in catalogue of models the gateway advertises.

/// Model used when a request does not name one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Static description of a supported model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub owned_by: &'static str,
}

const MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "claude-opus-4-1-20250805",
        owned_by: "anthropic",
    },
    ModelInfo {
        id: DEFAULT_MODEL,
        owned_by: "anthropic",
    },
    ModelInfo {
        id: "claude-haiku-4-5-20250929",
        owned_by: "anthropic",
    },
    ModelInfo {
        id: "claude-sonnet-4-20250514",
        owned_by: "anthropic",
    },
];

pub const fn available_models() -> &'static [ModelInfo] {
    MODELS
}

pub fn find_model(id: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.id == id)
}
