//! Model registry
//!
//! A closed, immutable table mapping a stable key to the remote model
//! identifier and execution mode sent with every query.

use serde::Serialize;

/// Remote identifier and execution mode for one model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    /// Value sent as `model_preference`
    pub identifier: &'static str,
    /// Value sent as `mode`
    pub mode: &'static str,
}

/// A registry entry with display metadata
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelEntry {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub descriptor: ModelDescriptor,
}

/// Key of the model used when none is requested
pub const DEFAULT_MODEL: &str = "pro_best";

const fn copilot(identifier: &'static str) -> ModelDescriptor {
    ModelDescriptor {
        identifier,
        mode: "copilot",
    }
}

static MODELS: &[ModelEntry] = &[
    ModelEntry {
        key: "pro_best",
        name: "Best",
        description: "Selects the best model for each query",
        descriptor: copilot("pplx_pro"),
    },
    ModelEntry {
        key: "pro_sonar",
        name: "Sonar",
        description: "Perplexity's fast model",
        descriptor: copilot("experimental"),
    },
    ModelEntry {
        key: "pro_claude40sonnet",
        name: "Claude 4.0 Sonnet",
        description: "Anthropic's advanced model",
        descriptor: copilot("claude2"),
    },
    ModelEntry {
        key: "pro_gpt41",
        name: "GPT-4.1",
        description: "OpenAI's advanced model",
        descriptor: copilot("gpt41"),
    },
    ModelEntry {
        key: "pro_gemini25pro",
        name: "Gemini 2.5 Pro",
        description: "Google's latest model",
        descriptor: copilot("gemini2flash"),
    },
    ModelEntry {
        key: "pro_reasoning_r1",
        name: "R1 1776",
        description: "Perplexity's unbiased reasoning model",
        descriptor: copilot("r1"),
    },
    ModelEntry {
        key: "pro_reasoning_grok4",
        name: "Grok 4",
        description: "xAI's latest, most powerful reasoning model",
        descriptor: copilot("grok4"),
    },
    ModelEntry {
        key: "pro_reasoning_o3",
        name: "o3",
        description: "OpenAI's reasoning model",
        descriptor: copilot("o3"),
    },
    ModelEntry {
        key: "pro_reasoning_claude40sonnetthinking",
        name: "Claude 4.0 Sonnet Thinking",
        description: "Anthropic's reasoning model",
        descriptor: copilot("claude37sonnetthinking"),
    },
    ModelEntry {
        key: "research",
        name: "Research",
        description: "Deep research on any topic, in-depth reports with more sources",
        descriptor: copilot("pplx_alpha"),
    },
];

/// Read-only access to the model table
pub struct ModelRegistry;

impl ModelRegistry {
    /// All entries in display order
    pub fn all() -> &'static [ModelEntry] {
        MODELS
    }

    /// Look up an entry by key
    pub fn entry(key: &str) -> Option<&'static ModelEntry> {
        MODELS.iter().find(|m| m.key == key)
    }

    /// Look up a descriptor by key
    pub fn get(key: &str) -> Option<ModelDescriptor> {
        Self::entry(key).map(|m| m.descriptor)
    }

    /// Descriptor for [`DEFAULT_MODEL`]
    pub fn default_model() -> ModelDescriptor {
        MODELS[0].descriptor
    }

    /// Available keys
    pub fn keys() -> impl Iterator<Item = &'static str> {
        MODELS.iter().map(|m| m.key)
    }
}
