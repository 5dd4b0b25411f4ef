// Provider entry: one configured LLM backend.

use serde::{Deserialize, Serialize};

/// A single provider entry.
///
/// Serializes with a `type` tag, e.g.:
/// ```toml
/// [[providers]]
/// type = "gemini"
/// api_key = "AIza..."
///
/// [[providers]]
/// type = "together"
/// api_key = "tk-..."
/// model = "meta-llama/Llama-3.3-70B-Instruct-Turbo"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderEntry {
    Gemini {
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Together {
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl ProviderEntry {
    /// Human-readable name for display.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Gemini { name, .. } => name.as_deref().unwrap_or("Gemini"),
            Self::Together { name, .. } => name.as_deref().unwrap_or("Together"),
        }
    }

    /// Short provider-type tag (e.g. "gemini", "together").
    pub fn provider_type(&self) -> &'static str {
        match self {
            Self::Gemini { .. } => "gemini",
            Self::Together { .. } => "together",
        }
    }

    pub fn api_key(&self) -> &str {
        match self {
            Self::Gemini { api_key, .. } => api_key,
            Self::Together { api_key, .. } => api_key,
        }
    }

    /// Optional model override.
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Gemini { model, .. } => model.as_deref(),
            Self::Together { model, .. } => model.as_deref(),
        }
    }
}
