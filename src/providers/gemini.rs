// Google Gemini adapter
//
// Gemini's wire format differs from the OpenAI-compatible family: messages
// are `contents` with `role: user|model` and nested `parts`, the system
// prompt travels as `systemInstruction`, and generation parameters live in
// a camelCase `generationConfig`.

use serde::{Deserialize, Serialize};

use super::types::{ChatRequest, ParseError, ProviderHttpRequest};
use super::ProviderAdapter;
use crate::conversation::Role;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug)]
pub struct GeminiAdapter {
    api_key: String,
    base_url: String,
    default_model: String,
}

impl GeminiAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn to_gemini_request(&self, request: &ChatRequest) -> GeminiRequest {
        let contents = request
            .turns
            .iter()
            .map(|turn| GeminiContent {
                // Gemini uses "model" instead of "assistant"
                role: match turn.role {
                    Role::User => "user".to_string(),
                    Role::Assistant => "model".to_string(),
                },
                parts: vec![GeminiPart {
                    text: turn.text.clone(),
                }],
            })
            .collect();

        GeminiRequest {
            contents,
            system_instruction: request.system.as_ref().map(|s| GeminiSystemInstruction {
                parts: vec![GeminiPart { text: s.clone() }],
            }),
            generation_config: Some(GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: Some(request.max_tokens as i32),
            }),
        }
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn build_request(&self, request: &ChatRequest) -> anyhow::Result<ProviderHttpRequest> {
        let model = if request.model.is_empty() {
            self.default_model.as_str()
        } else {
            request.model.as_str()
        };
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );
        let body = serde_json::to_value(self.to_gemini_request(request))?;
        Ok(ProviderHttpRequest {
            url,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body,
            diagnostics: request.diagnostics(),
        })
    }

    fn parse_response(&self, body: &serde_json::Value) -> Result<String, ParseError> {
        let response: GeminiResponse = serde_json::from_value(body.clone())
            .map_err(|e| ParseError::new(format!("gemini response did not deserialize: {e}")))?;

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ParseError::new("gemini returned no candidates"))?;

        let text: String = candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ParseError::new("gemini candidate contained no text parts"));
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

// Gemini wire types

#[derive(Debug, Clone, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    role: String, // "user" or "model"
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
    #[serde(rename = "finishReason")]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}
