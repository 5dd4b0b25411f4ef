// Together AI adapter
//
// Together exposes an OpenAI-compatible chat-completions API: a flat
// `messages` array with `role: system|user|assistant`, bearer auth, and the
// reply at `choices[0].message.content`.

use serde::{Deserialize, Serialize};

use super::types::{ChatRequest, ParseError, ProviderHttpRequest};
use super::ProviderAdapter;
use crate::conversation::Role;

const TOGETHER_BASE_URL: &str = "https://api.together.xyz";
const DEFAULT_MODEL: &str = "meta-llama/Llama-3.3-70B-Instruct-Turbo";

#[derive(Debug)]
pub struct TogetherAdapter {
    api_key: String,
    base_url: String,
    default_model: String,
}

impl TogetherAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: TOGETHER_BASE_URL.to_string(),
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

    fn to_together_request(&self, request: &ChatRequest) -> TogetherRequest {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        let mut messages = Vec::with_capacity(request.turns.len() + 1);

        // System prompt goes first as a {"role":"system"} message
        if let Some(system) = &request.system {
            messages.push(TogetherMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }

        for turn in &request.turns {
            messages.push(TogetherMessage {
                role: match turn.role {
                    Role::User => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                },
                content: turn.text.clone(),
            });
        }

        TogetherRequest {
            model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

impl ProviderAdapter for TogetherAdapter {
    fn build_request(&self, request: &ChatRequest) -> anyhow::Result<ProviderHttpRequest> {
        let body = serde_json::to_value(self.to_together_request(request))?;
        Ok(ProviderHttpRequest {
            url: format!("{}/v1/chat/completions", self.base_url),
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                (
                    "authorization".to_string(),
                    format!("Bearer {}", self.api_key),
                ),
            ],
            body,
            diagnostics: request.diagnostics(),
        })
    }

    fn parse_response(&self, body: &serde_json::Value) -> Result<String, ParseError> {
        let response: TogetherResponse = serde_json::from_value(body.clone())
            .map_err(|e| ParseError::new(format!("together response did not deserialize: {e}")))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ParseError::new("together returned no choices"))?;

        let text = choice
            .message
            .and_then(|m| m.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ParseError::new("together choice contained no content"));
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "together"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

// Together wire types (OpenAI-compatible)

#[derive(Debug, Clone, Serialize)]
struct TogetherRequest {
    model: String,
    messages: Vec<TogetherMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TogetherMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TogetherResponse {
    #[serde(default)]
    choices: Vec<TogetherChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct TogetherChoice {
    message: Option<TogetherChoiceMessage>,
    #[serde(rename = "finish_reason")]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TogetherChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationTurn;
    use crate::providers::StatusClass;
    use serde_json::json;

    fn adapter() -> TogetherAdapter {
        TogetherAdapter::new("tk-test".to_string())
    }

    #[test]
    fn test_build_request_flat_messages_with_system_first() {
        let req = ChatRequest::new(vec![
            ConversationTurn::user("hi"),
            ConversationTurn::assistant("hello"),
        ])
        .with_system("tutor mode");
        let http = adapter().build_request(&req).unwrap();

        assert!(http.url.ends_with("/v1/chat/completions"));
        let messages = http.body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
    }

    #[test]
    fn test_build_request_bearer_auth_header() {
        let req = ChatRequest::new(vec![ConversationTurn::user("q")]);
        let http = adapter().build_request(&req).unwrap();
        let auth = http
            .headers
            .iter()
            .find(|(k, _)| k == "authorization")
            .map(|(_, v)| v.as_str());
        assert_eq!(auth, Some("Bearer tk-test"));
    }

    #[test]
    fn test_default_model_applied() {
        let req = ChatRequest::new(vec![]);
        let http = adapter().build_request(&req).unwrap();
        assert_eq!(http.body["model"], DEFAULT_MODEL);
    }

    #[test]
    fn test_parse_response_extracts_content() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "an answer"}, "finish_reason": "stop"}]
        });
        assert_eq!(adapter().parse_response(&body).unwrap(), "an answer");
    }

    #[test]
    fn test_parse_response_rejects_empty_choices() {
        let body = json!({"choices": []});
        assert!(adapter().parse_response(&body).is_err());
    }

    #[test]
    fn test_parse_response_rejects_null_content() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": null}}]});
        assert!(adapter().parse_response(&body).is_err());
    }

    #[test]
    fn test_status_classification_defaults() {
        let a = adapter();
        assert_eq!(a.classify_status(429), StatusClass::Retryable);
        assert_eq!(a.classify_status(503), StatusClass::ServiceDown);
        assert_eq!(a.classify_status(401), StatusClass::Permanent);
    }
}
