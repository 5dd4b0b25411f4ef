// Unified request/outcome types for the provider gateway
//
// These abstract over provider-specific wire formats (Gemini, Together)
// so retry and fallback logic is written once against a common shape.

use serde::Serialize;

use crate::conversation::{ConversationTurn, Role};

/// Provider-agnostic chat request. Adapters translate this into their own
/// wire format.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Normalized conversation, oldest first.
    pub turns: Vec<ConversationTurn>,

    /// System prompt (sent as `systemInstruction` for Gemini, prepended as a
    /// `{"role":"system"}` message for OpenAI-compatible providers).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Model name override; empty means the adapter's default.
    pub model: String,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Sampling temperature (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(turns: Vec<ConversationTurn>) -> Self {
        Self {
            turns,
            system: None,
            model: String::new(),
            max_tokens: 800,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Diagnostics snapshot for logging a rejected request (HTTP 400)
    /// without re-walking the turn list at the log site.
    pub fn diagnostics(&self) -> RequestDiagnostics {
        RequestDiagnostics {
            message_count: self.turns.len(),
            content_lengths: self.turns.iter().map(|t| t.text.len()).collect(),
            role_sequence: self
                .turns
                .iter()
                .map(|t| match t.role {
                    Role::User => 'u',
                    Role::Assistant => 'a',
                })
                .collect(),
        }
    }
}

/// What a provider rejected, in loggable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDiagnostics {
    pub message_count: usize,
    pub content_lengths: Vec<usize>,
    /// One char per turn: 'u' for user, 'a' for assistant.
    pub role_sequence: String,
}

impl std::fmt::Display for RequestDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} messages, roles [{}], lengths {:?}",
            self.message_count, self.role_sequence, self.content_lengths
        )
    }
}

/// A fully built provider HTTP request, ready for the caller to execute.
#[derive(Debug, Clone)]
pub struct ProviderHttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
    pub diagnostics: RequestDiagnostics,
}

/// How an HTTP status should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Rate limited (429): back off and retry.
    Retryable,
    /// Service unavailable (503): back off and retry; exhaustion falls back.
    ServiceDown,
    /// Any other non-2xx: never retried.
    Permanent,
}

/// Outcome of a single provider call attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCallResult {
    Success(String),
    /// Retryable class (429/503) with the observed status.
    TransientFailure(u16),
    /// Non-retryable status or malformed response body.
    PermanentFailure {
        status: Option<u16>,
        reason: String,
    },
    /// Connection-level failure (refused, reset, timeout).
    ConnectionFailure,
}

/// Final outcome of a resilient call: either text, or an instruction to the
/// caller to serve the deterministic fallback. Permanent failures are
/// errors, not outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success(String),
    FallbackRequested,
}

/// A successful HTTP response whose body lacks the expected text path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub detail: String,
}

impl ParseError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unexpected response shape: {}", self.detail)
    }
}

impl std::error::Error for ParseError {}
