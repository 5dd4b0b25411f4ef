// LLM provider gateway
//
// An abstraction layer over the supported LLM backends (Gemini, Together).
// Each backend implements `ProviderAdapter` for pure request building,
// response parsing, and status classification, while retry, backoff,
// timeout, and fallback live once in `ResilientCaller`.

pub mod caller;
pub mod factory;
pub mod fallback;
pub mod gemini;
pub mod together;
pub mod types;

pub use caller::{ResilientCaller, RetryPolicy};
pub use factory::create_adapter;
pub use fallback::fallback_response;
pub use gemini::GeminiAdapter;
pub use together::TogetherAdapter;
pub use types::{
    CallOutcome, ChatRequest, ParseError, ProviderCallResult, ProviderHttpRequest,
    RequestDiagnostics, StatusClass,
};

/// Capability set every LLM backend provides.
///
/// Implementations are pure: no I/O, no retries. That keeps the resilience
/// policy in one place and makes each adapter trivially unit-testable.
pub trait ProviderAdapter: Send + Sync + std::fmt::Debug {
    /// Translate a unified chat request into this provider's HTTP request.
    fn build_request(&self, request: &ChatRequest) -> anyhow::Result<ProviderHttpRequest>;

    /// Extract the reply text from a successful response body. A 200 with
    /// no text at the expected path is a `ParseError`, not empty text;
    /// providers occasionally return well-formed-but-unexpected JSON.
    fn parse_response(&self, body: &serde_json::Value) -> Result<String, ParseError>;

    /// Classify a non-2xx HTTP status for the retry policy.
    fn classify_status(&self, status: u16) -> StatusClass {
        match status {
            429 => StatusClass::Retryable,
            503 => StatusClass::ServiceDown,
            _ => StatusClass::Permanent,
        }
    }

    /// Short provider tag ("gemini", "together").
    fn name(&self) -> &str;

    /// Default model when the request does not name one.
    fn default_model(&self) -> &str;
}
