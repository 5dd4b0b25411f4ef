// Resilient provider call execution
//
// One place owns timeouts, bounded retry with exponential backoff, and the
// decision to fall back. Adapters stay pure; this module is the only part
// of the gateway that touches the network.
//
// All failure paths resolve to either `Success(text)`, `FallbackRequested`
// (transient classes exhausted), or a `PermanentProvider` error (bug-class
// failures that must not be masked by fallback). Dropping the returned
// future cancels the in-flight HTTP call; no retry starts after that.

use std::time::Duration;

use reqwest::Client;
use tokio::time::{sleep, timeout};

use super::types::{
    CallOutcome, ChatRequest, ProviderCallResult, ProviderHttpRequest, RequestDiagnostics,
    StatusClass,
};
use super::ProviderAdapter;
use crate::error::{Error, Result};

/// Retry policy for provider calls.
///
/// Worst-case wall clock for a call is
/// `attempt_timeout × (1 + max_retries)` plus the cumulative backoff
/// (reference configuration: 30s × 3 + 1s + 2s ≈ 93s). Upstream HTTP
/// timeouts should be set above this bound.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Deadline for a single attempt, connect through body read.
    pub attempt_timeout: Duration,
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// First backoff delay; doubles each retry.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(30),
            max_retries: 2,
            backoff_base: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn worst_case(&self) -> Duration {
        let attempts = self.attempt_timeout * (1 + self.max_retries);
        let backoff: Duration = (0..self.max_retries)
            .map(|n| self.backoff_base * 2u32.pow(n))
            .sum();
        attempts + backoff
    }
}

pub struct ResilientCaller {
    client: Client,
    policy: RetryPolicy,
}

impl ResilientCaller {
    pub fn new(policy: RetryPolicy) -> anyhow::Result<Self> {
        use anyhow::Context;
        // Per-attempt deadline is enforced with tokio::time::timeout; the
        // client-level timeout is a backstop slightly above it.
        let client = Client::builder()
            .timeout(policy.attempt_timeout + Duration::from_secs(5))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute one adapter call under the retry policy.
    pub async fn call(
        &self,
        adapter: &dyn ProviderAdapter,
        request: &ChatRequest,
    ) -> Result<CallOutcome> {
        let http = adapter
            .build_request(request)
            .map_err(|e| Error::PermanentProvider {
                provider: adapter.name().to_string(),
                status: None,
                detail: format!("request build failed: {e}"),
            })?;

        run_with_policy(
            &self.policy,
            adapter.name(),
            &http.diagnostics,
            |attempt| self.execute_once(adapter, &http, attempt),
        )
        .await
    }

    /// One HTTP attempt, mapped into the provider-call taxonomy.
    async fn execute_once(
        &self,
        adapter: &dyn ProviderAdapter,
        http: &ProviderHttpRequest,
        attempt: u32,
    ) -> ProviderCallResult {
        tracing::debug!(
            provider = adapter.name(),
            attempt,
            url = %http.url,
            "sending provider request"
        );

        let mut builder = self.client.post(&http.url).json(&http.body);
        for (key, value) in &http.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = match timeout(self.policy.attempt_timeout, builder.send()).await {
            Err(_) => {
                tracing::warn!(provider = adapter.name(), attempt, "attempt timed out");
                return ProviderCallResult::ConnectionFailure;
            }
            Ok(Err(e)) => {
                tracing::warn!(provider = adapter.name(), attempt, error = %e, "connection failure");
                return ProviderCallResult::ConnectionFailure;
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return match adapter.classify_status(status) {
                StatusClass::Retryable | StatusClass::ServiceDown => {
                    ProviderCallResult::TransientFailure(status)
                }
                StatusClass::Permanent => ProviderCallResult::PermanentFailure {
                    status: Some(status),
                    reason: truncate(&body, 500),
                },
            };
        }

        let body: serde_json::Value =
            match timeout(self.policy.attempt_timeout, response.json()).await {
                Err(_) => return ProviderCallResult::ConnectionFailure,
                Ok(Err(e)) => {
                    return ProviderCallResult::PermanentFailure {
                        status: Some(status),
                        reason: format!("response body was not JSON: {e}"),
                    }
                }
                Ok(Ok(body)) => body,
            };

        match adapter.parse_response(&body) {
            Ok(text) => ProviderCallResult::Success(text),
            // A 200 whose body lacks the expected text path is a bug class,
            // not a transient condition.
            Err(e) => ProviderCallResult::PermanentFailure {
                status: Some(status),
                reason: e.to_string(),
            },
        }
    }
}

/// Drive an attempt function under a retry policy.
///
/// Factored out of `ResilientCaller::call` so the policy can be exercised
/// by tests with a stub transport and paused time.
pub(crate) async fn run_with_policy<F, Fut>(
    policy: &RetryPolicy,
    provider: &str,
    diagnostics: &RequestDiagnostics,
    mut attempt_fn: F,
) -> Result<CallOutcome>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = ProviderCallResult>,
{
    let total_attempts = 1 + policy.max_retries;

    for attempt in 0..total_attempts {
        match attempt_fn(attempt).await {
            ProviderCallResult::Success(text) => return Ok(CallOutcome::Success(text)),
            ProviderCallResult::PermanentFailure { status, reason } => {
                tracing::error!(
                    provider,
                    status = ?status,
                    request = %diagnostics,
                    "permanent provider failure: {reason}"
                );
                return Err(Error::PermanentProvider {
                    provider: provider.to_string(),
                    status,
                    detail: format!("{reason} (request: {diagnostics})"),
                });
            }
            ProviderCallResult::TransientFailure(status) => {
                tracing::warn!(
                    provider,
                    status,
                    attempt = attempt + 1,
                    total_attempts,
                    "transient provider failure"
                );
            }
            ProviderCallResult::ConnectionFailure => {
                tracing::warn!(
                    provider,
                    attempt = attempt + 1,
                    total_attempts,
                    "provider connection failure"
                );
            }
        }

        if attempt + 1 < total_attempts {
            let delay = policy.backoff_base * 2u32.pow(attempt);
            tracing::warn!(provider, delay_ms = delay.as_millis() as u64, "backing off");
            sleep(delay).await;
        }
    }

    tracing::warn!(provider, "retries exhausted, requesting fallback");
    Ok(CallOutcome::FallbackRequested)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
