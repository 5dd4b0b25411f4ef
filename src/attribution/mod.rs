// Provider attribution for performance events
//
// After a learner completes a quiz or practice attempt, work out which LLM
// provider most plausibly influenced it, at a confidence tier:
//
//   Explicit  : the attempt links to the chat message that produced the help
//   Session   : no link, but the session only ever used one provider
//   Temporal  : fall back to the nearest assistant message preceding the
//               attempt, recording the elapsed seconds
//
// A session with no chat messages resolves to Unattributed and nothing is
// written: no attribution beats a fabricated one.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{AttemptRecord, Store, StoredAttribution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Explicit,
    Session,
    Temporal,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Session => "session",
            Self::Temporal => "temporal",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "explicit" => Some(Self::Explicit),
            "session" => Some(Self::Session),
            "temporal" => Some(Self::Temporal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributionRecord {
    pub attempt_id: String,
    pub provider: String,
    pub tier: ConfidenceTier,
    pub source_chat_message_id: Option<String>,
    /// Seconds between the source message and the attempt (Temporal only).
    pub delay_seconds: Option<i64>,
}

/// Outcome of resolution. `Unattributed` is an explicit, expected result,
/// not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum Attribution {
    Resolved(AttributionRecord),
    Unattributed,
}

pub struct AttributionResolver {
    store: Arc<Store>,
}

impl AttributionResolver {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Resolve attribution for an attempt. Runs the cascade at most once:
    /// if a record was already written, it is returned verbatim.
    pub async fn resolve(&self, attempt_id: &str) -> Result<Attribution> {
        if let Some(existing) = self.store.get_attribution(attempt_id).await? {
            return Ok(Attribution::Resolved(to_record(existing)));
        }

        let attempt = self
            .store
            .get_attempt(attempt_id)
            .await?
            .ok_or_else(|| Error::validation(format!("unknown attempt: {attempt_id}")))?;

        let resolved = self.run_cascade(&attempt).await?;

        if let Attribution::Resolved(record) = &resolved {
            self.store
                .insert_attribution(&StoredAttribution {
                    attempt_id: record.attempt_id.clone(),
                    provider: record.provider.clone(),
                    confidence_tier: record.tier.as_str().to_string(),
                    source_chat_message_id: record.source_chat_message_id.clone(),
                    delay_seconds: record.delay_seconds,
                    created_at: Utc::now(),
                })
                .await?;
            tracing::info!(
                attempt_id,
                provider = %record.provider,
                tier = record.tier.as_str(),
                "attribution resolved"
            );
        } else {
            tracing::info!(attempt_id, "attempt left unattributed");
        }

        Ok(resolved)
    }

    async fn run_cascade(&self, attempt: &AttemptRecord) -> Result<Attribution> {
        // Explicit: the attempt names its source chat message.
        if let Some(message_id) = &attempt.attribution_chat_message_id {
            if let Some(message) = self.store.get_chat_message(message_id).await? {
                if let Some(provider) = message.provider {
                    return Ok(Attribution::Resolved(AttributionRecord {
                        attempt_id: attempt.attempt_id.clone(),
                        provider,
                        tier: ConfidenceTier::Explicit,
                        source_chat_message_id: Some(message.message_id),
                        delay_seconds: None,
                    }));
                }
            }
            tracing::warn!(
                attempt_id = %attempt.attempt_id,
                message_id,
                "explicit attribution link is dangling; falling through"
            );
        }

        let session_id = match &attempt.session_id {
            Some(id) => id,
            None => return Ok(Attribution::Unattributed),
        };

        if !self.store.session_has_chat_messages(session_id).await? {
            return Ok(Attribution::Unattributed);
        }

        // Session: exactly one provider seen during the session.
        let providers = self.store.providers_used(session_id).await?;
        if providers.len() == 1 {
            return Ok(Attribution::Resolved(AttributionRecord {
                attempt_id: attempt.attempt_id.clone(),
                provider: providers.into_iter().next().unwrap(),
                tier: ConfidenceTier::Session,
                source_chat_message_id: None,
                delay_seconds: None,
            }));
        }

        // Temporal: nearest assistant message preceding the attempt.
        let message = self
            .store
            .latest_assistant_message_at_or_before(session_id, attempt.created_at)
            .await?;
        if let Some(message) = message {
            if let Some(provider) = message.provider {
                let delay = (attempt.created_at - message.created_at).num_seconds().max(0);
                return Ok(Attribution::Resolved(AttributionRecord {
                    attempt_id: attempt.attempt_id.clone(),
                    provider,
                    tier: ConfidenceTier::Temporal,
                    source_chat_message_id: Some(message.message_id),
                    delay_seconds: Some(delay),
                }));
            }
        }

        Ok(Attribution::Unattributed)
    }
}

fn to_record(stored: StoredAttribution) -> AttributionRecord {
    AttributionRecord {
        attempt_id: stored.attempt_id,
        // Unknown tier strings cannot appear: the resolver is the only writer.
        tier: ConfidenceTier::from_str(&stored.confidence_tier).unwrap_or(ConfidenceTier::Temporal),
        provider: stored.provider,
        source_chat_message_id: stored.source_chat_message_id,
        delay_seconds: stored.delay_seconds,
    }
}
